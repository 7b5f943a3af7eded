// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params, params_from_iter};
use std::collections::BTreeSet;
use std::path::Path;
use tierdesk_app::{
    CRM_SCHEMA, CrmMetric, CrmRow, CrmRowId, CrmValues, PageRange, Predicate, Query,
    REGION_SCHEMA, RegionRow, RegionRowId, ScreenKind, Tier, Value, parse_stored_tier,
};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::{Backend, format_timestamp, parse_opt_timestamp, validate_db_path};

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    (
        "Region Mapping",
        &[
            "S.No.",
            "State Code",
            "District Code",
            "SubDistrict Code",
            "Village Code",
            "Pincode",
            "State Name",
            "District Name",
            "SubDistrict Name",
            "Village Name",
            "Tier",
            "Price",
        ],
    ),
    (
        "CRM Data",
        &[
            "id",
            "state",
            "district",
            "pincode",
            "hp",
            "amp",
            "dsn",
            "ssm",
            "yltp",
            "wltp",
            "vtp",
            "rural_hp",
            "rural_amp",
            "rhp_legacy",
            "last_updated",
            "created_at",
        ],
    ),
];

const REGION_COLUMNS: &[&str] = &[
    "S.No.",
    "State Code",
    "District Code",
    "SubDistrict Code",
    "Village Code",
    "Pincode",
    "State Name",
    "District Name",
    "SubDistrict Name",
    "Village Name",
    "Tier",
    "Price",
];

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")?;
        }
        self.conn
            .execute_batch(
                "CREATE INDEX IF NOT EXISTS region_mapping_pincode_idx
                   ON \"Region Mapping\" (\"Pincode\");",
            )
            .context("ensure pincode index")?;
        Ok(())
    }

    pub fn insert_region_row(&self, row: &RegionRow) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(REGION_SCHEMA.table),
            column_list(REGION_COLUMNS),
            vec!["?"; REGION_COLUMNS.len()].join(", ")
        );
        self.conn
            .execute(
                &sql,
                params![
                    row.id.get(),
                    row.state_code,
                    row.district_code,
                    row.sub_district_code,
                    row.village_code,
                    row.pincode,
                    row.state_name,
                    row.district_name,
                    row.sub_district_name,
                    row.village_name,
                    row.tier.map(Tier::as_str),
                    row.price,
                ],
            )
            .with_context(|| format!("insert region mapping row {}", row.id.get()))?;
        Ok(())
    }

    pub fn insert_crm_row(&self, id: CrmRowId, values: &CrmValues) -> Result<()> {
        insert_crm(&self.conn, id.get(), values, &format_timestamp(OffsetDateTime::now_utc())?)
            .with_context(|| format!("insert CRM row {}", id.get()))
    }

    fn count(&self, table: &str, query: &Query) -> Result<usize> {
        let filter = SqlFilter::from_query(query);
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            quote_ident(table),
            filter.where_sql()
        );
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(filter.params.iter()), |row| row.get(0))
            .with_context(|| format!("count rows in {table}"))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

impl Backend for Store {
    fn count_rows(&self, screen: ScreenKind, query: &Query) -> Result<usize> {
        self.count(screen.schema().table, query)
    }

    fn list_region_rows(&self, query: &Query, range: PageRange) -> Result<Vec<RegionRow>> {
        let filter = SqlFilter::from_query(query);
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {} ASC LIMIT {} OFFSET {}",
            column_list(REGION_COLUMNS),
            quote_ident(REGION_SCHEMA.table),
            filter.where_sql(),
            quote_ident(REGION_SCHEMA.id_column),
            range.limit,
            range.offset
        );
        debug!(%sql, "list region mapping rows");

        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("prepare region mapping query")?;
        let rows = stmt
            .query_map(params_from_iter(filter.params.iter()), |row| {
                let tier_raw: Option<String> = row.get(10)?;
                Ok(RegionRow {
                    id: RegionRowId::new(row.get(0)?),
                    state_code: row.get(1)?,
                    district_code: row.get(2)?,
                    sub_district_code: row.get(3)?,
                    village_code: row.get(4)?,
                    pincode: row.get(5)?,
                    state_name: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                    district_name: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                    sub_district_name: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                    village_name: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                    tier: parse_stored_tier(tier_raw.as_deref()).map_err(to_sql_error)?,
                    price: row.get(11)?,
                })
            })
            .context("query region mapping rows")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect region mapping rows")
    }

    fn list_crm_rows(&self, query: &Query, range: PageRange) -> Result<Vec<CrmRow>> {
        let filter = SqlFilter::from_query(query);
        let sql = format!(
            "SELECT id, state, district, pincode, {}, last_updated FROM {}{} ORDER BY id ASC LIMIT {} OFFSET {}",
            metric_columns().join(", "),
            quote_ident(CRM_SCHEMA.table),
            filter.where_sql(),
            range.limit,
            range.offset
        );
        debug!(%sql, "list CRM rows");

        let mut stmt = self.conn.prepare(&sql).context("prepare CRM query")?;
        let rows = stmt
            .query_map(params_from_iter(filter.params.iter()), |row| {
                let mut metrics = [0.0; 10];
                for (index, slot) in metrics.iter_mut().enumerate() {
                    *slot = row.get::<_, Option<f64>>(4 + index)?.unwrap_or_default();
                }
                let last_updated_raw: Option<String> = row.get(14)?;
                Ok(CrmRow {
                    id: CrmRowId::new(row.get(0)?),
                    values: CrmValues {
                        state: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        district: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        pincode: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        metrics,
                    },
                    last_updated: parse_opt_timestamp(last_updated_raw.as_deref())
                        .map_err(to_sql_error)?,
                })
            })
            .context("query CRM rows")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect CRM rows")
    }

    fn update_region_tier(&self, id: RegionRowId, tier: Option<Tier>) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE {} = ?",
            quote_ident(REGION_SCHEMA.table),
            quote_ident("Tier"),
            quote_ident(REGION_SCHEMA.id_column)
        );
        let changed = self
            .conn
            .execute(&sql, params![tier.map(Tier::as_str), id.get()])
            .with_context(|| format!("update tier for region mapping row {}", id.get()))?;
        if changed == 0 {
            bail!("region mapping row {} not found", id.get());
        }
        Ok(())
    }

    fn update_crm_row(
        &self,
        id: CrmRowId,
        values: &CrmValues,
        updated_at: OffsetDateTime,
    ) -> Result<()> {
        let assignments = ["state", "district", "pincode"]
            .into_iter()
            .chain(metric_columns())
            .chain(["last_updated"])
            .map(|column| format!("{} = ?", quote_ident(column)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE id = ?",
            quote_ident(CRM_SCHEMA.table)
        );

        let mut bound: Vec<SqlValue> = vec![
            SqlValue::Text(values.state.clone()),
            SqlValue::Text(values.district.clone()),
            SqlValue::Text(values.pincode.clone()),
        ];
        bound.extend(values.metrics.iter().map(|value| SqlValue::Real(*value)));
        bound.push(SqlValue::Text(format_timestamp(updated_at)?));
        bound.push(SqlValue::Integer(id.get()));

        let changed = self
            .conn
            .execute(&sql, params_from_iter(bound.iter()))
            .with_context(|| format!("update CRM row {}", id.get()))?;
        if changed == 0 {
            bail!("CRM row {} not found", id.get());
        }
        Ok(())
    }

    fn replace_crm_rows(&self, rows: &[CrmValues]) -> Result<usize> {
        let created_at = format_timestamp(OffsetDateTime::now_utc())?;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin CRM replace transaction")?;
        let removed = tx
            .execute(&format!("DELETE FROM {}", quote_ident(CRM_SCHEMA.table)), [])
            .context("clear CRM rows")?;
        for (index, values) in rows.iter().enumerate() {
            let id = i64::try_from(index + 1).context("CRM row count overflow")?;
            insert_crm(&tx, id, values, &created_at)
                .with_context(|| format!("insert CRM row {id} of {}", rows.len()))?;
        }
        tx.commit().context("commit CRM replace")?;
        info!(removed, inserted = rows.len(), "replaced CRM rows");
        Ok(rows.len())
    }
}

/// A WHERE clause with positional parameters.
#[derive(Debug, Default)]
struct SqlFilter {
    clauses: Vec<String>,
    params: Vec<SqlValue>,
}

impl SqlFilter {
    fn from_query(query: &Query) -> Self {
        let mut filter = Self::default();
        for predicate in &query.predicates {
            let clause = filter.render(predicate);
            filter.clauses.push(clause);
        }
        filter
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    fn render(&mut self, predicate: &Predicate) -> String {
        match predicate {
            Predicate::ILike { column, needle } => {
                self.params
                    .push(SqlValue::Text(format!("%{}%", escape_like(needle))));
                format!("{} LIKE ? ESCAPE '\\'", quote_ident(column))
            }
            Predicate::Eq { column, value } => {
                self.params.push(match value {
                    Value::Int(value) => SqlValue::Integer(*value),
                    Value::Text(value) => SqlValue::Text(value.clone()),
                });
                format!("{} = ?", quote_ident(column))
            }
            Predicate::Range { column, start, end } => {
                self.params.push(SqlValue::Integer(*start));
                self.params.push(SqlValue::Integer(*end));
                let column = quote_ident(column);
                format!("({column} >= ? AND {column} < ?)")
            }
            Predicate::IsNull { column } => format!("{} IS NULL", quote_ident(column)),
            Predicate::AnyOf(any) => {
                if any.is_empty() {
                    return "0".to_owned();
                }
                let parts = any
                    .iter()
                    .map(|inner| self.render(inner))
                    .collect::<Vec<_>>();
                format!("({})", parts.join(" OR "))
            }
        }
    }
}

fn insert_crm(conn: &Connection, id: i64, values: &CrmValues, created_at: &str) -> Result<()> {
    let columns = ["id", "state", "district", "pincode"]
        .into_iter()
        .chain(metric_columns())
        .chain(["created_at"])
        .collect::<Vec<_>>();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(CRM_SCHEMA.table),
        column_list(&columns),
        vec!["?"; columns.len()].join(", ")
    );

    let mut bound: Vec<SqlValue> = vec![
        SqlValue::Integer(id),
        SqlValue::Text(values.state.clone()),
        SqlValue::Text(values.district.clone()),
        SqlValue::Text(values.pincode.clone()),
    ];
    bound.extend(values.metrics.iter().map(|value| SqlValue::Real(*value)));
    bound.push(SqlValue::Text(created_at.to_owned()));

    conn.execute(&sql, params_from_iter(bound.iter()))
        .context("insert CRM row")?;
    Ok(())
}

fn metric_columns() -> [&'static str; 10] {
    CrmMetric::ALL.map(CrmMetric::column)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        if !table_exists(conn, table)? {
            bail!(
                "database is missing required table `{table}`; point TIERDESK_DB_PATH at a tierdesk database"
            );
        }

        let columns = table_columns(conn, table)?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();

        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}",
                missing.join(", ")
            );
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            )
            ",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn to_sql_error(error: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            error.to_string(),
        )),
    )
}

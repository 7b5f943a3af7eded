// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::CONTENT_RANGE;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tierdesk_app::{
    CRM_SCHEMA, CrmRow, CrmRowId, CrmValues, PageRange, Predicate, Query, REGION_SCHEMA,
    RegionRow, RegionRowId, ScreenKind, Tier, Value, parse_stored_tier,
};
use time::OffsetDateTime;
use tracing::{debug, info};
use url::Url;

use crate::{Backend, format_timestamp, parse_opt_timestamp};

const REPLACE_CRM_RPC: &str = "replace_crm_rows";

/// A PostgREST-style hosted backend reached over HTTP.
#[derive(Debug, Clone)]
pub struct RestBackend {
    base_url: Url,
    api_key: String,
    http: HttpClient,
}

impl RestBackend {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            bail!("backend.url must not be empty");
        }
        if api_key.trim().is_empty() {
            bail!("backend api key must not be empty; set TIERDESK_BACKEND_KEY or backend.api_key");
        }
        let base_url = Url::parse(&format!("{trimmed}/"))
            .with_context(|| format!("parse backend.url {base_url:?}"))?;
        if base_url.cannot_be_a_base() {
            bail!("backend.url {base_url} cannot be used as a base URL");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            api_key: api_key.trim().to_owned(),
            http,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("backend.url {} cannot be a base", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn table_url(&self, table: &str, query: &Query) -> Result<Url> {
        let mut url = self.endpoint(&[table])?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in filter_params(query)? {
                pairs.append_pair(&key, &value);
            }
        }
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = self
            .authorized(builder)
            .send()
            .map_err(|error| connection_error(self.base_url.as_str(), error))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }
        Ok(response)
    }

    fn list<T: for<'de> Deserialize<'de>>(
        &self,
        table: &str,
        id_column: &str,
        query: &Query,
        range: PageRange,
    ) -> Result<Vec<T>> {
        let mut url = self.table_url(table, query)?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("order", &format!("{}.asc", quote_column(id_column)))
            .append_pair("offset", &range.offset.to_string())
            .append_pair("limit", &range.limit.to_string());
        debug!(%url, "list rows");

        let response = self.send(self.http.get(url))?;
        response
            .json()
            .with_context(|| format!("decode rows from {table}"))
    }

    fn patch(&self, table: &str, id_column: &str, id: i64, body: &serde_json::Value) -> Result<()> {
        let mut url = self.endpoint(&[table])?;
        url.query_pairs_mut()
            .append_pair(&quote_column(id_column), &format!("eq.{id}"));

        let response = self.send(
            self.http
                .patch(url)
                .header("Prefer", "return=representation")
                .json(body),
        )?;
        let updated: Vec<serde_json::Value> = response
            .json()
            .with_context(|| format!("decode update response from {table}"))?;
        if updated.is_empty() {
            bail!("{table} row {id} not found");
        }
        Ok(())
    }
}

impl Backend for RestBackend {
    fn count_rows(&self, screen: ScreenKind, query: &Query) -> Result<usize> {
        let schema = screen.schema();
        let mut url = self.table_url(schema.table, query)?;
        url.query_pairs_mut()
            .append_pair("select", &quote_column(schema.id_column))
            .append_pair("limit", "0");

        let response = self.send(self.http.get(url).header("Prefer", "count=exact"))?;
        let header = response
            .headers()
            .get(CONTENT_RANGE)
            .ok_or_else(|| anyhow!("count response from {} has no Content-Range", schema.table))?
            .to_str()
            .context("read Content-Range header")?
            .to_owned();
        parse_content_range_total(&header)
    }

    fn list_region_rows(&self, query: &Query, range: PageRange) -> Result<Vec<RegionRow>> {
        let records: Vec<RegionRecord> = self.list(
            REGION_SCHEMA.table,
            REGION_SCHEMA.id_column,
            query,
            range,
        )?;
        records.into_iter().map(RegionRecord::into_row).collect()
    }

    fn list_crm_rows(&self, query: &Query, range: PageRange) -> Result<Vec<CrmRow>> {
        let records: Vec<CrmRecord> =
            self.list(CRM_SCHEMA.table, CRM_SCHEMA.id_column, query, range)?;
        records.into_iter().map(CrmRecord::into_row).collect()
    }

    fn update_region_tier(&self, id: RegionRowId, tier: Option<Tier>) -> Result<()> {
        let body = serde_json::json!({ "Tier": tier.map(Tier::as_str) });
        self.patch(REGION_SCHEMA.table, REGION_SCHEMA.id_column, id.get(), &body)
            .with_context(|| format!("update tier for region mapping row {}", id.get()))
    }

    fn update_crm_row(
        &self,
        id: CrmRowId,
        values: &CrmValues,
        updated_at: OffsetDateTime,
    ) -> Result<()> {
        let mut body = serde_json::to_value(CrmPayload::from(values))
            .context("encode CRM row")?;
        body["last_updated"] = serde_json::Value::String(format_timestamp(updated_at)?);
        self.patch(CRM_SCHEMA.table, CRM_SCHEMA.id_column, id.get(), &body)
            .with_context(|| format!("update CRM row {}", id.get()))
    }

    fn replace_crm_rows(&self, rows: &[CrmValues]) -> Result<usize> {
        let url = self.endpoint(&["rpc", REPLACE_CRM_RPC])?;
        let payload = ReplaceRequest {
            rows: rows.iter().map(CrmPayload::from).collect(),
        };
        let response = self
            .send(self.http.post(url).json(&payload))
            .context("replace CRM rows")?;
        let body: serde_json::Value = response.json().unwrap_or(serde_json::Value::Null);
        let inserted = body
            .as_u64()
            .and_then(|count| usize::try_from(count).ok())
            .unwrap_or(rows.len());
        info!(inserted, "replaced CRM rows via rpc");
        Ok(inserted)
    }
}

/// PostgREST query parameters for a conjunction of predicates.
fn filter_params(query: &Query) -> Result<Vec<(String, String)>> {
    let mut params = Vec::new();
    for predicate in &query.predicates {
        match predicate {
            Predicate::ILike { column, needle } => {
                params.push((quote_column(column), format!("ilike.*{}*", escape_ilike(needle))));
            }
            Predicate::Eq { column, value } => {
                params.push((quote_column(column), format!("eq.{}", value_text(value))));
            }
            Predicate::Range { column, start, end } => {
                params.push((quote_column(column), format!("gte.{start}")));
                params.push((quote_column(column), format!("lt.{end}")));
            }
            Predicate::IsNull { column } => {
                params.push((quote_column(column), "is.null".to_owned()));
            }
            Predicate::AnyOf(any) => {
                params.push(("or".to_owned(), format!("({})", inline_list(any)?)));
            }
        }
    }
    Ok(params)
}

fn inline_list(predicates: &[Predicate]) -> Result<String> {
    if predicates.is_empty() {
        bail!("cannot send an empty OR clause");
    }
    let parts = predicates
        .iter()
        .map(inline_condition)
        .collect::<Result<Vec<_>>>()?;
    Ok(parts.join(","))
}

/// The `column.op.value` form used inside `or=(...)`.
fn inline_condition(predicate: &Predicate) -> Result<String> {
    Ok(match predicate {
        Predicate::ILike { column, needle } => format!(
            "{}.ilike.{}",
            quote_column(column),
            quote_value(&format!("*{}*", escape_ilike(needle)))
        ),
        Predicate::Eq { column, value } => format!(
            "{}.eq.{}",
            quote_column(column),
            quote_value(&value_text(value))
        ),
        Predicate::Range { column, start, end } => {
            let column = quote_column(column);
            format!("and({column}.gte.{start},{column}.lt.{end})")
        }
        Predicate::IsNull { column } => format!("{}.is.null", quote_column(column)),
        Predicate::AnyOf(any) => format!("or({})", inline_list(any)?),
    })
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Int(value) => value.to_string(),
        Value::Text(value) => value.clone(),
    }
}

fn needs_quotes(raw: &str) -> bool {
    raw.chars()
        .any(|ch| matches!(ch, ',' | '.' | ':' | '(' | ')' | '"' | '\\' | ' '))
}

fn quote_column(column: &str) -> String {
    if needs_quotes(column) {
        format!("\"{}\"", column.replace('"', "\"\""))
    } else {
        column.to_owned()
    }
}

/// `*` is the wildcard in PostgREST filters and cannot be escaped, so it is
/// dropped. SQL wildcards are escaped so they match literally.
fn escape_ilike(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars().filter(|ch| *ch != '*') {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn quote_value(raw: &str) -> String {
    if needs_quotes(raw) {
        format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        raw.to_owned()
    }
}

/// `0-49/1234` or `*/1234` -> 1234.
fn parse_content_range_total(header: &str) -> Result<usize> {
    let total = header
        .rsplit_once('/')
        .map(|(_, total)| total.trim())
        .ok_or_else(|| anyhow!("malformed Content-Range {header:?}"))?;
    if total == "*" {
        bail!("backend did not return an exact count (Content-Range {header:?})");
    }
    total
        .parse()
        .with_context(|| format!("parse total from Content-Range {header:?}"))
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    anyhow!(
        "cannot reach {} -- check backend.url and your network ({})",
        base_url,
        error
    )
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<PostgrestError>(body)
        && let Some(message) = parsed.message
        && !message.is_empty()
    {
        return match parsed.hint.filter(|hint| !hint.is_empty()) {
            Some(hint) => anyhow!("server error ({}): {message} ({hint})", status.as_u16()),
            None => anyhow!("server error ({}): {message}", status.as_u16()),
        };
    }

    if body.len() < 100 && !body.contains('{') && !body.trim().is_empty() {
        return anyhow!("server error ({}): {}", status.as_u16(), body.trim());
    }

    anyhow!("server returned {}", status.as_u16())
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: Option<String>,
    hint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegionRecord {
    #[serde(rename = "S.No.")]
    id: i64,
    #[serde(rename = "State Code")]
    state_code: Option<i64>,
    #[serde(rename = "District Code")]
    district_code: Option<i64>,
    #[serde(rename = "SubDistrict Code")]
    sub_district_code: Option<i64>,
    #[serde(rename = "Village Code")]
    village_code: Option<i64>,
    #[serde(rename = "Pincode")]
    pincode: Option<i64>,
    #[serde(rename = "State Name")]
    state_name: Option<String>,
    #[serde(rename = "District Name")]
    district_name: Option<String>,
    #[serde(rename = "SubDistrict Name")]
    sub_district_name: Option<String>,
    #[serde(rename = "Village Name")]
    village_name: Option<String>,
    #[serde(rename = "Tier")]
    tier: Option<String>,
    #[serde(rename = "Price")]
    price: Option<f64>,
}

impl RegionRecord {
    fn into_row(self) -> Result<RegionRow> {
        Ok(RegionRow {
            id: RegionRowId::new(self.id),
            state_code: self.state_code,
            district_code: self.district_code,
            sub_district_code: self.sub_district_code,
            village_code: self.village_code,
            pincode: self.pincode,
            state_name: self.state_name.unwrap_or_default(),
            district_name: self.district_name.unwrap_or_default(),
            sub_district_name: self.sub_district_name.unwrap_or_default(),
            village_name: self.village_name.unwrap_or_default(),
            tier: parse_stored_tier(self.tier.as_deref())
                .with_context(|| format!("region mapping row {}", self.id))?,
            price: self.price,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CrmRecord {
    id: i64,
    state: Option<String>,
    district: Option<String>,
    pincode: Option<String>,
    hp: Option<f64>,
    amp: Option<f64>,
    dsn: Option<f64>,
    ssm: Option<f64>,
    yltp: Option<f64>,
    wltp: Option<f64>,
    vtp: Option<f64>,
    rural_hp: Option<f64>,
    rural_amp: Option<f64>,
    rhp_legacy: Option<f64>,
    last_updated: Option<String>,
}

impl CrmRecord {
    fn into_row(self) -> Result<CrmRow> {
        let metrics = [
            self.hp,
            self.amp,
            self.dsn,
            self.ssm,
            self.yltp,
            self.wltp,
            self.vtp,
            self.rural_hp,
            self.rural_amp,
            self.rhp_legacy,
        ]
        .map(Option::unwrap_or_default);
        Ok(CrmRow {
            id: CrmRowId::new(self.id),
            values: CrmValues {
                state: self.state.unwrap_or_default(),
                district: self.district.unwrap_or_default(),
                pincode: self.pincode.unwrap_or_default(),
                metrics,
            },
            last_updated: parse_opt_timestamp(self.last_updated.as_deref())
                .with_context(|| format!("CRM row {}", self.id))?,
        })
    }
}

#[derive(Debug, Serialize)]
struct CrmPayload<'a> {
    state: &'a str,
    district: &'a str,
    pincode: &'a str,
    hp: f64,
    amp: f64,
    dsn: f64,
    ssm: f64,
    yltp: f64,
    wltp: f64,
    vtp: f64,
    rural_hp: f64,
    rural_amp: f64,
    rhp_legacy: f64,
}

impl<'a> From<&'a CrmValues> for CrmPayload<'a> {
    fn from(values: &'a CrmValues) -> Self {
        let [hp, amp, dsn, ssm, yltp, wltp, vtp, rural_hp, rural_amp, rhp_legacy] =
            values.metrics;
        Self {
            state: &values.state,
            district: &values.district,
            pincode: &values.pincode,
            hp,
            amp,
            dsn,
            ssm,
            yltp,
            wltp,
            vtp,
            rural_hp,
            rural_amp,
            rhp_legacy,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReplaceRequest<'a> {
    rows: Vec<CrmPayload<'a>>,
}

// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{DebouncedFilterSet, FilterField, PINCODE_WIDTH, ScreenKind, TIER_EMPTY_SENTINEL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Case-insensitive substring match.
    ILike {
        column: &'static str,
        needle: String,
    },
    Eq {
        column: &'static str,
        value: Value,
    },
    /// Half-open numeric range `[start, end)`.
    Range {
        column: &'static str,
        start: i64,
        end: i64,
    },
    IsNull {
        column: &'static str,
    },
    AnyOf(Vec<Predicate>),
}

/// A conjunction of predicates; empty means unfiltered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub predicates: Vec<Predicate>,
}

impl Query {
    pub fn is_unfiltered(&self) -> bool {
        self.predicates.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PincodeColumn {
    Numeric(&'static str),
    Text(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub table: &'static str,
    pub id_column: &'static str,
    pub searchable: &'static [&'static str],
    pub state_column: &'static str,
    pub district_column: &'static str,
    pub pincode: PincodeColumn,
    pub tier_column: Option<&'static str>,
}

pub const REGION_SCHEMA: TableSchema = TableSchema {
    table: "Region Mapping",
    id_column: "S.No.",
    searchable: &[
        "State Name",
        "District Name",
        "SubDistrict Name",
        "Village Name",
    ],
    state_column: "State Name",
    district_column: "District Name",
    pincode: PincodeColumn::Numeric("Pincode"),
    tier_column: Some("Tier"),
};

pub const CRM_SCHEMA: TableSchema = TableSchema {
    table: "CRM Data",
    id_column: "id",
    searchable: &["state", "district", "pincode"],
    state_column: "state",
    district_column: "district",
    pincode: PincodeColumn::Text("pincode"),
    tier_column: None,
};

impl ScreenKind {
    pub const fn schema(self) -> &'static TableSchema {
        match self {
            Self::Region => &REGION_SCHEMA,
            Self::Crm => &CRM_SCHEMA,
        }
    }
}

pub fn build_query(schema: &TableSchema, filters: &DebouncedFilterSet) -> Query {
    let mut predicates = Vec::new();

    if let Some(state) = filters.get(FilterField::State) {
        predicates.push(ilike(schema.state_column, state));
    }
    if let Some(district) = filters.get(FilterField::District) {
        predicates.push(ilike(schema.district_column, district));
    }
    if let Some(pincode) = filters.get(FilterField::Pincode)
        && let Some(predicate) = pincode_predicate(schema.pincode, pincode)
    {
        predicates.push(predicate);
    }
    if let (Some(column), Some(tier)) = (schema.tier_column, filters.get(FilterField::Tier)) {
        if tier == TIER_EMPTY_SENTINEL {
            predicates.push(Predicate::IsNull { column });
        } else {
            predicates.push(Predicate::Eq {
                column,
                value: Value::Text(tier.to_owned()),
            });
        }
    }
    if let Some(search) = filters.get(FilterField::GlobalSearch) {
        let any = schema
            .searchable
            .iter()
            .map(|column| ilike(column, search))
            .collect();
        predicates.push(Predicate::AnyOf(any));
    }

    Query { predicates }
}

/// Numeric pincodes match exactly at full width and by prefix block below it.
pub fn pincode_predicate(column: PincodeColumn, digits: &str) -> Option<Predicate> {
    match column {
        PincodeColumn::Text(column) => Some(ilike(column, digits)),
        PincodeColumn::Numeric(column) => {
            let len = digits.len();
            if len == 0 || len > PINCODE_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let prefix: i64 = digits.parse().ok()?;
            if len == PINCODE_WIDTH {
                return Some(Predicate::Eq {
                    column,
                    value: Value::Int(prefix),
                });
            }
            let scale = 10_i64.pow((PINCODE_WIDTH - len) as u32);
            Some(Predicate::Range {
                column,
                start: prefix * scale,
                end: (prefix + 1) * scale,
            })
        }
    }
}

fn ilike(column: &'static str, needle: &str) -> Predicate {
    Predicate::ILike {
        column,
        needle: needle.to_owned(),
    }
}

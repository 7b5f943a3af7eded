// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::*;

pub const PAGE_SIZE: usize = 50;
pub const PINCODE_WIDTH: usize = 6;

pub const INDIAN_STATES: [&str; 36] = [
    "Andhra Pradesh",
    "Arunachal Pradesh",
    "Assam",
    "Bihar",
    "Chhattisgarh",
    "Goa",
    "Gujarat",
    "Haryana",
    "Himachal Pradesh",
    "Jharkhand",
    "Karnataka",
    "Kerala",
    "Madhya Pradesh",
    "Maharashtra",
    "Manipur",
    "Meghalaya",
    "Mizoram",
    "Nagaland",
    "Odisha",
    "Punjab",
    "Rajasthan",
    "Sikkim",
    "Tamil Nadu",
    "Telangana",
    "Tripura",
    "Uttar Pradesh",
    "Uttarakhand",
    "West Bengal",
    "Andaman and Nicobar Islands",
    "Chandigarh",
    "Dadra and Nagar Haveli and Daman and Diu",
    "Delhi",
    "Jammu and Kashmir",
    "Ladakh",
    "Lakshadweep",
    "Puducherry",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    One,
    Two,
    Three,
    Four,
}

impl Tier {
    pub const ALL: [Self; 4] = [Self::One, Self::Two, Self::Three, Self::Four];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::One => "Tier 1",
            Self::Two => "Tier 2",
            Self::Three => "Tier 3",
            Self::Four => "Tier 4",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        let digit = trimmed
            .get(..4)
            .filter(|prefix| prefix.eq_ignore_ascii_case("tier"))
            .map_or(trimmed, |_| trimmed[4..].trim());
        match digit {
            "1" => Some(Self::One),
            "2" => Some(Self::Two),
            "3" => Some(Self::Three),
            "4" => Some(Self::Four),
            _ => None,
        }
    }

    /// Steps through `None, Tier 1 .. Tier 4` with wraparound.
    pub fn cycle(current: Option<Self>, delta: isize) -> Option<Self> {
        let slots = Self::ALL.len() as isize + 1;
        let index = current.map_or(0, |tier| {
            Self::ALL
                .iter()
                .position(|candidate| *candidate == tier)
                .map_or(0, |position| position as isize + 1)
        });
        let next = (index + delta).rem_euclid(slots);
        if next == 0 {
            None
        } else {
            Some(Self::ALL[(next - 1) as usize])
        }
    }
}

/// Decodes a stored tier; blank values mean "no tier".
pub fn parse_stored_tier(raw: Option<&str>) -> Result<Option<Tier>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => match Tier::parse(value) {
            Some(tier) => Ok(Some(tier)),
            None => bail!("unknown tier value {value:?}; expected one of Tier 1..Tier 4"),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScreenKind {
    Region,
    Crm,
}

impl ScreenKind {
    pub const ALL: [Self; 2] = [Self::Region, Self::Crm];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Region => "Region Mapping",
            Self::Crm => "CRM Data",
        }
    }

    pub const fn noun(self) -> &'static str {
        match self {
            Self::Region => "region mapping data",
            Self::Crm => "CRM data",
        }
    }

    pub const fn supports_sync(self) -> bool {
        matches!(self, Self::Crm)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRow {
    pub id: RegionRowId,
    pub state_code: Option<i64>,
    pub district_code: Option<i64>,
    pub sub_district_code: Option<i64>,
    pub village_code: Option<i64>,
    pub pincode: Option<i64>,
    pub state_name: String,
    pub district_name: String,
    pub sub_district_name: String,
    pub village_name: String,
    pub tier: Option<Tier>,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CrmMetric {
    Hp,
    Amp,
    Dsn,
    Ssm,
    Yltp,
    Wltp,
    Vtp,
    RuralHp,
    RuralAmp,
    RhpLegacy,
}

impl CrmMetric {
    pub const ALL: [Self; 10] = [
        Self::Hp,
        Self::Amp,
        Self::Dsn,
        Self::Ssm,
        Self::Yltp,
        Self::Wltp,
        Self::Vtp,
        Self::RuralHp,
        Self::RuralAmp,
        Self::RhpLegacy,
    ];

    pub const fn column(self) -> &'static str {
        match self {
            Self::Hp => "hp",
            Self::Amp => "amp",
            Self::Dsn => "dsn",
            Self::Ssm => "ssm",
            Self::Yltp => "yltp",
            Self::Wltp => "wltp",
            Self::Vtp => "vtp",
            Self::RuralHp => "rural_hp",
            Self::RuralAmp => "rural_amp",
            Self::RhpLegacy => "rhp_legacy",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Hp => "HP",
            Self::Amp => "AMP",
            Self::Dsn => "DSN",
            Self::Ssm => "SSM",
            Self::Yltp => "YLTP",
            Self::Wltp => "WLTP",
            Self::Vtp => "VTP",
            Self::RuralHp => "Rural HP",
            Self::RuralAmp => "Rural AMP",
            Self::RhpLegacy => "RHP Legacy",
        }
    }

    pub fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|metric| *metric == self)
            .unwrap_or_default()
    }
}

/// The editable payload of a CRM row; also the spreadsheet row layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrmValues {
    pub state: String,
    pub district: String,
    pub pincode: String,
    pub metrics: [f64; 10],
}

impl CrmValues {
    pub fn metric(&self, metric: CrmMetric) -> f64 {
        self.metrics[metric.index()]
    }

    pub fn set_metric(&mut self, metric: CrmMetric, value: f64) {
        self.metrics[metric.index()] = value;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmRow {
    pub id: CrmRowId,
    pub values: CrmValues,
    pub last_updated: Option<OffsetDateTime>,
}

/// Rows currently shown on one screen.
#[derive(Debug, Clone, PartialEq)]
pub enum PageRows {
    Region(Vec<RegionRow>),
    Crm(Vec<CrmRow>),
}

impl PageRows {
    pub fn empty(screen: ScreenKind) -> Self {
        match screen {
            ScreenKind::Region => Self::Region(Vec::new()),
            ScreenKind::Crm => Self::Crm(Vec::new()),
        }
    }

    pub fn screen(&self) -> ScreenKind {
        match self {
            Self::Region(_) => ScreenKind::Region,
            Self::Crm(_) => ScreenKind::Crm,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Region(rows) => rows.len(),
            Self::Crm(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row_id(&self, index: usize) -> Option<i64> {
        match self {
            Self::Region(rows) => rows.get(index).map(|row| row.id.get()),
            Self::Crm(rows) => rows.get(index).map(|row| row.id.get()),
        }
    }

    pub fn position_of(&self, row_id: i64) -> Option<usize> {
        match self {
            Self::Region(rows) => rows.iter().position(|row| row.id.get() == row_id),
            Self::Crm(rows) => rows.iter().position(|row| row.id.get() == row_id),
        }
    }
}

// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use std::path::PathBuf;
use tierdesk_app::{CrmMetric, CrmValues, PINCODE_WIDTH, RegionRow, RegionRowId, Tier};

/// `(state, state code, [(district, district code, pincode prefix)])`
const GEOGRAPHY: &[(&str, i64, &[(&str, i64, i64)])] = &[
    (
        "Karnataka",
        29,
        &[
            ("Bengaluru Urban", 572, 560),
            ("Mysuru", 577, 570),
            ("Dharwad", 563, 580),
        ],
    ),
    (
        "Maharashtra",
        27,
        &[
            ("Pune", 521, 411),
            ("Mumbai Suburban", 518, 400),
            ("Nagpur", 505, 440),
        ],
    ),
    (
        "Kerala",
        32,
        &[("Ernakulam", 595, 682), ("Thiruvananthapuram", 601, 695)],
    ),
    (
        "Tamil Nadu",
        33,
        &[("Chennai", 603, 600), ("Coimbatore", 632, 641)],
    ),
    (
        "Uttar Pradesh",
        9,
        &[("Lucknow", 157, 226), ("Varanasi", 187, 221)],
    ),
    (
        "West Bengal",
        19,
        &[("Kolkata", 342, 700), ("Darjeeling", 327, 734)],
    ),
    (
        "Gujarat",
        24,
        &[("Ahmedabad", 474, 380), ("Surat", 492, 395)],
    ),
    ("Delhi", 7, &[("New Delhi", 77, 110)]),
];

const SUB_DISTRICT_SUFFIXES: [&str; 5] = ["North", "South", "East", "West", "Rural"];

const VILLAGE_STEMS: [&str; 16] = [
    "Ram", "Shiv", "Krishna", "Lakshmi", "Ganga", "Hari", "Sita", "Chandra", "Surya", "Indra",
    "Durga", "Gopal", "Madhav", "Nanda", "Kamal", "Bhim",
];
const VILLAGE_SUFFIXES: [&str; 8] = [
    "pur", "nagar", "gaon", "halli", "wadi", "palli", "garh", "kheda",
];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Deterministic region mapping and CRM fixtures.
#[derive(Debug, Clone)]
pub struct TierFaker {
    rng: DeterministicRng,
    seed: u64,
}

impl TierFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            seed: normalized,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn region_row(&mut self, id: i64) -> RegionRow {
        let (state, state_code, districts) = GEOGRAPHY[self.rng.int_n(GEOGRAPHY.len())];
        let (district, district_code, prefix) = districts[self.rng.int_n(districts.len())];
        let suffix = self.pick(&SUB_DISTRICT_SUFFIXES);
        let sub_district_code = district_code * 10 + self.int_range_i64(1, 9);

        // One row in five has no tier yet.
        let tier = if self.rng.int_n(5) == 0 {
            None
        } else {
            Some(Tier::ALL[self.rng.int_n(Tier::ALL.len())])
        };

        RegionRow {
            id: RegionRowId::new(id),
            state_code: Some(state_code),
            district_code: Some(district_code),
            sub_district_code: Some(sub_district_code),
            village_code: Some(self.int_range_i64(100_000, 999_999)),
            pincode: Some(self.pincode_in(prefix)),
            state_name: state.to_owned(),
            district_name: district.to_owned(),
            sub_district_name: format!("{district} {suffix}"),
            village_name: self.village_name(),
            tier,
            price: Some((self.int_range_i64(10, 100) * 50) as f64),
        }
    }

    /// Rows with ids `1..=count`.
    pub fn region_rows(&mut self, count: usize) -> Vec<RegionRow> {
        (1..=count as i64).map(|id| self.region_row(id)).collect()
    }

    pub fn crm_values(&mut self) -> CrmValues {
        let (state, _, districts) = GEOGRAPHY[self.rng.int_n(GEOGRAPHY.len())];
        let (district, _, prefix) = districts[self.rng.int_n(districts.len())];
        let mut values = CrmValues {
            state: state.to_owned(),
            district: district.to_owned(),
            pincode: format!("{:0width$}", self.pincode_in(prefix), width = PINCODE_WIDTH),
            metrics: [0.0; 10],
        };
        for metric in CrmMetric::ALL {
            let paise = self.int_range_i64(10_000, 500_000);
            values.set_metric(metric, paise as f64 / 100.0);
        }
        values
    }

    pub fn crm_rows(&mut self, count: usize) -> Vec<CrmValues> {
        (0..count).map(|_| self.crm_values()).collect()
    }

    fn pincode_in(&mut self, prefix: i64) -> i64 {
        prefix * 1_000 + self.int_range_i64(1, 999)
    }

    fn village_name(&mut self) -> String {
        format!(
            "{}{}",
            self.pick(&VILLAGE_STEMS),
            self.pick(&VILLAGE_SUFFIXES)
        )
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn int_range_i64(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = max - min + 1;
        min + (self.rng.next_u64() % (span as u64)) as i64
    }
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("tierdesk.db");
    Ok((dir, db_path))
}

pub fn states() -> impl Iterator<Item = &'static str> {
    GEOGRAPHY.iter().map(|(state, _, _)| *state)
}

// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use tierdesk_app::{CrmMetric, CrmRowId, CrmValues, PINCODE_WIDTH, RegionRow, RegionRowId, Tier};
use tracing::info;

use crate::Store;

/// `(state, state code, district, district code, pincode prefix)`
const DEMO_DISTRICTS: [(&str, i64, &str, i64, i64); 10] = [
    ("Karnataka", 29, "Bengaluru Urban", 572, 560),
    ("Karnataka", 29, "Mysuru", 577, 570),
    ("Maharashtra", 27, "Pune", 521, 411),
    ("Maharashtra", 27, "Nagpur", 505, 440),
    ("Kerala", 32, "Ernakulam", 595, 682),
    ("Tamil Nadu", 33, "Chennai", 603, 600),
    ("Uttar Pradesh", 9, "Lucknow", 157, 226),
    ("West Bengal", 19, "Kolkata", 342, 700),
    ("Gujarat", 24, "Surat", 492, 395),
    ("Delhi", 7, "New Delhi", 77, 110),
];

const DEMO_VILLAGES: [&str; 12] = [
    "Rampur",
    "Shivnagar",
    "Krishnagaon",
    "Lakshmihalli",
    "Gangawadi",
    "Haripalli",
    "Sitagarh",
    "Chandrakheda",
    "Suryapur",
    "Durganagar",
    "Gopalgaon",
    "Nandahalli",
];

const DEMO_BLOCKS: [&str; 4] = ["North", "South", "East", "West"];

impl Store {
    /// Fills an empty database with fixed region rows and CRM rows with ids
    /// starting at 1. Returns the CRM values in id order.
    pub fn seed_demo_data(&self, region_rows: usize, crm_rows: usize) -> Result<Vec<CrmValues>> {
        let tx = self
            .raw_connection()
            .unchecked_transaction()
            .context("begin demo seed transaction")?;
        for index in 0..region_rows {
            let id = i64::try_from(index + 1).context("demo row count overflow")?;
            self.insert_region_row(&demo_region_row(id))?;
        }
        let crm = (0..crm_rows).map(demo_crm_values).collect::<Vec<_>>();
        for (index, values) in crm.iter().enumerate() {
            let id = i64::try_from(index + 1).context("demo row count overflow")?;
            self.insert_crm_row(CrmRowId::new(id), values)?;
        }
        tx.commit().context("commit demo seed")?;
        info!(region_rows, crm_rows, "seeded demo data");
        Ok(crm)
    }
}

fn demo_region_row(id: i64) -> RegionRow {
    let slot = id.unsigned_abs() as usize;
    let (state, state_code, district, district_code, prefix) =
        DEMO_DISTRICTS[slot % DEMO_DISTRICTS.len()];
    let block = DEMO_BLOCKS[slot % DEMO_BLOCKS.len()];

    // Every fifth row is still untiered.
    let tier = if id % 5 == 0 {
        None
    } else {
        Some(Tier::ALL[slot % Tier::ALL.len()])
    };

    RegionRow {
        id: RegionRowId::new(id),
        state_code: Some(state_code),
        district_code: Some(district_code),
        sub_district_code: Some(district_code * 10 + (id % 9) + 1),
        village_code: Some(100_000 + id * 37 % 900_000),
        pincode: Some(demo_pincode(prefix, id)),
        state_name: state.to_owned(),
        district_name: district.to_owned(),
        sub_district_name: format!("{district} {block}"),
        village_name: DEMO_VILLAGES[slot % DEMO_VILLAGES.len()].to_owned(),
        tier,
        price: Some(((id % 19) + 1) as f64 * 250.0),
    }
}

fn demo_crm_values(index: usize) -> CrmValues {
    let (state, _, district, _, prefix) = DEMO_DISTRICTS[(index * 3) % DEMO_DISTRICTS.len()];
    let mut values = CrmValues {
        state: state.to_owned(),
        district: district.to_owned(),
        pincode: format!(
            "{:0width$}",
            demo_pincode(prefix, index as i64 + 1),
            width = PINCODE_WIDTH
        ),
        metrics: [0.0; 10],
    };
    for (position, metric) in CrmMetric::ALL.into_iter().enumerate() {
        let paise = 10_000 + ((index * 7919 + position * 104_729) % 490_000);
        values.set_metric(metric, paise as f64 / 100.0);
    }
    values
}

fn demo_pincode(prefix: i64, id: i64) -> i64 {
    prefix * 1_000 + (id * 13 % 999) + 1
}

#[cfg(test)]
mod tests {
    use super::{demo_crm_values, demo_region_row};

    #[test]
    fn demo_rows_are_stable() {
        assert_eq!(demo_region_row(12), demo_region_row(12));
        assert_eq!(demo_crm_values(4), demo_crm_values(4));
    }

    #[test]
    fn every_fifth_region_row_has_no_tier() {
        assert_eq!(demo_region_row(5).tier, None);
        assert_eq!(demo_region_row(10).tier, None);
        assert!(demo_region_row(6).tier.is_some());
    }

    #[test]
    fn demo_pincodes_are_six_digits() {
        for id in 1..=200 {
            let pincode = demo_region_row(id).pincode.unwrap_or_default();
            assert!((100_000..1_000_000).contains(&pincode), "{pincode}");
        }
        for index in 0..200 {
            assert_eq!(demo_crm_values(index).pincode.len(), 6);
        }
    }
}

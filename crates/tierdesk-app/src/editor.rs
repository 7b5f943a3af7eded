// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{CrmMetric, CrmRow, CrmRowId, CrmValues, RegionRow, RegionRowId, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    Tier,
    State,
    District,
    Pincode,
    Metric(CrmMetric),
}

impl EditField {
    pub const CRM: [Self; 13] = [
        Self::State,
        Self::District,
        Self::Pincode,
        Self::Metric(CrmMetric::Hp),
        Self::Metric(CrmMetric::Amp),
        Self::Metric(CrmMetric::Dsn),
        Self::Metric(CrmMetric::Ssm),
        Self::Metric(CrmMetric::Yltp),
        Self::Metric(CrmMetric::Wltp),
        Self::Metric(CrmMetric::Vtp),
        Self::Metric(CrmMetric::RuralHp),
        Self::Metric(CrmMetric::RuralAmp),
        Self::Metric(CrmMetric::RhpLegacy),
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Tier => "Tier",
            Self::State => "State",
            Self::District => "District",
            Self::Pincode => "Pincode",
            Self::Metric(metric) => metric.label(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionEdit {
    pub tier: Option<Tier>,
}

/// CRM values held as raw text until commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrmEdit {
    pub state: String,
    pub district: String,
    pub pincode: String,
    pub metrics: [String; 10],
}

impl CrmEdit {
    fn from_values(values: &CrmValues) -> Self {
        Self {
            state: values.state.clone(),
            district: values.district.clone(),
            pincode: values.pincode.clone(),
            metrics: values.metrics.map(format_metric),
        }
    }

    pub fn field(&self, field: EditField) -> &str {
        match field {
            EditField::State => &self.state,
            EditField::District => &self.district,
            EditField::Pincode => &self.pincode,
            EditField::Metric(metric) => &self.metrics[metric.index()],
            EditField::Tier => "",
        }
    }

    fn values(&self) -> CrmValues {
        let mut metrics = [0.0; 10];
        for (slot, raw) in metrics.iter_mut().zip(&self.metrics) {
            *slot = parse_metric(raw);
        }
        CrmValues {
            state: self.state.trim().to_owned(),
            district: self.district.trim().to_owned(),
            pincode: self.pincode.trim().to_owned(),
            metrics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditBuffer {
    Region(RegionEdit),
    Crm(CrmEdit),
}

/// A typed row update ready for the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum RowUpdate {
    Region {
        id: RegionRowId,
        tier: Option<Tier>,
    },
    Crm {
        id: CrmRowId,
        values: CrmValues,
    },
}

impl RowUpdate {
    pub fn row_id(&self) -> i64 {
        match self {
            Self::Region { id, .. } => id.get(),
            Self::Crm { id, .. } => id.get(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RowEditor {
    #[default]
    Idle,
    Editing {
        row_id: i64,
        buffer: EditBuffer,
        error: Option<String>,
        saving: bool,
    },
}

impl RowEditor {
    pub fn begin_region(&mut self, row: &RegionRow) {
        *self = Self::Editing {
            row_id: row.id.get(),
            buffer: EditBuffer::Region(RegionEdit { tier: row.tier }),
            error: None,
            saving: false,
        };
    }

    pub fn begin_crm(&mut self, row: &CrmRow) {
        *self = Self::Editing {
            row_id: row.id.get(),
            buffer: EditBuffer::Crm(CrmEdit::from_values(&row.values)),
            error: None,
            saving: false,
        };
    }

    pub fn is_editing(&self) -> bool {
        matches!(self, Self::Editing { .. })
    }

    pub fn editing_row(&self) -> Option<i64> {
        match self {
            Self::Editing { row_id, .. } => Some(*row_id),
            Self::Idle => None,
        }
    }

    pub fn buffer(&self) -> Option<&EditBuffer> {
        match self {
            Self::Editing { buffer, .. } => Some(buffer),
            Self::Idle => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Editing { error, .. } => error.as_deref(),
            Self::Idle => None,
        }
    }

    pub fn is_saving(&self) -> bool {
        matches!(self, Self::Editing { saving: true, .. })
    }

    /// Returns false when idle or when the field does not belong to the buffer.
    pub fn set_field(&mut self, field: EditField, text: &str) -> bool {
        let Self::Editing { buffer, .. } = self else {
            return false;
        };
        match (buffer, field) {
            (EditBuffer::Region(edit), EditField::Tier) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    edit.tier = None;
                    return true;
                }
                match Tier::parse(trimmed) {
                    Some(tier) => {
                        edit.tier = Some(tier);
                        true
                    }
                    None => false,
                }
            }
            (EditBuffer::Crm(edit), EditField::State) => replace(&mut edit.state, text),
            (EditBuffer::Crm(edit), EditField::District) => replace(&mut edit.district, text),
            (EditBuffer::Crm(edit), EditField::Pincode) => replace(&mut edit.pincode, text),
            (EditBuffer::Crm(edit), EditField::Metric(metric)) => {
                replace(&mut edit.metrics[metric.index()], text)
            }
            _ => false,
        }
    }

    pub fn cycle_tier(&mut self, delta: isize) -> bool {
        let Self::Editing {
            buffer: EditBuffer::Region(edit),
            ..
        } = self
        else {
            return false;
        };
        edit.tier = Tier::cycle(edit.tier, delta);
        true
    }

    /// Builds the typed update and marks the edit as saving.
    pub fn commit(&mut self) -> Option<RowUpdate> {
        let Self::Editing {
            row_id,
            buffer,
            error,
            saving,
        } = self
        else {
            return None;
        };
        if *saving {
            return None;
        }
        *saving = true;
        *error = None;
        Some(match buffer {
            EditBuffer::Region(edit) => RowUpdate::Region {
                id: RegionRowId::new(*row_id),
                tier: edit.tier,
            },
            EditBuffer::Crm(edit) => RowUpdate::Crm {
                id: CrmRowId::new(*row_id),
                values: edit.values(),
            },
        })
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        if let Self::Editing { error, saving, .. } = self {
            *error = Some(message.into());
            *saving = false;
        }
    }

    pub fn finish(&mut self) {
        *self = Self::Idle;
    }

    pub fn cancel(&mut self) -> bool {
        let was_editing = self.is_editing();
        *self = Self::Idle;
        was_editing
    }
}

/// Parses a metric cell; anything that is not a finite number becomes zero.
pub fn parse_metric(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

fn format_metric(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn replace(slot: &mut String, text: &str) -> bool {
    text.clone_into(slot);
    true
}

// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::{PINCODE_WIDTH, ScreenKind};

pub const MIN_FILTER_CHARS: usize = 3;
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

/// Tier dropdown value that selects rows with no tier at all.
pub const TIER_EMPTY_SENTINEL: &str = "empty";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterField {
    GlobalSearch,
    State,
    District,
    Pincode,
    Tier,
}

impl FilterField {
    pub const fn label(self) -> &'static str {
        match self {
            Self::GlobalSearch => "Global Search",
            Self::State => "State",
            Self::District => "District",
            Self::Pincode => "Pincode",
            Self::Tier => "Tier",
        }
    }

    /// Dropdown fields skip both the length gate and the debounce delay.
    pub const fn is_dropdown(self) -> bool {
        matches!(self, Self::Tier)
    }

    pub fn for_screen(screen: ScreenKind) -> &'static [Self] {
        match screen {
            ScreenKind::Region => &[
                Self::GlobalSearch,
                Self::State,
                Self::District,
                Self::Pincode,
                Self::Tier,
            ],
            ScreenKind::Crm => &[
                Self::GlobalSearch,
                Self::State,
                Self::District,
                Self::Pincode,
            ],
        }
    }
}

/// Keeps digits only, capped at the canonical pincode width.
pub fn sanitize_pincode(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_digit)
        .take(PINCODE_WIDTH)
        .collect()
}

/// The value a field contributes to a query, or `None` when it is inactive.
pub fn gate(field: FilterField, value: &str) -> Option<String> {
    if value.is_empty() {
        return None;
    }
    if field.is_dropdown() || value.chars().count() >= MIN_FILTER_CHARS {
        return Some(value.to_owned());
    }
    None
}

pub fn length_hint(field: FilterField, value: &str) -> Option<&'static str> {
    let len = value.chars().count();
    if field.is_dropdown() || len == 0 || len >= MIN_FILTER_CHARS {
        return None;
    }
    Some(match field {
        FilterField::Pincode => "type at least 3 digits to search",
        _ => "type at least 3 characters to search",
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    values: BTreeMap<FilterField, String>,
}

impl FilterSet {
    pub fn get(&self, field: FilterField) -> &str {
        self.values.get(&field).map_or("", String::as_str)
    }

    /// Stores a raw value and reports whether anything changed.
    pub fn set(&mut self, field: FilterField, value: &str) -> bool {
        let value = match field {
            FilterField::Pincode => sanitize_pincode(value),
            _ => value.to_owned(),
        };
        if self.get(field) == value {
            return false;
        }
        if value.is_empty() {
            self.values.remove(&field);
        } else {
            self.values.insert(field, value);
        }
        true
    }

    pub fn clear(&mut self) -> bool {
        let changed = !self.values.is_empty();
        self.values.clear();
        changed
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.values.len()
    }

    pub fn debounced(&self) -> DebouncedFilterSet {
        let values = self
            .values
            .iter()
            .filter_map(|(field, value)| gate(*field, value).map(|value| (*field, value)))
            .collect();
        DebouncedFilterSet { values }
    }
}

/// The gated filter snapshot that queries are built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebouncedFilterSet {
    values: BTreeMap<FilterField, String>,
}

impl DebouncedFilterSet {
    pub fn get(&self, field: FilterField) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// Cancel-and-reschedule timer handle. Nothing fires after `cancel` or drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_DELAY)
    }
}

impl Debouncer {
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Raw filter input plus the debounced snapshot derived from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    raw: FilterSet,
    applied: DebouncedFilterSet,
    debouncer: Debouncer,
}

impl FilterState {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            debouncer: Debouncer::new(delay),
            ..Self::default()
        }
    }

    pub fn raw(&self) -> &FilterSet {
        &self.raw
    }

    pub fn applied(&self) -> &DebouncedFilterSet {
        &self.applied
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Returns true when the applied snapshot changed right away.
    pub fn update(&mut self, field: FilterField, value: &str, now: Instant) -> bool {
        if !self.raw.set(field, value) {
            return false;
        }
        if field.is_dropdown() {
            self.debouncer.cancel();
            return self.apply();
        }
        self.debouncer.schedule(now);
        false
    }

    pub fn clear(&mut self, now: Instant) {
        if self.raw.clear() {
            self.debouncer.schedule(now);
        }
    }

    /// Applies the pending snapshot once the delay has elapsed.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.debouncer.fire(now) {
            return self.apply();
        }
        false
    }

    fn apply(&mut self) -> bool {
        let next = self.raw.debounced();
        if next == self.applied {
            return false;
        }
        self.applied = next;
        true
    }
}

// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod demo;
mod rest;
mod session;
mod store;

pub use rest::RestBackend;
pub use session::{SessionStore, passphrase_digest};
pub use store::Store;

use anyhow::{Context, Result, anyhow, bail};
use std::env;
use std::fs;
use std::path::PathBuf;
use tierdesk_app::{
    CrmRow, CrmRowId, CrmValues, FetchRequest, FetchResult, PageRange, PageRows, Query,
    RegionRow, RegionRowId, ScreenKind, Tier,
};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

pub const APP_NAME: &str = "tierdesk";

/// The relational backend the screens read from and write to.
pub trait Backend {
    fn count_rows(&self, screen: ScreenKind, query: &Query) -> Result<usize>;

    /// Rows ordered ascending by `S.No.`.
    fn list_region_rows(&self, query: &Query, range: PageRange) -> Result<Vec<RegionRow>>;

    /// Rows ordered ascending by `id`.
    fn list_crm_rows(&self, query: &Query, range: PageRange) -> Result<Vec<CrmRow>>;

    fn update_region_tier(&self, id: RegionRowId, tier: Option<Tier>) -> Result<()>;

    fn update_crm_row(
        &self,
        id: CrmRowId,
        values: &CrmValues,
        updated_at: OffsetDateTime,
    ) -> Result<()>;

    /// Replaces every CRM row in one transaction. Rows get ids `1..=len`.
    fn replace_crm_rows(&self, rows: &[CrmValues]) -> Result<usize>;
}

/// Count under the request's predicates, then read the page slice.
pub fn fetch_page(backend: &dyn Backend, request: &FetchRequest) -> Result<FetchResult> {
    let total_rows = backend
        .count_rows(request.screen, &request.query)
        .with_context(|| format!("count {}", request.screen.noun()))?;
    let rows = match request.screen {
        ScreenKind::Region => PageRows::Region(
            backend
                .list_region_rows(&request.query, request.range)
                .context("load region mapping page")?,
        ),
        ScreenKind::Crm => PageRows::Crm(
            backend
                .list_crm_rows(&request.query, request.range)
                .context("load CRM page")?,
        ),
    };
    Ok(FetchResult { total_rows, rows })
}

pub fn data_dir() -> Result<PathBuf> {
    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set TIERDESK_DB_PATH to a writable database path")
    })?;
    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir)
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("TIERDESK_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }
    Ok(data_dir()?.join("tierdesk.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); set backend.url for a hosted backend instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

pub(crate) fn format_timestamp(value: OffsetDateTime) -> Result<String> {
    value.format(&Rfc3339).context("format timestamp")
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<OffsetDateTime> {
    let trimmed = raw.trim();
    if let Ok(value) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(value);
    }

    // `timestamp without time zone` columns come back without an offset.
    if let Ok(value) = PrimitiveDateTime::parse(
        trimmed,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    ) {
        return Ok(value.assume_utc());
    }
    if let Ok(value) = PrimitiveDateTime::parse(
        trimmed,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Ok(value.assume_utc());
    }

    bail!("unsupported timestamp format {raw:?}")
}

pub(crate) fn parse_opt_timestamp(raw: Option<&str>) -> Result<Option<OffsetDateTime>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_timestamp(value).map(Some),
    }
}

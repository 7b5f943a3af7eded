// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod auth;

pub use auth::{AccessToken, REFRESH_MARGIN, SPREADSHEETS_SCOPE, ServiceAccount, TokenSource};

use anyhow::{Context, Result, anyhow, bail};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tierdesk_app::{CrmMetric, CrmRowId, CrmValues, parse_metric};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_API_URL: &str = "https://sheets.googleapis.com/v4";

/// Columns `A..N`: state, district, pincode, ten metrics, last updated.
pub const SHEET_COLUMNS: usize = 14;

const FIRST_COLUMN: &str = "A";
const LAST_COLUMN: &str = "N";
const HEADER_ROWS: usize = 1;

/// The spreadsheet side of CRM editing and sync.
pub trait RowMirror: Send + Sync {
    /// Every data row below the header, in sheet order.
    fn read_rows(&self) -> Result<Vec<CrmValues>>;

    /// Overwrites data row `index` (zero-based, header excluded).
    fn write_row(&self, index: usize, values: &CrmValues, updated_at: OffsetDateTime)
    -> Result<()>;

    fn append_row(&self, values: &CrmValues, updated_at: OffsetDateTime) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SheetsClient {
    api_url: Url,
    spreadsheet_id: String,
    sheet_name: Option<String>,
    timeout: Duration,
    tokens: TokenSource,
    http: HttpClient,
}

impl SheetsClient {
    pub fn new(
        api_url: &str,
        spreadsheet_id: &str,
        sheet_name: Option<&str>,
        tokens: TokenSource,
        timeout: Duration,
    ) -> Result<Self> {
        let trimmed = api_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            bail!("sheets.api_url must not be empty");
        }
        if spreadsheet_id.trim().is_empty() {
            bail!("sheets.spreadsheet_id must not be empty");
        }
        let api_url = Url::parse(&format!("{trimmed}/"))
            .with_context(|| format!("parse sheets.api_url {api_url:?}"))?;

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            api_url,
            spreadsheet_id: spreadsheet_id.trim().to_owned(),
            sheet_name: sheet_name
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned),
            timeout,
            tokens,
            http,
        })
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// A1 notation, qualified with the sheet name when one is configured.
    fn a1(&self, cells: &str) -> String {
        match &self.sheet_name {
            Some(name) => format!("'{}'!{cells}", name.replace('\'', "''")),
            None => cells.to_owned(),
        }
    }

    fn values_url(&self, range: &str) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("sheets.api_url {} cannot be a base", self.api_url))?
            .pop_if_empty()
            .extend(["spreadsheets", self.spreadsheet_id.as_str(), "values", range]);
        Ok(url)
    }

    /// Sends with a bearer token, retrying once with a fresh token on 401.
    fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let retry = builder.try_clone();
        let response = self.send_once(builder)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response);
        }

        let Some(retry) = retry else {
            return check_status(response);
        };
        warn!("spreadsheet rejected cached token; refreshing");
        self.tokens.invalidate();
        check_status(self.send_once(retry)?)
    }

    fn send_once(&self, builder: RequestBuilder) -> Result<Response> {
        let token = self.tokens.bearer_token()?;
        builder
            .bearer_auth(token)
            .send()
            .map_err(|error| connection_error(self.api_url.as_str(), error))
    }

    pub fn read_rows(&self) -> Result<Vec<CrmValues>> {
        let range = self.a1(&format!("{FIRST_COLUMN}:{LAST_COLUMN}"));
        let mut url = self.values_url(&range)?;
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");
        debug!(%url, "read sheet rows");

        let response = self.send(self.http.get(url))?;
        let parsed: ValueRange = response.json().context("decode sheet values")?;
        let rows: Vec<CrmValues> = parsed
            .values
            .iter()
            .skip(HEADER_ROWS)
            .map(|row| parse_sheet_row(row))
            .collect();
        info!(rows = rows.len(), "read CRM rows from sheet");
        Ok(rows)
    }

    pub fn write_row(
        &self,
        index: usize,
        values: &CrmValues,
        updated_at: OffsetDateTime,
    ) -> Result<()> {
        let row = sheet_row_number(index);
        let range = self.a1(&format!("{FIRST_COLUMN}{row}:{LAST_COLUMN}{row}"));
        let mut url = self.values_url(&range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let body = ValueRangeBody {
            range: &range,
            major_dimension: "ROWS",
            values: vec![row_cells(values, updated_at)?],
        };
        self.send(self.http.put(url).json(&body))
            .with_context(|| format!("write sheet row {row}"))?;
        debug!(row, "wrote sheet row");
        Ok(())
    }

    pub fn append_row(&self, values: &CrmValues, updated_at: OffsetDateTime) -> Result<()> {
        let range = self.a1(&format!("{FIRST_COLUMN}:{LAST_COLUMN}"));
        let mut url = self.values_url(&format!("{range}:append"))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let body = ValueRangeBody {
            range: &range,
            major_dimension: "ROWS",
            values: vec![row_cells(values, updated_at)?],
        };
        self.send(self.http.post(url).json(&body))
            .context("append sheet row")?;
        Ok(())
    }
}

impl RowMirror for SheetsClient {
    fn read_rows(&self) -> Result<Vec<CrmValues>> {
        SheetsClient::read_rows(self)
    }

    fn write_row(
        &self,
        index: usize,
        values: &CrmValues,
        updated_at: OffsetDateTime,
    ) -> Result<()> {
        SheetsClient::write_row(self, index, values, updated_at)
    }

    fn append_row(&self, values: &CrmValues, updated_at: OffsetDateTime) -> Result<()> {
        SheetsClient::append_row(self, values, updated_at)
    }
}

/// One-based sheet row for a zero-based data index.
pub fn sheet_row_number(index: usize) -> usize {
    index + HEADER_ROWS + 1
}

/// CRM row ids start at 1 and line up with data rows below the header.
pub fn row_index_for(id: CrmRowId) -> Result<usize> {
    let raw = id.get();
    if raw < 1 {
        bail!("CRM row id {raw} has no spreadsheet row");
    }
    usize::try_from(raw - 1).with_context(|| format!("CRM row id {raw} out of range"))
}

/// Missing cells read as empty text or zero.
pub fn parse_sheet_row(cells: &[serde_json::Value]) -> CrmValues {
    let text = |index: usize| cells.get(index).map(cell_text).unwrap_or_default();
    let mut values = CrmValues {
        state: text(0).trim().to_owned(),
        district: text(1).trim().to_owned(),
        pincode: text(2).trim().to_owned(),
        metrics: [0.0; 10],
    };
    for metric in CrmMetric::ALL {
        values.set_metric(metric, parse_metric(&text(3 + metric.index())));
    }
    values
}

fn cell_text(cell: &serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Number(number) => number.to_string(),
        serde_json::Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    }
}

pub fn row_cells(values: &CrmValues, updated_at: OffsetDateTime) -> Result<Vec<String>> {
    let mut cells = Vec::with_capacity(SHEET_COLUMNS);
    cells.push(values.state.clone());
    cells.push(values.district.clone());
    cells.push(values.pincode.clone());
    cells.extend(values.metrics.iter().map(f64::to_string));
    cells.push(
        updated_at
            .format(&Rfc3339)
            .context("format last updated timestamp")?,
    );
    Ok(cells)
}

pub(crate) fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    anyhow!(
        "cannot reach {} -- check sheets settings and your network ({})",
        base_url,
        error
    )
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(clean_error_response(status, &body))
}

pub(crate) fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body)
        && let Some(error) = parsed.error
    {
        match error {
            ErrorBody::Api { message } if !message.is_empty() => {
                return anyhow!("server error ({}): {message}", status.as_u16());
            }
            ErrorBody::Code(code) if !code.is_empty() => {
                return match parsed.error_description.filter(|desc| !desc.is_empty()) {
                    Some(description) => {
                        anyhow!("server error ({}): {code}: {description}", status.as_u16())
                    }
                    None => anyhow!("server error ({}): {code}", status.as_u16()),
                };
            }
            _ => {}
        }
    }

    if body.len() < 100 && !body.contains('{') && !body.trim().is_empty() {
        return anyhow!("server error ({}): {}", status.as_u16(), body.trim());
    }

    anyhow!("server returned {}", status.as_u16())
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRangeBody<'a> {
    range: &'a str,
    major_dimension: &'a str,
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
    error_description: Option<String>,
}

/// Sheets API errors are objects; OAuth token errors are bare codes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Api { message: String },
    Code(String),
}

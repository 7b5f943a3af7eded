// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use std::io::Read;
use std::thread;
use std::time::Duration;
use tierdesk_app::{
    CrmRowId, FetchRequest, FilterField, FilterSet, PageRange, PageRows, Query, RegionRowId,
    ScreenKind, Tier, build_query,
};
use tierdesk_db::{Backend, RestBackend, fetch_page};
use tierdesk_testkit::TierFaker;
use time::macros::datetime;
use tiny_http::{Header, Method, Request, Response, Server};
use url::Url;

const KEY: &str = "anon-key";

fn mock_server() -> Result<(Server, String)> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}/rest/v1", server.server_addr());
    Ok((server, addr))
}

fn header<'a>(request: &'a Request, name: &'static str) -> Option<&'a str> {
    request
        .headers()
        .iter()
        .find(|header| header.field.equiv(name))
        .map(|header| header.value.as_str())
}

fn query_pairs(request: &Request) -> Vec<(String, String)> {
    let url = Url::parse(&format!("http://mock{}", request.url())).expect("request url parses");
    url.query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

fn path(request: &Request) -> String {
    request
        .url()
        .split_once('?')
        .map_or(request.url(), |(path, _)| path)
        .to_owned()
}

fn json_response(body: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(body).with_header(
        Header::from_bytes("Content-Type", "application/json").expect("valid content type header"),
    )
}

fn assert_authorized(request: &Request) {
    assert_eq!(header(request, "apikey"), Some(KEY));
    assert_eq!(
        header(request, "Authorization"),
        Some(format!("Bearer {KEY}").as_str())
    );
}

#[test]
fn unreachable_backend_error_names_the_setting() {
    let backend = RestBackend::new("http://127.0.0.1:1/rest/v1", KEY, Duration::from_millis(50))
        .expect("backend should initialize");

    let error = backend
        .count_rows(ScreenKind::Region, &Query::default())
        .expect_err("count should fail for unreachable endpoint");
    assert!(error.to_string().contains("check backend.url"));
}

#[test]
fn new_rejects_blank_key() {
    assert!(RestBackend::new("http://localhost", "  ", Duration::from_secs(1)).is_err());
    assert!(RestBackend::new("", KEY, Duration::from_secs(1)).is_err());
}

#[test]
fn fetch_page_counts_then_lists_with_filters() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let count = server.recv().expect("count request expected");
        assert_eq!(count.method(), &Method::Get);
        assert_eq!(path(&count), "/rest/v1/Region%20Mapping");
        assert_authorized(&count);
        assert_eq!(header(&count, "Prefer"), Some("count=exact"));
        let pairs = query_pairs(&count);
        assert!(pairs.contains(&("\"State Name\"".to_owned(), "ilike.*karna*".to_owned())));
        assert!(pairs.contains(&("Tier".to_owned(), "eq.Tier 2".to_owned())));
        assert!(pairs.contains(&("limit".to_owned(), "0".to_owned())));
        count
            .respond(
                json_response("[]").with_header(
                    Header::from_bytes("Content-Range", "*/73").expect("valid range header"),
                ),
            )
            .expect("response should succeed");

        let list = server.recv().expect("list request expected");
        assert_authorized(&list);
        let pairs = query_pairs(&list);
        assert!(pairs.contains(&("order".to_owned(), "\"S.No.\".asc".to_owned())));
        assert!(pairs.contains(&("offset".to_owned(), "50".to_owned())));
        assert!(pairs.contains(&("limit".to_owned(), "50".to_owned())));
        let body = r#"[
            {"S.No.": 51, "State Code": 29, "District Code": 572, "SubDistrict Code": 5721,
             "Village Code": 123456, "Pincode": 560001, "State Name": "Karnataka",
             "District Name": "Bengaluru Urban", "SubDistrict Name": "Bengaluru North",
             "Village Name": "Ramnagar", "Tier": "Tier 2", "Price": 1500.0},
            {"S.No.": 52, "State Code": null, "District Code": null, "SubDistrict Code": null,
             "Village Code": null, "Pincode": null, "State Name": "Karnataka",
             "District Name": null, "SubDistrict Name": null, "Village Name": null,
             "Tier": "Tier 2", "Price": null}
        ]"#;
        list.respond(json_response(body))
            .expect("response should succeed");
    });

    let mut filters = FilterSet::default();
    filters.set(FilterField::State, "karna");
    filters.set(FilterField::Tier, Tier::Two.as_str());
    let backend = RestBackend::new(&addr, KEY, Duration::from_secs(2))?;
    let result = fetch_page(
        &backend,
        &FetchRequest {
            screen: ScreenKind::Region,
            seq: 4,
            query: build_query(ScreenKind::Region.schema(), &filters.debounced()),
            range: PageRange {
                offset: 50,
                limit: 50,
            },
            initial: false,
        },
    )?;

    assert_eq!(result.total_rows, 73);
    let PageRows::Region(rows) = result.rows else {
        panic!("expected region rows");
    };
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, RegionRowId::new(51));
    assert_eq!(rows[0].pincode, Some(560_001));
    assert_eq!(rows[1].district_name, "");
    assert_eq!(rows[1].tier, Some(Tier::Two));

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn crm_rows_default_missing_metrics_to_zero() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert_eq!(path(&request), "/rest/v1/CRM%20Data");
        let pairs = query_pairs(&request);
        assert!(pairs.contains(&("order".to_owned(), "id.asc".to_owned())));
        let body = r#"[{"id": 1, "state": "Goa", "district": "North Goa", "pincode": "403001",
            "hp": 10.5, "amp": null, "dsn": 3, "ssm": 0, "yltp": 0, "wltp": 0, "vtp": 0,
            "rural_hp": 0, "rural_amp": 0, "rhp_legacy": 0,
            "last_updated": "2026-03-01T10:00:00+00:00"}]"#;
        request
            .respond(json_response(body))
            .expect("response should succeed");
    });

    let backend = RestBackend::new(&addr, KEY, Duration::from_secs(2))?;
    let rows = backend.list_crm_rows(
        &Query::default(),
        PageRange {
            offset: 0,
            limit: 50,
        },
    )?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values.metrics[0], 10.5);
    assert_eq!(rows[0].values.metrics[1], 0.0);
    assert_eq!(rows[0].values.metrics[2], 3.0);
    assert_eq!(
        rows[0].last_updated,
        Some(datetime!(2026-03-01 10:00:00 UTC))
    );

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn update_tier_patches_by_quoted_id_and_detects_missing_rows() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let mut found = server.recv().expect("first patch expected");
        assert_eq!(found.method(), &Method::Patch);
        assert_eq!(header(&found, "Prefer"), Some("return=representation"));
        assert!(query_pairs(&found).contains(&("\"S.No.\"".to_owned(), "eq.12".to_owned())));
        let mut body = String::new();
        found
            .as_reader()
            .read_to_string(&mut body)
            .expect("body should be readable");
        let parsed: serde_json::Value = serde_json::from_str(&body).expect("json body");
        assert_eq!(parsed["Tier"], serde_json::Value::Null);
        found
            .respond(json_response(r#"[{"S.No.": 12}]"#))
            .expect("response should succeed");

        let missing = server.recv().expect("second patch expected");
        missing
            .respond(json_response("[]"))
            .expect("response should succeed");
    });

    let backend = RestBackend::new(&addr, KEY, Duration::from_secs(2))?;
    backend.update_region_tier(RegionRowId::new(12), None)?;
    let error = backend
        .update_region_tier(RegionRowId::new(13), Some(Tier::One))
        .expect_err("empty representation means not found");
    assert!(format!("{error:#}").contains("row 13 not found"));

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn update_crm_row_sends_values_and_timestamp() -> Result<()> {
    let (server, addr) = mock_server()?;
    let values = TierFaker::new(3).crm_values();
    let expected_state = values.state.clone();

    let handle = thread::spawn(move || {
        let mut request = server.recv().expect("patch expected");
        assert!(query_pairs(&request).contains(&("id".to_owned(), "eq.8".to_owned())));
        let mut body = String::new();
        request
            .as_reader()
            .read_to_string(&mut body)
            .expect("body should be readable");
        let parsed: serde_json::Value = serde_json::from_str(&body).expect("json body");
        assert_eq!(parsed["state"], serde_json::Value::String(expected_state));
        assert!(parsed["hp"].is_number());
        assert!(
            parsed["last_updated"]
                .as_str()
                .is_some_and(|stamp| stamp.starts_with("2026-04-02T09:30:00"))
        );
        request
            .respond(json_response(r#"[{"id": 8}]"#))
            .expect("response should succeed");
    });

    let backend = RestBackend::new(&addr, KEY, Duration::from_secs(2))?;
    backend.update_crm_row(
        CrmRowId::new(8),
        &values,
        datetime!(2026-04-02 09:30:00 UTC),
    )?;

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn replace_calls_rpc_with_all_rows() -> Result<()> {
    let (server, addr) = mock_server()?;
    let rows = TierFaker::new(21).crm_rows(3);

    let handle = thread::spawn(move || {
        let mut request = server.recv().expect("rpc expected");
        assert_eq!(request.method(), &Method::Post);
        assert_eq!(path(&request), "/rest/v1/rpc/replace_crm_rows");
        assert_authorized(&request);
        let mut body = String::new();
        request
            .as_reader()
            .read_to_string(&mut body)
            .expect("body should be readable");
        let parsed: serde_json::Value = serde_json::from_str(&body).expect("json body");
        assert_eq!(parsed["rows"].as_array().map(Vec::len), Some(3));
        request
            .respond(json_response("3"))
            .expect("response should succeed");
    });

    let backend = RestBackend::new(&addr, KEY, Duration::from_secs(2))?;
    assert_eq!(backend.replace_crm_rows(&rows)?, 3);

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn error_envelope_is_condensed() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        let body = r#"{"code":"42703","message":"column \"Tierr\" does not exist","hint":"Perhaps you meant \"Tier\""}"#;
        request
            .respond(json_response(body).with_status_code(400))
            .expect("response should succeed");
    });

    let backend = RestBackend::new(&addr, KEY, Duration::from_secs(2))?;
    let error = backend
        .count_rows(ScreenKind::Crm, &Query::default())
        .expect_err("400 should surface as an error");
    let message = error.to_string();
    assert!(message.starts_with("server error (400): column \"Tierr\" does not exist"));
    assert!(message.contains("Perhaps you meant"));

    handle.join().expect("server thread should join");
    Ok(())
}

use dispensary_sheets::adapters::google_auth::StaticTokenProvider;
use dispensary_sheets::adapters::sheets::GoogleSheetsClient;
use dispensary_sheets::core::publisher::SheetPublisher;
use dispensary_sheets::core::reconcile::reconcile;
use dispensary_sheets::core::retry::RetryPolicy;
use dispensary_sheets::domain::model::{CanonicalTable, Product, SheetLayout, SheetTarget};
use dispensary_sheets::domain::ports::TablePublisher;
use dispensary_sheets::utils::error::PublishError;
use httpmock::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const SPREADSHEET: &str = "1AbCdEf";

fn publisher(server: &MockServer, attempts: u32) -> SheetPublisher<GoogleSheetsClient> {
    let client = GoogleSheetsClient::new(
        server.base_url(),
        Arc::new(StaticTokenProvider::new("test-token")),
        Duration::from_secs(5),
    )
    .unwrap();
    SheetPublisher::new(client, RetryPolicy::immediate(attempts))
}

fn target() -> SheetTarget {
    SheetTarget {
        spreadsheet_id: SPREADSHEET.to_string(),
        sheet_name: "Montu List".to_string(),
        layout: SheetLayout::default(),
    }
}

fn table(rows: usize) -> CanonicalTable {
    reconcile(
        (0..rows)
            .map(|i| {
                Product::new(format!("Strain {:04}", i), format!("https://store.example/products/{}", i))
                    .with_category(Some(if i % 2 == 0 { "Flower" } else { "Oil" }.to_string()))
                    .with_price(Some(Decimal::new(4550 + i as i64, 2)))
                    .with_stock(i % 7 != 0)
            })
            .collect(),
    )
}

fn metadata_mock<'a>(server: &'a MockServer, titles: &[(&str, i64)]) -> httpmock::Mock<'a> {
    let sheets: Vec<_> = titles
        .iter()
        .map(|(title, id)| json!({"properties": {"sheetId": id, "title": title}}))
        .collect();
    server.mock(|when, then| {
        when.method(GET)
            .path(format!("/v4/spreadsheets/{}", SPREADSHEET))
            .query_param("fields", "sheets.properties(sheetId,title)")
            .header("authorization", "Bearer test-token");
        then.status(200).json_body(json!({ "sheets": sheets }));
    })
}

#[tokio::test]
async fn test_publish_is_one_batch_call_for_small_and_large_tables() {
    for rows in [5usize, 500] {
        let server = MockServer::start();
        let metadata = metadata_mock(&server, &[("Sheet1", 0), ("Montu List", 77)]);
        let batch = server.mock(|when, then| {
            when.method(POST)
                .path(format!("/v4/spreadsheets/{}:batchUpdate", SPREADSHEET))
                .header("authorization", "Bearer test-token")
                .body_contains("updateSheetProperties")
                .body_contains("\"sheetId\":77")
                .body_contains("Updated: ");
            then.status(200).json_body(json!({"spreadsheetId": SPREADSHEET, "replies": []}));
        });

        let stats = publisher(&server, 3).publish(&table(rows), &target()).await.unwrap();

        metadata.assert_hits(1);
        batch.assert_hits(1);
        assert_eq!(stats.rows_written, rows);
        assert_eq!(stats.api_calls, 2);
    }
}

#[tokio::test]
async fn test_missing_worksheet_is_created_in_same_batch() {
    let server = MockServer::start();
    metadata_mock(&server, &[("Sheet1", 0)]);
    let batch = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/v4/spreadsheets/{}:batchUpdate", SPREADSHEET))
            .body_contains("addSheet")
            .body_contains("Montu List");
        then.status(200).json_body(json!({"replies": [{"addSheet": {}}]}));
    });

    let stats = publisher(&server, 3).publish(&table(3), &target()).await.unwrap();

    batch.assert_hits(1);
    assert_eq!(stats.rows_written, 3);
}

#[tokio::test]
async fn test_worksheet_title_matches_ignoring_case() {
    let server = MockServer::start();
    metadata_mock(&server, &[("Sheet1", 0), ("MONTU LIST", 77)]);
    let batch = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/v4/spreadsheets/{}:batchUpdate", SPREADSHEET))
            .body_contains("updateSheetProperties")
            .body_contains("\"sheetId\":77");
        then.status(200).json_body(json!({"replies": []}));
    });

    publisher(&server, 3).publish(&table(3), &target()).await.unwrap();

    batch.assert_hits(1);
}

#[tokio::test]
async fn test_permission_denied_is_not_retried() {
    let server = MockServer::start();
    metadata_mock(&server, &[("Montu List", 77)]);
    let batch = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/v4/spreadsheets/{}:batchUpdate", SPREADSHEET));
        then.status(403).json_body(json!({
            "error": {"code": 403, "message": "The caller does not have permission", "status": "PERMISSION_DENIED"}
        }));
    });

    let result = publisher(&server, 4).publish(&table(3), &target()).await;

    match result {
        Err(PublishError::PermissionDenied(message)) => {
            assert_eq!(message, "The caller does not have permission")
        }
        other => panic!("unexpected result: {:?}", other),
    }
    batch.assert_hits(1);
}

#[tokio::test]
async fn test_unknown_spreadsheet_is_invalid_target() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(format!("/v4/spreadsheets/{}", SPREADSHEET));
        then.status(404).json_body(json!({
            "error": {"code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND"}
        }));
    });

    let result = publisher(&server, 4).publish(&table(3), &target()).await;

    assert!(matches!(result, Err(PublishError::InvalidTarget(_))));
}

#[tokio::test]
async fn test_rate_limit_and_server_errors_are_retried_up_to_cap() {
    let server = MockServer::start();
    metadata_mock(&server, &[("Montu List", 77)]);
    let batch = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/v4/spreadsheets/{}:batchUpdate", SPREADSHEET));
        then.status(429).header("Retry-After", "0").json_body(json!({
            "error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}
        }));
    });

    let result = publisher(&server, 3).publish(&table(3), &target()).await;

    assert!(matches!(result, Err(PublishError::RateLimited { .. })));
    batch.assert_hits(3);

    let flaky = MockServer::start();
    metadata_mock(&flaky, &[("Montu List", 77)]);
    let unavailable = flaky.mock(|when, then| {
        when.method(POST)
            .path(format!("/v4/spreadsheets/{}:batchUpdate", SPREADSHEET));
        then.status(503).body("backend error");
    });

    let result = publisher(&flaky, 2).publish(&table(3), &target()).await;

    assert!(matches!(result, Err(PublishError::Transient(_))));
    unavailable.assert_hits(2);
}

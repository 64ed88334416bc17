// Tests for the summary generation client
// Uses mockito for HTTP mocking

use chrono::{TimeZone, Utc};
use mockito::Server;
use weather_pipeline::aggregate::HourlyAggregate;
use weather_pipeline::summary::{SummaryClient, SummaryError};

fn aggregate() -> HourlyAggregate {
    HourlyAggregate {
        location: "Denver, Colorado".to_string(),
        forecast_timestamp: Utc.with_ymd_and_hms(2025, 10, 14, 14, 0, 0).unwrap(),
        avg_temperature: 69.5,
        avg_precipitation_probability: 25.0,
        total_precipitation: 0.12,
        is_day: true,
        grid_point_count: 4,
        source_updated_at: Utc.with_ymd_and_hms(2025, 10, 14, 15, 0, 0).unwrap(),
        summary: None,
    }
}

#[tokio::test]
async fn test_summarize_success() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", "/")
        .match_header("x-api-key", "test-key")
        .match_header("anthropic-version", "2023-06-01")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"content": [{"type": "text", "text": "Mild afternoon in Denver with a slight chance of showers."}]}"#,
        )
        .create_async()
        .await;

    let client = SummaryClient::with_base_url(
        server.url(),
        "test-key".to_string(),
        "claude-sonnet-4-20250514".to_string(),
    );
    let summary = client.summarize(&aggregate()).await.unwrap();

    assert_eq!(
        summary,
        "Mild afternoon in Denver with a slight chance of showers."
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_summarize_api_error() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", "/")
        .with_status(400)
        .with_body(r#"{"error": {"message": "bad request"}}"#)
        .expect(1)
        .create_async()
        .await;

    let client = SummaryClient::with_base_url(
        server.url(),
        "test-key".to_string(),
        "claude-sonnet-4-20250514".to_string(),
    );
    let result = client.summarize(&aggregate()).await;

    match result.unwrap_err() {
        SummaryError::Api { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("bad request"));
        }
        other => panic!("Expected Api error, got {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_summarize_empty_completion() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"content": []}"#)
        .create_async()
        .await;

    let client = SummaryClient::with_base_url(
        server.url(),
        "test-key".to_string(),
        "claude-sonnet-4-20250514".to_string(),
    );
    let result = client.summarize(&aggregate()).await;

    assert!(matches!(result.unwrap_err(), SummaryError::EmptyCompletion));
    mock.assert_async().await;
}

// Full-pipeline dry-run test: geocode -> grid -> fetch -> dedup -> select ->
// aggregate, with both upstream services mocked. Dry runs never issue a
// database query, so a lazy pool with nothing behind it is enough.

use mockito::{Matcher, Server};
use sqlx::postgres::PgPoolOptions;
use weather_pipeline::geocoder::{Geocoder, LocationSpec};
use weather_pipeline::services::PipelineService;
use weather_pipeline::weather::{Mode, WeatherFetcher};

#[tokio::test]
async fn test_dry_run_computes_aggregates_without_touching_the_store() {
    let mut geocoder_server = Server::new_async().await;
    let mut weather_server = Server::new_async().await;

    // Degenerate bounding box resolves to a single grid point
    let geocode_mock = geocoder_server
        .mock("GET", "/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("city".into(), "Denver".into()),
            Matcher::UrlEncoded("state".into(), "Colorado".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"boundingbox": ["39.7", "39.7", "-104.9", "-104.9"]}]"#)
        .create_async()
        .await;

    let weather_mock = weather_server
        .mock("GET", "/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("latitude".into(), "39.7".into()),
            Matcher::UrlEncoded("longitude".into(), "-104.9".into()),
            Matcher::UrlEncoded("forecast_hours".into(), "1".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "latitude": 39.7,
                "longitude": -104.9,
                "hourly": {
                    "time": ["2025-10-14T14:00"],
                    "temperature_2m": [69.5],
                    "is_day": [1],
                    "precipitation_probability": [20],
                    "precipitation": [0.05]
                }
            }"#,
        )
        .create_async()
        .await;

    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/weather_dry_run_unused")
        .unwrap();
    let service = PipelineService::new(
        pool,
        Geocoder::with_base_url(geocoder_server.url()),
        WeatherFetcher::with_base_url(weather_server.url()),
        None,
    );

    let locations = vec![LocationSpec::CityState {
        city: "Denver".to_string(),
        state: "Colorado".to_string(),
    }];
    let report = service
        .run(Mode::Forecast, &locations, true)
        .await
        .unwrap();

    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].grid_points, 1);
    assert_eq!(report.succeeded[0].observations, 1);
    assert!(report.failed.is_empty());
    assert!(!report.merged);

    assert_eq!(report.aggregates.len(), 1);
    let aggregate = &report.aggregates[0];
    assert_eq!(aggregate.location, "Denver, Colorado");
    assert_eq!(aggregate.avg_temperature, 69.5);
    assert_eq!(aggregate.avg_precipitation_probability, 20.0);
    assert_eq!(aggregate.total_precipitation, 0.05);
    assert!(aggregate.is_day);
    assert_eq!(aggregate.grid_point_count, 1);
    assert!(aggregate.summary.is_none());

    geocode_mock.assert_async().await;
    weather_mock.assert_async().await;
}

#[tokio::test]
async fn test_failed_location_does_not_abort_the_run() {
    let mut geocoder_server = Server::new_async().await;
    let mut weather_server = Server::new_async().await;

    // First location geocodes nowhere, second resolves normally
    let empty_mock = geocoder_server
        .mock("GET", "/")
        .match_query(Matcher::AllOf(vec![Matcher::UrlEncoded(
            "q".into(),
            "Nowhereville Qzx".into(),
        )]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;

    let denver_mock = geocoder_server
        .mock("GET", "/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("city".into(), "Denver".into()),
            Matcher::UrlEncoded("state".into(), "Colorado".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"boundingbox": ["39.7", "39.7", "-104.9", "-104.9"]}]"#)
        .create_async()
        .await;

    let weather_mock = weather_server
        .mock("GET", "/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "latitude": 39.7,
                "longitude": -104.9,
                "hourly": {
                    "time": ["2025-10-14T14:00"],
                    "temperature_2m": [69.5],
                    "is_day": [1],
                    "precipitation_probability": [20],
                    "precipitation": [0.05]
                }
            }"#,
        )
        .create_async()
        .await;

    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/weather_dry_run_unused")
        .unwrap();
    let service = PipelineService::new(
        pool,
        Geocoder::with_base_url(geocoder_server.url()),
        WeatherFetcher::with_base_url(weather_server.url()),
        None,
    );

    let locations = vec![
        LocationSpec::Freeform("Nowhereville Qzx".to_string()),
        LocationSpec::CityState {
            city: "Denver".to_string(),
            state: "Colorado".to_string(),
        },
    ];
    let report = service
        .run(Mode::Forecast, &locations, true)
        .await
        .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].label, "Nowhereville Qzx");
    assert!(report.failed[0].error.contains("No geocoding results"));
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.aggregates.len(), 1);

    empty_mock.assert_async().await;
    denver_mock.assert_async().await;
    weather_mock.assert_async().await;
}

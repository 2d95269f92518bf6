//! Astronomy service provider against a mock HTTP server.

#![cfg(feature = "http")]

use std::time::Duration;

use chrono::NaiveDate;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use circadia::config::Location;
use circadia::daylight::{self, DaylightProvider, HttpProvider};
use circadia::{DaylightWindow, TimeOfDay, WindowSource};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 21).unwrap()
}

/// ureq blocks, so the fetch runs off the runtime threads
async fn fetch(provider: HttpProvider) -> Result<DaylightWindow, daylight::Error> {
    tokio::task::spawn_blocking(move || provider.fetch_today(today()))
        .await
        .unwrap()
}

fn provider(server: &MockServer, location: Location) -> HttpProvider {
    HttpProvider::new(
        &format!("{}/astronomy", server.uri()),
        "test-key",
        location,
        Duration::from_millis(500),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn named_location_is_sent_as_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/astronomy"))
        .and(query_param("apiKey", "test-key"))
        .and(query_param("location", "Chicago, IL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "date": "2024-06-21",
            "sunrise": "05:15",
            "sunset": "20:29",
            "solar_noon": "12:52"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let window = fetch(provider(&server, Location::Named("Chicago, IL".into())))
        .await
        .unwrap();

    assert_eq!(window.date(), today());
    assert_eq!(window.sunrise(), TimeOfDay::new(5, 15).unwrap());
    assert_eq!(window.sunset(), TimeOfDay::new(20, 29).unwrap());
    assert_eq!(window.source(), WindowSource::Service);
}

#[tokio::test(flavor = "multi_thread")]
async fn coordinates_are_sent_as_lat_long() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("apiKey", "test-key"))
        .and(query_param("lat", "52.5200"))
        .and(query_param("long", "13.4000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": { "sunrise": "04:43", "sunset": "21:33" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let window = fetch(provider(
        &server,
        Location::Coordinates {
            lat: 52.52,
            lon: 13.4,
        },
    ))
    .await
    .unwrap();

    // no date in the payload: the requested day is used
    assert_eq!(window.date(), today());
    assert_eq!(window.sunrise(), TimeOfDay::new(4, 43).unwrap());
    assert_eq!(window.sunset(), TimeOfDay::new(21, 33).unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_is_reported_with_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = fetch(provider(&server, Location::Named("Oslo".into())))
        .await
        .unwrap_err();
    assert!(matches!(err, daylight::Error::Status(500)), "{err:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_body_is_a_payload_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = fetch(provider(&server, Location::Named("Oslo".into())))
        .await
        .unwrap_err();
    assert!(matches!(err, daylight::Error::Payload(_)), "{err:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn reversed_times_are_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sunrise": "21:33",
            "sunset": "04:43"
        })))
        .mount(&server)
        .await;

    let err = fetch(provider(&server, Location::Named("Oslo".into())))
        .await
        .unwrap_err();
    assert!(matches!(err, daylight::Error::Payload(_)), "{err:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_service_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "sunrise": "05:00", "sunset": "20:00" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = fetch(provider(&server, Location::Named("Oslo".into())))
        .await
        .unwrap_err();
    assert!(matches!(err, daylight::Error::Network(_)), "{err:?}");
}

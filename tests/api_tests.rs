use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, test, web};
use ldrt::backend::{MockEdge, MockGpioBackend};
use ldrt::config::AppConfig;
use ldrt::gpio::Edge;
use ldrt::poll::PollResult;
use ldrt::routes::AppState;
use ldrt::sensor::LdrSensor;
use serde_json::Value;

fn sample_config() -> AppConfig {
    AppConfig::from_json(
        r#"
        {
            "gpio_mode": 0,
            "gpio_pin": 7,
            "edge": 0,
            "timeout": 2000,
            "http": {
                "host": "localhost:8082",
                "path": "/api"
            }
        }
        "#,
    )
    .expect("valid sample config")
}

fn ok(ms: u64) -> MockEdge {
    MockEdge::After(Duration::from_millis(ms), Edge::Rising)
}

fn state(backend: &Arc<MockGpioBackend>) -> AppState<MockGpioBackend> {
    let cfg = sample_config();
    let pin = cfg.pin_config().expect("valid pin config");
    AppState {
        sensor: Arc::new(LdrSensor::new(pin, backend.clone())),
    }
}

macro_rules! app {
    ($state:expr) => {{
        let state = $state;
        let scope_path = sample_config().http.path;
        test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .service(state.api_scope(&scope_path)),
        )
        .await
    }};
}

#[actix_rt::test]
async fn get_polls_with_defaults() {
    let backend = Arc::new(MockGpioBackend::with_edges([ok(400), ok(500), ok(600)]));
    let app = app!(state(&backend));

    let req = test::TestRequest::get().uri("/api/ldr_time").to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(resp["0"]["time"], 0.5);
    assert_eq!(resp["0"]["timeout"], false);
    assert_eq!(resp["1"]["time"], 0.6);
    assert_eq!(resp["2"]["time"], 0.7);
    assert_eq!(resp["average"], 0.6);
    assert_eq!(resp.as_object().unwrap().len(), 4);
    assert_eq!(backend.release_count(), 1);
}

#[actix_rt::test]
async fn get_stops_on_first_timeout() {
    let backend = Arc::new(MockGpioBackend::default());
    let app = app!(state(&backend));

    let req = test::TestRequest::get().uri("/api/ldr_time").to_request();
    let resp: PollResult = test::call_and_read_body_json(&app, req).await;

    assert_eq!(resp.attempts.len(), 1);
    assert!(resp.attempts[0].1.timed_out);
    assert_eq!(resp.attempts[0].1.elapsed_seconds, 2.0);
    assert_eq!(resp.average_seconds, Some(2.0));
}

#[actix_rt::test]
async fn post_applies_options() {
    let backend = Arc::new(MockGpioBackend::with_edges([
        ok(400),
        MockEdge::Never,
        ok(400),
        ok(400),
        ok(400),
    ]));
    let app = app!(state(&backend));

    let req = test::TestRequest::post()
        .uri("/api/ldr_time")
        .set_payload(r#"{"iterations": 5, "stop_on_timeout": false}"#)
        .to_request();
    let resp: PollResult = test::call_and_read_body_json(&app, req).await;

    assert_eq!(resp.attempts.len(), 5);
    assert!(resp.attempts[1].1.timed_out);
    assert_eq!(resp.average_seconds, Some(0.8));
}

#[actix_rt::test]
async fn post_without_average() {
    let backend = Arc::new(MockGpioBackend::with_edges([ok(100), ok(100)]));
    let app = app!(state(&backend));

    let req = test::TestRequest::post()
        .uri("/api/ldr_time")
        .set_payload(r#"{"iterations": 2, "average_results": false, "io_order": 0}"#)
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;

    assert!(resp.get("average").is_none());
    assert_eq!(resp.as_object().unwrap().len(), 2);
}

#[actix_rt::test]
async fn post_unknown_argument_returns_error_object() {
    let backend = Arc::new(MockGpioBackend::default());
    let app = app!(state(&backend));

    let req = test::TestRequest::post()
        .uri("/api/ldr_time")
        .set_payload(r#"{"iterations": 2, "repeat": true}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Unexpected argument: repeat");
    assert!(backend.ops().is_empty());
}

#[actix_rt::test]
async fn post_invalid_drive_order_touches_no_hardware() {
    let backend = Arc::new(MockGpioBackend::default());
    let app = app!(state(&backend));

    let req = test::TestRequest::post()
        .uri("/api/ldr_time")
        .set_payload(r#"{"io_order": 3}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("drive order"));
    assert_eq!(backend.wait_count(), 0);
    assert!(backend.ops().is_empty());
}

#[actix_rt::test]
async fn post_oversized_iterations_is_rejected() {
    let backend = Arc::new(MockGpioBackend::default());
    let app = app!(state(&backend));

    let req = test::TestRequest::post()
        .uri("/api/ldr_time")
        .set_payload(r#"{"iterations": 4294967295}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("iterations"));
    assert!(backend.ops().is_empty());
}

#[actix_rt::test]
async fn hardware_failure_returns_500_and_releases() {
    let backend = Arc::new(MockGpioBackend::default());
    backend.fail_writes(true);
    let app = app!(state(&backend));

    let req = test::TestRequest::get().uri("/api/ldr_time").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().starts_with("GPIO error"));
    assert_eq!(backend.release_count(), 1);
}

#[actix_rt::test]
async fn wrong_method_returns_405() {
    let backend = Arc::new(MockGpioBackend::default());
    let app = app!(state(&backend));

    let req = test::TestRequest::delete().uri("/api/ldr_time").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 405);

    let req = test::TestRequest::post().uri("/api/").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 405);
}

#[actix_rt::test]
async fn index_page_is_html() {
    let backend = Arc::new(MockGpioBackend::default());
    let app = app!(state(&backend));

    let req = test::TestRequest::get().uri("/api/").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body = test::read_body(resp).await;
    assert!(std::str::from_utf8(&body).unwrap().contains("<h1>"));
    assert!(backend.ops().is_empty());
}

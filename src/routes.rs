use std::sync::Arc;

use actix_web::{HttpResponse, Responder, guard, http::Method, web};
use serde::Deserialize;

use crate::error::AppError;
use crate::gpio::{DriveOrder, GpioBackend};
use crate::poll::{MAX_ITERATIONS, PollOptions, PollResult};
use crate::sensor::LdrSensor;

const POLL_ARGUMENTS: [&str; 4] = [
    "iterations",
    "io_order",
    "average_results",
    "stop_on_timeout",
];

const INDEX_PAGE: &str = concat!(
    "<!DOCTYPE html><html><head><title>LDR edge timer</title></head><body>",
    "<h1>LDR edge timer</h1>",
    "<p><code>GET ldr_time</code> polls the sensor with default options.</p>",
    "<p><code>POST ldr_time</code> accepts <code>iterations</code>, <code>io_order</code>, ",
    "<code>average_results</code> and <code>stop_on_timeout</code>.</p>",
    "</body></html>"
);

pub struct AppState<B: GpioBackend> {
    pub sensor: Arc<LdrSensor<B>>,
}

impl<B: GpioBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            sensor: Arc::clone(&self.sensor),
        }
    }
}

#[derive(Deserialize)]
struct PollPayload {
    iterations: Option<u32>,
    io_order: Option<i64>,
    average_results: Option<bool>,
    stop_on_timeout: Option<bool>,
}

impl<B: GpioBackend + 'static> AppState<B> {
    pub fn api_scope(&self, base_path: &str) -> actix_web::Scope {
        web::scope(base_path)
            .service(
                web::resource("/")
                    .route(web::get().to(index))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/ldr_time")
                    .route(web::get().to(get_ldr_time::<B>))
                    .route(web::post().to(post_ldr_time::<B>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET, Method::POST]))
                            .to(method_not_allowed),
                    ),
            )
    }
}

async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_PAGE)
}

async fn get_ldr_time<B: GpioBackend + 'static>(
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    run_poll(&state, PollOptions::default()).await
}

async fn post_ldr_time<B: GpioBackend + 'static>(
    body: web::Bytes,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let options = parse_poll_payload(&body)?;

    run_poll(&state, options).await
}

async fn run_poll<B: GpioBackend + 'static>(
    state: &AppState<B>,
    options: PollOptions,
) -> Result<web::Json<PollResult>, AppError> {
    let sensor = state.sensor.clone();
    // measurements block for up to the configured timeout per attempt
    let result = web::block(move || sensor.poll(&options))
        .await
        .map_err(|e| AppError::Gpio(format!("Measurement task failed: {e}")))??;

    Ok(web::Json(result))
}

fn parse_poll_payload(body: &[u8]) -> Result<PollOptions, AppError> {
    if body.is_empty() {
        return Err(AppError::InvalidValue("Empty poll payload".into()));
    }

    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidValue(format!("Invalid poll payload: {e}")))?;
    let Some(object) = value.as_object() else {
        return Err(AppError::InvalidValue(
            "Poll payload must be a JSON object".into(),
        ));
    };
    if let Some(key) = object
        .keys()
        .find(|key| !POLL_ARGUMENTS.contains(&key.as_str()))
    {
        return Err(AppError::UnexpectedArgument(key.clone()));
    }

    let payload: PollPayload = serde_json::from_value(value)
        .map_err(|e| AppError::InvalidValue(format!("Invalid poll payload: {e}")))?;

    let mut options = PollOptions::default();
    if let Some(iterations) = payload.iterations {
        if iterations > MAX_ITERATIONS {
            return Err(AppError::InvalidValue(format!(
                "iterations must be at most {MAX_ITERATIONS}"
            )));
        }
        options.iterations = iterations;
    }
    if let Some(code) = payload.io_order {
        options.order = DriveOrder::from_code(code)?;
    }
    if let Some(average) = payload.average_results {
        options.average_results = average;
    }
    if let Some(stop) = payload.stop_on_timeout {
        options.stop_on_timeout = stop;
    }
    Ok(options)
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().finish()
}

fn guard_not_methods(methods: &[Method]) -> impl guard::Guard {
    let allowed: Vec<Method> = methods.to_vec();
    guard::fn_guard(move |ctx| !allowed.iter().any(|m| m == ctx.head().method))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_overrides_defaults() {
        let options =
            parse_poll_payload(br#"{"iterations": 5, "io_order": 0, "stop_on_timeout": false}"#)
                .unwrap();

        assert_eq!(options.iterations, 5);
        assert_eq!(options.order, DriveOrder::InThenOut);
        assert!(options.average_results);
        assert!(!options.stop_on_timeout);
    }

    #[test]
    fn empty_object_is_defaults() {
        assert_eq!(parse_poll_payload(b"{}").unwrap(), PollOptions::default());
    }

    #[test]
    fn unknown_argument_is_named() {
        let err = parse_poll_payload(br#"{"iterations": 2, "samples": 4}"#).unwrap_err();
        assert!(matches!(err, AppError::UnexpectedArgument(ref k) if k == "samples"));
        assert_eq!(err.to_string(), "Unexpected argument: samples");
    }

    #[test]
    fn iterations_are_bounded() {
        let options = parse_poll_payload(br#"{"iterations": 100}"#).unwrap();
        assert_eq!(options.iterations, MAX_ITERATIONS);

        let bodies: [&[u8]; 2] = [br#"{"iterations": 101}"#, br#"{"iterations": 4294967295}"#];
        for body in bodies {
            assert!(matches!(
                parse_poll_payload(body),
                Err(AppError::InvalidValue(_))
            ));
        }
    }

    #[test]
    fn bad_drive_order_is_rejected() {
        assert!(matches!(
            parse_poll_payload(br#"{"io_order": 2}"#),
            Err(AppError::InvalidDriveOrder(2))
        ));
    }

    #[test]
    fn malformed_payloads_are_invalid_values() {
        let bodies: [&[u8]; 5] = [
            b"",
            b"not json",
            b"[1, 2]",
            br#"{"iterations": -1}"#,
            br#"{"average_results": "yes"}"#,
        ];
        for body in bodies {
            assert!(matches!(
                parse_poll_payload(body),
                Err(AppError::InvalidValue(_))
            ));
        }
    }
}

use log::{error, info};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};

use ldrt::{AppConfig, AppError, AppState, LdrSensor};

#[cfg(feature = "hardware-gpio")]
use ldrt::LibgpiodBackend;
#[cfg(not(feature = "hardware-gpio"))]
use ldrt::MockGpioBackend;

fn startup_error(e: AppError) -> std::io::Error {
    error!("{e}");
    std::io::Error::other(e)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("LDRT_CONFIG").ok())
        .unwrap_or_else(|| "config.json".to_string());
    let (config, pin_config) = AppConfig::load_validated(&config_path).map_err(startup_error)?;

    let backend = {
        #[cfg(feature = "hardware-gpio")]
        {
            Arc::new(LibgpiodBackend::new(config.chip.clone()).map_err(startup_error)?)
        }
        #[cfg(not(feature = "hardware-gpio"))]
        {
            Arc::new(MockGpioBackend::default())
        }
    };

    info!(
        "Measuring {:?} edges on pin {} ({:?} numbering), timeout {} ms",
        pin_config.edge, pin_config.pin, pin_config.mode, pin_config.timeout_ms
    );

    let sensor = Arc::new(LdrSensor::new(pin_config, backend));
    let app_state = AppState { sensor };

    let http_cfg = config.http.clone();
    let server = HttpServer::new(move || {
        let scope_path = http_cfg.path.clone();
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .service(app_state.api_scope(&scope_path))
    });

    let bind_addrs: String;
    let http_cfg = config.http;
    let server = match (&http_cfg.unix_socket, &http_cfg.host) {
        (Some(socket_path), Some(host)) => {
            if Path::new(socket_path).exists() {
                fs::remove_file(socket_path)?;
            }
            bind_addrs = format!("{} and {}", socket_path, host);

            server.bind_uds(socket_path)?.bind_auto_h2c(host)?
        }
        (Some(socket_path), None) => {
            if Path::new(socket_path).exists() {
                fs::remove_file(socket_path)?;
            }
            bind_addrs = socket_path.clone();

            server.bind_uds(socket_path)?
        }
        (None, Some(host)) => {
            bind_addrs = host.clone();

            server.bind_auto_h2c(host)?
        }
        _ => {
            return Err(startup_error(AppError::Config(
                "either 'unix_socket' or 'host' must be specified".into(),
            )));
        }
    };

    info!("Starting server on {}...", bind_addrs);

    server.run().await
}

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::gpio::PinConfig;

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub unix_socket: Option<String>,
    pub host: Option<String>,
    pub path: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            unix_socket: None,
            host: Some("0.0.0.0:8082".into()),
            path: String::new(),
        }
    }
}

/// Process configuration, loaded once at startup.
///
/// `gpio_mode` and `edge` are integer codes, see [`PinConfig::from_codes`].
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub gpio_mode: i64,
    pub gpio_pin: u32,
    pub edge: i64,
    /// Maximum wait for one edge, in milliseconds.
    pub timeout: u64,
    pub chip: String,
    pub http: HttpConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gpio_mode: 0,
            gpio_pin: 7,
            edge: 0,
            timeout: 30000,
            chip: "/dev/gpiochip0".into(),
            http: HttpConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, AppError> {
        serde_json::from_str(contents)
            .map_err(|e| AppError::Config(format!("Invalid config json: {e}")))
    }

    pub fn pin_config(&self) -> Result<PinConfig, AppError> {
        PinConfig::from_codes(self.gpio_mode, self.gpio_pin, self.edge, self.timeout)
    }

    /// Loads the file and validates the pin settings in one step.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<(Self, PinConfig), AppError> {
        let config = Self::load_from_file(path)?;
        let pin = config.pin_config()?;
        Ok((config, pin))
    }
}

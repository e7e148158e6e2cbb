pub mod backend;
pub mod config;
pub mod error;
pub mod gpio;
pub mod poll;
pub mod routes;
pub mod sensor;
pub mod timer;

pub use config::{AppConfig, HttpConfig};
pub use error::AppError;
pub use gpio::{Direction, DriveOrder, Edge, GpioBackend, NumberingMode, PinConfig};
pub use poll::{PollOptions, PollResult, PollSession};
pub use routes::AppState;
pub use sensor::LdrSensor;
pub use timer::{AttemptResult, EdgeTimer, PinSession, SETTLE_INTERVAL};

#[cfg(feature = "hardware-gpio")]
pub use backend::LibgpiodBackend;
pub use backend::MockGpioBackend;

use log::{info, warn};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::AppError;
use crate::gpio::{GpioBackend, PinConfig};
use crate::poll::{PollOptions, PollResult, PollSession};
use crate::timer::EdgeTimer;

/// Shared entry point for measurements on the configured pin.
///
/// Only one poll may hold the pin at a time; a concurrent caller is turned
/// away with `AppError::Busy` instead of queueing behind a 30 second wait.
pub struct LdrSensor<B: GpioBackend> {
    timer: EdgeTimer<B>,
    in_flight: Mutex<()>,
}

impl<B: GpioBackend> LdrSensor<B> {
    pub fn new(config: PinConfig, backend: Arc<B>) -> Self {
        Self {
            timer: EdgeTimer::new(config, backend),
            in_flight: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &PinConfig {
        self.timer.config()
    }

    /// Opens a session, runs the poll, and releases the pin on every path.
    pub fn poll(&self, options: &PollOptions) -> Result<PollResult, AppError> {
        let _guard = self.in_flight.try_lock().ok_or_else(|| {
            AppError::Busy(format!(
                "a measurement is already running on pin {}",
                self.config().pin
            ))
        })?;

        info!(
            "polling pin {}: {} iteration(s), {:?}, average {}, stop on timeout {}",
            self.config().pin,
            options.iterations,
            options.order,
            options.average_results,
            options.stop_on_timeout
        );

        let mut session = self.timer.open()?;
        let result = PollSession::new(&mut session).poll(options);
        let closed = session.close();

        let result = result?;
        if let Err(e) = closed {
            warn!("failed to release pin {}: {e}", self.config().pin);
            return Err(e);
        }

        info!(
            "pin {} polled: {} attempt(s), average {:?}, timed out {}",
            self.config().pin,
            result.attempts.len(),
            result.average_seconds,
            result.timed_out()
        );
        Ok(result)
    }
}

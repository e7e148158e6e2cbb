use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::gpio::{Direction, DriveOrder, GpioBackend, PinConfig};

/// Pause after a direction change so residual charge can settle.
pub const SETTLE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttemptResult {
    #[serde(rename = "time")]
    pub elapsed_seconds: f64,
    #[serde(rename = "timeout")]
    pub timed_out: bool,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct EdgeTimer<B: GpioBackend> {
    config: PinConfig,
    backend: Arc<B>,
}

impl<B: GpioBackend> EdgeTimer<B> {
    pub fn new(config: PinConfig, backend: Arc<B>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &PinConfig {
        &self.config
    }

    /// Claims the numbering mode and returns a guard owning the pin.
    ///
    /// The pin is released when the guard is closed or dropped, whichever
    /// comes first, so every exit path out of the caller's scope resets it.
    pub fn open(&self) -> Result<PinSession<'_, B>, AppError> {
        let session = PinSession {
            config: &self.config,
            backend: self.backend.as_ref(),
            released: false,
        };
        // a failed claim drops the guard, which releases any partial state
        self.backend.claim(self.config.mode)?;
        debug!(
            "opened session on pin {} ({:?} numbering)",
            self.config.pin, self.config.mode
        );
        Ok(session)
    }
}

pub struct PinSession<'a, B: GpioBackend> {
    config: &'a PinConfig,
    backend: &'a B,
    released: bool,
}

impl<'a, B: GpioBackend> PinSession<'a, B> {
    pub fn config(&self) -> &PinConfig {
        self.config
    }

    /// Discharges and arms the pin in the requested order.
    pub fn apply_drive_order(&mut self, order: DriveOrder) -> Result<(), AppError> {
        let pin = self.config.pin;
        match order {
            DriveOrder::OutThenIn => {
                self.backend.set_direction(pin, Direction::Output)?;
                self.backend.write_value(pin, 0)?;
                self.backend.sleep(SETTLE_INTERVAL);
                self.backend.arm_input(pin, self.config.edge)?;
            }
            DriveOrder::InThenOut => {
                self.backend.set_direction(pin, Direction::Input)?;
                self.backend.sleep(SETTLE_INTERVAL);
                self.backend.set_direction(pin, Direction::Output)?;
                self.backend.write_value(pin, 0)?;
            }
        }
        Ok(())
    }

    /// Runs the drive sequence and waits for the configured edge.
    ///
    /// A timeout is a normal outcome: it reports the timeout itself, in
    /// seconds, as the elapsed time.
    pub fn measure_once(&mut self, order: DriveOrder) -> Result<AttemptResult, AppError> {
        let start = self.backend.now();

        self.apply_drive_order(order)?;

        let seen = self
            .backend
            .wait_for_edge(self.config.pin, self.config.edge, self.config.timeout())?;

        if seen {
            let elapsed = self.backend.now().saturating_sub(start);
            Ok(AttemptResult {
                elapsed_seconds: round2(elapsed.as_secs_f64()),
                timed_out: false,
            })
        } else {
            debug!(
                "no {:?} edge on pin {} within {} ms",
                self.config.edge, self.config.pin, self.config.timeout_ms
            );
            Ok(AttemptResult {
                elapsed_seconds: self.config.timeout_seconds(),
                timed_out: true,
            })
        }
    }

    /// Releases the pin and reports whether the reset succeeded.
    pub fn close(mut self) -> Result<(), AppError> {
        self.released = true;
        self.backend.release()
    }
}

impl<B: GpioBackend> Drop for PinSession<'_, B> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.backend.release() {
            warn!("failed to release pin {}: {e}", self.config.pin);
        }
    }
}

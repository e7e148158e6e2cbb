use log::{debug, warn};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use libgpiod::{chip::Chip, line, line::EventClock, request};
use parking_lot::{FairMutex, Mutex};

use crate::error::AppError;
use crate::gpio::{Direction, Edge, GpioBackend, NumberingMode};

const LIBGPIOD_BACKEND_EVENT_BUFFER_CAPACITY: usize = 64;

/// Linux GPIO character device backend for a single measured line.
pub struct LibgpiodBackend {
    chip: String,
    origin: Instant,
    mode: Mutex<Option<NumberingMode>>,
    line: FairMutex<Option<ClaimedLine>>,
}

struct ClaimedLine {
    pin: u32,
    offset: u32,
    direction: Direction,
    edge: Option<Edge>,
    request: request::Request,
}

impl LibgpiodBackend {
    pub fn new(chip: impl Into<String>) -> Result<Self, AppError> {
        let chip = chip.into();
        // fail at startup rather than on the first measurement
        Self::open_chip(&chip)?;
        Ok(Self {
            chip,
            origin: Instant::now(),
            mode: Mutex::new(None),
            line: FairMutex::new(None),
        })
    }

    fn open_chip(path: &str) -> Result<Chip, AppError> {
        let p = PathBuf::from(path);
        Chip::open(&p).map_err(|e| AppError::Gpio(format!("open chip {path}: {e}")))
    }

    fn request_line(&self, line_cfg: &line::Config) -> Result<request::Request, AppError> {
        let chip = Self::open_chip(&self.chip)?;
        let mut req_cfg =
            request::Config::new().map_err(|e| AppError::Gpio(format!("request config: {e}")))?;
        req_cfg
            .set_consumer(env!("CARGO_PKG_NAME"))
            .map_err(|e| AppError::Gpio(format!("request consumer: {e}")))?;
        chip.request_lines(Some(&req_cfg), line_cfg)
            .map_err(|e| AppError::Gpio(format!("request lines: {e}")))
    }

    fn resolve_offset(&self, pin: u32) -> Result<u32, AppError> {
        let mode = (*self.mode.lock()).ok_or_else(|| {
            AppError::InvalidState("numbering mode not claimed, open a session first".into())
        })?;
        mode.line_offset(pin)
    }

    fn make_line_settings(
        direction: Direction,
        edge: Option<Edge>,
    ) -> Result<line::Settings, AppError> {
        let mut ls =
            line::Settings::new().map_err(|e| AppError::Gpio(format!("libgpiod settings: {e}")))?;

        match direction {
            Direction::Output => {
                ls.set_direction(line::Direction::Output)
                    .map_err(|e| AppError::Gpio(format!("set direction: {e}")))?;
                ls.set_drive(line::Drive::PushPull)
                    .map_err(|e| AppError::Gpio(format!("set drive: {e}")))?;
                ls.set_output_value(line::Value::InActive)
                    .map_err(|e| AppError::Gpio(format!("set output value: {e}")))?;
            }
            Direction::Input => {
                ls.set_direction(line::Direction::Input)
                    .map_err(|e| AppError::Gpio(format!("set direction: {e}")))?;
                ls.set_bias(None)
                    .map_err(|e| AppError::Gpio(format!("set bias: {e}")))?;
            }
        }

        if let Some(edge) = edge {
            let edge = match edge {
                Edge::Rising => line::Edge::Rising,
                Edge::Falling => line::Edge::Falling,
                Edge::Both => line::Edge::Both,
            };
            ls.set_edge_detection(Some(edge))
                .map_err(|e| AppError::Gpio(format!("set edge detection: {e}")))?;
            ls.set_event_clock(EventClock::Monotonic)
                .map_err(|e| AppError::Gpio(format!("set event clock: {e}")))?;
        }

        Ok(ls)
    }

    fn make_line_config(offset: u32, settings: line::Settings) -> Result<line::Config, AppError> {
        let mut cfg =
            line::Config::new().map_err(|e| AppError::Gpio(format!("line config: {e}")))?;
        cfg.add_line_settings(&[offset], settings)
            .map_err(|e| AppError::Gpio(format!("line config add settings: {e}")))?;
        Ok(cfg)
    }

    /// Applies `direction` to the line, requesting it on first use and
    /// reconfiguring the existing request afterwards.
    fn configure(&self, pin: u32, direction: Direction, edge: Option<Edge>) -> Result<(), AppError> {
        let offset = self.resolve_offset(pin)?;
        let line_cfg = Self::make_line_config(offset, Self::make_line_settings(direction, edge)?)?;

        let mut claimed = self.line.lock();
        if let Some(held) = claimed.as_mut() {
            if held.pin != pin {
                return Err(AppError::InvalidState(format!(
                    "pin {} is already claimed by this session",
                    held.pin
                )));
            }
            held.request
                .reconfigure_lines(&line_cfg)
                .map_err(|e| AppError::Gpio(format!("reconfigure lines: {e}")))?;
            held.direction = direction;
            held.edge = edge;
            return Ok(());
        }

        let request = self.request_line(&line_cfg)?;
        *claimed = Some(ClaimedLine {
            pin,
            offset,
            direction,
            edge,
            request,
        });
        Ok(())
    }
}

impl GpioBackend for LibgpiodBackend {
    fn claim(&self, mode: NumberingMode) -> Result<(), AppError> {
        let mut current = self.mode.lock();
        match *current {
            Some(existing) if existing != mode => Err(AppError::InvalidState(format!(
                "numbering mode already set to {existing:?}"
            ))),
            _ => {
                *current = Some(mode);
                Ok(())
            }
        }
    }

    fn set_direction(&self, pin: u32, direction: Direction) -> Result<(), AppError> {
        self.configure(pin, direction, None)
    }

    fn arm_input(&self, pin: u32, edge: Edge) -> Result<(), AppError> {
        self.configure(pin, Direction::Input, Some(edge))
    }

    fn write_value(&self, pin: u32, value: u8) -> Result<(), AppError> {
        let claimed = self.line.lock();
        let held = claimed
            .as_ref()
            .filter(|held| held.pin == pin)
            .ok_or_else(|| AppError::InvalidState("pin not configured, set direction first".into()))?;

        if held.direction != Direction::Output {
            return Err(AppError::InvalidState(
                "pin must be in output mode to set value".into(),
            ));
        }

        held.request
            .set_value(
                held.offset,
                match value {
                    0 => line::Value::InActive,
                    _ => line::Value::Active,
                },
            )
            .map_err(|e| AppError::Gpio(format!("set value: {e}")))?;
        Ok(())
    }

    fn wait_for_edge(&self, pin: u32, edge: Edge, timeout: Duration) -> Result<bool, AppError> {
        let armed = self
            .line
            .lock()
            .as_ref()
            .is_some_and(|held| held.pin == pin && held.edge == Some(edge));
        if !armed {
            self.arm_input(pin, edge)?;
        }

        let mut buffer = request::Buffer::new(LIBGPIOD_BACKEND_EVENT_BUFFER_CAPACITY)
            .map_err(|e| AppError::Gpio(format!("event buffer: {e}")))?;

        let claimed = self.line.lock();
        let held = claimed
            .as_ref()
            .ok_or_else(|| AppError::InvalidState("pin released while waiting".into()))?;

        let has_event = held
            .request
            .wait_edge_events(Some(timeout))
            .map_err(|e| AppError::Gpio(format!("wait edge events: {e}")))?;
        if !has_event {
            return Ok(false);
        }

        // drain so a stale event cannot satisfy the next attempt
        match held.request.read_edge_events(&mut buffer) {
            Ok(events) => {
                for evt in events.flatten() {
                    if let Ok(kind) = evt.event_type() {
                        debug!("pin {pin} edge {kind:?} at {:?}", evt.timestamp());
                    }
                }
            }
            Err(e) => warn!("read edge events error for pin {pin}: {e}"),
        }
        Ok(true)
    }

    fn release(&self) -> Result<(), AppError> {
        // dropping the request hands the line back to the kernel
        if let Some(held) = self.line.lock().take() {
            debug!("releasing line {} of {}", held.offset, self.chip);
        }
        *self.mode.lock() = None;
        Ok(())
    }

    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

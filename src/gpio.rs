use std::time::Duration;

use crate::error::AppError;

/// Pin numbering scheme. The underlying I/O subsystem treats this as
/// process-global: two sessions claiming different modes at the same time
/// would conflict, which is why only one session may be open at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberingMode {
    /// Physical pin position on the 40-pin header.
    Board,
    /// Broadcom SoC channel number, which is also the chip line offset.
    Bcm,
}

impl NumberingMode {
    pub fn from_code(code: i64) -> Result<Self, AppError> {
        match code {
            0 => Ok(NumberingMode::Board),
            1 => Ok(NumberingMode::Bcm),
            _ => Err(AppError::InvalidConfiguration(format!(
                "unknown gpio mode {code}, supported modes are 0 (board) and 1 (bcm)"
            ))),
        }
    }

    /// Translates a pin number in this scheme into a line offset on the chip.
    pub fn line_offset(&self, pin: u32) -> Result<u32, AppError> {
        match self {
            NumberingMode::Bcm => Ok(pin),
            NumberingMode::Board => board_to_bcm(pin).ok_or_else(|| {
                AppError::InvalidConfiguration(format!("board pin {pin} is not a gpio pin"))
            }),
        }
    }
}

fn board_to_bcm(pin: u32) -> Option<u32> {
    let bcm = match pin {
        3 => 2,
        5 => 3,
        7 => 4,
        8 => 14,
        10 => 15,
        11 => 17,
        12 => 18,
        13 => 27,
        15 => 22,
        16 => 23,
        18 => 24,
        19 => 10,
        21 => 9,
        22 => 25,
        23 => 11,
        24 => 8,
        26 => 7,
        27 => 0,
        28 => 1,
        29 => 5,
        31 => 6,
        32 => 12,
        33 => 13,
        35 => 19,
        36 => 16,
        37 => 26,
        38 => 20,
        40 => 21,
        _ => return None,
    };
    Some(bcm)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

impl Edge {
    pub fn from_code(code: i64) -> Result<Self, AppError> {
        match code {
            0 => Ok(Edge::Rising),
            1 => Ok(Edge::Falling),
            2 => Ok(Edge::Both),
            _ => Err(AppError::InvalidConfiguration(format!(
                "unknown edge {code}, supported edges are 0 (rising), 1 (falling) and 2 (both)"
            ))),
        }
    }

    pub fn matches(&self, observed: Edge) -> bool {
        match self {
            Edge::Both => true,
            configured => *configured == observed,
        }
    }
}

/// Order in which the pin direction is switched before the timed wait.
///
/// Timing a rising edge usually wants `OutThenIn` (discharge, then let the
/// capacitor charge through the LDR); a falling edge usually wants `InThenOut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOrder {
    InThenOut,
    OutThenIn,
}

impl DriveOrder {
    pub fn from_code(code: i64) -> Result<Self, AppError> {
        match code {
            0 => Ok(DriveOrder::InThenOut),
            1 => Ok(DriveOrder::OutThenIn),
            _ => Err(AppError::InvalidDriveOrder(code)),
        }
    }
}

impl Default for DriveOrder {
    fn default() -> Self {
        DriveOrder::OutThenIn
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinConfig {
    pub mode: NumberingMode,
    pub pin: u32,
    pub edge: Edge,
    pub timeout_ms: u64,
}

impl PinConfig {
    /// Builds a pin configuration from the integer codes used in the config
    /// file. Unknown codes and zero pin/timeout values are rejected here so
    /// that nothing invalid reaches an open session.
    pub fn from_codes(
        mode_code: i64,
        pin: u32,
        edge_code: i64,
        timeout_ms: u64,
    ) -> Result<Self, AppError> {
        let mode = NumberingMode::from_code(mode_code)?;
        let edge = Edge::from_code(edge_code)?;

        if pin == 0 {
            return Err(AppError::InvalidConfiguration(
                "gpio pin must be positive".into(),
            ));
        }
        if timeout_ms == 0 {
            return Err(AppError::InvalidConfiguration(
                "timeout must be positive".into(),
            ));
        }

        Ok(Self {
            mode,
            pin,
            edge,
            timeout_ms,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The timeout expressed in seconds, as reported for a timed out attempt.
    pub fn timeout_seconds(&self) -> f64 {
        self.timeout_ms as f64 / 1000.0
    }
}

/// Hardware seam for a single-pin edge timer.
///
/// Pin numbers are given in the numbering mode passed to `claim`. The clock
/// belongs to the backend so that simulated hardware can also simulate time.
pub trait GpioBackend: Send + Sync {
    fn claim(&self, mode: NumberingMode) -> Result<(), AppError>;
    fn set_direction(&self, pin: u32, direction: Direction) -> Result<(), AppError>;
    /// Switches `pin` to input with `edge` detection enabled in the same
    /// reconfiguration, so no transition is missed in between.
    fn arm_input(&self, pin: u32, edge: Edge) -> Result<(), AppError>;
    fn write_value(&self, pin: u32, value: u8) -> Result<(), AppError>;
    /// Blocks until `edge` is seen on `pin` or `timeout` elapses, arming the
    /// pin first if it is not armed for `edge`. Returns `false` on timeout.
    fn wait_for_edge(&self, pin: u32, edge: Edge, timeout: Duration) -> Result<bool, AppError>;
    /// Resets every pin claimed since the last `claim`.
    fn release(&self) -> Result<(), AppError>;
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_codes_construct() {
        for mode in 0..=1 {
            for edge in 0..=2 {
                let cfg = PinConfig::from_codes(mode, 7, edge, 30000).expect("valid codes");
                assert_eq!(cfg.pin, 7);
                assert_eq!(cfg.timeout_ms, 30000);
            }
        }
    }

    #[test]
    fn unknown_codes_are_invalid_configuration() {
        for mode in [-1, 2, 9] {
            assert!(matches!(
                PinConfig::from_codes(mode, 7, 0, 1000),
                Err(AppError::InvalidConfiguration(_))
            ));
        }
        for edge in [-1, 3, 42] {
            assert!(matches!(
                PinConfig::from_codes(0, 7, edge, 1000),
                Err(AppError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn zero_pin_or_timeout_is_rejected() {
        assert!(matches!(
            PinConfig::from_codes(0, 0, 0, 1000),
            Err(AppError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            PinConfig::from_codes(0, 7, 0, 0),
            Err(AppError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn drive_order_codes() {
        assert_eq!(DriveOrder::from_code(0).unwrap(), DriveOrder::InThenOut);
        assert_eq!(DriveOrder::from_code(1).unwrap(), DriveOrder::OutThenIn);
        for code in [-1, 2, 100] {
            assert!(matches!(
                DriveOrder::from_code(code),
                Err(AppError::InvalidDriveOrder(c)) if c == code
            ));
        }
    }

    #[test]
    fn board_pins_map_to_bcm_lines() {
        assert_eq!(NumberingMode::Board.line_offset(7).unwrap(), 4);
        assert_eq!(NumberingMode::Board.line_offset(40).unwrap(), 21);
        assert_eq!(NumberingMode::Bcm.line_offset(7).unwrap(), 7);
        // 1 is 3v3 power, 6 is ground
        assert!(NumberingMode::Board.line_offset(1).is_err());
        assert!(NumberingMode::Board.line_offset(6).is_err());
        assert!(NumberingMode::Board.line_offset(41).is_err());
    }

    #[test]
    fn both_matches_any_edge() {
        assert!(Edge::Both.matches(Edge::Rising));
        assert!(Edge::Both.matches(Edge::Falling));
        assert!(Edge::Rising.matches(Edge::Rising));
        assert!(!Edge::Rising.matches(Edge::Falling));
    }
}

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::AppError;
use crate::gpio::{Direction, Edge, GpioBackend, NumberingMode};

/// Outcome of one simulated wait for an edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockEdge {
    /// An edge of the given kind appears this long after the wait starts.
    After(Duration, Edge),
    /// The line never changes.
    Never,
}

/// Hardware call recorded by the mock, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOp {
    Claim(NumberingMode),
    Direction(u32, Direction),
    Arm(u32, Edge),
    Write(u32, u8),
    Sleep(Duration),
    Wait(u32, Edge),
    Release,
}

/// Simulated pin with a virtual clock.
///
/// Sleeps and waits advance the clock instantly, so tests and `mock-gpio`
/// builds never block. Waits consume scripted outcomes in order; once the
/// script is empty every wait times out.
#[derive(Default)]
pub struct MockGpioBackend {
    clock_ns: AtomicU64,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    mode: Option<NumberingMode>,
    directions: Vec<(u32, Direction)>,
    armed: Option<(u32, Edge)>,
    script: VecDeque<MockEdge>,
    ops: Vec<MockOp>,
    fail_claim: bool,
    fail_writes: bool,
}

impl MockGpioBackend {
    pub fn with_edges<I: IntoIterator<Item = MockEdge>>(edges: I) -> Self {
        let backend = Self::default();
        for edge in edges {
            backend.push_edge(edge);
        }
        backend
    }

    pub fn push_edge(&self, edge: MockEdge) {
        self.with_state(|s| s.script.push_back(edge));
    }

    pub fn fail_claim(&self, fail: bool) {
        self.with_state(|s| s.fail_claim = fail);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.with_state(|s| s.fail_writes = fail);
    }

    pub fn ops(&self) -> Vec<MockOp> {
        self.with_state(|s| s.ops.clone())
    }

    pub fn release_count(&self) -> usize {
        self.with_state(|s| s.ops.iter().filter(|op| **op == MockOp::Release).count())
    }

    pub fn wait_count(&self) -> usize {
        self.with_state(|s| {
            s.ops
                .iter()
                .filter(|op| matches!(op, MockOp::Wait(..)))
                .count()
        })
    }

    /// Currently claimed numbering mode, `None` once released.
    pub fn claimed_mode(&self) -> Option<NumberingMode> {
        self.with_state(|s| s.mode)
    }

    pub fn direction(&self, pin: u32) -> Option<Direction> {
        self.with_state(|s| {
            s.directions
                .iter()
                .find(|(p, _)| *p == pin)
                .map(|(_, d)| *d)
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    fn advance(&self, duration: Duration) {
        self.clock_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MockState>, AppError> {
        self.state
            .lock()
            .map_err(|e| AppError::Gpio(format!("lock poisoned: {e}")))
    }
}

impl GpioBackend for MockGpioBackend {
    fn claim(&self, mode: NumberingMode) -> Result<(), AppError> {
        let mut state = self.lock()?;
        state.ops.push(MockOp::Claim(mode));
        if state.fail_claim {
            return Err(AppError::Gpio("simulated claim failure".into()));
        }
        if let Some(current) = state.mode
            && current != mode
        {
            return Err(AppError::InvalidState(format!(
                "numbering mode already set to {current:?}"
            )));
        }
        state.mode = Some(mode);
        Ok(())
    }

    fn set_direction(&self, pin: u32, direction: Direction) -> Result<(), AppError> {
        let mut state = self.lock()?;
        if state.mode.is_none() {
            return Err(AppError::InvalidState(
                "numbering mode not claimed, open a session first".into(),
            ));
        }
        state.ops.push(MockOp::Direction(pin, direction));
        state.directions.retain(|(p, _)| *p != pin);
        state.directions.push((pin, direction));
        state.armed = None;
        Ok(())
    }

    fn arm_input(&self, pin: u32, edge: Edge) -> Result<(), AppError> {
        let mut state = self.lock()?;
        if state.mode.is_none() {
            return Err(AppError::InvalidState(
                "numbering mode not claimed, open a session first".into(),
            ));
        }
        state.ops.push(MockOp::Arm(pin, edge));
        state.directions.retain(|(p, _)| *p != pin);
        state.directions.push((pin, Direction::Input));
        state.armed = Some((pin, edge));
        Ok(())
    }

    fn write_value(&self, pin: u32, value: u8) -> Result<(), AppError> {
        let mut state = self.lock()?;
        if state.fail_writes {
            return Err(AppError::Gpio(format!("simulated write failure on pin {pin}")));
        }
        let is_output = state
            .directions
            .iter()
            .any(|(p, d)| *p == pin && *d == Direction::Output);
        if !is_output {
            return Err(AppError::InvalidState(
                "pin must be in output mode to set value".into(),
            ));
        }
        state.ops.push(MockOp::Write(pin, value));
        Ok(())
    }

    fn wait_for_edge(&self, pin: u32, edge: Edge, timeout: Duration) -> Result<bool, AppError> {
        let outcome = {
            let mut state = self.lock()?;
            if state.armed != Some((pin, edge)) {
                state.ops.push(MockOp::Arm(pin, edge));
                state.directions.retain(|(p, _)| *p != pin);
                state.directions.push((pin, Direction::Input));
                state.armed = Some((pin, edge));
            }
            state.ops.push(MockOp::Wait(pin, edge));
            state.script.pop_front().unwrap_or(MockEdge::Never)
        };

        match outcome {
            MockEdge::After(delay, observed) if delay < timeout && edge.matches(observed) => {
                self.advance(delay);
                Ok(true)
            }
            _ => {
                self.advance(timeout);
                Ok(false)
            }
        }
    }

    fn release(&self) -> Result<(), AppError> {
        let mut state = self.lock()?;
        state.ops.push(MockOp::Release);
        state.mode = None;
        state.directions.clear();
        state.armed = None;
        Ok(())
    }

    fn now(&self) -> Duration {
        Duration::from_nanos(self.clock_ns.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.with_state(|s| s.ops.push(MockOp::Sleep(duration)));
        self.advance(duration);
    }
}

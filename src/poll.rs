use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AppError;
use crate::gpio::{DriveOrder, GpioBackend};
use crate::timer::{AttemptResult, PinSession, round2};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub iterations: u32,
    pub order: DriveOrder,
    pub average_results: bool,
    pub stop_on_timeout: bool,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            iterations: 3,
            order: DriveOrder::OutThenIn,
            average_results: true,
            stop_on_timeout: true,
        }
    }
}

/// Upper bound on attempts per poll accepted from callers.
pub const MAX_ITERATIONS: u32 = 100;

/// Per-attempt results in attempt order, plus the optional average.
///
/// Serialized as a flat object: `"0"`, `"1"`, ... for the attempts and
/// `"average"` when averaging was requested.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PollResult {
    pub attempts: Vec<(u32, AttemptResult)>,
    pub average_seconds: Option<f64>,
}

impl PollResult {
    pub fn timed_out(&self) -> bool {
        self.attempts.iter().any(|(_, a)| a.timed_out)
    }
}

/// Repeats measurements on an open session.
pub struct PollSession<'s, 'a, B: GpioBackend> {
    session: &'s mut PinSession<'a, B>,
}

impl<'s, 'a, B: GpioBackend> PollSession<'s, 'a, B> {
    pub fn new(session: &'s mut PinSession<'a, B>) -> Self {
        Self { session }
    }

    /// Runs up to `options.iterations` attempts.
    ///
    /// An attempt that stops the poll is reported but not averaged; when no
    /// attempt completed, the average is the timeout itself. Without early
    /// stop, timed out attempts are averaged in and pull the mean up.
    pub fn poll(&mut self, options: &PollOptions) -> Result<PollResult, AppError> {
        let mut attempts = Vec::new();
        let mut completed = 0u32;
        let mut total = 0.0;

        for index in 0..options.iterations {
            let result = self.session.measure_once(options.order)?;
            attempts.push((index, result));
            if result.timed_out && options.stop_on_timeout {
                break;
            }
            completed += 1;
            total += result.elapsed_seconds;
        }

        let average_seconds = options.average_results.then(|| {
            if completed == 0 {
                self.session.config().timeout_seconds()
            } else {
                round2(total / f64::from(completed))
            }
        });

        Ok(PollResult {
            attempts,
            average_seconds,
        })
    }
}

impl Serialize for PollResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.attempts.len() + usize::from(self.average_seconds.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        for (index, attempt) in &self.attempts {
            map.serialize_entry(&index.to_string(), attempt)?;
        }
        if let Some(average) = self.average_seconds {
            map.serialize_entry("average", &average)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PollResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PollResultVisitor;

        impl<'de> Visitor<'de> for PollResultVisitor {
            type Value = PollResult;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of attempt indices and an optional average")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<PollResult, A::Error> {
                let mut result = PollResult::default();
                while let Some(key) = access.next_key::<String>()? {
                    if key == "average" {
                        result.average_seconds = Some(access.next_value()?);
                        continue;
                    }
                    let index = key
                        .parse::<u32>()
                        .map_err(|_| de::Error::unknown_field(&key, &["<index>", "average"]))?;
                    result.attempts.push((index, access.next_value()?));
                }
                result.attempts.sort_by_key(|(index, _)| *index);
                Ok(result)
            }
        }

        deserializer.deserialize_map(PollResultVisitor)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{error::SensorError, relay::DweetRelay};

pub const DEFAULT_ERROR_TOLERANCE: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub temp: f64,
    pub humidity: Option<f64>,
    pub taken_at: DateTime<Utc>,
}

#[async_trait]
pub trait SensorSource: Send {
    async fn read(&mut self) -> Result<SensorReading, SensorError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorState {
    pub temp: Option<f64>,
    pub humidity: Option<f64>,
    pub consecutive_errors: u32,
}

#[derive(Debug, Clone)]
pub struct SensorBuffer {
    tolerance: u32,
    staleness_ms: u64,
    state: SensorState,
}

impl SensorBuffer {
    pub fn new(tolerance: u32, staleness_ms: u64) -> Self {
        Self {
            tolerance: tolerance.max(1),
            staleness_ms,
            state: SensorState::default(),
        }
    }

    pub fn state(&self) -> SensorState {
        self.state
    }

    pub fn temp(&self) -> Option<f64> {
        self.state.temp
    }

    pub fn humidity(&self) -> Option<f64> {
        self.state.humidity
    }

    /// Returns true when the served values changed.
    pub fn record(
        &mut self,
        result: Result<SensorReading, SensorError>,
        now: DateTime<Utc>,
    ) -> bool {
        let before = self.state;

        match result.and_then(|reading| self.check_age(reading, now)) {
            Ok(reading) => {
                self.state = SensorState {
                    temp: Some(reading.temp),
                    humidity: reading.humidity,
                    consecutive_errors: 0,
                };
            }
            Err(err) => {
                self.state.consecutive_errors = self.state.consecutive_errors.saturating_add(1);
                if self.state.consecutive_errors >= self.tolerance {
                    if self.state.temp.is_some() {
                        warn!(
                            "sensor failed {} times in a row ({err}), temperature now unknown",
                            self.state.consecutive_errors
                        );
                    }
                    self.state.temp = None;
                    self.state.humidity = None;
                } else {
                    debug!(
                        "sensor read failed ({}/{}): {err}",
                        self.state.consecutive_errors, self.tolerance
                    );
                }
            }
        }

        before.temp != self.state.temp || before.humidity != self.state.humidity
    }

    fn check_age(
        &self,
        reading: SensorReading,
        now: DateTime<Utc>,
    ) -> Result<SensorReading, SensorError> {
        let age_ms = (now - reading.taken_at).num_milliseconds();
        if age_ms > i64::try_from(self.staleness_ms).unwrap_or(i64::MAX) {
            return Err(SensorError::Stale {
                age_ms,
                limit_ms: self.staleness_ms,
            });
        }
        Ok(reading)
    }
}

#[derive(Debug, Clone)]
pub struct RelaySensorSource {
    relay: DweetRelay,
    thing: String,
}

impl RelaySensorSource {
    pub fn new(relay: DweetRelay, thing: impl Into<String>) -> Self {
        Self {
            relay,
            thing: thing.into(),
        }
    }
}

#[async_trait]
impl SensorSource for RelaySensorSource {
    async fn read(&mut self) -> Result<SensorReading, SensorError> {
        let (created, content) = self
            .relay
            .latest_plain(&self.thing)
            .await?
            .ok_or(SensorError::Unavailable)?;
        parse_reading(&content, created)
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

pub fn parse_reading(
    content: &Value,
    taken_at: DateTime<Utc>,
) -> Result<SensorReading, SensorError> {
    let temp = number(content.get("temp"))
        .ok_or_else(|| SensorError::Invalid(format!("no usable temperature in {content}")))?;
    Ok(SensorReading {
        temp,
        humidity: number(content.get("humi")),
        taken_at,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 7, 0, 0).unwrap()
    }

    fn reading(temp: f64, age_s: i64) -> Result<SensorReading, SensorError> {
        Ok(SensorReading {
            temp,
            humidity: Some(55.0),
            taken_at: now() - Duration::seconds(age_s),
        })
    }

    #[test]
    fn keeps_last_value_below_tolerance_then_clears() {
        let mut buffer = SensorBuffer::new(DEFAULT_ERROR_TOLERANCE, 300_000);
        assert!(buffer.record(reading(19.5, 1), now()));

        for _ in 0..4 {
            assert!(!buffer.record(Err(SensorError::Unavailable), now()));
            assert_eq!(buffer.temp(), Some(19.5));
        }

        assert!(buffer.record(Err(SensorError::Unavailable), now()));
        assert_eq!(
            buffer.state(),
            SensorState {
                temp: None,
                humidity: None,
                consecutive_errors: 5,
            }
        );
    }

    #[test]
    fn success_resets_error_count() {
        let mut buffer = SensorBuffer::new(3, 300_000);
        buffer.record(reading(20.0, 0), now());
        buffer.record(Err(SensorError::Unavailable), now());
        buffer.record(Err(SensorError::Unavailable), now());
        buffer.record(reading(20.5, 0), now());

        assert_eq!(buffer.state().consecutive_errors, 0);
        assert_eq!(buffer.temp(), Some(20.5));
    }

    #[test]
    fn stale_reading_counts_as_failure() {
        let mut buffer = SensorBuffer::new(1, 60_000);
        buffer.record(reading(18.0, 10), now());

        let changed = buffer.record(reading(25.0, 61), now());

        assert!(changed);
        assert_eq!(buffer.temp(), None);
        assert_eq!(buffer.state().consecutive_errors, 1);
    }

    #[test]
    fn parses_numbers_and_numeric_strings() {
        let parsed = parse_reading(&json!({"temp": "21.25", "humi": 40}), now()).unwrap();
        assert_eq!(parsed.temp, 21.25);
        assert_eq!(parsed.humidity, Some(40.0));

        let no_humidity = parse_reading(&json!({"temp": 18}), now()).unwrap();
        assert_eq!(no_humidity.humidity, None);

        assert!(matches!(
            parse_reading(&json!({"humi": 40}), now()),
            Err(SensorError::Invalid(_))
        ));
        assert!(parse_reading(&json!({"temp": "warm"}), now()).is_err());
    }
}

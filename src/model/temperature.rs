//! Activity temperature model.
//!
//! Every commit heats a file or author by a fixed increment; temperature
//! then cools exponentially with hours of inactivity. A checkpoint of
//! (last event time, temperature at that time) is a sufficient statistic:
//! the temperature at any later time is recomputed on demand, no event
//! replay required.

/// Degrees added per commit.
pub const TEMP_INCREMENT: f64 = 10.0;

/// Cooling in degrees per hour of inactivity.
pub const COOLING_RATE: f64 = 0.06 / 24.0;

/// Decay constants for one ingestion run.
#[derive(Debug, Clone, Copy)]
pub struct TemperatureParams {
    pub increment: f64,
    pub cooling_rate: f64,
}

impl Default for TemperatureParams {
    fn default() -> Self {
        Self { increment: TEMP_INCREMENT, cooling_rate: COOLING_RATE }
    }
}

/// Sufficient statistic for one file's or author's activity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
    /// Unix timestamp of the last event.
    pub last_ts: i64,
    /// Temperature as of `last_ts`.
    pub temperature: f64,
}

/// Temperature at `ts` with no intervening event: pure exponential decay
/// from the checkpoint. Never negative, non-increasing in `ts`.
pub fn temperature_at(cp: Checkpoint, ts: i64, cooling_rate: f64) -> f64 {
    cp.temperature * (-cooling_rate * hours_elapsed(cp.last_ts, ts)).exp()
}

/// Fold an event at `ts` into the checkpoint.
pub fn heat(cp: Option<Checkpoint>, ts: i64, params: &TemperatureParams) -> Checkpoint {
    let temperature = match cp {
        Some(cp) => params.increment + temperature_at(cp, ts, params.cooling_rate),
        None => params.increment,
    };
    Checkpoint { last_ts: ts, temperature }
}

/// Hours between two timestamps, clamped at zero so clock skew between
/// commits can never inflate a temperature.
fn hours_elapsed(last_ts: i64, ts: i64) -> f64 {
    (ts - last_ts).max(0) as f64 / 3600.0
}

//! Sensor clock and frame pacing utilities.
//!
//! Loopback sensors stamp every frame and capture result with a
//! monotonic timestamp taken from a [`SensorClock`]. Timestamps are signed
//! nanoseconds, matching what a camera HAL reports as the sensor timestamp.

use std::time::Instant;

/// A monotonic clock anchored at the moment a sensor started streaming.
#[derive(Debug, Clone)]
pub struct SensorClock {
    /// The instant streaming started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl SensorClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Nanoseconds since the clock started, as a sensor timestamp.
    ///
    /// Never returns zero so that every stamped result carries a valid
    /// timestamp.
    pub fn timestamp_ns(&self) -> i64 {
        let elapsed = self.epoch.elapsed().as_nanos();
        i64::try_from(elapsed).unwrap_or(i64::MAX).max(1)
    }

    /// Seconds elapsed since the clock started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at clock start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// Convert a nanosecond timestamp to milliseconds.
    pub fn ns_to_ms(ns: i64) -> f64 {
        ns as f64 / 1_000_000.0
    }
}

/// Frame rate controller for sensor pacing.
#[derive(Debug)]
pub struct RateController {
    target_interval_ns: u64,
    last_tick_ns: Option<u64>,
}

impl RateController {
    /// Create a controller targeting the given Hz rate.
    pub fn new(target_hz: u32) -> Self {
        Self {
            target_interval_ns: 1_000_000_000 / target_hz.max(1) as u64,
            last_tick_ns: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, current_ns: u64) -> bool {
        match self.last_tick_ns {
            None => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            Some(last) if current_ns >= last + self.target_interval_ns => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            _ => false,
        }
    }

    /// Time remaining until the next tick is due.
    pub fn until_next_ns(&self, current_ns: u64) -> u64 {
        match self.last_tick_ns {
            None => 0,
            Some(last) => (last + self.target_interval_ns).saturating_sub(current_ns),
        }
    }

    /// Target interval in nanoseconds.
    pub fn interval_ns(&self) -> u64 {
        self.target_interval_ns
    }
}

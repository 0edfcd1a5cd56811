//! Configuration for the audio playback core.
//!
//! This module holds the ambient knobs a host passes down into the
//! worker: the master-clock ownership policy, the message queue's
//! backpressure limits, the maximum speed adjustment advertised to the
//! reference clock in resample mode, and the synchronize-barrier and
//! producer-stall timeouts.
//!
//! # Examples
//!
//! ```rust
//! use audio_player_core::config::Config;
//!
//! let config = Config::default();
//! assert_eq!(config.queue_max_bytes, 6 * 1024 * 1024);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Complete configuration for the playback worker.
///
/// Every field has a default matching the original player's hardcoded
/// constants; a host only needs to override what it wants to change.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Whether the host's display clock, rather than the internal
    /// audio clock, is the owner of playback time.
    ///
    /// When `true`, the worker never adjusts the reference clock and
    /// instead conforms its own output to it (resample or skip/dup).
    pub use_display_as_clock: bool,

    /// Maximum number of bytes the worker's message queue may hold
    /// before a producer blocks on send.
    pub queue_max_bytes: usize,

    /// Maximum cumulative duration of queued packets before a
    /// producer blocks on send, independent of byte size.
    #[serde(with = "duration_secs_f64")]
    pub queue_max_duration: Duration,

    /// Maximum speed adjustment, in percent, the worker may request
    /// from the reference clock while in resample sync mode.
    pub max_speed_adjust: f64,

    /// How long the worker waits at a synchronize barrier for other
    /// players before giving up and requeuing the request.
    #[serde(with = "duration_secs_f64")]
    pub sync_barrier_timeout: Duration,

    /// Margin added to the renderer's own cache time when deciding
    /// how long to sleep for in [`crate::worker::AudioWorker::wait_for_buffers`].
    #[serde(with = "duration_secs_f64")]
    pub buffer_drain_margin: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_display_as_clock: false,
            queue_max_bytes: 6 * 1024 * 1024,
            queue_max_duration: Duration::from_secs(8),
            max_speed_adjust: 5.0,
            sync_barrier_timeout: Duration::from_millis(100),
            buffer_drain_margin: Duration::from_millis(500),
        }
    }
}

impl Config {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if `text` is not valid TOML or does not match
    /// the shape of [`Config`].
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(Into::into)
    }
}

/// (De)serializes a [`Duration`] as a floating-point number of seconds,
/// matching how the original player expressed its timeouts.
mod duration_secs_f64 {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_original_constants() {
        let config = Config::default();
        assert_eq!(config.queue_max_bytes, 6 * 1024 * 1024);
        assert_eq!(config.queue_max_duration, Duration::from_secs(8));
        assert!((config.max_speed_adjust - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.sync_barrier_timeout, Duration::from_millis(100));
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config = Config::from_toml("use_display_as_clock = true\n").unwrap();
        assert!(config.use_display_as_clock);
        assert_eq!(config.queue_max_bytes, 6 * 1024 * 1024);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(Config::from_toml("not = [valid").is_err());
    }
}

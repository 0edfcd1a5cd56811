//! Read-only snapshot of worker state for UI/diagnostics consumers.
//!
//! Published by the worker thread, read by any number of other
//! threads; guarded by a short critical section rather than exposing
//! the worker's own internals.

use std::sync::Mutex;

use crate::sync::SyncType;
use crate::time::Pts;

/// A point-in-time view of the worker's playback state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Telemetry {
    /// Percentage fill of the inbound message queue (0-100).
    pub queue_fill_percent: u32,
    /// Approximate input bitrate in kb/s.
    pub bitrate_kbps: f64,
    /// Renderer resample ratio, when the effective strategy is RESAMPLE.
    pub resample_ratio: Option<f64>,
    /// Output attenuation in dB, when known.
    pub attenuation_db: Option<f64>,
    /// Whether the renderer is currently running in passthrough mode.
    pub passthrough: bool,
    /// PTS of the sample currently audible.
    pub playing_pts: Pts,
    /// Effective synchronization strategy.
    pub sync_type: Option<SyncType>,
}

impl Telemetry {
    /// Formats a one-line summary in the style of the original
    /// player's info string: `aq:NN%, Kb/s:X.XX[, rr:X.XXXXX][, att:X.X dB]`.
    #[must_use]
    pub fn format(&self) -> String {
        let mut out = format!(
            "aq:{:>2}%, Kb/s:{:.2}",
            self.queue_fill_percent, self.bitrate_kbps
        );
        if let Some(ratio) = self.resample_ratio {
            out.push_str(&format!(", rr:{ratio:.5}"));
        }
        if let Some(att) = self.attenuation_db {
            out.push_str(&format!(", att:{att:.1} dB"));
        }
        out
    }
}

/// Shared, mutex-guarded telemetry cell.
///
/// Single producer (the worker thread), any number of readers.
#[derive(Default)]
pub struct TelemetryView {
    inner: Mutex<Telemetry>,
}

impl TelemetryView {
    /// Creates a view with default (zeroed) telemetry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a new snapshot, replacing the previous one.
    pub fn publish(&self, telemetry: Telemetry) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *guard = telemetry;
    }

    /// Reads the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Telemetry {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_without_optional_fields() {
        let telemetry = Telemetry {
            queue_fill_percent: 42,
            bitrate_kbps: 128.0,
            ..Telemetry::default()
        };
        assert_eq!(telemetry.format(), "aq:42%, Kb/s:128.00");
    }

    #[test]
    fn format_with_resample_and_attenuation() {
        let telemetry = Telemetry {
            queue_fill_percent: 10,
            bitrate_kbps: 320.0,
            resample_ratio: Some(1.00042),
            attenuation_db: Some(-3.5),
            ..Telemetry::default()
        };
        assert_eq!(telemetry.format(), "aq:10%, Kb/s:320.00, rr:1.00042, att:-3.5 dB");
    }

    #[test]
    fn publish_then_snapshot_round_trips() {
        let view = TelemetryView::new();
        let telemetry = Telemetry {
            queue_fill_percent: 7,
            ..Telemetry::default()
        };
        view.publish(telemetry);
        assert_eq!(view.snapshot().queue_fill_percent, 7);
    }
}

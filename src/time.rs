//! Time base shared by the whole pipeline.
//!
//! All presentation/decode timestamps and durations are expressed in a
//! single fixed time base, matching the reference clock's own tick
//! rate. [`Pts`] models the original player's `NO_PTS` sentinel as
//! `Option<Ticks>` instead of a reserved magic value.

use std::time::Duration;

/// A tick count in the pipeline's shared time base.
pub type Ticks = i64;

/// Number of [`Ticks`] per second of the reference clock.
///
/// The original player used a 90 kHz time base (matching the MPEG
/// presentation timestamp convention); the core keeps the same
/// granularity so PTS values coming from the demuxer need no rescaling.
pub const TIME_BASE: Ticks = 90_000;

/// A presentation or decode timestamp.
///
/// `None` corresponds to the original player's `NO_PTS` sentinel: "no
/// timestamp is known for this span," which downstream code interprets
/// as "reuse the running audio clock."
pub type Pts = Option<Ticks>;

/// Converts a duration in milliseconds to [`Ticks`].
#[must_use]
pub fn ticks_from_millis(millis: i64) -> Ticks {
    millis * TIME_BASE / 1_000
}

/// Converts [`Ticks`] to whole milliseconds, truncating.
#[must_use]
pub fn ticks_to_millis(ticks: Ticks) -> i64 {
    ticks * 1_000 / TIME_BASE
}

/// Converts [`Ticks`] to a [`Duration`], treating negative values as zero.
#[must_use]
pub fn ticks_to_duration(ticks: Ticks) -> Duration {
    if ticks <= 0 {
        return Duration::ZERO;
    }
    #[expect(clippy::cast_sign_loss)]
    Duration::from_secs_f64(ticks as f64 / TIME_BASE as f64)
}

/// Converts a [`Duration`] to [`Ticks`].
#[must_use]
pub fn duration_to_ticks(duration: Duration) -> Ticks {
    #[expect(clippy::cast_possible_truncation)]
    {
        (duration.as_secs_f64() * TIME_BASE as f64).round() as Ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_round_trip() {
        let ticks = ticks_from_millis(1000);
        assert_eq!(ticks, TIME_BASE);
        assert_eq!(ticks_to_millis(ticks), 1000);
    }

    #[test]
    fn duration_round_trip_is_approximate() {
        let d = Duration::from_millis(500);
        let ticks = duration_to_ticks(d);
        let back = ticks_to_duration(ticks);
        assert!((back.as_secs_f64() - d.as_secs_f64()).abs() < 0.001);
    }

    #[test]
    fn negative_ticks_clamp_to_zero_duration() {
        assert_eq!(ticks_to_duration(-1), Duration::ZERO);
    }

    #[test]
    fn no_pts_is_none() {
        let pts: Pts = None;
        assert!(pts.is_none());
    }
}

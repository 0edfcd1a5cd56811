//! The shared reference clock boundary.
//!
//! The core never owns timekeeping outright: it either drives the
//! reference clock (when it is the master) or conforms to it (when
//! some other player, typically video, is master). The clock itself
//! is an external collaborator with its own discipline.

use crate::time::Ticks;

/// Which player currently owns (drives) the reference clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockMaster {
    /// This worker drives the clock; no correction is applied to it.
    Audio,
    /// Another player (typically video) drives the clock; this
    /// worker corrects its own output to follow it.
    Other,
}

/// The shared timing authority the [`crate::sync::SyncController`]
/// measures against and, when master, adjusts.
pub trait ReferenceClock: Send {
    /// Which player currently owns the clock.
    fn master(&self) -> ClockMaster;

    /// Current absolute clock reading, in [`Ticks`].
    fn absolute(&self) -> Ticks;

    /// Whether a display (video) reference clock is available, which
    /// determines the DISCON correction granularity (one vblank
    /// period vs. a fixed 10 ms fallback).
    fn has_display_clock(&self) -> bool;

    /// Length of one vblank period, in [`Ticks`], when
    /// [`ReferenceClock::has_display_clock`] is `true`.
    fn vblank_period(&self) -> Ticks;

    /// Requests the clock jump to `target`, rounded to a multiple of
    /// `limit`. Returns whether the adjustment was accepted.
    fn update(&mut self, target: Ticks, absolute: bool, limit: Ticks) -> bool;

    /// Marks a discontinuity at `timestamp` (used by Resync when
    /// `set_clock` is requested).
    fn discontinuity(&mut self, timestamp: Ticks);

    /// Advertises the maximum speed adjustment, in percent, this
    /// worker may request while resampling for sync correction. `0`
    /// when not in RESAMPLE mode.
    fn set_max_speed_adjust(&mut self, percent: f64);
}

//! Picks and applies the audio/clock synchronization strategy.
//!
//! Three strategies compete for a given output: discontinuity
//! correction (nudge the clock), skip/duplicate (drop or repeat whole
//! frames), and resample (let the renderer's resampler absorb the
//! error continuously). Which one is *effective* depends on passthrough
//! state and which player currently owns the reference clock.

use log::debug;

use crate::clock::{ClockMaster, ReferenceClock};
use crate::renderer::{DecodedFrame, Renderer};
use crate::time::Ticks;

/// The three synchronization disciplines a worker can run under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncType {
    /// Correct the reference clock itself by small, bounded jumps.
    Discon,
    /// Drop or duplicate whole frames to track the clock.
    SkipDup,
    /// Let the renderer continuously resample to close the error.
    Resample,
}

/// Fallback DISCON correction granularity when no display clock is
/// available, matching the original player's literal constant.
const DISCON_FALLBACK_LIMIT: Ticks = crate::time::TIME_BASE / 100; // 10 ms

/// Picks the effective [`SyncType`] and applies per-frame corrections.
pub struct SyncController {
    configured: SyncType,
    effective: SyncType,
    max_speed_adjust: f64,
    /// Alternates between emitting and dropping a skipped frame, to
    /// avoid runaway skipping when the error is persistently large.
    skip_toggle: bool,
}

impl SyncController {
    /// Creates a controller with the host's configured preference.
    ///
    /// Per §6, `use_display_as_clock` selects [`SyncType::Resample`]
    /// as the configured preference; otherwise [`SyncType::Discon`].
    #[must_use]
    pub fn new(use_display_as_clock: bool, max_speed_adjust: f64) -> Self {
        let configured = if use_display_as_clock {
            SyncType::Resample
        } else {
            SyncType::Discon
        };
        Self {
            configured,
            effective: configured,
            max_speed_adjust,
            skip_toggle: false,
        }
    }

    /// Currently effective strategy.
    #[must_use]
    pub fn effective(&self) -> SyncType {
        self.effective
    }

    /// The host's configured preference, before passthrough/clock-master
    /// demotion is applied.
    #[must_use]
    pub fn configured(&self) -> SyncType {
        self.configured
    }

    /// Re-derives the effective strategy from passthrough state and
    /// clock ownership, toggling the renderer's resample mode on
    /// change.
    pub fn select(&mut self, passthrough: bool, clock: &mut dyn ReferenceClock, renderer: &mut dyn Renderer) {
        let previous = self.effective;
        let mut effective = self.configured;

        if passthrough && effective == SyncType::Resample {
            effective = SyncType::SkipDup;
        }

        let advertised = if effective == SyncType::Resample {
            self.max_speed_adjust
        } else {
            0.0
        };
        clock.set_max_speed_adjust(advertised);

        if clock.master() == ClockMaster::Audio {
            effective = SyncType::Discon;
        }
        if effective == SyncType::Discon && clock.master() != ClockMaster::Audio {
            effective = SyncType::SkipDup;
        }

        self.effective = effective;

        if effective != previous {
            debug!("sync strategy changed from {previous:?} to {effective:?}");
            renderer.set_resample_mode(effective == SyncType::Resample);
        }
    }

    /// Applies the per-frame correction for `frame` under the current
    /// effective strategy, returning whether the frame should be
    /// emitted twice (SKIPDUP duplicate) or not at all (SKIPDUP drop).
    pub fn emit(
        &mut self,
        frame: &DecodedFrame,
        clock: &mut dyn ReferenceClock,
        renderer: &mut dyn Renderer,
    ) -> EmitPlan {
        let err = renderer.sync_error();
        match self.effective {
            SyncType::Discon => {
                let limit = if clock.has_display_clock() {
                    clock.vblank_period()
                } else {
                    DISCON_FALLBACK_LIMIT
                };
                let rounded = round_toward_zero(err, limit);
                let epsilon = 1;
                if clock.update(clock.absolute() + rounded, true, limit - epsilon) {
                    renderer.set_sync_error_correction(-rounded);
                }
                EmitPlan::Once
            }
            SyncType::SkipDup => {
                let limit = (2 * frame.duration / 3).max(DISCON_FALLBACK_LIMIT);
                if err < -limit {
                    self.skip_toggle = !self.skip_toggle;
                    if self.skip_toggle {
                        EmitPlan::Once
                    } else {
                        renderer.set_sync_error_correction(frame.duration);
                        EmitPlan::Drop
                    }
                } else if err > limit {
                    renderer.set_sync_error_correction(-frame.duration);
                    EmitPlan::Twice
                } else {
                    EmitPlan::Once
                }
            }
            SyncType::Resample => EmitPlan::Once,
        }
    }
}

/// What [`SyncController::emit`] decided for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmitPlan {
    /// Emit the frame exactly once.
    Once,
    /// Emit the frame twice (SKIPDUP duplicate).
    Twice,
    /// Drop the frame entirely (SKIPDUP skip).
    Drop,
}

fn round_toward_zero(value: Ticks, multiple: Ticks) -> Ticks {
    if multiple == 0 {
        return value;
    }
    (value / multiple) * multiple
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeClock {
        master: ClockMaster,
        absolute: Ticks,
        has_display: bool,
        vblank: Ticks,
        last_update: Option<(Ticks, bool, Ticks)>,
        max_speed_adjust: f64,
    }

    impl ReferenceClock for FakeClock {
        fn master(&self) -> ClockMaster {
            self.master
        }
        fn absolute(&self) -> Ticks {
            self.absolute
        }
        fn has_display_clock(&self) -> bool {
            self.has_display
        }
        fn vblank_period(&self) -> Ticks {
            self.vblank
        }
        fn update(&mut self, target: Ticks, absolute: bool, limit: Ticks) -> bool {
            self.last_update = Some((target, absolute, limit));
            true
        }
        fn discontinuity(&mut self, _timestamp: Ticks) {}
        fn set_max_speed_adjust(&mut self, percent: f64) {
            self.max_speed_adjust = percent;
        }
    }

    struct FakeRenderer {
        sync_error: Ticks,
        last_correction: Option<Ticks>,
        resample_mode: Option<bool>,
    }

    impl Renderer for FakeRenderer {
        fn is_valid_format(&self, _frame: &DecodedFrame) -> bool {
            true
        }
        fn create(&mut self, _frame: &DecodedFrame, _codec_id: u32, _use_resample: bool) -> bool {
            true
        }
        fn destroy(&mut self) {}
        fn pause(&mut self) {}
        fn resume(&mut self) {}
        fn drain(&mut self) {}
        fn flush(&mut self) {}
        fn finish(&mut self) {}
        fn add_packets(&mut self, _frame: &DecodedFrame) {}
        fn cache_time(&self) -> f64 {
            0.0
        }
        fn playing_pts(&self) -> Option<Ticks> {
            None
        }
        fn resample_ratio(&self) -> f64 {
            1.0
        }
        fn sync_error(&self) -> Ticks {
            self.sync_error
        }
        fn set_sync_error_correction(&mut self, delta: Ticks) {
            self.last_correction = Some(delta);
        }
        fn set_resample_mode(&mut self, enabled: bool) {
            self.resample_mode = Some(enabled);
        }
    }

    fn frame(duration: Ticks) -> DecodedFrame {
        DecodedFrame {
            data: vec![],
            planes: 1,
            bytes_per_plane: 0,
            frame_count: 1024,
            pts: Some(0),
            duration,
            encoded_sample_rate: 48_000,
            encoded_channel_count: 2,
            channel_count: 2,
            passthrough: false,
        }
    }

    #[test]
    fn audio_master_forces_discon() {
        let mut controller = SyncController::new(true, 5.0);
        let mut clock = FakeClock {
            master: ClockMaster::Audio,
            absolute: 0,
            has_display: false,
            vblank: 0,
            last_update: None,
            max_speed_adjust: 0.0,
        };
        let mut renderer = FakeRenderer {
            sync_error: 0,
            last_correction: None,
            resample_mode: None,
        };
        controller.select(false, &mut clock, &mut renderer);
        assert_eq!(controller.effective(), SyncType::Discon);
    }

    #[test]
    fn passthrough_demotes_resample_to_skipdup() {
        let mut controller = SyncController::new(true, 5.0);
        let mut clock = FakeClock {
            master: ClockMaster::Other,
            absolute: 0,
            has_display: false,
            vblank: 0,
            last_update: None,
            max_speed_adjust: 0.0,
        };
        let mut renderer = FakeRenderer {
            sync_error: 0,
            last_correction: None,
            resample_mode: None,
        };
        controller.select(true, &mut clock, &mut renderer);
        assert_eq!(controller.effective(), SyncType::SkipDup);
    }

    #[test]
    fn discon_rounds_error_and_updates_clock() {
        let mut controller = SyncController::new(false, 5.0);
        let mut clock = FakeClock {
            master: ClockMaster::Other,
            absolute: 1_000,
            has_display: false,
            vblank: 0,
            last_update: None,
            max_speed_adjust: 0.0,
        };
        let mut renderer = FakeRenderer {
            sync_error: crate::time::ticks_from_millis(25),
            last_correction: None,
            resample_mode: None,
        };
        controller.select(false, &mut clock, &mut renderer);
        assert_eq!(controller.effective(), SyncType::Discon);

        let f = frame(900_000);
        controller.emit(&f, &mut clock, &mut renderer);

        let limit = crate::time::ticks_from_millis(10);
        let expected_rounded = (crate::time::ticks_from_millis(25) / limit) * limit;
        assert_eq!(clock.last_update.unwrap().0, 1_000 + expected_rounded);
        assert_eq!(renderer.last_correction, Some(-expected_rounded));
    }

    #[test]
    fn skipdup_duplicates_on_large_positive_error() {
        let mut controller = SyncController::new(false, 5.0);
        let mut clock = FakeClock {
            master: ClockMaster::Other,
            absolute: 0,
            has_display: false,
            vblank: 0,
            last_update: None,
            max_speed_adjust: 0.0,
        };
        let mut renderer = FakeRenderer {
            sync_error: crate::time::ticks_from_millis(30),
            last_correction: None,
            resample_mode: None,
        };
        controller.select(true, &mut clock, &mut renderer);
        let f = frame(crate::time::ticks_from_millis(23));
        let plan = controller.emit(&f, &mut clock, &mut renderer);
        assert_eq!(plan, EmitPlan::Twice);
        assert_eq!(renderer.last_correction, Some(-f.duration));
    }
}

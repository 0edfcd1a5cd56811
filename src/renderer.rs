//! The audio output boundary.
//!
//! The core never binds to a concrete output device (ALSA, CoreAudio,
//! WASAPI, ...); it only depends on the [`Renderer`] trait. A host
//! provides the concrete implementation.

use crate::time::{Pts, Ticks};

/// A batch of decoded samples handed from the codec to the renderer.
///
/// The core copies no audio: this type carries ownership semantics a
/// host is expected to implement as a cheap, possibly reference-counted,
/// view over codec-owned memory.
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    /// Interleaved or planar PCM data, or passthrough-encoded bytes
    /// when [`DecodedFrame::passthrough`] is set.
    pub data: Vec<u8>,
    /// Number of distinct planes `data` is split across. `1` for
    /// interleaved PCM or passthrough payloads.
    pub planes: u32,
    /// Size in bytes of a single plane.
    pub bytes_per_plane: usize,
    /// Number of decoded sample frames in this batch.
    pub frame_count: u32,
    /// Presentation timestamp of the first sample.
    pub pts: Pts,
    /// Duration of this batch, in [`crate::time::Ticks`].
    pub duration: Ticks,
    /// Sample rate as reported by the codec for this batch, which may
    /// differ from the stream's hinted rate.
    pub encoded_sample_rate: u32,
    /// Channel count as reported by the codec.
    pub encoded_channel_count: u32,
    /// Channel count after any downstream remapping.
    pub channel_count: u32,
    /// Whether `data` is passthrough-encoded audio rather than PCM.
    pub passthrough: bool,
}

/// The audio output the worker renders decoded frames to.
///
/// All methods may block the calling (worker) thread; the worker
/// thread is the only caller.
pub trait Renderer: Send {
    /// Whether the renderer, in its current configuration, can accept
    /// `frame` without being recreated.
    fn is_valid_format(&self, frame: &DecodedFrame) -> bool;

    /// (Re)creates the output for the given frame's format.
    ///
    /// Returns `false` if the device could not be configured for this
    /// format; the worker logs and retries on the next format change.
    fn create(&mut self, frame: &DecodedFrame, codec_id: u32, use_resample: bool) -> bool;

    /// Tears down the output device.
    fn destroy(&mut self);

    /// Pauses output without discarding buffered audio.
    fn pause(&mut self);

    /// Resumes output after [`Renderer::pause`].
    fn resume(&mut self);

    /// Blocks until all buffered audio has played out.
    fn drain(&mut self);

    /// Discards buffered audio immediately.
    fn flush(&mut self);

    /// Signals end-of-stream: buffered audio should still play out,
    /// but no more frames will arrive.
    fn finish(&mut self);

    /// Queues a decoded frame for output.
    fn add_packets(&mut self, frame: &DecodedFrame);

    /// Seconds of audio currently buffered in the output.
    fn cache_time(&self) -> f64;

    /// PTS of the sample currently audible at the output.
    fn playing_pts(&self) -> Pts;

    /// Current output resample ratio (1.0 = no resampling).
    fn resample_ratio(&self) -> f64;

    /// Measured offset between the renderer's playback position and
    /// the reference clock, in [`crate::time::Ticks`]. Positive means
    /// the renderer is ahead.
    fn sync_error(&self) -> Ticks;

    /// Requests the renderer absorb `delta` ticks of correction
    /// (DISCON strategy).
    fn set_sync_error_correction(&mut self, delta: Ticks);

    /// Enables (`true`) or disables (`false`) continuous resampling
    /// for sync correction (RESAMPLE strategy).
    fn set_resample_mode(&mut self, enabled: bool);
}

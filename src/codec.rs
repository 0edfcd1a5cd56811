//! The audio codec boundary.
//!
//! The core never implements a concrete decoder; it depends on
//! [`Codec`] and [`CodecFactory`] only. A host supplies a real decoder
//! (e.g. backed by a symphonia-style decoding crate).

use crate::renderer::DecodedFrame;

/// Compressed-format hints the upstream demuxer supplies when opening
/// a stream.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamHints {
    /// Codec identifier as reported by the demuxer.
    pub codec_id: u32,
    /// Hinted channel count; may be superseded by the codec's own
    /// self-reported value once decoding starts.
    pub channels: u32,
    /// Hinted sample rate; may likewise be superseded.
    pub sample_rate: u32,
    /// Approximate input bitrate in kb/s, as reported by the demuxer;
    /// surfaced verbatim through `GetAudioBitrate`/telemetry.
    pub bitrate_kbps: f64,
}

/// Mutable per-stream state, updated by `OpenStream` and by
/// [`crate::decode_step::DecodeStep`] whenever the codec reports a
/// newly discovered encoded sample rate.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamInfo {
    /// The hints this stream was opened with.
    pub hints: StreamHints,
    /// Current channel count, possibly overwritten by the codec.
    pub channels: u32,
    /// Current sample rate, possibly overwritten by the codec.
    pub sample_rate: u32,
}

impl StreamInfo {
    /// Builds stream state directly from hints, before the codec has
    /// reported anything.
    #[must_use]
    pub fn from_hints(hints: StreamHints) -> Self {
        Self {
            channels: hints.channels,
            sample_rate: hints.sample_rate,
            hints,
        }
    }
}

/// A decoded result as reported directly by [`Codec::decode`].
#[derive(Debug)]
pub struct CodecFrame {
    /// Number of decoded sample frames; `0` means the codec consumed
    /// input without producing output yet (internal buffering).
    pub nb_frames: u32,
    /// The decoded payload, already shaped into the frame.
    pub frame: DecodedFrame,
}

/// A single audio decoder instance bound to one [`StreamInfo`].
pub trait Codec: Send {
    /// Feeds up to `data.len()` compressed bytes to the decoder.
    ///
    /// Returns the number of bytes actually consumed, or a negative
    /// value on unrecoverable corruption (per the original decoder's
    /// convention of signed byte counts).
    fn decode(&mut self, data: &[u8]) -> i64;

    /// Retrieves the frame produced by the most recent [`Codec::decode`]
    /// call, if any.
    fn frame(&mut self) -> Option<CodecFrame>;

    /// Number of bytes the codec buffers internally before it can
    /// emit a frame; folded into [`crate::pts_queue::PtsInputQueue`]
    /// lookups so a timestamp can be recovered after codec-internal
    /// latency.
    fn buffer_size(&self) -> u64;

    /// Whether this codec, given its self-reported format, needs the
    /// renderer to run in passthrough mode.
    fn needs_passthrough(&self) -> bool;

    /// Channel count this codec actually decodes to, if known ahead of
    /// the first decoded frame; `0` if not yet known.
    fn encoded_channels(&self) -> u32;

    /// Sample rate this codec actually decodes to, if known ahead of
    /// the first decoded frame; `0` if not yet known.
    fn encoded_sample_rate(&self) -> u32;

    /// Resets internal decoder state (used after a decode error, and
    /// on Reset/Flush control messages). Does not drop the codec.
    fn reset(&mut self);
}

/// Instantiates codecs for a given [`StreamInfo`].
///
/// Kept as its own trait (rather than folding construction into
/// [`Codec`]) because [`crate::decode_step::DecodeStep::switch_codec_if_needed`]
/// needs to build a *trial* codec and discard it without disturbing
/// the one currently in use. Boxes its output so the worker can hold
/// the factory behind a trait object alongside the codec it produces.
pub trait CodecFactory: Send {
    /// Builds a codec for `info`, or `None` if the codec is
    /// unsupported (maps to the public `OpenStream` returning `false`).
    fn create(&self, info: &StreamInfo) -> Option<Box<dyn Codec>>;
}

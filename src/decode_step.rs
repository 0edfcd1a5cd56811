//! Pulls one packet's worth of decoded frames out of the codec.
//!
//! Consults [`crate::pts_queue::PtsInputQueue`] to recover a
//! timestamp for whatever the codec emits, and can trigger a
//! mid-stream codec switch when the codec's self-reported sample rate
//! disagrees with the stream's current hint.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::codec::{Codec, CodecFactory, StreamInfo};
use crate::message::{Message, Priority, Received};
use crate::pts_queue::PtsInputQueue;
use crate::renderer::DecodedFrame;
use crate::time::Ticks;

/// Flags describing the outcome of one [`DecodeStep::decode_frame`] call.
///
/// Several flags can be set at once, e.g. a dropped frame decoded
/// without error still carries `drop` alongside `ok`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeOutcome {
    /// A frame was produced (possibly zero-length; check the returned
    /// frame's `frame_count`).
    pub ok: bool,
    /// The packet this frame came from was marked for drop.
    pub drop: bool,
    /// The codec reported unrecoverable corruption; it has been reset.
    pub error: bool,
    /// The queue returned no message before the requested timeout.
    pub timeout: bool,
    /// The queue was aborted or encountered an unrecoverable error.
    pub abort: bool,
}

impl DecodeOutcome {
    fn ok() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    fn timeout() -> Self {
        Self {
            timeout: true,
            ..Self::default()
        }
    }

    fn abort() -> Self {
        Self {
            abort: true,
            ..Self::default()
        }
    }

    fn error() -> Self {
        Self {
            error: true,
            ..Self::default()
        }
    }
}

/// The compressed packet currently being drained into the codec.
///
/// Invariant: while `remaining > 0` the worker must not block on a new
/// packet — it keeps calling [`Codec::decode`] against the same buffer.
struct PendingPacket {
    data: Arc<[u8]>,
    offset: usize,
    remaining: usize,
    drop: bool,
}

/// Outcome of a message dequeued from the control-and-data queue that
/// isn't a demuxer packet; handled by [`crate::worker::AudioWorker`].
pub enum StepResult {
    /// A decoded frame, or a zero-frame result on a codec warm-up step.
    Frame(DecodeOutcome, Option<DecodedFrame>),
    /// A non-packet, non-terminal message for the caller to dispatch.
    Control(Message),
}

/// Pulls decoded frames from the codec, one packet at a time.
pub struct DecodeStep {
    pending: Option<PendingPacket>,
    pts_queue: Arc<PtsInputQueue>,
    audio_clock: Ticks,
}

impl DecodeStep {
    /// Creates a decode step bound to the given PTS recovery queue.
    #[must_use]
    pub fn new(pts_queue: Arc<PtsInputQueue>) -> Self {
        Self {
            pending: None,
            pts_queue,
            audio_clock: 0,
        }
    }

    /// Current running audio clock, advanced by each decoded frame's
    /// duration and reset by Resync/Flush.
    #[must_use]
    pub fn audio_clock(&self) -> Ticks {
        self.audio_clock
    }

    /// Overwrites the running audio clock (used by Resync).
    pub fn set_audio_clock(&mut self, ticks: Ticks) {
        self.audio_clock = ticks;
    }

    /// Drops any partially-decoded packet (used by Reset/Flush).
    pub fn drop_pending(&mut self) {
        self.pending = None;
    }

    /// Clears the PTS recovery queue without touching the pending
    /// packet (used by Resync).
    pub fn flush_pts_queue(&mut self) {
        self.pts_queue.flush();
    }

    /// Clears the PTS recovery queue and drops any pending packet
    /// (used by Flush).
    pub fn flush(&mut self) {
        self.pts_queue.flush();
        self.pending = None;
    }

    /// Whether a packet is still being drained; while `true` the
    /// worker must not block on the message queue for new input.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Runs steps 1-3 of the decode algorithm: drains the pending
    /// packet if any, or blocks on `queue` for the next one.
    ///
    /// `priority` and `timeout` are computed by the caller (the
    /// worker loop) from speed/clock state per the gating rules in
    /// §4.3; this method applies them uniformly to the queue wait.
    #[expect(clippy::too_many_arguments)]
    pub fn decode_frame(
        &mut self,
        codec: &mut Box<dyn Codec>,
        codec_factory: &dyn CodecFactory,
        stream_info: &mut StreamInfo,
        queue: &crate::message::MessageQueue,
        timeout: Duration,
        priority: Priority,
    ) -> StepResult {
        let mut switched = false;

        loop {
            if let Some(pending) = &mut self.pending {
                let lookup_offset = (pending.remaining as u64) + codec.buffer_size();
                let pts = self.pts_queue.get(lookup_offset, true);
                if let Some(pts) = pts {
                    self.audio_clock = pts;
                }

                let slice = &pending.data[pending.offset..];
                let consumed = codec.decode(slice);
                if consumed < 0 || consumed as usize > pending.remaining {
                    warn!("decode error, dropping packet and resetting codec");
                    codec.reset();
                    self.pending = None;
                    return StepResult::Frame(DecodeOutcome::error(), None);
                }
                let consumed = consumed as usize;
                pending.offset += consumed;
                pending.remaining -= consumed;

                let Some(codec_frame) = codec.frame() else {
                    continue;
                };
                if codec_frame.nb_frames == 0 {
                    continue;
                }

                let mut frame = codec_frame.frame;
                if frame.pts.is_none() {
                    frame.pts = Some(self.audio_clock);
                }

                if frame.encoded_sample_rate != 0
                    && frame.encoded_sample_rate != stream_info.sample_rate
                    && !switched
                {
                    stream_info.sample_rate = frame.encoded_sample_rate;
                    if Self::switch_codec_if_needed(codec_factory, stream_info, codec) {
                        debug!("sample rate change triggered a codec switch, re-decoding packet");
                        pending.offset -= consumed;
                        pending.remaining += consumed;
                        switched = true;
                        continue;
                    }
                }


                self.audio_clock += frame.duration;
                let mut outcome = DecodeOutcome::ok();
                outcome.drop = pending.drop;
                if pending.remaining == 0 {
                    self.pending = None;
                }
                return StepResult::Frame(outcome, Some(frame));
            }

            match queue.get(timeout, priority) {
                Received::Timeout => return StepResult::Frame(DecodeOutcome::timeout(), None),
                Received::Abort => return StepResult::Frame(DecodeOutcome::abort(), None),
                Received::Message(Message::DemuxerPacket(packet)) => {
                    self.pts_queue.add(packet.data.len() as u64, packet.dts);
                    self.pending = Some(PendingPacket {
                        data: packet.data,
                        offset: 0,
                        remaining: 0, // length computed below
                        drop: false,
                    });
                    if let Some(pending) = &mut self.pending {
                        pending.remaining = pending.data.len();
                    }
                }
                Received::Message(other) => return StepResult::Control(other),
            }
        }
    }

    /// Instantiates a trial codec from `stream_info`; if its
    /// passthrough requirement differs from the current codec's, it
    /// replaces `codec` in place and returns `true`. Otherwise the
    /// trial codec is discarded.
    ///
    /// Shared with [`crate::worker::Loop`]'s stream-open path, which
    /// needs the same check once the codec has reported its true
    /// sample rate.
    pub(crate) fn switch_codec_if_needed(
        factory: &dyn CodecFactory,
        stream_info: &StreamInfo,
        codec: &mut Box<dyn Codec>,
    ) -> bool {
        let Some(trial) = factory.create(stream_info) else {
            return false;
        };
        if trial.needs_passthrough() != codec.needs_passthrough() {
            *codec = trial;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecFrame, StreamHints};
    use crate::message::MessageQueue;

    struct FakeCodec {
        pending_frame: Option<CodecFrame>,
        passthrough: bool,
    }

    impl Codec for FakeCodec {
        fn decode(&mut self, data: &[u8]) -> i64 {
            data.len() as i64
        }

        fn frame(&mut self) -> Option<CodecFrame> {
            self.pending_frame.take()
        }

        fn buffer_size(&self) -> u64 {
            0
        }

        fn needs_passthrough(&self) -> bool {
            self.passthrough
        }

        fn encoded_channels(&self) -> u32 {
            0
        }

        fn encoded_sample_rate(&self) -> u32 {
            0
        }

        fn reset(&mut self) {}
    }

    fn frame(pts: Option<i64>, sample_rate: u32) -> DecodedFrame {
        DecodedFrame {
            data: vec![],
            planes: 1,
            bytes_per_plane: 0,
            frame_count: 1024,
            pts,
            duration: 900_000,
            encoded_sample_rate: sample_rate,
            encoded_channel_count: 2,
            channel_count: 2,
            passthrough: false,
        }
    }

    struct NullFactory;
    impl CodecFactory for NullFactory {
        fn create(&self, _info: &StreamInfo) -> Option<Box<dyn Codec>> {
            None
        }
    }

    #[test]
    fn decodes_a_queued_packet() {
        let pts_queue = Arc::new(PtsInputQueue::new());
        let queue = MessageQueue::new(1_000_000, 1_000_000);
        let mut codec: Box<dyn Codec> = Box::new(FakeCodec {
            pending_frame: Some(CodecFrame {
                nb_frames: 1024,
                frame: frame(Some(0), 48_000),
            }),
            passthrough: false,
        });
        let mut stream_info = StreamInfo::from_hints(StreamHints {
            codec_id: 1,
            channels: 2,
            sample_rate: 48_000,
            bitrate_kbps: 0.0,
        });
        let mut step = DecodeStep::new(Arc::clone(&pts_queue));

        queue.send(
            Message::DemuxerPacket(crate::message::Packet {
                data: vec![0u8; 1000].into(),
                dts: Some(0),
                duration: 900_000,
            }),
            Priority::DataAndControl,
        );

        let result = step.decode_frame(
            &mut codec,
            &NullFactory,
            &mut stream_info,
            &queue,
            Duration::from_millis(10),
            Priority::DataAndControl,
        );

        match result {
            StepResult::Frame(outcome, Some(f)) => {
                assert!(outcome.ok);
                assert!(!outcome.error);
                assert_eq!(f.frame_count, 1024);
            }
            _ => panic!("expected a decoded frame"),
        }
        assert_eq!(step.audio_clock(), 900_000);
    }

    #[test]
    fn empty_queue_yields_timeout() {
        let pts_queue = Arc::new(PtsInputQueue::new());
        let queue = MessageQueue::new(1_000_000, 1_000_000);
        let mut codec: Box<dyn Codec> = Box::new(FakeCodec {
            pending_frame: None,
            passthrough: false,
        });
        let mut stream_info = StreamInfo::from_hints(StreamHints {
            codec_id: 1,
            channels: 2,
            sample_rate: 48_000,
            bitrate_kbps: 0.0,
        });
        let mut step = DecodeStep::new(pts_queue);

        let result = step.decode_frame(
            &mut codec,
            &NullFactory,
            &mut stream_info,
            &queue,
            Duration::from_millis(5),
            Priority::DataAndControl,
        );
        match result {
            StepResult::Frame(outcome, None) => assert!(outcome.timeout),
            _ => panic!("expected timeout"),
        }
    }

    #[test]
    fn control_message_is_passed_through() {
        let pts_queue = Arc::new(PtsInputQueue::new());
        let queue = MessageQueue::new(1_000_000, 1_000_000);
        queue.send(Message::Flush, Priority::ControlOnly);
        let mut codec: Box<dyn Codec> = Box::new(FakeCodec {
            pending_frame: None,
            passthrough: false,
        });
        let mut stream_info = StreamInfo::from_hints(StreamHints {
            codec_id: 1,
            channels: 2,
            sample_rate: 48_000,
            bitrate_kbps: 0.0,
        });
        let mut step = DecodeStep::new(pts_queue);

        let result = step.decode_frame(
            &mut codec,
            &NullFactory,
            &mut stream_info,
            &queue,
            Duration::from_millis(10),
            Priority::ControlOnly,
        );
        match result {
            StepResult::Control(Message::Flush) => {}
            _ => panic!("expected the flush message to pass through"),
        }
    }
}

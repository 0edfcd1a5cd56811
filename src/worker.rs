//! The audio worker: a dedicated OS thread driving
//! `DecodeStep` → `SyncController` → `Renderer`.
//!
//! This is the public entry point hosts use: opening/closing a stream,
//! changing speed, flushing, and reading back player info all cross
//! the thread boundary through [`MessageQueue`] or a small shared,
//! mutex-guarded state block.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::clock::ReferenceClock;
use crate::codec::{Codec, CodecFactory, StreamHints, StreamInfo};
use crate::config::Config;
use crate::decode_step::{DecodeOutcome, DecodeStep, StepResult};
use crate::error::{Error, Result};
use crate::message::{
    DisplayTimeRequest, Message, MessageQueue, ParentMessage, Priority, TimeSource,
};
use crate::pts_queue::PtsInputQueue;
use crate::renderer::Renderer;
use crate::sync::{EmitPlan, SyncController, SyncType};
use crate::telemetry::{Telemetry, TelemetryView};
use crate::time::Ticks;

/// Scaled playback speed: `NORMAL_SPEED` represents 1x forward
/// playback; negative values are rewind; values above `NORMAL_SPEED`
/// are fast-forward.
pub const NORMAL_SPEED: i32 = 1000;

/// A rendezvous object shared with another player (typically video) to
/// align start-up.
pub trait SyncBarrier: Send {
    /// Waits up to `timeout` for the other side to arrive. Returns
    /// whether the rendezvous completed.
    fn wait(&self, timeout: Duration) -> bool;
}

/// Per-stream, worker-exclusive state plus whatever needs to be read
/// back by [`AudioWorker`]'s public accessors.
struct SharedInfo {
    channels: u32,
    passthrough: bool,
    bitrate_kbps: f64,
    cache_time_secs: f64,
}

/// Handle to a running audio worker thread.
pub struct AudioWorker {
    queue: Arc<MessageQueue>,
    pts_queue: Arc<PtsInputQueue>,
    telemetry: Arc<TelemetryView>,
    shared: Arc<Mutex<SharedInfo>>,
    codec_factory: Arc<dyn CodecFactory>,
    config: Config,
    thread: Option<JoinHandle<()>>,
}

/// Everything the worker loop owns exclusively; moved into the
/// spawned thread.
struct Loop {
    queue: Arc<MessageQueue>,
    telemetry: Arc<TelemetryView>,
    shared: Arc<Mutex<SharedInfo>>,
    codec_factory: Arc<dyn CodecFactory>,
    renderer: Box<dyn Renderer>,
    clock: Box<dyn ReferenceClock>,
    barrier: Option<Box<dyn SyncBarrier>>,
    parent_tx: Sender<ParentMessage>,
    config: Config,

    codec: Box<dyn Codec>,
    stream_info: StreamInfo,
    decode_step: DecodeStep,
    sync: SyncController,

    started: bool,
    stalled: bool,
    speed: i32,
    silence: bool,
}

impl AudioWorker {
    /// Opens a new stream and starts its worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::unimplemented`] if `codec_factory` cannot
    /// build a codec for `hints` (maps the original player's
    /// `CodecUnsupported` outcome onto the ambient error taxonomy).
    #[expect(clippy::too_many_arguments)]
    pub fn open_stream(
        hints: StreamHints,
        codec_factory: Arc<dyn CodecFactory>,
        renderer: Box<dyn Renderer>,
        clock: Box<dyn ReferenceClock>,
        barrier: Option<Box<dyn SyncBarrier>>,
        config: Config,
        parent_tx: Sender<ParentMessage>,
    ) -> Result<Self> {
        let mut stream_info = StreamInfo::from_hints(hints);
        let mut codec = codec_factory
            .create(&stream_info)
            .ok_or_else(|| Error::unimplemented("codec unsupported for stream hints"))?;
        apply_codec_report(&mut stream_info, codec.as_ref());
        if stream_info.hints.sample_rate != stream_info.sample_rate {
            DecodeStep::switch_codec_if_needed(codec_factory.as_ref(), &stream_info, &mut codec);
        }

        let queue = Arc::new(MessageQueue::new(
            config.queue_max_bytes,
            crate::time::duration_to_ticks(config.queue_max_duration),
        ));
        let pts_queue = Arc::new(PtsInputQueue::new());
        let telemetry = Arc::new(TelemetryView::new());
        let shared = Arc::new(Mutex::new(SharedInfo {
            channels: stream_info.channels,
            passthrough: false,
            bitrate_kbps: stream_info.hints.bitrate_kbps,
            cache_time_secs: 0.0,
        }));

        let sync = SyncController::new(config.use_display_as_clock, config.max_speed_adjust);
        let worker_config = config.clone();

        let mut worker_loop = Loop {
            queue: Arc::clone(&queue),
            telemetry: Arc::clone(&telemetry),
            shared: Arc::clone(&shared),
            codec_factory: Arc::clone(&codec_factory),
            renderer,
            clock,
            barrier,
            parent_tx,
            config: worker_config,
            codec,
            stream_info,
            decode_step: DecodeStep::new(Arc::clone(&pts_queue)),
            sync,
            started: false,
            stalled: true,
            speed: NORMAL_SPEED,
            silence: false,
        };

        let thread = std::thread::Builder::new()
            .name("audio-worker".into())
            .spawn(move || worker_loop.run())
            .map_err(Error::from)?;

        Ok(Self {
            queue,
            pts_queue,
            telemetry,
            shared,
            codec_factory,
            config,
            thread: Some(thread),
        })
    }

    /// Hands the producer's input queue to the caller so it can feed
    /// packets (`Message::DemuxerPacket`) and PTS entries directly.
    #[must_use]
    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    /// The PTS recovery queue shared with the upstream packet producer.
    #[must_use]
    pub fn pts_queue(&self) -> &Arc<PtsInputQueue> {
        &self.pts_queue
    }

    /// Idempotent counterpart of [`AudioWorker::open_stream`] for a
    /// running worker: defers the format change through a
    /// priority-0 codec-change message instead of restarting the
    /// thread.
    ///
    /// Returns `false` without enqueuing anything if `hints` cannot
    /// be decoded by the factory this worker was built with.
    #[must_use]
    pub fn change_stream(&self, hints: StreamHints) -> bool {
        let probe = StreamInfo::from_hints(hints.clone());
        let Some(codec) = self.codec_factory.create(&probe) else {
            return false;
        };
        self.queue
            .send(Message::CodecChange(hints, codec), Priority::DataAndControl)
    }

    /// Requests a speed change, deferred through the queue.
    pub fn set_speed(&self, speed: i32) {
        self.queue.send(Message::SetSpeed(speed), Priority::ControlOnly);
    }

    /// Discards everything currently queued, then enqueues a priority-1
    /// flush so already-queued packets cannot play out ahead of it.
    pub fn flush(&self) {
        self.queue.flush();
        self.queue.send(Message::Flush, Priority::ControlOnly);
    }

    /// Waits for the queue to drain, then sleeps out most of the
    /// renderer's buffered audio, leaving a margin so playback does
    /// not audibly stutter.
    pub fn wait_for_buffers(&self) {
        while !self.queue.is_empty() {
            std::thread::sleep(Duration::from_millis(5));
        }
        let cache_time = self
            .shared
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .cache_time_secs;
        let margin = self.config.buffer_drain_margin.as_secs_f64();
        if cache_time > margin {
            std::thread::sleep(Duration::from_secs_f64(cache_time - margin));
        }
    }

    /// Formatted one-line player info string.
    #[must_use]
    pub fn player_info(&self) -> String {
        self.telemetry.snapshot().format()
    }

    /// Approximate input bitrate in kb/s.
    #[must_use]
    pub fn audio_bitrate(&self) -> f64 {
        self.shared
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .bitrate_kbps
    }

    /// Current channel count.
    #[must_use]
    pub fn audio_channels(&self) -> u32 {
        self.shared
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .channels
    }

    /// Whether the renderer is currently in passthrough mode.
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.shared
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .passthrough
    }

    /// Closes the stream. If `wait_for_buffers` is set, waits for
    /// buffered audio to drain before tearing down; otherwise
    /// discards immediately.
    pub fn close_stream(mut self, wait_for_buffers: bool) {
        if wait_for_buffers {
            self.wait_for_buffers();
        }
        self.queue.abort();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("audio worker thread panicked");
            }
        }
    }
}

impl Drop for AudioWorker {
    fn drop(&mut self) {
        self.queue.abort();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Loop {
    fn run(&mut self) {
        info!("audio worker thread starting");
        loop {
            let timeout = self.next_timeout();
            let priority = self.next_priority();

            let step = self.decode_step.decode_frame(
                &mut self.codec,
                self.codec_factory.as_ref(),
                &mut self.stream_info,
                &self.queue,
                timeout,
                priority,
            );

            match step {
                StepResult::Control(message) => {
                    if !self.handle_control(message) {
                        break;
                    }
                }
                StepResult::Frame(outcome, frame) => {
                    if !self.handle_frame(outcome, frame) {
                        break;
                    }
                }
            }
        }
        info!("audio worker thread exiting");
    }

    fn next_timeout(&self) -> Duration {
        if self.speed == NORMAL_SPEED {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(self.renderer.cache_time()) + Duration::from_millis(100)
        }
    }

    fn next_priority(&self) -> Priority {
        let rewind = self.speed < 0;
        let fast_forward_ahead =
            self.speed > NORMAL_SPEED && self.decode_step.audio_clock() < self.clock.absolute();
        if !self.started || self.speed == NORMAL_SPEED || rewind || fast_forward_ahead {
            Priority::DataAndControl
        } else {
            Priority::ControlOnly
        }
    }

    /// Returns `false` to stop the worker loop.
    fn handle_frame(&mut self, mut outcome: DecodeOutcome, frame: Option<crate::renderer::DecodedFrame>) -> bool {
        if self.speed != NORMAL_SPEED && self.started {
            outcome.drop = true;
        }
        self.publish_telemetry();

        if outcome.error {
            return true;
        }
        if outcome.timeout {
            if self.speed == NORMAL_SPEED && !self.stalled {
                self.renderer.drain();
                self.renderer.flush();
                self.stalled = true;
            }
            return true;
        }
        if outcome.abort {
            return false;
        }
        let Some(mut frame) = frame else {
            return true;
        };
        if frame.frame_count == 0 {
            return true;
        }

        if !self.renderer.is_valid_format(&frame) {
            if self.speed != 0 {
                self.renderer.drain();
            }
            self.renderer.destroy();
            if self.speed != 0 {
                self.renderer.resume();
            } else {
                self.renderer.pause();
            }
            let use_resample = self.sync.configured() == SyncType::Resample;
            if !self
                .renderer
                .create(&frame, self.stream_info.hints.codec_id, use_resample)
            {
                warn!("renderer failed to create output for new format");
            }
            self.stream_info.channels = if frame.passthrough {
                frame.encoded_channel_count
            } else {
                frame.channel_count
            };
        }
        self.note_frame_format(&frame);

        if self.silence {
            frame.data.iter_mut().for_each(|b| *b = 0);
        }

        if !outcome.drop {
            self.sync
                .select(frame.passthrough, self.clock.as_mut(), self.renderer.as_mut());
            match self
                .sync
                .emit(&frame, self.clock.as_mut(), self.renderer.as_mut())
            {
                EmitPlan::Once => self.renderer.add_packets(&frame),
                EmitPlan::Twice => {
                    self.renderer.add_packets(&frame);
                    self.renderer.add_packets(&frame);
                }
                EmitPlan::Drop => {}
            }

            let level = self.queue.level_percent();
            if self.stalled && self.renderer.cache_time() > 0.0 && level > 5 {
                self.stalled = false;
            }
        }

        if !self.started && !outcome.drop {
            self.started = true;
            let _ = self.parent_tx.send(ParentMessage::Started);
        }

        true
    }

    /// Returns `false` to stop the worker loop.
    fn handle_control(&mut self, message: Message) -> bool {
        match message {
            Message::DemuxerPacket(_) => unreachable!("data packets are handled in decode_step"),
            Message::Synchronize => {
                let released = self
                    .barrier
                    .as_ref()
                    .is_some_and(|b| b.wait(self.config.sync_barrier_timeout));
                if !released {
                    debug!("synchronize barrier timed out, requeuing");
                    self.queue.requeue(Message::Synchronize, Priority::ControlOnly);
                }
            }
            Message::Resync { timestamp, set_clock } => {
                self.decode_step.set_audio_clock(timestamp);
                self.decode_step.flush_pts_queue();
                if set_clock {
                    self.clock.discontinuity(timestamp);
                }
            }
            Message::Reset => {
                self.codec.reset();
                self.decode_step.drop_pending();
                self.started = false;
            }
            Message::Flush => {
                self.renderer.flush();
                self.decode_step.flush();
                self.stalled = true;
                self.started = false;
                self.codec.reset();
            }
            Message::PlayerStarted => {
                if self.started {
                    let _ = self.parent_tx.send(ParentMessage::Started);
                }
            }
            Message::DisplayTime(request) => self.handle_display_time(request),
            Message::Eof => self.renderer.finish(),
            Message::Delay(duration) => self.handle_delay(duration),
            Message::SetSpeed(speed) => {
                if speed == NORMAL_SPEED && self.speed != NORMAL_SPEED {
                    self.renderer.resume();
                } else if speed != NORMAL_SPEED {
                    self.renderer.pause();
                }
                self.speed = speed;
            }
            Message::Silence(enabled) => self.silence = enabled,
            Message::CodecChange(hints, codec) => self.install_codec(hints, codec),
        }
        true
    }

    fn handle_display_time(&mut self, request: DisplayTimeRequest) {
        let answer = match request.source {
            TimeSource::ReferenceClock => self.clock.absolute(),
            TimeSource::Stream => request.timestamp,
        };
        let _ = self.parent_tx.send(ParentMessage::DisplayTime(answer));
    }

    fn handle_delay(&mut self, duration: Duration) {
        if self.speed == 0 {
            return;
        }
        let scale = f64::from(NORMAL_SPEED) / f64::from(self.speed.abs());
        let mut remaining = duration.mul_f64(scale);
        let slice = Duration::from_millis(1);
        while remaining > Duration::ZERO {
            if self.queue.is_aborted() {
                return;
            }
            let step = slice.min(remaining);
            std::thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
    }

    fn install_codec(&mut self, hints: StreamHints, mut codec: Box<dyn Codec>) {
        let mut stream_info = StreamInfo::from_hints(hints);
        apply_codec_report(&mut stream_info, codec.as_ref());
        if stream_info.hints.sample_rate != stream_info.sample_rate {
            DecodeStep::switch_codec_if_needed(self.codec_factory.as_ref(), &stream_info, &mut codec);
        }
        self.codec = codec;
        self.stream_info = stream_info;
        self.decode_step.set_audio_clock(0);
        self.decode_step.drop_pending();
        self.started = false;
        self.stalled = self.queue.is_empty();
        self.silence = false;
    }

    /// Updates the shared accessor state from a newly decoded frame's
    /// format. Called once per non-dropped frame, before telemetry is
    /// published.
    fn note_frame_format(&self, frame: &crate::renderer::DecodedFrame) {
        let mut shared = self
            .shared
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        shared.passthrough = frame.passthrough;
    }

    fn publish_telemetry(&self) {
        let (bitrate_kbps, passthrough) = {
            let mut shared = self
                .shared
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            shared.channels = self.stream_info.channels;
            shared.cache_time_secs = self.renderer.cache_time();
            (shared.bitrate_kbps, shared.passthrough)
        };

        let telemetry = Telemetry {
            queue_fill_percent: self.queue.level_percent(),
            bitrate_kbps,
            resample_ratio: (self.sync.effective() == SyncType::Resample)
                .then(|| self.renderer.resample_ratio()),
            attenuation_db: None,
            passthrough,
            playing_pts: self.renderer.playing_pts(),
            sync_type: Some(self.sync.effective()),
        };
        self.telemetry.publish(telemetry);
    }
}

/// Overwrites `stream_info`'s channel/sample-rate with the codec's own
/// self-reported values, when the codec knows them ahead of the first
/// decoded frame (the initial `CodecFactory::create` call can only go
/// on the demuxer's hints, which may not have been enough to pick
/// passthrough correctly).
fn apply_codec_report(stream_info: &mut StreamInfo, codec: &dyn Codec) {
    let channels = codec.encoded_channels();
    if channels > 0 {
        stream_info.channels = channels;
    }
    let sample_rate = codec.encoded_sample_rate();
    if sample_rate > 0 {
        stream_info.sample_rate = sample_rate;
    }
}

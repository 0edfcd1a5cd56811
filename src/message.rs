//! The worker's inbound message queue.
//!
//! Data packets and control events share one queue so that control
//! (flush, reset, resync, speed changes, ...) can preempt data when the
//! worker is not ready to accept new frames. The queue is bounded by
//! both byte size and cumulative packet duration; a full queue blocks
//! its producer, giving the upstream demuxer natural backpressure.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::codec::{Codec, StreamHints};
use crate::time::{Pts, Ticks};

/// How urgently a queued message must be serviced.
///
/// The worker requests [`Priority::ControlOnly`] when it does not want
/// new data (fast-forward ahead of the clock, paused while already
/// started); [`Priority::DataAndControl`] otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Accept data packets as well as control messages.
    DataAndControl = 0,
    /// Accept only control messages; data packets wait.
    ControlOnly = 1,
}

/// A compressed audio packet from the upstream demuxer.
#[derive(Clone, Debug)]
pub struct Packet {
    /// Compressed bytes, handed unchanged to the codec.
    pub data: Arc<[u8]>,
    /// Decode timestamp as reported by the demuxer.
    pub dts: Pts,
    /// Duration this packet is expected to occupy, used for the
    /// queue's time-based backpressure accounting.
    pub duration: Ticks,
}

/// Which player a [`Message::DisplayTime`] request wants its timing
/// computed against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeSource {
    /// Use the reference clock's absolute reading.
    ReferenceClock,
    /// Use this worker's own playing PTS.
    Stream,
}

/// A display-time query forwarded from (and its answer forwarded back
/// to) the parent player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayTimeRequest {
    /// Which clock the requester wants the answer computed from.
    pub source: TimeSource,
    /// Timestamp supplied by the requester; stamped with the
    /// computed time before being forwarded back.
    pub timestamp: Ticks,
}

/// Messages the worker consumes from its inbound queue.
pub enum Message {
    /// A compressed packet to decode.
    DemuxerPacket(Packet),
    /// Rendezvous with the video worker before starting playback.
    Synchronize,
    /// Overwrite the running audio clock.
    Resync {
        /// New value for the audio clock.
        timestamp: Ticks,
        /// Whether to also mark a discontinuity on the reference clock.
        set_clock: bool,
    },
    /// Reset codec and decode state without touching the renderer.
    Reset,
    /// Discard all buffered and queued audio.
    Flush,
    /// Another player announced it has started; used to detect
    /// whether this worker should also announce itself.
    PlayerStarted,
    /// A display-time query to answer and forward to the parent.
    DisplayTime(DisplayTimeRequest),
    /// End of stream: let buffered audio finish playing.
    Eof,
    /// Sleep for (approximately) this long before processing further
    /// messages, scaled by the current speed.
    Delay(Duration),
    /// Change playback speed. Values follow [`crate::Speed`]'s convention.
    SetSpeed(i32),
    /// Enable or disable output silencing.
    Silence(bool),
    /// Install a new codec for a format change discovered mid-stream.
    CodecChange(StreamHints, Box<dyn Codec>),
}

impl Message {
    fn weight(&self) -> (usize, Ticks) {
        match self {
            Self::DemuxerPacket(packet) => (packet.data.len(), packet.duration),
            _ => (0, 0),
        }
    }
}

/// Messages the worker forwards up to the parent player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParentMessage {
    /// This worker has started producing audible output.
    Started,
    /// Answer to a forwarded [`Message::DisplayTime`] query.
    DisplayTime(Ticks),
}

/// Outcome of [`MessageQueue::get`].
pub enum Received {
    /// A message was dequeued.
    Message(Message),
    /// No eligible message arrived within the timeout.
    Timeout,
    /// The queue was aborted; the worker should exit.
    Abort,
}

struct Entry {
    message: Message,
    priority: Priority,
    bytes: usize,
    duration: Ticks,
}

struct State {
    entries: VecDeque<Entry>,
    total_bytes: usize,
    total_duration: Ticks,
    aborted: bool,
}

/// A bounded, priority-aware message queue.
///
/// Bounded by [`crate::config::Config::queue_max_bytes`] and
/// [`crate::config::Config::queue_max_duration`]: [`MessageQueue::send`]
/// blocks while either limit is exceeded, giving the producer natural
/// backpressure.
pub struct MessageQueue {
    state: Mutex<State>,
    not_full: Condvar,
    not_empty: Condvar,
    max_bytes: usize,
    max_duration: Ticks,
}

impl MessageQueue {
    /// Creates an empty queue with the given capacity.
    #[must_use]
    pub fn new(max_bytes: usize, max_duration: Ticks) -> Self {
        Self {
            state: Mutex::new(State {
                entries: VecDeque::new(),
                total_bytes: 0,
                total_duration: 0,
                aborted: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            max_bytes,
            max_duration,
        }
    }

    /// Enqueues `message` at `priority`, blocking while the queue is
    /// over capacity. Returns `false` if the queue was aborted before
    /// the message could be enqueued.
    pub fn send(&self, message: Message, priority: Priority) -> bool {
        let (bytes, duration) = message.weight();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if state.aborted {
                return false;
            }
            let over_capacity =
                state.total_bytes >= self.max_bytes || state.total_duration >= self.max_duration;
            if !over_capacity || bytes == 0 {
                break;
            }
            state = self.not_full.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        state.total_bytes += bytes;
        state.total_duration += duration;
        state.entries.push_back(Entry {
            message,
            priority,
            bytes,
            duration,
        });
        drop(state);
        self.not_empty.notify_all();
        true
    }

    /// Re-enqueues `message` at `priority` without affecting capacity
    /// accounting twice (used by the synchronize barrier to let other
    /// control messages proceed without losing the barrier message).
    pub fn requeue(&self, message: Message, priority: Priority) {
        let (bytes, duration) = message.weight();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.push_back(Entry {
            message,
            priority,
            bytes,
            duration,
        });
        drop(state);
        self.not_empty.notify_all();
    }

    /// Waits up to `timeout` for the first queued message whose
    /// priority is at least `min_priority`, scanning in FIFO order and
    /// skipping over (not discarding) lower-priority entries.
    ///
    /// `timeout` of [`Duration::ZERO`] still performs one non-blocking
    /// poll before returning [`Received::Timeout`].
    pub fn get(&self, timeout: Duration, min_priority: Priority) -> Received {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if state.aborted {
                return Received::Abort;
            }

            if let Some(index) = state
                .entries
                .iter()
                .position(|entry| entry.priority >= min_priority)
            {
                let entry = state.entries.remove(index).expect("index just found");
                state.total_bytes -= entry.bytes;
                state.total_duration -= entry.duration;
                drop(state);
                self.not_full.notify_all();
                return Received::Message(entry.message);
            }

            let now = Instant::now();
            if now >= deadline {
                return Received::Timeout;
            }
            let (next_state, result) = self
                .not_empty
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            state = next_state;
            if result.timed_out() && state.entries.is_empty() {
                return Received::Timeout;
            }
        }
    }

    /// Wakes all waiters and causes future [`MessageQueue::send`]/
    /// [`MessageQueue::get`] calls to return immediately.
    pub fn abort(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.aborted = true;
        drop(state);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Clears all queued entries without aborting the queue.
    pub fn flush(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.clear();
        state.total_bytes = 0;
        state.total_duration = 0;
        drop(state);
        self.not_full.notify_all();
    }

    /// Whether the queue currently holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.is_empty()
    }

    /// Percentage fill of the queue's byte capacity (0-100).
    #[must_use]
    pub fn level_percent(&self) -> u32 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if self.max_bytes == 0 {
            return 0;
        }
        #[expect(clippy::cast_possible_truncation)]
        let percent = (state.total_bytes * 100 / self.max_bytes) as u32;
        percent.min(100)
    }

    /// Whether the queue has been aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(bytes: usize, duration: Ticks) -> Message {
        Message::DemuxerPacket(Packet {
            data: vec![0u8; bytes].into(),
            dts: None,
            duration,
        })
    }

    #[test]
    fn fifo_within_same_priority() {
        let queue = MessageQueue::new(1_000_000, 1_000_000);
        queue.send(packet(10, 1), Priority::DataAndControl);
        queue.send(packet(20, 1), Priority::DataAndControl);

        match queue.get(Duration::from_millis(10), Priority::DataAndControl) {
            Received::Message(Message::DemuxerPacket(p)) => assert_eq!(p.data.len(), 10),
            _ => panic!("expected first packet"),
        }
        match queue.get(Duration::from_millis(10), Priority::DataAndControl) {
            Received::Message(Message::DemuxerPacket(p)) => assert_eq!(p.data.len(), 20),
            _ => panic!("expected second packet"),
        }
    }

    #[test]
    fn control_only_skips_data() {
        let queue = MessageQueue::new(1_000_000, 1_000_000);
        queue.send(packet(10, 1), Priority::DataAndControl);
        queue.send(Message::Flush, Priority::ControlOnly);

        match queue.get(Duration::from_millis(10), Priority::ControlOnly) {
            Received::Message(Message::Flush) => {}
            _ => panic!("expected flush to be serviced ahead of data"),
        }
        // Data packet is still there afterwards.
        match queue.get(Duration::from_millis(10), Priority::DataAndControl) {
            Received::Message(Message::DemuxerPacket(_)) => {}
            _ => panic!("expected the data packet to still be queued"),
        }
    }

    #[test]
    fn empty_queue_times_out() {
        let queue = MessageQueue::new(1_000_000, 1_000_000);
        match queue.get(Duration::from_millis(5), Priority::DataAndControl) {
            Received::Timeout => {}
            _ => panic!("expected timeout"),
        }
    }

    #[test]
    fn abort_wakes_blocked_get() {
        let queue = Arc::new(MessageQueue::new(1_000_000, 1_000_000));
        let other = Arc::clone(&queue);
        let handle = std::thread::spawn(move || other.get(Duration::from_secs(5), Priority::DataAndControl));
        std::thread::sleep(Duration::from_millis(20));
        queue.abort();
        match handle.join().unwrap() {
            Received::Abort => {}
            _ => panic!("expected abort"),
        }
    }

    #[test]
    fn send_blocks_over_byte_capacity() {
        let queue = Arc::new(MessageQueue::new(100, 1_000_000));
        assert!(queue.send(packet(90, 1), Priority::DataAndControl));

        let other = Arc::clone(&queue);
        let handle = std::thread::spawn(move || other.send(packet(50, 1), Priority::DataAndControl));

        std::thread::sleep(Duration::from_millis(20));
        // Drain the first packet to make room; the blocked send should then succeed.
        let _ = queue.get(Duration::from_millis(10), Priority::DataAndControl);
        assert!(handle.join().unwrap());
    }

    #[test]
    fn flush_clears_backpressure_accounting() {
        let queue = MessageQueue::new(100, 1_000_000);
        queue.send(packet(90, 1), Priority::DataAndControl);
        queue.flush();
        assert!(queue.is_empty());
        assert!(queue.send(packet(90, 1), Priority::DataAndControl));
    }
}

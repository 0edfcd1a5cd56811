//! Associates compressed-byte spans with presentation timestamps.
//!
//! Codecs buffer a variable, codec-internal number of bytes before they
//! emit a decoded frame. When a frame finally comes out, the worker
//! needs to know which input packet it started from — this queue
//! answers "what PTS applies after N bytes have been consumed?" by
//! walking its entries from newest to oldest.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::time::Pts;

/// One (byte span, timestamp) entry.
///
/// Invariant: the sum of `bytes` over a [`PtsInputQueue`] equals the
/// total bytes added but not yet consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PtsEntry {
    bytes: u64,
    pts: Pts,
}

#[derive(Debug, Default)]
struct Inner {
    /// Newest entry at the front.
    entries: VecDeque<PtsEntry>,
}

/// Byte-span-indexed PTS lookup, shared between the packet producer
/// and the decode worker.
///
/// The producer adds an entry from its own thread whenever it hands a
/// packet to the worker; the worker calls [`PtsInputQueue::get`] and
/// [`PtsInputQueue::flush`] from the decode step. Both sides may run
/// concurrently, so the queue is internally synchronized.
#[derive(Debug, Default)]
pub struct PtsInputQueue {
    inner: Mutex<Inner>,
}

impl PtsInputQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepends a new (byte span, PTS) entry. No coalescing is
    /// performed even if the previous entry also has no PTS.
    pub fn add(&self, bytes: u64, pts: Pts) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.push_front(PtsEntry { bytes, pts });
    }

    /// Clears all entries.
    pub fn flush(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.clear();
    }

    /// Walks from newest to oldest; the first entry whose cumulative
    /// byte span covers `n` supplies the PTS.
    ///
    /// If `consume`, that entry's PTS is marked as consumed (becomes
    /// `None` on future lookups) and every older entry — representing
    /// data already fully consumed — is dropped. If the walk exhausts
    /// without covering `n`, returns `None`.
    pub fn get(&self, n: u64, consume: bool) -> Pts {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let mut covered = 0u64;
        let mut found_at = None;
        for (index, entry) in inner.entries.iter().enumerate() {
            covered += entry.bytes;
            if covered >= n {
                found_at = Some(index);
                break;
            }
        }

        let Some(index) = found_at else {
            return None;
        };

        let pts = inner.entries[index].pts;

        if consume {
            inner.entries[index].pts = None;
            inner.entries.truncate(index + 1);
        }

        pts
    }

    /// Sum of byte spans currently held, for testing the garbage
    /// collection invariant.
    #[cfg(test)]
    fn total_bytes(&self) -> u64 {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.iter().map(|e| e.bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_entry_round_trips() {
        let queue = PtsInputQueue::new();
        queue.add(1000, Some(42));
        assert_eq!(queue.get(1000, true), Some(42));
    }

    #[test]
    fn flush_clears_everything() {
        let queue = PtsInputQueue::new();
        queue.add(1000, Some(42));
        queue.flush();
        assert_eq!(queue.get(1, false), None);
        assert_eq!(queue.total_bytes(), 0);
    }

    #[test]
    fn get_walks_newest_to_oldest() {
        let queue = PtsInputQueue::new();
        queue.add(500, Some(1)); // oldest, added first
        queue.add(300, Some(2)); // newest, added last -> front

        // Front-to-back: (300, pts=2), (500, pts=1). n=300 satisfied by the first entry.
        assert_eq!(queue.get(300, false), Some(2));
        // n=800 needs to cover both entries; the second (older) one supplies the PTS.
        assert_eq!(queue.get(800, false), Some(1));
    }

    #[test]
    fn consuming_get_erases_older_entries() {
        let queue = PtsInputQueue::new();
        queue.add(500, Some(1));
        queue.add(300, Some(2));

        assert_eq!(queue.get(800, true), Some(1));
        assert_eq!(queue.total_bytes(), 800);

        // The consumed entry's PTS no longer resolves.
        assert_eq!(queue.get(800, false), None);
    }

    #[test]
    fn unsatisfied_get_returns_no_pts() {
        let queue = PtsInputQueue::new();
        queue.add(100, Some(7));
        assert_eq!(queue.get(1000, false), None);
    }

    #[test]
    fn entries_without_timestamp_resolve_to_no_pts() {
        let queue = PtsInputQueue::new();
        queue.add(100, None);
        assert_eq!(queue.get(100, false), None);
    }
}

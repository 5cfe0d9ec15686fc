//! Time-ordered hand-off buffer between capture and playback.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::AudioFrame;

/// An unbounded FIFO of frames keyed by release time.
///
/// The queue is the only shared state between the capture and playback
/// workers. The producer pushes frames in capture order; because capture
/// time is monotonic and the delay is constant, insertion order equals
/// release order and the queue never re-sorts.
///
/// Cloning a `DelayQueue` yields another handle to the same buffer, so the
/// controller and both workers can hold one without external locking.
///
/// # Example
///
/// ```
/// use echo_loopback::{AudioFrame, DelayQueue};
/// use tokio::time::Instant;
///
/// let queue = DelayQueue::new();
/// let now = Instant::now();
/// queue.push(AudioFrame::new(vec![1], now));
///
/// let frame = queue.pop_if_due(now).unwrap();
/// assert_eq!(frame.payload(), &[1]);
/// assert!(queue.is_empty());
/// ```
#[derive(Clone, Default)]
pub struct DelayQueue {
    inner: Arc<Mutex<VecDeque<AudioFrame>>>,
}

impl DelayQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a frame at the tail. Always succeeds; the queue applies no
    /// backpressure of its own.
    pub fn push(&self, frame: AudioFrame) {
        self.inner.lock().push_back(frame);
    }

    /// Removes and returns the head frame iff its release time has passed.
    ///
    /// Returns `None` - leaving the queue unchanged - when the queue is
    /// empty or the head frame is still in the future.
    pub fn pop_if_due(&self, now: Instant) -> Option<AudioFrame> {
        let mut frames = self.inner.lock();
        if frames.front().is_some_and(|frame| frame.is_due(now)) {
            frames.pop_front()
        } else {
            None
        }
    }

    /// Returns the release time of the head frame without removing it.
    pub fn next_release(&self) -> Option<Instant> {
        self.inner.lock().front().map(AudioFrame::release_at)
    }

    /// Removes all frames, returning how many were discarded.
    ///
    /// The removal is a single critical section: a concurrent `pop_if_due`
    /// observes either the full queue or an empty one, never a partial clear.
    pub fn clear(&self) -> usize {
        let mut frames = self.inner.lock();
        let count = frames.len();
        frames.clear();
        count
    }

    /// Number of buffered frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns `true` if no frames are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

//! In-memory playback sink for testing without hardware.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::PlaybackSink;
use crate::error::DeviceError;

struct Inner {
    writes: Vec<(Instant, Vec<u8>)>,
    playing: bool,
    write_delay: Duration,
}

/// A sink that records every write with the instant it arrived.
///
/// An optional per-write delay simulates a slow device and exercises the
/// backpressure path: while a write is pending the playback worker is
/// throttled and the delay queue grows.
///
/// # Example
///
/// ```
/// use echo_loopback::sink::MemorySink;
///
/// let (sink, handle) = MemorySink::new();
/// // ... run the pipeline, then:
/// assert!(handle.writes().is_empty());
/// ```
pub struct MemorySink {
    inner: Arc<Mutex<Inner>>,
}

/// Test-side handle to a [`MemorySink`].
#[derive(Clone)]
pub struct MemorySinkHandle {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySink {
    /// Creates an empty sink and its test handle.
    #[must_use]
    pub fn new() -> (Self, MemorySinkHandle) {
        Self::with_write_delay(Duration::ZERO)
    }

    /// Creates a sink whose every write takes `delay` to be accepted.
    #[must_use]
    pub fn with_write_delay(delay: Duration) -> (Self, MemorySinkHandle) {
        let inner = Arc::new(Mutex::new(Inner {
            writes: Vec::new(),
            playing: false,
            write_delay: delay,
        }));
        (
            Self {
                inner: inner.clone(),
            },
            MemorySinkHandle { inner },
        )
    }
}

impl MemorySinkHandle {
    /// Snapshot of all writes so far, in arrival order.
    #[must_use]
    pub fn writes(&self) -> Vec<(Instant, Vec<u8>)> {
        self.inner.lock().writes.clone()
    }

    /// Payloads only, in arrival order.
    #[must_use]
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .writes
            .iter()
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Number of writes recorded.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.inner.lock().writes.len()
    }

    /// Returns `true` while the sink is started.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.inner.lock().playing
    }
}

#[async_trait]
impl PlaybackSink for MemorySink {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.inner.lock().playing = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.inner.lock().playing = false;
    }

    async fn write(&mut self, payload: &[u8]) -> Result<(), DeviceError> {
        let delay = self.inner.lock().write_delay;
        if delay > Duration::ZERO {
            // Simulated device buffer acceptance time
            tokio::time::sleep(delay).await;
        }
        self.inner
            .lock()
            .writes
            .push((Instant::now(), payload.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_writes_in_order() {
        let (mut sink, handle) = MemorySink::new();
        sink.write(&[1]).await.unwrap();
        sink.write(&[2]).await.unwrap();

        assert_eq!(handle.payloads(), vec![vec![1], vec![2]]);
        assert_eq!(handle.write_count(), 2);
    }

    #[tokio::test]
    async fn test_playing_state() {
        let (mut sink, handle) = MemorySink::new();
        assert!(!handle.is_playing());
        sink.start().unwrap();
        assert!(handle.is_playing());
        sink.stop();
        assert!(!handle.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_delay_throttles() {
        let (mut sink, handle) = MemorySink::with_write_delay(Duration::from_millis(250));
        let before = Instant::now();
        sink.write(&[1]).await.unwrap();

        let (at, _) = handle.writes()[0];
        assert!(at - before >= Duration::from_millis(250));
    }
}

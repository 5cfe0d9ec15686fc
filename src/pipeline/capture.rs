//! Capture worker - turns raw input samples into timestamped frames.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::{PipelineState, SharedCapture};
use crate::event::EventCallback;
use crate::queue::DelayQueue;
use crate::{AudioFrame, LoopbackConfig, LoopbackEvent};

/// Long-lived task that reads fixed-size frames from the capture source,
/// stamps each with `now + delay`, and pushes it onto the delay queue.
///
/// The worker parks (sleeps one idle interval per step) while no source is
/// held or the source is not recording. Short and failed reads are discarded
/// and retried; after `short_read_limit` consecutive misses the retry gains
/// a small back-off so an idle device cannot saturate a core. Short reads
/// are expected between frames of a real-time device, so a stall is only
/// reported when no full read has landed for longer than one idle interval.
pub(crate) struct CaptureWorker {
    capture: SharedCapture,
    queue: DelayQueue,
    state: Arc<PipelineState>,
    events: Option<EventCallback>,
    frame_bytes: usize,
    delay: Duration,
    idle_interval: Duration,
    short_read_limit: u32,
    short_read_backoff: Duration,
}

impl CaptureWorker {
    pub fn new(
        capture: SharedCapture,
        queue: DelayQueue,
        state: Arc<PipelineState>,
        config: &LoopbackConfig,
        events: Option<EventCallback>,
    ) -> Self {
        Self {
            capture,
            queue,
            state,
            events,
            frame_bytes: config.frame_bytes(),
            delay: config.delay,
            idle_interval: config.idle_interval,
            short_read_limit: config.short_read_limit,
            short_read_backoff: config.short_read_backoff,
        }
    }

    /// Runs until the pipeline shuts down.
    pub async fn run(self) {
        tracing::debug!(
            frame_bytes = self.frame_bytes,
            delay_ms = self.delay.as_millis() as u64,
            "capture worker running"
        );

        let mut buf = vec![0u8; self.frame_bytes];
        let mut short_streak: u32 = 0;
        let mut last_full_read = Instant::now();
        let mut stall_reported = false;

        while !self.state.shutdown.load(Ordering::SeqCst) {
            // The lock is held only for the duration of one non-blocking read.
            let attempt = {
                let mut guard = self.capture.lock().await;
                match guard.as_mut() {
                    Some(source) if source.is_recording() => Some(source.read(&mut buf).await),
                    _ => None,
                }
            };

            let Some(result) = attempt else {
                // Parked: idle lifecycle or device not recording.
                short_streak = 0;
                last_full_read = Instant::now();
                stall_reported = false;
                tokio::time::sleep(self.idle_interval).await;
                continue;
            };

            match result {
                Ok(n) if n == self.frame_bytes => {
                    short_streak = 0;
                    last_full_read = Instant::now();
                    stall_reported = false;
                    let release_at = Instant::now() + self.delay;
                    self.queue.push(AudioFrame::new(buf.clone(), release_at));
                    self.state.frames_captured.fetch_add(1, Ordering::SeqCst);
                }
                Ok(n) => {
                    // Short or zero read: discard, no frame is emitted.
                    tracing::trace!(bytes = n, expected = self.frame_bytes, "short read");
                    self.short_read(&mut short_streak, last_full_read, &mut stall_reported)
                        .await;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "capture read failed");
                    self.short_read(&mut short_streak, last_full_read, &mut stall_reported)
                        .await;
                }
            }
        }

        tracing::debug!("capture worker shutting down");
    }

    /// Retry pacing and stall detection for short and failed reads.
    ///
    /// Pacing is count-based: the first `short_read_limit` retries are
    /// immediate, past that each retry sleeps `short_read_backoff`. A full
    /// read resets the streak.
    ///
    /// Stall detection is time-based, because short reads between frames are
    /// normal for a device delivering at real-time rate: a stall is reported
    /// (once, until data flows again) only when no full read has landed for
    /// longer than one idle interval.
    async fn short_read(&self, streak: &mut u32, last_full_read: Instant, reported: &mut bool) {
        *streak = streak.saturating_add(1);
        self.state.short_reads.fetch_add(1, Ordering::SeqCst);

        if !*reported && last_full_read.elapsed() > self.idle_interval {
            *reported = true;
            tracing::warn!(
                consecutive = *streak,
                since_last_frame_ms = last_full_read.elapsed().as_millis() as u64,
                "capture stalled, no full frame for over one idle interval"
            );
            self.emit(LoopbackEvent::CaptureStalled {
                consecutive_short_reads: *streak,
            });
        }
        if *streak >= self.short_read_limit {
            tokio::time::sleep(self.short_read_backoff).await;
        }
    }

    fn emit(&self, event: LoopbackEvent) {
        if let Some(ref callback) = self.events {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{CaptureSource, MockCapture};
    use tokio::sync::Mutex;

    fn spawn_worker(
        capture: MockCapture,
        recording: bool,
        config: &LoopbackConfig,
        events: Option<EventCallback>,
    ) -> (DelayQueue, Arc<PipelineState>, tokio::task::JoinHandle<()>) {
        let mut capture = capture;
        if recording {
            capture.start().unwrap();
        }
        let shared: SharedCapture = Arc::new(Mutex::new(Some(Box::new(capture) as _)));
        let queue = DelayQueue::new();
        let state = Arc::new(PipelineState::new());
        let worker = CaptureWorker::new(shared, queue.clone(), state.clone(), config, events);
        let handle = tokio::spawn(worker.run());
        (queue, state, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_reads_become_delayed_frames() {
        let config = LoopbackConfig::default();
        let frame_bytes = config.frame_bytes();

        let (capture, script) = MockCapture::new();
        script.push_frame(vec![0xAA; frame_bytes]);
        script.push_frame(vec![0xBB; frame_bytes]);

        let before = Instant::now();
        let (queue, state, handle) = spawn_worker(capture, true, &config, None);

        // Let the worker consume the script.
        tokio::time::sleep(Duration::from_millis(50)).await;
        state.shutdown.store(true, Ordering::SeqCst);
        handle.await.unwrap();

        assert_eq!(queue.len(), 2);
        assert_eq!(state.frames_captured.load(Ordering::SeqCst), 2);

        let release = queue.next_release().unwrap();
        assert!(release >= before + config.delay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_reads_emit_no_frames() {
        let config = LoopbackConfig::default();
        let (capture, script) = MockCapture::new();
        script.push_short(10);
        script.push_short(0);
        script.push_failure("glitch");

        let (queue, state, handle) = spawn_worker(capture, true, &config, None);

        tokio::time::sleep(Duration::from_millis(100)).await;
        state.shutdown.store(true, Ordering::SeqCst);
        handle.await.unwrap();

        assert!(queue.is_empty());
        assert_eq!(state.frames_captured.load(Ordering::SeqCst), 0);
        assert!(state.short_reads.load(Ordering::SeqCst) >= 3);
    }

    fn stall_counter() -> (Arc<std::sync::atomic::AtomicUsize>, EventCallback) {
        use std::sync::atomic::AtomicUsize;

        let stalls = Arc::new(AtomicUsize::new(0));
        let stalls_clone = stalls.clone();
        let events = crate::event_callback(move |event| {
            if matches!(event, LoopbackEvent::CaptureStalled { .. }) {
                stalls_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        (stalls, events)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_event_fires_once_per_stall() {
        let config = LoopbackConfig::default();
        let (capture, _script) = MockCapture::new(); // empty script: all reads short
        let (stalls, events) = stall_counter();

        let (_queue, state, handle) = spawn_worker(capture, true, &config, Some(events));

        // Well past the idle interval with no data at all: one report, not
        // one per retry.
        tokio::time::sleep(Duration::from_millis(500)).await;
        state.shutdown.store(true, Ordering::SeqCst);
        handle.await.unwrap();

        assert_eq!(stalls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_real_time_capture_emits_no_stall_events() {
        let config = LoopbackConfig::default();
        let frame_bytes = config.frame_bytes();
        let (capture, script) = MockCapture::new();
        let (stalls, events) = stall_counter();

        let (queue, state, handle) = spawn_worker(capture, true, &config, Some(events));

        // A healthy device: one full frame per frame duration, every read in
        // between coming up short.
        for _ in 0..50 {
            script.push_frame(vec![0x55; frame_bytes]);
            tokio::time::sleep(config.frame_duration).await;
        }
        tokio::time::sleep(Duration::from_millis(40)).await;
        state.shutdown.store(true, Ordering::SeqCst);
        handle.await.unwrap();

        assert_eq!(state.frames_captured.load(Ordering::SeqCst), 50);
        assert_eq!(queue.len(), 50);
        assert_eq!(
            stalls.load(Ordering::SeqCst),
            0,
            "stall events during healthy real-time capture"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_reported_again_after_recovery() {
        let config = LoopbackConfig::default();
        let frame_bytes = config.frame_bytes();
        let (capture, script) = MockCapture::new();
        let (stalls, events) = stall_counter();

        let (_queue, state, handle) = spawn_worker(capture, true, &config, Some(events));

        // First stall
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(stalls.load(Ordering::SeqCst), 1);

        // Recovery resets the detector
        script.push_frame(vec![1; frame_bytes]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stalls.load(Ordering::SeqCst), 1);

        // Second dry spell is a new stall
        tokio::time::sleep(Duration::from_millis(300)).await;
        state.shutdown.store(true, Ordering::SeqCst);
        handle.await.unwrap();

        assert_eq!(stalls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parks_while_not_recording() {
        let config = LoopbackConfig::default();
        let frame_bytes = config.frame_bytes();

        let (capture, script) = MockCapture::new();
        script.push_frame(vec![1; frame_bytes]);

        // recording = false: the worker must not touch the script
        let (queue, state, handle) = spawn_worker(capture, false, &config, None);

        tokio::time::sleep(Duration::from_millis(500)).await;
        state.shutdown.store(true, Ordering::SeqCst);
        handle.await.unwrap();

        assert!(queue.is_empty());
        assert_eq!(script.remaining(), 1);
    }
}

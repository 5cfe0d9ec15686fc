//! Playback worker - releases due frames to the output sink.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::{PipelineState, SharedPlayback};
use crate::event::EventCallback;
use crate::queue::DelayQueue;
use crate::{LoopbackConfig, LoopbackEvent};

/// Long-lived task that pops frames whose release time has passed and writes
/// them to the playback sink.
///
/// When nothing is due the worker parks for one idle interval, so a frame
/// due at `t` plays somewhere in `[t, t + idle_interval)`. Due frames are
/// drained back-to-back with no sleep in between, which lets the queue catch
/// up after a sink stall. The sink write is the pipeline's only
/// backpressure point and may block.
pub(crate) struct PlaybackWorker {
    playback: SharedPlayback,
    queue: DelayQueue,
    state: Arc<PipelineState>,
    events: Option<EventCallback>,
    idle_interval: Duration,
}

impl PlaybackWorker {
    pub fn new(
        playback: SharedPlayback,
        queue: DelayQueue,
        state: Arc<PipelineState>,
        config: &LoopbackConfig,
        events: Option<EventCallback>,
    ) -> Self {
        Self {
            playback,
            queue,
            state,
            events,
            idle_interval: config.idle_interval,
        }
    }

    /// Runs until the pipeline shuts down.
    pub async fn run(self) {
        tracing::debug!(
            idle_ms = self.idle_interval.as_millis() as u64,
            "playback worker running"
        );

        while !self.state.shutdown.load(Ordering::SeqCst) {
            match self.queue.pop_if_due(Instant::now()) {
                Some(frame) => {
                    self.write_frame(&frame.into_payload()).await;
                    // Immediately try the next frame: due backlog drains
                    // without the idle delay.
                }
                None => {
                    // Parked: queue empty or head still in the future.
                    tokio::time::sleep(self.idle_interval).await;
                }
            }
        }

        tracing::debug!("playback worker shutting down");
    }

    async fn write_frame(&self, payload: &[u8]) {
        let mut guard = self.playback.lock().await;
        let Some(sink) = guard.as_mut() else {
            // Resource released mid-flight; the frame is dropped.
            return;
        };
        match sink.write(payload).await {
            Ok(()) => {
                self.state.frames_played.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                tracing::warn!(error = %e, "playback write failed, dropping frame");
                self.emit(LoopbackEvent::SinkWriteFailed {
                    reason: e.to_string(),
                });
            }
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
    use crate::sink::{MemorySink, PlaybackSink};
    use crate::AudioFrame;
    use tokio::sync::Mutex;

    fn spawn_worker(
        sink: MemorySink,
        config: &LoopbackConfig,
    ) -> (
        DelayQueue,
        Arc<PipelineState>,
        tokio::task::JoinHandle<()>,
    ) {
        let mut sink = sink;
        sink.start().unwrap();
        let shared: SharedPlayback = Arc::new(Mutex::new(Some(Box::new(sink) as _)));
        let queue = DelayQueue::new();
        let state = Arc::new(PipelineState::new());
        let worker = PlaybackWorker::new(shared, queue.clone(), state.clone(), config, None);
        let handle = tokio::spawn(worker.run());
        (queue, state, handle)
    }

    async fn shut_down(state: &PipelineState, handle: tokio::task::JoinHandle<()>) {
        state.shutdown.store(true, Ordering::SeqCst);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_frame_plays_within_idle_interval() {
        let config = LoopbackConfig::default();
        let (sink, writes) = MemorySink::new();
        let (queue, state, handle) = spawn_worker(sink, &config);

        let release = Instant::now() + Duration::from_millis(500);
        queue.push(AudioFrame::new(vec![7; 4], release));

        tokio::time::sleep(Duration::from_secs(1)).await;
        shut_down(&state, handle).await;

        let recorded = writes.writes();
        assert_eq!(recorded.len(), 1);
        let (at, payload) = &recorded[0];
        assert_eq!(payload, &vec![7; 4]);
        assert!(*at >= release);
        assert!(*at < release + config.idle_interval + Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_future_frame_stays_queued() {
        let config = LoopbackConfig::default();
        let (sink, writes) = MemorySink::new();
        let (queue, state, handle) = spawn_worker(sink, &config);

        queue.push(AudioFrame::new(
            vec![1],
            Instant::now() + Duration::from_secs(60),
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(writes.write_count(), 0);
        assert_eq!(queue.len(), 1);
        shut_down(&state, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_backlog_drains_back_to_back() {
        let config = LoopbackConfig::default();
        let (sink, writes) = MemorySink::new();
        let (queue, state, handle) = spawn_worker(sink, &config);

        // Three frames already overdue
        let past = Instant::now();
        for marker in 1u8..=3 {
            queue.push(AudioFrame::new(vec![marker], past));
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        shut_down(&state, handle).await;

        assert_eq!(writes.payloads(), vec![vec![1], vec![2], vec![3]]);
        assert_eq!(state.frames_played.load(Ordering::SeqCst), 3);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_sink_backpressure_preserves_order() {
        let config = LoopbackConfig::default();
        // Each write takes 3x the idle interval to be accepted.
        let (sink, writes) = MemorySink::with_write_delay(Duration::from_millis(300));
        let (queue, state, handle) = spawn_worker(sink, &config);

        let now = Instant::now();
        for marker in 1u8..=4 {
            queue.push(AudioFrame::new(vec![marker], now));
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        shut_down(&state, handle).await;

        assert_eq!(writes.payloads(), vec![vec![1], vec![2], vec![3], vec![4]]);
    }

    fn failing_sink() -> Box<dyn PlaybackSink> {
        use crate::error::DeviceError;
        use async_trait::async_trait;

        struct FailingSink;

        #[async_trait]
        impl PlaybackSink for FailingSink {
            fn start(&mut self) -> Result<(), DeviceError> {
                Ok(())
            }
            fn stop(&mut self) {}
            async fn write(&mut self, _payload: &[u8]) -> Result<(), DeviceError> {
                Err(DeviceError::backend("broken"))
            }
        }

        Box::new(FailingSink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_drops_frame_and_continues() {
        use std::sync::atomic::AtomicUsize;

        let config = LoopbackConfig::default();
        let shared: SharedPlayback = Arc::new(Mutex::new(Some(failing_sink())));
        let queue = DelayQueue::new();
        let state = Arc::new(PipelineState::new());

        let failures = Arc::new(AtomicUsize::new(0));
        let failures_clone = failures.clone();
        let events = crate::event_callback(move |event| {
            if matches!(event, LoopbackEvent::SinkWriteFailed { .. }) {
                failures_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        let worker =
            PlaybackWorker::new(shared, queue.clone(), state.clone(), &config, Some(events));
        let handle = tokio::spawn(worker.run());

        queue.push(AudioFrame::new(vec![1], Instant::now()));
        queue.push(AudioFrame::new(vec![2], Instant::now()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        shut_down(&state, handle).await;

        assert_eq!(failures.load(Ordering::SeqCst), 2);
        assert_eq!(state.frames_played.load(Ordering::SeqCst), 0);
        assert!(queue.is_empty());
    }
}

//! Lifecycle controller - the one component collaborators call into.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::LoopbackConfig;
use crate::event::EventCallback;
use crate::permission::PermissionGate;
use crate::pipeline::{PipelineState, SharedCapture, SharedPlayback};
use crate::queue::DelayQueue;
use crate::route::DeviceRouter;
use crate::sink::PlaybackProvider;
use crate::source::CaptureProvider;
use crate::LoopbackEvent;

/// Counters describing a running loopback.
#[derive(Debug, Clone, Default)]
pub struct LoopbackStats {
    /// Frames captured and queued.
    pub frames_captured: u64,
    /// Frames released to the playback sink.
    pub frames_played: u64,
    /// Frames discarded by `stop()`.
    pub frames_discarded: u64,
    /// Short or failed capture reads.
    pub short_reads: u64,
}

/// Owns the delayed-loopback lifecycle: the capture and playback resources,
/// the delay queue, and the two worker tasks.
///
/// Returned by [`LoopbackBuilder::spawn()`]. The workers are spawned
/// immediately but parked; [`start()`](Self::start) and
/// [`stop()`](Self::stop) toggle the data flow, and both are idempotent.
/// Call [`shutdown()`](Self::shutdown) to tear the workers down.
///
/// # Example
///
/// ```ignore
/// let controller = EchoLoopback::builder()
///     .capture(CpalCapture::provider())
///     .playback(CpalPlayback::provider())
///     .spawn()?;
///
/// controller.start().await;
/// assert!(controller.is_active().await);
/// controller.stop().await;
/// controller.shutdown().await;
/// ```
pub struct LoopbackController {
    config: LoopbackConfig,
    queue: DelayQueue,
    state: Arc<PipelineState>,
    capture: SharedCapture,
    playback: SharedPlayback,
    capture_provider: Arc<dyn CaptureProvider>,
    playback_provider: Arc<dyn PlaybackProvider>,
    permissions: Arc<dyn PermissionGate>,
    router: Arc<dyn DeviceRouter>,
    events: Option<EventCallback>,
    capture_task: Option<JoinHandle<()>>,
    playback_task: Option<JoinHandle<()>>,
}

impl LoopbackController {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: LoopbackConfig,
        queue: DelayQueue,
        state: Arc<PipelineState>,
        capture: SharedCapture,
        playback: SharedPlayback,
        capture_provider: Arc<dyn CaptureProvider>,
        playback_provider: Arc<dyn PlaybackProvider>,
        permissions: Arc<dyn PermissionGate>,
        router: Arc<dyn DeviceRouter>,
        events: Option<EventCallback>,
        capture_task: JoinHandle<()>,
        playback_task: JoinHandle<()>,
    ) -> Self {
        Self {
            config,
            queue,
            state,
            capture,
            playback,
            capture_provider,
            playback_provider,
            permissions,
            router,
            events,
            capture_task: Some(capture_task),
            playback_task: Some(playback_task),
        }
    }

    /// Returns `true` while the capture resource is actively recording.
    ///
    /// This is the single source of truth for toggle logic: it reflects the
    /// device state, not a separately tracked flag.
    pub async fn is_active(&self) -> bool {
        self.capture
            .lock()
            .await
            .as_ref()
            .is_some_and(|source| source.is_recording())
    }

    /// Begins capture and playback. No-op if already active.
    ///
    /// Acquisition is lazy and forgiving: a denied permission gate or a
    /// device that fails to open leaves the loopback idle without an error,
    /// and a later `start()` retries. Preferred-device routing failures fall
    /// back to the default route.
    pub async fn start(&self) {
        let mut capture = self.capture.lock().await;
        if capture.as_ref().is_some_and(|source| source.is_recording()) {
            return;
        }

        if capture.is_none() {
            if !self.permissions.capture_allowed() {
                tracing::warn!("capture permission not granted, start is a no-op");
                self.emit(LoopbackEvent::CaptureUnavailable {
                    reason: "permission denied".to_string(),
                });
                return;
            }
            match self.capture_provider.open(&self.config.audio) {
                Ok(source) => *capture = Some(source),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to open capture device");
                    self.emit(LoopbackEvent::CaptureUnavailable {
                        reason: e.to_string(),
                    });
                    return;
                }
            }
        }

        let mut playback = self.playback.lock().await;
        if playback.is_none() {
            match self.playback_provider.open(&self.config.audio) {
                Ok(sink) => *playback = Some(sink),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to open playback device");
                    self.emit(LoopbackEvent::PlaybackUnavailable {
                        reason: e.to_string(),
                    });
                    return;
                }
            }
        }

        if let Err(e) = self.router.route(&self.config.audio) {
            // Non-fatal: keep going on the default route.
            tracing::warn!(error = %e, "device routing failed, using default route");
            self.emit(LoopbackEvent::RoutingFailed {
                reason: e.to_string(),
            });
        }

        if let Some(sink) = playback.as_mut() {
            if let Err(e) = sink.start() {
                tracing::warn!(error = %e, "failed to start playback");
                self.emit(LoopbackEvent::PlaybackUnavailable {
                    reason: e.to_string(),
                });
                return;
            }
        }
        if let Some(source) = capture.as_mut() {
            if let Err(e) = source.start() {
                tracing::warn!(error = %e, "failed to start capture");
                if let Some(sink) = playback.as_mut() {
                    sink.stop();
                }
                self.emit(LoopbackEvent::CaptureUnavailable {
                    reason: e.to_string(),
                });
                return;
            }
        }

        tracing::info!(
            delay_ms = self.config.delay.as_millis() as u64,
            "loopback started"
        );
        self.emit(LoopbackEvent::Started);
    }

    /// Halts capture and playback and discards buffered frames. No-op if
    /// already idle.
    ///
    /// The resources stay open (stopped) for the next `start()`; the workers
    /// observe the stopped state on their next step and park. Clearing the
    /// queue guarantees a restart never replays stale audio.
    pub async fn stop(&self) {
        {
            let mut capture = self.capture.lock().await;
            match capture.as_mut() {
                Some(source) if source.is_recording() => source.stop(),
                _ => return,
            }
        }
        {
            let mut playback = self.playback.lock().await;
            if let Some(sink) = playback.as_mut() {
                sink.stop();
            }
        }

        let discarded = self.queue.clear();
        self.state
            .frames_discarded
            .fetch_add(discarded as u64, Ordering::SeqCst);
        if discarded > 0 {
            self.emit(LoopbackEvent::FramesDiscarded { count: discarded });
        }

        tracing::info!(discarded, "loopback stopped");
        self.emit(LoopbackEvent::Stopped);
    }

    /// Edge-triggered toggle: `stop()` if active, else `start()`.
    ///
    /// The hook an external trigger (hardware button, hotkey) calls;
    /// debouncing is the trigger's job.
    pub async fn toggle(&self) {
        if self.is_active().await {
            self.stop().await;
        } else {
            self.start().await;
        }
    }

    /// Current pipeline counters.
    pub fn stats(&self) -> LoopbackStats {
        LoopbackStats {
            frames_captured: self.state.frames_captured.load(Ordering::SeqCst),
            frames_played: self.state.frames_played.load(Ordering::SeqCst),
            frames_discarded: self.state.frames_discarded.load(Ordering::SeqCst),
            short_reads: self.state.short_reads.load(Ordering::SeqCst),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &LoopbackConfig {
        &self.config
    }

    /// Stops the loopback, tears down both workers, and releases the
    /// capture and playback resources.
    pub async fn shutdown(mut self) {
        self.stop().await;
        self.state.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.capture_task.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.playback_task.take() {
            let _ = handle.await;
        }

        *self.capture.lock().await = None;
        *self.playback.lock().await = None;
        tracing::info!("loopback shut down");
    }

    fn emit(&self, event: LoopbackEvent) {
        if let Some(ref callback) = self.events {
            callback(event);
        }
    }
}

impl Drop for LoopbackController {
    fn drop(&mut self) {
        // Dropped without explicit shutdown(): let the workers exit on their
        // next step instead of leaving them polling forever.
        self.state.shutdown.store(true, Ordering::SeqCst);
    }
}

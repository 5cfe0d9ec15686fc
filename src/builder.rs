//! Builder for the delayed-loopback pipeline.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::LoopbackConfig;
use crate::controller::LoopbackController;
use crate::error::LoopbackError;
use crate::event::{event_callback, EventCallback};
use crate::permission::{AlwaysAllowed, PermissionGate};
use crate::pipeline::{CaptureWorker, PipelineState, PlaybackWorker, SharedCapture, SharedPlayback};
use crate::queue::DelayQueue;
use crate::route::{DeviceRouter, NoopRouter};
use crate::sink::PlaybackProvider;
use crate::source::CaptureProvider;
use crate::LoopbackEvent;

/// Builder for configuring and spawning a delayed loopback.
///
/// Use [`EchoLoopback::builder()`] to create one. A capture provider and a
/// playback provider are required; permission gate, router, configuration,
/// and event callback are optional.
///
/// # Example
///
/// ```ignore
/// use echo_loopback::{EchoLoopback, LoopbackConfig};
/// use echo_loopback::source::CpalCapture;
/// use echo_loopback::sink::CpalPlayback;
/// use std::time::Duration;
///
/// let controller = EchoLoopback::builder()
///     .capture(CpalCapture::provider())
///     .playback(CpalPlayback::provider())
///     .config(LoopbackConfig {
///         delay: Duration::from_secs(2),
///         ..Default::default()
///     })
///     .on_event(|e| tracing::warn!(?e, "loopback event"))
///     .spawn()?;
/// ```
///
/// [`EchoLoopback::builder()`]: crate::EchoLoopback::builder
#[must_use]
pub struct LoopbackBuilder {
    capture: Option<Arc<dyn CaptureProvider>>,
    playback: Option<Arc<dyn PlaybackProvider>>,
    permissions: Arc<dyn PermissionGate>,
    router: Arc<dyn DeviceRouter>,
    config: LoopbackConfig,
    events: Option<EventCallback>,
}

impl Default for LoopbackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            capture: None,
            playback: None,
            permissions: Arc::new(AlwaysAllowed),
            router: Arc::new(NoopRouter),
            config: LoopbackConfig::default(),
            events: None,
        }
    }

    /// Sets the capture provider. Required.
    pub fn capture<P: CaptureProvider + 'static>(mut self, provider: P) -> Self {
        self.capture = Some(Arc::new(provider));
        self
    }

    /// Sets the capture provider from a pre-wrapped `Arc`.
    pub fn capture_arc(mut self, provider: Arc<dyn CaptureProvider>) -> Self {
        self.capture = Some(provider);
        self
    }

    /// Sets the playback provider. Required.
    pub fn playback<P: PlaybackProvider + 'static>(mut self, provider: P) -> Self {
        self.playback = Some(Arc::new(provider));
        self
    }

    /// Sets the playback provider from a pre-wrapped `Arc`.
    pub fn playback_arc(mut self, provider: Arc<dyn PlaybackProvider>) -> Self {
        self.playback = Some(provider);
        self
    }

    /// Sets the permission gate consulted before opening the capture device.
    ///
    /// Default: [`AlwaysAllowed`].
    pub fn permissions<G: PermissionGate + 'static>(mut self, gate: G) -> Self {
        self.permissions = Arc::new(gate);
        self
    }

    /// Sets the device router invoked on each `start()`.
    ///
    /// Default: [`NoopRouter`].
    pub fn router<R: DeviceRouter + 'static>(mut self, router: R) -> Self {
        self.router = Arc::new(router);
        self
    }

    /// Sets the loopback configuration.
    pub fn config(mut self, config: LoopbackConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets a callback for runtime events.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(LoopbackEvent) + Send + Sync + 'static,
    {
        self.events = Some(event_callback(callback));
        self
    }

    fn validate(&self) -> Result<(), LoopbackError> {
        if self.capture.is_none() {
            return Err(LoopbackError::NoCaptureConfigured);
        }
        if self.playback.is_none() {
            return Err(LoopbackError::NoPlaybackConfigured);
        }
        if self.config.frame_bytes() == 0 {
            return Err(LoopbackError::InvalidConfig {
                reason: "frame size is zero; check sample rate and frame duration".to_string(),
            });
        }
        if self.config.idle_interval.is_zero() {
            return Err(LoopbackError::InvalidConfig {
                reason: "idle interval must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Spawns the capture and playback workers (parked) and returns the
    /// controller, idle, ready for `start()`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if a provider is missing or the configuration is
    /// unusable. Device trouble is not an error here - resources are only
    /// acquired by `start()`.
    pub fn spawn(self) -> Result<LoopbackController, LoopbackError> {
        self.validate()?;

        // Validated above.
        let capture_provider = self.capture.ok_or(LoopbackError::NoCaptureConfigured)?;
        let playback_provider = self.playback.ok_or(LoopbackError::NoPlaybackConfigured)?;

        let queue = DelayQueue::new();
        let state = Arc::new(PipelineState::new());
        let capture: SharedCapture = Arc::new(Mutex::new(None));
        let playback: SharedPlayback = Arc::new(Mutex::new(None));

        let capture_task = tokio::spawn(
            CaptureWorker::new(
                capture.clone(),
                queue.clone(),
                state.clone(),
                &self.config,
                self.events.clone(),
            )
            .run(),
        );
        let playback_task = tokio::spawn(
            PlaybackWorker::new(
                playback.clone(),
                queue.clone(),
                state.clone(),
                &self.config,
                self.events.clone(),
            )
            .run(),
        );

        Ok(LoopbackController::new(
            self.config,
            queue,
            state,
            capture,
            playback,
            capture_provider,
            playback_provider,
            self.permissions,
            self.router,
            self.events,
            capture_task,
            playback_task,
        ))
    }
}

/// Main entry point for echo-loopback.
///
/// Use [`EchoLoopback::builder()`] to configure and spawn a loopback.
pub struct EchoLoopback;

impl EchoLoopback {
    /// Creates a new builder.
    pub fn builder() -> LoopbackBuilder {
        LoopbackBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioConfig;
    use crate::error::DeviceError;
    use crate::sink::PlaybackSink;
    use crate::source::CaptureSource;

    fn unavailable_capture(
        _config: &AudioConfig,
    ) -> Result<Box<dyn CaptureSource>, DeviceError> {
        Err(DeviceError::unavailable("test"))
    }

    fn unavailable_playback(
        _config: &AudioConfig,
    ) -> Result<Box<dyn PlaybackSink>, DeviceError> {
        Err(DeviceError::unavailable("test"))
    }

    #[test]
    fn test_spawn_requires_capture() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let result = EchoLoopback::builder().playback(unavailable_playback).spawn();
        assert!(matches!(result, Err(LoopbackError::NoCaptureConfigured)));
    }

    #[test]
    fn test_spawn_requires_playback() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let result = EchoLoopback::builder().capture(unavailable_capture).spawn();
        assert!(matches!(result, Err(LoopbackError::NoPlaybackConfigured)));
    }

    #[test]
    fn test_spawn_rejects_zero_frame() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let result = EchoLoopback::builder()
            .capture(unavailable_capture)
            .playback(unavailable_playback)
            .config(LoopbackConfig {
                frame_duration: std::time::Duration::ZERO,
                ..Default::default()
            })
            .spawn();
        assert!(matches!(result, Err(LoopbackError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_spawn_starts_idle() {
        let controller = EchoLoopback::builder()
            .capture(unavailable_capture)
            .playback(unavailable_playback)
            .spawn()
            .unwrap();

        assert!(!controller.is_active().await);
        controller.shutdown().await;
    }
}

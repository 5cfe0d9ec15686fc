//! Device routing invoked when the loopback starts.

use crate::config::AudioConfig;
use crate::error::DeviceError;

/// External hook that steers capture and playback toward a preferred device.
///
/// The controller invokes the router once per `start()`, after the capture
/// and playback resources are acquired. The intended use is preferring a
/// wireless or communication-class headset over the system default. Routing
/// failures are never fatal: the controller logs them, emits
/// [`LoopbackEvent::RoutingFailed`], and continues on the default route.
///
/// [`LoopbackEvent::RoutingFailed`]: crate::LoopbackEvent::RoutingFailed
pub trait DeviceRouter: Send + Sync {
    /// Attempts to route audio to the preferred device.
    ///
    /// # Errors
    ///
    /// Returns an error when no preferred device could be selected; the
    /// caller treats this as a fall-back-to-default, not a failure.
    fn route(&self, config: &AudioConfig) -> Result<(), DeviceError>;
}

/// A router that leaves device selection to the platform default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRouter;

impl DeviceRouter for NoopRouter {
    fn route(&self, _config: &AudioConfig) -> Result<(), DeviceError> {
        Ok(())
    }
}

impl<F> DeviceRouter for F
where
    F: Fn(&AudioConfig) -> Result<(), DeviceError> + Send + Sync,
{
    fn route(&self, config: &AudioConfig) -> Result<(), DeviceError> {
        self(config)
    }
}

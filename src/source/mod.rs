//! Capture source abstraction and implementations.
//!
//! A [`CaptureSource`] is the input side of the loopback: the capture worker
//! reads fixed-size frames from it. The crate provides two implementations:
//!
//! - [`CpalCapture`]: captures from a real input device via CPAL
//! - [`MockCapture`]: scripted byte frames for tests and CI
//!
//! Sources are opened lazily through a [`CaptureProvider`], so `start()` can
//! retry acquisition after a denied permission or busy device.

mod device;
mod mock;

pub use device::CpalCapture;
pub use mock::{MockCapture, MockCaptureHandle, MockCaptureProvider};

use async_trait::async_trait;

use crate::config::AudioConfig;
use crate::error::DeviceError;

/// An input device delivering raw 16-bit PCM bytes.
///
/// # Implementation Notes
///
/// - `read` must not block waiting for data: return whatever is available
///   (possibly zero bytes) and let the capture worker handle retry pacing
/// - `is_recording` is the lifecycle's single source of truth; `start` and
///   `stop` are only ever called by the controller
#[async_trait]
pub trait CaptureSource: Send {
    /// Begins recording.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying device refuses to start; the
    /// controller treats this as a failed acquisition and stays idle.
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Stops recording. The source stays open for a later `start`.
    fn stop(&mut self);

    /// Returns `true` while the device is actively recording.
    fn is_recording(&self) -> bool;

    /// Reads up to `buf.len()` bytes of captured PCM into `buf`.
    ///
    /// Returns the number of bytes written. A return shorter than the
    /// requested frame (including zero) is a short read, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error on device failure; the capture worker discards the
    /// attempt and retries with back-off.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError>;
}

/// Opens capture sources on demand.
///
/// The controller calls `open` from `start()` whenever no source is held,
/// so acquisition can be retried after a permission grant. Implemented for
/// any matching closure.
pub trait CaptureProvider: Send + Sync {
    /// Opens a capture source for the given format.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be opened; `start()` degrades
    /// to a no-op and may be called again later.
    fn open(&self, config: &AudioConfig) -> Result<Box<dyn CaptureSource>, DeviceError>;
}

impl<F> CaptureProvider for F
where
    F: Fn(&AudioConfig) -> Result<Box<dyn CaptureSource>, DeviceError> + Send + Sync,
{
    fn open(&self, config: &AudioConfig) -> Result<Box<dyn CaptureSource>, DeviceError> {
        self(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_provider() {
        let provider = |_config: &AudioConfig| -> Result<Box<dyn CaptureSource>, DeviceError> {
            Err(DeviceError::unavailable("no hardware in tests"))
        };
        assert!(provider.open(&AudioConfig::default()).is_err());
    }

    #[test]
    fn test_capture_source_is_object_safe() {
        fn assert_boxable(_: Option<Box<dyn CaptureSource>>) {}
        assert_boxable(None);
    }
}

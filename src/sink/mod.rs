//! Playback sink abstraction and implementations.
//!
//! A [`PlaybackSink`] is the output side of the loopback: the playback
//! worker writes due frames to it. The crate provides two implementations:
//!
//! - [`CpalPlayback`]: plays through a real output device via CPAL
//! - [`MemorySink`]: records writes in memory for tests and CI
//!
//! Sinks are opened through a [`PlaybackProvider`], alongside the capture
//! source, when the loopback starts.

mod device;
mod mock;

pub use device::CpalPlayback;
pub use mock::{MemorySink, MemorySinkHandle};

use async_trait::async_trait;

use crate::config::AudioConfig;
use crate::error::DeviceError;

/// An output device accepting raw 16-bit PCM bytes.
///
/// # Implementation Notes
///
/// - `write` may block until the device's internal buffer accepts the data;
///   this is the pipeline's only backpressure point, so a slow sink is the
///   intended way to throttle playback
/// - `start` and `stop` are only ever called by the controller
#[async_trait]
pub trait PlaybackSink: Send {
    /// Begins playback.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying device refuses to start.
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Stops playback. The sink stays open for a later `start`.
    fn stop(&mut self);

    /// Writes one frame's payload, waiting until the device accepts it.
    ///
    /// # Errors
    ///
    /// Returns an error on device failure; the playback worker drops the
    /// frame and keeps draining.
    async fn write(&mut self, payload: &[u8]) -> Result<(), DeviceError>;
}

/// Opens playback sinks on demand.
///
/// Implemented for any matching closure.
pub trait PlaybackProvider: Send + Sync {
    /// Opens a playback sink for the given format.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be opened; `start()` degrades
    /// to a no-op and may be called again later.
    fn open(&self, config: &AudioConfig) -> Result<Box<dyn PlaybackSink>, DeviceError>;
}

impl<F> PlaybackProvider for F
where
    F: Fn(&AudioConfig) -> Result<Box<dyn PlaybackSink>, DeviceError> + Send + Sync,
{
    fn open(&self, config: &AudioConfig) -> Result<Box<dyn PlaybackSink>, DeviceError> {
        self(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_provider() {
        let provider = |_config: &AudioConfig| -> Result<Box<dyn PlaybackSink>, DeviceError> {
            Err(DeviceError::unavailable("no hardware in tests"))
        };
        assert!(provider.open(&AudioConfig::default()).is_err());
    }

    #[test]
    fn test_playback_sink_is_object_safe() {
        fn assert_boxable(_: Option<Box<dyn PlaybackSink>>) {}
        assert_boxable(None);
    }
}

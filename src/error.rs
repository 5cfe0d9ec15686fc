//! Error types for echo-loopback.
//!
//! Errors are split into two categories:
//! - **Fatal errors** ([`LoopbackError`]): prevent the pipeline from being
//!   assembled at all
//! - **Boundary errors** ([`DeviceError`]): raised by capture sources and
//!   playback sinks; the controller degrades to a no-op or a parked worker
//!   instead of aborting

/// Fatal errors that prevent the loopback pipeline from being assembled.
///
/// These are returned from [`LoopbackBuilder::spawn()`]. Runtime trouble
/// (permission denial, device loss, slow sinks) is surfaced via
/// [`LoopbackEvent`](crate::LoopbackEvent) instead and never tears the
/// pipeline down.
///
/// [`LoopbackBuilder::spawn()`]: crate::LoopbackBuilder::spawn
#[derive(Debug, thiserror::Error)]
pub enum LoopbackError {
    /// No capture provider was configured before spawning.
    #[error("no capture source configured - set one with capture()")]
    NoCaptureConfigured,

    /// No playback provider was configured before spawning.
    #[error("no playback sink configured - set one with playback()")]
    NoPlaybackConfigured,

    /// The configuration is unusable (e.g. zero-length frames).
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },
}

/// Errors raised at the capture/playback boundary.
///
/// These are recoverable by design: an acquisition failure makes `start()` a
/// silent no-op, a read failure parks the capture worker for a retry, and a
/// routing failure falls back to the default device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Permission to capture audio was denied by the host.
    #[error("permission denied for audio capture")]
    PermissionDenied,

    /// The requested device was not found.
    #[error("device not found: {name}")]
    NotFound {
        /// Name of the device that wasn't found.
        name: String,
    },

    /// The device exists but cannot be used right now.
    #[error("device unavailable: {reason}")]
    Unavailable {
        /// Why the device is unavailable.
        reason: String,
    },

    /// The device was closed or torn down mid-operation.
    #[error("device closed")]
    Closed,

    /// An error from the underlying audio backend.
    #[error("audio backend error: {0}")]
    Backend(String),
}

impl DeviceError {
    /// Creates a backend error with the given message.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Creates an unavailable error with the given reason.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_error_display() {
        let err = LoopbackError::InvalidConfig {
            reason: "frame size is zero".to_string(),
        };
        assert_eq!(err.to_string(), "invalid configuration: frame size is zero");
    }

    #[test]
    fn test_device_error_backend() {
        let err = DeviceError::backend("stream build failed");
        assert_eq!(err.to_string(), "audio backend error: stream build failed");
    }

    #[test]
    fn test_device_error_unavailable() {
        let err = DeviceError::unavailable("busy");
        assert_eq!(err.to_string(), "device unavailable: busy");
    }
}

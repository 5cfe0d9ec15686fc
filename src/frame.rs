//! Audio frame with its scheduled release time.

use tokio::time::Instant;

/// A fixed-size chunk of captured audio stamped with the moment it becomes
/// eligible for playback.
///
/// `AudioFrame` is the unit of data moving through the pipeline. Frames are
/// immutable after construction: the capture worker builds them, the delay
/// queue hands them off, and the playback worker consumes them.
///
/// # Example
///
/// ```
/// use echo_loopback::AudioFrame;
/// use std::time::Duration;
/// use tokio::time::Instant;
///
/// let frame = AudioFrame::new(vec![0u8; 320], Instant::now() + Duration::from_secs(5));
/// assert_eq!(frame.payload().len(), 320);
/// ```
#[derive(Debug, Clone)]
pub struct AudioFrame {
    payload: Vec<u8>,
    release_at: Instant,
}

impl AudioFrame {
    /// Creates a frame from raw 16-bit PCM bytes and its release time.
    #[must_use]
    pub fn new(payload: Vec<u8>, release_at: Instant) -> Self {
        Self {
            payload,
            release_at,
        }
    }

    /// The PCM payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The instant at which this frame becomes eligible for playback.
    #[must_use]
    pub fn release_at(&self) -> Instant {
        self.release_at
    }

    /// Returns `true` if the frame is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.release_at <= now
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Consumes the frame, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_frame_accessors() {
        let at = Instant::now();
        let frame = AudioFrame::new(vec![1, 2, 3], at);
        assert_eq!(frame.payload(), &[1, 2, 3]);
        assert_eq!(frame.release_at(), at);
        assert_eq!(frame.len(), 3);
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_frame_due() {
        let now = Instant::now();
        let due = AudioFrame::new(vec![0], now);
        let future = AudioFrame::new(vec![0], now + Duration::from_millis(50));
        assert!(due.is_due(now));
        assert!(!future.is_due(now));
        assert!(future.is_due(now + Duration::from_millis(50)));
    }

    #[test]
    fn test_into_payload() {
        let frame = AudioFrame::new(vec![9, 9], Instant::now());
        assert_eq!(frame.into_payload(), vec![9, 9]);
    }
}

//! Configuration types for the loopback pipeline.

use std::time::Duration;

/// Bytes per sample for 16-bit PCM, the only format the pipeline moves.
pub const BYTES_PER_SAMPLE: usize = 2;

/// PCM format of the capture and playback streams.
///
/// Samples are always signed 16-bit little-endian; only rate and channel
/// count are configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo).
    pub channels: u16,
}

impl Default for AudioConfig {
    /// 8kHz mono - voice-communication quality, matching the typical
    /// narrowband headset profile.
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            channels: 1,
        }
    }
}

impl AudioConfig {
    /// Returns the payload size in bytes for a frame of the given duration.
    #[must_use]
    pub fn frame_bytes(&self, frame_duration: Duration) -> usize {
        let samples_per_channel =
            (u64::from(self.sample_rate) * frame_duration.as_millis() as u64 / 1000) as usize;
        samples_per_channel * self.channels as usize * BYTES_PER_SAMPLE
    }
}

/// Configuration for loopback behavior.
///
/// Use [`LoopbackConfig::default()`] for the classic echo setup (5 second
/// delay, 20ms frames), or customize as needed.
///
/// # Example
///
/// ```
/// use echo_loopback::LoopbackConfig;
/// use std::time::Duration;
///
/// let config = LoopbackConfig {
///     delay: Duration::from_secs(2),
///     ..Default::default()
/// };
/// assert_eq!(config.frame_bytes(), 320);
/// ```
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// PCM format for capture and playback.
    pub audio: AudioConfig,

    /// Interval between capturing a frame and replaying it.
    ///
    /// Default: 5 seconds
    pub delay: Duration,

    /// Duration of each captured frame.
    ///
    /// Smaller frames reduce release jitter but increase per-frame overhead.
    /// Default: 20ms
    pub frame_duration: Duration,

    /// Polling back-off used by both workers when there is no due work.
    ///
    /// A frame due at `t` may play as late as `t + idle_interval` if the
    /// playback worker was parked. Default: 100ms
    pub idle_interval: Duration,

    /// Consecutive short reads tolerated before the capture worker backs off.
    ///
    /// Short reads are normal when the device delivers data at real-time
    /// rate; this bound keeps the retry path from spinning. It paces the
    /// retries only - stall reporting is time-based, keyed to
    /// `idle_interval`. Default: 8
    pub short_read_limit: u32,

    /// Sleep applied to each short-read retry once the limit is exceeded.
    ///
    /// Default: 5ms
    pub short_read_backoff: Duration,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            delay: Duration::from_millis(5000),
            frame_duration: Duration::from_millis(20),
            idle_interval: Duration::from_millis(100),
            short_read_limit: 8,
            short_read_backoff: Duration::from_millis(5),
        }
    }
}

impl LoopbackConfig {
    /// Returns the payload size in bytes of one frame.
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        self.audio.frame_bytes(self.frame_duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_frame_is_320_bytes() {
        // 8000 Hz * 20ms = 160 samples * 2 bytes, mono
        let config = LoopbackConfig::default();
        assert_eq!(config.frame_bytes(), 320);
    }

    #[test]
    fn test_frame_bytes_stereo() {
        let audio = AudioConfig {
            sample_rate: 16000,
            channels: 2,
        };
        // 16000 Hz * 20ms = 320 samples per channel * 2 channels * 2 bytes
        assert_eq!(audio.frame_bytes(Duration::from_millis(20)), 1280);
    }

    #[test]
    fn test_config_defaults() {
        let config = LoopbackConfig::default();
        assert_eq!(config.delay, Duration::from_millis(5000));
        assert_eq!(config.frame_duration, Duration::from_millis(20));
        assert_eq!(config.idle_interval, Duration::from_millis(100));
        assert_eq!(config.short_read_limit, 8);
    }
}

//! CPAL-backed playback sink.
//!
//! Mirrors the capture adapter: the stream is not `Send`, so it lives on a
//! dedicated thread. `write` pushes samples into a ring buffer and the
//! output callback drains it; when the ring is full, `write` waits, which
//! is where pipeline backpressure comes from.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, SampleRate, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::{PlaybackProvider, PlaybackSink};
use crate::config::AudioConfig;
use crate::error::DeviceError;

const I16_MAX_F32: f32 = i16::MAX as f32;

/// Name fragments that mark a device as a preferred playback route.
const PREFERRED_NAME_HINTS: &[&str] = &["bluetooth", "headset", "hands-free", "hfp"];

/// How long to wait for the audio thread to report its stream state.
const OPEN_TIMEOUT: Duration = Duration::from_secs(2);

/// How often the audio thread checks the shutdown flag.
const THREAD_POLL: Duration = Duration::from_millis(50);

/// How long `write` sleeps while waiting for ring space.
const WRITE_RETRY: Duration = Duration::from_millis(5);

/// Plays 16-bit PCM through a real output device.
///
/// The CPAL stream runs on its own `loopback-playback` thread for the
/// lifetime of this value. While stopped the output callback emits silence
/// and discards anything left in the ring, so a restart never replays
/// stale audio.
pub struct CpalPlayback {
    producer: HeapProd<i16>,
    playing: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CpalPlayback {
    /// Opens the default output device.
    ///
    /// # Errors
    ///
    /// Returns an error if no output device exists or the stream cannot be
    /// built and started.
    pub fn open_default(config: &AudioConfig) -> Result<Self, DeviceError> {
        Self::open_inner(config, false)
    }

    /// Opens an output device, preferring headset-class devices by name and
    /// falling back to the default output.
    ///
    /// # Errors
    ///
    /// Returns an error if no output device exists or the stream cannot be
    /// built and started.
    pub fn open_preferred(config: &AudioConfig) -> Result<Self, DeviceError> {
        Self::open_inner(config, true)
    }

    /// A [`PlaybackProvider`] that opens via [`open_preferred`].
    ///
    /// [`open_preferred`]: Self::open_preferred
    pub fn provider() -> impl PlaybackProvider {
        |config: &AudioConfig| {
            CpalPlayback::open_preferred(config).map(|p| Box::new(p) as Box<dyn PlaybackSink>)
        }
    }

    fn open_inner(config: &AudioConfig, prefer_headset: bool) -> Result<Self, DeviceError> {
        // One second of audio between the writer and the callback.
        let capacity = config.sample_rate as usize * config.channels as usize;
        let (producer, consumer) = HeapRb::<i16>::new(capacity.max(1)).split();

        let playing = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<String, DeviceError>>();

        let thread_config = *config;
        let thread_playing = playing.clone();
        let thread_shutdown = shutdown.clone();
        let thread = thread::Builder::new()
            .name("loopback-playback".to_string())
            .spawn(move || {
                stream_thread(
                    &thread_config,
                    prefer_headset,
                    consumer,
                    thread_playing,
                    thread_shutdown,
                    &ready_tx,
                );
            })
            .map_err(|e| DeviceError::backend(format!("failed to spawn audio thread: {e}")))?;

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(name)) => {
                tracing::info!(device = %name, "playback stream running");
                Ok(Self {
                    producer,
                    playing,
                    shutdown,
                    thread: Some(thread),
                })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                shutdown.store(true, Ordering::SeqCst);
                Err(DeviceError::unavailable(
                    "timed out waiting for the playback stream",
                ))
            }
        }
    }
}

#[async_trait]
impl PlaybackSink for CpalPlayback {
    fn start(&mut self) -> Result<(), DeviceError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(DeviceError::Closed);
        }
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    async fn write(&mut self, payload: &[u8]) -> Result<(), DeviceError> {
        let mut samples = Vec::with_capacity(payload.len() / 2);
        for pair in payload.chunks_exact(2) {
            samples.push(i16::from_le_bytes([pair[0], pair[1]]));
        }

        let mut offset = 0;
        while offset < samples.len() {
            if self.shutdown.load(Ordering::SeqCst) {
                return Err(DeviceError::Closed);
            }
            if !self.playing.load(Ordering::SeqCst) {
                // Stopped mid-write: the callback is discarding, not
                // draining, so waiting for space would never finish.
                return Ok(());
            }
            offset += self.producer.push_slice(&samples[offset..]);
            if offset < samples.len() {
                tokio::time::sleep(WRITE_RETRY).await;
            }
        }
        Ok(())
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Body of the audio thread. Builds the stream, reports the outcome once,
/// then holds the stream alive until shutdown.
fn stream_thread(
    config: &AudioConfig,
    prefer_headset: bool,
    consumer: HeapCons<i16>,
    playing: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    ready_tx: &mpsc::Sender<Result<String, DeviceError>>,
) {
    let stream = match build_stream(config, prefer_headset, consumer, playing) {
        Ok((stream, name)) => {
            let _ = ready_tx.send(Ok(name));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(THREAD_POLL);
    }
    drop(stream);
}

fn build_stream(
    config: &AudioConfig,
    prefer_headset: bool,
    consumer: HeapCons<i16>,
    playing: Arc<AtomicBool>,
) -> Result<(Stream, String), DeviceError> {
    let device = select_device(prefer_headset)?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let (stream_config, sample_format) = pick_config(&device, config, &name)?;
    let stream = match sample_format {
        SampleFormat::I16 => build_i16_output(&device, &stream_config, consumer, playing)?,
        SampleFormat::F32 => build_f32_output(&device, &stream_config, consumer, playing)?,
        format => {
            return Err(DeviceError::backend(format!(
                "unsupported playback sample format {format:?}"
            )))
        }
    };

    stream
        .play()
        .map_err(|e| DeviceError::backend(e.to_string()))?;
    Ok((stream, name))
}

fn select_device(prefer_headset: bool) -> Result<Device, DeviceError> {
    let host = cpal::default_host();

    if prefer_headset {
        let devices = host
            .output_devices()
            .map_err(|e| DeviceError::backend(e.to_string()))?;
        for device in devices {
            let Ok(name) = device.name() else { continue };
            let lowered = name.to_lowercase();
            if PREFERRED_NAME_HINTS.iter().any(|hint| lowered.contains(hint)) {
                tracing::info!(device = %name, "using preferred playback device");
                return Ok(device);
            }
        }
    }

    host.default_output_device()
        .ok_or_else(|| DeviceError::unavailable("no default output device"))
}

/// Picks the requested rate and channel count if the device supports them,
/// otherwise the device's default format.
fn pick_config(
    device: &Device,
    config: &AudioConfig,
    name: &str,
) -> Result<(StreamConfig, SampleFormat), DeviceError> {
    let rate = SampleRate(config.sample_rate);
    if let Ok(ranges) = device.supported_output_configs() {
        for range in ranges {
            if range.channels() == config.channels
                && range.min_sample_rate() <= rate
                && rate <= range.max_sample_rate()
                && matches!(range.sample_format(), SampleFormat::I16 | SampleFormat::F32)
            {
                let format = range.sample_format();
                let mut stream_config: StreamConfig = range.with_sample_rate(rate).into();
                stream_config.buffer_size = BufferSize::Default;
                return Ok((stream_config, format));
            }
        }
    }

    let supported = device
        .default_output_config()
        .map_err(|e| DeviceError::backend(e.to_string()))?;
    tracing::warn!(
        device = %name,
        rate = supported.sample_rate().0,
        channels = supported.channels(),
        "requested playback format unsupported, using the device default"
    );
    let format = supported.sample_format();
    Ok((supported.into(), format))
}

fn build_i16_output(
    device: &Device,
    config: &StreamConfig,
    mut consumer: HeapCons<i16>,
    playing: Arc<AtomicBool>,
) -> Result<Stream, DeviceError> {
    device
        .build_output_stream(
            config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                if playing.load(Ordering::Relaxed) {
                    let filled = consumer.pop_slice(data);
                    data[filled..].fill(0);
                } else {
                    // Stopped: emit silence and drop whatever is queued so
                    // a restart begins clean.
                    consumer.clear();
                    data.fill(0);
                }
            },
            |err| {
                tracing::error!(error = %err, "playback stream error");
            },
            None,
        )
        .map_err(|e| DeviceError::backend(e.to_string()))
}

fn build_f32_output(
    device: &Device,
    config: &StreamConfig,
    mut consumer: HeapCons<i16>,
    playing: Arc<AtomicBool>,
) -> Result<Stream, DeviceError> {
    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if playing.load(Ordering::Relaxed) {
                    for slot in data.iter_mut() {
                        *slot = match consumer.try_pop() {
                            Some(sample) => sample as f32 / I16_MAX_F32,
                            None => 0.0,
                        };
                    }
                } else {
                    consumer.clear();
                    data.fill(0.0);
                }
            },
            |err| {
                tracing::error!(error = %err, "playback stream error");
            },
            None,
        )
        .map_err(|e| DeviceError::backend(e.to_string()))
}

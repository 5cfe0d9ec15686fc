//! CPAL-backed capture source.
//!
//! CPAL streams are not `Send`, so the stream lives on a dedicated thread
//! that this adapter owns. The audio callback pushes converted i16 samples
//! into a ring buffer while recording; `read` pops from the consumer side
//! without blocking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, SampleRate, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::{CaptureProvider, CaptureSource};
use crate::config::AudioConfig;
use crate::error::DeviceError;

const I16_MIN_F32: f32 = i16::MIN as f32;
const I16_MAX_F32: f32 = i16::MAX as f32;

/// Converts one normalized f32 sample to i16, clamping out-of-range input.
#[inline]
fn f32_to_i16(sample: f32) -> i16 {
    (sample * I16_MAX_F32).clamp(I16_MIN_F32, I16_MAX_F32) as i16
}

/// Name fragments that mark a device as a preferred capture route.
const PREFERRED_NAME_HINTS: &[&str] = &["bluetooth", "headset", "hands-free", "hfp"];

/// How long to wait for the audio thread to report its stream state.
const OPEN_TIMEOUT: Duration = Duration::from_secs(2);

/// How often the audio thread checks the shutdown flag.
const THREAD_POLL: Duration = Duration::from_millis(50);

/// Captures 16-bit PCM from a real input device.
///
/// The CPAL stream runs on its own `loopback-capture` thread for the
/// lifetime of this value. `start` and `stop` only flip the gate the audio
/// callback checks, so they are cheap and never touch the device.
pub struct CpalCapture {
    consumer: HeapCons<i16>,
    recording: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CpalCapture {
    /// Opens the default input device.
    ///
    /// # Errors
    ///
    /// Returns an error if no input device exists or the stream cannot be
    /// built and started.
    pub fn open_default(config: &AudioConfig) -> Result<Self, DeviceError> {
        Self::open_inner(config, false)
    }

    /// Opens an input device, preferring headset-class devices by name and
    /// falling back to the default input.
    ///
    /// # Errors
    ///
    /// Returns an error if no input device exists or the stream cannot be
    /// built and started.
    pub fn open_preferred(config: &AudioConfig) -> Result<Self, DeviceError> {
        Self::open_inner(config, true)
    }

    /// A [`CaptureProvider`] that opens via [`open_preferred`].
    ///
    /// [`open_preferred`]: Self::open_preferred
    pub fn provider() -> impl CaptureProvider {
        |config: &AudioConfig| {
            CpalCapture::open_preferred(config).map(|c| Box::new(c) as Box<dyn CaptureSource>)
        }
    }

    fn open_inner(config: &AudioConfig, prefer_headset: bool) -> Result<Self, DeviceError> {
        // One second of audio between the callback and the reader.
        let capacity = config.sample_rate as usize * config.channels as usize;
        let (producer, consumer) = HeapRb::<i16>::new(capacity.max(1)).split();

        let recording = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<String, DeviceError>>();

        let thread_config = *config;
        let thread_recording = recording.clone();
        let thread_shutdown = shutdown.clone();
        let thread = thread::Builder::new()
            .name("loopback-capture".to_string())
            .spawn(move || {
                stream_thread(
                    &thread_config,
                    prefer_headset,
                    producer,
                    thread_recording,
                    thread_shutdown,
                    &ready_tx,
                );
            })
            .map_err(|e| DeviceError::backend(format!("failed to spawn audio thread: {e}")))?;

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(name)) => {
                tracing::info!(device = %name, "capture stream running");
                Ok(Self {
                    consumer,
                    recording,
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
                    "timed out waiting for the capture stream",
                ))
            }
        }
    }
}

#[async_trait]
impl CaptureSource for CpalCapture {
    fn start(&mut self) -> Result<(), DeviceError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(DeviceError::Closed);
        }
        // Stale samples from before the last stop must not leak into the
        // new session.
        self.consumer.clear();
        self.recording.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.recording.store(false, Ordering::SeqCst);
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(DeviceError::Closed);
        }

        // Pop only complete requests. A partial pop would consume samples
        // the caller then discards as a short read, losing audio.
        let wanted = buf.len() / 2;
        if self.consumer.occupied_len() < wanted {
            return Ok(0);
        }

        let mut samples = vec![0i16; wanted];
        let popped = self.consumer.pop_slice(&mut samples);
        for (i, sample) in samples[..popped].iter().enumerate() {
            buf[i * 2..i * 2 + 2].copy_from_slice(&sample.to_le_bytes());
        }
        Ok(popped * 2)
    }
}

impl Drop for CpalCapture {
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
    producer: HeapProd<i16>,
    recording: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    ready_tx: &mpsc::Sender<Result<String, DeviceError>>,
) {
    let stream = match build_stream(config, prefer_headset, producer, recording) {
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
    producer: HeapProd<i16>,
    recording: Arc<AtomicBool>,
) -> Result<(Stream, String), DeviceError> {
    let device = select_device(prefer_headset)?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let (stream_config, sample_format) = pick_config(&device, config, &name)?;
    let stream = build_input(&device, &stream_config, sample_format, producer, recording)?;

    stream
        .play()
        .map_err(|e| DeviceError::backend(e.to_string()))?;
    Ok((stream, name))
}

/// Picks the requested rate and channel count if the device supports them,
/// otherwise the device's default format.
fn pick_config(
    device: &Device,
    config: &AudioConfig,
    name: &str,
) -> Result<(StreamConfig, SampleFormat), DeviceError> {
    let rate = SampleRate(config.sample_rate);
    if let Ok(ranges) = device.supported_input_configs() {
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
        .default_input_config()
        .map_err(|e| DeviceError::backend(e.to_string()))?;
    tracing::warn!(
        device = %name,
        rate = supported.sample_rate().0,
        channels = supported.channels(),
        "requested capture format unsupported, using the device default"
    );
    let format = supported.sample_format();
    Ok((supported.into(), format))
}

fn select_device(prefer_headset: bool) -> Result<Device, DeviceError> {
    let host = cpal::default_host();

    if prefer_headset {
        let devices = host
            .input_devices()
            .map_err(|e| DeviceError::backend(e.to_string()))?;
        for device in devices {
            let Ok(name) = device.name() else { continue };
            let lowered = name.to_lowercase();
            if PREFERRED_NAME_HINTS.iter().any(|hint| lowered.contains(hint)) {
                tracing::info!(device = %name, "using preferred capture device");
                return Ok(device);
            }
        }
    }

    host.default_input_device()
        .ok_or_else(|| DeviceError::unavailable("no default input device"))
}

fn build_input(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    producer: HeapProd<i16>,
    recording: Arc<AtomicBool>,
) -> Result<Stream, DeviceError> {
    match sample_format {
        SampleFormat::I16 => build_i16_input(device, config, producer, recording),
        SampleFormat::F32 => build_f32_input(device, config, producer, recording),
        format => Err(DeviceError::backend(format!(
            "unsupported capture sample format {format:?}"
        ))),
    }
}

fn build_i16_input(
    device: &Device,
    config: &StreamConfig,
    mut producer: HeapProd<i16>,
    recording: Arc<AtomicBool>,
) -> Result<Stream, DeviceError> {
    device
        .build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if !recording.load(Ordering::Relaxed) {
                    return;
                }
                // Non-blocking push: drops samples if the reader falls behind.
                let _ = producer.push_slice(data);
            },
            |err| {
                tracing::error!(error = %err, "capture stream error");
            },
            None,
        )
        .map_err(|e| DeviceError::backend(e.to_string()))
}

fn build_f32_input(
    device: &Device,
    config: &StreamConfig,
    mut producer: HeapProd<i16>,
    recording: Arc<AtomicBool>,
) -> Result<Stream, DeviceError> {
    device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if !recording.load(Ordering::Relaxed) {
                    return;
                }
                for &sample in data {
                    let _ = producer.try_push(f32_to_i16(sample));
                }
            },
            |err| {
                tracing::error!(error = %err, "capture stream error");
            },
            None,
        )
        .map_err(|e| DeviceError::backend(e.to_string()))
}

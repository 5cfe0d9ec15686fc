//! Mock capture source for testing without hardware.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CaptureProvider, CaptureSource};
use crate::config::AudioConfig;
use crate::error::DeviceError;

/// One scripted outcome of a `read` call.
enum ReadStep {
    /// A full frame with this exact payload.
    Frame(Vec<u8>),
    /// A short read of this many zero bytes.
    Short(usize),
    /// A device failure.
    Fail(String),
}

struct Inner {
    script: VecDeque<ReadStep>,
    recording: bool,
    start_count: u32,
}

/// A scripted capture source for driving the pipeline in tests and CI.
///
/// Reads consume a script of outcomes; an exhausted script yields zero-byte
/// short reads, which parks the capture worker on its back-off path just
/// like a real device with no data ready.
///
/// # Example
///
/// ```
/// use echo_loopback::source::MockCapture;
///
/// let (capture, handle) = MockCapture::new();
/// handle.push_frame(vec![0xAA; 320]);
/// handle.push_short(10);
/// ```
pub struct MockCapture {
    inner: Arc<Mutex<Inner>>,
}

/// Test-side handle to a [`MockCapture`].
///
/// Stays usable after the source itself moves into the controller, so tests
/// can feed frames mid-run and observe recording state.
#[derive(Clone)]
pub struct MockCaptureHandle {
    inner: Arc<Mutex<Inner>>,
}

impl MockCapture {
    /// Creates an empty mock and its test handle.
    #[must_use]
    pub fn new() -> (Self, MockCaptureHandle) {
        let inner = Arc::new(Mutex::new(Inner {
            script: VecDeque::new(),
            recording: false,
            start_count: 0,
        }));
        (
            Self {
                inner: inner.clone(),
            },
            MockCaptureHandle { inner },
        )
    }
}

impl MockCaptureHandle {
    /// Queues a full frame with the given payload.
    pub fn push_frame(&self, payload: Vec<u8>) {
        self.inner.lock().script.push_back(ReadStep::Frame(payload));
    }

    /// Queues a short read of `bytes` zero bytes.
    pub fn push_short(&self, bytes: usize) {
        self.inner.lock().script.push_back(ReadStep::Short(bytes));
    }

    /// Queues a read failure.
    pub fn push_failure(&self, reason: impl Into<String>) {
        self.inner
            .lock()
            .script
            .push_back(ReadStep::Fail(reason.into()));
    }

    /// Returns `true` while the source is recording.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.inner.lock().recording
    }

    /// Number of times `start` was called on the source.
    #[must_use]
    pub fn start_count(&self) -> u32 {
        self.inner.lock().start_count
    }

    /// Number of scripted reads not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.inner.lock().script.len()
    }
}

#[async_trait]
impl CaptureSource for MockCapture {
    fn start(&mut self) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock();
        inner.recording = true;
        inner.start_count += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.inner.lock().recording = false;
    }

    fn is_recording(&self) -> bool {
        self.inner.lock().recording
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        let step = self.inner.lock().script.pop_front();
        match step {
            Some(ReadStep::Frame(payload)) => {
                let len = payload.len().min(buf.len());
                buf[..len].copy_from_slice(&payload[..len]);
                Ok(len)
            }
            Some(ReadStep::Short(bytes)) => {
                let len = bytes.min(buf.len());
                buf[..len].fill(0);
                Ok(len)
            }
            Some(ReadStep::Fail(reason)) => Err(DeviceError::unavailable(reason)),
            // Script exhausted: behave like a device with nothing buffered.
            None => Ok(0),
        }
    }
}

/// A provider that hands out a single prepared [`MockCapture`].
///
/// Tracks how many times `open` was called, which lets tests assert that
/// `start()` is idempotent about acquisition. Subsequent opens fail.
pub struct MockCaptureProvider {
    slot: Mutex<Option<MockCapture>>,
    opens: AtomicU32,
}

impl MockCaptureProvider {
    /// Wraps a prepared mock in a single-use provider.
    #[must_use]
    pub fn new(capture: MockCapture) -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Some(capture)),
            opens: AtomicU32::new(0),
        })
    }

    /// Number of times `open` was called.
    #[must_use]
    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

impl CaptureProvider for MockCaptureProvider {
    fn open(&self, _config: &AudioConfig) -> Result<Box<dyn CaptureSource>, DeviceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.slot
            .lock()
            .take()
            .map(|capture| Box::new(capture) as Box<dyn CaptureSource>)
            .ok_or_else(|| DeviceError::unavailable("mock capture already opened"))
    }
}

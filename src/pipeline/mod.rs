//! The two scheduled workers and the state they share with the controller.

mod capture;
mod playback;

pub(crate) use capture::CaptureWorker;
pub(crate) use playback::PlaybackWorker;

use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::sink::PlaybackSink;
use crate::source::CaptureSource;

/// The capture resource slot, shared between the controller (which acquires,
/// starts, and stops it) and the capture worker (which only reads).
pub(crate) type SharedCapture = Arc<Mutex<Option<Box<dyn CaptureSource>>>>;

/// The playback resource slot, shared between the controller and the
/// playback worker (which only writes).
pub(crate) type SharedPlayback = Arc<Mutex<Option<Box<dyn PlaybackSink>>>>;

/// Counters and the teardown flag shared across the controller and workers.
pub(crate) struct PipelineState {
    /// Set once at end of life; both workers exit within one idle interval.
    pub shutdown: AtomicBool,
    pub frames_captured: AtomicU64,
    pub frames_played: AtomicU64,
    pub frames_discarded: AtomicU64,
    pub short_reads: AtomicU64,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            shutdown: AtomicBool::new(false),
            frames_captured: AtomicU64::new(0),
            frames_played: AtomicU64::new(0),
            frames_discarded: AtomicU64::new(0),
            short_reads: AtomicU64::new(0),
        }
    }
}

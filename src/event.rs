//! Runtime events for monitoring the loopback pipeline.
//!
//! Events are non-fatal notifications about pipeline behavior. The pipeline
//! keeps running after an event is emitted - they exist for logging and
//! metrics, not error handling.

use std::sync::Arc;

/// Runtime events emitted by the controller and workers.
///
/// These are informational. Degraded paths (denied permission, failed
/// routing, stalled capture) all surface here rather than as errors.
#[derive(Debug, Clone)]
pub enum LoopbackEvent {
    /// The loopback transitioned to active: capture and playback running.
    Started,

    /// The loopback transitioned to idle.
    Stopped,

    /// `start()` could not acquire the capture resource.
    ///
    /// Happens when the permission gate denies capture or the device fails
    /// to open. `start()` remains a safe no-op; call it again once the
    /// blocker clears.
    CaptureUnavailable {
        /// Why acquisition failed.
        reason: String,
    },

    /// `start()` could not acquire or start the playback resource.
    ///
    /// As with [`CaptureUnavailable`](Self::CaptureUnavailable), `start()`
    /// stays a safe no-op and can be retried.
    PlaybackUnavailable {
        /// Why acquisition failed.
        reason: String,
    },

    /// Preferred-device routing failed; audio continues on the default route.
    RoutingFailed {
        /// Why routing failed.
        reason: String,
    },

    /// The capture source has produced no full frame for too long.
    ///
    /// Short reads between frames are normal for a real-time device, so
    /// this fires only when no full read has landed for longer than one
    /// idle interval, and once per stall: the detector re-arms when data
    /// flows again.
    CaptureStalled {
        /// Consecutive short reads observed when the event fired.
        consecutive_short_reads: u32,
    },

    /// A playback write failed. The frame is dropped; playback continues.
    SinkWriteFailed {
        /// Description of the failure.
        reason: String,
    },

    /// Buffered frames were discarded by `stop()`.
    ///
    /// Intentional: restarting must not replay stale speech.
    FramesDiscarded {
        /// Number of frames dropped from the delay queue.
        count: usize,
    },
}

/// Callback type for receiving runtime events.
///
/// Register one via [`LoopbackBuilder::on_event()`].
///
/// [`LoopbackBuilder::on_event()`]: crate::LoopbackBuilder::on_event
///
/// # Example
///
/// ```ignore
/// let controller = EchoLoopback::builder()
///     .on_event(|event| tracing::warn!(?event, "loopback event"))
///     .spawn()?;
/// ```
pub type EventCallback = Arc<dyn Fn(LoopbackEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure without manual `Arc` wrapping.
///
/// # Example
///
/// ```
/// use echo_loopback::{event_callback, LoopbackEvent};
///
/// let callback = event_callback(|event| {
///     println!("got event: {event:?}");
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(LoopbackEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

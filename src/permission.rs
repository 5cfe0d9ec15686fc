//! Permission gate consulted before acquiring the capture resource.

/// External check that must pass before the capture device is opened.
///
/// When the gate denies capture, [`LoopbackController::start()`] skips
/// resource acquisition and returns without error; a later `start()` call
/// consults the gate again. This mirrors host permission models where the
/// grant can arrive after the first attempt.
///
/// [`LoopbackController::start()`]: crate::LoopbackController::start
pub trait PermissionGate: Send + Sync {
    /// Returns `true` if audio capture is currently permitted.
    fn capture_allowed(&self) -> bool;
}

/// A gate that always permits capture.
///
/// The default when no gate is configured - platforms without a runtime
/// permission model, or callers that check permissions upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAllowed;

impl PermissionGate for AlwaysAllowed {
    fn capture_allowed(&self) -> bool {
        true
    }
}

impl<F> PermissionGate for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn capture_allowed(&self) -> bool {
        self()
    }
}

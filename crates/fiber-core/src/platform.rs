//! Platform abstraction traits for the reconciliation runtime.
//!
//! These traits let the engine delegate frame pacing and time keeping to
//! the host platform, so the same engine runs against a browser-like event
//! loop, a `std` loop, or a deterministic fake clock in tests.

/// Host primitives used to approximate a "run when idle" callback.
///
/// Everything runs on one thread; implementations are free to use `Rc`
/// and `RefCell` internally.
pub trait FrameScheduler {
    /// Run `callback` at the next frame pulse (vsync equivalent).
    ///
    /// The callback receives the pulse timestamp in nanoseconds, measured
    /// on the same time base as the [`Clock`] handed to the engine.
    fn request_frame(&self, callback: Box<dyn FnOnce(u64) + 'static>);

    /// Post a macrotask that runs after the current synchronous work and
    /// before the next frame pulse.
    fn post_task(&self, task: Box<dyn FnOnce() + 'static>);
}

/// Provides monotonic time for deadline computation.
pub trait Clock {
    /// Current time in nanoseconds.
    fn now_nanos(&self) -> u64;
}

//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides concrete implementations of the platform
//! abstraction traits defined in `fiber-core`. Applications construct a
//! [`StdRuntime`], hand its scheduler and clock to
//! [`fiber_core::Root`], then pump frames from their own loop or with
//! [`StdRuntime::run_until_idle`].

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use fiber_core::{Clock, FrameScheduler};

/// Cadence used when no interval is configured, roughly 60 Hz.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_nanos(16_666_667);

type FrameCallback = Box<dyn FnOnce(u64) + 'static>;
type Task = Box<dyn FnOnce() + 'static>;

/// Frame and macrotask queues drained by the embedding loop.
pub struct StdFrameScheduler {
    frames: RefCell<Vec<FrameCallback>>,
    tasks: RefCell<VecDeque<Task>>,
    frame_requested: Cell<bool>,
    frame_waker: RefCell<Option<Rc<dyn Fn() + 'static>>>,
}

impl StdFrameScheduler {
    pub fn new() -> Self {
        Self {
            frames: RefCell::new(Vec::new()),
            tasks: RefCell::new(VecDeque::new()),
            frame_requested: Cell::new(false),
            frame_waker: RefCell::new(None),
        }
    }

    /// Returns whether a frame has been requested since the last call.
    pub fn take_frame_request(&self) -> bool {
        self.frame_requested.replace(false)
    }

    /// Registers a waker that will be invoked whenever a new frame is requested.
    pub fn set_frame_waker(&self, waker: impl Fn() + 'static) {
        *self.frame_waker.borrow_mut() = Some(Rc::new(waker));
    }

    /// Clears any registered frame waker.
    pub fn clear_frame_waker(&self) {
        *self.frame_waker.borrow_mut() = None;
    }

    fn wake(&self) {
        let waker = self.frame_waker.borrow().clone();
        if let Some(waker) = waker {
            waker();
        }
    }

    /// Runs every frame callback registered so far with `timestamp`.
    pub fn drain_frame_callbacks(&self, timestamp: u64) -> usize {
        let frames = std::mem::take(&mut *self.frames.borrow_mut());
        let count = frames.len();
        for frame in frames {
            frame(timestamp);
        }
        count
    }

    /// Runs queued macrotasks, including ones posted while draining.
    pub fn drain_tasks(&self) -> usize {
        let mut count = 0;
        loop {
            let task = self.tasks.borrow_mut().pop_front();
            let Some(task) = task else {
                return count;
            };
            task();
            count += 1;
        }
    }

    pub fn has_pending_work(&self) -> bool {
        !self.frames.borrow().is_empty() || !self.tasks.borrow().is_empty()
    }
}

impl Default for StdFrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdFrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdFrameScheduler")
            .field("frames", &self.frames.borrow().len())
            .field("tasks", &self.tasks.borrow().len())
            .field("frame_requested", &self.frame_requested.get())
            .finish()
    }
}

impl FrameScheduler for StdFrameScheduler {
    fn request_frame(&self, callback: Box<dyn FnOnce(u64) + 'static>) {
        self.frames.borrow_mut().push(callback);
        self.frame_requested.set(true);
        self.wake();
    }

    fn post_task(&self, task: Box<dyn FnOnce() + 'static>) {
        self.tasks.borrow_mut().push_back(task);
    }
}

/// Clock implementation backed by [`std::time`], counting from creation.
#[derive(Debug, Clone)]
pub struct StdClock {
    epoch: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Returns the elapsed time as a [`Duration`] for convenience.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_nanos(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Convenience container bundling the standard scheduler and clock.
#[derive(Clone)]
pub struct StdRuntime {
    scheduler: Rc<StdFrameScheduler>,
    clock: Rc<StdClock>,
    frame_interval: Duration,
}

impl StdRuntime {
    /// Creates a new standard runtime instance.
    pub fn new() -> Self {
        Self::with_frame_interval(DEFAULT_FRAME_INTERVAL)
    }

    /// Creates a runtime pulsing frames every `frame_interval`.
    pub fn with_frame_interval(frame_interval: Duration) -> Self {
        Self {
            scheduler: Rc::new(StdFrameScheduler::default()),
            clock: Rc::new(StdClock::default()),
            frame_interval,
        }
    }

    /// Returns the scheduler implementation.
    pub fn scheduler(&self) -> Rc<StdFrameScheduler> {
        Rc::clone(&self.scheduler)
    }

    /// Returns the scheduler as the trait object a root expects.
    pub fn frame_scheduler(&self) -> Rc<dyn FrameScheduler> {
        self.scheduler.clone()
    }

    /// Returns the clock implementation.
    pub fn clock(&self) -> Rc<dyn Clock> {
        self.clock.clone()
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Returns whether a frame was requested since the last poll.
    pub fn take_frame_request(&self) -> bool {
        self.scheduler.take_frame_request()
    }

    /// Registers a waker to be called when a new frame is requested.
    pub fn set_frame_waker(&self, waker: impl Fn() + 'static) {
        self.scheduler.set_frame_waker(waker);
    }

    /// Clears any previously registered frame waker.
    pub fn clear_frame_waker(&self) {
        self.scheduler.clear_frame_waker();
    }

    /// Drains pending frame callbacks using the provided timestamp in nanoseconds.
    pub fn drain_frame_callbacks(&self, frame_time_nanos: u64) -> usize {
        self.scheduler.drain_frame_callbacks(frame_time_nanos)
    }

    /// Runs queued macrotasks.
    pub fn drain_tasks(&self) -> usize {
        self.scheduler.drain_tasks()
    }

    pub fn has_pending_work(&self) -> bool {
        self.scheduler.has_pending_work()
    }

    /// Pulses one frame at the current time, then runs the macrotasks it
    /// (and anything before it) queued.
    pub fn run_frame(&self) {
        self.drain_tasks();
        let now = self.clock.now_nanos();
        self.drain_frame_callbacks(now);
        self.drain_tasks();
    }

    /// Pumps frames at the configured cadence until nothing is queued or
    /// `max_frames` frames ran. Returns the number of frames run.
    pub fn run_until_idle(&self, max_frames: usize) -> usize {
        let mut frames = 0;
        let mut next_frame = Instant::now();
        while self.has_pending_work() && frames < max_frames {
            let now = Instant::now();
            if next_frame > now {
                std::thread::sleep(next_frame - now);
            }
            self.run_frame();
            frames += 1;
            next_frame += self.frame_interval;
        }
        if self.has_pending_work() {
            log::warn!("stopped after {frames} frames with work still queued");
        }
        frames
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("scheduler", &self.scheduler)
            .field("clock", &self.clock)
            .field("frame_interval", &self.frame_interval)
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}

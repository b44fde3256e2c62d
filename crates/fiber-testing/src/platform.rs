//! Deterministic stand-ins for frame pacing, time and deadlines.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use fiber_core::{Clock, Deadline, FrameScheduler};

type FrameCallback = Box<dyn FnOnce(u64) + 'static>;
type Task = Box<dyn FnOnce() + 'static>;

/// Frame pulses and macrotasks that only run when the test says so.
#[derive(Default)]
pub struct ManualFrames {
    frames: RefCell<Vec<FrameCallback>>,
    tasks: RefCell<VecDeque<Task>>,
    frame_requests: Cell<usize>,
}

impl ManualFrames {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Fires every frame callback requested so far. Returns how many ran.
    pub fn pulse(&self, timestamp: u64) -> usize {
        let frames = std::mem::take(&mut *self.frames.borrow_mut());
        let count = frames.len();
        for frame in frames {
            frame(timestamp);
        }
        count
    }

    /// Runs queued macrotasks in order, including ones they post.
    pub fn run_tasks(&self) -> usize {
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

    /// Runs only the oldest queued macrotask.
    pub fn run_next_task(&self) -> bool {
        let task = self.tasks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    pub fn pending_frames(&self) -> usize {
        self.frames.borrow().len()
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Total number of frame requests received.
    pub fn frame_requests(&self) -> usize {
        self.frame_requests.get()
    }
}

impl FrameScheduler for ManualFrames {
    fn request_frame(&self, callback: Box<dyn FnOnce(u64) + 'static>) {
        self.frame_requests.set(self.frame_requests.get() + 1);
        self.frames.borrow_mut().push(callback);
    }

    fn post_task(&self, task: Box<dyn FnOnce() + 'static>) {
        self.tasks.borrow_mut().push_back(task);
    }
}

/// Clock that only moves when told to.
///
/// With a non-zero step every read advances time by that step first, which
/// simulates work eating into the frame budget.
#[derive(Default)]
pub struct ManualClock {
    now: Cell<u64>,
    step: Cell<u64>,
}

impl ManualClock {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn set(&self, nanos: u64) {
        self.now.set(nanos);
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + duration_nanos(by));
    }

    pub fn set_step(&self, step: Duration) {
        self.step.set(duration_nanos(step));
    }

    /// Current time without applying the step.
    pub fn peek(&self) -> u64 {
        self.now.get()
    }
}

impl Clock for ManualClock {
    fn now_nanos(&self) -> u64 {
        let now = self.now.get() + self.step.get();
        self.now.set(now);
        now
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Deadline that allows exactly `n` units of work.
pub struct UnitBudget {
    remaining: Cell<usize>,
}

impl UnitBudget {
    pub fn new(units: usize) -> Self {
        Self {
            remaining: Cell::new(units),
        }
    }
}

impl Deadline for UnitBudget {
    fn time_remaining(&self) -> Duration {
        match self.remaining.get() {
            0 => Duration::ZERO,
            left => {
                self.remaining.set(left - 1);
                Duration::from_millis(1)
            }
        }
    }
}

/// Deadline that is already over.
pub struct Exhausted;

impl Deadline for Exhausted {
    fn time_remaining(&self) -> Duration {
        Duration::ZERO
    }
}

/// Deadline that never runs out.
pub struct Unbounded;

impl Deadline for Unbounded {
    fn time_remaining(&self) -> Duration {
        Duration::MAX
    }
}

//! "Run when idle" built from frame pulses and macrotasks.
//!
//! A request subscribes to the next frame pulse once. The pulse fixes the
//! slice deadline at `pulse + frame_budget` and posts a macrotask, so host
//! work queued for the same frame runs before the callback does.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use crate::platform::{Clock, FrameScheduler};

pub const DEFAULT_FRAME_BUDGET: Duration = Duration::from_millis(16);

/// Time left in the current idle slice.
pub trait Deadline {
    fn time_remaining(&self) -> Duration;

    fn has_time_remaining(&self) -> bool {
        !self.time_remaining().is_zero()
    }
}

pub struct FrameDeadline {
    deadline_nanos: u64,
    clock: Rc<dyn Clock>,
}

impl FrameDeadline {
    pub fn new(deadline_nanos: u64, clock: Rc<dyn Clock>) -> Self {
        Self {
            deadline_nanos,
            clock,
        }
    }

    pub fn deadline_nanos(&self) -> u64 {
        self.deadline_nanos
    }
}

impl Deadline for FrameDeadline {
    fn time_remaining(&self) -> Duration {
        Duration::from_nanos(self.deadline_nanos.saturating_sub(self.clock.now_nanos()))
    }
}

type IdleCallback = Box<dyn FnOnce(&dyn Deadline) + 'static>;

struct IdleInner {
    frames: Rc<dyn FrameScheduler>,
    clock: Rc<dyn Clock>,
    frame_budget: Duration,
    scheduled: RefCell<Option<IdleCallback>>,
    frame_pending: Cell<bool>,
    frame_deadline: Cell<u64>,
}

impl IdleInner {
    fn on_frame(self: &Rc<Self>, timestamp: u64) {
        let budget = u64::try_from(self.frame_budget.as_nanos()).unwrap_or(u64::MAX);
        self.frame_deadline.set(timestamp.saturating_add(budget));
        self.frame_pending.set(false);
        let weak = Rc::downgrade(self);
        self.frames.post_task(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.run_scheduled();
            }
        }));
    }

    fn run_scheduled(&self) {
        let Some(callback) = self.scheduled.borrow_mut().take() else {
            return;
        };
        let deadline = FrameDeadline::new(self.frame_deadline.get(), Rc::clone(&self.clock));
        callback(&deadline);
    }
}

/// Single-slot idle callback scheduler.
#[derive(Clone)]
pub struct IdleScheduler {
    inner: Rc<IdleInner>,
}

impl IdleScheduler {
    pub fn new(frames: Rc<dyn FrameScheduler>, clock: Rc<dyn Clock>, frame_budget: Duration) -> Self {
        Self {
            inner: Rc::new(IdleInner {
                frames,
                clock,
                frame_budget,
                scheduled: RefCell::new(None),
                frame_pending: Cell::new(false),
                frame_deadline: Cell::new(0),
            }),
        }
    }

    /// Runs `callback` in the next idle slice, replacing any callback that
    /// has not fired yet.
    pub fn request_idle_callback(&self, callback: impl FnOnce(&dyn Deadline) + 'static) {
        let replaced = self.inner.scheduled.replace(Some(Box::new(callback)));
        if replaced.is_some() {
            log::trace!("idle callback replaced before it ran");
        }
        if !self.inner.frame_pending.replace(true) {
            let weak = Rc::downgrade(&self.inner);
            self.inner.frames.request_frame(Box::new(move |timestamp| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_frame(timestamp);
                }
            }));
        }
    }

    pub fn has_pending_callback(&self) -> bool {
        self.inner.scheduled.borrow().is_some()
    }

    /// Drops the pending callback; an already requested pulse still fires
    /// but finds nothing to run.
    pub fn cancel(&self) {
        self.inner.scheduled.borrow_mut().take();
    }

    pub fn frame_budget(&self) -> Duration {
        self.inner.frame_budget
    }

    pub fn clock(&self) -> Rc<dyn Clock> {
        Rc::clone(&self.inner.clock)
    }
}

//! Scheduler loop binding a reconciler, a host and an idle scheduler.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::commit::{commit_root, CommitSummary};
use crate::element::Element;
use crate::fiber::FiberId;
use crate::host::{Host, HostId};
use crate::idle::{Deadline, IdleScheduler, DEFAULT_FRAME_BUDGET};
use crate::platform::{Clock, FrameScheduler};
use crate::reconciler::Reconciler;
use crate::runtime::Runtime;
use crate::FiberError;

#[derive(Clone, Debug)]
pub struct RootConfig {
    /// Length of an idle slice, measured from the frame pulse.
    pub frame_budget: Duration,
    /// Name used in log lines.
    pub label: String,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            frame_budget: DEFAULT_FRAME_BUDGET,
            label: "root".to_owned(),
        }
    }
}

impl RootConfig {
    pub fn with_frame_budget(mut self, frame_budget: Duration) -> Self {
        self.frame_budget = frame_budget;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Outcome of one pass of the scheduler loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkStatus {
    /// Nothing was pending.
    Idle,
    /// The deadline ran out with units left; another slice was requested.
    Yielded { units: usize },
    /// The walk finished and the generation was committed.
    Committed { units: usize },
}

struct RootInner<H: Host + 'static> {
    this: Weak<RefCell<RootInner<H>>>,
    host: H,
    reconciler: Reconciler,
    runtime: Runtime,
    frames: Rc<dyn FrameScheduler>,
    idle: IdleScheduler,
    config: RootConfig,
    last_commit: Option<CommitSummary>,
    commits: u64,
    error: Option<FiberError>,
}

fn schedule_slice<H: Host + 'static>(idle: &IdleScheduler, root: Weak<RefCell<RootInner<H>>>) {
    idle.request_idle_callback(move |deadline| run_slice(&root, deadline));
}

fn run_slice<H: Host + 'static>(root: &Weak<RefCell<RootInner<H>>>, deadline: &dyn Deadline) {
    let Some(inner) = root.upgrade() else {
        return;
    };
    let mut inner = inner.borrow_mut();
    match inner.work_loop(deadline) {
        Ok(status) => log::trace!("{}: slice finished with {status:?}", inner.config.label),
        Err(err) => {
            log::error!("{}: render cycle aborted: {err}", inner.config.label);
            inner.error = Some(err);
        }
    }
}

impl<H: Host + 'static> RootInner<H> {
    fn schedule(&self) {
        schedule_slice(&self.idle, self.this.clone());
    }

    /// Runs units while the deadline allows, commits a finished walk and
    /// re-arms when work remains.
    fn work_loop(&mut self, deadline: &dyn Deadline) -> Result<WorkStatus, FiberError> {
        let handle = self.runtime.handle();
        let mut units = 0;
        let outcome = loop {
            if self.runtime.take_rerender_request() {
                self.reconciler.restart();
            }
            if self.reconciler.next_unit().is_none() || !deadline.has_time_remaining() {
                break Ok(());
            }
            if let Err(err) = self.reconciler.work_one(&mut self.host, &handle) {
                self.reconciler.abort();
                break Err(err);
            }
            units += 1;
        };

        let status = match outcome {
            Ok(()) if self.reconciler.next_unit().is_some() => WorkStatus::Yielded { units },
            Ok(()) if self.reconciler.work_in_progress().is_some() => {
                self.commit()?;
                WorkStatus::Committed { units }
            }
            Ok(()) => WorkStatus::Idle,
            Err(err) => return Err(err),
        };
        if self.reconciler.next_unit().is_some() || self.runtime.has_rerender_request() {
            self.schedule();
        }
        Ok(status)
    }

    fn commit(&mut self) -> Result<(), FiberError> {
        let (summary, passive) = commit_root(&mut self.reconciler, &mut self.host)?;
        if !passive.is_empty() {
            self.frames.post_task(Box::new(move || {
                for effect in passive {
                    effect();
                }
            }));
        }
        self.commits += 1;
        log::debug!(
            "{}: commit #{} applied {} effects",
            self.config.label,
            self.commits,
            summary.len()
        );
        self.last_commit = Some(summary);
        Ok(())
    }
}

/// Entry point: renders descriptions under one host container.
///
/// Work happens in idle slices requested from the frame scheduler; state
/// updates dispatched by components wake the root automatically. The
/// accessors borrow the root and must not be called from component bodies
/// or effects.
pub struct Root<H: Host + 'static> {
    inner: Rc<RefCell<RootInner<H>>>,
}

impl<H: Host + 'static> Clone for Root<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: Host + 'static> Root<H> {
    pub fn new(host: H, container: HostId, frames: Rc<dyn FrameScheduler>, clock: Rc<dyn Clock>) -> Self {
        Self::with_config(host, container, frames, clock, RootConfig::default())
    }

    pub fn with_config(
        host: H,
        container: HostId,
        frames: Rc<dyn FrameScheduler>,
        clock: Rc<dyn Clock>,
        config: RootConfig,
    ) -> Self {
        let idle = IdleScheduler::new(Rc::clone(&frames), clock, config.frame_budget);
        let runtime = Runtime::new();
        let inner = Rc::new_cyclic(|this: &Weak<RefCell<RootInner<H>>>| {
            let waker_idle = idle.clone();
            let waker_root = this.clone();
            runtime.set_waker(move || schedule_slice(&waker_idle, waker_root.clone()));
            RefCell::new(RootInner {
                this: this.clone(),
                host,
                reconciler: Reconciler::new(container),
                runtime,
                frames,
                idle,
                config,
                last_commit: None,
                commits: 0,
                error: None,
            })
        });
        Self { inner }
    }

    /// Mounts `element`, or re-renders it against the last commit.
    pub fn render(&self, element: Element) {
        let inner = &mut *self.inner.borrow_mut();
        log::debug!("{}: render requested", inner.config.label);
        inner.runtime.clear_rerender_request();
        inner.reconciler.render(element);
        inner.schedule();
    }

    /// Runs one scheduler loop pass against `deadline`.
    pub fn perform_work(&self, deadline: &dyn Deadline) -> Result<WorkStatus, FiberError> {
        self.inner.borrow_mut().work_loop(deadline)
    }

    /// Error that aborted the last scheduled slice, if any.
    pub fn take_error(&self) -> Option<FiberError> {
        self.inner.borrow_mut().error.take()
    }

    pub fn last_commit(&self) -> Option<CommitSummary> {
        self.inner.borrow().last_commit.clone()
    }

    pub fn commit_count(&self) -> u64 {
        self.inner.borrow().commits
    }

    pub fn with_host<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(&self.inner.borrow().host)
    }

    pub fn with_host_mut<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.inner.borrow_mut().host)
    }

    pub fn with_reconciler<R>(&self, f: impl FnOnce(&Reconciler) -> R) -> R {
        f(&self.inner.borrow().reconciler)
    }

    pub fn container(&self) -> HostId {
        self.inner.borrow().reconciler.container()
    }

    pub fn next_unit(&self) -> Option<FiberId> {
        self.inner.borrow().reconciler.next_unit()
    }

    pub fn work_in_progress(&self) -> Option<FiberId> {
        self.inner.borrow().reconciler.work_in_progress()
    }

    pub fn has_pending_work(&self) -> bool {
        let inner = self.inner.borrow();
        inner.reconciler.has_pending_work() || inner.runtime.has_rerender_request()
    }

    pub fn runtime(&self) -> Runtime {
        self.inner.borrow().runtime.clone()
    }

    pub fn idle(&self) -> IdleScheduler {
        self.inner.borrow().idle.clone()
    }

    pub fn config(&self) -> RootConfig {
        self.inner.borrow().config.clone()
    }
}

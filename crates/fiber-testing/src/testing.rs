//! Headless harness for driving a [`Root`] frame by frame.

use std::rc::Rc;
use std::time::Duration;

use fiber_core::{
    CommitSummary, Deadline, Element, Event, FiberError, HostId, HostOp, MemoryHost, Root,
    RootConfig, WorkStatus,
};

use crate::platform::{ManualClock, ManualFrames};

/// Time the harness clock moves between two frames.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Frames [`TestRoot::flush`] runs before giving up on a tree that keeps
/// scheduling work.
pub const MAX_FLUSH_FRAMES: usize = 256;

/// Test harness rendering into a [`MemoryHost`] with manual frame pacing.
///
/// Nothing runs until [`TestRoot::frame`] or [`TestRoot::flush`] is called,
/// so tests observe every intermediate state deterministically.
pub struct TestRoot {
    frames: Rc<ManualFrames>,
    clock: Rc<ManualClock>,
    root: Root<MemoryHost>,
    container: HostId,
}

impl TestRoot {
    /// Creates a harness with the default root configuration.
    pub fn new() -> Self {
        Self::with_config(RootConfig::default().with_label("test"))
    }

    pub fn with_config(config: RootConfig) -> Self {
        let frames = ManualFrames::new();
        let clock = ManualClock::new();
        let mut host = MemoryHost::new();
        let container = host.create_container("root");
        let root = Root::with_config(host, container, frames.clone(), clock.clone(), config);
        Self {
            frames,
            clock,
            root,
            container,
        }
    }

    /// Schedules `element` for rendering. Call [`TestRoot::flush`] to let
    /// it commit.
    pub fn render(&self, element: Element) {
        self.root.render(element);
    }

    /// Pulses one frame at the current time, runs the macrotasks it queued
    /// and advances the clock by [`FRAME_INTERVAL`]. Returns whether
    /// anything ran.
    pub fn frame(&self) -> bool {
        let pulsed = self.frames.pulse(self.clock.peek());
        let tasks = self.frames.run_tasks();
        self.clock.advance(FRAME_INTERVAL);
        pulsed + tasks > 0
    }

    /// Runs frames until no frame or task is queued; returns how many ran.
    ///
    /// # Panics
    ///
    /// Panics when the tree is still scheduling work after
    /// [`MAX_FLUSH_FRAMES`] frames.
    pub fn flush(&self) -> usize {
        let mut count = 0;
        while self.frames.pending_frames() > 0 || self.frames.pending_tasks() > 0 {
            assert!(
                count < MAX_FLUSH_FRAMES,
                "tree did not settle after {MAX_FLUSH_FRAMES} frames"
            );
            self.frame();
            count += 1;
        }
        count
    }

    /// Renders `element` and flushes, panicking if the cycle failed.
    pub fn mount(&self, element: Element) {
        self.render(element);
        self.flush();
        if let Some(err) = self.take_error() {
            panic!("render failed: {err}");
        }
    }

    /// Runs one scheduler pass against `deadline` outside the frame loop.
    pub fn perform_work(&self, deadline: &dyn Deadline) -> Result<WorkStatus, FiberError> {
        self.root.perform_work(deadline)
    }

    /// Markup currently attached under the container.
    pub fn html(&self) -> String {
        self.root.with_host(|host| host.inner_html(self.container))
    }

    /// Host node under the container whose `name` attribute is `value`.
    pub fn find(&self, name: &str, value: &str) -> Option<HostId> {
        self.root.with_host(|host| host.find(self.container, name, value))
    }

    /// Node with the given `id` attribute.
    ///
    /// # Panics
    ///
    /// Panics when no such node is attached.
    pub fn node(&self, id: &str) -> HostId {
        self.find("id", id)
            .unwrap_or_else(|| panic!("no node with id `{id}` in {}", self.html()))
    }

    /// Fires `kind` on `node` and returns how many listeners ran.
    ///
    /// Handlers run after the host borrow is released, so they may dispatch
    /// state updates freely.
    pub fn dispatch(&self, node: HostId, kind: &str) -> usize {
        let handlers = self.root.with_host(|host| host.listeners(node, kind));
        let event = Event::new(kind, node);
        for handler in &handlers {
            handler.call(&event);
        }
        handlers.len()
    }

    /// Clicks the node with `id` and flushes the resulting work.
    pub fn click(&self, id: &str) {
        let node = self.node(id);
        assert!(self.dispatch(node, "click") > 0, "`{id}` has no click listener");
        self.flush();
    }

    pub fn with_host<R>(&self, f: impl FnOnce(&MemoryHost) -> R) -> R {
        self.root.with_host(f)
    }

    /// Drains the host operation log.
    pub fn take_ops(&self) -> Vec<HostOp> {
        self.root.with_host_mut(MemoryHost::take_ops)
    }

    pub fn last_commit(&self) -> Option<CommitSummary> {
        self.root.last_commit()
    }

    pub fn take_error(&self) -> Option<FiberError> {
        self.root.take_error()
    }

    pub fn commit_count(&self) -> u64 {
        self.root.commit_count()
    }

    pub fn root(&self) -> &Root<MemoryHost> {
        &self.root
    }

    pub fn frames(&self) -> &Rc<ManualFrames> {
        &self.frames
    }

    pub fn clock(&self) -> &Rc<ManualClock> {
        &self.clock
    }

    pub fn container(&self) -> HostId {
        self.container
    }
}

impl Default for TestRoot {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need a fresh harness.
pub fn run_test_root<R>(f: impl FnOnce(&TestRoot) -> R) -> R {
    let root = TestRoot::new();
    f(&root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiber_core::{h, Props};

    #[test]
    fn flush_commits_a_render() {
        run_test_root(|root| {
            root.render(h("p", Props::new().with("id", "greeting"), ["hello"]));
            assert_eq!(root.html(), "");
            assert!(root.flush() > 0);
            assert_eq!(root.html(), r#"<p id="greeting">hello</p>"#);
            assert_eq!(root.commit_count(), 1);
        });
    }

    #[test]
    fn frame_advances_the_clock() {
        let root = TestRoot::new();
        assert!(!root.frame());
        assert_eq!(root.clock().peek(), 16_000_000);
    }
}

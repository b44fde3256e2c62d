use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

type Waker = Rc<dyn Fn() + 'static>;

struct RuntimeInner {
    rerender_requested: Cell<bool>,
    dispatches: Cell<u64>,
    waker: RefCell<Option<Waker>>,
}

impl RuntimeInner {
    fn new() -> Self {
        Self {
            rerender_requested: Cell::new(false),
            dispatches: Cell::new(0),
            waker: RefCell::new(None),
        }
    }

    fn request_rerender(&self) {
        self.rerender_requested.set(true);
        self.dispatches.set(self.dispatches.get() + 1);
        let waker = self.waker.borrow().clone();
        if let Some(waker) = waker {
            waker();
        }
    }
}

/// Per-root bookkeeping shared with state setters.
///
/// Setters only hold a [`RuntimeHandle`]; they never touch the fiber tree.
/// A dispatch raises the re-render flag and wakes the root, which restarts
/// reconciliation from the committed tree at its next unit boundary.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new()),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    /// Registers the callback invoked on every dispatch.
    pub fn set_waker(&self, waker: impl Fn() + 'static) {
        *self.inner.waker.borrow_mut() = Some(Rc::new(waker));
    }

    pub fn clear_waker(&self) {
        *self.inner.waker.borrow_mut() = None;
    }

    pub fn has_rerender_request(&self) -> bool {
        self.inner.rerender_requested.get()
    }

    /// Returns whether a re-render was requested since the last call.
    pub fn take_rerender_request(&self) -> bool {
        self.inner.rerender_requested.replace(false)
    }

    pub fn clear_rerender_request(&self) {
        self.inner.rerender_requested.set(false);
    }

    /// Total number of dispatches seen by this runtime.
    pub fn dispatch_count(&self) -> u64 {
        self.inner.dispatches.get()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct RuntimeHandle(Weak<RuntimeInner>);

impl RuntimeHandle {
    pub fn request_rerender(&self) {
        match self.0.upgrade() {
            Some(inner) => inner.request_rerender(),
            None => log::warn!("state update dropped: its root no longer exists"),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_sets_flag_and_wakes() {
        let runtime = Runtime::new();
        let woken = Rc::new(Cell::new(0));
        let woken_clone = Rc::clone(&woken);
        runtime.set_waker(move || woken_clone.set(woken_clone.get() + 1));

        let handle = runtime.handle();
        handle.request_rerender();
        handle.request_rerender();

        assert_eq!(woken.get(), 2);
        assert_eq!(runtime.dispatch_count(), 2);
        assert!(runtime.take_rerender_request());
        assert!(!runtime.take_rerender_request());
    }

    #[test]
    fn handle_outliving_runtime_is_inert() {
        let handle = {
            let runtime = Runtime::new();
            runtime.handle()
        };
        assert!(!handle.is_alive());
        handle.request_rerender();
    }
}

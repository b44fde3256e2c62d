#![doc = r"Core runtime pieces for the Fiber-RS reconciliation engine."]

extern crate self as fiber_core;

pub mod collections;
pub mod commit;
pub mod element;
pub mod fiber;
pub mod hooks;
pub mod host;
pub mod idle;
pub mod platform;
pub mod props;
pub mod reconciler;
pub mod root;
pub mod runtime;

pub use commit::{CommitSummary, CommittedEffect};
pub use element::{h, text, Component, Element, ElementKind};
pub use fiber::{EffectTag, Fiber, FiberId, FiberKind, FiberTree};
pub use hooks::{
    Cleanup, Context, Dep, Deps, Dispatch, HookKind, Hooks, RefObject, SetState, StateSetter,
};
pub use host::{Host, HostError, HostId, HostOp, MemoryHost};
pub use idle::{Deadline, FrameDeadline, IdleScheduler, DEFAULT_FRAME_BUDGET};
pub use platform::{Clock, FrameScheduler};
pub use props::{Event, EventHandler, PropValue, Props, Style, StyleValue};
pub use reconciler::Reconciler;
pub use root::{Root, RootConfig, WorkStatus};
pub use runtime::{Runtime, RuntimeHandle};

#[derive(Debug, thiserror::Error)]
pub enum FiberError {
    #[error("context `{context}` is not provided above `{component}`")]
    MissingContext {
        context: &'static str,
        component: &'static str,
    },
    #[error("hook #{index} in `{component}` was a {expected} hook on the previous render but is now called as {found}")]
    HookMismatch {
        component: &'static str,
        index: usize,
        expected: HookKind,
        found: HookKind,
    },
    #[error("`{component}` called {current} hooks but called {previous} on the previous render")]
    HookCountChanged {
        component: &'static str,
        previous: usize,
        current: usize,
    },
    #[error("hook #{index} in `{component}` holds a value of a different type")]
    HookTypeMismatch {
        component: &'static str,
        index: usize,
    },
    #[error("`{component}` failed to render: {message}")]
    Render { component: String, message: String },
    #[error("fiber {0:?} is no longer in the tree")]
    StaleFiber(FiberId),
    #[error("fiber {0:?} has no host-bearing ancestor")]
    Detached(FiberId),
    #[error(transparent)]
    Host(#[from] HostError),
}

impl FiberError {
    /// Error raised by a component body.
    pub fn render(component: impl Into<String>, message: impl Into<String>) -> Self {
        FiberError::Render {
            component: component.into(),
            message: message.into(),
        }
    }
}

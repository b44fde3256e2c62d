//! Testing utilities and harness for Fiber-RS

pub mod platform;
pub mod testing;

pub use platform::*;
pub use testing::*;

pub mod prelude {
    pub use crate::platform::*;
    pub use crate::testing::*;
    pub use fiber_core::{deps, h, text, Component, Element, FiberError, Props};
}

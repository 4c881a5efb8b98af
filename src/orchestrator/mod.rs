//! Application-level orchestration.
//!
//! Owns the caption worker lifecycle. UI layers send commands here and receive
//! events back, keeping blocking model calls off the render loop.

mod controller;

pub(crate) use controller::{run_controller, UiCommand};

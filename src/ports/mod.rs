//! Port traits defining external boundaries.
//!
//! Each trait represents a boundary between the pipeline core and an
//! external system (compiler-style tools, browser drivers).
//! Implementations live in `src/adapters/`.

pub mod browser;
pub mod tool;

pub use browser::{BoxError, BrowserLauncher, BrowserSession, DriverFuture, DriverService};
pub use tool::{ToolInvocation, ToolOutput, ToolRunner};

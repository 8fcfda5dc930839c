//! External tool resolution and invocation.
//!
//! This module provides:
//! - `Tool`, the fixed set of toolkit scripts and their names
//! - `ToolchainLocator`, resolved once per run from settings and platform
//! - `ToolInvocation`, one fully built command line
//! - `ToolInvoker`, the seam between the executor and subprocesses

mod definitions;
mod invocation;
mod invoker;
mod locator;

pub use definitions::Tool;
pub use invocation::{ExitStatus, InvocationOutcome, ToolInvocation};
pub use invoker::{SubprocessInvoker, ToolInvoker};
pub use locator::ToolchainLocator;

#[cfg(test)]
pub use invoker::MockToolInvoker;

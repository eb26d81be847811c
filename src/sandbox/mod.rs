//! Isolated child-process execution.
//!
//! Untrusted candidate code only ever runs inside a child spawned here. The
//! child gets a scrubbed environment, its own process group, bounded output
//! capture and a wall-clock deadline after which the whole group is killed.

pub mod output;
pub mod process;
pub mod scripts;

pub use process::{run_sandboxed, SandboxCommand, SandboxOutput};

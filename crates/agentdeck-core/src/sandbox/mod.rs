//! Host-side capabilities offered to agents
//!
//! This module provides:
//! - Workspace root confinement for every path an agent sends
//! - Text file read/write and directory listing inside that root
//! - Bounded shell command execution

mod filesystem;
mod terminal;
mod workspace;

pub use filesystem::FileSystemHandler;
pub(crate) use filesystem::write_atomic;
pub use terminal::{TerminalHandler, TerminalLimits};
pub use workspace::WorkspaceRoot;

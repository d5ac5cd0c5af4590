//! Process-level services: provisioning, launching, and handle ownership.
//!
//! ## Contents
//! - [`Provisioner`] — installs bundled stage binaries into an executable
//!   location and fixes permission bits
//! - [`LaunchSpec`] / [`launch`] — spawns exactly one child with captured
//!   output; [`kill_stray`] sweeps leftover processes by binary name
//! - [`ProcessHandle`] / [`OutputLines`] — exclusive ownership of one child:
//!   queried liveness, line-based output, graceful-then-forced termination

mod handle;
mod launch;
mod provision;

pub use handle::{OutputLines, ProcessHandle};
pub use launch::{kill_stray, launch, LaunchSpec};
pub use provision::Provisioner;

//! Command queue and stale command tracking for the server
//!
//! This module handles:
//! - Scheduling a script on a machine
//! - Handing pending commands to the machine that owns them
//! - Recording reported results (last write wins)
//! - Reporting commands that have been pending for too long

mod queue;
mod stale;

pub use queue::CommandQueue;
pub use stale::StaleCommandMonitor;

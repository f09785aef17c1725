//! Agent side of the fleet dispatcher
//!
//! This module handles:
//! - Periodic heartbeats keeping this machine in the active list
//! - Polling for pending commands and executing their scripts
//! - Reporting each result back to the server

mod runner;

pub use runner::AgentLoop;

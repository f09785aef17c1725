//! Script execution on the local machine
//!
//! This module handles:
//! - Running a script body through the configured shell
//! - Bounding each run by the execution timeout
//! - Classifying the run into the outcome reported to the server

mod executor;

pub use executor::ScriptExecutor;

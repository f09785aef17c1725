//! Fleet registry for tracking registered machines
//!
//! This module handles:
//! - Registering machines and refreshing them on every heartbeat
//! - Listing machines seen within the active window

mod registry;

pub use registry::FleetRegistry;

//! Dispatch API server: fleet registry, script library, command queue and
//! the HTTP surface over them.

pub mod api;
pub mod command;
pub mod config;
pub mod error;
pub mod fleet;
pub mod script;
pub mod store;

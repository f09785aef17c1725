//! Named, immutable script bodies

mod store;

pub use store::ScriptStore;

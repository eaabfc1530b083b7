//! Job wrappers and the dispatch registry.

pub mod entry;
pub mod registry;

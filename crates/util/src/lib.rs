//! Forge utility functions shared by the engine, pipeline and CLI crates.

pub mod path_processing;
pub mod text_processing;

pub use path_processing::{expand_tilde, find_ancestor_with};
pub use text_processing::{redact_sensitive, redact_sensitive_with};

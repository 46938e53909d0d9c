//! Configuration management for Forge.
//! This module locates, parses and validates the `forge.yaml` configuration file.

mod io;
mod model;
mod validation;

pub use io::load_config;

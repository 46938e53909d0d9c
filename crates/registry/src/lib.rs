//! Registry access for Forge.
//!
//! [`RegistryClient`] checks whether images exist in a Docker Registry v2 repository,
//! handling the basic-to-bearer authentication handshake and memoizing answers in a
//! [`PushCache`]. [`Docker`] wraps the local container tool.

pub mod cache;
pub mod challenge;
pub mod client;
pub mod docker;
pub mod reference;

pub use cache::PushCache;
pub use challenge::BearerChallenge;
pub use client::RegistryClient;
pub use docker::Docker;
pub use reference::{RegistryTarget, image_ref};

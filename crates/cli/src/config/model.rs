//! Data models for `forge.yaml`.

use std::path::PathBuf;

use forge_types::Secret;
use serde::Deserialize;

/// `forge.yaml` as written on disk.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawConfig {
    pub organization: Option<String>,
    /// Output and checkout directory; relative paths are resolved against the file's directory.
    pub workdir: Option<String>,
    /// `<registry>/<repo>`.
    pub docker_repo: Option<String>,
    pub user: Option<String>,
    /// Base64 encoded registry password.
    pub password: Option<String>,
    pub token: Option<String>,
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// The file this configuration was read from.
    pub path: PathBuf,
    pub organization: Option<String>,
    pub workdir: PathBuf,
    pub registry: String,
    pub repo: String,
    pub user: String,
    pub password: Secret,
    pub token: Option<Secret>,
}

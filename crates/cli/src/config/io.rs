//! Locating and reading `forge.yaml`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use forge_engine::ConfigError;
use forge_util::{expand_tilde, find_ancestor_with};

use crate::config::model::{ForgeConfig, RawConfig};
use crate::config::validation::validate_config;

pub const CONFIG_FILE: &str = "forge.yaml";
pub const CONFIG_ENV: &str = "FORGE_CONFIG";

/// Resolves the configuration file: an explicit path, then `FORGE_CONFIG`, then the
/// nearest `forge.yaml` at or above `cwd`.
pub fn locate_config(explicit: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = env::var(CONFIG_ENV)
        && !path.trim().is_empty()
    {
        return Some(expand_tilde(&path));
    }
    find_ancestor_with(cwd, CONFIG_FILE).map(|dir| dir.join(CONFIG_FILE))
}

/// Locates, reads and validates the configuration for a run started in the current
/// directory.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<ForgeConfig> {
    let cwd = env::current_dir().context("read current directory")?;
    let path = locate_config(explicit, &cwd)
        .ok_or_else(|| ConfigError::new(format!("unable to find {CONFIG_FILE}, try running `forge setup`")))?;
    load_config_from_path(&path)
}

pub fn load_config_from_path(path: &Path) -> anyhow::Result<ForgeConfig> {
    let path = std::path::absolute(path).with_context(|| format!("resolve {}", path.display()))?;
    let content = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let raw: RawConfig = if content.trim().is_empty() {
        RawConfig::default()
    } else {
        serde_yaml::from_str(&content).map_err(|error| ConfigError::new(format!("invalid {}: {error}", path.display())))?
    };
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok(validate_config(raw, &path, &base)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "docker-repo: registry.example.com/acme\nuser: bob\npassword: aHVudGVyMg==\nworkdir: out\n";

    #[test]
    fn explicit_path_wins_over_environment() {
        temp_env::with_var(CONFIG_ENV, Some("/from/env/forge.yaml"), || {
            let found = locate_config(Some(Path::new("/explicit/forge.yaml")), Path::new("/"));
            assert_eq!(found, Some(PathBuf::from("/explicit/forge.yaml")));

            let found = locate_config(None, Path::new("/"));
            assert_eq!(found, Some(PathBuf::from("/from/env/forge.yaml")));
        });
    }

    #[test]
    fn searches_upward_from_the_working_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        let nested = root.path().join("services").join("web");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(root.path().join(CONFIG_FILE), VALID).expect("write");

        temp_env::with_var_unset(CONFIG_ENV, || {
            assert_eq!(locate_config(None, &nested), Some(root.path().join(CONFIG_FILE)));
        });
    }

    #[test]
    fn loads_and_validates_a_file() {
        let root = tempfile::tempdir().expect("tempdir");
        let path = root.path().join(CONFIG_FILE);
        fs::write(&path, VALID).expect("write");

        let config = load_config_from_path(&path).expect("valid config");
        assert_eq!(config.user, "bob");
        assert_eq!(config.workdir, root.path().join("out"));
        assert_eq!(config.path, path);
    }

    #[test]
    fn empty_file_reports_the_first_missing_property() {
        let root = tempfile::tempdir().expect("tempdir");
        let path = root.path().join(CONFIG_FILE);
        fs::write(&path, "").expect("write");

        let error = load_config_from_path(&path).expect_err("invalid");
        assert_eq!(error.to_string(), "docker-repo must be configured");
    }
}

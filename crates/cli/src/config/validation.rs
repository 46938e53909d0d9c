//! Turns a [`RawConfig`] into a [`ForgeConfig`] or a [`ConfigError`].

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use forge_engine::ConfigError;
use forge_types::Secret;
use forge_util::expand_tilde;

use crate::config::model::{ForgeConfig, RawConfig};

/// Validates `raw`, read from `path`. `base` is the directory relative workdirs resolve
/// against.
pub fn validate_config(raw: RawConfig, path: &Path, base: &Path) -> Result<ForgeConfig, ConfigError> {
    let (registry, repo) = split_docker_repo(raw.docker_repo.as_deref())?;
    let user = raw
        .user
        .filter(|user| !user.trim().is_empty())
        .ok_or_else(|| ConfigError::new("missing config property: user"))?;
    let password = decode_password(raw.password.as_deref())?;

    let workdir = match raw.workdir.as_deref().map(str::trim).filter(|dir| !dir.is_empty()) {
        Some(dir) => {
            let dir = expand_tilde(dir);
            if dir.is_absolute() { dir } else { base.join(dir) }
        }
        None => base.to_path_buf(),
    };

    Ok(ForgeConfig {
        path: path.to_path_buf(),
        organization: raw.organization,
        workdir,
        registry,
        repo,
        user,
        password,
        token: raw.token.filter(|token| !token.is_empty()).map(Secret::new),
    })
}

fn split_docker_repo(value: Option<&str>) -> Result<(String, String), ConfigError> {
    let value = value.ok_or_else(|| ConfigError::new("docker-repo must be configured"))?;
    match value.trim().split_once('/') {
        Some((registry, repo)) if !registry.is_empty() && !repo.is_empty() => Ok((registry.to_string(), repo.to_string())),
        _ => Err(ConfigError::new("docker-repo must be in the form <registry-url>/<name>")),
    }
}

fn decode_password(value: Option<&str>) -> Result<Secret, ConfigError> {
    let encoded: String = value
        .unwrap_or_default()
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect();
    if encoded.is_empty() {
        return Err(ConfigError::new("docker password must be configured"));
    }
    let bytes = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|_| ConfigError::new("docker password must be base64 encoded"))?;
    let password = String::from_utf8(bytes).map_err(|_| ConfigError::new("docker password must be valid UTF-8"))?;
    Ok(Secret::new(password))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawConfig {
        RawConfig {
            docker_repo: Some("registry.example.com/acme".into()),
            user: Some("bob".into()),
            password: Some("aHVudGVyMg==".into()),
            ..RawConfig::default()
        }
    }

    fn validate(raw: RawConfig) -> Result<ForgeConfig, ConfigError> {
        validate_config(raw, Path::new("/proj/forge.yaml"), Path::new("/proj"))
    }

    #[test]
    fn valid_config_decodes_password() {
        let config = validate(raw()).expect("valid");
        assert_eq!(config.registry, "registry.example.com");
        assert_eq!(config.repo, "acme");
        assert_eq!(config.password.expose(), "hunter2");
        assert_eq!(config.workdir, Path::new("/proj"));
    }

    #[test]
    fn repo_may_contain_slashes() {
        let config = validate(RawConfig {
            docker_repo: Some("registry.example.com:5000/acme/team".into()),
            ..raw()
        })
        .expect("valid");
        assert_eq!(config.registry, "registry.example.com:5000");
        assert_eq!(config.repo, "acme/team");
    }

    #[test]
    fn invalid_configs_name_the_problem() {
        let cases = [
            (RawConfig { docker_repo: None, ..raw() }, "docker-repo must be configured"),
            (
                RawConfig {
                    docker_repo: Some("acme".into()),
                    ..raw()
                },
                "docker-repo must be in the form <registry-url>/<name>",
            ),
            (RawConfig { user: None, ..raw() }, "missing config property: user"),
            (RawConfig { password: None, ..raw() }, "docker password must be configured"),
            (
                RawConfig {
                    password: Some("%%%".into()),
                    ..raw()
                },
                "docker password must be base64 encoded",
            ),
        ];
        for (config, message) in cases {
            assert_eq!(validate(config).expect_err(message).to_string(), message);
        }
    }

    #[test]
    fn password_whitespace_is_tolerated() {
        let config = validate(RawConfig {
            password: Some("aHVu\n dGVyMg==\n".into()),
            ..raw()
        })
        .expect("valid");
        assert_eq!(config.password.expose(), "hunter2");
    }

    #[test]
    fn relative_workdir_resolves_against_the_config_directory() {
        let config = validate(RawConfig {
            workdir: Some("build".into()),
            ..raw()
        })
        .expect("valid");
        assert_eq!(config.workdir, Path::new("/proj/build"));
    }
}

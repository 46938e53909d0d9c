use forge_types::Secret;

/// A registry repository together with the credentials used to reach it.
#[derive(Clone, Debug)]
pub struct RegistryTarget {
    /// Host (and optional port), e.g. `registry.example.com`.
    pub registry: String,
    /// Repository namespace under the registry.
    pub repo: String,
    pub user: String,
    pub password: Secret,
}

impl RegistryTarget {
    pub fn new(registry: impl Into<String>, repo: impl Into<String>, user: impl Into<String>, password: Secret) -> Self {
        Self {
            registry: registry.into(),
            repo: repo.into(),
            user: user.into(),
            password,
        }
    }

    /// Fully qualified reference of image `name` at `version` in this repository.
    pub fn image(&self, name: &str, version: &str) -> String {
        image_ref(&self.registry, &self.repo, name, version)
    }
}

/// `{registry}/{repo}/{name}:{version}`.
pub fn image_ref(registry: &str, repo: &str, name: &str, version: &str) -> String {
    format!("{registry}/{repo}/{name}:{version}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_reference_is_fully_qualified() {
        let target = RegistryTarget::new("registry.example:5000", "acme", "bob", Secret::new("pw"));
        assert_eq!(target.image("web", "abc123.git"), "registry.example:5000/acme/web:abc123.git");
    }
}

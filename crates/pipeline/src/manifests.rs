//! Manifest rendering.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use forge_engine::ForgeError;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tokio::fs;
use tracing::debug;

use crate::records::Service;

/// Values a renderer may substitute into a service's manifests.
#[derive(Clone, Debug, Default)]
pub struct RenderContext {
    pub registry: String,
    pub repo: String,
    /// `(image name, fully qualified reference)` for every container of the service, in
    /// container order.
    pub images: Vec<(String, String)>,
}

/// Writes the deployment manifests of one service into a directory.
#[async_trait]
pub trait ManifestRenderer: Send + Sync {
    async fn render(&self, service: &Service, context: &RenderContext, output: &Path) -> Result<(), ForgeError>;
}

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([a-z]+)(?::([A-Za-z0-9_.-]+))?\s*\}\}").expect("placeholder pattern"));

/// Copies `<root>/k8s/*.yaml` (and `*.yml`) into the output directory, filling in
/// `{{name}}`, `{{version}}`, `{{registry}}`, `{{repo}}`, `{{image}}` and
/// `{{image:<name>}}`. Unknown placeholders are left untouched.
#[derive(Clone, Debug)]
pub struct TemplateRenderer {
    source_dir: PathBuf,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("k8s"),
        }
    }
}

impl TemplateRenderer {
    /// Reads templates from `dir` relative to each service root instead of `k8s`.
    pub fn with_source_dir(dir: impl Into<PathBuf>) -> Self {
        Self { source_dir: dir.into() }
    }
}

#[async_trait]
impl ManifestRenderer for TemplateRenderer {
    async fn render(&self, service: &Service, context: &RenderContext, output: &Path) -> Result<(), ForgeError> {
        if fs::try_exists(output).await.unwrap_or(false) {
            fs::remove_dir_all(output)
                .await
                .map_err(|error| ForgeError::io(format!("clear {}", output.display()), error))?;
        }
        fs::create_dir_all(output)
            .await
            .map_err(|error| ForgeError::io(format!("create {}", output.display()), error))?;

        let source = service.root.join(&self.source_dir);
        let templates = match list_templates(&source).await {
            Ok(templates) => templates,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(service = %service.name, "service has no manifest templates");
                return Ok(());
            }
            Err(error) => return Err(ForgeError::io(format!("read {}", source.display()), error)),
        };

        for template in templates {
            let text = fs::read_to_string(&template)
                .await
                .map_err(|error| ForgeError::io(format!("read {}", template.display()), error))?;
            let Some(file_name) = template.file_name() else { continue };
            let target = output.join(file_name);
            fs::write(&target, fill(&text, service, context))
                .await
                .map_err(|error| ForgeError::io(format!("write {}", target.display()), error))?;
        }
        Ok(())
    }
}

async fn list_templates(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut templates = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if is_yaml && entry.file_type().await?.is_file() {
            templates.push(path);
        }
    }
    templates.sort();
    Ok(templates)
}

fn fill(text: &str, service: &Service, context: &RenderContext) -> String {
    let by_name: HashMap<&str, &str> = context
        .images
        .iter()
        .map(|(name, reference)| (name.as_str(), reference.as_str()))
        .collect();

    PLACEHOLDER
        .replace_all(text, |caps: &Captures| {
            let key = &caps[1];
            let value = match (key, caps.get(2)) {
                ("name", None) => Some(service.name.as_str()),
                ("version", None) => Some(service.version.as_str()),
                ("registry", None) => Some(context.registry.as_str()),
                ("repo", None) => Some(context.repo.as_str()),
                ("image", None) => context.images.first().map(|(_, reference)| reference.as_str()),
                ("image", Some(name)) => by_name.get(name.as_str()).copied(),
                _ => None,
            };
            value.map_or_else(|| caps[0].to_string(), str::to_string)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RenderContext {
        RenderContext {
            registry: "r.example".into(),
            repo: "acme".into(),
            images: vec![
                ("shop".into(), "r.example/acme/shop:9.git".into()),
                ("shop-worker".into(), "r.example/acme/shop-worker:9.git".into()),
            ],
        }
    }

    #[test]
    fn fills_known_placeholders() {
        let service = Service::new("shop", "9.git", "/src/shop");
        let text = "name: {{name}}\nimage: {{ image }}\nworker: {{image:shop-worker}}\ntag: {{version}}\nother: {{unknown}}";
        assert_eq!(
            fill(text, &service, &context()),
            "name: shop\nimage: r.example/acme/shop:9.git\nworker: r.example/acme/shop-worker:9.git\ntag: 9.git\nother: {{unknown}}"
        );
    }

    #[tokio::test]
    async fn renders_templates_into_a_fresh_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(root.path().join("k8s")).expect("mkdir");
        std::fs::write(root.path().join("k8s/deploy.yaml"), "image: {{image}}").expect("write");
        std::fs::write(root.path().join("k8s/notes.txt"), "ignored").expect("write");

        let out = tempfile::tempdir().expect("tempdir");
        let output = out.path().join("k8s").join("shop");
        std::fs::create_dir_all(&output).expect("mkdir");
        std::fs::write(output.join("stale.yaml"), "old").expect("write");

        let service = Service::new("shop", "9.git", root.path());
        TemplateRenderer::default()
            .render(&service, &context(), &output)
            .await
            .expect("render");

        assert_eq!(
            std::fs::read_to_string(output.join("deploy.yaml")).expect("rendered"),
            "image: r.example/acme/shop:9.git"
        );
        assert!(!output.join("notes.txt").exists());
        assert!(!output.join("stale.yaml").exists());
    }

    #[tokio::test]
    async fn missing_template_directory_renders_nothing() {
        let root = tempfile::tempdir().expect("tempdir");
        let out = tempfile::tempdir().expect("tempdir");
        let output = out.path().join("svc");

        TemplateRenderer::default()
            .render(&Service::new("svc", "1", root.path()), &RenderContext::default(), &output)
            .await
            .expect("render");
        assert!(output.is_dir());
    }

    #[tokio::test]
    async fn custom_source_directory_is_read_instead_of_k8s() {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(root.path().join("deploy/kube")).expect("mkdir");
        std::fs::write(root.path().join("deploy/kube/svc.yml"), "name: {{name}}").expect("write");
        std::fs::create_dir(root.path().join("k8s")).expect("mkdir");
        std::fs::write(root.path().join("k8s/ignored.yaml"), "kind: Ignored").expect("write");

        let out = tempfile::tempdir().expect("tempdir");
        let output = out.path().join("shop");
        TemplateRenderer::with_source_dir("deploy/kube")
            .render(&Service::new("shop", "9.git", root.path()), &context(), &output)
            .await
            .expect("render");

        assert_eq!(std::fs::read_to_string(output.join("svc.yml")).expect("rendered"), "name: shop");
        assert!(!output.join("ignored.yaml").exists());
    }
}

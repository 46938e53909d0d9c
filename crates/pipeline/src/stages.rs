//! The bake, push, yaml and deploy stages.
//!
//! Stages run one after another; every task of a stage finishes before the next stage
//! starts. Inside a stage, per-record work runs concurrently and one record's failure
//! does not stop its siblings. Nothing already built, pushed or applied is rolled back.

use std::path::PathBuf;
use std::sync::Arc;

use forge_engine::{Conflict, ConflictError, ForgeError, Workstream, concurrent_filter_map, concurrent_map, drain, gather};
use forge_registry::{Docker, RegistryClient, RegistryTarget};
use futures_util::StreamExt;
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::kubectl::Kubectl;
use crate::manifests::{ManifestRenderer, RenderContext, TemplateRenderer};
use crate::records::{PipelineRecord, Service, records};

/// Runs the stages against one registry repository and one output directory.
#[derive(Clone)]
pub struct Pipeline {
    registry: RegistryClient,
    docker: Docker,
    kubectl: Kubectl,
    renderer: Arc<dyn ManifestRenderer>,
    workdir: PathBuf,
}

impl Pipeline {
    pub fn new(workstream: Workstream, target: RegistryTarget, workdir: impl Into<PathBuf>) -> Self {
        Self {
            registry: RegistryClient::new(workstream.clone(), target),
            docker: Docker::new(workstream.clone()),
            kubectl: Kubectl::new(workstream),
            renderer: Arc::new(TemplateRenderer::default()),
            workdir: workdir.into(),
        }
    }

    pub fn with_registry(mut self, registry: RegistryClient) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_docker(mut self, docker: Docker) -> Self {
        self.docker = docker;
        self
    }

    pub fn with_kubectl(mut self, kubectl: Kubectl) -> Self {
        self.kubectl = kubectl;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ManifestRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    fn target(&self) -> &RegistryTarget {
        self.registry.target()
    }

    fn image(&self, record: &PipelineRecord) -> String {
        self.target().image(&record.image, record.version())
    }

    /// Output directory for a service's rendered manifests.
    pub fn manifest_dir(&self, service: &Service) -> PathBuf {
        self.workdir.join("k8s").join(&service.name)
    }

    /// A record is raw when its image exists neither in the registry nor locally.
    pub async fn is_raw(&self, record: &PipelineRecord) -> Result<bool, ForgeError> {
        if self.registry.image_exists_remote(&record.image, record.version()).await? {
            return Ok(false);
        }
        Ok(!self.docker.image_exists_local(&self.image(record)).await?)
    }

    /// Builds every image that exists neither remotely nor locally.
    pub async fn bake(&self, services: &[Arc<Service>]) -> Result<(), ForgeError> {
        let raw = gather(concurrent_filter_map(records(services), |record| {
            let pipeline = self.clone();
            async move { Ok(pipeline.is_raw(&record).await?.then_some(record)) }
        }))
        .await?;
        debug!(count = raw.len(), "images to build");

        drain(concurrent_map(raw, |record| {
            let pipeline = self.clone();
            async move {
                let image = pipeline.image(&record);
                pipeline.docker.build(&record.context_dir(), &image).await?;
                info!(image = %image, "image built");
                Ok(())
            }
        }))
        .await
    }

    /// Pushes every image that exists locally but not in the registry, after a single
    /// login.
    pub async fn push(&self, services: &[Arc<Service>]) -> Result<(), ForgeError> {
        let unpushed = gather(concurrent_filter_map(records(services), |record| {
            let pipeline = self.clone();
            async move {
                let local = pipeline.docker.image_exists_local(&pipeline.image(&record)).await?;
                let qualifies = local && !pipeline.registry.image_exists_remote(&record.image, record.version()).await?;
                Ok(qualifies.then_some(record))
            }
        }))
        .await?;
        if unpushed.is_empty() {
            return Ok(());
        }

        let target = self.target();
        self.docker.login(&target.registry, &target.user, &target.password).await?;

        drain(concurrent_map(unpushed, |record| {
            let pipeline = self.clone();
            async move {
                let image = pipeline.image(&record);
                pipeline.registry.invalidate(&image);
                pipeline.docker.push(&image).await?;
                info!(image = %image, "image pushed");
                Ok(())
            }
        }))
        .await
    }

    /// Renders every service's manifests and checks that no two services claim the same
    /// resource. Returns the manifest directories in service order.
    pub async fn yaml(&self, services: &[Arc<Service>]) -> Result<Vec<PathBuf>, ForgeError> {
        let mut rendered = concurrent_map(services.iter().cloned(), |service| {
            let pipeline = self.clone();
            async move {
                let dir = pipeline.render(&service).await?;
                let resources = pipeline.kubectl.resources(&dir).await?;
                Ok((service, dir, resources))
            }
        });

        let mut owners: IndexMap<String, String> = IndexMap::new();
        let mut conflicts = Vec::new();
        let mut dirs = Vec::new();
        while let Some(next) = rendered.next().await {
            let (service, dir, resources) = next?;
            for resource in resources {
                match owners.get(&resource) {
                    Some(owner) => conflicts.push(Conflict::new(resource, owner.clone(), service.name.clone())),
                    None => {
                        owners.insert(resource, service.name.clone());
                    }
                }
            }
            dirs.push(dir);
        }

        if !conflicts.is_empty() {
            return Err(ConflictError { conflicts }.into());
        }
        Ok(dirs)
    }

    async fn render(&self, service: &Arc<Service>) -> Result<PathBuf, ForgeError> {
        let target = self.target();
        let context = RenderContext {
            registry: target.registry.clone(),
            repo: target.repo.clone(),
            images: records(std::slice::from_ref(service))
                .iter()
                .map(|record| (record.image.clone(), self.image(record)))
                .collect(),
        };
        let dir = self.manifest_dir(service);
        self.renderer.render(service, &context, &dir).await?;
        Ok(dir)
    }

    /// `bake`, then `push`, then `yaml`.
    pub async fn build(&self, services: &[Arc<Service>]) -> Result<Vec<PathBuf>, ForgeError> {
        self.bake(services).await?;
        self.push(services).await?;
        self.yaml(services).await
    }

    /// Builds, then applies every manifest directory. With `dry_run` the cluster tool
    /// only simulates the apply.
    pub async fn deploy(&self, services: &[Arc<Service>], dry_run: bool) -> Result<Vec<PathBuf>, ForgeError> {
        let dirs = self.build(services).await?;
        drain(concurrent_map(dirs.clone(), |dir| {
            let pipeline = self.clone();
            async move { pipeline.kubectl.apply(&dir, dry_run).await.map(drop) }
        }))
        .await?;
        Ok(dirs)
    }
}

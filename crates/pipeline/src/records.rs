//! Services discovered in the source tree and the per-container records the stages work on.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A deployable unit: a directory with one or more container builds and its manifests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    /// Content-derived tag, fixed for the run.
    pub version: String,
    pub root: PathBuf,
    /// Dockerfile paths relative to `root`.
    pub containers: Vec<PathBuf>,
}

impl Service {
    pub fn new(name: impl Into<String>, version: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            root: root.into(),
            containers: Vec::new(),
        }
    }

    pub fn with_container(mut self, dockerfile: impl Into<PathBuf>) -> Self {
        self.containers.push(dockerfile.into());
        self
    }
}

/// One container build of one service.
#[derive(Clone, Debug)]
pub struct PipelineRecord {
    pub service: Arc<Service>,
    /// Image name without registry, repository or tag.
    pub image: String,
    /// Dockerfile path relative to the service root.
    pub container: PathBuf,
}

impl PipelineRecord {
    /// Build context: the directory holding the Dockerfile.
    pub fn context_dir(&self) -> PathBuf {
        match self.container.parent() {
            Some(parent) => self.service.root.join(parent),
            None => self.service.root.clone(),
        }
    }

    pub fn version(&self) -> &str {
        &self.service.version
    }
}

/// Expands services into one record per container, in service then container order.
///
/// A sole container, or the first one at the service root, is named after the service.
/// Every other container is `<service>-<directory name>`.
pub fn records(services: &[Arc<Service>]) -> Vec<PipelineRecord> {
    services
        .iter()
        .flat_map(|service| {
            let mut root_claimed = false;
            let mut seen = HashSet::new();
            service
                .containers
                .iter()
                .map(|container| {
                    let at_root = container.parent().is_none_or(|parent| parent.as_os_str().is_empty());
                    let image = if service.containers.len() == 1 || (at_root && !root_claimed) {
                        root_claimed |= at_root;
                        service.name.clone()
                    } else {
                        format!("{}-{}", service.name, suffix(container))
                    };
                    let image = dedupe(&mut seen, image);
                    PipelineRecord {
                        service: service.clone(),
                        image,
                        container: container.clone(),
                    }
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

fn suffix(container: &Path) -> String {
    container
        .parent()
        .and_then(Path::file_name)
        .or_else(|| container.file_name())
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn dedupe(seen: &mut HashSet<String>, image: String) -> String {
    let mut candidate = image.clone();
    let mut n = 2;
    while !seen.insert(candidate.clone()) {
        candidate = format!("{image}-{n}");
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sole_container_is_named_after_the_service() {
        let service = Arc::new(Service::new("web", "1.git", "/src/web").with_container("docker/Dockerfile"));
        let records = records(&[service]);
        assert_eq!(records[0].image, "web");
        assert_eq!(records[0].context_dir(), PathBuf::from("/src/web/docker"));
    }

    #[test]
    fn extra_containers_get_their_directory_suffix() {
        let service = Arc::new(
            Service::new("shop", "2.git", "/src/shop")
                .with_container("Dockerfile")
                .with_container("worker/Dockerfile")
                .with_container("Admin/Dockerfile"),
        );
        let names: Vec<_> = records(&[service]).into_iter().map(|record| record.image).collect();
        assert_eq!(names, vec!["shop", "shop-worker", "shop-admin"]);
    }

    #[test]
    fn records_follow_service_order() {
        let a = Arc::new(Service::new("a", "1", "/a").with_container("Dockerfile"));
        let b = Arc::new(Service::new("b", "1", "/b").with_container("Dockerfile"));
        let names: Vec<_> = records(&[a, b]).into_iter().map(|record| record.service.name.clone()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}

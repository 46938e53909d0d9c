//! Discovers services in the source tree.
//!
//! A directory holding `proto.yaml` is a prototype and is skipped with everything below
//! it. A directory holding `service.yaml` starts a service; every `Dockerfile` at or below
//! it, up to the next service, is one of its containers.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use forge_engine::{ForgeError, Workstream, concurrent_map, gather};
use forge_pipeline::{Service, service_version};
use serde::Deserialize;
use tracing::debug;

const PROTOTYPE_FILE: &str = "proto.yaml";
const SERVICE_FILE: &str = "service.yaml";
const DOCKERFILE: &str = "Dockerfile";
const EXCLUDED: &[&str] = &[".git"];

#[derive(Debug, Deserialize)]
struct ServiceDescriptor {
    name: String,
}

/// A service found on disk, before its version is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    pub name: String,
    pub root: PathBuf,
    pub containers: Vec<PathBuf>,
}

#[derive(Default)]
struct Scan {
    found: Vec<Discovered>,
    names: HashSet<String>,
}

/// Services under each of `roots`, in discovery order. The first service of a name wins.
pub fn discover(roots: &[PathBuf]) -> Result<Vec<Discovered>> {
    let mut scan = Scan::default();
    for root in roots {
        if root.is_dir() {
            scan.descend(root, None)?;
        }
    }
    Ok(scan.found)
}

impl Scan {
    /// `parent` is the service that owns Dockerfiles found here, if any.
    fn descend(&mut self, dir: &Path, parent: Option<Owner>) -> Result<()> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .with_context(|| format!("read {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        if names.iter().any(|name| name == PROTOTYPE_FILE) {
            return Ok(());
        }

        let mut parent = parent;
        if names.iter().any(|name| name == SERVICE_FILE) {
            let descriptor = read_descriptor(&dir.join(SERVICE_FILE))?;
            parent = if self.names.insert(descriptor.name.clone()) {
                self.found.push(Discovered {
                    name: descriptor.name,
                    root: dir.to_path_buf(),
                    containers: Vec::new(),
                });
                Some(Owner::Service(self.found.len() - 1))
            } else {
                debug!(service = %descriptor.name, dir = %dir.display(), "duplicate service ignored");
                Some(Owner::Shadowed)
            };
        }

        if let Some(Owner::Service(index)) = parent
            && names.iter().any(|name| name == DOCKERFILE)
        {
            let service = &mut self.found[index];
            let relative = dir.strip_prefix(&service.root).unwrap_or(Path::new(""));
            service.containers.push(relative.join(DOCKERFILE));
        }

        for name in names {
            if EXCLUDED.contains(&name.as_str()) {
                continue;
            }
            let child = dir.join(&name);
            let is_dir = fs::symlink_metadata(&child).map(|meta| meta.is_dir()).unwrap_or(false);
            if is_dir {
                self.descend(&child, parent)?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Owner {
    Service(usize),
    /// A duplicate service; its Dockerfiles belong to nobody.
    Shadowed,
}

fn read_descriptor(path: &Path) -> Result<ServiceDescriptor> {
    let content = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("parse {}", path.display()))
}

/// Discovers services and computes their versions concurrently.
pub async fn scan(workstream: &Workstream, roots: &[PathBuf]) -> Result<Vec<Arc<Service>>> {
    let discovered = discover(roots)?;
    let services = gather(concurrent_map(discovered, |found| {
        let workstream = workstream.clone();
        async move {
            let version = service_version(&workstream, &found.root).await?;
            Ok::<_, ForgeError>(Arc::new(Service {
                name: found.name,
                version,
                root: found.root,
                containers: found.containers,
            }))
        }
    }))
    .await?;
    Ok(services)
}

//! # Forge Pipeline
//!
//! Turns discovered services into built images, pushed images, rendered manifests and
//! applied deployments.
//!
//! - **`records`**: services and the per-container records every stage iterates
//! - **`version`**: content-derived image tags
//! - **`manifests`**: the manifest renderer seam and the default template renderer
//! - **`kubectl`**: the cluster tool wrapper
//! - **`stages`**: `bake`, `push`, `yaml`, `build` and `deploy`

pub mod kubectl;
pub mod manifests;
pub mod records;
pub mod stages;
pub mod version;

pub use kubectl::Kubectl;
pub use manifests::{ManifestRenderer, RenderContext, TemplateRenderer};
pub use records::{PipelineRecord, Service, records};
pub use stages::Pipeline;
pub use version::{is_git, service_version, shadir};

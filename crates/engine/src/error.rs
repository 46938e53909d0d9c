//! Error taxonomy for work execution and the pipeline built on it.

use std::fmt;

use forge_types::WorkItem;
use thiserror::Error;

/// Top-level error for every Forge operation.
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("unrecognized registry response ({reason}): {body}")]
    RegistryProtocol { reason: String, body: String },

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("{failed} task(s) had errors")]
    Aggregate { failed: usize },

    #[error("task panicked: {message}")]
    TaskPanicked { message: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ForgeError {
    /// Create a registry protocol error carrying the raw response body.
    pub fn registry_protocol(reason: impl Into<String>, body: impl Into<String>) -> Self {
        Self::RegistryProtocol {
            reason: reason.into(),
            body: body.into(),
        }
    }

    /// Create a filesystem error with a short description of what was being attempted.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether a fan-out boundary captures this error and counts it, instead of
    /// propagating it to the consumer.
    pub fn is_captured(&self) -> bool {
        matches!(self, ForgeError::Config(_) | ForgeError::Task(_))
    }
}

impl From<tokio::task::JoinError> for ForgeError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::TaskPanicked {
            message: error.to_string(),
        }
    }
}

/// Malformed or missing configuration. Raised before any work is issued.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// A single command or request finished with an unexpected exit code or status, or
/// could not be issued at all. Carries a snapshot of the finished work item.
#[derive(Debug, Clone, Error)]
pub struct TaskError {
    pub item: WorkItem,
}

impl TaskError {
    pub fn new(item: WorkItem) -> Self {
        Self { item }
    }

    pub fn output(&self) -> &str {
        &self.item.output
    }

    pub fn code(&self) -> Option<i32> {
        self.item.code
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.item.finish_summary.as_deref().unwrap_or("error");
        write!(f, "{}[{}]: {}", self.item.kind, status, self.item.start_summary)
    }
}

/// Two services claim the same cluster resource name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub resource: String,
    pub first_owner: String,
    pub second_owner: String,
}

impl Conflict {
    pub fn new(resource: impl Into<String>, first_owner: impl Into<String>, second_owner: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            first_owner: first_owner.into(),
            second_owner: second_owner.into(),
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} defined by {} and {}", self.resource, self.first_owner, self.second_owner)
    }
}

/// Every ownership conflict found while rendering manifests.
#[derive(Debug, Clone, Error)]
pub struct ConflictError {
    pub conflicts: Vec<Conflict>,
}

impl fmt::Display for ConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages = self.conflicts.iter().map(Conflict::to_string).collect::<Vec<_>>();
        write!(f, "conflicts: {}", messages.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_types::ItemKind;

    #[test]
    fn only_config_and_task_errors_are_captured() {
        let mut item = WorkItem::new(7, ItemKind::Command, "docker push img", true, false);
        item.finish(false, Some(1), "error(1)");

        assert!(ForgeError::from(TaskError::new(item)).is_captured());
        assert!(ForgeError::from(ConfigError::new("user missing")).is_captured());
        assert!(!ForgeError::registry_protocol("unknown shape", "{}").is_captured());
        assert!(!ForgeError::Aggregate { failed: 2 }.is_captured());
    }

    #[test]
    fn conflict_messages_list_every_conflict() {
        let error = ConflictError {
            conflicts: vec![Conflict::new("web", "a", "b"), Conflict::new("db", "a", "c")],
        };
        assert_eq!(error.to_string(), "conflicts: web defined by a and b, db defined by a and c");
    }

    #[test]
    fn task_error_renders_display_summary() {
        let mut item = WorkItem::new(1, ItemKind::HttpGet, "GET https://r.example/v2/", false, false);
        item.finish(false, Some(500), "error(500)");
        assert_eq!(TaskError::new(item).to_string(), "http-get[error(500)]: GET https://r.example/v2/");
    }

    #[test]
    fn aggregate_reports_only_the_count() {
        assert_eq!(ForgeError::Aggregate { failed: 3 }.to_string(), "3 task(s) had errors");
    }
}

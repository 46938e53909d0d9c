//! Work items and their lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation type of a work item, used as its display label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    /// An external process.
    Command,
    /// An HTTP GET request.
    HttpGet,
}

impl ItemKind {
    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::Command => "command",
            ItemKind::HttpGet => "http-get",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where an item is in its lifecycle. `Running` transitions exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemState {
    Running,
    Succeeded,
    Failed,
}

/// One tracked external command or HTTP call, from issuance to completion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkItem {
    /// Identifier unique within a process run.
    pub id: u64,
    pub kind: ItemKind,
    /// Secret-redacted description shown while running.
    pub start_summary: String,
    /// Short terminal status such as `ok` or `error(1)`; `None` while running.
    pub finish_summary: Option<String>,
    /// Accumulated stdout+stderr or response body.
    pub output: String,
    pub state: ItemState,
    /// Exit code or HTTP status once known.
    pub code: Option<i32>,
    pub visible: bool,
    pub verbose: bool,
    pub started_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(id: u64, kind: ItemKind, start_summary: impl Into<String>, visible: bool, verbose: bool) -> Self {
        Self {
            id,
            kind,
            start_summary: start_summary.into(),
            finish_summary: None,
            output: String::new(),
            state: ItemState::Running,
            code: None,
            visible,
            verbose,
            started_at: Utc::now(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state != ItemState::Running
    }

    pub fn is_ok(&self) -> bool {
        self.state == ItemState::Succeeded
    }

    /// Appends output while the item is running. Output of a finished item is immutable.
    pub fn append(&mut self, chunk: &str) -> bool {
        if self.is_finished() {
            return false;
        }
        self.output.push_str(chunk);
        true
    }

    /// Transitions a running item to its terminal state. Returns `false` when the item
    /// had already finished, in which case nothing changes.
    pub fn finish(&mut self, ok: bool, code: Option<i32>, summary: impl Into<String>) -> bool {
        if self.is_finished() {
            return false;
        }
        self.state = if ok { ItemState::Succeeded } else { ItemState::Failed };
        self.code = code;
        self.finish_summary = Some(summary.into());
        true
    }
}

/// Lifecycle notification published for every work item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkEvent {
    Started { id: u64 },
    Updated { id: u64, chunk: String },
    Finished { id: u64 },
}

impl WorkEvent {
    pub fn id(&self) -> u64 {
        match self {
            WorkEvent::Started { id } | WorkEvent::Updated { id, .. } | WorkEvent::Finished { id } => *id,
        }
    }
}

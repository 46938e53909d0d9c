//! The execution engine.
//!
//! A [`Workstream`] issues external commands and HTTP requests as tracked
//! [`WorkItem`]s. Each call creates its item at issue time, streams output into it,
//! finishes it exactly once, and publishes [`WorkEvent`]s for observers. Calls only
//! suspend while waiting on the process or socket, so any number of tasks may share one
//! `Workstream` (it is a cheap `Clone`).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use forge_types::{Arg, Command, ItemKind, SECRET_MASK, Secret, WorkEvent, WorkItem};
use forge_util::redact_sensitive;
use indexmap::IndexMap;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{ForgeError, TaskError};
use crate::transport::{HttpAuth, HttpRequest, Invocation, SystemTransport, Transport};

/// Capacity of the lifecycle event channel. Slow subscribers lag rather than block.
const EVENT_CAPACITY: usize = 1024;

/// Options for [`Workstream::run`].
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Exit codes that count as success.
    pub expected: Vec<i32>,
    /// Show output even when the command succeeds.
    pub verbose: bool,
    /// Render the item at all.
    pub visible: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            env: Vec::new(),
            expected: vec![0],
            verbose: false,
            visible: true,
        }
    }
}

impl RunOptions {
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Adds exit codes that are treated as success in addition to the defaults.
    pub fn expect_codes(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.expected.extend(codes);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// Result of a command whose exit code was expected.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub code: i32,
    pub output: String,
    pub ok: bool,
}

/// Request credentials; secrets stay wrapped until the request is sent.
#[derive(Clone, Debug)]
pub enum Auth {
    Basic { user: String, password: Secret },
    Bearer(Secret),
}

impl Auth {
    pub fn basic(user: impl Into<String>, password: Secret) -> Self {
        Auth::Basic {
            user: user.into(),
            password,
        }
    }

    fn resolve(&self) -> HttpAuth {
        match self {
            Auth::Basic { user, password } => HttpAuth::Basic {
                user: user.clone(),
                password: password.expose().to_string(),
            },
            Auth::Bearer(token) => HttpAuth::Bearer(token.expose().to_string()),
        }
    }
}

/// Options for [`Workstream::fetch`].
#[derive(Clone, Debug)]
pub struct FetchOptions {
    pub auth: Option<Auth>,
    pub headers: Vec<(String, String)>,
    /// Status codes that count as success.
    pub expected: Vec<u16>,
    pub visible: bool,
    /// Whether the response body is recorded as the item's output.
    pub capture_body: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            auth: None,
            headers: Vec::new(),
            expected: vec![200],
            visible: true,
            capture_body: true,
        }
    }
}

impl FetchOptions {
    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds status codes that are treated as success in addition to the defaults.
    pub fn expect_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.expected.extend(statuses);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Keeps the response body out of the work log and its events. The body is still
    /// returned to the caller.
    pub fn secret_body(mut self) -> Self {
        self.capture_body = false;
        self
    }
}

/// Result of a request whose status was expected.
#[derive(Clone, Debug)]
pub struct FetchOutcome {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
    pub ok: bool,
}

impl FetchOutcome {
    /// Parses the body as JSON.
    pub fn json(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.body)
    }

    /// Returns a header value, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Ordered, append-only collection of work items shared by all clones of a workstream.
#[derive(Clone, Default)]
struct WorkLog {
    items: Arc<Mutex<IndexMap<u64, WorkItem>>>,
    next_id: Arc<AtomicU64>,
}

impl WorkLog {
    fn lock(&self) -> MutexGuard<'_, IndexMap<u64, WorkItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, kind: ItemKind, summary: String, visible: bool, verbose: bool) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.lock().insert(id, WorkItem::new(id, kind, summary, visible, verbose));
        id
    }

    fn append(&self, id: u64, chunk: &str) -> bool {
        self.lock().get_mut(&id).is_some_and(|item| item.append(chunk))
    }

    fn finish(&self, id: u64, ok: bool, code: Option<i32>, summary: String) -> Option<WorkItem> {
        let mut items = self.lock();
        let item = items.get_mut(&id)?;
        item.finish(ok, code, summary);
        Some(item.clone())
    }
}

/// Handle a transport uses to stream output into a running work item.
#[derive(Clone)]
pub struct OutputSink {
    id: u64,
    log: WorkLog,
    events: broadcast::Sender<WorkEvent>,
}

impl OutputSink {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Appends a chunk and notifies observers. Chunks arriving after the item finished
    /// are dropped.
    pub fn write(&self, chunk: &str) {
        if chunk.is_empty() || !self.log.append(self.id, chunk) {
            return;
        }
        let _ = self.events.send(WorkEvent::Updated {
            id: self.id,
            chunk: chunk.to_string(),
        });
    }
}

/// Issues commands and requests as observable work items.
#[derive(Clone)]
pub struct Workstream {
    log: WorkLog,
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<WorkEvent>,
    verbose: bool,
}

impl Workstream {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            log: WorkLog::default(),
            transport,
            events,
            verbose: false,
        }
    }

    /// A workstream that spawns real processes and sends real requests.
    pub fn system() -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(SystemTransport::new()?)))
    }

    /// Marks every command issued from now on as verbose.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Subscribes to lifecycle events of items issued after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkEvent> {
        self.events.subscribe()
    }

    /// Snapshot of every item, oldest first. May be stale by the time it is read.
    pub fn items(&self) -> Vec<WorkItem> {
        self.log.lock().values().cloned().collect()
    }

    pub fn item(&self, id: u64) -> Option<WorkItem> {
        self.log.lock().get(&id).cloned()
    }

    /// Removes every item. Ids keep increasing afterwards.
    pub fn clear(&self) {
        self.log.lock().clear();
    }

    /// Runs a process to completion.
    ///
    /// The item's summary is the display form of `command`; the process receives the
    /// execution form. An exit code outside `options.expected`, or a process that cannot
    /// be started, fails with [`TaskError`].
    pub async fn run(&self, command: &Command, options: RunOptions) -> Result<RunOutcome, ForgeError> {
        let summary = command.resolve_display();
        let verbose = options.verbose || self.verbose;
        let id = self.start(ItemKind::Command, summary, options.visible, verbose);

        let invocation = Invocation {
            argv: command.resolve_exec(),
            cwd: options.cwd.clone(),
            env: options.env.clone(),
        };
        let sink = OutputSink {
            id,
            log: self.log.clone(),
            events: self.events.clone(),
        };

        match self.transport.execute(invocation, sink).await {
            Ok(code) => {
                let ok = options.expected.contains(&code);
                let item = self.finish(id, ok, Some(code), status_summary(ok, code));
                if ok {
                    Ok(RunOutcome {
                        code,
                        output: item.output,
                        ok,
                    })
                } else {
                    debug!(item = id, code, output = %redact_sensitive(&item.output), "command failed");
                    Err(TaskError::new(item).into())
                }
            }
            Err(error) => {
                self.log.append(id, &format!("{error:#}\n"));
                let item = self.finish(id, false, None, "error".to_string());
                debug!(item = id, error = %redact_sensitive(&format!("{error:#}")), "command could not run");
                Err(TaskError::new(item).into())
            }
        }
    }

    /// Sends a GET request.
    ///
    /// The response body becomes the item's output unless `options.capture_body` is off,
    /// in which case the output is the secret mask. A status outside
    /// `options.expected`, or a request that never produced a status, fails with
    /// [`TaskError`].
    pub async fn fetch(&self, url: impl Into<Arg>, options: FetchOptions) -> Result<FetchOutcome, ForgeError> {
        let url = url.into();
        let id = self.start(
            ItemKind::HttpGet,
            format!("GET {}", url.resolve_display()),
            options.visible,
            false,
        );

        let request = HttpRequest {
            url: url.resolve_exec(),
            auth: options.auth.as_ref().map(Auth::resolve),
            headers: options.headers.clone(),
        };

        match self.transport.send(request).await {
            Ok(reply) => {
                let recorded = if options.capture_body { reply.body.clone() } else { format!("{SECRET_MASK}\n") };
                if !reply.body.is_empty() && self.log.append(id, &recorded) {
                    let _ = self.events.send(WorkEvent::Updated { id, chunk: recorded });
                }
                let ok = options.expected.contains(&reply.status);
                let item = self.finish(id, ok, Some(i32::from(reply.status)), status_summary(ok, reply.status));
                if ok {
                    Ok(FetchOutcome {
                        status: reply.status,
                        headers: reply.headers,
                        body: reply.body,
                        ok,
                    })
                } else {
                    debug!(item = id, status = reply.status, "request returned unexpected status");
                    Err(TaskError::new(item).into())
                }
            }
            Err(error) => {
                self.log.append(id, &format!("{error:#}\n"));
                let item = self.finish(id, false, None, "error".to_string());
                debug!(item = id, error = %redact_sensitive(&format!("{error:#}")), "request failed");
                Err(TaskError::new(item).into())
            }
        }
    }

    fn start(&self, kind: ItemKind, summary: String, visible: bool, verbose: bool) -> u64 {
        debug!(kind = %kind, summary = %summary, "issuing work item");
        let id = self.log.push(kind, summary, visible, verbose);
        let _ = self.events.send(WorkEvent::Started { id });
        id
    }

    fn finish(&self, id: u64, ok: bool, code: Option<i32>, summary: String) -> WorkItem {
        let item = match self.log.finish(id, ok, code, summary.clone()) {
            Some(item) => item,
            // The log was cleared while the item ran; report from a detached copy.
            None => {
                let mut item = WorkItem::new(id, ItemKind::Command, String::new(), false, false);
                item.finish(ok, code, summary);
                item
            }
        };
        let _ = self.events.send(WorkEvent::Finished { id });
        item
    }
}

fn status_summary(ok: bool, code: impl std::fmt::Display) -> String {
    if ok { "ok".to_string() } else { format!("error({code})") }
}

//! How work actually leaves the process.
//!
//! [`Transport`] abstracts process spawning and HTTP so the [`Workstream`](crate::Workstream)
//! can own work item bookkeeping while tests swap in a scripted backend. Everything a
//! transport receives is already in execution form; it must not log it.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::workstream::OutputSink;

/// A process to spawn, in execution form.
#[derive(Clone)]
pub struct Invocation {
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

/// Resolved request credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum HttpAuth {
    Basic { user: String, password: String },
    Bearer(String),
}

impl fmt::Debug for HttpAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpAuth::Basic { user, .. } => write!(f, "Basic({user}:{{secret}})"),
            HttpAuth::Bearer(_) => f.write_str("Bearer({secret})"),
        }
    }
}

/// A GET request in execution form.
#[derive(Clone)]
pub struct HttpRequest {
    pub url: String,
    pub auth: Option<HttpAuth>,
    pub headers: Vec<(String, String)>,
}

/// What came back from the server.
#[derive(Clone, Debug, Default)]
pub struct HttpReply {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Adds a header, ignoring names or values that are not valid HTTP.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_bytes()),
            reqwest::header::HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }
}

/// Backend that runs processes and sends requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Spawns the process, streams its combined output into `sink`, and returns its exit
    /// code (`-1` when it was terminated by a signal).
    async fn execute(&self, invocation: Invocation, sink: OutputSink) -> Result<i32>;

    /// Sends a GET request and returns the reply regardless of its status.
    async fn send(&self, request: HttpRequest) -> Result<HttpReply>;
}

/// Transport backed by `tokio::process` and `reqwest`.
pub struct SystemTransport {
    http: Client,
}

impl SystemTransport {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(format!("forge/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for SystemTransport {
    async fn execute(&self, invocation: Invocation, sink: OutputSink) -> Result<i32> {
        let (program, args) = invocation.argv.split_first().ok_or_else(|| anyhow!("empty command line"))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &invocation.env {
            command.env(key, value);
        }

        let mut child = command.spawn().with_context(|| format!("failed to start {program}"))?;
        let stdout = child.stdout.take().map(|pipe| tokio::spawn(forward_output(pipe, sink.clone())));
        let stderr = child.stderr.take().map(|pipe| tokio::spawn(forward_output(pipe, sink.clone())));

        let status = child.wait().await.with_context(|| format!("failed to wait for {program}"))?;
        for reader in [stdout, stderr].into_iter().flatten() {
            // The pipe closes when the child exits; a failed reader only loses output.
            let _ = reader.await;
        }

        Ok(status.code().unwrap_or(-1))
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpReply> {
        let mut builder = self.http.get(&request.url);
        builder = match &request.auth {
            Some(HttpAuth::Basic { user, password }) => builder.basic_auth(user, Some(password)),
            Some(HttpAuth::Bearer(token)) => builder.bearer_auth(token),
            None => builder,
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        // Request URLs can embed credentials, so they never end up in error text.
        let response = builder.send().await.map_err(|error| anyhow!(error.without_url()))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(|error| anyhow!(error.without_url()))?;

        Ok(HttpReply { status, headers, body })
    }
}

async fn forward_output<R>(pipe: R, sink: OutputSink)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => sink.write(&String::from_utf8_lossy(&line)),
            Err(error) => {
                tracing::debug!(item = sink.id(), error = %error, "stopped reading process output");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::Workstream;
    use crate::workstream::RunOptions;
    use forge_types::Command as ForgeCommand;
    use std::sync::Arc;

    #[tokio::test]
    async fn system_transport_captures_combined_output() {
        let transport = Arc::new(SystemTransport::new().expect("transport"));
        let workstream = Workstream::new(transport);
        let dir = tempfile::tempdir().expect("tempdir");

        let command = ForgeCommand::new("sh").arg("-c").arg("pwd; echo oops 1>&2; exit 3");
        let outcome = workstream
            .run(&command, RunOptions::default().cwd(dir.path()).expect_codes([3]))
            .await
            .expect("exit 3 is expected");

        assert_eq!(outcome.code, 3);
        assert!(outcome.output.contains("oops"));
        let canonical = dir.path().canonicalize().expect("canonical tempdir");
        assert!(outcome.output.contains(canonical.to_string_lossy().as_ref()) || outcome.output.contains(dir.path().to_string_lossy().as_ref()));
    }

    #[tokio::test]
    async fn missing_program_is_a_task_error() {
        let transport = Arc::new(SystemTransport::new().expect("transport"));
        let workstream = Workstream::new(transport);

        let error = workstream
            .run(&ForgeCommand::new("forge-test-no-such-program-9c1d"), RunOptions::default())
            .await
            .expect_err("spawn must fail");
        match error {
            crate::ForgeError::Task(task) => {
                assert_eq!(task.item.finish_summary.as_deref(), Some("error"));
                assert!(task.output().contains("failed to start"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

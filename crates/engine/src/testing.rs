//! Scripted transport for tests.
//!
//! Commands are matched by argv prefix and requests by URL prefix. The most recently
//! registered matching rule wins, so a test can override a general answer with a narrower
//! one. Every call is recorded in issue order.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::transport::{HttpAuth, HttpReply, HttpRequest, Invocation, Transport};
use crate::workstream::OutputSink;

/// Exit code reported for a command no rule matches.
pub const UNSCRIPTED_EXIT: i32 = 127;

struct CommandRule {
    prefix: Vec<String>,
    code: i32,
    output: String,
    delay: Option<Duration>,
}

struct RequestRule {
    prefix: String,
    reply: HttpReply,
    once: bool,
    used: bool,
}

/// One call the transport received.
#[derive(Clone, Debug)]
pub enum RecordedCall {
    Command { argv: Vec<String>, cwd: Option<PathBuf> },
    Request { url: String, auth: Option<HttpAuth> },
}

#[derive(Default)]
pub struct ScriptedTransport {
    commands: Mutex<Vec<CommandRule>>,
    requests: Mutex<Vec<RequestRule>>,
    calls: Mutex<Vec<RecordedCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers commands starting with `prefix`.
    pub fn on_command(self, prefix: &[&str], code: i32, output: &str) -> Self {
        self.push_command(prefix, code, output, None)
    }

    /// Answers commands starting with `prefix` after `delay`.
    pub fn on_command_delayed(self, prefix: &[&str], code: i32, output: &str, delay: Duration) -> Self {
        self.push_command(prefix, code, output, Some(delay))
    }

    /// Answers every request whose URL starts with `prefix`.
    pub fn on_request(self, prefix: &str, reply: HttpReply) -> Self {
        self.push_request(prefix, reply, false)
    }

    /// Answers the next request whose URL starts with `prefix`, then falls through to
    /// older rules.
    pub fn on_request_once(self, prefix: &str, reply: HttpReply) -> Self {
        self.push_request(prefix, reply, true)
    }

    fn push_command(self, prefix: &[&str], code: i32, output: &str, delay: Option<Duration>) -> Self {
        lock(&self.commands).push(CommandRule {
            prefix: prefix.iter().map(|part| part.to_string()).collect(),
            code,
            output: output.to_string(),
            delay,
        });
        self
    }

    fn push_request(self, prefix: &str, reply: HttpReply, once: bool) -> Self {
        lock(&self.requests).push(RequestRule {
            prefix: prefix.to_string(),
            reply,
            once,
            used: false,
        });
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Argv of every command, in issue order.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RecordedCall::Command { argv, .. } => Some(argv),
                RecordedCall::Request { .. } => None,
            })
            .collect()
    }

    /// Commands whose argv starts with `prefix`.
    pub fn commands_matching(&self, prefix: &[&str]) -> Vec<Vec<String>> {
        self.commands().into_iter().filter(|argv| starts_with(argv, prefix)).collect()
    }

    /// URL and credentials of every request, in issue order.
    pub fn requests(&self) -> Vec<(String, Option<HttpAuth>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RecordedCall::Request { url, auth } => Some((url, auth)),
                RecordedCall::Command { .. } => None,
            })
            .collect()
    }
}

fn starts_with<S: AsRef<str>>(argv: &[String], prefix: &[S]) -> bool {
    argv.len() >= prefix.len() && argv.iter().zip(prefix).all(|(arg, part)| arg == part.as_ref())
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, invocation: Invocation, sink: OutputSink) -> Result<i32> {
        lock(&self.calls).push(RecordedCall::Command {
            argv: invocation.argv.clone(),
            cwd: invocation.cwd.clone(),
        });

        let answer = lock(&self.commands)
            .iter()
            .rev()
            .find(|rule| starts_with(&invocation.argv, &rule.prefix))
            .map(|rule| (rule.code, rule.output.clone(), rule.delay));

        let Some((code, output, delay)) = answer else {
            sink.write(&format!("no scripted answer for {}\n", invocation.argv.join(" ")));
            return Ok(UNSCRIPTED_EXIT);
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        sink.write(&output);
        Ok(code)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpReply> {
        lock(&self.calls).push(RecordedCall::Request {
            url: request.url.clone(),
            auth: request.auth.clone(),
        });

        let mut rules = lock(&self.requests);
        let rule = rules
            .iter_mut()
            .rev()
            .find(|rule| !(rule.once && rule.used) && request.url.starts_with(&rule.prefix))
            .ok_or_else(|| anyhow!("no scripted reply for {}", request.url))?;
        rule.used = true;
        Ok(rule.reply.clone())
    }
}

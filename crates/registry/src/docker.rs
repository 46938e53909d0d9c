//! Wrapper over the `docker` command line.

use std::path::Path;

use forge_engine::{ForgeError, RunOptions, RunOutcome, Workstream};
use forge_types::{Command, Secret};

/// Issues container tool commands as work items.
#[derive(Clone)]
pub struct Docker {
    workstream: Workstream,
    program: String,
}

impl Docker {
    pub fn new(workstream: Workstream) -> Self {
        Self {
            workstream,
            program: "docker".to_string(),
        }
    }

    /// Uses a different executable, such as `podman`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }

    /// Whether `image` is in the local image store. `images -q` prints nothing when it
    /// is not.
    pub async fn image_exists_local(&self, image: &str) -> Result<bool, ForgeError> {
        let outcome = self
            .workstream
            .run(&self.command().args(["images", "-q", image]), RunOptions::default())
            .await?;
        Ok(!outcome.output.trim().is_empty())
    }

    /// Builds the image in `context` and tags it `image`.
    pub async fn build(&self, context: &Path, image: &str) -> Result<RunOutcome, ForgeError> {
        self.workstream
            .run(&self.command().args(["build", ".", "-t", image]), RunOptions::default().cwd(context))
            .await
    }

    /// Pushes `image`. Callers holding a registry cache must invalidate it first.
    pub async fn push(&self, image: &str) -> Result<RunOutcome, ForgeError> {
        self.workstream
            .run(&self.command().args(["push", image]), RunOptions::default())
            .await
    }

    pub async fn login(&self, registry: &str, user: &str, password: &Secret) -> Result<RunOutcome, ForgeError> {
        let command = self
            .command()
            .args(["login", "-u", user, "-p"])
            .arg(password)
            .arg(registry);
        self.workstream.run(&command, RunOptions::default()).await
    }

    pub async fn pull(&self, image: &str) -> Result<RunOutcome, ForgeError> {
        self.workstream
            .run(&self.command().args(["pull", image]), RunOptions::default())
            .await
    }

    pub async fn tag(&self, source: &str, target: &str) -> Result<RunOutcome, ForgeError> {
        self.workstream
            .run(&self.command().args(["tag", source, target]), RunOptions::default())
            .await
    }
}

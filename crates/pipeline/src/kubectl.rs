use std::path::Path;

use forge_engine::{ForgeError, RunOptions, RunOutcome, Workstream};
use forge_types::Command;

/// Wrapper over the cluster command line tool.
#[derive(Clone)]
pub struct Kubectl {
    workstream: Workstream,
    program: String,
    dry_run_flag: String,
}

impl Kubectl {
    pub fn new(workstream: Workstream) -> Self {
        Self {
            workstream,
            program: "kubectl".to_string(),
            dry_run_flag: "--dry-run".to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Newer clusters want `--dry-run=client`.
    pub fn with_dry_run_flag(mut self, flag: impl Into<String>) -> Self {
        self.dry_run_flag = flag.into();
        self
    }

    /// Names of the resources the manifests in `dir` would create.
    pub async fn resources(&self, dir: &Path) -> Result<Vec<String>, ForgeError> {
        let command = Command::new(&self.program)
            .args(["apply", self.dry_run_flag.as_str(), "-f"])
            .arg(dir)
            .args(["-o", "name"]);
        let outcome = self.workstream.run(&command, RunOptions::default()).await?;
        Ok(outcome.output.split_whitespace().map(str::to_string).collect())
    }

    /// Applies the manifests in `dir`, only simulating it when `dry_run` is set.
    pub async fn apply(&self, dir: &Path, dry_run: bool) -> Result<RunOutcome, ForgeError> {
        let mut command = Command::new(&self.program).args(["apply", "-f"]).arg(dir);
        if dry_run {
            command = command.arg(&self.dry_run_flag);
        }
        self.workstream.run(&command, RunOptions::default().verbose(true)).await
    }
}

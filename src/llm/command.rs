//! Local command provider: runs a CLI model and parses its stdout.
//!
//! The child is spawned with `kill_on_drop(true)`, so a cascade timeout that
//! drops the future also terminates the process.

use super::{parsing, prompt};
use crate::cascade::{ProviderError, ReasoningProvider};
use crate::types::{ReasoningRequest, ReasoningResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Stderr bytes kept in a transport error message.
const STDERR_SNIPPET: usize = 200;

pub struct CommandProvider {
    name: String,
    program: String,
    args: Vec<String>,
    prompt_via_stdin: bool,
    resolved: Option<PathBuf>,
}

impl CommandProvider {
    /// `program args... <prompt>`, or the prompt on stdin when `prompt_via_stdin`.
    pub fn new(name: &str, program: &str, args: Vec<String>, prompt_via_stdin: bool) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
            args,
            prompt_via_stdin,
            resolved: find_program(program),
        }
    }

    async fn run(&self, prompt: String) -> Result<String, ProviderError> {
        let program = self.resolved.as_deref().unwrap_or(Path::new(&self.program));
        let mut cmd = Command::new(program);
        cmd.args(&self.args);
        if self.prompt_via_stdin {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.arg(&prompt).stdin(Stdio::null());
        }

        let mut child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProviderError::Transport(format!("failed to spawn '{}': {e}", self.program))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| ProviderError::Transport(format!("failed to write prompt: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ProviderError::Transport(format!("failed to read output: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let snippet: String = stderr.trim().chars().take(STDERR_SNIPPET).collect();
            return Err(ProviderError::Transport(format!(
                "'{}' exited with {}: {snippet}",
                self.program, output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ReasoningProvider for CommandProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.resolved.is_some()
    }

    async fn invoke(
        &self,
        request: &ReasoningRequest,
        timeout: Duration,
    ) -> Result<ReasoningResult, ProviderError> {
        debug!(provider = %self.name, program = %self.program, timeout_ms = timeout.as_millis() as u64, "Running reasoning command");
        let prompt = prompt::build_decision_prompt(request);
        let stdout = tokio::time::timeout(timeout, self.run(prompt))
            .await
            .map_err(|_| ProviderError::Timeout(timeout))??;
        parsing::parse_recommendation(&stdout, &self.name)
    }
}

/// Resolve `program` the way a shell would: paths as given, bare names on `$PATH`.
fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

//! External-command proof backend.
//!
//! Each session gets its own scratch directory holding `input.json`. The
//! configured program is run with these placeholders substituted in its
//! arguments:
//!
//! | placeholder | value |
//! |---|---|
//! | `{model}` | requested model id |
//! | `{input}` | path of `input.json` |
//! | `{proof}` | path the proof should be written to |
//! | `{dir}`   | the scratch directory |
//!
//! The proof is read from `{proof}` when the program created it, otherwise
//! from the program's stdout.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use crate::backend::{ProofBackend, ProofSession};
use crate::error::ProofError;

const INPUT_FILE: &str = "input.json";
const PROOF_FILE: &str = "proof.bin";
const STDERR_TAIL_BYTES: usize = 512;

/// How to invoke the prover executable.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,
    /// Argument templates.
    pub args: Vec<String>,
    /// Models the executable can prove. Empty means any.
    pub models: Vec<String>,
    /// Parent directory for session scratch dirs (system temp dir when `None`).
    pub scratch_root: Option<PathBuf>,
}

/// Proof backend running an external prover per session.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    spec: CommandSpec,
}

impl CommandBackend {
    /// Create a backend from `spec`.
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    fn serves(&self, model_id: &str) -> bool {
        self.spec.models.is_empty() || self.spec.models.iter().any(|m| m == model_id)
    }
}

#[async_trait]
impl ProofBackend for CommandBackend {
    async fn create_session(
        &self,
        model_id: &str,
        public_inputs: &Value,
    ) -> Result<Box<dyn ProofSession>, ProofError> {
        if !self.serves(model_id) {
            return Err(ProofError::UnknownModel(model_id.to_string()));
        }
        if !is_plain_name(model_id) {
            return Err(ProofError::InvalidInputs(format!(
                "model id {:?} is not a plain name",
                model_id
            )));
        }

        let scratch = match &self.spec.scratch_root {
            Some(root) => {
                tokio::fs::create_dir_all(root).await?;
                tempfile::Builder::new().prefix("zkproof-").tempdir_in(root)?
            }
            None => tempfile::Builder::new().prefix("zkproof-").tempdir()?,
        };

        let input = serde_json::to_vec(public_inputs)
            .map_err(|e| ProofError::InvalidInputs(e.to_string()))?;
        tokio::fs::write(scratch.path().join(INPUT_FILE), input).await?;

        debug!(
            "Created proof session for model {} in {}",
            model_id,
            scratch.path().display()
        );

        Ok(Box::new(CommandSession {
            spec: self.spec.clone(),
            model_id: model_id.to_string(),
            scratch: Some(scratch),
        }))
    }
}

struct CommandSession {
    spec: CommandSpec,
    model_id: String,
    scratch: Option<TempDir>,
}

impl CommandSession {
    fn render_args(&self, dir: &Path) -> Vec<String> {
        let input = dir.join(INPUT_FILE).to_string_lossy().into_owned();
        let proof = dir.join(PROOF_FILE).to_string_lossy().into_owned();
        let dir = dir.to_string_lossy();
        let lookup = |name: &str| match name {
            "model" => Some(self.model_id.as_str()),
            "input" => Some(input.as_str()),
            "proof" => Some(proof.as_str()),
            "dir" => Some(&*dir),
            _ => None,
        };
        self.spec
            .args
            .iter()
            .map(|arg| substitute(arg, lookup))
            .collect()
    }
}

/// Model ids end up in file names and command lines.
fn is_plain_name(model_id: &str) -> bool {
    !model_id.is_empty()
        && model_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        && model_id != "."
        && model_id != ".."
}

/// Replace `{name}` placeholders in one pass; substituted text is never
/// scanned again. Unknown placeholders are kept verbatim.
fn substitute<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}').and_then(|close| lookup(&after[..close]).map(|v| (close, v))) {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[async_trait]
impl ProofSession for CommandSession {
    async fn generate_proof(&mut self) -> Result<Vec<u8>, ProofError> {
        let dir = self
            .scratch
            .as_ref()
            .ok_or(ProofError::Closed)?
            .path()
            .to_path_buf();

        // kill_on_drop: a cancelled deadline must not leave the prover running
        let output = Command::new(&self.spec.program)
            .args(self.render_args(&dir))
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(ProofError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
            let tail = stderr
                .get(start..)
                .unwrap_or(stderr.as_ref())
                .trim()
                .to_string();
            return Err(ProofError::ProverFailed {
                status: output.status.to_string(),
                stderr: tail,
            });
        }

        let proof_path = dir.join(PROOF_FILE);
        let proof = if tokio::fs::try_exists(&proof_path).await? {
            tokio::fs::read(&proof_path).await?
        } else {
            output.stdout
        };

        if proof.is_empty() {
            return Err(ProofError::EmptyProof);
        }

        Ok(proof)
    }

    async fn close(self: Box<Self>) {
        let CommandSession { scratch, .. } = *self;
        if let Some(scratch) = scratch {
            let path = scratch.path().to_path_buf();
            if let Err(e) = scratch.close() {
                tracing::warn!(
                    "Failed to remove proof scratch dir {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }
}

//! Self-update from the upstream git branch.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Self-update failure.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// The checkout cannot be updated at all (not a repository, no upstream,
    /// git missing). Logged on every check until an operator fixes it.
    #[error("Auto-update misconfigured: {0}")]
    Misconfigured(String),

    /// A git command failed, e.g. the remote was unreachable.
    #[error("git {command} failed: {stderr}")]
    Command {
        /// Subcommand that failed.
        command: String,
        /// Trimmed stderr of the command.
        stderr: String,
    },

    /// IO error while running git.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Update mechanism consumed by the maintenance scheduler.
#[async_trait]
pub trait Updater: Send + Sync {
    /// Check for a newer version and apply it.
    ///
    /// Returns `true` when an update was applied and the process should
    /// restart to pick it up.
    async fn check_and_apply(&self) -> Result<bool, UpdateError>;
}

/// Fast-forwards a git checkout to its upstream branch.
#[derive(Debug, Clone)]
pub struct GitUpdater {
    repo_dir: PathBuf,
}

impl GitUpdater {
    /// Updater for the checkout at `repo_dir`.
    pub fn new<P: AsRef<Path>>(repo_dir: P) -> Self {
        Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
        }
    }

    async fn git(&self, args: &[&str]) -> Result<String, UpdateError> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo_dir)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    UpdateError::Misconfigured("git executable not found".to_string())
                }
                _ => UpdateError::Io(e),
            })?;

        if !output.status.success() {
            return Err(UpdateError::Command {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl Updater for GitUpdater {
    async fn check_and_apply(&self) -> Result<bool, UpdateError> {
        if !self.repo_dir.is_dir() {
            return Err(UpdateError::Misconfigured(format!(
                "{} is not a directory",
                self.repo_dir.display()
            )));
        }

        self.git(&["rev-parse", "--is-inside-work-tree"])
            .await
            .map_err(|_| {
                UpdateError::Misconfigured(format!(
                    "{} is not a git checkout",
                    self.repo_dir.display()
                ))
            })?;

        let upstream = self
            .git(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
            .await
            .map_err(|_| {
                UpdateError::Misconfigured("current branch has no upstream".to_string())
            })?;

        self.git(&["fetch", "--quiet"]).await?;

        let local = self.git(&["rev-parse", "HEAD"]).await?;
        let remote = self.git(&["rev-parse", "@{u}"]).await?;

        if local == remote {
            debug!("Checkout is up to date with {} ({})", upstream, local);
            return Ok(false);
        }

        // Local commits ahead of upstream are not an update.
        if self
            .git(&["merge-base", "--is-ancestor", "@{u}", "HEAD"])
            .await
            .is_ok()
        {
            debug!("Checkout is ahead of {}, nothing to apply", upstream);
            return Ok(false);
        }

        self.git(&["merge", "--ff-only", "--quiet", "@{u}"]).await?;
        info!("Updated checkout from {} to {} ({})", local, remote, upstream);

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn git_available() -> bool {
        StdCommand::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = StdCommand::new("git")
            .arg("-C")
            .arg(dir)
            .args(["-c", "user.name=zkminer", "-c", "user.email=zkminer@localhost"])
            .args(args)
            .output()
            .unwrap();
        assert!(
            status.status.success(),
            "git {:?}: {}",
            args,
            String::from_utf8_lossy(&status.stderr)
        );
    }

    #[tokio::test]
    async fn test_missing_directory_is_misconfigured() {
        let updater = GitUpdater::new("/nonexistent/zkminer-checkout");
        assert!(matches!(
            updater.check_and_apply().await,
            Err(UpdateError::Misconfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_plain_directory_is_misconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let updater = GitUpdater::new(dir.path());
        assert!(matches!(
            updater.check_and_apply().await,
            Err(UpdateError::Misconfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_fast_forwards_to_upstream() {
        if !git_available() {
            return;
        }

        let root = tempfile::tempdir().unwrap();
        let upstream = root.path().join("upstream");
        let clone = root.path().join("clone");
        std::fs::create_dir(&upstream).unwrap();

        git(&upstream, &["init", "--quiet"]);
        std::fs::write(upstream.join("VERSION"), "1").unwrap();
        git(&upstream, &["add", "VERSION"]);
        git(&upstream, &["commit", "--quiet", "-m", "v1"]);

        git(
            root.path(),
            &["clone", "--quiet", upstream.to_str().unwrap(), clone.to_str().unwrap()],
        );

        let updater = GitUpdater::new(&clone);
        assert!(!updater.check_and_apply().await.unwrap());

        std::fs::write(upstream.join("VERSION"), "2").unwrap();
        git(&upstream, &["commit", "--quiet", "-am", "v2"]);

        assert!(updater.check_and_apply().await.unwrap());
        assert_eq!(std::fs::read_to_string(clone.join("VERSION")).unwrap(), "2");
        assert!(!updater.check_and_apply().await.unwrap());
    }
}

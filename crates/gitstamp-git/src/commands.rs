//! Git command execution wrappers.
//!
//! Runs the native `git` executable against a working directory resolved
//! by [`crate::locator::GitDirLocator`], draining its output through
//! [`crate::process::ProcessHandler`] so that arbitrarily chatty commands
//! cannot stall on a full pipe. Callers consume stdout incrementally via a
//! per-line handler, or collected as a single string; stderr is surfaced
//! when the command fails.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::process::{ProcessError, ProcessHandler};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when running git commands.
#[derive(Debug, Error)]
pub enum GitError {
    /// The git binary could not be found or spawned.
    #[error("failed to execute git: {0}")]
    Spawn(#[from] std::io::Error),

    /// The git command exited with a non-zero status.
    #[error("git {args} failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        /// The arguments the command was invoked with.
        args: String,
        /// The exit code, or `None` if the process was killed by a signal.
        code: Option<i32>,
        /// The content of stderr.
        stderr: String,
    },

    /// Waiting for the command or draining its output failed.
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// A specialized `Result` type for git operations.
pub type Result<T> = std::result::Result<T, GitError>;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Execute `git` with the given arguments, streaming stdout line by line.
///
/// `working_dir` is the directory the command runs in; for a repository
/// checkout this is the locator result obtained with the native-git
/// strategy. `on_stdout_line` is invoked from a drain thread once per
/// line and must not block.
///
/// # Errors
///
/// Returns [`GitError::Spawn`] if `git` cannot be started,
/// [`GitError::Process`] if the wait times out or a stream fails, and
/// [`GitError::CommandFailed`] (with captured stderr) on a non-zero exit.
pub fn run_git<F>(args: &[&str], working_dir: &Path, timeout: Duration, on_stdout_line: F) -> Result<()>
where
    F: FnMut(&str) + Send + 'static,
{
    debug!(?args, working_dir = %working_dir.display(), "running git");
    let child = Command::new("git")
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let mut handler = ProcessHandler::new(child, on_stdout_line)?;
    let status = handler.wait_for_exit(timeout)?;
    if !status.success() {
        return Err(GitError::CommandFailed {
            args: args.join(" "),
            code: status.code(),
            stderr: handler.stderr()?.trim().to_string(),
        });
    }
    Ok(())
}

/// Execute `git` and return its trimmed stdout as one string.
///
/// Convenience wrapper over [`run_git`] for commands whose output is small
/// (`rev-parse`, `config`, ...).
///
/// # Errors
///
/// Same as [`run_git`].
pub fn git_command(args: &[&str], working_dir: &Path, timeout: Duration) -> Result<String> {
    let stdout = Arc::new(Mutex::new(String::new()));
    let sink = Arc::clone(&stdout);

    run_git(args, working_dir, timeout, move |line| {
        let mut buffer = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        buffer.push_str(line);
        buffer.push('\n');
    })?;

    let collected = stdout.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    Ok(collected.trim().to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[test]
    fn test_git_command_version() {
        // `git --version` should succeed on any system with git installed.
        let output = git_command(&["--version"], Path::new("."), TIMEOUT).unwrap();
        assert!(
            output.starts_with("git version"),
            "unexpected output: {output}"
        );
    }

    #[test]
    fn test_git_command_failure_captures_stderr() {
        let result = git_command(&["not-a-real-subcommand"], Path::new("."), TIMEOUT);
        match result.unwrap_err() {
            GitError::CommandFailed { code, stderr, .. } => {
                assert!(code.is_some());
                assert!(!stderr.is_empty());
            }
            other => panic!("expected CommandFailed, got: {other:?}"),
        }
    }

    #[test]
    fn test_git_command_bad_working_dir() {
        let result = git_command(&["status"], Path::new("/nonexistent/directory/xyz"), TIMEOUT);
        assert!(result.is_err());
    }

    #[test]
    fn test_run_git_streams_lines() {
        let lines_seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&lines_seen);

        run_git(&["--help"], Path::new("."), TIMEOUT, move |_line| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert!(lines_seen.load(Ordering::SeqCst) > 0);
    }
}

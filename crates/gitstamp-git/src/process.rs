//! Child process output handling with bounded waits.
//!
//! A child whose stdout and stderr are both piped can deadlock: if either
//! pipe's OS buffer fills while nobody is reading it, the child blocks in
//! `write` and never exits. [`ProcessHandler`] drains both streams on
//! dedicated threads from the moment it is constructed and joins them only
//! once the child has been observed to exit, at which point both pipes are
//! closed and end-of-stream is guaranteed.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, ExitStatus};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use wait_timeout::ChildExt;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Identifies one of the two output streams of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// Errors that can occur while handling a child process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The process did not exit within the allowed time. The process is
    /// left running; the caller may wait again or drop the handler to
    /// kill it.
    #[error("timed out waiting for the process to exit")]
    Timeout,

    /// A drain worker failed while reading one of the output streams,
    /// e.g. because the stream was not valid UTF-8.
    #[error("failed reading process {stream}: {source}")]
    StreamRead {
        /// Which stream the worker was draining.
        stream: StreamKind,
        /// The underlying read or decode error.
        #[source]
        source: io::Error,
    },

    /// [`ProcessHandler::stderr`] was called before [`ProcessHandler::wait_for_exit`]
    /// returned successfully. This is a caller contract violation, not a
    /// timing race.
    #[error("stderr is only available after the process has finished")]
    NotFinished,

    /// The child was spawned without the given stream piped.
    #[error("process {0} was not piped")]
    NotPiped(StreamKind),

    /// Waiting on the child failed at the OS level.
    #[error("failed waiting for the process: {0}")]
    Wait(#[from] io::Error),
}

/// A specialized `Result` type for process handling.
pub type Result<T> = std::result::Result<T, ProcessError>;

// ---------------------------------------------------------------------------
// ProcessHandler
// ---------------------------------------------------------------------------

/// Drains a spawned child's stdout and stderr and waits for its exit.
///
/// Construction immediately starts one drain thread per stream: stdout is
/// delivered line by line to the caller-supplied handler, stderr is
/// accumulated into a single string that becomes available through
/// [`ProcessHandler::stderr`] after the process has finished.
///
/// Dropping the handler kills the process (if still running) and reclaims
/// both drain threads, on every exit path.
pub struct ProcessHandler {
    child: Child,
    stdout_worker: Option<JoinHandle<io::Result<()>>>,
    stderr_worker: Option<JoinHandle<io::Result<String>>>,
    stderr_output: Option<String>,
}

impl ProcessHandler {
    /// Take ownership of a spawned child and start draining its streams.
    ///
    /// `on_stdout_line` is called from a separate thread once per stdout
    /// line, without the trailing newline. It must not block; a blocked
    /// handler stops the stdout drain and can in turn wedge the child on a
    /// full pipe. Any state it builds up must only be read after
    /// [`ProcessHandler::wait_for_exit`] has returned successfully.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotPiped`] if the child was spawned without
    /// `Stdio::piped()` for either output stream.
    pub fn new<F>(mut child: Child, on_stdout_line: F) -> Result<Self>
    where
        F: FnMut(&str) + Send + 'static,
    {
        let stdout = child
            .stdout
            .take()
            .ok_or(ProcessError::NotPiped(StreamKind::Stdout))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(ProcessError::NotPiped(StreamKind::Stderr))?;

        // One thread per stream. Each runs to end-of-stream independently
        // of the other; neither is allowed to wait on anything but its own
        // pipe, otherwise the child can block writing to the one that is
        // not being read.
        let stdout_worker = thread::spawn(move || drain_lines(stdout, on_stdout_line));
        let stderr_worker = thread::spawn(move || {
            let mut collected = String::new();
            drain_lines(stderr, |line| {
                collected.push_str(line);
                collected.push('\n');
            })?;
            Ok(collected)
        });

        Ok(Self {
            child,
            stdout_worker: Some(stdout_worker),
            stderr_worker: Some(stderr_worker),
            stderr_output: None,
        })
    }

    /// Wait up to `timeout` for the process to exit and return its status.
    ///
    /// On exit, both drain workers are joined before returning. The join is
    /// bounded: once the process has exited its pipes are closed, so the
    /// workers are guaranteed to reach end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Timeout`] if the process is still running
    /// after `timeout`; the wait may be retried with a fresh timeout.
    /// Returns [`ProcessError::StreamRead`] if a drain worker failed, in
    /// which case the exit status is not reported.
    pub fn wait_for_exit(&mut self, timeout: Duration) -> Result<ExitStatus> {
        let Some(status) = self.child.wait_timeout(timeout)? else {
            return Err(ProcessError::Timeout);
        };

        if let Some(worker) = self.stdout_worker.take() {
            join_worker(worker, StreamKind::Stdout)?;
        }
        if let Some(worker) = self.stderr_worker.take() {
            self.stderr_output = Some(join_worker(worker, StreamKind::Stderr)?);
        }

        debug!(exit_code = ?status.code(), "process finished");
        Ok(status)
    }

    /// The accumulated stderr output, every line followed by `\n`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotFinished`] if called before
    /// [`ProcessHandler::wait_for_exit`] has returned successfully.
    pub fn stderr(&self) -> Result<&str> {
        self.stderr_output.as_deref().ok_or(ProcessError::NotFinished)
    }

    /// Kill the process if it is still running and reclaim both drain
    /// threads. Safe to call from any state, any number of times; also
    /// invoked on drop.
    pub fn dispose(&mut self) {
        // Both calls are no-ops once the child has been reaped.
        let _ = self.child.kill();
        let _ = self.child.wait();

        // The kill closed the pipes, so the workers are at end-of-stream;
        // joining here cannot hang.
        if let Some(worker) = self.stdout_worker.take() {
            let _ = worker.join();
        }
        if let Some(worker) = self.stderr_worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for ProcessHandler {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ---------------------------------------------------------------------------
// Drain workers
// ---------------------------------------------------------------------------

/// Read `stream` line by line (UTF-8) until end-of-stream, feeding each
/// line without its terminator to `on_line`.
fn drain_lines<R, F>(stream: R, mut on_line: F) -> io::Result<()>
where
    R: Read,
    F: FnMut(&str),
{
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        on_line(&line?);
    }
    Ok(())
}

fn join_worker<T>(worker: JoinHandle<io::Result<T>>, stream: StreamKind) -> Result<T> {
    match worker.join() {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(ProcessError::StreamRead { stream, source }),
        Err(_) => Err(ProcessError::StreamRead {
            stream,
            source: io::Error::other("drain worker panicked"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::process::{Command, Stdio};
    use std::sync::{Arc, Mutex};

    const STDOUT_LINE: &str = "some text written to the stdout stream; line ";
    const STDERR_LINE: &str = "some text written to the stderr stream; line ";

    /// Spawn a shell that writes `repeat` numbered lines to each stream,
    /// optionally sleeps, and exits with `exit_code`.
    fn spawn_emitter(exit_code: i32, repeat: usize, sleep_secs: u64) -> Child {
        let script = format!(
            "i=1; while [ $i -le {repeat} ]; do \
               echo '{STDOUT_LINE}'$i; echo '{STDERR_LINE}'$i 1>&2; i=$((i+1)); \
             done; \
             if [ {sleep_secs} -gt 0 ]; then sleep {sleep_secs} >/dev/null 2>&1; fi; \
             exit {exit_code}"
        );
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("failed to spawn test process")
    }

    fn collecting_handler() -> (Arc<Mutex<Vec<String>>>, impl FnMut(&str) + Send + 'static) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let handler = move |line: &str| {
            sink.lock().unwrap().push(line.to_string());
        };
        (lines, handler)
    }

    #[test]
    fn test_exit_success() {
        let child = spawn_emitter(0, 2, 0);
        let (lines, on_line) = collecting_handler();
        let mut handler = ProcessHandler::new(child, on_line).unwrap();

        let status = handler.wait_for_exit(Duration::from_secs(5)).unwrap();
        let stderr = handler.stderr().unwrap();

        assert_eq!(status.code(), Some(0), "process failed:\n{stderr}");
        assert_eq!(
            *lines.lock().unwrap(),
            vec![format!("{STDOUT_LINE}1"), format!("{STDOUT_LINE}2")]
        );
        assert_eq!(stderr, format!("{STDERR_LINE}1\n{STDERR_LINE}2\n"));
    }

    #[test]
    fn test_exit_error() {
        let child = spawn_emitter(1, 2, 0);
        let (lines, on_line) = collecting_handler();
        let mut handler = ProcessHandler::new(child, on_line).unwrap();

        // A non-zero exit is reported through the status, not as an error.
        let status = handler.wait_for_exit(Duration::from_secs(5)).unwrap();

        assert_eq!(status.code(), Some(1));
        assert_eq!(lines.lock().unwrap().len(), 2);
        assert_eq!(
            handler.stderr().unwrap(),
            format!("{STDERR_LINE}1\n{STDERR_LINE}2\n")
        );
    }

    #[test]
    fn test_no_output() {
        let child = spawn_emitter(0, 0, 0);
        let (lines, on_line) = collecting_handler();
        let mut handler = ProcessHandler::new(child, on_line).unwrap();

        let status = handler.wait_for_exit(Duration::from_secs(5)).unwrap();

        assert_eq!(status.code(), Some(0));
        assert!(lines.lock().unwrap().is_empty());
        assert_eq!(handler.stderr().unwrap(), "");
    }

    #[test]
    fn test_timeout() {
        let child = spawn_emitter(0, 2, 30);
        let mut handler = ProcessHandler::new(child, |_line| {}).unwrap();

        let result = handler.wait_for_exit(Duration::from_millis(50));
        assert!(matches!(result, Err(ProcessError::Timeout)));

        // stderr must not be readable after a timed-out wait.
        assert!(matches!(handler.stderr(), Err(ProcessError::NotFinished)));
        // Dropping the handler kills the sleeping child.
    }

    #[test]
    fn test_stderr_before_wait_is_rejected() {
        let child = spawn_emitter(0, 1, 0);
        let handler = ProcessHandler::new(child, |_line| {}).unwrap();

        assert!(matches!(handler.stderr(), Err(ProcessError::NotFinished)));
    }

    /// A child writing thousands of lines to both streams must complete:
    /// if the handler did not drain both pipes concurrently while waiting,
    /// the child would block on a full pipe buffer and the wait would time
    /// out.
    #[test]
    fn test_large_output_does_not_deadlock() {
        let repeat = 2_000;
        let child = spawn_emitter(0, repeat, 0);
        let last_line = Arc::new(Mutex::new(None::<String>));
        let sink = Arc::clone(&last_line);
        let mut handler = ProcessHandler::new(child, move |line| {
            *sink.lock().unwrap() = Some(line.to_string());
        })
        .unwrap();

        let status = handler.wait_for_exit(Duration::from_secs(30)).unwrap();
        let stderr = handler.stderr().unwrap();

        assert_eq!(status.code(), Some(0), "process failed:\n{stderr}");
        assert_eq!(
            last_line.lock().unwrap().as_deref(),
            Some(format!("{STDOUT_LINE}{repeat}").as_str())
        );
        assert!(stderr.starts_with(&format!("{STDERR_LINE}1\n")));
        assert!(stderr.ends_with(&format!("{STDERR_LINE}{repeat}\n")));
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let child = spawn_emitter(0, 1, 30);
        let mut handler = ProcessHandler::new(child, |_line| {}).unwrap();

        // Disposing twice (plus once more on drop) must not panic or hang.
        handler.dispose();
        handler.dispose();
    }

    /// Repeated construct/dispose cycles must not accumulate processes or
    /// drain threads. The loop finishing quickly (each child sleeps for 30
    /// seconds unless killed) is the leak check.
    #[test]
    fn test_repeated_cycles_do_not_leak() {
        for _ in 0..50 {
            let child = spawn_emitter(0, 5, 30);
            let mut handler = ProcessHandler::new(child, |_line| {}).unwrap();
            handler.dispose();
        }

        #[cfg(target_os = "linux")]
        {
            let open_fds = std::fs::read_dir("/proc/self/fd").unwrap().count();
            // Three fds per child (stdin/stdout/stderr pipes) would show up
            // as ~150 extra entries if disposal leaked them.
            assert!(open_fds < 100, "file descriptors leaked: {open_fds} open");
        }
    }
}

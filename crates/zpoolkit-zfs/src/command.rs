//! Runs the `zpool` binary and hands back its report as tokenized lines.

use log::{debug, warn};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use zpoolkit_core::error::{ZpoolError, ZpoolResult};
use zpoolkit_core::logging::ZPOOL_TARGET;

/// How long to wait for the pipes to close once the child has exited.
const PIPE_GRACE: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Split command output into whitespace-separated tokens per line. A blank
/// line becomes an empty vector, never a missing one.
pub(crate) fn tokenize(output: &str) -> Vec<Vec<String>> {
    output
        .lines()
        .map(|line| line.split_whitespace().map(str::to_string).collect())
        .collect()
}

#[derive(Debug, Clone)]
/// A `zpool` binary plus the deadline applied to each invocation.
pub struct CommandRunner {
    path: PathBuf,
    timeout: Duration,
}

#[derive(Debug)]
/// What one finished invocation printed, and how it exited.
pub struct Output {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl Output {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Report lines, tokenized on whitespace.
    pub fn lines(&self) -> Vec<Vec<String>> {
        tokenize(&self.stdout)
    }

    /// Trimmed stderr, or stdout when stderr is empty.
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

type Chunk = (Stream, std::io::Result<Vec<u8>>);

impl CommandRunner {
    pub fn new(path: PathBuf, timeout: Duration) -> Self {
        Self { path, timeout }
    }

    pub fn binary(&self) -> &Path {
        &self.path
    }

    /// Invoke `zpool` with `args`. A non-zero exit is returned as data; only
    /// spawn failures, timeouts and unreadable pipes are errors here.
    ///
    /// On timeout the child is killed and reaped but its pipe readers are
    /// left detached: a grandchild holding the pipe open would otherwise
    /// block the caller. They exit once the last writer closes.
    pub fn run(&self, args: &[&str]) -> ZpoolResult<Output> {
        let started = Instant::now();
        let mut child = Command::new(&self.path)
            .args(args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (tx, rx) = mpsc::channel();
        drain(child.stdout.take(), Stream::Stdout, tx.clone());
        drain(child.stderr.take(), Stream::Stderr, tx);

        let Some(status) = self.wait_until_deadline(&mut child, started)? else {
            let _ = child.kill();
            let _ = child.wait();
            warn!(
                target: ZPOOL_TARGET,
                "zpool {} killed after {:?}",
                args.join(" "),
                self.timeout
            );
            return Err(ZpoolError::Command(format!(
                "{} {} timed out after {:?}",
                self.path.display(),
                args.join(" "),
                self.timeout
            )));
        };

        let (stdout, stderr) = collect(&rx).map_err(|err| {
            ZpoolError::Command(format!(
                "{} {}: {}",
                self.path.display(),
                args.join(" "),
                err
            ))
        })?;
        let output = Output {
            stdout,
            stderr,
            status: status.code().unwrap_or(-1),
        };
        debug!(
            target: ZPOOL_TARGET,
            "zpool {} -> exit {} in {}ms ({} stdout lines)",
            args.join(" "),
            output.status,
            started.elapsed().as_millis(),
            output.stdout.lines().count()
        );
        Ok(output)
    }

    fn wait_until_deadline(
        &self,
        child: &mut Child,
        started: Instant,
    ) -> ZpoolResult<Option<ExitStatus>> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if started.elapsed() >= self.timeout {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Read a pipe to the end on its own thread and post the bytes to `tx`.
fn drain<R>(pipe: Option<R>, stream: Stream, tx: Sender<Chunk>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        let result = match pipe {
            Some(mut reader) => reader.read_to_end(&mut buf).map(|_| buf),
            None => Ok(buf),
        };
        // The receiver is gone after a timeout.
        let _ = tx.send((stream, result));
    });
}

/// Wait for both pipes, allowing `PIPE_GRACE` after the child exited.
fn collect(rx: &Receiver<Chunk>) -> Result<(String, String), String> {
    let deadline = Instant::now() + PIPE_GRACE;
    let (mut stdout, mut stderr) = (None, None);
    while stdout.is_none() || stderr.is_none() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let (stream, result) = rx
            .recv_timeout(remaining)
            .map_err(|_| "output pipe still held open after exit".to_string())?;
        let text = result
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(|err| format!("failed to read output: {}", err))?;
        match stream {
            Stream::Stdout => stdout = Some(text),
            Stream::Stderr => stderr = Some(text),
        }
    }
    Ok((stdout.unwrap_or_default(), stderr.unwrap_or_default()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(timeout: Duration) -> CommandRunner {
        CommandRunner::new(PathBuf::from("/bin/sh"), timeout)
    }

    #[test]
    fn tokenize_keeps_blank_lines() {
        let parsed = tokenize("pool: tank\n\n  id:  42\n");
        assert_eq!(parsed.len(), 3);
        assert!(parsed[1].is_empty());
        assert_eq!(parsed[2], vec!["id:", "42"]);
    }

    #[test]
    fn captures_lines_and_status() {
        let out = sh(Duration::from_secs(5))
            .run(&["-c", "echo '  pool: tank'; echo; echo oops >&2; exit 3"])
            .unwrap();
        assert_eq!(out.lines(), vec![vec!["pool:", "tank"], vec![]]);
        assert_eq!(out.diagnostic(), "oops");
        assert_eq!(out.status, 3);
        assert!(!out.success());
    }

    #[test]
    fn kills_on_timeout() {
        let err = sh(Duration::from_millis(100))
            .run(&["-c", "sleep 5"])
            .unwrap_err();
        assert!(err.to_string().contains("timed out"), "{}", err);
    }

    #[test]
    fn timeout_returns_while_grandchild_holds_pipe() {
        let started = Instant::now();
        let err = sh(Duration::from_millis(100))
            .run(&["-c", "sleep 5 & wait"])
            .unwrap_err();
        assert!(err.to_string().contains("timed out"), "{}", err);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn exit_with_pipe_held_open_is_reported() {
        let started = Instant::now();
        let err = sh(Duration::from_secs(10))
            .run(&["-c", "sleep 6 & exit 0"])
            .unwrap_err();
        assert!(err.to_string().contains("still held open"), "{}", err);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn missing_binary_is_io_error() {
        let runner = CommandRunner::new(
            PathBuf::from("/nonexistent/zpool"),
            Duration::from_secs(1),
        );
        assert!(matches!(runner.run(&["list"]), Err(ZpoolError::Io(_))));
    }
}

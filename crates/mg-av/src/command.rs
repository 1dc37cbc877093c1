//! Builder for executing external tools with a hard stdout ceiling.
//!
//! [`BoundedCommand`] is the only way the gateway shells out. Stdout is
//! buffered in memory up to `ceiling` bytes; one byte more and the child is
//! killed, reaped, and the run fails with [`mg_core::Error::Overflow`].
//! Optional stdin data is streamed from a separate task in small chunks so a
//! slow consumer never blocks the caller.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::time::Instant;

use crate::settle::{RunEvent, Settlement};

/// Size of each stdout read and each stdin write.
const CHUNK_SIZE: usize = 64 * 1024;

/// How much trailing stderr is kept for operator logs.
const STDERR_TAIL_BYTES: usize = 4 * 1024;

/// A builder for constructing and executing a bounded tool invocation.
///
/// # Example
///
/// ```no_run
/// use mg_av::BoundedCommand;
///
/// # async fn example() -> mg_core::Result<()> {
/// let jpeg = BoundedCommand::new("ffmpeg", 10 * 1024 * 1024)
///     .args(["-ss", "1.000", "-i", "https://cdn.example/clip.mp4"])
///     .args(["-frames:v", "1", "-f", "image2", "-c:v", "mjpeg", "pipe:1"])
///     .execute()
///     .await?;
/// println!("{} bytes", jpeg.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BoundedCommand {
    program: PathBuf,
    args: Vec<String>,
    ceiling: u64,
    timeout: Option<Duration>,
    stdin_data: Option<Bytes>,
}

/// How the stdout pump ended.
enum Pumped {
    Eof(BytesMut),
    Overflow,
    ReadError(std::io::Error),
    TimedOut(Duration),
}

impl BoundedCommand {
    /// Create a new command whose stdout may not exceed `ceiling` bytes.
    pub fn new(program: impl Into<PathBuf>, ceiling: u64) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            ceiling,
            timeout: None,
            stdin_data: None,
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, s: impl Into<String>) -> Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the wall-clock budget for the whole run, from spawn until the
    /// child is reaped and stderr drained. `None` disables it.
    pub fn timeout(mut self, d: Option<Duration>) -> Self {
        self.timeout = d;
        self
    }

    /// Provide data to be streamed into the process's stdin.
    pub fn stdin(mut self, data: Bytes) -> Self {
        self.stdin_data = Some(data);
        self
    }

    /// The configured stdout ceiling.
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// The argument vector, without the program.
    pub fn argv(&self) -> &[String] {
        &self.args
    }

    /// Short program name used in errors and logs.
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Reconstructed command line, for diagnostics only.
    pub fn command_line(&self) -> String {
        let mut line = self.program.to_string_lossy().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push('\'');
                line.push_str(arg);
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        line
    }

    /// Execute the command and return everything it wrote to stdout.
    ///
    /// # Errors
    ///
    /// - [`mg_core::Error::Overflow`] if stdout exceeds the ceiling; the
    ///   child has been killed and reaped by the time this returns.
    /// - [`mg_core::Error::Tool`] if spawning fails, reading fails, or the
    ///   process exits unsuccessfully.
    /// - [`mg_core::Error::Timeout`] if the configured timeout elapses.
    pub async fn execute(&self) -> mg_core::Result<Bytes> {
        let tool = self.tool_name();
        let mut settlement = Settlement::new(tool.clone(), self.command_line(), self.ceiling);

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(if self.stdin_data.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(tool = %tool, ceiling = self.ceiling, "Spawning bounded command");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                settlement.fire(RunEvent::Error(e));
                return settlement.finish();
            }
        };

        let stdin_task = match (self.stdin_data.clone(), child.stdin.take()) {
            (Some(data), Some(pipe)) => Some(tokio::spawn(feed_stdin(pipe, data))),
            _ => None,
        };
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(read_tail(pipe, STDERR_TAIL_BYTES)));

        let deadline = self.timeout.map(|limit| (Instant::now() + limit, limit));

        let pumped = match child.stdout.take() {
            Some(mut stdout) => {
                let pump = pump_stdout(&mut stdout, self.ceiling);
                let pumped = match deadline {
                    Some((at, limit)) => tokio::time::timeout_at(at, pump)
                        .await
                        .unwrap_or(Pumped::TimedOut(limit)),
                    None => pump.await,
                };
                // stdout is dropped here, closing our end of the pipe.
                pumped
            }
            None => Pumped::ReadError(std::io::Error::other("stdout was not captured")),
        };

        match pumped {
            Pumped::Eof(buf) => settlement.collect(buf),
            Pumped::Overflow => {
                settlement.fire(RunEvent::Overflow);
            }
            Pumped::ReadError(e) => {
                settlement.fire(RunEvent::Error(e));
            }
            Pumped::TimedOut(limit) => {
                settlement.fire(RunEvent::TimedOut(limit));
            }
        }

        // A child may close stdout and keep running; the deadline covers its exit too.
        let mut exited = None;
        if !settlement.is_settled() {
            exited = match deadline {
                Some((at, limit)) => match tokio::time::timeout_at(at, child.wait()).await {
                    Ok(result) => Some(result),
                    Err(_) => {
                        settlement.fire(RunEvent::TimedOut(limit));
                        None
                    }
                },
                None => Some(child.wait().await),
            };
        }

        let exited = match exited {
            Some(result) => result,
            None => {
                if let Some(task) = &stderr_task {
                    task.abort();
                }
                if let Err(e) = child.start_kill() {
                    tracing::debug!(tool = %tool, "kill after failure: {e}");
                }
                child.wait().await
            }
        };
        match exited {
            Ok(status) => settlement.fire(RunEvent::Close(status)),
            Err(e) => settlement.fire(RunEvent::Error(e)),
        };

        if let Some(task) = stdin_task {
            task.abort();
        }
        if let Some(mut task) = stderr_task {
            // Grandchildren can hold stderr open after the child is gone.
            let joined = match deadline {
                Some((at, _)) => match tokio::time::timeout_at(at, &mut task).await {
                    Ok(joined) => Some(joined),
                    Err(_) => {
                        task.abort();
                        None
                    }
                },
                None => Some(task.await),
            };
            if let Some(Ok(tail)) = joined {
                settlement.stderr_tail(tail);
            }
        }

        settlement.finish()
    }
}

/// Read stdout until EOF, stopping as soon as the ceiling would be exceeded.
async fn pump_stdout(stdout: &mut ChildStdout, ceiling: u64) -> Pumped {
    let initial = usize::try_from(ceiling).unwrap_or(usize::MAX).min(CHUNK_SIZE);
    let mut buf = BytesMut::with_capacity(initial);
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        match stdout.read(&mut chunk).await {
            Ok(0) => return Pumped::Eof(buf),
            Ok(n) => {
                if buf.len() as u64 + n as u64 > ceiling {
                    return Pumped::Overflow;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Pumped::ReadError(e),
        }
    }
}

/// Stream `data` into the child in chunks, then close the pipe.
async fn feed_stdin(mut pipe: ChildStdin, data: Bytes) {
    for chunk in data.chunks(CHUNK_SIZE) {
        if let Err(e) = pipe.write_all(chunk).await {
            // The tool may legitimately stop reading early.
            tracing::debug!("stdin closed early: {e}");
            return;
        }
    }
    if let Err(e) = pipe.shutdown().await {
        tracing::debug!("stdin shutdown: {e}");
    }
}

/// Drain stderr, keeping only its last `keep` bytes.
async fn read_tail(mut pipe: ChildStderr, keep: usize) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > keep {
                    let cut = tail.len() - keep;
                    tail.drain(..cut);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use mg_core::Error;

    #[test]
    fn command_line_quotes_whitespace() {
        let cmd = BoundedCommand::new("/usr/bin/ffmpeg", 10)
            .args(["-i", "my clip.mp4", ""]);
        assert_eq!(cmd.command_line(), "/usr/bin/ffmpeg -i 'my clip.mp4' ''");
        assert_eq!(cmd.tool_name(), "ffmpeg");
    }

    #[tokio::test]
    async fn output_under_ceiling_is_returned_whole() {
        let out = BoundedCommand::new("sh", 1024 * 1024)
            .args(["-c", "head -c 200000 /dev/zero"])
            .execute()
            .await
            .unwrap();
        assert_eq!(out.len(), 200_000);
    }

    #[tokio::test]
    async fn output_exactly_at_ceiling_succeeds() {
        let out = BoundedCommand::new("sh", 4096)
            .args(["-c", "head -c 4096 /dev/zero"])
            .execute()
            .await
            .unwrap();
        assert_eq!(out.len(), 4096);
    }

    #[tokio::test]
    async fn overflow_kills_child() {
        let err = BoundedCommand::new("yes", 1024).execute().await.unwrap_err();
        match err {
            Error::Overflow(failure) => {
                assert!(failure.killed_by_ceiling);
                assert_eq!(failure.tool, "yes");
                // SIGKILL from start_kill.
                assert_eq!(failure.signal, Some(9));
                assert_eq!(failure.exit_code, None);
            }
            other => panic!("expected overflow, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stdin_is_streamed_through() {
        let payload: Bytes = (0..300_000u32).map(|i| (i % 251) as u8).collect::<Vec<_>>().into();
        let out = BoundedCommand::new("cat", 1024 * 1024)
            .stdin(payload.clone())
            .execute()
            .await
            .unwrap();
        assert_eq!(out, payload);
    }

    #[tokio::test]
    async fn stdin_overflow_still_fails_cleanly() {
        let payload = Bytes::from(vec![b'x'; 500_000]);
        let err = BoundedCommand::new("cat", 1000)
            .stdin(payload)
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Overflow(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn non_zero_exit_reports_code() {
        let err = BoundedCommand::new("sh", 1024)
            .args(["-c", "echo oops >&2; exit 3"])
            .execute()
            .await
            .unwrap_err();
        match err {
            Error::Tool(failure) => {
                assert_eq!(failure.exit_code, Some(3));
                assert!(!failure.killed_by_ceiling);
                assert!(failure.command_line.contains("exit 3"));
            }
            other => panic!("expected tool error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_tool_error() {
        let err = BoundedCommand::new("nonexistent_tool_xyz_12345", 1024)
            .execute()
            .await
            .unwrap_err();
        match err {
            Error::Tool(failure) => {
                assert!(failure.message.contains("failed to run"));
                assert_eq!(failure.exit_code, None);
            }
            other => panic!("expected tool error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_fires() {
        let err = BoundedCommand::new("sleep", 1024)
            .arg("10")
            .timeout(Some(Duration::from_millis(100)))
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn timeout_covers_child_that_closed_stdout() {
        let started = std::time::Instant::now();
        let err = BoundedCommand::new("sh", 1024)
            .args(["-c", "exec 1>&-; sleep 3"])
            .timeout(Some(Duration::from_millis(200)))
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn lingering_stderr_holder_does_not_outlive_timeout() {
        let started = std::time::Instant::now();
        let out = BoundedCommand::new("sh", 1024)
            .args(["-c", "sleep 3 >/dev/null & printf done"])
            .timeout(Some(Duration::from_millis(500)))
            .execute()
            .await
            .unwrap();
        assert_eq!(&out[..], b"done");
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    }
}

//! Exactly-once settlement of a bounded tool run.
//!
//! A single failure can surface more than once: an overflow is followed by
//! the exit of the killed child, a read error by a non-zero exit. Every
//! event is fed into a [`Settlement`]; only the first terminal event decides
//! the outcome. Later exit statuses are still recorded so the failure
//! carries the exit code or signal.

use std::process::ExitStatus;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use mg_core::{Error, ToolFailure};

/// Something that happened to a running child.
#[derive(Debug)]
pub(crate) enum RunEvent {
    /// Spawning, reading, or waiting failed.
    Error(std::io::Error),
    /// Stdout went past the ceiling.
    Overflow,
    /// The wall-clock budget elapsed.
    TimedOut(Duration),
    /// The child exited.
    Close(ExitStatus),
}

#[derive(Debug)]
enum State {
    Pending,
    Succeeded,
    Failed(Cause),
}

#[derive(Debug)]
enum Cause {
    Io(std::io::Error),
    Overflow,
    TimedOut(Duration),
    Exited(ExitStatus),
}

#[derive(Debug)]
pub(crate) struct Settlement {
    tool: String,
    command_line: String,
    ceiling: u64,
    state: State,
    exit: Option<ExitStatus>,
    stdout: BytesMut,
    stderr_tail: String,
}

impl Settlement {
    pub(crate) fn new(tool: String, command_line: String, ceiling: u64) -> Self {
        Self {
            tool,
            command_line,
            ceiling,
            state: State::Pending,
            exit: None,
            stdout: BytesMut::new(),
            stderr_tail: String::new(),
        }
    }

    /// Feed an event. Returns `true` if this event settled the run.
    pub(crate) fn fire(&mut self, event: RunEvent) -> bool {
        if let RunEvent::Close(status) = &event {
            self.exit.get_or_insert(*status);
        }

        if !matches!(self.state, State::Pending) {
            tracing::trace!(tool = %self.tool, ?event, "Ignoring event after settlement");
            return false;
        }

        self.state = match event {
            RunEvent::Close(status) if status.success() => State::Succeeded,
            RunEvent::Close(status) => State::Failed(Cause::Exited(status)),
            RunEvent::Error(e) => State::Failed(Cause::Io(e)),
            RunEvent::Overflow => State::Failed(Cause::Overflow),
            RunEvent::TimedOut(d) => State::Failed(Cause::TimedOut(d)),
        };
        true
    }

    /// Keep the stdout gathered before the child exited.
    pub(crate) fn collect(&mut self, stdout: BytesMut) {
        self.stdout = stdout;
    }

    pub(crate) fn stderr_tail(&mut self, tail: String) {
        self.stderr_tail = tail;
    }

    pub(crate) fn is_settled(&self) -> bool {
        !matches!(self.state, State::Pending)
    }

    /// Turn the settled state into the caller-facing result.
    pub(crate) fn finish(self) -> mg_core::Result<Bytes> {
        let cause = match self.state {
            State::Succeeded => {
                tracing::debug!(tool = %self.tool, bytes = self.stdout.len(), "Tool completed");
                return Ok(self.stdout.freeze());
            }
            State::Pending => {
                return Err(Error::Internal(format!(
                    "{} finished without settling",
                    self.tool
                )));
            }
            State::Failed(cause) => cause,
        };

        let (exit_code, signal) = exit_parts(self.exit);
        let mut failure = ToolFailure::new(self.tool.clone(), String::new())
            .with_command_line(self.command_line.clone());
        failure.exit_code = exit_code;
        failure.signal = signal;

        tracing::warn!(
            tool = %self.tool,
            command = %self.command_line,
            exit_code = ?exit_code,
            signal = ?signal,
            stderr = %self.stderr_tail.trim(),
            "Tool run failed: {cause:?}"
        );

        Err(match cause {
            Cause::Overflow => {
                failure.message = format!("stdout exceeded {} bytes", self.ceiling);
                failure.killed_by_ceiling = true;
                Error::Overflow(failure)
            }
            Cause::Io(e) => {
                failure.message = format!("failed to run: {e}");
                Error::Tool(failure)
            }
            Cause::Exited(status) => {
                failure.message = format!("exited with {status}");
                Error::Tool(failure)
            }
            Cause::TimedOut(after) => Error::Timeout {
                operation: self.tool,
                after,
            },
        })
    }
}

#[cfg(unix)]
fn exit_parts(status: Option<ExitStatus>) -> (Option<i32>, Option<i32>) {
    use std::os::unix::process::ExitStatusExt;
    match status {
        Some(s) => (s.code(), s.signal()),
        None => (None, None),
    }
}

#[cfg(not(unix))]
fn exit_parts(status: Option<ExitStatus>) -> (Option<i32>, Option<i32>) {
    (status.and_then(|s| s.code()), None)
}

//! Running tool invocations as subprocesses.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ExitStatus, InvocationOutcome, ToolInvocation};
use crate::cancellation::CancellationToken;
use crate::errors::InvokeError;
use crate::events::{EventSink, NoOpEventSink, TOOL_EXITED, TOOL_OUTPUT};

/// Runs a tool invocation to completion.
///
/// A returned outcome only says how the process ended; whether the stage
/// produced its outputs is decided by checkpoint validation afterwards.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Runs the invocation and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be launched or supervised, or
    /// if the run is cancelled while it is running.
    async fn invoke(&self, invocation: &ToolInvocation) -> Result<InvocationOutcome, InvokeError>;
}

/// Invoker backed by real subprocesses.
pub struct SubprocessInvoker {
    sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for SubprocessInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubprocessInvoker")
            .field("timeout", &self.timeout)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Default for SubprocessInvoker {
    fn default() -> Self {
        Self::new(Arc::new(NoOpEventSink), Arc::new(CancellationToken::new()))
    }
}

impl SubprocessInvoker {
    /// Creates an invoker streaming output to `sink` and honouring `cancel`.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>, cancel: Arc<CancellationToken>) -> Self {
        Self {
            sink,
            cancel,
            timeout: None,
        }
    }

    /// Kills processes running longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

enum Interrupt {
    TimedOut,
    Cancelled,
}

#[async_trait]
impl ToolInvoker for SubprocessInvoker {
    async fn invoke(&self, invocation: &ToolInvocation) -> Result<InvocationOutcome, InvokeError> {
        let command_line = invocation.to_string();
        if let Some(reason) = self.cancel.reason() {
            return Err(InvokeError::Cancelled {
                command: command_line,
                reason,
            });
        }

        let mut command = Command::new(invocation.program());
        command
            .args(invocation.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = invocation.cwd() {
            command.current_dir(cwd);
        }

        debug!(tool = %invocation.tool(), command = %command_line, "Launching tool");
        let started = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|e| InvokeError::launch(command_line.clone(), e))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        let tool = invocation.tool().name();
        let mut output = Vec::new();
        let finished = {
            let drain_and_wait = async {
                while let Some(line) = rx.recv().await {
                    self.sink
                        .try_emit(TOOL_OUTPUT, Some(serde_json::json!({ "tool": tool, "line": line })));
                    output.push(line);
                }
                child.wait().await
            };
            let deadline = async {
                match self.timeout {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                status = drain_and_wait => Ok(status),
                () = deadline => Err(Interrupt::TimedOut),
                () = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            }
        };

        let exit = match finished {
            Ok(Ok(status)) => status.code().map_or(ExitStatus::Signaled, ExitStatus::Code),
            Ok(Err(source)) => {
                return Err(InvokeError::Io {
                    command: command_line,
                    source,
                })
            }
            Err(interrupt) => {
                if let Err(e) = child.kill().await {
                    warn!(command = %command_line, error = %e, "Failed to kill tool process");
                }
                match interrupt {
                    Interrupt::TimedOut => {
                        warn!(command = %command_line, timeout = ?self.timeout, "Tool timed out and was killed");
                        ExitStatus::TimedOut
                    }
                    Interrupt::Cancelled => {
                        return Err(InvokeError::Cancelled {
                            command: command_line,
                            reason: self.cancel.reason().unwrap_or_default(),
                        })
                    }
                }
            }
        };

        let duration = started.elapsed();
        self.sink.try_emit(
            TOOL_EXITED,
            Some(serde_json::json!({
                "tool": tool,
                "status": exit,
                "duration_ms": duration.as_millis(),
            })),
        );

        Ok(InvocationOutcome {
            exit,
            output,
            duration,
        })
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end_matches(['\r', '\n']).to_string();
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "Tool output stream closed");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::tools::Tool;

    fn sh(script: &str) -> ToolInvocation {
        ToolInvocation::new(Tool::SeparateByHemisphere, "/bin/sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_streams_combined_output_and_exit_code() {
        let sink = Arc::new(CollectingEventSink::new());
        let invoker = SubprocessInvoker::new(sink.clone(), Arc::new(CancellationToken::new()));

        let outcome = invoker
            .invoke(&sh("echo one; echo two 1>&2; exit 3"))
            .await
            .unwrap();

        assert_eq!(outcome.exit, ExitStatus::Code(3));
        assert!(!outcome.success());
        let mut lines = outcome.output.clone();
        lines.sort();
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(sink.events_of_type(TOOL_OUTPUT).len(), 2);
        assert_eq!(sink.events_of_type(TOOL_EXITED).len(), 1);
    }

    #[tokio::test]
    async fn test_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = SubprocessInvoker::default();
        let outcome = invoker
            .invoke(&sh("touch marker").current_dir(dir.path()))
            .await
            .unwrap();
        assert!(outcome.success());
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let invoker = SubprocessInvoker::default();
        let inv = ToolInvocation::new(Tool::RegisterToAtlas, "/nonexistent/PythonSlicer");
        let err = invoker.invoke(&inv).await.unwrap_err();
        assert!(matches!(err, InvokeError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let invoker = SubprocessInvoker::default().with_timeout(Some(Duration::from_millis(100)));
        let outcome = invoker.invoke(&sh("sleep 5")).await.unwrap();
        assert_eq!(outcome.exit, ExitStatus::TimedOut);
        assert!(outcome.duration < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_cancellation_kills_process() {
        let cancel = Arc::new(CancellationToken::new());
        let invoker = SubprocessInvoker::new(Arc::new(NoOpEventSink), cancel.clone());

        let trigger = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                cancel.cancel("interrupted");
            })
        };

        let err = invoker.invoke(&sh("sleep 5")).await.unwrap_err();
        assert!(matches!(err, InvokeError::Cancelled { ref reason, .. } if reason == "interrupted"));
        trigger.await.unwrap();
    }

    #[tokio::test]
    async fn test_already_cancelled_does_not_launch() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = Arc::new(CancellationToken::new());
        cancel.cancel("stop");
        let invoker = SubprocessInvoker::new(Arc::new(NoOpEventSink), cancel);

        let err = invoker
            .invoke(&sh("touch marker").current_dir(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Cancelled { .. }));
        assert!(!dir.path().join("marker").exists());
    }
}

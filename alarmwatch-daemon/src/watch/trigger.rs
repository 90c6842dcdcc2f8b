//! Switch trigger execution.
//!
//! A trigger runs the configured external command as a subprocess with
//! a wall-clock bound, streaming its stdout into the log while waiting.
//! On timeout or shutdown the child is killed rather than leaked.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::tracing::prelude::*;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("failed to start {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command:?} did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("{command:?} exited with {status}")]
    Exit {
        command: String,
        status: std::process::ExitStatus,
    },
    #[error("{command:?} aborted by shutdown")]
    Cancelled { command: String },
    #[error("failed waiting on {command:?}: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// A bounded-time external switch action.
///
/// Switch-on is re-fired on every qualifying alarm while already
/// active, so implementations must tolerate repeated invocation.
#[async_trait]
pub trait Trigger: Send + Sync {
    async fn fire(&self, cancel: &CancellationToken) -> Result<(), TriggerError>;
}

/// Runs a configured command (a single program path, no shell) with a
/// timeout.
pub struct CommandTrigger {
    command: String,
    timeout: Duration,
}

impl CommandTrigger {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Trigger for CommandTrigger {
    async fn fire(&self, cancel: &CancellationToken) -> Result<(), TriggerError> {
        let mut child = Command::new(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TriggerError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        // Drain stdout concurrently so the child cannot block on a full
        // pipe while we wait on it.
        if let Some(stdout) = child.stdout.take() {
            let command = self.command.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(command = %command, "{line}");
                }
            });
        }

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|source| TriggerError::Wait {
                    command: self.command.clone(),
                    source,
                })?;
                if status.success() {
                    Ok(())
                } else {
                    Err(TriggerError::Exit {
                        command: self.command.clone(),
                        status,
                    })
                }
            }
            _ = tokio::time::sleep(self.timeout) => {
                let _ = child.kill().await;
                Err(TriggerError::Timeout {
                    command: self.command.clone(),
                    timeout: self.timeout,
                })
            }
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                Err(TriggerError::Cancelled {
                    command: self.command.clone(),
                })
            }
        }
    }
}

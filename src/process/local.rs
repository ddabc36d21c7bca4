//! Local process host
//!
//! Spawns backends as direct children with piped stdio. Stderr is drained to
//! the log so a chatty backend cannot block on a full pipe. Cancellation is
//! delivered by an independent escalation task so it works even while the
//! consumer is blocked reading stdout.

use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio_util::sync::CancellationToken;

use super::{AgentProcess, ProcessExit, ProcessHost, ProcessSpec, INTERRUPT_GRACE};
use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Default)]
pub struct LocalHost;

impl LocalHost {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessHost for LocalHost {
    async fn launch(
        &self,
        spec: ProcessSpec,
        cancel: CancellationToken,
    ) -> GatewayResult<Box<dyn AgentProcess>> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            GatewayError::Backend(format!("Failed to spawn {}: {e}", spec.program))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GatewayError::Backend("Child stdout not captured".to_string()))?;
        let stdin = child.stdin.take();

        if let Some(stderr) = child.stderr.take() {
            let program = spec.program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(program = %program, "stderr: {line}");
                }
            });
        }

        if let Some(pid) = child.id() {
            spawn_escalation(pid as i32, cancel);
        }

        Ok(Box::new(LocalProcess {
            child,
            stdin,
            stdout: Some(Box::new(BufReader::new(stdout))),
        }))
    }
}

/// SIGINT on cancellation, SIGKILL if still alive after the grace period.
fn spawn_escalation(pid: i32, cancel: CancellationToken) {
    tokio::spawn(async move {
        cancel.cancelled().await;
        // SAFETY: signalling a pid we spawned; a stale pid yields ESRCH.
        unsafe {
            libc::kill(pid, libc::SIGINT);
        }
        tokio::time::sleep(INTERRUPT_GRACE).await;
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        if alive {
            tracing::debug!(pid, "Process survived SIGINT, sending SIGKILL");
            unsafe {
                libc::kill(pid, libc::SIGKILL);
            }
        }
    });
}

struct LocalProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<Box<dyn AsyncBufRead + Send + Unpin>>,
}

#[async_trait]
impl AgentProcess for LocalProcess {
    fn take_stdout(&mut self) -> Option<Box<dyn AsyncBufRead + Send + Unpin>> {
        self.stdout.take()
    }

    async fn write_stdin(&mut self, data: &[u8]) -> GatewayResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| GatewayError::Backend("Child stdin already closed".to_string()))?;
        stdin.write_all(data).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn close_stdin(&mut self) -> GatewayResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await?;
        }
        Ok(())
    }

    async fn wait(&mut self) -> GatewayResult<ProcessExit> {
        let status = self.child.wait().await?;
        Ok(ProcessExit {
            code: status.code(),
            signal: status.signal().map(|s| signal_name(s).to_string()),
        })
    }
}

fn signal_name(signal: i32) -> &'static str {
    match signal {
        libc::SIGINT => "SIGINT",
        libc::SIGKILL => "SIGKILL",
        libc::SIGTERM => "SIGTERM",
        _ => "SIG?",
    }
}

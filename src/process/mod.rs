//! Process hosting
//!
//! Backends run as child processes either on this machine or on a remote
//! host over a shell channel. Both hosts present the same interface: launch
//! a spec, read line-oriented stdout, optionally write stdin, and wait for
//! exit. Cancellation escalates SIGINT, then SIGKILL after a grace period.

pub mod local;
pub mod remote;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncBufRead;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayResult;

pub use local::LocalHost;
pub use remote::{RemoteEndpoint, RemoteHost};

/// Grace period between SIGINT and SIGKILL during cancellation.
pub const INTERRUPT_GRACE: Duration = Duration::from_millis(500);

/// What to run and under which environment.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: PathBuf,
}

/// How a process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub signal: Option<String>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A running backend process.
#[async_trait]
pub trait AgentProcess: Send {
    /// Take the stdout reader. Yields once; later calls return None.
    fn take_stdout(&mut self) -> Option<Box<dyn AsyncBufRead + Send + Unpin>>;

    async fn write_stdin(&mut self, data: &[u8]) -> GatewayResult<()>;

    async fn close_stdin(&mut self) -> GatewayResult<()>;

    /// Wait for the process to finish.
    async fn wait(&mut self) -> GatewayResult<ProcessExit>;
}

/// Something that can run backend processes.
#[async_trait]
pub trait ProcessHost: Send + Sync {
    /// Run the described process. The cancellation token arms the interrupt
    /// escalation: when cancelled, the host delivers SIGINT, waits out the
    /// grace period, then SIGKILLs.
    async fn launch(
        &self,
        spec: ProcessSpec,
        cancel: CancellationToken,
    ) -> GatewayResult<Box<dyn AgentProcess>>;
}

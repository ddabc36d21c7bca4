//! Remote process host
//!
//! Runs backends on a remote machine over an SSH exec channel while keeping
//! the `AgentProcess` surface identical to local spawning. The command line
//! is rewritten for the remote side: local interpreter launchers are
//! stripped, the local PATH is never forwarded, and env overrides become
//! shell exports. A single pump task owns the channel and multiplexes
//! stdin writes, stdout delivery, and the interrupt escalation.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use russh::client::{self, Msg};
use russh::{Channel, ChannelMsg, Disconnect, Sig};
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use super::{AgentProcess, ProcessExit, ProcessHost, ProcessSpec, INTERRUPT_GRACE};
use crate::config::SandboxConfig;
use crate::error::{GatewayError, GatewayResult};

/// PATH used on the remote side in place of the gateway's own.
const REMOTE_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// Launchers that only make sense on the gateway host. When a backend is
/// installed through a package runner locally, the remote invocation uses
/// the bare CLI name instead.
const LOCAL_LAUNCHERS: [&str; 4] = ["node", "bun", "deno", "npx"];

/// Where and as whom to run.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RemoteEndpoint {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    /// PEM-encoded private key material.
    pub private_key: String,
}

fn default_ssh_port() -> u16 {
    22
}

impl From<&SandboxConfig> for RemoteEndpoint {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            private_key: config.private_key.clone(),
        }
    }
}

pub struct RemoteHost {
    endpoint: RemoteEndpoint,
}

impl RemoteHost {
    pub fn new(endpoint: RemoteEndpoint) -> Self {
        Self { endpoint }
    }
}

struct ClientHandler;

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Sandboxes are ephemeral; host keys are not pinned.
        Ok(true)
    }
}

#[async_trait]
impl ProcessHost for RemoteHost {
    async fn launch(
        &self,
        spec: ProcessSpec,
        cancel: CancellationToken,
    ) -> GatewayResult<Box<dyn AgentProcess>> {
        let config = Arc::new(client::Config::default());
        let endpoint = &self.endpoint;

        let mut handle = client::connect(
            config,
            (endpoint.host.as_str(), endpoint.port),
            ClientHandler,
        )
        .await
        .map_err(|e| {
            GatewayError::Connection(format!(
                "SSH connect to {}:{} failed: {e}",
                endpoint.host, endpoint.port
            ))
        })?;

        let key = russh_keys::decode_secret_key(&endpoint.private_key, None)
            .map_err(|e| GatewayError::Connection(format!("Invalid private key: {e}")))?;
        let authenticated = handle
            .authenticate_publickey(&endpoint.username, Arc::new(key))
            .await
            .map_err(|e| GatewayError::Connection(format!("SSH auth failed: {e}")))?;
        if !authenticated {
            return Err(GatewayError::Connection(format!(
                "SSH auth rejected for user {}",
                endpoint.username
            )));
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| GatewayError::Connection(format!("Failed to open channel: {e}")))?;

        let command = compose_remote_command(&spec);
        tracing::debug!(host = %endpoint.host, command = %command, "Executing remote command");
        channel
            .exec(true, command.as_str())
            .await
            .map_err(|e| GatewayError::Connection(format!("Remote exec failed: {e}")))?;

        let (stdin_tx, stdin_rx) = mpsc::channel(16);
        let (stdout_tx, stdout_rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(64);
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(pump(channel, handle, stdin_rx, stdout_tx, cancel, exit_tx));

        let stdout = BufReader::new(StreamReader::new(ReceiverStream::new(stdout_rx)));
        Ok(Box::new(RemoteProcess {
            stdin_tx: Some(stdin_tx),
            stdout: Some(Box::new(stdout)),
            exit_rx: Some(exit_rx),
        }))
    }
}

enum StdinMsg {
    Data(Bytes),
    Eof,
}

enum Escalation {
    Idle,
    /// SIGINT sent; waiting out the grace period.
    Graceful(Pin<Box<Sleep>>),
    /// SIGKILL sent; waiting before force-closing the channel.
    Killed(Pin<Box<Sleep>>),
}

enum GraceLapse {
    Kill,
    ForceClose,
}

/// What to do when an escalation grace period lapses. The second lapse
/// always force-closes, whatever the remote state.
fn on_grace_lapse(escalation: &Escalation) -> GraceLapse {
    match escalation {
        Escalation::Killed(_) => GraceLapse::ForceClose,
        _ => GraceLapse::Kill,
    }
}

/// Owns the channel for its whole lifetime. Ends when the server closes the
/// channel, then reports the exit and disconnects.
async fn pump(
    mut channel: Channel<Msg>,
    handle: client::Handle<ClientHandler>,
    mut stdin_rx: mpsc::Receiver<StdinMsg>,
    stdout_tx: mpsc::Sender<Result<Bytes, std::io::Error>>,
    cancel: CancellationToken,
    exit_tx: oneshot::Sender<ProcessExit>,
) {
    let mut exit: Option<ProcessExit> = None;
    let mut escalation = Escalation::Idle;
    let mut interrupted = false;
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled(), if !interrupted => {
                interrupted = true;
                if let Err(e) = channel.signal(Sig::INT).await {
                    tracing::warn!(error = %e, "Failed to deliver SIGINT to remote process");
                }
                escalation = Escalation::Graceful(Box::pin(tokio::time::sleep(INTERRUPT_GRACE)));
            }

            _ = async {
                match &mut escalation {
                    Escalation::Graceful(sleep) | Escalation::Killed(sleep) => sleep.as_mut().await,
                    Escalation::Idle => unreachable!(),
                }
            }, if !matches!(escalation, Escalation::Idle) => {
                match on_grace_lapse(&escalation) {
                    GraceLapse::Kill => {
                        tracing::debug!("Remote process survived SIGINT, sending SIGKILL");
                        if let Err(e) = channel.signal(Sig::KILL).await {
                            tracing::warn!(error = %e, "Failed to deliver SIGKILL to remote process");
                        }
                        escalation = Escalation::Killed(Box::pin(tokio::time::sleep(INTERRUPT_GRACE)));
                    }
                    GraceLapse::ForceClose => {
                        // An unresponsive peer must not keep the pump, the
                        // exit receiver, or the connection alive. Leave the
                        // loop so the disconnect below always runs.
                        let _ = channel.close().await;
                        break;
                    }
                }
            }

            msg = stdin_rx.recv(), if stdin_open => {
                match msg {
                    Some(StdinMsg::Data(bytes)) => {
                        if let Err(e) = channel.data(&bytes[..]).await {
                            tracing::warn!(error = %e, "Failed to write remote stdin");
                            stdin_open = false;
                        }
                    }
                    Some(StdinMsg::Eof) | None => {
                        let _ = channel.eof().await;
                        stdin_open = false;
                    }
                }
            }

            msg = channel.wait() => {
                match msg {
                    Some(ChannelMsg::Data { data }) => {
                        // A closed receiver means the consumer went away;
                        // keep draining so the exit status still arrives.
                        let _ = stdout_tx.send(Ok(Bytes::copy_from_slice(&data))).await;
                    }
                    Some(ChannelMsg::ExtendedData { data, ext }) if ext == 1 => {
                        tracing::debug!("remote stderr: {}", String::from_utf8_lossy(&data));
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        exit = Some(ProcessExit { code: Some(exit_status as i32), signal: None });
                    }
                    Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                        exit = Some(ProcessExit {
                            code: None,
                            signal: Some(format!("{signal_name:?}")),
                        });
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        }
    }

    drop(stdout_tx);
    let _ = handle
        .disconnect(Disconnect::ByApplication, "", "en")
        .await;
    let _ = exit_tx.send(exit.unwrap_or(ProcessExit {
        code: None,
        signal: Some("closed".to_string()),
    }));
}

struct RemoteProcess {
    stdin_tx: Option<mpsc::Sender<StdinMsg>>,
    stdout: Option<Box<dyn AsyncBufRead + Send + Unpin>>,
    exit_rx: Option<oneshot::Receiver<ProcessExit>>,
}

#[async_trait]
impl AgentProcess for RemoteProcess {
    fn take_stdout(&mut self) -> Option<Box<dyn AsyncBufRead + Send + Unpin>> {
        self.stdout.take()
    }

    async fn write_stdin(&mut self, data: &[u8]) -> GatewayResult<()> {
        let tx = self
            .stdin_tx
            .as_ref()
            .ok_or_else(|| GatewayError::Backend("Remote stdin already closed".to_string()))?;
        tx.send(StdinMsg::Data(Bytes::copy_from_slice(data)))
            .await
            .map_err(|_| GatewayError::Backend("Remote channel closed".to_string()))
    }

    async fn close_stdin(&mut self) -> GatewayResult<()> {
        if let Some(tx) = self.stdin_tx.take() {
            let _ = tx.send(StdinMsg::Eof).await;
        }
        Ok(())
    }

    async fn wait(&mut self) -> GatewayResult<ProcessExit> {
        let rx = self
            .exit_rx
            .take()
            .ok_or_else(|| GatewayError::Backend("Remote process already waited".to_string()))?;
        rx.await
            .map_err(|_| GatewayError::Backend("Remote channel terminated abruptly".to_string()))
    }
}

/// Drop interpreter launchers that only resolve on the gateway host. A
/// backend run as `node /local/path/cli.js` becomes the bare CLI name,
/// resolved through the remote PATH.
fn strip_local_launcher(program: &str, args: &[String]) -> (String, Vec<String>) {
    let basename = |path: &str| {
        path.rsplit('/')
            .next()
            .unwrap_or(path)
            .to_string()
    };

    let program_name = basename(program);
    if LOCAL_LAUNCHERS.contains(&program_name.as_str()) {
        if let Some((script, rest)) = args.split_first() {
            return (basename(script), rest.to_vec());
        }
    }
    (program_name, args.to_vec())
}

/// POSIX single-quote escaping.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Render a spec as one shell command: enter the working directory, export
/// the env overrides (never the local PATH), then exec the backend.
fn compose_remote_command(spec: &ProcessSpec) -> String {
    let (program, args) = strip_local_launcher(&spec.program, &spec.args);

    let mut parts = vec![format!("cd {}", shell_quote(&spec.working_dir.to_string_lossy()))];

    let mut env: Vec<(&String, &String)> = spec
        .env
        .iter()
        .filter(|(key, _)| key.as_str() != "PATH")
        .collect();
    env.sort_by_key(|(key, _)| key.as_str());
    parts.push(format!("export PATH={}", shell_quote(REMOTE_PATH)));
    for (key, value) in env {
        parts.push(format!("export {key}={}", shell_quote(value)));
    }

    let mut exec = format!("exec {}", shell_quote(&program));
    for arg in &args {
        exec.push(' ');
        exec.push_str(&shell_quote(arg));
    }
    parts.push(exec);

    parts.join(" && ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn spec() -> ProcessSpec {
        ProcessSpec {
            program: "claude".to_string(),
            args: vec!["-p".to_string(), "--verbose".to_string()],
            env: HashMap::new(),
            working_dir: PathBuf::from("/work/project"),
        }
    }

    #[test]
    fn test_compose_basic_command() {
        let command = compose_remote_command(&spec());
        assert_eq!(
            command,
            format!(
                "cd '/work/project' && export PATH='{REMOTE_PATH}' && exec 'claude' '-p' '--verbose'"
            )
        );
    }

    #[test]
    fn test_compose_exports_env_but_never_local_path() {
        let mut s = spec();
        s.env.insert("PATH".to_string(), "/my/local/bin".to_string());
        s.env
            .insert("CLAUDE_CONFIG_DIR".to_string(), "/tmp/scope".to_string());
        let command = compose_remote_command(&s);

        assert!(command.contains("export CLAUDE_CONFIG_DIR='/tmp/scope'"));
        assert!(command.contains(&format!("export PATH='{REMOTE_PATH}'")));
        assert!(!command.contains("/my/local/bin"));
    }

    #[test]
    fn test_strip_node_launcher() {
        let (program, args) = strip_local_launcher(
            "/usr/local/bin/node",
            &[
                "/home/u/.npm/bin/claude".to_string(),
                "-p".to_string(),
            ],
        );
        assert_eq!(program, "claude");
        assert_eq!(args, vec!["-p".to_string()]);
    }

    #[test]
    fn test_absolute_program_uses_basename() {
        let (program, args) = strip_local_launcher("/opt/codex/bin/codex", &["exec".to_string()]);
        assert_eq!(program, "codex");
        assert_eq!(args, vec!["exec".to_string()]);
    }

    #[test]
    fn test_plain_program_untouched() {
        let (program, _) = strip_local_launcher("codex", &[]);
        assert_eq!(program, "codex");
    }

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn test_first_grace_lapse_kills_second_forces_close() {
        let graceful = Escalation::Graceful(Box::pin(tokio::time::sleep(INTERRUPT_GRACE)));
        assert!(matches!(on_grace_lapse(&graceful), GraceLapse::Kill));

        // After SIGKILL the next lapse must end the pump, not rearm.
        let killed = Escalation::Killed(Box::pin(tokio::time::sleep(INTERRUPT_GRACE)));
        assert!(matches!(on_grace_lapse(&killed), GraceLapse::ForceClose));
    }
}

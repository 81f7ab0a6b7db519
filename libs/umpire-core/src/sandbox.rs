//! Sandbox driver: one Docker container per program run.
//!
//! The driver creates a container from a per-language image, ships the whole
//! submission to it as one JSON document on the attached stdin, and exposes
//! the program's stdout and stderr as independent line streams. Termination
//! is guaranteed three ways: the container exits, the 30-second watchdog
//! fires, or the caller's cancellation scope closes — in every case the
//! container is force-removed.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::Docker;
use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{JudgeError, JudgeResult};
use crate::types::Payload;

/// Hard per-run deadline, independent of the caller's cancellation scope.
pub const WATCHDOG: Duration = Duration::from_secs(30);

/// Capacity of the in-memory pipes carrying reassembled output lines.
const PIPE_CAPACITY: usize = 64 * 1024;

const STREAM_ARGS: &[&str] = &["-stream=true"];

/// Image and argv for a language tag. The images implement the sandbox
/// contract: read `{files, stdin, language}` as JSON from stdin, compile and
/// run, emit the program's stdout/stderr on their own descriptors.
fn language_spec(language: &str) -> Option<(&'static str, &'static [&'static str])> {
    match language {
        "cpp" => Some(("phluent/clang", STREAM_ARGS)),
        "python" => Some(("phluent/python", STREAM_ARGS)),
        "javascript" => Some(("phluent/javascript", STREAM_ARGS)),
        "typescript" => Some(("phluent/typescript", STREAM_ARGS)),
        _ => None,
    }
}

/// Why the `done` signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    Exited { status_code: i64 },
    Watchdog,
}

/// A running sandbox. `stdout`/`stderr` yield newline-terminated lines;
/// `done` fires once on container exit or watchdog expiry; `cleanup` must be
/// invoked on every exit path (a drop guard force-removes as a last resort).
pub struct SandboxHandle {
    pub container_id: String,
    pub stdout: DuplexStream,
    pub stderr: DuplexStream,
    pub done: oneshot::Receiver<DoneReason>,
    pub cleanup: Cleanup,
}

/// Idempotent container removal. Runs under its own scope so that a caller
/// being cancelled can still free its sandbox.
#[derive(Clone)]
pub struct Cleanup {
    inner: Arc<CleanupInner>,
}

struct CleanupInner {
    docker: Docker,
    container_id: String,
    removed: AtomicBool,
}

impl Cleanup {
    fn new(docker: Docker, container_id: String) -> Self {
        Cleanup {
            inner: Arc::new(CleanupInner {
                docker,
                container_id,
                removed: AtomicBool::new(false),
            }),
        }
    }

    /// Force-remove the container. The first call does the work; later calls
    /// are no-ops.
    pub async fn run(&self) {
        if self.inner.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(container = %self.inner.container_id, "removing sandbox container");
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(err) = self
            .inner
            .docker
            .remove_container(&self.inner.container_id, Some(options))
            .await
        {
            warn!(container = %self.inner.container_id, error = %err, "failed to remove sandbox container");
        }
    }
}

impl Drop for CleanupInner {
    fn drop(&mut self) {
        if self.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        let docker = self.docker.clone();
        let container_id = self.container_id.clone();
        tokio::spawn(async move {
            let options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            if let Err(err) = docker.remove_container(&container_id, Some(options)).await {
                warn!(container = %container_id, error = %err, "late sandbox removal failed");
            }
        });
    }
}

/// Create, start and wire up one sandbox for `payload`.
///
/// Failures here are fatal and surface immediately as raw docker/serde
/// errors (the judge classifies them). Failures after this point arrive as
/// stream errors or through `done`.
pub async fn spawn_sandbox(docker: &Docker, payload: &Payload) -> JudgeResult<SandboxHandle> {
    let (image, cmd) = language_spec(&payload.language)
        .ok_or_else(|| JudgeError::Sandbox(format!("unsupported language: {}", payload.language)))?;

    let name = format!("umpire-{}", Uuid::new_v4());
    let config = Config {
        image: Some(image.to_string()),
        cmd: Some(cmd.iter().map(|s| s.to_string()).collect()),
        attach_stdin: Some(true),
        open_stdin: Some(true),
        stdin_once: Some(false),
        ..Default::default()
    };

    let created = docker
        .create_container(
            Some(CreateContainerOptions {
                name: name.as_str(),
                platform: None,
            }),
            config,
        )
        .await?;
    let container_id = created.id;
    // From here on the guard owns removal, whatever goes wrong below.
    let cleanup = Cleanup::new(docker.clone(), container_id.clone());
    debug!(container = %container_id, image, language = %payload.language, "sandbox container created");

    docker
        .start_container(&container_id, None::<StartContainerOptions<String>>)
        .await?;

    // Separate follow-mode subscriptions so stdout and stderr stay
    // independent byte streams.
    let stdout_logs = docker.logs(
        &container_id,
        Some(LogsOptions::<String> {
            stdout: true,
            follow: true,
            ..Default::default()
        }),
    );
    let stderr_logs = docker.logs(
        &container_id,
        Some(LogsOptions::<String> {
            stderr: true,
            follow: true,
            ..Default::default()
        }),
    );

    let AttachContainerResults { input, .. } = docker
        .attach_container(
            &container_id,
            Some(AttachContainerOptions::<String> {
                stdin: Some(true),
                stream: Some(true),
                ..Default::default()
            }),
        )
        .await?;
    let data = serde_json::to_vec(payload)?;
    tokio::spawn(write_payload(input, data));

    let (done_tx, done_rx) = oneshot::channel();
    tokio::spawn(wait_for_exit(docker.clone(), container_id.clone(), done_tx));

    let (stdout_writer, stdout_reader) = tokio::io::duplex(PIPE_CAPACITY);
    let (stderr_writer, stderr_reader) = tokio::io::duplex(PIPE_CAPACITY);
    tokio::spawn(pump_lines(Box::pin(stdout_logs), stdout_writer));
    tokio::spawn(pump_lines(Box::pin(stderr_logs), stderr_writer));

    Ok(SandboxHandle {
        container_id,
        stdout: stdout_reader,
        stderr: stderr_reader,
        done: done_rx,
        cleanup,
    })
}

/// Ship the JSON payload to the container's stdin in full, then close the
/// write side so the sandbox sees EOF.
async fn write_payload(mut input: Pin<Box<dyn AsyncWrite + Send>>, data: Vec<u8>) {
    if let Err(err) = input.write_all(&data).await {
        warn!(error = %err, "failed to write payload to sandbox stdin");
        return;
    }
    if let Err(err) = input.shutdown().await {
        debug!(error = %err, "error closing sandbox stdin");
    }
    debug!(bytes = data.len(), "payload written to sandbox stdin");
}

/// Wait for container exit, bounded by the watchdog. Fires `done` exactly
/// once either way.
async fn wait_for_exit(docker: Docker, container_id: String, done: oneshot::Sender<DoneReason>) {
    let mut wait = docker.wait_container(
        &container_id,
        Some(WaitContainerOptions {
            condition: "not-running",
        }),
    );
    let reason = tokio::select! {
        outcome = wait.next() => match outcome {
            Some(Ok(body)) => DoneReason::Exited { status_code: body.status_code },
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                DoneReason::Exited { status_code: code }
            }
            Some(Err(err)) => {
                // Wait also errors when the container is removed under us;
                // by then the run is over either way.
                debug!(container = %container_id, error = %err, "container wait ended with error");
                DoneReason::Exited { status_code: -1 }
            }
            None => DoneReason::Exited { status_code: -1 },
        },
        _ = tokio::time::sleep(WATCHDOG) => DoneReason::Watchdog,
    };
    debug!(container = %container_id, ?reason, "sandbox done");
    let _ = done.send(reason);
}

/// Reassemble demuxed log frames into newline-terminated lines.
///
/// bollard's log codec already consumes the daemon's 8-byte multiplexed
/// stream envelope, so each frame is raw payload bytes; frames do not align
/// with lines, hence the carry buffer. A final unterminated chunk is flushed
/// as a line of its own when the stream ends.
async fn pump_lines<S>(mut frames: S, mut out: DuplexStream)
where
    S: Stream<Item = Result<LogOutput, bollard::errors::Error>> + Unpin,
{
    let mut carry: Vec<u8> = Vec::new();
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(output) => {
                carry.extend_from_slice(&output.into_bytes());
                while let Some(pos) = carry.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = carry.drain(..=pos).collect();
                    if out.write_all(&line).await.is_err() {
                        // Reader side is gone; stop pumping.
                        return;
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "error reading sandbox logs");
                break;
            }
        }
    }
    if !carry.is_empty() {
        carry.push(b'\n');
        let _ = out.write_all(&carry).await;
    }
    // Dropping `out` closes the pipe; the reader observes EOF.
}

//! The evaluation pipeline: single-case judgment, the fail-fast fan-out
//! across test cases, the two-process oracle coupling behind `run`, and
//! plain execution with no oracle.

use std::collections::HashSet;

use bollard::Docker;
use tempfile::TempDir;
use tokio::io::{AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::compare::{compare_lines, drain_stderr, Comparison, TeeBuffer};
use crate::error::{JudgeError, JudgeResult};
use crate::sandbox::{spawn_sandbox, DoneReason, SandboxHandle};
use crate::types::{ExpectedSource, Payload, TestCase};

/// Capacity of the oracle pipe between the canonical solution's stdout and
/// the comparator's expected stream.
const ORACLE_PIPE_CAPACITY: usize = 64 * 1024;

/// Materialize the submission's files into a scratch directory. The
/// directory lives exactly as long as the sandbox run (dropped on the same
/// exit path). Duplicate file names are rejected rather than silently
/// overwritten.
fn materialize_files(files: &[crate::types::InMemoryFile]) -> JudgeResult<TempDir> {
    if files.is_empty() {
        return Err(JudgeError::Sandbox("payload contains no files".to_string()));
    }
    let dir = tempfile::Builder::new().prefix("umpire-work-").tempdir()?;
    let mut seen = HashSet::new();
    for file in files {
        if !seen.insert(file.name.as_str()) {
            return Err(JudgeError::Sandbox(format!(
                "duplicate file name in payload: {}",
                file.name
            )));
        }
        std::fs::write(dir.path().join(&file.name), &file.content)?;
    }
    debug!(dir = %dir.path().display(), files = files.len(), "materialized submission files");
    Ok(dir)
}

/// Judge one submission against one test case.
///
/// `Ok(())` is PASS; the error variant carries the verdict. The outcome is
/// decided by multiplexing the comparator, the stderr drain, the sandbox's
/// `done` signal and the cancellation scope:
///
/// - the first Mismatch or RuntimeError is terminal and preempts the rest;
/// - cancellation cleans up immediately and reports `Cancelled`;
/// - a watchdog-fired `done` cleans up (which unblocks the streams),
///   collects what they yielded, and reports `Timeout` unless something
///   terminal arrived first;
/// - a clean exit with a full match and silent stderr is PASS.
pub async fn judge_testcase<WO, WE>(
    docker: &Docker,
    payload: &Payload,
    testcase: TestCase,
    token: CancellationToken,
    stdout_tee: WO,
    stderr_tee: WE,
) -> JudgeResult<()>
where
    WO: AsyncWrite + Send + Unpin + 'static,
    WE: AsyncWrite + Send + Unpin + 'static,
{
    let _scratch = materialize_files(&payload.files)?;

    let mut to_send = payload.clone();
    to_send.stdin = testcase.input.clone();

    let handle = spawn_sandbox(docker, &to_send)
        .await
        .map_err(JudgeError::into_sandbox)?;
    let SandboxHandle {
        container_id,
        stdout,
        stderr,
        mut done,
        cleanup,
    } = handle;
    debug!(container = %container_id, case = %testcase.id, "judging test case");

    let (results_tx, mut results_rx) = mpsc::channel::<JudgeResult<()>>(2);

    let expected = testcase.expected.into_reader();
    let compare_tx = results_tx.clone();
    tokio::spawn(async move {
        let mut tee = stdout_tee;
        let verdict = match compare_lines(BufReader::new(stdout), BufReader::new(expected), &mut tee).await {
            Ok(Comparison::Match) => Ok(()),
            Ok(Comparison::Mismatch { line, got, want }) => {
                Err(JudgeError::Mismatch { line, got, want })
            }
            Err(err) => Err(JudgeError::Io(err)),
        };
        let _ = compare_tx.send(verdict).await;
    });

    let stderr_tx = results_tx.clone();
    tokio::spawn(async move {
        let mut tee = stderr_tee;
        let verdict = match drain_stderr(BufReader::new(stderr), &mut tee).await {
            Ok(text) if text.is_empty() => Ok(()),
            Ok(text) => Err(JudgeError::RuntimeError(text)),
            Err(err) => Err(JudgeError::Io(err)),
        };
        let _ = stderr_tx.send(verdict).await;
    });
    drop(results_tx);

    let mut pending = 2usize;
    let mut done_fired = false;
    let mut timed_out = false;
    let verdict = loop {
        tokio::select! {
            // Terminal stream verdicts take precedence over the done signal.
            biased;
            outcome = results_rx.recv() => match outcome {
                Some(Ok(())) => {
                    pending -= 1;
                    if pending == 0 {
                        break if timed_out { Err(JudgeError::Timeout) } else { Ok(()) };
                    }
                }
                Some(Err(err)) => break Err(err),
                None => break Err(JudgeError::Sandbox("sandbox streams ended unexpectedly".to_string())),
            },
            reason = &mut done, if !done_fired => {
                done_fired = true;
                match reason {
                    Ok(DoneReason::Watchdog) => {
                        warn!(container = %container_id, case = %testcase.id, "watchdog expired");
                        timed_out = true;
                        // Removal ends the log follows so the readers can
                        // report whatever they saw.
                        cleanup.run().await;
                    }
                    Ok(DoneReason::Exited { status_code }) => {
                        debug!(container = %container_id, status_code, "sandbox exited");
                    }
                    Err(_) => {}
                }
            },
            _ = token.cancelled() => {
                debug!(container = %container_id, case = %testcase.id, "cancelled");
                cleanup.run().await;
                break Err(JudgeError::Cancelled);
            }
        }
    };

    cleanup.run().await;
    verdict
}

/// Judge a submission against every test case concurrently, failing fast.
///
/// The first non-PASS verdict cancels the siblings; cancellation cascades
/// are excluded from first-failure selection so the returned verdict names
/// the real failure.
pub async fn judge_all(
    docker: &Docker,
    payload: &Payload,
    testcases: Vec<TestCase>,
    token: &CancellationToken,
) -> JudgeResult<()> {
    if testcases.is_empty() {
        return Err(JudgeError::Sandbox("no test cases to judge".to_string()));
    }
    let total = testcases.len();
    let shared = token.child_token();
    let (results_tx, mut results_rx) = mpsc::channel::<JudgeResult<()>>(total);

    for testcase in testcases {
        let docker = docker.clone();
        let payload = payload.clone();
        let child = shared.clone();
        let results_tx = results_tx.clone();
        tokio::spawn(async move {
            let case_id = testcase.id.clone();
            let outcome = judge_testcase(
                &docker,
                &payload,
                testcase,
                child,
                tokio::io::sink(),
                tokio::io::sink(),
            )
            .await
            .map_err(|err| err.for_case(case_id));
            let _ = results_tx.send(outcome).await;
        });
    }
    drop(results_tx);

    let mut first_failure: Option<JudgeError> = None;
    let mut failures = 0usize;
    while let Some(outcome) = results_rx.recv().await {
        if let Err(err) = outcome {
            failures += 1;
            shared.cancel();
            if first_failure.is_none() && !err.is_cancelled() {
                first_failure = Some(err);
            }
        }
    }
    debug!(total, failures, "fan-out judging finished");

    match first_failure {
        Some(err) => Err(err),
        // Every failure was a cancellation cascade: the parent scope closed
        // before a real verdict, which must not read as PASS.
        None if failures > 0 => Err(JudgeError::Cancelled),
        None => Ok(()),
    }
}

/// Execute a submission with no oracle, pumping its stdout and stderr to the
/// tees until the container terminates.
pub async fn execute<WO, WE>(
    docker: &Docker,
    payload: &Payload,
    stdout_tee: WO,
    stderr_tee: WE,
    token: &CancellationToken,
) -> JudgeResult<()>
where
    WO: AsyncWrite + Send + Unpin + 'static,
    WE: AsyncWrite + Send + Unpin + 'static,
{
    let handle = spawn_sandbox(docker, payload)
        .await
        .map_err(JudgeError::into_sandbox)?;
    let SandboxHandle {
        container_id,
        mut stdout,
        mut stderr,
        mut done,
        cleanup,
    } = handle;
    debug!(container = %container_id, "executing payload");

    let (results_tx, mut results_rx) = mpsc::channel::<std::io::Result<u64>>(2);

    let stdout_tx = results_tx.clone();
    tokio::spawn(async move {
        let mut tee = stdout_tee;
        let copied = tokio::io::copy(&mut stdout, &mut tee).await;
        let _ = stdout_tx.send(copied).await;
    });
    let stderr_tx = results_tx.clone();
    tokio::spawn(async move {
        let mut tee = stderr_tee;
        let copied = tokio::io::copy(&mut stderr, &mut tee).await;
        let _ = stderr_tx.send(copied).await;
    });
    drop(results_tx);

    // Completion needs both: the container terminated (`done`) and the
    // output pumps drained. A pump ending early because its consumer went
    // away (the oracle pipe's reader can close first) is not a failure; the
    // program is still run to completion.
    let mut pending = 2usize;
    let mut done_fired = false;
    let mut timed_out = false;
    let verdict = loop {
        if pending == 0 && done_fired {
            break if timed_out { Err(JudgeError::Timeout) } else { Ok(()) };
        }
        tokio::select! {
            outcome = results_rx.recv(), if pending > 0 => match outcome {
                Some(Ok(_)) => pending -= 1,
                Some(Err(err)) => {
                    debug!(container = %container_id, error = %err, "output pump ended early");
                    pending -= 1;
                }
                None => break Err(JudgeError::Sandbox("sandbox streams ended unexpectedly".to_string())),
            },
            reason = &mut done, if !done_fired => {
                done_fired = true;
                if matches!(reason, Ok(DoneReason::Watchdog)) {
                    warn!(container = %container_id, "watchdog expired");
                    timed_out = true;
                    cleanup.run().await;
                }
            },
            _ = token.cancelled() => {
                debug!(container = %container_id, "execution cancelled");
                cleanup.run().await;
                break Err(JudgeError::Cancelled);
            }
        }
    };

    cleanup.run().await;
    verdict
}

/// Run mode: execute the submission on the user's stdin while the catalog's
/// canonical solution runs on the same stdin, and compare their stdout line
/// by line.
///
/// The canonical side's stdout feeds the comparator's expected stream
/// through a bounded pipe; both halves share one cancellation scope, so the
/// first failure tears the other down. A canonical-side failure (including
/// anything it writes to stderr) is a sandbox error, never a submission
/// failure.
pub async fn run_and_judge<WO, WE>(
    docker: &Docker,
    catalog: &Catalog,
    payload: &Payload,
    stdout_tee: WO,
    stderr_tee: WE,
    token: &CancellationToken,
) -> JudgeResult<()>
where
    WO: AsyncWrite + Send + Unpin + 'static,
    WE: AsyncWrite + Send + Unpin + 'static,
{
    let problem_id = payload
        .problem
        .as_ref()
        .map(|p| p.id.clone())
        .ok_or_else(|| JudgeError::CatalogMiss("<no problem id>".to_string()))?;
    let data = catalog
        .get(&problem_id)
        .ok_or_else(|| JudgeError::CatalogMiss(problem_id.clone()))?;
    info!(problem = %problem_id, "running against canonical solution");

    let mut canonical = data.solution.clone();
    canonical.stdin = payload.stdin.clone();

    let shared = token.child_token();
    let (oracle_writer, oracle_reader) = tokio::io::duplex(ORACLE_PIPE_CAPACITY);
    let (results_tx, mut results_rx) = mpsc::channel::<JudgeResult<()>>(2);

    // Canonical half: its stdout becomes the expected stream. Dropping the
    // pipe's write half on return is what gives the comparator EOF.
    let canonical_docker = docker.clone();
    let canonical_token = shared.clone();
    let canonical_tx = results_tx.clone();
    tokio::spawn(async move {
        let canonical_stderr = TeeBuffer::new();
        let outcome = execute(
            &canonical_docker,
            &canonical,
            oracle_writer,
            canonical_stderr.clone(),
            &canonical_token,
        )
        .await;
        let verdict = match outcome {
            Err(JudgeError::Cancelled) => Err(JudgeError::Cancelled),
            Err(err) => Err(JudgeError::Sandbox(format!(
                "canonical solution failed: {err}"
            ))),
            Ok(()) => {
                let text = canonical_stderr.contents();
                if text.is_empty() {
                    debug!("canonical solution finished cleanly");
                    Ok(())
                } else {
                    Err(JudgeError::Sandbox(format!(
                        "canonical solution wrote to stderr: {text}"
                    )))
                }
            }
        };
        let _ = canonical_tx.send(verdict).await;
    });

    // User half: an ordinary single-case judgment whose expected output is
    // whatever the canonical side produces.
    let testcase = TestCase {
        id: problem_id.clone(),
        input: payload.stdin.clone(),
        expected: ExpectedSource::Stream(oracle_reader),
    };
    let user_docker = docker.clone();
    let user_payload = payload.clone();
    let user_token = shared.clone();
    let user_tx = results_tx.clone();
    tokio::spawn(async move {
        let outcome = judge_testcase(
            &user_docker,
            &user_payload,
            testcase,
            user_token,
            stdout_tee,
            stderr_tee,
        )
        .await;
        let _ = user_tx.send(outcome).await;
    });
    drop(results_tx);

    let mut finished = 0usize;
    while let Some(outcome) = results_rx.recv().await {
        match outcome {
            Ok(()) => {
                finished += 1;
                if finished == 2 {
                    return Ok(());
                }
            }
            Err(err) => {
                shared.cancel();
                return Err(err);
            }
        }
    }
    Err(JudgeError::Sandbox("run halves ended unexpectedly".to_string()))
}

//! The public facade: one `Agent` owns the docker client, the problem
//! catalog and an optional problems directory, and turns every judgment
//! outcome into a wire-level `Response`.

use std::path::PathBuf;
use std::sync::Arc;

use bollard::Docker;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::compare::TeeBuffer;
use crate::error::{JudgeError, JudgeResult};
use crate::judge::{execute, judge_all, run_and_judge};
use crate::problems;
use crate::types::{JudgeData, Payload, ProblemRef, Response, TestCase};

pub struct Agent {
    docker: Docker,
    catalog: Catalog,
    problems_dir: Option<PathBuf>,
}

impl Agent {
    pub fn new(docker: Docker, problems_dir: Option<PathBuf>) -> Self {
        Agent {
            docker,
            catalog: Catalog::new(),
            problems_dir,
        }
    }

    /// Connect to the local docker daemon and build an agent around it.
    pub fn connect(problems_dir: Option<PathBuf>) -> JudgeResult<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        info!("connected to docker daemon");
        Ok(Agent::new(docker, problems_dir))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Resolve the fixtures for the payload's problem: the catalog first,
    /// then the problems directory, else a catalog miss.
    fn load_testcases(&self, payload: &Payload) -> JudgeResult<Vec<TestCase>> {
        let problem_id = payload
            .problem
            .as_ref()
            .map(|p| p.id.clone())
            .ok_or_else(|| JudgeError::CatalogMiss("<no problem id>".to_string()))?;

        if let Some(data) = self.catalog.get(&problem_id) {
            let cases = data
                .io
                .iter()
                .enumerate()
                .map(|(index, io)| {
                    TestCase::buffered(
                        format!("{problem_id}#{index}"),
                        io.input.clone(),
                        io.output.clone(),
                    )
                })
                .collect();
            return Ok(cases);
        }

        if let Some(root) = &self.problems_dir {
            let dir = root.join(&problem_id);
            if dir.is_dir() {
                let cases = problems::read_testcases(&dir)?
                    .into_iter()
                    .enumerate()
                    .map(|(index, io)| {
                        TestCase::buffered(format!("{problem_id}#{index}"), io.input, io.output)
                    })
                    .collect();
                return Ok(cases);
            }
        }

        Err(JudgeError::CatalogMiss(problem_id))
    }

    /// Judge the payload against its problem's fixtures.
    pub async fn judge(&self, payload: &Payload) -> Response {
        match self.judge_inner(payload).await {
            Ok(()) => Response::pass(),
            Err(err) => {
                info!(error = %err, "judge failed");
                Response::fail(err.to_string())
            }
        }
    }

    async fn judge_inner(&self, payload: &Payload) -> JudgeResult<()> {
        let testcases = self.load_testcases(payload)?;
        info!(cases = testcases.len(), "judging submission");
        judge_all(&self.docker, payload, testcases, &CancellationToken::new()).await
    }

    /// Execute the payload on the user's stdin while the canonical solution
    /// acts as the oracle.
    pub async fn run(&self, payload: &Payload) -> Response {
        let stdout = TeeBuffer::new();
        let stderr = TeeBuffer::new();
        let outcome = run_and_judge(
            &self.docker,
            &self.catalog,
            payload,
            stdout.clone(),
            stderr.clone(),
            &CancellationToken::new(),
        )
        .await;
        match outcome {
            Ok(()) => Response {
                status: crate::types::Decision::Pass,
                details: "output matches the canonical solution".to_string(),
                stdout: stdout.contents(),
                stderr: stderr.contents(),
            },
            Err(err) => {
                info!(error = %err, "run failed");
                Response::fail(err.to_string()).with_output(stdout.contents(), stderr.contents())
            }
        }
    }

    /// Execute the payload with no oracle. PASS iff it finished with empty
    /// stderr.
    pub async fn execute(&self, payload: &Payload) -> Response {
        let stdout = TeeBuffer::new();
        let stderr = TeeBuffer::new();
        let outcome = execute(
            &self.docker,
            payload,
            stdout.clone(),
            stderr.clone(),
            &CancellationToken::new(),
        )
        .await;
        let stdout = stdout.contents();
        let stderr_text = stderr.contents();
        match outcome {
            Err(err) => {
                info!(error = %err, "execute failed");
                Response::fail(err.to_string()).with_output(stdout, stderr_text)
            }
            Ok(()) if !stderr_text.is_empty() => {
                Response::fail("error while running program").with_output(stdout, stderr_text)
            }
            Ok(()) => Response::pass().with_output(stdout, stderr_text),
        }
    }

    /// Temporarily register `data` and judge its own canonical solution
    /// against its own fixtures. The transient entry is removed on every
    /// path out.
    pub async fn validate(&self, data: JudgeData) -> Response {
        let language = data.solution.language.clone();
        let files = data.solution.files.clone();
        let key = self.catalog.temp_insert(data);
        info!(%key, "validating problem data under transient key");

        let payload = Payload {
            language,
            files,
            problem: Some(ProblemRef { id: key.clone() }),
            stdin: String::new(),
        };
        let response = self.judge(&payload).await;
        self.catalog.remove(&key);
        response
    }

    /// Refresh the catalog from the configured sources: the remote endpoint
    /// first, then the problems directory (directory entries win on id
    /// collisions). Retains the current catalog when every source fails.
    pub async fn refresh_catalog(&self, serverdb: Option<&str>) -> usize {
        let mut merged = std::collections::HashMap::new();
        let mut any_source_ok = false;

        if let Some(base_url) = serverdb {
            match problems::fetch_problems(base_url).await {
                Ok(remote) => {
                    any_source_ok = true;
                    merged.extend(remote);
                }
                Err(err) => warn!(error = %err, "failed to fetch remote problems"),
            }
        }
        if let Some(root) = &self.problems_dir {
            let mut local = std::collections::HashMap::new();
            match problems::read_all_problems(&mut local, root) {
                Ok(()) => {
                    any_source_ok = true;
                    merged.extend(local);
                }
                Err(err) => warn!(error = %err, dir = %root.display(), "failed to scan problems directory"),
            }
        }

        if !any_source_ok {
            warn!("all catalog sources failed; keeping current catalog");
            return self.catalog.len();
        }
        let count = merged.len();
        self.catalog.swap(merged);
        info!(problems = count, "catalog refreshed");
        count
    }
}

/// Shared handle used by the server and other long-lived callers.
pub type SharedAgent = Arc<Agent>;

//! End-to-end scenarios against a live Docker daemon.
//!
//! These tests need the daemon socket and the per-language sandbox images
//! pulled locally, so they are all `#[ignore]`d; run them explicitly with
//! `cargo test -p umpire-core -- --ignored`.

use std::collections::HashMap;

use bollard::Docker;

use crate::agent::Agent;
use crate::types::{Decision, InMemoryFile, InputOutput, JudgeData, Payload, ProblemRef};

/// Reads whitespace-separated tokens and prints each token's length.
const TOKEN_LENGTHS_CPP: &str = "#include <iostream>\nusing namespace std;\nint main() {string s;while(cin >> s) {cout << s.size() << endl;}}";

/// Writes a diagnostic to stderr and exits.
const STDERR_CPP: &str =
    "#include <iostream>\nint main() { std::cerr << \"oops\" << std::endl; return 0; }";

fn cpp_payload(source: &str, problem_id: Option<&str>) -> Payload {
    Payload {
        language: "cpp".to_string(),
        files: vec![InMemoryFile {
            name: "main.cpp".to_string(),
            content: source.to_string(),
        }],
        problem: problem_id.map(|id| ProblemRef { id: id.to_string() }),
        stdin: String::new(),
    }
}

fn token_lengths_data() -> JudgeData {
    JudgeData {
        solution: cpp_payload(TOKEN_LENGTHS_CPP, None),
        io: vec![
            InputOutput {
                input: "hello\nhi\n".to_string(),
                output: "5\n2\n".to_string(),
            },
            InputOutput {
                input: "hi\nhello\n".to_string(),
                output: "2\n5\n".to_string(),
            },
        ],
    }
}

fn live_agent() -> Agent {
    let docker = Docker::connect_with_local_defaults().expect("docker daemon");
    Agent::new(docker, None)
}

#[tokio::test]
#[ignore] // Requires Docker and the phluent/* images
async fn judge_passes_a_correct_submission() {
    let agent = live_agent();
    let mut map = HashMap::new();
    map.insert("token-lengths".to_string(), token_lengths_data());
    agent.catalog().swap(map);

    let response = agent
        .judge(&cpp_payload(TOKEN_LENGTHS_CPP, Some("token-lengths")))
        .await;
    assert_eq!(response.status, Decision::Pass, "details: {}", response.details);
}

#[tokio::test]
#[ignore] // Requires Docker and the phluent/* images
async fn judge_reports_the_diverging_line_on_a_bugged_fixture() {
    let agent = live_agent();
    let mut data = token_lengths_data();
    data.io[0].output = "4\n2\n".to_string();
    let mut map = HashMap::new();
    map.insert("bugged".to_string(), data);
    agent.catalog().swap(map);

    let response = agent
        .judge(&cpp_payload(TOKEN_LENGTHS_CPP, Some("bugged")))
        .await;
    assert_eq!(response.status, Decision::Fail);
    assert!(response.details.contains("mismatch"), "details: {}", response.details);
    assert!(response.details.contains("\"5\""), "details: {}", response.details);
    assert!(response.details.contains("\"4\""), "details: {}", response.details);
}

#[tokio::test]
#[ignore] // Requires Docker and the phluent/* images
async fn stderr_output_is_a_runtime_error() {
    let agent = live_agent();
    let mut map = HashMap::new();
    map.insert(
        "quiet".to_string(),
        JudgeData {
            solution: cpp_payload(TOKEN_LENGTHS_CPP, None),
            io: vec![InputOutput {
                input: String::new(),
                output: String::new(),
            }],
        },
    );
    agent.catalog().swap(map);

    let response = agent.judge(&cpp_payload(STDERR_CPP, Some("quiet"))).await;
    assert_eq!(response.status, Decision::Fail);
    assert!(response.details.contains("oops"), "details: {}", response.details);
}

#[tokio::test]
#[ignore] // Requires Docker and the phluent/* images
async fn run_compares_against_the_live_canonical_solution() {
    let agent = live_agent();
    let mut map = HashMap::new();
    map.insert("token-lengths".to_string(), token_lengths_data());
    agent.catalog().swap(map);

    let mut payload = cpp_payload(TOKEN_LENGTHS_CPP, Some("token-lengths"));
    payload.stdin = "hello\nhi\n".to_string();

    let response = agent.run(&payload).await;
    assert_eq!(response.status, Decision::Pass, "details: {}", response.details);
    assert!(response.stdout.contains("5\n2\n"), "stdout: {}", response.stdout);
}

#[tokio::test]
#[ignore] // Requires Docker and the phluent/* images
async fn execute_passes_with_empty_stderr() {
    let agent = live_agent();
    let mut payload = cpp_payload(TOKEN_LENGTHS_CPP, None);
    payload.stdin = "abc\nhello\n".to_string();

    let response = agent.execute(&payload).await;
    assert_eq!(response.status, Decision::Pass, "details: {}", response.details);
    assert!(response.stdout.contains("3\n5\n"), "stdout: {}", response.stdout);
    assert!(response.stderr.is_empty());
}

#[tokio::test]
#[ignore] // Requires Docker and the phluent/* images
async fn execute_fails_when_the_program_writes_to_stderr() {
    let agent = live_agent();
    let response = agent.execute(&cpp_payload(STDERR_CPP, None)).await;
    assert_eq!(response.status, Decision::Fail);
    assert!(response.stderr.contains("oops"));
}

#[tokio::test]
#[ignore] // Requires Docker and the phluent/* images
async fn validate_accepts_consistent_judge_data() {
    let agent = live_agent();
    let response = agent.validate(token_lengths_data()).await;
    assert_eq!(response.status, Decision::Pass, "details: {}", response.details);
    // The transient entry must be gone afterwards.
    assert!(agent.catalog().is_empty());
}

#[tokio::test]
#[ignore] // Requires Docker and the phluent/* images — long-running
async fn concurrent_judges_fail_only_the_bugged_one() {
    use std::sync::Arc;

    let agent = Arc::new(live_agent());
    let mut map = HashMap::new();
    map.insert("token-lengths".to_string(), token_lengths_data());
    let mut bugged = token_lengths_data();
    bugged.io[0].output = "4\n2\n".to_string();
    map.insert("bugged".to_string(), bugged);
    agent.catalog().swap(map);

    let mut handles = Vec::new();
    for i in 0..30 {
        let agent = agent.clone();
        let problem = if i == 0 { "bugged" } else { "token-lengths" };
        handles.push(tokio::spawn(async move {
            agent
                .judge(&cpp_payload(TOKEN_LENGTHS_CPP, Some(problem)))
                .await
        }));
    }

    let mut failures = 0;
    for (i, handle) in handles.into_iter().enumerate() {
        let response = handle.await.expect("task");
        if response.status == Decision::Fail {
            failures += 1;
            assert_eq!(i, 0, "only the bugged problem should fail");
        }
    }
    assert_eq!(failures, 1);
}

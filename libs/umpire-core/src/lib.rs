//! Umpire's evaluation engine.
//!
//! Submissions are compiled and executed inside per-language Docker
//! sandboxes; their stdout is compared line by line against expected output.
//! Two primary modes: *judge* runs a submission against a problem's stored
//! fixtures with a fail-fast fan-out across test cases, and *run* executes
//! it on user-provided input while the problem's canonical solution runs
//! alongside as the oracle.
//!
//! The crate is driven by the `umpire-server` HTTP surface and the `ump`
//! CLI; both go through [`Agent`].

pub use agent::{Agent, SharedAgent};
pub use catalog::Catalog;
pub use compare::{compare_lines, drain_stderr, Comparison, TeeBuffer};
pub use error::{JudgeError, JudgeResult};
pub use judge::{execute, judge_all, judge_testcase, run_and_judge};
pub use sandbox::{spawn_sandbox, Cleanup, DoneReason, SandboxHandle, WATCHDOG};
pub use types::{
    Decision, ExpectedSource, InMemoryFile, InputOutput, JudgeData, Payload, ProblemRef, Response,
    TestCase,
};

pub mod agent;
pub mod catalog;
pub mod compare;
pub mod error;
pub mod judge;
pub mod problems;
pub mod sandbox;
pub mod types;

#[cfg(test)]
mod docker_tests;

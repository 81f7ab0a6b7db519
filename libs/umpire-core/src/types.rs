use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, DuplexStream};

/// Reference to a catalog problem inside a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemRef {
    pub id: String,
}

/// One source file shipped with a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryFile {
    pub name: String,
    pub content: String,
}

/// A submission: source files plus the language tag, an optional problem
/// reference and the stdin the program will receive. This is both the HTTP
/// request body and the JSON object written to the sandbox's stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub language: String,
    pub files: Vec<InMemoryFile>,
    #[serde(default)]
    pub problem: Option<ProblemRef>,
    #[serde(default)]
    pub stdin: String,
}

/// An authored input/expected-output fixture pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputOutput {
    pub input: String,
    pub output: String,
}

/// Canonical solution plus the authoritative fixtures for one problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeData {
    pub solution: Payload,
    #[serde(default)]
    pub io: Vec<InputOutput>,
}

/// Where a test case's expected output comes from: an authored fixture, or a
/// live pipe fed by the canonical solution during a `run` call.
pub enum ExpectedSource {
    Buffered(String),
    Stream(DuplexStream),
}

impl ExpectedSource {
    pub fn into_reader(self) -> Box<dyn AsyncRead + Send + Unpin> {
        match self {
            ExpectedSource::Buffered(text) => Box::new(std::io::Cursor::new(text.into_bytes())),
            ExpectedSource::Stream(pipe) => Box::new(pipe),
        }
    }
}

/// One test case handed to the single-case judge. The input is materialized
/// eagerly so the sandbox receives all of stdin atomically.
pub struct TestCase {
    pub id: String,
    pub input: String,
    pub expected: ExpectedSource,
}

impl TestCase {
    pub fn buffered(id: impl Into<String>, input: impl Into<String>, expected: impl Into<String>) -> Self {
        TestCase {
            id: id.into(),
            input: input.into(),
            expected: ExpectedSource::Buffered(expected.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Pass,
    Fail,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Pass => write!(f, "pass"),
            Decision::Fail => write!(f, "fail"),
        }
    }
}

/// The verdict returned to callers of every facade operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: Decision,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

impl Response {
    pub fn pass() -> Self {
        Response {
            status: Decision::Pass,
            details: String::new(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn fail(details: impl Into<String>) -> Self {
        Response {
            status: Decision::Fail,
            details: details.into(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn with_output(mut self, stdout: String, stderr: String) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_decodes_documented_schema() {
        let raw = r#"{
            "problem": {"id": "problem-1"},
            "language": "cpp",
            "stdin": "hello\nhi\n",
            "files": [
                {"name": "main.cpp", "content": "int main() {}"}
            ]
        }"#;
        let payload: Payload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.language, "cpp");
        assert_eq!(payload.problem.as_ref().unwrap().id, "problem-1");
        assert_eq!(payload.stdin, "hello\nhi\n");
        assert_eq!(payload.files.len(), 1);
        assert_eq!(payload.files[0].name, "main.cpp");
    }

    #[test]
    fn payload_stdin_and_problem_are_optional() {
        let raw = r#"{"language": "python", "files": [{"name": "main.py", "content": "pass"}]}"#;
        let payload: Payload = serde_json::from_str(raw).unwrap();
        assert!(payload.problem.is_none());
        assert_eq!(payload.stdin, "");
    }

    #[test]
    fn judge_data_map_tolerates_extra_fields() {
        // Remote problem sources decorate entries with fields the judge does
        // not care about; decoding must not choke on them.
        let raw = r#"{
            "prob-1": {
                "title": "token lengths",
                "io": [
                    {"input": "hello\nhi\n", "output": "5\n2\n"},
                    {"input": "hi\nhello\n", "output": "2\n5\n"}
                ],
                "solution": {
                    "language": "cpp",
                    "files": [{"name": "main.cpp", "content": "..."}],
                    "stdin": ""
                }
            }
        }"#;
        let data: std::collections::HashMap<String, JudgeData> = serde_json::from_str(raw).unwrap();
        let entry = &data["prob-1"];
        assert_eq!(entry.io.len(), 2);
        assert_eq!(entry.solution.language, "cpp");
    }

    #[test]
    fn response_serializes_lowercase_status() {
        let ok = serde_json::to_value(Response::pass()).unwrap();
        assert_eq!(ok["status"], "pass");

        let bad = serde_json::to_value(Response::fail("mismatch at line 0")).unwrap();
        assert_eq!(bad["status"], "fail");
        assert_eq!(bad["details"], "mismatch at line 0");
    }

    #[tokio::test]
    async fn buffered_expected_reads_back_its_text() {
        use tokio::io::AsyncReadExt;
        let mut reader = ExpectedSource::Buffered("5\n2\n".into()).into_reader();
        let mut text = String::new();
        reader.read_to_string(&mut text).await.unwrap();
        assert_eq!(text, "5\n2\n");
    }
}

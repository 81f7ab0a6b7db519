use thiserror::Error;

pub type JudgeResult<T> = Result<T, JudgeError>;

/// Everything that can end a judgment early.
///
/// The first four variants are verdicts in their own right: the judge reports
/// them as `status=fail` with the display text as details. The transparent
/// wrappers at the bottom are raw system errors surfaced by the sandbox
/// driver; the judge classifies them into `Sandbox` before they reach a
/// caller.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("mismatch at line {line}: got {got:?}, expected {want:?}")]
    Mismatch {
        line: usize,
        got: String,
        want: String,
    },

    #[error("stderr error: {0}")]
    RuntimeError(String),

    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error("sandbox watchdog expired before the program finished")]
    Timeout,

    #[error("problem id '{0}' not found")]
    CatalogMiss(String),

    #[error("cancelled by parent")]
    Cancelled,

    #[error("case {id}: {source}")]
    Case {
        id: String,
        #[source]
        source: Box<JudgeError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl JudgeError {
    /// True when this failure is a cancellation cascade rather than a real
    /// verdict. The fan-out scheduler uses this to keep the first genuine
    /// failure instead of whichever sibling was torn down fastest.
    pub fn is_cancelled(&self) -> bool {
        match self {
            JudgeError::Cancelled => true,
            JudgeError::Case { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Collapse raw infrastructure errors into the `Sandbox` kind.
    ///
    /// Verdict-bearing variants pass through untouched.
    pub fn into_sandbox(self) -> JudgeError {
        match self {
            JudgeError::Io(err) => JudgeError::Sandbox(err.to_string()),
            JudgeError::Docker(err) => JudgeError::Sandbox(err.to_string()),
            JudgeError::Json(err) => JudgeError::Sandbox(err.to_string()),
            JudgeError::Http(err) => JudgeError::Sandbox(err.to_string()),
            other => other,
        }
    }

    /// Wrap a failure with the test case it came from.
    pub fn for_case(self, id: impl Into<String>) -> JudgeError {
        JudgeError::Case {
            id: id.into(),
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_display_names_both_sides() {
        let err = JudgeError::Mismatch {
            line: 0,
            got: "5".to_string(),
            want: "4".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("mismatch"));
        assert!(text.contains("\"5\""));
        assert!(text.contains("\"4\""));
    }

    #[test]
    fn cancellation_is_detected_through_case_wrapper() {
        assert!(JudgeError::Cancelled.is_cancelled());
        assert!(JudgeError::Cancelled.for_case("input1").is_cancelled());
        assert!(!JudgeError::Timeout.is_cancelled());
        assert!(!JudgeError::RuntimeError("oops".into()).for_case("x").is_cancelled());
    }

    #[test]
    fn infrastructure_errors_collapse_to_sandbox() {
        let io = JudgeError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(matches!(io.into_sandbox(), JudgeError::Sandbox(_)));

        let verdict = JudgeError::RuntimeError("oops".into());
        assert!(matches!(verdict.into_sandbox(), JudgeError::RuntimeError(_)));
    }

    #[test]
    fn case_wrapper_names_the_case() {
        let err = JudgeError::RuntimeError("oops".into()).for_case("input2");
        assert!(err.to_string().starts_with("case input2:"));
    }
}

use async_trait::async_trait;
use serde_json::Value;
use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

use super::{MatchError, Matcher};

/// Runs `<program> <args...> <image path>` once per match.
///
/// Standard output and standard error are collected in full and independently
/// until the child exits. There is no timeout: a child that never exits keeps
/// its caller waiting. Dropping the returned future does not kill the child.
#[derive(Debug, Clone)]
pub struct ProcessMatcher {
    program: OsString,
    args: Vec<OsString>,
}

impl ProcessMatcher {
    pub fn new(program: impl Into<OsString>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Human-readable form of the command line, without the image path
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Matcher for ProcessMatcher {
    async fn match_image(&self, path: &Path) -> Result<Value, MatchError> {
        tracing::debug!("Running matcher: {} {}", self.command_line(), path.display());

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .output()
            .await
            .map_err(MatchError::Spawn)?;

        interpret_output(output.status, &output.stdout, &output.stderr)
    }
}

/// Translate a finished child into a match result.
///
/// A non-zero (or missing) exit status wins over whatever was printed on
/// stdout; stdout is only parsed after a clean exit.
pub(crate) fn interpret_output(
    status: ExitStatus,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<Value, MatchError> {
    if !status.success() {
        let stderr = String::from_utf8_lossy(stderr).into_owned();
        return Err(match status.code() {
            Some(code) => MatchError::Exited { code, stderr },
            None => MatchError::Terminated { stderr },
        });
    }

    serde_json::from_slice(stdout).map_err(|_| MatchError::InvalidOutput {
        output: String::from_utf8_lossy(stdout).into_owned(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use std::os::unix::process::ExitStatusExt;

    /// A matcher that runs `script` under `sh`, with the image path as `$1`
    fn shell(script: &str) -> ProcessMatcher {
        ProcessMatcher::new(
            "sh",
            vec!["-c".into(), script.into(), "matcher".into()],
        )
    }

    #[test]
    fn test_interpret_success() {
        let result = interpret_output(ExitStatus::from_raw(0), b"{\"matches\": []}\n", b"");
        assert_eq!(result.unwrap(), json!({"matches": []}));
    }

    #[test]
    fn test_interpret_nonzero_ignores_stdout() {
        // wait status 1 << 8 encodes exit code 1
        let status = ExitStatus::from_raw(1 << 8);
        let err = interpret_output(status, b"[]", b"bad image").unwrap_err();
        match err {
            MatchError::Exited { code, stderr } => {
                assert_eq!(code, 1);
                assert_eq!(stderr, "bad image");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_interpret_signal() {
        // raw status 9 means killed by SIGKILL
        let err = interpret_output(ExitStatus::from_raw(9), b"", b"oom").unwrap_err();
        assert!(matches!(err, MatchError::Terminated { ref stderr } if stderr == "oom"));
    }

    #[test]
    fn test_interpret_invalid_json() {
        let err = interpret_output(ExitStatus::from_raw(0), b"not json", b"").unwrap_err();
        assert!(matches!(err, MatchError::InvalidOutput { ref output } if output == "not json"));
    }

    #[test]
    fn test_interpret_empty_stdout_is_invalid() {
        let err = interpret_output(ExitStatus::from_raw(0), b"", b"").unwrap_err();
        assert!(matches!(err, MatchError::InvalidOutput { ref output } if output.is_empty()));
    }

    #[tokio::test]
    async fn test_process_passes_path_as_last_argument() {
        let matcher = shell(r#"printf '{"path": "%s"}' "$1""#);
        let result = matcher
            .match_image(Path::new("/tmp/some image.jpg"))
            .await
            .unwrap();
        assert_eq!(result, json!({"path": "/tmp/some image.jpg"}));
    }

    #[tokio::test]
    async fn test_process_collects_both_streams() {
        let matcher = shell("printf 'progress' >&2; printf '[1, 2, 3]'");
        let result = matcher.match_image(Path::new("x.png")).await.unwrap();
        assert_eq!(result, json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_process_nonzero_exit() {
        let matcher = shell("printf 'bad image' >&2; exit 1");
        let err = matcher.match_image(Path::new("x.png")).await.unwrap_err();
        assert_eq!(err.to_string(), "Matcher exited with code 1");
        assert_eq!(err.details(), "bad image");
    }

    #[tokio::test]
    async fn test_process_invalid_output() {
        let matcher = shell("printf 'not json'");
        let err = matcher.match_image(Path::new("x.png")).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid JSON output from matcher");
        assert_eq!(err.details(), "not json");
    }

    #[tokio::test]
    async fn test_process_missing_program() {
        let matcher = ProcessMatcher::new("/nonexistent/matcher-binary", Vec::new());
        let err = matcher.match_image(Path::new("x.png")).await.unwrap_err();
        assert!(matches!(err, MatchError::Spawn(_)));
    }

    #[test]
    fn test_command_line() {
        let matcher = ProcessMatcher::new("python3", vec!["match.py".into(), "--top".into()]);
        assert_eq!(matcher.command_line(), "python3 match.py --top");
    }
}

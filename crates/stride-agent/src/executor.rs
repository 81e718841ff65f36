//! Isolated execution of agent-written plotting code

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default wall-clock limit for one execution
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(6);

/// Exit code the wrapper uses when the code never defined `fig`
const NO_FIGURE_EXIT_CODE: i32 = 3;

/// Operations rejected before any code runs
const BLOCKED_PATTERNS: &[&str] = &[
    r"open\s*\(",
    r"\.system\s*\(",
    r"\.popen\s*\(",
    r"subprocess\.call",
    r"subprocess\.run",
    r"__import__\s*\(",
    r"exec\s*\(",
    r"eval\s*\(",
];

static BLOCKED: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    BLOCKED_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(&format!("(?i){p}")).ok().map(|re| (*p, re)))
        .collect()
});

const PRELUDE: &str = r#"import sys
import warnings
warnings.filterwarnings("ignore")

def _stride_expose(module, alias, attr=None):
    try:
        mod = __import__(module, fromlist=[attr] if attr else [])
        globals()[alias] = getattr(mod, attr) if attr else mod
    except ImportError:
        pass

_stride_expose("plotly.graph_objects", "go")
_stride_expose("plotly.express", "px")
_stride_expose("plotly.subplots", "make_subplots", "make_subplots")
_stride_expose("plotly.figure_factory", "ff")
_stride_expose("pandas", "pd")
_stride_expose("numpy", "np")
_stride_expose("datetime", "datetime")
_stride_expose("json", "json")
_stride_expose("math", "math")
_stride_expose("statistics", "statistics")
_stride_expose("collections", "collections")
_stride_expose("re", "re")
del _stride_expose
"#;

const EPILOGUE: &str = r#"
import plotly.io as _stride_pio
if "fig" not in globals():
    sys.stderr.write("No variable named 'fig' was defined.")
    sys.exit(3)
print(_stride_pio.to_html(fig, include_plotlyjs="cdn", full_html=False))
"#;

/// Why an execution failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    /// Rejected by the static deny-list
    Blocked,
    /// The interpreter could not be started
    Spawn,
    /// Wall-clock limit exceeded
    Timeout,
    /// The code raised or exited non-zero
    Runtime,
    /// The code ran but produced no renderable figure
    Conversion,
}

/// Structured outcome of running plotting code. Failures are values, never panics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionResult {
    Success { html: String },
    Failure {
        kind: ExecutionErrorKind,
        message: String,
    },
}

impl ExecutionResult {
    pub fn failure(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }
}

/// Runs plotting code and returns a renderable artifact
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(&self, code: &str) -> ExecutionResult;
}

/// Check code against the deny-list. Returns the offending pattern.
pub fn validate_code(code: &str) -> std::result::Result<(), String> {
    match BLOCKED.iter().find(|(_, re)| re.is_match(code)) {
        Some((pattern, _)) => Err(format!("Blocked dangerous operation: {pattern}")),
        None => Ok(()),
    }
}

/// Strip the whitespace prefix shared by every non-blank line
fn dedent(code: &str) -> String {
    let indent = code
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    code.lines()
        .map(|l| l.get(indent..).unwrap_or_else(|| l.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn build_program(code: &str) -> String {
    format!("{PRELUDE}\n# ---- user code\n{}\n{EPILOGUE}", dedent(code))
}

/// Executes Python in a child interpreter with a cleared environment.
///
/// The program is fed through stdin; the child is killed if it outlives
/// the timeout.
pub struct SubprocessExecutor {
    python: String,
    timeout: Duration,
}

impl SubprocessExecutor {
    pub fn new(python: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python: python.into(),
            timeout,
        }
    }
}

#[async_trait]
impl CodeExecutor for SubprocessExecutor {
    async fn execute(&self, code: &str) -> ExecutionResult {
        if let Err(message) = validate_code(code) {
            tracing::warn!("{}", message);
            return ExecutionResult::failure(ExecutionErrorKind::Blocked, message);
        }

        let program = build_program(code);
        tracing::info!("Executing plotting code in subprocess");

        let mut child = match Command::new(&self.python)
            .arg("-")
            .env_clear()
            .env("PYTHONWARNINGS", "ignore")
            .current_dir(std::env::temp_dir())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                return ExecutionResult::failure(
                    ExecutionErrorKind::Spawn,
                    format!("Failed to start {}: {}", self.python, e),
                );
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(program.as_bytes()).await {
                return ExecutionResult::failure(
                    ExecutionErrorKind::Spawn,
                    format!("Failed to send code to interpreter: {e}"),
                );
            }
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return ExecutionResult::failure(
                    ExecutionErrorKind::Runtime,
                    format!("Execution failed: {e}"),
                );
            }
            Err(_) => {
                tracing::error!(
                    "Code execution timed out after {} seconds",
                    self.timeout.as_secs()
                );
                return ExecutionResult::failure(
                    ExecutionErrorKind::Timeout,
                    format!(
                        "Code execution timed out after {} seconds",
                        self.timeout.as_secs()
                    ),
                );
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let message = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            tracing::error!(
                code = ?output.status.code(),
                "Subprocess execution failed: {}",
                message
            );
            let kind = if output.status.code() == Some(NO_FIGURE_EXIT_CODE) {
                ExecutionErrorKind::Conversion
            } else {
                ExecutionErrorKind::Runtime
            };
            return ExecutionResult::failure(kind, message);
        }

        if stdout.trim().is_empty() {
            return ExecutionResult::failure(
                ExecutionErrorKind::Conversion,
                "No HTML output generated",
            );
        }

        ExecutionResult::Success {
            html: stdout.into_owned(),
        }
    }
}

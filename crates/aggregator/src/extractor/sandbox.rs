//! Isolated evaluation of untrusted script payloads.
//!
//! Each payload runs in a short-lived `anime-sandbox` child process that
//! builds a fresh ECMAScript context carrying only the language builtins;
//! there is no console, filesystem, network or timer binding to reach. The
//! child is killed at the deadline, so builtins the interpreter's own limits
//! never see (`Array.from`, `map`, `repeat`, ...) are bounded by wall time,
//! and its address space is capped by the runner.

use crate::error::{Error, Result};
use async_trait::async_trait;
use boa_engine::{Context, Source};
use shared::config::ExtractorConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// File name of the runner binary, without platform suffix
pub const RUNNER_NAME: &str = "anime-sandbox";

/// Longest error message read back from the runner
const MAX_ERROR_BYTES: u64 = 4 * 1024;

/// Something that turns script source into its completion value
#[async_trait]
pub trait ScriptEval: Send + Sync {
    async fn eval(&self, code: String) -> Result<String>;
}

/// Resource caps applied to each evaluation
#[derive(Debug, Clone, Copy)]
pub struct SandboxLimits {
    pub timeout: Duration,
    pub loop_iterations: u64,
    pub recursion: usize,
    pub max_script_bytes: usize,
    pub max_output_bytes: usize,
    /// Address space of the runner process; 0 leaves it uncapped
    pub memory_bytes: u64,
}

impl From<&ExtractorConfig> for SandboxLimits {
    fn from(config: &ExtractorConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.script_timeout_ms),
            loop_iterations: config.loop_iteration_limit,
            recursion: config.recursion_limit,
            max_script_bytes: config.max_script_bytes,
            max_output_bytes: config.max_output_bytes,
            memory_bytes: config.memory_limit_mb * 1024 * 1024,
        }
    }
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self::from(&ExtractorConfig::default())
    }
}

/// Evaluates scripts in a killable child process
#[derive(Debug, Clone)]
pub struct Sandbox {
    runner: PathBuf,
    limits: SandboxLimits,
}

impl Sandbox {
    pub fn new(runner: impl Into<PathBuf>, limits: SandboxLimits) -> Self {
        Self {
            runner: runner.into(),
            limits,
        }
    }

    pub fn from_config(config: &ExtractorConfig) -> Self {
        let runner = config.sandbox_runner.clone().unwrap_or_else(default_runner);
        Self::new(runner, SandboxLimits::from(config))
    }

    pub fn runner(&self) -> &Path {
        &self.runner
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.runner);
        command
            .arg("--loop-limit")
            .arg(self.limits.loop_iterations.to_string())
            .arg("--recursion-limit")
            .arg(self.limits.recursion.to_string())
            .arg("--memory-limit")
            .arg(self.limits.memory_bytes.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl ScriptEval for Sandbox {
    /// Evaluate `code` as a script and return its completion value as a string
    async fn eval(&self, code: String) -> Result<String> {
        let limits = self.limits;
        if code.len() > limits.max_script_bytes {
            warn!(bytes = code.len(), cap = limits.max_script_bytes, "Script payload too large");
            return Err(Error::Sandbox(format!(
                "script of {} bytes exceeds the {} byte cap",
                code.len(),
                limits.max_script_bytes
            )));
        }

        let mut child = self.command().spawn().map_err(|e| {
            Error::Sandbox(format!("failed to start {}: {e}", self.runner.display()))
        })?;

        let run = collect(&mut child, code, limits.max_output_bytes);
        let result = match tokio::time::timeout(limits.timeout, run).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = limits.timeout.as_millis(), "Script evaluation timed out");
                Err(Error::Sandbox(format!(
                    "evaluation exceeded {}ms",
                    limits.timeout.as_millis()
                )))
            }
        };

        if result.is_err() {
            // kill() also reaps the child
            if let Err(e) = child.kill().await {
                debug!(error = %e, "Runner already exited");
            }
        }

        result
    }
}

async fn collect(child: &mut Child, code: String, max_output: usize) -> Result<String> {
    let io_error = |e: std::io::Error| Error::Sandbox(format!("runner i/o failed: {e}"));

    let (Some(mut stdin), Some(stdout), Some(stderr)) =
        (child.stdin.take(), child.stdout.take(), child.stderr.take())
    else {
        return Err(Error::Sandbox("runner pipes unavailable".to_string()));
    };

    stdin.write_all(code.as_bytes()).await.map_err(io_error)?;
    drop(stdin);

    let mut output = Vec::new();
    stdout
        .take(max_output as u64 + 1)
        .read_to_end(&mut output)
        .await
        .map_err(io_error)?;
    if output.len() > max_output {
        warn!(cap = max_output, "Script output too large");
        return Err(Error::Sandbox(format!("output exceeds the {max_output} byte cap")));
    }

    let mut message = Vec::new();
    stderr
        .take(MAX_ERROR_BYTES)
        .read_to_end(&mut message)
        .await
        .map_err(io_error)?;

    let status = child.wait().await.map_err(io_error)?;
    if !status.success() {
        let message = String::from_utf8_lossy(&message).trim().to_string();
        return Err(Error::Sandbox(if message.is_empty() {
            format!("runner exited with {status}")
        } else {
            message
        }));
    }

    let output = String::from_utf8(output)
        .map_err(|e| Error::Sandbox(format!("runner output is not utf-8: {e}")))?;
    debug!(bytes = output.len(), "Script evaluated");
    Ok(output)
}

/// `anime-sandbox` next to the running executable, else whatever `PATH` finds
pub fn default_runner() -> PathBuf {
    let file_name = format!("{RUNNER_NAME}{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&file_name)))
        .filter(|path| path.is_file())
        .unwrap_or_else(|| PathBuf::from(file_name))
}

/// Evaluate `code` in a fresh context on the current thread.
///
/// This is what the runner executes. It has no wall-clock bound of its own.
pub fn evaluate(code: &str, loop_iterations: u64, recursion: usize) -> Result<String> {
    let mut context = Context::default();
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(loop_iterations);
    context.runtime_limits_mut().set_recursion_limit(recursion);

    let value = context
        .eval(Source::from_bytes(code.as_bytes()))
        .map_err(|e| Error::Sandbox(e.to_string()))?;

    let output = value
        .to_string(&mut context)
        .map_err(|e| Error::Sandbox(e.to_string()))?
        .to_std_string_escaped();

    Ok(output)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Runs [`evaluate`] on a blocking thread of the test process
    pub(crate) struct InlineEval;

    #[async_trait]
    impl ScriptEval for InlineEval {
        async fn eval(&self, code: String) -> Result<String> {
            tokio::task::spawn_blocking(move || evaluate(&code, 100_000, 64))
                .await
                .map_err(|e| Error::Sandbox(e.to_string()))?
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(code: &str) -> Result<String> {
        evaluate(code, 100_000, 64)
    }

    #[test]
    fn test_evaluate_returns_completion_value() {
        assert_eq!(eval("[1, 2, 3].map(n => n * 2).join(',')").unwrap(), "2,4,6");
    }

    #[test]
    fn test_no_host_bindings() {
        let out = eval(
            "[typeof require, typeof process, typeof fetch, typeof console, typeof setTimeout].join(' ')",
        )
        .unwrap();
        assert_eq!(out, "undefined undefined undefined undefined undefined");
    }

    #[test]
    fn test_thrown_error_is_contained() {
        let err = eval("throw new Error('boom')").unwrap_err();
        assert!(matches!(err, Error::Sandbox(ref msg) if msg.contains("boom")));
    }

    #[test]
    fn test_syntax_error_is_contained() {
        assert!(matches!(eval("function (").unwrap_err(), Error::Sandbox(_)));
    }

    #[test]
    fn test_loop_and_recursion_caps() {
        assert!(matches!(eval("while (true) {}").unwrap_err(), Error::Sandbox(_)));
        assert!(matches!(
            eval("function f(n) { return f(n + 1); } f(0)").unwrap_err(),
            Error::Sandbox(_)
        ));
    }

    #[test]
    fn test_limits_from_config() {
        let limits = SandboxLimits::from(&ExtractorConfig {
            script_timeout_ms: 250,
            memory_limit_mb: 2,
            ..Default::default()
        });
        assert_eq!(limits.timeout, Duration::from_millis(250));
        assert_eq!(limits.memory_bytes, 2 * 1024 * 1024);
        assert_eq!(limits.max_script_bytes, 256 * 1024);
    }

    #[test]
    fn test_configured_runner_wins() {
        let sandbox = Sandbox::from_config(&ExtractorConfig {
            sandbox_runner: Some(PathBuf::from("/opt/aggregator/anime-sandbox")),
            ..Default::default()
        });
        assert_eq!(sandbox.runner(), Path::new("/opt/aggregator/anime-sandbox"));
    }

    #[tokio::test]
    async fn test_oversized_script_rejected_before_spawn() {
        let sandbox = Sandbox::new(
            "/nonexistent/anime-sandbox",
            SandboxLimits {
                max_script_bytes: 16,
                ..Default::default()
            },
        );

        let err = sandbox.eval("'x'.repeat(1000) + 'padding'".into()).await.unwrap_err();
        assert!(matches!(err, Error::Sandbox(ref msg) if msg.contains("byte cap")));
    }

    #[tokio::test]
    async fn test_missing_runner_is_sandbox_error() {
        let sandbox = Sandbox::new("/nonexistent/anime-sandbox", SandboxLimits::default());

        let err = sandbox.eval("1 + 1".into()).await.unwrap_err();
        assert!(matches!(err, Error::Sandbox(ref msg) if msg.contains("failed to start")));
    }
}

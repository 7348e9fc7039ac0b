//! Runs scripts through the real `anime-sandbox` runner process.

use anime_aggregator::{Error, Sandbox, SandboxLimits, ScriptEval};
use std::time::{Duration, Instant};

const RUNNER: &str = env!("CARGO_BIN_EXE_anime-sandbox");

fn sandbox() -> Sandbox {
    Sandbox::new(
        RUNNER,
        SandboxLimits {
            timeout: Duration::from_secs(10),
            loop_iterations: 100_000,
            recursion: 64,
            ..SandboxLimits::default()
        },
    )
}

#[tokio::test]
async fn test_eval_returns_completion_value() {
    let out = sandbox()
        .eval("[1, 2, 3].map(n => n * 2).join(',')".into())
        .await
        .unwrap();
    assert_eq!(out, "2,4,6");
}

#[tokio::test]
async fn test_no_host_bindings() {
    let out = sandbox()
        .eval(
            "[typeof require, typeof process, typeof fetch, typeof console, typeof setTimeout].join(' ')"
                .into(),
        )
        .await
        .unwrap();
    assert_eq!(out, "undefined undefined undefined undefined undefined");
}

#[tokio::test]
async fn test_thrown_error_is_contained() {
    let err = sandbox()
        .eval("throw new Error('boom')".into())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Sandbox(ref msg) if msg.contains("boom")));
}

#[tokio::test]
async fn test_syntax_error_is_contained() {
    let err = sandbox().eval("function (".into()).await.unwrap_err();
    assert!(matches!(err, Error::Sandbox(_)));
}

#[tokio::test]
async fn test_infinite_loop_is_stopped() {
    let err = sandbox().eval("while (true) {}".into()).await.unwrap_err();
    assert!(matches!(err, Error::Sandbox(_)));
}

#[tokio::test]
async fn test_runaway_recursion_is_stopped() {
    let err = sandbox()
        .eval("function f(n) { return f(n + 1); } f(0)".into())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Sandbox(_)));
}

#[tokio::test]
async fn test_no_state_between_calls() {
    let sandbox = sandbox();
    let first = sandbox.eval("var leaked = 42; leaked".into()).await.unwrap();
    assert_eq!(first, "42");

    let second = sandbox.eval("typeof leaked".into()).await.unwrap();
    assert_eq!(second, "undefined");
}

#[tokio::test]
async fn test_output_over_cap_is_rejected() {
    let sandbox = Sandbox::new(
        RUNNER,
        SandboxLimits {
            max_output_bytes: 1024,
            ..SandboxLimits::default()
        },
    );

    let err = sandbox.eval("'x'.repeat(4096)".into()).await.unwrap_err();
    assert!(matches!(err, Error::Sandbox(ref msg) if msg.contains("byte cap")));

    let out = sandbox.eval("'x'.repeat(1024)".into()).await.unwrap();
    assert_eq!(out.len(), 1024);
}

#[cfg(unix)]
#[tokio::test]
async fn test_allocation_past_memory_cap_fails() {
    let sandbox = Sandbox::new(
        RUNNER,
        SandboxLimits {
            timeout: Duration::from_secs(30),
            memory_bytes: 256 * 1024 * 1024,
            ..SandboxLimits::default()
        },
    );

    let started = Instant::now();
    let err = sandbox
        .eval("'x'.repeat(2 ** 30).length".into())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Sandbox(_)));
    assert!(started.elapsed() < Duration::from_secs(30));
}

//! Deadline enforcement, kept in its own test binary so the only runner
//! processes this binary ever spawns are the ones under test.

use anime_aggregator::{Error, Sandbox, SandboxLimits, ScriptEval};
use std::time::{Duration, Instant};

const RUNNER: &str = env!("CARGO_BIN_EXE_anime-sandbox");

/// A billion callback invocations through builtins, with no loop statement
/// for the interpreter's iteration cap to count.
const BUILTIN_SPIN: &str = r#"
const xs = Array.from({ length: 1000 }, (_, i) => i);
xs.map(() => xs.map(() => xs.map(i => i).length).length).length
"#;

/// Live children of this process that are sandbox runners
#[cfg(target_os = "linux")]
fn live_runners() -> usize {
    let me = std::process::id().to_string();
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return 0;
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| std::fs::read_to_string(entry.path().join("stat")).ok())
        .filter(|stat| {
            // pid (comm) state ppid ...
            let Some((head, tail)) = stat.rsplit_once(") ") else {
                return false;
            };
            let comm = head.split_once(" (").map(|(_, comm)| comm).unwrap_or_default();
            let ppid = tail.split_whitespace().nth(1).unwrap_or_default();
            comm == "anime-sandbox" && ppid == me
        })
        .count()
}

#[tokio::test]
async fn test_builtin_heavy_payload_is_killed_at_deadline() {
    let sandbox = Sandbox::new(
        RUNNER,
        SandboxLimits {
            timeout: Duration::from_millis(300),
            loop_iterations: 1_000,
            recursion: 64,
            ..SandboxLimits::default()
        },
    );

    let started = Instant::now();
    let err = sandbox.eval(BUILTIN_SPIN.into()).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, Error::Sandbox(ref msg) if msg.contains("exceeded 300ms")));
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");

    // The runner is gone once eval returns, so it no longer holds a core.
    #[cfg(target_os = "linux")]
    assert_eq!(live_runners(), 0);
}

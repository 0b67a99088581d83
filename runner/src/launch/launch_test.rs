use super::{Invocation, LaunchError, Launcher, ProcessLauncher, Sink};
use std::{
    fs,
    time::{Duration, Instant},
};

fn shell(script: &str) -> Invocation {
    Invocation::new("/bin/sh").args(["-c", script])
}

#[test]
pub fn capture_collects_both_streams() {
    let output = ProcessLauncher
        .launch(&shell("echo out; echo err >&2").sink(Sink::Capture))
        .unwrap();

    assert!(output.success());
    assert_eq!(output.stdout, "out\n");
    assert_eq!(output.stderr, "err\n");
}

#[test]
pub fn nonzero_exit_is_not_an_error() {
    let output = ProcessLauncher.launch(&shell("exit 3")).unwrap();

    assert!(!output.success());
    assert_eq!(output.status, Some(3));
}

#[test]
pub fn missing_binary_fails_to_spawn() {
    let result = ProcessLauncher.launch(&Invocation::new("/nonexistent/rundb"));

    assert!(matches!(result, Err(LaunchError::Spawn { .. })));
}

#[test]
pub fn append_sink_keeps_previous_content() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("latency.log");
    fs::write(&log, "first\n").unwrap();

    ProcessLauncher
        .launch(&shell("echo second").sink(Sink::Append(log.clone())))
        .unwrap();

    assert_eq!(fs::read_to_string(&log).unwrap(), "first\nsecond\n");
}

#[test]
pub fn log_sink_truncates_and_merges_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("temp.out");
    fs::write(&log, "stale build output\n").unwrap();

    ProcessLauncher
        .launch(&shell("echo compiling; echo warning >&2").sink(Sink::Log(log.clone())))
        .unwrap();

    let content = fs::read_to_string(&log).unwrap();
    assert!(!content.contains("stale"));
    assert!(content.contains("compiling"));
    assert!(content.contains("warning"));
}

#[test]
pub fn timeout_kills_the_child() {
    let start = Instant::now();
    let result = ProcessLauncher.launch(
        &shell("echo started; exec sleep 5")
            .sink(Sink::Capture)
            .timeout(Some(Duration::from_millis(100))),
    );

    // returning early means the child was killed and both drains saw their pipe close
    assert!(matches!(result, Err(LaunchError::Timeout { .. })));
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[test]
pub fn timeout_leaves_appended_output_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("latency.log");

    let result = ProcessLauncher.launch(
        &shell("echo partial; exec sleep 5")
            .sink(Sink::Append(log.clone()))
            .timeout(Some(Duration::from_millis(200))),
    );

    assert!(matches!(result, Err(LaunchError::Timeout { .. })));
    assert_eq!(fs::read_to_string(&log).unwrap(), "partial\n");
}

#[test]
pub fn command_line_joins_arguments() {
    let invocation = Invocation::new("./rundb").args(["-o", "output.txt", "-t4"]);

    assert_eq!(invocation.command_line(), "./rundb -o output.txt -t4");
}

mod common;

use common::next_line;
use engine_bridge::{BridgeError, EngineProcess, LaunchCommand, ProcessState};
use std::time::Duration;

#[tokio::test]
async fn echo_line_then_none_after_eof() {
    let mut process = EngineProcess::start(LaunchCommand::new("echo").arg("hello"))
        .await
        .unwrap();

    // `echo` may already be gone here, so only the pid is checked up front.
    assert!(process.pid().is_some());
    assert_eq!(next_line(&mut process).await.unwrap().as_str(), "hello");
    assert_eq!(next_line(&mut process).await, None);
    assert!(process.read_line().is_none());

    let status = tokio::time::timeout(common::WAIT, process.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(status.success());
    assert_eq!(process.state(), ProcessState::Terminated);
}

#[tokio::test]
async fn live_engine_reports_running_until_it_exits() {
    let mut process = EngineProcess::start(
        LaunchCommand::new("sh").args(["-c", "echo hello; sleep 0.2"]),
    )
    .await
    .unwrap();

    assert_eq!(next_line(&mut process).await.unwrap().as_str(), "hello");
    assert_eq!(process.state(), ProcessState::Running);
    assert_eq!(next_line(&mut process).await, None);
    tokio::time::timeout(common::WAIT, process.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(process.state(), ProcessState::Terminated);
}

#[tokio::test]
async fn kill_handle_stops_engine_from_another_task() {
    let mut process = EngineProcess::start(LaunchCommand::new("sleep").arg("30"))
        .await
        .unwrap();
    let kill = process.kill_handle().unwrap();

    tokio::spawn(async move { kill.kill() }).await.unwrap();

    let status = tokio::time::timeout(common::WAIT, process.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(!status.success());
    assert_eq!(process.state(), ProcessState::Terminated);
}

#[tokio::test]
async fn missing_executable_is_spawn_error() {
    let err = EngineProcess::start(LaunchCommand::new("/nonexistent"))
        .await
        .unwrap_err();

    assert!(err.is_spawn());
    assert!(err.user_message().contains("not found"));
}

#[tokio::test]
async fn non_executable_file_is_spawn_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine");
    std::fs::write(&path, "not a program").unwrap();

    let err = EngineProcess::start(LaunchCommand::new(&path))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Spawn { .. }));
}

#[tokio::test]
async fn partial_line_is_joined_across_reads() {
    let mut process = EngineProcess::start(
        LaunchCommand::new("sh").args(["-c", "printf 'info dep'; sleep 0.2; printf 'th 3\\nbestmove e2e4'"]),
    )
    .await
    .unwrap();

    assert_eq!(next_line(&mut process).await.unwrap().as_str(), "info depth 3");
    // Unterminated tail is delivered at EOF, not dropped.
    assert_eq!(next_line(&mut process).await.unwrap().as_str(), "bestmove e2e4");
    assert_eq!(next_line(&mut process).await, None);
}

#[tokio::test]
async fn write_line_round_trip() {
    let mut process = EngineProcess::start(LaunchCommand::new("cat")).await.unwrap();

    process.write_line("uci").await.unwrap();
    process.write_line("isready").await.unwrap();

    assert_eq!(next_line(&mut process).await.unwrap().as_str(), "uci");
    assert_eq!(next_line(&mut process).await.unwrap().as_str(), "isready");

    process.terminate().await;
    assert_eq!(process.state(), ProcessState::Terminated);
}

#[tokio::test]
async fn write_after_exit_is_broken_pipe() {
    let mut process = EngineProcess::start(LaunchCommand::new("true")).await.unwrap();
    let status = process.wait().await.unwrap();

    assert!(status.success());
    assert_eq!(process.state(), ProcessState::Terminated);
    assert!(matches!(
        process.write_line("uci").await,
        Err(BridgeError::BrokenPipe(_))
    ));
}

#[tokio::test]
async fn terminate_is_idempotent() {
    let mut process = EngineProcess::start(LaunchCommand::new("sleep").arg("30"))
        .await
        .unwrap();

    process.terminate().await;
    process.terminate().await;

    assert_eq!(process.state(), ProcessState::Terminated);
    assert!(!process.is_running());
}

#[tokio::test]
async fn quit_lets_engine_exit_gracefully() {
    let mut process = EngineProcess::start(
        LaunchCommand::new("sh").args(["-c", "read line; echo \"got $line\""]),
    )
    .await
    .unwrap();

    process.quit(Duration::from_secs(5)).await.unwrap();

    assert_eq!(process.state(), ProcessState::Terminated);
    assert_eq!(next_line(&mut process).await.unwrap().as_str(), "got quit");
}

#[tokio::test]
async fn quit_kills_engine_that_ignores_it() {
    let mut process = EngineProcess::start(
        LaunchCommand::new("sh").args(["-c", "trap '' TERM; while :; do sleep 1; done"]),
    )
    .await
    .unwrap();

    process.quit(Duration::from_millis(100)).await.unwrap();
    assert_eq!(process.state(), ProcessState::Terminated);
}

#[tokio::test]
async fn environment_and_working_directory_are_applied() {
    let dir = tempfile::tempdir().unwrap();
    let mut process = EngineProcess::start(
        LaunchCommand::new("sh")
            .args(["-c", "echo \"$PICO_TEST\"; pwd"])
            .env("PICO_TEST", "board")
            .current_dir(dir.path()),
    )
    .await
    .unwrap();

    assert_eq!(next_line(&mut process).await.unwrap().as_str(), "board");
    let cwd = next_line(&mut process).await.unwrap();
    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(
        std::path::Path::new(cwd.as_str()).canonicalize().unwrap(),
        expected
    );
}

#[tokio::test]
async fn take_output_moves_the_stream() {
    let mut process = EngineProcess::start(LaunchCommand::new("echo").arg("moved"))
        .await
        .unwrap();
    let mut output = process.take_output().unwrap();

    assert!(process.read_line().is_none());
    assert_eq!(output.next_line().await.unwrap().as_str(), "moved");
    assert!(output.next_line().await.is_none());
    assert!(output.is_closed());
}

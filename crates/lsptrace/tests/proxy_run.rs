#![cfg(unix)]

use std::time::Duration;

use lsptrace::{LspTraceError, TraceProxy};
use tokio::time::timeout;

#[tokio::test]
async fn spawn_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = TraceProxy::builder(
        "/nonexistent/lsptrace-test-binary",
        dir.path().join("out.lsptrace"),
    )
    .build();

    let err = proxy.run().await.unwrap_err();
    assert!(matches!(err, LspTraceError::Spawn { .. }));
}

#[tokio::test]
async fn unopenable_trace_output_is_fatal() {
    let proxy = TraceProxy::builder("sh", "/nonexistent-dir/out.lsptrace").build();

    let err = proxy.run().await.unwrap_err();
    assert!(matches!(err, LspTraceError::TraceOpen { .. }));
}

#[tokio::test]
async fn server_exiting_before_the_handshake_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let trace_path = dir.path().join("out.lsptrace");
    let proxy = TraceProxy::builder("sh", &trace_path)
        .arg("-c")
        .arg("echo starting; echo '{\"notPipeName\":1}'; exit 3")
        .handle_named_pipes(true)
        .build();

    let err = timeout(Duration::from_secs(10), proxy.run())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, LspTraceError::HandshakeEof));
    assert!(trace_path.exists());
}

//! Upload and polling round trips against a real server

use std::sync::Arc;
use std::time::Duration;

use sftp_bridge::sftp::{Connector, RemoteSession};
use sftp_bridge::{PollOutcome, SftpBridge};

use super::fixtures::SftpTestEnvironment;

async fn clear_inbox(session: &dyn RemoteSession) {
    for entry in session.list_dir("/inbox").await.expect("list inbox") {
        if entry.is_file() {
            let _ = session.remove_file(&entry.path).await;
        }
    }
}

#[tokio::test]
async fn test_session_file_operations() {
    skip_if_no_docker!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SftpTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let session = env.connector().connect().await.expect("connect");
    clear_inbox(session.as_ref()).await;

    let source = env.work_dir.path().join("ops.bin");
    let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&source, &content).unwrap();

    let sent = session.upload(&source, "/inbox/ops.bin").await.expect("upload");
    assert_eq!(sent, content.len() as u64);

    let listing = session.list_dir("/inbox").await.expect("list");
    let entry = listing
        .iter()
        .find(|e| e.name == "ops.bin")
        .expect("uploaded file listed");
    assert!(entry.is_file());
    assert_eq!(entry.size, content.len() as u64);
    assert!(listing.iter().all(|e| e.name != "." && e.name != ".."));

    let target = env.work_dir.path().join("ops.copy");
    let received = session.download("/inbox/ops.bin", &target).await.expect("download");
    assert_eq!(received, content.len() as u64);
    assert_eq!(std::fs::read(&target).unwrap(), content);

    session.remove_file("/inbox/ops.bin").await.expect("remove");
    assert!(!session.exists("/inbox/ops.bin").await.expect("exists"));

    session.close().await;
}

#[tokio::test]
async fn test_missing_remote_file_is_transfer_error() {
    skip_if_no_docker!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SftpTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let session = env.connector().connect().await.expect("connect");

    let err = session
        .download("/inbox/does-not-exist.xxx", &env.work_dir.path().join("x"))
        .await
        .unwrap_err();

    assert!(!err.is_connection_level(), "got {:?}", err);
    assert!(session.is_healthy());
    session.close().await;
}

#[tokio::test]
async fn test_bridge_upload_then_poll() {
    skip_if_no_docker!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SftpTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    {
        let session = env.connector().connect().await.expect("connect");
        clear_inbox(session.as_ref()).await;
        session.close().await;
    }

    let bridge = SftpBridge::with_connector(&env.bridge_config("*.xxx"), Arc::new(env.connector()))
        .expect("bridge");

    let data = env.work_dir.path().join("data.xxx");
    let report = env.work_dir.path().join("report.csv");
    std::fs::write(&data, b"bridge payload").unwrap();
    std::fs::write(&report, b"a,b,c").unwrap();
    bridge.upload(&data).await.expect("upload data");
    bridge.upload(&report).await.expect("upload report");

    let outcome = bridge.poll_now().await.expect("poll");
    let PollOutcome::Completed(summary) = outcome else {
        panic!("poll skipped");
    };
    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.filtered_out, 1);
    assert_eq!(
        std::fs::read(env.local_dir().join("data.xxx")).unwrap(),
        b"bridge payload"
    );
    assert!(!env.local_dir().join("report.csv").exists());

    let session = env.connector().connect().await.expect("connect");
    assert!(!session.exists("/inbox/data.xxx").await.unwrap());
    assert!(session.exists("/inbox/report.csv").await.unwrap());
    clear_inbox(session.as_ref()).await;
    session.close().await;

    bridge.stop().await;
}

#[tokio::test]
async fn test_started_bridge_picks_up_new_files() {
    skip_if_no_docker!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SftpTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let seed = env.connector().connect().await.expect("connect");
    clear_inbox(seed.as_ref()).await;

    let bridge = SftpBridge::new(&env.bridge_config("*.xxx")).expect("bridge");
    let mut events = bridge.subscribe();
    bridge.start();

    let source = env.work_dir.path().join("late.xxx");
    std::fs::write(&source, b"late").unwrap();
    seed.upload(&source, "/inbox/late.xxx").await.expect("seed upload");

    let record = tokio::time::timeout(Duration::from_secs(15), events.recv())
        .await
        .expect("download within timeout")
        .expect("record");
    assert_eq!(record.filename, "late.xxx");

    bridge.stop().await;
    seed.close().await;
}

mod common;

use common::FakeRuntime;
use dockyard::config::StopConfig;
use dockyard::{ContainerSupervisor, ServiceDescriptor};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn quick_stop() -> StopConfig {
    StopConfig {
        settle: Duration::ZERO,
        ..StopConfig::default()
    }
}

#[tokio::test]
async fn test_cancel_during_create_discards_new_container() {
    let fake = FakeRuntime::new();
    fake.knobs.lock().container_create_delay = Some(Duration::from_millis(100));
    let supervisor = ContainerSupervisor::new(fake.clone(), "dockyard-net", quick_stop());
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let desc = ServiceDescriptor::new("alpine:3", "dockyard-slow", "slow");
    let err = supervisor.run(&token, &desc).await.unwrap_err();
    assert!(err.is_cancelled(), "got {:?}", err);

    // the create finished, then the container was thrown away unstarted
    assert_eq!(fake.count("create dockyard-slow"), 1);
    assert_eq!(fake.count("start dockyard-slow"), 0);
    assert!(fake.container_names().is_empty());
}

#[tokio::test]
async fn test_cancelled_token_creates_nothing() {
    let fake = FakeRuntime::new();
    let supervisor = ContainerSupervisor::new(fake.clone(), "dockyard-net", quick_stop());
    let token = CancellationToken::new();
    token.cancel();

    let desc = ServiceDescriptor::new("alpine:3", "dockyard-never", "never");
    assert!(supervisor.run(&token, &desc).await.unwrap_err().is_cancelled());
    assert_eq!(fake.count("create"), 0);
}

#[tokio::test]
async fn test_close_control_sends_eof_without_stop_request() {
    let fake = FakeRuntime::new();
    let supervisor = ContainerSupervisor::new(fake.clone(), "dockyard-net", quick_stop());
    let token = CancellationToken::new();
    let desc = ServiceDescriptor::new("alpine:3", "dockyard-cat", "cat");
    let (handle, _notice) = supervisor.run(&token, &desc).await.unwrap();

    handle.close_control().await.unwrap();
    handle.close_control().await.unwrap();
    assert_eq!(fake.count("detach dockyard-cat"), 1);
    assert_eq!(fake.count("stop dockyard-cat"), 0);
    assert!(!handle.is_stopped());

    // stop does not reopen or re-close the channel
    handle.stop().await.unwrap();
    assert_eq!(fake.count("detach dockyard-cat"), 1);
    assert_eq!(fake.count("stop dockyard-cat"), 1);
}

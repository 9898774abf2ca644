//! Heart-rate reconnection after an unsolicited link drop.

use super::mocks::MockLink;
use paceline::sensors::{ConnectionState, HeartRateConfig, HeartRateEvent, HeartRateManager};
use paceline::storage::database::{Database, SharedDatabase};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::broadcast;

fn manager() -> (HeartRateManager<MockLink>, SharedDatabase) {
    let db = Database::open_in_memory().unwrap().into_shared();
    let manager = HeartRateManager::new(MockLink::default(), db.clone(), HeartRateConfig::default());
    (manager, db)
}

fn drain(events: &mut broadcast::Receiver<HeartRateEvent>) -> Vec<HeartRateEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_thirty_attempts() {
    let (manager, _db) = manager();
    manager.set_active_workout(Some(1));
    manager.connect("strap").await.unwrap();
    manager.link().fail_connect.store(true, Ordering::SeqCst);
    let mut events = manager.subscribe();

    manager.link().drop_link();

    // Just short of the last attempt
    tokio::time::sleep(Duration::from_secs(295)).await;
    assert_eq!(manager.link().connects.load(Ordering::SeqCst), 1 + 29);
    assert!(manager.is_reconnecting());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(manager.link().connects.load(Ordering::SeqCst), 1 + 30);
    assert!(!manager.is_reconnecting());

    let events = drain(&mut events);
    let attempts: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            HeartRateEvent::Reconnecting { attempt } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, (1..=30).collect::<Vec<_>>());
    assert_eq!(events.last(), Some(&HeartRateEvent::ReconnectAbandoned));

    // Nothing further is scheduled
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(manager.link().connects.load(Ordering::SeqCst), 31);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_success_cancels_remaining_attempts() {
    let (manager, _db) = manager();
    manager.set_active_workout(Some(1));
    manager.connect("strap").await.unwrap();
    manager.link().fail_connect.store(true, Ordering::SeqCst);

    manager.link().drop_link();
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(manager.link().connects.load(Ordering::SeqCst), 3);

    // Monitor comes back in range before the third attempt
    manager.link().fail_connect.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(manager.link().connects.load(Ordering::SeqCst), 4);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(manager.link().connects.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_no_reconnection_without_active_workout() {
    let (manager, _db) = manager();
    manager.connect("strap").await.unwrap();

    manager.link().drop_link();
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert_eq!(manager.link().connects.load(Ordering::SeqCst), 1);
    assert!(!manager.is_reconnecting());
}

#[tokio::test(start_paused = true)]
async fn test_explicit_disconnect_does_not_reconnect() {
    let (manager, _db) = manager();
    manager.set_active_workout(Some(1));
    manager.connect("strap").await.unwrap();

    manager.disconnect().await;
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert_eq!(manager.link().connects.load(Ordering::SeqCst), 1);
    assert_eq!(manager.link().disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnection() {
    let (manager, _db) = manager();
    manager.set_active_workout(Some(1));
    manager.connect("strap").await.unwrap();
    manager.link().fail_connect.store(true, Ordering::SeqCst);

    manager.link().drop_link();
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(manager.link().connects.load(Ordering::SeqCst), 2);

    manager.disconnect().await;
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert_eq!(manager.link().connects.load(Ordering::SeqCst), 2);
    assert!(!manager.is_reconnecting());
}

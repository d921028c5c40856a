// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::job::JobId;
use std::time::Duration;

#[tokio::test]
async fn watched_mailbox_fires_and_is_rearmed_after_ack() {
    let (set, handle, mut handoff) = DemandSet::new(4);
    let run_task = tokio::spawn(set.run());

    let job = JobId::new();
    let key = ServiceKey { job, service: "echo".to_string() };
    let notify = Arc::new(Notify::new());
    handle.watch(key.clone(), notify.clone());

    notify.notify_one();
    let fired = handoff.recv().await.expect("handoff channel open");
    assert_eq!(fired.key, key);
    fired.ack();

    // Re-arm: a second notification on the same key fires again.
    notify.notify_one();
    let fired_again = tokio::time::timeout(Duration::from_secs(1), handoff.recv())
        .await
        .expect("did not time out")
        .expect("handoff channel open");
    assert_eq!(fired_again.key, key);
    fired_again.ack();

    handle.ignore(key);
    drop(handle);
    let _ = tokio::time::timeout(Duration::from_secs(1), run_task).await;
}

#[tokio::test]
async fn ignored_key_never_fires() {
    let (set, handle, mut handoff) = DemandSet::new(4);
    let _run_task = tokio::spawn(set.run());

    let job = JobId::new();
    let key = ServiceKey { job, service: "svc".to_string() };
    let notify = Arc::new(Notify::new());
    handle.watch(key.clone(), notify.clone());
    handle.ignore(key);

    notify.notify_one();
    let result = tokio::time::timeout(Duration::from_millis(100), handoff.recv()).await;
    assert!(result.is_err(), "no handoff should arrive for an ignored key");
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The demand loop: a dynamic set of watched mailboxes, observed without
//! draining them, handed off to the main loop one at a time.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use tokio::sync::{mpsc, oneshot, Notify};

use crate::job::JobId;

/// Identifies a watched service uniquely across the whole job tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub job: JobId,
    pub service: String,
}

enum DemandMsg {
    Add(ServiceKey, Arc<Notify>),
    Remove(ServiceKey),
}

/// Cheap, cloneable handle used by the main loop to register or unregister
/// interest in a service's mailbox. Mirrors the `watch`/`ignore` pair from
/// the service record's contract.
#[derive(Clone)]
pub struct DemandHandle {
    tx: mpsc::UnboundedSender<DemandMsg>,
}

impl DemandHandle {
    pub fn watch(&self, key: ServiceKey, notify: Arc<Notify>) {
        let _ = self.tx.send(DemandMsg::Add(key, notify));
    }

    pub fn ignore(&self, key: ServiceKey) {
        let _ = self.tx.send(DemandMsg::Remove(key));
    }
}

/// A fired service handed off to the main loop. The loop must drop the ack
/// sender (or explicitly send `()`) once it has acted on the handoff, which
/// is what lets the demand task re-arm that entry's wait.
pub struct Handoff {
    pub key: ServiceKey,
    ack: oneshot::Sender<()>,
}

impl Handoff {
    pub fn ack(self) {
        let _ = self.ack.send(());
    }
}

/// Owns the registration channel and runs the `select_all` loop. Construct
/// with [`DemandSet::new`], keep the returned [`DemandHandle`] for
/// registration and the handoff receiver for consuming fired services, and
/// spawn `run` as its own task.
pub struct DemandSet {
    registration: mpsc::UnboundedReceiver<DemandMsg>,
    handoff_tx: mpsc::Sender<Handoff>,
}

impl DemandSet {
    pub fn new(handoff_capacity: usize) -> (Self, DemandHandle, mpsc::Receiver<Handoff>) {
        let (tx, registration) = mpsc::unbounded_channel();
        let (handoff_tx, handoff_rx) = mpsc::channel(handoff_capacity);
        (Self { registration, handoff_tx }, DemandHandle { tx }, handoff_rx)
    }

    fn apply(active: &mut HashMap<ServiceKey, Arc<Notify>>, msg: DemandMsg) {
        match msg {
            DemandMsg::Add(key, notify) => {
                active.insert(key, notify);
            }
            DemandMsg::Remove(key) => {
                active.remove(&key);
            }
        }
    }

    /// Run until the registration channel closes (the daemon is shutting
    /// down). Every firing is handed to the main loop and acknowledged
    /// before that entry is watched again — this is what serializes access
    /// to the set without a mutex around it.
    pub async fn run(mut self) {
        let mut active: HashMap<ServiceKey, Arc<Notify>> = HashMap::new();
        loop {
            if active.is_empty() {
                match self.registration.recv().await {
                    Some(msg) => Self::apply(&mut active, msg),
                    None => return,
                }
                continue;
            }

            let watchers: Vec<BoxFuture<'static, ServiceKey>> = active
                .iter()
                .map(|(key, notify)| {
                    let key = key.clone();
                    let notify = Arc::clone(notify);
                    Box::pin(async move {
                        notify.notified().await;
                        key
                    }) as BoxFuture<'static, ServiceKey>
                })
                .collect();

            tokio::select! {
                msg = self.registration.recv() => {
                    match msg {
                        Some(msg) => Self::apply(&mut active, msg),
                        None => return,
                    }
                }
                (key, _, _) = future::select_all(watchers) => {
                    let (ack_tx, ack_rx) = oneshot::channel();
                    if self.handoff_tx.send(Handoff { key, ack: ack_tx }).await.is_ok() {
                        let _ = ack_rx.await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "demand_tests.rs"]
mod tests;

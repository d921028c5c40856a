// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rights registry: port names, mailboxes, and send/receive right handles.
//!
//! There is no literal kernel here — a "receive right" is the sole owner of a
//! [`Mailbox`], and a "send right" is a cheap, reference-counted handle to the
//! same mailbox. Reference counting and notification-on-drop come from `Arc`
//! and `Drop` rather than a kernel's port table, which is the idiomatic Rust
//! reading of "send rights are reference-counted by the kernel."

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Notify};

use crate::job::JobId;
use crate::notify::Notification;

/// A handle minted by [`RightsRegistry::allocate_recv`]. Stable for the
/// lifetime of the underlying mailbox; never reused while a right referring
/// to it is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortName(pub u64);

impl std::fmt::Display for PortName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// An opaque message queued on a mailbox. The registry never interprets the
/// payload; it only tracks occupancy for the demand loop.
#[derive(Debug, Clone)]
pub struct Message(pub Vec<u8>);

/// Who a registry entry belongs to, for privilege and lookup purposes.
#[derive(Debug, Clone)]
pub enum RegistryOwner {
    /// A named service's receive right, owned by a job.
    Service { job: JobId, name: String },
    /// A job's own bootstrap port (privileged or unprivileged).
    JobPort { job: JobId },
    /// The dedicated notification mailbox used by the dispatcher.
    Notify,
}

struct MailboxShared {
    queue: Mutex<VecDeque<Message>>,
    notify: Arc<Notify>,
    send_count: AtomicUsize,
    dead: AtomicBool,
}

impl MailboxShared {
    fn new(notify: Arc<Notify>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify,
            send_count: AtomicUsize::new(0),
            dead: AtomicBool::new(false),
        }
    }
}

/// The queue a receive right owns. Sending pushes a message and wakes any
/// task parked on the mailbox's notify handle; the demand loop only ever
/// peeks at occupancy, it never drains on the registry's behalf.
#[derive(Clone)]
pub struct Mailbox {
    shared: Arc<MailboxShared>,
}

impl Mailbox {
    fn new(notify: Arc<Notify>) -> Self {
        Self { shared: Arc::new(MailboxShared::new(notify)) }
    }

    pub fn push(&self, message: Message) {
        self.shared.queue.lock().push_back(message);
        self.shared.notify.notify_one();
    }

    pub fn pop(&self) -> Option<Message> {
        self.shared.queue.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn notify_handle(&self) -> Arc<Notify> {
        self.shared.notify.clone()
    }
}

/// Sole owner of a mailbox. Dropping it destroys the port: any outstanding
/// [`SendRight`]s become dead names and the registry entry is torn down.
pub struct ReceiveRight {
    name: PortName,
    mailbox: Mailbox,
    mailbox_notify: Arc<Notify>,
    notify_tx: mpsc::UnboundedSender<Notification>,
    armed: bool,
}

impl ReceiveRight {
    pub fn name(&self) -> PortName {
        self.name
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn notify_handle(&self) -> Arc<Notify> {
        self.mailbox_notify.clone()
    }

    /// Disarm so dropping this right does not fire `PortDestroyed`. Used
    /// when a service's receive right is handed off to the registry's
    /// bookkeeping rather than torn down (e.g. moved into a `ServiceRecord`
    /// that outlives this particular handle).
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ReceiveRight {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.mailbox.shared.dead.store(true, Ordering::SeqCst);
        let _ = self.notify_tx.send(Notification::PortDestroyed { name: self.name });
    }
}

struct SendRightInner {
    name: PortName,
    mailbox: Mailbox,
    notify_tx: mpsc::UnboundedSender<Notification>,
}

/// A reference-counted handle to a mailbox. Cloning is cheap; the last clone
/// to drop posts `NoSenders` (mailbox still alive) or `PortDeleted` (mailbox
/// already torn down) to the registry's notification channel.
pub struct SendRight {
    inner: Arc<SendRightInner>,
}

impl SendRight {
    fn new(name: PortName, mailbox: Mailbox, notify_tx: mpsc::UnboundedSender<Notification>) -> Self {
        mailbox.shared.send_count.fetch_add(1, Ordering::SeqCst);
        Self { inner: Arc::new(SendRightInner { name, mailbox, notify_tx }) }
    }

    pub fn name(&self) -> PortName {
        self.inner.name
    }

    pub fn send(&self, message: Message) {
        self.inner.mailbox.push(message);
    }

    pub fn is_dead(&self) -> bool {
        self.inner.mailbox.shared.dead.load(Ordering::SeqCst)
    }
}

impl Clone for SendRight {
    fn clone(&self) -> Self {
        self.inner.mailbox.shared.send_count.fetch_add(1, Ordering::SeqCst);
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl Drop for SendRight {
    fn drop(&mut self) {
        // Only the thread dropping the last live `Arc` should post, but
        // `send_count` tracks logical clones, not `Arc` strong count, since
        // `SendRight` handles can be cloned without going through the `Arc`
        // (e.g. rebuilt from storage). Decrement first, then check.
        let remaining = self.inner.mailbox.shared.send_count.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining != 0 {
            return;
        }
        let notification = if self.inner.mailbox.shared.dead.load(Ordering::SeqCst) {
            Notification::PortDeleted { name: self.inner.name }
        } else {
            Notification::NoSenders { name: self.inner.name }
        };
        let _ = self.inner.notify_tx.send(notification);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("port name {0} is not registered")]
    UnknownPort(PortName),
    #[error("port table exhausted")]
    TableExhausted,
    #[error("port name {0} already registered")]
    AlreadyRegistered(PortName),
}

struct RegistryEntry {
    owner: RegistryOwner,
    mailbox: Mailbox,
}

struct RegistryInner {
    entries: Vec<Option<RegistryEntry>>,
    free: Vec<u64>,
}

/// Flat, contiguous table of live ports, indexed directly by `PortName` —
/// not a hash map — so `lookup` is a single bounds-checked index plus a
/// match, no hashing or extra allocation on the hot path.
#[derive(Clone)]
pub struct RightsRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    notify_tx: mpsc::UnboundedSender<Notification>,
}

impl RightsRegistry {
    pub fn new(notify_tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner { entries: Vec::new(), free: Vec::new() })),
            notify_tx,
        }
    }

    /// Allocate a fresh mailbox and return the receive right that owns it.
    pub fn allocate_recv(&self, owner: RegistryOwner) -> ReceiveRight {
        let notify_handle = Arc::new(Notify::new());
        let mailbox = Mailbox::new(notify_handle.clone());
        let mut inner = self.inner.lock();
        let name = match inner.free.pop() {
            Some(reused) => reused,
            None => inner.entries.len() as u64,
        };
        let entry = RegistryEntry { owner, mailbox: mailbox.clone() };
        let idx = name as usize;
        if idx >= inner.entries.len() {
            inner.entries.resize_with(idx + 1, || None);
        }
        inner.entries[idx] = Some(entry);
        drop(inner);
        ReceiveRight {
            name: PortName(name),
            mailbox,
            mailbox_notify: notify_handle,
            notify_tx: self.notify_tx.clone(),
            armed: true,
        }
    }

    /// Mint a send right to an existing, still-registered port.
    pub fn insert_send(&self, name: PortName) -> Result<SendRight, RegistryError> {
        let inner = self.inner.lock();
        let entry = inner
            .entries
            .get(name.0 as usize)
            .and_then(|e| e.as_ref())
            .ok_or(RegistryError::UnknownPort(name))?;
        let mailbox = entry.mailbox.clone();
        drop(inner);
        Ok(SendRight::new(name, mailbox, self.notify_tx.clone()))
    }

    pub fn lookup_owner(&self, name: PortName) -> Option<RegistryOwner> {
        let inner = self.inner.lock();
        inner.entries.get(name.0 as usize).and_then(|e| e.as_ref()).map(|e| e.owner.clone())
    }

    pub fn notify_handle(&self, name: PortName) -> Option<Arc<Notify>> {
        let inner = self.inner.lock();
        inner.entries.get(name.0 as usize).and_then(|e| e.as_ref()).map(|e| e.mailbox.notify_handle())
    }

    /// Release the registry's bookkeeping for a destroyed port, returning
    /// its name to the free list for reuse.
    pub fn release(&self, name: PortName) {
        let mut inner = self.inner.lock();
        let idx = name.0 as usize;
        if idx < inner.entries.len() && inner.entries[idx].is_some() {
            inner.entries[idx] = None;
            inner.free.push(name.0);
        }
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "rights_tests.rs"]
mod tests;

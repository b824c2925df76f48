//! # Status Publisher
//!
//! Routes purchase status changes to the live connection watching that purchase.
//!
//! ## Admission
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  subscribe(purchase A) ──► slot A free?  ── yes ──► Subscription (A, 1) │
//! │                                          └─ no ───► LimitReached       │
//! │                                                                         │
//! │  publish(A, confirmed) ──► clone sender under lock, send outside it    │
//! │                                                                         │
//! │  drop(Subscription (A, 1)) ──► remove slot A only if token is still 1  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use boxoffice_core::PurchaseStatus;

use crate::error::PublishError;

/// Per-subscription buffer. Status changes are rare, a purchase has at most four.
const CHANNEL_CAPACITY: usize = 16;

struct Slot {
    token: u64,
    tx: mpsc::Sender<PurchaseStatus>,
}

#[derive(Default)]
struct Inner {
    slots: Mutex<HashMap<Uuid, Slot>>,
    next_token: AtomicU64,
}

/// Fan-out point between the purchase pipeline and live connections.
///
/// Cheap to clone; all clones share the same subscriptions.
#[derive(Clone, Default)]
pub struct StatusPublisher {
    inner: Arc<Inner>,
}

impl StatusPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<Uuid, Slot>> {
        self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the single live slot for `purchase_id`.
    ///
    /// ## Errors
    /// * `PublishError::LimitReached` - another connection already holds it
    pub fn subscribe(&self, purchase_id: Uuid) -> Result<Subscription, PublishError> {
        let mut slots = self.slots();
        if slots.contains_key(&purchase_id) {
            debug!(purchase_id = %purchase_id, "Live slot already taken");
            return Err(PublishError::LimitReached { purchase_id });
        }

        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        slots.insert(purchase_id, Slot { token, tx });
        debug!(purchase_id = %purchase_id, token, "Live slot claimed");

        Ok(Subscription {
            purchase_id,
            token,
            rx,
            publisher: self.clone(),
        })
    }

    /// Delivers `status` to the subscriber of `purchase_id`, if any.
    ///
    /// Returns true if a subscriber received it.
    pub fn publish(&self, purchase_id: Uuid, status: PurchaseStatus) -> bool {
        let tx = match self.slots().get(&purchase_id) {
            Some(slot) => slot.tx.clone(),
            None => {
                trace!(purchase_id = %purchase_id, status = %status, "No live subscriber");
                return false;
            }
        };

        match tx.try_send(status) {
            Ok(()) => true,
            Err(e) => {
                debug!(purchase_id = %purchase_id, error = %e, "Live update dropped");
                false
            }
        }
    }

    pub fn is_subscribed(&self, purchase_id: Uuid) -> bool {
        self.slots().contains_key(&purchase_id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.slots().len()
    }

    fn release(&self, purchase_id: Uuid, token: u64) {
        let mut slots = self.slots();
        if slots.get(&purchase_id).is_some_and(|slot| slot.token == token) {
            slots.remove(&purchase_id);
            debug!(purchase_id = %purchase_id, token, "Live slot released");
        }
    }
}

/// The receiving end of a live slot. Releases the slot on drop.
pub struct Subscription {
    purchase_id: Uuid,
    token: u64,
    rx: mpsc::Receiver<PurchaseStatus>,
    publisher: StatusPublisher,
}

impl Subscription {
    pub fn purchase_id(&self) -> Uuid {
        self.purchase_id
    }

    /// Waits for the next status change.
    pub async fn recv(&mut self) -> Option<PurchaseStatus> {
        self.rx.recv().await
    }

    /// Returns a queued status change without waiting.
    pub fn try_recv(&mut self) -> Option<PurchaseStatus> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.publisher.release(self.purchase_id, self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_single_subscriber_per_purchase() {
        let publisher = StatusPublisher::new();
        let id = Uuid::new_v4();

        let first = publisher.subscribe(id).unwrap();
        assert_eq!(
            publisher.subscribe(id).err(),
            Some(PublishError::LimitReached { purchase_id: id })
        );
        assert!(publisher.subscribe(Uuid::new_v4()).is_ok());

        drop(first);
        assert!(publisher.subscribe(id).is_ok());
    }

    #[tokio::test]
    async fn test_publish_reaches_only_its_purchase() {
        let publisher = StatusPublisher::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut sub_a = publisher.subscribe(a).unwrap();
        let _sub_b = publisher.subscribe(b).unwrap();

        assert!(publisher.publish(a, PurchaseStatus::Confirmed));
        assert_eq!(sub_a.recv().await, Some(PurchaseStatus::Confirmed));
        assert!(!publisher.publish(Uuid::new_v4(), PurchaseStatus::Failed));
    }

    #[tokio::test]
    async fn test_stale_release_keeps_new_slot() {
        let publisher = StatusPublisher::new();
        let id = Uuid::new_v4();

        let old = publisher.subscribe(id).unwrap();
        let old_token = old.token;
        drop(old);
        let mut new = publisher.subscribe(id).unwrap();

        // A late release for the old token must not evict the new subscriber
        publisher.release(id, old_token);
        assert!(publisher.is_subscribed(id));
        assert!(publisher.publish(id, PurchaseStatus::Cancelled));
        assert_eq!(new.recv().await, Some(PurchaseStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_concurrent_subscribe_admits_exactly_one() {
        let publisher = StatusPublisher::new();
        let id = Uuid::new_v4();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let publisher = publisher.clone();
                tokio::spawn(async move { publisher.subscribe(id).ok() })
            })
            .collect();

        let mut admitted = Vec::new();
        for handle in handles {
            if let Some(sub) = handle.await.unwrap() {
                admitted.push(sub);
            }
        }
        assert_eq!(admitted.len(), 1);
        assert_eq!(publisher.subscriber_count(), 1);
    }
}

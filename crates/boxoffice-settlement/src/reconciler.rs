//! # Reconciliation Loop
//!
//! Polls the gateway for a pending card-terminal purchase until it settles.
//!
//! ## Loop Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Reconciliation Loop (per purchase)                   │
//! │                                                                         │
//! │  start(id) ── registry says already running? ──► no-op                 │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  every poll_interval:                                                   │
//! │     reload purchase ── terminal? ──► publish, stop                      │
//! │     older than pending_timeout? ──► fail, stop                          │
//! │     query_charge_status(ref)                                            │
//! │        PENDING ──────────► keep polling                                 │
//! │        SUCCESSFUL ───────► finalize, stop                               │
//! │        FAILED ───────────► fail, stop                                   │
//! │        CANCELED ─────────► cancel, stop                                 │
//! │        unknown status ───► warn, keep polling                           │
//! │        NotFound ─────────► fail, stop                                   │
//! │        other error ──────► warn, keep polling                           │
//! │                                                                         │
//! │  The registry entry is released when the task ends, however it ends.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use boxoffice_core::{PaymentMethod, Purchase, PurchaseStatus};

use crate::error::{SettlementError, SettlementResult};
use crate::gateway::{ChargeSnapshot, ChargeStatus, GatewayError, PaymentGateway};
use crate::registry::{LoopLease, LoopRegistry};
use crate::service::PurchaseService;

/// Outcome of one reconciliation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Still waiting on the gateway.
    Pending,
    /// The purchase reached this terminal status.
    Settled(PurchaseStatus),
}

/// Starts and drives reconciliation loops.
#[derive(Clone)]
pub struct Reconciler {
    service: PurchaseService,
    gateway: Arc<dyn PaymentGateway>,
    registry: Arc<dyn LoopRegistry>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Reconciler {
    pub fn new(
        service: PurchaseService,
        gateway: Arc<dyn PaymentGateway>,
        registry: Arc<dyn LoopRegistry>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Reconciler {
            service,
            gateway,
            registry,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn registry(&self) -> &Arc<dyn LoopRegistry> {
        &self.registry
    }

    /// Spawns the loop for `purchase_id` unless one is already running.
    ///
    /// Registration happens before this returns, so two calls in a row
    /// start exactly one loop.
    pub fn start(&self, purchase_id: Uuid) -> Option<JoinHandle<()>> {
        // Subscribed before the check so a concurrent shutdown is still seen
        let shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            debug!(purchase_id = %purchase_id, "Shutting down, loop not started");
            return None;
        }

        let Some(lease) = LoopLease::acquire(&self.registry, purchase_id) else {
            debug!(purchase_id = %purchase_id, "Reconciliation loop already running");
            return None;
        };

        let this = self.clone();
        Some(tokio::spawn(async move { this.run(lease, shutdown).await }))
    }

    /// Starts loops for every pending purchase whose charge was started.
    ///
    /// Returns how many loops were started.
    pub async fn resume_pending(&self) -> SettlementResult<usize> {
        let pending = self.service.pending_with_charge().await?;
        let started = pending
            .iter()
            .filter(|purchase| self.start(purchase.id).is_some())
            .count();

        info!(found = pending.len(), started, "Resumed pending reconciliations");
        Ok(started)
    }

    /// Stops every running loop after its current step.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        info!(active = self.registry.active_count(), "Reconciliation shutdown requested");
    }

    async fn run(self, lease: LoopLease, mut shutdown: watch::Receiver<bool>) {
        let purchase_id = lease.purchase_id();
        let mut ticker = interval(self.service.options().poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(purchase_id = %purchase_id, "Reconciliation loop started");

        loop {
            if *shutdown.borrow_and_update() {
                info!(purchase_id = %purchase_id, "Reconciliation loop stopped");
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    info!(purchase_id = %purchase_id, "Reconciliation loop stopped");
                    break;
                }
            }

            match self.reconcile_once(purchase_id).await {
                Ok(Reconciliation::Pending) => {}
                Ok(Reconciliation::Settled(status)) => {
                    info!(purchase_id = %purchase_id, status = %status, "Reconciliation finished");
                    break;
                }
                Err(e @ SettlementError::NotFound { .. })
                | Err(e @ SettlementError::NotReconcilable { .. }) => {
                    error!(purchase_id = %purchase_id, error = %e, "Reconciliation abandoned");
                    break;
                }
                Err(e) => {
                    warn!(purchase_id = %purchase_id, error = %e, "Reconciliation step failed, retrying");
                }
            }
        }

        drop(lease);
    }

    /// One poll: reload the purchase, ask the gateway, apply the answer.
    pub async fn reconcile_once(&self, purchase_id: Uuid) -> SettlementResult<Reconciliation> {
        let purchase = self.service.get_purchase(purchase_id).await?;
        ensure_reconcilable(&purchase)?;

        if purchase.status.is_terminal() {
            // Settled elsewhere (gateway event, operator)
            self.service.publisher().publish(purchase.id, purchase.status);
            return Ok(Reconciliation::Settled(purchase.status));
        }

        if let Some(timeout) = self.service.options().pending_timeout {
            if Utc::now() - purchase.created_at > timeout {
                warn!(purchase_id = %purchase_id, "Pending purchase timed out");
                let failed = self.service.fail_purchase(purchase_id).await?;
                return Ok(Reconciliation::Settled(failed.status));
            }
        }

        let Some(charge_ref) = purchase.gateway_charge_ref.as_deref() else {
            debug!(purchase_id = %purchase_id, "No charge attached yet");
            return Ok(Reconciliation::Pending);
        };

        match self.gateway.query_charge_status(charge_ref).await {
            Ok(snapshot) => self.apply_charge_status(&purchase, snapshot).await,
            Err(GatewayError::NotFound(_)) => {
                warn!(purchase_id = %purchase_id, charge_ref, "Gateway does not know the charge");
                let failed = self.service.fail_purchase(purchase_id).await?;
                Ok(Reconciliation::Settled(failed.status))
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(purchase_id = %purchase_id, error = %e, "Gateway unavailable, will retry");
                } else {
                    error!(purchase_id = %purchase_id, error = %e, "Gateway query failed, will retry");
                }
                Ok(Reconciliation::Pending)
            }
        }
    }

    /// Maps a gateway answer onto the purchase.
    pub async fn apply_charge_status(
        &self,
        purchase: &Purchase,
        snapshot: ChargeSnapshot,
    ) -> SettlementResult<Reconciliation> {
        let settled = match snapshot.status {
            ChargeStatus::Pending => return Ok(Reconciliation::Pending),
            ChargeStatus::Unknown(raw) => {
                warn!(purchase_id = %purchase.id, status = %raw, "Unrecognised gateway status, still polling");
                return Ok(Reconciliation::Pending);
            }
            ChargeStatus::Successful => {
                if let Some(transaction_ref) = snapshot.transaction_ref.as_deref() {
                    self.service
                        .record_transaction_ref(purchase.id, transaction_ref)
                        .await?;
                }
                self.service.finalize_purchase(purchase.id).await?
            }
            ChargeStatus::Failed => self.service.fail_purchase(purchase.id).await?,
            ChargeStatus::Canceled => self.service.cancel_purchase(purchase.id).await?,
        };

        Ok(Reconciliation::Settled(settled.status))
    }

    /// Applies a status pushed by the gateway instead of polled.
    ///
    /// Safe to race with a running loop: whichever applies first wins.
    pub async fn apply_gateway_event(
        &self,
        charge_ref: &str,
        snapshot: ChargeSnapshot,
    ) -> SettlementResult<Purchase> {
        let purchase = self.service.find_by_charge_ref(charge_ref).await?;
        ensure_reconcilable(&purchase)?;

        if purchase.status.is_terminal() {
            debug!(purchase_id = %purchase.id, status = %purchase.status, "Gateway event for settled purchase");
            return Ok(purchase);
        }

        info!(purchase_id = %purchase.id, charge_ref, status = %snapshot.status, "Gateway event received");
        self.apply_charge_status(&purchase, snapshot).await?;
        self.service.get_purchase(purchase.id).await
    }

    /// Poll interval currently in effect.
    pub fn poll_interval(&self) -> Duration {
        self.service.options().poll_interval
    }
}

fn ensure_reconcilable(purchase: &Purchase) -> SettlementResult<()> {
    if purchase.payment_method != PaymentMethod::CardTerminal {
        return Err(SettlementError::NotReconcilable {
            purchase_id: purchase.id,
            method: purchase.payment_method,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ChargeRequest, MockGateway};
    use crate::notify::TracingNotifier;
    use crate::publisher::StatusPublisher;
    use crate::registry::InMemoryLoopRegistry;
    use crate::service::SettlementOptions;
    use crate::testing::{cart, check_in, Fixture};

    struct Harness {
        fx: Fixture,
        service: PurchaseService,
        gateway: Arc<MockGateway>,
        reconciler: Reconciler,
    }

    async fn harness(options: SettlementOptions) -> Harness {
        let fx = Fixture::new().await;
        let service = PurchaseService::new(
            fx.db.clone(),
            StatusPublisher::new(),
            Arc::new(TracingNotifier),
            options,
        );
        let gateway = Arc::new(MockGateway::new());
        let reconciler = Reconciler::new(
            service.clone(),
            gateway.clone(),
            Arc::new(InMemoryLoopRegistry::new()),
        );
        Harness {
            fx,
            service,
            gateway,
            reconciler,
        }
    }

    fn fast() -> SettlementOptions {
        SettlementOptions {
            poll_interval: Duration::from_millis(10),
            ..SettlementOptions::default()
        }
    }

    impl Harness {
        /// A pending purchase with a started charge, claiming `guests[0]`.
        async fn pending_charge(&self) -> (Purchase, String) {
            let purchase = self
                .service
                .create_pending_purchase(
                    cart(&self.fx, PaymentMethod::CardTerminal, 1, vec![check_in(self.fx.guests[0], 1)]),
                    &self.fx.operator,
                )
                .await
                .unwrap();

            let charge_ref = self
                .gateway
                .begin_charge(&ChargeRequest {
                    terminal_id: "rdr_test".to_string(),
                    amount: purchase.total_gross_price,
                    currency: "EUR".to_string(),
                    description: "test".to_string(),
                    purchase_ref: purchase.id,
                })
                .await
                .unwrap();
            let purchase = self
                .service
                .attach_charge(purchase.id, &charge_ref, "rdr_test")
                .await
                .unwrap();
            (purchase, charge_ref)
        }
    }

    async fn finish(handle: JoinHandle<()>) {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not finish")
            .unwrap();
    }

    #[tokio::test]
    async fn test_successful_charge_confirms_and_publishes_once() {
        let h = harness(fast()).await;
        let (purchase, charge) = h.pending_charge().await;
        let mut live = h.service.publisher().subscribe(purchase.id).unwrap();

        h.gateway.push_status(&charge, ChargeSnapshot::new(ChargeStatus::Pending));
        h.gateway.push_status(&charge, ChargeSnapshot::new(ChargeStatus::Pending));
        h.gateway.push_status(
            &charge,
            ChargeSnapshot::new(ChargeStatus::Successful).with_transaction_ref("txn_1"),
        );

        finish(h.reconciler.start(purchase.id).unwrap()).await;

        let settled = h.service.get_purchase(purchase.id).await.unwrap();
        assert_eq!(settled.status, PurchaseStatus::Confirmed);
        assert_eq!(settled.gateway_transaction_ref.as_deref(), Some("txn_1"));
        assert_eq!(live.recv().await, Some(PurchaseStatus::Confirmed));
        assert_eq!(live.try_recv(), None);
        assert_eq!(h.gateway.query_count(&charge), 3);
        assert_eq!(h.reconciler.registry().active_count(), 0);
    }

    #[tokio::test]
    async fn test_second_start_is_a_no_op() {
        let h = harness(fast()).await;
        let (purchase, charge) = h.pending_charge().await;

        let first = h.reconciler.start(purchase.id).unwrap();
        assert!(h.reconciler.start(purchase.id).is_none());
        assert!(h.reconciler.clone().start(purchase.id).is_none());
        assert_eq!(h.reconciler.registry().active_count(), 1);

        h.gateway.set_status(&charge, ChargeSnapshot::new(ChargeStatus::Failed));
        finish(first).await;

        assert!(!h.reconciler.registry().is_registered(purchase.id));
        assert_eq!(
            h.service.get_purchase(purchase.id).await.unwrap().status,
            PurchaseStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_failed_and_cancelled_release_guests() {
        for (gateway_status, expected) in [
            (ChargeStatus::Failed, PurchaseStatus::Failed),
            (ChargeStatus::Canceled, PurchaseStatus::Cancelled),
        ] {
            let h = harness(fast()).await;
            let (purchase, charge) = h.pending_charge().await;
            h.gateway.set_status(&charge, ChargeSnapshot::new(gateway_status));

            finish(h.reconciler.start(purchase.id).unwrap()).await;

            assert_eq!(h.service.get_purchase(purchase.id).await.unwrap().status, expected);
            let guest = h.fx.db.guests().get_by_id(h.fx.guests[0]).await.unwrap().unwrap();
            assert!(!guest.has_attended());
            assert!(guest.purchase_id.is_none());
        }
    }

    #[tokio::test]
    async fn test_unknown_charge_fails_purchase() {
        let h = harness(fast()).await;
        let (purchase, charge) = h.pending_charge().await;
        h.gateway.set_status(&charge, ChargeSnapshot::new(ChargeStatus::Pending));
        h.gateway.push_error(&charge, GatewayError::NotFound(charge.clone()));

        finish(h.reconciler.start(purchase.id).unwrap()).await;

        assert_eq!(
            h.service.get_purchase(purchase.id).await.unwrap().status,
            PurchaseStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_transient_errors_keep_polling() {
        let h = harness(fast()).await;
        let (purchase, charge) = h.pending_charge().await;
        h.gateway.push_error(&charge, GatewayError::RateLimited);
        h.gateway.push_error(&charge, GatewayError::Transport("reset".into()));
        h.gateway.push_status(&charge, ChargeSnapshot::new(ChargeStatus::Unknown("REVIEW".into())));
        h.gateway.push_error(&charge, GatewayError::Upstream {
            status: 502,
            message: String::new(),
        });
        h.gateway.push_status(&charge, ChargeSnapshot::new(ChargeStatus::Successful));

        finish(h.reconciler.start(purchase.id).unwrap()).await;

        assert_eq!(
            h.service.get_purchase(purchase.id).await.unwrap().status,
            PurchaseStatus::Confirmed
        );
        assert_eq!(h.gateway.query_count(&charge), 5);
    }

    #[tokio::test]
    async fn test_gateway_event_wins_over_running_loop() {
        let h = harness(fast()).await;
        let (purchase, charge) = h.pending_charge().await;
        let handle = h.reconciler.start(purchase.id).unwrap();

        let applied = h
            .reconciler
            .apply_gateway_event(&charge, ChargeSnapshot::new(ChargeStatus::Canceled))
            .await
            .unwrap();
        assert_eq!(applied.status, PurchaseStatus::Cancelled);

        // A late poll answer cannot overturn the first outcome
        h.gateway.set_status(&charge, ChargeSnapshot::new(ChargeStatus::Successful));
        finish(handle).await;
        assert_eq!(
            h.service.get_purchase(purchase.id).await.unwrap().status,
            PurchaseStatus::Cancelled
        );

        let repeat = h
            .reconciler
            .apply_gateway_event(&charge, ChargeSnapshot::new(ChargeStatus::Successful))
            .await
            .unwrap();
        assert_eq!(repeat.status, PurchaseStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_pending_timeout_fails_purchase() {
        let h = harness(SettlementOptions {
            pending_timeout: Some(chrono::Duration::zero()),
            ..fast()
        })
        .await;
        let (purchase, _) = h.pending_charge().await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        finish(h.reconciler.start(purchase.id).unwrap()).await;
        assert_eq!(
            h.service.get_purchase(purchase.id).await.unwrap().status,
            PurchaseStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_resume_pending_and_shutdown() {
        let h = harness(fast()).await;
        let (purchase, _) = h.pending_charge().await;

        assert_eq!(h.reconciler.resume_pending().await.unwrap(), 1);
        assert_eq!(h.reconciler.resume_pending().await.unwrap(), 0);
        assert!(h.reconciler.registry().is_registered(purchase.id));

        h.reconciler.shutdown();
        tokio::time::timeout(Duration::from_secs(5), async {
            while h.reconciler.registry().active_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(h.reconciler.start(purchase.id).is_none());
        assert_eq!(
            h.service.get_purchase(purchase.id).await.unwrap().status,
            PurchaseStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_shutdown_right_after_start_stops_loop() {
        let h = harness(fast()).await;
        let (purchase, charge) = h.pending_charge().await;

        // The spawned task has not run yet when shutdown is requested
        let handle = h.reconciler.start(purchase.id).unwrap();
        h.reconciler.shutdown();
        finish(handle).await;

        assert_eq!(h.gateway.query_count(&charge), 0);
        assert_eq!(h.reconciler.registry().active_count(), 0);
        assert_eq!(
            h.service.get_purchase(purchase.id).await.unwrap().status,
            PurchaseStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_counter_purchases_are_not_reconciled() {
        let h = harness(fast()).await;
        let purchase = h
            .service
            .create_confirmed_purchase(cart(&h.fx, PaymentMethod::Cash, 1, vec![]), &h.fx.operator)
            .await
            .unwrap();

        assert!(matches!(
            h.reconciler.reconcile_once(purchase.id).await,
            Err(SettlementError::NotReconcilable { .. })
        ));
    }
}

//! # Purchase Service
//!
//! Validates carts, writes purchases, and owns every status transition.
//!
//! ## Create Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Cart (client claims)                                                   │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  validate_cart ─────────► shape, quantities, duplicates                 │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  price_cart ────────────► authoritative prices, totals re-derived       │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  validate_guest_check_in (per guest)                                    │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  create_with_check_ins ─► ONE transaction: purchase + lines + guests    │
//! │     │                      (a guest claimed meanwhile aborts it all)    │
//! │     ▼                                                                   │
//! │  confirmed: notify arrivals          pending: caller starts the charge  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transitions
//! Every transition is a conditional update (`WHERE status = <from>`), so two
//! racing callers cannot both win. Repeating a settlement on a purchase that
//! already settled returns it unchanged.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use boxoffice_core::cart::price_cart;
use boxoffice_core::validation::{validate_cart, validate_guest_check_in};
use boxoffice_core::{Cart, GuestCheckIn, Operator, Product, Purchase, PurchaseStatus};
use boxoffice_db::Database;

use crate::error::{SettlementError, SettlementResult};
use crate::notify::ArrivalNotifier;
use crate::publisher::StatusPublisher;

// =============================================================================
// Options
// =============================================================================

/// Tunables of the settlement pipeline.
#[derive(Debug, Clone)]
pub struct SettlementOptions {
    /// Currency scale used for unit prices and the gross total.
    pub decimal_places: u32,
    /// ISO 4217 code sent to the gateway.
    pub currency: String,
    /// How long after creation the creator may still refund.
    pub refund_grace_window: chrono::Duration,
    /// Terminal used when a card-terminal cart names none.
    pub default_terminal_id: Option<String>,
    /// Gateway polling interval of a reconciliation loop.
    pub poll_interval: Duration,
    /// Pending purchases older than this are failed. `None` polls forever.
    pub pending_timeout: Option<chrono::Duration>,
}

impl Default for SettlementOptions {
    fn default() -> Self {
        SettlementOptions {
            decimal_places: boxoffice_core::DEFAULT_DECIMAL_PLACES,
            currency: "EUR".to_string(),
            refund_grace_window: chrono::Duration::minutes(15),
            default_terminal_id: None,
            poll_interval: Duration::from_secs(3),
            pending_timeout: None,
        }
    }
}

// =============================================================================
// Service
// =============================================================================

/// Purchase lifecycle operations.
#[derive(Clone)]
pub struct PurchaseService {
    db: Database,
    publisher: StatusPublisher,
    notifier: Arc<dyn ArrivalNotifier>,
    options: Arc<SettlementOptions>,
}

impl PurchaseService {
    pub fn new(
        db: Database,
        publisher: StatusPublisher,
        notifier: Arc<dyn ArrivalNotifier>,
        options: SettlementOptions,
    ) -> Self {
        PurchaseService {
            db,
            publisher,
            notifier,
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &SettlementOptions {
        &self.options
    }

    pub fn publisher(&self) -> &StatusPublisher {
        &self.publisher
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Creates a purchase that is paid on the spot (cash, card, voucher).
    pub async fn create_confirmed_purchase(
        &self,
        cart: Cart,
        operator: &Operator,
    ) -> SettlementResult<Purchase> {
        self.create(cart, operator, false).await
    }

    /// Creates a `pending` card-terminal purchase. The caller starts the charge.
    pub async fn create_pending_purchase(
        &self,
        cart: Cart,
        operator: &Operator,
    ) -> SettlementResult<Purchase> {
        self.create(cart, operator, true).await
    }

    async fn create(
        &self,
        cart: Cart,
        operator: &Operator,
        settles_remotely: bool,
    ) -> SettlementResult<Purchase> {
        validate_cart(&cart, settles_remotely)?;
        let method = cart.payment_method;

        let products = self.load_products(&cart).await?;
        let priced = price_cart(&cart, &products, self.options.decimal_places)?;
        let check_ins = self.check_guests(&cart).await?;

        let now = Utc::now();
        let purchase = Purchase {
            id: Uuid::now_v7(),
            status: method.initial_status(),
            payment_method: method,
            total_net_price: priced.total_net_price,
            total_gross_price: priced.total_gross_price,
            line_items: priced.line_items,
            gateway_charge_ref: None,
            gateway_transaction_ref: None,
            terminal_id: None,
            created_by: operator.id,
            created_at: now,
            updated_at: now,
        };

        self.db
            .purchases()
            .create_with_check_ins(&purchase, &check_ins)
            .await?;

        info!(
            purchase_id = %purchase.id,
            status = %purchase.status,
            method = %purchase.payment_method,
            gross = %purchase.total_gross_price,
            guests = check_ins.len(),
            "Purchase created"
        );

        if purchase.status == PurchaseStatus::Confirmed && !check_ins.is_empty() {
            self.notify_arrivals(&purchase);
        }

        Ok(purchase)
    }

    /// Fetches every distinct product of the cart. Missing or inactive
    /// products are left out; pricing reports them.
    async fn load_products(&self, cart: &Cart) -> SettlementResult<HashMap<Uuid, Product>> {
        let mut products = HashMap::with_capacity(cart.lines.len());
        for line in &cart.lines {
            if products.contains_key(&line.product_id) {
                continue;
            }
            if let Some(product) = self.db.products().get_by_id(line.product_id).await? {
                products.insert(product.id, product);
            }
        }
        Ok(products)
    }

    async fn check_guests(&self, cart: &Cart) -> SettlementResult<Vec<GuestCheckIn>> {
        let mut check_ins = Vec::new();
        for (product_id, check_in) in cart.check_ins() {
            let guest = self.db.guests().get_by_id(check_in.guest_id).await?;
            validate_guest_check_in(guest.as_ref(), check_in, product_id)?;
            check_ins.push(*check_in);
        }
        Ok(check_ins)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_purchase(&self, id: Uuid) -> SettlementResult<Purchase> {
        self.db
            .purchases()
            .get_by_id(id)
            .await?
            .ok_or_else(|| SettlementError::purchase_not_found(id))
    }

    pub async fn find_by_charge_ref(&self, charge_ref: &str) -> SettlementResult<Purchase> {
        self.db
            .purchases()
            .get_by_charge_ref(charge_ref)
            .await?
            .ok_or_else(|| SettlementError::NotFound {
                entity: "Charge".to_string(),
                id: charge_ref.to_string(),
            })
    }

    /// Pending purchases whose charge was started, for the startup sweep.
    pub async fn pending_with_charge(&self) -> SettlementResult<Vec<Purchase>> {
        Ok(self.db.purchases().list_pending_with_charge_ref().await?)
    }

    // =========================================================================
    // Gateway Bookkeeping
    // =========================================================================

    /// Records the charge started for a pending purchase.
    pub async fn attach_charge(
        &self,
        id: Uuid,
        charge_ref: &str,
        terminal_id: &str,
    ) -> SettlementResult<Purchase> {
        self.db
            .purchases()
            .set_charge_ref(id, charge_ref, terminal_id)
            .await?;
        debug!(purchase_id = %id, charge_ref, terminal_id, "Charge attached");
        self.get_purchase(id).await
    }

    pub async fn record_transaction_ref(&self, id: Uuid, transaction_ref: &str) -> SettlementResult<()> {
        self.db
            .purchases()
            .set_transaction_ref(id, transaction_ref)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// `pending` to `confirmed`. Notifies guest arrivals.
    pub async fn finalize_purchase(&self, id: Uuid) -> SettlementResult<Purchase> {
        self.transition(id, PurchaseStatus::Confirmed).await
    }

    /// `pending` to `failed`. Releases the purchase's guests.
    pub async fn fail_purchase(&self, id: Uuid) -> SettlementResult<Purchase> {
        self.transition(id, PurchaseStatus::Failed).await
    }

    /// `pending` to `cancelled`. Releases the purchase's guests.
    pub async fn cancel_purchase(&self, id: Uuid) -> SettlementResult<Purchase> {
        self.transition(id, PurchaseStatus::Cancelled).await
    }

    /// `confirmed` to `refunded`.
    ///
    /// The creator may refund within the grace window, administrators always.
    /// Guests stay checked in: they already went through the door.
    pub async fn refund_purchase(&self, id: Uuid, operator: &Operator) -> SettlementResult<Purchase> {
        let purchase = self.get_purchase(id).await?;
        if !purchase.refundable_by(operator, Utc::now(), self.options.refund_grace_window) {
            return Err(SettlementError::Forbidden(format!(
                "operator {} may not refund purchase {}",
                operator.id, id
            )));
        }
        self.transition(id, PurchaseStatus::Refunded).await
    }

    /// Removes a purchase and releases its guests. Creator or administrator only.
    pub async fn delete_purchase(&self, id: Uuid, operator: &Operator) -> SettlementResult<()> {
        let purchase = self.get_purchase(id).await?;
        if !purchase.deletable_by(operator) {
            return Err(SettlementError::Forbidden(format!(
                "operator {} may not delete purchase {}",
                operator.id, id
            )));
        }

        if !self.db.purchases().delete_with_rollback(id).await? {
            return Err(SettlementError::purchase_not_found(id));
        }

        info!(purchase_id = %id, operator_id = %operator.id, "Purchase deleted");
        Ok(())
    }

    async fn transition(&self, id: Uuid, to: PurchaseStatus) -> SettlementResult<Purchase> {
        let current = self.get_purchase(id).await?;
        let from = current.status;

        if !from.can_transition_to(to) {
            return if is_repeat(from, to) {
                debug!(purchase_id = %id, status = %from, requested = %to, "Transition already settled");
                Ok(current)
            } else {
                Err(SettlementError::InvalidTransition {
                    purchase_id: id,
                    from,
                    to,
                })
            };
        }

        let changed = self
            .db
            .purchases()
            .transition_status(id, from, to, to.releases_guests())
            .await?;

        let purchase = self.get_purchase(id).await?;
        if !changed {
            // Lost the race: someone else settled it first
            debug!(purchase_id = %id, status = %purchase.status, requested = %to, "Concurrent transition won");
            return if is_repeat(purchase.status, to) {
                Ok(purchase)
            } else {
                Err(SettlementError::InvalidTransition {
                    purchase_id: id,
                    from: purchase.status,
                    to,
                })
            };
        }

        info!(purchase_id = %id, from = %from, to = %to, "Purchase status changed");
        self.publisher.publish(id, to);

        if to == PurchaseStatus::Confirmed {
            self.notify_arrivals(&purchase);
        }

        Ok(purchase)
    }

    /// Sends arrival notifications in the background.
    fn notify_arrivals(&self, purchase: &Purchase) {
        let db = self.db.clone();
        let notifier = Arc::clone(&self.notifier);
        let purchase = purchase.clone();

        tokio::spawn(async move {
            let guests = match db.guests().list_by_purchase(purchase.id).await {
                Ok(guests) => guests,
                Err(e) => {
                    warn!(purchase_id = %purchase.id, error = %e, "Cannot load guests to notify");
                    return;
                }
            };

            for guest in guests.iter().filter(|g| g.notification_address.is_some()) {
                if let Err(e) = notifier.notify_arrival(guest, &purchase).await {
                    warn!(purchase_id = %purchase.id, guest_id = %guest.id, error = %e, "Arrival notification failed");
                }
            }
        });
    }
}

/// True if asking for `to` on a purchase in `current` is a harmless repeat.
///
/// Settlement outcomes (`confirmed`, `failed`, `cancelled`) only leave
/// `pending`; once the purchase settled, the first outcome stands.
fn is_repeat(current: PurchaseStatus, to: PurchaseStatus) -> bool {
    use PurchaseStatus::*;
    current == to || (current.is_terminal() && matches!(to, Confirmed | Failed | Cancelled))
}

// =============================================================================
// Unit Tests
// =============================================================================

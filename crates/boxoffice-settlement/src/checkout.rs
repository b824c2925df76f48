//! # Checkout
//!
//! Entry point for a submitted cart. Counter payments are confirmed on the
//! spot; card-terminal payments become a pending purchase, a gateway charge
//! and a reconciliation loop.

use std::sync::Arc;
use tracing::{error, info};

use boxoffice_core::{Cart, Operator, Purchase, ValidationError};

use crate::error::SettlementResult;
use crate::gateway::{ChargeRequest, PaymentGateway};
use crate::reconciler::Reconciler;
use crate::service::PurchaseService;

#[derive(Clone)]
pub struct CheckoutCoordinator {
    service: PurchaseService,
    gateway: Arc<dyn PaymentGateway>,
    reconciler: Reconciler,
}

impl CheckoutCoordinator {
    pub fn new(
        service: PurchaseService,
        gateway: Arc<dyn PaymentGateway>,
        reconciler: Reconciler,
    ) -> Self {
        CheckoutCoordinator {
            service,
            gateway,
            reconciler,
        }
    }

    /// Turns a cart into a purchase.
    ///
    /// ## Errors
    /// * `Validation` - cart rejected, nothing written
    /// * `Gateway` - the charge could not be started; the purchase stays
    ///   `pending` without a charge reference and is not polled
    pub async fn checkout(&self, cart: Cart, operator: &Operator) -> SettlementResult<Purchase> {
        if !cart.payment_method.settles_remotely() {
            return self.service.create_confirmed_purchase(cart, operator).await;
        }

        let options = self.service.options();
        let terminal_id = cart
            .terminal_id
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| options.default_terminal_id.clone())
            .ok_or_else(|| ValidationError::MissingField {
                field: "terminalId".to_string(),
            })?;
        let currency = options.currency.clone();

        let purchase = self.service.create_pending_purchase(cart, operator).await?;

        let request = ChargeRequest {
            terminal_id,
            amount: purchase.total_gross_price,
            currency,
            description: format!("Purchase {}", purchase.id),
            purchase_ref: purchase.id,
        };

        let charge_ref = match self.gateway.begin_charge(&request).await {
            Ok(charge_ref) => charge_ref,
            Err(e) => {
                error!(purchase_id = %purchase.id, error = %e, "Charge could not be started");
                return Err(e.into());
            }
        };

        let purchase = self
            .service
            .attach_charge(purchase.id, &charge_ref, &request.terminal_id)
            .await?;
        info!(
            purchase_id = %purchase.id,
            charge_ref = %charge_ref,
            terminal_id = %request.terminal_id,
            "Charge started"
        );

        self.reconciler.start(purchase.id);
        Ok(purchase)
    }
}

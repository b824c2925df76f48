//! # Arrival Notifications
//!
//! Tells a guest-list entry's contact that their guest has arrived. Delivery
//! is fire-and-forget: a failed notification is logged, never surfaced.

use async_trait::async_trait;
use tracing::info;

use boxoffice_core::{Guest, Purchase};

use crate::error::NotifyError;

/// Outbound arrival notification channel (mail, SMS, chat).
#[async_trait]
pub trait ArrivalNotifier: Send + Sync {
    async fn notify_arrival(&self, guest: &Guest, purchase: &Purchase) -> Result<(), NotifyError>;
}

/// Writes notifications to the log. The default until a real channel is configured.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl ArrivalNotifier for TracingNotifier {
    async fn notify_arrival(&self, guest: &Guest, purchase: &Purchase) -> Result<(), NotifyError> {
        let Some(address) = guest.notification_address.as_deref() else {
            return Ok(());
        };

        info!(
            guest_id = %guest.id,
            purchase_id = %purchase.id,
            to = %address,
            attendees = guest.attended_guests,
            "Guest arrived"
        );
        Ok(())
    }
}

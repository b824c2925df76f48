//! # Mock Gateway
//!
//! In-process gateway for development and tests.
//!
//! Each charge has a script of answers. Every status query pops the next
//! answer; the last one sticks. A charge with no script reports `PENDING`
//! (or `SUCCESSFUL` after `auto_settle_after` queries, if set).

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

use super::{ChargeRequest, ChargeSnapshot, ChargeStatus, GatewayError, GatewayResult, PaymentGateway};

#[derive(Default)]
struct MockState {
    next_charge: u64,
    charges: Vec<(String, ChargeRequest)>,
    scripts: HashMap<String, VecDeque<GatewayResult<ChargeSnapshot>>>,
    queries: HashMap<String, u32>,
    cancelled_terminals: Vec<String>,
    begin_failure: Option<GatewayError>,
    cancel_failure: Option<GatewayError>,
}

/// Scripted [`PaymentGateway`].
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
    auto_settle_after: Option<u32>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charges without a script succeed after `queries` status queries.
    pub fn auto_settle_after(queries: u32) -> Self {
        MockGateway {
            state: Mutex::default(),
            auto_settle_after: Some(queries),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues an answer for `charge_ref`.
    pub fn push_status(&self, charge_ref: &str, snapshot: ChargeSnapshot) {
        self.state()
            .scripts
            .entry(charge_ref.to_string())
            .or_default()
            .push_back(Ok(snapshot));
    }

    /// Queues a failed query for `charge_ref`.
    pub fn push_error(&self, charge_ref: &str, error: GatewayError) {
        self.state()
            .scripts
            .entry(charge_ref.to_string())
            .or_default()
            .push_back(Err(error));
    }

    /// Replaces the script of `charge_ref` with a single sticky answer.
    pub fn set_status(&self, charge_ref: &str, snapshot: ChargeSnapshot) {
        self.state()
            .scripts
            .insert(charge_ref.to_string(), VecDeque::from([Ok(snapshot)]));
    }

    /// The next `begin_charge` fails with `error`.
    pub fn fail_next_begin(&self, error: GatewayError) {
        self.state().begin_failure = Some(error);
    }

    /// Every `cancel_charge` fails with `error` until cleared with `None`.
    pub fn fail_cancel(&self, error: Option<GatewayError>) {
        self.state().cancel_failure = error;
    }

    /// Charges started so far, with their references.
    pub fn charges(&self) -> Vec<(String, ChargeRequest)> {
        self.state().charges.clone()
    }

    pub fn query_count(&self, charge_ref: &str) -> u32 {
        self.state().queries.get(charge_ref).copied().unwrap_or(0)
    }

    pub fn cancelled_terminals(&self) -> Vec<String> {
        self.state().cancelled_terminals.clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn begin_charge(&self, request: &ChargeRequest) -> GatewayResult<String> {
        let mut state = self.state();
        if let Some(error) = state.begin_failure.take() {
            return Err(error);
        }

        state.next_charge += 1;
        let charge_ref = format!("mock-charge-{}", state.next_charge);
        state.charges.push((charge_ref.clone(), request.clone()));
        info!(
            charge_ref = %charge_ref,
            terminal_id = %request.terminal_id,
            amount = %request.amount,
            "Mock charge started"
        );
        Ok(charge_ref)
    }

    async fn query_charge_status(&self, charge_ref: &str) -> GatewayResult<ChargeSnapshot> {
        let mut state = self.state();
        let count = {
            let count = state.queries.entry(charge_ref.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if let Some(script) = state.scripts.get_mut(charge_ref) {
            let answer = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            };
            if let Some(answer) = answer {
                return answer;
            }
        }

        let known = state.charges.iter().any(|(r, _)| r == charge_ref);
        match self.auto_settle_after {
            Some(after) if known && count > after => Ok(ChargeSnapshot::new(ChargeStatus::Successful)
                .with_transaction_ref(format!("mock-txn-{charge_ref}"))),
            _ if known => Ok(ChargeSnapshot::new(ChargeStatus::Pending)),
            _ => Err(GatewayError::NotFound(charge_ref.to_string())),
        }
    }

    async fn cancel_charge(&self, terminal_id: &str) -> GatewayResult<()> {
        let mut state = self.state();
        if let Some(error) = state.cancel_failure.clone() {
            return Err(error);
        }
        state.cancelled_terminals.push(terminal_id.to_string());

        // Open charges on this terminal now report CANCELED
        let open: Vec<String> = state
            .charges
            .iter()
            .filter(|(_, req)| req.terminal_id == terminal_id)
            .map(|(r, _)| r.clone())
            .collect();
        for charge_ref in open {
            let settled = state
                .scripts
                .get(&charge_ref)
                .and_then(|s| s.back())
                .is_some_and(|last| matches!(last, Ok(snap) if snap.status.is_final()));
            if !settled {
                state.scripts.insert(
                    charge_ref,
                    VecDeque::from([Ok(ChargeSnapshot::new(ChargeStatus::Canceled))]),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_core::Money;
    use uuid::Uuid;

    fn request(terminal: &str) -> ChargeRequest {
        ChargeRequest {
            terminal_id: terminal.to_string(),
            amount: Money::from_cents(1000),
            currency: "EUR".to_string(),
            description: "test".to_string(),
            purchase_ref: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_script_pops_and_last_answer_sticks() {
        let gw = MockGateway::new();
        let charge = gw.begin_charge(&request("t1")).await.unwrap();
        gw.push_error(&charge, GatewayError::RateLimited);
        gw.push_status(&charge, ChargeSnapshot::new(ChargeStatus::Successful));

        assert_eq!(gw.query_charge_status(&charge).await, Err(GatewayError::RateLimited));
        for _ in 0..3 {
            assert_eq!(
                gw.query_charge_status(&charge).await.unwrap().status,
                ChargeStatus::Successful
            );
        }
        assert_eq!(gw.query_count(&charge), 4);
    }

    #[tokio::test]
    async fn test_unknown_charge_is_not_found() {
        let gw = MockGateway::new();
        assert!(matches!(
            gw.query_charge_status("nope").await,
            Err(GatewayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_auto_settle() {
        let gw = MockGateway::auto_settle_after(1);
        let charge = gw.begin_charge(&request("t1")).await.unwrap();
        assert_eq!(gw.query_charge_status(&charge).await.unwrap().status, ChargeStatus::Pending);
        let settled = gw.query_charge_status(&charge).await.unwrap();
        assert_eq!(settled.status, ChargeStatus::Successful);
        assert!(settled.transaction_ref.is_some());
    }

    #[tokio::test]
    async fn test_cancel_marks_open_charges_on_terminal() {
        let gw = MockGateway::new();
        let open = gw.begin_charge(&request("t1")).await.unwrap();
        let other = gw.begin_charge(&request("t2")).await.unwrap();

        gw.cancel_charge("t1").await.unwrap();
        assert_eq!(gw.query_charge_status(&open).await.unwrap().status, ChargeStatus::Canceled);
        assert_eq!(gw.query_charge_status(&other).await.unwrap().status, ChargeStatus::Pending);
        assert_eq!(gw.cancelled_terminals(), vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn test_scripted_begin_failure_is_one_shot() {
        let gw = MockGateway::new();
        gw.fail_next_begin(GatewayError::Rejected("offline".into()));
        assert!(gw.begin_charge(&request("t1")).await.is_err());
        assert!(gw.begin_charge(&request("t1")).await.is_ok());
        assert_eq!(gw.charges().len(), 1);
    }
}

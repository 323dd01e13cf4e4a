use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::info;

use crate::errors::ServiceError;
use crate::gateway::{new_client_secret, new_intent_id, GatewayDecision, PaymentGateway};
use crate::models::{CardDetails, PaymentIntent, PaymentIntentStatus};

/// Stripe-style test card that is always declined.
pub const DECLINE_CARD: &str = "4000000000000002";

/// In-process gateway with deterministic outcomes.
///
/// Any card number other than [`DECLINE_CARD`] is approved. Transport
/// failures and latency are scriptable so the retry, timeout and
/// intent-creation-failure paths can be driven from tests and the demo.
#[derive(Debug, Default)]
pub struct SimulatedGateway {
    intents: DashMap<String, PaymentIntent>,
    create_failures: AtomicU32,
    latency: Option<Duration>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fixed delay before every confirmation answer.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Makes the next `n` `create_intent` calls fail with a transport error.
    pub fn fail_next_creates(&self, n: u32) {
        self.create_failures.store(n, Ordering::SeqCst);
    }

    pub fn intent(&self, intent_id: &str) -> Option<PaymentIntent> {
        self.intents.get(intent_id).map(|i| i.clone())
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
    ) -> Result<PaymentIntent, ServiceError> {
        if self
            .create_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ServiceError::ExternalServiceError(
                "gateway unreachable (simulated)".to_string(),
            ));
        }

        let id = new_intent_id();
        let intent = PaymentIntent {
            client_secret: new_client_secret(&id),
            id: id.clone(),
            booking_ids: Vec::new(),
            amount,
            currency: currency.to_string(),
            status: PaymentIntentStatus::RequiresPaymentMethod,
            created_at: Utc::now(),
        };
        self.intents.insert(id.clone(), intent.clone());

        info!("Simulated intent {} created for {} {}", id, amount, currency);
        Ok(intent)
    }

    async fn confirm_intent(
        &self,
        intent_id: &str,
        card: &CardDetails,
    ) -> Result<GatewayDecision, ServiceError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut intent = self.intents.get_mut(intent_id).ok_or_else(|| {
            ServiceError::NotFound(format!("Payment intent {} not found", intent_id))
        })?;

        let decision = if card.card_number == DECLINE_CARD {
            GatewayDecision::Declined {
                reason: "card_declined".to_string(),
            }
        } else {
            GatewayDecision::Approved
        };

        intent.status = match decision {
            GatewayDecision::Approved => PaymentIntentStatus::Succeeded,
            GatewayDecision::Declined { .. } => PaymentIntentStatus::Failed,
        };

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(number: &str) -> CardDetails {
        CardDetails {
            card_number: number.to_string(),
            card_holder: "Asha Rao".to_string(),
            expiry: "12/27".to_string(),
            cvv: "123".to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_confirm_approves_ordinary_cards() {
        let gateway = SimulatedGateway::new();
        let intent = gateway.create_intent(1229, "INR").await.expect("create");
        assert_eq!(intent.status, PaymentIntentStatus::RequiresPaymentMethod);
        assert_eq!(intent.amount, 1229);

        let decision = gateway
            .confirm_intent(&intent.id, &card("4111111111111111"))
            .await
            .expect("confirm");
        assert_eq!(decision, GatewayDecision::Approved);
    }

    #[tokio::test]
    async fn decline_card_is_declined() {
        let gateway = SimulatedGateway::new();
        let intent = gateway.create_intent(500, "INR").await.expect("create");

        let decision = gateway
            .confirm_intent(&intent.id, &card(DECLINE_CARD))
            .await
            .expect("confirm");
        assert!(matches!(decision, GatewayDecision::Declined { .. }));
    }

    #[tokio::test]
    async fn scripted_create_failures_then_recovery() {
        let gateway = SimulatedGateway::new();
        gateway.fail_next_creates(1);

        let err = gateway.create_intent(500, "INR").await.expect_err("fails");
        assert!(matches!(err, ServiceError::ExternalServiceError(_)));

        // Next call goes through.
        gateway.create_intent(500, "INR").await.expect("recovers");
    }

    #[tokio::test]
    async fn confirm_unknown_intent_is_not_found() {
        let gateway = SimulatedGateway::new();
        let err = gateway
            .confirm_intent("pi_missing", &card("4111111111111111"))
            .await
            .expect_err("unknown intent");
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}

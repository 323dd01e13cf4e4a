use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::errors::ServiceError;
use crate::models::{CardDetails, PaymentIntent};

pub mod rest;
pub mod simulated;

pub use rest::RestBackend;
pub use simulated::SimulatedGateway;

/// Terminal answer of a confirmation attempt that reached the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayDecision {
    Approved,
    Declined { reason: String },
}

/// Port onto the payment gateway.
///
/// The state machine in `services::payments` is identical regardless of which
/// implementation sits behind this trait; the simulated and the REST backend
/// are selected by configuration.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Requests a payment handle for the given amount.
    ///
    /// The returned intent carries status `requires_payment_method` and a
    /// client secret; its booking references are attached by the caller.
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
    ) -> Result<PaymentIntent, ServiceError>;

    /// Submits card credentials against an existing intent.
    async fn confirm_intent(
        &self,
        intent_id: &str,
        card: &CardDetails,
    ) -> Result<GatewayDecision, ServiceError>;
}

pub(crate) fn new_intent_id() -> String {
    format!("pi_{}", random_token(24))
}

pub(crate) fn new_client_secret(intent_id: &str) -> String {
    format!("{}_secret_{}", intent_id, random_token(24))
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_ids_are_prefixed_and_unique() {
        let a = new_intent_id();
        let b = new_intent_id();
        assert!(a.starts_with("pi_"));
        assert_eq!(a.len(), "pi_".len() + 24);
        assert_ne!(a, b);
    }

    #[test]
    fn client_secret_embeds_intent_id() {
        let id = new_intent_id();
        let secret = new_client_secret(&id);
        assert!(secret.starts_with(&format!("{}_secret_", id)));
    }
}

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::bookings::BookingLedger;
use crate::errors::ServiceError;
use crate::gateway::{GatewayDecision, PaymentGateway};
use crate::models::{
    BookingRequest, BookingStatus, CardDetails, PaymentIntent, PaymentIntentStatus,
};

/// REST client for the hosted backend (payment edge functions + booking rows).
///
/// Implements both ports so a single authenticated HTTP session drives the
/// real flow. Every call requires the session bearer token; intent creation
/// without one fails with `Unauthorized`, which the UI resolves by
/// redirecting to login (no automatic retry).
#[derive(Debug, Clone)]
pub struct RestBackend {
    http: reqwest::Client,
    base_url: String,
    session_token: Option<String>,
}

#[derive(Serialize)]
struct CreateIntentRequest<'a> {
    amount: i64,
    currency: &'a str,
}

#[derive(Deserialize)]
struct CreateIntentResponse {
    id: String,
    client_secret: String,
}

#[derive(Serialize)]
struct ConfirmIntentRequest<'a> {
    payment_intent_id: &'a str,
    card_number: &'a str,
    card_holder: &'a str,
    expiry: &'a str,
    cvv: &'a str,
}

#[derive(Deserialize)]
struct ConfirmIntentResponse {
    status: PaymentIntentStatus,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct BookingRow {
    id: Uuid,
    #[serde(default)]
    status: Option<BookingStatus>,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, session_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_token,
        }
    }

    fn token(&self) -> Result<&str, ServiceError> {
        self.session_token
            .as_deref()
            .ok_or_else(|| ServiceError::Unauthorized("no active session".to_string()))
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        match resp.status() {
            s if s.is_success() => Ok(resp),
            reqwest::StatusCode::UNAUTHORIZED => Err(ServiceError::Unauthorized(
                "session rejected by backend".to_string(),
            )),
            s => {
                let body = resp.text().await.unwrap_or_default();
                Err(ServiceError::ExternalServiceError(format!(
                    "backend returned {}: {}",
                    s, body
                )))
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for RestBackend {
    #[instrument(skip(self))]
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
    ) -> Result<PaymentIntent, ServiceError> {
        let token = self.token()?;

        let resp = self
            .http
            .post(format!("{}/functions/v1/create-payment-intent", self.base_url))
            .bearer_auth(token)
            .json(&CreateIntentRequest { amount, currency })
            .send()
            .await?;
        let body: CreateIntentResponse = Self::check(resp).await?.json().await?;

        Ok(PaymentIntent {
            id: body.id,
            booking_ids: Vec::new(),
            amount,
            currency: currency.to_string(),
            status: PaymentIntentStatus::RequiresPaymentMethod,
            client_secret: body.client_secret,
            created_at: Utc::now(),
        })
    }

    #[instrument(skip(self, card))]
    async fn confirm_intent(
        &self,
        intent_id: &str,
        card: &CardDetails,
    ) -> Result<GatewayDecision, ServiceError> {
        let token = self.token()?;

        let resp = self
            .http
            .post(format!("{}/functions/v1/confirm-payment", self.base_url))
            .bearer_auth(token)
            .json(&ConfirmIntentRequest {
                payment_intent_id: intent_id,
                card_number: &card.card_number,
                card_holder: &card.card_holder,
                expiry: &card.expiry,
                cvv: &card.cvv,
            })
            .send()
            .await?;
        let body: ConfirmIntentResponse = Self::check(resp).await?.json().await?;

        match body.status {
            PaymentIntentStatus::Succeeded => Ok(GatewayDecision::Approved),
            PaymentIntentStatus::Failed => Ok(GatewayDecision::Declined {
                reason: body.reason.unwrap_or_else(|| "declined".to_string()),
            }),
            other => Err(ServiceError::ExternalServiceError(format!(
                "unexpected intent status from backend: {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl BookingLedger for RestBackend {
    #[instrument(skip(self))]
    async fn create_booking(&self, request: &BookingRequest) -> Result<Uuid, ServiceError> {
        let token = self.token()?;

        let resp = self
            .http
            .post(format!("{}/rest/v1/bookings", self.base_url))
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;
        let rows: Vec<BookingRow> = Self::check(resp).await?.json().await?;

        rows.first().map(|r| r.id).ok_or_else(|| {
            ServiceError::ExternalServiceError("backend returned no booking row".to_string())
        })
    }

    #[instrument(skip(self))]
    async fn confirm_booking(&self, booking_id: Uuid) -> Result<(), ServiceError> {
        let token = self.token()?;

        let resp = self
            .http
            .patch(format!(
                "{}/rest/v1/bookings?id=eq.{}",
                self.base_url, booking_id
            ))
            .bearer_auth(token)
            .json(&serde_json::json!({ "status": BookingStatus::Confirmed }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn booking_status(&self, booking_id: Uuid) -> Result<BookingStatus, ServiceError> {
        let token = self.token()?;

        let resp = self
            .http
            .get(format!(
                "{}/rest/v1/bookings?id=eq.{}&select=id,status",
                self.base_url, booking_id
            ))
            .bearer_auth(token)
            .send()
            .await?;
        let rows: Vec<BookingRow> = Self::check(resp).await?.json().await?;

        rows.first()
            .and_then(|r| r.status)
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {} not found", booking_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> CardDetails {
        CardDetails {
            card_number: "4111111111111111".to_string(),
            card_holder: "Asha Rao".to_string(),
            expiry: "12/27".to_string(),
            cvv: "123".to_string(),
        }
    }

    #[tokio::test]
    async fn create_intent_without_session_is_unauthorized() {
        let backend = RestBackend::new("https://backend.example", None);
        let err = backend
            .create_intent(1229, "INR")
            .await
            .expect_err("must fail before any request");
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn confirm_without_session_is_unauthorized() {
        let backend = RestBackend::new("https://backend.example/", None);
        let err = backend
            .confirm_intent("pi_x", &card())
            .await
            .expect_err("must fail before any request");
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn base_url_is_normalized() {
        let backend = RestBackend::new("https://backend.example/", None);
        assert_eq!(backend.base_url, "https://backend.example");
    }
}

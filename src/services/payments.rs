use std::sync::Arc;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::bookings::BookingLedger;
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{GatewayDecision, PaymentGateway};
use crate::models::{
    BookingRequest, CardDetails, PaymentIntent, PaymentIntentStatus, Receipt, ShippingSnapshot,
};
use crate::services::cart::CartStore;
use crate::services::checkout::{order_amount, CheckoutSession};

/// One payment in flight: the intent plus everything retries need.
///
/// The shipping snapshot is retained so a failed or timed-out attempt can be
/// resubmitted without re-collecting the form; the same intent id is reused
/// across resubmissions. A fresh call to [`PaymentService::start`] always
/// creates a new intent — stale sessions are abandoned, never resumed.
#[derive(Debug)]
pub struct PaymentSession {
    pub intent: PaymentIntent,
    pub shipping: ShippingSnapshot,
    attempts: u32,
    processing: bool,
}

impl PaymentSession {
    pub fn status(&self) -> PaymentIntentStatus {
        self.intent.status
    }

    /// Gateway submissions consumed so far. Credential-validation failures
    /// do not count.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Terminal answer of one submission.
#[derive(Debug)]
pub enum PaymentOutcome {
    Succeeded(PaymentConfirmation),
    /// Intent is `failed` and may be resubmitted.
    Declined { reason: String },
    /// The gateway never answered within the deadline; retryable, and
    /// deliberately distinct from a decline — the attempt outcome is unknown.
    TimedOut,
    /// No submission attempts remain; the intent is canceled and control returns
    /// to the checkout stage.
    AttemptsExhausted,
}

/// Everything a successful payment fans out into.
#[derive(Debug)]
pub struct PaymentConfirmation {
    pub receipt: Receipt,
    /// Non-blocking warnings from booking confirmation. The payment itself
    /// succeeded; these are surfaced without failing the flow.
    pub booking_warnings: Vec<String>,
}

/// Drives the payment intent lifecycle and fans out the consequences of a
/// successful confirmation.
#[derive(Clone)]
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    bookings: Arc<dyn BookingLedger>,
    cart: Arc<CartStore>,
    events: EventSender,
    config: Arc<AppConfig>,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        bookings: Arc<dyn BookingLedger>,
        cart: Arc<CartStore>,
        events: EventSender,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            gateway,
            bookings,
            cart,
            events,
            config,
        }
    }

    /// Creates the bookings and a payment intent sized to the session total.
    ///
    /// Bookings are created first, pending, so the intent can reference
    /// them. A transport failure here is recoverable: nothing is retained,
    /// and the caller retries with the same checkout session (the shipping
    /// snapshot survives in it).
    #[instrument(skip(self, checkout, requests), fields(session_id = %checkout.id))]
    pub async fn start(
        &self,
        checkout: &CheckoutSession,
        requests: &[BookingRequest],
    ) -> Result<PaymentSession, ServiceError> {
        let shipping = checkout.shipping.clone().ok_or_else(|| {
            ServiceError::InvalidOperation("Shipping has not been captured".to_string())
        })?;

        let amount = order_amount(&self.config, checkout.cart_total);
        // Cart emptiness upstream already prevents this; kept as an
        // independent invariant of the stage.
        if amount <= 0 {
            return Err(ServiceError::InvalidInput(
                "Payment amount must be positive".to_string(),
            ));
        }

        let mut booking_ids = Vec::with_capacity(requests.len());
        for request in requests {
            let id = self
                .with_deadline(self.bookings.create_booking(request), "booking service")
                .await?;
            booking_ids.push(id);
        }

        let mut intent = self
            .with_deadline(
                self.gateway.create_intent(amount, &self.config.currency),
                "payment gateway",
            )
            .await?;
        intent.booking_ids = booking_ids;

        self.events
            .send_or_log(Event::PaymentIntentCreated {
                intent_id: intent.id.clone(),
                amount,
            })
            .await;
        info!("Payment intent {} created for {}", intent.id, amount);

        Ok(PaymentSession {
            intent,
            shipping,
            attempts: 0,
            processing: false,
        })
    }

    /// Submits card credentials against the session's intent.
    ///
    /// Transitions: `requires_payment_method | failed | timed_out
    /// --submit--> processing --> succeeded | failed | timed_out`. Credential
    /// validation happens before any transport and consumes no attempt; a
    /// second submission while one is in flight is rejected outright.
    #[instrument(skip(self, session, card), fields(intent_id = %session.intent.id))]
    pub async fn submit(
        &self,
        session: &mut PaymentSession,
        card: &CardDetails,
    ) -> Result<PaymentOutcome, ServiceError> {
        if session.processing {
            return Err(ServiceError::InvalidOperation(
                "A payment attempt is already in flight".to_string(),
            ));
        }
        if !session.intent.status.accepts_submission() {
            return Err(ServiceError::InvalidOperation(format!(
                "Intent {} does not accept submissions in status {}",
                session.intent.id, session.intent.status
            )));
        }

        // Field check first: state stays requires_payment_method and no
        // gateway attempt is consumed.
        card.validate()?;

        session.attempts += 1;
        if session.attempts > self.config.max_payment_attempts {
            warn!(
                "Intent {} exceeded {} attempts, canceling",
                session.intent.id, self.config.max_payment_attempts
            );
            session.intent.status = PaymentIntentStatus::Canceled;
            self.events
                .send_or_log(Event::PaymentCancelled {
                    intent_id: session.intent.id.clone(),
                })
                .await;
            return Ok(PaymentOutcome::AttemptsExhausted);
        }

        session.processing = true;
        session.intent.status = PaymentIntentStatus::Processing;
        self.events
            .send_or_log(Event::PaymentProcessing {
                intent_id: session.intent.id.clone(),
            })
            .await;

        let result = timeout(
            self.config.gateway_timeout(),
            self.gateway.confirm_intent(&session.intent.id, card),
        )
        .await;
        session.processing = false;

        let decision = match result {
            Err(_elapsed) => {
                warn!("Intent {} timed out awaiting the gateway", session.intent.id);
                session.intent.status = PaymentIntentStatus::TimedOut;
                self.events
                    .send_or_log(Event::PaymentTimedOut {
                        intent_id: session.intent.id.clone(),
                    })
                    .await;
                return Ok(PaymentOutcome::TimedOut);
            }
            Ok(Err(e)) => {
                // Transport failure on submission: the intent lands in
                // `failed` and stays reusable, like a decline.
                session.intent.status = PaymentIntentStatus::Failed;
                let reason = e.to_string();
                self.events
                    .send_or_log(Event::PaymentFailed {
                        intent_id: session.intent.id.clone(),
                        reason: reason.clone(),
                    })
                    .await;
                return Ok(PaymentOutcome::Declined { reason });
            }
            Ok(Ok(decision)) => decision,
        };

        match decision {
            GatewayDecision::Declined { reason } => {
                info!("Intent {} declined: {}", session.intent.id, reason);
                session.intent.status = PaymentIntentStatus::Failed;
                self.events
                    .send_or_log(Event::PaymentFailed {
                        intent_id: session.intent.id.clone(),
                        reason: reason.clone(),
                    })
                    .await;
                Ok(PaymentOutcome::Declined { reason })
            }
            GatewayDecision::Approved => {
                session.intent.status = PaymentIntentStatus::Succeeded;
                self.events
                    .send_or_log(Event::PaymentSucceeded {
                        intent_id: session.intent.id.clone(),
                    })
                    .await;
                info!("Intent {} succeeded", session.intent.id);

                let confirmation = self.finalize_success(session).await;
                Ok(PaymentOutcome::Succeeded(confirmation))
            }
        }
    }

    /// User-initiated cancel, allowed only while no attempt is in flight and
    /// the intent is not terminal. Produces no booking side effects; control
    /// returns to the checkout stage.
    #[instrument(skip(self, session), fields(intent_id = %session.intent.id))]
    pub async fn cancel(&self, session: &mut PaymentSession) -> Result<(), ServiceError> {
        if session.processing {
            return Err(ServiceError::InvalidOperation(
                "Cannot cancel while an attempt is in flight".to_string(),
            ));
        }
        if session.intent.status.is_terminal() {
            return Err(ServiceError::InvalidOperation(format!(
                "Intent {} is already {}",
                session.intent.id, session.intent.status
            )));
        }

        session.intent.status = PaymentIntentStatus::Canceled;
        self.events
            .send_or_log(Event::PaymentCancelled {
                intent_id: session.intent.id.clone(),
            })
            .await;
        info!("Intent {} canceled by user", session.intent.id);
        Ok(())
    }

    /// Post-success fan-out, in fixed order, each step independently awaited:
    /// confirm bookings, clear the cart, build the receipt.
    ///
    /// Cart clearing is not gated on booking confirmation — the payment
    /// already succeeded, so a confirmation failure is logged and carried as
    /// a warning, never shown as a payment failure.
    async fn finalize_success(&self, session: &PaymentSession) -> PaymentConfirmation {
        let mut booking_warnings = Vec::new();

        for booking_id in &session.intent.booking_ids {
            match self
                .with_deadline(self.bookings.confirm_booking(*booking_id), "booking service")
                .await
            {
                Ok(()) => {
                    self.events
                        .send_or_log(Event::BookingConfirmed(*booking_id))
                        .await;
                }
                Err(e) => {
                    warn!(
                        "Payment {} succeeded but booking {} confirmation failed: {}",
                        session.intent.id, booking_id, e
                    );
                    self.events
                        .send_or_log(Event::BookingConfirmationFailed {
                            booking_id: *booking_id,
                            error: e.to_string(),
                        })
                        .await;
                    booking_warnings.push(format!(
                        "Booking {} could not be confirmed yet: {}",
                        booking_id, e
                    ));
                }
            }
        }

        if let Err(e) = self.cart.clear().await {
            warn!(
                "Cart clear failed after successful payment {}: {}",
                session.intent.id, e
            );
        }

        let receipt = Receipt {
            booking_ids: session.intent.booking_ids.clone(),
            total_amount: session.intent.amount,
            payment_intent_id: session.intent.id.clone(),
            payment_date: Utc::now(),
            customer_name: session.shipping.full_name(),
        };

        PaymentConfirmation {
            receipt,
            booking_warnings,
        }
    }

    async fn with_deadline<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, ServiceError>>,
        what: &str,
    ) -> Result<T, ServiceError> {
        timeout(self.config.gateway_timeout(), fut)
            .await
            .map_err(|_| ServiceError::ExternalServiceError(format!("{} timed out", what)))?
    }
}

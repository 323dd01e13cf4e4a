use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{CartLine, ShippingSnapshot};
use crate::services::cart::CartStore;

/// States and union territories accepted by the shipping form.
pub const INDIAN_STATES: &[&str] = &[
    "Andhra Pradesh",
    "Arunachal Pradesh",
    "Assam",
    "Bihar",
    "Chhattisgarh",
    "Goa",
    "Gujarat",
    "Haryana",
    "Himachal Pradesh",
    "Jharkhand",
    "Karnataka",
    "Kerala",
    "Madhya Pradesh",
    "Maharashtra",
    "Manipur",
    "Meghalaya",
    "Mizoram",
    "Nagaland",
    "Odisha",
    "Punjab",
    "Rajasthan",
    "Sikkim",
    "Tamil Nadu",
    "Telangana",
    "Tripura",
    "Uttar Pradesh",
    "Uttarakhand",
    "West Bengal",
    "Andaman and Nicobar Islands",
    "Chandigarh",
    "Dadra and Nagar Haveli and Daman and Diu",
    "Delhi",
    "Jammu and Kashmir",
    "Ladakh",
    "Lakshadweep",
    "Puducherry",
];

static PINCODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{6}$").expect("pincode pattern"));

// Optional +NN / 0 prefix, then exactly 10 digits.
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\+\d{1,3}[\s-]?|0)?\d{10}$").expect("phone pattern"));

/// Raw shipping form input, validated before a snapshot is cut.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ShippingForm {
    #[validate(length(min = 2, message = "first name must be at least 2 characters"))]
    pub first_name: String,
    #[validate(length(min = 2, message = "last name must be at least 2 characters"))]
    pub last_name: String,
    #[validate(length(min = 5, message = "address must be at least 5 characters"))]
    pub address: String,
    #[validate(length(min = 2, message = "city must be at least 2 characters"))]
    pub city: String,
    #[validate(custom = "validate_state")]
    pub state: String,
    #[validate(custom = "validate_pincode")]
    pub pincode: String,
    #[validate(custom = "validate_phone")]
    pub phone: String,
}

fn validate_state(state: &str) -> Result<(), ValidationError> {
    if INDIAN_STATES.iter().any(|s| s.eq_ignore_ascii_case(state)) {
        Ok(())
    } else {
        Err(ValidationError::new("unknown_state"))
    }
}

fn validate_pincode(pincode: &str) -> Result<(), ValidationError> {
    if PINCODE_RE.is_match(pincode) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_pincode"))
    }
}

fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if PHONE_RE.is_match(phone) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_phone"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckoutStep {
    Shipping,
    Payment,
}

/// One visit to the checkout flow.
///
/// Lines and total are snapshotted at entry; the live cart keeps moving
/// independently until the payment stage clears it.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: Uuid,
    pub lines: Vec<CartLine>,
    pub cart_total: i64,
    pub step: CheckoutStep,
    pub shipping: Option<ShippingSnapshot>,
    pub started_at: DateTime<Utc>,
}

/// Gates entry to payment behind a validated shipping snapshot.
#[derive(Clone)]
pub struct CheckoutService {
    cart: Arc<CartStore>,
    events: EventSender,
    config: Arc<AppConfig>,
}

impl CheckoutService {
    pub fn new(cart: Arc<CartStore>, events: EventSender, config: Arc<AppConfig>) -> Self {
        Self {
            cart,
            events,
            config,
        }
    }

    /// Opens a checkout session over the current cart.
    ///
    /// Checkout is unreachable with zero items: an empty cart short-circuits
    /// before any shipping form exists, and the caller redirects to the
    /// catalog.
    #[instrument(skip(self))]
    pub async fn begin(&self) -> Result<CheckoutSession, ServiceError> {
        let lines = self.cart.lines();
        if lines.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }

        let session = CheckoutSession {
            id: Uuid::new_v4(),
            cart_total: lines.iter().map(CartLine::line_total).sum(),
            lines,
            step: CheckoutStep::Shipping,
            shipping: None,
            started_at: Utc::now(),
        };

        self.events
            .send_or_log(Event::CheckoutStarted {
                session_id: session.id,
            })
            .await;

        info!("Checkout {} started, total {}", session.id, session.cart_total);
        Ok(session)
    }

    /// Validates the shipping form and captures the immutable snapshot.
    ///
    /// On validation failure the session does not advance and the field
    /// errors are returned for re-prompting. Once captured, the snapshot is
    /// never re-validated or replaced.
    #[instrument(skip(self, session, form), fields(session_id = %session.id))]
    pub async fn set_shipping(
        &self,
        session: &mut CheckoutSession,
        form: ShippingForm,
    ) -> Result<(), ServiceError> {
        if session.shipping.is_some() {
            return Err(ServiceError::InvalidOperation(
                "Shipping has already been captured for this session".to_string(),
            ));
        }

        form.validate()?;

        session.shipping = Some(ShippingSnapshot {
            first_name: form.first_name,
            last_name: form.last_name,
            address: form.address,
            city: form.city,
            state: form.state,
            pincode: form.pincode,
            phone: form.phone,
            captured_at: Utc::now(),
        });
        session.step = CheckoutStep::Payment;

        self.events
            .send_or_log(Event::ShippingCaptured {
                session_id: session.id,
            })
            .await;
        Ok(())
    }

    /// Amount the payment intent is sized to:
    /// `cart_total + shipping_fee + round(cart_total × tax_rate)`.
    pub fn order_amount(&self, cart_total: i64) -> i64 {
        order_amount(&self.config, cart_total)
    }
}

/// Shared by the checkout and payment stages so both derive the identical
/// amount from the same session total.
pub fn order_amount(config: &AppConfig, cart_total: i64) -> i64 {
    let rate = Decimal::from_f64_retain(config.tax_rate).unwrap_or(Decimal::ZERO);
    let tax = (Decimal::from(cart_total) * rate).round();
    cart_total + config.shipping_fee + tax.to_i64().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;
    use crate::models::ListingRef;
    use crate::storage::InMemoryStorage;
    use assert_matches::assert_matches;

    fn form() -> ShippingForm {
        ShippingForm {
            first_name: "Asha".to_string(),
            last_name: "Rao".to_string(),
            address: "14 MG Road".to_string(),
            city: "Bengaluru".to_string(),
            state: "Karnataka".to_string(),
            pincode: "560001".to_string(),
            phone: "+91 9876543210".to_string(),
        }
    }

    async fn service_with_cart(total_lines: usize) -> (CheckoutService, Arc<CartStore>) {
        let (sender, _rx) = events::channel(32);
        let cart = Arc::new(CartStore::new(
            Arc::new(InMemoryStorage::new()),
            sender.clone(),
            "rentkart.cart.v1",
        ));
        for i in 0..total_lines {
            cart.add_item(ListingRef {
                id: Uuid::new_v4(),
                title: format!("Listing {}", i),
                price: 500,
            })
            .await
            .expect("add");
        }
        let service =
            CheckoutService::new(cart.clone(), sender, Arc::new(AppConfig::default()));
        (service, cart)
    }

    #[tokio::test]
    async fn empty_cart_never_reaches_the_shipping_form() {
        let (service, _cart) = service_with_cart(0).await;
        let err = service.begin().await.expect_err("must short-circuit");
        assert_matches!(err, ServiceError::InvalidOperation(_));
    }

    #[tokio::test]
    async fn begin_snapshots_lines_and_total() {
        let (service, _cart) = service_with_cart(2).await;
        let session = service.begin().await.expect("begin");
        assert_eq!(session.lines.len(), 2);
        assert_eq!(session.cart_total, 1000);
        assert_eq!(session.step, CheckoutStep::Shipping);
        assert!(session.shipping.is_none());
    }

    #[tokio::test]
    async fn valid_form_advances_to_payment() {
        let (service, _cart) = service_with_cart(1).await;
        let mut session = service.begin().await.expect("begin");

        service
            .set_shipping(&mut session, form())
            .await
            .expect("capture");

        assert_eq!(session.step, CheckoutStep::Payment);
        let snapshot = session.shipping.expect("snapshot");
        assert_eq!(snapshot.full_name(), "Asha Rao");
        assert_eq!(snapshot.pincode, "560001");
    }

    #[tokio::test]
    async fn shipping_snapshot_is_captured_once() {
        let (service, _cart) = service_with_cart(1).await;
        let mut session = service.begin().await.expect("begin");
        service
            .set_shipping(&mut session, form())
            .await
            .expect("capture");

        let err = service
            .set_shipping(&mut session, form())
            .await
            .expect_err("second capture must fail");
        assert_matches!(err, ServiceError::InvalidOperation(_));
    }

    #[tokio::test]
    async fn field_errors_are_scoped_and_block_advancement() {
        let (service, _cart) = service_with_cart(1).await;
        let mut session = service.begin().await.expect("begin");

        let bad = ShippingForm {
            first_name: "A".to_string(),
            pincode: "5600".to_string(),
            phone: "12345".to_string(),
            ..form()
        };
        let err = service
            .set_shipping(&mut session, bad)
            .await
            .expect_err("invalid form");

        let errs = match err {
            ServiceError::Validation(errs) => errs,
            other => panic!("expected validation error, got {:?}", other),
        };
        let fields = errs.field_errors();
        assert!(fields.contains_key("first_name"));
        assert!(fields.contains_key("pincode"));
        assert!(fields.contains_key("phone"));
        assert!(!fields.contains_key("city"));

        assert_eq!(session.step, CheckoutStep::Shipping);
        assert!(session.shipping.is_none());
    }

    #[test]
    fn state_matching_is_case_insensitive() {
        assert!(validate_state("karnataka").is_ok());
        assert!(validate_state("TAMIL NADU").is_ok());
        assert!(validate_state("Narnia").is_err());
    }

    #[test]
    fn pincode_is_exactly_six_digits() {
        assert!(validate_pincode("560001").is_ok());
        assert!(validate_pincode("56001").is_err());
        assert!(validate_pincode("5600011").is_err());
        assert!(validate_pincode("56000a").is_err());
    }

    #[test]
    fn phone_accepts_optional_country_prefix() {
        assert!(validate_phone("9876543210").is_ok());
        assert!(validate_phone("+91 9876543210").is_ok());
        assert!(validate_phone("+919876543210").is_ok());
        assert!(validate_phone("09876543210").is_ok());
        assert!(validate_phone("987654321").is_err());
        assert!(validate_phone("98765432100").is_err());
    }

    #[tokio::test]
    async fn order_amount_adds_fee_and_rounded_tax() {
        let (service, _cart) = service_with_cart(1).await;
        // 1000 + 49 + round(1000 × 0.18) = 1229
        assert_eq!(service.order_amount(1000), 1229);
        assert_eq!(service.order_amount(0), 49);
        // round(333 × 0.18) = round(59.94) = 60
        assert_eq!(service.order_amount(333), 333 + 49 + 60);
    }
}

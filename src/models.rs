use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;

/// Reference to a catalog listing carried inside a cart line.
///
/// The catalog itself is an external collaborator; the checkout core only
/// needs a stable id, a display title and the integer-rupee price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRef {
    pub id: Uuid,
    pub title: String,
    /// Rental price in whole rupees.
    pub price: i64,
}

/// One (listing, quantity) pairing held by the cart store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub listing: ListingRef,
    pub quantity: u32,
}

impl CartLine {
    pub fn line_total(&self) -> i64 {
        self.listing.price * i64::from(self.quantity)
    }
}

/// Immutable shipping data captured by the checkout form.
///
/// Created only through a successfully validated [`ShippingForm`]
/// (`services::checkout`) and never re-validated or mutated afterwards;
/// payment retries reuse the same snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingSnapshot {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub phone: String,
    pub captured_at: DateTime<Utc>,
}

impl ShippingSnapshot {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Card-like credentials submitted against a payment intent.
///
/// Only presence is checked here; anything stronger is the gateway's call.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CardDetails {
    #[validate(length(min = 1, message = "card number is required"))]
    pub card_number: String,
    #[validate(length(min = 1, message = "card holder name is required"))]
    pub card_holder: String,
    #[validate(length(min = 1, message = "expiry is required"))]
    pub expiry: String,
    #[validate(length(min = 1, message = "cvv is required"))]
    pub cvv: String,
}

/// Lifecycle of a payment intent.
///
/// `TimedOut` is retryable and distinct from `Failed`: the gateway never
/// answered, so the attempt outcome is unknown. `Succeeded`, `Canceled` and
/// `Failed` follow the gateway convention; only `Failed` permits resubmission.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    Succeeded,
    Canceled,
    Failed,
    TimedOut,
}

impl PaymentIntentStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentIntentStatus::Succeeded | PaymentIntentStatus::Canceled
        )
    }

    /// States from which `submit` may be attempted.
    pub fn accepts_submission(self) -> bool {
        matches!(
            self,
            PaymentIntentStatus::RequiresPaymentMethod
                | PaymentIntentStatus::Failed
                | PaymentIntentStatus::TimedOut
        )
    }
}

/// Handle representing an attempted payment, independent of the bookings
/// it pays for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub booking_ids: Vec<Uuid>,
    /// Whole rupees; no minor units.
    pub amount: i64,
    pub currency: String,
    pub status: PaymentIntentStatus,
    pub client_secret: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a rental booking, owned by the booking ledger.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

/// Input for creating a booking ahead of intent creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub listing_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Whole rupees.
    pub total_price: i64,
}

const TAX_SHARE: Decimal = dec!(0.18);

/// Read-only summary generated after a successful payment.
///
/// Subtotal and tax are back-calculated from the tax-inclusive total at a
/// fixed 18% share. That mirrors what the storefront prints on receipts; it
/// is a display rule, not an invoicing engine.
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub booking_ids: Vec<Uuid>,
    pub total_amount: i64,
    pub payment_intent_id: String,
    pub payment_date: DateTime<Utc>,
    pub customer_name: String,
}

impl Receipt {
    pub fn subtotal(&self) -> Decimal {
        (Decimal::from(self.total_amount) * (Decimal::ONE - TAX_SHARE)).round_dp(2)
    }

    pub fn tax(&self) -> Decimal {
        (Decimal::from(self.total_amount) * TAX_SHARE).round_dp(2)
    }

    /// Renders the printable receipt document.
    pub fn to_document(&self) -> String {
        let mut doc = String::new();
        doc.push_str("RENTKART PAYMENT RECEIPT\n");
        doc.push_str("========================\n\n");
        doc.push_str(&format!("Customer:       {}\n", self.customer_name));
        doc.push_str(&format!("Transaction:    {}\n", self.payment_intent_id));
        doc.push_str(&format!(
            "Date:           {}\n",
            self.payment_date.format("%d %b %Y %H:%M UTC")
        ));
        doc.push_str("\nBookings:\n");
        for id in &self.booking_ids {
            doc.push_str(&format!("  - {}\n", id));
        }
        doc.push_str(&format!("\nSubtotal:       INR {}\n", self.subtotal()));
        doc.push_str(&format!("GST (18%):      INR {}\n", self.tax()));
        doc.push_str(&format!("Total paid:     INR {}\n", self.total_amount));
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_receipt(total: i64) -> Receipt {
        Receipt {
            booking_ids: vec![Uuid::new_v4()],
            total_amount: total,
            payment_intent_id: "pi_sample".to_string(),
            payment_date: Utc::now(),
            customer_name: "Asha Rao".to_string(),
        }
    }

    #[test]
    fn line_total_multiplies_price_by_quantity() {
        let line = CartLine {
            listing: ListingRef {
                id: Uuid::new_v4(),
                title: "DSLR Camera".to_string(),
                price: 350,
            },
            quantity: 3,
        };
        assert_eq!(line.line_total(), 1050);
    }

    #[test]
    fn receipt_splits_tax_out_of_gross_total() {
        let receipt = sample_receipt(1229);
        assert_eq!(receipt.subtotal(), dec!(1007.78));
        assert_eq!(receipt.tax(), dec!(221.22));
        assert_eq!(receipt.subtotal() + receipt.tax(), dec!(1229.00));
    }

    #[test]
    fn receipt_document_names_the_transaction() {
        let receipt = sample_receipt(500);
        let doc = receipt.to_document();
        assert!(doc.contains("pi_sample"));
        assert!(doc.contains("Asha Rao"));
        assert!(doc.contains("Total paid:     INR 500"));
    }

    #[test]
    fn terminal_statuses_reject_submission() {
        assert!(PaymentIntentStatus::Succeeded.is_terminal());
        assert!(PaymentIntentStatus::Canceled.is_terminal());
        assert!(!PaymentIntentStatus::Failed.is_terminal());

        assert!(PaymentIntentStatus::RequiresPaymentMethod.accepts_submission());
        assert!(PaymentIntentStatus::Failed.accepts_submission());
        assert!(PaymentIntentStatus::TimedOut.accepts_submission());
        assert!(!PaymentIntentStatus::Processing.accepts_submission());
        assert!(!PaymentIntentStatus::Succeeded.accepts_submission());
    }

    #[test]
    fn statuses_serialize_snake_case() {
        let json = serde_json::to_string(&PaymentIntentStatus::RequiresPaymentMethod)
            .expect("serialize");
        assert_eq!(json, r#""requires_payment_method""#);
        assert_eq!(BookingStatus::Confirmed.to_string(), "confirmed");
    }

    #[test]
    fn card_details_require_all_four_fields() {
        let card = CardDetails {
            card_number: "4111111111111111".to_string(),
            card_holder: String::new(),
            expiry: "12/27".to_string(),
            cvv: "123".to_string(),
        };
        let errs = card.validate().expect_err("missing holder must fail");
        assert!(errs.field_errors().contains_key("card_holder"));
        assert!(!errs.field_errors().contains_key("card_number"));
    }
}

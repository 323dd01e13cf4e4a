use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{BookingRequest, BookingStatus};

/// External booking record, as far as the checkout core sees it.
#[derive(Debug, Clone)]
pub struct BookingRecord {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub start_date: chrono::NaiveDate,
    pub end_date: chrono::NaiveDate,
    pub total_price: i64,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Port onto the booking status ledger.
///
/// The ledger is consumed, not owned: the payment core only ever creates
/// pending bookings and advances them to confirmed. `confirm_booking` must be
/// idempotent — confirming an already-confirmed booking is a no-op.
#[async_trait]
pub trait BookingLedger: Send + Sync {
    async fn create_booking(&self, request: &BookingRequest) -> Result<Uuid, ServiceError>;
    async fn confirm_booking(&self, booking_id: Uuid) -> Result<(), ServiceError>;
    async fn booking_status(&self, booking_id: Uuid) -> Result<BookingStatus, ServiceError>;
}

/// In-memory ledger for tests and the demo binary.
///
/// `set_confirm_failure` forces `confirm_booking` to fail, which is how the
/// partial-success path (payment succeeded, confirmation did not) is
/// exercised.
#[derive(Debug, Default)]
pub struct InMemoryBookingLedger {
    bookings: DashMap<Uuid, BookingRecord>,
    fail_confirmations: AtomicBool,
}

impl InMemoryBookingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_confirm_failure(&self, fail: bool) {
        self.fail_confirmations.store(fail, Ordering::SeqCst);
    }

    pub fn booking(&self, booking_id: Uuid) -> Option<BookingRecord> {
        self.bookings.get(&booking_id).map(|r| r.clone())
    }
}

#[async_trait]
impl BookingLedger for InMemoryBookingLedger {
    async fn create_booking(&self, request: &BookingRequest) -> Result<Uuid, ServiceError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.bookings.insert(
            id,
            BookingRecord {
                id,
                listing_id: request.listing_id,
                start_date: request.start_date,
                end_date: request.end_date,
                total_price: request.total_price,
                status: BookingStatus::Pending,
                created_at: now,
                updated_at: now,
            },
        );
        info!("Created booking {} for listing {}", id, request.listing_id);
        Ok(id)
    }

    async fn confirm_booking(&self, booking_id: Uuid) -> Result<(), ServiceError> {
        if self.fail_confirmations.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "booking service unavailable".to_string(),
            ));
        }

        let mut record = self
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {} not found", booking_id)))?;

        match record.status {
            BookingStatus::Pending => {
                record.status = BookingStatus::Confirmed;
                record.updated_at = Utc::now();
                info!("Confirmed booking {}", booking_id);
                Ok(())
            }
            // Re-confirming is a no-op, not an error.
            BookingStatus::Confirmed => Ok(()),
            other => Err(ServiceError::InvalidStatus(format!(
                "Booking {} cannot be confirmed from status {}",
                booking_id, other
            ))),
        }
    }

    async fn booking_status(&self, booking_id: Uuid) -> Result<BookingStatus, ServiceError> {
        self.bookings
            .get(&booking_id)
            .map(|r| r.status)
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {} not found", booking_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn request() -> BookingRequest {
        BookingRequest {
            listing_id: Uuid::new_v4(),
            start_date: NaiveDate::from_ymd_opt(2025, 7, 1).expect("valid date"),
            end_date: NaiveDate::from_ymd_opt(2025, 7, 4).expect("valid date"),
            total_price: 1050,
        }
    }

    #[tokio::test]
    async fn created_bookings_start_pending() {
        let ledger = InMemoryBookingLedger::new();
        let id = ledger.create_booking(&request()).await.expect("create");
        assert_eq!(
            ledger.booking_status(id).await.expect("status"),
            BookingStatus::Pending
        );
    }

    #[tokio::test]
    async fn confirm_is_idempotent() {
        let ledger = InMemoryBookingLedger::new();
        let id = ledger.create_booking(&request()).await.expect("create");

        ledger.confirm_booking(id).await.expect("first confirm");
        ledger.confirm_booking(id).await.expect("second confirm is a no-op");

        assert_eq!(
            ledger.booking_status(id).await.expect("status"),
            BookingStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn confirm_from_cancelled_is_rejected() {
        let ledger = InMemoryBookingLedger::new();
        let id = ledger.create_booking(&request()).await.expect("create");
        ledger
            .bookings
            .get_mut(&id)
            .expect("record")
            .status = BookingStatus::Cancelled;

        let err = ledger.confirm_booking(id).await.expect_err("must reject");
        assert!(matches!(err, ServiceError::InvalidStatus(_)));
    }

    #[tokio::test]
    async fn unknown_booking_is_not_found() {
        let ledger = InMemoryBookingLedger::new();
        let err = ledger
            .confirm_booking(Uuid::new_v4())
            .await
            .expect_err("must fail");
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn injected_failure_surfaces_as_external_error() {
        let ledger = InMemoryBookingLedger::new();
        let id = ledger.create_booking(&request()).await.expect("create");
        ledger.set_confirm_failure(true);

        let err = ledger.confirm_booking(id).await.expect_err("forced failure");
        assert!(matches!(err, ServiceError::ExternalServiceError(_)));

        // Status must be untouched by the failed call.
        assert_eq!(
            ledger.booking_status(id).await.expect("status"),
            BookingStatus::Pending
        );
    }
}

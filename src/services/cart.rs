use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::{ServiceError, StorageError};
use crate::events::{Event, EventSender};
use crate::models::{CartLine, ListingRef};
use crate::storage::CartStorage;

/// Single source of truth for what the current visitor intends to rent.
///
/// The store is shared across every UI surface; all mutation goes through
/// this API and notifies subscribers through the event channel. Persistence
/// is write-through: the new line list is serialized to the storage port
/// before the in-memory state is committed, so a reload immediately after a
/// mutation never loses or duplicates state. A failed write leaves memory
/// untouched and propagates.
pub struct CartStore {
    lines: Mutex<Vec<CartLine>>,
    storage: Arc<dyn CartStorage>,
    events: EventSender,
    storage_key: String,
}

impl CartStore {
    /// Builds the store, rehydrating from the persisted snapshot.
    ///
    /// A missing snapshot is an empty cart; so is a corrupt one — startup
    /// never fails on bad persisted data, it logs and recovers.
    pub fn new(
        storage: Arc<dyn CartStorage>,
        events: EventSender,
        storage_key: impl Into<String>,
    ) -> Self {
        let storage_key = storage_key.into();
        let lines = match storage.read(&storage_key) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<CartLine>>(&raw) {
                Ok(lines) => lines,
                Err(e) => {
                    warn!("Discarding corrupt cart snapshot: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Cart snapshot unreadable, starting empty: {}", e);
                Vec::new()
            }
        };

        Self {
            lines: Mutex::new(lines),
            storage,
            events,
            storage_key,
        }
    }

    /// Adds a listing: an existing line gains one unit, a new listing gets a
    /// line with quantity 1.
    #[instrument(skip(self, listing), fields(listing_id = %listing.id))]
    pub async fn add_item(&self, listing: ListingRef) -> Result<(), ServiceError> {
        let event = {
            let mut guard = self.lock();
            let mut next = guard.clone();

            let event = match next.iter_mut().find(|l| l.listing.id == listing.id) {
                Some(line) => {
                    line.quantity += 1;
                    Event::CartItemUpdated {
                        listing_id: listing.id,
                        quantity: line.quantity,
                    }
                }
                None => {
                    next.push(CartLine {
                        listing: listing.clone(),
                        quantity: 1,
                    });
                    Event::CartItemAdded {
                        listing_id: listing.id,
                        quantity: 1,
                    }
                }
            };

            self.persist(&next)?;
            *guard = next;
            event
        };

        info!("Added listing {} to cart", listing.id);
        self.events.send_or_log(event).await;
        Ok(())
    }

    /// Removes the line for a listing. Removing an absent id is a silent
    /// no-op.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, listing_id: Uuid) -> Result<(), ServiceError> {
        {
            let mut guard = self.lock();
            if !guard.iter().any(|l| l.listing.id == listing_id) {
                return Ok(());
            }

            let next: Vec<CartLine> = guard
                .iter()
                .filter(|l| l.listing.id != listing_id)
                .cloned()
                .collect();
            self.persist(&next)?;
            *guard = next;
        }

        info!("Removed listing {} from cart", listing_id);
        self.events.send_or_log(Event::CartItemRemoved(listing_id)).await;
        Ok(())
    }

    /// Sets the quantity of an existing line.
    ///
    /// Quantities below 1 are rejected rather than treated as removal; lines
    /// leave the cart only through `remove_item` or `clear`.
    #[instrument(skip(self))]
    pub async fn set_quantity(&self, listing_id: Uuid, quantity: u32) -> Result<(), ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::InvalidInput(
                "quantity must be at least 1; remove the line instead".to_string(),
            ));
        }

        let event = {
            let mut guard = self.lock();
            let mut next = guard.clone();
            let line = next
                .iter_mut()
                .find(|l| l.listing.id == listing_id)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Listing {} not in cart", listing_id))
                })?;
            line.quantity = quantity;

            self.persist(&next)?;
            *guard = next;
            Event::CartItemUpdated {
                listing_id,
                quantity,
            }
        };

        self.events.send_or_log(event).await;
        Ok(())
    }

    /// Empties the cart. Invoked by a successful payment confirmation, and
    /// available to the user as an explicit action.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), ServiceError> {
        {
            let mut guard = self.lock();
            let next: Vec<CartLine> = Vec::new();
            self.persist(&next)?;
            *guard = next;
        }

        info!("Cleared cart");
        self.events.send_or_log(Event::CartCleared).await;
        Ok(())
    }

    /// Sum of `price × quantity` over all lines, whole rupees.
    pub fn total(&self) -> i64 {
        self.lock().iter().map(CartLine::line_total).sum()
    }

    /// Total number of units across all lines.
    pub fn count(&self) -> u32 {
        self.lock().iter().map(|l| l.quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the current lines.
    pub fn lines(&self) -> Vec<CartLine> {
        self.lock().clone()
    }

    fn persist(&self, lines: &[CartLine]) -> Result<(), ServiceError> {
        let snapshot = serde_json::to_string(lines).map_err(StorageError::from)?;
        self.storage.write(&self.storage_key, &snapshot)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CartLine>> {
        // Single mutation path; a poisoned lock only means a previous caller
        // panicked mid-update, and the committed state is still consistent.
        self.lines.lock().unwrap_or_else(|e| e.into_inner())
    }
}

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the checkout core.
///
/// Every cart mutation and every payment transition notifies subscribers
/// through this channel; UI surfaces (badge counts, toasts, spinners) listen
/// on the receiving end instead of polling shared state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartItemAdded {
        listing_id: Uuid,
        quantity: u32,
    },
    CartItemUpdated {
        listing_id: Uuid,
        quantity: u32,
    },
    CartItemRemoved(Uuid),
    CartCleared,

    // Checkout events
    CheckoutStarted {
        session_id: Uuid,
    },
    ShippingCaptured {
        session_id: Uuid,
    },

    // Payment events
    PaymentIntentCreated {
        intent_id: String,
        amount: i64,
    },
    PaymentProcessing {
        intent_id: String,
    },
    PaymentSucceeded {
        intent_id: String,
    },
    PaymentFailed {
        intent_id: String,
        reason: String,
    },
    PaymentTimedOut {
        intent_id: String,
    },
    PaymentCancelled {
        intent_id: String,
    },

    // Booking events
    BookingConfirmed(Uuid),
    BookingConfirmationFailed {
        booking_id: Uuid,
        error: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing channel failures to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when no receiver is left.
    ///
    /// Notifications are advisory; a closed channel must never abort a cart
    /// mutation or a payment transition.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("Dropping event, channel closed: {}", e);
        }
    }
}

/// Creates a bounded event channel sized for a single interactive session.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the event stream, logging each notification.
///
/// The demo binary spawns this; embedding applications typically install
/// their own consumer instead.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PaymentFailed { intent_id, reason } => {
                warn!("Payment {} failed: {}", intent_id, reason);
            }
            Event::BookingConfirmationFailed { booking_id, error } => {
                warn!("Booking {} confirmation failed: {}", booking_id, error);
            }
            other => info!("Received event: {:?}", other),
        }
    }

    info!("Event channel closed, stopping event loop");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_event() {
        let (sender, mut rx) = channel(4);
        sender
            .send(Event::CartCleared)
            .await
            .expect("send should succeed");

        assert!(matches!(rx.recv().await, Some(Event::CartCleared)));
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (sender, rx) = channel(1);
        drop(rx);

        // Must not panic or error.
        sender.send_or_log(Event::CartCleared).await;
    }

    #[test]
    fn events_round_trip_through_json() {
        let event = Event::PaymentIntentCreated {
            intent_id: "pi_test".to_string(),
            amount: 1229,
        };
        let json = serde_json::to_string(&event).expect("serialize");
        let back: Event = serde_json::from_str(&json).expect("deserialize");
        assert!(matches!(
            back,
            Event::PaymentIntentCreated { amount: 1229, .. }
        ));
    }
}

//! Rentkart checkout core
//!
//! Cart, checkout, payment and booking-confirmation pipeline for the
//! Rentkart rental marketplace. The crate owns the client-held cart and the
//! payment intent state machine; listings, authentication and the booking
//! ledger are external collaborators reached through ports
//! ([`storage::CartStorage`], [`gateway::PaymentGateway`],
//! [`bookings::BookingLedger`]).
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod bookings;
pub mod config;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod models;
pub mod services;
pub mod storage;

use std::sync::Arc;

pub use errors::{ServiceError, StorageError};
pub use models::{
    BookingRequest, BookingStatus, CardDetails, CartLine, ListingRef, PaymentIntent,
    PaymentIntentStatus, Receipt, ShippingSnapshot,
};

use bookings::BookingLedger;
use config::AppConfig;
use events::EventSender;
use gateway::PaymentGateway;
use services::{CartStore, CheckoutService, PaymentService};
use storage::CartStorage;

/// Fully wired checkout core: one cart store plus the two stage services,
/// sharing a config and an event channel.
#[derive(Clone)]
pub struct CheckoutCore {
    pub cart: Arc<CartStore>,
    pub checkout: CheckoutService,
    pub payments: PaymentService,
    pub events: EventSender,
}

impl CheckoutCore {
    pub fn new(
        config: Arc<AppConfig>,
        storage: Arc<dyn CartStorage>,
        gateway: Arc<dyn PaymentGateway>,
        bookings: Arc<dyn BookingLedger>,
        events: EventSender,
    ) -> Self {
        let cart = Arc::new(CartStore::new(
            storage,
            events.clone(),
            config.cart_storage_key.clone(),
        ));
        let checkout = CheckoutService::new(cart.clone(), events.clone(), config.clone());
        let payments = PaymentService::new(gateway, bookings, cart.clone(), events.clone(), config);

        Self {
            cart,
            checkout,
            payments,
            events,
        }
    }
}

use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;

use rentkart_checkout::bookings::{BookingLedger, InMemoryBookingLedger};
use rentkart_checkout::gateway::{PaymentGateway, RestBackend, SimulatedGateway};
use rentkart_checkout::models::{BookingRequest, CardDetails, ListingRef};
use rentkart_checkout::services::{PaymentOutcome, ShippingForm};
use rentkart_checkout::storage::InMemoryStorage;
use rentkart_checkout::CheckoutCore;

/// Drives one scripted checkout end to end and prints the receipt.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = rentkart_checkout::config::load_config()?;
    rentkart_checkout::config::init_tracing(cfg.log_level(), cfg.log_json);

    let (event_sender, event_rx) = rentkart_checkout::events::channel(1024);
    tokio::spawn(rentkart_checkout::events::process_events(event_rx));

    let cfg = Arc::new(cfg);
    let (gateway, ledger): (Arc<dyn PaymentGateway>, Arc<dyn BookingLedger>) =
        match cfg.gateway.mode.as_str() {
            "rest" => {
                let base_url = cfg
                    .gateway
                    .base_url
                    .clone()
                    .context("gateway.base_url is required in rest mode")?;
                let backend = Arc::new(RestBackend::new(
                    base_url,
                    cfg.gateway.session_token.clone(),
                ));
                (backend.clone(), backend)
            }
            _ => (
                Arc::new(SimulatedGateway::new()),
                Arc::new(InMemoryBookingLedger::new()),
            ),
        };

    let app = CheckoutCore::new(
        cfg.clone(),
        Arc::new(InMemoryStorage::new()),
        gateway,
        ledger,
        event_sender,
    );

    // Fill the cart.
    let camera = ListingRef {
        id: Uuid::new_v4(),
        title: "Canon EOS R10 (per day)".to_string(),
        price: 850,
    };
    let tent = ListingRef {
        id: Uuid::new_v4(),
        title: "4-person trekking tent (per day)".to_string(),
        price: 150,
    };
    app.cart.add_item(camera.clone()).await?;
    app.cart.add_item(tent.clone()).await?;
    app.cart.add_item(tent.clone()).await?;
    info!(
        "Cart ready: {} units, total INR {}",
        app.cart.count(),
        app.cart.total()
    );

    // Checkout: shipping snapshot.
    let mut session = app.checkout.begin().await?;
    app.checkout
        .set_shipping(
            &mut session,
            ShippingForm {
                first_name: "Asha".to_string(),
                last_name: "Rao".to_string(),
                address: "14 MG Road".to_string(),
                city: "Bengaluru".to_string(),
                state: "Karnataka".to_string(),
                pincode: "560001".to_string(),
                phone: "+91 9876543210".to_string(),
            },
        )
        .await?;

    // Bookings for the rental period, then the payment intent.
    let start_date = NaiveDate::from_ymd_opt(2025, 7, 1).context("valid date")?;
    let end_date = NaiveDate::from_ymd_opt(2025, 7, 4).context("valid date")?;
    let requests: Vec<BookingRequest> = session
        .lines
        .iter()
        .map(|line| BookingRequest {
            listing_id: line.listing.id,
            start_date,
            end_date,
            total_price: line.line_total(),
        })
        .collect();

    let mut payment = app.payments.start(&session, &requests).await?;
    info!(
        "Intent {} for INR {}",
        payment.intent.id, payment.intent.amount
    );

    let outcome = app
        .payments
        .submit(
            &mut payment,
            &CardDetails {
                card_number: "4111111111111111".to_string(),
                card_holder: "Asha Rao".to_string(),
                expiry: "12/27".to_string(),
                cvv: "123".to_string(),
            },
        )
        .await?;

    match outcome {
        PaymentOutcome::Succeeded(confirmation) => {
            for warning in &confirmation.booking_warnings {
                info!("warning: {}", warning);
            }
            println!("{}", confirmation.receipt.to_document());
        }
        other => anyhow::bail!("payment did not succeed: {:?}", other),
    }

    Ok(())
}

pub mod cart;
pub mod checkout;
pub mod payments;

pub use cart::CartStore;
pub use checkout::{CheckoutService, CheckoutSession, CheckoutStep, ShippingForm};
pub use payments::{PaymentConfirmation, PaymentOutcome, PaymentService, PaymentSession};

//! # Studio Core
//!
//! Domain types and contracts for the studio booking platform.
//!
//! This crate has no I/O. It defines:
//!
//! - **Types**: identifiers, [`types::Money`], packages, purchases, sessions,
//!   reservations and the authenticated [`types::Caller`]
//! - **Reference**: the tagged [`reference::PaymentReference`] carried through
//!   the payment gateway
//! - **Errors**: [`error::BookingError`] and its [`error::ErrorKind`]
//!   classification
//! - **Environment**: the [`environment::Clock`] abstraction
//! - **Store**: the transactional [`store::BookingStore`] contract
//! - **Gateway**: the [`gateway::PaymentGateway`] contract
//! - **Reconciliation**: the [`reconciliation::ReconciliationLog`] hook for
//!   captured payments that could not be applied
//!
//! Implementations live elsewhere: `studio-postgres` and `studio-testing` for
//! the store, `studio-booking` for the engines and the HTTP gateway client.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod environment;
pub mod error;
pub mod gateway;
pub mod reconciliation;
pub mod reference;
pub mod store;
pub mod types;

/// Common imports for crates building on the core.
pub mod prelude {
    pub use crate::environment::{Clock, SystemClock};
    pub use crate::error::{BookingError, ErrorKind};
    pub use crate::gateway::{
        CheckoutItem, CheckoutSession, GatewayError, GatewayPayment, GatewayPaymentStatus,
        PaymentGateway, PaymentIntentRequest, ReturnUrls,
    };
    pub use crate::reconciliation::{
        NotificationChannel, ReconciliationEntry, ReconciliationLog, ReconciliationReason,
    };
    pub use crate::reference::{PaymentReference, ReferenceError};
    pub use crate::store::{BookingStore, BookingTx, StoreError, StoreFuture};
    pub use crate::types::{
        Caller, ClassSession, ClassType, ClassTypeId, ExternalPaymentId, Funding, InstructorId,
        Money, Package, PackageId, PaymentIntent, PaymentMethod, PaymentStatus, Purchase,
        PurchaseId, Reservation, ReservationId, Role, SessionId, UserId,
    };
}

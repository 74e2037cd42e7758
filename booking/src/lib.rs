//! Studio booking service - purchases, reservations and payment confirmation
//!
//! Members buy credit packages and book class sessions, either with a credit
//! or by paying for a single class through the payment gateway. This crate is
//! the consistency core behind that:
//!
//! - **Purchase engine**: package purchases under the one-active-package rule
//! - **Reservation engine**: seats and credits change together or not at all
//! - **Payment confirmation**: redirect returns and webhooks race to apply
//!   the same payment; exactly one of them does
//! - **Reconciliation hook**: captured money that could not be applied is
//!   recorded, never reported to the payer as a failed payment
//!
//! # Architecture
//!
//! ```text
//!   HTTP (api/*)                    Gateway (MercadoPago)
//!        │                                  │
//!        ▼                                  ▼
//! ┌──────────────┐ ┌──────────────┐ ┌──────────────────┐ ┌──────────┐
//! │   Purchase   │ │ Reservation  │ │     Payment      │ │ Checkout │
//! │    Engine    │ │    Engine    │ │   Confirmation   │ │          │
//! └──────────────┘ └──────────────┘ └──────────────────┘ └──────────┘
//!        │                │                  │
//!        └────────────────┴──────────────────┘
//!                         │  one transaction per attempt,
//!                         │  retried on write conflicts
//!                         ▼
//!                ┌─────────────────┐
//!                │  BookingStore   │
//!                │  (PostgreSQL)   │
//!                └─────────────────┘
//! ```
//!
//! # Concurrency
//!
//! Every check-then-act sequence runs inside one store transaction that
//! first takes the user's lock. Seat and credit counters only move through
//! conditional updates, so two bookings cannot both take the last seat. The
//! external payment id is recorded as applied in the same transaction that
//! applies it, and that record is kept after the seat is cancelled. A
//! confirmation that loses a race fails its commit, and the retry finds the
//! record and reports the payment as already processed.
//!
//! ```text
//! redirect ─┐                      ┌─ payment_applied? ── yes → AlreadyProcessed
//!           ├─ lock user ─ confirm ┤
//! webhook ──┘                      └─ no → insert + take seat + record → commit
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod checkout;
pub mod config;
pub mod confirmation;
pub mod eligibility;
pub mod gateway;
pub mod metrics;
pub mod purchase;
pub mod reconciliation;
pub mod reservation;
pub mod server;

pub use checkout::Checkout;
pub use config::{BusinessRules, Config};
pub use confirmation::{Confirmation, PaymentConfirmation, RedirectOutcome, WebhookAck};
pub use eligibility::{Eligibility, EligibilityReason, purchase_eligibility};
pub use gateway::MercadoPagoClient;
pub use purchase::{PurchaseEngine, PurchaseOptions, PurchaseOutcome};
pub use reconciliation::TracingReconciliationLog;
pub use reservation::{CancelOutcome, ReservationEngine, ReservationOutcome};
pub use server::{AppState, build_router};

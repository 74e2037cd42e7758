//! Business metrics for the booking service.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `studio_reservations_total{status}`: reservations by outcome
//!   (`created`, `awaiting_payment`, `confirmed_by_payment`, `cancelled`,
//!   `rejected`)
//! - `studio_purchases_total{status}`: purchases by outcome (`created`,
//!   `already_processed`, `rejected`, `expired`)
//! - `studio_payment_notifications_total{channel,outcome}`: redirect and
//!   webhook notifications by outcome
//! - `studio_reconciliation_entries_total{reason}`: captured payments that
//!   need manual follow-up
//! - `studio_checkouts_total{kind}`: payment intents created at the gateway

use metrics::describe_counter;
use studio_core::reconciliation::{NotificationChannel, ReconciliationReason};

/// Register descriptions for every business metric.
///
/// Call once at startup, after the recorder is installed.
pub fn register_business_metrics() {
    describe_counter!(
        "studio_reservations_total",
        "Reservations by outcome (created, awaiting_payment, confirmed_by_payment, cancelled, rejected)"
    );
    describe_counter!(
        "studio_purchases_total",
        "Package purchases by outcome (created, already_processed, rejected, expired)"
    );
    describe_counter!(
        "studio_payment_notifications_total",
        "Payment notifications by channel (redirect, webhook) and outcome"
    );
    describe_counter!(
        "studio_reconciliation_entries_total",
        "Captured payments recorded for manual reconciliation, by reason"
    );
    describe_counter!(
        "studio_checkouts_total",
        "Payment intents created at the gateway, by kind"
    );

    tracing::info!("Business metrics registered");
}

/// Record a reservation outcome.
pub fn record_reservation(status: &'static str) {
    metrics::counter!("studio_reservations_total", "status" => status).increment(1);
}

/// Record a purchase outcome.
pub fn record_purchase(status: &'static str) {
    metrics::counter!("studio_purchases_total", "status" => status).increment(1);
}

/// Record how a payment notification was handled.
pub fn record_notification(channel: NotificationChannel, outcome: &'static str) {
    metrics::counter!(
        "studio_payment_notifications_total",
        "channel" => channel.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record one reconciliation entry.
pub fn record_reconciliation(reason: ReconciliationReason) {
    metrics::counter!("studio_reconciliation_entries_total", "reason" => reason.as_str())
        .increment(1);
}

/// Record a created checkout.
pub fn record_checkout(kind: &'static str) {
    metrics::counter!("studio_checkouts_total", "kind" => kind).increment(1);
}

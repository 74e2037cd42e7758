//! Manual reconciliation hook.
//!
//! When a payment was captured but its effect could not be applied (the
//! session sold out in the meantime, the package vanished, the payer was
//! charged twice), the confirmation protocol records a [`ReconciliationEntry`]
//! for staff to follow up. The payer is never shown a failed purchase for
//! money that was already taken.

use crate::reference::PaymentReference;
use crate::types::ExternalPaymentId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Which confirmation path observed the payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    /// The payer's browser returning from checkout
    Redirect,
    /// Asynchronous gateway notification
    Webhook,
}

impl NotificationChannel {
    /// Label used in logs and metrics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Redirect => "redirect",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a captured payment needs manual follow-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationReason {
    /// Paid single class whose session filled up before confirmation
    SessionFull,
    /// Paid single class whose session no longer exists
    SessionNotFound,
    /// Paid package that is no longer in the catalog
    PackageNotFound,
    /// Paid package the purchase rules refused
    PurchaseRejected,
    /// The payer already held the seat; this charge produced nothing
    DuplicateCharge,
    /// Unexpected failure while applying the payment
    ProcessingError,
}

impl ReconciliationReason {
    /// Label used in logs and metrics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SessionFull => "session_full",
            Self::SessionNotFound => "session_not_found",
            Self::PackageNotFound => "package_not_found",
            Self::PurchaseRejected => "purchase_rejected",
            Self::DuplicateCharge => "duplicate_charge",
            Self::ProcessingError => "processing_error",
        }
    }
}

/// One captured payment awaiting manual reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReconciliationEntry {
    /// Gateway payment id
    pub payment_id: ExternalPaymentId,
    /// Path that observed the payment
    pub channel: NotificationChannel,
    /// Decoded reference, when it could be decoded
    pub reference: Option<PaymentReference>,
    /// Classification
    pub reason: ReconciliationReason,
    /// Free-form detail (usually the error message)
    pub detail: String,
    /// When the entry was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Sink for reconciliation entries.
pub trait ReconciliationLog: Send + Sync {
    /// Record an entry. Must not fail; implementations log their own errors.
    fn record(&self, entry: ReconciliationEntry);
}

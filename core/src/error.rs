//! Error taxonomy shared by every booking operation.
//!
//! Engines return [`BookingError`]; callers branch on [`BookingError::kind`]
//! rather than on individual variants. Store and gateway failures convert in
//! via `From`, so `?` works across the layers.

use crate::gateway::GatewayError;
use crate::store::StoreError;
use crate::types::{PackageId, Purchase, PurchaseId, ReservationId, SessionId};
use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a [`BookingError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed input; fixable by resubmission
    Validation,
    /// Referenced entity absent
    NotFound,
    /// Business-rule violation
    Conflict,
    /// Caller is not allowed to perform the operation
    Forbidden,
    /// Write conflict that survived the retry budget
    Transient,
    /// Payment gateway unreachable or erroring; retryable by the caller
    ExternalService,
    /// Anything else (storage failure, broken invariant)
    Internal,
}

/// Errors returned by the purchase and reservation engines and the payment
/// confirmation protocol.
#[derive(Error, Debug)]
pub enum BookingError {
    /// Input failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Unknown payment method name.
    #[error("Invalid payment method: {0}")]
    InvalidPaymentMethod(String),

    /// Session does not exist.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Package does not exist in the catalog.
    #[error("Package not found: {0}")]
    PackageNotFound(PackageId),

    /// Purchase does not exist.
    #[error("Purchase not found: {0}")]
    PurchaseNotFound(PurchaseId),

    /// Reservation does not exist.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The user already holds an active package.
    ///
    /// Carries the conflicting purchase so the client can display it.
    #[error("User already has an active package ({})", .0.id)]
    AlreadyActivePackage(Box<Purchase>),

    /// A completed reservation for this user and session already exists.
    #[error("Reservation already exists for this session")]
    DuplicateReservation,

    /// No seat left.
    #[error("Session is full")]
    SessionFull,

    /// The purchase has no credits left.
    #[error("No credits left in package")]
    NoCredits,

    /// The purchase validity period ended.
    #[error("Package has expired")]
    PackageExpired,

    /// The session already started.
    #[error("Session has already started")]
    SessionInPast,

    /// Reservations for sessions that already started cannot be cancelled.
    #[error("Cannot cancel a reservation for a past session")]
    CannotCancelPast,

    /// Caller is not authorized.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Storage layer failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Payment gateway failure.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BookingError {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidPaymentMethod(_) => ErrorKind::Validation,
            Self::SessionNotFound(_)
            | Self::PackageNotFound(_)
            | Self::PurchaseNotFound(_)
            | Self::ReservationNotFound(_) => ErrorKind::NotFound,
            Self::AlreadyActivePackage(_)
            | Self::DuplicateReservation
            | Self::SessionFull
            | Self::NoCredits
            | Self::PackageExpired
            | Self::SessionInPast
            | Self::CannotCancelPast => ErrorKind::Conflict,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Store(StoreError::Conflict(_) | StoreError::Timeout(_)) => ErrorKind::Transient,
            Self::Store(StoreError::Database(_)) | Self::Internal(_) => ErrorKind::Internal,
            Self::Gateway(_) => ErrorKind::ExternalService,
        }
    }

    /// Whether retrying the whole transaction may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    /// Stable machine-readable code for API responses and logs.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidPaymentMethod(_) => "INVALID_PAYMENT_METHOD",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::PackageNotFound(_) => "PACKAGE_NOT_FOUND",
            Self::PurchaseNotFound(_) => "PURCHASE_NOT_FOUND",
            Self::ReservationNotFound(_) => "RESERVATION_NOT_FOUND",
            Self::AlreadyActivePackage(_) => "ALREADY_ACTIVE_PACKAGE",
            Self::DuplicateReservation => "DUPLICATE_RESERVATION",
            Self::SessionFull => "SESSION_FULL",
            Self::NoCredits => "NO_CREDITS",
            Self::PackageExpired => "PACKAGE_EXPIRED",
            Self::SessionInPast => "SESSION_IN_PAST",
            Self::CannotCancelPast => "CANNOT_CANCEL_PAST",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Store(StoreError::Conflict(_)) => "WRITE_CONFLICT",
            Self::Store(StoreError::Timeout(_)) => "STORE_TIMEOUT",
            Self::Store(StoreError::Database(_)) => "STORE_ERROR",
            Self::Gateway(_) => "PAYMENT_GATEWAY_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflicts_are_transient() {
        let err = BookingError::from(StoreError::Conflict("40001".to_string()));
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.is_transient());

        let err = BookingError::from(StoreError::Database("connection reset".to_string()));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.is_transient());
    }

    #[test]
    fn business_rule_violations_are_conflicts() {
        for err in [
            BookingError::SessionFull,
            BookingError::NoCredits,
            BookingError::PackageExpired,
            BookingError::DuplicateReservation,
            BookingError::SessionInPast,
            BookingError::CannotCancelPast,
        ] {
            assert_eq!(err.kind(), ErrorKind::Conflict, "{err}");
            assert!(!err.is_transient());
        }
    }

    #[test]
    fn gateway_failures_are_external() {
        let err = BookingError::from(GatewayError::Unreachable("dns".to_string()));
        assert_eq!(err.kind(), ErrorKind::ExternalService);
        assert_eq!(err.code(), "PAYMENT_GATEWAY_ERROR");
    }

    #[test]
    fn invalid_payment_method_is_validation() {
        let err = BookingError::InvalidPaymentMethod("cash".to_string());
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

//! Reservation engine: booking and cancelling seats.
//!
//! Package bookings consume a credit, insert a completed reservation and take
//! a seat in one transaction. Single-class bookings only validate and hand
//! back a [`PaymentIntent`]; the seat is taken when the payment is confirmed.

use crate::config::ReservationRules;
use crate::metrics;
use serde::Serialize;
use std::sync::Arc;
use studio_core::environment::Clock;
use studio_core::error::{BookingError, ErrorKind};
use studio_core::store::{BookingStore, BookingTx};
use studio_core::types::{
    Caller, ClassSession, PaymentIntent, PaymentMethod, PurchaseId, Reservation, ReservationId,
    SessionId, UserId,
};
use studio_runtime::{RetryPolicy, retry_with_predicate};

/// Result of [`ReservationEngine::create_reservation`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReservationOutcome {
    /// Seat taken, paid with a package credit
    Confirmed {
        /// The completed reservation
        reservation: Reservation,
    },
    /// Nothing reserved yet; the payment must be confirmed first
    AwaitingPayment {
        /// Descriptor for checkout
        intent: PaymentIntent,
    },
}

/// Result of [`ReservationEngine::cancel_reservation`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    /// The deleted reservation
    pub reservation: Reservation,
    /// A package credit was given back
    pub credit_restored: bool,
    /// A seat was given back
    pub seat_released: bool,
}

/// Creates and cancels reservations.
pub struct ReservationEngine<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    rules: ReservationRules,
    retry: RetryPolicy,
}

impl<S: BookingStore> ReservationEngine<S> {
    /// Create an engine over `store`.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        rules: ReservationRules,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            rules,
            retry,
        }
    }

    /// Books `session_id` for `user_id`.
    ///
    /// Write conflicts from simultaneous bookings are retried with backoff;
    /// every other error is returned immediately.
    ///
    /// # Errors
    ///
    /// - [`BookingError::SessionNotFound`], [`BookingError::SessionFull`],
    ///   [`BookingError::SessionInPast`]
    /// - [`BookingError::DuplicateReservation`] when the user already holds a
    ///   seat
    /// - for packages: [`BookingError::Validation`] without a purchase id,
    ///   [`BookingError::PurchaseNotFound`] for a purchase the user does not
    ///   own, [`BookingError::NoCredits`], [`BookingError::PackageExpired`]
    #[tracing::instrument(skip_all, fields(user_id = %user_id, session_id = %session_id, method = %method))]
    pub async fn create_reservation(
        &self,
        user_id: UserId,
        session_id: SessionId,
        method: PaymentMethod,
        purchase_id: Option<PurchaseId>,
    ) -> Result<ReservationOutcome, BookingError> {
        let result = retry_with_predicate(
            &self.retry,
            "create_reservation",
            || self.try_create_reservation(user_id, session_id, method, purchase_id),
            BookingError::is_transient,
        )
        .await;

        match &result {
            Ok(ReservationOutcome::Confirmed { reservation }) => {
                metrics::record_reservation("created");
                tracing::info!(reservation_id = %reservation.id, "Reservation created");
            }
            Ok(ReservationOutcome::AwaitingPayment { .. }) => {
                metrics::record_reservation("awaiting_payment");
            }
            Err(err) if err.kind() == ErrorKind::Conflict => {
                metrics::record_reservation("rejected");
                tracing::debug!(error = %err, "Reservation rejected");
            }
            Err(_) => {}
        }

        result
    }

    async fn try_create_reservation(
        &self,
        user_id: UserId,
        session_id: SessionId,
        method: PaymentMethod,
        purchase_id: Option<PurchaseId>,
    ) -> Result<ReservationOutcome, BookingError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        tx.lock_user(user_id).await?;

        let session = tx
            .session_for_update(session_id)
            .await?
            .ok_or(BookingError::SessionNotFound(session_id))?;
        if session.is_full() {
            return Err(BookingError::SessionFull);
        }
        if session.has_started(now) {
            return Err(BookingError::SessionInPast);
        }
        if tx.completed_reservation(user_id, session_id).await?.is_some() {
            return Err(BookingError::DuplicateReservation);
        }

        match method {
            PaymentMethod::Package => {
                let purchase_id = purchase_id.ok_or_else(|| {
                    BookingError::Validation(
                        "purchase_id is required for package reservations".to_string(),
                    )
                })?;
                let purchase = tx
                    .purchase_for_update(purchase_id)
                    .await?
                    .filter(|p| p.user_id == user_id)
                    .ok_or(BookingError::PurchaseNotFound(purchase_id))?;
                if purchase.credits_left == 0 {
                    return Err(BookingError::NoCredits);
                }
                if purchase.is_expired(now) {
                    return Err(BookingError::PackageExpired);
                }

                if !tx.consume_credit(purchase_id).await? {
                    return Err(BookingError::NoCredits);
                }
                let reservation =
                    Reservation::with_package_credit(user_id, session_id, purchase_id, now);
                tx.insert_reservation(&reservation).await?;
                if !tx.try_reserve_seat(session_id).await? {
                    return Err(BookingError::SessionFull);
                }
                tx.commit().await?;

                Ok(ReservationOutcome::Confirmed { reservation })
            }
            PaymentMethod::SingleClass => {
                let stale = tx.delete_pending_reservations(user_id, session_id).await?;
                if stale > 0 {
                    tracing::debug!(stale, "Removed abandoned single-class attempts");
                }
                let session_label = session_label(&mut tx, &session).await?;
                tx.commit().await?;

                Ok(ReservationOutcome::AwaitingPayment {
                    intent: PaymentIntent {
                        user_id,
                        session_id,
                        price: self.rules.single_class_price,
                        session_label,
                    },
                })
            }
        }
    }

    /// Cancels a reservation on behalf of `caller`.
    ///
    /// Pending reservations are only deleted. Completed ones give their seat
    /// back, and package-funded ones also give their credit back.
    ///
    /// # Errors
    ///
    /// - [`BookingError::ReservationNotFound`]
    /// - [`BookingError::Forbidden`] unless the caller owns the reservation
    ///   or is an admin
    /// - [`BookingError::CannotCancelPast`] once the session has started
    #[tracing::instrument(skip_all, fields(reservation_id = %reservation_id, caller = %caller.user_id))]
    pub async fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
        caller: &Caller,
    ) -> Result<CancelOutcome, BookingError> {
        let result = retry_with_predicate(
            &self.retry,
            "cancel_reservation",
            || self.try_cancel_reservation(reservation_id, caller),
            BookingError::is_transient,
        )
        .await;

        if let Ok(outcome) = &result {
            metrics::record_reservation("cancelled");
            tracing::info!(
                credit_restored = outcome.credit_restored,
                seat_released = outcome.seat_released,
                "Reservation cancelled"
            );
        }

        result
    }

    async fn try_cancel_reservation(
        &self,
        reservation_id: ReservationId,
        caller: &Caller,
    ) -> Result<CancelOutcome, BookingError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let reservation = tx
            .reservation_for_update(reservation_id)
            .await?
            .ok_or(BookingError::ReservationNotFound(reservation_id))?;
        let session = tx
            .session_for_update(reservation.session_id)
            .await?
            .ok_or(BookingError::SessionNotFound(reservation.session_id))?;

        if !caller.is_admin() && reservation.user_id != caller.user_id {
            return Err(BookingError::Forbidden(
                "reservation belongs to another user".to_string(),
            ));
        }
        if session.has_started(now) {
            return Err(BookingError::CannotCancelPast);
        }

        tx.delete_reservation(reservation_id).await?;

        let credit_restored = match reservation.funding.purchase_id() {
            Some(purchase_id) => {
                let restored = tx.restore_credit(purchase_id).await?;
                if !restored {
                    tracing::warn!(%purchase_id, "Purchase already holds all its credits");
                }
                restored
            }
            None => false,
        };
        let seat_released = if reservation.is_completed() {
            tx.release_seat(reservation.session_id).await?
        } else {
            false
        };

        tx.commit().await?;

        Ok(CancelOutcome {
            reservation,
            credit_restored,
            seat_released,
        })
    }
}

/// Label shown on the checkout item, e.g. `Reformer - 2025-01-08 09:00`.
async fn session_label<T: BookingTx>(
    tx: &mut T,
    session: &ClassSession,
) -> Result<String, BookingError> {
    let name = tx
        .class_type(&session.class_type_id)
        .await?
        .map_or_else(|| "Class".to_string(), |class_type| class_type.name);
    Ok(format!(
        "{name} - {}",
        session.starts_at.format("%Y-%m-%d %H:%M")
    ))
}

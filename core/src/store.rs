//! Transactional store contract for the ledger and session capacity data.
//!
//! Engines never touch storage outside a transaction. Every check-then-mutate
//! sequence runs against one [`BookingTx`], which is either committed as a
//! whole or dropped, and dropping an uncommitted transaction rolls it back.
//!
//! # Counter guarantees
//!
//! The counter mutations ([`BookingTx::try_reserve_seat`],
//! [`BookingTx::consume_credit`]) are conditional at the storage layer: two
//! concurrent transactions can never both pass the bound and both commit.
//! Implementations report lost races and uniqueness collisions as
//! [`StoreError::Conflict`], which callers treat as retryable.
//!
//! # Implementations
//!
//! - `PostgresBookingStore` (in `studio-postgres`): production
//! - `InMemoryBookingStore` (in `studio-testing`): fast, deterministic tests

use crate::types::{
    ClassSession, ClassType, ClassTypeId, ExternalPaymentId, Package, PackageId, Purchase,
    PurchaseId, Reservation, ReservationId, SessionId, UserId,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors raised by a store implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Write conflict: serialization failure, deadlock or uniqueness collision.
    ///
    /// Retrying the whole transaction may succeed.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// The store did not answer within its timeout.
    #[error("Store timeout: {0}")]
    Timeout(String),

    /// Any other storage failure.
    #[error("Database error: {0}")]
    Database(String),
}

/// Entry point of a store: hands out transactions.
pub trait BookingStore: Send + Sync {
    /// Transaction type produced by [`BookingStore::begin`].
    type Tx: BookingTx + 'static;

    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if no connection could be acquired.
    fn begin(&self) -> StoreFuture<'_, Self::Tx>;
}

/// One all-or-nothing unit of work.
///
/// Methods suffixed `_for_update` lock the returned row until the transaction
/// ends. Methods that return `bool` report whether a conditional write hit a
/// row.
pub trait BookingTx: Send {
    /// Serializes this transaction against every other transaction that locks
    /// the same user, until commit or rollback.
    fn lock_user(&mut self, user_id: UserId) -> StoreFuture<'_, ()>;

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    /// Loads a catalog package.
    fn package<'a>(&'a mut self, id: &'a PackageId) -> StoreFuture<'a, Option<Package>>;

    /// Inserts or replaces a catalog package.
    fn save_package<'a>(&'a mut self, package: &'a Package) -> StoreFuture<'a, ()>;

    /// Loads a class type.
    fn class_type<'a>(&'a mut self, id: &'a ClassTypeId) -> StoreFuture<'a, Option<ClassType>>;

    /// Inserts or replaces a class type.
    fn save_class_type<'a>(&'a mut self, class_type: &'a ClassType) -> StoreFuture<'a, ()>;

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Loads and locks a session.
    fn session_for_update(&mut self, id: SessionId) -> StoreFuture<'_, Option<ClassSession>>;

    /// Inserts a new session.
    fn insert_session<'a>(&'a mut self, session: &'a ClassSession) -> StoreFuture<'a, ()>;

    /// Increments `reserved_count` iff it is below `capacity`.
    fn try_reserve_seat(&mut self, id: SessionId) -> StoreFuture<'_, bool>;

    /// Decrements `reserved_count` iff it is above zero.
    fn release_seat(&mut self, id: SessionId) -> StoreFuture<'_, bool>;

    // ------------------------------------------------------------------
    // Ledger
    // ------------------------------------------------------------------

    /// Loads and locks a purchase.
    fn purchase_for_update(&mut self, id: PurchaseId) -> StoreFuture<'_, Option<Purchase>>;

    /// Finds the purchase paid by an external payment.
    fn purchase_by_payment<'a>(
        &'a mut self,
        payment_id: &'a ExternalPaymentId,
    ) -> StoreFuture<'a, Option<Purchase>>;

    /// Most recently bought purchase of `user_id` that is active at `now`.
    fn active_purchase(
        &mut self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Purchase>>;

    /// Inserts a purchase; a reused external payment id is a
    /// [`StoreError::Conflict`].
    fn insert_purchase<'a>(&'a mut self, purchase: &'a Purchase) -> StoreFuture<'a, ()>;

    /// Decrements `credits_left` iff it is above zero.
    fn consume_credit(&mut self, id: PurchaseId) -> StoreFuture<'_, bool>;

    /// Increments `credits_left` iff it is below the package's credit count.
    fn restore_credit(&mut self, id: PurchaseId) -> StoreFuture<'_, bool>;

    /// Overwrites `expires_at`.
    fn set_purchase_expiry(
        &mut self,
        id: PurchaseId,
        expires_at: DateTime<Utc>,
    ) -> StoreFuture<'_, ()>;

    // ------------------------------------------------------------------
    // Reservations
    // ------------------------------------------------------------------

    /// Loads and locks a reservation.
    fn reservation_for_update(
        &mut self,
        id: ReservationId,
    ) -> StoreFuture<'_, Option<Reservation>>;

    /// The completed reservation of `user_id` for `session_id`, if any.
    fn completed_reservation(
        &mut self,
        user_id: UserId,
        session_id: SessionId,
    ) -> StoreFuture<'_, Option<Reservation>>;

    /// Finds the reservation paid by an external payment.
    fn reservation_by_payment<'a>(
        &'a mut self,
        payment_id: &'a ExternalPaymentId,
    ) -> StoreFuture<'a, Option<Reservation>>;

    /// Inserts a reservation; a second completed reservation for the same
    /// user and session, or a reused external payment id, is a
    /// [`StoreError::Conflict`].
    fn insert_reservation<'a>(&'a mut self, reservation: &'a Reservation) -> StoreFuture<'a, ()>;

    /// Deletes a reservation, returning whether it existed.
    fn delete_reservation(&mut self, id: ReservationId) -> StoreFuture<'_, bool>;

    /// Deletes pending single-class reservations left by abandoned checkouts.
    fn delete_pending_reservations(
        &mut self,
        user_id: UserId,
        session_id: SessionId,
    ) -> StoreFuture<'_, u64>;

    // ------------------------------------------------------------------
    // Applied payments
    // ------------------------------------------------------------------

    /// Whether an external payment has already been applied.
    ///
    /// The record outlives the purchase or reservation the payment created,
    /// so a cancelled seat is not booked again by a redelivered notification.
    fn payment_applied<'a>(
        &'a mut self,
        payment_id: &'a ExternalPaymentId,
    ) -> StoreFuture<'a, bool>;

    /// Records an external payment as applied; recording it twice is a
    /// [`StoreError::Conflict`].
    fn record_applied_payment<'a>(
        &'a mut self,
        payment_id: &'a ExternalPaymentId,
        applied_at: DateTime<Utc>,
    ) -> StoreFuture<'a, ()>;

    /// Makes every write of this transaction durable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the commit lost a race, in which
    /// case nothing was written.
    fn commit(self) -> StoreFuture<'static, ()>
    where
        Self: Sized;
}

//! In-memory booking store for fast, deterministic tests.
//!
//! Transactions are fully serialized: [`InMemoryBookingStore::begin`] takes an
//! owned lock on the whole state and works on a private copy, which
//! [`BookingTx::commit`] writes back. Dropping a transaction discards the copy,
//! so an error anywhere in an engine leaves the store untouched.
//!
//! The same uniqueness rules as the production schema are enforced on insert
//! and reported as [`StoreError::Conflict`].

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use studio_core::store::{BookingStore, BookingTx, StoreError, StoreFuture};
use studio_core::types::{
    ClassSession, ClassType, ClassTypeId, ExternalPaymentId, Package, PackageId, PaymentStatus,
    Purchase, PurchaseId, Reservation, ReservationId, SessionId, UserId,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Complete contents of an in-memory store.
#[derive(Clone, Debug, Default)]
pub struct BookingState {
    /// Catalog packages
    pub packages: HashMap<PackageId, Package>,
    /// Class types
    pub class_types: HashMap<ClassTypeId, ClassType>,
    /// Scheduled sessions
    pub sessions: HashMap<SessionId, ClassSession>,
    /// Ledger entries
    pub purchases: HashMap<PurchaseId, Purchase>,
    /// Reservations
    pub reservations: HashMap<ReservationId, Reservation>,
    /// Applied external payments and when they were applied
    pub applied_payments: HashMap<ExternalPaymentId, DateTime<Utc>>,
}

impl BookingState {
    fn completed_for(&self, user_id: UserId, session_id: SessionId) -> Option<&Reservation> {
        self.reservations.values().find(|r| {
            r.user_id == user_id && r.session_id == session_id && r.is_completed()
        })
    }
}

/// In-memory [`BookingStore`].
///
/// # Example
///
/// ```
/// use studio_testing::InMemoryBookingStore;
/// use studio_core::store::{BookingStore, BookingTx};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryBookingStore::new();
/// let tx = store.begin().await?;
/// tx.commit().await?;
/// assert_eq!(store.commit_count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryBookingStore {
    state: Arc<Mutex<BookingState>>,
    pending_conflicts: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
}

impl InMemoryBookingStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` commits fail with [`StoreError::Conflict`].
    pub fn inject_commit_conflicts(&self, count: usize) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Number of successful commits so far
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Copy of the whole state
    pub async fn snapshot(&self) -> BookingState {
        self.state.lock().await.clone()
    }

    /// Insert or replace a package
    pub async fn put_package(&self, package: Package) {
        self.state
            .lock()
            .await
            .packages
            .insert(package.id.clone(), package);
    }

    /// Insert or replace a class type
    pub async fn put_class_type(&self, class_type: ClassType) {
        self.state
            .lock()
            .await
            .class_types
            .insert(class_type.id.clone(), class_type);
    }

    /// Insert or replace a session
    pub async fn put_session(&self, session: ClassSession) {
        self.state.lock().await.sessions.insert(session.id, session);
    }

    /// Insert or replace a purchase
    pub async fn put_purchase(&self, purchase: Purchase) {
        self.state.lock().await.purchases.insert(purchase.id, purchase);
    }

    /// Insert or replace a reservation
    pub async fn put_reservation(&self, reservation: Reservation) {
        self.state
            .lock()
            .await
            .reservations
            .insert(reservation.id, reservation);
    }

    /// Current state of a session
    pub async fn session(&self, id: SessionId) -> Option<ClassSession> {
        self.state.lock().await.sessions.get(&id).cloned()
    }

    /// Current state of a purchase
    pub async fn purchase(&self, id: PurchaseId) -> Option<Purchase> {
        self.state.lock().await.purchases.get(&id).cloned()
    }

    /// All purchases of a user, oldest first
    pub async fn purchases_of(&self, user_id: UserId) -> Vec<Purchase> {
        let state = self.state.lock().await;
        let mut purchases: Vec<_> = state
            .purchases
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        purchases.sort_by_key(|p| p.bought_at);
        purchases
    }

    /// All reservations for a session
    pub async fn reservations_for(&self, session_id: SessionId) -> Vec<Reservation> {
        self.state
            .lock()
            .await
            .reservations
            .values()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Number of completed reservations for a session
    pub async fn completed_count(&self, session_id: SessionId) -> usize {
        self.reservations_for(session_id)
            .await
            .iter()
            .filter(|r| r.is_completed())
            .count()
    }
}

impl BookingStore for InMemoryBookingStore {
    type Tx = InMemoryTx;

    fn begin(&self) -> StoreFuture<'_, Self::Tx> {
        Box::pin(async move {
            let guard = Arc::clone(&self.state).lock_owned().await;
            let working = guard.clone();
            Ok(InMemoryTx {
                guard,
                working,
                pending_conflicts: Arc::clone(&self.pending_conflicts),
                commits: Arc::clone(&self.commits),
            })
        })
    }
}

/// Transaction over an [`InMemoryBookingStore`].
pub struct InMemoryTx {
    guard: OwnedMutexGuard<BookingState>,
    working: BookingState,
    pending_conflicts: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
}

impl InMemoryTx {
    fn ready<T: Send + 'static>(value: Result<T, StoreError>) -> StoreFuture<'static, T> {
        Box::pin(std::future::ready(value))
    }
}

impl BookingTx for InMemoryTx {
    fn lock_user(&mut self, _user_id: UserId) -> StoreFuture<'_, ()> {
        // The whole store is already locked for the lifetime of the transaction.
        Self::ready(Ok(()))
    }

    fn package<'a>(&'a mut self, id: &'a PackageId) -> StoreFuture<'a, Option<Package>> {
        Self::ready(Ok(self.working.packages.get(id).cloned()))
    }

    fn save_package<'a>(&'a mut self, package: &'a Package) -> StoreFuture<'a, ()> {
        self.working
            .packages
            .insert(package.id.clone(), package.clone());
        Self::ready(Ok(()))
    }

    fn class_type<'a>(&'a mut self, id: &'a ClassTypeId) -> StoreFuture<'a, Option<ClassType>> {
        Self::ready(Ok(self.working.class_types.get(id).cloned()))
    }

    fn save_class_type<'a>(&'a mut self, class_type: &'a ClassType) -> StoreFuture<'a, ()> {
        self.working
            .class_types
            .insert(class_type.id.clone(), class_type.clone());
        Self::ready(Ok(()))
    }

    fn session_for_update(&mut self, id: SessionId) -> StoreFuture<'_, Option<ClassSession>> {
        Self::ready(Ok(self.working.sessions.get(&id).cloned()))
    }

    fn insert_session<'a>(&'a mut self, session: &'a ClassSession) -> StoreFuture<'a, ()> {
        if self.working.sessions.contains_key(&session.id) {
            return Self::ready(Err(StoreError::Conflict(format!(
                "session {} already exists",
                session.id
            ))));
        }
        self.working.sessions.insert(session.id, session.clone());
        Self::ready(Ok(()))
    }

    fn try_reserve_seat(&mut self, id: SessionId) -> StoreFuture<'_, bool> {
        let reserved = match self.working.sessions.get_mut(&id) {
            Some(session) if session.reserved_count < session.capacity => {
                session.reserved_count += 1;
                true
            }
            _ => false,
        };
        Self::ready(Ok(reserved))
    }

    fn release_seat(&mut self, id: SessionId) -> StoreFuture<'_, bool> {
        let released = match self.working.sessions.get_mut(&id) {
            Some(session) if session.reserved_count > 0 => {
                session.reserved_count -= 1;
                true
            }
            _ => false,
        };
        Self::ready(Ok(released))
    }

    fn purchase_for_update(&mut self, id: PurchaseId) -> StoreFuture<'_, Option<Purchase>> {
        Self::ready(Ok(self.working.purchases.get(&id).cloned()))
    }

    fn purchase_by_payment<'a>(
        &'a mut self,
        payment_id: &'a ExternalPaymentId,
    ) -> StoreFuture<'a, Option<Purchase>> {
        let found = self
            .working
            .purchases
            .values()
            .find(|p| p.external_payment_id.as_ref() == Some(payment_id))
            .cloned();
        Self::ready(Ok(found))
    }

    fn active_purchase(
        &mut self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Purchase>> {
        let found = self
            .working
            .purchases
            .values()
            .filter(|p| p.user_id == user_id && p.is_active(now))
            .max_by_key(|p| p.bought_at)
            .cloned();
        Self::ready(Ok(found))
    }

    fn insert_purchase<'a>(&'a mut self, purchase: &'a Purchase) -> StoreFuture<'a, ()> {
        if let Some(payment_id) = &purchase.external_payment_id {
            let taken = self
                .working
                .purchases
                .values()
                .any(|p| p.external_payment_id.as_ref() == Some(payment_id));
            if taken {
                return Self::ready(Err(StoreError::Conflict(format!(
                    "payment {payment_id} already recorded"
                ))));
            }
        }
        self.working.purchases.insert(purchase.id, purchase.clone());
        Self::ready(Ok(()))
    }

    fn consume_credit(&mut self, id: PurchaseId) -> StoreFuture<'_, bool> {
        let consumed = match self.working.purchases.get_mut(&id) {
            Some(purchase) if purchase.credits_left > 0 => {
                purchase.credits_left -= 1;
                true
            }
            _ => false,
        };
        Self::ready(Ok(consumed))
    }

    fn restore_credit(&mut self, id: PurchaseId) -> StoreFuture<'_, bool> {
        let BookingState {
            packages,
            purchases,
            ..
        } = &mut self.working;
        let restored = match purchases.get_mut(&id) {
            Some(purchase) => match packages.get(&purchase.package_id) {
                Some(package) if purchase.credits_left < package.credit_count => {
                    purchase.credits_left += 1;
                    true
                }
                _ => false,
            },
            None => false,
        };
        Self::ready(Ok(restored))
    }

    fn set_purchase_expiry(
        &mut self,
        id: PurchaseId,
        expires_at: DateTime<Utc>,
    ) -> StoreFuture<'_, ()> {
        if let Some(purchase) = self.working.purchases.get_mut(&id) {
            purchase.expires_at = expires_at;
        }
        Self::ready(Ok(()))
    }

    fn reservation_for_update(
        &mut self,
        id: ReservationId,
    ) -> StoreFuture<'_, Option<Reservation>> {
        Self::ready(Ok(self.working.reservations.get(&id).cloned()))
    }

    fn completed_reservation(
        &mut self,
        user_id: UserId,
        session_id: SessionId,
    ) -> StoreFuture<'_, Option<Reservation>> {
        Self::ready(Ok(self.working.completed_for(user_id, session_id).cloned()))
    }

    fn reservation_by_payment<'a>(
        &'a mut self,
        payment_id: &'a ExternalPaymentId,
    ) -> StoreFuture<'a, Option<Reservation>> {
        let found = self
            .working
            .reservations
            .values()
            .find(|r| r.external_payment_id.as_ref() == Some(payment_id))
            .cloned();
        Self::ready(Ok(found))
    }

    fn insert_reservation<'a>(&'a mut self, reservation: &'a Reservation) -> StoreFuture<'a, ()> {
        if reservation.is_completed()
            && self
                .working
                .completed_for(reservation.user_id, reservation.session_id)
                .is_some()
        {
            return Self::ready(Err(StoreError::Conflict(format!(
                "completed reservation already exists for user {} and session {}",
                reservation.user_id, reservation.session_id
            ))));
        }
        if let Some(payment_id) = &reservation.external_payment_id {
            let taken = self
                .working
                .reservations
                .values()
                .any(|r| r.external_payment_id.as_ref() == Some(payment_id));
            if taken {
                return Self::ready(Err(StoreError::Conflict(format!(
                    "payment {payment_id} already applied"
                ))));
            }
        }
        self.working
            .reservations
            .insert(reservation.id, reservation.clone());
        Self::ready(Ok(()))
    }

    fn delete_reservation(&mut self, id: ReservationId) -> StoreFuture<'_, bool> {
        Self::ready(Ok(self.working.reservations.remove(&id).is_some()))
    }

    fn delete_pending_reservations(
        &mut self,
        user_id: UserId,
        session_id: SessionId,
    ) -> StoreFuture<'_, u64> {
        let before = self.working.reservations.len();
        self.working.reservations.retain(|_, r| {
            !(r.user_id == user_id
                && r.session_id == session_id
                && r.payment_status == PaymentStatus::Pending)
        });
        let removed = before - self.working.reservations.len();
        Self::ready(Ok(u64::try_from(removed).unwrap_or(u64::MAX)))
    }

    fn payment_applied<'a>(
        &'a mut self,
        payment_id: &'a ExternalPaymentId,
    ) -> StoreFuture<'a, bool> {
        Self::ready(Ok(self.working.applied_payments.contains_key(payment_id)))
    }

    fn record_applied_payment<'a>(
        &'a mut self,
        payment_id: &'a ExternalPaymentId,
        applied_at: DateTime<Utc>,
    ) -> StoreFuture<'a, ()> {
        if self.working.applied_payments.contains_key(payment_id) {
            return Self::ready(Err(StoreError::Conflict(format!(
                "payment {payment_id} already applied"
            ))));
        }
        self.working
            .applied_payments
            .insert(payment_id.clone(), applied_at);
        Self::ready(Ok(()))
    }

    fn commit(self) -> StoreFuture<'static, ()> {
        let Self {
            mut guard,
            working,
            pending_conflicts,
            commits,
        } = self;

        let conflicted = pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflicted {
            return Self::ready(Err(StoreError::Conflict(
                "injected commit conflict".to_string(),
            )));
        }

        *guard = working;
        commits.fetch_add(1, Ordering::SeqCst);
        Self::ready(Ok(()))
    }
}

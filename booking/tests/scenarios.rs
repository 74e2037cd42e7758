//! Purchase and reservation scenarios against the in-memory store.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod common;

use chrono::Duration;
use common::{harness, harness_with, rules};
use std::sync::Arc;
use studio_booking::{PurchaseOptions, ReservationOutcome};
use studio_core::error::{BookingError, ErrorKind};
use studio_core::types::{Caller, PaymentMethod, UserId};
use studio_testing::fixtures;

#[tokio::test]
async fn scenario_a_package_booking_takes_a_credit_and_a_seat() {
    let h = harness().await;
    let user = UserId::new();
    let session = h.add_session(8).await;

    let purchase = h
        .purchases()
        .create_purchase(user, &h.package.id, None, PurchaseOptions::default())
        .await
        .expect("purchase")
        .purchase;
    assert_eq!(purchase.credits_left, 10);
    assert_eq!(purchase.bought_at, fixtures::t0());
    assert_eq!(purchase.expires_at, fixtures::t0() + Duration::days(30));

    let outcome = h
        .reservations()
        .create_reservation(user, session.id, PaymentMethod::Package, Some(purchase.id))
        .await
        .expect("reservation");

    let ReservationOutcome::Confirmed { reservation } = outcome else {
        panic!("package booking should confirm immediately");
    };
    assert!(reservation.is_completed());
    assert_eq!(h.store.purchase(purchase.id).await.unwrap().credits_left, 9);
    assert_eq!(h.store.session(session.id).await.unwrap().reserved_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_b_two_users_race_for_the_last_seat() {
    let h = harness().await;
    let session = h.add_session(1).await;
    let alice = UserId::new();
    let bob = UserId::new();
    let alice_purchase = h.add_purchase(alice).await;
    let bob_purchase = h.add_purchase(bob).await;
    let session_id = session.id;

    let reservations = Arc::clone(&h.state.reservations);
    let a = tokio::spawn(async move {
        reservations
            .create_reservation(alice, session_id, PaymentMethod::Package, Some(alice_purchase.id))
            .await
    });
    let reservations = Arc::clone(&h.state.reservations);
    let b = tokio::spawn(async move {
        reservations
            .create_reservation(bob, session_id, PaymentMethod::Package, Some(bob_purchase.id))
            .await
    });

    let results = [a.await.unwrap(), b.await.unwrap()];
    let booked = results.iter().filter(|r| r.is_ok()).count();
    let full = results
        .iter()
        .filter(|r| matches!(r, Err(BookingError::SessionFull)))
        .count();

    assert_eq!(booked, 1);
    assert_eq!(full, 1);
    assert_eq!(h.store.session(session_id).await.unwrap().reserved_count, 1);
    assert_eq!(h.store.completed_count(session_id).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_fill_exactly_the_capacity() {
    let h = harness().await;
    let capacity = 3;
    let session_id = h.add_session(capacity).await.id;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let user = UserId::new();
        let purchase = h.add_purchase(user).await;
        let reservations = Arc::clone(&h.state.reservations);
        handles.push(tokio::spawn(async move {
            reservations
                .create_reservation(user, session_id, PaymentMethod::Package, Some(purchase.id))
                .await
        }));
    }

    let mut booked = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => booked += 1,
            Err(err) => assert!(matches!(err, BookingError::SessionFull), "unexpected {err}"),
        }
    }

    assert_eq!(booked, capacity);
    assert_eq!(h.store.session(session_id).await.unwrap().reserved_count, capacity);
}

#[tokio::test]
async fn scenario_d_active_package_blocks_a_second_purchase() {
    let h = harness().await;
    let user = UserId::new();
    let mut active = fixtures::purchase(user, &h.package, fixtures::t0() - Duration::days(10));
    active.credits_left = 5;
    h.store.put_purchase(active.clone()).await;
    assert_eq!(active.days_until_expiry(fixtures::t0()), 20);

    let err = h
        .purchases()
        .create_purchase(user, &h.package.id, None, PurchaseOptions::default())
        .await
        .unwrap_err();
    match err {
        BookingError::AlreadyActivePackage(conflicting) => assert_eq!(conflicting.id, active.id),
        other => panic!("expected AlreadyActivePackage, got {other}"),
    }

    let options = PurchaseOptions {
        allow_multiple_active: true,
        ..PurchaseOptions::default()
    };
    let outcome = h
        .purchases()
        .create_purchase(user, &h.package.id, None, options)
        .await
        .expect("second purchase allowed");
    assert!(!outcome.already_processed);
    assert_eq!(h.store.purchases_of(user).await.len(), 2);
}

#[tokio::test]
async fn scenario_e_expired_package_changes_nothing() {
    let h = harness().await;
    let user = UserId::new();
    let session = h.add_session(8).await;
    let mut purchase = h.add_purchase(user).await;
    purchase.expires_at = fixtures::t0();
    h.store.put_purchase(purchase.clone()).await;

    let err = h
        .reservations()
        .create_reservation(user, session.id, PaymentMethod::Package, Some(purchase.id))
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::PackageExpired));
    assert_eq!(h.store.purchase(purchase.id).await.unwrap().credits_left, 10);
    assert_eq!(h.store.session(session.id).await.unwrap().reserved_count, 0);
    assert!(h.store.reservations_for(session.id).await.is_empty());
}

#[tokio::test]
async fn book_then_cancel_restores_credit_and_seat() {
    let h = harness().await;
    let user = UserId::new();
    let session = h.add_session(4).await;
    let purchase = h.add_purchase(user).await;

    let ReservationOutcome::Confirmed { reservation } = h
        .reservations()
        .create_reservation(user, session.id, PaymentMethod::Package, Some(purchase.id))
        .await
        .unwrap()
    else {
        panic!("package booking should confirm immediately");
    };

    let cancelled = h
        .reservations()
        .cancel_reservation(reservation.id, &Caller::member(user))
        .await
        .unwrap();

    assert!(cancelled.credit_restored);
    assert!(cancelled.seat_released);
    assert_eq!(h.store.purchase(purchase.id).await.unwrap().credits_left, 10);
    assert_eq!(h.store.session(session.id).await.unwrap().reserved_count, 0);
}

#[tokio::test]
async fn single_class_booking_writes_nothing() {
    let h = harness().await;
    let user = UserId::new();
    let session = h.add_session(4).await;

    let outcome = h
        .reservations()
        .create_reservation(user, session.id, PaymentMethod::SingleClass, None)
        .await
        .unwrap();

    let ReservationOutcome::AwaitingPayment { intent } = outcome else {
        panic!("single class booking should await payment");
    };
    assert_eq!(intent.user_id, user);
    assert_eq!(intent.price, h.config.rules.reservation.single_class_price);
    assert!(intent.session_label.starts_with("Reformer - "));
    assert!(h.store.reservations_for(session.id).await.is_empty());
    assert_eq!(h.store.session(session.id).await.unwrap().reserved_count, 0);
}

#[tokio::test]
async fn write_conflicts_are_retried() {
    let h = harness().await;
    let user = UserId::new();
    let session = h.add_session(4).await;
    let purchase = h.add_purchase(user).await;
    h.store.inject_commit_conflicts(2);

    let outcome = h
        .reservations()
        .create_reservation(user, session.id, PaymentMethod::Package, Some(purchase.id))
        .await;

    assert!(outcome.is_ok());
    assert_eq!(h.store.purchase(purchase.id).await.unwrap().credits_left, 9);
    assert_eq!(h.store.session(session.id).await.unwrap().reserved_count, 1);
}

#[tokio::test]
async fn exhausted_retries_surface_a_transient_error() {
    let h = harness_with(rules()).await;
    let user = UserId::new();
    let session = h.add_session(4).await;
    let purchase = h.add_purchase(user).await;
    h.store.inject_commit_conflicts(10);

    let err = h
        .reservations()
        .create_reservation(user, session.id, PaymentMethod::Package, Some(purchase.id))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(h.store.purchase(purchase.id).await.unwrap().credits_left, 10);
    assert_eq!(h.store.session(session.id).await.unwrap().reserved_count, 0);
}

#[tokio::test]
async fn only_admins_expire_purchases() {
    let h = harness().await;
    let user = UserId::new();
    let purchase = h.add_purchase(user).await;

    let err = h
        .purchases()
        .expire_purchase(purchase.id, &Caller::member(user))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let expired = h
        .purchases()
        .expire_purchase(purchase.id, &Caller::admin(UserId::new()))
        .await
        .unwrap();
    assert_eq!(expired.expires_at, fixtures::t0());
    assert!(h.purchases().active_purchase(user).await.unwrap().is_none());
    assert!(h.purchases().can_purchase(user).await.unwrap().eligible);
}

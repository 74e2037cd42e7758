//! Random book/cancel workloads never break the seat and credit counters.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::harness;
use proptest::prelude::*;
use studio_core::error::BookingError;
use studio_core::types::{Caller, PaymentMethod, Purchase, UserId};
use studio_testing::fixtures;
use studio_testing::properties::{BookingOp, booking_ops, capacity, credit_count};

const USERS: usize = 4;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

async fn run_workload(capacity: u32, credits: u32, ops: Vec<BookingOp>) -> Result<(), TestCaseError> {
    let h = harness().await;
    let package = fixtures::package("pkg-prop", credits, 30);
    h.store.put_package(package.clone()).await;
    let session = h.add_session(capacity).await;

    let mut members: Vec<(UserId, Purchase)> = Vec::new();
    for _ in 0..USERS {
        let user = UserId::new();
        let purchase = fixtures::purchase(user, &package, fixtures::t0());
        h.store.put_purchase(purchase.clone()).await;
        members.push((user, purchase));
    }

    for op in ops {
        match op {
            BookingOp::Book { user } => {
                let (user_id, purchase) = &members[user];
                let result = h
                    .reservations()
                    .create_reservation(
                        *user_id,
                        session.id,
                        PaymentMethod::Package,
                        Some(purchase.id),
                    )
                    .await;
                if let Err(err) = result {
                    prop_assert!(
                        matches!(
                            err,
                            BookingError::SessionFull
                                | BookingError::DuplicateReservation
                                | BookingError::NoCredits
                        ),
                        "unexpected booking error: {err}"
                    );
                }
            }
            BookingOp::Cancel { user } => {
                let user_id = members[user].0;
                let held = h
                    .store
                    .reservations_for(session.id)
                    .await
                    .into_iter()
                    .find(|r| r.user_id == user_id);
                if let Some(reservation) = held {
                    h.reservations()
                        .cancel_reservation(reservation.id, &Caller::member(user_id))
                        .await
                        .map_err(|err| TestCaseError::fail(err.to_string()))?;
                }
            }
        }

        let reserved = h.store.session(session.id).await.unwrap().reserved_count;
        let completed = h.store.completed_count(session.id).await;
        prop_assert!(reserved <= capacity);
        prop_assert_eq!(reserved as usize, completed);

        let held = h.store.reservations_for(session.id).await;
        for (user_id, purchase) in &members {
            let booked = held.iter().filter(|r| r.user_id == *user_id).count();
            prop_assert!(booked <= 1);
            let credits_left = h.store.purchase(purchase.id).await.unwrap().credits_left;
            prop_assert_eq!(credits_left as usize, credits as usize - booked);
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn seats_and_credits_stay_consistent(
        capacity in capacity(),
        credits in credit_count(),
        ops in booking_ops(USERS, 24),
    ) {
        runtime().block_on(run_workload(capacity, credits, ops))?;
    }
}

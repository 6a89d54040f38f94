//! Concurrency behavior of the reservation engine.
//!
//! The core guarantee under test: a wish can never end up with two live
//! reservations, no matter how many claims race.

use tokio::task::JoinSet;

use wishbox_core::{Claimant, ListVisibility};
use wishbox_integration_tests::TestEnv;
use wishbox_server::services::reservation::{ClaimRequest, ReservationActor, ReservationError};
use wishbox_server::store::Store;

fn claim_request(wish: wishbox_core::WishId, giver: wishbox_core::UserId) -> ClaimRequest {
    ClaimRequest {
        wish_id: wish,
        claimant: Claimant::User { user_id: giver },
        access_cookie: None,
        share_token: None,
        rate_key: format!("user:{giver}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn fifty_concurrent_claims_yield_exactly_one_reservation() {
    let env = TestEnv::new();
    let owner = env.store.seed_user("owner");
    let list = env
        .store
        .seed_list(owner, "gifts", ListVisibility::Public, None);
    let wish = env.store.seed_wish(owner, "telescope");
    env.store.add_wish_to_list(list, wish);

    let givers: Vec<_> = (0..50).map(|i| env.store.seed_user(&format!("giver-{i}"))).collect();

    let mut tasks = JoinSet::new();
    for giver in givers {
        let reservations = env.reservations.clone();
        let request = claim_request(wish, giver);
        tasks.spawn(async move { reservations.claim(request).await });
    }

    let mut successes = 0;
    let mut already_reserved = 0;
    while let Some(result) = tasks.join_next().await {
        match result.expect("task panicked") {
            Ok(_) => successes += 1,
            Err(ReservationError::AlreadyReserved) => already_reserved += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 1, "exactly one claim must win");
    assert_eq!(already_reserved, 49, "the rest must see AlreadyReserved");
}

#[tokio::test]
async fn release_reopens_the_wish_for_claiming() {
    let env = TestEnv::new();
    let owner = env.store.seed_user("owner");
    let list = env
        .store
        .seed_list(owner, "gifts", ListVisibility::Public, None);
    let wish = env.store.seed_wish(owner, "telescope");
    env.store.add_wish_to_list(list, wish);

    let first = env.store.seed_user("first");
    let second = env.store.seed_user("second");

    let held = env
        .reservations
        .claim(claim_request(wish, first))
        .await
        .expect("first claim");

    let blocked = env
        .reservations
        .claim(claim_request(wish, second))
        .await;
    assert!(matches!(blocked, Err(ReservationError::AlreadyReserved)));

    env.reservations
        .release(&ReservationActor::User(first), held.reservation.id)
        .await
        .expect("release");

    env.reservations
        .claim(claim_request(wish, second))
        .await
        .expect("claim after release");
}

#[tokio::test]
async fn bulk_cancel_commits_the_passing_subset() {
    let env = TestEnv::new();
    let owner = env.store.seed_user("owner");
    let list = env
        .store
        .seed_list(owner, "gifts", ListVisibility::Public, None);
    let giver = env.store.seed_user("giver");
    let rival = env.store.seed_user("rival");

    let mut mine = Vec::new();
    for i in 0..4 {
        let wish = env.store.seed_wish(owner, &format!("wish-{i}"));
        env.store.add_wish_to_list(list, wish);
        let outcome = env
            .reservations
            .claim(claim_request(wish, giver))
            .await
            .expect("claim");
        mine.push(outcome.reservation.id);
    }
    let rival_wish = env.store.seed_wish(owner, "rival-wish");
    env.store.add_wish_to_list(list, rival_wish);
    let theirs = env
        .reservations
        .claim(claim_request(rival_wish, rival))
        .await
        .expect("rival claim")
        .reservation
        .id;

    let mut ids = mine.clone();
    ids.push(theirs);
    let outcome = env
        .reservations
        .bulk(
            &ReservationActor::User(giver),
            wishbox_server::store::BulkReservationAction::Cancel,
            &ids,
            "user:bulk",
        )
        .await
        .expect("bulk");

    assert_eq!(outcome.succeeded, mine);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.total_processed(), 5);

    // The not-owned failure did not roll back the successes, and the
    // rival's reservation is untouched.
    for id in &mine {
        assert!(env.store.get_reservation(*id).await.expect("store").is_none());
    }
    assert!(env
        .store
        .get_reservation(theirs)
        .await
        .expect("store")
        .is_some());
}

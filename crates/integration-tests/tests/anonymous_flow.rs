//! The anonymous gift-giver journey: claim with a name and email, manage
//! the reservation with the minted secret, and never be visible to the
//! list owner.

use chrono::NaiveDate;

use wishbox_core::{Claimant, Email, ListVisibility, ReservationId};
use wishbox_integration_tests::TestEnv;
use wishbox_server::services::permission::Actor;
use wishbox_server::services::reservation::{ClaimRequest, ReservationActor, ReservationError};

fn anonymous_claim(wish: wishbox_core::WishId, name: &str, rate_key: &str) -> ClaimRequest {
    ClaimRequest {
        wish_id: wish,
        claimant: Claimant::Anonymous {
            name: name.to_owned(),
            email: Email::parse("giver@example.com").expect("valid email"),
        },
        access_cookie: None,
        share_token: None,
        rate_key: rate_key.to_owned(),
    }
}

#[tokio::test]
async fn full_anonymous_lifecycle_through_the_manage_secret() {
    let env = TestEnv::new();
    let owner = env.store.seed_user("owner");
    let list = env
        .store
        .seed_list(owner, "gifts", ListVisibility::Public, None);
    let wish = env.store.seed_wish(owner, "telescope");
    env.store.add_wish_to_list(list, wish);

    let outcome = env
        .reservations
        .claim(anonymous_claim(wish, "Aunt May", "ip:203.0.113.9"))
        .await
        .expect("claim");
    let secret = outcome.manage_secret.expect("anonymous claims mint a secret");
    let id = outcome.reservation.id;

    // The secret is the whole credential: look up, mark purchased, release.
    let found = env.reservations.find_by_secret(&secret).await.expect("lookup");
    assert_eq!(found.id, id);

    let actor = ReservationActor::AnonymousToken(secret.clone());
    let date = NaiveDate::from_ymd_opt(2026, 8, 20).expect("valid date");
    let marked = env
        .reservations
        .mark_purchased(&actor, id, date)
        .await
        .expect("mark purchased");
    assert_eq!(marked.purchased_date, Some(date));

    env.reservations.release(&actor, id).await.expect("release");
    assert!(matches!(
        env.reservations.find_by_secret(&secret).await,
        Err(ReservationError::NotFound)
    ));
}

#[tokio::test]
async fn wrong_secret_and_missing_reservation_are_indistinguishable() {
    let env = TestEnv::new();
    let owner = env.store.seed_user("owner");
    let list = env
        .store
        .seed_list(owner, "gifts", ListVisibility::Public, None);
    let wish = env.store.seed_wish(owner, "telescope");
    env.store.add_wish_to_list(list, wish);

    let outcome = env
        .reservations
        .claim(anonymous_claim(wish, "Aunt May", "ip:203.0.113.9"))
        .await
        .expect("claim");
    let id = outcome.reservation.id;

    let wrong_secret = ReservationActor::AnonymousToken("wbxr_notthesecret".to_owned());
    let on_existing = env.reservations.release(&wrong_secret, id).await;
    let on_missing = env
        .reservations
        .release(&wrong_secret, ReservationId::new(999_999))
        .await;

    // Same error either way; a probing caller learns nothing.
    assert!(matches!(on_existing, Err(ReservationError::NotFound)));
    assert!(matches!(on_missing, Err(ReservationError::NotFound)));
}

#[tokio::test]
async fn owner_sees_reserved_flags_but_never_the_claimant() {
    let env = TestEnv::new();
    let owner = env.store.seed_user("owner");
    let list = env
        .store
        .seed_list(owner, "gifts", ListVisibility::Public, None);
    let reserved = env.store.seed_wish(owner, "telescope");
    let open = env.store.seed_wish(owner, "tripod");
    env.store.add_wish_to_list(list, reserved);
    env.store.add_wish_to_list(list, open);

    let claim = env
        .reservations
        .claim(anonymous_claim(reserved, "Aunt May", "ip:203.0.113.9"))
        .await
        .expect("claim");

    // The owner-reachable read returns booleans keyed by wish; the type
    // carries no claimant fields at all.
    let map = env
        .reservations
        .list_reservation_status(&Actor::user(owner), list, "user:owner")
        .await
        .expect("status");
    assert_eq!(map.get(&reserved), Some(&true));
    assert_eq!(map.get(&open), Some(&false));

    // Knowing a reservation exists does not let the owner touch it.
    let denied = env
        .reservations
        .release(&ReservationActor::User(owner), claim.reservation.id)
        .await;
    assert!(matches!(denied, Err(ReservationError::NotFound)));
}

#[tokio::test]
async fn owner_claiming_their_own_wish_is_refused_outright() {
    let env = TestEnv::new();
    let owner = env.store.seed_user("owner");
    let list = env
        .store
        .seed_list(owner, "gifts", ListVisibility::Public, None);
    let wish = env.store.seed_wish(owner, "telescope");
    env.store.add_wish_to_list(list, wish);

    let result = env
        .reservations
        .claim(ClaimRequest {
            wish_id: wish,
            claimant: Claimant::User { user_id: owner },
            access_cookie: None,
            share_token: None,
            rate_key: "user:owner".to_owned(),
        })
        .await;
    // Forbidden, not NotFound: the owner obviously sees their own wish,
    // and the refusal is a business rule worth being explicit about.
    assert!(matches!(result, Err(ReservationError::Forbidden)));
}

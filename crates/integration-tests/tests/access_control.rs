//! Access control across services: password-gated lists, access cookies,
//! share tokens, and the personal API token lifecycle.

use wishbox_core::{Claimant, Email, ListVisibility, TokenDeviceType};
use wishbox_integration_tests::TestEnv;
use wishbox_server::services::permission::Actor;
use wishbox_server::services::reservation::{ClaimRequest, ReservationError};
use wishbox_server::services::token::{CredentialSource, TokenValidation};
use wishbox_server::store::Store;

fn anonymous_claim(
    wish: wishbox_core::WishId,
    access_cookie: Option<String>,
    rate_key: &str,
) -> ClaimRequest {
    ClaimRequest {
        wish_id: wish,
        claimant: Claimant::Anonymous {
            name: "Aunt May".to_owned(),
            email: Email::parse("giver@example.com").expect("valid email"),
        },
        access_cookie,
        share_token: None,
        rate_key: rate_key.to_owned(),
    }
}

#[tokio::test]
async fn password_gate_spans_unlock_claim_and_rotation() {
    let env = TestEnv::new();
    let owner = env.store.seed_user("owner");
    let list = env
        .store
        .seed_list(owner, "gated", ListVisibility::Private, None);
    let wish = env.store.seed_wish(owner, "telescope");
    env.store.add_wish_to_list(list, wish);

    env.lists
        .set_password(&Actor::user(owner), list, "hunter22")
        .await
        .expect("set password");

    // Without the cookie the wish might as well not exist.
    let blind = env
        .reservations
        .claim(anonymous_claim(wish, None, "ip:203.0.113.9"))
        .await;
    assert!(matches!(blind, Err(ReservationError::NotFound)));

    let cookie = env
        .lists
        .unlock(&Actor::anonymous(), list, "hunter22", None, "ip:203.0.113.9")
        .await
        .expect("unlock");

    let claim = env
        .reservations
        .claim(anonymous_claim(wish, Some(cookie.clone()), "ip:203.0.113.9"))
        .await
        .expect("claim with cookie");

    // Rotating the password invalidates every outstanding cookie: the
    // grant binds to the hash it was issued against.
    env.reservations
        .release(
            &wishbox_server::services::reservation::ReservationActor::AnonymousToken(
                claim.manage_secret.expect("secret"),
            ),
            claim.reservation.id,
        )
        .await
        .expect("release so the wish is claimable again");
    env.lists
        .set_password(&Actor::user(owner), list, "new-password-9")
        .await
        .expect("rotate");

    let stale = env
        .reservations
        .claim(anonymous_claim(wish, Some(cookie), "ip:203.0.113.9"))
        .await;
    assert!(matches!(stale, Err(ReservationError::NotFound)));
}

#[tokio::test]
async fn cookie_grants_are_scoped_to_their_list() {
    let env = TestEnv::new();
    let owner = env.store.seed_user("owner");
    let gated_a = env
        .store
        .seed_list(owner, "list-a", ListVisibility::Private, None);
    let gated_b = env
        .store
        .seed_list(owner, "list-b", ListVisibility::Private, None);
    let wish_b = env.store.seed_wish(owner, "tripod");
    env.store.add_wish_to_list(gated_b, wish_b);

    env.lists
        .set_password(&Actor::user(owner), gated_a, "password-a")
        .await
        .expect("set password a");
    env.lists
        .set_password(&Actor::user(owner), gated_b, "password-b")
        .await
        .expect("set password b");

    let cookie_a = env
        .lists
        .unlock(&Actor::anonymous(), gated_a, "password-a", None, "ip:203.0.113.9")
        .await
        .expect("unlock a");

    // A grant for list A proves nothing about list B.
    let cross = env
        .reservations
        .claim(anonymous_claim(wish_b, Some(cookie_a.clone()), "ip:203.0.113.9"))
        .await;
    assert!(matches!(cross, Err(ReservationError::NotFound)));

    // Unlocking B on top of the existing cookie merges the grants.
    let both = env
        .lists
        .unlock(&Actor::anonymous(), gated_b, "password-b", Some(&cookie_a), "ip:203.0.113.9")
        .await
        .expect("unlock b");
    env.reservations
        .claim(anonymous_claim(wish_b, Some(both.clone()), "ip:203.0.113.9"))
        .await
        .expect("claim b");

    let hash_a = env
        .store
        .get_list(gated_a)
        .await
        .expect("store")
        .and_then(|l| l.password_hash)
        .expect("hash a");
    assert!(env.tokens.has_valid_access(&both, gated_a, &hash_a));
}

#[tokio::test]
async fn api_token_lifecycle_with_legacy_upgrade() {
    let env = TestEnv::new();
    let user = env.store.seed_user("user");

    // Minting requires a session; an API token cannot mint more tokens.
    let chained = env
        .tokens
        .create_api_token(
            CredentialSource::ApiToken,
            user,
            "sneaky",
            TokenDeviceType::Script,
            None,
        )
        .await;
    assert!(chained.is_err());

    let (token, secret) = env
        .tokens
        .create_api_token(
            CredentialSource::Session,
            user,
            "laptop script",
            TokenDeviceType::Script,
            None,
        )
        .await
        .expect("mint");
    assert_eq!(
        env.tokens.validate_api_token(&secret).await.expect("validate"),
        TokenValidation::Valid(user)
    );

    env.tokens
        .revoke_api_token(user, token.id)
        .await
        .expect("revoke");
    assert_eq!(
        env.tokens.validate_api_token(&secret).await.expect("validate"),
        TokenValidation::Revoked
    );

    // A pre-digest row authenticates once and comes out upgraded: digest
    // written, plaintext cleared.
    let legacy_secret = "wbx_legacy01_0123456789abcdefghijklmnopqrstuv";
    let legacy_id = env.store.seed_legacy_api_token(user, "legacy01", legacy_secret);
    assert_eq!(
        env.tokens
            .validate_api_token(legacy_secret)
            .await
            .expect("validate legacy"),
        TokenValidation::Valid(user)
    );
    let record = env.store.api_token_record(legacy_id).expect("record");
    assert!(record.digest.is_some());
    assert!(record.legacy_secret.is_none());
}

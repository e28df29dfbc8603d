//! Process-start restore, role appropriation and logout.

#![allow(clippy::unwrap_used)]

use arealink_core::snapshot::{codec, keys};
use arealink_core::{
    ApiResponse, CodecError, IdentitySnapshot, LateError, NetworkError, PhysicalTime, Role,
    SessionIdentity, Snapshot, SnapshotHeader,
};
use arealink_session::{AreaBinding, BootError, BootstrapVerifier, RenewalError, SessionPhase};
use arealink_testkit::{fixtures, ControllableTime, MemoryTextStore, MockAreaClient, StorageOp};
use assert_matches::assert_matches;
use std::sync::Arc;

const NOW_MS: u64 = 1_000_000;

struct Harness {
    store: MemoryTextStore,
    clock: ControllableTime,
    client: MockAreaClient,
}

impl Harness {
    fn new() -> Self {
        arealink_testkit::init_test_logging();
        Self {
            store: MemoryTextStore::new(),
            clock: ControllableTime::new(NOW_MS),
            client: MockAreaClient::new(),
        }
    }

    fn verifier(&self) -> Arc<BootstrapVerifier> {
        BootstrapVerifier::builder(
            Arc::new(self.store.clone()),
            Arc::new(self.clock.clone()),
            Arc::new(self.client.clone()),
        )
        .build()
    }

    fn seed(&self, snapshot: &IdentitySnapshot) {
        self.store
            .insert_raw(keys::IDENTITY, codec::encode(snapshot).unwrap());
    }

    fn seed_identity(&self, identity: &SessionIdentity) {
        self.seed(&identity.to_snapshot(SnapshotHeader::stamped(
            IdentitySnapshot::KIND,
            PhysicalTime::from_millis(NOW_MS - 1_000),
        )));
    }
}

#[tokio::test]
async fn valid_snapshot_publishes_crew_context() {
    let h = Harness::new();
    h.seed_identity(&fixtures::identity(Role::Crew, NOW_MS + 3_600_000));
    let verifier = h.verifier();
    assert_eq!(verifier.phase(), SessionPhase::PreBoot);

    let context = verifier.boot().await.unwrap();

    assert_eq!(context.role(), Role::Crew);
    assert_eq!(verifier.phase(), SessionPhase::Authorized(context.clone()));
    assert_eq!(verifier.authorization_ref().get().unwrap(), context);
    let session = verifier.session().unwrap();
    assert_eq!(session.service().role(), Some(Role::Crew));
}

#[tokio::test]
async fn empty_store_routes_to_onboarding() {
    let h = Harness::new();
    let verifier = h.verifier();
    let mut phases = verifier.subscribe();

    assert_eq!(verifier.boot().await, Err(BootError::MissingEntry));

    phases.changed().await.unwrap();
    assert_eq!(*phases.borrow(), SessionPhase::NeedsOnboarding);
    assert!(verifier.authorization().is_none());
    assert!(verifier.session().is_none());
    assert_eq!(
        verifier.authorization_ref().get(),
        Err(LateError::Unbacked)
    );
}

#[tokio::test]
async fn incomplete_snapshot_fails_closed() {
    let h = Harness::new();
    let mut snapshot = fixtures::identity(Role::Management, NOW_MS + 3_600_000).to_snapshot(
        SnapshotHeader::stamped(IdentitySnapshot::KIND, PhysicalTime::from_millis(NOW_MS)),
    );
    snapshot.specialties = None;
    h.seed(&snapshot);
    let verifier = h.verifier();

    assert_matches!(
        verifier.boot().await,
        Err(BootError::IncompleteSnapshot { missing }) if missing == vec!["specialties"]
    );
    assert_eq!(verifier.phase(), SessionPhase::NeedsOnboarding);
    assert!(verifier.authorization().is_none());
}

#[tokio::test]
async fn unreadable_snapshot_fails_closed() {
    let h = Harness::new();
    h.store.insert_raw(keys::IDENTITY, "{\"kind\":\"identity\",");
    let verifier = h.verifier();

    assert_matches!(
        verifier.boot().await,
        Err(BootError::Codec(CodecError::Malformed { .. }))
    );
    assert_eq!(verifier.phase(), SessionPhase::NeedsOnboarding);

    h.store.insert_raw(keys::IDENTITY, "{\"kind\":\"bootstrap\"}");
    assert_matches!(
        verifier.boot().await,
        Err(BootError::Codec(CodecError::TypeMismatch { .. }))
    );
}

#[tokio::test]
async fn expired_snapshot_still_boots() {
    let h = Harness::new();
    h.seed_identity(&fixtures::identity(Role::Member, NOW_MS - 1));
    let verifier = h.verifier();

    let context = verifier.boot().await.unwrap();
    assert_eq!(context.role(), Role::Member);
    let service = verifier.session().unwrap().service().clone();
    assert!(service.needs_renewal_at(h.clock.now(), std::time::Duration::from_secs(60)));
}

#[tokio::test]
async fn establish_persists_session_for_next_process() {
    let h = Harness::new();
    let verifier = h.verifier();
    let binding = AreaBinding {
        area_name: fixtures::AREA_NAME.to_string(),
        endpoint: "https://area.example/api".to_string(),
    };

    let context = verifier
        .establish(
            fixtures::identity(Role::Crew, NOW_MS + 3_600_000),
            binding.clone(),
        )
        .await
        .unwrap();
    assert_eq!(context.role(), Role::Crew);
    assert!(h.store.contains(keys::IDENTITY));
    assert!(h.store.contains(keys::BOOTSTRAP));

    let restarted = h.verifier();
    let restored = restarted.boot().await.unwrap();
    assert_eq!(restored, context);
    assert_eq!(restarted.binding(), Some(binding));
}

#[tokio::test]
async fn logout_releases_context_and_boot_fails_over() {
    let h = Harness::new();
    h.seed_identity(&fixtures::identity(Role::Crew, NOW_MS + 3_600_000));
    let verifier = h.verifier();
    verifier.boot().await.unwrap();
    let context_ref = verifier.authorization_ref();
    let service = verifier.session().unwrap().service().clone();
    assert!(context_ref.is_live());

    verifier.logout().await.unwrap();

    assert_eq!(context_ref.get(), Err(LateError::Released));
    assert!(!service.is_booted());
    assert!(!h.store.contains(keys::IDENTITY));
    assert!(!h.store.contains(keys::BOOTSTRAP));
    assert_eq!(verifier.phase(), SessionPhase::LoggedOut);

    assert_eq!(verifier.boot().await, Err(BootError::MissingEntry));
    assert_eq!(verifier.phase(), SessionPhase::NeedsOnboarding);
}

#[tokio::test]
async fn logout_without_session_is_harmless() {
    let h = Harness::new();
    let verifier = h.verifier();
    verifier.logout().await.unwrap();
    assert_eq!(verifier.phase(), SessionPhase::LoggedOut);
}

#[tokio::test]
async fn rejected_refresh_logs_the_verifier_out() {
    let h = Harness::new();
    h.seed_identity(&fixtures::identity(Role::Crew, NOW_MS - 1));
    h.client.push_refresh(Ok(ApiResponse::Forbidden));
    let verifier = h.verifier();
    verifier.boot().await.unwrap();
    let context_ref = verifier.authorization_ref();

    let upkeeper = verifier.session().unwrap().upkeeper().clone();
    assert_eq!(
        upkeeper.renew().await,
        Err(RenewalError::Rejected(NetworkError::Forbidden))
    );

    assert_eq!(verifier.phase(), SessionPhase::LoggedOut);
    assert!(verifier.session().is_none());
    assert_eq!(context_ref.get(), Err(LateError::Released));
    assert!(!h.store.contains(keys::IDENTITY));
}

#[tokio::test]
async fn exhausted_renewal_requires_onboarding() {
    let h = Harness::new();
    h.seed_identity(&fixtures::identity(Role::Crew, NOW_MS - 1));
    let verifier = h.verifier();
    verifier.boot().await.unwrap();

    let upkeeper = verifier.session().unwrap().upkeeper().clone();
    assert_matches!(
        upkeeper.renew().await,
        Err(RenewalError::Exhausted { attempts: 4, .. })
    );

    assert_eq!(verifier.phase(), SessionPhase::NeedsOnboarding);
    assert!(verifier.authorization().is_none());
    assert!(h.store.contains(keys::IDENTITY));
}

#[tokio::test]
async fn logout_waits_for_renewal_write_then_removes_it() {
    let h = Harness::new();
    h.seed_identity(&fixtures::identity(Role::Crew, NOW_MS - 1));
    h.client
        .push_refresh(Ok(ApiResponse::Ok(fixtures::credential_grant("access-1", NOW_MS + 3_600_000))));
    let verifier = h.verifier();
    verifier.boot().await.unwrap();
    let upkeeper = verifier.session().unwrap().upkeeper().clone();

    h.store.pause(StorageOp::Set);
    let renewal = tokio::spawn(async move { upkeeper.renew().await });
    h.store.wait_for_calls(StorageOp::Set, 1).await;

    let logout = {
        let verifier = verifier.clone();
        tokio::spawn(async move { verifier.logout().await })
    };
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    assert!(!logout.is_finished());

    h.store.resume(StorageOp::Set);
    let renewed = renewal.await.unwrap().unwrap();
    assert_eq!(renewed.access_token.expose(), "access-1");
    logout.await.unwrap().unwrap();

    assert!(!h.store.contains(keys::IDENTITY));
    assert_eq!(verifier.phase(), SessionPhase::LoggedOut);
    assert_eq!(h.verifier().boot().await, Err(BootError::MissingEntry));
}

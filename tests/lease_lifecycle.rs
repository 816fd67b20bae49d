mod common;

use common::*;
use leasekeeper::application_impl::*;
use leasekeeper::application_port::*;
use leasekeeper::domain_model::*;
use leasekeeper::domain_port::TaskScheduler;
use leasekeeper::runtime::TokioTaskScheduler;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn renews_at_two_thirds_of_each_ttl() {
    let harness = Harness::new(FakeBackendConfig::default());
    let lease = harness
        .manager
        .acquire("database/creds/app", LeaseMode::Renew)
        .await
        .unwrap();

    advance(secs(19)).await;
    assert!(harness.renewal_offsets(&lease.id).is_empty());

    advance(secs(26)).await;
    let offsets = harness.renewal_offsets(&lease.id);
    assert_eq!(offsets.len(), 2);
    assert_near(offsets[0], secs(20));
    assert_near(offsets[1], secs(40));

    assert_eq!(
        harness.recorder.names_for(&lease.id),
        vec!["CREATED", "RENEWED", "RENEWED"]
    );
    let current = harness.manager.lookup(&lease.id).unwrap();
    assert_eq!(current.state, CredentialState::Active);
    assert!(current.last_renewed.is_some());
}

#[tokio::test(start_paused = true)]
async fn renewal_follows_the_ttl_returned_by_the_backend() {
    let harness = Harness::new(FakeBackendConfig::default());
    harness.backend.set_renew_ttl(secs(90));
    let lease = static_lease("database/creds/app/static", secs(30), LeaseMode::Renew);
    let id = lease.id.clone();
    harness.manager.register(lease).unwrap();

    advance(secs(100)).await;
    let offsets = harness.renewal_offsets(&id);
    assert_eq!(offsets.len(), 2);
    assert_near(offsets[0], secs(20));
    assert_near(offsets[1], secs(80));
    assert_eq!(harness.manager.lookup(&id).unwrap().ttl, secs(90));
}

#[tokio::test(start_paused = true)]
async fn registering_the_same_id_replaces_the_schedule() {
    let harness = Harness::new(FakeBackendConfig::default());
    let id = LeaseId::from("database/creds/app/dup");
    harness
        .manager
        .register(static_lease(id.as_str(), secs(30), LeaseMode::Renew))
        .unwrap();
    advance(secs(10)).await;
    harness
        .manager
        .register(static_lease(id.as_str(), secs(30), LeaseMode::Renew))
        .unwrap();

    advance(secs(25)).await;
    let offsets = harness.renewal_offsets(&id);
    assert_eq!(offsets.len(), 1);
    assert_near(offsets[0], secs(30));
    assert_eq!(harness.manager.list().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unregister_stops_renewal_without_events() {
    let harness = Harness::new(FakeBackendConfig::default());
    let lease = harness
        .manager
        .acquire("database/creds/app", LeaseMode::Renew)
        .await
        .unwrap();

    advance(secs(10)).await;
    let removed = harness.manager.unregister(&lease.id).unwrap();
    assert_eq!(removed.id, lease.id);
    assert!(harness.manager.unregister(&lease.id).is_none());

    advance(secs(120)).await;
    assert!(harness.renewal_offsets(&lease.id).is_empty());
    assert!(harness.backend.revoked_leases().is_empty());
    assert_eq!(harness.recorder.names_for(&lease.id), vec!["CREATED"]);
}

#[tokio::test(start_paused = true)]
async fn revoke_removes_and_announces() {
    let harness = Harness::new(FakeBackendConfig::default());
    let lease = harness
        .manager
        .acquire("database/creds/app", LeaseMode::Renew)
        .await
        .unwrap();

    assert!(harness.manager.revoke(&lease.id).await.is_some());
    assert_eq!(harness.backend.revoked_leases(), vec![lease.id.clone()]);
    assert!(harness.manager.lookup(&lease.id).is_none());

    advance(secs(60)).await;
    assert_eq!(harness.recorder.names_for(&lease.id), vec!["CREATED", "REVOKED"]);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_with_backoff() {
    let harness = Harness::new(FakeBackendConfig::default());
    harness
        .backend
        .fail_renewals(2, RenewalError::Unavailable("sealed".into()));
    let lease = harness
        .manager
        .acquire("database/creds/app", LeaseMode::Renew)
        .await
        .unwrap();

    advance(secs(20) + Duration::from_millis(500)).await;
    assert_eq!(
        harness.manager.lookup(&lease.id).unwrap().state,
        CredentialState::Error
    );

    advance(secs(5)).await;
    let offsets = harness.renewal_offsets(&lease.id);
    assert_eq!(offsets.len(), 3);
    assert_near(offsets[0], secs(20));
    assert_near(offsets[1], secs(21));
    assert_near(offsets[2], secs(23));

    let current = harness.manager.lookup(&lease.id).unwrap();
    assert_eq!(current.state, CredentialState::Active);
    assert_eq!(current.attempts, 0);
    assert_eq!(
        harness.recorder.names_for(&lease.id),
        vec!["CREATED", "ERROR", "ERROR", "RENEWED"]
    );
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_rotate_a_rotating_lease() {
    let harness = Harness::new(FakeBackendConfig::default());
    harness
        .backend
        .fail_renewals(3, RenewalError::Unavailable("sealed".into()));
    let original = harness
        .manager
        .acquire("aws/creds/deploy", LeaseMode::Rotate)
        .await
        .unwrap();

    advance(secs(25)).await;
    assert_eq!(harness.renewal_offsets(&original.id).len(), 3);
    assert!(harness.manager.lookup(&original.id).is_none());

    let current = harness.manager.list();
    assert_eq!(current.len(), 1);
    let replacement = &current[0];
    assert_ne!(replacement.id, original.id);
    assert_eq!(replacement.path, "aws/creds/deploy");
    assert_eq!(replacement.mode, LeaseMode::Rotate);
    assert_eq!(harness.backend.reissues().len(), 2);

    assert_eq!(
        harness.recorder.names_for(&original.id),
        vec!["CREATED", "ERROR", "ERROR", "ERROR", "ROTATED"]
    );
    let rotated = harness
        .recorder
        .events()
        .into_iter()
        .find_map(|event| match event.payload {
            EventPayload::Lease(LeaseEvent::Rotated { previous, lease }) => Some((previous, lease)),
            _ => None,
        })
        .unwrap();
    assert_eq!(rotated.0, original.id);
    assert_eq!(rotated.1.id, replacement.id);

    // the replacement runs its own renewal cycle from the rotation instant
    advance(secs(20)).await;
    let offsets = harness.renewal_offsets(&replacement.id);
    assert_eq!(offsets.len(), 1);
    assert_near(offsets[0], secs(43));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_expire_a_renew_only_lease_once() {
    let harness = Harness::new(FakeBackendConfig::default());
    harness
        .backend
        .fail_renewals(3, RenewalError::Timeout(secs(10)));
    let lease = harness
        .manager
        .acquire("database/creds/app", LeaseMode::Renew)
        .await
        .unwrap();

    advance(secs(120)).await;
    assert!(harness.manager.lookup(&lease.id).is_none());
    assert_eq!(harness.renewal_offsets(&lease.id).len(), 3);
    assert_eq!(
        harness.recorder.names_for(&lease.id),
        vec!["CREATED", "ERROR", "ERROR", "ERROR", "EXPIRED"]
    );
    assert_eq!(harness.recorder.count("EXPIRED"), 1);
    assert_eq!(harness.backend.reissues().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn permanent_failure_skips_retries() {
    let harness = Harness::new(FakeBackendConfig::default());
    harness
        .backend
        .fail_renewals(1, RenewalError::Rejected("lease not found".into()));
    let lease = harness
        .manager
        .acquire("database/creds/app", LeaseMode::Renew)
        .await
        .unwrap();

    advance(secs(60)).await;
    assert_eq!(harness.renewal_offsets(&lease.id).len(), 1);
    let retrying: Vec<bool> = harness
        .recorder
        .events()
        .into_iter()
        .filter_map(|event| match event.payload {
            EventPayload::Lease(LeaseEvent::Error { retrying, .. }) => Some(retrying),
            _ => None,
        })
        .collect();
    assert_eq!(retrying, vec![false]);
    assert_eq!(
        harness.recorder.names_for(&lease.id),
        vec!["CREATED", "ERROR", "EXPIRED"]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_reissue_expires_the_lease() {
    let harness = Harness::new(FakeBackendConfig::default());
    harness
        .backend
        .fail_renewals(1, RenewalError::Rejected("revoked upstream".into()));
    let lease = harness
        .manager
        .acquire("aws/creds/deploy", LeaseMode::Rotate)
        .await
        .unwrap();
    harness
        .backend
        .fail_reissues(1, RenewalError::Unavailable("sealed".into()));

    advance(secs(30)).await;
    assert!(harness.manager.list().is_empty());
    assert_eq!(
        harness.recorder.names_for(&lease.id),
        vec!["CREATED", "ERROR", "ERROR", "EXPIRED"]
    );
}

#[tokio::test(start_paused = true)]
async fn non_renewable_lease_expires_at_its_ttl() {
    let harness = Harness::new(FakeBackendConfig {
        lease_renewable: false,
        ..FakeBackendConfig::default()
    });
    let lease = harness
        .manager
        .acquire("database/creds/readonly", LeaseMode::Renew)
        .await
        .unwrap();
    assert!(!lease.renewable);

    advance(secs(29)).await;
    assert!(harness.manager.lookup(&lease.id).is_some());

    advance(secs(2)).await;
    assert!(harness.manager.lookup(&lease.id).is_none());
    assert!(harness.backend.renewals().is_empty());
    assert_eq!(harness.recorder.names_for(&lease.id), vec!["CREATED", "EXPIRED"]);
}

#[tokio::test(start_paused = true)]
async fn acquire_failure_is_reported_and_nothing_is_registered() {
    let harness = Harness::new(FakeBackendConfig::default());
    harness
        .backend
        .fail_reissues(1, RenewalError::Rejected("permission denied".into()));

    let error = harness
        .manager
        .acquire("database/creds/app", LeaseMode::Renew)
        .await
        .unwrap_err();
    assert!(matches!(error, RegistrationError::Acquire { ref path, .. } if path == "database/creds/app"));
    assert!(harness.manager.list().is_empty());
    assert!(harness.recorder.names().is_empty());
}

#[tokio::test(start_paused = true)]
async fn many_leases_renew_independently() {
    let harness = Harness::new(FakeBackendConfig::default());
    let mut ids = Vec::new();
    for n in 0..20u64 {
        let lease = static_lease(
            &format!("database/creds/app/{n:02}"),
            secs(30 + n * 3),
            LeaseMode::Renew,
        );
        ids.push(lease.id.clone());
        harness.manager.register(lease).unwrap();
    }

    advance(secs(80)).await;
    for (n, id) in ids.iter().enumerate() {
        let offsets = harness.renewal_offsets(id);
        assert!(!offsets.is_empty(), "lease {id} never renewed");
        assert_near(offsets[0], secs(20 + 2 * n as u64));
    }
    assert_eq!(harness.manager.list().len(), 20);
}

#[tokio::test(start_paused = true)]
async fn rejected_task_expires_the_lease_on_registration() {
    let executor = Arc::new(TokioTaskScheduler::new(1));
    executor.shutdown(secs(1)).await;
    let harness = Harness::with_executor(
        FakeBackendConfig::default(),
        executor,
        RetryPolicy::default(),
        RenewalConfig::default(),
    );

    let lease = static_lease("database/creds/app/late", secs(30), LeaseMode::Renew);
    let id = lease.id.clone();
    let error = harness.manager.register(lease).unwrap_err();
    assert!(matches!(
        error,
        RegistrationError::Scheduling(leasekeeper::domain_port::SchedulingError::ShutDown)
    ));
    assert!(harness.manager.list().is_empty());
    assert_eq!(
        harness.recorder.names_for(&id),
        vec!["CREATED", "ERROR", "EXPIRED"]
    );
}

#[tokio::test(start_paused = true)]
async fn acquire_racing_close_is_revoked_not_registered() {
    let harness = Harness::with(
        FakeBackendConfig::default(),
        RetryPolicy::default(),
        revoking_on_close(),
    );
    let first = harness
        .manager
        .acquire("database/creds/app", LeaseMode::Renew)
        .await
        .unwrap();
    harness.backend.set_reissue_delay(secs(1));
    harness.backend.set_revoke_delay(secs(2));

    let manager = harness.manager.clone();
    let late = tokio::spawn(async move {
        manager
            .acquire("database/creds/report", LeaseMode::Renew)
            .await
    });
    advance(Duration::from_millis(100)).await;

    harness.manager.close(secs(1)).await;
    let outcome = late.await.unwrap();
    assert!(matches!(outcome, Err(RegistrationError::Closed)));

    assert!(harness.manager.list().is_empty());
    let revoked = harness.backend.revoked_leases();
    assert_eq!(revoked.len(), 2);
    assert!(revoked.contains(&first.id));
    assert!(revoked.iter().any(|id| id.as_str().starts_with("database/creds/report/")));
    assert_eq!(harness.recorder.count("CREATED"), 1);

    advance(secs(120)).await;
    assert!(harness.backend.renewals().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unbounded_ttl_from_the_backend_keeps_the_lease_alive() {
    let harness = Harness::new(FakeBackendConfig::default());
    harness.backend.set_renew_ttl(Duration::MAX);
    let lease = harness
        .manager
        .acquire("database/creds/app", LeaseMode::Renew)
        .await
        .unwrap();

    advance(secs(25)).await;
    assert_eq!(harness.renewal_offsets(&lease.id).len(), 1);
    let current = harness.manager.lookup(&lease.id).unwrap();
    assert_eq!(current.state, CredentialState::Active);
    assert_eq!(current.ttl, Duration::MAX);
    assert_eq!(
        harness.recorder.names_for(&lease.id),
        vec!["CREATED", "RENEWED"]
    );
}

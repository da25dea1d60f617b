use chrono::Utc;
use controlplane_approvals::{
    ApprovalEngine, ApprovalStatus, AutoApprovalPolicy, NewApprovalRequest, TenantChangeApplier,
};
use controlplane_core::config::{ApprovalConfig, AuthConfig};
use controlplane_core::types::{
    ApprovalCategory, ApprovalPriority, ApprovalType, CallerIdentity, SubscriptionStatus,
    SubscriptionTier, Tenant, User, UserRole,
};
use controlplane_core::ControlPlaneError;
use controlplane_platform::tenancy::tier_defaults;
use controlplane_platform::{
    AuditLog, AuditQuery, MfaVerifier, NamespaceStore, TenantDirectory, TenantResolver,
};
use serde_json::json;
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

struct Harness {
    directory: Arc<TenantDirectory>,
    namespaces: Arc<NamespaceStore>,
    resolver: TenantResolver,
    audit: Arc<AuditLog>,
    engine: ApprovalEngine,
    mfa: MfaVerifier,
}

fn harness() -> (Harness, Tenant) {
    let directory = Arc::new(TenantDirectory::new());
    let namespaces = Arc::new(NamespaceStore::new());
    let audit = Arc::new(AuditLog::new());

    let defaults = tier_defaults(SubscriptionTier::Professional);
    let now = Utc::now();
    let acme = Tenant {
        id: Uuid::new_v4(),
        name: "Acme".into(),
        slug: "acme".into(),
        idp_org_ref: Some("org_acme".into()),
        namespace: "tenant_acme_5f3a9c01".into(),
        tier: SubscriptionTier::Professional,
        status: SubscriptionStatus::Active,
        features: defaults.features,
        max_users: defaults.max_users,
        max_entities: defaults.max_entities,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    directory.insert_tenant(acme.clone());
    namespaces.provision(&acme.namespace).unwrap();

    let engine = ApprovalEngine::new(
        AutoApprovalPolicy::from_config(&ApprovalConfig::default()),
        Arc::new(TenantChangeApplier::new(directory.clone(), namespaces.clone())),
        audit.clone(),
    );
    let h = Harness {
        resolver: TenantResolver::new(directory.clone(), "tenant_"),
        mfa: MfaVerifier::new(directory.clone(), &AuthConfig::default()),
        directory,
        namespaces,
        audit,
        engine,
    };
    (h, acme)
}

fn add_user(h: &Harness, tenant: &Tenant, email: &str, role: UserRole) -> CallerIdentity {
    let user = User::new(tenant.id, email, role);
    let caller = CallerIdentity {
        user_id: user.id,
        session_id: Uuid::new_v4(),
        platform_operator: false,
    };
    h.directory.insert_user(user);
    caller
}

fn totp_now(secret_base32: &str, account: &str) -> String {
    let bytes = Secret::Encoded(secret_base32.to_string()).to_bytes().unwrap();
    TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        bytes,
        Some("ControlPlane".into()),
        account.to_string(),
    )
    .unwrap()
    .generate_current()
    .unwrap()
}

#[tokio::test]
async fn destructive_op_needs_fresh_step_up() {
    let (h, acme) = harness();
    let requester = add_user(&h, &acme, "manager@acme.test", UserRole::Manager);
    let approver = add_user(&h, &acme, "admin@acme.test", UserRole::Admin);

    // Something to delete.
    let req_ctx = h.resolver.resolve(&requester).unwrap();
    h.namespaces
        .put(&req_ctx, "reports", "legacy-q1", json!({"rows": 120}))
        .unwrap();

    let created = h
        .engine
        .create(
            &req_ctx,
            NewApprovalRequest {
                approval_type: Some(ApprovalType::DestructiveOp),
                category: Some(ApprovalCategory::Security),
                priority: Some(ApprovalPriority::High),
                title: Some("Purge legacy report".into()),
                description: Some("Remove the Q1 legacy report".into()),
                requested_changes: Some(json!({"collection": "reports", "key": "legacy-q1"})),
                rationale: Some("Superseded".into()),
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(created.status, ApprovalStatus::MfaRequired);

    // First attempt: no step-up in this request.
    let approver_ctx = h.resolver.resolve(&approver).unwrap();
    let err = h
        .engine
        .approve(&approver_ctx, created.id, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ControlPlaneError::MfaRequired));
    assert_eq!(err.status_code(), 401);
    assert!(h
        .namespaces
        .get(&approver_ctx, "reports", "legacy-q1")
        .unwrap()
        .is_some());

    // The approver verifies a TOTP code, then retries.
    let enrollment = h.mfa.enroll(approver.user_id).unwrap();
    let proof = h
        .mfa
        .verify(approver.user_id, &totp_now(&enrollment.secret_base32, "admin@acme.test"))
        .unwrap();
    assert_eq!(proof.user_id, approver.user_id);

    let approved = h
        .engine
        .approve(&approver_ctx, created.id, true)
        .await
        .unwrap();
    assert_eq!(approved.status, ApprovalStatus::Approved);
    assert_eq!(approved.approver_id, Some(approver.user_id));

    // Effect applied exactly once.
    assert!(h
        .namespaces
        .get(&approver_ctx, "reports", "legacy-q1")
        .unwrap()
        .is_none());

    let entries = h.audit.query(&AuditQuery {
        action: Some("approval.approved".into()),
        ..Default::default()
    });
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].actor, approver.user_id.to_string());
    assert_eq!(entries[0].tenant_id, Some(acme.id));
}

#[tokio::test]
async fn auto_approved_feature_flag_retry_applies_once() {
    let (h, acme) = harness();
    let requester = add_user(&h, &acme, "owner@acme.test", UserRole::Owner);
    let ctx = h.resolver.resolve(&requester).unwrap();

    let submit = || NewApprovalRequest {
        approval_type: Some(ApprovalType::FeatureFlag),
        category: Some(ApprovalCategory::Operational),
        priority: Some(ApprovalPriority::Low),
        title: Some("Enable SSO".into()),
        description: Some("Turn on SSO for acme".into()),
        requested_changes: Some(json!({"feature": "sso", "value": true})),
        rationale: None,
    };

    let first = h
        .engine
        .create(&ctx, submit(), Some("idem-42".into()))
        .await
        .unwrap();
    let retry = h
        .engine
        .create(&ctx, submit(), Some("idem-42".into()))
        .await
        .unwrap();

    assert_eq!(first.id, retry.id);
    assert_eq!(first.status, ApprovalStatus::Approved);
    assert!(h.directory.get_tenant(acme.id).unwrap().has_feature("sso"));
    assert_eq!(h.namespaces.count(&ctx, "applied_changes").unwrap(), 1);
    assert_eq!(
        h.audit
            .query(&AuditQuery {
                action: Some("approval.created".into()),
                ..Default::default()
            })
            .len(),
        1
    );
}

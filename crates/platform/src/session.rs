//! Bearer-token sessions mapping an opaque token to a caller identity.

use chrono::{DateTime, Duration, Utc};
use controlplane_core::types::CallerIdentity;
use controlplane_core::{ControlPlaneError, ControlPlaneResult};
use dashmap::DashMap;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

const TOKEN_PREFIX: &str = "cps_";

/// A live session. The raw token is never stored, only its digest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub platform_operator: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionStore {
    by_digest: DashMap<String, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl_hours: i64) -> Self {
        Self {
            by_digest: DashMap::new(),
            ttl: Duration::hours(ttl_hours.max(1)),
        }
    }

    /// Open a session and return the bearer token alongside it.
    pub fn create_session(&self, user_id: Uuid, platform_operator: bool) -> (String, Session) {
        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let token = format!("{TOKEN_PREFIX}{}", hex::encode(raw));

        let now = Utc::now();
        let session = Session {
            session_id: Uuid::new_v4(),
            user_id,
            platform_operator,
            created_at: now,
            expires_at: now + self.ttl,
        };
        info!(
            session_id = %session.session_id,
            user_id = %user_id,
            platform_operator,
            "Session created"
        );
        self.by_digest.insert(digest(&token), session.clone());
        (token, session)
    }

    /// Resolve a bearer token. Expired sessions are dropped on sight.
    pub fn authenticate(&self, token: &str) -> ControlPlaneResult<CallerIdentity> {
        if !token.starts_with(TOKEN_PREFIX) {
            return Err(ControlPlaneError::Unauthorized("malformed session token".into()));
        }
        let key = digest(token);
        let session = self
            .by_digest
            .get(&key)
            .map(|e| e.value().clone())
            .ok_or_else(|| ControlPlaneError::Unauthorized("unknown session".into()))?;

        if Utc::now() >= session.expires_at {
            self.by_digest.remove(&key);
            debug!(session_id = %session.session_id, "Expired session discarded");
            return Err(ControlPlaneError::Unauthorized("session expired".into()));
        }

        Ok(CallerIdentity {
            user_id: session.user_id,
            session_id: session.session_id,
            platform_operator: session.platform_operator,
        })
    }

    /// Revoke a session by id. Returns `true` when it existed.
    pub fn revoke(&self, session_id: Uuid) -> bool {
        let before = self.by_digest.len();
        self.by_digest.retain(|_, s| s.session_id != session_id);
        let removed = self.by_digest.len() < before;
        if removed {
            info!(session_id = %session_id, "Session revoked");
        }
        removed
    }

    pub fn active_sessions(&self, user_id: Uuid) -> Vec<Session> {
        let now = Utc::now();
        self.by_digest
            .iter()
            .filter(|e| e.value().user_id == user_id && now < e.value().expires_at)
            .map(|e| e.value().clone())
            .collect()
    }
}

fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_authenticate() {
        let store = SessionStore::new(8);
        let user_id = Uuid::new_v4();
        let (token, session) = store.create_session(user_id, true);

        let caller = store.authenticate(&token).unwrap();
        assert_eq!(caller.user_id, user_id);
        assert_eq!(caller.session_id, session.session_id);
        assert!(caller.platform_operator);
        assert_eq!(store.active_sessions(user_id).len(), 1);
    }

    #[test]
    fn test_unknown_and_malformed_tokens_rejected() {
        let store = SessionStore::new(8);
        assert!(matches!(
            store.authenticate("garbage"),
            Err(ControlPlaneError::Unauthorized(_))
        ));
        assert!(store.authenticate("cps_00ff").is_err());
    }

    #[test]
    fn test_revoke_session() {
        let store = SessionStore::new(8);
        let (token, session) = store.create_session(Uuid::new_v4(), false);
        assert!(store.revoke(session.session_id));
        assert!(store.authenticate(&token).is_err());
        assert!(!store.revoke(session.session_id));
    }
}

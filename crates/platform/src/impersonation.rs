//! Signed, short-lived impersonation tokens for support access.
//!
//! Tokens are HMAC-SHA256 signed JSON claims encoded as
//! `<base64-payload>.<base64-signature>`. Without a configured key nothing
//! is issued; there is no default key.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use controlplane_core::config::AuthConfig;
use controlplane_core::types::User;
use controlplane_core::{ControlPlaneError, ControlPlaneResult};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Keys shorter than this are treated as misconfiguration.
const MIN_KEY_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpersonationClaims {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub issued_by: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ImpersonationClaims {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

pub struct ImpersonationSigner {
    key: Option<Vec<u8>>,
    ttl: Duration,
}

impl ImpersonationSigner {
    /// Build from config. A missing or undecodable key leaves the signer
    /// unable to issue; the error surfaces on first use.
    pub fn from_config(auth: &AuthConfig) -> Self {
        let key = auth
            .impersonation_signing_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .and_then(|k| base64::engine::general_purpose::STANDARD.decode(k).ok());
        if auth.impersonation_signing_key.is_some() && key.is_none() {
            tracing::warn!("Impersonation signing key is not valid base64; issuance disabled");
        }
        Self {
            key,
            ttl: Duration::seconds(auth.effective_impersonation_ttl_secs() as i64),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.key.as_ref().is_some_and(|k| k.len() >= MIN_KEY_BYTES)
    }

    fn mac(&self) -> ControlPlaneResult<HmacSha256> {
        let key = self
            .key
            .as_deref()
            .filter(|k| k.len() >= MIN_KEY_BYTES)
            .ok_or_else(|| {
                ControlPlaneError::Config("impersonation signing key is not configured".into())
            })?;
        HmacSha256::new_from_slice(key)
            .map_err(|e| ControlPlaneError::internal(format!("HMAC init: {e}")))
    }

    /// Sign a token scoped to `target` and its tenant.
    pub fn issue(
        &self,
        target: &User,
        issued_by: Uuid,
    ) -> ControlPlaneResult<(String, ImpersonationClaims)> {
        let mut mac = self.mac()?;
        let now = Utc::now();
        let claims = ImpersonationClaims {
            token_id: Uuid::new_v4(),
            user_id: target.id,
            tenant_id: target.tenant_id,
            issued_by,
            issued_at: now,
            expires_at: now + self.ttl,
        };

        let payload = serde_json::to_vec(&claims)
            .map_err(|e| ControlPlaneError::internal(format!("encode claims: {e}")))?;
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();

        let token = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        );
        Ok((token, claims))
    }

    /// Check signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> ControlPlaneResult<ImpersonationClaims> {
        let invalid = || ControlPlaneError::Unauthorized("invalid impersonation token".into());

        let (payload_b64, sig_b64) = token.trim().split_once('.').ok_or_else(invalid)?;
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| invalid())?;
        let signature = URL_SAFE_NO_PAD.decode(sig_b64).map_err(|_| invalid())?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let claims: ImpersonationClaims = serde_json::from_slice(&payload).map_err(|_| invalid())?;
        if claims.is_expired() {
            return Err(ControlPlaneError::Unauthorized(
                "impersonation token expired".into(),
            ));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controlplane_core::types::UserRole;

    fn config_with_key() -> AuthConfig {
        AuthConfig {
            impersonation_signing_key: Some(
                base64::engine::general_purpose::STANDARD.encode([7u8; 32]),
            ),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let signer = ImpersonationSigner::from_config(&config_with_key());
        let target = User::new(Uuid::new_v4(), "u@acme.test", UserRole::Viewer);
        let admin = Uuid::new_v4();

        let (token, claims) = signer.issue(&target, admin).unwrap();
        assert_eq!(claims.user_id, target.id);
        assert_eq!(claims.tenant_id, target.tenant_id);
        assert!(claims.expires_at - claims.issued_at <= Duration::hours(1));

        assert_eq!(signer.verify(&token).unwrap(), claims);
    }

    #[test]
    fn test_missing_key_refuses_issuance() {
        let signer = ImpersonationSigner::from_config(&AuthConfig::default());
        assert!(!signer.is_configured());
        let target = User::new(Uuid::new_v4(), "u@acme.test", UserRole::Viewer);
        let err = signer.issue(&target, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ControlPlaneError::Config(_)));
    }

    #[test]
    fn test_short_key_refuses_issuance() {
        let auth = AuthConfig {
            impersonation_signing_key: Some(
                base64::engine::general_purpose::STANDARD.encode(b"short"),
            ),
            ..AuthConfig::default()
        };
        assert!(!ImpersonationSigner::from_config(&auth).is_configured());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let signer = ImpersonationSigner::from_config(&config_with_key());
        let target = User::new(Uuid::new_v4(), "u@acme.test", UserRole::Viewer);
        let (token, _) = signer.issue(&target, Uuid::new_v4()).unwrap();

        let (_, sig) = token.split_once('.').unwrap();
        let forged_claims = ImpersonationClaims {
            token_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            issued_by: Uuid::new_v4(),
            issued_at: Utc::now(),
            expires_at: Utc::now() + Duration::days(30),
        };
        let forged = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap()),
            sig
        );
        assert!(signer.verify(&forged).is_err());
    }

    #[test]
    fn test_other_key_rejects_token() {
        let signer = ImpersonationSigner::from_config(&config_with_key());
        let other = ImpersonationSigner::from_config(&AuthConfig {
            impersonation_signing_key: Some(
                base64::engine::general_purpose::STANDARD.encode([9u8; 32]),
            ),
            ..AuthConfig::default()
        });
        let target = User::new(Uuid::new_v4(), "u@acme.test", UserRole::Viewer);
        let (token, _) = signer.issue(&target, Uuid::new_v4()).unwrap();
        assert!(other.verify(&token).is_err());
    }
}

//! Step-up MFA: TOTP enrollment and verification plus one-time backup codes.
//!
//! A [`StepUpProof`] is only ever produced by a verification in the current
//! request. The stored `mfa_enabled` flag on its own proves nothing.

use chrono::{DateTime, Utc};
use controlplane_core::config::AuthConfig;
use controlplane_core::types::User;
use controlplane_core::{ControlPlaneError, ControlPlaneResult};
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::{info, warn};
use uuid::Uuid;

use crate::tenancy::TenantDirectory;

const BACKUP_CODE_COUNT: usize = 10;

/// Returned once at enrollment; the secret and codes are not retrievable later.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaEnrollment {
    pub secret_base32: String,
    pub otpauth_uri: String,
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepUpMethod {
    Totp,
    BackupCode,
}

/// Evidence of a second factor verified just now for `user_id`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepUpProof {
    pub user_id: Uuid,
    pub method: StepUpMethod,
    pub verified_at: DateTime<Utc>,
}

pub struct MfaVerifier {
    directory: Arc<TenantDirectory>,
    issuer: String,
    digits: usize,
    step: u64,
    skew: u8,
}

impl MfaVerifier {
    pub fn new(directory: Arc<TenantDirectory>, auth: &AuthConfig) -> Self {
        Self {
            directory,
            issuer: auth.totp_issuer.clone(),
            digits: auth.totp_digits,
            step: auth.totp_step_secs,
            skew: auth.totp_skew,
        }
    }

    fn totp(&self, secret: Vec<u8>, account: &str) -> ControlPlaneResult<TOTP> {
        TOTP::new(
            Algorithm::SHA1,
            self.digits,
            self.skew,
            self.step,
            secret,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| ControlPlaneError::internal(format!("TOTP init: {e}")))
    }

    /// Generate a fresh secret and backup codes for a user, replacing any
    /// previous enrollment.
    pub fn enroll(&self, user_id: Uuid) -> ControlPlaneResult<MfaEnrollment> {
        let user = self
            .directory
            .get_user(user_id)
            .ok_or_else(|| ControlPlaneError::not_found("user", user_id))?;

        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|e| ControlPlaneError::internal(format!("secret bytes: {e}")))?;
        let otpauth_uri = self.totp(secret_bytes, &user.email)?.get_url();
        let secret_base32 = secret.to_encoded().to_string();

        let backup_codes: Vec<String> = (0..BACKUP_CODE_COUNT).map(|_| backup_code()).collect();
        let hashed: Vec<String> = backup_codes.iter().map(|c| hash_code(c)).collect();

        let stored_secret = secret_base32.clone();
        self.directory.update_user(user_id, move |u| {
            u.mfa_enabled = true;
            u.mfa_secret = Some(stored_secret);
            u.mfa_backup_codes = hashed;
            Ok(())
        })?;

        info!(user_id = %user_id, "MFA enrolled");
        Ok(MfaEnrollment {
            secret_base32,
            otpauth_uri,
            backup_codes,
        })
    }

    /// Verify a TOTP code or consume a backup code.
    pub fn verify(&self, user_id: Uuid, code: &str) -> ControlPlaneResult<StepUpProof> {
        let user = self
            .directory
            .get_user(user_id)
            .ok_or_else(|| ControlPlaneError::Unauthorized("unknown user".into()))?;
        let code = code.trim();

        let method = if self.check_totp(&user, code)? {
            StepUpMethod::Totp
        } else if self.consume_backup_code(&user, code)? {
            StepUpMethod::BackupCode
        } else {
            warn!(user_id = %user_id, "MFA verification failed");
            metrics::counter!("mfa.failures").increment(1);
            return Err(ControlPlaneError::Unauthorized("invalid MFA code".into()));
        };

        Ok(StepUpProof {
            user_id,
            method,
            verified_at: Utc::now(),
        })
    }

    fn check_totp(&self, user: &User, code: &str) -> ControlPlaneResult<bool> {
        let secret = match (&user.mfa_secret, user.mfa_enabled) {
            (Some(secret), true) => secret,
            _ => {
                return Err(ControlPlaneError::Forbidden(
                    "MFA is not enrolled for this user".into(),
                ))
            }
        };
        if code.len() != self.digits || !code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }
        let bytes = Secret::Encoded(secret.clone())
            .to_bytes()
            .map_err(|e| ControlPlaneError::internal(format!("stored MFA secret: {e}")))?;
        self.totp(bytes, &user.email)?
            .check_current(code)
            .map_err(|e| ControlPlaneError::internal(format!("TOTP check: {e}")))
    }

    fn consume_backup_code(&self, user: &User, code: &str) -> ControlPlaneResult<bool> {
        let hashed = hash_code(&code.to_lowercase());
        self.directory.update_user(user.id, |u| {
            match u.mfa_backup_codes.iter().position(|h| *h == hashed) {
                Some(idx) => {
                    u.mfa_backup_codes.remove(idx);
                    info!(user_id = %u.id, remaining = u.mfa_backup_codes.len(), "Backup code consumed");
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }
}

fn backup_code() -> String {
    let n: u64 = rand::thread_rng().gen();
    format!("{:010x}", n & 0xff_ffff_ffff)
}

fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

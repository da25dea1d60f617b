//! Audit logging: append-only, hash-chained record of every privileged
//! action, with filtered queries and chain verification.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

const GENESIS_HASH: &str = "genesis";

/// A single audit entry with tamper-evident hash chaining.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub sequence: u64,
    /// `None` for cross-tenant system actions.
    pub tenant_id: Option<Uuid>,
    pub actor: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// SHA-256 over this entry's content and the previous hash.
    pub entry_hash: String,
    pub previous_hash: String,
}

/// Builder for an entry about to be appended.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    tenant_id: Option<Uuid>,
    actor: String,
    action: String,
    resource_type: String,
    resource_id: String,
    metadata: serde_json::Value,
}

impl AuditRecord {
    pub fn new(
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl ToString,
    ) -> Self {
        Self {
            tenant_id: None,
            actor: "system".to_string(),
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Filter for [`AuditLog::query`]. Unset fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub tenant_id: Option<Uuid>,
    pub actor: Option<String>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    fn matches(&self, entry: &AuditLogEntry) -> bool {
        if self.tenant_id.is_some() && entry.tenant_id != self.tenant_id {
            return false;
        }
        if let Some(ref actor) = self.actor {
            if &entry.actor != actor {
                return false;
            }
        }
        if let Some(ref action) = self.action {
            if &entry.action != action {
                return false;
            }
        }
        if let Some(ref rt) = self.resource_type {
            if &entry.resource_type != rt {
                return false;
            }
        }
        if let Some(ref rid) = self.resource_id {
            if &entry.resource_id != rid {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.created_at > to {
                return false;
            }
        }
        true
    }
}

/// Result of verifying the audit chain integrity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub tampered_sequences: Vec<u64>,
    pub chain_intact: bool,
}

struct Chain {
    entries: Vec<AuditLogEntry>,
    last_hash: String,
}

/// Append-only audit log. There is no update or delete API.
pub struct AuditLog {
    chain: RwLock<Chain>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            chain: RwLock::new(Chain {
                entries: Vec::new(),
                last_hash: GENESIS_HASH.to_string(),
            }),
        }
    }

    /// Append an entry, assigning its sequence number and chain hash.
    pub fn append(&self, record: AuditRecord) -> AuditLogEntry {
        let mut chain = self.chain.write();
        let sequence = chain.entries.len() as u64 + 1;
        let mut entry = AuditLogEntry {
            id: Uuid::new_v4(),
            sequence,
            tenant_id: record.tenant_id,
            actor: record.actor,
            action: record.action,
            resource_type: record.resource_type,
            resource_id: record.resource_id,
            metadata: record.metadata,
            created_at: Utc::now(),
            entry_hash: String::new(),
            previous_hash: chain.last_hash.clone(),
        };
        entry.entry_hash = entry_digest(&entry);
        chain.last_hash = entry.entry_hash.clone();
        chain.entries.push(entry.clone());
        drop(chain);

        info!(
            sequence = entry.sequence,
            action = %entry.action,
            resource = %entry.resource_type,
            resource_id = %entry.resource_id,
            actor = %entry.actor,
            "Audit entry appended"
        );
        metrics::counter!("audit.entries").increment(1);
        entry
    }

    /// Newest-first entries matching the filter.
    pub fn query(&self, filter: &AuditQuery) -> Vec<AuditLogEntry> {
        let chain = self.chain.read();
        let limit = filter.limit.unwrap_or(usize::MAX);
        chain
            .entries
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Oldest-first entries for one resource.
    pub fn for_resource(&self, resource_type: &str, resource_id: &str) -> Vec<AuditLogEntry> {
        let chain = self.chain.read();
        chain
            .entries
            .iter()
            .filter(|e| e.resource_type == resource_type && e.resource_id == resource_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.chain.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recompute every hash and check each link to its predecessor.
    pub fn verify_chain(&self) -> ChainVerification {
        let chain = self.chain.read();
        let total = chain.entries.len();
        let mut valid = 0;
        let mut tampered = Vec::new();
        let mut expected_prev = GENESIS_HASH.to_string();

        for entry in &chain.entries {
            if entry.previous_hash == expected_prev && entry_digest(entry) == entry.entry_hash {
                valid += 1;
            } else {
                tampered.push(entry.sequence);
            }
            expected_prev = entry.entry_hash.clone();
        }

        ChainVerification {
            total_entries: total,
            valid_entries: valid,
            tampered_sequences: tampered,
            chain_intact: valid == total,
        }
    }

    #[cfg(test)]
    fn tamper(&self, sequence: u64, action: &str) {
        let mut chain = self.chain.write();
        if let Some(entry) = chain.entries.iter_mut().find(|e| e.sequence == sequence) {
            entry.action = action.to_string();
        }
    }
}

fn entry_digest(entry: &AuditLogEntry) -> String {
    let content = format!(
        "{}:{}:{}:{}:{}:{}:{}:{}",
        entry.sequence,
        entry.tenant_id.map(|t| t.to_string()).unwrap_or_default(),
        entry.actor,
        entry.action,
        entry.resource_type,
        entry.resource_id,
        entry.created_at.to_rfc3339(),
        entry.previous_hash,
    );
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

use crate::domain::account::{AccountId, Amount, Balance};
use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// `prev_hash` of the first entry in every account's chain.
pub const CHAIN_ROOT: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub Uuid);

impl EntryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Credit,
    Debit,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::Credit => write!(f, "credit"),
            EntryType::Debit => write!(f, "debit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Confirmed,
    Reversed,
}

/// One immutable row of an account's ledger chain.
///
/// Entries are only ever created by `LedgerStore::append` and never updated
/// or deleted afterwards; corrections are new reversing entries. Each entry
/// hashes the previous entry's hash into its own, so any retroactive edit is
/// detectable by replaying the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account: AccountId,
    pub entry_type: EntryType,
    pub amount: Amount,
    /// Authoritative post-entry balance, fixed at write time.
    pub running_balance: Balance,
    pub idempotency_key: Option<String>,
    pub prev_hash: String,
    pub entry_hash: String,
    pub status: EntryStatus,
    /// Opaque link to the originating order / top-up / withdrawal.
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Recompute this entry's hash from its own fields and `prev_hash`.
    pub fn compute_hash(&self) -> String {
        compute_entry_hash(
            &self.prev_hash,
            &self.account,
            self.entry_type,
            self.amount,
            self.running_balance,
            self.created_at,
            self.reference.as_deref(),
        )
    }
}

/// Hash of one ledger entry: SHA-256 over the previous entry's hash plus
/// every balance-relevant field, hex-encoded.
pub fn compute_entry_hash(
    prev_hash: &str,
    account: &AccountId,
    entry_type: EntryType,
    amount: Amount,
    running_balance: Balance,
    created_at: DateTime<Utc>,
    reference: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(account.to_string().as_bytes());
    hasher.update(entry_type.to_string().as_bytes());
    hasher.update(amount.value().to_string().as_bytes());
    hasher.update(running_balance.value().to_string().as_bytes());
    hasher.update(created_at.to_rfc3339().as_bytes());
    hasher.update(reference.unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

/// What `LedgerStore::append` is asked to write.
#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub account: AccountId,
    pub entry_type: EntryType,
    pub amount: Amount,
    pub idempotency_key: Option<String>,
    pub reference: Option<String>,
}

/// Replay a full account chain and confirm every link.
///
/// Checks, per entry: `prev_hash` continuity back to [`CHAIN_ROOT`], the
/// recorded `entry_hash` against a recomputation, and running-balance
/// continuity (`balance[n] = balance[n-1] ± amount[n]`). Returns the first
/// violation found; a broken chain is reported, never repaired.
pub fn verify_chain(account: &AccountId, entries: &[LedgerEntry]) -> Result<()> {
    let mut prev_hash = CHAIN_ROOT.to_string();
    let mut prev_balance = Balance::ZERO;

    for entry in entries {
        let violation = |detail: String| CoreError::ChainIntegrityViolation {
            account: *account,
            entry: entry.id,
            detail,
        };

        if entry.account != *account {
            return Err(violation(format!(
                "entry belongs to {}, expected {}",
                entry.account, account
            )));
        }
        if entry.prev_hash != prev_hash {
            return Err(violation(format!(
                "prev_hash mismatch: recorded {}, expected {}",
                entry.prev_hash, prev_hash
            )));
        }
        let recomputed = entry.compute_hash();
        if entry.entry_hash != recomputed {
            return Err(violation(format!(
                "entry_hash mismatch: recorded {}, recomputed {}",
                entry.entry_hash, recomputed
            )));
        }
        let expected_balance = match entry.entry_type {
            EntryType::Credit => prev_balance + entry.amount.into(),
            EntryType::Debit => prev_balance - entry.amount.into(),
        };
        if entry.running_balance != expected_balance {
            return Err(violation(format!(
                "running_balance mismatch: recorded {}, expected {}",
                entry.running_balance, expected_balance
            )));
        }

        prev_hash = entry.entry_hash.clone();
        prev_balance = entry.running_balance;
    }

    Ok(())
}

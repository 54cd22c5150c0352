use crate::domain::account::{AccountId, Amount, Balance};
use crate::domain::ledger::{AppendRequest, EntryType, LedgerEntry};
use crate::domain::ports::LedgerStoreRef;
use crate::error::Result;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Translates business operations (pay for order, top up, withdraw, refund)
/// into ledger appends, and answers balance queries.
///
/// Every mutation derives its idempotency key deterministically from the
/// operation kind, the account, and the business reference, so a retried
/// call for the same order or request replays the original entry instead of
/// double-applying.
#[derive(Clone)]
pub struct WalletService {
    ledger: LedgerStoreRef,
}

/// Deterministic idempotency key: SHA-256 hex over the identifying tuple.
pub fn derive_idempotency_key(kind: &str, account: &AccountId, reference: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update(b":");
    hasher.update(account.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(reference.as_bytes());
    hex::encode(hasher.finalize())
}

impl WalletService {
    pub fn new(ledger: LedgerStoreRef) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &LedgerStoreRef {
        &self.ledger
    }

    async fn append(
        &self,
        kind: &str,
        account: AccountId,
        entry_type: EntryType,
        amount: Amount,
        reference: &str,
    ) -> Result<LedgerEntry> {
        let key = derive_idempotency_key(kind, &account, reference);
        let entry = self
            .ledger
            .append(AppendRequest {
                account,
                entry_type,
                amount,
                idempotency_key: Some(key),
                reference: Some(reference.to_string()),
            })
            .await?;
        debug!(
            account = %account,
            kind,
            amount = %amount,
            balance = %entry.running_balance,
            "ledger append"
        );
        Ok(entry)
    }

    /// Charge an account for an order. Retried calls for the same order
    /// never double-charge.
    pub async fn debit(
        &self,
        account: AccountId,
        amount: Amount,
        order_ref: &str,
    ) -> Result<LedgerEntry> {
        self.append("debit", account, EntryType::Debit, amount, order_ref)
            .await
    }

    pub async fn credit(
        &self,
        account: AccountId,
        amount: Amount,
        reference: &str,
    ) -> Result<LedgerEntry> {
        self.append("credit", account, EntryType::Credit, amount, reference)
            .await
    }

    /// Reversing credit for an order that was debited and then cancelled or
    /// failed to persist. The original debit entry is never touched.
    pub async fn refund(
        &self,
        account: AccountId,
        amount: Amount,
        order_ref: &str,
    ) -> Result<LedgerEntry> {
        self.append("refund", account, EntryType::Credit, amount, order_ref)
            .await
    }

    /// Credit outside the order flow, keyed by the caller's request id.
    pub async fn top_up(
        &self,
        account: AccountId,
        amount: Amount,
        request_id: &str,
    ) -> Result<LedgerEntry> {
        self.append("topup", account, EntryType::Credit, amount, request_id)
            .await
    }

    /// Debit outside the order flow, keyed by the caller's request id.
    pub async fn withdraw(
        &self,
        account: AccountId,
        amount: Amount,
        request_id: &str,
    ) -> Result<LedgerEntry> {
        self.append("withdrawal", account, EntryType::Debit, amount, request_id)
            .await
    }

    pub async fn get_balance(&self, account: &AccountId) -> Result<Balance> {
        self.ledger.balance_of(account).await
    }
}

use crate::domain::account::{Account, AccountId, AccountStatus, Balance};
use crate::domain::dispatch::{AgentPosition, GeoPoint};
use crate::domain::event::{Channel, PushEvent};
use crate::domain::ledger::{AppendRequest, LedgerEntry};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// The single source of truth for account balances.
///
/// Implementations must serialize appends per account (no two appends for
/// the same account may interleave), enforce idempotency-key replay (a
/// duplicate key returns the original entry unchanged), and never expose a
/// way to update or delete a written entry.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn open_account(&self, id: AccountId) -> Result<Account>;
    async fn account(&self, id: &AccountId) -> Result<Option<Account>>;
    async fn set_account_status(&self, id: &AccountId, status: AccountStatus) -> Result<()>;
    async fn accounts(&self) -> Result<Vec<Account>>;

    /// Append one entry to the account's chain, atomically: serialization,
    /// idempotency lookup, overdraft check, hash computation and write are
    /// one unit.
    async fn append(&self, request: AppendRequest) -> Result<LedgerEntry>;

    /// Running balance of the latest confirmed entry, or zero. Never
    /// recomputed from history on this path.
    async fn balance_of(&self, account: &AccountId) -> Result<Balance>;

    /// Full chain for an account, in append order.
    async fn entries_for(&self, account: &AccountId) -> Result<Vec<LedgerEntry>>;

    /// Audit replay of the account's chain; reports the first broken link.
    async fn verify_chain(&self, account: &AccountId) -> Result<()>;
}

/// Persistence for orders and their line items.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert an order, or return the already-stored row when the id exists
    /// (the persistence half of idempotent placement).
    async fn insert(&self, order: Order) -> Result<Order>;

    async fn get(&self, id: &OrderId) -> Result<Option<Order>>;

    /// Compare-and-swap on the assignment field: succeeds only if
    /// `assigned_agent` is still unset. Exactly one concurrent caller wins.
    async fn assign_agent(&self, id: &OrderId, agent: u64) -> Result<bool>;

    /// Apply a state-machine transition under the row lock.
    async fn transition(&self, id: &OrderId, next: OrderStatus) -> Result<Order>;

    async fn orders(&self) -> Result<Vec<Order>>;
}

/// Merchant availability and store locations, maintained by the excluded
/// merchant-facing surface.
#[async_trait]
pub trait MerchantDirectory: Send + Sync {
    async fn is_accepting_orders(&self, merchant: u64) -> Result<bool>;
    async fn location(&self, merchant: u64) -> Result<Option<GeoPoint>>;
}

/// Online agents and their last reported positions.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn set_online(&self, agent: u64, position: GeoPoint) -> Result<()>;
    async fn set_offline(&self, agent: u64) -> Result<()>;
    async fn online_agents(&self) -> Result<Vec<AgentPosition>>;
}

/// Outbound real-time push. Delivery is best-effort; the transport is an
/// external collaborator.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn push(&self, channel: Channel, event: PushEvent) -> Result<()>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type MerchantDirectoryRef = Arc<dyn MerchantDirectory>;
pub type AgentDirectoryRef = Arc<dyn AgentDirectory>;
pub type NotifierRef = Arc<dyn Notifier>;

use crate::domain::account::{Account, AccountId, AccountStatus, Balance};
use crate::domain::dispatch::{AgentPosition, GeoPoint};
use crate::domain::event::{Channel, PushEvent};
use crate::domain::ledger::{
    self, AppendRequest, CHAIN_ROOT, EntryId, EntryStatus, EntryType, LedgerEntry,
    compute_entry_hash,
};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::ports::{
    AgentDirectory, LedgerStore, MerchantDirectory, Notifier, OrderStore,
};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// In-memory ledger.
///
/// Each account's chain sits behind its own `tokio::sync::Mutex`, which is
/// the per-account serialization guarantee: appends to one account queue up,
/// appends to different accounts run in parallel. The idempotency index is
/// global (keys are unique across the whole ledger). Written entries have no
/// mutation surface at all.
#[derive(Default)]
pub struct InMemoryLedger {
    accounts: DashMap<AccountId, Account>,
    chains: DashMap<AccountId, Arc<Mutex<Vec<LedgerEntry>>>>,
    idempotency: DashMap<String, LedgerEntry>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn chain_of(&self, account: &AccountId) -> Arc<Mutex<Vec<LedgerEntry>>> {
        self.chains
            .entry(*account)
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn open_account(&self, id: AccountId) -> Result<Account> {
        match self.accounts.entry(id) {
            Entry::Occupied(_) => Err(CoreError::AccountExists(id)),
            Entry::Vacant(slot) => {
                let account = Account::open(id);
                slot.insert(account.clone());
                Ok(account)
            }
        }
    }

    async fn account(&self, id: &AccountId) -> Result<Option<Account>> {
        Ok(self.accounts.get(id).map(|a| a.value().clone()))
    }

    async fn set_account_status(&self, id: &AccountId, status: AccountStatus) -> Result<()> {
        let mut account = self
            .accounts
            .get_mut(id)
            .ok_or(CoreError::AccountNotFound(*id))?;
        account.status = status;
        Ok(())
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self.accounts.iter().map(|a| a.value().clone()).collect())
    }

    async fn append(&self, request: AppendRequest) -> Result<LedgerEntry> {
        let account = self
            .accounts
            .get(&request.account)
            .map(|a| a.value().clone())
            .ok_or(CoreError::AccountNotFound(request.account))?;
        match account.status {
            AccountStatus::Closed => return Err(CoreError::AccountClosed(account.id)),
            AccountStatus::Frozen if request.entry_type == EntryType::Debit => {
                return Err(CoreError::AccountFrozen(account.id));
            }
            _ => {}
        }

        let chain = self.chain_of(&request.account);
        let mut entries = chain.lock().await;

        // Replayed request: hand back the original entry, touch nothing.
        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self.idempotency.get(key) {
                debug!(account = %request.account, "idempotency key replay");
                return Ok(existing.value().clone());
            }
        }

        let (prev_hash, prev_balance) = match entries.last() {
            Some(last) => (last.entry_hash.clone(), last.running_balance),
            None => (CHAIN_ROOT.to_string(), Balance::ZERO),
        };
        let running_balance = match request.entry_type {
            EntryType::Credit => prev_balance + request.amount.into(),
            EntryType::Debit => {
                let next = prev_balance - request.amount.into();
                if next < Balance::ZERO {
                    return Err(CoreError::InsufficientFunds {
                        account: request.account,
                        requested: request.amount.value(),
                        available: prev_balance.value(),
                    });
                }
                next
            }
        };

        let created_at = Utc::now();
        let entry_hash = compute_entry_hash(
            &prev_hash,
            &request.account,
            request.entry_type,
            request.amount,
            running_balance,
            created_at,
            request.reference.as_deref(),
        );
        let entry = LedgerEntry {
            id: EntryId::generate(),
            account: request.account,
            entry_type: request.entry_type,
            amount: request.amount,
            running_balance,
            idempotency_key: request.idempotency_key.clone(),
            prev_hash,
            entry_hash,
            status: EntryStatus::Confirmed,
            reference: request.reference,
            created_at,
        };

        if let Some(key) = &request.idempotency_key {
            // Key uniqueness is global: a concurrent append on another
            // account's chain may have claimed it since the lookup above.
            match self.idempotency.entry(key.clone()) {
                Entry::Occupied(existing) => return Ok(existing.get().clone()),
                Entry::Vacant(slot) => {
                    slot.insert(entry.clone());
                }
            }
        }
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn balance_of(&self, account: &AccountId) -> Result<Balance> {
        let chain = self.chain_of(account);
        let entries = chain.lock().await;
        Ok(entries
            .iter()
            .rev()
            .find(|e| e.status == EntryStatus::Confirmed)
            .map(|e| e.running_balance)
            .unwrap_or(Balance::ZERO))
    }

    async fn entries_for(&self, account: &AccountId) -> Result<Vec<LedgerEntry>> {
        let chain = self.chain_of(account);
        let entries = chain.lock().await;
        Ok(entries.clone())
    }

    async fn verify_chain(&self, account: &AccountId) -> Result<()> {
        let entries = self.entries_for(account).await?;
        ledger::verify_chain(account, &entries).inspect_err(|err| {
            error!(account = %account, %err, "ledger chain verification failed");
        })
    }
}

/// In-memory order rows. Assignment and status changes mutate the row under
/// its shard lock, which makes `assign_agent` a true compare-and-swap.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<OrderId, Order>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<Order> {
        match self.orders.entry(order.id) {
            Entry::Occupied(existing) => Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                Ok(order)
            }
        }
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.orders.get(id).map(|o| o.value().clone()))
    }

    async fn assign_agent(&self, id: &OrderId, agent: u64) -> Result<bool> {
        let mut order = self
            .orders
            .get_mut(id)
            .ok_or(CoreError::OrderNotFound(*id))?;
        if order.assigned_agent.is_some() {
            return Ok(false);
        }
        order.assigned_agent = Some(agent);
        Ok(true)
    }

    async fn transition(&self, id: &OrderId, next: OrderStatus) -> Result<Order> {
        let mut order = self
            .orders
            .get_mut(id)
            .ok_or(CoreError::OrderNotFound(*id))?;
        if !order.status.can_transition(next) {
            return Err(CoreError::InvalidOrderTransition {
                from: order.status,
                to: next,
            });
        }
        order.status = next;
        Ok(order.value().clone())
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        Ok(self.orders.iter().map(|o| o.value().clone()).collect())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MerchantProfile {
    pub accepting_orders: bool,
    pub location: GeoPoint,
}

/// Merchant availability/locations and online agent positions. In
/// production these are fed by the excluded merchant and courier surfaces;
/// here they are plain concurrent maps.
#[derive(Default)]
pub struct InMemoryDirectory {
    merchants: DashMap<u64, MerchantProfile>,
    agents: DashMap<u64, GeoPoint>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_merchant(&self, merchant: u64, profile: MerchantProfile) {
        self.merchants.insert(merchant, profile);
    }
}

#[async_trait]
impl MerchantDirectory for InMemoryDirectory {
    async fn is_accepting_orders(&self, merchant: u64) -> Result<bool> {
        Ok(self
            .merchants
            .get(&merchant)
            .map(|p| p.accepting_orders)
            .unwrap_or(false))
    }

    async fn location(&self, merchant: u64) -> Result<Option<GeoPoint>> {
        Ok(self.merchants.get(&merchant).map(|p| p.location))
    }
}

#[async_trait]
impl AgentDirectory for InMemoryDirectory {
    async fn set_online(&self, agent: u64, position: GeoPoint) -> Result<()> {
        self.agents.insert(agent, position);
        Ok(())
    }

    async fn set_offline(&self, agent: u64) -> Result<()> {
        self.agents.remove(&agent);
        Ok(())
    }

    async fn online_agents(&self) -> Result<Vec<AgentPosition>> {
        Ok(self
            .agents
            .iter()
            .map(|entry| AgentPosition {
                agent: *entry.key(),
                position: *entry.value(),
            })
            .collect())
    }
}

/// Channel-based notifier: per-channel subscriptions for interested peers
/// plus an optional firehose tap (the CLI prints every event from it).
/// Events pushed to a channel nobody subscribed to are dropped.
#[derive(Default)]
pub struct ChannelNotifier {
    channels: DashMap<Channel, mpsc::UnboundedSender<PushEvent>>,
    tap: StdMutex<Option<mpsc::UnboundedSender<(Channel, PushEvent)>>>,
}

impl ChannelNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, channel: Channel) -> mpsc::UnboundedReceiver<PushEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.insert(channel, tx);
        rx
    }

    pub fn tap(&self) -> mpsc::UnboundedReceiver<(Channel, PushEvent)> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tap.lock().expect("tap lock poisoned") = Some(tx);
        rx
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn push(&self, channel: Channel, event: PushEvent) -> Result<()> {
        if let Some(tap) = self.tap.lock().expect("tap lock poisoned").as_ref() {
            let _ = tap.send((channel, event.clone()));
        }
        match self.channels.get(&channel) {
            Some(tx) => {
                if tx.send(event).is_err() {
                    // Subscriber went away; forget the channel.
                    drop(tx);
                    self.channels.remove(&channel);
                }
            }
            None => debug!(%channel, "push event dropped, no subscriber"),
        }
        Ok(())
    }
}

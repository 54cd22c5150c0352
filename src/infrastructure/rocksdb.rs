use crate::domain::account::{Account, AccountId, AccountStatus, Balance};
use crate::domain::ledger::{
    self, AppendRequest, CHAIN_ROOT, EntryId, EntryStatus, EntryType, LedgerEntry,
    compute_entry_hash,
};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::ports::{LedgerStore, OrderStore};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::error;

/// Column Family for account rows.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for ledger entries, keyed `{account}/{seq:020}` so each
/// account's chain is contiguous and ordered.
pub const CF_LEDGER: &str = "ledger";
/// Column Family mapping idempotency keys to their original entries.
pub const CF_IDEMPOTENCY: &str = "idempotency";
/// Column Family for order rows.
pub const CF_ORDERS: &str = "orders";

/// Persistent store implementation over RocksDB.
///
/// The ledger column family is insert-only: writing a key that already
/// holds a value is refused outright, which is the strongest append-only
/// guarantee a KV store offers. Per-account (and per-order) serialization
/// is done with in-process lock maps; `Clone` shares the underlying
/// `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    account_locks: Arc<DashMap<AccountId, Arc<Mutex<()>>>>,
    order_locks: Arc<DashMap<OrderId, Arc<Mutex<()>>>>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the given path, ensuring all
    /// column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_LEDGER, Options::default()),
            ColumnFamilyDescriptor::new(CF_IDEMPOTENCY, Options::default()),
            ColumnFamilyDescriptor::new(CF_ORDERS, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&opts, path, cfs)
            .map_err(|e| CoreError::Storage(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            account_locks: Arc::new(DashMap::new()),
            order_locks: Arc::new(DashMap::new()),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| CoreError::Storage(format!("column family {name} not found")))
    }

    fn account_lock(&self, account: &AccountId) -> Arc<Mutex<()>> {
        self.account_locks
            .entry(*account)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn order_lock(&self, order: &OrderId) -> Arc<Mutex<()>> {
        self.order_locks
            .entry(*order)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn entry_key(account: &AccountId, seq: u64) -> Vec<u8> {
        format!("{account}/{seq:020}").into_bytes()
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        let handle = self.cf(cf)?;
        match self
            .db
            .get_cf(handle, key)
            .map_err(|e| CoreError::Storage(e.to_string()))?
        {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: serde::Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let handle = self.cf(cf)?;
        self.db
            .put_cf(handle, key, serde_json::to_vec(value)?)
            .map_err(|e| CoreError::Storage(e.to_string()))
    }

    /// Last entry of an account's chain, with its sequence number.
    fn chain_head(&self, account: &AccountId) -> Result<Option<(u64, LedgerEntry)>> {
        let handle = self.cf(CF_LEDGER)?;
        let prefix = format!("{account}/");
        // ':' sorts right after '9', so this seeks past the final entry.
        let upper = format!("{account}/:");
        let iter = self
            .db
            .iterator_cf(handle, IteratorMode::From(upper.as_bytes(), Direction::Reverse));
        for item in iter {
            let (key, value) = item.map_err(|e| CoreError::Storage(e.to_string()))?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let seq_str = std::str::from_utf8(&key[prefix.len()..])
                .map_err(|e| CoreError::Storage(e.to_string()))?;
            let seq: u64 = seq_str
                .parse()
                .map_err(|_| CoreError::Storage(format!("malformed ledger key for {account}")))?;
            return Ok(Some((seq, serde_json::from_slice(&value)?)));
        }
        Ok(None)
    }

    fn chain_entries(&self, account: &AccountId) -> Result<Vec<LedgerEntry>> {
        let handle = self.cf(CF_LEDGER)?;
        let prefix = format!("{account}/");
        let iter = self
            .db
            .iterator_cf(handle, IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| CoreError::Storage(e.to_string()))?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            entries.push(serde_json::from_slice(&value)?);
        }
        Ok(entries)
    }
}

#[async_trait]
impl LedgerStore for RocksDbStore {
    async fn open_account(&self, id: AccountId) -> Result<Account> {
        let lock = self.account_lock(&id);
        let _guard = lock.lock().await;
        let key = id.to_string().into_bytes();
        if self.get_json::<Account>(CF_ACCOUNTS, &key)?.is_some() {
            return Err(CoreError::AccountExists(id));
        }
        let account = Account::open(id);
        self.put_json(CF_ACCOUNTS, &key, &account)?;
        Ok(account)
    }

    async fn account(&self, id: &AccountId) -> Result<Option<Account>> {
        self.get_json(CF_ACCOUNTS, id.to_string().as_bytes())
    }

    async fn set_account_status(&self, id: &AccountId, status: AccountStatus) -> Result<()> {
        let lock = self.account_lock(id);
        let _guard = lock.lock().await;
        let key = id.to_string().into_bytes();
        let mut account: Account = self
            .get_json(CF_ACCOUNTS, &key)?
            .ok_or(CoreError::AccountNotFound(*id))?;
        account.status = status;
        self.put_json(CF_ACCOUNTS, &key, &account)
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        let handle = self.cf(CF_ACCOUNTS)?;
        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(handle, IteratorMode::Start) {
            let (_key, value) = item.map_err(|e| CoreError::Storage(e.to_string()))?;
            accounts.push(serde_json::from_slice(&value)?);
        }
        Ok(accounts)
    }

    async fn append(&self, request: AppendRequest) -> Result<LedgerEntry> {
        let lock = self.account_lock(&request.account);
        let _guard = lock.lock().await;

        let account: Account = self
            .get_json(CF_ACCOUNTS, request.account.to_string().as_bytes())?
            .ok_or(CoreError::AccountNotFound(request.account))?;
        match account.status {
            AccountStatus::Closed => return Err(CoreError::AccountClosed(account.id)),
            AccountStatus::Frozen if request.entry_type == EntryType::Debit => {
                return Err(CoreError::AccountFrozen(account.id));
            }
            _ => {}
        }

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) =
                self.get_json::<LedgerEntry>(CF_IDEMPOTENCY, key.as_bytes())?
            {
                return Ok(existing);
            }
        }

        let head = self.chain_head(&request.account)?;
        let (seq, prev_hash, prev_balance) = match &head {
            Some((seq, last)) => (seq + 1, last.entry_hash.clone(), last.running_balance),
            None => (0, CHAIN_ROOT.to_string(), Balance::ZERO),
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

        // Insert-only: an occupied slot is never overwritten, whatever put
        // the value there.
        let entry_key = Self::entry_key(&request.account, seq);
        let ledger_cf = self.cf(CF_LEDGER)?;
        if self
            .db
            .get_pinned_cf(ledger_cf, &entry_key)
            .map_err(|e| CoreError::Storage(e.to_string()))?
            .is_some()
        {
            return Err(CoreError::Storage(format!(
                "ledger slot {seq} for {} already written, refusing to overwrite",
                request.account
            )));
        }

        // The entry and its idempotency record land in one atomic batch.
        let mut batch = WriteBatch::default();
        batch.put_cf(ledger_cf, &entry_key, serde_json::to_vec(&entry)?);
        if let Some(key) = &request.idempotency_key {
            batch.put_cf(self.cf(CF_IDEMPOTENCY)?, key.as_bytes(), serde_json::to_vec(&entry)?);
        }
        self.db
            .write(batch)
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(entry)
    }

    async fn balance_of(&self, account: &AccountId) -> Result<Balance> {
        let handle = self.cf(CF_LEDGER)?;
        let prefix = format!("{account}/");
        let upper = format!("{account}/:");
        let iter = self
            .db
            .iterator_cf(handle, IteratorMode::From(upper.as_bytes(), Direction::Reverse));
        for item in iter {
            let (key, value) = item.map_err(|e| CoreError::Storage(e.to_string()))?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let entry: LedgerEntry = serde_json::from_slice(&value)?;
            if entry.status == EntryStatus::Confirmed {
                return Ok(entry.running_balance);
            }
        }
        Ok(Balance::ZERO)
    }

    async fn entries_for(&self, account: &AccountId) -> Result<Vec<LedgerEntry>> {
        self.chain_entries(account)
    }

    async fn verify_chain(&self, account: &AccountId) -> Result<()> {
        let entries = self.chain_entries(account)?;
        ledger::verify_chain(account, &entries).inspect_err(|err| {
            error!(account = %account, %err, "ledger chain verification failed");
        })
    }
}

#[async_trait]
impl OrderStore for RocksDbStore {
    async fn insert(&self, order: Order) -> Result<Order> {
        let lock = self.order_lock(&order.id);
        let _guard = lock.lock().await;
        let key = order.id.to_string().into_bytes();
        if let Some(existing) = self.get_json::<Order>(CF_ORDERS, &key)? {
            return Ok(existing);
        }
        self.put_json(CF_ORDERS, &key, &order)?;
        Ok(order)
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Order>> {
        self.get_json(CF_ORDERS, id.to_string().as_bytes())
    }

    async fn assign_agent(&self, id: &OrderId, agent: u64) -> Result<bool> {
        let lock = self.order_lock(id);
        let _guard = lock.lock().await;
        let key = id.to_string().into_bytes();
        let mut order: Order = self
            .get_json(CF_ORDERS, &key)?
            .ok_or(CoreError::OrderNotFound(*id))?;
        if order.assigned_agent.is_some() {
            return Ok(false);
        }
        order.assigned_agent = Some(agent);
        self.put_json(CF_ORDERS, &key, &order)?;
        Ok(true)
    }

    async fn transition(&self, id: &OrderId, next: OrderStatus) -> Result<Order> {
        let lock = self.order_lock(id);
        let _guard = lock.lock().await;
        let key = id.to_string().into_bytes();
        let mut order: Order = self
            .get_json(CF_ORDERS, &key)?
            .ok_or(CoreError::OrderNotFound(*id))?;
        if !order.status.can_transition(next) {
            return Err(CoreError::InvalidOrderTransition {
                from: order.status,
                to: next,
            });
        }
        order.status = next;
        self.put_json(CF_ORDERS, &key, &order)?;
        Ok(order)
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        let handle = self.cf(CF_ORDERS)?;
        let mut orders = Vec::new();
        for item in self.db.iterator_cf(handle, IteratorMode::Start) {
            let (_key, value) = item.map_err(|e| CoreError::Storage(e.to_string()))?;
            orders.push(serde_json::from_slice(&value)?);
        }
        Ok(orders)
    }
}

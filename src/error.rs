use crate::domain::account::AccountId;
use crate::domain::ledger::EntryId;
use crate::domain::order::{OrderId, OrderStatus};
use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Crate-wide error taxonomy.
///
/// Funds and availability declines (`InsufficientFunds`,
/// `MerchantUnavailable`, frozen/closed accounts) are decided before any
/// persistent financial effect and surfaced to the caller verbatim.
/// `OfferAlreadyClaimed` is the expected outcome for losing acceptors, not
/// a system fault. `ChainIntegrityViolation` is fatal and never repaired.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("insufficient funds: {account} holds {available}, debit of {requested} refused")]
    InsufficientFunds {
        account: AccountId,
        requested: Decimal,
        available: Decimal,
    },

    #[error("account {0} is frozen")]
    AccountFrozen(AccountId),

    #[error("account {0} is closed")]
    AccountClosed(AccountId),

    #[error("account {0} does not exist")]
    AccountNotFound(AccountId),

    #[error("account {0} already exists")]
    AccountExists(AccountId),

    #[error("merchant {0} is not accepting orders")]
    MerchantUnavailable(u64),

    #[error("order {0} does not exist")]
    OrderNotFound(OrderId),

    #[error("order {order} was already taken by another agent")]
    OfferAlreadyClaimed { order: OrderId },

    #[error("no active offer for order {order}: acceptance window elapsed")]
    DispatchTimeout { order: OrderId },

    #[error("ledger chain broken for {account} at entry {entry}: {detail}")]
    ChainIntegrityViolation {
        account: AccountId,
        entry: EntryId,
        detail: String,
    },

    #[error("illegal order transition {from:?} -> {to:?}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

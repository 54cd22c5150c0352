use crate::domain::account::Amount;
use crate::domain::dispatch::GeoPoint;
use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derive a stable order id from a client-supplied idempotency token.
    ///
    /// A retried placement carrying the same token reproduces the same id,
    /// which in turn reproduces the same ledger debit key, so the whole
    /// placement collapses to a no-op replay instead of a second order.
    pub fn from_client_token(token: &str) -> Self {
        let digest = Sha256::digest(token.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self(Uuid::from_bytes(bytes))
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CashOnDelivery,
    Wallet,
    Points,
}

impl PaymentMethod {
    /// Wallet and points orders are financed through the ledger; cash never
    /// touches it.
    pub fn is_ledger_backed(&self) -> bool {
        matches!(self, PaymentMethod::Wallet | PaymentMethod::Points)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Accepted,
    Preparing,
    Purchasing,
    Delivering,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Legal forward transitions. `Preparing` is the marketplace branch,
    /// `Purchasing` the delegated-purchase branch; `Cancelled` is reachable
    /// from any non-terminal state and nothing else skips a state.
    pub fn can_transition(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        if next == Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Accepted, Preparing)
                | (Accepted, Purchasing)
                | (Preparing, Delivering)
                | (Purchasing, Delivering)
                | (Delivering, Completed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub unit_price: Amount,
    pub quantity: u32,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price.value() * Decimal::from(self.quantity)
    }
}

/// The two shapes an order can take, each with its own well-typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderKind {
    /// Itemized order against a merchant's catalog.
    Marketplace { items: Vec<OrderItem> },
    /// "Buy on my behalf" order against a fixed-price estimate.
    DelegatedPurchase { instructions: String, estimate: Amount },
}

impl OrderKind {
    /// Total the order will be charged at: the sum of line totals, or the
    /// fixed estimate for delegated purchases.
    pub fn total(&self) -> Result<Amount> {
        match self {
            OrderKind::Marketplace { items } => {
                if items.is_empty() {
                    return Err(CoreError::Validation("order has no line items".into()));
                }
                let sum: Decimal = items.iter().map(OrderItem::line_total).sum();
                Amount::new(sum)
            }
            OrderKind::DelegatedPurchase { estimate, .. } => Ok(*estimate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub label: String,
    pub location: GeoPoint,
}

/// One placed transaction. Mutated only through the defined state
/// transitions; terminal states are immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer: u64,
    pub merchant: u64,
    pub kind: OrderKind,
    pub payment_method: PaymentMethod,
    pub total: Amount,
    pub status: OrderStatus,
    pub assigned_agent: Option<u64>,
    pub address: DeliveryAddress,
    pub created_at: DateTime<Utc>,
}

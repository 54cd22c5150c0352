use crate::domain::account::{AccountStatus, HolderType};
use crate::domain::order::{OrderStatus, PaymentMethod};
use crate::error::{CoreError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};

#[derive(Debug, Clone, Deserialize)]
pub struct ItemSpec {
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

/// One line of the driver's command stream.
///
/// Orders are addressed by their client token (`order_token`), which maps
/// deterministically to the order id. This is the same mechanism that makes
/// client retries idempotent.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    OpenAccount {
        holder: HolderType,
        id: u64,
    },
    SetAccountStatus {
        holder: HolderType,
        id: u64,
        status: AccountStatus,
    },
    SetMerchant {
        merchant: u64,
        lat: f64,
        lng: f64,
        accepting_orders: bool,
    },
    AgentOnline {
        agent: u64,
        lat: f64,
        lng: f64,
    },
    AgentOffline {
        agent: u64,
    },
    Topup {
        holder: HolderType,
        id: u64,
        amount: Decimal,
        request_id: String,
    },
    Withdraw {
        holder: HolderType,
        id: u64,
        amount: Decimal,
        request_id: String,
    },
    PlaceOrder {
        customer: u64,
        merchant: u64,
        payment_method: PaymentMethod,
        items: Vec<ItemSpec>,
        address: String,
        lat: f64,
        lng: f64,
        order_token: String,
    },
    DelegatedOrder {
        customer: u64,
        merchant: u64,
        payment_method: PaymentMethod,
        instructions: String,
        estimate: Decimal,
        address: String,
        lat: f64,
        lng: f64,
        order_token: String,
    },
    Dispatch {
        order_token: String,
    },
    Redispatch {
        order_token: String,
    },
    Accept {
        order_token: String,
        agent: u64,
    },
    AdvanceOrder {
        order_token: String,
        status: OrderStatus,
    },
    CancelOrder {
        order_token: String,
    },
    VerifyChain {
        holder: HolderType,
        id: u64,
    },
}

/// Reads commands from a JSON-lines source.
///
/// Wraps any `Read` in a buffered line reader and yields one
/// `Result<Command>` per non-empty line, so a malformed line surfaces as an
/// error without aborting the stream.
pub struct CommandReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    /// Lazily read and deserialize the command stream.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader.lines().filter_map(|line| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(serde_json::from_str(&line).map_err(CoreError::from)),
            Err(err) => Some(Err(CoreError::from(err))),
        })
    }
}

use crate::domain::order::{OrderId, OrderStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Destination of a push event. The transport behind a channel (websocket,
/// socket.io room, …) is an external collaborator; the core only addresses
/// parties by role and id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "lowercase")]
pub enum Channel {
    Customer(u64),
    Merchant(u64),
    Agent(u64),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Customer(id) => write!(f, "customer:{id}"),
            Channel::Merchant(id) => write!(f, "merchant:{id}"),
            Channel::Agent(id) => write!(f, "agent:{id}"),
        }
    }
}

/// Real-time events emitted by the order and dispatch pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PushEvent {
    /// A new order landed at the merchant.
    OrderPlaced { order: OrderId, customer: u64 },
    /// An offer reached a candidate agent, with their distance to origin.
    OfferBroadcast { order: OrderId, distance_km: f64 },
    /// The accepting agent won the order.
    OfferWon { order: OrderId },
    /// A candidate lost the race (or the offer concluded without them).
    OfferRejected { order: OrderId },
    /// The customer's order was assigned to an agent.
    OrderAssigned { order: OrderId, agent: u64 },
    OrderStatusChanged { order: OrderId, status: OrderStatus },
    OrderCancelled { order: OrderId },
}

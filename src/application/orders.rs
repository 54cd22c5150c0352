use crate::application::wallet::WalletService;
use crate::domain::account::{AccountId, Amount};
use crate::domain::event::{Channel, PushEvent};
use crate::domain::order::{
    DeliveryAddress, Order, OrderId, OrderKind, OrderStatus, PaymentMethod,
};
use crate::domain::ports::{MerchantDirectoryRef, NotifierRef, OrderStoreRef};
use crate::error::{CoreError, Result};
use chrono::Utc;
use tracing::{info, warn};

/// A placement request as it arrives from the (excluded) transport layer.
///
/// `idempotency_token` is the client's retry handle: the same token maps to
/// the same order identity, so a placement retried after a timeout collapses
/// to the original order and the original debit.
#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub merchant: u64,
    pub kind: OrderKind,
    pub payment_method: PaymentMethod,
    pub address: DeliveryAddress,
    pub idempotency_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DelegatedPurchaseRequest {
    pub merchant: u64,
    pub instructions: String,
    pub estimate: Amount,
    pub payment_method: PaymentMethod,
    pub address: DeliveryAddress,
    pub idempotency_token: Option<String>,
}

/// Validates, finances, and persists orders, and walks them through their
/// state machine.
#[derive(Clone)]
pub struct OrderService {
    wallet: WalletService,
    orders: OrderStoreRef,
    merchants: MerchantDirectoryRef,
    notifier: NotifierRef,
}

impl OrderService {
    pub fn new(
        wallet: WalletService,
        orders: OrderStoreRef,
        merchants: MerchantDirectoryRef,
        notifier: NotifierRef,
    ) -> Self {
        Self {
            wallet,
            orders,
            merchants,
            notifier,
        }
    }

    /// Place an order: availability check, funds reservation, persistence,
    /// merchant notification.
    ///
    /// The debit and the order row form one all-or-nothing unit. The order
    /// identity is reserved before the debit so both sides key off it; a
    /// persistence failure after a successful debit is compensated with a
    /// reversing refund entry rather than left dangling.
    pub async fn place_order(&self, customer: u64, request: PlaceOrderRequest) -> Result<Order> {
        if !self.merchants.is_accepting_orders(request.merchant).await? {
            return Err(CoreError::MerchantUnavailable(request.merchant));
        }
        let total = request.kind.total()?;

        let order_id = match &request.idempotency_token {
            Some(token) => OrderId::from_client_token(token),
            None => OrderId::generate(),
        };
        // Replay of a retried placement: the row already exists, and so does
        // its debit. Nothing left to do.
        if let Some(existing) = self.orders.get(&order_id).await? {
            info!(order = %order_id, "placement replayed, returning existing order");
            return Ok(existing);
        }

        let order = Order {
            id: order_id,
            customer,
            merchant: request.merchant,
            kind: request.kind,
            payment_method: request.payment_method,
            total,
            status: OrderStatus::Pending,
            assigned_agent: None,
            address: request.address,
            created_at: Utc::now(),
        };

        let customer_account = AccountId::customer(customer);
        if order.payment_method.is_ledger_backed() {
            // InsufficientFunds / frozen / closed surface here, before any
            // order row exists.
            self.wallet
                .debit(customer_account, total, &order_id.to_string())
                .await?;
        }

        let stored = match self.orders.insert(order).await {
            Ok(stored) => stored,
            Err(err) => {
                if request.payment_method.is_ledger_backed() {
                    warn!(order = %order_id, error = %err, "order persistence failed, reversing debit");
                    self.wallet
                        .refund(customer_account, total, &order_id.to_string())
                        .await?;
                }
                return Err(err);
            }
        };

        self.notifier
            .push(
                Channel::Merchant(stored.merchant),
                PushEvent::OrderPlaced {
                    order: stored.id,
                    customer,
                },
            )
            .await?;
        info!(order = %stored.id, merchant = stored.merchant, total = %total, "order placed");
        Ok(stored)
    }

    /// "Buy on my behalf" variant against a fixed-price estimate; same
    /// transactional and idempotency discipline as `place_order`.
    pub async fn create_delegated_purchase_order(
        &self,
        customer: u64,
        request: DelegatedPurchaseRequest,
    ) -> Result<Order> {
        self.place_order(
            customer,
            PlaceOrderRequest {
                merchant: request.merchant,
                kind: OrderKind::DelegatedPurchase {
                    instructions: request.instructions,
                    estimate: request.estimate,
                },
                payment_method: request.payment_method,
                address: request.address,
                idempotency_token: request.idempotency_token,
            },
        )
        .await
    }

    /// Cancel a non-terminal order. A ledger-backed order that was debited
    /// gets a reversing refund entry; the original debit is never edited.
    pub async fn cancel_order(&self, order_id: &OrderId) -> Result<Order> {
        let order = self.orders.transition(order_id, OrderStatus::Cancelled).await?;

        if order.payment_method.is_ledger_backed() {
            self.wallet
                .refund(
                    AccountId::customer(order.customer),
                    order.total,
                    &order.id.to_string(),
                )
                .await?;
        }

        for channel in [
            Channel::Customer(order.customer),
            Channel::Merchant(order.merchant),
        ] {
            self.notifier
                .push(channel, PushEvent::OrderCancelled { order: order.id })
                .await?;
        }
        info!(order = %order.id, "order cancelled");
        Ok(order)
    }

    /// Move an order one step forward through its lifecycle.
    pub async fn advance_order(&self, order_id: &OrderId, next: OrderStatus) -> Result<Order> {
        let order = self.orders.transition(order_id, next).await?;
        self.notifier
            .push(
                Channel::Customer(order.customer),
                PushEvent::OrderStatusChanged {
                    order: order.id,
                    status: order.status,
                },
            )
            .await?;
        Ok(order)
    }

    pub async fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>> {
        self.orders.get(order_id).await
    }
}

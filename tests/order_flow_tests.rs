mod common;

use async_trait::async_trait;
use common::{amount, fund_customer, harness, open_merchant, order_request};
use fleetpay::application::orders::{DelegatedPurchaseRequest, OrderService};
use fleetpay::domain::account::{AccountId, Balance};
use fleetpay::domain::dispatch::GeoPoint;
use fleetpay::domain::ledger::EntryType;
use fleetpay::domain::order::{
    DeliveryAddress, Order, OrderId, OrderStatus, PaymentMethod,
};
use fleetpay::domain::ports::{LedgerStore, OrderStore};
use fleetpay::error::{CoreError, Result};
use fleetpay::infrastructure::in_memory::MerchantProfile;
use rust_decimal_macros::dec;
use std::sync::Arc;

const MERCHANT: u64 = 10;

fn store_location() -> GeoPoint {
    GeoPoint::new(40.4168, -3.7038)
}

#[tokio::test]
async fn test_wallet_order_debits_and_stays_pending() {
    // Scenario: customer with 1000.00 places a 200.00 wallet order.
    let h = harness();
    fund_customer(&h, 1, "1000.00").await;
    open_merchant(&h, MERCHANT, store_location());

    let order = h
        .orders
        .place_order(1, order_request(MERCHANT, "200.00", PaymentMethod::Wallet, "tok-a"))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.assigned_agent, None);
    let account = AccountId::customer(1);
    assert_eq!(
        h.wallet.get_balance(&account).await.unwrap(),
        Balance::new(dec!(800.00))
    );

    let debits: Vec<_> = h
        .ledger
        .entries_for(&account)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.entry_type == EntryType::Debit)
        .collect();
    assert_eq!(debits.len(), 1);
    assert_eq!(debits[0].reference.as_deref(), Some(order.id.to_string().as_str()));
}

#[tokio::test]
async fn test_insufficient_funds_leaves_no_partial_state() {
    // Scenario: customer with 50.00 attempts a 200.00 wallet order.
    let h = harness();
    fund_customer(&h, 1, "50.00").await;
    open_merchant(&h, MERCHANT, store_location());

    let result = h
        .orders
        .place_order(1, order_request(MERCHANT, "200.00", PaymentMethod::Wallet, "tok-b"))
        .await;

    assert!(matches!(result, Err(CoreError::InsufficientFunds { .. })));
    assert!(h.order_store.orders().await.unwrap().is_empty());
    let account = AccountId::customer(1);
    assert_eq!(
        h.wallet.get_balance(&account).await.unwrap(),
        Balance::new(dec!(50.00))
    );
    // Only the seed top-up exists.
    assert_eq!(h.ledger.entries_for(&account).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_retried_placement_is_one_order_one_debit() {
    // Scenario: the client times out and replays the exact same placement.
    let h = harness();
    fund_customer(&h, 1, "1000.00").await;
    open_merchant(&h, MERCHANT, store_location());

    let request = order_request(MERCHANT, "200.00", PaymentMethod::Wallet, "tok-retry");
    let first = h.orders.place_order(1, request.clone()).await.unwrap();
    let second = h.orders.place_order(1, request).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(h.order_store.orders().await.unwrap().len(), 1);
    assert_eq!(
        h.wallet
            .get_balance(&AccountId::customer(1))
            .await
            .unwrap(),
        Balance::new(dec!(800.00))
    );
}

#[tokio::test]
async fn test_merchant_unavailable_declines_before_any_effect() {
    let h = harness();
    fund_customer(&h, 1, "1000.00").await;
    h.directory.upsert_merchant(
        MERCHANT,
        MerchantProfile {
            accepting_orders: false,
            location: store_location(),
        },
    );

    let result = h
        .orders
        .place_order(1, order_request(MERCHANT, "200.00", PaymentMethod::Wallet, "tok-c"))
        .await;

    assert!(matches!(result, Err(CoreError::MerchantUnavailable(m)) if m == MERCHANT));
    assert!(h.order_store.orders().await.unwrap().is_empty());
    assert_eq!(
        h.ledger
            .entries_for(&AccountId::customer(1))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_cash_order_never_touches_the_ledger() {
    let h = harness();
    fund_customer(&h, 1, "10.00").await;
    open_merchant(&h, MERCHANT, store_location());

    let order = h
        .orders
        .place_order(
            1,
            order_request(MERCHANT, "200.00", PaymentMethod::CashOnDelivery, "tok-d"),
        )
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(
        h.ledger
            .entries_for(&AccountId::customer(1))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_delegated_purchase_debits_the_estimate() {
    let h = harness();
    fund_customer(&h, 1, "100.00").await;
    open_merchant(&h, MERCHANT, store_location());

    let order = h
        .orders
        .create_delegated_purchase_order(
            1,
            DelegatedPurchaseRequest {
                merchant: MERCHANT,
                instructions: "pharmacy pickup, ask for the reserved bag".into(),
                estimate: amount("45.00"),
                payment_method: PaymentMethod::Points,
                address: DeliveryAddress {
                    label: "12 River St".into(),
                    location: GeoPoint::new(40.4180, -3.7020),
                },
                idempotency_token: Some("tok-delegated".into()),
            },
        )
        .await
        .unwrap();

    assert_eq!(order.total, amount("45.00"));
    assert_eq!(
        h.wallet
            .get_balance(&AccountId::customer(1))
            .await
            .unwrap(),
        Balance::new(dec!(55.00))
    );
}

#[tokio::test]
async fn test_cancellation_refunds_with_a_reversing_entry() {
    let h = harness();
    fund_customer(&h, 1, "500.00").await;
    open_merchant(&h, MERCHANT, store_location());

    let order = h
        .orders
        .place_order(1, order_request(MERCHANT, "120.00", PaymentMethod::Wallet, "tok-e"))
        .await
        .unwrap();
    let cancelled = h.orders.cancel_order(&order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let account = AccountId::customer(1);
    assert_eq!(
        h.wallet.get_balance(&account).await.unwrap(),
        Balance::new(dec!(500.00))
    );
    // Top-up, debit, refund: the original debit is still there, untouched.
    let entries = h.ledger.entries_for(&account).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[1].entry_type, EntryType::Debit);
    assert_eq!(entries[2].entry_type, EntryType::Credit);
    assert!(h.ledger.verify_chain(&account).await.is_ok());

    // Terminal state: no further transitions, including a second cancel.
    assert!(matches!(
        h.orders.cancel_order(&order.id).await,
        Err(CoreError::InvalidOrderTransition { .. })
    ));
}

/// Order store that accepts nothing, to force the persistence failure path.
struct RejectingOrderStore;

#[async_trait]
impl OrderStore for RejectingOrderStore {
    async fn insert(&self, _order: Order) -> Result<Order> {
        Err(CoreError::Storage("order table unavailable".into()))
    }
    async fn get(&self, _id: &OrderId) -> Result<Option<Order>> {
        Ok(None)
    }
    async fn assign_agent(&self, id: &OrderId, _agent: u64) -> Result<bool> {
        Err(CoreError::OrderNotFound(*id))
    }
    async fn transition(&self, id: &OrderId, _next: OrderStatus) -> Result<Order> {
        Err(CoreError::OrderNotFound(*id))
    }
    async fn orders(&self) -> Result<Vec<Order>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_persistence_failure_reverses_the_debit() {
    let h = harness();
    fund_customer(&h, 1, "300.00").await;
    open_merchant(&h, MERCHANT, store_location());

    let orders = OrderService::new(
        h.wallet.clone(),
        Arc::new(RejectingOrderStore),
        h.directory.clone(),
        h.notifier.clone(),
    );
    let result = orders
        .place_order(1, order_request(MERCHANT, "80.00", PaymentMethod::Wallet, "tok-f"))
        .await;
    assert!(matches!(result, Err(CoreError::Storage(_))));

    let account = AccountId::customer(1);
    assert_eq!(
        h.wallet.get_balance(&account).await.unwrap(),
        Balance::new(dec!(300.00))
    );
    // The debit happened and was compensated, never edited away.
    let entries = h.ledger.entries_for(&account).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(h.ledger.verify_chain(&account).await.is_ok());
}

#[tokio::test]
async fn test_lifecycle_walk_to_completion() {
    let h = harness();
    fund_customer(&h, 1, "100.00").await;
    open_merchant(&h, MERCHANT, store_location());

    let order = h
        .orders
        .place_order(1, order_request(MERCHANT, "20.00", PaymentMethod::Wallet, "tok-g"))
        .await
        .unwrap();
    h.order_store
        .transition(&order.id, OrderStatus::Accepted)
        .await
        .unwrap();

    for status in [
        OrderStatus::Preparing,
        OrderStatus::Delivering,
        OrderStatus::Completed,
    ] {
        let updated = h.orders.advance_order(&order.id, status).await.unwrap();
        assert_eq!(updated.status, status);
    }

    // Completed is terminal.
    assert!(matches!(
        h.orders.cancel_order(&order.id).await,
        Err(CoreError::InvalidOrderTransition { .. })
    ));
}

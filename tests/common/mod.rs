#![allow(dead_code)]

use fleetpay::application::dispatch::DispatchEngine;
use fleetpay::application::orders::{OrderService, PlaceOrderRequest};
use fleetpay::application::wallet::WalletService;
use fleetpay::domain::account::{AccountId, Amount};
use fleetpay::domain::dispatch::{DispatchConfig, GeoPoint};
use fleetpay::domain::order::{DeliveryAddress, OrderItem, OrderKind, PaymentMethod};
use fleetpay::infrastructure::in_memory::{
    ChannelNotifier, InMemoryDirectory, InMemoryLedger, InMemoryOrderStore, MerchantProfile,
};
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct Harness {
    pub ledger: Arc<InMemoryLedger>,
    pub order_store: Arc<InMemoryOrderStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub notifier: Arc<ChannelNotifier>,
    pub wallet: WalletService,
    pub orders: OrderService,
    pub dispatch: Arc<DispatchEngine>,
}

pub fn harness() -> Harness {
    harness_with(DispatchConfig::default())
}

pub fn harness_with(config: DispatchConfig) -> Harness {
    let ledger = Arc::new(InMemoryLedger::new());
    let order_store = Arc::new(InMemoryOrderStore::new());
    let directory = Arc::new(InMemoryDirectory::new());
    let notifier = Arc::new(ChannelNotifier::new());

    let wallet = WalletService::new(ledger.clone());
    let orders = OrderService::new(
        wallet.clone(),
        order_store.clone(),
        directory.clone(),
        notifier.clone(),
    );
    let dispatch = Arc::new(DispatchEngine::new(
        order_store.clone(),
        directory.clone(),
        directory.clone(),
        notifier.clone(),
        config,
    ));

    Harness {
        ledger,
        order_store,
        directory,
        notifier,
        wallet,
        orders,
        dispatch,
    }
}

pub fn amount(value: &str) -> Amount {
    Amount::new(value.parse::<Decimal>().unwrap()).unwrap()
}

/// Open a customer account and top it up.
pub async fn fund_customer(harness: &Harness, customer: u64, balance: &str) {
    use fleetpay::domain::ports::LedgerStore;
    harness
        .ledger
        .open_account(AccountId::customer(customer))
        .await
        .unwrap();
    harness
        .wallet
        .top_up(
            AccountId::customer(customer),
            amount(balance),
            &format!("seed-topup-{customer}"),
        )
        .await
        .unwrap();
}

/// Register an open merchant at the given location.
pub fn open_merchant(harness: &Harness, merchant: u64, location: GeoPoint) {
    harness.directory.upsert_merchant(
        merchant,
        MerchantProfile {
            accepting_orders: true,
            location,
        },
    );
}

/// A single-item marketplace order request for the given total.
pub fn order_request(
    merchant: u64,
    total: &str,
    payment_method: PaymentMethod,
    token: &str,
) -> PlaceOrderRequest {
    PlaceOrderRequest {
        merchant,
        kind: OrderKind::Marketplace {
            items: vec![OrderItem {
                name: "combo menu".into(),
                unit_price: amount(total),
                quantity: 1,
            }],
        },
        payment_method,
        address: DeliveryAddress {
            label: "12 River St".into(),
            location: GeoPoint::new(40.4180, -3.7020),
        },
        idempotency_token: Some(token.to_string()),
    }
}

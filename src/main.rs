use clap::Parser;
use fleetpay::application::dispatch::DispatchEngine;
use fleetpay::application::orders::{OrderService, PlaceOrderRequest};
use fleetpay::application::wallet::WalletService;
use fleetpay::domain::account::{AccountId, Amount, Balance};
use fleetpay::domain::dispatch::{DispatchConfig, GeoPoint};
use fleetpay::domain::order::{DeliveryAddress, OrderId, OrderItem, OrderKind};
use fleetpay::domain::ports::{AgentDirectory, LedgerStoreRef, OrderStoreRef};
use fleetpay::infrastructure::in_memory::{
    ChannelNotifier, InMemoryDirectory, InMemoryLedger, InMemoryOrderStore, MerchantProfile,
};
use fleetpay::interfaces::csv::balance_writer::BalanceWriter;
use fleetpay::interfaces::jsonl::command_reader::{Command, CommandReader};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input command stream (JSON lines)
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Dispatch radius for the first broadcast round, in kilometers
    #[arg(long, default_value_t = 5.0)]
    radius_km: f64,

    /// Radius multiplier applied on each re-dispatch round
    #[arg(long, default_value_t = 1.5)]
    redispatch_factor: f64,

    /// Acceptance window of a dispatch offer, in seconds
    #[arg(long, default_value_t = 30)]
    offer_window_secs: i64,
}

fn in_memory_stores() -> (LedgerStoreRef, OrderStoreRef) {
    (
        Arc::new(InMemoryLedger::new()),
        Arc::new(InMemoryOrderStore::new()),
    )
}

#[cfg(feature = "storage-rocksdb")]
fn persistent_stores(db_path: &Path) -> Result<(LedgerStoreRef, OrderStoreRef)> {
    let store = fleetpay::infrastructure::rocksdb::RocksDbStore::open(db_path).into_diagnostic()?;
    Ok((Arc::new(store.clone()), Arc::new(store)))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn persistent_stores(_db_path: &Path) -> Result<(LedgerStoreRef, OrderStoreRef)> {
    eprintln!(
        "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
    );
    Ok(in_memory_stores())
}

struct App {
    ledger: LedgerStoreRef,
    wallet: WalletService,
    orders: OrderService,
    dispatch: DispatchEngine,
    directory: Arc<InMemoryDirectory>,
}

impl App {
    async fn execute(&self, command: Command) -> fleetpay::error::Result<()> {
        match command {
            Command::OpenAccount { holder, id } => {
                self.ledger
                    .open_account(AccountId { holder, holder_id: id })
                    .await?;
            }
            Command::SetAccountStatus { holder, id, status } => {
                self.ledger
                    .set_account_status(&AccountId { holder, holder_id: id }, status)
                    .await?;
            }
            Command::SetMerchant {
                merchant,
                lat,
                lng,
                accepting_orders,
            } => {
                self.directory.upsert_merchant(
                    merchant,
                    MerchantProfile {
                        accepting_orders,
                        location: GeoPoint::new(lat, lng),
                    },
                );
            }
            Command::AgentOnline { agent, lat, lng } => {
                self.directory
                    .set_online(agent, GeoPoint::new(lat, lng))
                    .await?;
            }
            Command::AgentOffline { agent } => {
                self.directory.set_offline(agent).await?;
            }
            Command::Topup {
                holder,
                id,
                amount,
                request_id,
            } => {
                self.wallet
                    .top_up(
                        AccountId { holder, holder_id: id },
                        Amount::new(amount)?,
                        &request_id,
                    )
                    .await?;
            }
            Command::Withdraw {
                holder,
                id,
                amount,
                request_id,
            } => {
                self.wallet
                    .withdraw(
                        AccountId { holder, holder_id: id },
                        Amount::new(amount)?,
                        &request_id,
                    )
                    .await?;
            }
            Command::PlaceOrder {
                customer,
                merchant,
                payment_method,
                items,
                address,
                lat,
                lng,
                order_token,
            } => {
                let items = items
                    .into_iter()
                    .map(|item| {
                        Ok(OrderItem {
                            name: item.name,
                            unit_price: Amount::new(item.unit_price)?,
                            quantity: item.quantity,
                        })
                    })
                    .collect::<fleetpay::error::Result<Vec<_>>>()?;
                self.orders
                    .place_order(
                        customer,
                        PlaceOrderRequest {
                            merchant,
                            kind: OrderKind::Marketplace { items },
                            payment_method,
                            address: DeliveryAddress {
                                label: address,
                                location: GeoPoint::new(lat, lng),
                            },
                            idempotency_token: Some(order_token),
                        },
                    )
                    .await?;
            }
            Command::DelegatedOrder {
                customer,
                merchant,
                payment_method,
                instructions,
                estimate,
                address,
                lat,
                lng,
                order_token,
            } => {
                self.orders
                    .place_order(
                        customer,
                        PlaceOrderRequest {
                            merchant,
                            kind: OrderKind::DelegatedPurchase {
                                instructions,
                                estimate: Amount::new(estimate)?,
                            },
                            payment_method,
                            address: DeliveryAddress {
                                label: address,
                                location: GeoPoint::new(lat, lng),
                            },
                            idempotency_token: Some(order_token),
                        },
                    )
                    .await?;
            }
            Command::Dispatch { order_token } => {
                self.dispatch
                    .dispatch(&OrderId::from_client_token(&order_token))
                    .await?;
            }
            Command::Redispatch { order_token } => {
                self.dispatch
                    .redispatch(&OrderId::from_client_token(&order_token))
                    .await?;
            }
            Command::Accept { order_token, agent } => {
                self.dispatch
                    .accept(&OrderId::from_client_token(&order_token), agent)
                    .await?;
            }
            Command::AdvanceOrder { order_token, status } => {
                self.orders
                    .advance_order(&OrderId::from_client_token(&order_token), status)
                    .await?;
            }
            Command::CancelOrder { order_token } => {
                self.orders
                    .cancel_order(&OrderId::from_client_token(&order_token))
                    .await?;
            }
            Command::VerifyChain { holder, id } => {
                let account = AccountId { holder, holder_id: id };
                self.ledger.verify_chain(&account).await?;
                info!(%account, "ledger chain verified");
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let (ledger, order_store) = match &cli.db_path {
        Some(db_path) => persistent_stores(db_path)?,
        None => in_memory_stores(),
    };

    let directory = Arc::new(InMemoryDirectory::new());
    let notifier = Arc::new(ChannelNotifier::new());
    let mut events = notifier.tap();

    let wallet = WalletService::new(ledger.clone());
    let orders = OrderService::new(
        wallet.clone(),
        order_store.clone(),
        directory.clone(),
        notifier.clone(),
    );
    let dispatch = DispatchEngine::new(
        order_store,
        directory.clone(),
        directory.clone(),
        notifier.clone(),
        DispatchConfig {
            max_radius_km: cli.radius_km,
            redispatch_radius_factor: cli.redispatch_factor,
            offer_window: chrono::Duration::seconds(cli.offer_window_secs),
        },
    );
    let app = App {
        ledger: ledger.clone(),
        wallet,
        orders,
        dispatch,
        directory,
    };

    // Process the command stream; a declined or malformed command is
    // reported and the stream continues.
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for command in reader.commands() {
        match command {
            Ok(command) => {
                if let Err(e) = app.execute(command).await {
                    eprintln!("Error processing command: {e}");
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {e}");
            }
        }
    }

    // Every push event the run produced, one JSON line each.
    while let Ok((channel, event)) = events.try_recv() {
        let line = serde_json::json!({ "channel": channel, "event": event });
        println!("{line}");
    }

    // Final balance report.
    let mut rows = Vec::new();
    for account in ledger.accounts().await.into_diagnostic()? {
        let balance: Balance = ledger.balance_of(&account.id).await.into_diagnostic()?;
        rows.push((account, balance));
    }
    let stdout = io::stdout();
    let mut writer = BalanceWriter::new(stdout.lock());
    writer.write_balances(rows).into_diagnostic()?;

    Ok(())
}

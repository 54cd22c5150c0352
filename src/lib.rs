//! Multi-party wallet ledger and order dispatch core.
//!
//! The ledger is an append-only, hash-chained, idempotent entry log that is
//! the single source of truth for every balance. On top of it sit the
//! wallet, order-placement, and dispatch services; stores and the notifier
//! are ports, with in-memory and (optionally) RocksDB adapters.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;

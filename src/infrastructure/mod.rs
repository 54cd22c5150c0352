//! Adapters behind the domain ports: the default in-memory stores and the
//! optional RocksDB-backed persistence.

pub mod in_memory;

#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;

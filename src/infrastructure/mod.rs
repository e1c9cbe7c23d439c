pub mod analytics;
pub mod in_memory;
pub mod psp;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;

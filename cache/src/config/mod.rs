//! File-based configuration: YAML mapped onto `raw` structs, then validated
//! into the `processed` types the builders consume.

pub mod processed;
pub mod raw;

pub use processed::{CacheConfig, MemoryStoreConfig};

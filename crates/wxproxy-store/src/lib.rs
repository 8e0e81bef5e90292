//! Call record persistence for wxproxy.

pub mod db;
pub mod error;
pub mod record_store;

pub use db::{ConnectionPool, Database, PoolConfig, PoolInfo};
pub use error::PersistError;
pub use record_store::{
    normalize_location, CallRecordStore, InsertVariant, PersistedCallRecord, UNKNOWN_LOCATION,
};

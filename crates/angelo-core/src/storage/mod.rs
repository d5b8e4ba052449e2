//! Persistence: the store seam, its sled engine and the session on top.

mod cascade;
mod config;
mod engine;
mod navigate;
mod record;
mod session;

pub use cascade::{CascadeExecutor, CascadeResult};
pub use config::{StorageConfig, MEMORY_SCHEME, SLED_SCHEME};
pub use engine::{SledStore, Store, WriteBatch, WriteOp};
pub use navigate::Related;
pub use record::{current_timestamp, FieldValue, Record, Row};
pub use session::Session;

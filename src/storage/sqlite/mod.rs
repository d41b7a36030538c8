//! `SQLite` key-value store.
//!
//! - `connection`: lock acquisition with poison recovery and pragma setup
//! - `store`: the [`SqliteStore`] backend itself

mod connection;
mod store;

pub use connection::{acquire_lock, configure_connection};
pub use store::SqliteStore;

//! Storage backend traits.

mod kv;

pub use kv::{BatchOp, KvStore, WriteBatch};

//! Redb storage backend.
//!
//! A storage backend implementation using Redb, a pure-Rust embedded
//! database with ACID transactions.

mod engine;
mod tables;
mod transaction;

pub use engine::RedbEngine;
pub use tables::names;
pub use transaction::RedbTransaction;

//! Storage backend implementations.

pub mod redb;

pub use self::redb::{names, RedbEngine, RedbTransaction};

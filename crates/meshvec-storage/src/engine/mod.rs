//! Storage engine abstractions.

mod error;
mod traits;

pub use error::{StorageError, StorageResult};
pub use traits::{KeyValue, StorageEngine, Transaction};

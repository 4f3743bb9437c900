//! Core data types.

mod collection;
mod history;
mod id;
mod metadata;
mod metric;

pub use collection::{BuildParams, CollectionConfig};
pub use history::{Action, HistoryEntry};
pub use id::{CollectionId, Fingerprint, VectorHandle};
pub use metadata::{Metadata, DEFAULT_MAX_METADATA_BYTES};
pub use metric::Metric;

//! History command.

use meshvec::{Operation, Reply};
use meshvec_core::CollectionId;

use super::{unexpected, Target};
use crate::error::Result;
use crate::output;
use crate::OutputFormat;

/// Print the history of a collection, or of one vector in it.
pub fn view(target: &Target, collection: CollectionId, vector_id: Option<&str>, format: OutputFormat) -> Result<()> {
    let operation = Operation::History { external_id: vector_id.map(str::to_owned) };
    match target.route(collection, operation)? {
        Reply::History(entries) => {
            println!("{}", output::format_history(&entries, format)?);
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

//! Vector commands.

use meshvec::{Operation, Reply};
use meshvec_core::{CollectionId, Metadata};

use super::{unexpected, Target};
use crate::error::{CliError, Result};
use crate::output;
use crate::OutputFormat;

/// Add a vector, with optional text metadata.
pub fn add(
    target: &Target,
    collection: CollectionId,
    vector_id: &str,
    vector: Vec<f32>,
    metadata: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let metadata = metadata.map(|text| text.as_bytes().to_vec());
    let operation = Operation::Add { external_id: vector_id.to_owned(), vector, metadata };
    match target.route(collection, operation)? {
        Reply::Handle(handle) => {
            match format {
                OutputFormat::Table => println!("added {vector_id} as handle {}", handle.as_u64()),
                OutputFormat::Json => {
                    let value = serde_json::json!({ "id": vector_id, "handle": handle.as_u64() });
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
            }
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

/// Print a stored vector and its metadata.
pub fn show(target: &Target, collection: CollectionId, vector_id: &str, format: OutputFormat) -> Result<()> {
    let vector = match target.route(collection, Operation::Get { external_id: vector_id.to_owned() })? {
        Reply::Vector(vector) => vector,
        other => return Err(unexpected(&other)),
    };

    let metadata = match target.route(collection, Operation::GetMetadata { external_id: vector_id.to_owned() }) {
        Ok(Reply::Metadata(bytes)) => Some(Metadata::from_stored(bytes)),
        Ok(other) => return Err(unexpected(&other)),
        Err(CliError::Node(meshvec::Error::NotFound(_))) => None,
        Err(e) => return Err(e),
    };

    println!("{}", output::format_vector(vector_id, &vector, metadata.as_ref(), format)?);
    Ok(())
}

/// Print the `k` nearest vectors, setting the search quality first when `ef` is given.
pub fn search(
    target: &Target,
    collection: CollectionId,
    vector: Vec<f32>,
    k: usize,
    ef: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    if let Some(ef) = ef {
        match target.route(collection, Operation::SetQuality { ef })? {
            Reply::Ack => {}
            other => return Err(unexpected(&other)),
        }
    }

    match target.route(collection, Operation::Query { vector, k, filters: Vec::new() })? {
        Reply::Neighbors(neighbors) => {
            println!("{}", output::format_neighbors(&neighbors, format)?);
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

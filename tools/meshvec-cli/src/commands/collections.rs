//! Collection commands.

use meshvec::{Reply, Request};
use meshvec_core::{BuildParams, Metric};

use super::{unexpected, Target};
use crate::error::{CliError, Result};
use crate::output;
use crate::OutputFormat;

/// Create a collection on the target node and print its id.
pub fn create(
    target: &Target,
    dimension: usize,
    metric: Metric,
    capacity: usize,
    m: usize,
    ef_construction: usize,
    format: OutputFormat,
) -> Result<()> {
    if dimension == 0 {
        return Err(CliError::InvalidInput("--dim must be positive".into()));
    }
    let request = Request::Create { dimension, metric, capacity, build: BuildParams::new(m, ef_construction) };
    match target.call(request)? {
        Reply::Created(id) => {
            println!("{}", output::format_created(id, format)?);
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

//! meshvec Command Line Interface
//!
//! Runs a node, or talks to a running one.

mod commands;
mod error;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use meshvec_core::{CollectionId, Metric};
use tracing_subscriber::EnvFilter;

use crate::commands::{collections, logs, node, vectors, Target};

/// meshvec Command Line Interface
///
/// A peer-to-peer vector store: each node owns some collections and forwards
/// requests for the rest.
#[derive(Parser, Debug)]
#[command(name = "meshvec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Host of the node (the interface to bind for start-node)
    #[arg(long, env = "MESHVEC_HOST", global = true)]
    pub host: Option<String>,

    /// Port of the node (the port to bind for start-node)
    #[arg(short, long, env = "MESHVEC_PORT", global = true)]
    pub port: Option<u16>,

    /// Seed node to join (`host:port`), used by start-node
    #[arg(short, long, global = true)]
    pub bootstrap: Option<String>,

    /// Log filter, e.g. `debug` or `meshvec=trace`
    #[arg(long, env = "MESHVEC_LOG", global = true)]
    pub log_level: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable rows
    Table,
    /// JSON format
    Json,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a node in the foreground
    StartNode {
        /// Directory holding the catalog and collection files
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// TOML configuration file; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Create a collection on the target node and print its id
    CreateDb {
        /// Vector dimension
        #[arg(long)]
        dim: usize,

        /// Distance metric: l2, cosine or ip
        #[arg(long, default_value = "l2")]
        metric: Metric,

        /// Maximum number of vectors
        #[arg(long, default_value_t = 10_000)]
        max_elements: usize,

        /// Graph degree
        #[arg(long, default_value_t = 16)]
        m: usize,

        /// Construction breadth
        #[arg(long, default_value_t = 200)]
        ef_construction: usize,
    },

    /// Add a vector to a collection
    AddVector {
        /// Collection id
        #[arg(long)]
        db_id: CollectionId,

        /// External id of the vector
        #[arg(long)]
        vector_id: String,

        /// Comma-separated components, e.g. `1,0,0.5`
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true, required = true)]
        vector: Vec<f32>,

        /// Metadata stored with the vector
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Print a stored vector and its metadata
    QueryVector {
        /// Collection id
        #[arg(long)]
        db_id: CollectionId,

        /// External id of the vector
        #[arg(long)]
        vector_id: String,
    },

    /// Find the nearest stored vectors
    SearchVector {
        /// Collection id
        #[arg(long)]
        db_id: CollectionId,

        /// Comma-separated query components
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true, required = true)]
        vector: Vec<f32>,

        /// Number of results
        #[arg(short, long, default_value_t = 10)]
        k: usize,

        /// Search quality to set before querying
        #[arg(long)]
        ef: Option<usize>,
    },

    /// Print the history of a collection or of one vector
    ViewLog {
        /// Collection id
        #[arg(long)]
        db_id: CollectionId,

        /// Only entries for this external id
        #[arg(long)]
        vector_id: Option<String>,
    },

    /// Ask the target node to shut down
    StopNode,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("meshvec=info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("meshvec=info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let target = Target::new(cli.host.as_deref(), cli.port);
    let format = cli.format;

    match cli.command {
        Commands::StartNode { data_dir, config } => {
            node::start(config.as_deref(), cli.host, cli.port, cli.bootstrap, data_dir)?;
        }
        Commands::CreateDb { dim, metric, max_elements, m, ef_construction } => {
            collections::create(&target, dim, metric, max_elements, m, ef_construction, format)?;
        }
        Commands::AddVector { db_id, vector_id, vector, metadata } => {
            vectors::add(&target, db_id, &vector_id, vector, metadata.as_deref(), format)?;
        }
        Commands::QueryVector { db_id, vector_id } => {
            vectors::show(&target, db_id, &vector_id, format)?;
        }
        Commands::SearchVector { db_id, vector, k, ef } => {
            vectors::search(&target, db_id, vector, k, ef, format)?;
        }
        Commands::ViewLog { db_id, vector_id } => {
            logs::view(&target, db_id, vector_id.as_deref(), format)?;
        }
        Commands::StopNode => node::stop(&target)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_missing_required_argument_is_usage_error() {
        let err = Cli::try_parse_from(["meshvec", "create-db"]).expect_err("--dim is required");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_vector_components_split_on_commas() {
        let cli = Cli::try_parse_from([
            "meshvec",
            "add-vector",
            "--db-id",
            "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "--vector-id",
            "a",
            "--vector",
            "1,-0.5,2",
        ])
        .expect("parse");
        match cli.command {
            Commands::AddVector { vector, .. } => assert_eq!(vector, vec![1.0, -0.5, 2.0]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_bad_metric_is_rejected() {
        let err = Cli::try_parse_from(["meshvec", "create-db", "--dim", "3", "--metric", "manhattan"])
            .expect_err("unknown metric");
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_globals_after_subcommand() {
        let cli = Cli::try_parse_from(["meshvec", "stop-node", "--host", "10.0.0.1", "--port", "9000"])
            .expect("parse");
        assert_eq!(cli.host.as_deref(), Some("10.0.0.1"));
        assert_eq!(cli.port, Some(9000));
    }
}

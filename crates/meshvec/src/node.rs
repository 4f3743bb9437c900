//! Node runtime.
//!
//! [`Node::start`] opens the catalog, binds the RPC server, joins the
//! network and spawns the background tasks. The node runs until
//! [`Node::shutdown`] is called or a `shutdown` request arrives; then
//! [`Node::wait`] stops the tasks and takes a final backup of every open
//! collection.

use std::sync::Arc;

use meshvec_storage::{RedbEngine, StorageEngine};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::dht::{Dht, PeerDht};
use crate::directory::{newer_claim, LocationDirectory};
use crate::error::{Error, Result};
use crate::peer::PeerNode;
use crate::registry::{Engine, StoreRegistry, StoreSettings};
use crate::rpc::server::{router, ServerState};
use crate::rpc::RpcClient;
use crate::tasks;

/// A running node.
pub struct Node {
    config: NodeConfig,
    address: String,
    catalog: Engine,
    peer: Arc<PeerNode>,
    dht: Arc<dyn Dht>,
    shutdown: CancellationToken,
    server: JoinHandle<std::io::Result<()>>,
    background: Vec<JoinHandle<()>>,
}

impl Node {
    /// Start a node whose DHT replicates to its peers over RPC.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory, catalog or listening socket
    /// cannot be opened.
    pub async fn start(config: NodeConfig) -> Result<Self> {
        Self::boot(config, None).await
    }

    /// Start a node on a caller-supplied DHT.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub async fn start_with_dht(config: NodeConfig, dht: Arc<dyn Dht>) -> Result<Self> {
        Self::boot(config, Some(dht)).await
    }

    async fn boot(config: NodeConfig, dht: Option<Arc<dyn Dht>>) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let catalog: Engine = Arc::new(RedbEngine::open(config.catalog_path())?);
        let settings = StoreSettings {
            backup_interval: config.backup_interval,
            max_metadata_bytes: config.max_metadata_bytes,
        };
        let registry = Arc::new(StoreRegistry::new(&config.data_dir, Arc::clone(&catalog), settings));

        let listener = TcpListener::bind(config.bind_address()).await?;
        let address = config.published_address(listener.local_addr()?.port());

        let client = RpcClient::new(config.forward_timeout)?;
        let dht: Arc<dyn Dht> = match dht {
            Some(dht) => dht,
            None => {
                Arc::new(PeerDht::new(Arc::clone(&catalog), client.clone()).with_precedence(newer_claim))
            }
        };
        dht.listen(&address).await?;

        let directory = LocationDirectory::new(Arc::clone(&dht));
        let peer = Arc::new(PeerNode::new(
            address.clone(),
            Arc::clone(&registry),
            directory.clone(),
            client,
            config.max_hops,
        ));

        let shutdown = CancellationToken::new();
        let state = Arc::new(ServerState {
            peer: Arc::clone(&peer),
            dht: Arc::clone(&dht),
            shutdown: shutdown.clone(),
        });
        let app = router(state);
        let server_token = shutdown.clone();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).with_graceful_shutdown(async move { server_token.cancelled().await }).await
        });
        info!(%address, data_dir = %config.data_dir.display(), "node listening");

        if let Some(seed) = &config.bootstrap {
            if let Err(e) = dht.join(seed).await {
                warn!(seed = %seed, error = %e, "failed to join network, continuing alone");
            }
        }

        let background = vec![
            tokio::spawn(tasks::run_backup_scheduler(Arc::clone(&registry), config.backup_tick, shutdown.clone())),
            tokio::spawn(tasks::run_claim_refresher(
                registry,
                directory,
                address.clone(),
                config.claim_refresh_interval,
                shutdown.clone(),
            )),
        ];

        Ok(Self { config, address, catalog, peer, dht, shutdown, server, background })
    }

    /// The address this node publishes.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The configuration the node was started with.
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The routing façade.
    #[must_use]
    pub fn peer(&self) -> &Arc<PeerNode> {
        &self.peer
    }

    /// The local registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<StoreRegistry> {
        self.peer.registry()
    }

    /// The DHT this node serves.
    #[must_use]
    pub fn dht(&self) -> &Arc<dyn Dht> {
        &self.dht
    }

    /// A token cancelled when the node begins shutting down.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask the node to stop. [`wait`](Self::wait) completes the shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run until shutdown, then stop the tasks and back up every open collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the server failed or the catalog cannot be flushed.
    pub async fn wait(self) -> Result<()> {
        let Self { address, catalog, peer, dht, shutdown, server, background, .. } = self;

        let served = server.await;
        shutdown.cancel();
        for task in background {
            if let Err(e) = task.await {
                warn!(error = %e, "background task panicked");
            }
        }

        let registry = Arc::clone(peer.registry());
        match tokio::task::spawn_blocking(move || tasks::final_backup(&registry)).await {
            Ok(_) => {}
            Err(e) => warn!(error = %e, "final backup panicked"),
        }

        dht.stop().await?;
        catalog.flush()?;
        info!(%address, "node stopped");

        match served {
            Ok(result) => result.map_err(Error::from),
            Err(e) => Err(Error::Io(std::io::Error::other(e))),
        }
    }

    /// Shut down and wait for the node to stop.
    ///
    /// # Errors
    ///
    /// Same as [`wait`](Self::wait).
    pub async fn stop(self) -> Result<()> {
        self.shutdown();
        self.wait().await
    }
}

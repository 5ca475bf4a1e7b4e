//! Connection management
//!
//! This module provides:
//! - [`ConnectionManager`]: connects the driver to one URI and verifies it
//!   with a ping
//! - [`TopologyProvider`]: yields the name-keyed shard connections used by
//!   fan-out mode
//! - [`StaticTopology`]: a provider built from an explicit `name=uri` list

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::{Client, options::ClientOptions};
use tracing::{debug, error, info};

use crate::config::{ConnectionConfig, ShardConfig};
use crate::error::{ConnectionError, Result};
use crate::transport::{MemoryTransport, MongoTransport, Transport};

const APP_NAME: &str = "mshell";

/// Connects the driver to MongoDB endpoints
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    config: ConnectionConfig,
}

impl ConnectionManager {
    /// Create a new connection manager
    ///
    /// # Arguments
    /// * `config` - Timeouts and the default URI
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Parse connection URI and apply configured timeouts
    ///
    /// # Arguments
    /// * `uri` - MongoDB connection URI
    ///
    /// # Returns
    /// * `Result<ClientOptions>` - Parsed client options or error
    pub async fn client_options(&self, uri: &str) -> Result<ClientOptions> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| ConnectionError::InvalidUri(format!("{uri}: {e}")))?;
        options.connect_timeout = Some(Duration::from_secs(self.config.timeout_secs));
        options.server_selection_timeout =
            Some(Duration::from_secs(self.config.server_selection_timeout_secs));
        if options.app_name.is_none() {
            options.app_name = Some(APP_NAME.to_string());
        }
        Ok(options)
    }

    /// Connect and ping
    ///
    /// # Returns
    /// * `Result<(Client, String)>` - Connected client and its endpoint label
    pub async fn connect(&self, uri: &str) -> Result<(Client, String)> {
        let options = self.client_options(uri).await?;
        let endpoint = options
            .hosts
            .iter()
            .map(|host| host.to_string())
            .collect::<Vec<_>>()
            .join(",");

        debug!("connecting to {}", endpoint);
        let client = Client::with_options(options)
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ConnectionError::PingFailed(e.to_string()))?;

        info!("connected to {}", endpoint);
        Ok((client, endpoint))
    }

    /// Connect and wrap the client as a transport
    pub async fn open_transport(&self, uri: &str, batch_size: usize) -> Result<Arc<dyn Transport>> {
        let (client, endpoint) = self.connect(uri).await?;
        let batch_size = u32::try_from(batch_size).unwrap_or(u32::MAX);
        Ok(Arc::new(MongoTransport::new(client, endpoint, batch_size)))
    }
}

/// A named, live shard connection
pub struct ShardTarget {
    pub name: String,
    pub transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for ShardTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardTarget")
            .field("name", &self.name)
            .field("endpoint", &self.transport.endpoint())
            .finish()
    }
}

/// Source of shard connections for fan-out mode.
#[async_trait]
pub trait TopologyProvider: Send + Sync {
    /// Live shard connections, sorted by name.
    async fn shards(&self) -> Result<Vec<ShardTarget>>;
}

/// Shards given explicitly, with no discovery.
#[derive(Debug, Clone)]
pub struct StaticTopology {
    entries: Vec<ShardConfig>,
    manager: ConnectionManager,
    batch_size: usize,
    in_memory: bool,
}

impl StaticTopology {
    /// Build a topology from shard entries
    ///
    /// Empty and duplicate names are rejected.
    pub fn new(
        mut entries: Vec<ShardConfig>,
        manager: ConnectionManager,
        batch_size: usize,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.name.is_empty() || entry.uri.is_empty() {
                return Err(
                    ConnectionError::InvalidShard(format!("{}={}", entry.name, entry.uri)).into(),
                );
            }
            if !seen.insert(entry.name.clone()) {
                return Err(ConnectionError::DuplicateShard(entry.name.clone()).into());
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self {
            entries,
            manager,
            batch_size,
            in_memory: false,
        })
    }

    /// Parse a `name=uri` entry
    pub fn parse_entry(entry: &str) -> Result<ShardConfig> {
        match entry.split_once('=') {
            Some((name, uri)) if !name.trim().is_empty() && !uri.trim().is_empty() => {
                Ok(ShardConfig {
                    name: name.trim().to_string(),
                    uri: uri.trim().to_string(),
                })
            }
            _ => Err(ConnectionError::InvalidShard(entry.to_string()).into()),
        }
    }

    /// Serve every shard from an in-process store instead of the network.
    pub fn in_memory(mut self) -> Self {
        self.in_memory = true;
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}

#[async_trait]
impl TopologyProvider for StaticTopology {
    async fn shards(&self) -> Result<Vec<ShardTarget>> {
        let mut targets: Vec<ShardTarget> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let transport: Arc<dyn Transport> = if self.in_memory {
                Arc::new(MemoryTransport::new(entry.uri.clone()))
            } else {
                match self.manager.open_transport(&entry.uri, self.batch_size).await {
                    Ok(transport) => transport,
                    Err(e) => {
                        // Release what was already acquired, newest first.
                        for target in targets.iter().rev() {
                            if let Err(release) = target.transport.shutdown().await {
                                error!("failed to release shard {}: {}", target.name, release);
                            }
                        }
                        return Err(ConnectionError::ConnectionFailed(format!(
                            "shard {}: {}",
                            entry.name, e
                        ))
                        .into());
                    }
                }
            };
            targets.push(ShardTarget {
                name: entry.name.clone(),
                transport,
            });
        }
        Ok(targets)
    }
}

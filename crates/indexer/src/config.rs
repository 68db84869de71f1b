//! Command-line configuration for the indexer service.

use std::{
    path::PathBuf,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use alloy_primitives::Address;
use clap::Parser;
use covalent_client::{
    ClientConfig,
    CovalentClient,
};
use tracing::level_filters::LevelFilter;

use crate::{
    error::{
        IndexerError,
        Result,
    },
    extract::Extractor,
    handlers::{
        HandlerKind,
        build_handler,
    },
    service::Indexer,
    store::{
        CheckpointStore,
        DocumentStore,
        RawTransactionStore,
        SledStore,
    },
    transform::Transformer,
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Contracts to index, as `address=handler-kind` pairs (repeatable or
    /// comma-separated)
    #[arg(long = "contract", env = "INDEXER_CONTRACTS", value_delimiter = ',', required = true)]
    pub contracts: Vec<WatchedContract>,

    /// Path of the database; defaults to the platform data directory
    #[arg(long, env = "INDEXER_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Covalent API key
    #[arg(long, env = "COVALENT_API_KEY")]
    pub api_key: String,

    /// Chain id of the network the contracts live on
    #[arg(long, env = "INDEXER_CHAIN_ID", default_value = "1")]
    pub chain_id: u64,

    /// Covalent API endpoint
    #[arg(long, env = "COVALENT_API_URL", default_value = "https://api.covalenthq.com")]
    pub api_url: String,

    /// History items requested per page
    #[arg(long, env = "INDEXER_PAGE_SIZE", default_value = "100")]
    pub page_size: u32,

    /// Seconds between extraction passes
    #[arg(long, env = "INDEXER_EXTRACT_INTERVAL_SECS", default_value = "15")]
    pub extract_interval_secs: u64,

    /// Seconds between transform passes
    #[arg(long, env = "INDEXER_TRANSFORM_INTERVAL_SECS", default_value = "10")]
    pub transform_interval_secs: u64,

    /// Log level
    #[arg(long, env = "INDEXER_LOG_LEVEL", default_value = "info")]
    pub log_level: LevelFilter,
}

/// A watched contract address and the handler variant bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedContract {
    pub address: Address,
    pub handler: HandlerKind,
}

impl FromStr for WatchedContract {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (address, handler) = s
            .split_once('=')
            .ok_or_else(|| format!("expected `address=handler-kind`, got `{s}`"))?;

        let address = address
            .trim()
            .parse::<Address>()
            .map_err(|err| format!("invalid address `{address}`: {err}"))?;
        let handler = handler.trim().parse::<HandlerKind>()?;

        Ok(Self { address, handler })
    }
}

impl Config {
    /// Open storage, build the transport client, and assemble the service.
    pub fn build(self) -> Result<Indexer> {
        let mut seen = Vec::new();
        for contract in &self.contracts {
            if seen.contains(&contract.address) {
                return Err(IndexerError::Config(format!(
                    "address {} is configured more than once",
                    contract.address
                )));
            }
            seen.push(contract.address);
        }

        let db_path = match &self.db_path {
            Some(path) => path.clone(),
            None => directories::ProjectDirs::from("com", "contract-indexer", "contract-indexer")
                .ok_or_else(|| {
                    IndexerError::Config("cannot determine a platform data directory".to_string())
                })?
                .data_dir()
                .join("db"),
        };

        let store: Arc<dyn DocumentStore> = Arc::new(SledStore::open(&db_path)?);
        tracing::info!(db_path = %db_path.display(), "opened database");

        let checkpoints = CheckpointStore::new(store.clone());
        let raw = RawTransactionStore::new(store.clone());

        let client_config = ClientConfig::new(self.chain_id, self.api_key.clone())
            .with_base_url(&self.api_url)
            .map_err(IndexerError::Transport)?
            .with_page_size(self.page_size)
            .map_err(IndexerError::Transport)?;
        let client = CovalentClient::new(client_config).map_err(IndexerError::Transport)?;

        let addresses: Vec<Address> = self.contracts.iter().map(|c| c.address).collect();
        let extractor = Extractor::new(client, checkpoints.clone(), raw.clone(), addresses);

        let transformers = self
            .contracts
            .iter()
            .map(|contract| {
                Transformer::new(
                    contract.address,
                    build_handler(contract.handler, contract.address, store.clone()),
                    checkpoints.clone(),
                    raw.clone(),
                )
            })
            .collect();

        Ok(Indexer::new(
            extractor,
            transformers,
            Duration::from_secs(self.extract_interval_secs),
            Duration::from_secs(self.transform_interval_secs),
        ))
    }
}

//! Incremental indexer for watched-contract activity.
//!
//! Two loosely-coupled checkpointed stages coordinate through an embedded
//! document store: an extraction cycle advances a per-address raw watermark
//! by pulling descending transaction-history pages, and a replay cycle
//! reconstructs each contract's aggregate state from the stored log stream
//! under its own independent watermark.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod decode;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod service;
pub mod store;
pub mod transform;

pub use config::{
    Config,
    WatchedContract,
};
pub use error::{
    IndexerError,
    Result,
};
pub use service::Indexer;

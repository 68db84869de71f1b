//! Client for the Covalent `transactions_v2` history API
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use client::CovalentClient;
pub use config::{
    ClientConfig,
    RetryPolicy,
};
pub use error::{
    Error,
    Result,
};
pub use types::{
    DecodedLog,
    LogParam,
    RawLogEvent,
    RawTransaction,
    TransactionsPage,
};

//! Wire types for the `transactions_v2` response envelope.
//!
//! Deserialization is tolerant of unknown upstream fields; only the fields
//! the pipeline consumes are modeled. Raw transactions are stored verbatim in
//! the raw store, so these shapes double as the storage document shapes.

use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::error::{
    Error,
    Result,
};

/// Top-level response envelope.
///
/// The API reports failures both out-of-band (HTTP status) and in-band
/// (`error: true` with a message), and occasionally returns a well-formed
/// JSON body with missing top-level fields. The three cases are surfaced as
/// distinct errors by [`TransactionsEnvelope::validate`].
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionsEnvelope {
    pub data: Option<EnvelopeData>,
    pub error: Option<bool>,
    pub error_message: Option<String>,
    pub error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeData {
    pub items: Option<Vec<RawTransaction>>,
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    pub has_more: bool,
}

/// One validated page of transaction history.
#[derive(Debug, Clone)]
pub struct TransactionsPage {
    pub items: Vec<RawTransaction>,
    pub has_more: bool,
}

impl TransactionsEnvelope {
    /// Check the envelope invariants and flatten it into a page.
    pub fn validate(self) -> Result<TransactionsPage> {
        let error = self
            .error
            .ok_or_else(|| Error::MalformedEnvelope("missing `error` field".to_string()))?;

        if error {
            return Err(Error::Upstream {
                code: self.error_code,
                message: self
                    .error_message
                    .unwrap_or_else(|| "unspecified upstream error".to_string()),
            });
        }

        let data = self
            .data
            .ok_or_else(|| Error::MalformedEnvelope("missing `data` field".to_string()))?;

        let items = data
            .items
            .ok_or_else(|| Error::MalformedEnvelope("missing `items` in data".to_string()))?;

        // An absent pagination block means the API has nothing further.
        let has_more = data.pagination.is_some_and(|p| p.has_more);

        Ok(TransactionsPage { items, has_more })
    }
}

/// A raw transaction with its ordered-by-arrival log events.
///
/// Created once by extraction and immutable thereafter; the replay engine
/// treats it as read-only input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawTransaction {
    pub tx_hash: String,
    pub block_height: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_signed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub log_events: Vec<RawLogEvent>,
}

/// One log record within a transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawLogEvent {
    pub log_offset: u64,
    /// Address of the contract that emitted the log, as reported upstream
    /// (lowercase hex).
    pub sender_address: String,
    #[serde(default)]
    pub raw_log_topics: Vec<String>,
    /// Upstream's attempt at decoding the log; absent when the event
    /// signature is unknown to it.
    pub decoded: Option<DecodedLog>,
}

/// Upstream-decoded event name and parameters, in ABI order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecodedLog {
    pub name: String,
    #[serde(default)]
    pub params: Vec<LogParam>,
}

/// One event parameter. When `decoded` is false the `value` is unusable and
/// the parameter must be recovered from the raw topics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub decoded: bool,
    #[serde(default)]
    pub value: serde_json::Value,
}

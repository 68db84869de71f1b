//! Extraction watermark engine.
//!
//! Advances the per-address "raw" frontier: walks descending history pages
//! from the transport client, collects every transaction above the stored
//! watermark, then persists the new watermark and the collected batch. The
//! descending page order is load-bearing and validated on every page; a pass
//! that fails leaves both the watermark and the raw store untouched for that
//! address.

use alloy_primitives::Address;
use covalent_client::{
    CovalentClient,
    RawTransaction,
};

use crate::{
    error::{
        IndexerError,
        Result,
    },
    store::{
        CheckpointStore,
        RawTransactionStore,
        Stage,
    },
};

pub struct Extractor {
    client: CovalentClient,
    checkpoints: CheckpointStore,
    raw: RawTransactionStore,
    addresses: Vec<Address>,
}

impl Extractor {
    pub fn new(
        client: CovalentClient,
        checkpoints: CheckpointStore,
        raw: RawTransactionStore,
        addresses: Vec<Address>,
    ) -> Self {
        Self {
            client,
            checkpoints,
            raw,
            addresses,
        }
    }

    /// Run one extraction pass over every watched address. A failing address
    /// is logged and skipped; it does not block the others.
    pub async fn extract(&self) {
        for &address in &self.addresses {
            if let Err(err) = self.extract_address(address).await {
                metrics::counter!("indexer_extract_pass_failures_total").increment(1);
                tracing::error!(address = %address, error = %err, "extraction pass failed");
            }
        }
    }

    async fn extract_address(&self, address: Address) -> Result<()> {
        let watermark = self.checkpoints.watermark(address, Stage::Extract)?;
        tracing::info!(address = %address, watermark, "extracting history");

        let mut pending: Vec<RawTransaction> = Vec::new();
        let mut candidate: Option<u64> = None;
        let mut page_number = 0u64;

        'pages: loop {
            let page = self.client.transactions_page(address, page_number).await?;

            // Pages are requested most-recent-first; a page that is not in
            // descending block order would corrupt the watermark.
            let descending = page
                .items
                .windows(2)
                .all(|pair| pair[0].block_height >= pair[1].block_height);
            if !descending {
                return Err(IndexerError::PageOrdering {
                    address,
                    page_number,
                });
            }

            if page_number == 0 {
                candidate = page.items.first().map(|txn| txn.block_height);
            }

            if page.items.is_empty() {
                break;
            }

            for txn in page.items {
                if txn.block_height <= watermark {
                    // Everything below this is already covered.
                    break 'pages;
                }
                if self.raw.contains(address, &txn.tx_hash)? {
                    tracing::debug!(tx_hash = %txn.tx_hash, "transaction already stored");
                    continue;
                }
                pending.push(txn);
            }

            if !page.has_more {
                break;
            }
            page_number += 1;
        }

        if let Some(candidate) = candidate {
            if candidate > watermark {
                self.checkpoints
                    .set_watermark(address, Stage::Extract, candidate)?;
                metrics::gauge!("indexer_extract_watermark", "address" => address.to_string())
                    .set(candidate as f64);
                tracing::info!(address = %address, watermark = candidate, "advanced extract watermark");
            }
        }

        if !pending.is_empty() {
            metrics::counter!("indexer_raw_transactions_stored_total")
                .increment(pending.len() as u64);
            tracing::info!(address = %address, count = pending.len(), "storing raw transactions");
            self.raw.append(address, &pending)?;
        }

        Ok(())
    }
}

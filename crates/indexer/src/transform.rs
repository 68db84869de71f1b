//! Transform replay engine.
//!
//! Advances the per-address "transformed" frontier: reads every stored raw
//! transaction above the transform watermark in ascending block order,
//! replays each through the bound handler, and persists the last block
//! height as the new watermark only after the whole batch succeeded. A
//! handler failure discards the handler's unflushed in-memory state so the
//! next pass replays the batch from the unchanged watermark.

use alloy_primitives::Address;

use crate::{
    error::Result,
    handlers::Handler,
    store::{
        CheckpointStore,
        RawTransactionStore,
        Stage,
    },
};

pub struct Transformer {
    address: Address,
    handler: Box<dyn Handler>,
    checkpoints: CheckpointStore,
    raw: RawTransactionStore,
}

impl Transformer {
    pub fn new(
        address: Address,
        handler: Box<dyn Handler>,
        checkpoints: CheckpointStore,
        raw: RawTransactionStore,
    ) -> Self {
        Self {
            address,
            handler,
            checkpoints,
            raw,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Replay all raw transactions above the transform watermark.
    pub fn transform(&mut self) -> Result<()> {
        let watermark = self.checkpoints.watermark(self.address, Stage::Transform)?;
        let batch = self.raw.transactions_above(self.address, watermark)?;

        let Some(last) = batch.last() else {
            tracing::debug!(address = %self.address, watermark, "no new raw transactions");
            return Ok(());
        };
        let latest_block = last.block_height;

        tracing::info!(
            address = %self.address,
            watermark,
            count = batch.len(),
            "replaying raw transactions"
        );

        for txn in &batch {
            if let Err(err) = self.handler.entrypoint(txn) {
                // The watermark stays put; drop partially-applied state so a
                // later flush cannot persist it.
                self.handler.reset();
                return Err(err.into());
            }
        }

        // The whole batch succeeded, including transactions that contributed
        // no recognized events.
        self.checkpoints
            .set_watermark(self.address, Stage::Transform, latest_block)?;
        metrics::gauge!("indexer_transform_watermark", "address" => self.address.to_string())
            .set(latest_block as f64);
        metrics::counter!("indexer_transactions_replayed_total").increment(batch.len() as u64);

        Ok(())
    }

    /// Persist the handler's aggregate if it changed.
    pub fn flush(&mut self) -> Result<()> {
        self.handler.flush().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        handlers::{
            AGGREGATE_DOC_ID,
            HandlerKind,
            build_handler,
            state_collection,
            test_support::*,
        },
        store::{
            DocumentStore,
            SledStore,
        },
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: Arc<dyn DocumentStore>,
        checkpoints: CheckpointStore,
        raw: RawTransactionStore,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let store: Arc<dyn DocumentStore> = Arc::new(SledStore::open(dir.path()).unwrap());
            Self {
                _dir: dir,
                checkpoints: CheckpointStore::new(store.clone()),
                raw: RawTransactionStore::new(store.clone()),
                store,
            }
        }

        fn transformer(&self, kind: HandlerKind) -> Transformer {
            Transformer::new(
                watched(),
                build_handler(kind, watched(), self.store.clone()),
                self.checkpoints.clone(),
                self.raw.clone(),
            )
        }

        fn ledger_ids(&self) -> Vec<String> {
            self.store
                .get_all_items(&state_collection(watched()))
                .unwrap()
                .into_iter()
                .map(|doc| doc["id"].as_str().unwrap().to_string())
                .collect()
        }
    }

    fn lend_txn(hash: &str, block_height: u64, log_offset: u64) -> covalent_client::RawTransaction {
        txn(
            hash,
            block_height,
            vec![decoded_event(
                log_offset,
                &WATCHED.to_lowercase(),
                "Lend",
                vec![
                    ("is721", "bool", true, json!(true)),
                    ("lenderAddress", "address", true, json!("0x465dca9995d6c2a81a0fb1b0a0c6c9b87b92a4ab")),
                    ("nftAddress", "address", true, json!("0x21b1f1d6ad9a509038a7dd896cabb486cc4b86f1")),
                    ("tokenID", "uint256", true, json!("801")),
                    ("lendingID", "uint256", true, json!("12")),
                    ("maxRentDuration", "uint8", true, json!(14)),
                    ("dailyRentPrice", "bytes4", true, json!("AAEfQA==")),
                    ("lendAmount", "uint16", true, json!(1)),
                    ("paymentToken", "uint8", true, json!(1)),
                ],
            )],
        )
    }

    #[test]
    fn test_replay_advances_checkpoint_and_builds_ledger() {
        let fx = Fixture::new();
        fx.raw
            .append(
                watched(),
                &[
                    lend_txn("0xaaa", 10, 0),
                    lend_txn("0xbbb", 11, 1),
                    lend_txn("0xccc", 12, 2),
                ],
            )
            .unwrap();

        let mut transformer = fx.transformer(HandlerKind::CollateralFreeRentals);
        transformer.transform().unwrap();
        transformer.flush().unwrap();

        assert_eq!(
            fx.checkpoints
                .watermark(watched(), Stage::Transform)
                .unwrap(),
            12
        );
        let mut ids = fx.ledger_ids();
        ids.sort();
        assert_eq!(ids, vec!["0xaaa_0", "0xbbb_1", "0xccc_2"]);
    }

    #[test]
    fn test_second_pass_with_no_new_data_is_a_noop() {
        let fx = Fixture::new();
        fx.raw
            .append(watched(), &[lend_txn("0xaaa", 10, 0)])
            .unwrap();

        let mut transformer = fx.transformer(HandlerKind::CollateralFreeRentals);
        transformer.transform().unwrap();
        transformer.flush().unwrap();
        let ledger_before = fx.ledger_ids();

        transformer.transform().unwrap();
        transformer.flush().unwrap();

        assert_eq!(
            fx.checkpoints
                .watermark(watched(), Stage::Transform)
                .unwrap(),
            10
        );
        assert_eq!(fx.ledger_ids(), ledger_before);
    }

    #[test]
    fn test_incremental_passes_match_single_pass() {
        let batch = [
            lend_txn("0xaaa", 10, 0),
            lend_txn("0xbbb", 11, 1),
            lend_txn("0xccc", 12, 2),
        ];

        // Single pass over everything.
        let single = Fixture::new();
        single.raw.append(watched(), &batch).unwrap();
        let mut transformer = single.transformer(HandlerKind::CollateralFreeRentals);
        transformer.transform().unwrap();
        transformer.flush().unwrap();

        // Incremental passes over growing prefixes.
        let incremental = Fixture::new();
        let mut transformer = incremental.transformer(HandlerKind::CollateralFreeRentals);
        for txn in &batch {
            incremental
                .raw
                .append(watched(), std::slice::from_ref(txn))
                .unwrap();
            transformer.transform().unwrap();
            transformer.flush().unwrap();
        }

        assert_eq!(
            single
                .store
                .get_all_items(&state_collection(watched()))
                .unwrap(),
            incremental
                .store
                .get_all_items(&state_collection(watched()))
                .unwrap()
        );
    }

    #[test]
    fn test_unrecognized_transactions_still_advance_checkpoint() {
        let fx = Fixture::new();
        fx.raw
            .append(
                watched(),
                &[txn(
                    "0xaaa",
                    10,
                    vec![decoded_event(
                        0,
                        &WATCHED.to_lowercase(),
                        "Approval",
                        vec![("owner", "address", true, json!("0xcafe"))],
                    )],
                )],
            )
            .unwrap();

        let mut transformer = fx.transformer(HandlerKind::CollateralFreeRentals);
        transformer.transform().unwrap();

        assert_eq!(
            fx.checkpoints
                .watermark(watched(), Stage::Transform)
                .unwrap(),
            10
        );
        assert!(fx.ledger_ids().is_empty());
    }

    #[test]
    fn test_handler_failure_leaves_checkpoint_and_state_untouched() {
        let fx = Fixture::new();

        // A transfer from an address with no holdings is a hard handler
        // error for the multiset aggregate.
        fx.raw
            .append(
                watched(),
                &[txn(
                    "0xaaa",
                    10,
                    vec![decoded_event(
                        0,
                        &WATCHED.to_lowercase(),
                        "Transfer",
                        vec![
                            ("from", "address", true, json!("0x00000000000000000000000000000000000a11ce")),
                            ("to", "address", true, json!("0x0000000000000000000000000000000000000b0b")),
                            ("tokenId", "uint256", true, json!("7")),
                        ],
                    )],
                )],
            )
            .unwrap();

        let mut transformer = fx.transformer(HandlerKind::TokenHolders);
        assert!(transformer.transform().is_err());
        transformer.flush().unwrap();

        assert_eq!(
            fx.checkpoints
                .watermark(watched(), Stage::Transform)
                .unwrap(),
            0
        );
        assert_eq!(
            fx.store
                .get_any_item(&state_collection(watched()))
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_failed_batch_is_replayed_from_the_old_watermark() {
        let fx = Fixture::new();

        // Mint in block 10, poisoned transfer in block 11: the whole batch
        // fails, and a retry replays from block 10 again without
        // double-applying the mint into stale in-memory state.
        fx.raw
            .append(
                watched(),
                &[
                    txn(
                        "0xaaa",
                        10,
                        vec![decoded_event(
                            0,
                            &WATCHED.to_lowercase(),
                            "Transfer",
                            vec![
                                ("from", "address", true, json!("0x0000000000000000000000000000000000000000")),
                                ("to", "address", true, json!("0x00000000000000000000000000000000000a11ce")),
                                ("tokenId", "uint256", true, json!("7")),
                            ],
                        )],
                    ),
                    txn(
                        "0xbbb",
                        11,
                        vec![decoded_event(
                            0,
                            &WATCHED.to_lowercase(),
                            "Transfer",
                            vec![
                                ("from", "address", true, json!("0x0000000000000000000000000000000000000bad")),
                                ("to", "address", true, json!("0x0000000000000000000000000000000000000b0b")),
                                ("tokenId", "uint256", true, json!("9")),
                            ],
                        )],
                    ),
                ],
            )
            .unwrap();

        let mut transformer = fx.transformer(HandlerKind::TokenHolders);
        assert!(transformer.transform().is_err());
        assert!(transformer.transform().is_err());

        assert_eq!(
            fx.checkpoints
                .watermark(watched(), Stage::Transform)
                .unwrap(),
            0
        );
        // Nothing was flushed along the way.
        assert_eq!(
            fx.store
                .get_item(&state_collection(watched()), AGGREGATE_DOC_ID)
                .unwrap(),
            None
        );
    }
}

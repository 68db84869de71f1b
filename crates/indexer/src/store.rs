//! Embedded document store and the typed collections built on it.
//!
//! Collections are key ranges inside a single sled keyspace; values are JSON
//! documents so the read-only query layer sees stable, self-describing
//! shapes. All writes are upserts by document id, which is what makes
//! re-ingestion and replay-after-crash idempotent at the storage layer.

use std::{
    path::Path,
    sync::{
        Arc,
        Mutex,
    },
};

use alloy_primitives::Address;
use covalent_client::RawTransaction;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;

use crate::error::StoreError;

/// Separator between the collection name and the document id in a sled key.
/// Collection names and ids are hex strings and fixed suffixes, which never
/// contain a NUL byte.
const KEY_SEPARATOR: u8 = 0;

/// Generic keyed-document collection interface consumed by the engines and
/// handlers. Mirrors a document database: upsert by id, point reads, full
/// collection scans.
pub trait DocumentStore: Send + Sync {
    fn put_item(&self, collection: &str, id: &str, doc: &Value) -> Result<(), StoreError>;

    fn put_items(&self, collection: &str, docs: &[(String, Value)]) -> Result<(), StoreError>;

    fn get_item(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// All documents in the collection, in id order.
    fn get_all_items(&self, collection: &str) -> Result<Vec<Value>, StoreError>;

    /// Any single document, used to probe collection existence.
    fn get_any_item(&self, collection: &str) -> Result<Option<Value>, StoreError>;
}

/// sled-backed [`DocumentStore`].
#[derive(Clone)]
pub struct SledStore {
    // sled's alpha `Db` is `Send` but not `Sync` (its internal epoch-based
    // reclaimer holds a `RefCell`), so a bare `Db` cannot satisfy the
    // `DocumentStore: Send + Sync` contract. Guard it behind a mutex; the
    // store is only ever driven from a single task, so the lock never
    // contends and observable behavior is unchanged.
    db: Arc<Mutex<sled::Db>>,
}

impl SledStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::Config::new().path(path).open()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn doc_key(collection: &str, id: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(collection.len() + 1 + id.len());
        key.extend_from_slice(collection.as_bytes());
        key.push(KEY_SEPARATOR);
        key.extend_from_slice(id.as_bytes());
        key
    }

    fn collection_prefix(collection: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(collection.len() + 1);
        prefix.extend_from_slice(collection.as_bytes());
        prefix.push(KEY_SEPARATOR);
        prefix
    }
}

impl DocumentStore for SledStore {
    fn put_item(&self, collection: &str, id: &str, doc: &Value) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(doc)?;
        self.db
            .lock()
            .unwrap()
            .insert(Self::doc_key(collection, id), bytes)?;
        Ok(())
    }

    fn put_items(&self, collection: &str, docs: &[(String, Value)]) -> Result<(), StoreError> {
        for (id, doc) in docs {
            self.put_item(collection, id, doc)?;
        }
        Ok(())
    }

    fn get_item(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        match self.db.lock().unwrap().get(Self::doc_key(collection, id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_all_items(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let prefix = Self::collection_prefix(collection);
        let mut docs = Vec::new();

        let db = self.db.lock().unwrap();
        for entry in db.iter() {
            let (key, value) = entry?;
            if key.as_ref().starts_with(&prefix) {
                docs.push(serde_json::from_slice(&value)?);
            }
        }

        Ok(docs)
    }

    fn get_any_item(&self, collection: &str) -> Result<Option<Value>, StoreError> {
        let prefix = Self::collection_prefix(collection);

        let db = self.db.lock().unwrap();
        for entry in db.iter() {
            let (key, value) = entry?;
            if key.as_ref().starts_with(&prefix) {
                return Ok(Some(serde_json::from_slice(&value)?));
            }
        }

        Ok(None)
    }
}

/// Pipeline stage owning a checkpoint, used to scope checkpoint collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Transform,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Transform => "transform",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointDoc {
    block_height: u64,
}

/// Single-document-per-(address, stage) watermark storage.
///
/// A watermark of 0 means "nothing processed yet"; it is indistinguishable
/// from "caught up with nothing new", and callers treat both as "start from
/// the beginning". Values never decrease.
#[derive(Clone)]
pub struct CheckpointStore {
    store: Arc<dyn DocumentStore>,
}

impl CheckpointStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn collection(address: Address, stage: Stage) -> String {
        format!("{address:#x}-{}-checkpoint", stage.as_str())
    }

    pub fn watermark(&self, address: Address, stage: Stage) -> Result<u64, StoreError> {
        match self.store.get_any_item(&Self::collection(address, stage))? {
            Some(doc) => {
                let doc: CheckpointDoc = serde_json::from_value(doc)?;
                Ok(doc.block_height)
            }
            None => Ok(0),
        }
    }

    pub fn set_watermark(
        &self,
        address: Address,
        stage: Stage,
        block_height: u64,
    ) -> Result<(), StoreError> {
        let doc = serde_json::to_value(CheckpointDoc { block_height })?;
        // One document per (address, stage), always under the same id.
        self.store
            .put_item(&Self::collection(address, stage), "1", &doc)
    }
}

/// Append/dedupe storage for raw transactions, keyed by transaction hash.
#[derive(Clone)]
pub struct RawTransactionStore {
    store: Arc<dyn DocumentStore>,
}

impl RawTransactionStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn collection(address: Address) -> String {
        format!("{address:#x}-transactions")
    }

    pub fn contains(&self, address: Address, tx_hash: &str) -> Result<bool, StoreError> {
        Ok(self
            .store
            .get_item(&Self::collection(address), tx_hash)?
            .is_some())
    }

    /// Upsert a batch of raw transactions by hash.
    pub fn append(&self, address: Address, batch: &[RawTransaction]) -> Result<(), StoreError> {
        let docs = batch
            .iter()
            .map(|txn| Ok((txn.tx_hash.clone(), serde_json::to_value(txn)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        self.store.put_items(&Self::collection(address), &docs)
    }

    /// All stored transactions strictly above `block_height`, ascending by
    /// block height (transaction hash breaks ties deterministically).
    pub fn transactions_above(
        &self,
        address: Address,
        block_height: u64,
    ) -> Result<Vec<RawTransaction>, StoreError> {
        let mut txns = self
            .store
            .get_all_items(&Self::collection(address))?
            .into_iter()
            .map(serde_json::from_value::<RawTransaction>)
            .collect::<Result<Vec<_>, _>>()?;

        txns.retain(|txn| txn.block_height > block_height);
        txns.sort_by(|a, b| {
            a.block_height
                .cmp(&b.block_height)
                .then_with(|| a.tx_hash.cmp(&b.tx_hash))
        });

        Ok(txns)
    }
}

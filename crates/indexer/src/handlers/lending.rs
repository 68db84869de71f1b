//! Append-only ledger for the collateralized lending contract.
//!
//! Every recognized event becomes one normalized ledger entry; entries are
//! never mutated or removed. `Lent` carries two `bytes4` packed prices that
//! are unpacked into decimals before the record is appended.

use covalent_client::RawLogEvent;

use super::{
    Aggregate,
    ledger::{
        LedgerRecord,
        build_record,
        load_records,
        persist_records,
        unpack_price_field,
    },
    named_event,
};
use crate::{
    decode::decode_params,
    error::HandlerError,
    store::DocumentStore,
};

const LENT_FIELDS: [&str; 10] = [
    "nftAddress",
    "tokenId",
    "lentAmount",
    "lendingId",
    "lendersAddress",
    "maxRentDuration",
    "dailyRentPrice",
    "nftPrice",
    "isERC721",
    "paymentToken",
];
const RENTED_FIELDS: [&str; 4] = ["lendingId", "renterAddress", "rentDuration", "rentedAt"];
const RETURNED_FIELDS: [&str; 2] = ["lendingId", "returnedAt"];
const LENDING_STOPPED_FIELDS: [&str; 2] = ["lendingId", "stoppedAt"];
const COLLATERAL_CLAIMED_FIELDS: [&str; 2] = ["lendingId", "claimedAt"];

#[derive(Debug, Default)]
pub struct CollateralizedLending {
    records: Vec<LedgerRecord>,
}

impl CollateralizedLending {
    pub fn records(&self) -> &[LedgerRecord] {
        &self.records
    }
}

impl Aggregate for CollateralizedLending {
    fn load(store: &dyn DocumentStore, collection: &str) -> Result<Self, HandlerError> {
        Ok(Self {
            records: load_records(store, collection)?,
        })
    }

    fn persist(&self, store: &dyn DocumentStore, collection: &str) -> Result<(), HandlerError> {
        persist_records(&self.records, store, collection)
    }

    fn apply(&mut self, event: &RawLogEvent, event_id: &str) -> Result<bool, HandlerError> {
        let Some(log) = named_event(event) else {
            return Ok(false);
        };

        let fields: &[&str] = match log.name.as_str() {
            "Lent" => &LENT_FIELDS,
            "Rented" => &RENTED_FIELDS,
            "Returned" => &RETURNED_FIELDS,
            "LendingStopped" => &LENDING_STOPPED_FIELDS,
            "CollateralClaimed" => &COLLATERAL_CLAIMED_FIELDS,
            _ => return Ok(false),
        };

        let params = decode_params(log, &event.raw_log_topics)?;
        let mut record = build_record(&log.name, event_id, fields, params)?;

        if log.name == "Lent" {
            unpack_price_field(&mut record, "dailyRentPrice")?;
            unpack_price_field(&mut record, "nftPrice")?;
        }

        self.records.push(record);
        Ok(true)
    }
}

//! Append-only ledger for the collateral-free rental contract.
//!
//! Same ledger mechanics as the collateralized generation, with that
//! contract family's event set and field lists. Only `Lend` carries a packed
//! price here.

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

const LEND_FIELDS: [&str; 9] = [
    "is721",
    "lenderAddress",
    "nftAddress",
    "tokenID",
    "lendingID",
    "maxRentDuration",
    "dailyRentPrice",
    "lendAmount",
    "paymentToken",
];
const RENT_FIELDS: [&str; 6] = [
    "renterAddress",
    "lendingID",
    "rentingID",
    "rentAmount",
    "rentDuration",
    "rentedAt",
];
const STOP_LEND_FIELDS: [&str; 2] = ["lendingID", "stoppedAt"];
const STOP_RENT_FIELDS: [&str; 2] = ["rentingID", "stoppedAt"];
const RENT_CLAIMED_FIELDS: [&str; 2] = ["rentingID", "collectedAt"];

#[derive(Debug, Default)]
pub struct CollateralFreeRentals {
    records: Vec<LedgerRecord>,
}

impl CollateralFreeRentals {
    pub fn records(&self) -> &[LedgerRecord] {
        &self.records
    }
}

impl Aggregate for CollateralFreeRentals {
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
            "Lend" => &LEND_FIELDS,
            "Rent" => &RENT_FIELDS,
            "StopLend" => &STOP_LEND_FIELDS,
            "StopRent" => &STOP_RENT_FIELDS,
            "RentClaimed" => &RENT_CLAIMED_FIELDS,
            _ => return Ok(false),
        };

        let params = decode_params(log, &event.raw_log_topics)?;
        let mut record = build_record(&log.name, event_id, fields, params)?;

        if log.name == "Lend" {
            unpack_price_field(&mut record, "dailyRentPrice")?;
        }

        self.records.push(record);
        Ok(true)
    }
}

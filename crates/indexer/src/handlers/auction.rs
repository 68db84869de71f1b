//! Per-bidder running totals for auction bids.
//!
//! The upstream decoder never names this contract's events, so recognition
//! goes through the raw topics: topic 0 is matched against the `PlaceBid`
//! event signature, the bidder and wei amount come out of topics 1 and 2.
//! Bids are always denominated in ether.

use std::collections::BTreeMap;

use alloy_primitives::Address;
use covalent_client::RawLogEvent;
use rust_decimal::Decimal;

use super::{
    AGGREGATE_DOC_ID,
    Aggregate,
};
use crate::{
    decode::{
        address_from_topic,
        uint256_from_topic,
        wei_to_ether,
    },
    error::{
        DecodeError,
        HandlerError,
        StoreError,
    },
    store::DocumentStore,
};

/// Signature topic of `PlaceBid(address indexed bidder, uint256 indexed price)`.
const PLACE_BID_TOPIC: &str = "0xe694ab314354b7ccad603c48b44dce6ade8b6a57cbebaa8842edd9a2fb2856f8";

#[derive(Debug, Default)]
pub struct AuctionBids {
    totals: BTreeMap<Address, Decimal>,
}

impl AuctionBids {
    pub fn total(&self, bidder: Address) -> Option<Decimal> {
        self.totals.get(&bidder).copied()
    }
}

impl Aggregate for AuctionBids {
    fn load(store: &dyn DocumentStore, collection: &str) -> Result<Self, HandlerError> {
        let totals = match store
            .get_item(collection, AGGREGATE_DOC_ID)
            .map_err(HandlerError::Store)?
        {
            Some(doc) => serde_json::from_value(doc)
                .map_err(|err| HandlerError::Store(StoreError::Serde(err)))?,
            None => BTreeMap::new(),
        };
        Ok(Self { totals })
    }

    fn persist(&self, store: &dyn DocumentStore, collection: &str) -> Result<(), HandlerError> {
        let doc = serde_json::to_value(&self.totals).map_err(StoreError::from)?;
        store
            .put_item(collection, AGGREGATE_DOC_ID, &doc)
            .map_err(HandlerError::Store)
    }

    fn apply(&mut self, event: &RawLogEvent, _event_id: &str) -> Result<bool, HandlerError> {
        let topics = &event.raw_log_topics;
        match topics.first() {
            Some(signature) if signature.eq_ignore_ascii_case(PLACE_BID_TOPIC) => {}
            _ => return Ok(false),
        }

        let bidder_topic = topics.get(1).ok_or(DecodeError::MissingTopic {
            index: 1,
            name: "bidder".to_string(),
        })?;
        let price_topic = topics.get(2).ok_or(DecodeError::MissingTopic {
            index: 2,
            name: "price".to_string(),
        })?;

        let bidder = address_from_topic(bidder_topic)?;
        let amount = wei_to_ether(uint256_from_topic(price_topic)?)?;

        *self.totals.entry(bidder).or_insert(Decimal::ZERO) += amount;
        Ok(true)
    }
}

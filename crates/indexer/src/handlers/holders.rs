//! Token holdings per address for an NFT collection, driven by `Transfer`.
//!
//! A transfer from the zero address is a mint and only credits the receiver.
//! Any other transfer must find the token id under the sender: a missing
//! sender entry or missing id means the replayed stream is inconsistent with
//! the aggregate, and that is a hard error rather than a silent divergence.

use std::collections::BTreeMap;

use alloy_primitives::{
    Address,
    U256,
};
use covalent_client::RawLogEvent;

use super::{
    AGGREGATE_DOC_ID,
    Aggregate,
    named_event,
};
use crate::{
    decode::{
        decode_params,
        param_address,
        param_u256,
    },
    error::{
        DecodeError,
        HandlerError,
        StoreError,
    },
    store::DocumentStore,
};

#[derive(Debug, Default)]
pub struct TokenHolders {
    holders: BTreeMap<Address, Vec<U256>>,
}

impl TokenHolders {
    pub fn holdings(&self, address: Address) -> Option<&[U256]> {
        self.holders.get(&address).map(Vec::as_slice)
    }

    fn on_transfer(
        &mut self,
        from: Address,
        to: Address,
        token_id: U256,
    ) -> Result<(), HandlerError> {
        if from != Address::ZERO {
            let Some(owned) = self.holders.get_mut(&from) else {
                return Err(HandlerError::InconsistentAggregate(format!(
                    "transfer of token {token_id} from {from} which holds nothing"
                )));
            };
            let Some(position) = owned.iter().position(|id| *id == token_id) else {
                return Err(HandlerError::InconsistentAggregate(format!(
                    "transfer of token {token_id} from {from} which does not hold it"
                )));
            };

            owned.remove(position);
            if owned.is_empty() {
                self.holders.remove(&from);
            }
        }

        self.holders.entry(to).or_default().push(token_id);
        Ok(())
    }
}

impl Aggregate for TokenHolders {
    fn load(store: &dyn DocumentStore, collection: &str) -> Result<Self, HandlerError> {
        let holders = match store
            .get_item(collection, AGGREGATE_DOC_ID)
            .map_err(HandlerError::Store)?
        {
            Some(doc) => serde_json::from_value(doc)
                .map_err(|err| HandlerError::Store(StoreError::Serde(err)))?,
            None => BTreeMap::new(),
        };
        Ok(Self { holders })
    }

    fn persist(&self, store: &dyn DocumentStore, collection: &str) -> Result<(), HandlerError> {
        let doc = serde_json::to_value(&self.holders).map_err(StoreError::from)?;
        store
            .put_item(collection, AGGREGATE_DOC_ID, &doc)
            .map_err(HandlerError::Store)
    }

    fn apply(&mut self, event: &RawLogEvent, _event_id: &str) -> Result<bool, HandlerError> {
        let Some(log) = named_event(event) else {
            return Ok(false);
        };

        if log.name != "Transfer" {
            return Ok(false);
        }

        let params = decode_params(log, &event.raw_log_topics)?;
        let [from, to, token_id] = params.as_slice() else {
            return Err(DecodeError::ParamCount {
                name: log.name.clone(),
                expected: 3,
                got: params.len(),
            }
            .into());
        };

        self.on_transfer(
            param_address(from)?,
            param_address(to)?,
            param_u256(token_id)?,
        )?;
        Ok(true)
    }
}

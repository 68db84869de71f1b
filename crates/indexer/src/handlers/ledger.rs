//! Shared mechanics for the append-only ledger aggregates.
//!
//! Ledger aggregates persist as one document per event, keyed by the
//! deterministic event id. Upserting by id makes re-applying an
//! already-persisted batch a no-op at the storage layer.

use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Map,
    Value,
};

use crate::{
    decode::{
        DecodedParam,
        unpack_price,
    },
    error::{
        DecodeError,
        HandlerError,
        StoreError,
    },
    store::DocumentStore,
};

/// One normalized ledger entry: the event name, its deterministic id, and
/// the event's named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub event: String,
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Zip decoded parameters with a contract's fixed field list for the event.
pub(super) fn build_record(
    name: &str,
    id: &str,
    field_names: &[&str],
    params: Vec<DecodedParam>,
) -> Result<LedgerRecord, HandlerError> {
    if params.len() != field_names.len() {
        return Err(DecodeError::ParamCount {
            name: name.to_string(),
            expected: field_names.len(),
            got: params.len(),
        }
        .into());
    }

    let fields = field_names
        .iter()
        .zip(params)
        .map(|(field, param)| ((*field).to_string(), param.value.to_json()))
        .collect();

    Ok(LedgerRecord {
        event: name.to_string(),
        id: id.to_string(),
        fields,
    })
}

/// Replace a base64-packed `bytes4` price field with its unpacked decimal.
pub(super) fn unpack_price_field(
    record: &mut LedgerRecord,
    field: &str,
) -> Result<(), HandlerError> {
    let price = {
        let packed = record
            .fields
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| DecodeError::UnexpectedValue {
                name: field.to_string(),
            })?;
        unpack_price(packed)?
    };

    let value = serde_json::to_value(price).map_err(StoreError::from)?;
    record.fields.insert(field.to_string(), value);
    Ok(())
}

pub(super) fn load_records(
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<Vec<LedgerRecord>, HandlerError> {
    store
        .get_all_items(collection)
        .map_err(HandlerError::Store)?
        .into_iter()
        .map(|doc| serde_json::from_value(doc).map_err(|err| HandlerError::Store(err.into())))
        .collect()
}

pub(super) fn persist_records(
    records: &[LedgerRecord],
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<(), HandlerError> {
    let docs = records
        .iter()
        .map(|record| Ok((record.id.clone(), serde_json::to_value(record)?)))
        .collect::<Result<Vec<_>, serde_json::Error>>()
        .map_err(StoreError::from)?;

    store
        .put_items(collection, &docs)
        .map_err(HandlerError::Store)
}

//! Log-event decoding helpers.
//!
//! The upstream indexer decodes most event parameters itself; those values
//! are used verbatim. Parameters it could not decode are recovered from the
//! raw indexed topics (topic 0 is the event signature, so parameter `i` maps
//! to topic `i + 1`). Anything else is a hard error: a silently skipped
//! parameter would corrupt aggregate state, which is strictly worse than a
//! loud failure.

use alloy_primitives::{
    Address,
    B256,
    U256,
};
use base64::Engine;
use rust_decimal::Decimal;
use serde_json::Value;

use covalent_client::{
    DecodedLog,
    LogParam,
};

use crate::error::DecodeError;

/// One decoded event parameter, in upstream schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedParam {
    pub name: String,
    pub value: ParamValue,
}

/// A parameter value: either the upstream-decoded JSON verbatim, or an
/// integer recovered from a raw topic.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Verbatim(Value),
    Uint(U256),
}

impl ParamValue {
    /// JSON representation used in persisted documents. Recovered integers
    /// are rendered as decimal strings, matching how the upstream encodes
    /// `uint256` values it decodes itself.
    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Verbatim(value) => value.clone(),
            ParamValue::Uint(value) => Value::String(value.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Verbatim(Value::String(s)) => Some(s),
            _ => None,
        }
    }
}

/// Decode all parameters of an upstream-decoded log, in schema order.
pub fn decode_params(
    log: &DecodedLog,
    raw_log_topics: &[String],
) -> Result<Vec<DecodedParam>, DecodeError> {
    log.params
        .iter()
        .enumerate()
        .map(|(ix, param)| {
            let value = decode_param(ix, param, raw_log_topics)?;
            Ok(DecodedParam {
                name: param.name.clone(),
                value,
            })
        })
        .collect()
}

fn decode_param(
    ix: usize,
    param: &LogParam,
    raw_log_topics: &[String],
) -> Result<ParamValue, DecodeError> {
    if param.decoded {
        return Ok(ParamValue::Verbatim(param.value.clone()));
    }

    match param.ty.as_str() {
        "uint256" => {
            let topic_index = ix + 1;
            let topic =
                raw_log_topics
                    .get(topic_index)
                    .ok_or_else(|| DecodeError::MissingTopic {
                        index: topic_index,
                        name: param.name.clone(),
                    })?;
            Ok(ParamValue::Uint(uint256_from_topic(topic)?))
        }
        other => Err(DecodeError::UnsupportedType {
            name: param.name.clone(),
            ty: other.to_string(),
        }),
    }
}

/// Parse a 32-byte topic as a big-endian unsigned 256-bit integer.
pub fn uint256_from_topic(topic: &str) -> Result<U256, DecodeError> {
    let digits = topic.strip_prefix("0x").unwrap_or(topic);
    U256::from_str_radix(digits, 16).map_err(|_| DecodeError::InvalidTopic(topic.to_string()))
}

/// Parse an address out of a 32-byte topic (addresses are left-padded).
pub fn address_from_topic(topic: &str) -> Result<Address, DecodeError> {
    let word: B256 = topic
        .parse()
        .map_err(|_| DecodeError::InvalidTopic(topic.to_string()))?;
    Ok(Address::from_word(word))
}

/// Extract an address-valued parameter.
pub fn param_address(param: &DecodedParam) -> Result<Address, DecodeError> {
    param
        .value
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| DecodeError::UnexpectedValue {
            name: param.name.clone(),
        })
}

/// Extract an unsigned-integer parameter. Upstream-decoded integers arrive
/// as decimal strings or JSON numbers.
pub fn param_u256(param: &DecodedParam) -> Result<U256, DecodeError> {
    let unexpected = || DecodeError::UnexpectedValue {
        name: param.name.clone(),
    };

    match &param.value {
        ParamValue::Uint(value) => Ok(*value),
        ParamValue::Verbatim(Value::String(s)) => {
            U256::from_str_radix(s, 10).map_err(|_| unexpected())
        }
        ParamValue::Verbatim(Value::Number(n)) => {
            n.as_u64().map(U256::from).ok_or_else(unexpected)
        }
        _ => Err(unexpected()),
    }
}

/// Unpack a base64-encoded `bytes4` fixed-point price.
///
/// The four bytes pack two big-endian `u16` halves: the whole part and a
/// fractional part scaled by 10,000. `0x00011F40` is 1 + 8000/10000 = 1.8.
/// The result is exact decimal arithmetic rounded to 4 places, so identical
/// input bytes always produce the identical value.
pub fn unpack_price(packed: &str) -> Result<Decimal, DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(packed)?;
    if bytes.len() != 4 {
        return Err(DecodeError::InvalidPriceWidth(bytes.len()));
    }

    let whole = u16::from_be_bytes([bytes[0], bytes[1]]);
    let fraction = u16::from_be_bytes([bytes[2], bytes[3]]);

    let price = Decimal::from(whole) + Decimal::new(i64::from(fraction), 4);
    Ok(price.round_dp(4))
}

/// Convert a wei amount to ether as an exact decimal.
pub fn wei_to_ether(wei: U256) -> Result<Decimal, DecodeError> {
    let wei = u128::try_from(wei).map_err(|_| DecodeError::AmountOverflow)?;
    Decimal::try_from_i128_with_scale(wei as i128, 18)
        .map(|d| d.normalize())
        .map_err(|_| DecodeError::AmountOverflow)
}

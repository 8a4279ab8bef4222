//! JSON wire format shared with the gossip network and the relay
//!
//! Peers serialize 256-bit integers as ethers BigNumber objects
//! (`{"type":"BigNumber","hex":"0x.."}`); older clients sent hex or decimal
//! strings. Everything is accepted, BigNumber objects are emitted.

use super::order::Order;
use ethers::types::U256;
use serde_json::Value;
use tracing::debug;

/// Parse a 256-bit integer from any of the accepted JSON shapes
pub fn parse_u256(value: &Value) -> std::result::Result<U256, String> {
    match value {
        Value::String(text) => parse_u256_str(text),
        Value::Number(number) => {
            let text = number.to_string();
            U256::from_dec_str(&text).map_err(|e| format!("invalid integer {}: {:?}", text, e))
        }
        Value::Object(map) => {
            let hex = map
                .get("hex")
                .or_else(|| map.get("_hex"))
                .and_then(Value::as_str)
                .ok_or_else(|| "BigNumber object without hex field".to_string())?;
            parse_u256_str(hex)
        }
        other => Err(format!("unexpected integer value: {}", other)),
    }
}

fn parse_u256_str(text: &str) -> std::result::Result<U256, String> {
    let trimmed = text.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        if hex.is_empty() {
            return Ok(U256::zero());
        }
        U256::from_str_radix(hex, 16).map_err(|e| format!("invalid hex {}: {:?}", text, e))
    } else {
        U256::from_dec_str(trimmed).map_err(|e| format!("invalid decimal {}: {:?}", text, e))
    }
}

/// Serde adapter for `U256` fields on the wire
pub mod u256_lenient {
    use super::parse_u256;
    use ethers::types::U256;
    use serde::de::Error as _;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("type", "BigNumber")?;
        map.serialize_entry("hex", &format!("{:#x}", value))?;
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        parse_u256(&value).map_err(D::Error::custom)
    }
}

/// A payload element looks like an order when it carries a string hash
pub fn is_order(candidate: &Value) -> bool {
    candidate.get("hash").map(Value::is_string).unwrap_or(false)
}

/// Gossip predicate: the payload is an array of order-looking objects
pub fn is_order_array(payload: &Value) -> bool {
    payload
        .as_array()
        .map(|items| items.iter().all(is_order))
        .unwrap_or(false)
}

/// Decode every order of a payload array, dropping elements that do not decode
pub fn decode_orders(payload: &Value) -> Vec<Order> {
    let Some(items) = payload.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            if !is_order(item) {
                debug!("Dropping payload element without hash");
                return None;
            }
            match serde_json::from_value::<Order>(item.clone()) {
                Ok(order) => Some(order),
                Err(e) => {
                    debug!(
                        hash = item.get("hash").and_then(|hash| hash.as_str()).unwrap_or_default(),
                        error = %e,
                        "Dropping undecodable order"
                    );
                    None
                }
            }
        })
        .collect()
}

/// Encode orders as a JSON array payload
pub fn encode_orders(orders: &[Order]) -> serde_json::Result<Value> {
    serde_json::to_value(orders)
}

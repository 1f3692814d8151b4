//! List response normalization.
//!
//! List endpoints grew up independently and do not agree on a shape. This
//! module is the one place that knows the variants, with a fixed precedence:
//!
//! 1. A bare JSON array is the item list; the total is its length.
//! 2. In an object, items come from the first array among `items`,
//!    `donations`, `results`, `data`.
//! 3. The total comes from the first non-negative integer among
//!    `total_count`, `total`, `count`, else the number of items.
//!
//! Bump `LIST_SHAPE_VERSION` whenever the precedence changes.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::ApiError;

pub const LIST_SHAPE_VERSION: u32 = 1;

const ITEM_KEYS: &[&str] = &["items", "donations", "results", "data"];
const TOTAL_KEYS: &[&str] = &["total_count", "total", "count"];

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
}

impl Page<Value> {
    /// Deserialize every item into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<Page<T>, ApiError> {
        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                serde_json::from_value(item).map_err(|e| {
                    ApiError::InvalidResponse(format!(
                        "list item {index} has unexpected shape: {e}"
                    ))
                })
            })
            .collect::<Result<Vec<T>, ApiError>>()?;
        Ok(Page {
            items,
            total_count: self.total_count,
        })
    }
}

pub fn normalize_list(payload: &Value) -> Result<Page<Value>, ApiError> {
    match payload {
        Value::Array(items) => Ok(Page {
            items: items.clone(),
            total_count: items.len(),
        }),
        Value::Object(map) => {
            let items = ITEM_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_array))
                .ok_or_else(|| {
                    ApiError::InvalidResponse(format!(
                        "list response has none of {}",
                        ITEM_KEYS.join(", ")
                    ))
                })?
                .clone();
            let total_count = TOTAL_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_u64))
                .map(|total| usize::try_from(total).unwrap_or(usize::MAX))
                .unwrap_or(items.len());
            Ok(Page { items, total_count })
        }
        other => Err(ApiError::InvalidResponse(format!(
            "list response must be an array or object, got {}",
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//! List response helpers
//!
//! Yeastar builds return list endpoints in different shapes. These helpers
//! find the item array and decide whether another page exists.

use serde_json::Value as JsonValue;

const ITEM_KEYS: &[&str] = &["data", "items", "list", "records", "result"];
const NESTED_ITEM_KEYS: &[&str] = &["items", "list", "records", "data"];
const TOTAL_KEYS: &[&str] = &["total", "total_count", "count"];

/// Items of a list response, looked up one level deep
pub fn extract_items(payload: &JsonValue) -> Vec<JsonValue> {
    for key in ITEM_KEYS {
        match payload.get(*key) {
            Some(JsonValue::Array(items)) => return items.clone(),
            Some(JsonValue::Object(inner)) => {
                if let Some(items) = NESTED_ITEM_KEYS
                    .iter()
                    .find_map(|k| inner.get(*k).and_then(JsonValue::as_array))
                {
                    return items.clone();
                }
            }
            _ => {}
        }
    }
    Vec::new()
}

/// Whether a page after `page` (1-based) exists
///
/// Uses the reported total when present, otherwise assumes more data
/// follows a full page.
pub fn has_more(payload: &JsonValue, page: u32, page_size: u32, got: usize) -> bool {
    let total = TOTAL_KEYS
        .iter()
        .find_map(|k| payload.get(*k).and_then(JsonValue::as_u64));

    match total {
        Some(total) => u64::from(page) * u64::from(page_size) < total,
        None => got >= page_size as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_items_shapes() {
        assert_eq!(extract_items(&json!({"data": [1, 2]})).len(), 2);
        assert_eq!(extract_items(&json!({"result": {"list": [1, 2, 3]}})).len(), 3);
        assert_eq!(extract_items(&json!({"errcode": 0, "records": []})).len(), 0);
        assert!(extract_items(&json!({"data": {"other": 1}})).is_empty());
        assert!(extract_items(&json!("nope")).is_empty());
    }

    #[test]
    fn test_has_more_with_total() {
        let payload = json!({"total": 250});
        assert!(has_more(&payload, 1, 100, 100));
        assert!(has_more(&payload, 2, 100, 100));
        assert!(!has_more(&payload, 3, 100, 50));
    }

    #[test]
    fn test_has_more_without_total() {
        assert!(has_more(&json!({}), 1, 100, 100));
        assert!(!has_more(&json!({}), 1, 100, 99));
    }
}

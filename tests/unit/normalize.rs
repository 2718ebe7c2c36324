//! Tests for record normalization

use market_data_extractor::fetcher::normalize::{
    decode_csv, decode_json, normalize_key, surrogate_key, SURROGATE_KEY_FIELD,
};
use market_data_extractor::fetcher::PayloadShape;
use serde_json::json;

#[test]
fn test_nested_keys_normalize_to_lower_snake_case() {
    let page = decode_json(r#"{"FooBarID": 1, "child": {"SomeXYZValue": 2}}"#).unwrap();
    assert_eq!(page.records.len(), 1);

    let record = &page.records[0];
    assert_eq!(record["foo_bar_id"], json!(1));
    assert_eq!(record["child"]["some_xyz_value"], json!(2));
    assert!(record.get("FooBarID").is_none());
}

#[test]
fn test_key_normalization_is_stable() {
    for key in ["AdjustedClose", "adjusted_close", "Adjusted Close", "adjusted-close"] {
        assert_eq!(normalize_key(key), "adjusted_close", "from {key:?}");
    }
    // Already-normalized keys pass through untouched.
    let once = normalize_key("SomeXYZValue");
    assert_eq!(normalize_key(&once), once);
}

#[test]
fn test_bare_object_promotes_to_single_record() {
    let page = decode_json(r#"{"Code": "AAPL", "Name": "Apple Inc"}"#).unwrap();
    assert_eq!(page.shape, PayloadShape::Object);
    assert_eq!(page.records.len(), 1);
    assert_eq!(page.records[0]["code"], json!("AAPL"));
}

#[test]
fn test_csv_bulk_rows_decode_with_normalized_headers() {
    let body = "Code,Date,Adjusted Close\nAAPL,2024-01-02,185.5\nMSFT,2024-01-02,370.1\n";
    let page = decode_csv(body).unwrap();

    assert_eq!(page.shape, PayloadShape::Rows);
    assert_eq!(page.records.len(), 2);
    assert_eq!(page.records[0]["code"], json!("AAPL"));
    assert_eq!(page.records[1]["adjusted_close"], json!("370.1"));
}

#[test]
fn test_surrogate_key_depends_on_field_values_in_order() {
    let a = decode_json(r#"[{"x": "1", "y": "2"}]"#).unwrap().records.remove(0);
    let b = decode_json(r#"[{"x": "1", "y": "2"}]"#).unwrap().records.remove(0);
    let c = decode_json(r#"[{"x": "2", "y": "1"}]"#).unwrap().records.remove(0);

    assert_eq!(surrogate_key(&a), surrogate_key(&b));
    assert_ne!(surrogate_key(&a), surrogate_key(&c));

    // Valid UUID text, never colliding with a field of the same name
    let parsed = uuid::Uuid::parse_str(&surrogate_key(&a));
    assert!(parsed.is_ok());
    assert!(!a.contains_key(SURROGATE_KEY_FIELD));
}

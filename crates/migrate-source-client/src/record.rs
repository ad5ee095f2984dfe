use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// One key/value record at a given sequence number, as streamed by
/// `EnumerateKeys` (spec.md §6). The wire shape is resolved here as
/// newline-delimited JSON, with the value base64-encoded to keep the format
/// binary-safe while staying within the "invariant-culture string"
/// convention the rest of the persisted/wire surface uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub sn: i64,
    pub key: String,
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

/// Decodes a single newline-delimited-JSON line into a record. Used both for
/// whole-body decoding below and for the chunk-at-a-time decoding
/// `HttpSourceClient::enumerate_keys` does off a streamed response body.
pub fn decode_ndjson_line(line: &str) -> Result<Record, SourceError> {
    serde_json::from_str(line).map_err(|e| SourceError::Decode(e.to_string()))
}

/// Decodes one newline-delimited-JSON response body into its records, in
/// ascending SN order as the worker requires (spec.md §4.3 step 3).
pub fn decode_ndjson(body: &str) -> Result<Vec<Record>, SourceError> {
    let mut records = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        records.push(decode_ndjson_line(line)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_records_in_document_order_and_base64_decodes_values() {
        let body = r#"
            {"sn":1,"key":"a","value":"aGVsbG8="}
            {"sn":2,"key":"b","value":"d29ybGQ="}
        "#;
        let records = decode_ndjson(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sn, 1);
        assert_eq!(records[0].value, b"hello");
        assert_eq!(records[1].key, "b");
        assert_eq!(records[1].value, b"world");
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(decode_ndjson("not json").is_err());
    }

    #[test]
    fn empty_body_decodes_to_no_records() {
        assert_eq!(decode_ndjson("").unwrap(), Vec::new());
    }
}

// Record payloads for the warehouse and for blob storage.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use gcp_client::InsertRow;
use siteaudit_common::NormalizedRecord;

/// Newline-delimited JSON: one object per line, every line terminated.
pub fn to_ndjson<T: Serialize>(records: &[T]) -> serde_json::Result<String> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

/// Single-row streaming insert keyed by the run's job id.
pub fn insert_row(record: &NormalizedRecord, job_id: &str) -> serde_json::Result<InsertRow> {
    Ok(InsertRow {
        insert_id: job_id.to_string(),
        json: serde_json::to_value(record)?,
    })
}

/// Pretty JSON with a one-space indent, the layout used for every JSON blob.
pub fn pretty_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b" "));
    value.serialize(&mut ser)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ndjson_terminates_every_line() {
        let out = to_ndjson(&[json!({"a": 1}), json!({"b": [2]})]).unwrap();
        assert_eq!(out, "{\"a\":1}\n{\"b\":[2]}\n");
        assert_eq!(to_ndjson::<serde_json::Value>(&[]).unwrap(), "");
    }

    #[test]
    fn pretty_json_uses_single_space_indent() {
        let out = pretty_json(&json!({"ebay_thirdPartyIncluded_mobile": {"created": 1}})).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\n \"ebay_thirdPartyIncluded_mobile\": {\n  \"created\": 1\n }\n}"
        );
    }
}

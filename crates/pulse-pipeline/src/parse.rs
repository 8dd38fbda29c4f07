use pulse_core::{PulseError, Result};
use serde_json::{Map, Value};

/// Parse an uploaded bulk file into raw item values.
///
/// The filename extension decides the format; unknown extensions try JSON
/// first, then CSV. An empty payload is an input error.
pub fn parse_bulk_payload(filename: Option<&str>, content: &[u8]) -> Result<Vec<Value>> {
    if content.is_empty() {
        return Err(PulseError::Input("Uploaded file is empty.".to_string()));
    }

    let name = filename.unwrap_or("").to_ascii_lowercase();
    if name.ends_with(".json") {
        return parse_json(content);
    }
    if name.ends_with(".csv") {
        return parse_csv(content);
    }

    if let Ok(items) = parse_json(content) {
        return Ok(items);
    }
    parse_csv(content)
        .map_err(|_| PulseError::Input("Unsupported file format. Use .json or .csv.".to_string()))
}

/// Accepts a top-level array, `{"items": [...]}`, or a single object
/// treated as a one-item list.
fn parse_json(content: &[u8]) -> Result<Vec<Value>> {
    let parsed: Value = serde_json::from_slice(content)
        .map_err(|e| PulseError::Input(format!("Invalid JSON payload: {e}")))?;

    match parsed {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => match obj.remove("items") {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => {
                obj.insert("items".to_string(), other);
                Ok(vec![Value::Object(obj)])
            }
            None => Ok(vec![Value::Object(obj)]),
        },
        _ => Err(PulseError::Input(
            "JSON payload must be an array or an object with 'items'.".to_string(),
        )),
    }
}

/// CSV with a header row; every cell becomes a string field.
fn parse_csv(content: &[u8]) -> Result<Vec<Value>> {
    let mut reader = csv::Reader::from_reader(content);
    let headers = reader
        .headers()
        .map_err(|e| PulseError::Input(format!("Invalid CSV payload: {e}")))?
        .clone();

    let mut items = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| PulseError::Input(format!("Invalid CSV payload: {e}")))?;
        let mut obj = Map::new();
        for (header, field) in headers.iter().zip(row.iter()) {
            obj.insert(header.to_string(), Value::String(field.to_string()));
        }
        items.push(Value::Object(obj));
    }
    Ok(items)
}

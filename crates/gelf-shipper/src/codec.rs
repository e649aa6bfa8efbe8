// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! GELF JSON encoding of [`LogRecord`].
//!
//! A record maps to one JSON object with six fixed keys (`full_message` is
//! omitted when absent) and one `_<name>` key per additional field:
//!
//! ```text
//! {"version":"1.1","host":"web-1","short_message":"boot","timestamp":1700000000.25,
//!  "level":6,"_retry":3,"_ok":true}
//! ```
//!
//! A batch is a JSON array of such objects. The same encoding is used for the
//! request body and for the persisted queue.

use serde_json::{Map, Number, Value};

use crate::error::CodecError;
use crate::record::{FieldValue, LogRecord, GELF_VERSION};

pub const KEY_VERSION: &str = "version";
pub const KEY_HOST: &str = "host";
pub const KEY_SHORT_MESSAGE: &str = "short_message";
pub const KEY_FULL_MESSAGE: &str = "full_message";
pub const KEY_TIMESTAMP: &str = "timestamp";
pub const KEY_LEVEL: &str = "level";

/// Prefix distinguishing additional fields from the fixed keys.
pub const EXTENSION_PREFIX: char = '_';

// GELF reserves `_id` for the collector's own document id.
const RESERVED_EXTENSION: &str = "id";

/// Encodes one record into a GELF JSON object.
pub fn encode_record(record: &LogRecord) -> Result<Map<String, Value>, CodecError> {
    let mut object = Map::with_capacity(6 + record.extensions.len());
    object.insert(KEY_VERSION.to_string(), Value::from(record.version.as_str()));
    object.insert(KEY_HOST.to_string(), Value::from(record.host.as_str()));
    object.insert(
        KEY_SHORT_MESSAGE.to_string(),
        Value::from(record.short_message.as_str()),
    );
    if let Some(full_message) = &record.full_message {
        object.insert(
            KEY_FULL_MESSAGE.to_string(),
            Value::from(full_message.as_str()),
        );
    }
    object.insert(
        KEY_TIMESTAMP.to_string(),
        finite_number(KEY_TIMESTAMP, record.timestamp)?,
    );
    object.insert(KEY_LEVEL.to_string(), Value::from(record.level));

    for (name, value) in &record.extensions {
        validate_field_name(name)?;
        object.insert(
            format!("{EXTENSION_PREFIX}{name}"),
            encode_field(name, value)?,
        );
    }
    Ok(object)
}

/// Encodes a whole batch as a JSON array.
///
/// Either every record encodes or nothing is returned, so a bad field never
/// produces a partially written body.
pub fn encode_batch<'a, I>(records: I) -> Result<Vec<u8>, CodecError>
where
    I: IntoIterator<Item = &'a LogRecord>,
{
    let encoded = records
        .into_iter()
        .map(|record| encode_record(record).map(Value::Object))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(serde_json::to_vec(&encoded)?)
}

fn encode_field(name: &str, value: &FieldValue) -> Result<Value, CodecError> {
    match value {
        FieldValue::String(s) => Ok(Value::from(s.as_str())),
        FieldValue::Int(i) => Ok(Value::from(*i)),
        FieldValue::Float(x) => finite_number(name, *x),
        FieldValue::Bool(b) => Ok(Value::from(*b)),
    }
}

fn finite_number(name: &str, value: f64) -> Result<Value, CodecError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| CodecError::NonFiniteFloat(name.to_string()))
}

/// Checks a field name against the GELF rule `[\w.\-]+`.
pub fn validate_field_name(name: &str) -> Result<(), CodecError> {
    if name == RESERVED_EXTENSION {
        return Err(CodecError::ReservedFieldName(name.to_string()));
    }
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CodecError::InvalidFieldName(name.to_string()))
    }
}

/// Decodes one GELF JSON object.
///
/// Unknown keys without the `_` prefix are ignored. Additional fields whose
/// value is not a JSON scalar, or whose name is empty, reserved or invalid,
/// are dropped without error.
pub fn decode_record(value: &Value) -> Result<LogRecord, CodecError> {
    let object = value
        .as_object()
        .ok_or(CodecError::MissingField(KEY_SHORT_MESSAGE))?;

    let version = object
        .get(KEY_VERSION)
        .and_then(Value::as_str)
        .unwrap_or(GELF_VERSION)
        .to_string();
    let host = required_str(object, KEY_HOST)?;
    let short_message = required_str(object, KEY_SHORT_MESSAGE)?;
    let full_message = match object.get(KEY_FULL_MESSAGE) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(CodecError::MissingField(KEY_FULL_MESSAGE)),
    };
    let timestamp = object
        .get(KEY_TIMESTAMP)
        .and_then(Value::as_f64)
        .ok_or(CodecError::MissingField(KEY_TIMESTAMP))?;
    let level = object
        .get(KEY_LEVEL)
        .and_then(Value::as_i64)
        .ok_or(CodecError::MissingField(KEY_LEVEL))?;

    let mut record = LogRecord {
        version,
        host,
        short_message,
        full_message,
        timestamp,
        level,
        extensions: Default::default(),
    };

    for (key, value) in object {
        let Some(name) = key.strip_prefix(EXTENSION_PREFIX) else {
            continue;
        };
        // Names the encoder would refuse are skipped like unknown keys.
        if validate_field_name(name).is_err() {
            continue;
        }
        if let Ok(field) = FieldValue::from_json(name, value.clone()) {
            record.extensions.insert(name.to_string(), field);
        }
    }
    Ok(record)
}

/// Decodes a JSON array body into records.
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<LogRecord>, CodecError> {
    let values: Vec<Value> = serde_json::from_slice(bytes)?;
    values.iter().map(decode_record).collect()
}

fn required_str(object: &Map<String, Value>, key: &'static str) -> Result<String, CodecError> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(CodecError::MissingField(key))
}

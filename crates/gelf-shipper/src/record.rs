// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log record types shipped to the collector.
//!
//! A [`LogRecord`] is built once at `log()` time and never mutated afterwards.
//! Additional fields are carried as [`FieldValue`], a closed set of the four
//! scalar types GELF accepts, so encoding never has to inspect values at runtime.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::CodecError;

/// GELF payload version written into every record.
pub const GELF_VERSION: &str = "1.1";

/// Severity used when the caller does not pass one (syslog "alert").
pub const DEFAULT_LEVEL: i64 = 1;

/// Additional (`_`-prefixed) fields of a record, keyed by name without the prefix.
pub type Extensions = BTreeMap<String, FieldValue>;

/// Value of an additional field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl FieldValue {
    /// Name of the variant, used in diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "string",
            FieldValue::Int(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Bool(_) => "boolean",
        }
    }

    /// Converts an arbitrary JSON value, rejecting anything that is not a scalar.
    ///
    /// `field` only feeds the error message.
    pub fn from_json(field: &str, value: serde_json::Value) -> Result<Self, CodecError> {
        match value {
            serde_json::Value::String(s) => Ok(FieldValue::String(s)),
            serde_json::Value::Bool(b) => Ok(FieldValue::Bool(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(FieldValue::Int(i)),
                None => n.as_f64().map(FieldValue::Float).ok_or_else(|| {
                    CodecError::UnsupportedFieldType {
                        field: field.to_string(),
                        kind: "number",
                    }
                }),
            },
            serde_json::Value::Null => Err(unsupported(field, "null")),
            serde_json::Value::Array(_) => Err(unsupported(field, "array")),
            serde_json::Value::Object(_) => Err(unsupported(field, "object")),
        }
    }
}

fn unsupported(field: &str, kind: &'static str) -> CodecError {
    CodecError::UnsupportedFieldType {
        field: field.to_string(),
        kind,
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{s}"),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Builds [`Extensions`] from a JSON object, failing on the first non-scalar value.
pub fn extensions_from_json(
    object: serde_json::Map<String, serde_json::Value>,
) -> Result<Extensions, CodecError> {
    object
        .into_iter()
        .map(|(name, value)| {
            let value = FieldValue::from_json(&name, value)?;
            Ok((name, value))
        })
        .collect()
}

/// One log event.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub(crate) version: String,
    pub(crate) host: String,
    pub(crate) short_message: String,
    pub(crate) full_message: Option<String>,
    pub(crate) timestamp: f64,
    pub(crate) level: i64,
    pub(crate) extensions: Extensions,
}

impl LogRecord {
    /// Creates a record stamped with the current wall-clock time.
    #[must_use]
    pub fn new(host: impl Into<String>, short_message: impl Into<String>) -> Self {
        Self {
            version: GELF_VERSION.to_string(),
            host: host.into(),
            short_message: short_message.into(),
            full_message: None,
            timestamp: now_timestamp(),
            level: DEFAULT_LEVEL,
            extensions: Extensions::new(),
        }
    }

    #[must_use]
    pub fn with_full_message(mut self, full_message: impl Into<String>) -> Self {
        self.full_message = Some(full_message.into());
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: i64) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.extensions.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions.extend(extensions);
        self
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn short_message(&self) -> &str {
        &self.short_message
    }

    #[must_use]
    pub fn full_message(&self) -> Option<&str> {
        self.full_message.as_deref()
    }

    /// Seconds since the Unix epoch with sub-second precision.
    #[must_use]
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    #[must_use]
    pub fn level(&self) -> i64 {
        self.level
    }

    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.extensions.get(name)
    }
}

/// Current time as fractional seconds since the Unix epoch.
#[must_use]
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Identity assigned to a record by the queue when it is enqueued.
///
/// Ids are strictly increasing for the lifetime of a store, so a record
/// enqueued after a flush snapshot can never match an id from that snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub(crate) u64);

impl RecordId {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub(crate) fn next(self) -> Self {
        RecordId(self.0.saturating_add(1))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A record waiting in the durable queue.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry {
    pub id: RecordId,
    pub record: LogRecord,
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors surfaced to callers of the agent and its configuration.
#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Shipper not configured; call global::configure first")]
    NotConfigured,

    #[error("short_message must not be empty")]
    EmptyShortMessage,

    #[error("Shipper queue is closed")]
    QueueClosed,

    #[error("Log record cannot be encoded: {0}")]
    InvalidRecord(#[from] CodecError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("No tokio runtime available: {0}")]
    Runtime(String),
}

/// Errors produced while converting records to and from GELF JSON.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Unsupported type for additional field '{field}': {kind}")]
    UnsupportedFieldType { field: String, kind: &'static str },

    #[error("Non-finite number in '{0}' cannot be encoded as JSON")]
    NonFiniteFloat(String),

    #[error("Additional field name '{0}' is reserved")]
    ReservedFieldName(String),

    #[error("Additional field name '{0}' contains invalid characters")]
    InvalidFieldName(String),

    #[error("Missing or invalid field '{0}'")]
    MissingField(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the durable store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("record cannot be persisted: {0}")]
    Codec(#[from] CodecError),
}

/// Outcome of a failed delivery attempt. None of these reach `log()` callers.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Failed to encode batch: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{status}: collector rejected batch: {body}")]
    Rejected { status: StatusCode, body: String },
}

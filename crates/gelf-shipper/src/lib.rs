// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # GELF Shipper
//!
//! Client-side agent that buffers structured log records on local storage and
//! periodically ships them in batches to a GELF HTTP collector.
//!
//! ## Architecture
//!
//! - [`agent`]: the caller-facing [`agent::ShipperAgent`], plus the optional
//!   process-wide facade in [`global`]
//! - [`queue`]: actor owning the pending records and every store write
//! - [`store`]: durable key-value backends and the pending collection format
//! - [`codec`] / [`record`]: the GELF record model and its JSON encoding
//! - [`flusher`] / [`scheduler`] / [`delivery`]: the periodic flush cycle
//!
//! A record stays in the store until the collector answers `202 Accepted` for
//! a batch containing it. Failed batches are retried on the next tick.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod agent;
pub mod codec;
pub mod config;
pub mod delivery;
pub mod error;
pub mod flusher;
pub mod global;
pub mod hostname;
pub mod http;
pub mod queue;
pub mod record;
pub mod scheduler;
pub mod store;

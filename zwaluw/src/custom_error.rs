/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Engine error taxonomy.
//!
//! Plan errors are returned synchronously from `build`/`execute`. Stream
//! errors travel as `Err` items inside a solution stream and abort the
//! subtree that produced them. Row-level expression failures never appear
//! here: FILTER treats them as a failed filter, BIND as an unbound value.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported query type: {0}")]
    UnsupportedQueryType(String),

    #[error("unsupported group pattern: {0}")]
    UnsupportedGroupPattern(String),

    #[error("unsupported property path: {0}")]
    UnsupportedPath(String),

    #[error("unknown extension function: {0}")]
    UnknownFunction(String),

    #[error("no service endpoint registered for: {0}")]
    UnknownService(String),

    #[error("service evaluation failed for {endpoint}: {reason}")]
    ServiceTransport { endpoint: String, reason: String },

    #[error("named graph not found: {0}")]
    GraphNotFound(String),

    #[error("query parse error: {0}")]
    Parse(String),

    #[error("result serialization failed: {0}")]
    Serialization(String),
}

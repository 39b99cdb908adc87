/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Query planning and the lazy operator pipeline.
//!
//! The planner is structured into focused modules:
//!
//! - `builder`: the recursive-descent plan builder and validation
//! - `pipeline`: the pull-based operator set (bind, filter, optional, union,
//!   minus, exists, order, distinct, slice)
//! - `values`: VALUES handled by per-row query rewriting

pub mod builder;
pub mod pipeline;
pub mod values;

pub use builder::{EngineConfig, PlanBuilder, PlanSummary, QueryParser, UpdateExecutor};
pub use pipeline::SolutionIter;

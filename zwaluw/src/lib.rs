/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod aggregates;
pub mod bgp;
pub mod cache;
pub mod context;
pub mod custom_error;
pub mod dataset;
pub mod expression;
pub mod graph_service;
pub mod path;
pub mod planner;
pub mod results;

pub use cache::{BgpCache, EvictionStrategy, LruEviction};
pub use context::ExecutionContext;
pub use custom_error::EngineError;
pub use dataset::{Dataset, Graph, GraphFactory, MemoryGraph};
pub use planner::{EngineConfig, PlanBuilder, PlanSummary, QueryParser, UpdateExecutor};
pub use results::{MaterializedResults, QueryResults, SolutionSet, SolutionStream, TripleStream};

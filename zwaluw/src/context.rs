/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::cache::BgpCache;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Variables carrying this prefix are engine-internal and are dropped before
/// rows become user visible.
pub const INTERNAL_PREFIX: &str = "__";

/// Per-subtree configuration snapshot. Cloned and specialized whenever a
/// nested scope overrides graph selection or cache usage; no two running
/// branches share a mutable instance. The fresh-variable counter is the one
/// piece of session state: it is shared by reference so synthesized names
/// stay unique across the whole plan.
#[derive(Clone)]
pub struct ExecutionContext {
    pub default_graphs: Vec<String>,
    pub named_graphs: Vec<String>,
    pub properties: FxHashMap<String, String>,
    pub cache: Option<Arc<BgpCache>>,
    /// Cleared when the plan carries LIMIT/OFFSET: a truncated result set
    /// must never seed the cache.
    pub cacheable: bool,
    fresh_ids: Arc<AtomicU64>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::for_session(Arc::new(AtomicU64::new(0)))
    }

    /// Roots a context in a session-owned counter so independent engine
    /// instances can never collide on synthesized names.
    pub fn for_session(fresh_ids: Arc<AtomicU64>) -> Self {
        ExecutionContext {
            default_graphs: Vec::new(),
            named_graphs: Vec::new(),
            properties: FxHashMap::default(),
            cache: None,
            cacheable: true,
            fresh_ids,
        }
    }

    /// Derives a child scope. The property map is copied so the child can
    /// override entries without the parent observing them.
    pub fn child(&self) -> Self {
        self.clone()
    }

    /// Synthesizes an internal variable name, unique per session.
    pub fn fresh_var(&self, tag: &str) -> String {
        let n = self.fresh_ids.fetch_add(1, Ordering::Relaxed);
        format!("{}{}_{}", INTERNAL_PREFIX, tag, n)
    }

    pub fn set_property(&mut self, key: &str, value: &str) {
        self.properties.insert(key.to_string(), value.to_string());
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn use_cache(&self) -> bool {
        self.cache.is_some()
    }
}

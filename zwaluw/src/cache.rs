/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Semantic BGP cache.
//!
//! Entries are keyed by the canonical form of an unbound BGP plus the active
//! graph identifier, and hold the full materialized result set for that key.
//! A key under evaluation is marked pending; a second request for the same
//! key blocks until the first evaluation lands and reuses its rows, so every
//! key is computed at most once at a time.

use log::debug;
use rustc_hash::FxHashMap;
use shared::bindings::Binding;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

/// Decides which keys leave the cache when it grows past capacity. The
/// strategy only bookkeeps key order; removal itself stays in the cache.
pub trait EvictionStrategy: Send {
    /// A key was read or written.
    fn on_access(&mut self, key: &str);

    /// A key was inserted; returns the keys to evict to respect `capacity`.
    fn on_insert(&mut self, key: &str, stored: usize, capacity: usize) -> Vec<String>;

    fn clear(&mut self);
}

/// Least-recently-used eviction, the default strategy.
#[derive(Debug, Default)]
pub struct LruEviction {
    order: VecDeque<String>,
}

impl EvictionStrategy for LruEviction {
    fn on_access(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos).unwrap_or_else(|| key.to_string());
            self.order.push_back(k);
        }
    }

    fn on_insert(&mut self, key: &str, stored: usize, capacity: usize) -> Vec<String> {
        if !self.order.iter().any(|k| k == key) {
            self.order.push_back(key.to_string());
        }
        let mut evicted = Vec::new();
        let mut stored = stored;
        while stored > capacity {
            match self.order.pop_front() {
                Some(old) => {
                    stored -= 1;
                    evicted.push(old);
                }
                None => break,
            }
        }
        evicted
    }

    fn clear(&mut self) {
        self.order.clear();
    }
}

enum Entry {
    Pending,
    Ready(Arc<Vec<Binding>>),
}

struct CacheState {
    entries: FxHashMap<String, Entry>,
    strategy: Box<dyn EvictionStrategy>,
}

pub struct BgpCache {
    state: Mutex<CacheState>,
    ready: Condvar,
    capacity: usize,
}

impl BgpCache {
    pub fn new(capacity: usize) -> Self {
        Self::with_strategy(capacity, Box::new(LruEviction::default()))
    }

    pub fn with_strategy(capacity: usize, strategy: Box<dyn EvictionStrategy>) -> Self {
        BgpCache {
            state: Mutex::new(CacheState {
                entries: FxHashMap::default(),
                strategy,
            }),
            ready: Condvar::new(),
            capacity,
        }
    }

    /// Whether a materialized result set exists for the key. Pending entries
    /// do not count: they hold no replayable rows yet.
    pub fn has(&self, key: &str) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        matches!(state.entries.get(key), Some(Entry::Ready(_)))
    }

    /// The materialized rows for a key, if present. Blocks while the key is
    /// pending under another evaluation.
    pub fn get(&self, key: &str) -> Option<Arc<Vec<Binding>>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            match state.entries.get(key) {
                Some(Entry::Ready(rows)) => {
                    let rows = Arc::clone(rows);
                    state.strategy.on_access(key);
                    return Some(rows);
                }
                Some(Entry::Pending) => {
                    state = self
                        .ready
                        .wait(state)
                        .unwrap_or_else(|e| e.into_inner());
                }
                None => return None,
            }
        }
    }

    /// Returns the cached rows for `key`, computing them with `evaluate` on a
    /// miss. Concurrent callers for the same uncached key wait for the single
    /// in-flight evaluation instead of recomputing.
    pub fn get_or_populate<F>(&self, key: &str, evaluate: F) -> Arc<Vec<Binding>>
    where
        F: FnOnce() -> Vec<Binding>,
    {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            loop {
                match state.entries.get(key) {
                    Some(Entry::Ready(rows)) => {
                        let rows = Arc::clone(rows);
                        state.strategy.on_access(key);
                        return rows;
                    }
                    Some(Entry::Pending) => {
                        state = self
                            .ready
                            .wait(state)
                            .unwrap_or_else(|e| e.into_inner());
                    }
                    None => {
                        state.entries.insert(key.to_string(), Entry::Pending);
                        break;
                    }
                }
            }
        }

        // Evaluate outside the lock; the pending marker keeps the key claimed.
        let rows = Arc::new(evaluate());
        debug!("bgp cache: populated key ({} rows)", rows.len());

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.insert(key.to_string(), Entry::Ready(Arc::clone(&rows)));
        let stored = state
            .entries
            .values()
            .filter(|e| matches!(e, Entry::Ready(_)))
            .count();
        let evicted = state.strategy.on_insert(key, stored, self.capacity);
        for old in evicted {
            if old != key {
                state.entries.remove(&old);
            }
        }
        drop(state);
        self.ready.notify_all();
        rows
    }

    /// Total rows held across all materialized entries.
    pub fn total_rows(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .entries
            .values()
            .map(|e| match e {
                Entry::Ready(rows) => rows.len(),
                Entry::Pending => 0,
            })
            .sum()
    }

    /// Number of materialized entries.
    pub fn count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .entries
            .values()
            .filter(|e| matches!(e, Entry::Ready(_)))
            .count()
    }

    /// Drops every entry. The only invalidation in this design; there is no
    /// TTL.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.clear();
        state.strategy.clear();
        drop(state);
        self.ready.notify_all();
    }
}

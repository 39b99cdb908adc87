/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use rustc_hash::FxHashMap;

/// One solution row: a partial map from variable name to dictionary id.
///
/// A binding is never mutated after creation. Extending or merging produces a
/// new binding, so upstream operators can hand the same row to several
/// downstream branches without copies being observable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Binding {
    inner: FxHashMap<String, u32>,
}

impl Binding {
    pub fn new() -> Self {
        Binding {
            inner: FxHashMap::default(),
        }
    }

    pub fn from_pairs<I: IntoIterator<Item = (String, u32)>>(pairs: I) -> Self {
        Binding {
            inner: pairs.into_iter().collect(),
        }
    }

    pub fn get(&self, variable: &str) -> Option<u32> {
        self.inner.get(variable).copied()
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.inner.contains_key(variable)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, u32)> {
        self.inner.iter().map(|(k, v)| (k, *v))
    }

    pub fn variables(&self) -> impl Iterator<Item = &String> {
        self.inner.keys()
    }

    /// Copy-on-extend: returns a new binding with `variable` bound to `id`.
    /// An existing conflicting value is overwritten only if equal; the caller
    /// is expected to have checked compatibility through `merge` first.
    pub fn extend(&self, variable: &str, id: u32) -> Binding {
        let mut inner = self.inner.clone();
        inner.insert(variable.to_string(), id);
        Binding { inner }
    }

    /// Joins two bindings. Returns `None` when a shared variable disagrees,
    /// which downstream operators treat as ordinary row elimination.
    pub fn merge(&self, other: &Binding) -> Option<Binding> {
        for (var, id) in other.iter() {
            if let Some(existing) = self.get(var) {
                if existing != id {
                    return None;
                }
            }
        }
        let mut inner = self.inner.clone();
        for (var, id) in other.iter() {
            inner.insert(var.clone(), id);
        }
        Some(Binding { inner })
    }

    /// Checks shared-variable agreement without building the merged row.
    pub fn compatible(&self, other: &Binding) -> bool {
        other
            .iter()
            .all(|(var, id)| self.get(var).map_or(true, |existing| existing == id))
    }

    /// Whether the two bindings agree on at least one shared variable. MINUS
    /// only eliminates a left row over a non-disjoint right row.
    pub fn shares_variable(&self, other: &Binding) -> bool {
        other.variables().any(|v| self.contains(v))
    }

    /// Keeps only the listed variables.
    pub fn project(&self, variables: &[String]) -> Binding {
        Binding {
            inner: self
                .inner
                .iter()
                .filter(|(k, _)| variables.contains(k))
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }

    /// Drops every variable starting with `prefix`. Path expansion synthesizes
    /// internal variables that must not escape into the surrounding join.
    pub fn without_prefix(&self, prefix: &str) -> Binding {
        Binding {
            inner: self
                .inner
                .iter()
                .filter(|(k, _)| !k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }

    /// Canonical serialization used for DISTINCT hashing and MINUS lookups.
    pub fn fingerprint(&self) -> String {
        let mut pairs: Vec<(&String, u32)> = self.iter().collect();
        pairs.sort();
        let mut out = String::new();
        for (var, id) in pairs {
            out.push_str(var);
            out.push('=');
            out.push_str(&id.to_string());
            out.push(';');
        }
        out
    }
}

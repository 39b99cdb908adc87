/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Basic-graph-pattern evaluation.
//!
//! For each incoming source binding the patterns are specialized, reordered
//! by selectivity and joined left to right. With a cache attached, the full
//! result set of the *unbound* BGP is materialized once per (pattern set,
//! active graph) key and replayed against each concrete source binding.

use crate::context::ExecutionContext;
use crate::dataset::GraphView;
use crate::planner::pipeline::SolutionIter;
use crate::planner::PlanBuilder;
use log::{debug, trace};
use rayon::prelude::*;
use shared::algebra::{BgpTriple, Predicate, QueryTerm};
use shared::bindings::Binding;
use shared::terms::{count_bound_terms, Term, TriplePattern};

pub struct BgpExecutor;

impl BgpExecutor {
    /// Lazy adapter: joins `triples` (plain patterns only) against every row
    /// of `source`.
    pub fn evaluate<'a>(
        builder: &'a PlanBuilder,
        source: SolutionIter<'a>,
        triples: &[BgpTriple],
        ctx: &ExecutionContext,
    ) -> SolutionIter<'a> {
        let view = builder.active_view(ctx);
        let resolved = resolve_patterns(builder, triples);
        let ctx = ctx.clone();
        Box::new(source.flat_map(move |item| match item {
            Ok(binding) => {
                let rows = match &resolved {
                    Some(patterns) => {
                        Self::join_with_cache(builder, &view, patterns, &binding, &ctx)
                    }
                    // A constant of the BGP is absent from the dictionary:
                    // nothing in the dataset can match it.
                    None => Vec::new(),
                };
                rows.into_iter().map(Ok).collect::<Vec<_>>()
            }
            Err(e) => vec![Err(e)],
        }))
    }

    fn join_with_cache(
        builder: &PlanBuilder,
        view: &GraphView<'_>,
        patterns: &[TriplePattern],
        seed: &Binding,
        ctx: &ExecutionContext,
    ) -> Vec<Binding> {
        let Some(cache) = ctx.cache.as_ref() else {
            return Self::join(builder, view, patterns, seed);
        };
        let key = cache_key(patterns, view.id());
        if ctx.cacheable {
            let full = cache.get_or_populate(&key, || {
                debug!("bgp cache miss, materializing {} patterns", patterns.len());
                Self::join(builder, view, patterns, &Binding::new())
            });
            return replay(&full, seed);
        }
        // LIMIT/OFFSET plans may read existing entries but never write one:
        // storing a truncated set would corrupt later full-BGP hits.
        if cache.has(&key) {
            if let Some(full) = cache.get(&key) {
                debug!("bgp cache hit on non-cacheable plan");
                return replay(&full, seed);
            }
        }
        Self::join(builder, view, patterns, seed)
    }

    /// Plain nested hash join, selectivity-ordered, no cache involvement.
    pub(crate) fn join(
        builder: &PlanBuilder,
        view: &GraphView<'_>,
        patterns: &[TriplePattern],
        seed: &Binding,
    ) -> Vec<Binding> {
        let mut ordered: Vec<TriplePattern> =
            patterns.iter().map(|p| specialize(p, seed)).collect();
        // More bound terms first, ties broken by the dataset's estimate.
        ordered.sort_by_key(|p| (3 - count_bound_terms(p), view.estimate(&id_pattern(p))));
        trace!("bgp join order: {:?}", ordered);

        let threshold = builder.config().parallel_join_threshold;
        let mut rows = vec![seed.clone()];
        for pattern in &ordered {
            if rows.is_empty() {
                break;
            }
            let candidates = match_pattern(view, pattern);
            rows = join_rows(rows, &candidates, threshold);
        }
        rows
    }

    /// Single-pattern variant used by the path executor's elementary steps.
    pub(crate) fn match_with_seed(
        view: &GraphView<'_>,
        pattern: &TriplePattern,
        seed: &Binding,
    ) -> Vec<Binding> {
        let specialized = specialize(pattern, seed);
        match_pattern(view, &specialized)
            .into_iter()
            .filter_map(|candidate| seed.merge(&candidate))
            .collect()
    }
}

/// Replays a cached full result set against one concrete source binding.
fn replay(full: &[Binding], seed: &Binding) -> Vec<Binding> {
    if seed.is_empty() {
        return full.to_vec();
    }
    full.iter().filter_map(|row| seed.merge(row)).collect()
}

/// Resolves algebra terms to dictionary-encoded pattern terms. `None` when a
/// constant was never interned, meaning the whole BGP cannot match.
fn resolve_patterns(builder: &PlanBuilder, triples: &[BgpTriple]) -> Option<Vec<TriplePattern>> {
    let mut out = Vec::with_capacity(triples.len());
    for triple in triples {
        let predicate = match &triple.predicate {
            Predicate::Term(t) => t,
            // Paths were split off before BGP evaluation.
            Predicate::Path(_) => return None,
        };
        out.push((
            resolve_term(builder, &triple.subject)?,
            resolve_term(builder, predicate)?,
            resolve_term(builder, &triple.object)?,
        ));
    }
    Some(out)
}

fn resolve_term(builder: &PlanBuilder, term: &QueryTerm) -> Option<Term> {
    match term {
        QueryTerm::Var(v) => Some(Term::Variable(v.clone())),
        QueryTerm::Iri(s) | QueryTerm::Literal(s) => {
            builder.dataset().lookup(s).map(Term::Constant)
        }
    }
}

/// Substitutes variables already bound by the source binding.
pub(crate) fn specialize(pattern: &TriplePattern, seed: &Binding) -> TriplePattern {
    let subst = |term: &Term| match term {
        Term::Variable(v) => match seed.get(v) {
            Some(id) => Term::Constant(id),
            None => term.clone(),
        },
        Term::Constant(_) => term.clone(),
    };
    (subst(&pattern.0), subst(&pattern.1), subst(&pattern.2))
}

pub(crate) fn id_pattern(pattern: &TriplePattern) -> (Option<u32>, Option<u32>, Option<u32>) {
    (
        pattern.0.as_constant(),
        pattern.1.as_constant(),
        pattern.2.as_constant(),
    )
}

/// All solutions of a single pattern: one binding of the pattern's variables
/// per matching triple. Repeated variables must agree within the triple.
pub(crate) fn match_pattern(view: &GraphView<'_>, pattern: &TriplePattern) -> Vec<Binding> {
    let mut out = Vec::new();
    'triples: for triple in view.find(&id_pattern(pattern)) {
        let mut row = Binding::new();
        let positions = [
            (&pattern.0, triple.subject),
            (&pattern.1, triple.predicate),
            (&pattern.2, triple.object),
        ];
        for (term, value) in positions {
            if let Term::Variable(v) = term {
                match row.get(v) {
                    Some(existing) if existing != value => continue 'triples,
                    Some(_) => {}
                    None => row = row.extend(v, value),
                }
            }
        }
        out.push(row);
    }
    out
}

/// Extends every row with every compatible candidate. Large products go
/// through rayon.
fn join_rows(rows: Vec<Binding>, candidates: &[Binding], threshold: usize) -> Vec<Binding> {
    if rows.len().saturating_mul(candidates.len()) >= threshold {
        rows.par_iter()
            .flat_map_iter(|row| candidates.iter().filter_map(move |c| row.merge(c)))
            .collect()
    } else {
        rows.iter()
            .flat_map(|row| candidates.iter().filter_map(move |c| row.merge(c)))
            .collect()
    }
}

/// Canonical cache key for an unbound BGP against one graph selection.
/// Patterns are serialized and sorted so member order never splits entries.
pub(crate) fn cache_key(patterns: &[TriplePattern], graph_id: &str) -> String {
    let mut lines: Vec<String> = patterns
        .iter()
        .map(|(s, p, o)| format!("{} {} {}", term_key(s), term_key(p), term_key(o)))
        .collect();
    lines.sort();
    format!("{}@{}", lines.join("|"), graph_id)
}

fn term_key(term: &Term) -> String {
    match term {
        Term::Variable(v) => format!("?{}", v),
        Term::Constant(id) => format!("#{}", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_ignores_pattern_order() {
        let a = (Term::Variable("s".into()), Term::Constant(1), Term::Variable("o".into()));
        let b = (Term::Variable("o".into()), Term::Constant(2), Term::Variable("x".into()));
        let key1 = cache_key(&[a.clone(), b.clone()], "default");
        let key2 = cache_key(&[b, a], "default");
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_cache_key_distinguishes_graphs() {
        let p = (Term::Variable("s".into()), Term::Constant(1), Term::Variable("o".into()));
        assert_ne!(
            cache_key(std::slice::from_ref(&p), "default"),
            cache_key(std::slice::from_ref(&p), "http://example.org/g")
        );
    }

    #[test]
    fn test_specialize_substitutes_bound_vars() {
        let seed = Binding::new().extend("s", 42);
        let pattern = (
            Term::Variable("s".into()),
            Term::Constant(1),
            Term::Variable("o".into()),
        );
        let spec = specialize(&pattern, &seed);
        assert_eq!(spec.0, Term::Constant(42));
        assert_eq!(spec.2, Term::Variable("o".into()));
    }
}

/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Property-path evaluation.
//!
//! Every path shape reduces to elementary pattern matches against the active
//! graph view. Sequences thread a synthesized internal variable between the
//! two legs; quantified paths run a breadth-first closure with a visited set
//! per start node so cyclic data terminates. Negation is only defined over a
//! simple property set and is rejected at plan time otherwise.

use crate::bgp::BgpExecutor;
use crate::context::ExecutionContext;
use crate::custom_error::EngineError;
use crate::dataset::GraphView;
use crate::planner::pipeline::SolutionIter;
use crate::planner::PlanBuilder;
use log::trace;
use rustc_hash::FxHashSet;
use shared::algebra::{BgpTriple, PathExpression, Predicate, QueryTerm};
use shared::bindings::Binding;
use shared::terms::Term;
use std::collections::VecDeque;

/// Prefix of variables synthesized during path expansion. They never escape:
/// the plan builder projects them away once the surrounding BGP has joined.
pub const PATH_VAR_TAG: &str = "path";

pub struct PathExecutor;

struct PathScope<'a> {
    builder: &'a PlanBuilder,
    view: &'a GraphView<'a>,
    ctx: &'a ExecutionContext,
}

impl PathExecutor {
    /// Rejects negation over anything but a simple property set. Called once
    /// at plan time; evaluation assumes a validated expression.
    pub fn validate(path: &PathExpression) -> Result<(), EngineError> {
        match path {
            PathExpression::Link(_) => Ok(()),
            PathExpression::Inverse(inner)
            | PathExpression::ZeroOrOne(inner)
            | PathExpression::ZeroOrMore(inner)
            | PathExpression::OneOrMore(inner) => Self::validate(inner),
            PathExpression::Sequence(a, b) | PathExpression::Alternative(a, b) => {
                Self::validate(a)?;
                Self::validate(b)
            }
            PathExpression::Negated(inner) => {
                property_set(inner)?;
                Ok(())
            }
        }
    }

    /// Folds a list of path triples over the source stream, composing their
    /// outputs binding by binding.
    pub fn evaluate_many<'a>(
        builder: &'a PlanBuilder,
        source: SolutionIter<'a>,
        triples: Vec<BgpTriple>,
        ctx: &ExecutionContext,
    ) -> SolutionIter<'a> {
        let view = builder.active_view(ctx);
        let ctx = ctx.clone();
        Box::new(source.flat_map(move |item| match item {
            Ok(binding) => {
                let scope = PathScope {
                    builder,
                    view: &view,
                    ctx: &ctx,
                };
                let mut rows = vec![binding];
                for triple in &triples {
                    if rows.is_empty() {
                        break;
                    }
                    let mut next = Vec::new();
                    for row in &rows {
                        next.extend(evaluate_triple(&scope, triple, row));
                    }
                    rows = next;
                }
                rows.into_iter().map(Ok).collect::<Vec<_>>()
            }
            Err(e) => vec![Err(e)],
        }))
    }
}

fn evaluate_triple(scope: &PathScope<'_>, triple: &BgpTriple, seed: &Binding) -> Vec<Binding> {
    let Predicate::Path(path) = &triple.predicate else {
        return Vec::new();
    };
    let (Some(s), Some(o)) = (
        resolve_endpoint(scope, &triple.subject, seed),
        resolve_endpoint(scope, &triple.object, seed),
    ) else {
        // A constant endpoint the dataset has never seen matches nothing.
        return Vec::new();
    };
    eval(scope, &s, path, &o, seed)
}

/// Algebra term → runtime term, with source bindings substituted.
fn resolve_endpoint(scope: &PathScope<'_>, term: &QueryTerm, seed: &Binding) -> Option<Term> {
    match term {
        QueryTerm::Var(v) => Some(match seed.get(v) {
            Some(id) => Term::Constant(id),
            None => Term::Variable(v.clone()),
        }),
        QueryTerm::Iri(s) | QueryTerm::Literal(s) => {
            scope.builder.dataset().lookup(s).map(Term::Constant)
        }
    }
}

fn eval(
    scope: &PathScope<'_>,
    s: &Term,
    path: &PathExpression,
    o: &Term,
    seed: &Binding,
) -> Vec<Binding> {
    // Endpoints bound since the seed was last consulted become constants.
    let s = &specialize_term(s, seed);
    let o = &specialize_term(o, seed);
    match path {
        PathExpression::Link(iri) => {
            let Some(pid) = scope.builder.dataset().lookup(iri) else {
                return Vec::new();
            };
            let pattern = (s.clone(), Term::Constant(pid), o.clone());
            BgpExecutor::match_with_seed(scope.view, &pattern, seed)
        }
        PathExpression::Inverse(inner) => eval(scope, o, inner, s, seed),
        PathExpression::Sequence(a, b) => {
            let mid = Term::Variable(scope.ctx.fresh_var(PATH_VAR_TAG));
            let mut out = Vec::new();
            for row in eval(scope, s, a, &mid, seed) {
                out.extend(eval(scope, &mid, b, o, &row));
            }
            out
        }
        PathExpression::Alternative(a, b) => {
            let mut out = eval(scope, s, a, o, seed);
            out.extend(eval(scope, s, b, o, seed));
            out
        }
        PathExpression::ZeroOrOne(inner) => {
            let mut out = zero_hops(scope, s, o, seed);
            out.extend(eval(scope, s, inner, o, seed));
            out
        }
        PathExpression::ZeroOrMore(inner) => closure(scope, s, inner, o, seed, true),
        PathExpression::OneOrMore(inner) => closure(scope, s, inner, o, seed, false),
        PathExpression::Negated(inner) => match property_set(inner) {
            Ok((forward, inverse)) => negated_set(scope, s, o, &forward, &inverse, seed),
            // Unreachable after plan-time validation.
            Err(_) => Vec::new(),
        },
    }
}

fn specialize_term(term: &Term, seed: &Binding) -> Term {
    match term {
        Term::Variable(v) => match seed.get(v) {
            Some(id) => Term::Constant(id),
            None => term.clone(),
        },
        Term::Constant(_) => term.clone(),
    }
}

/// The zero-length leg of `?` and `*`: connects every term to itself. With
/// both endpoints unbound this enumerates the view's entities, trading speed
/// for completeness.
fn zero_hops(scope: &PathScope<'_>, s: &Term, o: &Term, seed: &Binding) -> Vec<Binding> {
    match (s, o) {
        (Term::Constant(a), Term::Constant(b)) => {
            if a == b {
                vec![seed.clone()]
            } else {
                Vec::new()
            }
        }
        (Term::Constant(a), Term::Variable(v)) => vec![seed.extend(v, *a)],
        (Term::Variable(v), Term::Constant(b)) => vec![seed.extend(v, *b)],
        (Term::Variable(vs), Term::Variable(vo)) => scope
            .view
            .entities()
            .into_iter()
            .map(|e| {
                if vs == vo {
                    seed.extend(vs, e)
                } else {
                    seed.extend(vs, e).extend(vo, e)
                }
            })
            .collect(),
    }
}

/// Reachability closure for `*` and `+`.
fn closure(
    scope: &PathScope<'_>,
    s: &Term,
    step: &PathExpression,
    o: &Term,
    seed: &Binding,
    include_zero: bool,
) -> Vec<Binding> {
    match (s, o) {
        (Term::Constant(start), _) => {
            let mut reached = bfs(scope, *start, step, Direction::Forward);
            if include_zero {
                reached.insert(*start);
            }
            trace!("path closure from {}: {} nodes", start, reached.len());
            match o {
                Term::Constant(end) => {
                    if reached.contains(end) {
                        vec![seed.clone()]
                    } else {
                        Vec::new()
                    }
                }
                Term::Variable(v) => reached.into_iter().map(|n| seed.extend(v, n)).collect(),
            }
        }
        (Term::Variable(v), Term::Constant(end)) => {
            let mut reached = bfs(scope, *end, step, Direction::Backward);
            if include_zero {
                reached.insert(*end);
            }
            reached.into_iter().map(|n| seed.extend(v, n)).collect()
        }
        (Term::Variable(vs), Term::Variable(vo)) => {
            let mut out = Vec::new();
            for start in scope.view.entities() {
                let mut reached = bfs(scope, start, step, Direction::Forward);
                if include_zero {
                    reached.insert(start);
                }
                for end in reached {
                    if vs == vo {
                        if end == start {
                            out.push(seed.extend(vs, start));
                        }
                    } else {
                        out.push(seed.extend(vs, start).extend(vo, end));
                    }
                }
            }
            out
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Direction {
    Forward,
    Backward,
}

/// Nodes reachable from `start` in one or more `step` hops. Each node is
/// expanded at most once, which bounds the traversal on cyclic graphs.
fn bfs(
    scope: &PathScope<'_>,
    start: u32,
    step: &PathExpression,
    direction: Direction,
) -> FxHashSet<u32> {
    let mut reached: FxHashSet<u32> = FxHashSet::default();
    let mut expanded: FxHashSet<u32> = FxHashSet::default();
    let mut queue: VecDeque<u32> = VecDeque::new();
    queue.push_back(start);
    while let Some(node) = queue.pop_front() {
        if !expanded.insert(node) {
            continue;
        }
        for hop in one_hop(scope, node, step, direction) {
            if reached.insert(hop) && !expanded.contains(&hop) {
                queue.push_back(hop);
            }
        }
    }
    reached
}

fn one_hop(
    scope: &PathScope<'_>,
    node: u32,
    step: &PathExpression,
    direction: Direction,
) -> Vec<u32> {
    let hop_var = scope.ctx.fresh_var(PATH_VAR_TAG);
    let empty = Binding::new();
    let (s, o) = match direction {
        Direction::Forward => (Term::Constant(node), Term::Variable(hop_var.clone())),
        Direction::Backward => (Term::Variable(hop_var.clone()), Term::Constant(node)),
    };
    let mut targets: Vec<u32> = eval(scope, &s, step, &o, &empty)
        .into_iter()
        .filter_map(|row| row.get(&hop_var))
        .collect();
    targets.sort_unstable();
    targets.dedup();
    targets
}

/// Splits a negated property set into forward and inverse IRI lists, or
/// rejects the expression as non-simple.
fn property_set(path: &PathExpression) -> Result<(Vec<String>, Vec<String>), EngineError> {
    match path {
        PathExpression::Link(iri) => Ok((vec![iri.clone()], Vec::new())),
        PathExpression::Inverse(inner) => match inner.as_ref() {
            PathExpression::Link(iri) => Ok((Vec::new(), vec![iri.clone()])),
            other => Err(EngineError::UnsupportedPath(format!(
                "negated property sets may only invert plain IRIs, found {:?}",
                other
            ))),
        },
        PathExpression::Alternative(a, b) => {
            let (mut fa, mut ia) = property_set(a)?;
            let (fb, ib) = property_set(b)?;
            fa.extend(fb);
            ia.extend(ib);
            Ok((fa, ia))
        }
        other => Err(EngineError::UnsupportedPath(format!(
            "cannot negate a non-simple property path: {:?}",
            other
        ))),
    }
}

/// Matches any edge whose predicate is outside the excluded set. This is a
/// full scan by construction: the excluded predicates cannot drive an index
/// lookup.
fn negated_set(
    scope: &PathScope<'_>,
    s: &Term,
    o: &Term,
    forward: &[String],
    inverse: &[String],
    seed: &Binding,
) -> Vec<Binding> {
    let lookup_all = |iris: &[String]| -> FxHashSet<u32> {
        iris.iter()
            .filter_map(|iri| scope.builder.dataset().lookup(iri))
            .collect()
    };
    let mut out = Vec::new();
    if !forward.is_empty() {
        let excluded = lookup_all(forward);
        for triple in scope.view.find(&(s.as_constant(), None, o.as_constant())) {
            if !excluded.contains(&triple.predicate) {
                if let Some(row) = bind_endpoints(seed, s, triple.subject, o, triple.object) {
                    out.push(row);
                }
            }
        }
    }
    if !inverse.is_empty() {
        let excluded = lookup_all(inverse);
        for triple in scope.view.find(&(o.as_constant(), None, s.as_constant())) {
            if !excluded.contains(&triple.predicate) {
                if let Some(row) = bind_endpoints(seed, s, triple.object, o, triple.subject) {
                    out.push(row);
                }
            }
        }
    }
    out
}

/// Binds both endpoints onto the seed, checking constants and repeated
/// variables agree.
fn bind_endpoints(
    seed: &Binding,
    s: &Term,
    s_value: u32,
    o: &Term,
    o_value: u32,
) -> Option<Binding> {
    let mut row = seed.clone();
    for (term, value) in [(s, s_value), (o, o_value)] {
        match term {
            Term::Constant(c) => {
                if *c != value {
                    return None;
                }
            }
            Term::Variable(v) => match row.get(v) {
                Some(existing) if existing != value => return None,
                Some(_) => {}
                None => row = row.extend(v, value),
            },
        }
    }
    Some(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_simple_negation() {
        let path = PathExpression::negated(PathExpression::alt(
            PathExpression::link("http://example.org/a"),
            PathExpression::inverse(PathExpression::link("http://example.org/b")),
        ));
        assert!(PathExecutor::validate(&path).is_ok());
    }

    #[test]
    fn test_validate_rejects_negated_sequence() {
        let path = PathExpression::negated(PathExpression::seq(
            PathExpression::link("http://example.org/a"),
            PathExpression::link("http://example.org/b"),
        ));
        assert!(matches!(
            PathExecutor::validate(&path),
            Err(EngineError::UnsupportedPath(_))
        ));
    }

    #[test]
    fn test_validate_rejects_negated_quantifier_even_nested() {
        let path = PathExpression::seq(
            PathExpression::link("http://example.org/a"),
            PathExpression::negated(PathExpression::zero_or_more(PathExpression::link(
                "http://example.org/b",
            ))),
        );
        assert!(PathExecutor::validate(&path).is_err());
    }

    #[test]
    fn test_property_set_collects_both_directions() {
        let path = PathExpression::alt(
            PathExpression::link("http://example.org/a"),
            PathExpression::inverse(PathExpression::link("http://example.org/b")),
        );
        let (forward, inverse) = property_set(&path).unwrap();
        assert_eq!(forward, vec!["http://example.org/a"]);
        assert_eq!(inverse, vec!["http://example.org/b"]);
    }

    #[test]
    fn test_bind_endpoints_checks_repeated_var() {
        let seed = Binding::new();
        let var = Term::Variable("x".to_string());
        assert!(bind_endpoints(&seed, &var, 1, &var, 2).is_none());
        let row = bind_endpoints(&seed, &var, 3, &var, 3).unwrap();
        assert_eq!(row.get("x"), Some(3));
    }
}

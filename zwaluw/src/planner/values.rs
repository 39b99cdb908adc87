/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! VALUES handled by query rewriting, not by a runtime join.
//!
//! For every candidate row of the first VALUES block, every other group of
//! the WHERE scope is deep-substituted with that row's bindings and evaluated
//! independently; the union of all per-row branches, each extended with the
//! row's own bindings, is the result. A remaining VALUES block in the scope
//! recurses through the same machinery, giving one UNION layer per block.

use crate::custom_error::EngineError;
use crate::context::ExecutionContext;
use crate::planner::pipeline::{from_rows, SolutionIter};
use crate::planner::PlanBuilder;
use log::debug;
use rustc_hash::FxHashMap;
use shared::algebra::{
    BgpTriple, Expression, GroupPattern, Predicate, Query, QueryTerm, TemplateTriple, Value,
    ValuesClause,
};
use shared::bindings::Binding;
use std::collections::VecDeque;

type RowMap = FxHashMap<String, QueryTerm>;

pub struct ValuesIter<'a> {
    builder: &'a PlanBuilder,
    values: &'a ValuesClause,
    others: Vec<&'a GroupPattern>,
    ctx: ExecutionContext,
    source: Option<SolutionIter<'a>>,
    source_rows: Vec<Binding>,
    row_index: usize,
    buffer: VecDeque<Result<Binding, EngineError>>,
    done: bool,
}

impl<'a> ValuesIter<'a> {
    pub fn new(
        builder: &'a PlanBuilder,
        source: SolutionIter<'a>,
        values: &'a ValuesClause,
        others: Vec<&'a GroupPattern>,
        ctx: &ExecutionContext,
    ) -> Self {
        ValuesIter {
            builder,
            values,
            others,
            ctx: ctx.child(),
            source: Some(source),
            source_rows: Vec::new(),
            row_index: 0,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// Encodes one VALUES row into a substitution map and the binding the
    /// branch results are extended with. UNDEF cells bind nothing.
    fn row_bindings(&self, row: &[Value]) -> (RowMap, Binding) {
        let mut map = RowMap::default();
        let mut binding = Binding::new();
        for (var, value) in self.values.variables.iter().zip(row) {
            if let Value::Term(term) = value {
                if let Some(lexical) = term.lexical() {
                    map.insert(var.clone(), term.clone());
                    binding = binding.extend(var, self.builder.dataset().encode(lexical));
                }
            }
        }
        (map, binding)
    }

    fn evaluate_row(&mut self, map: &RowMap, row_binding: &Binding) {
        if self.others.is_empty() {
            for src in &self.source_rows {
                if let Some(merged) = src.merge(row_binding) {
                    self.buffer.push_back(Ok(merged));
                }
            }
            return;
        }
        let substituted: Vec<GroupPattern> = self
            .others
            .iter()
            .map(|g| substitute_group(g, map))
            .collect();
        let branch = self.builder.build_where(
            from_rows(self.source_rows.clone()),
            &substituted,
            &self.ctx,
        );
        for item in branch {
            match item {
                Ok(b) => {
                    if let Some(merged) = b.merge(row_binding) {
                        self.buffer.push_back(Ok(merged));
                    }
                }
                Err(e) => self.buffer.push_back(Err(e)),
            }
        }
    }
}

impl Iterator for ValuesIter<'_> {
    type Item = Result<Binding, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(item);
            }
            if self.done {
                return None;
            }
            if let Some(source) = self.source.take() {
                for item in source {
                    match item {
                        Ok(row) => self.source_rows.push(row),
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                }
                debug!(
                    "values rewriting: {} rows x {} groups",
                    self.values.rows.len(),
                    self.others.len()
                );
            }
            if self.row_index >= self.values.rows.len() {
                self.done = true;
                return None;
            }
            let row = &self.values.rows[self.row_index];
            self.row_index += 1;
            let (map, row_binding) = self.row_bindings(&row.clone());
            self.evaluate_row(&map, &row_binding);
        }
    }
}

fn substitute_term(term: &QueryTerm, map: &RowMap) -> QueryTerm {
    match term {
        QueryTerm::Var(v) => map.get(v).cloned().unwrap_or_else(|| term.clone()),
        _ => term.clone(),
    }
}

fn substitute_triple(triple: &BgpTriple, map: &RowMap) -> BgpTriple {
    BgpTriple {
        subject: substitute_term(&triple.subject, map),
        predicate: match &triple.predicate {
            Predicate::Term(t) => Predicate::Term(substitute_term(t, map)),
            Predicate::Path(p) => Predicate::Path(p.clone()),
        },
        object: substitute_term(&triple.object, map),
    }
}

pub(crate) fn substitute_group(group: &GroupPattern, map: &RowMap) -> GroupPattern {
    match group {
        GroupPattern::Bgp(triples) => {
            GroupPattern::Bgp(triples.iter().map(|t| substitute_triple(t, map)).collect())
        }
        GroupPattern::Group(gs) => GroupPattern::Group(substitute_groups(gs, map)),
        GroupPattern::SubQuery(q) => GroupPattern::SubQuery(Box::new(substitute_query(q, map))),
        GroupPattern::Graph { name, patterns } => GroupPattern::Graph {
            name: substitute_term(name, map),
            patterns: substitute_groups(patterns, map),
        },
        GroupPattern::Service {
            endpoint,
            patterns,
            silent,
        } => GroupPattern::Service {
            endpoint: substitute_term(endpoint, map),
            patterns: substitute_groups(patterns, map),
            silent: *silent,
        },
        GroupPattern::Optional(gs) => GroupPattern::Optional(substitute_groups(gs, map)),
        GroupPattern::Union(branches) => {
            GroupPattern::Union(branches.iter().map(|b| substitute_groups(b, map)).collect())
        }
        GroupPattern::Minus(gs) => GroupPattern::Minus(substitute_groups(gs, map)),
        GroupPattern::Filter(e) => GroupPattern::Filter(substitute_expression(e, map)),
        GroupPattern::Bind {
            expression,
            variable,
        } => GroupPattern::Bind {
            expression: substitute_expression(expression, map),
            variable: variable.clone(),
        },
        // A nested VALUES keeps its own rows; recursion picks it up later.
        GroupPattern::Values(v) => GroupPattern::Values(v.clone()),
        GroupPattern::Unsupported(tag) => GroupPattern::Unsupported(tag.clone()),
    }
}

fn substitute_groups(groups: &[GroupPattern], map: &RowMap) -> Vec<GroupPattern> {
    groups.iter().map(|g| substitute_group(g, map)).collect()
}

fn substitute_query(query: &Query, map: &RowMap) -> Query {
    Query {
        where_groups: substitute_groups(&query.where_groups, map),
        variables: query.variables.clone(),
        template: query
            .template
            .iter()
            .map(|t| TemplateTriple {
                subject: substitute_term(&t.subject, map),
                predicate: substitute_term(&t.predicate, map),
                object: substitute_term(&t.object, map),
            })
            .collect(),
        ..query.clone()
    }
}

fn substitute_expression(expr: &Expression, map: &RowMap) -> Expression {
    match expr {
        Expression::Variable(v) => match map.get(v) {
            Some(QueryTerm::Iri(s)) => Expression::Iri(s.clone()),
            Some(QueryTerm::Literal(s)) => Expression::Literal(s.clone()),
            _ => expr.clone(),
        },
        Expression::Bound(v) => {
            if map.contains_key(v) {
                Expression::Literal("true".to_string())
            } else {
                expr.clone()
            }
        }
        Expression::Iri(_) | Expression::Literal(_) => expr.clone(),
        Expression::Compare(a, op, b) => Expression::Compare(
            Box::new(substitute_expression(a, map)),
            *op,
            Box::new(substitute_expression(b, map)),
        ),
        Expression::And(a, b) => Expression::And(
            Box::new(substitute_expression(a, map)),
            Box::new(substitute_expression(b, map)),
        ),
        Expression::Or(a, b) => Expression::Or(
            Box::new(substitute_expression(a, map)),
            Box::new(substitute_expression(b, map)),
        ),
        Expression::Not(inner) => Expression::Not(Box::new(substitute_expression(inner, map))),
        Expression::Arithmetic(a, op, b) => Expression::Arithmetic(
            Box::new(substitute_expression(a, map)),
            *op,
            Box::new(substitute_expression(b, map)),
        ),
        Expression::Regex(a, b, flags) => Expression::Regex(
            Box::new(substitute_expression(a, map)),
            Box::new(substitute_expression(b, map)),
            flags.clone(),
        ),
        Expression::Call { function, args } => Expression::Call {
            function: function.clone(),
            args: args.iter().map(|a| substitute_expression(a, map)).collect(),
        },
        Expression::Exists(gs) => Expression::Exists(substitute_groups(gs, map)),
        Expression::NotExists(gs) => Expression::NotExists(substitute_groups(gs, map)),
    }
}

/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! GRAPH and SERVICE evaluation.
//!
//! Both re-enter the plan builder: GRAPH against a different graph selection
//! of the same dataset, SERVICE against a registered endpoint dataset with
//! its own dictionary. The bound-join strategy batches source bindings into
//! one VALUES-augmented remote evaluation instead of one round-trip per row;
//! both strategies produce the same logical result set.

use crate::context::ExecutionContext;
use crate::custom_error::EngineError;
use crate::dataset::Dataset;
use crate::planner::pipeline::{once_binding, SolutionIter};
use crate::planner::PlanBuilder;
use log::{debug, warn};
use rustc_hash::FxHashSet;
use shared::algebra::{
    Expression, GroupPattern, Predicate, QueryTerm, SelectItem, Value, ValuesClause,
};
use shared::bindings::Binding;
use std::collections::VecDeque;
use std::sync::Arc;
use url::Url;

pub struct GraphExecutor;

impl GraphExecutor {
    /// Evaluates `GRAPH name { patterns }`. A variable name iterates the
    /// named graphs in scope and binds the variable to each graph IRI.
    pub fn evaluate<'a>(
        builder: &'a PlanBuilder,
        source: SolutionIter<'a>,
        name: &'a QueryTerm,
        patterns: &'a [GroupPattern],
        ctx: &ExecutionContext,
    ) -> SolutionIter<'a> {
        let ctx = ctx.clone();
        Box::new(source.flat_map(move |item| {
            let row = match item {
                Ok(row) => row,
                Err(e) => return vec![Err(e)],
            };
            let mut out = Vec::new();
            for graph_iri in candidate_graphs(builder, name, &row, &ctx) {
                let mut scoped = ctx.child();
                scoped.default_graphs = vec![graph_iri.clone()];
                let inner = builder.build_where(once_binding(row.clone()), patterns, &scoped);
                let graph_id = builder.dataset().encode(&graph_iri);
                for inner_item in inner {
                    match inner_item {
                        Ok(b) => match bind_graph_var(name, &b, graph_id) {
                            Some(b) => out.push(Ok(b)),
                            None => {}
                        },
                        Err(e) => out.push(Err(e)),
                    }
                }
            }
            out
        }))
    }
}

fn candidate_graphs(
    builder: &PlanBuilder,
    name: &QueryTerm,
    row: &Binding,
    ctx: &ExecutionContext,
) -> Vec<String> {
    match name {
        QueryTerm::Iri(iri) => vec![iri.clone()],
        QueryTerm::Literal(_) => Vec::new(),
        QueryTerm::Var(v) => match row.get(v).and_then(|id| builder.dataset().decode(id)) {
            Some(iri) => vec![iri],
            None => {
                if ctx.named_graphs.is_empty() {
                    builder.dataset().graph_names()
                } else {
                    ctx.named_graphs.clone()
                }
            }
        },
    }
}

fn bind_graph_var(name: &QueryTerm, row: &Binding, graph_id: u32) -> Option<Binding> {
    match name {
        QueryTerm::Var(v) => match row.get(v) {
            Some(existing) if existing != graph_id => None,
            Some(_) => Some(row.clone()),
            None => Some(row.extend(v, graph_id)),
        },
        _ => Some(row.clone()),
    }
}

pub struct ServiceExecutor;

impl ServiceExecutor {
    /// Evaluates `SERVICE endpoint { patterns }`. A fixed endpoint with
    /// bound-join enabled goes through the batching iterator; a variable
    /// endpoint falls back to the naive one-evaluation-per-binding strategy.
    pub fn evaluate<'a>(
        builder: &'a PlanBuilder,
        source: SolutionIter<'a>,
        endpoint: &'a QueryTerm,
        patterns: &'a [GroupPattern],
        silent: bool,
        ctx: &ExecutionContext,
    ) -> SolutionIter<'a> {
        if let QueryTerm::Iri(iri) = endpoint {
            if builder.config().bound_join {
                return Box::new(BoundJoinIter::new(
                    builder,
                    source,
                    iri.clone(),
                    patterns,
                    silent,
                    ctx,
                ));
            }
        }
        let ctx = ctx.clone();
        Box::new(source.flat_map(move |item| {
            let row = match item {
                Ok(row) => row,
                Err(e) => return vec![Err(e)],
            };
            let iri = match endpoint {
                QueryTerm::Iri(iri) => Some(iri.clone()),
                QueryTerm::Var(v) => row.get(v).and_then(|id| builder.dataset().decode(id)),
                QueryTerm::Literal(_) => None,
            };
            let Some(iri) = iri else {
                return service_failure(
                    silent,
                    EngineError::UnknownService("unresolved service endpoint".to_string()),
                );
            };
            match resolve_endpoint(builder, &iri) {
                Ok(remote) => {
                    let results =
                        naive_service_call(builder, &remote, patterns, &row, &ctx);
                    results.into_iter().map(Ok).collect()
                }
                Err(e) => service_failure(silent, e),
            }
        }))
    }
}

fn service_failure(
    silent: bool,
    error: EngineError,
) -> Vec<Result<Binding, EngineError>> {
    if silent {
        warn!("silent service failure: {}", error);
        Vec::new()
    } else {
        vec![Err(error)]
    }
}

/// Looks an endpoint IRI up in the service registry, validating it first.
fn resolve_endpoint(builder: &PlanBuilder, iri: &str) -> Result<Arc<Dataset>, EngineError> {
    if Url::parse(iri).is_err() {
        return Err(EngineError::ServiceTransport {
            endpoint: iri.to_string(),
            reason: "invalid endpoint IRI".to_string(),
        });
    }
    builder
        .service(iri)
        .ok_or_else(|| EngineError::UnknownService(iri.to_string()))
}

/// One remote evaluation per source binding: the inner group is seeded with
/// the (translated) binding and results are joined back locally.
fn naive_service_call(
    builder: &PlanBuilder,
    remote: &Arc<Dataset>,
    patterns: &[GroupPattern],
    row: &Binding,
    _ctx: &ExecutionContext,
) -> Vec<Binding> {
    let inner_vars = group_variables(patterns);
    let mut remote_seed = Binding::new();
    for (var, id) in row.iter() {
        if !inner_vars.contains(var) {
            continue;
        }
        let Some(term) = builder.dataset().decode(id) else {
            continue;
        };
        match remote.lookup(&term) {
            Some(remote_id) => remote_seed = remote_seed.extend(var, remote_id),
            // The endpoint has never seen this term, so the join is empty.
            None => return Vec::new(),
        }
    }
    let remote_builder = PlanBuilder::new(Arc::clone(remote));
    let remote_ctx = ExecutionContext::new();
    let remote_rows: Vec<Binding> = remote_builder
        .build_where(once_binding(remote_seed), patterns, &remote_ctx)
        .filter_map(Result::ok)
        .collect();
    translate_back(builder, remote, remote_rows)
        .into_iter()
        .filter_map(|r| row.merge(&r))
        .collect()
}

/// Rewrites remote rows into the local dictionary.
fn translate_back(
    builder: &PlanBuilder,
    remote: &Arc<Dataset>,
    rows: Vec<Binding>,
) -> Vec<Binding> {
    rows.into_iter()
        .map(|row| {
            let mut local = Binding::new();
            for (var, id) in row.iter() {
                if let Some(term) = remote.decode(id) {
                    local = local.extend(var, builder.dataset().encode(&term));
                }
            }
            local
        })
        .collect()
}

/// Bound-join batching: collects up to `block` source bindings, rewrites the
/// inner group into a VALUES-augmented query carrying the batch, evaluates it
/// once against the endpoint and redistributes results to their originating
/// bindings.
struct BoundJoinIter<'a> {
    builder: &'a PlanBuilder,
    source: SolutionIter<'a>,
    endpoint: String,
    patterns: &'a [GroupPattern],
    silent: bool,
    ctx: ExecutionContext,
    buffer: VecDeque<Result<Binding, EngineError>>,
    done: bool,
}

impl<'a> BoundJoinIter<'a> {
    fn new(
        builder: &'a PlanBuilder,
        source: SolutionIter<'a>,
        endpoint: String,
        patterns: &'a [GroupPattern],
        silent: bool,
        ctx: &ExecutionContext,
    ) -> Self {
        BoundJoinIter {
            builder,
            source,
            endpoint,
            patterns,
            silent,
            ctx: ctx.child(),
            buffer: VecDeque::new(),
            done: false,
        }
    }

    fn process_batch(&mut self, batch: Vec<Binding>) {
        let remote = match resolve_endpoint(self.builder, &self.endpoint) {
            Ok(remote) => remote,
            Err(e) => {
                for item in service_failure(self.silent, e) {
                    self.buffer.push_back(item);
                }
                self.done = !self.silent;
                return;
            }
        };
        debug!("bound join: one remote evaluation for {} bindings", batch.len());

        let inner_vars = group_variables(self.patterns);
        let mut shared_vars: Vec<String> = batch
            .iter()
            .flat_map(|b| b.variables().cloned())
            .filter(|v| inner_vars.contains(v))
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();
        shared_vars.sort();

        // Build the VALUES block carrying the batch.
        let mut value_rows: Vec<Vec<Value>> = Vec::new();
        for binding in &batch {
            let row: Vec<Value> = shared_vars
                .iter()
                .map(|var| match binding.get(var) {
                    Some(id) => match self.builder.dataset().decode(id) {
                        Some(term) => Value::Term(as_query_term(&term)),
                        None => Value::Undef,
                    },
                    None => Value::Undef,
                })
                .collect();
            if !value_rows.contains(&row) {
                value_rows.push(row);
            }
        }

        let mut rewritten: Vec<GroupPattern> = self.patterns.to_vec();
        if !shared_vars.is_empty() {
            rewritten.push(GroupPattern::Values(ValuesClause {
                variables: shared_vars,
                rows: value_rows,
            }));
        }

        let remote_builder = PlanBuilder::new(Arc::clone(&remote));
        let remote_ctx = ExecutionContext::new();
        let mut remote_rows = Vec::new();
        for item in remote_builder.build_where(
            once_binding(Binding::new()),
            &rewritten,
            &remote_ctx,
        ) {
            match item {
                Ok(row) => remote_rows.push(row),
                Err(e) => {
                    let error = EngineError::ServiceTransport {
                        endpoint: self.endpoint.clone(),
                        reason: e.to_string(),
                    };
                    for item in service_failure(self.silent, error) {
                        self.buffer.push_back(item);
                    }
                    self.done = !self.silent;
                    return;
                }
            }
        }

        let translated = translate_back(self.builder, &remote, remote_rows);
        for source_row in &batch {
            for result in &translated {
                if let Some(merged) = source_row.merge(result) {
                    self.buffer.push_back(Ok(merged));
                }
            }
        }
    }
}

impl Iterator for BoundJoinIter<'_> {
    type Item = Result<Binding, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(item);
            }
            if self.done {
                return None;
            }
            let mut batch = Vec::new();
            let block = self.builder.config().bound_join_block.max(1);
            while batch.len() < block {
                match self.source.next() {
                    Some(Ok(row)) => batch.push(row),
                    Some(Err(e)) => {
                        self.done = true;
                        self.buffer.push_back(Err(e));
                        break;
                    }
                    None => {
                        self.done = true;
                        break;
                    }
                }
            }
            if batch.is_empty() && self.buffer.is_empty() && self.done {
                return None;
            }
            if !batch.is_empty() {
                self.process_batch(batch);
            }
        }
    }
}

/// Classifies a decoded term back into an algebra term. Dictionary terms are
/// stored as raw strings, so the IRI/literal split is shape based.
fn as_query_term(term: &str) -> QueryTerm {
    if term.contains("://") || term.starts_with("urn:") {
        QueryTerm::Iri(term.to_string())
    } else {
        QueryTerm::Literal(term.to_string())
    }
}

/// Every variable mentioned anywhere inside a group list. Bound-join uses
/// this to decide which source variables are worth shipping.
fn group_variables(groups: &[GroupPattern]) -> FxHashSet<String> {
    let mut vars = FxHashSet::default();
    collect_group_vars(groups, &mut vars);
    vars
}

fn collect_group_vars(groups: &[GroupPattern], vars: &mut FxHashSet<String>) {
    for group in groups {
        match group {
            GroupPattern::Bgp(triples) => {
                for t in triples {
                    collect_term_var(&t.subject, vars);
                    if let Predicate::Term(p) = &t.predicate {
                        collect_term_var(p, vars);
                    }
                    collect_term_var(&t.object, vars);
                }
            }
            GroupPattern::Group(gs)
            | GroupPattern::Optional(gs)
            | GroupPattern::Minus(gs) => collect_group_vars(gs, vars),
            GroupPattern::Union(branches) => {
                for branch in branches {
                    collect_group_vars(branch, vars);
                }
            }
            GroupPattern::Graph { name, patterns } => {
                collect_term_var(name, vars);
                collect_group_vars(patterns, vars);
            }
            GroupPattern::Service { endpoint, patterns, .. } => {
                collect_term_var(endpoint, vars);
                collect_group_vars(patterns, vars);
            }
            GroupPattern::Filter(e) => collect_expr_vars(e, vars),
            GroupPattern::Bind {
                expression,
                variable,
            } => {
                vars.insert(variable.clone());
                collect_expr_vars(expression, vars);
            }
            GroupPattern::Values(v) => {
                vars.extend(v.variables.iter().cloned());
            }
            GroupPattern::SubQuery(q) => {
                for item in &q.variables {
                    if let SelectItem::Variable(v) = item {
                        vars.insert(v.clone());
                    }
                }
                collect_group_vars(&q.where_groups, vars);
            }
            GroupPattern::Unsupported(_) => {}
        }
    }
}

fn collect_term_var(term: &QueryTerm, vars: &mut FxHashSet<String>) {
    if let QueryTerm::Var(v) = term {
        vars.insert(v.clone());
    }
}

fn collect_expr_vars(expr: &Expression, vars: &mut FxHashSet<String>) {
    match expr {
        Expression::Variable(v) | Expression::Bound(v) => {
            vars.insert(v.clone());
        }
        Expression::Iri(_) | Expression::Literal(_) => {}
        Expression::Compare(a, _, b)
        | Expression::And(a, b)
        | Expression::Or(a, b)
        | Expression::Arithmetic(a, _, b) => {
            collect_expr_vars(a, vars);
            collect_expr_vars(b, vars);
        }
        Expression::Not(inner) => collect_expr_vars(inner, vars),
        Expression::Regex(a, b, _) => {
            collect_expr_vars(a, vars);
            collect_expr_vars(b, vars);
        }
        Expression::Call { args, .. } => {
            for arg in args {
                collect_expr_vars(arg, vars);
            }
        }
        Expression::Exists(gs) | Expression::NotExists(gs) => collect_group_vars(gs, vars),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::algebra::BgpTriple;

    #[test]
    fn test_group_variables_walks_nested_patterns() {
        let groups = vec![GroupPattern::Optional(vec![GroupPattern::Bgp(vec![
            BgpTriple::plain(
                QueryTerm::var("?s"),
                QueryTerm::iri("http://example.org/p"),
                QueryTerm::var("?o"),
            ),
        ])])];
        let vars = group_variables(&groups);
        assert!(vars.contains("s"));
        assert!(vars.contains("o"));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn test_as_query_term_classifies_iris() {
        assert!(matches!(
            as_query_term("http://example.org/x"),
            QueryTerm::Iri(_)
        ));
        assert!(matches!(as_query_term("plain value"), QueryTerm::Literal(_)));
    }
}

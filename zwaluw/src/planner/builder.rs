/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The plan builder: walks the algebra tree once by recursive descent and
//! composes a single lazy pipeline of operators.
//!
//! Group patterns at one nesting level are reordered so BGPs run before
//! FILTER and VALUES groups, adjacent BGPs merge into one, and the modifier
//! stack is applied in a fixed order: aggregate, order, project, distinct,
//! offset, limit.

use crate::aggregates::AggregateExecutor;
use crate::bgp::BgpExecutor;
use crate::cache::{BgpCache, EvictionStrategy};
use crate::context::{ExecutionContext, INTERNAL_PREFIX};
use crate::custom_error::EngineError;
use crate::dataset::{Dataset, GraphHandle, GraphView};
use crate::expression::{CustomFunction, FunctionRegistry};
use crate::graph_service::{GraphExecutor, ServiceExecutor};
use crate::path::{PathExecutor, PATH_VAR_TAG};
use crate::planner::pipeline::{
    self, bind_op, distinct_op, exists_op, filter_op, once_binding, order_by_op, project_op,
    stream_error, JoinIter, MinusIter, OptionalIter, Projection, SliceIter, SolutionIter,
    UnionIter,
};
use crate::planner::values::ValuesIter;
use crate::results::{MaterializedResults, QueryResults, SolutionStream, TripleStream};
use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use shared::algebra::{
    Aggregate, BgpTriple, Expression, GroupKey, GroupPattern, Operation, Predicate, Query,
    QueryTerm, QueryType, SelectItem, TemplateTriple, ValuesClause,
};
use shared::bindings::Binding;
use shared::triple::Triple;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// Engine-level knobs. The defaults match the reference behavior; callers
/// override them builder-style.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cache_capacity: usize,
    pub bound_join: bool,
    pub bound_join_block: usize,
    pub parallel_join_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cache_capacity: 128,
            bound_join: true,
            bound_join_block: 15,
            parallel_join_threshold: 2048,
        }
    }
}

/// Surface-syntax parser collaborator. The engine consumes algebra trees;
/// turning query text into one is someone else's job.
pub trait QueryParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<Operation, EngineError>;
}

/// Update-request collaborator; the engine only dispatches to it.
pub trait UpdateExecutor: Send + Sync {
    fn execute(&self, update: &str, dataset: &Dataset) -> Result<(), EngineError>;
}

/// Read-only plan summary, mostly useful in logs and tests.
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub query_type: QueryType,
    pub stages: Vec<&'static str>,
    pub cacheable: bool,
    pub uses_cache: bool,
}

pub struct PlanBuilder {
    dataset: Arc<Dataset>,
    config: EngineConfig,
    functions: FunctionRegistry,
    services: FxHashMap<String, Arc<Dataset>>,
    cache: Option<Arc<BgpCache>>,
    parser: Option<Box<dyn QueryParser>>,
    updates: Option<Box<dyn UpdateExecutor>>,
    fresh_ids: Arc<AtomicU64>,
}

impl PlanBuilder {
    pub fn new(dataset: Arc<Dataset>) -> Self {
        PlanBuilder {
            dataset,
            config: EngineConfig::default(),
            functions: FunctionRegistry::new(),
            services: FxHashMap::default(),
            cache: None,
            parser: None,
            updates: None,
            fresh_ids: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_parser(mut self, parser: Box<dyn QueryParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_update_executor(mut self, updates: Box<dyn UpdateExecutor>) -> Self {
        self.updates = Some(updates);
        self
    }

    /// Attaches the semantic BGP cache (creating it on first use) and
    /// returns its control handle.
    pub fn use_cache(&mut self) -> Arc<BgpCache> {
        let capacity = self.config.cache_capacity;
        let cache = self
            .cache
            .get_or_insert_with(|| Arc::new(BgpCache::new(capacity)));
        Arc::clone(cache)
    }

    /// Same as `use_cache` but with a caller-provided eviction strategy.
    pub fn use_cache_with(&mut self, strategy: Box<dyn EvictionStrategy>) -> Arc<BgpCache> {
        let cache = Arc::new(BgpCache::with_strategy(self.config.cache_capacity, strategy));
        self.cache = Some(Arc::clone(&cache));
        cache
    }

    pub fn disable_cache(&mut self) {
        self.cache = None;
    }

    pub fn cache(&self) -> Option<&Arc<BgpCache>> {
        self.cache.as_ref()
    }

    pub fn register_function<F>(&mut self, iri: &str, f: F)
    where
        F: Fn(&[String]) -> Option<String> + Send + Sync + 'static,
    {
        self.functions.register(iri, f);
    }

    pub fn register_custom_function(&mut self, iri: &str, f: CustomFunction) {
        self.functions.register(iri, move |args| f(args));
    }

    /// Maps a SERVICE endpoint IRI to the dataset standing in for it. The
    /// transport behind a real remote endpoint is an external concern.
    pub fn register_service(&mut self, iri: &str, endpoint: Arc<Dataset>) {
        self.services.insert(iri.to_string(), endpoint);
    }

    pub fn service(&self, iri: &str) -> Option<Arc<Dataset>> {
        self.services.get(iri).cloned()
    }

    pub fn dataset(&self) -> &Dataset {
        self.dataset.as_ref()
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parses query text through the configured parser collaborator.
    pub fn parse(&self, text: &str) -> Result<Operation, EngineError> {
        match &self.parser {
            Some(parser) => parser.parse(text),
            None => Err(EngineError::Parse(
                "no query parser configured".to_string(),
            )),
        }
    }

    /// Parses query text through the parser collaborator, runs it and drains
    /// the streams into decoded results. The lazy surface stays on `execute`;
    /// this is the convenience path for raw text.
    pub fn query_text(&self, text: &str) -> Result<MaterializedResults, EngineError> {
        let operation = self.parse(text)?;
        let result = match self.build(&operation)? {
            QueryResults::Solutions(stream) => Ok(MaterializedResults::Solutions(
                stream.materialize(self.dataset())?,
            )),
            QueryResults::Graph(stream) => Ok(MaterializedResults::Graph(
                stream.materialize(self.dataset())?,
            )),
            QueryResults::Boolean(answer) => Ok(MaterializedResults::Boolean(answer)),
        };
        result
    }

    /// Top-level dispatch over a parsed operation.
    pub fn build<'q>(&'q self, operation: &'q Operation) -> Result<QueryResults<'q>, EngineError> {
        match operation {
            Operation::Query(query) => self.execute(query),
            Operation::Update(update) => match &self.updates {
                Some(delegate) => {
                    delegate.execute(update, self.dataset())?;
                    Ok(QueryResults::Boolean(true))
                }
                None => Err(EngineError::UnsupportedQueryType(
                    "update (no update executor configured)".to_string(),
                )),
            },
            Operation::Unsupported(kind) => Err(EngineError::UnsupportedQueryType(kind.clone())),
        }
    }

    /// Compiles and lazily evaluates one query. Plan errors surface here;
    /// runtime errors travel inside the returned stream.
    pub fn execute<'q>(&'q self, query: &'q Query) -> Result<QueryResults<'q>, EngineError> {
        self.validate_query(query)?;
        debug!(
            "planning {:?} query with {} top-level groups",
            query.query_type,
            query.where_groups.len()
        );
        let ctx = self.root_context();
        self.build_query_plan(query, once_binding(Binding::new()), &ctx)
    }

    pub fn explain(&self, query: &Query) -> PlanSummary {
        let mut ordered: Vec<&GroupPattern> = query.where_groups.iter().collect();
        ordered.sort_by_key(|g| dispatch_priority(g));
        PlanSummary {
            query_type: query.query_type,
            stages: ordered.iter().map(|g| g.kind()).collect(),
            cacheable: query.limit.is_none() && query.offset == 0,
            uses_cache: self.cache.is_some(),
        }
    }

    fn root_context(&self) -> ExecutionContext {
        let mut ctx = ExecutionContext::for_session(Arc::clone(&self.fresh_ids));
        ctx.cache = self.cache.clone();
        ctx
    }

    /// The graphs the current scope matches against.
    pub(crate) fn active_view<'b>(&'b self, ctx: &ExecutionContext) -> GraphView<'b> {
        if ctx.default_graphs.is_empty() {
            return GraphView::new(
                vec![GraphHandle::Borrowed(self.dataset.default_graph())],
                "default".to_string(),
            );
        }
        let mut ids = ctx.default_graphs.clone();
        ids.sort();
        let mut handles = Vec::with_capacity(ids.len());
        for iri in &ids {
            match self.dataset.resolve_graph(iri) {
                Some(handle) => handles.push(handle),
                None => warn!("graph {} is not part of the dataset, skipping", iri),
            }
        }
        GraphView::new(handles, ids.join(","))
    }

    fn build_query_plan<'a>(
        &'a self,
        query: &'a Query,
        source: SolutionIter<'a>,
        ctx: &ExecutionContext,
    ) -> Result<QueryResults<'a>, EngineError> {
        match query.query_type {
            QueryType::Select => {
                let variables = select_variable_names(query);
                let stream = self.build_solution_pipeline(query, source, ctx, true);
                Ok(QueryResults::Solutions(SolutionStream::new(
                    variables, stream,
                )))
            }
            QueryType::Ask => {
                let mut stream = self.build_solution_pipeline(query, source, ctx, false);
                match stream.next() {
                    Some(Err(e)) => Err(e),
                    Some(Ok(_)) => Ok(QueryResults::Boolean(true)),
                    None => Ok(QueryResults::Boolean(false)),
                }
            }
            QueryType::Construct => Ok(QueryResults::Graph(
                self.build_construct(query, source, ctx),
            )),
            QueryType::Describe => {
                // Query rewriting, not execution: DESCRIBE becomes a
                // CONSTRUCT over synthesized (target, ?p, ?o) triples.
                let rewritten = rewrite_describe(query);
                let mut triples = Vec::new();
                for item in self.build_construct(&rewritten, source, ctx) {
                    triples.push(item?);
                }
                Ok(QueryResults::Graph(TripleStream::from_owned(triples)))
            }
        }
    }

    /// WHERE pipeline plus the modifier stack, in the fixed order
    /// aggregate → order → project → distinct → offset → limit.
    fn build_solution_pipeline<'a>(
        &'a self,
        query: &'a Query,
        source: SolutionIter<'a>,
        ctx: &ExecutionContext,
        apply_projection: bool,
    ) -> SolutionIter<'a> {
        let mut ctx = ctx.child();
        if !query.from.default.is_empty() {
            ctx.default_graphs = query.from.default.clone();
        }
        if !query.from.named.is_empty() {
            ctx.named_graphs = query.from.named.clone();
        }
        if query.limit.is_some() || query.offset > 0 {
            ctx.cacheable = false;
        }

        let mut stream = self.build_where(source, &query.where_groups, &ctx);

        let aggregates: Vec<(Aggregate, String)> = query
            .variables
            .iter()
            .filter_map(|item| match item {
                SelectItem::Aggregation {
                    aggregate,
                    variable,
                } => Some((aggregate.clone(), variable.clone())),
                _ => None,
            })
            .collect();
        if !query.group_by.is_empty() || !aggregates.is_empty() {
            let group_by = &query.group_by;
            let having = query.having.as_ref();
            let agg_ctx = ctx.clone();
            stream = pipeline::lazy_stage(move || {
                let mut rows = Vec::new();
                for item in stream {
                    match item {
                        Ok(row) => rows.push(row),
                        Err(e) => return vec![Err(e)],
                    }
                }
                AggregateExecutor::evaluate(self, rows, group_by, &aggregates, having, &agg_ctx)
                    .into_iter()
                    .map(Ok)
                    .collect()
            });
        }

        // Post-aggregation BIND stages for "expression AS var" projections.
        for item in &query.variables {
            if let SelectItem::Expression {
                expression,
                variable,
            } = item
            {
                stream = bind_op(self, stream, expression, variable, &ctx);
            }
        }

        if !query.order.is_empty() {
            stream = order_by_op(self, stream, &query.order, &ctx);
        }

        if apply_projection {
            stream = project_op(stream, select_projection(query));
        }

        if query.distinct {
            stream = distinct_op(stream);
        }

        if query.offset > 0 || query.limit.is_some() {
            stream = Box::new(SliceIter::new(stream, query.offset, query.limit));
        }

        stream
    }

    fn build_construct<'a>(
        &'a self,
        query: &'a Query,
        source: SolutionIter<'a>,
        ctx: &ExecutionContext,
    ) -> TripleStream<'a> {
        let stream = self.build_solution_pipeline(query, source, ctx, false);
        let template = &query.template;
        let mut seen: FxHashSet<Triple> = FxHashSet::default();
        TripleStream::new(Box::new(stream.flat_map(move |item| match item {
            Ok(row) => {
                let mut out = Vec::new();
                for pattern in template {
                    if let Some(triple) = self.instantiate(pattern, &row) {
                        if seen.insert(triple) {
                            out.push(Ok(triple));
                        }
                    }
                }
                out
            }
            Err(e) => vec![Err(e)],
        })))
    }

    /// Template triple → concrete triple; rows leaving a template variable
    /// unbound contribute nothing for that triple.
    fn instantiate(&self, pattern: &TemplateTriple, row: &Binding) -> Option<Triple> {
        let resolve = |term: &QueryTerm| -> Option<u32> {
            match term {
                QueryTerm::Var(v) => row.get(v),
                QueryTerm::Iri(s) | QueryTerm::Literal(s) => Some(self.dataset.encode(s)),
            }
        };
        Some(Triple::new(
            resolve(&pattern.subject)?,
            resolve(&pattern.predicate)?,
            resolve(&pattern.object)?,
        ))
    }

    /// Builds one WHERE scope: reorders groups (BGPs first, then the rest,
    /// FILTER and VALUES last), merges adjacent BGPs, then folds every group
    /// over the source stream. A VALUES block reroutes the whole scope
    /// through per-row substitution.
    pub(crate) fn build_where<'a>(
        &'a self,
        source: SolutionIter<'a>,
        groups: &'a [GroupPattern],
        ctx: &ExecutionContext,
    ) -> SolutionIter<'a> {
        let mut ordered: Vec<&'a GroupPattern> = groups.iter().collect();
        ordered.sort_by_key(|g| dispatch_priority(g));

        let mut values_block: Option<&'a ValuesClause> = None;
        let mut rest: Vec<&'a GroupPattern> = Vec::new();
        for group in ordered {
            match group {
                GroupPattern::Values(v) if values_block.is_none() => values_block = Some(v),
                other => rest.push(other),
            }
        }
        if let Some(values) = values_block {
            return Box::new(ValuesIter::new(self, source, values, rest, ctx));
        }

        let mut merged_bgp: Vec<BgpTriple> = Vec::new();
        for group in &rest {
            if let GroupPattern::Bgp(triples) = group {
                merged_bgp.extend(triples.iter().cloned());
            }
        }

        let mut stream = source;
        if !merged_bgp.is_empty() {
            stream = self.build_bgp(stream, merged_bgp, ctx);
        }
        for group in rest {
            if !matches!(group, GroupPattern::Bgp(_)) {
                stream = self.build_group(stream, group, ctx);
            }
        }
        stream
    }

    /// One merged BGP: property paths resolve first (introducing internal
    /// variables), plain triples join after, and the internal path variables
    /// are projected away at the end.
    fn build_bgp<'a>(
        &'a self,
        source: SolutionIter<'a>,
        triples: Vec<BgpTriple>,
        ctx: &ExecutionContext,
    ) -> SolutionIter<'a> {
        let (paths, plains): (Vec<BgpTriple>, Vec<BgpTriple>) =
            triples.into_iter().partition(BgpTriple::is_path);
        let had_paths = !paths.is_empty();
        let mut stream = source;
        if had_paths {
            stream = PathExecutor::evaluate_many(self, stream, paths, ctx);
        }
        if !plains.is_empty() {
            stream = BgpExecutor::evaluate(self, stream, &plains, ctx);
        }
        if had_paths {
            let prefix = format!("{}{}_", INTERNAL_PREFIX, PATH_VAR_TAG);
            stream = Box::new(
                stream.map(move |item| item.map(|row| row.without_prefix(&prefix))),
            );
        }
        stream
    }

    fn build_group<'a>(
        &'a self,
        source: SolutionIter<'a>,
        group: &'a GroupPattern,
        ctx: &ExecutionContext,
    ) -> SolutionIter<'a> {
        match group {
            GroupPattern::Bgp(triples) => self.build_bgp(source, triples.clone(), ctx),
            GroupPattern::Group(groups) => self.build_where(source, groups, &ctx.child()),
            GroupPattern::SubQuery(query) => {
                // The sub-select is evaluated bottom-up against an empty seed
                // and only its projected variables join the outer scope.
                let sub = self.build_solution_pipeline(
                    query,
                    once_binding(Binding::new()),
                    &ctx.child(),
                    true,
                );
                Box::new(JoinIter::new(source, sub))
            }
            GroupPattern::Graph { name, patterns } => {
                GraphExecutor::evaluate(self, source, name, patterns, ctx)
            }
            GroupPattern::Service {
                endpoint,
                patterns,
                silent,
            } => ServiceExecutor::evaluate(self, source, endpoint, patterns, *silent, ctx),
            GroupPattern::Optional(patterns) => {
                Box::new(OptionalIter::new(self, source, patterns, ctx))
            }
            GroupPattern::Union(branches) => {
                Box::new(UnionIter::new(self, source, branches, ctx))
            }
            GroupPattern::Minus(patterns) => {
                Box::new(MinusIter::new(self, source, patterns, ctx))
            }
            GroupPattern::Filter(expression) => match expression {
                Expression::Exists(groups) => exists_op(self, source, groups, true, ctx),
                Expression::NotExists(groups) => exists_op(self, source, groups, false, ctx),
                other => filter_op(self, source, other, ctx),
            },
            GroupPattern::Bind {
                expression,
                variable,
            } => bind_op(self, source, expression, variable, ctx),
            GroupPattern::Values(values) => {
                Box::new(ValuesIter::new(self, source, values, Vec::new(), ctx))
            }
            // Validation rejects these before evaluation; kept for the
            // exhaustiveness guarantee.
            GroupPattern::Unsupported(kind) => {
                stream_error(EngineError::UnsupportedGroupPattern(kind.clone()))
            }
        }
    }

    /// Per-row existence probe used by EXISTS / NOT EXISTS.
    pub(crate) fn exists_check(
        &self,
        binding: &Binding,
        groups: &[GroupPattern],
        ctx: &ExecutionContext,
    ) -> bool {
        let scoped = ctx.child();
        for item in self.build_where(once_binding(binding.clone()), groups, &scoped) {
            match item {
                Ok(_) => return true,
                Err(e) => {
                    warn!("EXISTS inner evaluation failed, treating as no match: {}", e);
                }
            }
        }
        false
    }

    /// Plan-time validation: everything §compile-time in the error taxonomy
    /// is rejected here, before any dataset call happens.
    fn validate_query(&self, query: &Query) -> Result<(), EngineError> {
        self.validate_groups(&query.where_groups)?;
        for item in &query.variables {
            match item {
                SelectItem::Expression { expression, .. } => {
                    self.validate_expression(expression)?;
                }
                SelectItem::Aggregation { aggregate, .. } => {
                    if let Some(expression) = &aggregate.expression {
                        self.validate_expression(expression)?;
                    }
                }
                SelectItem::All | SelectItem::Variable(_) => {}
            }
        }
        for key in &query.group_by {
            if let GroupKey::Expression { expression, .. } = key {
                self.validate_expression(expression)?;
            }
        }
        if let Some(having) = &query.having {
            self.validate_expression(having)?;
        }
        for key in &query.order {
            self.validate_expression(&key.expression)?;
        }
        Ok(())
    }

    fn validate_groups(&self, groups: &[GroupPattern]) -> Result<(), EngineError> {
        for group in groups {
            match group {
                GroupPattern::Bgp(triples) => {
                    for triple in triples {
                        if let Predicate::Path(path) = &triple.predicate {
                            PathExecutor::validate(path)?;
                        }
                    }
                }
                GroupPattern::Group(gs)
                | GroupPattern::Optional(gs)
                | GroupPattern::Minus(gs) => self.validate_groups(gs)?,
                GroupPattern::Union(branches) => {
                    for branch in branches {
                        self.validate_groups(branch)?;
                    }
                }
                GroupPattern::Graph { patterns, .. }
                | GroupPattern::Service { patterns, .. } => self.validate_groups(patterns)?,
                GroupPattern::SubQuery(query) => {
                    if query.query_type != QueryType::Select {
                        return Err(EngineError::UnsupportedGroupPattern(
                            "nested non-SELECT query".to_string(),
                        ));
                    }
                    self.validate_query(query)?;
                }
                GroupPattern::Filter(expression) => self.validate_expression(expression)?,
                GroupPattern::Bind { expression, .. } => self.validate_expression(expression)?,
                GroupPattern::Values(_) => {}
                GroupPattern::Unsupported(kind) => {
                    return Err(EngineError::UnsupportedGroupPattern(kind.clone()));
                }
            }
        }
        Ok(())
    }

    fn validate_expression(&self, expression: &Expression) -> Result<(), EngineError> {
        match expression {
            Expression::Variable(_)
            | Expression::Iri(_)
            | Expression::Literal(_)
            | Expression::Bound(_) => Ok(()),
            Expression::Compare(a, _, b)
            | Expression::And(a, b)
            | Expression::Or(a, b)
            | Expression::Arithmetic(a, _, b) => {
                self.validate_expression(a)?;
                self.validate_expression(b)
            }
            Expression::Not(inner) => self.validate_expression(inner),
            Expression::Regex(a, b, _) => {
                self.validate_expression(a)?;
                self.validate_expression(b)
            }
            Expression::Call { function, args } => {
                if !self.functions.contains(function) {
                    return Err(EngineError::UnknownFunction(function.clone()));
                }
                for arg in args {
                    self.validate_expression(arg)?;
                }
                Ok(())
            }
            Expression::Exists(groups) | Expression::NotExists(groups) => {
                self.validate_groups(groups)
            }
        }
    }
}

/// Group evaluation priority: joins before filters before value injection.
fn dispatch_priority(group: &GroupPattern) -> u8 {
    match group {
        GroupPattern::Bgp(_) => 0,
        GroupPattern::Filter(_) => 2,
        GroupPattern::Values(_) => 3,
        _ => 1,
    }
}

fn select_variable_names(query: &Query) -> Vec<String> {
    let mut names = Vec::new();
    for item in &query.variables {
        match item {
            SelectItem::All => return Vec::new(),
            SelectItem::Variable(v) => names.push(v.clone()),
            SelectItem::Expression { variable, .. }
            | SelectItem::Aggregation { variable, .. } => names.push(variable.clone()),
        }
    }
    names
}

fn select_projection(query: &Query) -> Projection {
    let names = select_variable_names(query);
    if names.is_empty() {
        Projection::All
    } else {
        Projection::Vars(names)
    }
}

/// DESCRIBE → CONSTRUCT rewriting: one synthesized `(target ?p ?o)` pattern
/// and template triple per described variable or IRI.
fn rewrite_describe(query: &Query) -> Query {
    let mut where_groups = query.where_groups.clone();
    let mut template = Vec::new();
    let mut bgp = Vec::new();
    for (i, target) in query.describe.iter().enumerate() {
        let p = format!("{}desc_p{}", INTERNAL_PREFIX, i);
        let o = format!("{}desc_o{}", INTERNAL_PREFIX, i);
        bgp.push(BgpTriple::plain(
            target.clone(),
            QueryTerm::Var(p.clone()),
            QueryTerm::Var(o.clone()),
        ));
        template.push(TemplateTriple {
            subject: target.clone(),
            predicate: QueryTerm::Var(p),
            object: QueryTerm::Var(o),
        });
    }
    where_groups.push(GroupPattern::Bgp(bgp));
    Query {
        query_type: QueryType::Construct,
        variables: Vec::new(),
        where_groups,
        template,
        describe: Vec::new(),
        ..query.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_priority_orders_groups() {
        let bgp = GroupPattern::Bgp(Vec::new());
        let filter = GroupPattern::Filter(Expression::Literal("true".to_string()));
        let values = GroupPattern::Values(ValuesClause {
            variables: Vec::new(),
            rows: Vec::new(),
        });
        assert!(dispatch_priority(&bgp) < dispatch_priority(&filter));
        assert!(dispatch_priority(&filter) < dispatch_priority(&values));
    }

    #[test]
    fn test_rewrite_describe_synthesizes_construct() {
        let query = Query::describe(vec![QueryTerm::iri("http://example.org/a")], Vec::new());
        let rewritten = rewrite_describe(&query);
        assert_eq!(rewritten.query_type, QueryType::Construct);
        assert_eq!(rewritten.template.len(), 1);
        assert_eq!(rewritten.where_groups.len(), 1);
        assert!(rewritten.describe.is_empty());
    }
}

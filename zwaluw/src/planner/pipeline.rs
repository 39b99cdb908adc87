/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The lazy operator set.
//!
//! Every operator is a pull iterator over `Result<Binding, _>`. Nothing runs
//! until a consumer demands a row, and a consumer that stops pulling cancels
//! the whole upstream chain. `Err` items are stream-level failures and flow
//! through untouched; row-level expression failures are absorbed here
//! (FILTER drops the row, BIND leaves the variable unbound).

use crate::context::{ExecutionContext, INTERNAL_PREFIX};
use crate::custom_error::EngineError;
use crate::expression::{self, EvalScope, ExprValue};
use crate::planner::PlanBuilder;
use rustc_hash::FxHashSet;
use shared::algebra::{Expression, GroupPattern, OrderKey};
use shared::bindings::Binding;
use std::collections::VecDeque;

pub type SolutionIter<'a> = Box<dyn Iterator<Item = Result<Binding, EngineError>> + 'a>;

pub fn once_binding<'a>(binding: Binding) -> SolutionIter<'a> {
    Box::new(std::iter::once(Ok(binding)))
}

pub fn from_rows<'a>(rows: Vec<Binding>) -> SolutionIter<'a> {
    Box::new(rows.into_iter().map(Ok))
}

pub fn empty_stream<'a>() -> SolutionIter<'a> {
    Box::new(std::iter::empty())
}

pub fn stream_error<'a>(error: EngineError) -> SolutionIter<'a> {
    Box::new(std::iter::once(Err(error)))
}

/// Defers a materializing stage until the first pull.
pub fn lazy_stage<'a, F>(f: F) -> SolutionIter<'a>
where
    F: FnOnce() -> Vec<Result<Binding, EngineError>> + 'a,
{
    let mut thunk = Some(f);
    let mut buffer: VecDeque<Result<Binding, EngineError>> = VecDeque::new();
    Box::new(std::iter::from_fn(move || {
        if let Some(f) = thunk.take() {
            buffer = f().into();
        }
        buffer.pop_front()
    }))
}

/// BIND: extends each row with one computed variable. An evaluation error
/// leaves the variable unbound for that row; the row itself survives.
pub fn bind_op<'a>(
    builder: &'a PlanBuilder,
    source: SolutionIter<'a>,
    expression: &'a Expression,
    variable: &'a str,
    ctx: &ExecutionContext,
) -> SolutionIter<'a> {
    let ctx = ctx.clone();
    Box::new(source.filter_map(move |item| match item {
        Ok(row) => {
            let scope = EvalScope { builder, ctx: &ctx };
            match expression::eval(expression, &row, &scope) {
                Ok(value) => {
                    let id = builder.dataset().encode(&value.lexical());
                    match row.get(variable) {
                        // Rebinding with a different value is a join conflict.
                        Some(existing) if existing != id => None,
                        Some(_) => Some(Ok(row)),
                        None => Some(Ok(row.extend(variable, id))),
                    }
                }
                Err(_) => Some(Ok(row)),
            }
        }
        Err(e) => Some(Err(e)),
    }))
}

/// FILTER: keeps rows whose expression evaluates to a true effective boolean
/// value. Errors count as "filter fails", per SPARQL.
pub fn filter_op<'a>(
    builder: &'a PlanBuilder,
    source: SolutionIter<'a>,
    expression: &'a Expression,
    ctx: &ExecutionContext,
) -> SolutionIter<'a> {
    let ctx = ctx.clone();
    Box::new(source.filter(move |item| match item {
        Ok(row) => {
            let scope = EvalScope { builder, ctx: &ctx };
            expression::eval(expression, row, &scope)
                .and_then(|v| v.ebv())
                .unwrap_or(false)
        }
        Err(_) => true,
    }))
}

/// EXISTS / NOT EXISTS: re-evaluates the inner group per incoming row and
/// keeps the row iff at least one (resp. zero) match exists.
pub fn exists_op<'a>(
    builder: &'a PlanBuilder,
    source: SolutionIter<'a>,
    groups: &'a [GroupPattern],
    expect: bool,
    ctx: &ExecutionContext,
) -> SolutionIter<'a> {
    let ctx = ctx.clone();
    Box::new(source.filter(move |item| match item {
        Ok(row) => builder.exists_check(row, groups, &ctx) == expect,
        Err(_) => true,
    }))
}

/// OPTIONAL: left outer join. A left row without a compatible inner match is
/// emitted unchanged, so the left cardinality is never reduced.
pub struct OptionalIter<'a> {
    builder: &'a PlanBuilder,
    patterns: &'a [GroupPattern],
    ctx: ExecutionContext,
    left: SolutionIter<'a>,
    pending: VecDeque<Result<Binding, EngineError>>,
}

impl<'a> OptionalIter<'a> {
    pub fn new(
        builder: &'a PlanBuilder,
        left: SolutionIter<'a>,
        patterns: &'a [GroupPattern],
        ctx: &ExecutionContext,
    ) -> Self {
        OptionalIter {
            builder,
            patterns,
            ctx: ctx.child(),
            left,
            pending: VecDeque::new(),
        }
    }
}

impl Iterator for OptionalIter<'_> {
    type Item = Result<Binding, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            match self.left.next()? {
                Err(e) => return Some(Err(e)),
                Ok(row) => {
                    let inner = self.builder.build_where(
                        once_binding(row.clone()),
                        self.patterns,
                        &self.ctx,
                    );
                    let mut matched = false;
                    for item in inner {
                        matched = true;
                        self.pending.push_back(item);
                    }
                    if !matched {
                        return Some(Ok(row));
                    }
                }
            }
        }
    }
}

/// UNION: every branch is evaluated independently against the same source
/// rows and the outputs are concatenated. Branches need not share variables.
pub struct UnionIter<'a> {
    builder: &'a PlanBuilder,
    branches: &'a [Vec<GroupPattern>],
    ctx: ExecutionContext,
    source: Option<SolutionIter<'a>>,
    rows: Vec<Binding>,
    branch: usize,
    current: Option<SolutionIter<'a>>,
    done: bool,
}

impl<'a> UnionIter<'a> {
    pub fn new(
        builder: &'a PlanBuilder,
        source: SolutionIter<'a>,
        branches: &'a [Vec<GroupPattern>],
        ctx: &ExecutionContext,
    ) -> Self {
        UnionIter {
            builder,
            branches,
            ctx: ctx.child(),
            source: Some(source),
            rows: Vec::new(),
            branch: 0,
            current: None,
            done: false,
        }
    }
}

impl Iterator for UnionIter<'_> {
    type Item = Result<Binding, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        // The source is replayed once per branch, so it is drained up front.
        if let Some(source) = self.source.take() {
            for item in source {
                match item {
                    Ok(row) => self.rows.push(row),
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                }
            }
        }
        loop {
            if let Some(current) = self.current.as_mut() {
                match current.next() {
                    Some(item) => return Some(item),
                    None => self.current = None,
                }
            }
            if self.branch >= self.branches.len() {
                return None;
            }
            let branch = &self.branches[self.branch];
            self.branch += 1;
            self.current = Some(self.builder.build_where(
                from_rows(self.rows.clone()),
                branch,
                &self.ctx,
            ));
        }
    }
}

/// MINUS: emits a left row unless some right row shares a variable with it
/// and agrees on every shared variable.
pub struct MinusIter<'a> {
    builder: &'a PlanBuilder,
    patterns: &'a [GroupPattern],
    ctx: ExecutionContext,
    left: SolutionIter<'a>,
    right: Option<Vec<Binding>>,
    done: bool,
}

impl<'a> MinusIter<'a> {
    pub fn new(
        builder: &'a PlanBuilder,
        left: SolutionIter<'a>,
        patterns: &'a [GroupPattern],
        ctx: &ExecutionContext,
    ) -> Self {
        MinusIter {
            builder,
            patterns,
            ctx: ctx.child(),
            left,
            right: None,
            done: false,
        }
    }
}

impl Iterator for MinusIter<'_> {
    type Item = Result<Binding, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.right.is_none() {
            let mut rows = Vec::new();
            let stream =
                self.builder
                    .build_where(once_binding(Binding::new()), self.patterns, &self.ctx);
            for item in stream {
                match item {
                    Ok(row) => rows.push(row),
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                }
            }
            self.right = Some(rows);
        }
        let right = self.right.as_deref().unwrap_or(&[]);
        loop {
            match self.left.next()? {
                Err(e) => return Some(Err(e)),
                Ok(row) => {
                    let eliminated = right
                        .iter()
                        .any(|r| row.shares_variable(r) && row.compatible(r));
                    if !eliminated {
                        return Some(Ok(row));
                    }
                }
            }
        }
    }
}

/// Merge join against an independently evaluated right-hand side. Nested
/// sub-selects go through this: the subquery runs bottom-up from an empty
/// seed, and its projected rows join each source row by compatibility.
pub struct JoinIter<'a> {
    left: SolutionIter<'a>,
    right_source: Option<SolutionIter<'a>>,
    right: Vec<Binding>,
    pending: VecDeque<Result<Binding, EngineError>>,
    done: bool,
}

impl<'a> JoinIter<'a> {
    pub fn new(left: SolutionIter<'a>, right: SolutionIter<'a>) -> Self {
        JoinIter {
            left,
            right_source: Some(right),
            right: Vec::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }
}

impl Iterator for JoinIter<'_> {
    type Item = Result<Binding, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(source) = self.right_source.take() {
            for item in source {
                match item {
                    Ok(row) => self.right.push(row),
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                }
            }
        }
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            match self.left.next()? {
                Err(e) => return Some(Err(e)),
                Ok(row) => {
                    for r in &self.right {
                        if let Some(merged) = row.merge(r) {
                            self.pending.push_back(Ok(merged));
                        }
                    }
                }
            }
        }
    }
}

/// One comparable sort key component. Unbound sorts before bound, numbers
/// before other terms.
#[derive(Debug, Clone, PartialEq)]
enum OrderValue {
    Missing,
    Number(f64),
    Text(String),
}

fn compare_values(a: &OrderValue, b: &OrderValue) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (OrderValue::Missing, OrderValue::Missing) => Ordering::Equal,
        (OrderValue::Missing, _) => Ordering::Less,
        (_, OrderValue::Missing) => Ordering::Greater,
        (OrderValue::Number(x), OrderValue::Number(y)) => {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        (OrderValue::Number(_), OrderValue::Text(_)) => Ordering::Less,
        (OrderValue::Text(_), OrderValue::Number(_)) => Ordering::Greater,
        (OrderValue::Text(x), OrderValue::Text(y)) => x.cmp(y),
    }
}

/// ORDER BY: materializes the stream and applies a stable multi-key sort.
/// Ascending by default; DESC reverses its single key.
pub fn order_by_op<'a>(
    builder: &'a PlanBuilder,
    source: SolutionIter<'a>,
    keys: &'a [OrderKey],
    ctx: &ExecutionContext,
) -> SolutionIter<'a> {
    let ctx = ctx.clone();
    lazy_stage(move || {
        let mut rows = Vec::new();
        for item in source {
            match item {
                Ok(row) => rows.push(row),
                Err(e) => return vec![Err(e)],
            }
        }
        let scope = EvalScope { builder, ctx: &ctx };
        let mut keyed: Vec<(Vec<OrderValue>, Binding)> = rows
            .into_iter()
            .map(|row| {
                let key = keys
                    .iter()
                    .map(|k| match expression::eval(&k.expression, &row, &scope) {
                        Ok(ExprValue::Number(n)) => OrderValue::Number(n),
                        Ok(value) => {
                            let text = value.lexical();
                            match expression::parse_numeric(&text) {
                                Some(n) => OrderValue::Number(n),
                                None => OrderValue::Text(
                                    expression::literal_text(&text).to_string(),
                                ),
                            }
                        }
                        Err(_) => OrderValue::Missing,
                    })
                    .collect();
                (key, row)
            })
            .collect();
        keyed.sort_by(|(ka, _), (kb, _)| {
            for (i, key) in keys.iter().enumerate() {
                let ordering = compare_values(&ka[i], &kb[i]);
                let ordering = if key.descending {
                    ordering.reverse()
                } else {
                    ordering
                };
                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
        keyed.into_iter().map(|(_, row)| Ok(row)).collect()
    })
}

/// Projection applied by SELECT. `All` drops engine-internal variables only.
pub enum Projection {
    All,
    Vars(Vec<String>),
}

pub fn project_op<'a>(source: SolutionIter<'a>, projection: Projection) -> SolutionIter<'a> {
    Box::new(source.map(move |item| {
        item.map(|row| match &projection {
            Projection::All => row.without_prefix(INTERNAL_PREFIX),
            Projection::Vars(vars) => row.project(vars),
        })
    }))
}

/// DISTINCT: hash-based dedup on the serialized binding.
pub fn distinct_op<'a>(source: SolutionIter<'a>) -> SolutionIter<'a> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    Box::new(source.filter(move |item| match item {
        Ok(row) => seen.insert(row.fingerprint()),
        Err(_) => true,
    }))
}

/// OFFSET then LIMIT. Once the limit is reached the upstream is no longer
/// pulled at all.
pub struct SliceIter<'a> {
    source: SolutionIter<'a>,
    to_skip: usize,
    remaining: Option<usize>,
}

impl<'a> SliceIter<'a> {
    pub fn new(source: SolutionIter<'a>, offset: usize, limit: Option<usize>) -> Self {
        SliceIter {
            source,
            to_skip: offset,
            remaining: limit,
        }
    }
}

impl Iterator for SliceIter<'_> {
    type Item = Result<Binding, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        loop {
            match self.source.next()? {
                Err(e) => return Some(Err(e)),
                Ok(row) => {
                    if self.to_skip > 0 {
                        self.to_skip -= 1;
                        continue;
                    }
                    if let Some(remaining) = self.remaining.as_mut() {
                        *remaining -= 1;
                    }
                    return Some(Ok(row));
                }
            }
        }
    }
}

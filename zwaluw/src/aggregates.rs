/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Grouping and aggregate-function application.
//!
//! Numeric coercion is lenient: values that fail to parse are skipped rather
//! than erroring, mirroring how literals are stored as raw strings in the
//! dictionary. MIN/MAX fall back to lexical comparison for non-numeric terms.

use crate::context::ExecutionContext;
use crate::expression::{self, format_number, literal_text, parse_numeric, EvalScope};
use crate::planner::PlanBuilder;
use rustc_hash::FxHashMap;
use shared::algebra::{Aggregate, AggregateFunction, Expression, GroupKey};
use shared::bindings::Binding;

pub struct AggregateExecutor;

impl AggregateExecutor {
    /// Groups the materialized rows, applies each aggregate per group and
    /// filters through HAVING. Without GROUP BY the whole input is one group,
    /// including the empty input (COUNT over nothing is still one row).
    pub fn evaluate(
        builder: &PlanBuilder,
        rows: Vec<Binding>,
        group_by: &[GroupKey],
        aggregates: &[(Aggregate, String)],
        having: Option<&Expression>,
        ctx: &ExecutionContext,
    ) -> Vec<Binding> {
        let scope = EvalScope { builder, ctx };

        // "expression AS var" keys bind their variable before grouping.
        let rows: Vec<Binding> = rows
            .into_iter()
            .map(|row| {
                let mut row = row;
                for key in group_by {
                    if let GroupKey::Expression {
                        expression,
                        variable,
                    } = key
                    {
                        if let Ok(value) = expression::eval(expression, &row, &scope) {
                            let id = builder.dataset().encode(&value.lexical());
                            row = row.extend(variable, id);
                        }
                    }
                }
                row
            })
            .collect();

        let key_vars: Vec<&str> = group_by
            .iter()
            .map(|k| match k {
                GroupKey::Variable(v) => v.as_str(),
                GroupKey::Expression { variable, .. } => variable.as_str(),
            })
            .collect();

        // Group in first-seen order.
        let mut order: Vec<Vec<Option<u32>>> = Vec::new();
        let mut groups: FxHashMap<Vec<Option<u32>>, Vec<Binding>> = FxHashMap::default();
        for row in rows {
            let key: Vec<Option<u32>> = key_vars.iter().map(|v| row.get(v)).collect();
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(row);
        }
        if order.is_empty() && group_by.is_empty() {
            order.push(Vec::new());
            groups.insert(Vec::new(), Vec::new());
        }

        let mut out = Vec::with_capacity(order.len());
        for key in order {
            let members = groups.remove(&key).unwrap_or_default();
            let mut binding = Binding::new();
            for (var, id) in key_vars.iter().zip(&key) {
                if let Some(id) = id {
                    binding = binding.extend(var, *id);
                }
            }
            for (aggregate, variable) in aggregates {
                if let Some(value) = apply(aggregate, &members, &scope) {
                    let id = builder.dataset().encode(&value);
                    binding = binding.extend(variable, id);
                }
            }
            out.push(binding);
        }

        match having {
            Some(condition) => out
                .into_iter()
                .filter(|row| {
                    expression::eval(condition, row, &scope)
                        .and_then(|v| v.ebv())
                        .unwrap_or(false)
                })
                .collect(),
            None => out,
        }
    }
}

fn apply(aggregate: &Aggregate, rows: &[Binding], scope: &EvalScope<'_>) -> Option<String> {
    let mut values: Vec<String> = match &aggregate.expression {
        None => {
            // COUNT(*) counts rows, not values.
            return Some(rows.len().to_string());
        }
        Some(expr) => rows
            .iter()
            .filter_map(|row| expression::eval(expr, row, scope).ok())
            .map(|v| v.lexical())
            .collect(),
    };
    if aggregate.distinct {
        let mut seen = rustc_hash::FxHashSet::default();
        values.retain(|v| seen.insert(v.clone()));
    }

    match aggregate.function {
        AggregateFunction::Count => Some(values.len().to_string()),
        AggregateFunction::Sum => {
            let sum: f64 = values.iter().filter_map(|v| parse_numeric(v)).sum();
            Some(format_number(sum))
        }
        AggregateFunction::Avg => {
            let numbers: Vec<f64> = values.iter().filter_map(|v| parse_numeric(v)).collect();
            if numbers.is_empty() {
                Some("0".to_string())
            } else {
                Some(format_number(numbers.iter().sum::<f64>() / numbers.len() as f64))
            }
        }
        AggregateFunction::Min => pick(values, false),
        AggregateFunction::Max => pick(values, true),
        AggregateFunction::Sample => values.into_iter().next(),
        AggregateFunction::GroupConcat => {
            let separator = aggregate.separator.as_deref().unwrap_or(" ");
            Some(
                values
                    .iter()
                    .map(|v| literal_text(v).to_string())
                    .collect::<Vec<_>>()
                    .join(separator),
            )
        }
    }
}

/// MIN/MAX over mixed values: numeric comparison when both sides parse,
/// lexical otherwise. Returns the original lexical form of the winner.
fn pick(values: Vec<String>, want_max: bool) -> Option<String> {
    values.into_iter().reduce(|best, candidate| {
        let ordering = match (parse_numeric(&best), parse_numeric(&candidate)) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
            _ => literal_text(&best).cmp(literal_text(&candidate)),
        };
        let candidate_wins = if want_max {
            ordering == std::cmp::Ordering::Less
        } else {
            ordering == std::cmp::Ordering::Greater
        };
        if candidate_wins {
            candidate
        } else {
            best
        }
    })
}

/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Scalar expression evaluation.
//!
//! Deliberately small: enough for FILTER/BIND/ORDER BY/HAVING and the custom
//! function table. The full SPARQL builtin library is an external concern.
//! Every failure here is row-local — callers turn it into "filter fails" or
//! "variable stays unbound", never into a stream error.

use crate::context::ExecutionContext;
use crate::planner::PlanBuilder;
use chrono::DateTime;
use regex::RegexBuilder;
use rustc_hash::FxHashMap;
use shared::algebra::{ArithmeticOp, Comparator, Expression};
use shared::bindings::Binding;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("expression error: {0}")]
pub struct ExprError(pub String);

fn err(msg: &str) -> ExprError {
    ExprError(msg.to_string())
}

/// A custom function: takes lexical argument forms, returns a lexical result
/// or `None` for failure.
pub type CustomFunction = Arc<dyn Fn(&[String]) -> Option<String> + Send + Sync>;

/// Function IRI → callable. Registered once per engine; referencing an
/// unregistered IRI is rejected at plan time.
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    map: FxHashMap<String, CustomFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        FunctionRegistry::default()
    }

    pub fn register<F>(&mut self, iri: &str, f: F)
    where
        F: Fn(&[String]) -> Option<String> + Send + Sync + 'static,
    {
        self.map.insert(iri.to_string(), Arc::new(f));
    }

    pub fn contains(&self, iri: &str) -> bool {
        self.map.contains_key(iri)
    }

    pub fn get(&self, iri: &str) -> Option<&CustomFunction> {
        self.map.get(iri)
    }
}

/// Everything expression evaluation may reach: the builder for dictionary
/// access and EXISTS re-entry, and the scope's context.
pub struct EvalScope<'a> {
    pub builder: &'a PlanBuilder,
    pub ctx: &'a ExecutionContext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    /// An RDF term in lexical form (IRI or literal).
    Term(String),
    Number(f64),
    Bool(bool),
}

impl ExprValue {
    pub fn lexical(&self) -> String {
        match self {
            ExprValue::Term(s) => s.clone(),
            ExprValue::Number(n) => format_number(*n),
            ExprValue::Bool(b) => b.to_string(),
        }
    }

    /// Effective boolean value.
    pub fn ebv(&self) -> Result<bool, ExprError> {
        match self {
            ExprValue::Bool(b) => Ok(*b),
            ExprValue::Number(n) => Ok(*n != 0.0),
            ExprValue::Term(s) => {
                let text = literal_text(s);
                match text {
                    "true" => Ok(true),
                    "false" => Ok(false),
                    _ => {
                        if let Ok(n) = text.parse::<f64>() {
                            Ok(n != 0.0)
                        } else {
                            Ok(!text.is_empty())
                        }
                    }
                }
            }
        }
    }
}

/// Strips quoting, language tags and datatype suffixes from a stored term,
/// yielding the bare lexical value: `"30"^^<xsd:int>` becomes `30`.
pub fn literal_text(term: &str) -> &str {
    if let Some(rest) = term.strip_prefix('"') {
        if let Some(end) = rest.rfind('"') {
            return &rest[..end];
        }
    }
    term
}

pub fn parse_numeric(term: &str) -> Option<f64> {
    literal_text(term).parse::<f64>().ok()
}

/// Integer-looking floats print without the fractional part, matching how
/// plain literals were stored in the first place.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

pub fn eval(
    expr: &Expression,
    binding: &Binding,
    scope: &EvalScope<'_>,
) -> Result<ExprValue, ExprError> {
    match expr {
        Expression::Variable(v) => {
            let id = binding.get(v).ok_or_else(|| err("unbound variable"))?;
            let term = scope
                .builder
                .dataset()
                .decode(id)
                .ok_or_else(|| err("dangling dictionary id"))?;
            Ok(ExprValue::Term(term))
        }
        Expression::Iri(s) | Expression::Literal(s) => Ok(ExprValue::Term(s.clone())),
        Expression::Compare(a, op, b) => {
            let left = eval(a, binding, scope)?;
            let right = eval(b, binding, scope)?;
            Ok(ExprValue::Bool(compare(&left, *op, &right)?))
        }
        Expression::And(a, b) => {
            let left = eval(a, binding, scope)?.ebv()?;
            if !left {
                return Ok(ExprValue::Bool(false));
            }
            Ok(ExprValue::Bool(eval(b, binding, scope)?.ebv()?))
        }
        Expression::Or(a, b) => {
            let left = eval(a, binding, scope)?.ebv()?;
            if left {
                return Ok(ExprValue::Bool(true));
            }
            Ok(ExprValue::Bool(eval(b, binding, scope)?.ebv()?))
        }
        Expression::Not(inner) => Ok(ExprValue::Bool(!eval(inner, binding, scope)?.ebv()?)),
        Expression::Arithmetic(a, op, b) => {
            let left = numeric_operand(a, binding, scope)?;
            let right = numeric_operand(b, binding, scope)?;
            let value = match op {
                ArithmeticOp::Add => left + right,
                ArithmeticOp::Sub => left - right,
                ArithmeticOp::Mul => left * right,
                ArithmeticOp::Div => {
                    if right == 0.0 {
                        return Err(err("division by zero"));
                    }
                    left / right
                }
            };
            Ok(ExprValue::Number(value))
        }
        Expression::Bound(v) => Ok(ExprValue::Bool(binding.contains(v))),
        Expression::Regex(text, pattern, flags) => {
            let text = eval(text, binding, scope)?.lexical();
            let pattern = eval(pattern, binding, scope)?.lexical();
            let regex = RegexBuilder::new(literal_text(&pattern))
                .case_insensitive(flags.as_deref().map_or(false, |f| f.contains('i')))
                .build()
                .map_err(|e| ExprError(format!("invalid regex: {}", e)))?;
            Ok(ExprValue::Bool(regex.is_match(literal_text(&text))))
        }
        Expression::Call { function, args } => {
            let callable = scope
                .builder
                .functions()
                .get(function)
                .ok_or_else(|| ExprError(format!("unknown function {}", function)))?;
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, binding, scope)?.lexical());
            }
            callable(&values)
                .map(ExprValue::Term)
                .ok_or_else(|| err("custom function failure"))
        }
        Expression::Exists(groups) => Ok(ExprValue::Bool(
            scope.builder.exists_check(binding, groups, scope.ctx),
        )),
        Expression::NotExists(groups) => Ok(ExprValue::Bool(
            !scope.builder.exists_check(binding, groups, scope.ctx),
        )),
    }
}

fn numeric_operand(
    expr: &Expression,
    binding: &Binding,
    scope: &EvalScope<'_>,
) -> Result<f64, ExprError> {
    match eval(expr, binding, scope)? {
        ExprValue::Number(n) => Ok(n),
        ExprValue::Bool(_) => Err(err("boolean in arithmetic")),
        ExprValue::Term(s) => parse_numeric(&s).ok_or_else(|| err("non-numeric operand")),
    }
}

fn compare(left: &ExprValue, op: Comparator, right: &ExprValue) -> Result<bool, ExprError> {
    use std::cmp::Ordering;

    let ordering = match (numeric_of(left), numeric_of(right)) {
        (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(|| err("incomparable numbers"))?,
        _ => match (datetime_of(left), datetime_of(right)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => literal_text(&left.lexical()).cmp(literal_text(&right.lexical())),
        },
    };
    Ok(match op {
        Comparator::Eq => ordering == Ordering::Equal,
        Comparator::Neq => ordering != Ordering::Equal,
        Comparator::Lt => ordering == Ordering::Less,
        Comparator::Leq => ordering != Ordering::Greater,
        Comparator::Gt => ordering == Ordering::Greater,
        Comparator::Geq => ordering != Ordering::Less,
    })
}

fn numeric_of(value: &ExprValue) -> Option<f64> {
    match value {
        ExprValue::Number(n) => Some(*n),
        ExprValue::Bool(_) => None,
        ExprValue::Term(s) => parse_numeric(s),
    }
}

fn datetime_of(value: &ExprValue) -> Option<DateTime<chrono::FixedOffset>> {
    match value {
        ExprValue::Term(s) => DateTime::parse_from_rfc3339(literal_text(s)).ok(),
        _ => None,
    }
}

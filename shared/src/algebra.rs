/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The parsed SPARQL algebra tree.
//!
//! A surface parser (an external collaborator) produces this structure; the
//! plan builder walks it by exhaustive match. Every node kind carries its own
//! pattern list or sub-tree, and anything a parser cannot classify lands in
//! the explicit `Unsupported` variants instead of a stringly-typed fallback.

use serde::{Deserialize, Serialize};

/// A term as written in the query, prior to dictionary resolution. Prefixed
/// names are expected to be expanded to full IRIs by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryTerm {
    Var(String),
    Iri(String),
    Literal(String),
}

impl QueryTerm {
    /// Builds a variable term, accepting either `?name` or `name`.
    pub fn var(raw: &str) -> Self {
        QueryTerm::Var(crate::terms::var_name(raw))
    }

    pub fn iri(value: &str) -> Self {
        QueryTerm::Iri(value.to_string())
    }

    pub fn literal(value: &str) -> Self {
        QueryTerm::Literal(value.to_string())
    }

    pub fn is_var(&self) -> bool {
        matches!(self, QueryTerm::Var(_))
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            QueryTerm::Var(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// The lexical form of a non-variable term.
    pub fn lexical(&self) -> Option<&str> {
        match self {
            QueryTerm::Var(_) => None,
            QueryTerm::Iri(s) | QueryTerm::Literal(s) => Some(s.as_str()),
        }
    }
}

/// One member of a basic graph pattern. The predicate position may carry a
/// property path; `extract_property_paths` separates those before BGP
/// evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpTriple {
    pub subject: QueryTerm,
    pub predicate: Predicate,
    pub object: QueryTerm,
}

impl BgpTriple {
    pub fn plain(subject: QueryTerm, predicate: QueryTerm, object: QueryTerm) -> Self {
        BgpTriple {
            subject,
            predicate: Predicate::Term(predicate),
            object,
        }
    }

    pub fn path(subject: QueryTerm, path: PathExpression, object: QueryTerm) -> Self {
        BgpTriple {
            subject,
            predicate: Predicate::Path(path),
            object,
        }
    }

    pub fn is_path(&self) -> bool {
        matches!(self.predicate, Predicate::Path(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Term(QueryTerm),
    Path(PathExpression),
}

/// Property-path algebra over predicate IRIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PathExpression {
    Link(String),
    Inverse(Box<PathExpression>),
    Sequence(Box<PathExpression>, Box<PathExpression>),
    Alternative(Box<PathExpression>, Box<PathExpression>),
    ZeroOrOne(Box<PathExpression>),
    ZeroOrMore(Box<PathExpression>),
    OneOrMore(Box<PathExpression>),
    /// Negation is only valid over a simple property set (links, inverse
    /// links and alternatives of those). The plan builder rejects anything
    /// else before evaluation starts.
    Negated(Box<PathExpression>),
}

impl PathExpression {
    pub fn link(iri: &str) -> Self {
        PathExpression::Link(iri.to_string())
    }

    pub fn seq(a: PathExpression, b: PathExpression) -> Self {
        PathExpression::Sequence(Box::new(a), Box::new(b))
    }

    pub fn alt(a: PathExpression, b: PathExpression) -> Self {
        PathExpression::Alternative(Box::new(a), Box::new(b))
    }

    pub fn inverse(a: PathExpression) -> Self {
        PathExpression::Inverse(Box::new(a))
    }

    pub fn zero_or_one(a: PathExpression) -> Self {
        PathExpression::ZeroOrOne(Box::new(a))
    }

    pub fn zero_or_more(a: PathExpression) -> Self {
        PathExpression::ZeroOrMore(Box::new(a))
    }

    pub fn one_or_more(a: PathExpression) -> Self {
        PathExpression::OneOrMore(Box::new(a))
    }

    pub fn negated(a: PathExpression) -> Self {
        PathExpression::Negated(Box::new(a))
    }
}

/// A value in a VALUES row: a term or UNDEF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Term(QueryTerm),
    Undef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuesClause {
    pub variables: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Scalar expressions as they appear in FILTER, BIND, ORDER BY and HAVING.
/// Evaluation semantics live in the engine; this is only the shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Variable(String),
    Iri(String),
    Literal(String),
    Compare(Box<Expression>, Comparator, Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    Arithmetic(Box<Expression>, ArithmeticOp, Box<Expression>),
    Bound(String),
    Regex(Box<Expression>, Box<Expression>, Option<String>),
    /// Custom function call by IRI, dispatched through the engine's function
    /// table. An unregistered IRI is a plan-time error.
    Call { function: String, args: Vec<Expression> },
    Exists(Vec<GroupPattern>),
    NotExists(Vec<GroupPattern>),
}

impl Expression {
    pub fn var(raw: &str) -> Self {
        Expression::Variable(crate::terms::var_name(raw))
    }

    pub fn compare(a: Expression, op: Comparator, b: Expression) -> Self {
        Expression::Compare(Box::new(a), op, Box::new(b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    Sample,
    GroupConcat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub function: AggregateFunction,
    /// `None` stands for `COUNT(*)`.
    pub expression: Option<Expression>,
    pub distinct: bool,
    pub separator: Option<String>,
}

/// One SELECT projection entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectItem {
    All,
    Variable(String),
    Expression {
        expression: Expression,
        variable: String,
    },
    Aggregation {
        aggregate: Aggregate,
        variable: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupKey {
    Variable(String),
    Expression {
        expression: Expression,
        variable: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderKey {
    pub expression: Expression,
    pub descending: bool,
}

impl OrderKey {
    pub fn asc(expression: Expression) -> Self {
        OrderKey {
            expression,
            descending: false,
        }
    }

    pub fn desc(expression: Expression) -> Self {
        OrderKey {
            expression,
            descending: true,
        }
    }
}

/// FROM / FROM NAMED graph selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetClause {
    pub default: Vec<String>,
    pub named: Vec<String>,
}

/// A CONSTRUCT template triple. Plain predicates only: paths are a WHERE
/// clause construct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateTriple {
    pub subject: QueryTerm,
    pub predicate: QueryTerm,
    pub object: QueryTerm,
}

/// One group pattern inside a WHERE clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupPattern {
    Bgp(Vec<BgpTriple>),
    Group(Vec<GroupPattern>),
    SubQuery(Box<Query>),
    Graph {
        name: QueryTerm,
        patterns: Vec<GroupPattern>,
    },
    Service {
        endpoint: QueryTerm,
        patterns: Vec<GroupPattern>,
        silent: bool,
    },
    Optional(Vec<GroupPattern>),
    Union(Vec<Vec<GroupPattern>>),
    Minus(Vec<GroupPattern>),
    Filter(Expression),
    Bind {
        expression: Expression,
        variable: String,
    },
    Values(ValuesClause),
    /// Anything the parser recognized syntactically but the engine does not
    /// plan. Reaching this variant is a compile-time error.
    Unsupported(String),
}

impl GroupPattern {
    /// Human-readable node kind for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            GroupPattern::Bgp(_) => "bgp",
            GroupPattern::Group(_) => "group",
            GroupPattern::SubQuery(_) => "query",
            GroupPattern::Graph { .. } => "graph",
            GroupPattern::Service { .. } => "service",
            GroupPattern::Optional(_) => "optional",
            GroupPattern::Union(_) => "union",
            GroupPattern::Minus(_) => "minus",
            GroupPattern::Filter(_) => "filter",
            GroupPattern::Bind { .. } => "bind",
            GroupPattern::Values(_) => "values",
            GroupPattern::Unsupported(_) => "unsupported",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    Select,
    Construct,
    Ask,
    Describe,
}

/// A parsed query. `where_groups` is an unordered list at each nesting level;
/// the plan builder imposes evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub query_type: QueryType,
    pub variables: Vec<SelectItem>,
    pub where_groups: Vec<GroupPattern>,
    pub group_by: Vec<GroupKey>,
    pub having: Option<Expression>,
    pub order: Vec<OrderKey>,
    pub distinct: bool,
    pub offset: usize,
    pub limit: Option<usize>,
    pub from: DatasetClause,
    /// CONSTRUCT template; empty for other query types.
    pub template: Vec<TemplateTriple>,
    /// DESCRIBE targets; rewritten into a CONSTRUCT before planning.
    pub describe: Vec<QueryTerm>,
}

impl Query {
    pub fn select(variables: Vec<SelectItem>, where_groups: Vec<GroupPattern>) -> Self {
        Query {
            query_type: QueryType::Select,
            variables,
            where_groups,
            group_by: Vec::new(),
            having: None,
            order: Vec::new(),
            distinct: false,
            offset: 0,
            limit: None,
            from: DatasetClause::default(),
            template: Vec::new(),
            describe: Vec::new(),
        }
    }

    pub fn construct(template: Vec<TemplateTriple>, where_groups: Vec<GroupPattern>) -> Self {
        Query {
            query_type: QueryType::Construct,
            variables: Vec::new(),
            where_groups,
            group_by: Vec::new(),
            having: None,
            order: Vec::new(),
            distinct: false,
            offset: 0,
            limit: None,
            from: DatasetClause::default(),
            template,
            describe: Vec::new(),
        }
    }

    pub fn ask(where_groups: Vec<GroupPattern>) -> Self {
        Query {
            query_type: QueryType::Ask,
            variables: Vec::new(),
            where_groups,
            group_by: Vec::new(),
            having: None,
            order: Vec::new(),
            distinct: false,
            offset: 0,
            limit: None,
            from: DatasetClause::default(),
            template: Vec::new(),
            describe: Vec::new(),
        }
    }

    pub fn describe(targets: Vec<QueryTerm>, where_groups: Vec<GroupPattern>) -> Self {
        Query {
            query_type: QueryType::Describe,
            variables: Vec::new(),
            where_groups,
            group_by: Vec::new(),
            having: None,
            order: Vec::new(),
            distinct: false,
            offset: 0,
            limit: None,
            from: DatasetClause::default(),
            template: Vec::new(),
            describe: targets,
        }
    }
}

/// The top-level parse result. Updates are handled by a separate executor
/// outside this engine; the plan builder only dispatches them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Query(Query),
    Update(String),
    Unsupported(String),
}

/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use shared::algebra::{
    Aggregate, AggregateFunction, BgpTriple, Comparator, Expression, GroupKey, GroupPattern,
    Operation, OrderKey, PathExpression, Query, QueryTerm, SelectItem, Value, ValuesClause,
};
use shared::bindings::Binding;
use std::collections::BTreeSet;
use std::sync::Arc;
use zwaluw::custom_error::EngineError;
use zwaluw::dataset::Dataset;
use zwaluw::planner::{EngineConfig, PlanBuilder, QueryParser};
use zwaluw::results::{MaterializedResults, QueryResults};

const KNOWS: &str = "http://xmlns.com/foaf/0.1/knows";
const AGE: &str = "http://xmlns.com/foaf/0.1/age";

fn ex(name: &str) -> String {
    format!("http://example.org/{}", name)
}

fn knows_dataset() -> Arc<Dataset> {
    let mut ds = Dataset::new();
    ds.insert_default(&ex("Alice"), KNOWS, &ex("Bob"));
    ds.insert_default(&ex("Bob"), KNOWS, &ex("Carol"));
    Arc::new(ds)
}

fn spo_bgp() -> GroupPattern {
    GroupPattern::Bgp(vec![BgpTriple::plain(
        QueryTerm::var("?s"),
        QueryTerm::var("?p"),
        QueryTerm::var("?o"),
    )])
}

fn select_all(where_groups: Vec<GroupPattern>) -> Query {
    Query::select(vec![SelectItem::All], where_groups)
}

fn solutions(builder: &PlanBuilder, query: &Query) -> Vec<Binding> {
    match builder.execute(query).expect("query should plan") {
        QueryResults::Solutions(stream) => stream
            .map(|item| item.expect("stream should not fail"))
            .collect(),
        _ => panic!("expected a solution stream"),
    }
}

/// Decodes (s, o) pairs into a set for order-independent comparison.
fn endpoint_pairs(builder: &PlanBuilder, rows: &[Binding]) -> BTreeSet<(String, String)> {
    rows.iter()
        .map(|row| {
            let s = builder.dataset().decode(row.get("s").expect("s bound")).expect("decodes");
            let o = builder.dataset().decode(row.get("o").expect("o bound")).expect("decodes");
            (s, o)
        })
        .collect()
}

fn path_query(path: PathExpression) -> Query {
    select_all(vec![GroupPattern::Bgp(vec![BgpTriple::path(
        QueryTerm::var("?s"),
        path,
        QueryTerm::var("?o"),
    )])])
}

#[test]
fn test_basic_bgp_select() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let query = select_all(vec![GroupPattern::Bgp(vec![BgpTriple::plain(
        QueryTerm::var("?s"),
        QueryTerm::iri(KNOWS),
        QueryTerm::var("?o"),
    )])]);
    let rows = solutions(&builder, &query);
    assert_eq!(rows.len(), 2);
    let pairs = endpoint_pairs(&builder, &rows);
    assert!(pairs.contains(&(ex("Alice"), ex("Bob"))));
    assert!(pairs.contains(&(ex("Bob"), ex("Carol"))));
}

#[test]
fn test_caching_is_transparent() {
    let ds = knows_dataset();
    let query = select_all(vec![spo_bgp()]);

    let plain_builder = PlanBuilder::new(Arc::clone(&ds));
    let without_cache: BTreeSet<String> = solutions(&plain_builder, &query)
        .iter()
        .map(Binding::fingerprint)
        .collect();

    let mut cached_builder = PlanBuilder::new(ds);
    cached_builder.use_cache();
    for _ in 0..3 {
        let with_cache: BTreeSet<String> = solutions(&cached_builder, &query)
            .iter()
            .map(Binding::fingerprint)
            .collect();
        assert_eq!(without_cache, with_cache);
    }
}

#[test]
fn test_limit_offset_never_populates_cache() {
    let ds = knows_dataset();
    let mut builder = PlanBuilder::new(ds);
    let cache = builder.use_cache();

    let mut limited = select_all(vec![spo_bgp()]);
    limited.limit = Some(1);
    let rows = solutions(&builder, &limited);
    assert_eq!(rows.len(), 1);
    assert_eq!(cache.count(), 0);

    let mut offset = select_all(vec![spo_bgp()]);
    offset.offset = 1;
    solutions(&builder, &offset);
    assert_eq!(cache.count(), 0);
}

#[test]
fn test_union_doubles_rows_and_caches_one_bgp() {
    let mut ds = Dataset::new();
    for i in 0..17 {
        ds.insert_default(&ex(&format!("s{}", i)), &ex("p"), &ex(&format!("o{}", i)));
    }
    let mut builder = PlanBuilder::new(Arc::new(ds));
    let cache = builder.use_cache();

    let query = select_all(vec![GroupPattern::Union(vec![
        vec![spo_bgp()],
        vec![spo_bgp()],
    ])]);
    let rows = solutions(&builder, &query);
    assert_eq!(rows.len(), 34);
    assert_eq!(cache.count(), 1);
    assert_eq!(cache.total_rows(), 17);
}

#[test]
fn test_one_or_more_is_transitive_closure() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let rows = solutions(
        &builder,
        &path_query(PathExpression::one_or_more(PathExpression::link(KNOWS))),
    );
    let pairs = endpoint_pairs(&builder, &rows);
    let expected: BTreeSet<(String, String)> = [
        (ex("Alice"), ex("Bob")),
        (ex("Alice"), ex("Carol")),
        (ex("Bob"), ex("Carol")),
    ]
    .into_iter()
    .collect();
    assert_eq!(pairs, expected);
}

#[test]
fn test_zero_or_more_adds_reflexive_pairs() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let rows = solutions(
        &builder,
        &path_query(PathExpression::zero_or_more(PathExpression::link(KNOWS))),
    );
    let pairs = endpoint_pairs(&builder, &rows);
    let expected: BTreeSet<(String, String)> = [
        (ex("Alice"), ex("Alice")),
        (ex("Bob"), ex("Bob")),
        (ex("Carol"), ex("Carol")),
        (ex("Alice"), ex("Bob")),
        (ex("Alice"), ex("Carol")),
        (ex("Bob"), ex("Carol")),
    ]
    .into_iter()
    .collect();
    assert_eq!(pairs, expected);
}

#[test]
fn test_zero_or_one_is_identity_plus_one_hop() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let rows = solutions(
        &builder,
        &path_query(PathExpression::zero_or_one(PathExpression::link(KNOWS))),
    );
    let pairs = endpoint_pairs(&builder, &rows);
    assert!(pairs.contains(&(ex("Alice"), ex("Alice"))));
    assert!(pairs.contains(&(ex("Alice"), ex("Bob"))));
    assert!(!pairs.contains(&(ex("Alice"), ex("Carol"))));
}

#[test]
fn test_alternative_equals_union_of_branches() {
    let mut ds = Dataset::new();
    ds.insert_default(&ex("a"), &ex("p"), &ex("b"));
    ds.insert_default(&ex("a"), &ex("q"), &ex("c"));
    ds.insert_default(&ex("b"), &ex("q"), &ex("c"));
    let builder = PlanBuilder::new(Arc::new(ds));

    let alt = solutions(
        &builder,
        &path_query(PathExpression::alt(
            PathExpression::link(&ex("p")),
            PathExpression::link(&ex("q")),
        )),
    );
    let p_only = solutions(&builder, &path_query(PathExpression::link(&ex("p"))));
    let q_only = solutions(&builder, &path_query(PathExpression::link(&ex("q"))));

    let mut expected = endpoint_pairs(&builder, &p_only);
    expected.extend(endpoint_pairs(&builder, &q_only));
    assert_eq!(endpoint_pairs(&builder, &alt), expected);
}

#[test]
fn test_double_inverse_is_identity() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let direct = solutions(&builder, &path_query(PathExpression::link(KNOWS)));
    let doubled = solutions(
        &builder,
        &path_query(PathExpression::inverse(PathExpression::inverse(
            PathExpression::link(KNOWS),
        ))),
    );
    assert_eq!(
        endpoint_pairs(&builder, &direct),
        endpoint_pairs(&builder, &doubled)
    );
}

#[test]
fn test_inverse_swaps_endpoints() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let rows = solutions(
        &builder,
        &path_query(PathExpression::inverse(PathExpression::link(KNOWS))),
    );
    let pairs = endpoint_pairs(&builder, &rows);
    assert!(pairs.contains(&(ex("Bob"), ex("Alice"))));
    assert!(pairs.contains(&(ex("Carol"), ex("Bob"))));
    assert_eq!(pairs.len(), 2);
}

#[test]
fn test_sequence_threads_intermediate_hop() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let rows = solutions(
        &builder,
        &path_query(PathExpression::seq(
            PathExpression::link(KNOWS),
            PathExpression::link(KNOWS),
        )),
    );
    let pairs = endpoint_pairs(&builder, &rows);
    assert_eq!(pairs.len(), 1);
    assert!(pairs.contains(&(ex("Alice"), ex("Carol"))));
    // The synthesized middle variable must not leak into the solution.
    for row in &rows {
        assert_eq!(row.len(), 2);
    }
}

#[test]
fn test_negated_property_set_excludes_predicates() {
    let mut ds = Dataset::new();
    ds.insert_default(&ex("a"), KNOWS, &ex("b"));
    ds.insert_default(&ex("a"), &ex("likes"), &ex("c"));
    let builder = PlanBuilder::new(Arc::new(ds));
    let rows = solutions(
        &builder,
        &path_query(PathExpression::negated(PathExpression::link(KNOWS))),
    );
    let pairs = endpoint_pairs(&builder, &rows);
    assert_eq!(pairs.len(), 1);
    assert!(pairs.contains(&(ex("a"), ex("c"))));
}

#[test]
fn test_negating_complex_paths_is_a_plan_error() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);

    let negated_sequence = path_query(PathExpression::negated(PathExpression::seq(
        PathExpression::link(KNOWS),
        PathExpression::link(KNOWS),
    )));
    assert!(matches!(
        builder.execute(&negated_sequence),
        Err(EngineError::UnsupportedPath(_))
    ));

    let negated_star = path_query(PathExpression::negated(PathExpression::zero_or_more(
        PathExpression::link(KNOWS),
    )));
    assert!(matches!(
        builder.execute(&negated_star),
        Err(EngineError::UnsupportedPath(_))
    ));

    let negated_negation = path_query(PathExpression::negated(PathExpression::negated(
        PathExpression::link(KNOWS),
    )));
    assert!(matches!(
        builder.execute(&negated_negation),
        Err(EngineError::UnsupportedPath(_))
    ));
}

#[test]
fn test_optional_never_loses_left_rows() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let left = vec![GroupPattern::Bgp(vec![BgpTriple::plain(
        QueryTerm::var("?s"),
        QueryTerm::iri(KNOWS),
        QueryTerm::var("?o"),
    )])];

    // Inner pattern that matches nothing: every left row survives unchanged.
    let mut groups = left.clone();
    groups.push(GroupPattern::Optional(vec![GroupPattern::Bgp(vec![
        BgpTriple::plain(
            QueryTerm::var("?o"),
            QueryTerm::iri(&ex("missing")),
            QueryTerm::var("?x"),
        ),
    ])]));
    let rows = solutions(&builder, &select_all(groups));
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| !r.contains("x")));

    // Inner pattern that matches for one row: count still equals left count.
    let mut groups = left;
    groups.push(GroupPattern::Optional(vec![GroupPattern::Bgp(vec![
        BgpTriple::plain(
            QueryTerm::var("?o"),
            QueryTerm::iri(KNOWS),
            QueryTerm::var("?x"),
        ),
    ])]));
    let rows = solutions(&builder, &select_all(groups));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.iter().filter(|r| r.contains("x")).count(), 1);
}

#[test]
fn test_minus_is_a_subset_disjoint_from_right() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);

    let left_rows = solutions(&builder, &select_all(vec![spo_bgp()]));

    let minus_bob = vec![GroupPattern::Bgp(vec![BgpTriple::plain(
        QueryTerm::iri(&ex("Alice")),
        QueryTerm::var("?p"),
        QueryTerm::var("?o"),
    )])];
    let rows = solutions(
        &builder,
        &select_all(vec![spo_bgp(), GroupPattern::Minus(minus_bob.clone())]),
    );
    assert!(rows.len() <= left_rows.len());
    let left_fps: BTreeSet<String> = left_rows.iter().map(Binding::fingerprint).collect();
    assert!(rows.iter().all(|r| left_fps.contains(&r.fingerprint())));

    // Nothing surviving MINUS may be compatible with a right-hand row.
    let right_rows = solutions(&builder, &select_all(minus_bob));
    for row in &rows {
        for right in &right_rows {
            assert!(!(row.shares_variable(right) && row.compatible(right)));
        }
    }
}

#[test]
fn test_minus_with_disjoint_domains_removes_nothing() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let rows = solutions(
        &builder,
        &select_all(vec![
            spo_bgp(),
            GroupPattern::Minus(vec![GroupPattern::Bgp(vec![BgpTriple::plain(
                QueryTerm::var("?x"),
                QueryTerm::var("?y"),
                QueryTerm::var("?z"),
            )])]),
        ]),
    );
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_count_per_group() {
    let mut ds = Dataset::new();
    let subject = ex("thing");
    ds.insert_default(&subject, &ex("p1"), &ex("v1"));
    ds.insert_default(&subject, &ex("p2"), &ex("v2"));
    for i in 0..5 {
        ds.insert_default(&subject, &ex("p3"), &ex(&format!("w{}", i)));
    }
    for i in 0..4 {
        ds.insert_default(&subject, &ex("p4"), &ex(&format!("u{}", i)));
    }
    let builder = PlanBuilder::new(Arc::new(ds));

    let mut query = Query::select(
        vec![SelectItem::Aggregation {
            aggregate: Aggregate {
                function: AggregateFunction::Count,
                expression: Some(Expression::var("?p")),
                distinct: false,
                separator: None,
            },
            variable: "n".to_string(),
        }],
        vec![GroupPattern::Bgp(vec![BgpTriple::plain(
            QueryTerm::iri(&subject),
            QueryTerm::var("?p"),
            QueryTerm::var("?o"),
        )])],
    );
    query.group_by = vec![GroupKey::Variable("p".to_string())];

    let rows = solutions(&builder, &query);
    let mut counts: Vec<String> = rows
        .iter()
        .map(|r| builder.dataset().decode(r.get("n").expect("n bound")).expect("decodes"))
        .collect();
    counts.sort();
    assert_eq!(counts, vec!["1", "1", "4", "5"]);
    // Projection keeps only the aggregate alias.
    assert!(rows.iter().all(|r| r.len() == 1));
}

#[test]
fn test_aggregate_over_empty_input_yields_one_row() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let query = Query::select(
        vec![SelectItem::Aggregation {
            aggregate: Aggregate {
                function: AggregateFunction::Count,
                expression: None,
                distinct: false,
                separator: None,
            },
            variable: "n".to_string(),
        }],
        vec![GroupPattern::Bgp(vec![BgpTriple::plain(
            QueryTerm::var("?s"),
            QueryTerm::iri(&ex("missing")),
            QueryTerm::var("?o"),
        )])],
    );
    let rows = solutions(&builder, &query);
    assert_eq!(rows.len(), 1);
    let n = builder.dataset().decode(rows[0].get("n").expect("n bound")).expect("decodes");
    assert_eq!(n, "0");
}

#[test]
fn test_order_by_distinct_offset_limit() {
    let mut ds = Dataset::new();
    ds.insert_default(&ex("a"), &ex("value"), "3");
    ds.insert_default(&ex("b"), &ex("value"), "1");
    ds.insert_default(&ex("c"), &ex("value"), "2");
    ds.insert_default(&ex("d"), &ex("value"), "2");
    let builder = PlanBuilder::new(Arc::new(ds));

    let mut query = Query::select(
        vec![SelectItem::Variable("v".to_string())],
        vec![GroupPattern::Bgp(vec![BgpTriple::plain(
            QueryTerm::var("?s"),
            QueryTerm::iri(&ex("value")),
            QueryTerm::var("?v"),
        )])],
    );
    query.order = vec![OrderKey::asc(Expression::var("?v"))];
    query.distinct = true;
    query.offset = 1;
    query.limit = Some(2);

    let rows = solutions(&builder, &query);
    let values: Vec<String> = rows
        .iter()
        .map(|r| builder.dataset().decode(r.get("v").expect("v bound")).expect("decodes"))
        .collect();
    assert_eq!(values, vec!["2", "3"]);
}

#[test]
fn test_order_by_desc_reverses_single_key() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let mut query = select_all(vec![GroupPattern::Bgp(vec![BgpTriple::plain(
        QueryTerm::var("?s"),
        QueryTerm::iri(KNOWS),
        QueryTerm::var("?o"),
    )])]);
    query.order = vec![OrderKey::desc(Expression::var("?s"))];
    let rows = solutions(&builder, &query);
    let subjects: Vec<String> = rows
        .iter()
        .map(|r| builder.dataset().decode(r.get("s").expect("s bound")).expect("decodes"))
        .collect();
    assert_eq!(subjects, vec![ex("Bob"), ex("Alice")]);
}

#[test]
fn test_bind_error_leaves_variable_unbound() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let groups = vec![
        spo_bgp(),
        // Arithmetic over an IRI cannot evaluate; the row must survive.
        GroupPattern::Bind {
            expression: Expression::Arithmetic(
                Box::new(Expression::var("?s")),
                shared::algebra::ArithmeticOp::Add,
                Box::new(Expression::Literal("1".to_string())),
            ),
            variable: "computed".to_string(),
        },
    ];
    let rows = solutions(&builder, &select_all(groups));
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| !r.contains("computed")));
}

#[test]
fn test_filter_error_drops_row_only() {
    let mut ds = Dataset::new();
    ds.insert_default(&ex("a"), &ex("value"), "10");
    ds.insert_default(&ex("b"), &ex("value"), &ex("not-a-number"));
    let builder = PlanBuilder::new(Arc::new(ds));
    let groups = vec![
        GroupPattern::Bgp(vec![BgpTriple::plain(
            QueryTerm::var("?s"),
            QueryTerm::iri(&ex("value")),
            QueryTerm::var("?v"),
        )]),
        GroupPattern::Filter(Expression::compare(
            Expression::Arithmetic(
                Box::new(Expression::var("?v")),
                shared::algebra::ArithmeticOp::Mul,
                Box::new(Expression::Literal("2".to_string())),
            ),
            Comparator::Gt,
            Expression::Literal("5".to_string()),
        )),
    ];
    let rows = solutions(&builder, &select_all(groups));
    // The non-numeric row fails the filter; the query itself succeeds.
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_unknown_function_is_a_plan_error() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let query = select_all(vec![
        spo_bgp(),
        GroupPattern::Filter(Expression::Call {
            function: ex("no-such-function"),
            args: vec![Expression::var("?s")],
        }),
    ]);
    assert!(matches!(
        builder.execute(&query),
        Err(EngineError::UnknownFunction(_))
    ));
}

#[test]
fn test_custom_function_failure_becomes_unbound() {
    let ds = knows_dataset();
    let mut builder = PlanBuilder::new(ds);
    builder.register_function(&ex("always-fails"), |_args| None);
    let groups = vec![
        spo_bgp(),
        GroupPattern::Bind {
            expression: Expression::Call {
                function: ex("always-fails"),
                args: vec![Expression::var("?s")],
            },
            variable: "out".to_string(),
        },
    ];
    let rows = solutions(&builder, &select_all(groups));
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| !r.contains("out")));
}

#[test]
fn test_unsupported_group_pattern_is_a_plan_error() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let query = select_all(vec![GroupPattern::Unsupported("lateral".to_string())]);
    assert!(matches!(
        builder.execute(&query),
        Err(EngineError::UnsupportedGroupPattern(_))
    ));
}

#[test]
fn test_values_rewriting_restricts_and_extends() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let groups = vec![
        GroupPattern::Values(ValuesClause {
            variables: vec!["s".to_string()],
            rows: vec![
                vec![Value::Term(QueryTerm::iri(&ex("Alice")))],
                vec![Value::Term(QueryTerm::iri(&ex("Carol")))],
            ],
        }),
        GroupPattern::Bgp(vec![BgpTriple::plain(
            QueryTerm::var("?s"),
            QueryTerm::iri(KNOWS),
            QueryTerm::var("?o"),
        )]),
    ];
    let rows = solutions(&builder, &select_all(groups));
    let pairs = endpoint_pairs(&builder, &rows);
    assert_eq!(pairs.len(), 1);
    assert!(pairs.contains(&(ex("Alice"), ex("Bob"))));
}

#[test]
fn test_values_with_undef_leaves_variable_open() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let groups = vec![
        GroupPattern::Values(ValuesClause {
            variables: vec!["s".to_string()],
            rows: vec![vec![Value::Undef]],
        }),
        GroupPattern::Bgp(vec![BgpTriple::plain(
            QueryTerm::var("?s"),
            QueryTerm::iri(KNOWS),
            QueryTerm::var("?o"),
        )]),
    ];
    let rows = solutions(&builder, &select_all(groups));
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_exists_and_not_exists() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let base = GroupPattern::Bgp(vec![BgpTriple::plain(
        QueryTerm::var("?s"),
        QueryTerm::iri(KNOWS),
        QueryTerm::var("?o"),
    )]);
    let inner = vec![GroupPattern::Bgp(vec![BgpTriple::plain(
        QueryTerm::var("?o"),
        QueryTerm::iri(KNOWS),
        QueryTerm::var("?hop"),
    )])];

    let exists = solutions(
        &builder,
        &select_all(vec![
            base.clone(),
            GroupPattern::Filter(Expression::Exists(inner.clone())),
        ]),
    );
    assert_eq!(endpoint_pairs(&builder, &exists).len(), 1);
    assert!(endpoint_pairs(&builder, &exists).contains(&(ex("Alice"), ex("Bob"))));

    let not_exists = solutions(
        &builder,
        &select_all(vec![base, GroupPattern::Filter(Expression::NotExists(inner))]),
    );
    assert!(endpoint_pairs(&builder, &not_exists).contains(&(ex("Bob"), ex("Carol"))));
    assert_eq!(not_exists.len(), 1);
}

#[test]
fn test_graph_selection_by_iri_and_variable() {
    let mut ds = Dataset::new();
    ds.insert_named(&ex("g1"), &ex("a"), &ex("p"), &ex("b"));
    ds.insert_named(&ex("g2"), &ex("c"), &ex("p"), &ex("d"));
    let builder = PlanBuilder::new(Arc::new(ds));

    let fixed = select_all(vec![GroupPattern::Graph {
        name: QueryTerm::iri(&ex("g1")),
        patterns: vec![spo_bgp()],
    }]);
    assert_eq!(solutions(&builder, &fixed).len(), 1);

    let by_var = select_all(vec![GroupPattern::Graph {
        name: QueryTerm::var("?g"),
        patterns: vec![spo_bgp()],
    }]);
    let rows = solutions(&builder, &by_var);
    assert_eq!(rows.len(), 2);
    let graphs: BTreeSet<String> = rows
        .iter()
        .map(|r| builder.dataset().decode(r.get("g").expect("g bound")).expect("decodes"))
        .collect();
    assert_eq!(graphs, [ex("g1"), ex("g2")].into_iter().collect());
}

#[test]
fn test_from_selects_default_graphs() {
    let mut ds = Dataset::new();
    ds.insert_default(&ex("x"), &ex("p"), &ex("y"));
    ds.insert_named(&ex("g1"), &ex("a"), &ex("p"), &ex("b"));
    let builder = PlanBuilder::new(Arc::new(ds));

    let mut query = select_all(vec![spo_bgp()]);
    query.from.default = vec![ex("g1")];
    let rows = solutions(&builder, &query);
    assert_eq!(rows.len(), 1);
    let pairs = endpoint_pairs(&builder, &rows);
    assert!(pairs.contains(&(ex("a"), ex("b"))));
}

fn service_setup(bound_join: bool) -> PlanBuilder {
    let mut local = Dataset::new();
    local.insert_default(&ex("Alice"), KNOWS, &ex("Bob"));
    local.insert_default(&ex("Alice"), KNOWS, &ex("Carol"));

    let mut remote = Dataset::new();
    remote.insert_default(&ex("Bob"), AGE, "30");
    remote.insert_default(&ex("Carol"), AGE, "25");

    let mut builder = PlanBuilder::new(Arc::new(local)).with_config(EngineConfig {
        bound_join,
        ..EngineConfig::default()
    });
    builder.register_service("http://remote.example/sparql", Arc::new(remote));
    builder
}

fn service_query() -> Query {
    select_all(vec![
        GroupPattern::Bgp(vec![BgpTriple::plain(
            QueryTerm::var("?s"),
            QueryTerm::iri(KNOWS),
            QueryTerm::var("?o"),
        )]),
        GroupPattern::Service {
            endpoint: QueryTerm::iri("http://remote.example/sparql"),
            patterns: vec![GroupPattern::Bgp(vec![BgpTriple::plain(
                QueryTerm::var("?o"),
                QueryTerm::iri(AGE),
                QueryTerm::var("?age"),
            )])],
            silent: false,
        },
    ])
}

#[test]
fn test_bound_join_matches_naive_service_results() {
    let query = service_query();

    let naive_builder = service_setup(false);
    let naive: BTreeSet<(String, String)> = solutions(&naive_builder, &query)
        .iter()
        .map(|r| {
            let o = naive_builder.dataset().decode(r.get("o").expect("o")).expect("decodes");
            let age = naive_builder.dataset().decode(r.get("age").expect("age")).expect("decodes");
            (o, age)
        })
        .collect();

    let bound_builder = service_setup(true);
    let bound: BTreeSet<(String, String)> = solutions(&bound_builder, &query)
        .iter()
        .map(|r| {
            let o = bound_builder.dataset().decode(r.get("o").expect("o")).expect("decodes");
            let age = bound_builder.dataset().decode(r.get("age").expect("age")).expect("decodes");
            (o, age)
        })
        .collect();

    assert_eq!(naive.len(), 2);
    assert_eq!(naive, bound);
}

#[test]
fn test_unknown_service_is_a_stream_error() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let query = select_all(vec![
        spo_bgp(),
        GroupPattern::Service {
            endpoint: QueryTerm::iri("http://nowhere.example/sparql"),
            patterns: vec![spo_bgp()],
            silent: false,
        },
    ]);
    let results = builder.execute(&query).expect("plan should build");
    match results {
        QueryResults::Solutions(stream) => {
            let items: Vec<_> = stream.collect();
            assert!(items
                .iter()
                .any(|i| matches!(i, Err(EngineError::UnknownService(_)))));
        }
        _ => panic!("expected solutions"),
    }
}

#[test]
fn test_silent_service_failure_yields_empty_branch() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let query = select_all(vec![
        spo_bgp(),
        GroupPattern::Service {
            endpoint: QueryTerm::iri("http://nowhere.example/sparql"),
            patterns: vec![spo_bgp()],
            silent: true,
        },
    ]);
    let rows = solutions(&builder, &query);
    assert!(rows.is_empty());
}

#[test]
fn test_construct_instantiates_template() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let query = Query::construct(
        vec![shared::algebra::TemplateTriple {
            subject: QueryTerm::var("?o"),
            predicate: QueryTerm::iri(&ex("knownBy")),
            object: QueryTerm::var("?s"),
        }],
        vec![GroupPattern::Bgp(vec![BgpTriple::plain(
            QueryTerm::var("?s"),
            QueryTerm::iri(KNOWS),
            QueryTerm::var("?o"),
        )])],
    );
    match builder.execute(&query).expect("plan should build") {
        QueryResults::Graph(stream) => {
            let lines = stream.materialize(builder.dataset()).expect("materializes");
            assert_eq!(lines.len(), 2);
            assert!(lines
                .iter()
                .any(|l| l.contains("knownBy") && l.contains("Bob") && l.contains("Alice")));
        }
        _ => panic!("expected graph results"),
    };
}

#[test]
fn test_describe_rewrites_to_construct() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let query = Query::describe(vec![QueryTerm::iri(&ex("Alice"))], Vec::new());
    match builder.execute(&query).expect("plan should build") {
        QueryResults::Graph(stream) => {
            let lines = stream.materialize(builder.dataset()).expect("materializes");
            assert_eq!(lines.len(), 1);
            assert!(lines[0].contains("Alice"));
            assert!(lines[0].contains("Bob"));
        }
        _ => panic!("expected graph results"),
    };
}

#[test]
fn test_ask_answers_and_short_circuits() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);

    let hit = Query::ask(vec![GroupPattern::Bgp(vec![BgpTriple::plain(
        QueryTerm::iri(&ex("Alice")),
        QueryTerm::iri(KNOWS),
        QueryTerm::var("?o"),
    )])]);
    assert!(matches!(
        builder.execute(&hit),
        Ok(QueryResults::Boolean(true))
    ));

    let miss = Query::ask(vec![GroupPattern::Bgp(vec![BgpTriple::plain(
        QueryTerm::iri(&ex("Carol")),
        QueryTerm::iri(KNOWS),
        QueryTerm::var("?o"),
    )])]);
    assert!(matches!(
        builder.execute(&miss),
        Ok(QueryResults::Boolean(false))
    ));
}

#[test]
fn test_subquery_joins_projected_variables_only() {
    let mut ds = Dataset::new();
    ds.insert_default(&ex("Alice"), KNOWS, &ex("Bob"));
    ds.insert_default(&ex("Bob"), AGE, "30");
    let builder = PlanBuilder::new(Arc::new(ds));

    let sub = Query::select(
        vec![SelectItem::Variable("o".to_string())],
        vec![GroupPattern::Bgp(vec![BgpTriple::plain(
            QueryTerm::var("?s"),
            QueryTerm::iri(KNOWS),
            QueryTerm::var("?o"),
        )])],
    );
    let outer = select_all(vec![
        GroupPattern::SubQuery(Box::new(sub)),
        GroupPattern::Bgp(vec![BgpTriple::plain(
            QueryTerm::var("?o"),
            QueryTerm::iri(AGE),
            QueryTerm::var("?age"),
        )]),
    ]);
    let rows = solutions(&builder, &outer);
    assert_eq!(rows.len(), 1);
    // ?s was not projected by the subquery and must not leak.
    assert!(!rows[0].contains("s"));
    assert!(rows[0].contains("o"));
    assert!(rows[0].contains("age"));
}

/// Stand-in for the out-of-scope surface parser.
struct StubParser;

impl QueryParser for StubParser {
    fn parse(&self, text: &str) -> Result<Operation, EngineError> {
        if text.contains("DELETE") {
            Ok(Operation::Update(text.to_string()))
        } else {
            Ok(Operation::Query(select_all(vec![spo_bgp()])))
        }
    }
}

#[test]
fn test_query_text_goes_through_the_parser() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds).with_parser(Box::new(StubParser));
    match builder.query_text("SELECT * WHERE { ?s ?p ?o }") {
        Ok(MaterializedResults::Solutions(set)) => {
            assert_eq!(set.len(), 2);
            let json = set.to_json();
            assert_eq!(json["results"]["bindings"].as_array().expect("array").len(), 2);
        }
        other => panic!("expected solutions, got {:?}", other),
    }

    // Updates are dispatched to the (absent) update executor.
    assert!(matches!(
        builder.query_text("DELETE WHERE { ?s ?p ?o }"),
        Err(EngineError::UnsupportedQueryType(_))
    ));
}

#[test]
fn test_query_text_without_parser_fails() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    assert!(matches!(
        builder.query_text("SELECT * WHERE { ?s ?p ?o }"),
        Err(EngineError::Parse(_))
    ));
}

#[test]
fn test_nested_union_branches_share_source() {
    let ds = knows_dataset();
    let builder = PlanBuilder::new(ds);
    let query = select_all(vec![
        GroupPattern::Bgp(vec![BgpTriple::plain(
            QueryTerm::iri(&ex("Alice")),
            QueryTerm::iri(KNOWS),
            QueryTerm::var("?o"),
        )]),
        GroupPattern::Union(vec![
            vec![GroupPattern::Bgp(vec![BgpTriple::plain(
                QueryTerm::var("?o"),
                QueryTerm::iri(KNOWS),
                QueryTerm::var("?next"),
            )])],
            vec![GroupPattern::Bind {
                expression: Expression::Literal("leaf".to_string()),
                variable: "next".to_string(),
            }],
        ]),
    ]);
    let rows = solutions(&builder, &query);
    // Branch one extends Bob to Carol; branch two tags the same source row.
    assert_eq!(rows.len(), 2);
}

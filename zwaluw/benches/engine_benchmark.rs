/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

extern crate criterion;
extern crate zwaluw;

use criterion::*;
use shared::algebra::{BgpTriple, GroupPattern, PathExpression, Query, QueryTerm, SelectItem};
use std::sync::Arc;
use zwaluw::dataset::Dataset;
use zwaluw::planner::PlanBuilder;
use zwaluw::results::QueryResults;

const KNOWS: &str = "http://xmlns.com/foaf/0.1/knows";
const WORKS_FOR: &str = "http://example.org/worksFor";

fn setup_dataset() -> Arc<Dataset> {
    let mut ds = Dataset::new();
    // A chain of acquaintances plus employment edges per person.
    for i in 0..1_000u32 {
        let person = format!("http://example.org/person{}", i);
        let next = format!("http://example.org/person{}", i + 1);
        let company = format!("http://example.org/company{}", i % 10);
        ds.insert_default(&person, KNOWS, &next);
        ds.insert_default(&person, WORKS_FOR, &company);
    }
    Arc::new(ds)
}

fn two_pattern_join() -> Query {
    Query::select(
        vec![SelectItem::All],
        vec![GroupPattern::Bgp(vec![
            BgpTriple::plain(
                QueryTerm::var("?a"),
                QueryTerm::iri(KNOWS),
                QueryTerm::var("?b"),
            ),
            BgpTriple::plain(
                QueryTerm::var("?a"),
                QueryTerm::iri(WORKS_FOR),
                QueryTerm::var("?c"),
            ),
        ])],
    )
}

fn closure_from_origin() -> Query {
    Query::select(
        vec![SelectItem::All],
        vec![GroupPattern::Bgp(vec![BgpTriple::path(
            QueryTerm::iri("http://example.org/person0"),
            PathExpression::one_or_more(PathExpression::link(KNOWS)),
            QueryTerm::var("?reached"),
        )])],
    )
}

fn drain(builder: &PlanBuilder, query: &Query) -> usize {
    match builder.execute(query).expect("query should plan") {
        QueryResults::Solutions(stream) => stream.filter(Result::is_ok).count(),
        _ => 0,
    }
}

fn bench_bgp_join(c: &mut Criterion) {
    let ds = setup_dataset();
    let builder = PlanBuilder::new(ds);
    let query = two_pattern_join();
    c.bench_function("bgp_two_pattern_join", |b| {
        b.iter(|| black_box(drain(&builder, &query)))
    });
}

fn bench_bgp_join_cached(c: &mut Criterion) {
    let ds = setup_dataset();
    let mut builder = PlanBuilder::new(ds);
    builder.use_cache();
    let query = two_pattern_join();
    // Warm the cache once so the measurement shows replay cost.
    drain(&builder, &query);
    c.bench_function("bgp_two_pattern_join_cached", |b| {
        b.iter(|| black_box(drain(&builder, &query)))
    });
}

fn bench_path_closure(c: &mut Criterion) {
    let ds = setup_dataset();
    let builder = PlanBuilder::new(ds);
    let query = closure_from_origin();
    c.bench_function("path_one_or_more_closure", |b| {
        b.iter(|| black_box(drain(&builder, &query)))
    });
}

criterion_group!(
    benches,
    bench_bgp_join,
    bench_bgp_join_cached,
    bench_path_closure
);
criterion_main!(benches);

/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Query output: lazy result streams and their serializations.
//!
//! SELECT yields a lazy stream of bindings, CONSTRUCT/DESCRIBE a lazy stream
//! of triples, ASK a single boolean. Consumers pull and may stop early at any
//! time. Materialized solution sets serialize to the SPARQL results JSON and
//! XML formats.

use crate::custom_error::EngineError;
use crate::dataset::Dataset;
use crate::expression::literal_text;
use crate::planner::pipeline::SolutionIter;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde_json::json;
use shared::bindings::Binding;
use shared::triple::Triple;

pub enum QueryResults<'q> {
    /// SELECT solutions.
    Solutions(SolutionStream<'q>),
    /// CONSTRUCT / DESCRIBE triples.
    Graph(TripleStream<'q>),
    /// ASK answer.
    Boolean(bool),
}

pub struct SolutionStream<'q> {
    variables: Vec<String>,
    iter: SolutionIter<'q>,
}

impl<'q> SolutionStream<'q> {
    pub fn new(variables: Vec<String>, iter: SolutionIter<'q>) -> Self {
        SolutionStream { variables, iter }
    }

    /// Projected variable names; empty for `SELECT *`.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Drains the stream into a decoded solution set. The first stream error
    /// aborts the drain.
    pub fn materialize(self, dataset: &Dataset) -> Result<SolutionSet, EngineError> {
        let mut variables = self.variables.clone();
        let mut rows = Vec::new();
        for item in self.iter {
            rows.push(item?);
        }
        if variables.is_empty() {
            let mut seen: Vec<String> = rows
                .iter()
                .flat_map(|b| b.variables().cloned())
                .collect::<rustc_hash::FxHashSet<_>>()
                .into_iter()
                .collect();
            seen.sort();
            variables = seen;
        }
        // Ids turn back into strings only at the very end, in parallel.
        let decoded: Vec<FxHashMap<String, String>> = rows
            .into_par_iter()
            .map(|binding| decode_binding(dataset, &binding))
            .collect();
        Ok(SolutionSet {
            variables,
            rows: decoded,
        })
    }
}

impl Iterator for SolutionStream<'_> {
    type Item = Result<Binding, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

fn decode_binding(dataset: &Dataset, binding: &Binding) -> FxHashMap<String, String> {
    binding
        .iter()
        .filter_map(|(var, id)| dataset.decode(id).map(|term| (var.clone(), term)))
        .collect()
}

pub struct TripleStream<'q> {
    iter: Box<dyn Iterator<Item = Result<Triple, EngineError>> + 'q>,
}

impl<'q> TripleStream<'q> {
    pub fn new(iter: Box<dyn Iterator<Item = Result<Triple, EngineError>> + 'q>) -> Self {
        TripleStream { iter }
    }

    pub fn from_owned(triples: Vec<Triple>) -> Self {
        TripleStream {
            iter: Box::new(triples.into_iter().map(Ok)),
        }
    }

    /// Decodes the constructed triples to N-Triples-style lines.
    pub fn materialize(self, dataset: &Dataset) -> Result<Vec<String>, EngineError> {
        let mut out = Vec::new();
        for item in self.iter {
            out.push(dataset.decode_triple(&item?));
        }
        Ok(out)
    }
}

impl Iterator for TripleStream<'_> {
    type Item = Result<Triple, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

/// Fully materialized query output, for callers that hand in query text and
/// want decoded results back in one step.
#[derive(Debug, Clone)]
pub enum MaterializedResults {
    Solutions(SolutionSet),
    Graph(Vec<String>),
    Boolean(bool),
}

/// A fully materialized, decoded SELECT result.
#[derive(Debug, Clone)]
pub struct SolutionSet {
    pub variables: Vec<String>,
    pub rows: Vec<FxHashMap<String, String>>,
}

impl SolutionSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// SPARQL 1.1 Query Results JSON.
    pub fn to_json(&self) -> serde_json::Value {
        let bindings: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|row| {
                let entries: serde_json::Map<String, serde_json::Value> = self
                    .variables
                    .iter()
                    .filter_map(|var| row.get(var).map(|term| (var.clone(), term_json(term))))
                    .collect();
                serde_json::Value::Object(entries)
            })
            .collect();
        json!({
            "head": { "vars": self.variables },
            "results": { "bindings": bindings }
        })
    }

    /// SPARQL Query Results XML.
    pub fn to_xml(&self) -> Result<String, EngineError> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(ser_err)?;
        let mut root = BytesStart::new("sparql");
        root.push_attribute(("xmlns", "http://www.w3.org/2005/sparql-results#"));
        writer.write_event(Event::Start(root)).map_err(ser_err)?;

        writer
            .write_event(Event::Start(BytesStart::new("head")))
            .map_err(ser_err)?;
        for var in &self.variables {
            let mut v = BytesStart::new("variable");
            v.push_attribute(("name", var.as_str()));
            writer.write_event(Event::Empty(v)).map_err(ser_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("head")))
            .map_err(ser_err)?;

        writer
            .write_event(Event::Start(BytesStart::new("results")))
            .map_err(ser_err)?;
        for row in &self.rows {
            writer
                .write_event(Event::Start(BytesStart::new("result")))
                .map_err(ser_err)?;
            for var in &self.variables {
                let Some(term) = row.get(var) else { continue };
                let mut b = BytesStart::new("binding");
                b.push_attribute(("name", var.as_str()));
                writer.write_event(Event::Start(b)).map_err(ser_err)?;
                let tag = if is_iri(term) { "uri" } else { "literal" };
                writer
                    .write_event(Event::Start(BytesStart::new(tag)))
                    .map_err(ser_err)?;
                writer
                    .write_event(Event::Text(BytesText::new(literal_text(term))))
                    .map_err(ser_err)?;
                writer
                    .write_event(Event::End(BytesEnd::new(tag)))
                    .map_err(ser_err)?;
                writer
                    .write_event(Event::End(BytesEnd::new("binding")))
                    .map_err(ser_err)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("result")))
                .map_err(ser_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("results")))
            .map_err(ser_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("sparql")))
            .map_err(ser_err)?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| EngineError::Serialization(e.to_string()))
    }
}

fn ser_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Serialization(e.to_string())
}

/// ASK answer in the JSON results format.
pub fn boolean_json(value: bool) -> serde_json::Value {
    json!({ "head": {}, "boolean": value })
}

fn is_iri(term: &str) -> bool {
    term.contains("://") || term.starts_with("urn:")
}

fn term_json(term: &str) -> serde_json::Value {
    if term.starts_with("_:") {
        json!({ "type": "bnode", "value": term.trim_start_matches("_:") })
    } else if is_iri(term) {
        json!({ "type": "uri", "value": term })
    } else {
        json!({ "type": "literal", "value": literal_text(term) })
    }
}

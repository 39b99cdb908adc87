/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// A resolved query term: either a variable awaiting a value or a
/// dictionary-encoded constant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Term {
    Variable(String),
    Constant(u32),
}

pub type TriplePattern = (Term, Term, Term);

impl Term {
    pub fn is_var(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            Term::Variable(v) => Some(v.as_str()),
            Term::Constant(_) => None,
        }
    }

    pub fn as_constant(&self) -> Option<u32> {
        match self {
            Term::Variable(_) => None,
            Term::Constant(id) => Some(*id),
        }
    }
}

/// Strips the leading `?` from a surface variable name. Variables are stored
/// without the sigil throughout the engine.
pub fn var_name(raw: &str) -> String {
    raw.strip_prefix('?').unwrap_or(raw).to_string()
}

/// Counts the constants in a pattern. Used by join-order heuristics: more
/// bound terms means a more selective scan.
pub fn count_bound_terms(pattern: &TriplePattern) -> usize {
    [&pattern.0, &pattern.1, &pattern.2]
        .iter()
        .filter(|t| !t.is_var())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_name_strips_sigil() {
        assert_eq!(var_name("?person"), "person");
        assert_eq!(var_name("person"), "person");
    }

    #[test]
    fn test_count_bound_terms() {
        let pattern = (
            Term::Variable("s".to_string()),
            Term::Constant(1),
            Term::Constant(2),
        );
        assert_eq!(count_bound_terms(&pattern), 2);
    }
}

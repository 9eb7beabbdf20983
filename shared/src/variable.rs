/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

pub const SCORE_VARIABLE_PREFIX: &str = "?ql_score_";
pub const MATCHINGWORD_VARIABLE_PREFIX: &str = "?ql_matchingword_";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("\"{0}\" is not a valid SPARQL variable")]
pub struct InvalidVariableName(pub String);

/// The `VAR1`/`VAR2` productions of the SPARQL grammar.
fn variable_regex() -> &'static Regex {
    static VARIABLE_REGEX: OnceLock<Regex> = OnceLock::new();
    VARIABLE_REGEX.get_or_init(|| {
        let base = "A-Za-z\u{00C0}-\u{00D6}\u{00D8}-\u{00F6}\u{00F8}-\u{02FF}\u{0370}-\u{037D}\
                    \u{037F}-\u{1FFF}\u{200C}-\u{200D}\u{2070}-\u{218F}\u{2C00}-\u{2FEF}\
                    \u{3001}-\u{D7FF}\u{F900}-\u{FDCF}\u{FDF0}-\u{FFFD}\u{10000}-\u{EFFFF}";
        let pattern = format!(
            "^[?$][{base}_0-9][{base}_0-9\u{00B7}\u{0300}-\u{036F}\u{203F}-\u{2040}]*$"
        );
        Regex::new(&pattern).expect("Invalid variable regex")
    })
}

pub fn is_valid_variable_name(name: &str) -> bool {
    variable_regex().is_match(name)
}

/// A SPARQL variable. The stored name always starts with `?`, so `$x` and
/// `?x` denote the same variable.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Variable(String);

/// The second argument of an entity score: either another variable or a
/// fixed entity given as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VarOrFixedEntity {
    Variable(Variable),
    FixedEntity(String),
}

impl Variable {
    /// Creates a new variable, checking the name against the SPARQL grammar.
    pub fn new(name: impl Into<String>) -> Result<Variable, InvalidVariableName> {
        let name = name.into();
        if !is_valid_variable_name(&name) {
            return Err(InvalidVariableName(name));
        }
        Ok(Variable::new_unchecked(name))
    }

    /// Creates a new variable without validating the name. Used for internal
    /// variables that are derived from already valid ones.
    pub fn new_unchecked(name: impl Into<String>) -> Variable {
        let mut name = name.into();
        if name.starts_with('$') {
            name.replace_range(..1, "?");
        } else if !name.starts_with('?') {
            name.insert(0, '?');
        }
        Variable(name)
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// The name without the leading `?`.
    fn stem(&self) -> &str {
        &self.0[1..]
    }

    /// The variable holding the score of `self` matched with an entity.
    pub fn entity_score_variable(&self, entity: &VarOrFixedEntity) -> Variable {
        let suffix = match entity {
            VarOrFixedEntity::Variable(var) => format!("_var_{}", var.stem()),
            VarOrFixedEntity::FixedEntity(entity) => {
                format!("_fixedEntity_{}", escape_non_alphabetic(entity))
            }
        };
        Variable(format!("{}{}{}", SCORE_VARIABLE_PREFIX, self.stem(), suffix))
    }

    /// The variable holding the score of `self` matched with a word. For a
    /// prefix search `word` carries a trailing `*` which is dropped.
    pub fn word_score_variable(&self, word: &str, is_prefix: bool) -> Variable {
        let (word, kind) = if is_prefix {
            let mut chars = word.chars();
            chars.next_back();
            (chars.as_str(), "prefix_")
        } else {
            (word, "word_")
        };
        Variable(format!(
            "{}{}{}_{}",
            SCORE_VARIABLE_PREFIX,
            kind,
            self.stem(),
            escape_non_alphabetic(word)
        ))
    }

    pub fn matching_word_variable(&self, term: &str) -> Variable {
        Variable(format!("{}{}_{}", MATCHINGWORD_VARIABLE_PREFIX, self.stem(), term))
    }
}

/// Replaces every byte that is not an ASCII letter by `_<decimal byte value>_`.
pub fn escape_non_alphabetic(word: &str) -> String {
    let mut escaped = String::with_capacity(word.len());
    for byte in word.bytes() {
        if byte.is_ascii_alphabetic() {
            escaped.push(byte as char);
        } else {
            escaped.push('_');
            escaped.push_str(&byte.to_string());
            escaped.push('_');
        }
    }
    escaped
}

impl TryFrom<String> for Variable {
    type Error = InvalidVariableName;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Variable::new(name)
    }
}

impl From<Variable> for String {
    fn from(var: Variable) -> String {
        var.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::variable::Variable;
use std::fmt;

pub const XSD_PREFIX: &str = "http://www.w3.org/2001/XMLSchema#";
pub const XSD_INT_TYPE: &str = "http://www.w3.org/2001/XMLSchema#int";
pub const XSD_INTEGER_TYPE: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_DECIMAL_TYPE: &str = "http://www.w3.org/2001/XMLSchema#decimal";
pub const XSD_DOUBLE_TYPE: &str = "http://www.w3.org/2001/XMLSchema#double";
pub const XSD_BOOLEAN_TYPE: &str = "http://www.w3.org/2001/XMLSchema#boolean";
pub const XSD_STRING_TYPE: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const XSD_DATETIME_TYPE: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
pub const GEO_WKT_LITERAL: &str = "http://www.opengis.net/ont/geosparql#wktLiteral";

/// One position of a triple pattern: a variable or a constant.
///
/// IRIs keep their angle brackets and literals keep their quotes together
/// with an optional language tag or datatype, e.g. `"abc"@en`.
#[derive(Debug, Clone, PartialEq)]
pub enum TripleComponent {
    Variable(Variable),
    Iri(String),
    Literal(String),
    BlankNode(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Undef,
}

impl TripleComponent {
    pub fn iri(iri: &str) -> TripleComponent {
        if iri.starts_with('<') {
            TripleComponent::Iri(iri.to_string())
        } else {
            TripleComponent::Iri(format!("<{}>", iri))
        }
    }

    /// A plain literal with the given lexical form.
    pub fn literal(value: &str) -> TripleComponent {
        TripleComponent::Literal(format!("\"{}\"", value))
    }

    pub fn typed_literal(value: &str, datatype: &str) -> TripleComponent {
        TripleComponent::Literal(format!("\"{}\"^^<{}>", value, datatype))
    }

    pub fn variable(name: &str) -> TripleComponent {
        TripleComponent::Variable(Variable::new_unchecked(name))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, TripleComponent::Variable(_))
    }

    pub fn get_variable(&self) -> Option<&Variable> {
        match self {
            TripleComponent::Variable(var) => Some(var),
            _ => None,
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, TripleComponent::Iri(_))
    }

    /// The string under which a constant is stored in the vocabulary.
    /// Numbers and booleans are folded into Ids and have no vocabulary entry.
    pub fn vocabulary_representation(&self) -> Option<&str> {
        match self {
            TripleComponent::Iri(s) | TripleComponent::Literal(s) | TripleComponent::BlankNode(s) => {
                Some(s)
            }
            _ => None,
        }
    }
}

impl From<Variable> for TripleComponent {
    fn from(var: Variable) -> Self {
        TripleComponent::Variable(var)
    }
}

impl fmt::Display for TripleComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripleComponent::Variable(var) => write!(f, "{}", var),
            TripleComponent::Iri(s) | TripleComponent::Literal(s) | TripleComponent::BlankNode(s) => {
                f.write_str(s)
            }
            TripleComponent::Int(i) => write!(f, "{}", i),
            TripleComponent::Double(d) => write!(f, "{}", d),
            TripleComponent::Bool(b) => write!(f, "{}", b),
            TripleComponent::Undef => f.write_str("UNDEF"),
        }
    }
}

/// A triple pattern whose predicate may be a variable or a constant, but not
/// a property path.
#[derive(Debug, Clone, PartialEq)]
pub struct SparqlTripleSimple {
    pub s: TripleComponent,
    pub p: TripleComponent,
    pub o: TripleComponent,
}

impl SparqlTripleSimple {
    pub fn new(s: TripleComponent, p: TripleComponent, o: TripleComponent) -> Self {
        SparqlTripleSimple { s, p, o }
    }

    pub fn get(&self, position: usize) -> &TripleComponent {
        match position {
            0 => &self.s,
            1 => &self.p,
            _ => &self.o,
        }
    }
}

impl fmt::Display for SparqlTripleSimple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.s, self.p, self.o)
    }
}

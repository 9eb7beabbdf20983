/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! SPARQL expressions as they occur in `FILTER` and `BIND`.
//!
//! Expressions are evaluated row by row against a result table. Relational
//! and logical expressions additionally describe the block prefilter they
//! imply, which lets a filter directly above an index scan skip blocks.

pub mod geo_expressions;
pub mod nary;
pub mod relational;
pub mod string_expressions;

pub use geo_expressions::*;
pub use nary::*;
pub use relational::*;
pub use string_expressions::*;

use crate::engine::VariableToColumnMap;
use crate::id_table::IdTable;
use crate::index::{normalize, Index};
use crate::local_vocab::LocalVocab;
use crate::prefilter::PrefilterExprVariablePair;
use shared::geo_point::{strip_literal_quotes, GeoPoint};
use shared::id::{Datatype, Id};
use shared::terms::*;
use shared::variable::Variable;
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;

/// The value of an expression for a single row.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionValue {
    Undefined,
    Bool(bool),
    Int(i64),
    Double(f64),
    Literal {
        value: String,
        datatype: Option<String>,
        language: Option<String>,
    },
    /// Without the angle brackets.
    Iri(String),
    BlankNode(String),
    GeoPoint(GeoPoint),
}

impl ExpressionValue {
    pub fn plain_literal(value: impl Into<String>) -> Self {
        ExpressionValue::Literal {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn from_id(id: Id, index: &Index, local_vocab: &LocalVocab) -> Self {
        match id.datatype() {
            Datatype::Undefined => ExpressionValue::Undefined,
            Datatype::Bool => ExpressionValue::Bool(id.get_bool()),
            Datatype::Int => ExpressionValue::Int(id.get_int()),
            Datatype::Double => ExpressionValue::Double(id.get_double()),
            Datatype::GeoPoint => ExpressionValue::GeoPoint(id.get_geo_point()),
            Datatype::BlankNodeIndex => match index.word(id, local_vocab) {
                Some(label) => ExpressionValue::BlankNode(label.trim_start_matches("_:").to_string()),
                None => ExpressionValue::Undefined,
            },
            Datatype::VocabIndex | Datatype::LocalVocabIndex => match index.word(id, local_vocab) {
                Some(word) => ExpressionValue::from_word(word),
                None => ExpressionValue::Undefined,
            },
        }
    }

    /// Parses the stored form of an IRI, literal or blank node.
    pub fn from_word(word: &str) -> Self {
        if let Some(iri) = word.strip_prefix('<').and_then(|w| w.strip_suffix('>')) {
            return ExpressionValue::Iri(iri.to_string());
        }
        if let Some(label) = word.strip_prefix("_:") {
            return ExpressionValue::BlankNode(label.to_string());
        }
        if !word.starts_with('"') {
            return ExpressionValue::plain_literal(word);
        }
        match normalize(TripleComponent::Literal(word.to_string())) {
            TripleComponent::Int(i) => return ExpressionValue::Int(i),
            TripleComponent::Double(d) => return ExpressionValue::Double(d),
            TripleComponent::Bool(b) => return ExpressionValue::Bool(b),
            _ => {}
        }
        let value = strip_literal_quotes(word).to_string();
        let suffix = word.rfind('"').map_or("", |end| &word[end + 1..]);
        if let Some(datatype) = suffix.strip_prefix("^^<").and_then(|d| d.strip_suffix('>')) {
            if datatype == GEO_WKT_LITERAL {
                if let Some(point) = GeoPoint::parse_wkt_point(&value) {
                    return ExpressionValue::GeoPoint(point);
                }
            }
            ExpressionValue::Literal {
                value,
                datatype: Some(datatype.to_string()),
                language: None,
            }
        } else if let Some(language) = suffix.strip_prefix('@') {
            ExpressionValue::Literal {
                value,
                datatype: None,
                language: Some(language.to_string()),
            }
        } else {
            ExpressionValue::plain_literal(value)
        }
    }

    pub fn from_component(component: &TripleComponent) -> Self {
        match normalize(component.clone()) {
            TripleComponent::Variable(_) | TripleComponent::Undef => ExpressionValue::Undefined,
            TripleComponent::Int(i) => ExpressionValue::Int(i),
            TripleComponent::Double(d) => ExpressionValue::Double(d),
            TripleComponent::Bool(b) => ExpressionValue::Bool(b),
            TripleComponent::Iri(word)
            | TripleComponent::Literal(word)
            | TripleComponent::BlankNode(word) => ExpressionValue::from_word(&word),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, ExpressionValue::Undefined)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ExpressionValue::Int(i) => Some(*i as f64),
            ExpressionValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// The effective boolean value. `None` means a type error.
    pub fn effective_boolean_value(&self) -> Option<bool> {
        match self {
            ExpressionValue::Bool(b) => Some(*b),
            ExpressionValue::Int(i) => Some(*i != 0),
            ExpressionValue::Double(d) => Some(*d != 0.0 && !d.is_nan()),
            ExpressionValue::Literal {
                value, datatype, ..
            } if datatype.as_deref().map_or(true, |d| d == XSD_STRING_TYPE) => Some(!value.is_empty()),
            _ => None,
        }
    }

    /// The lexical form used by `STR`.
    pub fn string_value(&self) -> Option<String> {
        match self {
            ExpressionValue::Bool(b) => Some(b.to_string()),
            ExpressionValue::Int(i) => Some(i.to_string()),
            ExpressionValue::Double(d) => Some(d.to_string()),
            ExpressionValue::Literal { value, .. } => Some(value.clone()),
            ExpressionValue::Iri(iri) => Some(iri.clone()),
            ExpressionValue::GeoPoint(point) => Some(point.to_string()),
            ExpressionValue::BlankNode(_) | ExpressionValue::Undefined => None,
        }
    }

    /// The string argument of a string function: the lexical form of a
    /// literal that is not numeric.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExpressionValue::Literal { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Orders two values of compatible types. Numbers compare with each
    /// other, everything else only within its own kind.
    pub fn compare(&self, other: &ExpressionValue) -> Option<Ordering> {
        use ExpressionValue::*;
        match (self, other) {
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Int(_) | Double(_), Int(_) | Double(_)) => self.as_f64()?.partial_cmp(&other.as_f64()?),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (
                Literal {
                    value: a,
                    datatype: da,
                    language: la,
                },
                Literal {
                    value: b,
                    datatype: db,
                    language: lb,
                },
            ) if da == db && la == lb => Some(a.cmp(b)),
            (Iri(a), Iri(b)) => Some(a.cmp(b)),
            (BlankNode(a), BlankNode(b)) => Some(a.cmp(b)),
            (GeoPoint(a), GeoPoint(b)) => Some(a.to_bit_representation().cmp(&b.to_bit_representation())),
            _ => None,
        }
    }
}

impl fmt::Display for ExpressionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionValue::Undefined => f.write_str("UNDEF"),
            ExpressionValue::Bool(b) => write!(f, "{}", b),
            ExpressionValue::Int(i) => write!(f, "{}", i),
            ExpressionValue::Double(d) => write!(f, "{}", d),
            ExpressionValue::Literal {
                value,
                datatype,
                language,
            } => {
                write!(f, "\"{}\"", value)?;
                if let Some(language) = language {
                    write!(f, "@{}", language)?;
                } else if let Some(datatype) = datatype {
                    write!(f, "^^<{}>", datatype)?;
                }
                Ok(())
            }
            ExpressionValue::Iri(iri) => write!(f, "<{}>", iri),
            ExpressionValue::BlankNode(label) => write!(f, "_:{}", label),
            ExpressionValue::GeoPoint(point) => write!(f, "\"{}\"^^<{}>", point, GEO_WKT_LITERAL),
        }
    }
}

/// One row of a result table together with everything needed to interpret it.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub index: &'a Index,
    pub table: &'a IdTable,
    pub variable_columns: &'a VariableToColumnMap,
    pub local_vocab: &'a LocalVocab,
    pub row: usize,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(
        index: &'a Index,
        table: &'a IdTable,
        variable_columns: &'a VariableToColumnMap,
        local_vocab: &'a LocalVocab,
    ) -> Self {
        EvaluationContext {
            index,
            table,
            variable_columns,
            local_vocab,
            row: 0,
        }
    }

    pub fn at_row(self, row: usize) -> Self {
        EvaluationContext { row, ..self }
    }

    pub fn id_of(&self, variable: &Variable) -> Option<Id> {
        let column = self.variable_columns.get(variable)?.column_index;
        Some(self.table.get(self.row, column))
    }

    pub fn value_of(&self, variable: &Variable) -> ExpressionValue {
        match self.id_of(variable) {
            Some(id) => ExpressionValue::from_id(id, self.index, self.local_vocab),
            None => ExpressionValue::Undefined,
        }
    }
}

pub trait SparqlExpression: Send + Sync + fmt::Debug {
    fn evaluate(&self, context: &EvaluationContext<'_>) -> ExpressionValue;

    /// Identifies the expression. Variables are replaced by their columns.
    fn cache_key(&self, variable_columns: &VariableToColumnMap) -> String;

    fn children(&self) -> Vec<&dyn SparqlExpression>;

    fn contained_variables(&self) -> Vec<Variable> {
        let mut variables: Vec<Variable> = self
            .children()
            .iter()
            .flat_map(|child| child.contained_variables())
            .collect();
        variables.sort();
        variables.dedup();
        variables
    }

    fn clone_expression(&self) -> Box<dyn SparqlExpression>;

    fn as_any(&self) -> &dyn Any;

    /// The prefilters implied by this expression, sorted by variable. When
    /// `negated` is set, the prefilters for the negation are returned.
    fn prefilter_pairs(&self, _negated: bool) -> Vec<PrefilterExprVariablePair> {
        Vec::new()
    }

    fn prefilter_expressions(&self) -> Vec<PrefilterExprVariablePair> {
        self.prefilter_pairs(false)
    }
}

impl Clone for Box<dyn SparqlExpression> {
    fn clone(&self) -> Self {
        self.clone_expression()
    }
}

/// A variable reference.
#[derive(Debug, Clone)]
pub struct VariableExpression {
    variable: Variable,
}

impl VariableExpression {
    pub fn new(variable: Variable) -> Self {
        VariableExpression { variable }
    }

    pub fn variable(&self) -> &Variable {
        &self.variable
    }
}

impl SparqlExpression for VariableExpression {
    fn evaluate(&self, context: &EvaluationContext<'_>) -> ExpressionValue {
        context.value_of(&self.variable)
    }

    fn cache_key(&self, variable_columns: &VariableToColumnMap) -> String {
        match variable_columns.get(&self.variable) {
            Some(info) => format!("#column_{}#", info.column_index),
            None => format!("#unbound {}#", self.variable),
        }
    }

    fn children(&self) -> Vec<&dyn SparqlExpression> {
        Vec::new()
    }

    fn contained_variables(&self) -> Vec<Variable> {
        vec![self.variable.clone()]
    }

    fn clone_expression(&self) -> Box<dyn SparqlExpression> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A constant.
#[derive(Debug, Clone)]
pub struct LiteralExpression {
    value: TripleComponent,
}

impl LiteralExpression {
    pub fn new(value: TripleComponent) -> Self {
        LiteralExpression { value }
    }

    pub fn value(&self) -> &TripleComponent {
        &self.value
    }

    /// The Id of constants that are stored inline and therefore do not need
    /// a vocabulary lookup.
    pub fn as_id(&self) -> Option<Id> {
        match normalize(self.value.clone()) {
            TripleComponent::Int(i) => Some(Id::make_from_int(i)),
            TripleComponent::Double(d) => Some(Id::make_from_double(d)),
            TripleComponent::Bool(b) => Some(Id::make_from_bool(b)),
            TripleComponent::Literal(literal) if literal.ends_with(&format!("^^<{}>", GEO_WKT_LITERAL)) => {
                GeoPoint::parse_wkt_point(&literal).map(Id::make_from_geo_point)
            }
            _ => None,
        }
    }
}

impl SparqlExpression for LiteralExpression {
    fn evaluate(&self, _context: &EvaluationContext<'_>) -> ExpressionValue {
        ExpressionValue::from_component(&self.value)
    }

    fn cache_key(&self, _variable_columns: &VariableToColumnMap) -> String {
        format!("#literal: {}", self.value)
    }

    fn children(&self) -> Vec<&dyn SparqlExpression> {
        Vec::new()
    }

    fn clone_expression(&self) -> Box<dyn SparqlExpression> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn make_variable_expression(variable: Variable) -> Box<dyn SparqlExpression> {
    Box::new(VariableExpression::new(variable))
}

pub fn make_literal_expression(value: TripleComponent) -> Box<dyn SparqlExpression> {
    Box::new(LiteralExpression::new(value))
}

/// The variable of `expression` if it is a plain variable reference.
pub fn as_variable(expression: &dyn SparqlExpression) -> Option<&Variable> {
    expression
        .as_any()
        .downcast_ref::<VariableExpression>()
        .map(|v| v.variable())
}

/// The inline Id of `expression` if it is a constant with one.
pub fn as_inline_constant(expression: &dyn SparqlExpression) -> Option<Id> {
    expression
        .as_any()
        .downcast_ref::<LiteralExpression>()
        .and_then(|l| l.as_id())
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;
    use crate::engine::ColumnIndexAndTypeInfo;
    use crate::index::IndexBuilder;

    /// Evaluates `expression` on a single row in which the given variables
    /// are bound to the given constants.
    pub fn evaluate_with(
        expression: &dyn SparqlExpression,
        bindings: &[(&str, TripleComponent)],
    ) -> ExpressionValue {
        let index = IndexBuilder::new().build().unwrap();
        let mut local_vocab = LocalVocab::new();
        let mut map = VariableToColumnMap::new();
        let mut row = Vec::new();
        for (column, (name, value)) in bindings.iter().enumerate() {
            map.insert(
                Variable::new_unchecked(*name),
                ColumnIndexAndTypeInfo::possibly_undefined(column),
            );
            row.push(index.id_or_local(value, &mut local_vocab).unwrap());
        }
        let table = IdTable::from_rows(row.len(), &[row]);
        let context = EvaluationContext::new(&index, &table, &map, &local_vocab);
        expression.evaluate(&context)
    }

    pub fn var(name: &str) -> Box<dyn SparqlExpression> {
        make_variable_expression(Variable::new_unchecked(name))
    }

    pub fn int(value: i64) -> Box<dyn SparqlExpression> {
        make_literal_expression(TripleComponent::Int(value))
    }

    pub fn string(value: &str) -> Box<dyn SparqlExpression> {
        make_literal_expression(TripleComponent::literal(value))
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::*;
    use super::*;

    #[test]
    fn test_words_are_parsed() {
        assert_eq!(
            ExpressionValue::from_word("<http://x>"),
            ExpressionValue::Iri("http://x".to_string())
        );
        assert_eq!(
            ExpressionValue::from_word("\"chat\"@fr"),
            ExpressionValue::Literal {
                value: "chat".to_string(),
                datatype: None,
                language: Some("fr".to_string())
            }
        );
        assert_eq!(
            ExpressionValue::from_word(&format!("\"12\"^^<{}>", XSD_INTEGER_TYPE)),
            ExpressionValue::Int(12)
        );
    }

    #[test]
    fn test_effective_boolean_value() {
        assert_eq!(ExpressionValue::Int(0).effective_boolean_value(), Some(false));
        assert_eq!(ExpressionValue::plain_literal("x").effective_boolean_value(), Some(true));
        assert_eq!(ExpressionValue::Iri("x".into()).effective_boolean_value(), None);
        assert_eq!(ExpressionValue::Undefined.effective_boolean_value(), None);
    }

    #[test]
    fn test_variable_lookup_uses_the_local_vocab() {
        let value = evaluate_with(var("?x").as_ref(), &[("?x", TripleComponent::literal("abc"))]);
        assert_eq!(value, ExpressionValue::plain_literal("abc"));
        let unbound = evaluate_with(var("?y").as_ref(), &[("?x", TripleComponent::Int(1))]);
        assert!(unbound.is_undefined());
    }

    #[test]
    fn test_numbers_compare_across_types() {
        assert_eq!(
            ExpressionValue::Int(2).compare(&ExpressionValue::Double(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            ExpressionValue::Int(2).compare(&ExpressionValue::plain_literal("2")),
            None
        );
    }
}

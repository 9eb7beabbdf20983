/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Instantiation of CONSTRUCT templates with the rows of a result.

use crate::engine::{ResultChunk, VariableToColumnMap};
use crate::index::Index;
use shared::terms::{SparqlTripleSimple, TripleComponent, XSD_BOOLEAN_TYPE, XSD_DECIMAL_TYPE, XSD_INT_TYPE};
use shared::variable::Variable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionInTriple {
    Subject,
    Predicate,
    Object,
}

/// One row of a result, as seen by a CONSTRUCT template.
#[derive(Debug, Clone, Copy)]
pub struct ConstructQueryExportContext<'a> {
    pub row: usize,
    pub result: &'a ResultChunk,
    pub variable_columns: &'a VariableToColumnMap,
    pub index: &'a Index,
    /// Number of rows exported before `result`. Keeps blank node labels
    /// unique across chunks.
    pub row_offset: usize,
}

impl<'a> ConstructQueryExportContext<'a> {
    pub fn new(row: usize, result: &'a ResultChunk, variable_columns: &'a VariableToColumnMap, index: &'a Index) -> Self {
        ConstructQueryExportContext {
            row,
            result,
            variable_columns,
            index,
            row_offset: 0,
        }
    }

    /// The value of `variable` in the current row in N-Triples syntax.
    /// `None` if the variable is not part of the result or unbound.
    ///
    /// Ints, decimals and booleans are written without a datatype.
    pub fn evaluate_variable(&self, variable: &Variable, _position: PositionInTriple) -> Option<String> {
        let column = self.variable_columns.get(variable)?.column_index;
        let id = self.result.table.get(self.row, column);
        let (literal, datatype) = self.index.id_to_string_and_type(id, &self.result.local_vocab)?;
        match datatype {
            None => Some(literal),
            Some(t) if t == XSD_INT_TYPE || t == XSD_DECIMAL_TYPE => Some(literal),
            Some(t) if t == XSD_BOOLEAN_TYPE && literal.len() > 1 => Some(literal),
            Some(t) => Some(format!("\"{}\"^^<{}>", literal, t)),
        }
    }

    /// Evaluates one term of a template. Blank nodes get a fresh label per row.
    pub fn evaluate_term(&self, term: &TripleComponent, position: PositionInTriple) -> Option<String> {
        match term {
            TripleComponent::Variable(variable) => self.evaluate_variable(variable, position),
            TripleComponent::BlankNode(label) => Some(format!(
                "_:u{}_{}",
                self.row_offset + self.row,
                label.trim_start_matches("_:")
            )),
            TripleComponent::Undef => None,
            other => Some(other.to_string()),
        }
    }
}

fn valid_in_position(term: &str, position: PositionInTriple) -> bool {
    match position {
        PositionInTriple::Subject => term.starts_with('<') || term.starts_with("_:"),
        PositionInTriple::Predicate => term.starts_with('<'),
        PositionInTriple::Object => true,
    }
}

/// The triples of `template` for every row of `result`. Triples with an
/// unbound term or a term that is not allowed in its position are skipped.
pub fn construct_triples(
    template: &[SparqlTripleSimple],
    result: &ResultChunk,
    variable_columns: &VariableToColumnMap,
    index: &Index,
    row_offset: usize,
) -> Vec<[String; 3]> {
    let positions = [PositionInTriple::Subject, PositionInTriple::Predicate, PositionInTriple::Object];
    let mut triples = Vec::new();
    for row in 0..result.table.num_rows() {
        let context = ConstructQueryExportContext {
            row_offset,
            ..ConstructQueryExportContext::new(row, result, variable_columns, index)
        };
        'template: for triple in template {
            let mut terms: [String; 3] = Default::default();
            for (i, position) in positions.iter().enumerate() {
                match context.evaluate_term(triple.get(i), *position) {
                    Some(term) if valid_in_position(&term, *position) => terms[i] = term,
                    _ => continue 'template,
                }
            }
            triples.push(terms);
        }
    }
    triples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ColumnIndexAndTypeInfo;
    use crate::id_table::IdTable;
    use crate::index::IndexBuilder;
    use crate::local_vocab::LocalVocab;
    use shared::id::Id;
    use shared::terms::XSD_DATETIME_TYPE;

    fn var(name: &str) -> Variable {
        Variable::new_unchecked(name)
    }

    fn fixture() -> (Index, VariableToColumnMap) {
        let date = TripleComponent::typed_literal("2024-01-01T00:00:00", XSD_DATETIME_TYPE);
        let index = IndexBuilder::new()
            .add_iri_triple("a", "p", TripleComponent::literal("plain"))
            .add_iri_triple("a", "q", date)
            .build()
            .unwrap();
        let columns = [("?x", 0), ("?n", 1), ("?b", 2), ("?d", 3), ("?s", 4)]
            .into_iter()
            .map(|(v, c)| (var(v), ColumnIndexAndTypeInfo::always_defined(c)))
            .collect();
        (index, columns)
    }

    fn row(index: &Index) -> ResultChunk {
        let iri = index.id_for(&TripleComponent::iri("a")).unwrap();
        let plain = index.id_for(&TripleComponent::literal("plain")).unwrap();
        let table = IdTable::from_rows(
            5,
            &[vec![iri, Id::make_from_int(42), Id::make_from_bool(true), Id::make_from_double(1.5), plain]],
        );
        ResultChunk::new(table, LocalVocab::new())
    }

    #[test]
    fn test_evaluate_variable() {
        let (index, columns) = fixture();
        let result = row(&index);
        let context = ConstructQueryExportContext::new(0, &result, &columns, &index);
        let eval = |name: &str| context.evaluate_variable(&var(name), PositionInTriple::Object);
        assert_eq!(eval("?x").as_deref(), Some("<a>"));
        assert_eq!(eval("?n").as_deref(), Some("42"));
        assert_eq!(eval("?b").as_deref(), Some("true"));
        assert_eq!(eval("?d").as_deref(), Some("1.5"));
        assert_eq!(eval("?s").as_deref(), Some("\"plain\""));
        assert_eq!(eval("?missing"), None);
    }

    #[test]
    fn test_construct_triples() {
        let (index, columns) = fixture();
        let result = row(&index);
        let template = vec![
            SparqlTripleSimple::new(
                TripleComponent::variable("?x"),
                TripleComponent::iri("count"),
                TripleComponent::variable("?n"),
            ),
            SparqlTripleSimple::new(
                TripleComponent::BlankNode("_:g".to_string()),
                TripleComponent::iri("label"),
                TripleComponent::variable("?s"),
            ),
            // a literal can not be a subject
            SparqlTripleSimple::new(
                TripleComponent::variable("?s"),
                TripleComponent::iri("p"),
                TripleComponent::variable("?x"),
            ),
        ];
        let triples = construct_triples(&template, &result, &columns, &index, 7);
        assert_eq!(
            triples,
            vec![
                ["<a>".to_string(), "<count>".to_string(), "42".to_string()],
                ["_:u7_g".to_string(), "<label>".to_string(), "\"plain\"".to_string()],
            ]
        );
    }
}

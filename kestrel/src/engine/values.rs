/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::*;
use crate::error::EngineError;
use shared::terms::TripleComponent;

/// An inline table of constants, as written in a `VALUES` clause.
#[derive(Debug, Clone)]
pub struct Values {
    context: QueryExecutionContext,
    variables: Vec<Variable>,
    rows: Vec<Vec<TripleComponent>>,
}

impl Values {
    pub fn new(
        context: QueryExecutionContext,
        variables: Vec<Variable>,
        rows: Vec<Vec<TripleComponent>>,
    ) -> Result<Self> {
        if let Some(row) = rows.iter().find(|row| row.len() != variables.len()) {
            return Err(EngineError::InvalidInput(format!(
                "a VALUES row has {} entries, but {} variables are declared",
                row.len(),
                variables.len()
            )));
        }
        if let Some(TripleComponent::Variable(var)) =
            rows.iter().flatten().find(|c| c.is_variable())
        {
            return Err(EngineError::InvalidInput(format!(
                "VALUES may only contain constants, found {}",
                var
            )));
        }
        Ok(Values {
            context,
            variables,
            rows,
        })
    }

    fn column_might_be_undefined(&self, column: usize) -> bool {
        self.rows
            .iter()
            .any(|row| matches!(row[column], TripleComponent::Undef))
    }
}

impl Operation for Values {
    fn context(&self) -> &QueryExecutionContext {
        &self.context
    }

    fn descriptor(&self) -> String {
        let names: Vec<&str> = self.variables.iter().map(|v| v.name()).collect();
        format!("Values with variables {}", names.join(" "))
    }

    fn cache_key(&self) -> String {
        let rows: Vec<String> = self
            .rows
            .iter()
            .map(|row| {
                let row: Vec<String> = row.iter().map(|c| c.to_string()).collect();
                format!("({})", row.join(" "))
            })
            .collect();
        format!("VALUES width {} {{{}}}", self.variables.len(), rows.join(" "))
    }

    fn result_width(&self) -> usize {
        self.variables.len()
    }

    fn result_sorted_on(&self) -> Vec<usize> {
        Vec::new()
    }

    fn variable_to_column_map(&self) -> VariableToColumnMap {
        self.variables
            .iter()
            .enumerate()
            .map(|(column, var)| {
                let info = if self.column_might_be_undefined(column) {
                    ColumnIndexAndTypeInfo::possibly_undefined(column)
                } else {
                    ColumnIndexAndTypeInfo::always_defined(column)
                };
                (var.clone(), info)
            })
            .collect()
    }

    fn children(&self) -> Vec<&QueryExecutionTree> {
        Vec::new()
    }

    fn size_estimate_before_limit(&self) -> u64 {
        self.rows.len() as u64
    }

    fn cost_estimate(&self) -> u64 {
        self.rows.len() as u64
    }

    fn known_empty_result(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_originates_from_graph_or_undef(&self, _variable: &Variable) -> bool {
        false
    }

    fn clone_operation(&self) -> Arc<dyn Operation> {
        Arc::new(self.clone())
    }

    fn compute_result(&self) -> Result<ChunkIterator> {
        let index = self.context.index();
        let mut local_vocab = LocalVocab::new();
        let mut table = IdTable::new(self.variables.len());
        let mut ids = Vec::with_capacity(self.variables.len());
        for row in &self.rows {
            ids.clear();
            for component in row {
                ids.push(index.id_or_local(component, &mut local_vocab)?);
            }
            table.push_row(&ids);
        }
        Ok(single_chunk(ResultChunk::new(table, local_vocab)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::*;
    use super::*;
    use shared::id::Id;

    #[test]
    fn test_unknown_constants_go_to_the_local_vocab() {
        let context = small_context();
        let values = Values::new(
            context.clone(),
            vec![var("?x"), var("?y")],
            vec![
                vec![TripleComponent::iri("a"), TripleComponent::Undef],
                vec![TripleComponent::iri("unknown"), TripleComponent::Int(4)],
            ],
        )
        .unwrap();
        let map = values.variable_to_column_map();
        assert_eq!(map[&var("?x")].might_contain_undef, UndefStatus::AlwaysDefined);
        assert_eq!(map[&var("?y")].might_contain_undef, UndefStatus::PossiblyUndefined);

        let result = QueryExecutionTree::new(values).collect_table().unwrap();
        assert_eq!(result.table.get(0, 0), id(&context, "a"));
        assert!(result.table.get(0, 1).is_undefined());
        assert_eq!(result.table.get(1, 1), Id::make_from_int(4));
        let unknown = result.table.get(1, 0);
        assert_eq!(context.index().word(unknown, &result.local_vocab), Some("<unknown>"));
    }

    #[test]
    fn test_rows_must_match_the_variables() {
        let result = Values::new(
            small_context(),
            vec![var("?x")],
            vec![vec![TripleComponent::Int(1), TripleComponent::Int(2)]],
        );
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }
}

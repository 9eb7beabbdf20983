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
use shared::id::Id;

/// Bag union of two subtrees. Variables are matched by name; a variable that
/// only one side binds is undefined in the rows of the other side.
#[derive(Debug)]
pub struct Union {
    left: QueryExecutionTree,
    right: QueryExecutionTree,
    // For every output column, the input column of the left and right side.
    column_origins: Vec<(Option<usize>, Option<usize>)>,
}

impl Union {
    pub fn new(left: QueryExecutionTree, right: QueryExecutionTree) -> Self {
        let column_origins = Self::compute_column_origins(&left, &right);
        Union {
            left,
            right,
            column_origins,
        }
    }

    fn compute_column_origins(
        left: &QueryExecutionTree,
        right: &QueryExecutionTree,
    ) -> Vec<(Option<usize>, Option<usize>)> {
        let left_variables = variables_by_column(&left.variable_columns());
        let right_variables = variables_by_column(&right.variable_columns());
        let mut origins: Vec<(Option<usize>, Option<usize>)> = left_variables
            .iter()
            .enumerate()
            .map(|(column, var)| (Some(column), right.variable_column(var)))
            .collect();
        origins.extend(
            right_variables
                .iter()
                .filter(|var| left.variable_column(var).is_none())
                .map(|var| (None, right.variable_column(var))),
        );
        origins
    }

    fn output_variables(&self) -> Vec<Variable> {
        let mut variables = variables_by_column(&self.left.variable_columns());
        let right_variables = variables_by_column(&self.right.variable_columns());
        let left_variables = self.left.variable_columns();
        variables.extend(
            right_variables
                .into_iter()
                .filter(|var| !left_variables.contains_key(var)),
        );
        variables
    }

    fn pad(table: &IdTable, columns: &[Option<usize>]) -> IdTable {
        let mut result = IdTable::new(columns.len());
        let mut row: Vec<Id> = Vec::with_capacity(columns.len());
        for input in table.rows() {
            row.clear();
            row.extend(columns.iter().map(|c| match c {
                Some(c) => input[*c],
                None => Id::make_undefined(),
            }));
            result.push_row(&row);
        }
        result
    }
}

impl Operation for Union {
    fn context(&self) -> &QueryExecutionContext {
        self.left.root().context()
    }

    fn descriptor(&self) -> String {
        "Union".to_string()
    }

    fn cache_key(&self) -> String {
        let origins: Vec<String> = self
            .column_origins
            .iter()
            .map(|(l, r)| {
                let render = |c: &Option<usize>| c.map_or("-".to_string(), |c| c.to_string());
                format!("{}|{}", render(l), render(r))
            })
            .collect();
        format!(
            "{}\nUNION\n{}\ncolumns [{}]",
            self.left.cache_key(),
            self.right.cache_key(),
            origins.join(" ")
        )
    }

    fn result_width(&self) -> usize {
        self.column_origins.len()
    }

    fn result_sorted_on(&self) -> Vec<usize> {
        Vec::new()
    }

    fn variable_to_column_map(&self) -> VariableToColumnMap {
        let left = self.left.variable_columns();
        let right = self.right.variable_columns();
        self.output_variables()
            .into_iter()
            .enumerate()
            .map(|(column, var)| {
                let defined = |map: &VariableToColumnMap| {
                    map.get(&var)
                        .is_some_and(|info| info.might_contain_undef == UndefStatus::AlwaysDefined)
                };
                let info = if defined(&left) && defined(&right) {
                    ColumnIndexAndTypeInfo::always_defined(column)
                } else {
                    ColumnIndexAndTypeInfo::possibly_undefined(column)
                };
                (var, info)
            })
            .collect()
    }

    fn children(&self) -> Vec<&QueryExecutionTree> {
        vec![&self.left, &self.right]
    }

    fn size_estimate_before_limit(&self) -> u64 {
        self.left.size_estimate() + self.right.size_estimate()
    }

    fn cost_estimate(&self) -> u64 {
        self.size_estimate_before_limit() + self.left.cost_estimate() + self.right.cost_estimate()
    }

    fn known_empty_result(&self) -> bool {
        self.left.known_empty_result() && self.right.known_empty_result()
    }

    fn column_originates_from_graph_or_undef(&self, variable: &Variable) -> bool {
        // A side that does not bind the variable contributes only undefined values.
        [&self.left, &self.right].iter().all(|side| {
            side.variable_column(variable).is_none()
                || side.root().column_originates_from_graph_or_undef(variable)
        })
    }

    fn clone_operation(&self) -> Arc<dyn Operation> {
        Arc::new(Union::new(self.left.deep_clone(), self.right.deep_clone()))
    }

    fn compute_result(&self) -> Result<ChunkIterator> {
        let left_columns: Vec<Option<usize>> = self.column_origins.iter().map(|(l, _)| *l).collect();
        let right_columns: Vec<Option<usize>> = self.column_origins.iter().map(|(_, r)| *r).collect();
        let left = self.left.compute_result()?.map(move |chunk| {
            chunk.map(|c| ResultChunk::new(Union::pad(&c.table, &left_columns), c.local_vocab))
        });
        let right_tree = self.right.clone();
        let mut right_chunks: Option<ChunkIterator> = None;
        let mut right_started = false;
        let right = std::iter::from_fn(move || {
            if !right_started {
                right_started = true;
                match right_tree.compute_result() {
                    Ok(chunks) => right_chunks = Some(chunks),
                    Err(err) => return Some(Err(err)),
                }
            }
            let chunk = right_chunks.as_mut()?.next()?;
            Some(chunk.map(|c| ResultChunk::new(Union::pad(&c.table, &right_columns), c.local_vocab)))
        });
        Ok(Box::new(left.chain(right)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::*;
    use super::super::values::Values;
    use super::*;
    use shared::terms::TripleComponent;

    #[test]
    fn test_union_pads_missing_columns() {
        let context = small_context();
        let left = Values::new(
            context.clone(),
            vec![var("?x"), var("?y")],
            vec![vec![TripleComponent::Int(1), TripleComponent::Int(2)]],
        )
        .unwrap();
        let right = Values::new(
            context.clone(),
            vec![var("?z"), var("?x")],
            vec![vec![TripleComponent::Int(3), TripleComponent::Int(4)]],
        )
        .unwrap();
        let union = Union::new(QueryExecutionTree::new(left), QueryExecutionTree::new(right));
        assert_eq!(union.result_width(), 3);
        let map = union.variable_to_column_map();
        assert_eq!(map[&var("?x")], ColumnIndexAndTypeInfo::always_defined(0));
        assert_eq!(map[&var("?y")], ColumnIndexAndTypeInfo::possibly_undefined(1));
        assert_eq!(map[&var("?z")], ColumnIndexAndTypeInfo::possibly_undefined(2));

        let table = QueryExecutionTree::new(union).collect_table().unwrap().table;
        let int = Id::make_from_int;
        let undef = Id::make_undefined();
        assert_eq!(
            table.to_rows(),
            vec![vec![int(1), int(2), undef], vec![int(4), undef, int(3)]]
        );
    }
}

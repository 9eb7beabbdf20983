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
use shared::id::Id;
use std::cmp::Ordering;

/// Merge join of two subtrees on one column each.
///
/// The result starts with the join column, followed by the remaining columns
/// of the left and then of the right input. Undefined values never match.
#[derive(Debug)]
pub struct Join {
    left: QueryExecutionTree,
    right: QueryExecutionTree,
    left_join_column: usize,
    right_join_column: usize,
}

impl Join {
    pub fn new(
        left: QueryExecutionTree,
        right: QueryExecutionTree,
        left_join_column: usize,
        right_join_column: usize,
    ) -> Result<Self> {
        if left_join_column >= left.result_width() || right_join_column >= right.result_width() {
            return Err(EngineError::PreconditionViolation(format!(
                "join columns {} and {} are out of range for inputs of width {} and {}",
                left_join_column,
                right_join_column,
                left.result_width(),
                right.result_width()
            )));
        }
        let left_variables = left.variable_columns();
        for (var, info) in right.variable_columns() {
            if info.column_index != right_join_column && left_variables.contains_key(&var) {
                return Err(EngineError::InvalidInput(format!(
                    "the variable {} occurs in both inputs of a join, but is not the join column",
                    var
                )));
            }
        }
        Ok(Join {
            left: QueryExecutionTree::create_sorted_tree(left, &[left_join_column]),
            right: QueryExecutionTree::create_sorted_tree(right, &[right_join_column]),
            left_join_column,
            right_join_column,
        })
    }

    pub fn left(&self) -> &QueryExecutionTree {
        &self.left
    }

    pub fn right(&self) -> &QueryExecutionTree {
        &self.right
    }

    fn output_row(&self, left: &[Id], right: &[Id], row: &mut Vec<Id>) {
        row.clear();
        row.push(left[self.left_join_column]);
        row.extend(
            left.iter()
                .enumerate()
                .filter(|(c, _)| *c != self.left_join_column)
                .map(|(_, id)| *id),
        );
        row.extend(
            right
                .iter()
                .enumerate()
                .filter(|(c, _)| *c != self.right_join_column)
                .map(|(_, id)| *id),
        );
    }
}

// Position of `column` in the output of a join, given the input's join column.
fn shifted(column: usize, join_column: usize, offset: usize) -> usize {
    match column.cmp(&join_column) {
        Ordering::Equal => 0,
        Ordering::Less => offset + column,
        Ordering::Greater => offset + column - 1,
    }
}

impl Operation for Join {
    fn context(&self) -> &QueryExecutionContext {
        self.left.root().context()
    }

    fn descriptor(&self) -> String {
        let variables = variables_by_column(&self.left.variable_columns());
        match variables.get(self.left_join_column) {
            Some(var) => format!("Join on {}", var),
            None => "Join".to_string(),
        }
    }

    fn cache_key(&self) -> String {
        format!(
            "JOIN\n{} join-column: [{}]\n|X|\n{} join-column: [{}]",
            self.left.cache_key(),
            self.left_join_column,
            self.right.cache_key(),
            self.right_join_column
        )
    }

    fn result_width(&self) -> usize {
        self.left.result_width() + self.right.result_width() - 1
    }

    fn result_sorted_on(&self) -> Vec<usize> {
        vec![0]
    }

    fn variable_to_column_map(&self) -> VariableToColumnMap {
        let mut map = VariableToColumnMap::new();
        for (var, info) in self.left.variable_columns() {
            let column = shifted(info.column_index, self.left_join_column, 1);
            let undef = if column == 0 {
                UndefStatus::AlwaysDefined
            } else {
                info.might_contain_undef
            };
            map.insert(
                var,
                ColumnIndexAndTypeInfo {
                    column_index: column,
                    might_contain_undef: undef,
                },
            );
        }
        let offset = self.left.result_width();
        for (var, info) in self.right.variable_columns() {
            let column = shifted(info.column_index, self.right_join_column, offset);
            if column == 0 {
                map.entry(var).or_insert(ColumnIndexAndTypeInfo::always_defined(0));
            } else {
                map.insert(
                    var,
                    ColumnIndexAndTypeInfo {
                        column_index: column,
                        might_contain_undef: info.might_contain_undef,
                    },
                );
            }
        }
        map
    }

    fn children(&self) -> Vec<&QueryExecutionTree> {
        vec![&self.left, &self.right]
    }

    fn size_estimate_before_limit(&self) -> u64 {
        self.left.size_estimate().min(self.right.size_estimate())
    }

    fn cost_estimate(&self) -> u64 {
        self.size_estimate_before_limit()
            + self.left.cost_estimate()
            + self.right.cost_estimate()
            + self.left.size_estimate()
            + self.right.size_estimate()
    }

    fn known_empty_result(&self) -> bool {
        self.left.known_empty_result() || self.right.known_empty_result()
    }

    fn column_originates_from_graph_or_undef(&self, variable: &Variable) -> bool {
        // The join column holds values that both inputs agree on.
        let in_left = self.left.variable_column(variable);
        let in_right = self.right.variable_column(variable);
        match (in_left, in_right) {
            (Some(_), Some(_)) => {
                self.left.root().column_originates_from_graph_or_undef(variable)
                    || self.right.root().column_originates_from_graph_or_undef(variable)
            }
            (Some(_), None) => self.left.root().column_originates_from_graph_or_undef(variable),
            (None, Some(_)) => self.right.root().column_originates_from_graph_or_undef(variable),
            (None, None) => false,
        }
    }

    fn clone_operation(&self) -> Arc<dyn Operation> {
        Arc::new(Join {
            left: self.left.deep_clone(),
            right: self.right.deep_clone(),
            left_join_column: self.left_join_column,
            right_join_column: self.right_join_column,
        })
    }

    fn compute_result(&self) -> Result<ChunkIterator> {
        if self.known_empty_result() {
            return Ok(Box::new(std::iter::empty()));
        }
        let left = self.left.collect_table()?;
        let right = self.right.collect_table()?;
        let (lc, rc) = (self.left_join_column, self.right_join_column);
        let (lt, rt) = (&left.table, &right.table);

        let mut result = IdTable::new(self.result_width());
        let mut row = Vec::with_capacity(self.result_width());
        let (mut i, mut j) = (0, 0);
        while i < lt.num_rows() && j < rt.num_rows() {
            let (a, b) = (lt.get(i, lc), rt.get(j, rc));
            if a.is_undefined() {
                i += 1;
                continue;
            }
            if b.is_undefined() {
                j += 1;
                continue;
            }
            match a.cmp(&b) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    let left_end = (i..lt.num_rows()).find(|&k| lt.get(k, lc) != a).unwrap_or(lt.num_rows());
                    let right_end = (j..rt.num_rows()).find(|&k| rt.get(k, rc) != b).unwrap_or(rt.num_rows());
                    for l in i..left_end {
                        for r in j..right_end {
                            self.output_row(lt.row(l), rt.row(r), &mut row);
                            result.push_row(&row);
                        }
                    }
                    i = left_end;
                    j = right_end;
                }
            }
        }

        let mut local_vocab = left.local_vocab;
        local_vocab.merge(&right.local_vocab);
        Ok(single_chunk(ResultChunk::new(result, local_vocab)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

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

/// Sorts the complete result of its child on the given columns.
#[derive(Debug)]
pub struct Sort {
    child: QueryExecutionTree,
    sort_columns: Vec<usize>,
}

impl Sort {
    pub fn new(child: QueryExecutionTree, sort_columns: Vec<usize>) -> Self {
        Sort { child, sort_columns }
    }

    pub fn child(&self) -> &QueryExecutionTree {
        &self.child
    }

    pub fn sort_columns(&self) -> &[usize] {
        &self.sort_columns
    }
}

impl Operation for Sort {
    fn context(&self) -> &QueryExecutionContext {
        self.child.root().context()
    }

    fn descriptor(&self) -> String {
        let variables = variables_by_column(&self.child.variable_columns());
        let names: Vec<String> = self
            .sort_columns
            .iter()
            .filter_map(|c| variables.get(*c).map(|v| v.to_string()))
            .collect();
        format!("Sort (internal order) on {}", names.join(" "))
    }

    fn cache_key(&self) -> String {
        let columns: Vec<String> = self.sort_columns.iter().map(|c| c.to_string()).collect();
        format!("SORT(internal) on columns:asc({}) \n{}", columns.join(" "), self.child.cache_key())
    }

    fn result_width(&self) -> usize {
        self.child.result_width()
    }

    fn result_sorted_on(&self) -> Vec<usize> {
        self.sort_columns.clone()
    }

    fn variable_to_column_map(&self) -> VariableToColumnMap {
        self.child.variable_columns()
    }

    fn children(&self) -> Vec<&QueryExecutionTree> {
        vec![&self.child]
    }

    fn size_estimate_before_limit(&self) -> u64 {
        self.child.size_estimate()
    }

    fn cost_estimate(&self) -> u64 {
        sort_cost(self.size_estimate_before_limit()) + self.child.cost_estimate()
    }

    fn known_empty_result(&self) -> bool {
        self.child.known_empty_result()
    }

    fn clone_operation(&self) -> Arc<dyn Operation> {
        Arc::new(Sort::new(self.child.deep_clone(), self.sort_columns.clone()))
    }

    fn compute_result(&self) -> Result<ChunkIterator> {
        let mut result = self.child.collect_table()?;
        result.table.sort_by_columns(&self.sort_columns);
        Ok(single_chunk(result))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

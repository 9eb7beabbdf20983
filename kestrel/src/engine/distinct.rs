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

/// Removes rows that are equal on `keep_columns`. The child is sorted on
/// these columns, so duplicates are adjacent, also across chunk borders.
#[derive(Debug)]
pub struct Distinct {
    child: QueryExecutionTree,
    keep_columns: Vec<usize>,
}

impl Distinct {
    pub fn new(child: QueryExecutionTree, keep_columns: Vec<usize>) -> Self {
        Distinct {
            child: QueryExecutionTree::create_sorted_tree(child, &keep_columns),
            keep_columns,
        }
    }
}

impl Operation for Distinct {
    fn context(&self) -> &QueryExecutionContext {
        self.child.root().context()
    }

    fn descriptor(&self) -> String {
        let variables = variables_by_column(&self.child.variable_columns());
        let names: Vec<String> = self
            .keep_columns
            .iter()
            .filter_map(|c| variables.get(*c).map(|v| v.to_string()))
            .collect();
        format!("Distinct {}", names.join(" "))
    }

    fn cache_key(&self) -> String {
        let columns: Vec<String> = self.keep_columns.iter().map(|c| c.to_string()).collect();
        format!("DISTINCT ({})\n{}", columns.join(" "), self.child.cache_key())
    }

    fn result_width(&self) -> usize {
        self.child.result_width()
    }

    fn result_sorted_on(&self) -> Vec<usize> {
        self.keep_columns.clone()
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
        self.size_estimate_before_limit() + self.child.cost_estimate()
    }

    fn known_empty_result(&self) -> bool {
        self.child.known_empty_result()
    }

    fn clone_operation(&self) -> Arc<dyn Operation> {
        Arc::new(Distinct::new(self.child.deep_clone(), self.keep_columns.clone()))
    }

    fn compute_result(&self) -> Result<ChunkIterator> {
        let keep_columns = self.keep_columns.clone();
        let mut previous: Option<Vec<Id>> = None;
        let chunks = self.child.compute_result()?.filter_map(move |chunk| {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => return Some(Err(err)),
            };
            let mut table = IdTable::new(chunk.table.num_columns());
            for row in chunk.table.rows() {
                let key: Vec<Id> = keep_columns.iter().map(|c| row[*c]).collect();
                if previous.as_ref() != Some(&key) {
                    table.push_row(row);
                    previous = Some(key);
                }
            }
            (!table.is_empty()).then(|| Ok(ResultChunk::new(table, chunk.local_vocab)))
        });
        Ok(Box::new(chunks))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

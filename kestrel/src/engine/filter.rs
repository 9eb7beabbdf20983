/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::index_scan::IndexScan;
use super::*;
use crate::expression::{EvaluationContext, SparqlExpression};
use log::debug;

/// Keeps the rows for which the expression is true.
///
/// A filter directly above an `IndexScan` hands the block prefilters implied
/// by its expression down to the scan.
#[derive(Debug)]
pub struct Filter {
    child: QueryExecutionTree,
    expression: Box<dyn SparqlExpression>,
}

impl Filter {
    pub fn new(child: QueryExecutionTree, expression: Box<dyn SparqlExpression>) -> Self {
        let child = Self::push_down_prefilters(child, expression.as_ref());
        Filter { child, expression }
    }

    fn push_down_prefilters(child: QueryExecutionTree, expression: &dyn SparqlExpression) -> QueryExecutionTree {
        let Some(scan) = child.downcast::<IndexScan>() else {
            return child;
        };
        let pairs = expression.prefilter_expressions();
        if pairs.is_empty() {
            return child;
        }
        match scan.with_prefilters(pairs) {
            Ok(Some(filtered)) => QueryExecutionTree::new(filtered),
            Ok(None) => child,
            Err(err) => {
                debug!("Prefilters can not be used for {}: {}", scan.descriptor(), err);
                child
            }
        }
    }

    pub fn child(&self) -> &QueryExecutionTree {
        &self.child
    }

    pub fn expression(&self) -> &dyn SparqlExpression {
        self.expression.as_ref()
    }
}

impl Operation for Filter {
    fn context(&self) -> &QueryExecutionContext {
        self.child.root().context()
    }

    fn descriptor(&self) -> String {
        format!("Filter {}", self.expression.cache_key(&self.child.variable_columns()))
    }

    fn cache_key(&self) -> String {
        format!(
            "FILTER {}\n{}",
            self.expression.cache_key(&self.child.variable_columns()),
            self.child.cache_key()
        )
    }

    fn result_width(&self) -> usize {
        self.child.result_width()
    }

    fn result_sorted_on(&self) -> Vec<usize> {
        self.child.result_sorted_on()
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
        Arc::new(Filter {
            child: self.child.deep_clone(),
            expression: self.expression.clone(),
        })
    }

    fn compute_result(&self) -> Result<ChunkIterator> {
        let index = self.context().shared_index();
        let variable_columns = self.child.variable_columns();
        let expression = self.expression.clone();
        let chunks = self.child.compute_result()?.filter_map(move |chunk| {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => return Some(Err(err)),
            };
            let context = EvaluationContext::new(&index, &chunk.table, &variable_columns, &chunk.local_vocab);
            let mut table = IdTable::new(chunk.table.num_columns());
            for row in 0..chunk.table.num_rows() {
                let value = expression.evaluate(&context.at_row(row));
                if value.effective_boolean_value() == Some(true) {
                    table.push_row(chunk.table.row(row));
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

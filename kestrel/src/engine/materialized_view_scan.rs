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
use crate::materialized_views::query_analysis::{RequestedColumns, ViewPtr};
use shared::id::Id;
use shared::terms::TripleComponent;

/// Reads some columns of a materialized view, bound to the variables of a
/// user query. Optionally only the rows with a fixed value in one view column
/// are read.
#[derive(Debug, Clone)]
pub struct MaterializedViewScan {
    context: QueryExecutionContext,
    view: ViewPtr,
    // (view column, output variable), ordered by view column
    columns: Vec<(usize, Variable)>,
    restriction: Option<(usize, TripleComponent)>,
}

impl MaterializedViewScan {
    pub fn new(
        context: QueryExecutionContext,
        view: ViewPtr,
        requested_columns: &RequestedColumns,
        restriction: Option<(Variable, TripleComponent)>,
    ) -> Result<Self> {
        let column_of = |variable: &Variable| {
            view.column_of(variable).ok_or_else(|| {
                EngineError::PreconditionViolation(format!(
                    "the materialized view {} has no column {}",
                    view.name(),
                    variable
                ))
            })
        };
        let mut columns = requested_columns
            .iter()
            .map(|(view_variable, variable)| Ok((column_of(view_variable)?, variable.clone())))
            .collect::<Result<Vec<_>>>()?;
        columns.sort();
        let restriction = match restriction {
            Some((variable, value)) => {
                if value.is_variable() {
                    return Err(EngineError::PreconditionViolation(format!(
                        "a view scan can only be restricted to a constant, not {}",
                        value
                    )));
                }
                Some((column_of(&variable)?, value))
            }
            None => None,
        };
        Ok(MaterializedViewScan {
            context,
            view,
            columns,
            restriction,
        })
    }

    pub fn view(&self) -> &ViewPtr {
        &self.view
    }

    // `None` if the restriction value is not part of the index.
    fn restriction_id(&self) -> Option<Option<(usize, Id)>> {
        match &self.restriction {
            None => Some(None),
            Some((column, value)) => self.context.index().id_for(value).map(|id| Some((*column, id))),
        }
    }

    fn matching_rows(&self) -> Vec<usize> {
        let table = self.view.table();
        match self.restriction_id() {
            None => Vec::new(),
            Some(None) => (0..table.num_rows()).collect(),
            Some(Some((0, id))) => {
                let rows: Vec<Id> = table.column(0).collect();
                let begin = rows.partition_point(|x| *x < id);
                let end = rows.partition_point(|x| *x <= id);
                (begin..end).collect()
            }
            Some(Some((column, id))) => (0..table.num_rows()).filter(|row| table.get(*row, column) == id).collect(),
        }
    }
}

impl Operation for MaterializedViewScan {
    fn context(&self) -> &QueryExecutionContext {
        &self.context
    }

    fn descriptor(&self) -> String {
        format!("MaterializedViewScan {}", self.view.name())
    }

    fn cache_key(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|(column, _)| column.to_string()).collect();
        let mut key = format!("MATERIALIZED VIEW {} columns [{}]", self.view.name(), columns.join(" "));
        if let Some((column, value)) = &self.restriction {
            key.push_str(&format!(" restricted to {} = {}", column, value));
        }
        key
    }

    fn result_width(&self) -> usize {
        self.columns.len()
    }

    // The view is sorted on all of its columns, so the output is sorted on
    // every leading output column that directly follows the previous one.
    fn result_sorted_on(&self) -> Vec<usize> {
        let mut expected = match &self.restriction {
            Some((0, _)) => 1,
            _ => 0,
        };
        let mut sorted = Vec::new();
        for (output, (column, _)) in self.columns.iter().enumerate() {
            if *column != expected {
                break;
            }
            sorted.push(output);
            expected += 1;
        }
        sorted
    }

    fn variable_to_column_map(&self) -> VariableToColumnMap {
        self.columns
            .iter()
            .enumerate()
            .map(|(output, (_, variable))| (variable.clone(), ColumnIndexAndTypeInfo::always_defined(output)))
            .collect()
    }

    fn children(&self) -> Vec<&QueryExecutionTree> {
        Vec::new()
    }

    fn size_estimate_before_limit(&self) -> u64 {
        self.matching_rows().len() as u64
    }

    fn cost_estimate(&self) -> u64 {
        self.size_estimate_before_limit()
    }

    fn known_empty_result(&self) -> bool {
        self.view.num_rows() == 0 || self.restriction_id().is_none()
    }

    fn column_originates_from_graph_or_undef(&self, variable: &Variable) -> bool {
        self.columns.iter().any(|(_, v)| v == variable)
    }

    fn clone_operation(&self) -> Arc<dyn Operation> {
        Arc::new(self.clone())
    }

    fn compute_result(&self) -> Result<ChunkIterator> {
        let table = self.view.table();
        let columns: Vec<usize> = self.columns.iter().map(|(column, _)| *column).collect();
        let mut result = IdTable::new(columns.len());
        let mut row = Vec::with_capacity(columns.len());
        for index in self.matching_rows() {
            let source = table.row(index);
            row.clear();
            row.extend(columns.iter().map(|c| source[*c]));
            result.push_row(&row);
        }
        Ok(single_chunk(ResultChunk::new(result, LocalVocab::new())))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

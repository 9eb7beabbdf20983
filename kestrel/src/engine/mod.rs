/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The operator tree. Every node implements [`Operation`]; subtrees are held
//! in [`QueryExecutionTree`]s, which are cheap to clone and share their root.
//!
//! Results are produced as lazy sequences of [`ResultChunk`]s. Consumers pull
//! chunks one at a time and cancellation is checked between two chunks.

pub mod distinct;
pub mod filter;
pub mod index_scan;
pub mod join;
pub mod materialized_view_scan;
pub mod sort;
pub mod transitive_path;
pub mod union;
pub mod values;

use crate::cancellation::CancellationHandle;
use crate::error::Result;
use crate::id_table::IdTable;
use crate::index::Index;
use crate::local_vocab::LocalVocab;
use shared::variable::Variable;
use sort::Sort;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Everything an operation needs from its environment while it runs.
#[derive(Debug, Clone)]
pub struct QueryExecutionContext {
    index: Arc<Index>,
    cancellation: CancellationHandle,
}

impl QueryExecutionContext {
    pub fn new(index: Arc<Index>) -> Self {
        QueryExecutionContext {
            index,
            cancellation: CancellationHandle::new(),
        }
    }

    pub fn with_cancellation(index: Arc<Index>, cancellation: CancellationHandle) -> Self {
        QueryExecutionContext { index, cancellation }
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn shared_index(&self) -> Arc<Index> {
        Arc::clone(&self.index)
    }

    pub fn cancellation_handle(&self) -> &CancellationHandle {
        &self.cancellation
    }

    pub fn check_cancellation(&self) -> Result<()> {
        self.cancellation.throw_if_cancelled()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UndefStatus {
    AlwaysDefined,
    PossiblyUndefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnIndexAndTypeInfo {
    pub column_index: usize,
    pub might_contain_undef: UndefStatus,
}

impl ColumnIndexAndTypeInfo {
    pub fn always_defined(column_index: usize) -> Self {
        ColumnIndexAndTypeInfo {
            column_index,
            might_contain_undef: UndefStatus::AlwaysDefined,
        }
    }

    pub fn possibly_undefined(column_index: usize) -> Self {
        ColumnIndexAndTypeInfo {
            column_index,
            might_contain_undef: UndefStatus::PossiblyUndefined,
        }
    }
}

pub type VariableToColumnMap = BTreeMap<Variable, ColumnIndexAndTypeInfo>;

/// One piece of a result: a table and the local vocabulary its Ids may
/// refer to.
#[derive(Debug, Clone, Default)]
pub struct ResultChunk {
    pub table: IdTable,
    pub local_vocab: LocalVocab,
}

impl ResultChunk {
    pub fn new(table: IdTable, local_vocab: LocalVocab) -> Self {
        ResultChunk { table, local_vocab }
    }
}

/// A finite, pull-driven sequence of result chunks. It can only be consumed once.
pub type ChunkIterator = Box<dyn Iterator<Item = Result<ResultChunk>> + Send>;

/// The capabilities every node of the operator tree provides.
pub trait Operation: Send + Sync + fmt::Debug {
    fn context(&self) -> &QueryExecutionContext;

    /// Short human-readable summary, used in logs and plan output.
    fn descriptor(&self) -> String;

    /// Identifies the result of this operation. Two operations with the same
    /// cache key produce the same result up to the names of their variables.
    fn cache_key(&self) -> String;

    fn result_width(&self) -> usize;

    /// Columns on which the result is lexicographically sorted.
    fn result_sorted_on(&self) -> Vec<usize>;

    fn variable_to_column_map(&self) -> VariableToColumnMap;

    fn children(&self) -> Vec<&QueryExecutionTree>;

    fn size_estimate_before_limit(&self) -> u64;

    /// Includes the cost of all children.
    fn cost_estimate(&self) -> u64;

    fn known_empty_result(&self) -> bool;

    /// Whether every value in the column of `variable` is either undefined
    /// or occurs in the knowledge graph. Answering `false` is always safe.
    fn column_originates_from_graph_or_undef(&self, variable: &Variable) -> bool {
        let children = self.children();
        let mut containing = children
            .iter()
            .filter(|child| child.variable_column(variable).is_some())
            .peekable();
        containing.peek().is_some()
            && containing.all(|child| child.root().column_originates_from_graph_or_undef(variable))
    }

    /// A deep copy of this operation and all of its children.
    fn clone_operation(&self) -> Arc<dyn Operation>;

    fn compute_result(&self) -> Result<ChunkIterator>;

    fn as_any(&self) -> &dyn Any;
}

/// A shared handle to the root of an operator tree.
#[derive(Debug, Clone)]
pub struct QueryExecutionTree {
    root: Arc<dyn Operation>,
}

impl QueryExecutionTree {
    pub fn new<O: Operation + 'static>(operation: O) -> Self {
        QueryExecutionTree {
            root: Arc::new(operation),
        }
    }

    pub fn from_operation(root: Arc<dyn Operation>) -> Self {
        QueryExecutionTree { root }
    }

    pub fn root(&self) -> &dyn Operation {
        self.root.as_ref()
    }

    pub fn shared_root(&self) -> Arc<dyn Operation> {
        Arc::clone(&self.root)
    }

    /// The root operation if it is of type `T`.
    pub fn downcast<T: Operation + 'static>(&self) -> Option<&T> {
        self.root.as_any().downcast_ref::<T>()
    }

    pub fn deep_clone(&self) -> QueryExecutionTree {
        QueryExecutionTree {
            root: self.root.clone_operation(),
        }
    }

    pub fn cache_key(&self) -> String {
        self.root.cache_key()
    }

    pub fn result_width(&self) -> usize {
        self.root.result_width()
    }

    pub fn result_sorted_on(&self) -> Vec<usize> {
        self.root.result_sorted_on()
    }

    pub fn variable_columns(&self) -> VariableToColumnMap {
        self.root.variable_to_column_map()
    }

    pub fn variable_column(&self, variable: &Variable) -> Option<usize> {
        self.root
            .variable_to_column_map()
            .get(variable)
            .map(|info| info.column_index)
    }

    pub fn variable_and_info_by_column_index(
        &self,
        column: usize,
    ) -> Option<(Variable, ColumnIndexAndTypeInfo)> {
        self.root
            .variable_to_column_map()
            .into_iter()
            .find(|(_, info)| info.column_index == column)
    }

    pub fn size_estimate(&self) -> u64 {
        self.root.size_estimate_before_limit()
    }

    pub fn cost_estimate(&self) -> u64 {
        self.root.cost_estimate()
    }

    pub fn known_empty_result(&self) -> bool {
        self.root.known_empty_result()
    }

    /// Whether the result is sorted on `columns` or a finer order.
    pub fn is_sorted_on(&self, columns: &[usize]) -> bool {
        self.root.result_sorted_on().starts_with(columns)
    }

    /// The lazy result of the root. Cancellation is checked before every chunk.
    pub fn compute_result(&self) -> Result<ChunkIterator> {
        let cancellation = self.root.context().cancellation_handle().clone();
        cancellation.throw_if_cancelled()?;
        let chunks = self.root.compute_result()?;
        Ok(Box::new(CancellableChunks {
            chunks,
            cancellation,
            done: false,
        }))
    }

    /// Computes the whole result into a single table.
    pub fn collect_table(&self) -> Result<ResultChunk> {
        materialize(self.result_width(), self.compute_result()?)
    }

    /// `tree` if it is already sorted on `sort_columns`, otherwise a `Sort`
    /// on top of it. An existing `Sort` root is replaced instead of stacked.
    pub fn create_sorted_tree(tree: QueryExecutionTree, sort_columns: &[usize]) -> QueryExecutionTree {
        if sort_columns.is_empty() || tree.is_sorted_on(sort_columns) {
            return tree;
        }
        let input = match tree.downcast::<Sort>() {
            Some(sort) => sort.child().clone(),
            None => tree,
        };
        QueryExecutionTree::new(Sort::new(input, sort_columns.to_vec()))
    }
}

struct CancellableChunks {
    chunks: ChunkIterator,
    cancellation: CancellationHandle,
    done: bool,
}

impl Iterator for CancellableChunks {
    type Item = Result<ResultChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(err) = self.cancellation.throw_if_cancelled() {
            self.done = true;
            return Some(Err(err));
        }
        match self.chunks.next() {
            Some(Err(err)) => {
                self.done = true;
                Some(Err(err))
            }
            None => {
                self.done = true;
                None
            }
            chunk => chunk,
        }
    }
}

/// Concatenates all chunks into one table and merges their local vocabularies.
pub fn materialize(num_columns: usize, chunks: ChunkIterator) -> Result<ResultChunk> {
    let mut result = ResultChunk::new(IdTable::new(num_columns), LocalVocab::new());
    for chunk in chunks {
        let chunk = chunk?;
        result.table.append(&chunk.table);
        result.local_vocab.merge(&chunk.local_vocab);
    }
    Ok(result)
}

/// A chunk sequence that yields `chunk` once, unless its table is empty.
pub fn single_chunk(chunk: ResultChunk) -> ChunkIterator {
    if chunk.table.is_empty() {
        Box::new(std::iter::empty())
    } else {
        Box::new(std::iter::once(Ok(chunk)))
    }
}

/// `n * log2(n)`, the cost model for sorting `n` rows.
pub(crate) fn sort_cost(num_rows: u64) -> u64 {
    let n = num_rows.max(1) as f64;
    (n * n.log2().max(1.0)) as u64
}

/// One variable per column, ordered by column.
pub(crate) fn variables_by_column(map: &VariableToColumnMap) -> Vec<Variable> {
    let mut variables: Vec<(usize, &Variable)> =
        map.iter().map(|(var, info)| (info.column_index, var)).collect();
    variables.sort();
    variables.dedup_by_key(|(column, _)| *column);
    variables.into_iter().map(|(_, var)| var.clone()).collect()
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;
    use crate::index::IndexBuilder;
    use shared::id::Id;
    use shared::terms::TripleComponent;

    /// `<a> <p> <b> . <b> <p> <c> . <c> <p> <d> . <a> <q> 1 . <b> <q> 2`.
    pub fn small_context() -> QueryExecutionContext {
        let index = IndexBuilder::new()
            .block_size(2)
            .add_iri_triple("a", "p", TripleComponent::iri("b"))
            .add_iri_triple("b", "p", TripleComponent::iri("c"))
            .add_iri_triple("c", "p", TripleComponent::iri("d"))
            .add_iri_triple("a", "q", TripleComponent::Int(1))
            .add_iri_triple("b", "q", TripleComponent::Int(2))
            .build()
            .unwrap();
        QueryExecutionContext::new(Arc::new(index))
    }

    pub fn id(context: &QueryExecutionContext, iri: &str) -> Id {
        context.index().id_for(&TripleComponent::iri(iri)).unwrap()
    }

    pub fn var(name: &str) -> Variable {
        Variable::new_unchecked(name)
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::*;
    use super::values::Values;
    use super::*;
    use shared::terms::TripleComponent;

    #[test]
    fn test_cancellation_stops_the_result() {
        let context = small_context();
        let values = Values::new(
            context.clone(),
            vec![var("?x")],
            vec![vec![TripleComponent::Int(1)]],
        )
        .unwrap();
        let tree = QueryExecutionTree::new(values);
        context.cancellation_handle().cancel();
        assert!(matches!(
            tree.compute_result().err(),
            Some(crate::error::EngineError::Cancelled)
        ));
    }

    #[test]
    fn test_create_sorted_tree_reuses_sorted_input() {
        let context = small_context();
        let values = Values::new(
            context,
            vec![var("?x"), var("?y")],
            vec![
                vec![TripleComponent::Int(2), TripleComponent::Int(1)],
                vec![TripleComponent::Int(1), TripleComponent::Int(5)],
            ],
        )
        .unwrap();
        let tree = QueryExecutionTree::new(values);
        let sorted = QueryExecutionTree::create_sorted_tree(tree, &[1]);
        assert_eq!(sorted.result_sorted_on(), vec![1]);
        let resorted = QueryExecutionTree::create_sorted_tree(sorted.clone(), &[1]);
        assert_eq!(resorted.cache_key(), sorted.cache_key());
        let other = QueryExecutionTree::create_sorted_tree(sorted, &[0]);
        let sort = other.downcast::<Sort>().unwrap();
        assert!(sort.child().downcast::<Sort>().is_none());
        let table = other.collect_table().unwrap().table;
        assert_eq!(table.get(0, 1), shared::id::Id::make_from_int(5));
    }
}

/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Transitive paths `s <p>{min,max} o`.
//!
//! The edges come from a subtree with (at least) two columns, usually an
//! `IndexScan` of the predicate. The hull is computed from the starting side,
//! which is the side that is bound to an input tree or fixed, and the left
//! side if neither is.
//!
//! The output has the left side in column 0, the right side in column 1 and
//! the remaining columns of a bound input tree from column 2 on.

pub mod hull;
pub mod side;

pub use side::TransitivePathSide;

use super::distinct::Distinct;
use super::filter::Filter;
use super::index_scan::IndexScan;
use super::join::Join;
use super::union::Union;
use super::values::Values;
use super::*;
use crate::error::EngineError;
use crate::expression::{make_bound_expression, make_variable_expression};
use hull::{
    fill_table_with_hull, hull_for_nodes, BinSearchEdges, HashMapEdges, HullChunk, TargetFilter, TransitiveEdges,
};
use log::debug;
use shared::id::Id;
use shared::runtime_parameters::runtime_parameters;
use shared::terms::{SparqlTripleSimple, TripleComponent};
use shared::triple::Permutation;

/// Size estimate for paths with a fixed side.
const FIXED_SIDE_SIZE_ESTIMATE: u64 = 1000;
/// Assumed blowup of the full hull relative to the number of edges.
const FULL_HULL_BLOWUP: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitivePathStrategy {
    /// Successors are looked up in a hash map built from the edges.
    HashMap,
    /// The edges are sorted by start node and successors are found by
    /// binary search.
    BinSearch,
}

impl TransitivePathStrategy {
    pub fn from_runtime_parameters() -> Self {
        if runtime_parameters().use_binsearch_transitive_path() {
            TransitivePathStrategy::BinSearch
        } else {
            TransitivePathStrategy::HashMap
        }
    }
}

fn internal_variable(suffix: &str) -> Variable {
    Variable::new_unchecked(format!("?internal_property_path_variable_{}", suffix))
}

fn scan_selecting(
    context: &QueryExecutionContext,
    permutation: Permutation,
    triple: SparqlTripleSimple,
    selected: &Variable,
) -> Result<QueryExecutionTree> {
    let scan = IndexScan::new(context.clone(), permutation, triple)?.with_selected_variables(vec![selected.clone()])?;
    Ok(QueryExecutionTree::new(scan))
}

// All subjects and objects of the graph, bound to `x`, each exactly once.
fn all_graph_nodes(
    context: &QueryExecutionContext,
    x: &Variable,
    restrict: impl Fn(QueryExecutionTree) -> Result<QueryExecutionTree>,
) -> Result<QueryExecutionTree> {
    let y = internal_variable("y");
    let z = internal_variable("z");
    let subjects = scan_selecting(
        context,
        Permutation::SPO,
        SparqlTripleSimple::new(x.clone().into(), y.clone().into(), z.clone().into()),
        x,
    )?;
    let objects = scan_selecting(
        context,
        Permutation::OPS,
        SparqlTripleSimple::new(z.into(), y.into(), x.clone().into()),
        x,
    )?;
    let union = Union::new(restrict(subjects)?, restrict(objects)?);
    Ok(QueryExecutionTree::new(Distinct::new(QueryExecutionTree::new(union), vec![0])))
}

/// Every node of the graph, bound to `variable` or an internal variable.
pub fn make_empty_path_side(context: &QueryExecutionContext, variable: Option<Variable>) -> Result<QueryExecutionTree> {
    let x = variable.unwrap_or_else(|| internal_variable("x"));
    all_graph_nodes(context, &x, Ok)
}

/// A tree that contains `value` once if it is a node of the graph and is
/// empty otherwise.
pub fn join_with_index_scan(context: &QueryExecutionContext, value: &TripleComponent) -> Result<QueryExecutionTree> {
    let x = internal_variable("x");
    let join_with_value = |tree: QueryExecutionTree| -> Result<QueryExecutionTree> {
        let values = Values::new(context.clone(), vec![x.clone()], vec![vec![value.clone()]])?;
        Ok(QueryExecutionTree::new(Join::new(tree, QueryExecutionTree::new(values), 0, 0)?))
    };
    all_graph_nodes(context, &x, join_with_value)
}

#[derive(Debug, Clone)]
pub struct TransitivePath {
    context: QueryExecutionContext,
    subtree: QueryExecutionTree,
    lhs: TransitivePathSide,
    rhs: TransitivePathSide,
    min_dist: usize,
    max_dist: usize,
    strategy: TransitivePathStrategy,
    bound_variable_is_for_empty_path: bool,
    variable_columns: VariableToColumnMap,
    result_width: usize,
}

impl TransitivePath {
    /// A transitive path with the strategy chosen by the runtime parameters.
    /// `max_dist == usize::MAX` means unbounded.
    pub fn new(
        context: QueryExecutionContext,
        subtree: QueryExecutionTree,
        left: TransitivePathSide,
        right: TransitivePathSide,
        min_dist: usize,
        max_dist: usize,
    ) -> Result<Self> {
        let strategy = TransitivePathStrategy::from_runtime_parameters();
        Self::with_strategy(context, subtree, left, right, min_dist, max_dist, strategy)
    }

    pub fn with_strategy(
        context: QueryExecutionContext,
        subtree: QueryExecutionTree,
        mut lhs: TransitivePathSide,
        mut rhs: TransitivePathSide,
        mut min_dist: usize,
        max_dist: usize,
        strategy: TransitivePathStrategy,
    ) -> Result<Self> {
        if min_dist > max_dist {
            return Err(EngineError::InvalidInput(format!(
                "the minimum length {} of a transitive path exceeds its maximum length {}",
                min_dist, max_dist
            )));
        }
        let width = subtree.result_width();
        if lhs.sub_col >= width || rhs.sub_col >= width || lhs.sub_col == rhs.sub_col {
            return Err(EngineError::PreconditionViolation(format!(
                "the sides of a transitive path must use two distinct columns of the edge subtree, \
                 got {} and {} for a subtree of width {}",
                lhs.sub_col, rhs.sub_col, width
            )));
        }
        if matches!(lhs.value, TripleComponent::Undef) || matches!(rhs.value, TripleComponent::Undef) {
            return Err(EngineError::InvalidInput(
                "the sides of a transitive path must be variables or constants".to_string(),
            ));
        }

        let mut variable_columns = VariableToColumnMap::new();
        if let Some(var) = lhs.value.get_variable() {
            variable_columns.insert(var.clone(), ColumnIndexAndTypeInfo::always_defined(0));
        }
        if let Some(var) = rhs.value.get_variable() {
            variable_columns.insert(var.clone(), ColumnIndexAndTypeInfo::always_defined(1));
        }

        let mut bound_variable_is_for_empty_path = false;
        if min_dist == 0 {
            if !lhs.is_variable() && !rhs.is_variable() && lhs.value != rhs.value {
                // Distinct constants are never connected by an empty path.
                min_dist = 1;
            } else if lhs.is_unbound_variable() && rhs.is_unbound_variable() {
                bound_variable_is_for_empty_path = true;
                lhs.tree_and_col = Some((make_empty_path_side(&context, None)?, 0));
            } else {
                let starting_side = if Self::starts_left(&lhs, &rhs) { &mut lhs } else { &mut rhs };
                if !starting_side.is_variable() {
                    let tree = join_with_index_scan(&context, &starting_side.value)?;
                    starting_side.tree_and_col = Some((tree, 0));
                }
            }
        }
        lhs.output_col = 0;
        rhs.output_col = 1;

        Ok(TransitivePath {
            context,
            subtree,
            lhs,
            rhs,
            min_dist,
            max_dist,
            strategy,
            bound_variable_is_for_empty_path,
            variable_columns,
            result_width: 2,
        })
    }

    fn starts_left(lhs: &TransitivePathSide, rhs: &TransitivePathSide) -> bool {
        if lhs.is_bound_variable() {
            true
        } else {
            !(rhs.is_bound_variable() || !rhs.is_variable())
        }
    }

    /// The starting side and the target side.
    pub fn decide_direction(&self) -> (&TransitivePathSide, &TransitivePathSide) {
        if Self::starts_left(&self.lhs, &self.rhs) {
            debug!("Computing TransitivePath left to right");
            (&self.lhs, &self.rhs)
        } else {
            debug!("Computing TransitivePath right to left");
            (&self.rhs, &self.lhs)
        }
    }

    pub fn left(&self) -> &TransitivePathSide {
        &self.lhs
    }

    pub fn right(&self) -> &TransitivePathSide {
        &self.rhs
    }

    pub fn min_dist(&self) -> usize {
        self.min_dist
    }

    pub fn max_dist(&self) -> usize {
        self.max_dist
    }

    pub fn strategy(&self) -> TransitivePathStrategy {
        self.strategy
    }

    /// Whether one of the sides is bound to an input tree or fixed. The tree
    /// that stands for the empty path does not count.
    pub fn is_bound_or_id(&self) -> bool {
        !self.bound_variable_is_for_empty_path && (!self.lhs.is_unbound_variable() || !self.rhs.is_unbound_variable())
    }

    pub fn bind_left_side(&self, tree: QueryExecutionTree, input_col: usize) -> Result<TransitivePath> {
        self.bind_left_or_right_side(tree, input_col, true)
    }

    pub fn bind_right_side(&self, tree: QueryExecutionTree, input_col: usize) -> Result<TransitivePath> {
        self.bind_left_or_right_side(tree, input_col, false)
    }

    // Values of the input column that are undefined or not part of the graph
    // can not start an empty path, so they are removed first.
    fn match_with_knowledge_graph(
        &self,
        mut tree: QueryExecutionTree,
        mut input_col: usize,
    ) -> Result<(QueryExecutionTree, usize)> {
        if self.min_dist > 0 {
            return Ok((tree, input_col));
        }
        let (variable, info) = tree.variable_and_info_by_column_index(input_col).ok_or_else(|| {
            EngineError::PreconditionViolation(format!("column {} of the input is not bound to a variable", input_col))
        })?;
        if info.might_contain_undef != UndefStatus::AlwaysDefined {
            let bound = make_bound_expression(make_variable_expression(variable.clone()));
            tree = QueryExecutionTree::new(Filter::new(tree, bound));
        }
        if !tree.root().column_originates_from_graph_or_undef(&variable) {
            let nodes = make_empty_path_side(&self.context, Some(variable.clone()))?;
            tree = QueryExecutionTree::new(Join::new(tree, nodes, input_col, 0)?);
            input_col = tree.variable_column(&variable).ok_or_else(|| {
                EngineError::PreconditionViolation(format!("the join lost the variable {}", variable))
            })?;
        }
        Ok((tree, input_col))
    }

    fn bind_left_or_right_side(
        &self,
        tree: QueryExecutionTree,
        input_col: usize,
        is_left: bool,
    ) -> Result<TransitivePath> {
        let side = if is_left { &self.lhs } else { &self.rhs };
        if !side.is_variable() {
            return Err(EngineError::PreconditionViolation(format!(
                "only a variable side of a transitive path can be bound, not {}",
                side.value
            )));
        }
        if input_col >= tree.result_width() {
            return Err(EngineError::PreconditionViolation(format!(
                "column {} is out of range for an input of width {}",
                input_col,
                tree.result_width()
            )));
        }
        let (tree, input_col) = self.match_with_knowledge_graph(tree, input_col)?;
        let tree = QueryExecutionTree::create_sorted_tree(tree, &[input_col]);

        let mut lhs = self.lhs.clone();
        let mut rhs = self.rhs.clone();
        if is_left {
            lhs.tree_and_col = Some((tree.clone(), input_col));
            // Drop the placeholder of a fixed side.
            if !rhs.is_variable() {
                rhs.tree_and_col = None;
            }
        } else {
            if self.bound_variable_is_for_empty_path || !lhs.is_variable() {
                lhs.tree_and_col = None;
            }
            rhs.tree_and_col = Some((tree.clone(), input_col));
        }

        let mut candidates = vec![Self::with_strategy(
            self.context.clone(),
            self.subtree.clone(),
            lhs.clone(),
            rhs.clone(),
            self.min_dist,
            self.max_dist,
            self.strategy,
        )];
        for alternative in self.alternative_subtrees() {
            let remap = |side: &TransitivePathSide| {
                let (variable, _) = self.subtree.variable_and_info_by_column_index(side.sub_col)?;
                let mut side = side.clone();
                side.sub_col = alternative.variable_column(&variable)?;
                Some(side)
            };
            if let (Some(lhs), Some(rhs)) = (remap(&lhs), remap(&rhs)) {
                candidates.push(Self::with_strategy(
                    self.context.clone(),
                    alternative.clone(),
                    lhs,
                    rhs,
                    self.min_dist,
                    self.max_dist,
                    self.strategy,
                ));
            }
        }
        let mut path = cheapest_candidate(candidates)?;

        for (variable, mut info) in tree.variable_columns() {
            let column = info.column_index;
            if column == input_col {
                continue;
            }
            info.column_index += if column > input_col { 1 } else { 2 };
            if path.variable_columns.contains_key(&variable) {
                return Err(EngineError::InvalidInput(format!(
                    "the variable {} is bound by the input and by the transitive path",
                    variable
                )));
            }
            path.variable_columns.insert(variable, info);
        }
        path.result_width += tree.result_width() - 1;
        Ok(path)
    }

    /// Equivalent edge subtrees with a different sort order. Only the binary
    /// search strategy depends on the order of the edges.
    pub fn alternative_subtrees(&self) -> Vec<QueryExecutionTree> {
        if self.strategy != TransitivePathStrategy::BinSearch {
            return Vec::new();
        }
        self.subtree
            .downcast::<IndexScan>()
            .and_then(IndexScan::alternative_permutation_scan)
            .map(QueryExecutionTree::new)
            .into_iter()
            .collect()
    }

    fn build_edges(&self, start_col: usize, target_col: usize) -> Result<(Arc<dyn TransitiveEdges>, LocalVocab)> {
        match self.strategy {
            TransitivePathStrategy::HashMap => {
                let result = self.subtree.collect_table()?;
                let mut edges = HashMapEdges::default();
                for row in result.table.rows() {
                    let (from, to) = (row[start_col], row[target_col]);
                    if !from.is_undefined() && !to.is_undefined() {
                        edges.insert(from, to);
                    }
                }
                Ok((Arc::new(edges), result.local_vocab))
            }
            TransitivePathStrategy::BinSearch => {
                let sorted = QueryExecutionTree::create_sorted_tree(self.subtree.clone(), &[start_col, target_col]);
                let result = sorted.collect_table()?;
                let pairs = result
                    .table
                    .rows()
                    .map(|row| (row[start_col], row[target_col]))
                    .filter(|(from, to)| !from.is_undefined() && !to.is_undefined())
                    .collect();
                Ok((Arc::new(BinSearchEdges::from_sorted(pairs)), result.local_vocab))
            }
        }
    }
}

impl Operation for TransitivePath {
    fn context(&self) -> &QueryExecutionContext {
        &self.context
    }

    fn descriptor(&self) -> String {
        let mut descriptor = "TransitivePath ".to_string();
        if self.min_dist > 1 || self.max_dist < usize::MAX {
            descriptor.push_str(&format!("[{}, {}] ", self.min_dist, self.max_dist));
        }
        let predicate = match self.subtree.downcast::<IndexScan>() {
            Some(scan) => scan.predicate().to_string(),
            None => "<???>".to_string(),
        };
        format!("{}{} {} {}", descriptor, self.lhs.value, predicate, self.rhs.value)
    }

    fn cache_key(&self) -> String {
        let mut key = "TRANSITIVE PATH ".to_string();
        // The same variable on both sides changes the result, but variable
        // names are not part of the cache keys of the children.
        if self.lhs.is_variable() && self.lhs.value == self.rhs.value {
            key.push_str("symmetric ");
        }
        key.push_str(&format!("minDist {} maxDist {}\n", self.min_dist, self.max_dist));
        key.push_str("Left side:\n");
        key.push_str(&self.lhs.cache_key());
        key.push_str("Right side:\n");
        key.push_str(&self.rhs.cache_key());
        key.push_str(&format!("Subtree:\n{}\n", self.subtree.cache_key()));
        key
    }

    fn result_width(&self) -> usize {
        self.result_width
    }

    fn result_sorted_on(&self) -> Vec<usize> {
        if self.lhs.is_sorted_on_input_col() {
            vec![0]
        } else if self.rhs.is_sorted_on_input_col() {
            vec![1]
        } else {
            Vec::new()
        }
    }

    fn variable_to_column_map(&self) -> VariableToColumnMap {
        self.variable_columns.clone()
    }

    fn children(&self) -> Vec<&QueryExecutionTree> {
        let mut children = Vec::new();
        for side in [&self.lhs, &self.rhs] {
            if let Some((tree, _)) = &side.tree_and_col {
                children.push(tree);
            }
        }
        children.push(&self.subtree);
        children
    }

    fn size_estimate_before_limit(&self) -> u64 {
        if !self.lhs.is_variable() || !self.rhs.is_variable() {
            return FIXED_SIDE_SIZE_ESTIMATE;
        }
        for side in [&self.lhs, &self.rhs] {
            if let Some((tree, _)) = &side.tree_and_col {
                return tree.size_estimate();
            }
        }
        // Steers the planner away from computing the full hull whenever one
        // of the sides can be bound.
        self.subtree.size_estimate().saturating_mul(FULL_HULL_BLOWUP)
    }

    fn cost_estimate(&self) -> u64 {
        let mut cost = self.size_estimate_before_limit();
        for child in self.children() {
            cost = cost.saturating_add(child.cost_estimate());
        }
        if self.strategy == TransitivePathStrategy::BinSearch {
            let (start, _) = self.decide_direction();
            if !self.subtree.is_sorted_on(&[start.sub_col]) {
                cost = cost.saturating_add(sort_cost(self.subtree.size_estimate()));
            }
        }
        cost
    }

    fn known_empty_result(&self) -> bool {
        let (start, _) = self.decide_direction();
        let start_is_empty = start
            .tree_and_col
            .as_ref()
            .map_or(false, |(tree, _)| tree.known_empty_result());
        (self.subtree.known_empty_result() && self.min_dist > 0) || start_is_empty
    }

    fn column_originates_from_graph_or_undef(&self, variable: &Variable) -> bool {
        self.lhs.value.get_variable() == Some(variable) || self.rhs.value.get_variable() == Some(variable)
    }

    fn clone_operation(&self) -> Arc<dyn Operation> {
        let deep_side = |side: &TransitivePathSide| {
            let mut side = side.clone();
            side.tree_and_col = side.tree_and_col.map(|(tree, col)| (tree.deep_clone(), col));
            side
        };
        Arc::new(TransitivePath {
            subtree: self.subtree.deep_clone(),
            lhs: deep_side(&self.lhs),
            rhs: deep_side(&self.rhs),
            ..self.clone()
        })
    }

    fn compute_result(&self) -> Result<ChunkIterator> {
        let (start, target) = self.decide_direction();
        let index = self.context.index();
        let target_filter = if target.is_variable() {
            if target.value == start.value {
                TargetFilter::SameAsStart
            } else {
                TargetFilter::Any
            }
        } else {
            match index.id_for(&target.value) {
                Some(id) => TargetFilter::Fixed(id),
                None => return Ok(Box::new(std::iter::empty())),
            }
        };
        let (edges, edge_vocab) = self.build_edges(start.sub_col, target.sub_col)?;
        let (min_dist, max_dist) = (self.min_dist, self.max_dist);
        let context = self.context.clone();
        let (start_col, target_col) = (start.output_col, target.output_col);

        match &start.tree_and_col {
            Some((tree, input_col)) => {
                let input_col = *input_col;
                let hull = tree.compute_result()?.map(move |chunk| {
                    let chunk = chunk?;
                    let nodes = (0..chunk.table.num_rows()).filter_map(|row| {
                        let node = chunk.table.get(row, input_col);
                        (!node.is_undefined()).then_some((node, Some(row)))
                    });
                    let nodes = hull_for_nodes(edges.as_ref(), nodes, min_dist, max_dist, target_filter, &context)?;
                    Ok(HullChunk {
                        nodes,
                        input: Some(chunk),
                    })
                });
                Ok(fill_table_with_hull(
                    hull,
                    start_col,
                    target_col,
                    false,
                    Some(input_col),
                    self.result_width,
                    edge_vocab,
                ))
            }
            None => {
                let start_nodes: Vec<Id> = if start.is_variable() {
                    edges.start_nodes()
                } else {
                    match index.id_for(&start.value) {
                        Some(id) => vec![id],
                        None => return Ok(Box::new(std::iter::empty())),
                    }
                };
                let hull = std::iter::once_with(move || {
                    let nodes = start_nodes.into_iter().map(|node| (node, None));
                    let nodes = hull_for_nodes(edges.as_ref(), nodes, min_dist, max_dist, target_filter, &context)?;
                    Ok(HullChunk { nodes, input: None })
                });
                Ok(fill_table_with_hull(
                    hull,
                    start_col,
                    target_col,
                    true,
                    None,
                    self.result_width,
                    edge_vocab,
                ))
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The candidate with the lowest cost. Candidates that failed to build are
/// skipped; the first error is returned only if no candidate succeeded.
fn cheapest_candidate(candidates: Vec<Result<TransitivePath>>) -> Result<TransitivePath> {
    let mut first_error = None;
    let mut best: Option<TransitivePath> = None;
    for candidate in candidates {
        match candidate {
            Ok(path) => {
                if best.as_ref().map_or(true, |b| path.cost_estimate() < b.cost_estimate()) {
                    best = Some(path);
                }
            }
            Err(e) => {
                debug!("discarding transitive path candidate: {}", e);
                first_error.get_or_insert(e);
            }
        }
    }
    match (best, first_error) {
        (Some(path), _) => Ok(path),
        (None, Some(e)) => Err(e),
        (None, None) => Err(EngineError::PreconditionViolation("no transitive path candidate".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::*;
    use super::*;
    use std::collections::BTreeSet;

    fn predicate_scan(context: &QueryExecutionContext, permutation: Permutation) -> QueryExecutionTree {
        let scan = IndexScan::new(
            context.clone(),
            permutation,
            SparqlTripleSimple::new(
                TripleComponent::variable("?_start"),
                TripleComponent::iri("p"),
                TripleComponent::variable("?_target"),
            ),
        )
        .unwrap();
        QueryExecutionTree::new(scan)
    }

    fn path(
        context: &QueryExecutionContext,
        left: TripleComponent,
        right: TripleComponent,
        min_dist: usize,
        max_dist: usize,
        strategy: TransitivePathStrategy,
    ) -> TransitivePath {
        TransitivePath::with_strategy(
            context.clone(),
            predicate_scan(context, Permutation::PSO),
            TransitivePathSide::new(left, 0),
            TransitivePathSide::new(right, 1),
            min_dist,
            max_dist,
            strategy,
        )
        .unwrap()
    }

    fn result_pairs(path: TransitivePath) -> BTreeSet<(Id, Id)> {
        let table = QueryExecutionTree::new(path).collect_table().unwrap().table;
        table.rows().map(|row| (row[0], row[1])).collect()
    }

    const STRATEGIES: [TransitivePathStrategy; 2] = [TransitivePathStrategy::HashMap, TransitivePathStrategy::BinSearch];

    #[test]
    fn test_full_hull() {
        let context = small_context();
        let (a, b, c, d) = (id(&context, "a"), id(&context, "b"), id(&context, "c"), id(&context, "d"));
        for strategy in STRATEGIES {
            let path = path(&context, TripleComponent::variable("?x"), TripleComponent::variable("?y"), 1, usize::MAX, strategy);
            assert_eq!(path.result_width(), 2);
            assert!(!path.is_bound_or_id());
            let expected: BTreeSet<(Id, Id)> =
                [(a, b), (a, c), (a, d), (b, c), (b, d), (c, d)].into_iter().collect();
            assert_eq!(result_pairs(path), expected);
        }
    }

    #[test]
    fn test_fixed_sides() {
        let context = small_context();
        let (a, c, d) = (id(&context, "a"), id(&context, "c"), id(&context, "d"));
        for strategy in STRATEGIES {
            let from_a = path(&context, TripleComponent::iri("a"), TripleComponent::variable("?y"), 2, 2, strategy);
            assert_eq!(result_pairs(from_a), [(a, c)].into_iter().collect());

            let to_d = path(&context, TripleComponent::variable("?x"), TripleComponent::iri("d"), 1, usize::MAX, strategy);
            assert_eq!(to_d.decide_direction().0.output_col, 1);
            let sources: BTreeSet<Id> = result_pairs(to_d).into_iter().map(|(x, _)| x).collect();
            assert_eq!(sources.len(), 3);
            assert!(sources.contains(&c));

            let both = path(&context, TripleComponent::iri("a"), TripleComponent::iri("d"), 0, usize::MAX, strategy);
            assert_eq!(both.min_dist(), 1);
            assert_eq!(result_pairs(both), [(a, d)].into_iter().collect());
        }
    }

    #[test]
    fn test_empty_path_with_free_sides() {
        let context = small_context();
        for strategy in STRATEGIES {
            let reflexive = path(&context, TripleComponent::variable("?x"), TripleComponent::variable("?y"), 0, 0, strategy);
            assert!(reflexive.left().tree_and_col.is_some());
            assert!(!reflexive.is_bound_or_id());
            let table = QueryExecutionTree::new(reflexive).collect_table().unwrap().table;
            // a, b, c, d, 1, 2 and the predicates are not subjects or objects
            let expected: BTreeSet<Id> = ["a", "b", "c", "d"]
                .iter()
                .map(|n| id(&context, n))
                .chain([Id::make_from_int(1), Id::make_from_int(2)])
                .collect();
            assert_eq!(table.num_rows(), expected.len());
            let nodes: BTreeSet<Id> = table.rows().map(|row| {
                assert_eq!(row[0], row[1]);
                row[0]
            }).collect();
            assert_eq!(nodes, expected);
        }
    }

    #[test]
    fn test_bind_left_side() {
        let context = small_context();
        let input = Values::new(
            context.clone(),
            vec![var("?x"), var("?label")],
            vec![
                vec![TripleComponent::iri("b"), TripleComponent::literal("bee")],
                vec![TripleComponent::iri("c"), TripleComponent::literal("sea")],
            ],
        )
        .unwrap();
        let unbound = path(&context, TripleComponent::variable("?x"), TripleComponent::variable("?y"), 1, usize::MAX, TransitivePathStrategy::HashMap);
        let bound = unbound.bind_left_side(QueryExecutionTree::new(input), 0).unwrap();
        assert!(bound.is_bound_or_id());
        assert_eq!(bound.result_width(), 3);
        assert_eq!(bound.variable_to_column_map()[&var("?label")].column_index, 2);
        assert_eq!(bound.result_sorted_on(), vec![0]);
        let result = QueryExecutionTree::new(bound).collect_table().unwrap();
        assert_eq!(result.table.num_rows(), 3);
        assert!(result.table.rows().all(|row| row[2].datatype() == shared::id::Datatype::LocalVocabIndex));
    }

    #[test]
    fn test_bind_right_side_with_empty_path_checks_the_graph() {
        let context = small_context();
        let input = Values::new(
            context.clone(),
            vec![var("?y")],
            vec![vec![TripleComponent::iri("b")], vec![TripleComponent::iri("unknown")]],
        )
        .unwrap();
        let unbound = path(&context, TripleComponent::variable("?x"), TripleComponent::variable("?y"), 0, usize::MAX, TransitivePathStrategy::BinSearch);
        let bound = unbound.bind_right_side(QueryExecutionTree::new(input), 0).unwrap();
        assert!(bound.left().tree_and_col.is_none());
        let (a, b) = (id(&context, "a"), id(&context, "b"));
        let pairs: BTreeSet<(Id, Id)> = result_pairs(bound);
        assert_eq!(pairs, [(a, b), (b, b)].into_iter().collect());
    }

    #[test]
    fn test_cache_key_and_estimates() {
        let context = small_context();
        let symmetric = path(&context, TripleComponent::variable("?x"), TripleComponent::variable("?x"), 1, usize::MAX, TransitivePathStrategy::HashMap);
        assert!(symmetric.cache_key().starts_with("TRANSITIVE PATH symmetric minDist 1"));
        assert!(result_pairs(symmetric).is_empty());

        let free = path(&context, TripleComponent::variable("?x"), TripleComponent::variable("?y"), 1, usize::MAX, TransitivePathStrategy::HashMap);
        assert_eq!(free.size_estimate_before_limit(), 3 * FULL_HULL_BLOWUP);
        assert!(free.cost_estimate() > free.size_estimate_before_limit());
        assert_eq!(free.descriptor(), "TransitivePath ?x <p> ?y");

        let fixed = path(&context, TripleComponent::iri("a"), TripleComponent::variable("?y"), 1, 3, TransitivePathStrategy::HashMap);
        assert_eq!(fixed.size_estimate_before_limit(), FIXED_SIDE_SIZE_ESTIMATE);
        assert_eq!(fixed.descriptor(), "TransitivePath [1, 3] <a> <p> ?y");
    }

    #[test]
    fn test_failing_candidate_is_skipped() {
        let context = small_context();
        let broken = || {
            TransitivePath::with_strategy(
                context.clone(),
                predicate_scan(&context, Permutation::POS),
                TransitivePathSide::new(TripleComponent::variable("?x"), 1),
                TransitivePathSide::new(TripleComponent::variable("?y"), 1),
                1,
                usize::MAX,
                TransitivePathStrategy::BinSearch,
            )
        };
        assert!(broken().is_err());

        let working = Ok(path(&context, TripleComponent::variable("?x"), TripleComponent::variable("?y"), 1, usize::MAX, TransitivePathStrategy::BinSearch));
        let chosen = cheapest_candidate(vec![working, broken()]).unwrap();
        assert_eq!(chosen.result_width(), 2);
        assert_eq!(result_pairs(chosen).len(), 6);

        let all_failed = cheapest_candidate(vec![broken(), broken()]);
        assert!(matches!(all_failed, Err(EngineError::PreconditionViolation(_))));
    }
}

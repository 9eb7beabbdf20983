/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Edge storage and hull computation shared by both transitive path strategies.

use crate::engine::{ChunkIterator, QueryExecutionContext, ResultChunk};
use crate::error::Result;
use crate::id_table::IdTable;
use crate::local_vocab::LocalVocab;
use rustc_hash::{FxHashMap, FxHashSet};
use shared::id::Id;

/// The successors of every node, as read from the edge subtree.
pub trait TransitiveEdges: Send + Sync {
    fn successors(&self, node: Id) -> &[Id];

    /// Every node with at least one successor, in ascending order.
    fn start_nodes(&self) -> Vec<Id>;
}

#[derive(Debug, Default)]
pub struct HashMapEdges {
    map: FxHashMap<Id, Vec<Id>>,
}

impl HashMapEdges {
    pub fn insert(&mut self, from: Id, to: Id) {
        self.map.entry(from).or_default().push(to);
    }
}

impl TransitiveEdges for HashMapEdges {
    fn successors(&self, node: Id) -> &[Id] {
        self.map.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    fn start_nodes(&self) -> Vec<Id> {
        let mut nodes: Vec<Id> = self.map.keys().copied().collect();
        nodes.sort();
        nodes
    }
}

/// Edges as two parallel columns sorted by start node. Successors are found
/// by binary search.
#[derive(Debug, Default)]
pub struct BinSearchEdges {
    starts: Vec<Id>,
    targets: Vec<Id>,
}

impl BinSearchEdges {
    /// `edges` must be sorted by start node.
    pub fn from_sorted(edges: Vec<(Id, Id)>) -> Self {
        let (starts, targets) = edges.into_iter().unzip();
        BinSearchEdges { starts, targets }
    }
}

impl TransitiveEdges for BinSearchEdges {
    fn successors(&self, node: Id) -> &[Id] {
        let begin = self.starts.partition_point(|start| *start < node);
        let end = begin + self.starts[begin..].partition_point(|start| *start <= node);
        &self.targets[begin..end]
    }

    fn start_nodes(&self) -> Vec<Id> {
        let mut nodes = self.starts.clone();
        nodes.dedup();
        nodes
    }
}

/// The targets that can be reached from `start` with a path of length in
/// `[min_dist, max_dist]`, each exactly once. With `target` only that node is
/// reported.
pub fn find_connected_nodes(
    edges: &dyn TransitiveEdges,
    start: Id,
    min_dist: usize,
    max_dist: usize,
    target: Option<Id>,
) -> Vec<Id> {
    let mut connected = Vec::new();
    // Nodes reached at a depth of at least `min_dist`. Reaching them again
    // later can not find anything new.
    let mut expanded = FxHashSet::default();
    let mut frontier = vec![start];
    let mut depth = 0usize;
    while !frontier.is_empty() && depth <= max_dist {
        let mut next = Vec::new();
        let mut next_seen = FxHashSet::default();
        for node in frontier {
            if depth >= min_dist {
                if !expanded.insert(node) {
                    continue;
                }
                if target.map_or(true, |t| t == node) {
                    connected.push(node);
                }
            }
            if depth < max_dist {
                for successor in edges.successors(node) {
                    if next_seen.insert(*successor) {
                        next.push(*successor);
                    }
                }
            }
        }
        frontier = next;
        depth += 1;
    }
    connected
}

/// A start node and the nodes linked to it.
#[derive(Debug, Clone)]
pub struct NodeWithTargets {
    pub node: Id,
    pub targets: Vec<Id>,
    /// The row of the input chunk the node was taken from.
    pub input_row: Option<usize>,
}

/// The hull for the start nodes of one input chunk, or for all start nodes if
/// the start side has no input tree.
#[derive(Debug, Default)]
pub struct HullChunk {
    pub nodes: Vec<NodeWithTargets>,
    pub input: Option<ResultChunk>,
}

/// Computes the hull for the given start nodes. Nodes without targets are
/// left out.
pub fn hull_for_nodes(
    edges: &dyn TransitiveEdges,
    nodes: impl IntoIterator<Item = (Id, Option<usize>)>,
    min_dist: usize,
    max_dist: usize,
    target: TargetFilter,
    context: &QueryExecutionContext,
) -> Result<Vec<NodeWithTargets>> {
    let mut result = Vec::new();
    for (node, input_row) in nodes {
        context.check_cancellation()?;
        let target = match target {
            TargetFilter::Any => None,
            TargetFilter::Fixed(id) => Some(id),
            TargetFilter::SameAsStart => Some(node),
        };
        let targets = find_connected_nodes(edges, node, min_dist, max_dist, target);
        if !targets.is_empty() {
            result.push(NodeWithTargets {
                node,
                targets,
                input_row,
            });
        }
    }
    Ok(result)
}

/// Restriction of the target side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFilter {
    Any,
    Fixed(Id),
    /// The same variable is used on both sides.
    SameAsStart,
}

/// Turns the hull into result chunks. Each row holds the start node in
/// `start_col`, the linked node in `target_col` and the columns of the input
/// row except `input_col` from column 2 on.
///
/// With `yield_once` a single chunk is produced, otherwise one chunk per hull
/// chunk. Empty chunks are never produced.
pub fn fill_table_with_hull(
    hull: impl Iterator<Item = Result<HullChunk>> + Send + 'static,
    start_col: usize,
    target_col: usize,
    yield_once: bool,
    input_col: Option<usize>,
    output_width: usize,
    edge_vocab: LocalVocab,
) -> ChunkIterator {
    let to_chunk = move |hull_chunk: HullChunk, table: &mut IdTable, vocab: &mut LocalVocab| {
        let mut row = vec![Id::make_undefined(); output_width];
        for entry in &hull_chunk.nodes {
            for target in &entry.targets {
                row[start_col] = entry.node;
                row[target_col] = *target;
                if let (Some(input), Some(input_row), Some(input_col)) = (&hull_chunk.input, entry.input_row, input_col) {
                    let source = input.table.row(input_row);
                    let carried = source
                        .iter()
                        .enumerate()
                        .filter(|(column, _)| *column != input_col)
                        .map(|(_, id)| *id);
                    for (out, id) in row[2..].iter_mut().zip(carried) {
                        *out = id;
                    }
                }
                table.push_row(&row);
            }
        }
        if let Some(input) = &hull_chunk.input {
            vocab.merge(&input.local_vocab);
        }
    };

    if yield_once {
        let mut pending = Some((hull, edge_vocab));
        let once = std::iter::from_fn(move || {
            let (hull, mut vocab) = pending.take()?;
            let mut table = IdTable::new(output_width);
            for hull_chunk in hull {
                match hull_chunk {
                    Ok(hull_chunk) => to_chunk(hull_chunk, &mut table, &mut vocab),
                    Err(err) => return Some(Err(err)),
                }
            }
            Some(Ok(ResultChunk::new(table, vocab)))
        });
        return Box::new(once.filter(|chunk| chunk.as_ref().map_or(true, |c| !c.table.is_empty())));
    }

    Box::new(hull.filter_map(move |hull_chunk| {
        let hull_chunk = match hull_chunk {
            Ok(hull_chunk) => hull_chunk,
            Err(err) => return Some(Err(err)),
        };
        let mut table = IdTable::new(output_width);
        let mut vocab = edge_vocab.clone();
        to_chunk(hull_chunk, &mut table, &mut vocab);
        (!table.is_empty()).then(|| Ok(ResultChunk::new(table, vocab)))
    }))
}

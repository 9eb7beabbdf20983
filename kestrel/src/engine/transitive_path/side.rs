/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::engine::QueryExecutionTree;
use shared::terms::TripleComponent;
use std::fmt::Write;

/// One end of a transitive path: a variable or a fixed value, the column of
/// the edge subtree it corresponds to and, once bound, the tree that supplies
/// its values.
#[derive(Debug, Clone)]
pub struct TransitivePathSide {
    pub value: TripleComponent,
    /// Column of the edge subtree.
    pub sub_col: usize,
    /// The input tree and the column of it that holds the values of this side.
    pub tree_and_col: Option<(QueryExecutionTree, usize)>,
    pub output_col: usize,
}

impl TransitivePathSide {
    pub fn new(value: TripleComponent, sub_col: usize) -> Self {
        TransitivePathSide {
            value,
            sub_col,
            tree_and_col: None,
            output_col: 0,
        }
    }

    pub fn is_variable(&self) -> bool {
        self.value.is_variable()
    }

    pub fn is_bound_variable(&self) -> bool {
        self.is_variable() && self.tree_and_col.is_some()
    }

    pub fn is_unbound_variable(&self) -> bool {
        self.is_variable() && self.tree_and_col.is_none()
    }

    pub fn is_sorted_on_input_col(&self) -> bool {
        self.tree_and_col
            .as_ref()
            .map_or(false, |(tree, col)| tree.result_sorted_on().first() == Some(col))
    }

    pub fn cache_key(&self) -> String {
        let mut key = String::new();
        if !self.is_variable() {
            let _ = write!(key, "Id: {}, ", self.value);
        }
        let _ = write!(key, "subColumn: {} to {}", self.sub_col, self.output_col);
        if let Some((tree, col)) = &self.tree_and_col {
            let _ = write!(key, ", Subtree:\n{}\nwith join column {}", tree.cache_key(), col);
        }
        key.push('\n');
        key
    }
}

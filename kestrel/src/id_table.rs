/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use shared::id::Id;
use std::cmp::Ordering;

/// A table of Ids with a fixed number of columns, stored row by row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdTable {
    num_columns: usize,
    num_rows: usize,
    data: Vec<Id>,
}

impl IdTable {
    pub fn new(num_columns: usize) -> Self {
        IdTable {
            num_columns,
            num_rows: 0,
            data: Vec::new(),
        }
    }

    pub fn from_rows(num_columns: usize, rows: &[Vec<Id>]) -> Self {
        let mut table = IdTable::new(num_columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn push_row(&mut self, row: &[Id]) {
        debug_assert_eq!(row.len(), self.num_columns);
        self.data.extend_from_slice(row);
        self.num_rows += 1;
    }

    pub fn row(&self, index: usize) -> &[Id] {
        &self.data[index * self.num_columns..(index + 1) * self.num_columns]
    }

    pub fn get(&self, row: usize, column: usize) -> Id {
        self.data[row * self.num_columns + column]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Id]> + '_ {
        (0..self.num_rows).map(move |r| self.row(r))
    }

    pub fn column(&self, column: usize) -> impl Iterator<Item = Id> + '_ {
        (0..self.num_rows).map(move |r| self.get(r, column))
    }

    pub fn append(&mut self, other: &IdTable) {
        debug_assert_eq!(other.num_columns, self.num_columns);
        self.data.extend_from_slice(&other.data);
        self.num_rows += other.num_rows;
    }

    /// Stable lexicographic sort on the given columns.
    pub fn sort_by_columns(&mut self, columns: &[usize]) {
        let mut order: Vec<usize> = (0..self.num_rows).collect();
        order.sort_by(|&a, &b| self.compare_rows(a, b, columns));
        let mut sorted = Vec::with_capacity(self.data.len());
        for index in order {
            sorted.extend_from_slice(self.row(index));
        }
        self.data = sorted;
    }

    pub fn is_sorted_by_columns(&self, columns: &[usize]) -> bool {
        (1..self.num_rows).all(|r| self.compare_rows(r - 1, r, columns) != Ordering::Greater)
    }

    fn compare_rows(&self, a: usize, b: usize, columns: &[usize]) -> Ordering {
        columns
            .iter()
            .map(|&c| self.get(a, c).cmp(&self.get(b, c)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }

    /// Removes rows that are equal to their predecessor on `columns`.
    pub fn dedup_adjacent(&mut self, columns: &[usize]) {
        let mut kept = IdTable::new(self.num_columns);
        for r in 0..self.num_rows {
            if r == 0 || self.compare_rows(r - 1, r, columns) != Ordering::Equal {
                kept.push_row(self.row(r));
            }
        }
        *self = kept;
    }

    /// A table containing the given columns in the given order.
    pub fn select_columns(&self, columns: &[usize]) -> IdTable {
        let mut result = IdTable::new(columns.len());
        let mut row = Vec::with_capacity(columns.len());
        for r in 0..self.num_rows {
            row.clear();
            row.extend(columns.iter().map(|&c| self.get(r, c)));
            result.push_row(&row);
        }
        result
    }

    pub fn to_rows(&self) -> Vec<Vec<Id>> {
        self.rows().map(|r| r.to_vec()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_table(rows: &[[i64; 2]]) -> IdTable {
        let rows: Vec<Vec<Id>> = rows
            .iter()
            .map(|r| r.iter().map(|v| Id::make_from_int(*v)).collect())
            .collect();
        IdTable::from_rows(2, &rows)
    }

    #[test]
    fn test_sort_and_dedup() {
        let mut table = int_table(&[[3, 1], [1, 2], [3, 0], [1, 2]]);
        table.sort_by_columns(&[0]);
        assert_eq!(table, int_table(&[[1, 2], [1, 2], [3, 1], [3, 0]]));
        assert!(table.is_sorted_by_columns(&[0]));
        assert!(!table.is_sorted_by_columns(&[0, 1]));
        table.dedup_adjacent(&[0, 1]);
        assert_eq!(table, int_table(&[[1, 2], [3, 1], [3, 0]]));
    }

    #[test]
    fn test_zero_columns() {
        let mut table = IdTable::new(0);
        table.push_row(&[]);
        table.push_row(&[]);
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.rows().count(), 2);
    }

    #[test]
    fn test_select_columns() {
        let table = int_table(&[[1, 2], [3, 4]]);
        let swapped = table.select_columns(&[1, 0]);
        assert_eq!(swapped, int_table(&[[2, 1], [4, 3]]));
    }
}

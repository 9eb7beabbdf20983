/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */
use crate::id::Id;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A triple of Ids in subject, predicate, object order.
#[derive(PartialEq, Debug, Clone, Copy, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Id,
    pub predicate: Id,
    pub object: Id,
}

impl Triple {
    pub fn new(subject: Id, predicate: Id, object: Id) -> Self {
        Triple { subject, predicate, object }
    }

    pub fn to_array(&self) -> [Id; 3] {
        [self.subject, self.predicate, self.object]
    }
}

/// Three Ids in the column order of some permutation.
#[derive(PartialEq, Debug, Clone, Copy, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermutedTriple {
    pub col0: Id,
    pub col1: Id,
    pub col2: Id,
}

impl PermutedTriple {
    pub fn new(col0: Id, col1: Id, col2: Id) -> Self {
        PermutedTriple { col0, col1, col2 }
    }

    pub fn get(&self, column: usize) -> Id {
        match column {
            0 => self.col0,
            1 => self.col1,
            _ => self.col2,
        }
    }

    pub fn to_array(&self) -> [Id; 3] {
        [self.col0, self.col1, self.col2]
    }

    /// Keeps the columns before `column` and replaces the rest by `Id::min()`.
    pub fn masked_prefix(&self, column: usize) -> PermutedTriple {
        let keep = |c: usize| if c < column { self.get(c) } else { Id::min() };
        PermutedTriple::new(keep(0), keep(1), keep(2))
    }
}

impl fmt::Display for PermutedTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.col0, self.col1, self.col2)
    }
}

/// One of the six orderings of (subject, predicate, object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permutation {
    PSO,
    POS,
    SPO,
    SOP,
    OPS,
    OSP,
}

impl Permutation {
    pub const ALL: [Permutation; 6] = [
        Permutation::PSO,
        Permutation::POS,
        Permutation::SPO,
        Permutation::SOP,
        Permutation::OPS,
        Permutation::OSP,
    ];

    /// For each column of the permutation, the triple position (0 = subject,
    /// 1 = predicate, 2 = object) stored there.
    pub fn key_order(self) -> [usize; 3] {
        match self {
            Permutation::PSO => [1, 0, 2],
            Permutation::POS => [1, 2, 0],
            Permutation::SPO => [0, 1, 2],
            Permutation::SOP => [0, 2, 1],
            Permutation::OPS => [2, 1, 0],
            Permutation::OSP => [2, 0, 1],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Permutation::PSO => "PSO",
            Permutation::POS => "POS",
            Permutation::SPO => "SPO",
            Permutation::SOP => "SOP",
            Permutation::OPS => "OPS",
            Permutation::OSP => "OSP",
        }
    }

    pub fn permute(self, triple: &Triple) -> PermutedTriple {
        let values = triple.to_array();
        let [a, b, c] = self.key_order();
        PermutedTriple::new(values[a], values[b], values[c])
    }

    pub fn permute_positions<T: Clone>(self, values: &[T; 3]) -> [T; 3] {
        let [a, b, c] = self.key_order();
        [values[a].clone(), values[b].clone(), values[c].clone()]
    }
}

impl fmt::Display for Permutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permute() {
        let triple = Triple::new(
            Id::make_from_int(1),
            Id::make_from_int(2),
            Id::make_from_int(3),
        );
        let pos = Permutation::POS.permute(&triple);
        assert_eq!(pos.to_array(), [triple.predicate, triple.object, triple.subject]);
        let osp = Permutation::OSP.permute(&triple);
        assert_eq!(osp.to_array(), [triple.object, triple.subject, triple.predicate]);
    }

    #[test]
    fn test_masked_prefix() {
        let triple = PermutedTriple::new(
            Id::make_from_int(1),
            Id::make_from_int(2),
            Id::make_from_int(3),
        );
        let masked = triple.masked_prefix(1);
        assert_eq!(masked.to_array(), [Id::make_from_int(1), Id::min(), Id::min()]);
        assert_eq!(triple.masked_prefix(3), triple);
    }
}

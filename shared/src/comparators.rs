/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Comparisons between `Id`s, including the range search over sorted slices
//! that the block prefilter is built on.

use crate::id::{Datatype, Id};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    LT,
    LE,
    EQ,
    NE,
    GE,
    GT,
}

impl Comparison {
    /// The comparison that holds exactly when `self` does not.
    pub fn complement(self) -> Comparison {
        match self {
            Comparison::LT => Comparison::GE,
            Comparison::LE => Comparison::GT,
            Comparison::EQ => Comparison::NE,
            Comparison::NE => Comparison::EQ,
            Comparison::GE => Comparison::LT,
            Comparison::GT => Comparison::LE,
        }
    }

    /// The comparison with swapped operands: `a < b` iff `b > a`.
    pub fn mirrored(self) -> Comparison {
        match self {
            Comparison::LT => Comparison::GT,
            Comparison::LE => Comparison::GE,
            Comparison::GE => Comparison::LE,
            Comparison::GT => Comparison::LT,
            other => other,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::LT => "<",
            Comparison::LE => "<=",
            Comparison::EQ => "==",
            Comparison::NE => "!=",
            Comparison::GE => ">=",
            Comparison::GT => ">",
        }
    }

    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Comparison::LT => ordering == Ordering::Less,
            Comparison::LE => ordering != Ordering::Greater,
            Comparison::EQ => ordering == Ordering::Equal,
            Comparison::NE => ordering != Ordering::Equal,
            Comparison::GE => ordering != Ordering::Less,
            Comparison::GT => ordering == Ordering::Greater,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Comparison::LT => "LT",
            Comparison::LE => "LE",
            Comparison::EQ => "EQ",
            Comparison::NE => "NE",
            Comparison::GE => "GE",
            Comparison::GT => "GT",
        };
        write!(f, "{}", name)
    }
}

fn are_comparable(a: Datatype, b: Datatype) -> bool {
    (a.is_numeric() && b.is_numeric()) || a == b
}

/// Orders two Ids by value. Returns `None` for incomparable datatypes and for
/// undefined values.
pub fn value_ordering(a: Id, b: Id) -> Option<Ordering> {
    let (ta, tb) = (a.datatype(), b.datatype());
    if ta == Datatype::Undefined || tb == Datatype::Undefined || !are_comparable(ta, tb) {
        return None;
    }
    if ta == tb {
        return Some(a.cmp(&b));
    }
    // Int against Double.
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

/// Evaluates `a <comparison> b`. `None` means the values are not comparable.
pub fn compare_ids(a: Id, b: Id, comparison: Comparison) -> Option<bool> {
    value_ordering(a, b).map(|ordering| comparison.holds(ordering))
}

/// Finds all positions `i` in the sorted slice `ids` with `ids[i] <comparison> reference`.
///
/// The result is a sorted list of non-overlapping half-open ranges in which
/// adjacent ranges are merged. With `remove_empty == false`, empty ranges are
/// kept; they mark where `reference` would be inserted.
pub fn get_ranges_for_id(
    ids: &[Id],
    reference: Id,
    comparison: Comparison,
    remove_empty: bool,
) -> Vec<Range<usize>> {
    let reference_type = reference.datatype();
    if reference_type == Datatype::Undefined {
        return Vec::new();
    }

    let mut ranges = Vec::new();
    let mut begin = 0;
    while begin < ids.len() {
        let datatype = ids[begin].datatype();
        let end = begin + ids[begin..].partition_point(|id| id.datatype() == datatype);
        if are_comparable(datatype, reference_type) {
            let section = &ids[begin..end];
            let lower = begin
                + section.partition_point(|id| {
                    value_ordering(*id, reference) == Some(Ordering::Less)
                });
            let upper = begin
                + section.partition_point(|id| {
                    value_ordering(*id, reference) != Some(Ordering::Greater)
                });
            match comparison {
                Comparison::LT => ranges.push(begin..lower),
                Comparison::LE => ranges.push(begin..upper),
                Comparison::EQ => ranges.push(lower..upper),
                Comparison::NE => {
                    ranges.push(begin..lower);
                    ranges.push(upper..end);
                }
                Comparison::GE => ranges.push(lower..end),
                Comparison::GT => ranges.push(upper..end),
            }
        }
        begin = end;
    }
    simplify_ranges(ranges, remove_empty)
}

fn simplify_ranges(mut ranges: Vec<Range<usize>>, remove_empty: bool) -> Vec<Range<usize>> {
    if remove_empty {
        ranges.retain(|range| !range.is_empty());
    }
    ranges.sort_by_key(|range| (range.start, range.end));
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if last.end == range.start => last.end = range.end,
            _ => merged.push(range),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<Id> {
        values.iter().map(|v| Id::make_from_int(*v)).collect()
    }

    #[test]
    fn test_ranges_within_single_datatype() {
        let ids = ints(&[1, 3, 3, 5, 8]);
        let three = Id::make_from_int(3);
        assert_eq!(get_ranges_for_id(&ids, three, Comparison::LT, true), vec![0..1]);
        assert_eq!(get_ranges_for_id(&ids, three, Comparison::LE, true), vec![0..3]);
        assert_eq!(get_ranges_for_id(&ids, three, Comparison::EQ, true), vec![1..3]);
        assert_eq!(get_ranges_for_id(&ids, three, Comparison::NE, true), vec![0..1, 3..5]);
        assert_eq!(get_ranges_for_id(&ids, three, Comparison::GE, true), vec![1..5]);
        assert_eq!(get_ranges_for_id(&ids, three, Comparison::GT, true), vec![3..5]);
    }

    #[test]
    fn test_empty_ranges_are_kept_on_request() {
        let ids = ints(&[1, 3, 5]);
        let two = Id::make_from_int(2);
        assert_eq!(get_ranges_for_id(&ids, two, Comparison::EQ, false), vec![1..1]);
        assert!(get_ranges_for_id(&ids, two, Comparison::EQ, true).is_empty());
    }

    #[test]
    fn test_ints_and_doubles_are_compared_numerically() {
        let ids = vec![
            Id::make_from_int(1),
            Id::make_from_int(4),
            Id::make_from_double(0.5),
            Id::make_from_double(2.5),
            Id::make_from_vocab_index(0),
        ];
        let ranges = get_ranges_for_id(&ids, Id::make_from_double(2.0), Comparison::LT, true);
        assert_eq!(ranges, vec![0..1, 2..3]);
        let ranges = get_ranges_for_id(&ids, Id::make_from_int(2), Comparison::GE, true);
        assert_eq!(ranges, vec![1..2, 3..4]);
    }

    #[test]
    fn test_incomparable_and_undefined_reference() {
        let ids = vec![Id::make_from_int(1), Id::make_from_vocab_index(4)];
        assert!(get_ranges_for_id(&ids, Id::make_undefined(), Comparison::NE, true).is_empty());
        assert_eq!(
            get_ranges_for_id(&ids, Id::make_from_vocab_index(2), Comparison::GT, true),
            vec![1..2]
        );
        assert_eq!(compare_ids(ids[0], ids[1], Comparison::LT), None);
    }

    #[test]
    fn test_complement_inverts() {
        for comparison in [
            Comparison::LT,
            Comparison::LE,
            Comparison::EQ,
            Comparison::NE,
            Comparison::GE,
            Comparison::GT,
        ] {
            assert_eq!(comparison.complement().complement(), comparison);
            for ordering in [Ordering::Less, Ordering::Equal, Ordering::Greater] {
                assert_ne!(comparison.holds(ordering), comparison.complement().holds(ordering));
            }
        }
    }
}

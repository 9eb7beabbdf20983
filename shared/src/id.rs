/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::geo_point::GeoPoint;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

const NUM_DATATYPE_BITS: u32 = 4;
const NUM_PAYLOAD_BITS: u32 = 64 - NUM_DATATYPE_BITS;
const PAYLOAD_MASK: u64 = (1u64 << NUM_PAYLOAD_BITS) - 1;

/// Largest value that fits into the payload of an index-like Id.
pub const MAX_INDEX: u64 = PAYLOAD_MASK;

/// Datatype tag stored in the upper four bits of an `Id`.
///
/// The declaration order is the order of the datatype sections in every sorted
/// permutation, so it must not be changed without rebuilding indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Datatype {
    Undefined = 0,
    Bool = 1,
    Int = 2,
    Double = 3,
    VocabIndex = 4,
    LocalVocabIndex = 5,
    BlankNodeIndex = 6,
    GeoPoint = 7,
}

impl Datatype {
    fn from_bits(bits: u64) -> Datatype {
        match bits {
            1 => Datatype::Bool,
            2 => Datatype::Int,
            3 => Datatype::Double,
            4 => Datatype::VocabIndex,
            5 => Datatype::LocalVocabIndex,
            6 => Datatype::BlankNodeIndex,
            7 => Datatype::GeoPoint,
            _ => Datatype::Undefined,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Datatype::Int | Datatype::Double)
    }

    pub fn name(self) -> &'static str {
        match self {
            Datatype::Undefined => "Undefined",
            Datatype::Bool => "Bool",
            Datatype::Int => "Int",
            Datatype::Double => "Double",
            Datatype::VocabIndex => "VocabIndex",
            Datatype::LocalVocabIndex => "LocalVocabIndex",
            Datatype::BlankNodeIndex => "BlankNodeIndex",
            Datatype::GeoPoint => "GeoPoint",
        }
    }
}

/// A 64-bit value identifier: 4 bits of datatype followed by 60 bits of payload.
///
/// Ints are stored as 60-bit two's complement, doubles lose their four lowest
/// mantissa bits. All other datatypes store an unsigned index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id(u64);

impl Id {
    fn make(datatype: Datatype, payload: u64) -> Id {
        Id(((datatype as u64) << NUM_PAYLOAD_BITS) | (payload & PAYLOAD_MASK))
    }

    /// The smallest possible Id. Compares below every other Id.
    pub const fn min() -> Id {
        Id(0)
    }

    pub fn make_undefined() -> Id {
        Id::min()
    }

    pub fn make_from_bool(value: bool) -> Id {
        Id::make(Datatype::Bool, value as u64)
    }

    /// Largest int that is stored without loss.
    pub const MAX_INT: i64 = (1 << (NUM_PAYLOAD_BITS - 1)) - 1;
    /// Smallest int that is stored without loss.
    pub const MIN_INT: i64 = -(1 << (NUM_PAYLOAD_BITS - 1));

    pub fn int_fits(value: i64) -> bool {
        (Id::MIN_INT..=Id::MAX_INT).contains(&value)
    }

    /// Keeps the lowest 60 bits of `value`. Callers check `int_fits` first.
    pub fn make_from_int(value: i64) -> Id {
        Id::make(Datatype::Int, value as u64)
    }

    pub fn make_from_double(value: f64) -> Id {
        Id::make(Datatype::Double, value.to_bits() >> NUM_DATATYPE_BITS)
    }

    pub fn make_from_vocab_index(index: u64) -> Id {
        Id::make(Datatype::VocabIndex, index)
    }

    pub fn make_from_local_vocab_index(index: u64) -> Id {
        Id::make(Datatype::LocalVocabIndex, index)
    }

    pub fn make_from_blank_node_index(index: u64) -> Id {
        Id::make(Datatype::BlankNodeIndex, index)
    }

    pub fn make_from_geo_point(point: GeoPoint) -> Id {
        Id::make(Datatype::GeoPoint, point.to_bit_representation())
    }

    /// Reinterprets raw bits, as read from disk.
    pub fn from_bits(bits: u64) -> Id {
        Id(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn datatype(self) -> Datatype {
        Datatype::from_bits(self.0 >> NUM_PAYLOAD_BITS)
    }

    fn payload(self) -> u64 {
        self.0 & PAYLOAD_MASK
    }

    pub fn is_undefined(self) -> bool {
        self.datatype() == Datatype::Undefined
    }

    pub fn get_bool(self) -> bool {
        self.payload() != 0
    }

    pub fn get_int(self) -> i64 {
        ((self.payload() << NUM_DATATYPE_BITS) as i64) >> NUM_DATATYPE_BITS
    }

    pub fn get_double(self) -> f64 {
        f64::from_bits(self.payload() << NUM_DATATYPE_BITS)
    }

    pub fn get_vocab_index(self) -> u64 {
        self.payload()
    }

    pub fn get_local_vocab_index(self) -> u64 {
        self.payload()
    }

    pub fn get_blank_node_index(self) -> u64 {
        self.payload()
    }

    pub fn get_geo_point(self) -> GeoPoint {
        GeoPoint::from_bit_representation(self.payload())
    }

    /// Numeric value of an `Int` or `Double` Id.
    pub fn as_f64(self) -> Option<f64> {
        match self.datatype() {
            Datatype::Int => Some(self.get_int() as f64),
            Datatype::Double => Some(self.get_double()),
            _ => None,
        }
    }
}

impl Ord for Id {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (self.datatype(), other.datatype());
        if a != b {
            return a.cmp(&b);
        }
        match a {
            Datatype::Int => self.get_int().cmp(&other.get_int()),
            Datatype::Double => self.get_double().total_cmp(&other.get_double()),
            _ => self.payload().cmp(&other.payload()),
        }
    }
}

impl PartialOrd for Id {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Default for Id {
    fn default() -> Self {
        Id::min()
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.datatype() {
            Datatype::Undefined => return write!(f, "U:UNDEF"),
            Datatype::Bool => return write!(f, "B:{}", self.get_bool()),
            Datatype::Int => return write!(f, "I:{}", self.get_int()),
            Datatype::Double => return write!(f, "D:{}", self.get_double()),
            Datatype::GeoPoint => return write!(f, "G:{}", self.get_geo_point()),
            Datatype::VocabIndex => "V",
            Datatype::LocalVocabIndex => "L",
            Datatype::BlankNodeIndex => "B",
        };
        write!(f, "{}:{}", prefix, self.payload())
    }
}

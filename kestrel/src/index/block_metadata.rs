/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use shared::id::Id;
use shared::triple::PermutedTriple;
use std::fmt;
use std::io::{self, Read, Write};

/// Size of one encoded record: block index, six Ids and the coverage flags.
pub const BLOCK_METADATA_RECORD_SIZE: usize = 8 + 6 * 8 + 1;

/// Bit set of the columns that are stored in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnCoverage(u8);

impl ColumnCoverage {
    pub const ALL: ColumnCoverage = ColumnCoverage(0b111);

    pub fn from_bits(bits: u8) -> Self {
        ColumnCoverage(bits & 0b111)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, column: usize) -> bool {
        column < 3 && self.0 & (1 << column) != 0
    }
}

/// Metadata of one block of a permutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub block_index: u64,
    pub first_triple: PermutedTriple,
    pub last_triple: PermutedTriple,
    pub columns: ColumnCoverage,
}

impl BlockMetadata {
    pub fn new(block_index: u64, first_triple: PermutedTriple, last_triple: PermutedTriple) -> Self {
        BlockMetadata {
            block_index,
            first_triple,
            last_triple,
            columns: ColumnCoverage::ALL,
        }
    }

    pub fn encode(&self) -> [u8; BLOCK_METADATA_RECORD_SIZE] {
        let mut record = [0u8; BLOCK_METADATA_RECORD_SIZE];
        record[..8].copy_from_slice(&self.block_index.to_le_bytes());
        let ids = self
            .first_triple
            .to_array()
            .into_iter()
            .chain(self.last_triple.to_array());
        for (i, id) in ids.enumerate() {
            let offset = 8 + i * 8;
            record[offset..offset + 8].copy_from_slice(&id.bits().to_le_bytes());
        }
        record[BLOCK_METADATA_RECORD_SIZE - 1] = self.columns.bits();
        record
    }

    pub fn decode(record: &[u8; BLOCK_METADATA_RECORD_SIZE]) -> Self {
        let read_u64 = |offset: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&record[offset..offset + 8]);
            u64::from_le_bytes(bytes)
        };
        let id = |i: usize| Id::from_bits(read_u64(8 + i * 8));
        BlockMetadata {
            block_index: read_u64(0),
            first_triple: PermutedTriple::new(id(0), id(1), id(2)),
            last_triple: PermutedTriple::new(id(3), id(4), id(5)),
            columns: ColumnCoverage::from_bits(record[BLOCK_METADATA_RECORD_SIZE - 1]),
        }
    }
}

impl fmt::Display for BlockMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#BlockMetadata\n(first) {}\n(last) {}\nblockIndex: {}",
            self.first_triple, self.last_triple, self.block_index
        )
    }
}

pub fn write_all<W: Write>(blocks: &[BlockMetadata], mut writer: W) -> io::Result<()> {
    for block in blocks {
        writer.write_all(&block.encode())?;
    }
    writer.flush()
}

/// Reads records until the end of `reader`. Records must be in ascending
/// block index order.
pub fn read_all<R: Read>(mut reader: R) -> Result<Vec<BlockMetadata>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    if bytes.len() % BLOCK_METADATA_RECORD_SIZE != 0 {
        return Err(EngineError::IncompatibleFormat(format!(
            "Block metadata of {} bytes is not a multiple of the record size {}",
            bytes.len(),
            BLOCK_METADATA_RECORD_SIZE
        )));
    }
    let mut blocks: Vec<BlockMetadata> = Vec::with_capacity(bytes.len() / BLOCK_METADATA_RECORD_SIZE);
    for chunk in bytes.chunks_exact(BLOCK_METADATA_RECORD_SIZE) {
        let mut record = [0u8; BLOCK_METADATA_RECORD_SIZE];
        record.copy_from_slice(chunk);
        let block = BlockMetadata::decode(&record);
        if let Some(previous) = blocks.last() {
            if previous.block_index >= block.block_index {
                return Err(EngineError::IncompatibleFormat(format!(
                    "Block metadata is not sorted: block {} follows block {}",
                    block.block_index, previous.block_index
                )));
            }
        }
        blocks.push(block);
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(index: u64, first: i64, last: i64) -> BlockMetadata {
        let p = Id::make_from_vocab_index(1);
        BlockMetadata::new(
            index,
            PermutedTriple::new(p, Id::make_from_int(first), Id::make_from_double(0.5)),
            PermutedTriple::new(p, Id::make_from_int(last), Id::make_from_vocab_index(9)),
        )
    }

    #[test]
    fn test_write_then_read() {
        let blocks = vec![block(0, -4, 2), block(1, 2, 17)];
        let mut buffer = Vec::new();
        write_all(&blocks, &mut buffer).unwrap();
        assert_eq!(buffer.len(), 2 * BLOCK_METADATA_RECORD_SIZE);
        assert_eq!(read_all(buffer.as_slice()).unwrap(), blocks);
    }

    #[test]
    fn test_read_rejects_unsorted_and_truncated() {
        let mut buffer = Vec::new();
        write_all(&[block(3, 0, 1), block(2, 1, 2)], &mut buffer).unwrap();
        assert!(matches!(
            read_all(buffer.as_slice()),
            Err(EngineError::IncompatibleFormat(_))
        ));
        buffer.truncate(BLOCK_METADATA_RECORD_SIZE + 3);
        assert!(read_all(buffer.as_slice()).is_err());
    }

    #[test]
    fn test_column_coverage() {
        let coverage = ColumnCoverage::from_bits(0b101);
        assert!(coverage.contains(0));
        assert!(!coverage.contains(1));
        assert!(coverage.contains(2));
        assert!(!coverage.contains(3));
    }
}

/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod geo_vocabulary;
pub mod geometry_info;

use crate::error::{EngineError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Writes the words of a vocabulary to disk, one at a time.
pub trait WordWriter {
    /// Appends `word` and returns its index. Indices are consecutive and
    /// start at 0.
    fn append(&mut self, word: &str, is_external: bool) -> Result<u64>;

    /// Flushes all words. Further calls have no effect.
    fn finish(&mut self) -> Result<()>;
}

/// A vocabulary that is written once and then opened for lookups.
pub trait UnderlyingVocabulary {
    type Writer: WordWriter;

    fn open(&mut self, filename: &Path) -> Result<()>;
    fn size(&self) -> usize;
    fn word(&self, index: u64) -> Option<&str>;
    /// Index of the first word not smaller than `word`.
    fn lower_bound(&self, word: &str) -> u64;
    fn make_disk_writer(&self, filename: &Path) -> Result<Self::Writer>;
}

/// Vocabulary that keeps all words in memory.
///
/// On disk every word is stored as a little-endian `u32` length, one byte
/// for the external flag and the UTF-8 bytes of the word. Words are expected
/// to be appended in sorted order; `lower_bound` relies on it.
#[derive(Debug, Default)]
pub struct VocabularyInMemory {
    words: Vec<String>,
    external: Vec<bool>,
}

impl VocabularyInMemory {
    pub fn new() -> Self {
        VocabularyInMemory::default()
    }

    pub fn is_external(&self, index: u64) -> bool {
        self.external.get(index as usize).copied().unwrap_or(false)
    }
}

impl UnderlyingVocabulary for VocabularyInMemory {
    type Writer = VocabularyInMemoryWriter;

    fn open(&mut self, filename: &Path) -> Result<()> {
        let mut reader = BufReader::new(File::open(filename)?);
        self.words.clear();
        self.external.clear();
        loop {
            let mut length = [0u8; 4];
            match reader.read_exact(&mut length) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let mut flag = [0u8; 1];
            reader.read_exact(&mut flag)?;
            let length = u32::from_le_bytes(length) as u64;
            let mut bytes = Vec::new();
            (&mut reader).take(length).read_to_end(&mut bytes)?;
            if bytes.len() as u64 != length {
                return Err(EngineError::IncompatibleFormat(format!(
                    "Vocabulary file {} is truncated: a word of {} bytes has only {} bytes left",
                    filename.display(),
                    length,
                    bytes.len()
                )));
            }
            let word = String::from_utf8(bytes).map_err(|e| {
                EngineError::IncompatibleFormat(format!(
                    "Vocabulary file {} contains a word that is not valid UTF-8: {}",
                    filename.display(),
                    e
                ))
            })?;
            self.words.push(word);
            self.external.push(flag[0] != 0);
        }
        Ok(())
    }

    fn size(&self) -> usize {
        self.words.len()
    }

    fn word(&self, index: u64) -> Option<&str> {
        self.words.get(index as usize).map(|w| w.as_str())
    }

    fn lower_bound(&self, word: &str) -> u64 {
        self.words.partition_point(|w| w.as_str() < word) as u64
    }

    fn make_disk_writer(&self, filename: &Path) -> Result<VocabularyInMemoryWriter> {
        VocabularyInMemoryWriter::new(filename)
    }
}

pub struct VocabularyInMemoryWriter {
    filename: PathBuf,
    out: Option<BufWriter<File>>,
    num_words: u64,
}

impl VocabularyInMemoryWriter {
    pub fn new(filename: &Path) -> Result<Self> {
        Ok(VocabularyInMemoryWriter {
            filename: filename.to_path_buf(),
            out: Some(BufWriter::new(File::create(filename)?)),
            num_words: 0,
        })
    }
}

impl WordWriter for VocabularyInMemoryWriter {
    fn append(&mut self, word: &str, is_external: bool) -> Result<u64> {
        let out = self.out.as_mut().ok_or_else(|| {
            EngineError::PreconditionViolation(format!(
                "the vocabulary writer for {} is already finished",
                self.filename.display()
            ))
        })?;
        let length = u32::try_from(word.len()).map_err(|_| {
            EngineError::InvalidInput(format!("word of {} bytes is too long", word.len()))
        })?;
        out.write_all(&length.to_le_bytes())?;
        out.write_all(&[is_external as u8])?;
        out.write_all(word.as_bytes())?;
        let index = self.num_words;
        self.num_words += 1;
        Ok(index)
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(mut out) = self.out.take() {
            out.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let filename = dir.path().join("vocab");
        let vocab = VocabularyInMemory::new();
        let mut writer = vocab.make_disk_writer(&filename).unwrap();
        assert_eq!(writer.append("\"a\"", false).unwrap(), 0);
        assert_eq!(writer.append("<b>", true).unwrap(), 1);
        writer.finish().unwrap();
        assert!(writer.append("<c>", false).is_err());

        let mut opened = VocabularyInMemory::new();
        opened.open(&filename).unwrap();
        assert_eq!(opened.size(), 2);
        assert_eq!(opened.word(1), Some("<b>"));
        assert!(opened.is_external(1));
        assert!(!opened.is_external(0));
        assert_eq!(opened.lower_bound("<a>"), 1);
    }

    #[test]
    fn test_open_rejects_truncated_word() {
        let dir = tempfile::tempdir().unwrap();
        let filename = dir.path().join("vocab");
        let mut bytes = u32::MAX.to_le_bytes().to_vec();
        bytes.push(0);
        bytes.extend_from_slice(b"<short>");
        std::fs::write(&filename, bytes).unwrap();

        let mut opened = VocabularyInMemory::new();
        let err = opened.open(&filename).unwrap_err();
        assert!(matches!(err, EngineError::IncompatibleFormat(_)));
        assert!(err.to_string().contains("truncated"));
    }
}

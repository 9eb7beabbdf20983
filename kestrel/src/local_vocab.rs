/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use rustc_hash::FxHashMap;
use shared::id::{Datatype, Id};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// Local vocab indices are unique per process, so vocabularies of different
// chunks can be merged without renumbering.
static NEXT_LOCAL_VOCAB_INDEX: AtomicU64 = AtomicU64::new(0);

/// Words created while a query runs that are not part of the index vocabulary.
#[derive(Debug, Clone, Default)]
pub struct LocalVocab {
    words: FxHashMap<u64, Arc<str>>,
    indices: FxHashMap<Arc<str>, u64>,
}

impl LocalVocab {
    pub fn new() -> Self {
        LocalVocab::default()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Returns the Id of `word`, adding it if it is not yet contained.
    pub fn get_or_add(&mut self, word: &str) -> Id {
        if let Some(index) = self.indices.get(word) {
            return Id::make_from_local_vocab_index(*index);
        }
        let index = NEXT_LOCAL_VOCAB_INDEX.fetch_add(1, Ordering::Relaxed);
        let word: Arc<str> = Arc::from(word);
        self.words.insert(index, word.clone());
        self.indices.insert(word, index);
        Id::make_from_local_vocab_index(index)
    }

    pub fn word(&self, id: Id) -> Option<&str> {
        if id.datatype() != Datatype::LocalVocabIndex {
            return None;
        }
        self.words.get(&id.get_local_vocab_index()).map(|w| w.as_ref())
    }

    /// Makes all words of `other` reachable from `self`.
    pub fn merge(&mut self, other: &LocalVocab) {
        for (index, word) in &other.words {
            self.words.entry(*index).or_insert_with(|| word.clone());
            self.indices.entry(word.clone()).or_insert(*index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_add_is_idempotent() {
        let mut vocab = LocalVocab::new();
        let a = vocab.get_or_add("\"a\"");
        assert_eq!(vocab.get_or_add("\"a\""), a);
        assert_eq!(vocab.word(a), Some("\"a\""));
        assert_eq!(vocab.len(), 1);
    }

    #[test]
    fn test_merge_keeps_words_reachable() {
        let mut first = LocalVocab::new();
        let mut second = LocalVocab::new();
        let a = first.get_or_add("a");
        let b = second.get_or_add("b");
        first.merge(&second);
        assert_eq!(first.word(a), Some("a"));
        assert_eq!(first.word(b), Some("b"));
        assert_ne!(a, b);
    }
}

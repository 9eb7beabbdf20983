/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use rayon::prelude::*;

// Sorted vocabulary: the index of a word is its rank, so comparing two
// vocab indices compares the words.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    words: Vec<String>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Vocabulary { words: Vec::new() }
    }

    /// Builds a vocabulary from words in any order. Duplicates are removed.
    pub fn from_words<I: IntoIterator<Item = String>>(words: I) -> Self {
        let mut words: Vec<String> = words.into_iter().collect();
        words.par_sort_unstable();
        words.dedup();
        Vocabulary { words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn get_index(&self, word: &str) -> Option<u64> {
        self.words
            .binary_search_by(|w| w.as_str().cmp(word))
            .ok()
            .map(|i| i as u64)
    }

    pub fn word(&self, index: u64) -> Option<&str> {
        self.words.get(index as usize).map(|s| s.as_str())
    }

    /// Index of the first word that is not smaller than `word`.
    pub fn lower_bound(&self, word: &str) -> u64 {
        self.words.partition_point(|w| w.as_str() < word) as u64
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_follow_word_order() {
        let vocab = Vocabulary::from_words(vec![
            "<b>".to_string(),
            "\"lit\"".to_string(),
            "<a>".to_string(),
            "<b>".to_string(),
        ]);
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.get_index("\"lit\""), Some(0));
        assert_eq!(vocab.get_index("<a>"), Some(1));
        assert_eq!(vocab.word(2), Some("<b>"));
        assert_eq!(vocab.get_index("<c>"), None);
        assert_eq!(vocab.lower_bound("<ab>"), 2);
    }
}

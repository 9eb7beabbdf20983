/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod block_metadata;

use crate::error::{EngineError, Result};
use crate::local_vocab::LocalVocab;
use block_metadata::BlockMetadata;
use rayon::prelude::*;
use shared::geo_point::{strip_literal_quotes, GeoPoint};
use shared::id::{Datatype, Id};
use shared::terms::*;
use shared::triple::{Permutation, PermutedTriple, Triple};
use shared::vocabulary::Vocabulary;
use std::cmp::Ordering;
use std::ops::Range;

pub const DEFAULT_BLOCK_SIZE: usize = 1 << 16;

/// The sorted triples of one permutation together with its block metadata.
#[derive(Debug, Clone, Default)]
pub struct PermutationData {
    triples: Vec<PermutedTriple>,
    blocks: Vec<BlockMetadata>,
}

impl PermutationData {
    fn build(triples: &[Triple], permutation: Permutation, block_size: usize) -> Self {
        let mut permuted: Vec<PermutedTriple> =
            triples.par_iter().map(|t| permutation.permute(t)).collect();
        permuted.par_sort_unstable();
        permuted.dedup();
        let blocks = permuted
            .chunks(block_size)
            .enumerate()
            .map(|(i, chunk)| BlockMetadata::new(i as u64, chunk[0], chunk[chunk.len() - 1]))
            .collect();
        PermutationData {
            triples: permuted,
            blocks,
        }
    }

    pub fn triples(&self) -> &[PermutedTriple] {
        &self.triples
    }

    pub fn blocks(&self) -> &[BlockMetadata] {
        &self.blocks
    }
}

fn compare_prefix(triple: &PermutedTriple, prefix: &[Id]) -> Ordering {
    prefix
        .iter()
        .enumerate()
        .map(|(c, id)| triple.get(c).cmp(id))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// An in-memory index holding all six permutations of a set of triples.
#[derive(Debug, Clone)]
pub struct Index {
    vocabulary: Vocabulary,
    blank_nodes: Vocabulary,
    permutations: Vec<PermutationData>,
    block_size: usize,
}

impl Index {
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn num_triples(&self) -> usize {
        self.permutation(Permutation::SPO).triples.len()
    }

    pub fn permutation(&self, permutation: Permutation) -> &PermutationData {
        let position = Permutation::ALL
            .iter()
            .position(|p| *p == permutation)
            .unwrap_or_default();
        &self.permutations[position]
    }

    pub fn blocks(&self, permutation: Permutation) -> &[BlockMetadata] {
        &self.permutation(permutation).blocks
    }

    /// The triples stored in the block with the given index.
    pub fn block_triples(&self, permutation: Permutation, block_index: u64) -> &[PermutedTriple] {
        let triples = &self.permutation(permutation).triples;
        let begin = (block_index as usize * self.block_size).min(triples.len());
        let end = (begin + self.block_size).min(triples.len());
        &triples[begin..end]
    }

    /// Positions of all triples of the permutation that start with `prefix`.
    pub fn range_for_prefix(&self, permutation: Permutation, prefix: &[Id]) -> Range<usize> {
        let triples = &self.permutation(permutation).triples;
        let begin = triples.partition_point(|t| compare_prefix(t, prefix) == Ordering::Less);
        let end = triples.partition_point(|t| compare_prefix(t, prefix) != Ordering::Greater);
        begin..end
    }

    pub fn count(&self, permutation: Permutation, prefix: &[Id]) -> usize {
        self.range_for_prefix(permutation, prefix).len()
    }

    /// The Id of a constant, or `None` if the constant does not occur in the
    /// index vocabulary.
    pub fn id_for(&self, component: &TripleComponent) -> Option<Id> {
        match normalize(component.clone()) {
            TripleComponent::Int(i) => Some(Id::make_from_int(i)),
            TripleComponent::Double(d) => Some(Id::make_from_double(d)),
            TripleComponent::Bool(b) => Some(Id::make_from_bool(b)),
            TripleComponent::Undef => Some(Id::make_undefined()),
            TripleComponent::Literal(literal) => match GeoPoint::parse_wkt_point(&literal) {
                Some(point) if is_wkt_literal(&literal) => Some(Id::make_from_geo_point(point)),
                _ => self.vocabulary.get_index(&literal).map(Id::make_from_vocab_index),
            },
            TripleComponent::Iri(iri) => self.vocabulary.get_index(&iri).map(Id::make_from_vocab_index),
            TripleComponent::BlankNode(label) => self
                .blank_nodes
                .get_index(&label)
                .map(Id::make_from_blank_node_index),
            TripleComponent::Variable(_) => None,
        }
    }

    /// Like `id_for`, but constants missing from the index are added to
    /// `local_vocab`. Fails only for variables.
    pub fn id_or_local(&self, component: &TripleComponent, local_vocab: &mut LocalVocab) -> Result<Id> {
        if let Some(id) = self.id_for(component) {
            return Ok(id);
        }
        match component {
            TripleComponent::Variable(var) => Err(EngineError::InvalidInput(format!(
                "variable {} can not be converted to a value",
                var
            ))),
            other => Ok(local_vocab.get_or_add(&other.to_string())),
        }
    }

    /// The string stored for a vocabulary-like Id.
    pub fn word<'a>(&'a self, id: Id, local_vocab: &'a LocalVocab) -> Option<&'a str> {
        match id.datatype() {
            Datatype::VocabIndex => self.vocabulary.word(id.get_vocab_index()),
            Datatype::LocalVocabIndex => local_vocab.word(id),
            Datatype::BlankNodeIndex => self.blank_nodes.word(id.get_blank_node_index()),
            _ => None,
        }
    }

    /// The lexical form of `id` and its datatype IRI, if any. IRIs and
    /// literals from the vocabulary are returned in their stored form
    /// without a separate datatype.
    pub fn id_to_string_and_type(
        &self,
        id: Id,
        local_vocab: &LocalVocab,
    ) -> Option<(String, Option<&'static str>)> {
        match id.datatype() {
            Datatype::Undefined => None,
            Datatype::Bool => Some((id.get_bool().to_string(), Some(XSD_BOOLEAN_TYPE))),
            Datatype::Int => Some((id.get_int().to_string(), Some(XSD_INT_TYPE))),
            Datatype::Double => Some((id.get_double().to_string(), Some(XSD_DECIMAL_TYPE))),
            Datatype::GeoPoint => Some((id.get_geo_point().to_string(), Some(GEO_WKT_LITERAL))),
            Datatype::VocabIndex | Datatype::LocalVocabIndex | Datatype::BlankNodeIndex => {
                self.word(id, local_vocab).map(|w| (w.to_string(), None))
            }
        }
    }
}

fn is_wkt_literal(literal: &str) -> bool {
    literal.ends_with(&format!("^^<{}>", GEO_WKT_LITERAL))
}

/// Folds typed numeric and boolean literals into the corresponding
/// components so that they are stored inline.
///
/// `xsd:integer` and `xsd:int` both become ints and are read back as
/// `xsd:int`. Integers outside the inline int range become doubles.
pub fn normalize(component: TripleComponent) -> TripleComponent {
    if let TripleComponent::Int(i) = &component {
        if !Id::int_fits(*i) {
            return TripleComponent::Double(*i as f64);
        }
    }
    let TripleComponent::Literal(literal) = &component else {
        return component;
    };
    let Some((_, datatype)) = literal.rsplit_once("^^<") else {
        return component;
    };
    let datatype = datatype.trim_end_matches('>');
    let value = strip_literal_quotes(literal);
    let folded = match datatype {
        XSD_INT_TYPE | XSD_INTEGER_TYPE => match value.parse::<i64>() {
            Ok(i) if Id::int_fits(i) => Some(TripleComponent::Int(i)),
            _ => value.parse::<f64>().ok().map(TripleComponent::Double),
        },
        XSD_DOUBLE_TYPE | XSD_DECIMAL_TYPE => value.parse::<f64>().ok().map(TripleComponent::Double),
        XSD_BOOLEAN_TYPE => value.parse::<bool>().ok().map(TripleComponent::Bool),
        _ => None,
    };
    folded.unwrap_or(component)
}

/// Collects triples and builds an `Index` from them.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    triples: Vec<[TripleComponent; 3]>,
    block_size: Option<usize>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        IndexBuilder::default()
    }

    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = Some(block_size.max(1));
        self
    }

    pub fn add_triple(
        mut self,
        subject: TripleComponent,
        predicate: TripleComponent,
        object: TripleComponent,
    ) -> Self {
        self.triples.push([subject, predicate, object]);
        self
    }

    /// Convenience for tests and tools: IRIs without brackets, objects as given.
    pub fn add_iri_triple(self, subject: &str, predicate: &str, object: TripleComponent) -> Self {
        self.add_triple(TripleComponent::iri(subject), TripleComponent::iri(predicate), object)
    }

    pub fn build(self) -> Result<Index> {
        let block_size = self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE);
        let mut words = Vec::new();
        let mut blank_nodes = Vec::new();
        let mut triples = Vec::with_capacity(self.triples.len());
        for triple in self.triples {
            let triple = triple.map(normalize);
            for component in &triple {
                match component {
                    TripleComponent::Variable(_) | TripleComponent::Undef => {
                        return Err(EngineError::InvalidInput(format!(
                            "only constants can be added to an index, found {}",
                            component
                        )));
                    }
                    TripleComponent::BlankNode(label) => blank_nodes.push(label.clone()),
                    TripleComponent::Literal(literal)
                        if is_wkt_literal(literal) && GeoPoint::parse_wkt_point(literal).is_some() => {}
                    other => {
                        if let Some(word) = other.vocabulary_representation() {
                            words.push(word.to_string());
                        }
                    }
                }
            }
            triples.push(triple);
        }

        let mut index = Index {
            vocabulary: Vocabulary::from_words(words),
            blank_nodes: Vocabulary::from_words(blank_nodes),
            permutations: Vec::new(),
            block_size,
        };
        let encoded: Vec<Triple> = triples
            .iter()
            .map(|[s, p, o]| {
                let id = |c: &TripleComponent| index.id_for(c).unwrap_or_default();
                Triple::new(id(s), id(p), id(o))
            })
            .collect();
        index.permutations = Permutation::ALL
            .par_iter()
            .map(|p| PermutationData::build(&encoded, *p, block_size))
            .collect();
        Ok(index)
    }
}

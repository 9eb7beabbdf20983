/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::*;
use crate::error::EngineError;
use crate::index::block_metadata::BlockMetadata;
use crate::prefilter::{check_prefilter_variable_pairs, PrefilterExprVariablePair};
use log::debug;
use shared::id::Id;
use shared::runtime_parameters::runtime_parameters;
use shared::terms::{SparqlTripleSimple, TripleComponent};
use shared::triple::Permutation;
use std::ops::Range;

/// Scans one permutation of the index for a triple pattern whose constants
/// form a prefix of the permutation's column order.
///
/// The result has one column per distinct variable, in the order in which the
/// variables appear in the permutation. A variable that occurs twice only
/// matches triples with equal values in both positions.
#[derive(Debug, Clone)]
pub struct IndexScan {
    context: QueryExecutionContext,
    permutation: Permutation,
    triple: SparqlTripleSimple,
    permuted: [TripleComponent; 3],
    num_constants: usize,
    // `None` if one of the constants does not occur in the index.
    prefix: Option<Vec<Id>>,
    selected_variables: Option<Vec<Variable>>,
    prefilters: Vec<PrefilterExprVariablePair>,
    size_estimate: u64,
}

impl IndexScan {
    pub fn new(
        context: QueryExecutionContext,
        permutation: Permutation,
        triple: SparqlTripleSimple,
    ) -> Result<Self> {
        let permuted =
            permutation.permute_positions(&[triple.s.clone(), triple.p.clone(), triple.o.clone()]);
        let num_constants = permuted.iter().take_while(|c| !c.is_variable()).count();
        if permuted[num_constants..].iter().any(|c| !c.is_variable()) {
            return Err(EngineError::PreconditionViolation(format!(
                "The constants of the triple {} must form a prefix of the {} permutation.",
                triple, permutation
            )));
        }
        let prefix = permuted[..num_constants]
            .iter()
            .map(|c| context.index().id_for(c))
            .collect::<Option<Vec<Id>>>();
        let mut scan = IndexScan {
            context,
            permutation,
            triple,
            permuted,
            num_constants,
            prefix,
            selected_variables: None,
            prefilters: Vec::new(),
            size_estimate: 0,
        };
        scan.size_estimate = scan.count_matching_triples() as u64;
        Ok(scan)
    }

    /// Restricts the result to the given variables.
    pub fn with_selected_variables(mut self, variables: Vec<Variable>) -> Result<Self> {
        let all = self.distinct_variables();
        if let Some(missing) = variables.iter().find(|v| !all.iter().any(|(w, _)| w == *v)) {
            return Err(EngineError::InvalidInput(format!(
                "the variable {} is not contained in the scan {}",
                missing,
                self.descriptor()
            )));
        }
        self.selected_variables = Some(variables);
        Ok(self)
    }

    /// A copy of this scan that additionally skips blocks with the given
    /// prefilters. Only a prefilter on the first free column can be used;
    /// returns `None` if no pair applies to it.
    pub fn with_prefilters(&self, pairs: Vec<PrefilterExprVariablePair>) -> Result<Option<IndexScan>> {
        check_prefilter_variable_pairs(&pairs)?;
        let Some(first_free) = self.permuted.get(self.num_constants).and_then(|c| c.get_variable())
        else {
            return Ok(None);
        };
        let applicable: Vec<PrefilterExprVariablePair> =
            pairs.into_iter().filter(|(_, var)| var == first_free).collect();
        if applicable.is_empty() {
            return Ok(None);
        }
        let mut scan = self.clone();
        scan.prefilters = applicable;
        Ok(Some(scan))
    }

    /// The same pattern on the permutation with the last two columns
    /// swapped, if this scan has one constant and two different variables.
    pub fn alternative_permutation_scan(&self) -> Option<IndexScan> {
        if self.num_constants != 1 || self.distinct_variables().len() != 2 {
            return None;
        }
        let swapped = match self.permutation {
            Permutation::PSO => Permutation::POS,
            Permutation::POS => Permutation::PSO,
            Permutation::SPO => Permutation::SOP,
            Permutation::SOP => Permutation::SPO,
            Permutation::OPS => Permutation::OSP,
            Permutation::OSP => Permutation::OPS,
        };
        let mut scan = IndexScan::new(self.context.clone(), swapped, self.triple.clone()).ok()?;
        scan.selected_variables = self.selected_variables.clone();
        Some(scan)
    }

    pub fn permutation(&self) -> Permutation {
        self.permutation
    }

    pub fn subject(&self) -> &TripleComponent {
        &self.triple.s
    }

    pub fn predicate(&self) -> &TripleComponent {
        &self.triple.p
    }

    pub fn object(&self) -> &TripleComponent {
        &self.triple.o
    }

    pub fn num_variables(&self) -> usize {
        3 - self.num_constants
    }

    pub fn prefilters(&self) -> &[PrefilterExprVariablePair] {
        &self.prefilters
    }

    /// Every distinct variable together with the first permutation column it
    /// occurs in.
    fn distinct_variables(&self) -> Vec<(Variable, usize)> {
        let mut variables: Vec<(Variable, usize)> = Vec::new();
        for (column, component) in self.permuted.iter().enumerate() {
            if let Some(var) = component.get_variable() {
                if !variables.iter().any(|(v, _)| v == var) {
                    variables.push((var.clone(), column));
                }
            }
        }
        variables
    }

    fn output_columns(&self) -> Vec<(Variable, usize)> {
        let all = self.distinct_variables();
        match &self.selected_variables {
            None => all,
            Some(selected) => all.into_iter().filter(|(v, _)| selected.contains(v)).collect(),
        }
    }

    // Pairs of permutation columns that must hold equal values because they
    // contain the same variable.
    fn equal_columns(&self) -> Vec<(usize, usize)> {
        let first = self.distinct_variables();
        let mut pairs = Vec::new();
        for (column, component) in self.permuted.iter().enumerate() {
            if let Some(var) = component.get_variable() {
                if let Some((_, first_column)) = first.iter().find(|(v, _)| v == var) {
                    if *first_column != column {
                        pairs.push((*first_column, column));
                    }
                }
            }
        }
        pairs
    }

    fn triple_range(&self) -> Option<Range<usize>> {
        let prefix = self.prefix.as_ref()?;
        Some(self.context.index().range_for_prefix(self.permutation, prefix))
    }

    fn count_matching_triples(&self) -> usize {
        let Some(range) = self.triple_range() else {
            return 0;
        };
        let equal_columns = self.equal_columns();
        if equal_columns.is_empty() {
            return range.len();
        }
        self.context.index().permutation(self.permutation).triples()[range]
            .iter()
            .filter(|t| equal_columns.iter().all(|(a, b)| t.get(*a) == t.get(*b)))
            .count()
    }

    /// The blocks that overlap `range`, after applying the prefilters to the
    /// blocks that lie completely inside of it.
    fn blocks_to_read(&self, range: &Range<usize>) -> Result<Vec<BlockMetadata>> {
        let index = self.context.index();
        let block_size = index.block_size();
        let num_triples = index.permutation(self.permutation).triples().len();
        let blocks = index.blocks(self.permutation);
        let first = range.start / block_size;
        let last = (range.end - 1) / block_size;
        let (mut inner, boundary): (Vec<BlockMetadata>, Vec<BlockMetadata>) =
            blocks[first..=last].iter().cloned().partition(|block| {
                let begin = block.block_index as usize * block_size;
                let end = (begin + block_size).min(num_triples);
                begin >= range.start && end <= range.end
            });

        if self.prefilters.is_empty() || !runtime_parameters().enable_prefilter_on_index_scans() {
            let mut all = inner;
            all.extend(boundary);
            all.sort_by_key(|b| b.block_index);
            return Ok(all);
        }
        let num_inner = inner.len();
        for (prefilter, _) in &self.prefilters {
            inner = prefilter.evaluate(&inner, self.num_constants)?;
        }
        debug!(
            "Prefilter on {} kept {} of {} inner blocks",
            self.descriptor(),
            inner.len(),
            num_inner
        );
        inner.extend(boundary);
        inner.sort_by_key(|b| b.block_index);
        Ok(inner)
    }
}

impl Operation for IndexScan {
    fn context(&self) -> &QueryExecutionContext {
        &self.context
    }

    fn descriptor(&self) -> String {
        format!("IndexScan {}", self.triple)
    }

    fn cache_key(&self) -> String {
        let constants: Vec<String> = self.permuted[..self.num_constants]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let distinct = self.distinct_variables();
        let pattern: Vec<String> = self.permuted[self.num_constants..]
            .iter()
            .filter_map(|c| c.get_variable())
            .map(|v| {
                let position = distinct.iter().position(|(w, _)| w == v).unwrap_or_default();
                position.to_string()
            })
            .collect();
        let selected: Vec<String> = self
            .output_columns()
            .iter()
            .map(|(v, _)| {
                let position = distinct.iter().position(|(w, _)| w == v).unwrap_or_default();
                position.to_string()
            })
            .collect();
        let mut key = format!(
            "SCAN {} with prefix [{}] free columns [{}] selected [{}]",
            self.permutation,
            constants.join(" "),
            pattern.join(" "),
            selected.join(" ")
        );
        for (prefilter, _) in &self.prefilters {
            key.push_str(&format!("\nprefilter on first free column: {}", prefilter));
        }
        key
    }

    fn result_width(&self) -> usize {
        self.output_columns().len()
    }

    fn result_sorted_on(&self) -> Vec<usize> {
        let all = self.distinct_variables();
        let output = self.output_columns();
        let sorted = output
            .iter()
            .zip(all.iter())
            .take_while(|(a, b)| a == b)
            .count();
        (0..sorted).collect()
    }

    fn variable_to_column_map(&self) -> VariableToColumnMap {
        self.output_columns()
            .into_iter()
            .enumerate()
            .map(|(column, (var, _))| (var, ColumnIndexAndTypeInfo::always_defined(column)))
            .collect()
    }

    fn children(&self) -> Vec<&QueryExecutionTree> {
        Vec::new()
    }

    fn size_estimate_before_limit(&self) -> u64 {
        self.size_estimate
    }

    fn cost_estimate(&self) -> u64 {
        self.size_estimate
    }

    fn known_empty_result(&self) -> bool {
        self.size_estimate == 0
    }

    fn column_originates_from_graph_or_undef(&self, variable: &Variable) -> bool {
        self.output_columns().iter().any(|(v, _)| v == variable)
    }

    fn clone_operation(&self) -> Arc<dyn Operation> {
        Arc::new(self.clone())
    }

    fn compute_result(&self) -> Result<ChunkIterator> {
        let range = match self.triple_range() {
            Some(range) if !range.is_empty() => range,
            _ => return Ok(Box::new(std::iter::empty())),
        };
        let blocks = self.blocks_to_read(&range)?;
        let index = self.context.shared_index();
        let permutation = self.permutation;
        let equal_columns = self.equal_columns();
        let output_columns: Vec<usize> = self.output_columns().iter().map(|(_, c)| *c).collect();
        let block_size = index.block_size();

        let chunks = blocks.into_iter().filter_map(move |block| {
            let begin = block.block_index as usize * block_size;
            let mut table = IdTable::new(output_columns.len());
            let mut row = Vec::with_capacity(output_columns.len());
            for (offset, triple) in index.block_triples(permutation, block.block_index).iter().enumerate() {
                if !range.contains(&(begin + offset))
                    || !equal_columns.iter().all(|(a, b)| triple.get(*a) == triple.get(*b))
                {
                    continue;
                }
                row.clear();
                row.extend(output_columns.iter().map(|c| triple.get(*c)));
                table.push_row(&row);
            }
            (!table.is_empty()).then(|| Ok::<_, EngineError>(ResultChunk::new(table, LocalVocab::new())))
        });
        Ok(Box::new(chunks))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::*;
    use super::*;
    use crate::prefilter::PrefilterExpression;

    fn scan(context: &QueryExecutionContext, permutation: Permutation, s: &str, p: &str, o: &str) -> IndexScan {
        let component = |c: &str| {
            if c.starts_with('?') {
                TripleComponent::variable(c)
            } else {
                TripleComponent::iri(c)
            }
        };
        IndexScan::new(
            context.clone(),
            permutation,
            SparqlTripleSimple::new(component(s), component(p), component(o)),
        )
        .unwrap()
    }

    #[test]
    fn test_scan_with_fixed_predicate() {
        let context = small_context();
        let scan = scan(&context, Permutation::PSO, "?s", "p", "?o");
        assert_eq!(scan.result_width(), 2);
        assert_eq!(scan.size_estimate_before_limit(), 3);
        assert_eq!(scan.result_sorted_on(), vec![0, 1]);
        let map = scan.variable_to_column_map();
        assert_eq!(map[&var("?s")].column_index, 0);
        assert_eq!(map[&var("?o")].column_index, 1);

        let table = QueryExecutionTree::new(scan).collect_table().unwrap().table;
        let expected = vec![
            vec![id(&context, "a"), id(&context, "b")],
            vec![id(&context, "b"), id(&context, "c")],
            vec![id(&context, "c"), id(&context, "d")],
        ];
        assert_eq!(table.to_rows(), expected);
    }

    #[test]
    fn test_constants_must_form_a_prefix() {
        let context = small_context();
        let triple = SparqlTripleSimple::new(
            TripleComponent::variable("?s"),
            TripleComponent::iri("p"),
            TripleComponent::iri("b"),
        );
        let result = IndexScan::new(context, Permutation::PSO, triple);
        assert!(matches!(result, Err(EngineError::PreconditionViolation(_))));
    }

    #[test]
    fn test_unknown_constant_gives_empty_result() {
        let context = small_context();
        let scan = scan(&context, Permutation::PSO, "?s", "nothing", "?o");
        assert!(scan.known_empty_result());
        let table = QueryExecutionTree::new(scan).collect_table().unwrap().table;
        assert!(table.is_empty());
    }

    #[test]
    fn test_selected_variables_and_repeated_variables() {
        let context = small_context();
        let projected = scan(&context, Permutation::SPO, "?x", "?y", "?z")
            .with_selected_variables(vec![var("?x")])
            .unwrap();
        assert_eq!(projected.result_width(), 1);
        assert_eq!(projected.result_sorted_on(), vec![0]);
        assert_eq!(projected.size_estimate_before_limit(), 5);

        let repeated = scan(&context, Permutation::PSO, "?x", "p", "?x");
        assert_eq!(repeated.result_width(), 1);
        assert!(repeated.known_empty_result());

        let dropped_first = scan(&context, Permutation::PSO, "?s", "p", "?o")
            .with_selected_variables(vec![var("?o")])
            .unwrap();
        assert!(dropped_first.result_sorted_on().is_empty());
    }

    #[test]
    fn test_alternative_permutation() {
        let context = small_context();
        let scan = scan(&context, Permutation::PSO, "?s", "p", "?o");
        let alternative = scan.alternative_permutation_scan().unwrap();
        assert_eq!(alternative.permutation(), Permutation::POS);
        assert_eq!(alternative.variable_to_column_map()[&var("?o")].column_index, 0);
        assert_ne!(alternative.cache_key(), scan.cache_key());
    }

    #[test]
    fn test_prefilter_only_applies_to_first_free_column() {
        let context = small_context();
        let scan = scan(&context, Permutation::PSO, "?s", "q", "?o");
        let pairs = vec![(PrefilterExpression::gt(Id::make_from_int(1)), var("?o"))];
        assert!(scan.with_prefilters(pairs).unwrap().is_none());

        let pos = IndexScan::new(
            context.clone(),
            Permutation::POS,
            SparqlTripleSimple::new(
                TripleComponent::variable("?s"),
                TripleComponent::iri("q"),
                TripleComponent::variable("?o"),
            ),
        )
        .unwrap();
        let pairs = vec![(PrefilterExpression::gt(Id::make_from_int(1)), var("?o"))];
        let filtered = pos.with_prefilters(pairs).unwrap().unwrap();
        assert_ne!(filtered.cache_key(), pos.cache_key());
        // Prefiltering only skips blocks, it never drops rows of kept blocks.
        let table = QueryExecutionTree::new(filtered).collect_table().unwrap().table;
        assert!(table.column(0).any(|o| o == Id::make_from_int(2)));
    }
}

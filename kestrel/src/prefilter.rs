/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Block-level prefiltering.
//!
//! A `PrefilterExpression` decides, from the first and last triple of each
//! block alone, which blocks of a permutation may contain rows that satisfy
//! a filter on one column. The result is conservative: blocks that are
//! dropped can not contain a match, blocks that are kept may.

use crate::error::{check, EngineError, Result};
use crate::index::block_metadata::BlockMetadata;
use shared::comparators::{get_ranges_for_id, Comparison};
use shared::id::Id;
use shared::variable::Variable;
use std::fmt;

/// Nesting depth up to which `as_string` prints subexpressions.
pub const MAX_INFO_RECURSION: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    fn complement(self) -> LogicalOperator {
        match self {
            LogicalOperator::And => LogicalOperator::Or,
            LogicalOperator::Or => LogicalOperator::And,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            LogicalOperator::And => "AND(&&)",
            LogicalOperator::Or => "OR(||)",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrefilterExpression {
    /// `column <comparison> reference`.
    Relational { comparison: Comparison, reference: Id },
    Logical {
        operator: LogicalOperator,
        left: Box<PrefilterExpression>,
        right: Box<PrefilterExpression>,
    },
    /// Negation. `child` already holds the complement of the negated
    /// expression, so evaluating a `Not` is evaluating `child`.
    Not { child: Box<PrefilterExpression> },
}

/// A prefilter together with the variable whose column it applies to.
pub type PrefilterExprVariablePair = (PrefilterExpression, Variable);

impl PrefilterExpression {
    pub fn relational(comparison: Comparison, reference: Id) -> Self {
        PrefilterExpression::Relational {
            comparison,
            reference,
        }
    }

    pub fn lt(reference: Id) -> Self {
        Self::relational(Comparison::LT, reference)
    }

    pub fn le(reference: Id) -> Self {
        Self::relational(Comparison::LE, reference)
    }

    pub fn eq(reference: Id) -> Self {
        Self::relational(Comparison::EQ, reference)
    }

    pub fn ne(reference: Id) -> Self {
        Self::relational(Comparison::NE, reference)
    }

    pub fn ge(reference: Id) -> Self {
        Self::relational(Comparison::GE, reference)
    }

    pub fn gt(reference: Id) -> Self {
        Self::relational(Comparison::GT, reference)
    }

    pub fn and(left: PrefilterExpression, right: PrefilterExpression) -> Self {
        PrefilterExpression::Logical {
            operator: LogicalOperator::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: PrefilterExpression, right: PrefilterExpression) -> Self {
        PrefilterExpression::Logical {
            operator: LogicalOperator::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Creates the negation of `child`.
    pub fn not(child: PrefilterExpression) -> Self {
        PrefilterExpression::Not {
            child: Box::new(child.logical_complement()),
        }
    }

    /// An expression that holds exactly where `self` does not.
    pub fn logical_complement(&self) -> PrefilterExpression {
        match self {
            PrefilterExpression::Relational {
                comparison,
                reference,
            } => Self::relational(comparison.complement(), *reference),
            PrefilterExpression::Logical {
                operator,
                left,
                right,
            } => PrefilterExpression::Logical {
                operator: operator.complement(),
                left: Box::new(left.logical_complement()),
                right: Box::new(right.logical_complement()),
            },
            // `child` is the complement of the original expression, so the
            // complement of the negation is the original expression.
            PrefilterExpression::Not { child } => child.logical_complement(),
        }
    }

    /// Returns the blocks that may contain a row whose value in `column`
    /// satisfies the expression. Fails if `blocks` violate the ordering and
    /// consistency requirements.
    pub fn evaluate(&self, blocks: &[BlockMetadata], column: usize) -> Result<Vec<BlockMetadata>> {
        check_evaluation_requirements(blocks, column)?;
        let result = self.evaluate_impl(blocks, column);
        check_evaluation_requirements(&result, column)?;
        Ok(result)
    }

    fn evaluate_impl(&self, blocks: &[BlockMetadata], column: usize) -> Vec<BlockMetadata> {
        match self {
            PrefilterExpression::Relational {
                comparison,
                reference,
            } => evaluate_relational(*comparison, *reference, blocks, column),
            PrefilterExpression::Logical {
                operator: LogicalOperator::And,
                left,
                right,
            } => right.evaluate_impl(&left.evaluate_impl(blocks, column), column),
            PrefilterExpression::Logical {
                operator: LogicalOperator::Or,
                left,
                right,
            } => set_union(
                &left.evaluate_impl(blocks, column),
                &right.evaluate_impl(blocks, column),
            ),
            PrefilterExpression::Not { child } => child.evaluate_impl(blocks, column),
        }
    }

    /// Human readable form. Subexpressions deeper than `MAX_INFO_RECURSION`
    /// are printed as `MAX_DEPTH`.
    pub fn as_string(&self, depth: usize) -> String {
        if depth > MAX_INFO_RECURSION {
            return "MAX_DEPTH".to_string();
        }
        match self {
            PrefilterExpression::Relational {
                comparison,
                reference,
            } => format!(
                "Prefilter RelationalExpression<{}>\nValueId: {}\n.\n",
                relational_operator_str(*comparison),
                reference
            ),
            PrefilterExpression::Logical {
                operator,
                left,
                right,
            } => format!(
                "Prefilter LogicalExpression<{}>\nchild1 {{{}}}child2 {{{}}}\n.\n",
                operator.as_str(),
                left.as_string(depth + 1),
                right.as_string(depth + 1)
            ),
            PrefilterExpression::Not { child } => format!(
                "Prefilter NotExpression:\nchild {{{}}}\n.\n",
                child.as_string(depth + 1)
            ),
        }
    }
}

impl fmt::Display for PrefilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string(0))
    }
}

fn relational_operator_str(comparison: Comparison) -> &'static str {
    match comparison {
        Comparison::LT => "LT(<)",
        Comparison::LE => "LE(<=)",
        Comparison::EQ => "EQ(=)",
        Comparison::NE => "NE(!=)",
        Comparison::GE => "GE(>=)",
        Comparison::GT => "GT(>)",
    }
}

fn evaluate_relational(
    comparison: Comparison,
    reference: Id,
    blocks: &[BlockMetadata],
    column: usize,
) -> Vec<BlockMetadata> {
    let mut mixed_datatype_blocks = Vec::new();
    let mut value_ids = Vec::with_capacity(2 * blocks.len());
    for block in blocks {
        let first = block.first_triple.get(column);
        let last = block.last_triple.get(column);
        value_ids.push(first);
        value_ids.push(last);
        if first.datatype() != last.datatype() {
            mixed_datatype_blocks.push(*block);
        }
    }

    // The reference can lie strictly between the first and last value of a
    // block without being contained in `value_ids`, so for EQ the empty range
    // marking its position must survive.
    let remove_empty = comparison != Comparison::EQ;
    let ranges = get_ranges_for_id(&value_ids, reference, comparison, remove_empty);

    let mut relevant: Vec<BlockMetadata> = Vec::new();
    for range in ranges {
        let begin = range.start / 2;
        let end = (range.end + 1) / 2;
        for block in &blocks[begin..end.min(blocks.len())] {
            if relevant.last().map_or(true, |b| b.block_index < block.block_index) {
                relevant.push(*block);
            }
        }
    }
    set_union(&relevant, &mixed_datatype_blocks)
}

/// Union of two block sequences that are sorted by block index.
fn set_union(a: &[BlockMetadata], b: &[BlockMetadata]) -> Vec<BlockMetadata> {
    let mut result = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].block_index.cmp(&b[j].block_index) {
            std::cmp::Ordering::Less => {
                result.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                result.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                result.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    result.extend_from_slice(&a[i..]);
    result.extend_from_slice(&b[j..]);
    result
}

/// Checks that `blocks` are unique, sorted and consistent in the columns
/// before `column`.
pub fn check_evaluation_requirements(blocks: &[BlockMetadata], column: usize) -> Result<()> {
    check(column < 3, || {
        format!("The evaluation column must be 0, 1 or 2, got {}.", column)
    })?;
    for pair in blocks.windows(2) {
        check(pair[0] != pair[1], || {
            "The provided data blocks must be unique.".to_string()
        })?;
    }
    for pair in blocks.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        check(
            a.block_index < b.block_index && a.last_triple <= b.first_triple,
            || "The blocks must be provided in sorted order.".to_string(),
        )?;
    }
    let consistent_within = blocks.iter().all(|block| {
        block.first_triple.masked_prefix(column) == block.last_triple.masked_prefix(column)
    });
    let consistent_between = blocks.windows(2).all(|pair| {
        pair[0].last_triple.masked_prefix(column) == pair[1].first_triple.masked_prefix(column)
    });
    check(consistent_within && consistent_between, || {
        "The values in the columns up to the evaluation column must be consistent.".to_string()
    })
}

/// Checks that the pairs are sorted by variable and that every variable
/// occurs at most once.
pub fn check_prefilter_variable_pairs(pairs: &[PrefilterExprVariablePair]) -> Result<()> {
    for pair in pairs.windows(2) {
        if pair[0].1 == pair[1].1 {
            return Err(EngineError::PreconditionViolation(format!(
                "For each variable there must be at most one prefilter expression, found {} twice.",
                pair[0].1
            )));
        }
        check(pair[0].1 < pair[1].1, || {
            "The prefilter expressions must be sorted by their variable.".to_string()
        })?;
    }
    Ok(())
}

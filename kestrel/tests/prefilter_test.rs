/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

extern crate kestrel;
use kestrel::index::block_metadata::BlockMetadata;
use kestrel::prefilter::PrefilterExpression;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::comparators::Comparison;
use shared::id::Id;
use shared::triple::PermutedTriple;

#[cfg(test)]
mod tests {
    use super::*;

    const COMPARISONS: [Comparison; 6] = [
        Comparison::LT,
        Comparison::LE,
        Comparison::EQ,
        Comparison::NE,
        Comparison::GE,
        Comparison::GT,
    ];

    fn triple(value: i64) -> PermutedTriple {
        let zero = Id::make_from_int(0);
        PermutedTriple::new(zero, zero, Id::make_from_int(value))
    }

    // Random sorted values cut into blocks. The values of every block are
    // returned alongside its metadata.
    fn random_blocks(rng: &mut StdRng) -> (Vec<BlockMetadata>, Vec<Vec<i64>>) {
        let mut values: Vec<i64> = (0..rng.gen_range(1..60)).map(|_| rng.gen_range(-20..20)).collect();
        values.sort();
        let block_size = rng.gen_range(1..6);
        let contents: Vec<Vec<i64>> = values.chunks(block_size).map(|c| c.to_vec()).collect();
        let blocks = contents
            .iter()
            .enumerate()
            .map(|(i, c)| BlockMetadata::new(i as u64, triple(c[0]), triple(c[c.len() - 1])))
            .collect();
        (blocks, contents)
    }

    fn holds(comparison: Comparison, value: i64, reference: i64) -> bool {
        comparison.holds(value.cmp(&reference))
    }

    fn random_expression(rng: &mut StdRng, depth: usize) -> PrefilterExpression {
        let leaf = |rng: &mut StdRng| {
            let comparison = COMPARISONS[rng.gen_range(0..COMPARISONS.len())];
            PrefilterExpression::relational(comparison, Id::make_from_int(rng.gen_range(-22..22)))
        };
        if depth == 0 {
            return leaf(rng);
        }
        match rng.gen_range(0..4) {
            0 => leaf(rng),
            1 => PrefilterExpression::and(random_expression(rng, depth - 1), random_expression(rng, depth - 1)),
            2 => PrefilterExpression::or(random_expression(rng, depth - 1), random_expression(rng, depth - 1)),
            _ => PrefilterExpression::not(random_expression(rng, depth - 1)),
        }
    }

    fn indices(blocks: &[BlockMetadata]) -> Vec<u64> {
        blocks.iter().map(|b| b.block_index).collect()
    }

    #[test]
    fn test_relational_prefilter_never_drops_a_match() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..300 {
            let (blocks, contents) = random_blocks(&mut rng);
            let comparison = COMPARISONS[rng.gen_range(0..COMPARISONS.len())];
            let reference = rng.gen_range(-22..22);
            let kept = PrefilterExpression::relational(comparison, Id::make_from_int(reference))
                .evaluate(&blocks, 2)
                .unwrap();
            let kept = indices(&kept);
            for (i, values) in contents.iter().enumerate() {
                if values.iter().any(|v| holds(comparison, *v, reference)) {
                    assert!(
                        kept.contains(&(i as u64)),
                        "block {:?} was dropped for {} {}",
                        values,
                        comparison.symbol(),
                        reference
                    );
                }
            }
        }
    }

    #[test]
    fn test_result_is_ordered_subset() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..300 {
            let (blocks, _) = random_blocks(&mut rng);
            let expression = random_expression(&mut rng, 3);
            let kept = indices(&expression.evaluate(&blocks, 2).unwrap());
            let all = indices(&blocks);
            assert!(kept.windows(2).all(|w| w[0] < w[1]));
            assert!(kept.iter().all(|i| all.contains(i)));
        }
    }

    #[test]
    fn test_logical_operators_compose() {
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..200 {
            let (blocks, _) = random_blocks(&mut rng);
            let a = random_expression(&mut rng, 2);
            let b = random_expression(&mut rng, 2);

            let and = PrefilterExpression::and(a.clone(), b.clone()).evaluate(&blocks, 2).unwrap();
            let sequential = b.evaluate(&a.evaluate(&blocks, 2).unwrap(), 2).unwrap();
            assert_eq!(and, sequential);

            let or = indices(&PrefilterExpression::or(a.clone(), b.clone()).evaluate(&blocks, 2).unwrap());
            let mut union = indices(&a.evaluate(&blocks, 2).unwrap());
            union.extend(indices(&b.evaluate(&blocks, 2).unwrap()));
            union.sort();
            union.dedup();
            assert_eq!(or, union);

            let double_negation = PrefilterExpression::not(PrefilterExpression::not(a.clone()));
            assert_eq!(
                double_negation.evaluate(&blocks, 2).unwrap(),
                a.evaluate(&blocks, 2).unwrap()
            );
        }
    }
}

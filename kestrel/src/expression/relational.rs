/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Comparisons and the logical connectives. These are the expressions that
//! translate into block prefilters.

use super::*;
use crate::prefilter::PrefilterExpression;
use shared::comparators::Comparison;
use std::collections::BTreeMap;

/// `left <comparison> right`.
#[derive(Debug, Clone)]
pub struct RelationalExpression {
    comparison: Comparison,
    left: Box<dyn SparqlExpression>,
    right: Box<dyn SparqlExpression>,
}

impl RelationalExpression {
    pub fn new(
        comparison: Comparison,
        left: Box<dyn SparqlExpression>,
        right: Box<dyn SparqlExpression>,
    ) -> Self {
        RelationalExpression {
            comparison,
            left,
            right,
        }
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }
}

/// SPARQL comparison semantics: incomparable values are unequal, and all
/// other comparisons between them are errors.
pub fn compare_values(left: &ExpressionValue, right: &ExpressionValue, comparison: Comparison) -> ExpressionValue {
    if left.is_undefined() || right.is_undefined() {
        return ExpressionValue::Undefined;
    }
    match left.compare(right) {
        Some(ordering) => ExpressionValue::Bool(comparison.holds(ordering)),
        None => match comparison {
            Comparison::EQ => ExpressionValue::Bool(false),
            Comparison::NE => ExpressionValue::Bool(true),
            _ => ExpressionValue::Undefined,
        },
    }
}

impl SparqlExpression for RelationalExpression {
    fn evaluate(&self, context: &EvaluationContext<'_>) -> ExpressionValue {
        compare_values(
            &self.left.evaluate(context),
            &self.right.evaluate(context),
            self.comparison,
        )
    }

    fn cache_key(&self, variable_columns: &VariableToColumnMap) -> String {
        format!(
            "({} {} {})",
            self.left.cache_key(variable_columns),
            self.comparison.symbol(),
            self.right.cache_key(variable_columns)
        )
    }

    fn children(&self) -> Vec<&dyn SparqlExpression> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }

    fn clone_expression(&self) -> Box<dyn SparqlExpression> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn prefilter_pairs(&self, negated: bool) -> Vec<PrefilterExprVariablePair> {
        let (variable, reference, comparison) = match (
            as_variable(self.left.as_ref()),
            as_inline_constant(self.right.as_ref()),
            as_inline_constant(self.left.as_ref()),
            as_variable(self.right.as_ref()),
        ) {
            (Some(var), Some(id), _, _) => (var, id, self.comparison),
            (_, _, Some(id), Some(var)) => (var, id, self.comparison.mirrored()),
            _ => return Vec::new(),
        };
        let prefilter = PrefilterExpression::relational(comparison, reference);
        let prefilter = if negated {
            PrefilterExpression::not(prefilter)
        } else {
            prefilter
        };
        vec![(prefilter, variable.clone())]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connective {
    And,
    Or,
}

/// `left && right` or `left || right` with SPARQL's three-valued logic.
#[derive(Debug, Clone)]
pub struct LogicalExpression {
    connective: Connective,
    left: Box<dyn SparqlExpression>,
    right: Box<dyn SparqlExpression>,
}

fn merge_prefilters(
    left: Vec<PrefilterExprVariablePair>,
    right: Vec<PrefilterExprVariablePair>,
    conjunction: bool,
) -> Vec<PrefilterExprVariablePair> {
    let mut merged: BTreeMap<Variable, (Option<PrefilterExpression>, Option<PrefilterExpression>)> =
        BTreeMap::new();
    for (expression, var) in left {
        merged.entry(var).or_default().0 = Some(expression);
    }
    for (expression, var) in right {
        merged.entry(var).or_default().1 = Some(expression);
    }
    merged
        .into_iter()
        .filter_map(|(var, sides)| {
            let expression = match sides {
                (Some(l), Some(r)) if conjunction => PrefilterExpression::and(l, r),
                (Some(l), Some(r)) => PrefilterExpression::or(l, r),
                // A conjunct alone already restricts the blocks, a disjunct does not.
                (Some(only), None) | (None, Some(only)) if conjunction => only,
                _ => return None,
            };
            Some((expression, var))
        })
        .collect()
}

impl SparqlExpression for LogicalExpression {
    fn evaluate(&self, context: &EvaluationContext<'_>) -> ExpressionValue {
        let left = self.left.evaluate(context).effective_boolean_value();
        let right = self.right.evaluate(context).effective_boolean_value();
        let result = match (self.connective, left, right) {
            (Connective::And, Some(false), _) | (Connective::And, _, Some(false)) => Some(false),
            (Connective::And, Some(true), Some(true)) => Some(true),
            (Connective::Or, Some(true), _) | (Connective::Or, _, Some(true)) => Some(true),
            (Connective::Or, Some(false), Some(false)) => Some(false),
            _ => None,
        };
        result.map_or(ExpressionValue::Undefined, ExpressionValue::Bool)
    }

    fn cache_key(&self, variable_columns: &VariableToColumnMap) -> String {
        let symbol = match self.connective {
            Connective::And => "&&",
            Connective::Or => "||",
        };
        format!(
            "({} {} {})",
            self.left.cache_key(variable_columns),
            symbol,
            self.right.cache_key(variable_columns)
        )
    }

    fn children(&self) -> Vec<&dyn SparqlExpression> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }

    fn clone_expression(&self) -> Box<dyn SparqlExpression> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn prefilter_pairs(&self, negated: bool) -> Vec<PrefilterExprVariablePair> {
        // De Morgan: under negation a conjunction behaves like a disjunction.
        let conjunction = (self.connective == Connective::And) != negated;
        merge_prefilters(
            self.left.prefilter_pairs(negated),
            self.right.prefilter_pairs(negated),
            conjunction,
        )
    }
}

/// `!child`.
#[derive(Debug, Clone)]
pub struct NotExpression {
    child: Box<dyn SparqlExpression>,
}

impl SparqlExpression for NotExpression {
    fn evaluate(&self, context: &EvaluationContext<'_>) -> ExpressionValue {
        match self.child.evaluate(context).effective_boolean_value() {
            Some(value) => ExpressionValue::Bool(!value),
            None => ExpressionValue::Undefined,
        }
    }

    fn cache_key(&self, variable_columns: &VariableToColumnMap) -> String {
        format!("!({})", self.child.cache_key(variable_columns))
    }

    fn children(&self) -> Vec<&dyn SparqlExpression> {
        vec![self.child.as_ref()]
    }

    fn clone_expression(&self) -> Box<dyn SparqlExpression> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn prefilter_pairs(&self, negated: bool) -> Vec<PrefilterExprVariablePair> {
        self.child.prefilter_pairs(!negated)
    }
}

fn relational(
    comparison: Comparison,
    left: Box<dyn SparqlExpression>,
    right: Box<dyn SparqlExpression>,
) -> Box<dyn SparqlExpression> {
    Box::new(RelationalExpression::new(comparison, left, right))
}

pub fn make_equal_expression(left: Box<dyn SparqlExpression>, right: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    relational(Comparison::EQ, left, right)
}

pub fn make_not_equal_expression(left: Box<dyn SparqlExpression>, right: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    relational(Comparison::NE, left, right)
}

pub fn make_less_than_expression(left: Box<dyn SparqlExpression>, right: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    relational(Comparison::LT, left, right)
}

pub fn make_less_equal_expression(left: Box<dyn SparqlExpression>, right: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    relational(Comparison::LE, left, right)
}

pub fn make_greater_than_expression(left: Box<dyn SparqlExpression>, right: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    relational(Comparison::GT, left, right)
}

pub fn make_greater_equal_expression(left: Box<dyn SparqlExpression>, right: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    relational(Comparison::GE, left, right)
}

pub fn make_and_expression(left: Box<dyn SparqlExpression>, right: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    Box::new(LogicalExpression {
        connective: Connective::And,
        left,
        right,
    })
}

pub fn make_or_expression(left: Box<dyn SparqlExpression>, right: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    Box::new(LogicalExpression {
        connective: Connective::Or,
        left,
        right,
    })
}

pub fn make_unary_negate_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    Box::new(NotExpression { child })
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::*;
    use super::*;
    use shared::id::Id;

    fn x() -> Variable {
        Variable::new_unchecked("?x")
    }

    #[test]
    fn test_comparisons() {
        let less = make_less_than_expression(var("?x"), int(5));
        assert_eq!(evaluate_with(less.as_ref(), &[("?x", TripleComponent::Int(3))]), ExpressionValue::Bool(true));
        assert_eq!(evaluate_with(less.as_ref(), &[("?x", TripleComponent::Double(7.5))]), ExpressionValue::Bool(false));
        assert!(evaluate_with(less.as_ref(), &[("?x", TripleComponent::literal("a"))]).is_undefined());

        let equal = make_equal_expression(var("?x"), string("a"));
        assert_eq!(evaluate_with(equal.as_ref(), &[("?x", TripleComponent::Int(3))]), ExpressionValue::Bool(false));
        assert_eq!(evaluate_with(equal.as_ref(), &[("?x", TripleComponent::literal("a"))]), ExpressionValue::Bool(true));
    }

    #[test]
    fn test_three_valued_logic() {
        let or = make_or_expression(
            make_less_than_expression(var("?x"), int(5)),
            make_equal_expression(var("?y"), int(1)),
        );
        // The right side is an error because ?y is unbound, the left one decides.
        assert_eq!(evaluate_with(or.as_ref(), &[("?x", TripleComponent::Int(3))]), ExpressionValue::Bool(true));
        assert!(evaluate_with(or.as_ref(), &[("?x", TripleComponent::Int(8))]).is_undefined());
    }

    #[test]
    fn test_prefilter_of_relational_expression() {
        let expression = make_greater_than_expression(int(5), var("?x"));
        let pairs = expression.prefilter_expressions();
        assert_eq!(pairs, vec![(PrefilterExpression::lt(Id::make_from_int(5)), x())]);

        let no_constant = make_less_than_expression(var("?x"), var("?y"));
        assert!(no_constant.prefilter_expressions().is_empty());
    }

    #[test]
    fn test_prefilter_of_negated_conjunction() {
        let expression = make_unary_negate_expression(make_and_expression(
            make_less_than_expression(var("?x"), int(5)),
            make_greater_equal_expression(var("?x"), int(2)),
        ));
        let pairs = expression.prefilter_expressions();
        let expected = PrefilterExpression::or(
            PrefilterExpression::not(PrefilterExpression::lt(Id::make_from_int(5))),
            PrefilterExpression::not(PrefilterExpression::ge(Id::make_from_int(2))),
        );
        assert_eq!(pairs, vec![(expected, x())]);
    }

    #[test]
    fn test_disjunction_keeps_only_common_variables() {
        let expression = make_or_expression(
            make_less_than_expression(var("?x"), int(5)),
            make_equal_expression(var("?y"), int(1)),
        );
        assert!(expression.prefilter_expressions().is_empty());

        let conjunction = make_and_expression(
            make_less_than_expression(var("?x"), int(5)),
            make_equal_expression(var("?y"), int(1)),
        );
        let variables: Vec<Variable> = conjunction
            .prefilter_expressions()
            .into_iter()
            .map(|(_, var)| var)
            .collect();
        assert_eq!(variables, vec![x(), Variable::new_unchecked("?y")]);
    }
}

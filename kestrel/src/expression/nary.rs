/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Expressions that apply a plain function to the values of their children:
//! arithmetic, date and time accessors, RDF term tests and the functional
//! forms `IF`, `COALESCE` and `BOUND`.

use super::*;
use regex::Regex;
use std::sync::OnceLock;

pub type NaryFunction = fn(&[ExpressionValue]) -> ExpressionValue;

#[derive(Debug, Clone)]
pub struct NaryExpression {
    name: &'static str,
    children: Vec<Box<dyn SparqlExpression>>,
    function: NaryFunction,
}

impl NaryExpression {
    pub fn new(name: &'static str, children: Vec<Box<dyn SparqlExpression>>, function: NaryFunction) -> Self {
        NaryExpression {
            name,
            children,
            function,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl SparqlExpression for NaryExpression {
    fn evaluate(&self, context: &EvaluationContext<'_>) -> ExpressionValue {
        let arguments: Vec<ExpressionValue> = self.children.iter().map(|c| c.evaluate(context)).collect();
        (self.function)(&arguments)
    }

    fn cache_key(&self, variable_columns: &VariableToColumnMap) -> String {
        let children: Vec<String> = self.children.iter().map(|c| c.cache_key(variable_columns)).collect();
        format!("{}({})", self.name, children.join(", "))
    }

    fn children(&self) -> Vec<&dyn SparqlExpression> {
        self.children.iter().map(|c| c.as_ref()).collect()
    }

    fn clone_expression(&self) -> Box<dyn SparqlExpression> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) fn nary(
    name: &'static str,
    children: Vec<Box<dyn SparqlExpression>>,
    function: NaryFunction,
) -> Box<dyn SparqlExpression> {
    Box::new(NaryExpression::new(name, children, function))
}

fn numeric_result(value: f64) -> ExpressionValue {
    ExpressionValue::Double(value)
}

fn binary_numeric(
    arguments: &[ExpressionValue],
    on_ints: fn(i64, i64) -> Option<i64>,
    on_doubles: fn(f64, f64) -> f64,
) -> ExpressionValue {
    match (&arguments[0], &arguments[1]) {
        (ExpressionValue::Int(a), ExpressionValue::Int(b)) => match on_ints(*a, *b) {
            Some(result) => ExpressionValue::Int(result),
            None => numeric_result(on_doubles(*a as f64, *b as f64)),
        },
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => numeric_result(on_doubles(a, b)),
            _ => ExpressionValue::Undefined,
        },
    }
}

fn unary_double(arguments: &[ExpressionValue], function: fn(f64) -> f64) -> ExpressionValue {
    arguments[0]
        .as_f64()
        .map_or(ExpressionValue::Undefined, |v| numeric_result(function(v)))
}

// Rounding functions keep integers unchanged.
fn unary_rounding(arguments: &[ExpressionValue], function: fn(f64) -> f64) -> ExpressionValue {
    match &arguments[0] {
        ExpressionValue::Int(i) => ExpressionValue::Int(*i),
        ExpressionValue::Double(d) => ExpressionValue::Double(function(*d)),
        _ => ExpressionValue::Undefined,
    }
}

pub fn make_add_expression(left: Box<dyn SparqlExpression>, right: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("+", vec![left, right], |args| binary_numeric(args, i64::checked_add, |a, b| a + b))
}

pub fn make_subtract_expression(left: Box<dyn SparqlExpression>, right: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("-", vec![left, right], |args| binary_numeric(args, i64::checked_sub, |a, b| a - b))
}

pub fn make_multiply_expression(left: Box<dyn SparqlExpression>, right: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("*", vec![left, right], |args| binary_numeric(args, i64::checked_mul, |a, b| a * b))
}

/// Division always produces a double. Integer division by zero is an error.
pub fn make_divide_expression(left: Box<dyn SparqlExpression>, right: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("/", vec![left, right], |args| match (&args[0], &args[1]) {
        (ExpressionValue::Int(_), ExpressionValue::Int(0)) => ExpressionValue::Undefined,
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => numeric_result(a / b),
            _ => ExpressionValue::Undefined,
        },
    })
}

pub fn make_pow_expression(base: Box<dyn SparqlExpression>, exponent: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("pow", vec![base, exponent], |args| match (args[0].as_f64(), args[1].as_f64()) {
        (Some(base), Some(exponent)) => numeric_result(base.powf(exponent)),
        _ => ExpressionValue::Undefined,
    })
}

pub fn make_unary_minus_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("unary-", vec![child], |args| match &args[0] {
        ExpressionValue::Int(i) => i
            .checked_neg()
            .map_or(ExpressionValue::Double(-(*i as f64)), ExpressionValue::Int),
        ExpressionValue::Double(d) => ExpressionValue::Double(-d),
        _ => ExpressionValue::Undefined,
    })
}

pub fn make_abs_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("abs", vec![child], |args| match &args[0] {
        ExpressionValue::Int(i) => i
            .checked_abs()
            .map_or(ExpressionValue::Double((*i as f64).abs()), ExpressionValue::Int),
        ExpressionValue::Double(d) => ExpressionValue::Double(d.abs()),
        _ => ExpressionValue::Undefined,
    })
}

pub fn make_round_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    // SPARQL rounds halves towards positive infinity.
    nary("round", vec![child], |args| unary_rounding(args, |d| (d + 0.5).floor()))
}

pub fn make_ceil_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("ceil", vec![child], |args| unary_rounding(args, f64::ceil))
}

pub fn make_floor_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("floor", vec![child], |args| unary_rounding(args, f64::floor))
}

pub fn make_log_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("log", vec![child], |args| unary_double(args, f64::ln))
}

pub fn make_exp_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("exp", vec![child], |args| unary_double(args, f64::exp))
}

pub fn make_sqrt_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("sqrt", vec![child], |args| unary_double(args, f64::sqrt))
}

pub fn make_sin_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("sin", vec![child], |args| unary_double(args, f64::sin))
}

pub fn make_cos_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("cos", vec![child], |args| unary_double(args, f64::cos))
}

pub fn make_tan_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("tan", vec![child], |args| unary_double(args, f64::tan))
}

/// The components of an `xsd:dateTime` or `xsd:date` lexical form.
#[derive(Debug, Clone, PartialEq)]
pub struct DateTimeParts {
    pub year: i64,
    pub month: i64,
    pub day: i64,
    pub hours: Option<i64>,
    pub minutes: Option<i64>,
    pub seconds: Option<f64>,
    pub timezone: Option<String>,
}

fn date_time_regex() -> &'static Regex {
    static DATE_TIME: OnceLock<Regex> = OnceLock::new();
    DATE_TIME.get_or_init(|| {
        Regex::new(
            r"^(-?\d{4,})-(\d{2})-(\d{2})(?:T(\d{2}):(\d{2}):(\d{2}(?:\.\d+)?))?(Z|[+-]\d{2}:\d{2})?$",
        )
        .expect("the date time pattern is valid")
    })
}

pub fn parse_date_time(value: &ExpressionValue) -> Option<DateTimeParts> {
    let ExpressionValue::Literal {
        value,
        datatype: Some(datatype),
        ..
    } = value
    else {
        return None;
    };
    if datatype != XSD_DATETIME_TYPE && datatype != "http://www.w3.org/2001/XMLSchema#date" {
        return None;
    }
    let captures = date_time_regex().captures(value)?;
    let number = |i: usize| captures.get(i).and_then(|m| m.as_str().parse::<i64>().ok());
    Some(DateTimeParts {
        year: number(1)?,
        month: number(2)?,
        day: number(3)?,
        hours: number(4),
        minutes: number(5),
        seconds: captures.get(6).and_then(|m| m.as_str().parse::<f64>().ok()),
        timezone: captures.get(7).map(|m| m.as_str().to_string()),
    })
}

fn date_time_accessor(arguments: &[ExpressionValue], accessor: fn(&DateTimeParts) -> Option<ExpressionValue>) -> ExpressionValue {
    parse_date_time(&arguments[0])
        .and_then(|parts| accessor(&parts))
        .unwrap_or(ExpressionValue::Undefined)
}

pub fn make_year_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("year", vec![child], |args| date_time_accessor(args, |p| Some(ExpressionValue::Int(p.year))))
}

pub fn make_month_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("month", vec![child], |args| date_time_accessor(args, |p| Some(ExpressionValue::Int(p.month))))
}

pub fn make_day_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("day", vec![child], |args| date_time_accessor(args, |p| Some(ExpressionValue::Int(p.day))))
}

pub fn make_hours_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("hours", vec![child], |args| date_time_accessor(args, |p| p.hours.map(ExpressionValue::Int)))
}

pub fn make_minutes_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("minutes", vec![child], |args| date_time_accessor(args, |p| p.minutes.map(ExpressionValue::Int)))
}

pub fn make_seconds_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("seconds", vec![child], |args| date_time_accessor(args, |p| p.seconds.map(ExpressionValue::Double)))
}

/// `TZ`: the timezone as written, or the empty string.
pub fn make_timezone_str_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("tz", vec![child], |args| {
        date_time_accessor(args, |p| {
            Some(ExpressionValue::plain_literal(p.timezone.clone().unwrap_or_default()))
        })
    })
}

fn rdf_term_test(arguments: &[ExpressionValue], test: fn(&ExpressionValue) -> bool) -> ExpressionValue {
    if arguments[0].is_undefined() {
        ExpressionValue::Undefined
    } else {
        ExpressionValue::Bool(test(&arguments[0]))
    }
}

pub fn make_is_iri_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("isIRI", vec![child], |args| rdf_term_test(args, |v| matches!(v, ExpressionValue::Iri(_))))
}

pub fn make_is_blank_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("isBlank", vec![child], |args| rdf_term_test(args, |v| matches!(v, ExpressionValue::BlankNode(_))))
}

pub fn make_is_literal_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("isLiteral", vec![child], |args| {
        rdf_term_test(args, |v| !matches!(v, ExpressionValue::Iri(_) | ExpressionValue::BlankNode(_)))
    })
}

pub fn make_is_numeric_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("isNumeric", vec![child], |args| rdf_term_test(args, |v| v.as_f64().is_some()))
}

/// `DATATYPE`. Integers report `xsd:int`, the type they are stored as.
pub fn make_datatype_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("datatype", vec![child], |args| {
        let datatype = match &args[0] {
            ExpressionValue::Bool(_) => XSD_BOOLEAN_TYPE,
            ExpressionValue::Int(_) => XSD_INT_TYPE,
            ExpressionValue::Double(_) => XSD_DOUBLE_TYPE,
            ExpressionValue::GeoPoint(_) => GEO_WKT_LITERAL,
            ExpressionValue::Literal {
                datatype: Some(datatype),
                ..
            } => return ExpressionValue::Iri(datatype.clone()),
            ExpressionValue::Literal { language: Some(_), .. } => {
                "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString"
            }
            ExpressionValue::Literal { .. } => XSD_STRING_TYPE,
            _ => return ExpressionValue::Undefined,
        };
        ExpressionValue::Iri(datatype.to_string())
    })
}

pub fn make_bound_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("bound", vec![child], |args| ExpressionValue::Bool(!args[0].is_undefined()))
}

pub fn make_if_expression(
    condition: Box<dyn SparqlExpression>,
    then: Box<dyn SparqlExpression>,
    otherwise: Box<dyn SparqlExpression>,
) -> Box<dyn SparqlExpression> {
    nary("if", vec![condition, then, otherwise], |args| {
        match args[0].effective_boolean_value() {
            Some(true) => args[1].clone(),
            Some(false) => args[2].clone(),
            None => ExpressionValue::Undefined,
        }
    })
}

/// The first of `children` that is defined.
pub fn make_coalesce_expression(children: Vec<Box<dyn SparqlExpression>>) -> Box<dyn SparqlExpression> {
    nary("coalesce", children, |args| {
        args.iter()
            .find(|v| !v.is_undefined())
            .cloned()
            .unwrap_or(ExpressionValue::Undefined)
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::*;
    use super::*;

    #[test]
    fn test_arithmetic() {
        let sum = make_add_expression(var("?x"), int(2));
        assert_eq!(evaluate_with(sum.as_ref(), &[("?x", TripleComponent::Int(40))]), ExpressionValue::Int(42));
        assert_eq!(
            evaluate_with(sum.as_ref(), &[("?x", TripleComponent::Double(0.5))]),
            ExpressionValue::Double(2.5)
        );
        let quotient = make_divide_expression(var("?x"), int(0));
        assert!(evaluate_with(quotient.as_ref(), &[("?x", TripleComponent::Int(1))]).is_undefined());
        let round = make_round_expression(var("?x"));
        assert_eq!(
            evaluate_with(round.as_ref(), &[("?x", TripleComponent::Double(-2.5))]),
            ExpressionValue::Double(-2.0)
        );
    }

    #[test]
    fn test_date_time_accessors() {
        let date = TripleComponent::typed_literal("2011-01-10T14:45:13.815-05:00", XSD_DATETIME_TYPE);
        let year = make_year_expression(var("?d"));
        assert_eq!(evaluate_with(year.as_ref(), &[("?d", date.clone())]), ExpressionValue::Int(2011));
        let seconds = make_seconds_expression(var("?d"));
        assert_eq!(evaluate_with(seconds.as_ref(), &[("?d", date.clone())]), ExpressionValue::Double(13.815));
        let tz = make_timezone_str_expression(var("?d"));
        assert_eq!(evaluate_with(tz.as_ref(), &[("?d", date)]), ExpressionValue::plain_literal("-05:00"));
        assert!(evaluate_with(year.as_ref(), &[("?d", TripleComponent::literal("2011"))]).is_undefined());
    }

    #[test]
    fn test_functional_forms() {
        let coalesce = make_coalesce_expression(vec![var("?unbound"), var("?x"), int(1)]);
        assert_eq!(evaluate_with(coalesce.as_ref(), &[("?x", TripleComponent::Int(7))]), ExpressionValue::Int(7));
        let bound = make_bound_expression(var("?y"));
        assert_eq!(evaluate_with(bound.as_ref(), &[("?x", TripleComponent::Int(7))]), ExpressionValue::Bool(false));
        let choice = make_if_expression(var("?x"), string("yes"), string("no"));
        assert_eq!(
            evaluate_with(choice.as_ref(), &[("?x", TripleComponent::Bool(false))]),
            ExpressionValue::plain_literal("no")
        );
    }

    #[test]
    fn test_datatype() {
        let datatype = make_datatype_expression(var("?x"));
        assert_eq!(
            evaluate_with(datatype.as_ref(), &[("?x", TripleComponent::Int(3))]),
            ExpressionValue::Iri(XSD_INT_TYPE.to_string())
        );
        assert_eq!(
            evaluate_with(datatype.as_ref(), &[("?x", TripleComponent::literal("a"))]),
            ExpressionValue::Iri(XSD_STRING_TYPE.to_string())
        );
    }
}

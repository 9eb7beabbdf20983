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
use crate::error::{EngineError, Result};
use md5::{Digest, Md5};
use regex::Regex;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

// Functions that preserve the language tag of their first argument.
fn with_language_of(template: &ExpressionValue, value: String) -> ExpressionValue {
    match template {
        ExpressionValue::Literal {
            language: Some(language),
            ..
        } => ExpressionValue::Literal {
            value,
            datatype: None,
            language: Some(language.clone()),
        },
        _ => ExpressionValue::plain_literal(value),
    }
}

fn string_to_string(arguments: &[ExpressionValue], function: fn(&str) -> String) -> ExpressionValue {
    match arguments[0].as_str() {
        Some(s) => with_language_of(&arguments[0], function(s)),
        None => ExpressionValue::Undefined,
    }
}

fn string_pair_test(arguments: &[ExpressionValue], test: fn(&str, &str) -> bool) -> ExpressionValue {
    match (arguments[0].as_str(), arguments[1].as_str()) {
        (Some(a), Some(b)) => ExpressionValue::Bool(test(a, b)),
        _ => ExpressionValue::Undefined,
    }
}

pub fn make_str_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("str", vec![child], |args| {
        args[0]
            .string_value()
            .map_or(ExpressionValue::Undefined, ExpressionValue::plain_literal)
    })
}

/// `STRLEN` counts characters, not bytes.
pub fn make_strlen_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("strlen", vec![child], |args| match args[0].as_str() {
        Some(s) => ExpressionValue::Int(s.chars().count() as i64),
        None => ExpressionValue::Undefined,
    })
}

pub fn make_uppercase_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("ucase", vec![child], |args| string_to_string(args, str::to_uppercase))
}

pub fn make_lowercase_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("lcase", vec![child], |args| string_to_string(args, str::to_lowercase))
}

pub fn make_str_starts_expression(text: Box<dyn SparqlExpression>, prefix: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("strstarts", vec![text, prefix], |args| string_pair_test(args, |a, b| a.starts_with(b)))
}

pub fn make_str_ends_expression(text: Box<dyn SparqlExpression>, suffix: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("strends", vec![text, suffix], |args| string_pair_test(args, |a, b| a.ends_with(b)))
}

pub fn make_contains_expression(text: Box<dyn SparqlExpression>, pattern: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("contains", vec![text, pattern], |args| string_pair_test(args, |a, b| a.contains(b)))
}

/// `STRBEFORE`. If the separator does not occur, the result is the empty
/// plain literal.
pub fn make_str_before_expression(text: Box<dyn SparqlExpression>, separator: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("strbefore", vec![text, separator], |args| match (args[0].as_str(), args[1].as_str()) {
        (Some(a), Some(b)) => match a.find(b) {
            Some(position) => with_language_of(&args[0], a[..position].to_string()),
            None => ExpressionValue::plain_literal(""),
        },
        _ => ExpressionValue::Undefined,
    })
}

pub fn make_str_after_expression(text: Box<dyn SparqlExpression>, separator: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("strafter", vec![text, separator], |args| match (args[0].as_str(), args[1].as_str()) {
        (Some(a), Some(b)) => match a.find(b) {
            Some(position) => with_language_of(&args[0], a[position + b.len()..].to_string()),
            None => ExpressionValue::plain_literal(""),
        },
        _ => ExpressionValue::Undefined,
    })
}

/// `SUBSTR` with 1-based character positions. Without a length, the rest of
/// the string is returned.
pub fn make_substr_expression(
    text: Box<dyn SparqlExpression>,
    start: Box<dyn SparqlExpression>,
    length: Option<Box<dyn SparqlExpression>>,
) -> Box<dyn SparqlExpression> {
    let mut children = vec![text, start];
    children.extend(length);
    nary("substr", children, |args| {
        let (Some(s), Some(start)) = (args[0].as_str(), args[1].as_f64()) else {
            return ExpressionValue::Undefined;
        };
        let start = (start + 0.5).floor();
        let end = match args.get(2) {
            Some(length) => match length.as_f64() {
                Some(length) => start + (length + 0.5).floor(),
                None => return ExpressionValue::Undefined,
            },
            None => f64::INFINITY,
        };
        let result: String = s
            .chars()
            .enumerate()
            .filter(|(i, _)| {
                let position = (*i + 1) as f64;
                position >= start && position < end
            })
            .map(|(_, c)| c)
            .collect();
        with_language_of(&args[0], result)
    })
}

/// Variadic `CONCAT`. Numbers contribute their lexical form.
pub fn make_concat_expression(children: Vec<Box<dyn SparqlExpression>>) -> Box<dyn SparqlExpression> {
    nary("concat", children, |args| {
        let mut result = String::new();
        for argument in args {
            match argument {
                ExpressionValue::Iri(_) | ExpressionValue::BlankNode(_) => return ExpressionValue::Undefined,
                other => match other.string_value() {
                    Some(s) => result.push_str(&s),
                    None => return ExpressionValue::Undefined,
                },
            }
        }
        ExpressionValue::plain_literal(result)
    })
}

fn hash_with<D: Digest>(arguments: &[ExpressionValue]) -> ExpressionValue {
    match arguments[0].as_str() {
        Some(s) => ExpressionValue::plain_literal(hex::encode(D::new().chain_update(s).finalize())),
        None => ExpressionValue::Undefined,
    }
}

pub fn make_md5_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("md5", vec![child], hash_with::<Md5>)
}

pub fn make_sha1_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("sha1", vec![child], hash_with::<Sha1>)
}

pub fn make_sha256_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("sha256", vec![child], hash_with::<Sha256>)
}

pub fn make_sha384_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("sha384", vec![child], hash_with::<Sha384>)
}

pub fn make_sha512_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("sha512", vec![child], hash_with::<Sha512>)
}

/// `REGEX(text, pattern, flags)` with a constant pattern that is compiled once.
#[derive(Debug, Clone)]
pub struct RegexExpression {
    child: Box<dyn SparqlExpression>,
    source: String,
    flags: String,
    regex: Regex,
}

impl RegexExpression {
    pub fn new(child: Box<dyn SparqlExpression>, pattern: &str, flags: &str) -> Result<Self> {
        if let Some(flag) = flags.chars().find(|c| !"imsx".contains(*c)) {
            return Err(EngineError::InvalidInput(format!(
                "unsupported regex flag '{}'",
                flag
            )));
        }
        let full = if flags.is_empty() {
            pattern.to_string()
        } else {
            format!("(?{}){}", flags, pattern)
        };
        let regex = Regex::new(&full).map_err(|err| {
            EngineError::InvalidInput(format!("invalid regex \"{}\": {}", pattern, err))
        })?;
        Ok(RegexExpression {
            child,
            source: pattern.to_string(),
            flags: flags.to_string(),
            regex,
        })
    }
}

impl SparqlExpression for RegexExpression {
    fn evaluate(&self, context: &EvaluationContext<'_>) -> ExpressionValue {
        match self.child.evaluate(context).as_str() {
            Some(s) => ExpressionValue::Bool(self.regex.is_match(s)),
            None => ExpressionValue::Undefined,
        }
    }

    fn cache_key(&self, variable_columns: &VariableToColumnMap) -> String {
        format!(
            "regex({}, \"{}\", \"{}\")",
            self.child.cache_key(variable_columns),
            self.source,
            self.flags
        )
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
}

fn constant_string(expression: &dyn SparqlExpression, what: &str) -> Result<String> {
    let constant = expression
        .as_any()
        .downcast_ref::<LiteralExpression>()
        .map(|l| ExpressionValue::from_component(l.value()));
    match constant.as_ref().and_then(|c| c.as_str()) {
        Some(s) => Ok(s.to_string()),
        None => Err(EngineError::InvalidInput(format!(
            "the {} of REGEX must be a string constant",
            what
        ))),
    }
}

pub fn make_regex_expression(
    text: Box<dyn SparqlExpression>,
    pattern: Box<dyn SparqlExpression>,
    flags: Option<Box<dyn SparqlExpression>>,
) -> Result<Box<dyn SparqlExpression>> {
    let pattern = constant_string(pattern.as_ref(), "pattern")?;
    let flags = match flags {
        Some(flags) => constant_string(flags.as_ref(), "flags")?,
        None => String::new(),
    };
    Ok(Box::new(RegexExpression::new(text, &pattern, &flags)?))
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::*;
    use super::*;

    fn text(value: &str) -> [(&'static str, TripleComponent); 1] {
        [("?s", TripleComponent::literal(value))]
    }

    #[test]
    fn test_string_functions() {
        let upper = make_uppercase_expression(var("?s"));
        assert_eq!(evaluate_with(upper.as_ref(), &text("abc")), ExpressionValue::plain_literal("ABC"));
        let length = make_strlen_expression(var("?s"));
        assert_eq!(evaluate_with(length.as_ref(), &text("fünf")), ExpressionValue::Int(4));
        let before = make_str_before_expression(var("?s"), string("-"));
        assert_eq!(evaluate_with(before.as_ref(), &text("ab-cd")), ExpressionValue::plain_literal("ab"));
        let after = make_str_after_expression(var("?s"), string("x"));
        assert_eq!(evaluate_with(after.as_ref(), &text("ab-cd")), ExpressionValue::plain_literal(""));
        let substring = make_substr_expression(var("?s"), int(2), Some(int(3)));
        assert_eq!(evaluate_with(substring.as_ref(), &text("abcdef")), ExpressionValue::plain_literal("bcd"));
        let starts = make_str_starts_expression(var("?s"), string("ab"));
        assert_eq!(evaluate_with(starts.as_ref(), &text("abc")), ExpressionValue::Bool(true));
    }

    #[test]
    fn test_concat_and_str() {
        let concat = make_concat_expression(vec![var("?s"), string("-"), int(3)]);
        assert_eq!(evaluate_with(concat.as_ref(), &text("a")), ExpressionValue::plain_literal("a-3"));
        let str_of_iri = make_str_expression(var("?i"));
        assert_eq!(
            evaluate_with(str_of_iri.as_ref(), &[("?i", TripleComponent::iri("http://x"))]),
            ExpressionValue::plain_literal("http://x")
        );
    }

    #[test]
    fn test_hashes() {
        let md5 = make_md5_expression(var("?s"));
        assert_eq!(
            evaluate_with(md5.as_ref(), &text("abc")),
            ExpressionValue::plain_literal("900150983cd24fb0d6963f7d28e17f72")
        );
        let sha1 = make_sha1_expression(var("?s"));
        assert_eq!(
            evaluate_with(sha1.as_ref(), &text("abc")),
            ExpressionValue::plain_literal("a9993e364706816aba3e25717850c26c9cd0d89d")
        );
    }

    #[test]
    fn test_regex() {
        let regex = make_regex_expression(var("?s"), string("^ab"), Some(string("i"))).unwrap();
        assert_eq!(evaluate_with(regex.as_ref(), &text("ABC")), ExpressionValue::Bool(true));
        assert_eq!(evaluate_with(regex.as_ref(), &text("cab")), ExpressionValue::Bool(false));
        assert!(make_regex_expression(var("?s"), var("?p"), None).is_err());
        assert!(make_regex_expression(var("?s"), string("("), None).is_err());
    }
}

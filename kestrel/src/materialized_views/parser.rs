/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Parser for the SPARQL subset used to define materialized views.
//!
//! Only the structure of the `WHERE` clause matters for view matching, so
//! `BIND` expressions and `FILTER` conditions are kept as text and property
//! paths are kept opaque.

use crate::error::{EngineError, Result};
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, digit1, multispace1, one_of},
    combinator::{eof, map, not, opt, peek, recognize, value},
    error::{Error, ErrorKind},
    multi::{many0, many1, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use shared::terms::{SparqlTripleSimple, TripleComponent};
use shared::variable::Variable;
use std::collections::BTreeMap;

const RDF_TYPE: &str = "<http://www.w3.org/1999/02/22-rdf-syntax-ns#type>";

/// The predicate position of a triple pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyPath {
    /// A single IRI, with angle brackets.
    Iri(String),
    Variable(Variable),
    /// Any other path, as written.
    Path(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SparqlTriple {
    pub s: TripleComponent,
    pub p: PropertyPath,
    pub o: TripleComponent,
}

impl SparqlTriple {
    pub fn new(s: TripleComponent, p: PropertyPath, o: TripleComponent) -> Self {
        SparqlTriple { s, p, o }
    }

    /// The predicate IRI if the predicate is neither a variable nor a path.
    pub fn get_simple_predicate(&self) -> Option<&str> {
        match &self.p {
            PropertyPath::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    pub fn predicate_variable(&self) -> Option<&Variable> {
        match &self.p {
            PropertyPath::Variable(var) => Some(var),
            _ => None,
        }
    }

    pub fn to_simple(&self) -> Option<SparqlTripleSimple> {
        let p = match &self.p {
            PropertyPath::Iri(iri) => TripleComponent::Iri(iri.clone()),
            PropertyPath::Variable(var) => TripleComponent::Variable(var.clone()),
            PropertyPath::Path(_) => return None,
        };
        Some(SparqlTripleSimple::new(self.s.clone(), p, self.o.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphPatternOperation {
    Basic(Vec<SparqlTriple>),
    Bind { expression: String, target: Variable },
    Values {
        variables: Vec<Variable>,
        rows: Vec<Vec<TripleComponent>>,
    },
    Optional(Vec<GraphPatternOperation>),
    Filter(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectClause {
    All,
    Variables(Vec<Variable>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedViewQuery {
    pub prefixes: BTreeMap<String, String>,
    pub select: SelectClause,
    pub graph_patterns: Vec<GraphPatternOperation>,
}

impl ParsedViewQuery {
    /// The selected variables. For `SELECT *` these are the variables of the
    /// basic graph patterns in order of first occurrence.
    pub fn selected_variables(&self) -> Vec<Variable> {
        match &self.select {
            SelectClause::Variables(variables) => variables.clone(),
            SelectClause::All => {
                let mut variables: Vec<Variable> = Vec::new();
                for pattern in &self.graph_patterns {
                    if let GraphPatternOperation::Basic(triples) = pattern {
                        for triple in triples {
                            let candidates = [triple.s.get_variable(), triple.predicate_variable(), triple.o.get_variable()];
                            for var in candidates.into_iter().flatten() {
                                if !variables.contains(var) {
                                    variables.push(var.clone());
                                }
                            }
                        }
                    }
                }
                variables
            }
        }
    }
}

fn failure(input: &str, kind: ErrorKind) -> nom::Err<Error<&str>> {
    nom::Err::Error(Error::new(input, kind))
}

// Whitespace and comments
fn ws(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            multispace1,
            recognize(pair(char('#'), take_while(|c| c != '\n'))),
        ))),
    )(input)
}

fn name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

// Helper function to recognize identifiers
fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(name_char)(input)
}

// Parser for variables (e.g., ?person or $person)
fn variable(input: &str) -> IResult<&str, Variable> {
    map(
        recognize(pair(one_of("?$"), take_while1(|c: char| c.is_alphanumeric() || c == '_'))),
        Variable::new_unchecked,
    )(input)
}

// Parser for an IRI within angle brackets, brackets included
fn iri_ref(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('<'),
        take_while(|c: char| c != '>' && !c.is_whitespace()),
        char('>'),
    ))(input)
}

// Parser for a prefixed name like ex:worksAt. Dots are allowed inside the
// local part, but not at its end.
fn prefixed_name(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(identifier),
        char(':'),
        opt(pair(identifier, many0(pair(char('.'), identifier)))),
    )))(input)
}

fn blank_node(input: &str) -> IResult<&str, TripleComponent> {
    map(recognize(pair(tag("_:"), identifier)), |label: &str| {
        TripleComponent::BlankNode(label.to_string())
    })(input)
}

// Parser for a quoted literal with an optional language tag or datatype
fn literal(input: &str) -> IResult<&str, TripleComponent> {
    let (input, body) = delimited(char('"'), take_while(|c| c != '"'), char('"'))(input)?;
    let (input, suffix) = opt(alt((
        recognize(pair(tag("^^"), alt((iri_ref, prefixed_name)))),
        recognize(pair(char('@'), take_while1(name_char))),
    )))(input)?;
    Ok((
        input,
        TripleComponent::Literal(format!("\"{}\"{}", body, suffix.unwrap_or(""))),
    ))
}

fn number(input: &str) -> IResult<&str, TripleComponent> {
    let (rest, text) = recognize(tuple((
        opt(one_of("+-")),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)?;
    let component = if text.contains('.') {
        text.parse::<f64>().map(TripleComponent::Double).ok()
    } else {
        text.parse::<i64>().map(TripleComponent::Int).ok()
    };
    match component {
        Some(component) => Ok((rest, component)),
        None => Err(failure(input, ErrorKind::Digit)),
    }
}

fn boolean(input: &str) -> IResult<&str, TripleComponent> {
    terminated(
        alt((
            value(TripleComponent::Bool(true), tag("true")),
            value(TripleComponent::Bool(false), tag("false")),
        )),
        not(peek(take_while1(name_char))),
    )(input)
}

// IRIs keep the raw text of prefixed names until the prefixes are resolved.
fn term(input: &str) -> IResult<&str, TripleComponent> {
    alt((
        map(variable, TripleComponent::Variable),
        map(iri_ref, |iri: &str| TripleComponent::Iri(iri.to_string())),
        literal,
        blank_node,
        number,
        boolean,
        map(prefixed_name, |name: &str| TripleComponent::Iri(name.to_string())),
    ))(input)
}

fn path_primary(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        opt(char('^')),
        pair(
            alt((
                iri_ref,
                prefixed_name,
                recognize(terminated(char('a'), peek(not(take_while1(name_char))))),
                recognize(delimited(char('('), balanced, char(')'))),
            )),
            opt(one_of("*+?")),
        ),
    ))(input)
}

// A predicate: `a`, a variable, an IRI or a property path.
fn verb(input: &str) -> IResult<&str, PropertyPath> {
    if let Ok((rest, var)) = variable(input) {
        return Ok((rest, PropertyPath::Variable(var)));
    }
    let (rest, path) = recognize(pair(
        path_primary,
        many0(pair(one_of("/|"), path_primary)),
    ))(input)?;
    let simple = match path {
        "a" => Some(RDF_TYPE.to_string()),
        _ if iri_ref(path).map_or(false, |(r, _)| r.is_empty()) => Some(path.to_string()),
        _ if prefixed_name(path).map_or(false, |(r, _)| r.is_empty()) => Some(path.to_string()),
        _ => None,
    };
    Ok((
        rest,
        simple.map_or_else(|| PropertyPath::Path(path.to_string()), PropertyPath::Iri),
    ))
}

// Parser for a triple block with `;` and `,` abbreviations
fn triples_same_subject(input: &str) -> IResult<&str, Vec<SparqlTriple>> {
    let (input, subject) = term(input)?;
    let (input, _) = ws(input)?;
    let object_list = separated_list1(tuple((ws, char(','), ws)), term);
    let (input, pairs) = separated_list1(
        tuple((ws, many1(tuple((char(';'), ws))))),
        pair(terminated(verb, ws), object_list),
    )(input)?;
    let (input, _) = opt(tuple((ws, char(';'))))(input)?;
    let triples = pairs
        .into_iter()
        .flat_map(|(p, objects)| {
            let subject = subject.clone();
            objects
                .into_iter()
                .map(move |o| SparqlTriple::new(subject.clone(), p.clone(), o))
        })
        .collect();
    Ok((input, triples))
}

// Everything up to the parenthesis that closes the current nesting level
fn balanced(input: &str) -> IResult<&str, &str> {
    let mut depth = 0usize;
    let mut in_string = false;
    for (i, c) in input.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                if depth == 0 {
                    return Ok((&input[i..], &input[..i]));
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    Err(failure(input, ErrorKind::TakeUntil))
}

fn parenthesized(input: &str) -> IResult<&str, &str> {
    delimited(char('('), balanced, char(')'))(input)
}

// Parser for BIND(<expression> AS ?var)
fn bind(input: &str) -> IResult<&str, GraphPatternOperation> {
    let (rest, content) = preceded(pair(tag_no_case("BIND"), ws), parenthesized)(input)?;
    let upper = content.to_ascii_uppercase();
    let Some(position) = upper.rfind(" AS ") else {
        return Err(failure(input, ErrorKind::Tag));
    };
    let (_, target) = preceded(ws, variable)(&content[position + 4..])
        .map_err(|_: nom::Err<Error<&str>>| failure(input, ErrorKind::Verify))?;
    Ok((
        rest,
        GraphPatternOperation::Bind {
            expression: content[..position].trim().to_string(),
            target,
        },
    ))
}

fn values_term(input: &str) -> IResult<&str, TripleComponent> {
    alt((value(TripleComponent::Undef, tag_no_case("UNDEF")), term))(input)
}

// Parser for the VALUES clause
fn values(input: &str) -> IResult<&str, GraphPatternOperation> {
    let (input, _) = pair(tag_no_case("VALUES"), ws)(input)?;
    if let Ok((input, var)) = variable(input) {
        let (input, rows) = delimited(
            pair(ws, char('{')),
            many0(preceded(ws, values_term)),
            pair(ws, char('}')),
        )(input)?;
        let rows = rows.into_iter().map(|value| vec![value]).collect();
        return Ok((
            input,
            GraphPatternOperation::Values {
                variables: vec![var],
                rows,
            },
        ));
    }
    let (input, variables) =
        delimited(char('('), many1(preceded(ws, variable)), pair(ws, char(')')))(input)?;
    let row = delimited(char('('), many0(preceded(ws, values_term)), pair(ws, char(')')));
    let (input, rows) = delimited(
        pair(ws, char('{')),
        many0(preceded(ws, row)),
        pair(ws, char('}')),
    )(input)?;
    Ok((input, GraphPatternOperation::Values { variables, rows }))
}

fn optional(input: &str) -> IResult<&str, GraphPatternOperation> {
    map(
        preceded(pair(tag_no_case("OPTIONAL"), ws), group_graph_pattern),
        GraphPatternOperation::Optional,
    )(input)
}

// FILTER(...) or FILTER with a function call like FILTER regex(...)
fn filter(input: &str) -> IResult<&str, GraphPatternOperation> {
    let (input, _) = pair(tag_no_case("FILTER"), ws)(input)?;
    let (input, condition) = alt((
        parenthesized,
        recognize(pair(alt((prefixed_name, identifier)), pair(ws, parenthesized))),
    ))(input)?;
    Ok((input, GraphPatternOperation::Filter(condition.trim().to_string())))
}

fn graph_pattern_element(input: &str) -> IResult<&str, GraphPatternOperation> {
    alt((
        bind,
        values,
        optional,
        filter,
        map(triples_same_subject, GraphPatternOperation::Basic),
    ))(input)
}

// Adjacent triple blocks form a single basic graph pattern.
fn merge_basic_patterns(elements: Vec<GraphPatternOperation>) -> Vec<GraphPatternOperation> {
    let mut merged: Vec<GraphPatternOperation> = Vec::new();
    for element in elements {
        match (merged.last_mut(), element) {
            (Some(GraphPatternOperation::Basic(previous)), GraphPatternOperation::Basic(triples)) => {
                previous.extend(triples)
            }
            (_, element) => merged.push(element),
        }
    }
    merged
}

fn group_graph_pattern(input: &str) -> IResult<&str, Vec<GraphPatternOperation>> {
    map(
        delimited(
            pair(char('{'), ws),
            many0(terminated(graph_pattern_element, tuple((ws, opt(char('.')), ws)))),
            char('}'),
        ),
        merge_basic_patterns,
    )(input)
}

fn prefix_declaration(input: &str) -> IResult<&str, (String, String)> {
    let (input, _) = pair(tag_no_case("PREFIX"), ws)(input)?;
    let (input, prefix) = recognize(pair(opt(identifier), char(':')))(input)?;
    let (input, _) = ws(input)?;
    let (input, iri) = iri_ref(input)?;
    Ok((input, (prefix.trim_end_matches(':').to_string(), iri.to_string())))
}

// Projections like (expr AS ?x) bind the variable after AS.
fn projection(input: &str) -> IResult<&str, Variable> {
    if let Ok(result) = variable(input) {
        return Ok(result);
    }
    let (rest, content) = parenthesized(input)?;
    let upper = content.to_ascii_uppercase();
    let position = upper.rfind(" AS ").ok_or_else(|| failure(input, ErrorKind::Tag))?;
    let (_, var) = preceded(ws, variable)(&content[position + 4..])
        .map_err(|_: nom::Err<Error<&str>>| failure(input, ErrorKind::Verify))?;
    Ok((rest, var))
}

fn select_clause(input: &str) -> IResult<&str, SelectClause> {
    let (input, _) = pair(tag_no_case("SELECT"), ws)(input)?;
    let (input, _) = opt(pair(alt((tag_no_case("DISTINCT"), tag_no_case("REDUCED"))), ws))(input)?;
    alt((
        value(SelectClause::All, char('*')),
        map(many1(terminated(projection, ws)), SelectClause::Variables),
    ))(input)
}

fn query(input: &str) -> IResult<&str, (Vec<(String, String)>, SelectClause, Vec<GraphPatternOperation>)> {
    let (input, _) = ws(input)?;
    let (input, prefixes) = many0(terminated(prefix_declaration, ws))(input)?;
    let (input, select) = select_clause(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = opt(pair(tag_no_case("WHERE"), ws))(input)?;
    let (input, patterns) = group_graph_pattern(input)?;
    let (input, _) = pair(ws, eof)(input)?;
    Ok((input, (prefixes, select, patterns)))
}

fn expand_prefixed(name: &str, prefixes: &BTreeMap<String, String>) -> Result<String> {
    let (prefix, local) = name
        .split_once(':')
        .ok_or_else(|| EngineError::Parse(format!("\"{}\" is not a prefixed name", name)))?;
    let iri = prefixes
        .get(prefix)
        .ok_or_else(|| EngineError::Parse(format!("the prefix \"{}:\" is not declared", prefix)))?;
    Ok(format!("{}{}>", iri.trim_end_matches('>'), local))
}

fn resolve(component: TripleComponent, prefixes: &BTreeMap<String, String>) -> Result<TripleComponent> {
    match component {
        TripleComponent::Iri(name) if !name.starts_with('<') => {
            Ok(TripleComponent::Iri(expand_prefixed(&name, prefixes)?))
        }
        TripleComponent::Literal(literal) => match literal.rsplit_once("^^") {
            Some((body, datatype)) if !datatype.starts_with('<') => Ok(TripleComponent::Literal(
                format!("{}^^{}", body, expand_prefixed(datatype, prefixes)?),
            )),
            _ => Ok(TripleComponent::Literal(literal)),
        },
        other => Ok(other),
    }
}

fn resolve_path(path: PropertyPath, prefixes: &BTreeMap<String, String>) -> Result<PropertyPath> {
    match path {
        PropertyPath::Iri(name) if !name.starts_with('<') => {
            Ok(PropertyPath::Iri(expand_prefixed(&name, prefixes)?))
        }
        other => Ok(other),
    }
}

fn resolve_patterns(
    patterns: Vec<GraphPatternOperation>,
    prefixes: &BTreeMap<String, String>,
) -> Result<Vec<GraphPatternOperation>> {
    patterns
        .into_iter()
        .map(|pattern| {
            Ok(match pattern {
                GraphPatternOperation::Basic(triples) => GraphPatternOperation::Basic(
                    triples
                        .into_iter()
                        .map(|t| {
                            Ok(SparqlTriple::new(
                                resolve(t.s, prefixes)?,
                                resolve_path(t.p, prefixes)?,
                                resolve(t.o, prefixes)?,
                            ))
                        })
                        .collect::<Result<Vec<_>>>()?,
                ),
                GraphPatternOperation::Values { variables, rows } => GraphPatternOperation::Values {
                    variables,
                    rows: rows
                        .into_iter()
                        .map(|row| row.into_iter().map(|c| resolve(c, prefixes)).collect())
                        .collect::<Result<Vec<_>>>()?,
                },
                GraphPatternOperation::Optional(inner) => {
                    GraphPatternOperation::Optional(resolve_patterns(inner, prefixes)?)
                }
                other => other,
            })
        })
        .collect()
}

/// Parses a view query. Prefixed names are expanded to full IRIs.
pub fn parse_view_query(input: &str) -> Result<ParsedViewQuery> {
    let (_, (prefixes, select, patterns)) = query(input).map_err(|err| {
        EngineError::Parse(format!("could not parse the view query \"{}\": {}", input.trim(), err))
    })?;
    let prefixes: BTreeMap<String, String> = prefixes.into_iter().collect();
    let graph_patterns = resolve_patterns(patterns, &prefixes)?;
    Ok(ParsedViewQuery {
        prefixes,
        select,
        graph_patterns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> TripleComponent {
        TripleComponent::variable(name)
    }

    #[test]
    fn test_parse_chain() {
        let query = parse_view_query("SELECT * WHERE { ?s <p1> ?m . ?m <p2> ?o }").unwrap();
        assert_eq!(query.select, SelectClause::All);
        assert_eq!(
            query.graph_patterns,
            vec![GraphPatternOperation::Basic(vec![
                SparqlTriple::new(var("?s"), PropertyPath::Iri("<p1>".to_string()), var("?m")),
                SparqlTriple::new(var("?m"), PropertyPath::Iri("<p2>".to_string()), var("?o")),
            ])]
        );
        let selected: Vec<String> = query.selected_variables().iter().map(|v| v.to_string()).collect();
        assert_eq!(selected, vec!["?s", "?m", "?o"]);
    }

    #[test]
    fn test_prefixes_and_abbreviations() {
        let query = parse_view_query(
            "PREFIX ex: <http://example.org/>
             SELECT ?s ?a WHERE {
               ?s a ex:Person ; ex:name ?a , \"x\"^^ex:type .
             }",
        )
        .unwrap();
        let GraphPatternOperation::Basic(triples) = &query.graph_patterns[0] else {
            panic!("expected a basic graph pattern");
        };
        assert_eq!(triples.len(), 3);
        assert_eq!(triples[0].get_simple_predicate(), Some(RDF_TYPE));
        assert_eq!(triples[0].o, TripleComponent::Iri("<http://example.org/Person>".to_string()));
        assert_eq!(triples[1].get_simple_predicate(), Some("<http://example.org/name>"));
        assert_eq!(
            triples[2].o,
            TripleComponent::Literal("\"x\"^^<http://example.org/type>".to_string())
        );
    }

    #[test]
    fn test_other_graph_patterns() {
        let query = parse_view_query(
            "SELECT ?s ?o WHERE {
               ?s <p>/<q>* ?o .
               BIND(STR(?o) AS ?label)
               VALUES ?x { <a> UNDEF }
               OPTIONAL { ?s <r> ?z }
               FILTER(?o > 3)
             }",
        )
        .unwrap();
        assert_eq!(query.graph_patterns.len(), 5);
        let GraphPatternOperation::Basic(triples) = &query.graph_patterns[0] else {
            panic!("expected a basic graph pattern");
        };
        assert_eq!(triples[0].p, PropertyPath::Path("<p>/<q>*".to_string()));
        assert!(triples[0].get_simple_predicate().is_none());
        assert_eq!(
            query.graph_patterns[1],
            GraphPatternOperation::Bind {
                expression: "STR(?o)".to_string(),
                target: Variable::new_unchecked("?label"),
            }
        );
        assert!(matches!(&query.graph_patterns[2], GraphPatternOperation::Values { rows, .. } if rows.len() == 2));
        assert!(matches!(&query.graph_patterns[3], GraphPatternOperation::Optional(inner) if inner.len() == 1));
        assert_eq!(query.graph_patterns[4], GraphPatternOperation::Filter("?o > 3".to_string()));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse_view_query("SELECT * WHERE { ?s ex:p ?o }"), Err(EngineError::Parse(_))));
        assert!(matches!(parse_view_query("SELECT * WHERE { ?s <p> }"), Err(EngineError::Parse(_))));
    }
}

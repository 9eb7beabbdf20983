/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Recognizes the shape of materialized view queries so that matching parts
//! of user queries can be answered from a view instead of the index.
//!
//! Two shapes are known: a simple chain `?s <p1> ?m . ?m <p2> ?o` and a star
//! of triples sharing one subject variable.

use super::parser::{parse_view_query, GraphPatternOperation, ParsedViewQuery, SparqlTriple};
use super::MaterializedView;
use crate::engine::index_scan::IndexScan;
use crate::error::Result;
use log::{debug, info};
use rustc_hash::{FxHashMap, FxHashSet};
use shared::terms::TripleComponent;
use shared::variable::Variable;
use std::collections::BTreeMap;
use std::sync::Arc;

pub type ViewPtr = Arc<MaterializedView>;

/// Mapping from view variables to the variables of the user query.
pub type RequestedColumns = BTreeMap<Variable, Variable>;

/// A view that stores the chain `?subject <p1> ?chain . ?chain <p2> ?object`.
#[derive(Debug, Clone)]
pub struct ChainInfo {
    pub subject: Variable,
    pub chain: Variable,
    pub object: Variable,
    pub view: ViewPtr,
}

/// A view that stores the star `?subject <p_i> ?o_i` for a set of predicates.
#[derive(Debug, Clone)]
pub struct StarInfo {
    pub subject: Variable,
    pub predicates: BTreeMap<String, Variable>,
    pub view: ViewPtr,
}

/// A simple chain in a user query together with the views that store it.
#[derive(Debug, Clone)]
pub struct UserQueryChain {
    /// A variable or a fixed IRI or literal.
    pub subject: TripleComponent,
    pub chain: Variable,
    pub object: Variable,
    pub chain_infos: Arc<Vec<ChainInfo>>,
}

/// A star in a user query that can be read from `view`. Triples of the star
/// that the view does not cover are left in `remaining_triples`.
#[derive(Debug, Clone)]
pub struct UserQueryStar {
    pub view: ViewPtr,
    pub requested_columns: RequestedColumns,
    pub remaining_triples: Vec<SparqlTriple>,
}

#[derive(Debug, Default)]
pub struct QueryPatternCache {
    simple_chain_cache: FxHashMap<(String, String), Arc<Vec<ChainInfo>>>,
    star_cache: Vec<StarInfo>,
    predicate_in_view: FxHashMap<String, Vec<ViewPtr>>,
}

fn variables_of_basic_patterns(patterns: &[GraphPatternOperation]) -> FxHashSet<Variable> {
    let mut variables = FxHashSet::default();
    for pattern in patterns {
        if let GraphPatternOperation::Basic(triples) = pattern {
            for triple in triples {
                variables.extend(triple.s.get_variable().cloned());
                variables.extend(triple.predicate_variable().cloned());
                variables.extend(triple.o.get_variable().cloned());
            }
        }
    }
    variables
}

// A graph pattern next to the basic graph pattern that can not change its
// rows. OPTIONAL and FILTER can, so are never invariant.
fn is_invariant(pattern: &GraphPatternOperation, basic_variables: &FxHashSet<Variable>) -> bool {
    match pattern {
        GraphPatternOperation::Basic(_) => true,
        GraphPatternOperation::Bind { target, .. } => !basic_variables.contains(target),
        GraphPatternOperation::Values { variables, .. } => {
            variables.iter().all(|var| !basic_variables.contains(var))
        }
        GraphPatternOperation::Optional(_) | GraphPatternOperation::Filter(_) => false,
    }
}

fn predicate_and_variables(triple: &SparqlTriple) -> Option<(&str, &Variable, &Variable)> {
    Some((
        triple.get_simple_predicate()?,
        triple.s.get_variable()?,
        triple.o.get_variable()?,
    ))
}

impl QueryPatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the query of `view` and registers every shape it has. Returns
    /// whether at least one shape was found.
    pub fn analyze_view(&mut self, view: ViewPtr) -> Result<bool> {
        let Some(query) = view.original_query() else {
            debug!("Materialized view {} has no query, no patterns to analyze", view.name());
            return Ok(false);
        };
        let parsed = parse_view_query(query)?;
        let Some(triples) = Self::single_basic_pattern(&parsed) else {
            debug!("The query of materialized view {} is not a plain basic graph pattern", view.name());
            return Ok(false);
        };

        let mut found = false;
        if triples.len() == 2 {
            found |= self.analyze_simple_chain(&view, &triples[0], &triples[1]);
            found |= self.analyze_simple_chain(&view, &triples[1], &triples[0]);
        }
        found |= self.analyze_star(&view, &triples);
        if !found {
            debug!("No supported pattern in the query of materialized view {}", view.name());
            return Ok(false);
        }

        for triple in &triples {
            if let Some(predicate) = triple.get_simple_predicate() {
                let views = self.predicate_in_view.entry(predicate.to_string()).or_default();
                if !views.iter().any(|v| Arc::ptr_eq(v, &view)) {
                    views.push(Arc::clone(&view));
                }
            }
        }
        info!("Registered the patterns of materialized view {}", view.name());
        Ok(true)
    }

    // The triples of the only basic graph pattern, if all other patterns are
    // invariant with respect to it.
    fn single_basic_pattern(parsed: &ParsedViewQuery) -> Option<Vec<SparqlTriple>> {
        let basic_variables = variables_of_basic_patterns(&parsed.graph_patterns);
        let mut basic = None;
        for pattern in &parsed.graph_patterns {
            if !is_invariant(pattern, &basic_variables) {
                return None;
            }
            if let GraphPatternOperation::Basic(triples) = pattern {
                if basic.is_some() {
                    return None;
                }
                basic = Some(triples.clone());
            }
        }
        basic
    }

    /// Registers `view` under the predicate pair of `a` and `b` if the two
    /// triples form the chain `?s <p1> ?m . ?m <p2> ?o` with three distinct
    /// variables that are all columns of the view.
    fn analyze_simple_chain(&mut self, view: &ViewPtr, a: &SparqlTriple, b: &SparqlTriple) -> bool {
        let (Some((p1, subject, chain)), Some((p2, chain_again, object))) =
            (predicate_and_variables(a), predicate_and_variables(b))
        else {
            return false;
        };
        if chain != chain_again || subject == chain || subject == object || chain == object {
            return false;
        }
        if [subject, chain, object].iter().any(|var| view.column_of(var).is_none()) {
            return false;
        }
        let info = ChainInfo {
            subject: subject.clone(),
            chain: chain.clone(),
            object: object.clone(),
            view: Arc::clone(view),
        };
        let entry = self
            .simple_chain_cache
            .entry((p1.to_string(), p2.to_string()))
            .or_insert_with(|| Arc::new(Vec::new()));
        Arc::make_mut(entry).push(info);
        true
    }

    /// Registers `view` as a star if all triples share one subject variable
    /// and have distinct IRI predicates and distinct object variables.
    fn analyze_star(&mut self, view: &ViewPtr, triples: &[SparqlTriple]) -> bool {
        if triples.len() < 2 {
            return false;
        }
        let Some((_, subject, _)) = predicate_and_variables(&triples[0]) else {
            return false;
        };
        let mut predicates = BTreeMap::new();
        let mut objects = FxHashSet::default();
        for triple in triples {
            let Some((predicate, s, o)) = predicate_and_variables(triple) else {
                return false;
            };
            if s != subject || o == subject || !objects.insert(o.clone()) {
                return false;
            }
            if predicates.insert(predicate.to_string(), o.clone()).is_some() {
                return false;
            }
        }
        if view.column_of(subject).is_none() || objects.iter().any(|o| view.column_of(o).is_none()) {
            return false;
        }
        self.star_cache.push(StarInfo {
            subject: subject.clone(),
            predicates,
            view: Arc::clone(view),
        });
        true
    }

    /// The views whose query uses the predicate `iri`.
    pub fn views_with_predicate(&self, iri: &str) -> &[ViewPtr] {
        self.predicate_in_view.get(iri).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Checks whether two index scans form a chain `<s> <p1> ?m . ?m <p2> ?o`
    /// that a registered view stores.
    pub fn check_simple_chain(&self, left: &IndexScan, right: &IndexScan) -> Option<UserQueryChain> {
        let (TripleComponent::Iri(p1), TripleComponent::Iri(p2)) = (left.predicate(), right.predicate()) else {
            return None;
        };
        let chain = left.object().get_variable()?;
        if right.subject().get_variable() != Some(chain) {
            return None;
        }
        let object = right.object().get_variable()?;
        let subject = left.subject();
        if object == chain || subject.get_variable().map_or(false, |s| s == chain || s == object) {
            return None;
        }
        let chain_infos = self.simple_chain_cache.get(&(p1.clone(), p2.clone()))?;
        Some(UserQueryChain {
            subject: subject.clone(),
            chain: chain.clone(),
            object: object.clone(),
            chain_infos: Arc::clone(chain_infos),
        })
    }

    /// Finds the registered star view that covers the most triples of a star
    /// in `triples`. Ties are broken by registration order.
    pub fn check_star(&self, triples: &[SparqlTriple]) -> Option<UserQueryStar> {
        // subject -> predicate -> (object, triple position)
        let mut user_stars: BTreeMap<&Variable, BTreeMap<&str, (&Variable, usize)>> = BTreeMap::new();
        let mut used_objects: FxHashSet<(&Variable, &Variable)> = FxHashSet::default();
        for (position, triple) in triples.iter().enumerate() {
            let Some((predicate, subject, object)) = predicate_and_variables(triple) else {
                continue;
            };
            let star = user_stars.entry(subject).or_default();
            // A second edge with the same predicate or object is left to the
            // remaining triples.
            if subject == object || star.contains_key(predicate) || used_objects.contains(&(subject, object)) {
                continue;
            }
            used_objects.insert((subject, object));
            star.insert(predicate, (object, position));
        }

        let mut best: Option<(usize, &StarInfo, &Variable)> = None;
        for star in &self.star_cache {
            for (subject, user_predicates) in &user_stars {
                let covered = star.predicates.keys().all(|p| user_predicates.contains_key(p.as_str()));
                if covered && best.map_or(true, |(size, _, _)| star.predicates.len() > size) {
                    best = Some((star.predicates.len(), star, *subject));
                }
            }
        }
        let (_, star, subject) = best?;

        let user_predicates = &user_stars[subject];
        let mut requested_columns = RequestedColumns::new();
        requested_columns.insert(star.subject.clone(), subject.clone());
        let mut covered_positions = FxHashSet::default();
        for (predicate, view_object) in &star.predicates {
            let (user_object, position) = user_predicates[predicate.as_str()];
            requested_columns.insert(view_object.clone(), user_object.clone());
            covered_positions.insert(position);
        }
        let remaining_triples = triples
            .iter()
            .enumerate()
            .filter(|(position, _)| !covered_positions.contains(position))
            .map(|(_, triple)| triple.clone())
            .collect();
        Some(UserQueryStar {
            view: Arc::clone(&star.view),
            requested_columns,
            remaining_triples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::PropertyPath;
    use super::*;
    use crate::engine::test_helpers::*;
    use crate::id_table::IdTable;
    use shared::terms::SparqlTripleSimple;
    use shared::triple::Permutation;

    fn view(name: &str, query: &str, columns: &[&str]) -> ViewPtr {
        let columns: Vec<Variable> = columns.iter().map(|c| var(c)).collect();
        let table = IdTable::new(columns.len());
        Arc::new(MaterializedView::new(name, Some(query.to_string()), columns, table).unwrap())
    }

    fn scan(s: TripleComponent, p: &str, o: TripleComponent) -> IndexScan {
        IndexScan::new(
            small_context(),
            Permutation::PSO,
            SparqlTripleSimple::new(s, TripleComponent::iri(p), o),
        )
        .unwrap()
    }

    #[test]
    fn test_simple_chain() {
        let mut cache = QueryPatternCache::new();
        let chain_view = view(
            "chain",
            "SELECT * WHERE { ?s <p> ?m . ?m <q> ?o }",
            &["?s", "?m", "?o"],
        );
        assert!(cache.analyze_view(chain_view).unwrap());
        assert_eq!(cache.views_with_predicate("<p>").len(), 1);

        let left = scan(TripleComponent::variable("?x"), "p", TripleComponent::variable("?y"));
        let right = scan(TripleComponent::variable("?y"), "q", TripleComponent::variable("?z"));
        let chain = cache.check_simple_chain(&left, &right).unwrap();
        assert_eq!(chain.subject, TripleComponent::variable("?x"));
        assert_eq!(chain.chain, var("?y"));
        assert_eq!(chain.object, var("?z"));
        assert_eq!(chain.chain_infos.len(), 1);
        assert_eq!(chain.chain_infos[0].subject, var("?s"));

        assert!(cache.check_simple_chain(&right, &left).is_none());
        let unrelated = scan(TripleComponent::variable("?y"), "p", TripleComponent::variable("?z"));
        assert!(cache.check_simple_chain(&left, &unrelated).is_none());
    }

    #[test]
    fn test_variant_patterns_are_not_analyzed() {
        let mut cache = QueryPatternCache::new();
        let optional = view(
            "optional",
            "SELECT * WHERE { ?s <p> ?m . ?m <q> ?o OPTIONAL { ?o <r> ?z } }",
            &["?s", "?m", "?o"],
        );
        assert!(!cache.analyze_view(optional).unwrap());

        let overwriting_bind = view(
            "bind",
            "SELECT * WHERE { ?s <p> ?m . ?m <q> ?o . BIND(1 AS ?m) }",
            &["?s", "?m", "?o"],
        );
        assert!(!cache.analyze_view(overwriting_bind).unwrap());

        let invariant_bind = view(
            "bind2",
            "SELECT * WHERE { ?s <p> ?m . ?m <q> ?o . BIND(1 AS ?k) VALUES ?v { 1 2 } }",
            &["?s", "?m", "?o"],
        );
        assert!(cache.analyze_view(invariant_bind).unwrap());

        let missing_column = view("missing", "SELECT ?s ?o WHERE { ?s <p> ?m . ?m <q> ?o }", &["?s", "?o"]);
        assert!(!cache.analyze_view(missing_column).unwrap());
    }

    #[test]
    fn test_star() {
        let mut cache = QueryPatternCache::new();
        let star_view = view(
            "star",
            "SELECT * WHERE { ?s <name> ?n ; <age> ?a }",
            &["?s", "?n", "?a"],
        );
        assert!(cache.analyze_view(star_view).unwrap());

        let triple = |s: &str, p: &str, o: &str| {
            SparqlTriple::new(
                TripleComponent::variable(s),
                PropertyPath::Iri(p.to_string()),
                TripleComponent::variable(o),
            )
        };
        let user = vec![
            triple("?x", "<age>", "?y"),
            triple("?x", "<email>", "?e"),
            triple("?x", "<name>", "?z"),
        ];
        let star = cache.check_star(&user).unwrap();
        assert_eq!(star.view.name(), "star");
        assert_eq!(star.requested_columns[&var("?s")], var("?x"));
        assert_eq!(star.requested_columns[&var("?n")], var("?z"));
        assert_eq!(star.requested_columns[&var("?a")], var("?y"));
        assert_eq!(star.remaining_triples, vec![triple("?x", "<email>", "?e")]);

        assert!(cache.check_star(&user[..2]).is_none());
    }
}

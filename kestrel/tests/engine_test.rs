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
use kestrel::engine::index_scan::IndexScan;
use kestrel::engine::join::Join;
use kestrel::engine::transitive_path::{TransitivePath, TransitivePathSide, TransitivePathStrategy};
use kestrel::engine::{Operation, QueryExecutionContext, QueryExecutionTree};
use kestrel::export::construct_triples;
use kestrel::index::{Index, IndexBuilder};
use kestrel::materialized_views::MaterializedViewsManager;
use shared::id::Id;
use shared::terms::{SparqlTripleSimple, TripleComponent};
use shared::triple::Permutation;
use shared::variable::Variable;
use std::collections::BTreeSet;
use std::sync::Arc;

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Variable {
        Variable::new_unchecked(name)
    }

    // Two complete chains a -p1-> b -p2-> c and x -p1-> y -p2-> z and a
    // dangling edge b -p1-> q.
    fn chain_index() -> QueryExecutionContext {
        let index = IndexBuilder::new()
            .block_size(2)
            .add_iri_triple("a", "p1", TripleComponent::iri("b"))
            .add_iri_triple("b", "p2", TripleComponent::iri("c"))
            .add_iri_triple("x", "p1", TripleComponent::iri("y"))
            .add_iri_triple("y", "p2", TripleComponent::iri("z"))
            .add_iri_triple("b", "p1", TripleComponent::iri("q"))
            .build()
            .unwrap();
        QueryExecutionContext::new(Arc::new(index))
    }

    fn id(index: &Index, iri: &str) -> Id {
        index.id_for(&TripleComponent::iri(iri)).unwrap()
    }

    fn scan(context: &QueryExecutionContext, s: &str, p: &str, o: &str) -> IndexScan {
        IndexScan::new(
            context.clone(),
            Permutation::PSO,
            SparqlTripleSimple::new(TripleComponent::variable(s), TripleComponent::iri(p), TripleComponent::variable(o)),
        )
        .unwrap()
    }

    // The rows of `tree` as values of `variables`.
    fn bindings(tree: &QueryExecutionTree, variables: &[&str]) -> BTreeSet<Vec<Id>> {
        let columns: Vec<usize> = variables.iter().map(|v| tree.variable_column(&var(v)).unwrap()).collect();
        let table = tree.collect_table().unwrap().table;
        table.rows().map(|row| columns.iter().map(|c| row[*c]).collect()).collect()
    }

    #[test]
    fn test_chain_view_replaces_join() {
        let context = chain_index();
        let dir = tempfile::tempdir().unwrap();
        let query = "SELECT * WHERE { ?s <p1> ?m . ?m <p2> ?o }";
        let join = QueryExecutionTree::new(
            Join::new(
                QueryExecutionTree::new(scan(&context, "?s", "p1", "?m")),
                QueryExecutionTree::new(scan(&context, "?m", "p2", "?o")),
                1,
                0,
            )
            .unwrap(),
        );

        let mut manager = MaterializedViewsManager::new(dir.path());
        let view = manager.write_view("chain", query, &join).unwrap();
        assert_eq!(view.num_rows(), 2);

        let left = scan(&context, "?u", "p1", "?v");
        let right = scan(&context, "?v", "p2", "?w");
        let chain = manager.pattern_cache().check_simple_chain(&left, &right).unwrap();
        assert_eq!(chain.subject, TripleComponent::variable("?u"));
        assert_eq!(chain.chain, var("?v"));
        assert_eq!(chain.object, var("?w"));
        assert_eq!(chain.chain_infos.len(), 1);
        assert_eq!(chain.chain_infos[0].view.name(), "chain");
        assert!(manager.pattern_cache().check_simple_chain(&right, &left).is_none());

        let rewritten = manager.rewrite_chain(&context, &left, &right).unwrap().unwrap();
        let index = context.index();
        let expected: BTreeSet<Vec<Id>> = [
            vec![id(index, "a"), id(index, "b"), id(index, "c")],
            vec![id(index, "x"), id(index, "y"), id(index, "z")],
        ]
        .into_iter()
        .collect();
        assert_eq!(bindings(&rewritten, &["?u", "?v", "?w"]), expected);
        assert_eq!(bindings(&join, &["?s", "?m", "?o"]), expected);

        // A second manager finds the view on disk.
        let mut reloaded = MaterializedViewsManager::new(dir.path());
        assert_eq!(reloaded.load_all().unwrap(), 1);
        assert_eq!(reloaded.load_all().unwrap(), 0);
        let fixed_subject = IndexScan::new(
            context.clone(),
            Permutation::PSO,
            SparqlTripleSimple::new(TripleComponent::iri("x"), TripleComponent::iri("p1"), TripleComponent::variable("?v")),
        )
        .unwrap();
        let restricted = reloaded.rewrite_chain(&context, &fixed_subject, &right).unwrap().unwrap();
        assert_eq!(
            bindings(&restricted, &["?v", "?w"]),
            [vec![id(index, "y"), id(index, "z")]].into_iter().collect()
        );
    }

    #[test]
    fn test_transitive_path_between_distinct_constants() {
        let context = chain_index();
        for strategy in [TransitivePathStrategy::HashMap, TransitivePathStrategy::BinSearch] {
            let path = TransitivePath::with_strategy(
                context.clone(),
                QueryExecutionTree::new(scan(&context, "?_s", "p1", "?_o")),
                TransitivePathSide::new(TripleComponent::iri("a"), 0),
                TransitivePathSide::new(TripleComponent::iri("q"), 1),
                0,
                usize::MAX,
                strategy,
            )
            .unwrap();
            assert_eq!(path.min_dist(), 1);
            assert!(path.cache_key().contains("minDist 1"));
            let table = QueryExecutionTree::new(path).collect_table().unwrap().table;
            let index = context.index();
            assert_eq!(table.to_rows(), vec![vec![id(index, "a"), id(index, "q")]]);
        }
    }

    #[test]
    fn test_construct_from_join() {
        let context = chain_index();
        let join = QueryExecutionTree::new(
            Join::new(
                QueryExecutionTree::new(scan(&context, "?s", "p1", "?m")),
                QueryExecutionTree::new(scan(&context, "?m", "p2", "?o")),
                1,
                0,
            )
            .unwrap(),
        );
        let template = vec![SparqlTripleSimple::new(
            TripleComponent::variable("?s"),
            TripleComponent::iri("reaches"),
            TripleComponent::variable("?o"),
        )];
        let result = join.collect_table().unwrap();
        let triples: BTreeSet<[String; 3]> =
            construct_triples(&template, &result, &join.variable_columns(), context.index(), 0)
                .into_iter()
                .collect();
        let triple = |s: &str, o: &str| [s.to_string(), "<reaches>".to_string(), o.to_string()];
        assert_eq!(triples, [triple("<a>", "<c>"), triple("<x>", "<z>")].into_iter().collect());
    }

    #[test]
    fn test_score_variables() {
        let x = Variable::new("$x").unwrap();
        assert_eq!(x.name(), "?x");
        assert_eq!(x.word_score_variable("hello", false).name(), "?ql_score_word_x_hello");
        assert_eq!(x.word_score_variable("ice-cream", false).name(), "?ql_score_word_x_ice_45_cream");
        assert_ne!(
            x.word_score_variable("hello", false),
            x.word_score_variable("hello*", true)
        );
    }
}

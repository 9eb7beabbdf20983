/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Materialized views: precomputed query results stored next to the index.
//!
//! A view named `name` consists of two files in the view directory:
//!
//! ```text
//! <name>.view-info.json   name, query, column variables, row count (JSON)
//! <name>.view-data        u64 version, then the Ids row by row (little endian)
//! ```
//!
//! The rows are sorted lexicographically on all columns.

pub mod parser;
pub mod query_analysis;

use crate::engine::index_scan::IndexScan;
use crate::engine::materialized_view_scan::MaterializedViewScan;
use crate::engine::{variables_by_column, QueryExecutionContext, QueryExecutionTree};
use crate::error::{EngineError, Result};
use crate::id_table::IdTable;
use log::{debug, info, warn};
use query_analysis::{QueryPatternCache, RequestedColumns, UserQueryChain, UserQueryStar, ViewPtr};
use serde::{Deserialize, Serialize};
use shared::id::{Datatype, Id};
use shared::variable::Variable;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const VIEW_FORMAT_VERSION: u64 = 1;
const VIEW_INFO_SUFFIX: &str = ".view-info.json";
const VIEW_DATA_SUFFIX: &str = ".view-data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ViewInfo {
    name: String,
    query: Option<String>,
    columns: Vec<Variable>,
    num_rows: u64,
}

fn check_view_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(EngineError::InvalidInput(format!(
            "\"{}\" is not a valid view name, only letters, digits, '_' and '-' are allowed",
            name
        )));
    }
    Ok(())
}

pub fn view_info_filename(directory: &Path, name: &str) -> PathBuf {
    directory.join(format!("{}{}", name, VIEW_INFO_SUFFIX))
}

pub fn view_data_filename(directory: &Path, name: &str) -> PathBuf {
    directory.join(format!("{}{}", name, VIEW_DATA_SUFFIX))
}

#[derive(Debug)]
pub struct MaterializedView {
    name: String,
    original_query: Option<String>,
    columns: Vec<Variable>,
    table: IdTable,
}

impl MaterializedView {
    /// Creates a view from a table whose columns are bound to `columns`.
    /// The rows are sorted.
    pub fn new(
        name: &str,
        original_query: Option<String>,
        columns: Vec<Variable>,
        mut table: IdTable,
    ) -> Result<Self> {
        check_view_name(name)?;
        if columns.len() != table.num_columns() {
            return Err(EngineError::InvalidInput(format!(
                "view {} has {} column variables for a table with {} columns",
                name,
                columns.len(),
                table.num_columns()
            )));
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].contains(column) {
                return Err(EngineError::InvalidInput(format!(
                    "the variable {} is used for two columns of view {}",
                    column, name
                )));
            }
        }
        let all_columns: Vec<usize> = (0..table.num_columns()).collect();
        if !table.is_sorted_by_columns(&all_columns) {
            table.sort_by_columns(&all_columns);
        }
        Ok(MaterializedView {
            name: name.to_string(),
            original_query,
            columns,
            table,
        })
    }

    /// Materializes the result of `tree`. Every column must be bound to a
    /// variable and results that need a local vocabulary can not be stored.
    pub fn from_query_result(name: &str, query: Option<String>, tree: &QueryExecutionTree) -> Result<Self> {
        let columns = variables_by_column(&tree.variable_columns());
        if columns.len() != tree.result_width() {
            return Err(EngineError::InvalidInput(format!(
                "every column of the result of view {} must be bound to a variable",
                name
            )));
        }
        let result = tree.collect_table()?;
        if result.table.rows().flatten().any(|id| id.datatype() == Datatype::LocalVocabIndex) {
            return Err(EngineError::InvalidInput(format!(
                "the result of view {} contains values that are not part of the index",
                name
            )));
        }
        Self::new(name, query, columns, result.table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn original_query(&self) -> Option<&str> {
        self.original_query.as_deref()
    }

    pub fn columns(&self) -> &[Variable] {
        &self.columns
    }

    pub fn column_of(&self, variable: &Variable) -> Option<usize> {
        self.columns.iter().position(|column| column == variable)
    }

    pub fn table(&self) -> &IdTable {
        &self.table
    }

    pub fn num_rows(&self) -> usize {
        self.table.num_rows()
    }

    pub fn write(&self, directory: &Path) -> Result<()> {
        let info = ViewInfo {
            name: self.name.clone(),
            query: self.original_query.clone(),
            columns: self.columns.clone(),
            num_rows: self.table.num_rows() as u64,
        };
        let info_file = File::create(view_info_filename(directory, &self.name))?;
        serde_json::to_writer_pretty(BufWriter::new(info_file), &info)?;

        let mut data = BufWriter::new(File::create(view_data_filename(directory, &self.name))?);
        data.write_all(&VIEW_FORMAT_VERSION.to_le_bytes())?;
        for id in self.table.rows().flatten() {
            data.write_all(&id.bits().to_le_bytes())?;
        }
        data.flush()?;
        debug!("Wrote materialized view {} with {} rows", self.name, self.table.num_rows());
        Ok(())
    }

    pub fn load(directory: &Path, name: &str) -> Result<Self> {
        check_view_name(name)?;
        let info_file = File::open(view_info_filename(directory, name))?;
        let info: ViewInfo = serde_json::from_reader(BufReader::new(info_file))?;
        if info.name != name {
            return Err(EngineError::IncompatibleFormat(format!(
                "the view info of {} belongs to a view named {}",
                name, info.name
            )));
        }

        let data_path = view_data_filename(directory, name);
        let mut data = BufReader::new(File::open(&data_path)?);
        let mut word = [0u8; 8];
        data.read_exact(&mut word)?;
        let version = u64::from_le_bytes(word);
        if version != VIEW_FORMAT_VERSION {
            return Err(EngineError::IncompatibleFormat(format!(
                "The materialized view {} has format version {}, which is incompatible with \
                 version {} as required by this version of kestrel. Please rewrite the view.",
                data_path.display(),
                version,
                VIEW_FORMAT_VERSION
            )));
        }
        let width = info.columns.len();
        let mut table = IdTable::new(width);
        let mut row = vec![Id::make_undefined(); width];
        for _ in 0..info.num_rows {
            for id in row.iter_mut() {
                data.read_exact(&mut word)?;
                *id = Id::from_bits(u64::from_le_bytes(word));
            }
            table.push_row(&row);
        }
        if data.read(&mut word)? != 0 {
            return Err(EngineError::IncompatibleFormat(format!(
                "{} is longer than the {} rows announced in its view info",
                data_path.display(),
                info.num_rows
            )));
        }
        Self::new(name, info.query, info.columns, table)
    }
}

/// Holds the loaded views of one index and matches query patterns to them.
#[derive(Debug)]
pub struct MaterializedViewsManager {
    directory: PathBuf,
    views: BTreeMap<String, ViewPtr>,
    pattern_cache: QueryPatternCache,
}

impl MaterializedViewsManager {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        MaterializedViewsManager {
            directory: directory.into(),
            views: BTreeMap::new(),
            pattern_cache: QueryPatternCache::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Registers a view in memory and analyzes its query. A query that can
    /// not be parsed only disables the pattern matching for this view.
    pub fn add_view(&mut self, view: MaterializedView) -> ViewPtr {
        let view = Arc::new(view);
        if let Err(err) = self.pattern_cache.analyze_view(Arc::clone(&view)) {
            warn!("The query of materialized view {} could not be analyzed: {}", view.name(), err);
        }
        info!("Loaded materialized view {} with {} rows", view.name(), view.num_rows());
        self.views.insert(view.name().to_string(), Arc::clone(&view));
        view
    }

    /// Computes `tree`, writes the result as a view and registers it.
    pub fn write_view(&mut self, name: &str, query: &str, tree: &QueryExecutionTree) -> Result<ViewPtr> {
        let view = MaterializedView::from_query_result(name, Some(query.to_string()), tree)?;
        view.write(&self.directory)?;
        Ok(self.add_view(view))
    }

    pub fn load_view(&mut self, name: &str) -> Result<ViewPtr> {
        if let Some(view) = self.views.get(name) {
            return Ok(Arc::clone(view));
        }
        let view = MaterializedView::load(&self.directory, name)?;
        Ok(self.add_view(view))
    }

    /// Loads every view in the view directory. Returns the number of views
    /// that were not loaded before.
    pub fn load_all(&mut self) -> Result<usize> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let file_name = entry?.file_name();
            if let Some(name) = file_name.to_str().and_then(|f| f.strip_suffix(VIEW_INFO_SUFFIX)) {
                if !self.views.contains_key(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        for name in &names {
            self.load_view(name)?;
        }
        Ok(names.len())
    }

    pub fn get_view(&self, name: &str) -> Option<ViewPtr> {
        self.views.get(name).cloned()
    }

    pub fn pattern_cache(&self) -> &QueryPatternCache {
        &self.pattern_cache
    }

    /// A scan of the first view that stores `chain`, with the columns bound to
    /// the variables of the user query.
    pub fn make_chain_scan(
        &self,
        context: &QueryExecutionContext,
        chain: &UserQueryChain,
    ) -> Result<Option<QueryExecutionTree>> {
        let Some(info) = chain.chain_infos.first() else {
            return Ok(None);
        };
        let mut requested = RequestedColumns::new();
        let mut restriction = None;
        match chain.subject.get_variable() {
            Some(subject) => {
                requested.insert(info.subject.clone(), subject.clone());
            }
            None => restriction = Some((info.subject.clone(), chain.subject.clone())),
        }
        requested.insert(info.chain.clone(), chain.chain.clone());
        requested.insert(info.object.clone(), chain.object.clone());
        let scan = MaterializedViewScan::new(context.clone(), Arc::clone(&info.view), &requested, restriction)?;
        Ok(Some(QueryExecutionTree::new(scan)))
    }

    pub fn make_star_scan(&self, context: &QueryExecutionContext, star: &UserQueryStar) -> Result<QueryExecutionTree> {
        let scan = MaterializedViewScan::new(context.clone(), Arc::clone(&star.view), &star.requested_columns, None)?;
        Ok(QueryExecutionTree::new(scan))
    }

    /// Replaces the join of two index scans by a view scan if they form a
    /// chain that a view stores.
    pub fn rewrite_chain(
        &self,
        context: &QueryExecutionContext,
        left: &IndexScan,
        right: &IndexScan,
    ) -> Result<Option<QueryExecutionTree>> {
        match self.pattern_cache.check_simple_chain(left, right) {
            Some(chain) => self.make_chain_scan(context, &chain),
            None => Ok(None),
        }
    }
}

/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Process-wide parameters that can be changed while the engine is running.
//!
//! Reads are single atomic loads. Writes go through a mutex so that bulk
//! updates from JSON are applied as a unit.

use log::info;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;

pub const USE_BINSEARCH_TRANSITIVE_PATH: &str = "use-binsearch-transitive-path";
pub const ENABLE_PREFILTER_ON_INDEX_SCANS: &str = "enable-prefilter-on-index-scans";

const DEFAULT_USE_BINSEARCH_TRANSITIVE_PATH: bool = true;
const DEFAULT_ENABLE_PREFILTER_ON_INDEX_SCANS: bool = true;

#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("no runtime parameter named \"{0}\"")]
    Unknown(String),
    #[error("invalid value \"{value}\" for runtime parameter \"{name}\"")]
    InvalidValue { name: String, value: String },
    #[error("runtime parameters must be given as a JSON object")]
    NotAnObject,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub struct RuntimeParameters {
    use_binsearch_transitive_path: AtomicBool,
    enable_prefilter_on_index_scans: AtomicBool,
    write_lock: Mutex<()>,
}

pub static RUNTIME_PARAMETERS: RuntimeParameters = RuntimeParameters::new();

/// The registry consulted by the planner and the operators.
pub fn runtime_parameters() -> &'static RuntimeParameters {
    &RUNTIME_PARAMETERS
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ParameterError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ParameterError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

impl RuntimeParameters {
    const fn new() -> Self {
        RuntimeParameters {
            use_binsearch_transitive_path: AtomicBool::new(DEFAULT_USE_BINSEARCH_TRANSITIVE_PATH),
            enable_prefilter_on_index_scans: AtomicBool::new(
                DEFAULT_ENABLE_PREFILTER_ON_INDEX_SCANS,
            ),
            write_lock: Mutex::new(()),
        }
    }

    pub fn use_binsearch_transitive_path(&self) -> bool {
        self.use_binsearch_transitive_path.load(Ordering::Acquire)
    }

    pub fn enable_prefilter_on_index_scans(&self) -> bool {
        self.enable_prefilter_on_index_scans.load(Ordering::Acquire)
    }

    fn flag(&self, name: &str) -> Result<&AtomicBool, ParameterError> {
        match name {
            USE_BINSEARCH_TRANSITIVE_PATH => Ok(&self.use_binsearch_transitive_path),
            ENABLE_PREFILTER_ON_INDEX_SCANS => Ok(&self.enable_prefilter_on_index_scans),
            _ => Err(ParameterError::Unknown(name.to_string())),
        }
    }

    /// Sets a parameter from its string representation.
    pub fn set(&self, name: &str, value: &str) -> Result<(), ParameterError> {
        let flag = self.flag(name)?;
        let parsed = parse_bool(name, value)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        flag.store(parsed, Ordering::Release);
        info!("Runtime parameter {} set to {}", name, parsed);
        Ok(())
    }

    /// Applies all entries of a JSON object such as
    /// `{"use-binsearch-transitive-path": false}`. Nothing is changed if any
    /// entry is invalid.
    pub fn apply_json(&self, json: &str) -> Result<(), ParameterError> {
        let value: Value = serde_json::from_str(json)?;
        let object = value.as_object().ok_or(ParameterError::NotAnObject)?;
        let mut updates = Vec::with_capacity(object.len());
        for (name, value) in object {
            let flag = self.flag(name)?;
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            updates.push((name, flag, parse_bool(name, &text)?));
        }
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        for (name, flag, parsed) in updates {
            flag.store(parsed, Ordering::Release);
            info!("Runtime parameter {} set to {}", name, parsed);
        }
        Ok(())
    }

    /// Current values of all parameters as a JSON object.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            USE_BINSEARCH_TRANSITIVE_PATH: self.use_binsearch_transitive_path(),
            ENABLE_PREFILTER_ON_INDEX_SCANS: self.enable_prefilter_on_index_scans(),
        })
    }

    /// Restores the defaults. Meant for tests that change parameters.
    pub fn reset(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.use_binsearch_transitive_path
            .store(DEFAULT_USE_BINSEARCH_TRANSITIVE_PATH, Ordering::Release);
        self.enable_prefilter_on_index_scans
            .store(DEFAULT_ENABLE_PREFILTER_ON_INDEX_SCANS, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The registry is global, so the tests in this module run one at a time.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_set_and_reset() {
        let _lock = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let params = runtime_parameters();
        params.set(USE_BINSEARCH_TRANSITIVE_PATH, "false").unwrap();
        assert!(!params.use_binsearch_transitive_path());
        params.reset();
        assert!(params.use_binsearch_transitive_path());
    }

    #[test]
    fn test_unknown_and_invalid() {
        let _lock = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let params = runtime_parameters();
        assert!(matches!(params.set("no-such-thing", "true"), Err(ParameterError::Unknown(_))));
        assert!(matches!(
            params.set(USE_BINSEARCH_TRANSITIVE_PATH, "maybe"),
            Err(ParameterError::InvalidValue { .. })
        ));
        assert!(params.use_binsearch_transitive_path());
    }

    #[test]
    fn test_apply_json_is_all_or_nothing() {
        let _lock = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let params = runtime_parameters();
        let result = params.apply_json(
            r#"{"enable-prefilter-on-index-scans": false, "use-binsearch-transitive-path": "sometimes"}"#,
        );
        assert!(result.is_err());
        assert!(params.enable_prefilter_on_index_scans());

        params
            .apply_json(r#"{"enable-prefilter-on-index-scans": false}"#)
            .unwrap();
        assert_eq!(params.to_json()[ENABLE_PREFILTER_ON_INDEX_SCANS], Value::Bool(false));
        params.reset();
    }
}

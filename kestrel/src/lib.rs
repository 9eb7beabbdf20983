/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod cancellation;
pub mod engine;
pub mod error;
pub mod export;
pub mod expression;
pub mod id_table;
pub mod index;
pub mod local_vocab;
pub mod materialized_views;
pub mod prefilter;
pub mod vocabulary;

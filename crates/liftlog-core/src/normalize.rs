// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Canonical-name and weight-unit normalization.
//!
//! Pure helpers shared by the validator and the upsert engine. Canonical
//! names are the per-user dedup key for exercises, so lookup and storage
//! must both go through [`normalize_canonical_name`].

use serde::{Deserialize, Serialize};

/// Kilograms per pound.
const LB_TO_KG: f64 = 0.45359237;

/// Unit of a client-supplied weight value.
///
/// The set of accepted units is closed; anything else is rejected at the
/// deserialization boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightUnit {
    /// Pounds.
    #[serde(rename = "lb")]
    Lb,
    /// Kilograms.
    #[serde(rename = "kg")]
    Kg,
}

impl WeightUnit {
    /// Wire representation of the unit ("lb" or "kg").
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightUnit::Lb => "lb",
            WeightUnit::Kg => "kg",
        }
    }
}

/// Normalize an exercise name into its canonical dedup form.
///
/// Trims, lowercases, and collapses internal whitespace runs to a single
/// space, so "Bench Press", " bench   press " and "BENCH PRESS" all map to
/// the same canonical name.
pub fn normalize_canonical_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Convert a weight value to kilograms.
///
/// Kilogram values pass through unchanged; pound values are converted at
/// the standard factor.
pub fn weight_to_kg(value: f64, unit: WeightUnit) -> f64 {
    match unit {
        WeightUnit::Kg => value,
        WeightUnit::Lb => value * LB_TO_KG,
    }
}

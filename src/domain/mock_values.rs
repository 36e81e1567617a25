// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Mock Values
//!
//! Deterministic sample values used to seed an empty table before export.
//! The value only depends on the MySQL column type, the column name and the
//! row index, so two seedings of identical tables insert identical rows.

use chrono::{Duration, NaiveDate};

/// A value to bind into the seeding `INSERT`.
#[derive(Debug, Clone, PartialEq)]
pub enum MockValue {
    Int(u64),
    Float(f64),
    Text(String),
}

/// Builds the mock value for `row_index` (0-based) of a column.
///
/// Rules are checked in order and the first match wins, so e.g. an unsigned
/// `tinyint(1)` is seeded as an ordinal, not as a boolean.
pub fn mock_value(column_type: &str, column_name: &str, row_index: u32) -> MockValue {
    let t = column_type.to_lowercase();
    let ordinal = u64::from(row_index) + 1;

    if t.contains("int") && t.contains("unsigned") {
        return MockValue::Int(ordinal);
    }
    if t.starts_with("int") || t.contains("bigint") || t.contains("smallint") {
        return MockValue::Int(ordinal);
    }
    if ["decimal", "numeric", "float", "double"]
        .iter()
        .any(|k| t.contains(k))
    {
        return MockValue::Float(ordinal as f64);
    }
    if t.contains("bool") || t == "tinyint(1)" {
        return MockValue::Int(u64::from(row_index % 2));
    }
    if t.contains("date") && !t.contains("time") {
        let date = base_date() + Duration::days(i64::from(row_index));
        return MockValue::Text(date.format("%Y-%m-%d").to_string());
    }
    if t.contains("datetime") || t.contains("timestamp") || t.contains("time") {
        let noon = base_date().and_hms_opt(12, 0, 0).unwrap_or_default();
        let ts = noon + Duration::hours(i64::from(row_index));
        return MockValue::Text(ts.format("%Y-%m-%d %H:%M:%S").to_string());
    }
    if t.contains("char") || t.contains("text") {
        return MockValue::Text(format!("mock_{}_{}", column_name, ordinal));
    }
    if t.contains("json") {
        return MockValue::Text(format!(
            "{{\"mock\": \"{}_{}\"}}",
            column_name, ordinal
        ));
    }
    MockValue::Text(format!("mock_{}_{}", column_name, ordinal))
}

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default()
}

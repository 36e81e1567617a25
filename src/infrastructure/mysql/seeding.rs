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

//! Seeds an empty table with deterministic mock rows before it is exported.

use crate::domain::errors::{ExportError, Result};
use crate::domain::mock_values::{mock_value, MockValue};
use crate::infrastructure::mysql::sql_utils::{build_insert_sql, count_rows_sql, describe_sql};
use log::{info, warn};
use mysql::prelude::Queryable;
use mysql::{Conn, TxOpts, Value};

/// One line of `DESCRIBE` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribedColumn {
    pub name: String,
    pub column_type: String,
    pub extra: String,
}

type DescribeRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

/// Inserts `rows` mock rows into `table` when it has no rows yet.
///
/// Runs in a single transaction. Returns how many rows were inserted.
pub fn seed_mock_data(conn: &mut Conn, table: &str, rows: u32) -> Result<u64> {
    if let Some(SeedSkip::ZeroRows) = skip_reason(rows, None) {
        info!("MOCK_ROWS is 0; nothing to insert into {}", table);
        return Ok(0);
    }

    let existing: u64 = conn
        .query_first(count_rows_sql(table))
        .map_err(|e| ExportError::extraction(table, e))?
        .unwrap_or(0);
    if existing > 0 {
        info!(
            "Skipping mock data insert for {}; table already has {} rows",
            table, existing
        );
        return Ok(0);
    }

    let described: Vec<DescribedColumn> = conn
        .query_map(
            describe_sql(table),
            |(name, column_type, _null, _key, _default, extra): DescribeRow| DescribedColumn {
                name,
                column_type,
                extra: extra.unwrap_or_default(),
            },
        )
        .map_err(|e| ExportError::extraction(table, e))?;

    let columns = insertable_columns(described);
    if let Some(SeedSkip::NoColumns) = skip_reason(rows, Some(columns.as_slice())) {
        warn!("No columns available for inserting mock data into {}", table);
        return Ok(0);
    }

    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
    let sql = build_insert_sql(table, &names);
    let params = mock_rows(&columns, rows);

    let mut tx = conn
        .start_transaction(TxOpts::default())
        .map_err(|e| ExportError::extraction(table, e))?;
    tx.exec_batch(sql, params)
        .map_err(|e| ExportError::extraction(table, e))?;
    tx.commit().map_err(|e| ExportError::extraction(table, e))?;

    info!("Inserted {} mock rows into {}", rows, table);
    Ok(u64::from(rows))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeedSkip {
    ZeroRows,
    NoColumns,
}

/// Why seeding has nothing to do. `columns` is `None` before the table has
/// been described.
fn skip_reason(rows: u32, columns: Option<&[DescribedColumn]>) -> Option<SeedSkip> {
    if rows == 0 {
        Some(SeedSkip::ZeroRows)
    } else if columns.is_some_and(|c| c.is_empty()) {
        Some(SeedSkip::NoColumns)
    } else {
        None
    }
}

/// Drops `auto_increment` columns; the server fills those in.
pub fn insertable_columns(columns: Vec<DescribedColumn>) -> Vec<DescribedColumn> {
    columns
        .into_iter()
        .filter(|c| !c.extra.to_lowercase().contains("auto_increment"))
        .collect()
}

fn mock_rows(columns: &[DescribedColumn], rows: u32) -> Vec<Vec<Value>> {
    (0..rows)
        .map(|i| {
            columns
                .iter()
                .map(|c| to_mysql_value(mock_value(&c.column_type, &c.name, i)))
                .collect()
        })
        .collect()
}

fn to_mysql_value(value: MockValue) -> Value {
    match value {
        MockValue::Int(n) => Value::UInt(n),
        MockValue::Float(n) => Value::Double(n),
        MockValue::Text(s) => Value::Bytes(s.into_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, column_type: &str, extra: &str) -> DescribedColumn {
        DescribedColumn {
            name: name.to_string(),
            column_type: column_type.to_string(),
            extra: extra.to_string(),
        }
    }

    #[test]
    fn test_auto_increment_columns_skipped() {
        let cols = insertable_columns(vec![
            column("id", "int(11)", "auto_increment"),
            column("name", "varchar(50)", ""),
            column("created", "timestamp", "DEFAULT_GENERATED"),
        ]);
        let names: Vec<&str> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["name", "created"]);
    }

    #[test]
    fn test_zero_rows_is_not_reported_as_missing_columns() {
        let cols = vec![column("name", "varchar(50)", "")];
        assert_eq!(skip_reason(0, None), Some(SeedSkip::ZeroRows));
        assert_eq!(skip_reason(0, Some(cols.as_slice())), Some(SeedSkip::ZeroRows));
        assert_eq!(skip_reason(0, Some(&[][..])), Some(SeedSkip::ZeroRows));
        assert_eq!(skip_reason(5, Some(&[][..])), Some(SeedSkip::NoColumns));
        assert_eq!(skip_reason(5, None), None);
        assert_eq!(skip_reason(5, Some(cols.as_slice())), None);
    }

    #[test]
    fn test_mock_rows_are_deterministic() {
        let cols = vec![column("name", "varchar(50)", ""), column("qty", "int", "")];
        let rows = mock_rows(&cols, 2);
        assert_eq!(
            rows,
            vec![
                vec![Value::Bytes(b"mock_name_1".to_vec()), Value::UInt(1)],
                vec![Value::Bytes(b"mock_name_2".to_vec()), Value::UInt(2)],
            ]
        );
        assert_eq!(mock_rows(&cols, 2), rows);
    }
}

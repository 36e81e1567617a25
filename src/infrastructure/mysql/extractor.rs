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

//! Streams a whole table out of MySQL.
//!
//! `query_iter` reads the result set off the socket row by row instead of
//! buffering it client-side, and `RowStream::batched` bounds how many rows sit
//! in memory at once.

use crate::domain::entities::{Row, TableSchema};
use crate::domain::errors::{ExportError, Result};
use crate::domain::row_stream::{Interruptible, RowStream};
use crate::infrastructure::mysql::sql_utils::select_all_sql;
use crate::infrastructure::mysql::value_format::{is_binary_column, value_to_text};
use log::{debug, info, warn};
use mysql::prelude::Queryable;
use mysql::{Conn, Opts};

/// Issues `SELECT * FROM table` and returns a lazy stream of its rows.
///
/// Column order is whatever the result-set metadata reports, fixed for the
/// whole stream. A missing table or rejected query fails here; a fetch error
/// later on surfaces as an `Err` item of the stream. If the stream is dropped
/// before the last row, the query is killed from a side connection so the
/// driver does not read the remaining rows.
pub fn stream_table<'a>(
    conn: &'a mut Conn,
    opts: &Opts,
    table: &str,
    batch_size: usize,
) -> Result<RowStream<'a>> {
    let sql = select_all_sql(table);
    debug!("Executing: {}", sql);

    let connection_id = conn.connection_id();
    let result = conn
        .query_iter(sql)
        .map_err(|e| ExportError::extraction(table, e))?;

    let columns: Vec<String> = result
        .columns()
        .as_ref()
        .iter()
        .map(|c| c.name_str().into_owned())
        .collect();
    let binary: Vec<bool> = result
        .columns()
        .as_ref()
        .iter()
        .map(|c| is_binary_column(c.column_type(), c.character_set()))
        .collect();

    if columns.is_empty() {
        return Err(ExportError::extraction(table, "query returned no result set"));
    }
    info!(
        "Streaming {} columns from {} in batches of {}",
        columns.len(),
        table,
        batch_size
    );

    let owned_table = table.to_string();
    let rows = result.map(move |row| {
        row.map(|r| convert_row(r, &binary))
            .map_err(|e| ExportError::extraction(&owned_table, e))
    });

    let killer = QueryKiller {
        opts: opts.clone(),
        connection_id,
        table: table.to_string(),
    };
    let cursor = Interruptible::new(rows, move || killer.kill());

    let schema = TableSchema {
        table: table.to_string(),
        columns,
    };
    Ok(RowStream::batched(schema, cursor, batch_size))
}

fn convert_row(row: mysql::Row, binary: &[bool]) -> Row {
    Row::new(
        row.unwrap()
            .into_iter()
            .enumerate()
            .map(|(i, value)| value_to_text(value, binary.get(i).copied().unwrap_or(false)))
            .collect(),
    )
}

/// Stops a running statement of another connection with `KILL QUERY`.
struct QueryKiller {
    opts: Opts,
    connection_id: u32,
    table: String,
}

impl QueryKiller {
    fn kill(&self) {
        info!(
            "Stopping extraction of {} (connection id {})",
            self.table, self.connection_id
        );
        let outcome = Conn::new(self.opts.clone())
            .and_then(|mut side| side.query_drop(format!("KILL QUERY {}", self.connection_id)));
        if let Err(e) = outcome {
            warn!(
                "Could not stop query on connection {}: {}",
                self.connection_id, e
            );
        }
    }
}

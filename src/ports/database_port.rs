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

//! # Database Port
//!
//! In Hexagonal Architecture, a **Port** is a contract the application talks
//! to without knowing what is behind it.
//!
//! This Port describes the source side of the export: open one connection,
//! optionally seed the table, and stream its rows. The Orchestrator never
//! sees a MySQL type, which is what lets its tests run against an in-memory
//! table.

use crate::config::DatabaseSettings;
use crate::domain::errors::Result;
use crate::domain::row_stream::RowStream;

/// Opens sessions against the source database.
pub trait DatabasePort: Send + Sync {
    /// Connects and authenticates. Fails with `ExportError::Connection`.
    fn open(&self, settings: &DatabaseSettings) -> Result<Box<dyn DatabaseSession>>;
}

/// One live connection, owned for the whole run.
///
/// Dropping the session releases the connection. Implementations must close
/// the underlying socket in `Drop` so release happens on every exit path.
pub trait DatabaseSession {
    /// Inserts `rows` deterministic rows if `table` is empty.
    /// Returns the number of rows inserted.
    fn seed_if_empty(&mut self, table: &str, rows: u32) -> Result<u64>;

    /// Runs `SELECT *` on `table` and streams the result `batch_size` rows at a time.
    fn extract(&mut self, table: &str, batch_size: usize) -> Result<RowStream<'_>>;
}

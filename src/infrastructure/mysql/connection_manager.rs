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

//! The single MySQL connection a run owns.
//!
//! `MySqlConnectionManager` is the `DatabasePort` adapter: `open` connects and
//! authenticates once, and the returned `MySqlSession` closes the connection
//! when it is dropped, whichever way the run ends.

use crate::config::DatabaseSettings;
use crate::domain::errors::{ExportError, Result};
use crate::domain::row_stream::RowStream;
use crate::infrastructure::mysql::{extractor, seeding};
use crate::ports::database_port::{DatabasePort, DatabaseSession};
use log::info;
use mysql::{Conn, Opts, OptsBuilder};

#[derive(Debug, Default)]
pub struct MySqlConnectionManager;

impl MySqlConnectionManager {
    pub fn new() -> Self {
        Self
    }

    fn build_opts(settings: &DatabaseSettings) -> Opts {
        OptsBuilder::new()
            .ip_or_hostname(Some(settings.host.clone()))
            .tcp_port(settings.port)
            .user(Some(settings.user.clone()))
            .pass(Some(settings.expose_password().to_string()))
            .db_name(Some(settings.database.clone()))
            .tcp_connect_timeout(Some(settings.connect_timeout))
            .read_timeout(Some(settings.read_timeout))
            .write_timeout(Some(settings.read_timeout))
            .into()
    }
}

impl DatabasePort for MySqlConnectionManager {
    fn open(&self, settings: &DatabaseSettings) -> Result<Box<dyn DatabaseSession>> {
        let target = format!(
            "{}@{}:{}/{}",
            settings.user, settings.host, settings.port, settings.database
        );
        info!("Connecting to MySQL at {}", target);

        let opts = Self::build_opts(settings);
        let conn = Conn::new(opts.clone())
            .map_err(|e| ExportError::Connection(format!("{}: {}", target, e)))?;

        info!(
            "Connected to MySQL (connection id {})",
            conn.connection_id()
        );
        Ok(Box::new(MySqlSession { conn, opts, target }))
    }
}

pub struct MySqlSession {
    conn: Conn,
    /// Kept to open a side connection when a running query must be stopped.
    opts: Opts,
    target: String,
}

impl DatabaseSession for MySqlSession {
    fn seed_if_empty(&mut self, table: &str, rows: u32) -> Result<u64> {
        seeding::seed_mock_data(&mut self.conn, table, rows)
    }

    fn extract(&mut self, table: &str, batch_size: usize) -> Result<RowStream<'_>> {
        extractor::stream_table(&mut self.conn, &self.opts, table, batch_size)
    }
}

impl Drop for MySqlSession {
    fn drop(&mut self) {
        // `Conn` sends COM_QUIT and closes the socket in its own `Drop`.
        info!("Closed MySQL connection to {}", self.target);
    }
}

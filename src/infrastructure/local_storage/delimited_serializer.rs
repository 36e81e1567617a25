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

//! # Delimited Serializer
//!
//! Writes a `RowStream` to a CSV file:
//!
//! - header line with the column names, then one line per row;
//! - `,` delimiter, CRLF after every line, UTF-8;
//! - a field is double-quoted only when it contains `,`, `"`, CR or LF, and
//!   embedded quotes are doubled;
//! - SQL NULL and the empty string are both written as an empty field.
//!
//! Rows are written as they arrive, into a temporary file next to the
//! destination. The temporary file is renamed onto the destination only after
//! the last byte is flushed and synced, so the output path never holds a
//! truncated artifact.

use crate::domain::entities::SerializedArtifact;
use crate::domain::errors::{ExportError, Result};
use crate::domain::row_stream::RowStream;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Instant;
use tempfile::NamedTempFile;

pub const DELIMITER: u8 = b',';

const WRITE_BUFFER_BYTES: usize = 128 * 1024;
const PROGRESS_EVERY_ROWS: u64 = 100_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedSerializer;

impl DelimitedSerializer {
    pub fn new() -> Self {
        Self
    }

    /// Drains `stream` into `destination` and describes the finished file.
    ///
    /// An `Err` item from the stream stops the write and is returned as-is;
    /// local I/O failures become `ExportError::Serialization`. In both cases
    /// nothing is left at `destination`.
    pub fn serialize(&self, stream: RowStream<'_>, destination: &Path) -> Result<SerializedArtifact> {
        let start = Instant::now();
        let RowStream { schema, rows } = stream;

        let dir = match destination.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let temp = NamedTempFile::new_in(dir).map_err(|e| {
            ExportError::Serialization(format!("cannot create file in {}: {}", dir.display(), e))
        })?;
        debug!("Writing {} to {}", schema.table, temp.path().display());

        let sink = DigestWriter::new(BufWriter::with_capacity(WRITE_BUFFER_BYTES, temp));
        let mut wtr = WriterBuilder::new()
            .delimiter(DELIMITER)
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::CRLF)
            .from_writer(sink);

        wtr.write_record(&schema.columns).map_err(csv_error)?;

        let mut count: u64 = 0;
        for row in rows {
            let row = row?;
            if row.len() != schema.columns.len() {
                return Err(ExportError::Serialization(format!(
                    "row {} has {} fields, expected {}",
                    count + 1,
                    row.len(),
                    schema.columns.len()
                )));
            }
            wtr.write_record(row.values.iter().map(|v| v.as_deref().unwrap_or("")))
                .map_err(csv_error)?;
            count += 1;
            if count % PROGRESS_EVERY_ROWS == 0 {
                info!("{}: {} rows written", schema.table, count);
            }
        }

        let sink = wtr
            .into_inner()
            .map_err(|e| ExportError::Serialization(e.error().to_string()))?;
        let (buffered, sha256, bytes) = sink.finish();
        let temp = buffered
            .into_inner()
            .map_err(|e| ExportError::Serialization(e.error().to_string()))?;
        temp.as_file().sync_all().map_err(io_error)?;
        set_readable(temp.path())?;

        temp.persist(destination).map_err(|e| {
            ExportError::Serialization(format!(
                "cannot move artifact to {}: {}",
                destination.display(),
                e.error
            ))
        })?;

        info!(
            "Wrote {} rows ({} bytes) from {} to {} in {:.2}s",
            count,
            bytes,
            schema.table,
            destination.display(),
            start.elapsed().as_secs_f64()
        );

        Ok(SerializedArtifact {
            path: destination.to_path_buf(),
            rows: count,
            bytes,
            sha256,
        })
    }
}

fn csv_error(e: csv::Error) -> ExportError {
    ExportError::Serialization(e.to_string())
}

fn io_error(e: io::Error) -> ExportError {
    ExportError::Serialization(e.to_string())
}

// Temp files are created 0600; the artifact should get ordinary file permissions.
#[cfg(unix)]
fn set_readable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).map_err(io_error)
}

#[cfg(not(unix))]
fn set_readable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Counts and hashes every byte on its way to `inner`.
struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
    bytes: u64,
}

impl<W: Write> DigestWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    fn finish(self) -> (W, [u8; 32], u64) {
        (self.inner, self.hasher.finalize().into(), self.bytes)
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

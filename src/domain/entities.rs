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

//! # Domain Entities
//!
//! The nouns of an export run: the rows coming out of the table, the CSV file
//! they are written to, the receipt for the uploaded object, and the final
//! report of the run.

use crate::domain::errors::FailureKind;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// One row of the exported table, in column order.
///
/// `None` is SQL NULL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    pub values: Vec<Option<String>>,
}

impl Row {
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<S: Into<String>> FromIterator<Option<S>> for Row {
    fn from_iter<T: IntoIterator<Item = Option<S>>>(iter: T) -> Self {
        Row::new(iter.into_iter().map(|v| v.map(Into::into)).collect())
    }
}

/// Column layout of the table, fixed once per run from the query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<String>,
}

/// The local delimited file produced by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedArtifact {
    pub path: PathBuf,
    /// Data rows, excluding the header line.
    pub rows: u64,
    pub bytes: u64,
    /// SHA-256 of the file contents.
    pub sha256: [u8; 32],
}

impl SerializedArtifact {
    pub fn sha256_hex(&self) -> String {
        self.sha256.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// The form S3 expects in `x-amz-checksum-sha256`.
    pub fn sha256_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.sha256)
    }
}

/// Proof that the artifact now exists at the destination key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub bucket: String,
    pub key: String,
    pub e_tag: Option<String>,
    pub bytes: u64,
    /// Attempts made by the Orchestrator, including the successful one.
    pub attempts: u32,
}

/// Lifecycle of a single run. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Idle,
    Configuring,
    Connecting,
    Extracting,
    Uploading,
    Succeeded,
    Failed(FailureKind),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Succeeded | PipelineState::Failed(_))
    }

    fn rank(&self) -> u8 {
        match self {
            PipelineState::Idle => 0,
            PipelineState::Configuring => 1,
            PipelineState::Connecting => 2,
            PipelineState::Extracting => 3,
            PipelineState::Uploading => 4,
            PipelineState::Succeeded | PipelineState::Failed(_) => 5,
        }
    }

    /// Whether `next` is reachable from `self` without going backwards.
    pub fn can_advance_to(&self, next: PipelineState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "Idle"),
            PipelineState::Configuring => write!(f, "Configuring"),
            PipelineState::Connecting => write!(f, "Connecting"),
            PipelineState::Extracting => write!(f, "Extracting+Serializing"),
            PipelineState::Uploading => write!(f, "Uploading"),
            PipelineState::Succeeded => write!(f, "Succeeded"),
            PipelineState::Failed(kind) => write!(f, "Failed({})", kind),
        }
    }
}

/// The "Report Card" of a run, written to `REPORT_PATH` when configured.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub state: PipelineState,
    pub failure_kind: Option<FailureKind>,
    pub error: Option<String>,
    pub table: Option<String>,
    pub rows: u64,
    pub bytes: u64,
    pub sha256: Option<String>,
    pub bucket: Option<String>,
    pub key: Option<String>,
    pub e_tag: Option<String>,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            state: PipelineState::Idle,
            failure_kind: None,
            error: None,
            table: None,
            rows: 0,
            bytes: 0,
            sha256: None,
            bucket: None,
            key: None,
            e_tag: None,
            attempts: 0,
            started_at,
            duration_secs: 0.0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Succeeded
    }

    /// Exit code for the process: 0 on success, otherwise per failure kind.
    pub fn exit_code(&self) -> i32 {
        self.failure_kind.map(|k| k.exit_code()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_only_moves_forward() {
        use PipelineState::*;
        assert!(Idle.can_advance_to(Configuring));
        assert!(Connecting.can_advance_to(Extracting));
        assert!(Configuring.can_advance_to(Failed(FailureKind::Configuration)));
        assert!(Uploading.can_advance_to(Succeeded));
        assert!(!Uploading.can_advance_to(Extracting));
        assert!(!Succeeded.can_advance_to(Failed(FailureKind::Transfer)));
        assert!(!Failed(FailureKind::Connection).can_advance_to(Uploading));
    }

    #[test]
    fn test_row_from_iter() {
        let row: Row = vec![Some("1"), None, Some("")].into_iter().collect();
        assert_eq!(
            row.values,
            vec![Some("1".to_string()), None, Some(String::new())]
        );
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn test_report_exit_code() {
        let mut report = RunReport::new(Utc::now());
        report.state = PipelineState::Succeeded;
        assert_eq!(report.exit_code(), 0);
        report.state = PipelineState::Failed(FailureKind::Extraction);
        report.failure_kind = Some(FailureKind::Extraction);
        assert_eq!(report.exit_code(), 4);
        assert!(!report.succeeded());
    }

    #[test]
    fn test_artifact_digest_encodings() {
        let artifact = SerializedArtifact {
            path: PathBuf::from("out.csv"),
            rows: 0,
            bytes: 0,
            sha256: [0xab; 32],
        };
        assert_eq!(artifact.sha256_hex(), "ab".repeat(32));
        assert_eq!(artifact.sha256_base64().len(), 44);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(
            PipelineState::Failed(FailureKind::Transfer).to_string(),
            "Failed(transfer)"
        );
        assert_eq!(
            PipelineState::Extracting.to_string(),
            "Extracting+Serializing"
        );
    }
}

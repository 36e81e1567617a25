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

//! Core error definitions for the MySQL to S3 exporter.
//!
//! Every component returns `ExportError`. The Orchestrator only needs to know
//! which *kind* of failure happened (see [`FailureKind`]) and whether an upload
//! failure is worth retrying (see [`TransferKind`]).

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Whether a failed transfer can succeed if the same upload is attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferKind {
    /// Network blips, throttling, 5xx responses.
    Transient,
    /// Bad bucket, denied access, malformed request.
    Fatal,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Transient => write!(f, "transient"),
            TransferKind::Fatal => write!(f, "fatal"),
        }
    }
}

/// Error types encountered during an export run.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Configuration error in {key}: {reason}")]
    Config { key: String, reason: String },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Extraction failed for {table}: {reason}")]
    Extraction { table: String, reason: String },

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Transfer failed ({kind}): {message}")]
    Transfer { kind: TransferKind, message: String },

    #[error("Run cancelled: {0}")]
    Cancelled(String),
}

impl ExportError {
    pub fn config(key: &str, reason: impl Into<String>) -> Self {
        ExportError::Config {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn extraction(table: &str, reason: impl fmt::Display) -> Self {
        ExportError::Extraction {
            table: table.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        ExportError::Transfer {
            kind: TransferKind::Transient,
            message: message.into(),
        }
    }

    pub fn fatal_transfer(message: impl Into<String>) -> Self {
        ExportError::Transfer {
            kind: TransferKind::Fatal,
            message: message.into(),
        }
    }

    /// The reporting category of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            ExportError::Config { .. } => FailureKind::Configuration,
            ExportError::Connection(_) => FailureKind::Connection,
            ExportError::Extraction { .. } => FailureKind::Extraction,
            ExportError::Serialization(_) => FailureKind::Serialization,
            ExportError::Transfer { .. } => FailureKind::Transfer,
            ExportError::Cancelled(_) => FailureKind::Cancelled,
        }
    }

    /// Only transient transfer errors are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExportError::Transfer {
                kind: TransferKind::Transient,
                ..
            }
        )
    }
}

/// The terminal failure category of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    Configuration,
    Connection,
    Extraction,
    Serialization,
    Transfer,
    Cancelled,
}

impl FailureKind {
    /// Process exit code reported by the binary for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            FailureKind::Configuration => 2,
            FailureKind::Connection => 3,
            FailureKind::Extraction => 4,
            FailureKind::Serialization => 5,
            FailureKind::Transfer => 6,
            FailureKind::Cancelled => 130,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Configuration => "configuration",
            FailureKind::Connection => "connection",
            FailureKind::Extraction => "extraction",
            FailureKind::Serialization => "serialization",
            FailureKind::Transfer => "transfer",
            FailureKind::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// A specialized Result type for the exporter.
pub type Result<T> = std::result::Result<T, ExportError>;

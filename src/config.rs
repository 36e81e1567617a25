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

//! # Configuration
//!
//! The exporter is driven by a flat set of named settings (`MYSQL_HOST`,
//! `S3_BUCKET`, ...). They usually come from the environment, optionally from
//! a YAML/JSON file, and are validated into an immutable [`RunConfig`] before
//! any I/O happens.

use crate::domain::errors::{ExportError, Result};
use crate::domain::retry::RetryPolicy;
use clap::Parser;
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MYSQL_HOST: &str = "MYSQL_HOST";
pub const MYSQL_PORT: &str = "MYSQL_PORT";
pub const MYSQL_USER: &str = "MYSQL_USER";
pub const MYSQL_PASSWORD: &str = "MYSQL_PASSWORD";
pub const MYSQL_DATABASE: &str = "MYSQL_DATABASE";
pub const MYSQL_TABLE: &str = "MYSQL_TABLE";
pub const OUTPUT_CSV: &str = "OUTPUT_CSV";
pub const S3_BUCKET: &str = "S3_BUCKET";
pub const S3_OBJECT_KEY: &str = "S3_OBJECT_KEY";
pub const AWS_REGION: &str = "AWS_REGION";

/// Settings that must be present and non-blank, in validation order.
pub const REQUIRED_KEYS: [&str; 10] = [
    MYSQL_HOST,
    MYSQL_PORT,
    MYSQL_USER,
    MYSQL_PASSWORD,
    MYSQL_DATABASE,
    MYSQL_TABLE,
    OUTPUT_CSV,
    S3_BUCKET,
    S3_OBJECT_KEY,
    AWS_REGION,
];

const OPTIONAL_KEYS: [&str; 14] = [
    "FETCH_BATCH_SIZE",
    "CONNECT_TIMEOUT_SECS",
    "READ_TIMEOUT_SECS",
    "UPLOAD_MAX_ATTEMPTS",
    "UPLOAD_BACKOFF_MS",
    "UPLOAD_MAX_BACKOFF_MS",
    "UPLOAD_TIMEOUT_SECS",
    "MULTIPART_THRESHOLD_MB",
    "S3_ENDPOINT_URL",
    "SEED_MOCK_DATA",
    "MOCK_ROWS",
    "REMOVE_ARTIFACT",
    "REPORT_PATH",
    "RUN_TIMEOUT_SECS",
];

/// Flat mapping from setting name to raw string value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted: BTreeMap<&str, &str> = self
            .values
            .iter()
            .map(|(k, v)| {
                if k == MYSQL_PASSWORD {
                    (k.as_str(), "***REDACTED***")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("Settings").field("values", &redacted).finish()
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every known setting from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::new();
        for key in REQUIRED_KEYS.iter().chain(OPTIONAL_KEYS.iter()) {
            if let Some(value) = lookup(key) {
                settings.set(key, value);
            }
        }
        settings
    }

    /// Loads a flat YAML or JSON mapping. A `.json` extension selects JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ExportError::config("--config", format!("cannot read {}: {}", path.display(), e))
        })?;

        let raw: BTreeMap<String, serde_yaml::Value> =
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                serde_json::from_str(&contents)
                    .map_err(|e| ExportError::config("--config", e.to_string()))?
            } else {
                serde_yaml::from_str(&contents)
                    .map_err(|e| ExportError::config("--config", e.to_string()))?
            };

        let mut settings = Self::new();
        for (key, value) in raw {
            let text = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => String::new(),
                _ => {
                    return Err(ExportError::config(
                        &key,
                        "settings file values must be scalars",
                    ))
                }
            };
            settings.set(&key, text);
        }
        Ok(settings)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Values from `other` override values already present.
    pub fn merge(mut self, other: Settings) -> Self {
        self.values.extend(other.values);
        self
    }

    /// Trimmed value of `key`, except the password which is kept verbatim.
    fn required(&self, key: &str) -> Result<String> {
        match self.get(key) {
            None => Err(ExportError::config(key, "missing required setting")),
            Some(v) if v.trim().is_empty() => Err(ExportError::config(key, "must not be blank")),
            Some(v) if key == MYSQL_PASSWORD => Ok(v.to_string()),
            Some(v) => Ok(v.trim().to_string()),
        }
    }

    fn optional(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn positive<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: std::str::FromStr + PartialOrd + Default,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => match raw.parse::<T>() {
                Ok(v) if v > T::default() => Ok(v),
                _ => Err(ExportError::config(key, "must be a positive integer")),
            },
        }
    }

    fn flag(&self, key: &str) -> bool {
        self.optional(key)
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }
}

/// How to reach the source database.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Only ever handed to the driver.
    pub password: SecretString,
    pub database: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl DatabaseSettings {
    pub fn expose_password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// Where the artifact goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub bucket: String,
    pub key: String,
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, LocalStack).
    pub endpoint_url: Option<String>,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Knobs for the export itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    pub table: String,
    pub output_path: PathBuf,
    pub fetch_batch_size: usize,
    /// Rows to seed into an empty table; `None` disables seeding.
    pub seed_mock_rows: Option<u32>,
    pub remove_artifact: bool,
    pub report_path: Option<PathBuf>,
    pub run_timeout: Option<Duration>,
}

/// Upload tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSettings {
    pub retry: RetryPolicy,
    pub attempt_timeout: Duration,
    pub multipart_threshold: u64,
}

/// Immutable, validated configuration of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub database: DatabaseSettings,
    pub export: ExportSettings,
    pub destination: Destination,
    pub upload: UploadSettings,
}

impl RunConfig {
    /// Validates `settings`, failing on the first missing or invalid key.
    pub fn load(settings: &Settings) -> Result<Self> {
        let mut required = BTreeMap::new();
        for key in REQUIRED_KEYS {
            let value = settings.required(key)?;
            if key == MYSQL_PORT {
                parse_port(&value)?;
            }
            required.insert(key, value);
        }
        let take = |key: &str| required.get(key).cloned().unwrap_or_default();

        let database = DatabaseSettings {
            host: take(MYSQL_HOST),
            port: parse_port(&take(MYSQL_PORT))?,
            user: take(MYSQL_USER),
            password: SecretString::from(take(MYSQL_PASSWORD)),
            database: take(MYSQL_DATABASE),
            connect_timeout: Duration::from_secs(settings.positive("CONNECT_TIMEOUT_SECS", 30u64)?),
            read_timeout: Duration::from_secs(settings.positive("READ_TIMEOUT_SECS", 300u64)?),
        };

        let seed_mock_rows = if settings.flag("SEED_MOCK_DATA") {
            let rows = settings
                .optional("MOCK_ROWS")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3);
            Some(rows)
        } else {
            None
        };

        let export = ExportSettings {
            table: take(MYSQL_TABLE),
            output_path: PathBuf::from(take(OUTPUT_CSV)),
            fetch_batch_size: settings.positive("FETCH_BATCH_SIZE", 1000usize)?,
            seed_mock_rows,
            remove_artifact: settings.flag("REMOVE_ARTIFACT"),
            report_path: settings.optional("REPORT_PATH").map(PathBuf::from),
            run_timeout: match settings.optional("RUN_TIMEOUT_SECS") {
                Some(_) => Some(Duration::from_secs(
                    settings.positive("RUN_TIMEOUT_SECS", 1u64)?,
                )),
                None => None,
            },
        };

        let destination = Destination {
            bucket: take(S3_BUCKET),
            key: take(S3_OBJECT_KEY),
            region: take(AWS_REGION),
            endpoint_url: settings.optional("S3_ENDPOINT_URL"),
        };

        let retry = RetryPolicy {
            max_attempts: settings.positive("UPLOAD_MAX_ATTEMPTS", 5u32)?,
            initial_backoff: Duration::from_millis(settings.positive("UPLOAD_BACKOFF_MS", 500u64)?),
            max_backoff: Duration::from_millis(
                settings.positive("UPLOAD_MAX_BACKOFF_MS", 30_000u64)?,
            ),
        };
        let upload = UploadSettings {
            retry,
            attempt_timeout: Duration::from_secs(settings.positive("UPLOAD_TIMEOUT_SECS", 900u64)?),
            multipart_threshold: settings
                .positive("MULTIPART_THRESHOLD_MB", 64u64)?
                .checked_mul(1024 * 1024)
                .ok_or_else(|| ExportError::config("MULTIPART_THRESHOLD_MB", "value is too large"))?,
        };

        Ok(Self {
            database,
            export,
            destination,
            upload,
        })
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    match raw.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ExportError::config(
            MYSQL_PORT,
            "must be a positive integer no greater than 65535",
        )),
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to a flat settings file (YAML or JSON). Environment variables override it.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Delete the local CSV once the run finishes
    #[arg(long)]
    pub remove_artifact: bool,

    /// Write the JSON run report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl CliArgs {
    /// Settings file (if any), then the environment, then CLI flags.
    pub fn collect_settings(&self) -> Result<Settings> {
        let base = match &self.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::new(),
        };
        let mut settings = base.merge(Settings::from_env());
        if self.remove_artifact {
            settings.set("REMOVE_ARTIFACT", "true");
        }
        if let Some(report) = &self.report {
            settings.set("REPORT_PATH", report.to_string_lossy());
        }
        Ok(settings)
    }
}

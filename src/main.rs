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

use clap::Parser;
use log::{error, info, warn};
use mysql_s3_exporter::application::orchestrator::Orchestrator;
use mysql_s3_exporter::application::runtime;
use mysql_s3_exporter::config::CliArgs;
use mysql_s3_exporter::domain::cancellation::CancellationToken;
use mysql_s3_exporter::infrastructure::mysql::connection_manager::MySqlConnectionManager;
use mysql_s3_exporter::infrastructure::s3::uploader::S3Uploader;
use std::process;
use std::sync::Arc;

fn main() {
    // 1. Initialize Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Parse Arguments and collect settings (file, then environment, then flags)
    let args = CliArgs::parse();
    let settings = match args.collect_settings() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to load settings: {}", e);
            process::exit(e.kind().exit_code());
        }
    };

    // 3. Cancellation on SIGINT/SIGTERM
    let cancel = CancellationToken::new();
    if let Err(e) = runtime::install_signal_handler(&cancel) {
        warn!("Could not install signal handler: {}", e);
    }

    // 4. Wire adapters and run
    let orchestrator = Orchestrator::new(
        Arc::new(MySqlConnectionManager::new()),
        Arc::new(S3Uploader::new()),
        cancel,
    );
    let report = orchestrator.run(&settings);

    if report.succeeded() {
        info!(
            "Export finished: {} rows, {} bytes, sha256 {} in {:.2}s",
            report.rows,
            report.bytes,
            report.sha256.as_deref().unwrap_or("-"),
            report.duration_secs
        );
    } else {
        error!(
            "Export failed in state {}: {}",
            report.state,
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    process::exit(report.exit_code());
}

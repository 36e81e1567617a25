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

//! # S3 Uploader
//!
//! `StoragePort` adapter for Amazon S3 and S3-compatible stores.
//!
//! The pipeline is synchronous, so each attempt spins up a small
//! current-thread Tokio runtime and drives the SDK calls with `block_on`.
//! The SDK's own retries are switched off: the Orchestrator decides when to
//! try again, and counts the attempts.
//!
//! Visibility is all-or-nothing. Small artifacts go up in a single
//! `PutObject` that carries the SHA-256 of the file, so S3 rejects a corrupted
//! body. Large artifacts use a multipart upload that is aborted on any
//! failure or cancellation before it completes, so parts never surface as an
//! object. A successful `PutObject` or `CompleteMultipartUpload` is the commit
//! point: the attempt succeeds from then on, and the `HeadObject` length
//! check that follows only logs.

use crate::config::{Destination, UploadSettings};
use crate::domain::cancellation::CancellationToken;
use crate::domain::entities::{SerializedArtifact, UploadReceipt};
use crate::domain::errors::{ExportError, Result};
use crate::infrastructure::s3::error_classifier::transfer_error;
use crate::ports::storage_port::StoragePort;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::{Credentials, RequestChecksumCalculation};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::{ByteStream, Length};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

const CONTENT_TYPE: &str = "text/csv; charset=utf-8";
const MIN_PART_SIZE: u64 = 16 * 1024 * 1024;
const MAX_PARTS: u64 = 10_000;
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// One slice of the artifact in a multipart upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    pub number: i32,
    pub offset: u64,
    pub length: u64,
}

/// Splits `total` bytes into at most 10 000 parts of at least 16 MiB.
pub fn plan_parts(total: u64) -> Vec<PartPlan> {
    let part_size = MIN_PART_SIZE.max(total.div_ceil(MAX_PARTS));
    let mut parts = Vec::new();
    let mut offset = 0;
    let mut number = 1;
    while offset < total {
        let length = part_size.min(total - offset);
        parts.push(PartPlan {
            number,
            offset,
            length,
        });
        offset += length;
        number += 1;
    }
    parts
}

/// Each attempt builds its own runtime and client, so a failed attempt leaves
/// nothing behind for the next one.
#[derive(Debug, Clone, Default)]
pub struct S3Uploader {
    credentials: Option<Credentials>,
}

impl S3Uploader {
    /// Resolves credentials through the default AWS chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses fixed credentials instead of the default chain, e.g. for an
    /// S3-compatible store.
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
        }
    }
}

impl StoragePort for S3Uploader {
    fn upload(
        &self,
        artifact: &SerializedArtifact,
        destination: &Destination,
        settings: &UploadSettings,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt> {
        cancel.check()?;
        let start = Instant::now();
        let multipart = artifact.bytes > settings.multipart_threshold;
        info!(
            "Uploading {} ({} bytes, {}) to {}",
            artifact.path.display(),
            artifact.bytes,
            if multipart { "multipart" } else { "single put" },
            destination
        );

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ExportError::fatal_transfer(format!("cannot start upload runtime: {}", e)))?;

        let e_tag: Option<String> = runtime.block_on(async {
            let client = create_client(
                destination,
                settings.attempt_timeout,
                self.credentials.clone(),
            )
            .await;

            let committed = if multipart {
                put_multipart(&client, artifact, destination, cancel).await?
            } else {
                tokio::select! {
                    res = put_whole(&client, artifact, destination) => res?,
                    _ = cancelled(cancel) => return Err(ExportError::Cancelled(cancel.reason())),
                }
            };

            // The object is live from here on: nothing below may fail the attempt.
            let head_tag = check_stored_length(&client, artifact, destination).await;
            Ok::<_, ExportError>(committed.or(head_tag))
        })?;

        info!(
            "Uploaded {} to {} in {:.2}s",
            artifact.path.display(),
            destination,
            start.elapsed().as_secs_f64()
        );

        Ok(UploadReceipt {
            bucket: destination.bucket.clone(),
            key: destination.key.clone(),
            e_tag,
            bytes: artifact.bytes,
            attempts: 1,
        })
    }
}

async fn put_whole(
    client: &Client,
    artifact: &SerializedArtifact,
    destination: &Destination,
) -> Result<Option<String>> {
    let body = ByteStream::from_path(&artifact.path).await.map_err(|e| {
        ExportError::fatal_transfer(format!("cannot read {}: {}", artifact.path.display(), e))
    })?;

    let output = client
        .put_object()
        .bucket(&destination.bucket)
        .key(&destination.key)
        .content_type(CONTENT_TYPE)
        .content_length(artifact.bytes as i64)
        .checksum_sha256(artifact.sha256_base64())
        .body(body)
        .send()
        .await
        .map_err(|e| transfer_error("PutObject", e))?;

    Ok(output.e_tag().map(str::to_string))
}

/// Multipart path. The upload is aborted if a part fails, if cancellation
/// arrives while parts are in flight, or if completing it fails.
/// `CompleteMultipartUpload` itself is not raced against cancellation.
async fn put_multipart(
    client: &Client,
    artifact: &SerializedArtifact,
    destination: &Destination,
    cancel: &CancellationToken,
) -> Result<Option<String>> {
    let created = client
        .create_multipart_upload()
        .bucket(&destination.bucket)
        .key(&destination.key)
        .content_type(CONTENT_TYPE)
        .send()
        .await
        .map_err(|e| transfer_error("CreateMultipartUpload", e))?;
    let upload_id = created
        .upload_id()
        .ok_or_else(|| ExportError::transient("CreateMultipartUpload returned no upload id"))?
        .to_string();

    let parts = tokio::select! {
        res = send_parts(client, artifact, destination, &upload_id) => res,
        _ = cancelled(cancel) => Err(ExportError::Cancelled(cancel.reason())),
    };
    let outcome = match parts {
        Ok(parts) => complete(client, destination, &upload_id, parts).await,
        Err(e) => Err(e),
    };

    if outcome.is_err() {
        abort(client, destination, &upload_id).await;
    }
    outcome
}

async fn send_parts(
    client: &Client,
    artifact: &SerializedArtifact,
    destination: &Destination,
    upload_id: &str,
) -> Result<Vec<CompletedPart>> {
    let plan = plan_parts(artifact.bytes);
    let mut completed = Vec::with_capacity(plan.len());

    for part in &plan {
        let body = ByteStream::read_from()
            .path(&artifact.path)
            .offset(part.offset)
            .length(Length::Exact(part.length))
            .build()
            .await
            .map_err(|e| {
                ExportError::fatal_transfer(format!(
                    "cannot read part {} of {}: {}",
                    part.number,
                    artifact.path.display(),
                    e
                ))
            })?;

        let output = client
            .upload_part()
            .bucket(&destination.bucket)
            .key(&destination.key)
            .upload_id(upload_id)
            .part_number(part.number)
            .content_length(part.length as i64)
            .body(body)
            .send()
            .await
            .map_err(|e| transfer_error("UploadPart", e))?;

        debug!("Uploaded part {}/{}", part.number, plan.len());
        completed.push(
            CompletedPart::builder()
                .part_number(part.number)
                .set_e_tag(output.e_tag().map(str::to_string))
                .build(),
        );
    }
    Ok(completed)
}

async fn complete(
    client: &Client,
    destination: &Destination,
    upload_id: &str,
    parts: Vec<CompletedPart>,
) -> Result<Option<String>> {
    let output = client
        .complete_multipart_upload()
        .bucket(&destination.bucket)
        .key(&destination.key)
        .upload_id(upload_id)
        .multipart_upload(
            CompletedMultipartUpload::builder()
                .set_parts(Some(parts))
                .build(),
        )
        .send()
        .await
        .map_err(|e| transfer_error("CompleteMultipartUpload", e))?;

    Ok(output.e_tag().map(str::to_string))
}

async fn abort(client: &Client, destination: &Destination, upload_id: &str) {
    warn!("Aborting multipart upload {} to {}", upload_id, destination);
    if let Err(e) = client
        .abort_multipart_upload()
        .bucket(&destination.bucket)
        .key(&destination.key)
        .upload_id(upload_id)
        .send()
        .await
    {
        warn!(
            "AbortMultipartUpload failed for {}: {}",
            upload_id,
            DisplayErrorContext(&e)
        );
    }
}

/// Compares the stored length with the artifact after the commit.
///
/// Only logs: the bytes are already covered by the checksum or the part
/// ETags, and write-only roles are often denied `HeadObject`.
async fn check_stored_length(
    client: &Client,
    artifact: &SerializedArtifact,
    destination: &Destination,
) -> Option<String> {
    match client
        .head_object()
        .bucket(&destination.bucket)
        .key(&destination.key)
        .send()
        .await
    {
        Ok(head) => {
            let stored = head.content_length().unwrap_or(-1);
            if stored != artifact.bytes as i64 {
                warn!(
                    "{} holds {} bytes, expected {}",
                    destination, stored, artifact.bytes
                );
            }
            head.e_tag().map(str::to_string)
        }
        Err(e) => {
            warn!(
                "Could not check stored length of {}: {}",
                destination,
                DisplayErrorContext(&e)
            );
            None
        }
    }
}

async fn create_client(
    destination: &Destination,
    attempt_timeout: Duration,
    credentials: Option<Credentials>,
) -> Client {
    let timeouts = TimeoutConfig::builder()
        .connect_timeout(Duration::from_secs(10))
        .operation_attempt_timeout(attempt_timeout)
        .build();

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(destination.region.clone()))
        .retry_config(RetryConfig::disabled())
        .timeout_config(timeouts);
    if let Some(credentials) = credentials {
        loader = loader.credentials_provider(credentials);
    }
    let shared = loader.load().await;

    // The SHA-256 of whole-object uploads is sent explicitly.
    let mut builder = aws_sdk_s3::config::Builder::from(&shared)
        .request_checksum_calculation(RequestChecksumCalculation::WhenRequired);
    if let Some(endpoint) = &destination.endpoint_url {
        builder = builder.endpoint_url(endpoint).force_path_style(true);
    }
    Client::from_conf(builder.build())
}

async fn cancelled(cancel: &CancellationToken) {
    while !cancel.is_cancelled() {
        tokio::time::sleep(CANCEL_POLL).await;
    }
}

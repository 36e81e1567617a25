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

//! Decides whether a failed S3 call is worth retrying.

use crate::domain::errors::{ExportError, TransferKind};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

const TRANSIENT_CODES: [&str; 8] = [
    "SlowDown",
    "RequestTimeout",
    "RequestTimeoutException",
    "InternalError",
    "ServiceUnavailable",
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
];

/// Classifies a service response from its S3 error code and HTTP status.
///
/// A known transient code wins over the status; otherwise 408, 429 and 5xx are
/// transient and everything else (403 AccessDenied, 404 NoSuchBucket,
/// 400 InvalidBucketName, 301 PermanentRedirect...) is fatal.
pub fn classify_response(code: Option<&str>, status: Option<u16>) -> TransferKind {
    if let Some(code) = code {
        if TRANSIENT_CODES.contains(&code) {
            return TransferKind::Transient;
        }
    }
    match status {
        Some(408) | Some(429) => TransferKind::Transient,
        Some(s) if (500..600).contains(&s) => TransferKind::Transient,
        _ => TransferKind::Fatal,
    }
}

pub fn classify_sdk_error<E>(err: &SdkError<E, HttpResponse>) -> TransferKind
where
    E: ProvideErrorMetadata,
{
    match err {
        SdkError::ConstructionFailure(_) => TransferKind::Fatal,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            TransferKind::Transient
        }
        SdkError::ServiceError(ctx) => {
            classify_response(ctx.err().code(), Some(ctx.raw().status().as_u16()))
        }
        _ => TransferKind::Transient,
    }
}

/// Wraps an SDK failure of `operation` into a classified `ExportError`.
pub fn transfer_error<E>(operation: &str, err: SdkError<E, HttpResponse>) -> ExportError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let kind = classify_sdk_error(&err);
    ExportError::Transfer {
        kind,
        message: format!("{} failed: {}", operation, DisplayErrorContext(&err)),
    }
}

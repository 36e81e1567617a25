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

//! # Storage Port
//!
//! Contract for the "Data Shipper": put a finished artifact at a bucket/key.

use crate::config::{Destination, UploadSettings};
use crate::domain::cancellation::CancellationToken;
use crate::domain::entities::{SerializedArtifact, UploadReceipt};
use crate::domain::errors::Result;

pub trait StoragePort: Send + Sync {
    /// Makes one upload attempt, overwriting any object already at the key.
    ///
    /// Either the whole artifact becomes visible at the key or nothing does.
    /// Errors must be `ExportError::Transfer` classified as transient or fatal
    /// (or `Cancelled`); retrying is the caller's business. The returned
    /// receipt reports `attempts = 1`.
    fn upload(
        &self,
        artifact: &SerializedArtifact,
        destination: &Destination,
        settings: &UploadSettings,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt>;
}

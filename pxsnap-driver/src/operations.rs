// Copyright 2025 The NativeLink Authors. All rights reserved.
//
// Licensed under the Functional Source License, Version 1.1, Apache 2.0 Future License (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    See LICENSE file for details
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use core::fmt::Debug;

use async_trait::async_trait;
use pxsnap_error::Error;

use crate::types::{
    CloudBackupCreateRequest, CloudBackupCreateResponse, CloudBackupDeleteRequest,
    CloudBackupEnumerateRequest, CloudBackupEnumerateResponse, CloudBackupRestoreRequest,
    CloudBackupRestoreResponse, CloudBackupStatusRequest, CloudBackupStatusResponse, Volume,
    VolumeLocator,
};

/// The control plane operations the snapshot strategies need.
/// This abstraction allows for easier testing by mocking responses.
#[async_trait]
pub trait VolumeDriver: Send + Sync + Debug {
    /// Looks a volume up by id. An unknown id yields an empty list.
    async fn inspect(&self, volume_id: &str) -> Result<Vec<Volume>, Error>;

    /// Snapshots `volume_id` and returns the id of the new volume.
    async fn snapshot(
        &self,
        volume_id: &str,
        readonly: bool,
        locator: VolumeLocator,
        no_retry: bool,
    ) -> Result<String, Error>;

    async fn delete(&self, volume_id: &str) -> Result<(), Error>;

    /// Starts a backup job; the response names the job handle.
    async fn cloud_backup_create(
        &self,
        request: CloudBackupCreateRequest,
    ) -> Result<CloudBackupCreateResponse, Error>;

    async fn cloud_backup_enumerate(
        &self,
        request: CloudBackupEnumerateRequest,
    ) -> Result<CloudBackupEnumerateResponse, Error>;

    /// Starts a restore job; the response names the job handle.
    async fn cloud_backup_restore(
        &self,
        request: CloudBackupRestoreRequest,
    ) -> Result<CloudBackupRestoreResponse, Error>;

    async fn cloud_backup_status(
        &self,
        request: CloudBackupStatusRequest,
    ) -> Result<CloudBackupStatusResponse, Error>;

    async fn cloud_backup_delete(&self, request: CloudBackupDeleteRequest) -> Result<(), Error>;
}

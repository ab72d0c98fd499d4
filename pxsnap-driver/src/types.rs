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

use core::fmt;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Driver name the control plane registers its volumes under.
pub const PXD_DRIVER_NAME: &str = "pxd";

/// Fixed client id placed in the token subject. Must stay unique across all
/// accounts talking to the control plane.
pub const CLIENT_ID: &str = "velero-portworx-plugin";

/// Display name placed in issued tokens.
pub const TOKEN_NAME: &str = "Stork";

pub const ROLE_USER: &str = "system.user";
pub const ROLE_ADMIN: &str = "system.admin";

/// Port the management API listens on when the service does not name one.
pub const DEFAULT_MGMT_PORT: u16 = 9001;

/// Name of the management port on the control plane service.
pub const MGMT_PORT_NAME: &str = "px-api";

/// Placement and labelling of a volume.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeLocator {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub volume_labels: HashMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Volume {
    pub id: String,
    #[serde(default)]
    pub locator: VolumeLocator,
    #[serde(default)]
    pub readonly: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapCreateRequest {
    pub id: String,
    pub locator: VolumeLocator,
    pub readonly: bool,
    pub no_retry: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeResponse {
    #[serde(default)]
    pub error: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeCreateResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub volume_response: Option<VolumeResponse>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapCreateResponse {
    #[serde(default)]
    pub volume_create_response: Option<VolumeCreateResponse>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CloudBackupCreateRequest {
    #[serde(rename = "VolumeID")]
    pub volume_id: String,
    #[serde(rename = "CredentialUUID")]
    pub credential_uuid: String,
    pub full: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CloudBackupCreateResponse {
    /// Handle of the backup job.
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudBackupEnumerateRequest {
    #[serde(rename = "CredentialUUID")]
    pub credential_uuid: String,
    #[serde(rename = "CloudBackupID")]
    pub cloud_backup_id: String,
}

/// A backup that exists in the object store.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CloudBackupInfo {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "SrcVolumeID", default)]
    pub src_volume_id: String,
    #[serde(default)]
    pub src_volume_name: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CloudBackupEnumerateResponse {
    #[serde(default)]
    pub backups: Vec<CloudBackupInfo>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CloudBackupRestoreRequest {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "CredentialUUID")]
    pub credential_uuid: String,
    pub restore_volume_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CloudBackupRestoreResponse {
    #[serde(rename = "RestoreVolumeID", default)]
    pub restore_volume_id: String,
    /// Handle of the restore job.
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudBackupStatusRequest {
    #[serde(rename = "ID")]
    pub id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CloudBackupDeleteRequest {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "CredentialUUID")]
    pub credential_uuid: String,
    pub force: bool,
}

/// Kind of asynchronous job running on the control plane.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CloudBackupOpType {
    #[default]
    Backup,
    Restore,
}

impl fmt::Display for CloudBackupOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backup => f.write_str("backup"),
            Self::Restore => f.write_str("restore"),
        }
    }
}

/// Raw job status as reported by the control plane.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CloudBackupStatusType {
    #[default]
    NotStarted,
    Queued,
    Active,
    Paused,
    Done,
    Failed,
    Aborted,
    Stopped,
    #[serde(other)]
    Invalid,
}

/// Lifecycle phase a raw status classifies into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Queued,
    Active,
    Completed,
    Failed,
}

impl CloudBackupStatusType {
    pub const fn phase(self) -> JobPhase {
        match self {
            Self::Done => JobPhase::Completed,
            Self::Failed | Self::Aborted | Self::Stopped => JobPhase::Failed,
            Self::NotStarted | Self::Queued => JobPhase::Queued,
            Self::Active | Self::Paused | Self::Invalid => JobPhase::Active,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CloudBackupStatus {
    /// Backup id once the job has produced one.
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub op_type: CloudBackupOpType,
    #[serde(default)]
    pub status: CloudBackupStatusType,
    #[serde(default)]
    pub info: Vec<String>,
    #[serde(rename = "SrcVolumeID", default)]
    pub src_volume_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CloudBackupStatusResponse {
    /// Keyed by job handle.
    #[serde(default)]
    pub statuses: HashMap<String, CloudBackupStatus>,
}

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

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pxsnap_config::snapshot::PluginSpec;
use pxsnap_driver::session::ClientSession;
use pxsnap_driver::types::{
    CloudBackupCreateRequest, CloudBackupDeleteRequest, CloudBackupEnumerateRequest,
    CloudBackupOpType, CloudBackupRestoreRequest,
};
use pxsnap_error::{Code, Error, ResultExt, make_err};
use tracing::{Level, event};
use uuid::Uuid;

use crate::strategy::SnapshotStrategy;
use crate::waiter::CompletionWaiter;

pub const CLOUD_VOLUME_TYPE: &str = "portworx-cloudsnapshot";

/// Prefix of volumes created by a cloud restore.
pub const RESTORED_VOLUME_PREFIX: &str = "pvc-";

/// Snapshots uploaded to an object store by the storage cluster. Backup and
/// restore are jobs; both calls block until the job finishes.
#[derive(Debug)]
pub struct CloudSnapshot {
    session: Arc<ClientSession>,
    waiter: CompletionWaiter,
    credential_id: String,
}

impl CloudSnapshot {
    pub const fn new(session: Arc<ClientSession>, waiter: CompletionWaiter) -> Self {
        Self {
            session,
            waiter,
            credential_id: String::new(),
        }
    }
}

#[async_trait]
impl SnapshotStrategy for CloudSnapshot {
    fn initialize(&mut self, spec: &PluginSpec) -> Result<(), Error> {
        self.credential_id = spec.credential_id().to_string();
        if self.credential_id.is_empty() {
            event!(
                Level::WARN,
                "No cloud credential configured, the storage cluster default will be used"
            );
        }
        event!(Level::INFO, credential_id = %self.credential_id, "Initialized cloud snapshot strategy");
        Ok(())
    }

    async fn create_snapshot(
        &self,
        volume_id: &str,
        _volume_az: &str,
        _tags: &HashMap<String, String>,
    ) -> Result<String, Error> {
        let driver = self.session.user_driver().await?;
        let job = driver
            .cloud_backup_create(CloudBackupCreateRequest {
                volume_id: volume_id.to_string(),
                credential_uuid: self.credential_id.clone(),
                full: true,
            })
            .await
            .err_tip(|| format!("Starting cloud backup of volume {volume_id}"))?
            .name;
        event!(Level::INFO, %volume_id, %job, "Started cloud backup");

        let status = self
            .waiter
            .wait(driver.as_ref(), &job, CloudBackupOpType::Backup)
            .await
            .err_tip(|| format!("Waiting for cloud backup of volume {volume_id}"))?;

        // Some control plane versions only fill in the backup id on a later
        // status read.
        let backup_id = if status.id.is_empty() {
            self.waiter
                .query_status(driver.as_ref(), &job)
                .await
                .err_tip(|| format!("Fetching result of backup job {job}"))?
                .map(|status| status.id)
                .unwrap_or_default()
        } else {
            status.id
        };
        if backup_id.is_empty() {
            return Err(make_err!(
                Code::Internal,
                "Backup job {job} finished without a backup id"
            ));
        }
        event!(Level::INFO, %volume_id, %backup_id, "Cloud backup completed");
        Ok(backup_id)
    }

    async fn create_volume_from_snapshot(
        &self,
        snapshot_id: &str,
        _volume_type: &str,
        _volume_az: &str,
        _iops: Option<i64>,
    ) -> Result<String, Error> {
        let driver = self.session.user_driver().await?;
        let backups = driver
            .cloud_backup_enumerate(CloudBackupEnumerateRequest {
                credential_uuid: self.credential_id.clone(),
                cloud_backup_id: snapshot_id.to_string(),
            })
            .await
            .err_tip(|| format!("Enumerating cloud backups for {snapshot_id}"))?
            .backups;

        // The control plane may return more than was asked for.
        let source_name = backups
            .into_iter()
            .find(|backup| backup.id == snapshot_id)
            .map(|backup| backup.src_volume_name)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                make_err!(
                    Code::NotFound,
                    "could not find backup associated with ID: {snapshot_id}"
                )
            })?;

        let target = format!("{RESTORED_VOLUME_PREFIX}{}", Uuid::new_v4());
        event!(Level::INFO, %snapshot_id, %source_name, %target, "Starting cloud restore");
        let job = driver
            .cloud_backup_restore(CloudBackupRestoreRequest {
                id: snapshot_id.to_string(),
                credential_uuid: self.credential_id.clone(),
                restore_volume_name: target.clone(),
            })
            .await
            .err_tip(|| format!("Starting restore of cloud backup {snapshot_id}"))?
            .name;

        self.waiter
            .wait(driver.as_ref(), &job, CloudBackupOpType::Restore)
            .await
            .err_tip(|| format!("Waiting for restore of cloud backup {snapshot_id}"))?;
        event!(Level::INFO, %snapshot_id, volume = %target, "Cloud restore completed");
        Ok(target)
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), Error> {
        let driver = self.session.user_driver().await?;
        driver
            .cloud_backup_delete(CloudBackupDeleteRequest {
                id: snapshot_id.to_string(),
                credential_uuid: self.credential_id.clone(),
                force: false,
            })
            .await?;
        event!(Level::INFO, %snapshot_id, "Deleted cloud backup");
        Ok(())
    }

    fn describe_volume(
        &self,
        _volume_id: &str,
        _volume_az: &str,
    ) -> Result<(String, Option<i64>), Error> {
        Ok((CLOUD_VOLUME_TYPE.to_string(), None))
    }
}

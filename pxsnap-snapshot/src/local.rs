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
use pxsnap_config::snapshot::{DEFAULT_BACKUP_TAG_KEY, DEFAULT_LINEAGE_LABEL_KEY, PluginSpec};
use pxsnap_driver::session::ClientSession;
use pxsnap_driver::types::VolumeLocator;
use pxsnap_error::{Code, Error, ResultExt};
use tracing::{Level, event};

use crate::strategy::SnapshotStrategy;

pub const LOCAL_VOLUME_TYPE: &str = "portworx-snapshot";

/// Snapshots kept on the storage cluster. Every call completes synchronously.
#[derive(Debug)]
pub struct LocalSnapshot {
    session: Arc<ClientSession>,
    lineage_label_key: String,
    backup_tag_key: String,
}

impl LocalSnapshot {
    pub fn new(session: Arc<ClientSession>) -> Self {
        Self {
            session,
            lineage_label_key: DEFAULT_LINEAGE_LABEL_KEY.to_string(),
            backup_tag_key: DEFAULT_BACKUP_TAG_KEY.to_string(),
        }
    }
}

#[async_trait]
impl SnapshotStrategy for LocalSnapshot {
    fn initialize(&mut self, spec: &PluginSpec) -> Result<(), Error> {
        self.lineage_label_key = spec.lineage_label_key().to_string();
        self.backup_tag_key = spec.backup_tag_key().to_string();
        event!(
            Level::INFO,
            lineage_label_key = %self.lineage_label_key,
            backup_tag_key = %self.backup_tag_key,
            "Initialized local snapshot strategy"
        );
        Ok(())
    }

    async fn create_snapshot(
        &self,
        volume_id: &str,
        _volume_az: &str,
        tags: &HashMap<String, String>,
    ) -> Result<String, Error> {
        let driver = self.session.user_driver().await?;
        let source = driver
            .inspect(volume_id)
            .await
            .err_tip(|| format!("Inspecting volume {volume_id}"))?
            .into_iter()
            .next()
            .err_tip_with_code(|_| (Code::NotFound, format!("Volume {volume_id} not found")))?;

        let source_name = source.locator.name;
        let mut labels = tags.clone();
        labels.insert(self.lineage_label_key.clone(), source_name.clone());
        let backup_name = labels
            .get(&self.backup_tag_key)
            .map(|name| name.trim())
            .unwrap_or_default();
        let locator = VolumeLocator {
            name: format!("{backup_name}_{source_name}"),
            volume_labels: labels,
        };

        event!(Level::INFO, %volume_id, snapshot_name = %locator.name, "Creating local snapshot");
        let snapshot_id = driver
            .snapshot(volume_id, true, locator, true)
            .await
            .err_tip(|| format!("Snapshotting volume {volume_id}"))?;
        event!(Level::INFO, %volume_id, %snapshot_id, "Created local snapshot");
        Ok(snapshot_id)
    }

    async fn create_volume_from_snapshot(
        &self,
        snapshot_id: &str,
        _volume_type: &str,
        _volume_az: &str,
        _iops: Option<i64>,
    ) -> Result<String, Error> {
        let driver = self.session.user_driver().await?;
        let snapshot = driver
            .inspect(snapshot_id)
            .await
            .err_tip(|| format!("Inspecting snapshot {snapshot_id}"))?
            .into_iter()
            .next()
            .err_tip_with_code(|_| (Code::NotFound, format!("Snapshot {snapshot_id} not found")))?;

        let name = match snapshot.locator.volume_labels.get(&self.lineage_label_key) {
            Some(name) => name.clone(),
            None => {
                event!(
                    Level::WARN,
                    %snapshot_id,
                    label = %self.lineage_label_key,
                    "Snapshot has no lineage label, restoring without a name"
                );
                String::new()
            }
        };

        let volume_id = driver
            .snapshot(
                snapshot_id,
                false,
                VolumeLocator {
                    name,
                    ..VolumeLocator::default()
                },
                true,
            )
            .await
            .err_tip(|| format!("Restoring volume from snapshot {snapshot_id}"))?;
        event!(Level::INFO, %snapshot_id, %volume_id, "Restored volume from local snapshot");
        Ok(volume_id)
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), Error> {
        let driver = self.session.user_driver().await?;
        match driver.delete(snapshot_id).await {
            Ok(()) => {
                event!(Level::INFO, %snapshot_id, "Deleted local snapshot");
                Ok(())
            }
            Err(err) if err.code == Code::NotFound => {
                event!(Level::INFO, %snapshot_id, "Snapshot already gone");
                Ok(())
            }
            Err(err) => Err(err).err_tip(|| format!("Deleting snapshot {snapshot_id}")),
        }
    }

    fn describe_volume(
        &self,
        _volume_id: &str,
        _volume_az: &str,
    ) -> Result<(String, Option<i64>), Error> {
        Ok((LOCAL_VOLUME_TYPE.to_string(), None))
    }
}

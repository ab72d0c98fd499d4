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
use std::collections::HashMap;

use async_trait::async_trait;
use pxsnap_config::snapshot::PluginSpec;
use pxsnap_error::Error;

/// Contract every snapshot flavour implements. The orchestrator only ever
/// talks to one of these through [`crate::plugin::Plugin`].
#[async_trait]
pub trait SnapshotStrategy: Send + Sync + Debug {
    /// Applies the plugin config. Called once before any other method.
    fn initialize(&mut self, spec: &PluginSpec) -> Result<(), Error>;

    /// Snapshots `volume_id` and returns the new snapshot id.
    async fn create_snapshot(
        &self,
        volume_id: &str,
        volume_az: &str,
        tags: &HashMap<String, String>,
    ) -> Result<String, Error>;

    /// Materializes a new volume from `snapshot_id` and returns its id.
    async fn create_volume_from_snapshot(
        &self,
        snapshot_id: &str,
        volume_type: &str,
        volume_az: &str,
        iops: Option<i64>,
    ) -> Result<String, Error>;

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), Error>;

    /// Returns the volume type and IOPS reported to the orchestrator.
    fn describe_volume(&self, volume_id: &str, volume_az: &str)
    -> Result<(String, Option<i64>), Error>;
}

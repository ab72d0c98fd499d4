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

use pxsnap_config::snapshot::{PluginSpec, SnapshotType};
use pxsnap_driver::session::ClientSession;
use pxsnap_error::{Code, Error, ResultExt, make_err, make_input_err};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{Level, event};

use crate::cloud::CloudSnapshot;
use crate::local::LocalSnapshot;
use crate::strategy::SnapshotStrategy;
use crate::volume_id::VolumeIdAdapter;
use crate::waiter::CompletionWaiter;

#[derive(Debug)]
struct Initialized {
    snapshot_type: SnapshotType,
    session: Arc<ClientSession>,
    strategy: Box<dyn SnapshotStrategy>,
    volume_ids: VolumeIdAdapter,
}

/// Entry point handed to the backup orchestrator.
///
/// Nothing works until [`Plugin::initialize`] succeeds; afterwards every call
/// is forwarded to the configured strategy.
#[derive(Debug, Default)]
pub struct Plugin {
    state: Option<Initialized>,
    shutdown: CancellationToken,
}

impl Plugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `config` and connects to the control plane.
    pub async fn initialize(&mut self, config: &HashMap<String, String>) -> Result<(), Error> {
        let spec = PluginSpec::from_config_map(config).err_tip(|| "Parsing plugin config")?;
        let session = ClientSession::from_spec(&spec.session())
            .await
            .err_tip(|| "Creating control plane session")?;
        self.initialize_with_session(&spec, Arc::new(session))
    }

    /// Like [`Plugin::initialize`], with a session built by the caller.
    pub fn initialize_with_session(
        &mut self,
        spec: &PluginSpec,
        session: Arc<ClientSession>,
    ) -> Result<(), Error> {
        spec.validate()
            .map_err(|msg| make_input_err!("{msg}"))
            .err_tip(|| "Validating plugin config")?;
        let mut strategy: Box<dyn SnapshotStrategy> = match spec.snapshot_type {
            SnapshotType::Local => Box::new(LocalSnapshot::new(session.clone())),
            SnapshotType::Cloud => Box::new(CloudSnapshot::new(
                session.clone(),
                CompletionWaiter::new(&spec.wait(), self.shutdown.child_token()),
            )),
        };
        strategy
            .initialize(spec)
            .err_tip(|| format!("Initializing {} snapshot strategy", spec.snapshot_type))?;

        if self.state.is_some() {
            event!(Level::WARN, "Plugin initialized twice, replacing previous state");
        }
        event!(Level::INFO, snapshot_type = %spec.snapshot_type, "Plugin initialized");
        self.state = Some(Initialized {
            snapshot_type: spec.snapshot_type,
            session,
            strategy,
            volume_ids: VolumeIdAdapter::new(spec.csi_driver()),
        });
        Ok(())
    }

    fn state(&self) -> Result<&Initialized, Error> {
        self.state.as_ref().ok_or_else(|| {
            make_err!(
                Code::FailedPrecondition,
                "Snapshot plugin used before initialize"
            )
        })
    }

    pub fn snapshot_type(&self) -> Result<SnapshotType, Error> {
        Ok(self.state()?.snapshot_type)
    }

    pub async fn create_snapshot(
        &self,
        volume_id: &str,
        volume_az: &str,
        tags: &HashMap<String, String>,
    ) -> Result<String, Error> {
        self.state()?
            .strategy
            .create_snapshot(volume_id, volume_az, tags)
            .await
    }

    pub async fn create_volume_from_snapshot(
        &self,
        snapshot_id: &str,
        volume_type: &str,
        volume_az: &str,
        iops: Option<i64>,
    ) -> Result<String, Error> {
        self.state()?
            .strategy
            .create_volume_from_snapshot(snapshot_id, volume_type, volume_az, iops)
            .await
    }

    pub async fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), Error> {
        self.state()?.strategy.delete_snapshot(snapshot_id).await
    }

    pub fn describe_volume(
        &self,
        volume_id: &str,
        volume_az: &str,
    ) -> Result<(String, Option<i64>), Error> {
        self.state()?
            .strategy
            .describe_volume(volume_id, volume_az)
    }

    pub fn get_volume_id(&self, descriptor: &Value) -> Result<String, Error> {
        self.state()?.volume_ids.get_volume_id(descriptor)
    }

    pub fn set_volume_id(&self, descriptor: &Value, volume_id: &str) -> Result<Value, Error> {
        self.state()?
            .volume_ids
            .set_volume_id(descriptor, volume_id)
    }

    /// Token with admin privileges for the configured control plane.
    pub fn admin_token(&self) -> Result<String, Error> {
        self.state()?.session.admin_token()
    }

    /// Aborts every in-flight wait with `Cancelled`. Waits started afterwards
    /// are cancelled immediately.
    pub fn shutdown(&self) {
        event!(Level::INFO, "Shutting down snapshot plugin");
        self.shutdown.cancel();
    }
}

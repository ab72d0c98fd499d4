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

//! Reads and writes the storage identifier inside a `PersistentVolume`.
//!
//! Descriptors come in as JSON objects and are never mutated in place;
//! [`VolumeIdAdapter::set_volume_id`] returns an updated copy.

use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeSpec};
use pxsnap_error::{Code, Error, ResultExt, make_input_err};
use serde_json::Value;
use tracing::{Level, event};

#[derive(Debug, Clone)]
pub struct VolumeIdAdapter {
    csi_driver: String,
}

fn parse(descriptor: &Value) -> Result<PersistentVolume, Error> {
    serde_json::from_value(descriptor.clone()).err_tip_with_code(|e| {
        (
            Code::InvalidArgument,
            format!("Malformed PersistentVolume descriptor: {}", e.message_string()),
        )
    })
}

impl VolumeIdAdapter {
    pub fn new(csi_driver: impl Into<String>) -> Self {
        Self {
            csi_driver: csi_driver.into(),
        }
    }

    pub fn csi_driver(&self) -> &str {
        &self.csi_driver
    }

    /// Returns the storage identifier of the volume, or an empty string if the
    /// volume is not ours.
    pub fn get_volume_id(&self, descriptor: &Value) -> Result<String, Error> {
        let pv = parse(descriptor)?;
        let Some(spec) = pv.spec else {
            return Ok(String::new());
        };

        if let Some(csi) = &spec.csi {
            if csi.driver == self.csi_driver {
                return Ok(csi.volume_handle.clone());
            }
            event!(Level::INFO, driver = %csi.driver, "Unable to handle CSI driver");
        }

        if let Some(portworx) = &spec.portworx_volume {
            if portworx.volume_id.is_empty() {
                return Err(make_input_err!("Portworx volume has an empty volumeID"));
            }
            return Ok(portworx.volume_id.clone());
        }

        Ok(String::new())
    }

    /// Returns a copy of `descriptor` pointing at `volume_id`.
    pub fn set_volume_id(&self, descriptor: &Value, volume_id: &str) -> Result<Value, Error> {
        let mut pv = parse(descriptor)?;
        let spec: &mut PersistentVolumeSpec = pv
            .spec
            .as_mut()
            .err_tip_with_code(|_| (Code::InvalidArgument, "PersistentVolume has no spec"))?;

        if let Some(csi) = spec.csi.as_mut() {
            if csi.driver != self.csi_driver {
                return Err(make_input_err!(
                    "Unable to handle CSI driver {}",
                    csi.driver
                ));
            }
            csi.volume_handle = volume_id.to_string();
        } else if let Some(portworx) = spec.portworx_volume.as_mut() {
            portworx.volume_id = volume_id.to_string();
            pv.metadata.name = Some(volume_id.to_string());
        } else {
            return Err(make_input_err!(
                "PersistentVolume has neither a CSI nor a Portworx volume source"
            ));
        }

        serde_json::to_value(&pv).err_tip(|| "Serializing updated PersistentVolume")
    }
}

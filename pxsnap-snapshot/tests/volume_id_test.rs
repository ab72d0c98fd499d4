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

use pretty_assertions::assert_eq;
use pxsnap_config::snapshot::DEFAULT_CSI_DRIVER;
use pxsnap_error::{Code, Error};
use pxsnap_snapshot::volume_id::VolumeIdAdapter;
use serde_json::{Value, json};

fn csi_pv(driver: &str, handle: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolume",
        "metadata": { "name": "pvc-1234" },
        "spec": {
            "capacity": { "storage": "10Gi" },
            "csi": { "driver": driver, "volumeHandle": handle },
        },
    })
}

fn portworx_pv(volume_id: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolume",
        "metadata": { "name": "pvc-1234" },
        "spec": {
            "portworxVolume": { "volumeID": volume_id, "fsType": "ext4" },
        },
    })
}

fn nfs_pv() -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolume",
        "metadata": { "name": "pvc-nfs" },
        "spec": {
            "nfs": { "server": "10.0.0.9", "path": "/exports" },
        },
    })
}

fn adapter() -> VolumeIdAdapter {
    VolumeIdAdapter::new(DEFAULT_CSI_DRIVER)
}

#[test]
fn get_reads_matching_csi_handle() -> Result<(), Error> {
    assert_eq!(
        adapter().get_volume_id(&csi_pv("pxd.portworx.com", "1122334455"))?,
        "1122334455"
    );
    Ok(())
}

#[test]
fn get_ignores_foreign_csi_driver() -> Result<(), Error> {
    assert_eq!(
        adapter().get_volume_id(&csi_pv("other.csi.driver", "abc"))?,
        ""
    );
    Ok(())
}

#[test]
fn get_honours_configured_csi_driver() -> Result<(), Error> {
    let adapter = VolumeIdAdapter::new("px.example.com");
    assert_eq!(adapter.csi_driver(), "px.example.com");
    assert_eq!(
        adapter.get_volume_id(&csi_pv("px.example.com", "abc"))?,
        "abc"
    );
    assert_eq!(
        adapter.get_volume_id(&csi_pv("pxd.portworx.com", "abc"))?,
        ""
    );
    Ok(())
}

#[test]
fn get_reads_portworx_volume_id() -> Result<(), Error> {
    assert_eq!(adapter().get_volume_id(&portworx_pv("778899"))?, "778899");
    Ok(())
}

#[test]
fn get_rejects_empty_portworx_volume_id() {
    let err = adapter().get_volume_id(&portworx_pv("")).unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
}

#[test]
fn get_without_identifier_is_empty() -> Result<(), Error> {
    assert_eq!(adapter().get_volume_id(&nfs_pv())?, "");
    Ok(())
}

#[test]
fn get_rejects_malformed_descriptor() {
    let err = adapter()
        .get_volume_id(&json!({ "kind": "PersistentVolume", "spec": "nope" }))
        .unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);

    let err = adapter()
        .get_volume_id(&json!({ "apiVersion": "v1", "kind": "Pod" }))
        .unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
}

#[test]
fn set_rewrites_csi_handle() -> Result<(), Error> {
    let original = csi_pv("pxd.portworx.com", "old");
    let updated = adapter().set_volume_id(&original, "new")?;

    assert_eq!(updated["spec"]["csi"]["volumeHandle"], "new");
    assert_eq!(updated["metadata"]["name"], "pvc-1234");
    assert_eq!(updated["spec"]["capacity"]["storage"], "10Gi");
    // The input is left alone.
    assert_eq!(original["spec"]["csi"]["volumeHandle"], "old");
    Ok(())
}

#[test]
fn set_then_get_round_trips() -> Result<(), Error> {
    let adapter = adapter();
    for descriptor in [csi_pv("pxd.portworx.com", "old"), portworx_pv("old")] {
        let updated = adapter.set_volume_id(&descriptor, "restored-1")?;
        assert_eq!(adapter.get_volume_id(&updated)?, "restored-1");
    }
    Ok(())
}

#[test]
fn set_renames_portworx_volume() -> Result<(), Error> {
    let updated = adapter().set_volume_id(&portworx_pv("old"), "restored-1")?;

    assert_eq!(updated["spec"]["portworxVolume"]["volumeID"], "restored-1");
    assert_eq!(updated["spec"]["portworxVolume"]["fsType"], "ext4");
    assert_eq!(updated["metadata"]["name"], "restored-1");
    Ok(())
}

#[test]
fn set_rejects_foreign_csi_driver() {
    let err = adapter()
        .set_volume_id(&csi_pv("other.csi.driver", "abc"), "new")
        .unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
}

#[test]
fn set_without_identifier_fails() {
    let err = adapter().set_volume_id(&nfs_pv(), "new").unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
}

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

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use pretty_assertions::assert_eq;
use pxsnap_config::snapshot::{PluginSpec, SnapshotType};
use pxsnap_driver::auth::Claims;
use pxsnap_driver::endpoint::StaticEndpoint;
use pxsnap_driver::mocks::{MockConnector, MockVolumeDriver, StatusStep};
use pxsnap_driver::session::ClientSession;
use pxsnap_driver::types::CloudBackupStatusType;
use pxsnap_error::{Code, Error};
use pxsnap_macro::pxsnap_test;
use pxsnap_snapshot::plugin::Plugin;
use serde_json::json;

const SECRET: &str = "px-shared-secret";

fn config(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn make_session(driver: &Arc<MockVolumeDriver>, shared_secret: Option<&str>) -> Arc<ClientSession> {
    Arc::new(ClientSession::new(
        "portworx.com".to_string(),
        shared_secret.map(str::to_string),
        Arc::new(StaticEndpoint("http://10.0.0.1:9001".to_string())),
        Arc::new(MockConnector::new(driver.clone())),
    ))
}

fn make_plugin(driver: &Arc<MockVolumeDriver>, pairs: &[(&str, &str)]) -> Plugin {
    let spec = PluginSpec::from_config_map(&config(pairs)).unwrap();
    let mut plugin = Plugin::new();
    plugin
        .initialize_with_session(&spec, make_session(driver, None))
        .unwrap();
    plugin
}

#[pxsnap_test]
async fn operations_fail_before_initialize() -> Result<(), Error> {
    let plugin = Plugin::new();
    let pv = json!({ "apiVersion": "v1", "kind": "PersistentVolume" });

    let codes = [
        plugin
            .create_snapshot("vol-1", "", &HashMap::new())
            .await
            .unwrap_err()
            .code,
        plugin
            .create_volume_from_snapshot("snap-1", "", "", None)
            .await
            .unwrap_err()
            .code,
        plugin.delete_snapshot("snap-1").await.unwrap_err().code,
        plugin.describe_volume("vol-1", "").unwrap_err().code,
        plugin.get_volume_id(&pv).unwrap_err().code,
        plugin.set_volume_id(&pv, "vol-2").unwrap_err().code,
        plugin.admin_token().unwrap_err().code,
        plugin.snapshot_type().unwrap_err().code,
    ];

    assert_eq!(codes, [Code::FailedPrecondition; 8]);
    Ok(())
}

#[pxsnap_test]
async fn unknown_snapshot_type_is_rejected() -> Result<(), Error> {
    let mut plugin = Plugin::new();

    let err = plugin
        .initialize(&config(&[("type", "tape")]))
        .await
        .unwrap_err();

    assert_eq!(err.code, Code::InvalidArgument);
    assert!(
        err.message_string().contains("Snapshot type tape not supported"),
        "{err}"
    );
    assert_eq!(
        plugin.snapshot_type().unwrap_err().code,
        Code::FailedPrecondition
    );
    Ok(())
}

#[pxsnap_test]
async fn unknown_config_key_is_rejected() -> Result<(), Error> {
    let mut plugin = Plugin::new();

    let err = plugin
        .initialize(&config(&[("PX_ENDPOINTS", "http://px:9001")]))
        .await
        .unwrap_err();

    assert_eq!(err.code, Code::InvalidArgument);
    Ok(())
}

#[pxsnap_test]
async fn initialize_with_static_endpoint() -> Result<(), Error> {
    let mut plugin = Plugin::new();

    plugin
        .initialize(&config(&[
            ("type", "local"),
            ("PX_ENDPOINT", "http://127.0.0.1:9001"),
        ]))
        .await?;

    assert_eq!(plugin.snapshot_type()?, SnapshotType::Local);
    assert_eq!(plugin.admin_token()?, "");
    Ok(())
}

#[pxsnap_test]
async fn local_type_forwards_to_local_strategy() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    driver.add_volume("vol-1", "pvc-data", &[]).await;
    let plugin = make_plugin(&driver, &[]);

    assert_eq!(plugin.snapshot_type()?, SnapshotType::Local);
    let snapshot_id = plugin
        .create_snapshot("vol-1", "", &config(&[("velero.io/backup", "b1")]))
        .await?;
    assert_eq!(
        plugin.describe_volume(&snapshot_id, "")?,
        ("portworx-snapshot".to_string(), None)
    );

    let volume_id = plugin
        .create_volume_from_snapshot(&snapshot_id, "portworx-snapshot", "", None)
        .await?;
    assert_eq!(
        driver.get_volume(&volume_id).await.unwrap().locator.name,
        "pvc-data"
    );

    plugin.delete_snapshot(&snapshot_id).await?;
    plugin.delete_snapshot(&snapshot_id).await?;
    Ok(())
}

#[pxsnap_test(start_paused = true)]
async fn cloud_type_forwards_to_cloud_strategy() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    driver.push_job_name("job-9").await;
    driver
        .script_status(
            "job-9",
            vec![
                StatusStep::status(CloudBackupStatusType::Active),
                StatusStep::done("bk-42"),
            ],
        )
        .await;
    let plugin = make_plugin(
        &driver,
        &[
            ("type", "cloud"),
            ("credId", "cred-1"),
            ("waitPollIntervalSecs", "1"),
        ],
    );

    assert_eq!(plugin.snapshot_type()?, SnapshotType::Cloud);
    assert_eq!(
        plugin
            .create_snapshot("vol-X", "", &HashMap::new())
            .await?,
        "bk-42"
    );
    assert_eq!(
        plugin.describe_volume("bk-42", "")?,
        ("portworx-cloudsnapshot".to_string(), None)
    );
    Ok(())
}

#[pxsnap_test(start_paused = true)]
async fn shutdown_cancels_cloud_waits() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    driver.push_job_name("job-1").await;
    driver
        .script_status(
            "job-1",
            vec![StatusStep::status(CloudBackupStatusType::Active)],
        )
        .await;
    let plugin = make_plugin(&driver, &[("type", "cloud")]);

    plugin.shutdown();
    let err = plugin
        .create_snapshot("vol-1", "", &HashMap::new())
        .await
        .unwrap_err();

    assert_eq!(err.code, Code::Cancelled);
    Ok(())
}

#[pxsnap_test]
async fn volume_id_uses_configured_csi_driver() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    let plugin = make_plugin(&driver, &[("PX_CSI_DRIVER", "px.example.com")]);
    let pv = json!({
        "apiVersion": "v1",
        "kind": "PersistentVolume",
        "metadata": { "name": "pvc-1" },
        "spec": { "csi": { "driver": "px.example.com", "volumeHandle": "old" } },
    });

    assert_eq!(plugin.get_volume_id(&pv)?, "old");
    let updated = plugin.set_volume_id(&pv, "new")?;
    assert_eq!(plugin.get_volume_id(&updated)?, "new");
    Ok(())
}

#[pxsnap_test]
async fn admin_token_carries_admin_role() -> Result<(), Error> {
    let driver = Arc::new(MockVolumeDriver::new());
    let spec = PluginSpec::from_config_map(&config(&[("PX_JWT_ISSUER", "portworx.com")]))?;
    let mut plugin = Plugin::new();
    plugin.initialize_with_session(&spec, make_session(&driver, Some(SECRET)))?;

    let token = plugin.admin_token()?;
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp", "sub"]);
    let claims = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(SECRET.as_bytes()),
        &validation,
    )
    .unwrap()
    .claims;

    assert_eq!(claims.roles, vec!["system.admin".to_string()]);
    assert_eq!(claims.iss, "portworx.com");
    Ok(())
}

#[pxsnap_test]
async fn initialize_rejects_unusable_wait_settings() -> Result<(), Error> {
    let mut plugin = Plugin::new();
    let err = plugin
        .initialize(&config(&[
            ("type", "cloud"),
            ("waitTimeoutSecs", "18446744073709551615"),
        ]))
        .await
        .unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);

    // Specs deserialized elsewhere, i.e. from the CLI's config file, are
    // checked as well.
    let driver = Arc::new(MockVolumeDriver::new());
    let spec: PluginSpec = serde_json::from_value(json!({
        "type": "cloud",
        "queryRetryDelaySecs": "inf",
    }))?;
    let err = plugin
        .initialize_with_session(&spec, make_session(&driver, None))
        .unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
    assert_eq!(plugin.snapshot_type().unwrap_err().code, Code::FailedPrecondition);
    Ok(())
}

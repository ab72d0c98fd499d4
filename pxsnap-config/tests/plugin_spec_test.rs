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

use core::time::Duration;
use std::collections::HashMap;

use pretty_assertions::assert_eq;
use pxsnap_config::snapshot::{
    ClientTlsConfig, DEFAULT_CSI_DRIVER, DEFAULT_NAMESPACE, MAX_QUERY_RETRY_DELAY_S, MAX_WAIT_SECS,
    PluginSpec, SharedSecretSource, SnapshotType,
};

fn config_map(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[test]
fn test_empty_config_uses_defaults() {
    let spec = PluginSpec::from_config_map(&HashMap::new()).unwrap();
    assert_eq!(spec.snapshot_type, SnapshotType::Local);
    assert_eq!(spec.namespace(), DEFAULT_NAMESPACE);
    assert_eq!(spec.csi_driver(), DEFAULT_CSI_DRIVER);
    assert_eq!(spec.lineage_label_key(), "pvName");
    assert_eq!(spec.backup_tag_key(), "velero.io/backup");
    assert_eq!(spec.credential_id(), "");

    let session = spec.session();
    assert_eq!(session.service_name, "portworx-service");
    assert_eq!(session.secret, SharedSecretSource::None);
    assert_eq!(session.tls, None);

    let wait = spec.wait();
    assert_eq!(wait.poll_interval, Duration::from_secs(10));
    assert_eq!(wait.timeout, Duration::from_secs(6 * 60 * 60));
    assert_eq!(wait.query_retry.max_retries, 3);
}

#[test]
fn test_cloud_config_parses() {
    let spec = PluginSpec::from_config_map(&config_map(&[
        ("type", "cloud"),
        ("credId", "cred-1"),
        ("PX_NAMESPACE", "portworx"),
        ("PX_SHARED_SECRET", "s3cr3t"),
        ("PX_JWT_ISSUER", "portworx.com"),
    ]))
    .unwrap();
    assert_eq!(spec.snapshot_type, SnapshotType::Cloud);
    assert_eq!(spec.credential_id(), "cred-1");
    assert_eq!(spec.namespace(), "portworx");

    let session = spec.session();
    assert_eq!(session.namespace, "portworx");
    assert_eq!(session.jwt_issuer, "portworx.com");
    assert_eq!(
        session.secret,
        SharedSecretSource::Inline("s3cr3t".to_string())
    );
}

#[test]
fn test_unknown_snapshot_type_rejected() {
    let err = PluginSpec::from_config_map(&config_map(&[("type", "remote")])).unwrap_err();
    assert!(
        err.to_string().contains("Snapshot type remote not supported"),
        "unexpected error: {err}"
    );
}

#[test]
fn test_unknown_key_rejected() {
    let err = PluginSpec::from_config_map(&config_map(&[("PX_NAMESPCE", "x")])).unwrap_err();
    assert!(err.to_string().contains("unknown field"), "{err}");
}

#[test]
fn test_env_expansion() {
    unsafe { std::env::set_var("PXSNAP_TEST_SHARED_SECRET", "from-env") };
    let spec = PluginSpec::from_config_map(&config_map(&[(
        "PX_SHARED_SECRET",
        "${PXSNAP_TEST_SHARED_SECRET}",
    )]))
    .unwrap();
    assert_eq!(
        spec.session().secret,
        SharedSecretSource::Inline("from-env".to_string())
    );
}

#[test]
fn test_wait_durations_accept_seconds_and_human_readable() {
    let spec = PluginSpec::from_config_map(&config_map(&[
        ("waitPollIntervalSecs", "15"),
        ("waitTimeoutSecs", "1h 30m"),
        ("queryMaxRetries", "5"),
        ("queryRetryDelaySecs", "0.25"),
    ]))
    .unwrap();
    let wait = spec.wait();
    assert_eq!(wait.poll_interval, Duration::from_secs(15));
    assert_eq!(wait.timeout, Duration::from_secs(90 * 60));
    assert_eq!(wait.query_retry.max_retries, 5);
    assert_eq!(wait.query_retry.delay, 0.25);
}

#[test]
fn test_secret_reference_defaults_namespace() {
    let spec = PluginSpec::from_config_map(&config_map(&[
        ("PX_NAMESPACE", "portworx"),
        ("PX_SHARED_SECRET", "ignored"),
        ("PX_SECRET_NAME", "px-auth"),
        ("PX_SECRET_KEY", "shared-secret"),
    ]))
    .unwrap();
    assert_eq!(
        spec.session().secret,
        SharedSecretSource::KubernetesSecret {
            name: "px-auth".to_string(),
            namespace: "portworx".to_string(),
            key: Some("shared-secret".to_string()),
        }
    );
}

#[test]
fn test_blank_values_fall_back_to_defaults() {
    let spec = PluginSpec::from_config_map(&config_map(&[
        ("type", ""),
        ("PX_NAMESPACE", "  "),
        ("PX_CSI_DRIVER", ""),
    ]))
    .unwrap();
    assert_eq!(spec.snapshot_type, SnapshotType::Local);
    assert_eq!(spec.namespace(), DEFAULT_NAMESPACE);
    assert_eq!(spec.csi_driver(), DEFAULT_CSI_DRIVER);
}

#[test]
fn test_tls_files_collected() {
    let spec = PluginSpec::from_config_map(&config_map(&[
        ("PX_TLS_CA_FILE", "/etc/px/ca.pem"),
        ("PX_ENDPOINT", "https://10.0.0.7:9001"),
    ]))
    .unwrap();
    let session = spec.session();
    assert_eq!(session.endpoint.as_deref(), Some("https://10.0.0.7:9001"));
    assert_eq!(
        session.tls,
        Some(ClientTlsConfig {
            ca_file: Some("/etc/px/ca.pem".to_string()),
            cert_file: None,
            key_file: None,
        })
    );
}

#[test]
fn test_json5_config_file_shape() {
    // The CLI reads the same map from a json5 file.
    let spec: PluginSpec = serde_json5::from_str(
        r#"{
            type: "cloud",
            credId: "cred-2",
            waitTimeoutSecs: 600,
        }"#,
    )
    .unwrap();
    assert_eq!(spec.snapshot_type, SnapshotType::Cloud);
    assert_eq!(spec.wait().timeout, Duration::from_secs(600));
}

#[test]
fn test_wait_settings_out_of_range_are_rejected() {
    for (key, value) in [
        ("waitTimeoutSecs", "18446744073709551615"),
        ("waitPollIntervalSecs", "18446744073709551615"),
        ("queryRetryDelaySecs", "1e30"),
        ("queryRetryDelaySecs", "inf"),
        ("queryRetryDelaySecs", "NaN"),
        ("queryRetryDelaySecs", "-1"),
    ] {
        let err = PluginSpec::from_config_map(&config_map(&[(key, value)])).unwrap_err();
        assert!(err.to_string().contains(key), "{key} = {value}: {err}");
    }
}

#[test]
fn test_wait_settings_at_the_limit_are_accepted() {
    let spec = PluginSpec::from_config_map(&config_map(&[
        ("waitTimeoutSecs", &MAX_WAIT_SECS.to_string()),
        ("queryRetryDelaySecs", "3600"),
    ]))
    .unwrap();
    assert_eq!(spec.wait().timeout, Duration::from_secs(MAX_WAIT_SECS));
    assert_eq!(spec.wait().query_retry.delay, MAX_QUERY_RETRY_DELAY_S);
}

#[test]
fn test_validate_catches_specs_not_built_from_a_config_map() {
    let spec: PluginSpec = serde_json5::from_str(r#"{ waitTimeoutSecs: "18446744073709551615" }"#).unwrap();
    assert!(spec.validate().unwrap_err().contains("waitTimeoutSecs"));
}

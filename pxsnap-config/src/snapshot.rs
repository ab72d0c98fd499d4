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
use core::str::FromStr;
use core::time::Duration;
use std::collections::HashMap;

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::deser::{ShellExpand, ShellExpandSeconds};

/// Namespace the storage platform is installed into when `PX_NAMESPACE` is
/// not set.
pub const DEFAULT_NAMESPACE: &str = "kube-system";

/// Name of the Kubernetes service fronting the control plane.
pub const DEFAULT_SERVICE_NAME: &str = "portworx-service";

/// CSI driver name registered by the storage platform.
pub const DEFAULT_CSI_DRIVER: &str = "pxd.portworx.com";

/// Label recording the source volume's display name on local snapshots.
pub const DEFAULT_LINEAGE_LABEL_KEY: &str = "pvName";

/// Tag the orchestrator uses to carry the backup name.
pub const DEFAULT_BACKUP_TAG_KEY: &str = "velero.io/backup";

pub const DEFAULT_WAIT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);
pub const DEFAULT_QUERY_MAX_RETRIES: usize = 3;
pub const DEFAULT_QUERY_RETRY_DELAY_S: f32 = 0.5;

/// Largest accepted `waitTimeoutSecs` and `waitPollIntervalSecs`.
pub const MAX_WAIT_SECS: u64 = 30 * 24 * 60 * 60;
/// Largest accepted `queryRetryDelaySecs`.
pub const MAX_QUERY_RETRY_DELAY_S: f32 = 60. * 60.;

/// Which snapshot flavour the plugin drives.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotType {
    /// Snapshots live on the storage cluster itself and are created
    /// synchronously.
    #[default]
    Local,

    /// Snapshots are uploaded to an object store by the storage cluster.
    /// Every mutating call is an asynchronous job that has to be waited on.
    Cloud,
}

impl FromStr for SnapshotType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "local" => Ok(Self::Local),
            "cloud" => Ok(Self::Cloud),
            other => Err(format!("Snapshot type {other} not supported")),
        }
    }
}

impl fmt::Display for SnapshotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Cloud => f.write_str("cloud"),
        }
    }
}

/// Plugin configuration exactly as handed over by the backup orchestrator.
///
/// The orchestrator passes a flat `string -> string` map, so every field is
/// keyed by its orchestrator-facing name and accepts string values (with
/// `${ENV}` expansion).
///
/// **Example JSON Config:**
/// ```json
/// {
///   "type": "cloud",
///   "credId": "8c1f6d3e-0b7e-4c3e-9a51-6c2f8f0f3b11",
///   "PX_NAMESPACE": "portworx",
///   "PX_SHARED_SECRET": "${PX_SHARED_SECRET}",
///   "PX_JWT_ISSUER": "portworx.com",
///   "waitTimeoutSecs": "2h"
/// }
/// ```
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct PluginSpec {
    /// Snapshot strategy, `local` or `cloud`.
    ///
    /// Default: local
    #[serde(rename = "type", default)]
    #[serde_as(as = "ShellExpand")]
    pub snapshot_type: SnapshotType,

    /// Namespace the storage platform runs in.
    ///
    /// Default: kube-system
    #[serde(rename = "PX_NAMESPACE", default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub namespace: Option<String>,

    /// Identifier of the stored credential set cloud backups are written
    /// with. Empty means the cluster's default credential.
    #[serde(rename = "credId", default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub credential_id: Option<String>,

    /// Shared secret used to sign access tokens. When neither this nor
    /// `PX_SECRET_NAME` is set the control plane is called unauthenticated.
    #[serde(rename = "PX_SHARED_SECRET", default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub shared_secret: Option<String>,

    /// Issuer placed in signed access tokens.
    #[serde(rename = "PX_JWT_ISSUER", default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub jwt_issuer: Option<String>,

    /// Static control plane endpoint, i.e. `http://10.0.0.1:9001`. When unset
    /// the endpoint is looked up from the cluster's service registry.
    #[serde(rename = "PX_ENDPOINT", default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub endpoint: Option<String>,

    /// Service to look the endpoint up from.
    ///
    /// Default: portworx-service
    #[serde(rename = "PX_SERVICE_NAME", default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub service_name: Option<String>,

    /// Kubernetes secret holding the shared secret.
    #[serde(rename = "PX_SECRET_NAME", default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub secret_name: Option<String>,

    /// Namespace of `PX_SECRET_NAME`.
    ///
    /// Default: same as `PX_NAMESPACE`
    #[serde(rename = "PX_SECRET_NAMESPACE", default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub secret_namespace: Option<String>,

    /// Data key inside `PX_SECRET_NAME`. Required when `PX_SECRET_NAME` is set.
    #[serde(rename = "PX_SECRET_KEY", default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub secret_key: Option<String>,

    /// Path to the certificate authority used to verify the control plane.
    #[serde(rename = "PX_TLS_CA_FILE", default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub tls_ca_file: Option<String>,

    /// Path to the client certificate for mutual TLS.
    #[serde(rename = "PX_TLS_CERT_FILE", default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub tls_cert_file: Option<String>,

    /// Path to the client private key for mutual TLS.
    #[serde(rename = "PX_TLS_KEY_FILE", default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub tls_key_file: Option<String>,

    /// CSI driver name whose volume handles belong to this platform.
    ///
    /// Default: pxd.portworx.com
    #[serde(rename = "PX_CSI_DRIVER", default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub csi_driver: Option<String>,

    /// Label carrying the source volume name on local snapshots.
    ///
    /// Default: pvName
    #[serde(rename = "lineageLabelKey", default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub lineage_label_key: Option<String>,

    /// Tag carrying the backup name in the orchestrator's snapshot tags.
    ///
    /// Default: velero.io/backup
    #[serde(rename = "backupTagKey", default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub backup_tag_key: Option<String>,

    /// Seconds between two status polls of a cloud job. Accepts `"10"` or
    /// `"10s"`.
    ///
    /// Default: 10
    #[serde(rename = "waitPollIntervalSecs", default)]
    #[serde_as(as = "Option<ShellExpandSeconds>")]
    pub wait_poll_interval_s: Option<u64>,

    /// Upper bound in seconds on how long a cloud job is waited on.
    ///
    /// Default: 21600 (6h)
    #[serde(rename = "waitTimeoutSecs", default)]
    #[serde_as(as = "Option<ShellExpandSeconds>")]
    pub wait_timeout_s: Option<u64>,

    /// Retries of a failed status query before the wait gives up.
    ///
    /// Default: 3
    #[serde(rename = "queryMaxRetries", default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub query_max_retries: Option<usize>,

    /// Base delay in seconds for backing off failed status queries.
    /// Fractions are allowed, i.e. `"0.5"`.
    ///
    /// Default: 0.5
    #[serde(rename = "queryRetryDelaySecs", default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub query_retry_delay_s: Option<f32>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}

impl PluginSpec {
    /// Parses the orchestrator's config map.
    pub fn from_config_map(config: &HashMap<String, String>) -> Result<Self, serde_json::Error> {
        let object = config
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        let spec: Self = serde_json::from_value(serde_json::Value::Object(object))?;
        spec.validate().map_err(serde::de::Error::custom)?;
        Ok(spec)
    }

    /// Rejects wait settings that parse but cannot be turned into deadlines.
    pub fn validate(&self) -> Result<(), String> {
        for (key, value) in [
            ("waitPollIntervalSecs", self.wait_poll_interval_s),
            ("waitTimeoutSecs", self.wait_timeout_s),
        ] {
            if let Some(secs) = value.filter(|secs| *secs > MAX_WAIT_SECS) {
                return Err(format!("{key} = {secs} exceeds the maximum of {MAX_WAIT_SECS}"));
            }
        }
        // NaN fails the range check too.
        if let Some(delay) = self
            .query_retry_delay_s
            .filter(|delay| !(0. ..=MAX_QUERY_RETRY_DELAY_S).contains(delay))
        {
            return Err(format!(
                "queryRetryDelaySecs = {delay} must be between 0 and {MAX_QUERY_RETRY_DELAY_S}"
            ));
        }
        Ok(())
    }

    pub fn namespace(&self) -> &str {
        non_empty(self.namespace.as_ref()).unwrap_or(DEFAULT_NAMESPACE)
    }

    pub fn credential_id(&self) -> &str {
        non_empty(self.credential_id.as_ref()).unwrap_or_default()
    }

    pub fn csi_driver(&self) -> &str {
        non_empty(self.csi_driver.as_ref()).unwrap_or(DEFAULT_CSI_DRIVER)
    }

    pub fn lineage_label_key(&self) -> &str {
        non_empty(self.lineage_label_key.as_ref()).unwrap_or(DEFAULT_LINEAGE_LABEL_KEY)
    }

    pub fn backup_tag_key(&self) -> &str {
        non_empty(self.backup_tag_key.as_ref()).unwrap_or(DEFAULT_BACKUP_TAG_KEY)
    }

    /// Everything needed to reach and authenticate against the control plane.
    pub fn session(&self) -> SessionSpec {
        let secret = match non_empty(self.secret_name.as_ref()) {
            Some(name) => SharedSecretSource::KubernetesSecret {
                name: name.to_string(),
                namespace: non_empty(self.secret_namespace.as_ref())
                    .unwrap_or_else(|| self.namespace())
                    .to_string(),
                key: non_empty(self.secret_key.as_ref()).map(str::to_string),
            },
            None => match non_empty(self.shared_secret.as_ref()) {
                Some(value) => SharedSecretSource::Inline(value.to_string()),
                None => SharedSecretSource::None,
            },
        };
        let tls = if self.tls_ca_file.is_some()
            || self.tls_cert_file.is_some()
            || self.tls_key_file.is_some()
        {
            Some(ClientTlsConfig {
                ca_file: self.tls_ca_file.clone(),
                cert_file: self.tls_cert_file.clone(),
                key_file: self.tls_key_file.clone(),
            })
        } else {
            None
        };
        SessionSpec {
            namespace: self.namespace().to_string(),
            service_name: non_empty(self.service_name.as_ref())
                .unwrap_or(DEFAULT_SERVICE_NAME)
                .to_string(),
            endpoint: non_empty(self.endpoint.as_ref()).map(str::to_string),
            jwt_issuer: non_empty(self.jwt_issuer.as_ref())
                .unwrap_or_default()
                .to_string(),
            secret,
            tls,
        }
    }

    /// Bounds for waiting on asynchronous cloud jobs.
    pub fn wait(&self) -> WaitSpec {
        WaitSpec {
            poll_interval: self
                .wait_poll_interval_s
                .map_or(DEFAULT_WAIT_POLL_INTERVAL, Duration::from_secs),
            timeout: self
                .wait_timeout_s
                .map_or(DEFAULT_WAIT_TIMEOUT, Duration::from_secs),
            query_retry: Retry {
                max_retries: self.query_max_retries.unwrap_or(DEFAULT_QUERY_MAX_RETRIES),
                delay: self
                    .query_retry_delay_s
                    .unwrap_or(DEFAULT_QUERY_RETRY_DELAY_S),
                jitter: 0.5,
                retry_on_errors: None,
            },
        }
    }
}

/// Where the token signing secret comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SharedSecretSource {
    /// Authentication is disabled.
    #[default]
    None,

    /// The secret was passed in the plugin config.
    Inline(String),

    /// The secret is read from a Kubernetes secret at initialization.
    KubernetesSecret {
        name: String,
        namespace: String,
        key: Option<String>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientTlsConfig {
    /// Path to the certificate authority to use to validate the remote.
    ///
    /// Default: None, platform roots are used.
    pub ca_file: Option<String>,

    /// Path to the certificate file for client authentication.
    ///
    /// Default: None
    pub cert_file: Option<String>,

    /// Path to the private key file for client authentication.
    ///
    /// Default: None
    pub key_file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSpec {
    pub namespace: String,
    pub service_name: String,
    pub endpoint: Option<String>,
    pub jwt_issuer: String,
    pub secret: SharedSecretSource,
    pub tls: Option<ClientTlsConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaitSpec {
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Applied to every single status query, not to the wait as a whole.
    pub query_retry: Retry,
}

impl Default for WaitSpec {
    fn default() -> Self {
        PluginSpec::default().wait()
    }
}

/// Retry configuration. This configuration is exponential and each iteration
/// a jitter as a percentage is applied of the calculated delay. For example:
/// ```haskell
/// Retry{
///   max_retries: 7,
///   delay: 0.1,
///   jitter: 0.5,
/// }
/// ```
/// will result in:
/// Attempt - Delay
/// 1         0ms
/// 2         75ms - 125ms
/// 3         150ms - 250ms
/// 4         300ms - 500ms
/// 5         600ms - 1s
/// 6         1.2s - 2s
/// 7         2.4s - 4s
/// 8         4.8s - 8s
/// Remember that to get total results is additive, meaning the above results
/// would mean a single request would have a total delay of 9.525s - 15.875s.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Retry {
    /// Maximum number of retries until retrying stops.
    /// Setting this to zero will always attempt 1 time, but not retry.
    #[serde(default)]
    pub max_retries: usize,

    /// Delay in seconds for exponential back off.
    #[serde(default)]
    pub delay: f32,

    /// Amount of jitter to add as a percentage in decimal form. This will
    /// change the formula like:
    /// ```haskell
    /// random(
    ///    (2 ^ {attempt_number}) * {delay} * (1 - (jitter / 2)),
    ///    (2 ^ {attempt_number}) * {delay} * (1 + (jitter / 2)),
    /// )
    /// ```
    #[serde(default)]
    pub jitter: f32,

    /// A list of error codes to retry on, if this is not set then the default
    /// error codes to retry on are used. These default codes are the most
    /// likely to be non-permanent.
    ///  - `Unknown`
    ///  - `Cancelled`
    ///  - `DeadlineExceeded`
    ///  - `ResourceExhausted`
    ///  - `Aborted`
    ///  - `Internal`
    ///  - `Unavailable`
    ///  - `DataLoss`
    #[serde(default)]
    pub retry_on_errors: Option<Vec<ErrorCode>>,
}

impl Retry {
    pub fn make_jitter_fn(&self) -> Arc<dyn Fn(Duration) -> Duration + Send + Sync> {
        if self.jitter == 0f32 {
            Arc::new(move |delay: Duration| delay)
        } else {
            let local_jitter = self.jitter;
            Arc::new(move |delay: Duration| {
                let factor = local_jitter.mul_add(rand::rng().random::<f32>() - 0.5, 1.);
                Duration::try_from_secs_f32(delay.as_secs_f32() * factor.max(0.)).unwrap_or(delay)
            })
        }
    }
}

/// The possible error codes that might occur on an upstream request.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
    // Note: This list is duplicated from pxsnap-error/lib.rs.
}

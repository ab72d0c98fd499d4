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

use k8s_openapi::api::core::v1::Secret;
use kube::Api;
use pxsnap_config::snapshot::SharedSecretSource;
use pxsnap_error::{Code, Error, make_err, make_input_err};

/// Produces the token signing secret, if any. Kubernetes is only contacted
/// for [`SharedSecretSource::KubernetesSecret`].
pub async fn resolve_shared_secret(
    source: &SharedSecretSource,
    client: Option<&kube::Client>,
) -> Result<Option<String>, Error> {
    match source {
        SharedSecretSource::None => Ok(None),
        SharedSecretSource::Inline(value) => Ok(Some(value.clone())),
        SharedSecretSource::KubernetesSecret {
            name,
            namespace,
            key,
        } => {
            let Some(key) = key else {
                return Err(make_input_err!(
                    "PX_SECRET_KEY must be set together with PX_SECRET_NAME"
                ));
            };
            let client = client.ok_or_else(|| {
                make_err!(
                    Code::Internal,
                    "No Kubernetes client to read secret {namespace}/{name}"
                )
            })?;
            let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
            let secret = match secrets.get(name).await {
                Ok(secret) => secret,
                Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                    return Err(make_input_err!("Secret {namespace}/{name} not found"));
                }
                Err(e) => {
                    return Err(make_err!(
                        Code::Unavailable,
                        "Failed to read secret {namespace}/{name}: {e}"
                    ));
                }
            };
            secret_value(&secret, key).map(Some)
        }
    }
}

/// Reads `key` from a secret, preferring `data` over `stringData`.
pub fn secret_value(secret: &Secret, key: &str) -> Result<String, Error> {
    let name = secret.metadata.name.as_deref().unwrap_or_default();
    let raw = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|bytes| String::from_utf8(bytes.0.clone()))
        .transpose()
        .map_err(|_| make_input_err!("Key {key} of secret {name} is not valid UTF-8"))?
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(key))
                .cloned()
        })
        .ok_or_else(|| make_input_err!("Secret {name} has no key {key}"))?;
    let value = raw.trim_end_matches(['\r', '\n']).to_string();
    if value.is_empty() {
        return Err(make_input_err!("Key {key} of secret {name} is empty"));
    }
    Ok(value)
}

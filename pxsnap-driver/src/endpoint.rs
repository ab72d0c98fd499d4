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

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::Api;
use pxsnap_error::{Code, Error, make_err};
use tracing::{Level, event};

use crate::types::{DEFAULT_MGMT_PORT, MGMT_PORT_NAME};

/// Finds the address of the control plane's management API.
#[async_trait]
pub trait EndpointResolver: Send + Sync + Debug {
    /// Returns a base URL such as `http://10.0.0.1:9001`.
    async fn resolve(&self) -> Result<String, Error>;
}

/// Endpoint given verbatim in the plugin config.
#[derive(Debug, Clone)]
pub struct StaticEndpoint(pub String);

#[async_trait]
impl EndpointResolver for StaticEndpoint {
    async fn resolve(&self) -> Result<String, Error> {
        if self.0.trim().is_empty() {
            return Err(make_err!(Code::Unavailable, "Configured endpoint is empty"));
        }
        Ok(self.0.trim().trim_end_matches('/').to_string())
    }
}

/// Looks the control plane service up in the cluster.
#[derive(Clone)]
pub struct KubeServiceResolver {
    client: kube::Client,
    namespace: String,
    service_name: String,
    scheme: &'static str,
}

impl Debug for KubeServiceResolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KubeServiceResolver")
            .field("namespace", &self.namespace)
            .field("service_name", &self.service_name)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

impl KubeServiceResolver {
    pub const fn new(
        client: kube::Client,
        namespace: String,
        service_name: String,
        use_tls: bool,
    ) -> Self {
        Self {
            client,
            namespace,
            service_name,
            scheme: if use_tls { "https" } else { "http" },
        }
    }
}

#[async_trait]
impl EndpointResolver for KubeServiceResolver {
    async fn resolve(&self) -> Result<String, Error> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), &self.namespace);
        let service = match services.get(&self.service_name).await {
            Ok(service) => service,
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                return Err(make_err!(
                    Code::Unavailable,
                    "Service {}/{} not found",
                    self.namespace,
                    self.service_name
                ));
            }
            Err(e) => {
                return Err(make_err!(
                    Code::Unavailable,
                    "Failed to look up service {}/{}: {e}",
                    self.namespace,
                    self.service_name
                ));
            }
        };
        let endpoint = endpoint_from_service(&service, self.scheme)?;
        event!(
            Level::INFO,
            namespace = %self.namespace,
            service = %self.service_name,
            %endpoint,
            "Resolved control plane endpoint"
        );
        Ok(endpoint)
    }
}

/// Derives the management endpoint from a service object: its cluster IP
/// plus the port named `px-api`, else the default management port.
pub fn endpoint_from_service(service: &Service, scheme: &str) -> Result<String, Error> {
    let name = service.metadata.name.as_deref().unwrap_or_default();
    let spec = service
        .spec
        .as_ref()
        .ok_or_else(|| make_err!(Code::Unavailable, "Service {name} has no spec"))?;
    let cluster_ip = spec
        .cluster_ip
        .as_deref()
        .filter(|ip| !ip.is_empty() && *ip != "None")
        .ok_or_else(|| make_err!(Code::Unavailable, "Service {name} has no cluster IP"))?;
    let port = spec
        .ports
        .iter()
        .flatten()
        .find(|port| port.name.as_deref() == Some(MGMT_PORT_NAME))
        .and_then(|port| u16::try_from(port.port).ok())
        .unwrap_or(DEFAULT_MGMT_PORT);
    let host = if cluster_ip.contains(':') {
        format!("[{cluster_ip}]")
    } else {
        cluster_ip.to_string()
    };
    Ok(format!("{scheme}://{host}:{port}"))
}

/// Connects to the cluster with the ambient kubeconfig or in-cluster
/// service account.
pub async fn connect_kube() -> Result<kube::Client, Error> {
    kube::Client::try_default()
        .await
        .map_err(|e| make_err!(Code::Unavailable, "Failed to connect to Kubernetes: {e}"))
}

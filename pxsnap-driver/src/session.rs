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
use core::time::Duration;
use std::sync::Arc;
use std::time::SystemTime;

use pxsnap_config::snapshot::{SessionSpec, SharedSecretSource};
use pxsnap_error::{Code, Error, ResultExt};
use pxsnap_util::tls_utils::load_client_config;
use rustls::ClientConfig;
use tokio::sync::OnceCell;
use tracing::{Level, event};

use crate::auth::Claims;
use crate::endpoint::{EndpointResolver, KubeServiceResolver, StaticEndpoint, connect_kube};
use crate::operations::VolumeDriver;
use crate::rest_client::RestVolumeDriver;
use crate::secrets::resolve_shared_secret;
use crate::types::{ROLE_ADMIN, ROLE_USER};

/// Lifetime of every issued token.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Builds a driver handle for an endpoint and bearer token.
pub trait DriverConnector: Send + Sync + Debug {
    fn connect(&self, endpoint: &str, token: &str) -> Result<Arc<dyn VolumeDriver>, Error>;
}

/// Connects with [`RestVolumeDriver`].
#[derive(Debug, Clone, Default)]
pub struct RestConnector {
    tls_config: Option<ClientConfig>,
}

impl RestConnector {
    pub const fn new(tls_config: Option<ClientConfig>) -> Self {
        Self { tls_config }
    }
}

impl DriverConnector for RestConnector {
    fn connect(&self, endpoint: &str, token: &str) -> Result<Arc<dyn VolumeDriver>, Error> {
        Ok(Arc::new(RestVolumeDriver::new(
            endpoint,
            token,
            self.tls_config.clone(),
        )?))
    }
}

/// Authenticated access to the control plane.
///
/// Every operation gets its own handle carrying a freshly minted token; the
/// only cached state is the resolved endpoint.
pub struct ClientSession {
    jwt_issuer: String,
    shared_secret: Option<String>,
    resolver: Arc<dyn EndpointResolver>,
    connector: Arc<dyn DriverConnector>,
    endpoint: OnceCell<String>,
}

impl Debug for ClientSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClientSession")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("auth_enabled", &self.shared_secret.is_some())
            .field("resolver", &self.resolver)
            .field("connector", &self.connector)
            .field("endpoint", &self.endpoint.get())
            .finish()
    }
}

impl ClientSession {
    pub fn new(
        jwt_issuer: String,
        shared_secret: Option<String>,
        resolver: Arc<dyn EndpointResolver>,
        connector: Arc<dyn DriverConnector>,
    ) -> Self {
        Self {
            jwt_issuer,
            shared_secret: shared_secret.filter(|secret| !secret.is_empty()),
            resolver,
            connector,
            endpoint: OnceCell::new(),
        }
    }

    /// Builds the session described by the plugin config: loads TLS
    /// material, reads the shared secret and picks the endpoint resolver.
    pub async fn from_spec(spec: &SessionSpec) -> Result<Self, Error> {
        let tls_config =
            load_client_config(spec.tls.as_ref()).err_tip(|| "Loading control plane TLS config")?;
        let needs_kube = spec.endpoint.is_none()
            || matches!(spec.secret, SharedSecretSource::KubernetesSecret { .. });
        let kube_client = if needs_kube {
            Some(connect_kube().await?)
        } else {
            None
        };

        let shared_secret = resolve_shared_secret(&spec.secret, kube_client.as_ref())
            .await
            .err_tip(|| "Resolving shared secret")?;

        let resolver: Arc<dyn EndpointResolver> = if let Some(endpoint) = &spec.endpoint {
            Arc::new(StaticEndpoint(endpoint.clone()))
        } else {
            let client = kube_client.err_tip_with_code(|_| {
                (Code::Internal, "No Kubernetes client for endpoint lookup")
            })?;
            Arc::new(KubeServiceResolver::new(
                client,
                spec.namespace.clone(),
                spec.service_name.clone(),
                tls_config.is_some(),
            ))
        };

        event!(
            Level::INFO,
            namespace = %spec.namespace,
            auth_enabled = shared_secret.is_some(),
            tls_enabled = tls_config.is_some(),
            "Initializing control plane session"
        );

        Ok(Self::new(
            spec.jwt_issuer.clone(),
            shared_secret,
            resolver,
            Arc::new(RestConnector::new(tls_config)),
        ))
    }

    pub const fn auth_enabled(&self) -> bool {
        self.shared_secret.is_some()
    }

    /// Resolves the endpoint once; later calls reuse the result.
    pub async fn resolve_endpoint(&self) -> Result<&str, Error> {
        self.endpoint
            .get_or_try_init(|| self.resolver.resolve())
            .await
            .map(String::as_str)
            .err_tip(|| "Resolving control plane endpoint")
    }

    /// Mints a token with `roles`. Without a shared secret the token is empty
    /// and the control plane is called unauthenticated.
    pub fn issue_token(&self, roles: &[&str], lifetime: Duration) -> Result<String, Error> {
        let Some(shared_secret) = &self.shared_secret else {
            return Ok(String::new());
        };
        Claims::new(&self.jwt_issuer, roles, lifetime, SystemTime::now())?
            .sign(shared_secret)
            .err_tip_with_code(|_| (Code::Internal, "Signing control plane token"))
    }

    pub async fn get_driver_handle(&self, token: &str) -> Result<Arc<dyn VolumeDriver>, Error> {
        let endpoint = self.resolve_endpoint().await?;
        self.connector
            .connect(endpoint, token)
            .err_tip_with_code(|_| {
                (
                    Code::Unavailable,
                    format!("Connecting to control plane at {endpoint}"),
                )
            })
    }

    /// Handle authenticated with user privileges, for snapshot operations.
    pub async fn user_driver(&self) -> Result<Arc<dyn VolumeDriver>, Error> {
        let token = self.issue_token(&[ROLE_USER], TOKEN_LIFETIME)?;
        self.get_driver_handle(&token).await
    }

    /// Token with admin privileges, handed to callers that re-authenticate
    /// against the control plane on their own.
    pub fn admin_token(&self) -> Result<String, Error> {
        self.issue_token(&[ROLE_ADMIN], TOKEN_LIFETIME)
    }
}

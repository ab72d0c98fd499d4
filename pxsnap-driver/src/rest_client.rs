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

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderValue, USER_AGENT};
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client as LegacyClient;
use hyper_util::client::legacy::connect::HttpConnector as LegacyHttpConnector;
use hyper_util::rt::TokioExecutor;
use pxsnap_error::{Code, Error, ResultExt, error_if, make_err};
use pxsnap_util::tls_utils::default_client_config;
use rustls::ClientConfig;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{Level, event};

use crate::operations::VolumeDriver;
use crate::types::{
    CloudBackupCreateRequest, CloudBackupCreateResponse, CloudBackupDeleteRequest,
    CloudBackupEnumerateRequest, CloudBackupEnumerateResponse, CloudBackupRestoreRequest,
    CloudBackupRestoreResponse, CloudBackupStatusRequest, CloudBackupStatusResponse,
    SnapCreateRequest, SnapCreateResponse, Volume, VolumeLocator, VolumeResponse,
};

const VOLUMES_PATH: &str = "/v1/osd-volumes";
const SNAPSHOT_PATH: &str = "/v1/osd-snapshot";
const BACKUP_PATH: &str = "/v1/osd-volumes/backup";
const BACKUP_ENUMERATE_PATH: &str = "/v1/osd-volumes/backup/enumerate";
const BACKUP_RESTORE_PATH: &str = "/v1/osd-volumes/backup/restore";
const BACKUP_STATUS_PATH: &str = "/v1/osd-volumes/backup/status";

const CLIENT_USER_AGENT: &str = "pxsnap";

// Upper bound for a single control plane request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const IDLE_TIMEOUT: Duration = Duration::from_secs(15);

type HttpClient = LegacyClient<HttpsConnector<LegacyHttpConnector>, Full<Bytes>>;

/// `VolumeDriver` speaking the openstorage REST API.
#[derive(Clone)]
pub struct RestVolumeDriver {
    client: HttpClient,
    endpoint: String,
    auth_header: Option<HeaderValue>,
}

impl core::fmt::Debug for RestVolumeDriver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // The auth header is a credential and stays out of logs.
        f.debug_struct("RestVolumeDriver")
            .field("endpoint", &self.endpoint)
            .field("authenticated", &self.auth_header.is_some())
            .finish_non_exhaustive()
    }
}

impl RestVolumeDriver {
    /// Builds a driver bound to `endpoint` (`http://host:port` or
    /// `https://host:port`). An empty `token` disables authentication.
    pub fn new(endpoint: &str, token: &str, tls_config: Option<ClientConfig>) -> Result<Self, Error> {
        let uri = endpoint
            .parse::<Uri>()
            .map_err(|e| make_err!(Code::Unavailable, "Invalid endpoint {endpoint}: {e}"))?;
        error_if!(
            uri.host().is_none(),
            "Endpoint {endpoint} does not name a host"
        );
        if tls_config.is_some() && uri.scheme_str() != Some("https") {
            return Err(make_err!(
                Code::InvalidArgument,
                "TLS is configured, but the scheme of {endpoint} is not https"
            ));
        }

        let tls_config = match tls_config {
            Some(tls_config) => tls_config,
            None => default_client_config()?,
        };
        let connector = HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .build();
        let client = LegacyClient::builder(TokioExecutor::new())
            .pool_idle_timeout(IDLE_TIMEOUT)
            .build(connector);

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            auth_header: bearer_header(token)?,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Request<Full<Bytes>>, Error> {
        build_request(
            &self.endpoint,
            self.auth_header.as_ref(),
            method,
            path,
            body,
        )
    }

    async fn execute(&self, request: Request<Full<Bytes>>) -> Result<(StatusCode, Bytes), Error> {
        let method = request.method().clone();
        let uri = request.uri().clone();
        let response = tokio::time::timeout(REQUEST_TIMEOUT, self.client.request(request))
            .await
            .map_err(|_| {
                make_err!(
                    Code::DeadlineExceeded,
                    "{method} {uri} timed out after {REQUEST_TIMEOUT:?}"
                )
            })?
            .map_err(|e| make_err!(Code::Unavailable, "{method} {uri} failed: {e:?}"))?;
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| make_err!(Code::Unavailable, "Reading response of {method} {uri}: {e:?}"))?
            .to_bytes();
        event!(Level::DEBUG, %method, %uri, %status, "control plane request finished");
        Ok((status, body))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<T, Error> {
        let request = self.build_request(method.clone(), path, body)?;
        let (status, bytes) = self.execute(request).await?;
        decode_response(&method, path, status, &bytes)
    }

    async fn call_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let body = serde_json::to_vec(body).err_tip(|| format!("Encoding body for {path}"))?;
        self.call(method, path, Some(body)).await
    }
}

fn bearer_header(token: &str) -> Result<Option<HeaderValue>, Error> {
    if token.is_empty() {
        return Ok(None);
    }
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| make_err!(Code::Internal, "Invalid token"))?;
    value.set_sensitive(true);
    Ok(Some(value))
}

/// Shapes a control plane request. Kept free of the connection so request
/// layout can be checked without a network.
pub fn build_request(
    endpoint: &str,
    auth_header: Option<&HeaderValue>,
    method: Method,
    path: &str,
    body: Option<Vec<u8>>,
) -> Result<Request<Full<Bytes>>, Error> {
    let uri = format!("{endpoint}{path}")
        .parse::<Uri>()
        .map_err(|e| make_err!(Code::InvalidArgument, "Invalid URI {endpoint}{path}: {e}"))?;
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(ACCEPT, "application/json")
        .header(USER_AGENT, CLIENT_USER_AGENT);
    if let Some(auth_header) = auth_header {
        builder = builder.header(AUTHORIZATION, auth_header.clone());
    }
    let body = match body {
        Some(body) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Full::new(Bytes::from(body))
        }
        None => Full::new(Bytes::new()),
    };
    builder
        .body(body)
        .map_err(|e| make_err!(Code::Internal, "Failed to build request: {e:?}"))
}

/// Maps an HTTP response onto `T`, turning non-success statuses into errors
/// whose code follows the status.
pub fn decode_response<T: DeserializeOwned>(
    method: &Method,
    path: &str,
    status: StatusCode,
    body: &[u8],
) -> Result<T, Error> {
    if !status.is_success() {
        let text = String::from_utf8_lossy(body);
        return Err(make_err!(
            Code::from_http_status(status.as_u16()),
            "{method} {path} failed: HTTP {status} - {}",
            text.trim()
        ));
    }
    // Some endpoints answer with an empty body on success.
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| {
        make_err!(
            Code::Internal,
            "Failed to decode response of {method} {path}: {e}"
        )
    })
}

fn volume_path(volume_id: &str) -> Result<String, Error> {
    error_if!(volume_id.is_empty(), "Volume id must not be empty");
    error_if!(
        volume_id.contains('/') || volume_id.contains('?'),
        "Volume id {volume_id} contains reserved characters"
    );
    Ok(format!("{VOLUMES_PATH}/{volume_id}"))
}

fn check_volume_response(response: Option<&VolumeResponse>, context: &str) -> Result<(), Error> {
    match response {
        Some(response) if !response.error.is_empty() => Err(make_err!(
            Code::Internal,
            "{context}: {}",
            response.error
        )),
        _ => Ok(()),
    }
}

#[async_trait]
impl VolumeDriver for RestVolumeDriver {
    async fn inspect(&self, volume_id: &str) -> Result<Vec<Volume>, Error> {
        let path = volume_path(volume_id)?;
        match self.call::<Option<Vec<Volume>>>(Method::GET, &path, None).await {
            Ok(volumes) => Ok(volumes.unwrap_or_default()),
            Err(err) if err.code == Code::NotFound => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    async fn snapshot(
        &self,
        volume_id: &str,
        readonly: bool,
        locator: VolumeLocator,
        no_retry: bool,
    ) -> Result<String, Error> {
        let request = SnapCreateRequest {
            id: volume_id.to_string(),
            locator,
            readonly,
            no_retry,
        };
        let response: SnapCreateResponse =
            self.call_json(Method::POST, SNAPSHOT_PATH, &request).await?;
        let create = response.volume_create_response.err_tip_with_code(|_| {
            (
                Code::Internal,
                format!("Snapshot of {volume_id} returned no create response"),
            )
        })?;
        check_volume_response(
            create.volume_response.as_ref(),
            &format!("Snapshot of {volume_id} failed"),
        )?;
        if create.id.is_empty() {
            return Err(make_err!(
                Code::Internal,
                "Snapshot of {volume_id} returned an empty id"
            ));
        }
        Ok(create.id)
    }

    async fn delete(&self, volume_id: &str) -> Result<(), Error> {
        let path = volume_path(volume_id)?;
        let response: Option<VolumeResponse> = self.call(Method::DELETE, &path, None).await?;
        check_volume_response(
            response.as_ref(),
            &format!("Delete of {volume_id} failed"),
        )
    }

    async fn cloud_backup_create(
        &self,
        request: CloudBackupCreateRequest,
    ) -> Result<CloudBackupCreateResponse, Error> {
        self.call_json(Method::POST, BACKUP_PATH, &request).await
    }

    async fn cloud_backup_enumerate(
        &self,
        request: CloudBackupEnumerateRequest,
    ) -> Result<CloudBackupEnumerateResponse, Error> {
        self.call_json(Method::POST, BACKUP_ENUMERATE_PATH, &request)
            .await
    }

    async fn cloud_backup_restore(
        &self,
        request: CloudBackupRestoreRequest,
    ) -> Result<CloudBackupRestoreResponse, Error> {
        self.call_json(Method::POST, BACKUP_RESTORE_PATH, &request)
            .await
    }

    async fn cloud_backup_status(
        &self,
        request: CloudBackupStatusRequest,
    ) -> Result<CloudBackupStatusResponse, Error> {
        self.call_json(Method::POST, BACKUP_STATUS_PATH, &request)
            .await
    }

    async fn cloud_backup_delete(&self, request: CloudBackupDeleteRequest) -> Result<(), Error> {
        let _: Option<serde_json::Value> =
            self.call_json(Method::DELETE, BACKUP_PATH, &request).await?;
        Ok(())
    }
}

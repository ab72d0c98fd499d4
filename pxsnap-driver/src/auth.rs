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
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use pxsnap_error::{Code, Error, make_err};
use serde::{Deserialize, Serialize};

use crate::types::{CLIENT_ID, TOKEN_NAME};

/// Issued-at is moved back by this much to tolerate clock skew between this
/// process and the control plane.
pub const IAT_SUBTRACT: Duration = Duration::from_secs(60);

/// Claims understood by the control plane's shared-secret authenticator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub name: String,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
    pub iat: u64,
    pub exp: u64,
}

impl Claims {
    pub fn new(
        issuer: &str,
        roles: &[&str],
        lifetime: Duration,
        now: SystemTime,
    ) -> Result<Self, Error> {
        let now = now
            .duration_since(UNIX_EPOCH)
            .map_err(|e| make_err!(Code::Internal, "System time error: {}", e))?;
        Ok(Self {
            iss: issuer.to_string(),
            sub: format!("{issuer}.{CLIENT_ID}"),
            name: TOKEN_NAME.to_string(),
            roles: roles.iter().map(ToString::to_string).collect(),
            // Be in all groups to have access to all resources.
            groups: vec!["*".to_string()],
            iat: now.saturating_sub(IAT_SUBTRACT).as_secs(),
            exp: (now + lifetime).as_secs(),
        })
    }

    /// Signs the claims HS256 with `shared_secret`.
    pub fn sign(&self, shared_secret: &str) -> Result<String, Error> {
        encode(
            &Header::new(Algorithm::HS256),
            self,
            &EncodingKey::from_secret(shared_secret.as_bytes()),
        )
        .map_err(|e| make_err!(Code::Internal, "JWT encoding failed: {}", e))
    }
}

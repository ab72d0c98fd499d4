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

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use hyper_rustls::ConfigBuilderExt;
use pxsnap_config::snapshot::ClientTlsConfig;
use pxsnap_error::{Code, Error, ResultExt, make_err};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, ConfigBuilder, RootCertStore, WantsVerifier};

fn client_config_builder() -> Result<ConfigBuilder<ClientConfig, WantsVerifier>, Error> {
    ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| make_err!(Code::Internal, "Unsupported TLS protocol versions: {e:?}"))
}

/// Client config trusting the bundled web PKI roots, used when the control
/// plane is reached over https without further TLS settings.
pub fn default_client_config() -> Result<ClientConfig, Error> {
    Ok(client_config_builder()?
        .with_webpki_roots()
        .with_no_client_auth())
}

fn read_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, Error> {
    let mut reader = BufReader::new(
        File::open(path).err_tip(|| format!("Failed to open certificate file {path}"))?,
    );
    let certs = CertificateDer::pem_reader_iter(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| make_err!(Code::InvalidArgument, "Invalid PEM in {path}: {e:?}"))?;
    if certs.is_empty() {
        return Err(make_err!(
            Code::InvalidArgument,
            "No certificates found in {path}"
        ));
    }
    Ok(certs)
}

fn read_key(path: &str) -> Result<PrivateKeyDer<'static>, Error> {
    let mut reader =
        BufReader::new(File::open(path).err_tip(|| format!("Failed to open key file {path}"))?);
    PrivateKeyDer::from_pem_reader(&mut reader)
        .map_err(|e| make_err!(Code::InvalidArgument, "Invalid private key in {path}: {e:?}"))
}

/// Builds the rustls configuration for talking to the control plane.
///
/// Returns `None` when no TLS settings are present; the caller then only
/// speaks plain HTTP unless the endpoint scheme says otherwise.
pub fn load_client_config(config: Option<&ClientTlsConfig>) -> Result<Option<ClientConfig>, Error> {
    let Some(config) = config else {
        return Ok(None);
    };

    let builder = if let Some(ca_file) = &config.ca_file {
        let mut root_store = RootCertStore::empty();
        for cert in read_certs(ca_file)? {
            root_store.add(cert).map_err(|e| {
                make_err!(
                    Code::Internal,
                    "Failed to add certificate to root store: {e:?}"
                )
            })?;
        }
        client_config_builder()?.with_root_certificates(root_store)
    } else {
        client_config_builder()?
            .with_native_roots()
            .err_tip(|| "Loading platform root certificates")?
    };

    let client_config = match (&config.cert_file, &config.key_file) {
        (Some(cert_file), Some(key_file)) => builder
            .with_client_auth_cert(read_certs(cert_file)?, read_key(key_file)?)
            .map_err(|e| make_err!(Code::InvalidArgument, "Invalid client identity: {e:?}"))?,
        (Some(_), None) => {
            return Err(make_err!(
                Code::InvalidArgument,
                "Client certificate specified, but no key"
            ));
        }
        (None, Some(_)) => {
            return Err(make_err!(
                Code::InvalidArgument,
                "Client key specified, but no certificate"
            ));
        }
        (None, None) => builder.with_no_client_auth(),
    };

    Ok(Some(client_config))
}

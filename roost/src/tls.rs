// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use tokio_rustls::rustls::client::{ServerCertVerified, ServerCertVerifier};
use tokio_rustls::rustls::{
    Certificate, ClientConfig, OwnedTrustAnchor, PrivateKey, RootCertStore, ServerName,
};

use crate::error::{Error, ErrorKind};
use crate::options::TlsOptions;

fn read_certs(path: &Path) -> Result<Vec<Certificate>, Error> {
    let file = File::open(path).map_err(|err| {
        Error::from_string(
            ErrorKind::ConfigError,
            format!("Failed to open cert file {path:?}, {err}"),
        )
    })?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader).map_err(|err| {
        Error::from_string(
            ErrorKind::CertError,
            format!("Failed to parse cert file {path:?}, {err}"),
        )
    })?;
    if certs.is_empty() {
        return Err(Error::from_string(
            ErrorKind::CertError,
            format!("No certificate found in {path:?}"),
        ));
    }
    Ok(certs.into_iter().map(Certificate).collect())
}

fn read_private_key(path: &Path) -> Result<PrivateKey, Error> {
    let file = File::open(path).map_err(|err| {
        Error::from_string(
            ErrorKind::ConfigError,
            format!("Failed to open key file {path:?}, {err}"),
        )
    })?;
    let mut reader = BufReader::new(file);
    loop {
        let item = rustls_pemfile::read_one(&mut reader).map_err(|err| {
            Error::from_string(
                ErrorKind::CertError,
                format!("Failed to parse key file {path:?}, {err}"),
            )
        })?;
        match item {
            Some(rustls_pemfile::Item::PKCS8Key(key) | rustls_pemfile::Item::RSAKey(key)
            | rustls_pemfile::Item::ECKey(key)) => return Ok(PrivateKey(key)),
            Some(_other) => continue,
            None => {
                return Err(Error::from_string(
                    ErrorKind::CertError,
                    format!("No private key found in {path:?}"),
                ))
            }
        }
    }
}

fn build_root_store(options: &TlsOptions) -> Result<RootCertStore, Error> {
    let mut root_store = RootCertStore::empty();
    if let Some(ca_file) = options.ca_file() {
        for cert in read_certs(ca_file)? {
            root_store.add(&cert).map_err(|err| {
                Error::from_string(
                    ErrorKind::CertError,
                    format!("Failed to add CA cert from {ca_file:?}, {err}"),
                )
            })?;
        }
    } else {
        root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
            OwnedTrustAnchor::from_subject_spki_name_constraints(
                ta.subject,
                ta.spki,
                ta.name_constraints,
            )
        }));
    }
    Ok(root_store)
}

/// Accepts any server certificate. Installed only when the application
/// explicitly asked to skip peer verification.
struct SkipServerVerification {}

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

/// Build a rustls client config from the TLS options.
///
/// Certificate material is read from disk here, once, so that bad paths
/// surface synchronously as `ConfigError`/`CertError` at client
/// construction instead of at connect time.
///
/// # Errors
///
/// Returns error if some cert file is missing or unparsable.
pub fn build_client_config(options: &TlsOptions) -> Result<Arc<ClientConfig>, Error> {
    let root_store = build_root_store(options)?;
    let builder = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store);

    let mut config = match (options.cert_file(), options.key_file()) {
        (Some(cert_file), Some(key_file)) => {
            let certs = read_certs(cert_file)?;
            let key = read_private_key(key_file)?;
            builder.with_client_auth_cert(certs, key)?
        }
        _ => builder.with_no_client_auth(),
    };

    if options.skip_verify() {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(SkipServerVerification {}));
    }

    Ok(Arc::new(config))
}

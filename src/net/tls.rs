//! Loading the TLS acceptor from the configured certificate material.
//!
//! This runs once at server start. Any failure is reported to the caller,
//! which logs it and answers subsequent `SSLRequest`s with `N` instead of
//! refusing to serve plaintext.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use tokio_rustls::TlsAcceptor;

use crate::error::{Error, Result};
use crate::options::{TlsOptions, TlsVersion};

pub(crate) fn configure(options: &TlsOptions) -> Result<TlsAcceptor> {
    let certs = load_certs(&options.cert_file)?;
    let key = load_key(&options.key_file)?;

    if options.min_version > options.max_version {
        return Err(Error::config("TLS min version exceeds max version"));
    }

    let versions: Vec<_> = [
        (TlsVersion::Tls12, &rustls::version::TLS12),
        (TlsVersion::Tls13, &rustls::version::TLS13),
    ]
    .into_iter()
    .filter(|(version, _)| *version >= options.min_version && *version <= options.max_version)
    .map(|(_, supported)| supported)
    .collect();

    let builder = rustls::ServerConfig::builder_with_protocol_versions(&versions);

    let builder = match &options.ca_file {
        Some(ca_file) if options.reject_unauthorized => {
            let mut roots = RootCertStore::empty();

            for cert in load_certs(ca_file)? {
                roots.add(cert).map_err(Error::tls)?;
            }

            let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .map_err(Error::tls)?;

            builder.with_client_cert_verifier(verifier)
        }

        _ => builder.with_no_client_auth(),
    };

    let config = builder.with_single_cert(certs, key).map_err(Error::tls)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|err| Error::tls(format!("cannot read {}: {err}", path.display())))?;

    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::io::Result<_>>()
        .map_err(|err| Error::tls(format!("invalid PEM in {}: {err}", path.display())))?;

    if certs.is_empty() {
        return Err(Error::tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }

    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|err| Error::tls(format!("cannot read {}: {err}", path.display())))?;

    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|err| Error::tls(format!("invalid PEM in {}: {err}", path.display())))?
        .ok_or_else(|| Error::tls(format!("no private key found in {}", path.display())))
}

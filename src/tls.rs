//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::config::TlsFiles;
use crate::error::{ConfigError, Error, TlsPart};

/// Builds an acceptor from a PEM certificate chain and a PEM private key.
///
/// Missing files, empty PEM files and a key that does not fit the
/// certificate are all startup errors.
pub fn load_acceptor(files: &TlsFiles) -> Result<TlsAcceptor, Error> {
    let certs = load_certs(files)?;
    let key = load_key(files)?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(files: &TlsFiles) -> Result<Vec<CertificateDer<'static>>, Error> {
    let mut reader = BufReader::new(open(TlsPart::Certificate, files)?);
    let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(ConfigError::EmptyPem(TlsPart::Certificate).into());
    }
    Ok(certs)
}

fn load_key(files: &TlsFiles) -> Result<PrivateKeyDer<'static>, Error> {
    let mut reader = BufReader::new(open(TlsPart::PrivateKey, files)?);
    rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| ConfigError::EmptyPem(TlsPart::PrivateKey).into())
}

fn open(part: TlsPart, files: &TlsFiles) -> Result<File, ConfigError> {
    let path = match part {
        TlsPart::Certificate => &files.cert,
        TlsPart::PrivateKey => &files.key,
    };
    File::open(path).map_err(|_| ConfigError::TlsFileMissing { part, path: path.clone() })
}

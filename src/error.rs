//! Unified error types.

use std::fmt;
use std::path::PathBuf;

/// The error type returned by routify's fallible operations.
///
/// Application-level outcomes (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// startup failures: bad configuration, unreadable TLS material, binding to a
/// port.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("tls: {0}")]
    Tls(#[from] rustls::Error),
}

/// A configuration problem detected before the server starts listening.
///
/// Every variant is fatal: the server refuses to serve with it.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("rate limit must be greater than zero")]
    ZeroRateLimit,

    #[error("rate limit window must be greater than zero seconds")]
    ZeroWindow,

    #[error("maximum request body size must be greater than zero bytes")]
    ZeroBodyLimit,

    #[error("TLS needs both a certificate and a key file, got only the {0}")]
    PartialTls(TlsPart),

    #[error("{part} file not found or unreadable: {}", .path.display())]
    TlsFileMissing { part: TlsPart, path: PathBuf },

    #[error("no {0} found in PEM file")]
    EmptyPem(TlsPart),

    #[error("unknown logger level `{0}` (expected debug, info, warn or error)")]
    UnknownLogLevel(String),

    #[error("unknown logger output `{0}` (expected stderr, file or service)")]
    UnknownLogOutput(String),

    #[error("invalid listen address `{0}`")]
    InvalidAddress(String),

    #[error("read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{}", join(.0))]
    Invalid(Vec<ConfigError>),
}

/// Which half of a TLS key pair a [`ConfigError`] refers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TlsPart {
    Certificate,
    PrivateKey,
}

impl fmt::Display for TlsPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Certificate => f.write_str("certificate"),
            Self::PrivateKey  => f.write_str("private key"),
        }
    }
}

fn join(errors: &[ConfigError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

//! Server configuration.
//!
//! Options can be built in code or read from a TOML file:
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 3003
//! rate_limit = 50
//! time_frame = 60
//! logger_level = "debug"
//! ssl_cert_file = "/etc/routify/cert.pem"
//! ssl_key_file = "/etc/routify/key.pem"
//! ```
//!
//! Every field is optional. Validation collects all problems at once and is
//! fatal: a server is never started from invalid options.

use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, TlsPart};
use crate::logging::{LogLevel, LogOptions, LogOutput};
use crate::rate_limit::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_SECS};

/// Options consumed by [`Server::new`](crate::Server::new).
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    pub ssl_cert_file: Option<PathBuf>,
    pub ssl_key_file: Option<PathBuf>,
    /// Requests admitted per client per `time_frame`.
    pub rate_limit: u32,
    /// Rate-limit window, in seconds.
    pub time_frame: u64,
    pub logger_level: LogLevel,
    pub logger_output: LogOutput,
    /// Target of the `file` logger output.
    pub log_file: PathBuf,
    /// Upper bound on handler run time, in seconds. Unbounded when absent.
    pub request_timeout: Option<u64>,
    /// Largest request body accepted, in bytes. Larger bodies get `400`.
    pub max_body_size: usize,
}

/// Default for [`ServerOptions::max_body_size`]: 1 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            ssl_cert_file: None,
            ssl_key_file: None,
            rate_limit: DEFAULT_MAX_REQUESTS,
            time_frame: DEFAULT_WINDOW_SECS,
            logger_level: LogLevel::Info,
            logger_output: LogOutput::Stderr,
            log_file: PathBuf::from("server.log"),
            request_timeout: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// Resolved TLS file locations.
#[derive(Clone, Debug, PartialEq)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl ServerOptions {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let options: Self = toml::from_str(source)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_owned(), source })?;
        Self::from_toml_str(&source)
    }

    /// Checks every option, reporting all problems together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.rate_limit == 0 {
            errors.push(ConfigError::ZeroRateLimit);
        }
        if self.time_frame == 0 {
            errors.push(ConfigError::ZeroWindow);
        }
        if self.max_body_size == 0 {
            errors.push(ConfigError::ZeroBodyLimit);
        }
        if let Err(e) = self.socket_addr() {
            errors.push(e);
        }
        if let Err(e) = self.tls_files() {
            errors.push(e);
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::Invalid(errors)),
        }
    }

    /// The TLS files, if TLS is configured.
    ///
    /// Configuring only one of certificate and key is an error, as is naming
    /// a file that cannot be read.
    pub fn tls_files(&self) -> Result<Option<TlsFiles>, ConfigError> {
        let cert = self.ssl_cert_file.as_ref().filter(|p| !p.as_os_str().is_empty());
        let key = self.ssl_key_file.as_ref().filter(|p| !p.as_os_str().is_empty());

        let (cert, key) = match (cert, key) {
            (None, None) => return Ok(None),
            (Some(_), None) => return Err(ConfigError::PartialTls(TlsPart::Certificate)),
            (None, Some(_)) => return Err(ConfigError::PartialTls(TlsPart::PrivateKey)),
            (Some(cert), Some(key)) => (cert, key),
        };

        for (part, path) in [(TlsPart::Certificate, cert), (TlsPart::PrivateKey, key)] {
            if fs::File::open(path).is_err() {
                return Err(ConfigError::TlsFileMissing { part, path: path.clone() });
            }
        }
        Ok(Some(TlsFiles { cert: cert.clone(), key: key.clone() }))
    }

    /// `host:port` resolved to the first matching socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let authority = format!("{}:{}", self.host, self.port);
        authority
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or(ConfigError::InvalidAddress(authority))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout.filter(|secs| *secs > 0).map(Duration::from_secs)
    }

    /// The logging part of these options.
    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            level: self.logger_level,
            output: self.logger_output,
            file: self.log_file.clone(),
            callback: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let options = ServerOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.socket_addr().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(options.request_timeout(), None);
        assert_eq!(options.max_body_size, DEFAULT_MAX_BODY_SIZE);
    }

    #[test]
    fn parses_toml() {
        let options = ServerOptions::from_toml_str(
            r#"
            host = "0.0.0.0"
            port = 3003
            rate_limit = 50
            time_frame = 60
            logger_level = "DEBUG"
            request_timeout = 5
            max_body_size = 4096
            "#,
        )
        .unwrap();
        assert_eq!(options.port, 3003);
        assert_eq!(options.rate_limit, 50);
        assert_eq!(options.logger_level, LogLevel::Debug);
        assert_eq!(options.logger_output, LogOutput::Stderr);
        assert_eq!(options.request_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(options.max_body_size, 4096);
    }

    #[test]
    fn unknown_level_is_a_parse_error() {
        let err = ServerOptions::from_toml_str(r#"logger_level = "chatty""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn half_configured_tls_is_fatal() {
        let options = ServerOptions { ssl_cert_file: Some("cert.pem".into()), ..ServerOptions::default() };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::PartialTls(TlsPart::Certificate)),
        ));
    }

    #[test]
    fn empty_tls_paths_mean_plain_tcp() {
        let options = ServerOptions {
            ssl_cert_file: Some(PathBuf::new()),
            ssl_key_file: Some(PathBuf::new()),
            ..ServerOptions::default()
        };
        assert_eq!(options.tls_files().unwrap(), None);
    }

    #[test]
    fn missing_tls_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        fs::write(&cert, "").unwrap();

        let options = ServerOptions {
            ssl_cert_file: Some(cert),
            ssl_key_file: Some(dir.path().join("key.pem")),
            ..ServerOptions::default()
        };
        assert!(matches!(
            options.tls_files(),
            Err(ConfigError::TlsFileMissing { part: TlsPart::PrivateKey, .. }),
        ));
    }

    #[test]
    fn all_problems_are_reported() {
        let options = ServerOptions { rate_limit: 0, time_frame: 0, max_body_size: 0, ..ServerOptions::default() };
        match options.validate() {
            Err(ConfigError::Invalid(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected three problems, got {other:?}"),
        }
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routify.toml");
        fs::write(&path, "port = 9000\n").unwrap();
        assert_eq!(ServerOptions::from_file(&path).unwrap().port, 9000);

        let err = ServerOptions::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

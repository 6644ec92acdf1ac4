//! Error types.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Error enumerates the possible challenge responder error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned when a listening socket can't be created, bound, or put into the listening
    /// state. Any socket opened along the way has already been closed when this is returned.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Returned by [`CertSelector::lookup`][crate::tls_sni::CertSelector::lookup] when a TLS
    /// client asks for an SNI name that has no registered certificate. The handshake for that
    /// connection fails; the server keeps running.
    #[error("no certificate registered for SNI name \"{0}\"")]
    NoMatchingCertificate(String),

    /// Returned by [`ResourceTable::lookup`][crate::http01::ResourceTable::lookup] when a request
    /// path has no active HTTP-01 resource. Served as HTTP 404.
    #[error("no challenge resource for path \"{0}\"")]
    ResourceNotFound(String),

    /// Returned when a background accept loop did not finish within the shutdown bound.
    #[error("listener on {addr} did not shut down within {timeout:?}")]
    ShutdownTimeout { addr: SocketAddr, timeout: Duration },

    /// Returned by [`probe_sni`][crate::probe::probe_sni] when the peer can't be reached, or the
    /// TLS handshake fails, or the peer presents no certificate.
    #[error("probe of {host}:{port} failed: {source}")]
    ProbeConnection {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Returned by [`probe_sni`][crate::probe::probe_sni] when connecting and handshaking took
    /// longer than the caller's timeout.
    #[error("probe of {host}:{port} timed out after {timeout:?}")]
    ProbeTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    /// Returned when a name can't be used as a TLS SNI server name.
    #[error(transparent)]
    InvalidServerName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Returned when a PEM file holds no usable certificate or private key.
    #[error("no usable PEM item in {0}")]
    MissingPem(PathBuf),

    /// Returned when rustls rejects a configuration or key.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Returned when generating a self-signed certificate fails.
    #[error("certificate generation failed: {0}")]
    Certificate(#[from] rcgen::Error),

    /// Returned when the HTTP-01 server fails.
    #[error("HTTP server error: {0}")]
    Http(#[from] hyper::Error),

    /// Returned when a background listener task panicked or was aborted.
    #[error("listener task failed: {0}")]
    ServerTask(#[from] tokio::task::JoinError),

    /// Returned when a [`Config`][crate::config::Config] is well-formed JSON but unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when [loading a `Config`][crate::config::Config::try_from_file] fails due to
    /// invalid JSON content.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),
}

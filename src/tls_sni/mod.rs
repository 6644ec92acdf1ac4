//! TLS responder that presents a certificate chosen by SNI name.
//!
//! A validating party opens a TLS connection naming a specific host in the SNI extension, and
//! expects a specific self-signed certificate in return. [`TlsSniServer`] answers by consulting
//! its [`CertSelector`] during the handshake, so certificates registered after the server
//! started are presented immediately, and removed ones stop being presented.
//!
//! A client hello naming an unregistered host (or no host at all) fails the handshake. The
//! connection is closed and the server keeps accepting others.
//!
//! ```no_run
//! # async fn run() -> Result<(), acme_standalone::error::Error> {
//! use acme_standalone::tls_sni::{CertEntry, CertSelector, TlsSniServer};
//! use tokio_util::sync::CancellationToken;
//!
//! let selector = CertSelector::new();
//! selector.insert(CertEntry::self_signed("localhost")?);
//!
//! let server = TlsSniServer::bind("127.0.0.1:0".parse().unwrap(), selector.clone())?;
//! let shutdown = CancellationToken::new();
//! let task = tokio::spawn(server.serve_forever(shutdown.clone()));
//! // ...
//! shutdown.cancel();
//! task.await??;
//! # Ok(())
//! # }
//! ```

pub mod cert_dir;
mod selector;
pub mod server;

pub use cert_dir::load_cert_dir;
pub use selector::{CertEntry, CertSelector};
pub use server::TlsSniServer;

//! ACME Standalone
//!
//! Transient responders for [RFC-8555][RFC-8555] domain validation challenges, for hosts that
//! don't run a web server of their own.
//!
//! * [`tls_sni`] answers TLS handshakes with the certificate registered for the client's SNI
//!   name, chosen during the handshake from a shared [`CertSelector`].
//! * [`http01`] answers [HTTP-01] validation requests from a shared [`ResourceTable`].
//! * [`DualStackServers`] runs either responder on IPv4 and IPv6 with one port number, and
//!   stops both together.
//! * [`probe::probe_sni`] reports the certificate a server presents for an SNI name.
//!
//! Certificates and challenge resources can be added and removed while the responders are
//! serving; every handshake and request reads the current set.
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [HTTP-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.3
//!
#![warn(clippy::pedantic)]

pub mod config;
pub mod dual_stack;
pub mod error;
pub mod http01;
pub mod listener;
pub mod probe;
pub mod tls_sni;

pub use config::{Config, Shared};
pub use dual_stack::{ChallengeServer, DualStackServers, Fallback};
pub use http01::{Http01Resource, Http01Server, ResourceTable};
pub use tls_sni::{CertEntry, CertSelector, TlsSniServer};

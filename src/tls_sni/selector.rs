use crate::error::Error;
use parking_lot::RwLock;
use rcgen::{CertificateParams, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::collections::HashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// A certificate chain and signing key presented for one SNI name.
///
/// Entries are immutable. Replacing the certificate for a name means inserting a new entry.
#[derive(Debug, Clone)]
pub struct CertEntry {
    sni: String,
    key: Arc<CertifiedKey>,
}

impl CertEntry {
    /// Build an entry for `sni` from a DER certificate chain (end-entity first) and its private
    /// key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tls`] if the key type isn't supported, or the chain is empty.
    pub fn new(
        sni: &str,
        chain: Vec<CertificateDer<'static>>,
        key: &PrivateKeyDer<'_>,
    ) -> Result<Self, Error> {
        if chain.is_empty() {
            return Err(rustls::Error::NoCertificatesPresented.into());
        }
        let signing_key = rustls::crypto::ring::sign::any_supported_type(key)?;
        Ok(Self {
            sni: sni.to_ascii_lowercase(),
            key: Arc::new(CertifiedKey::new(chain, signing_key)),
        })
    }

    /// Generate a fresh self-signed certificate for `sni`, valid from a day ago until a week
    /// from now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Certificate`] if `sni` isn't a usable subject alternative name or key
    /// generation fails.
    pub fn self_signed(sni: &str) -> Result<Self, Error> {
        let key_pair = KeyPair::generate()?;
        let mut params = CertificateParams::new(vec![sni.to_string()])?;
        let now = OffsetDateTime::now_utc();
        params.not_before = now - Duration::days(1);
        params.not_after = now + Duration::days(7);
        let cert = params.self_signed(&key_pair)?;
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
        Self::new(sni, vec![cert.der().clone()], &key)
    }

    /// The (lowercased) SNI name this entry is served for.
    #[must_use]
    pub fn sni(&self) -> &str {
        &self.sni
    }

    /// The end-entity certificate presented to clients.
    #[must_use]
    pub fn certificate(&self) -> &CertificateDer<'static> {
        // NB: `new` refuses empty chains.
        &self.key.cert[0]
    }
}

/// An in-memory, shared mapping from SNI name to [`CertEntry`], consulted during every TLS
/// handshake.
///
/// Clones share the same mapping, so a launcher can keep one handle and add or remove entries
/// while a [`TlsSniServer`][super::TlsSniServer] holds another.
#[derive(Debug, Clone, Default)]
pub struct CertSelector {
    entries: Arc<RwLock<HashMap<String, CertEntry>>>,
}

impl CertSelector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entry`, returning the entry it replaced for the same SNI name (if any).
    pub fn insert(&self, entry: CertEntry) -> Option<CertEntry> {
        self.entries.write().insert(entry.sni.clone(), entry)
    }

    /// Forget the entry for `sni` (if any).
    pub fn remove(&self, sni: &str) -> Option<CertEntry> {
        self.entries.write().remove(&sni.to_ascii_lowercase())
    }

    /// Find the entry for `sni`, ignoring ASCII case.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMatchingCertificate`] when nothing is registered for `sni`.
    pub fn lookup(&self, sni: &str) -> Result<CertEntry, Error> {
        self.entries
            .read()
            .get(&sni.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| Error::NoMatchingCertificate(sni.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// The registered SNI names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl FromIterator<CertEntry> for CertSelector {
    fn from_iter<T: IntoIterator<Item = CertEntry>>(iter: T) -> Self {
        let selector = Self::new();
        for entry in iter {
            selector.insert(entry);
        }
        selector
    }
}

impl ResolvesServerCert for CertSelector {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let Some(sni) = client_hello.server_name() else {
            tracing::debug!("rejecting TLS client hello without SNI");
            return None;
        };
        match self.lookup(sni) {
            Ok(entry) => Some(entry.key),
            Err(err) => {
                tracing::debug!("rejecting TLS client hello: {err}");
                None
            }
        }
    }
}

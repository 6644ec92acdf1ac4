//! Populate a [`CertSelector`] from certificates on disk.
//!
//! The directory layout is one subdirectory per SNI name, holding a PEM certificate chain and
//! a PEM private key:
//!
//! ```text
//! certs/
//! ├── localhost/
//! │   ├── cert.pem
//! │   └── key.pem
//! └── 3a2f...acme.invalid/
//!     ├── cert.pem
//!     └── key.pem
//! ```
use crate::error::Error;
use crate::tls_sni::{CertEntry, CertSelector};
use rustls::pki_types::CertificateDer;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub const CERT_FILE: &str = "cert.pem";
pub const KEY_FILE: &str = "key.pem";

/// Load every `<dir>/<sni>/{cert.pem,key.pem}` pair into a new [`CertSelector`].
///
/// Subdirectories missing either file are skipped.
///
/// # Errors
///
/// Returns [`Error::IO`] if the directory or a PEM file can't be read, [`Error::MissingPem`] if a
/// PEM file contains no certificate or private key, and [`Error::Tls`] if a key type isn't
/// supported.
pub fn load_cert_dir(dir: impl AsRef<Path>) -> Result<CertSelector, Error> {
    let selector = CertSelector::new();
    for dir_entry in std::fs::read_dir(dir)? {
        let dir_entry = dir_entry?;
        if !dir_entry.file_type()?.is_dir() {
            continue;
        }
        let path = dir_entry.path();
        let Some(sni) = dir_entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!("skipping non UTF-8 certificate directory {}", path.display());
            continue;
        };
        let (cert_path, key_path) = (path.join(CERT_FILE), path.join(KEY_FILE));
        if !cert_path.is_file() || !key_path.is_file() {
            tracing::debug!("skipping {}: no {CERT_FILE}/{KEY_FILE}", path.display());
            continue;
        }
        let entry = CertEntry::new(&sni, load_chain(&cert_path)?, &load_key(&key_path)?)?;
        tracing::info!("loaded certificate for \"{}\"", entry.sni());
        selector.insert(entry);
    }
    Ok(selector)
}

fn load_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
    let mut reader = BufReader::new(File::open(path)?);
    let chain = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
    if chain.is_empty() {
        return Err(Error::MissingPem(path.to_path_buf()));
    }
    Ok(chain)
}

fn load_key(path: &Path) -> Result<rustls::pki_types::PrivateKeyDer<'static>, Error> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| Error::MissingPem(path.to_path_buf()))
}

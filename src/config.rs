use crate::dual_stack::Fallback;
use crate::error::Error;
use crate::http01::server::DEFAULT_REQUEST_TIMEOUT;
use crate::http01::{Http01Resource, ResourceTable};
use crate::tls_sni::server::DEFAULT_HANDSHAKE_TIMEOUT;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub type Shared = Arc<Config>;

/// A static HTTP-01 resource to serve from startup.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResourceConfig {
    /// The challenge token, unpadded base64url.
    pub token: String,
    /// The key authorization served as the validation payload.
    pub key_authorization: String,
}

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub tls_sni_bind_addr: Option<SocketAddr>,
    pub http01_bind_addr: Option<SocketAddr>,
    pub cert_dir: Option<PathBuf>,
    #[serde(default)]
    pub http01_resources: Vec<ResourceConfig>,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_http01_timeout")]
    pub http01_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: Duration,
    #[serde(default)]
    pub fallback: Fallback,
}

fn default_http01_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_handshake_timeout() -> Duration {
    DEFAULT_HANDSHAKE_TIMEOUT
}

impl Config {
    /// Load and check a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the file can't be read, [`Error::InvalidJSON`] if it doesn't
    /// parse, and [`Error::InvalidConfig`] if no responder is enabled or TLS-SNI is enabled
    /// without a `cert_dir`.
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let conf: Config = serde_json::from_reader(reader)?;
        conf.validate()?;
        Ok(conf)
    }

    /// Build the initial [`ResourceTable`] from
    /// [`http01_resources`][Config::http01_resources].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a token isn't unpadded base64url.
    pub fn resource_table(&self) -> Result<ResourceTable, Error> {
        self.http01_resources
            .iter()
            .map(|r| {
                Http01Resource::from_encoded_token(
                    &r.token,
                    r.key_authorization.clone(),
                    r.key_authorization.clone(),
                )
                .map_err(|err| invalid_config(format!("invalid token \"{}\": {err}", r.token)))
            })
            .collect()
    }

    fn validate(&self) -> Result<(), Error> {
        if self.tls_sni_bind_addr.is_none() && self.http01_bind_addr.is_none() {
            return Err(invalid_config(
                "one of tls_sni_bind_addr or http01_bind_addr is required",
            ));
        }
        if self.tls_sni_bind_addr.is_some() && self.cert_dir.is_none() {
            return Err(invalid_config("cert_dir is required to serve TLS-SNI"));
        }
        Ok(())
    }
}

fn invalid_config(msg: impl Into<String>) -> Error {
    Error::InvalidConfig(msg.into())
}

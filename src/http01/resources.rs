use crate::error::Error;
use base64::engine::general_purpose;
use base64::{alphabet, engine, Engine};
use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Path prefix validating parties request HTTP-01 challenge responses under.
pub const CHALLENGE_PATH_PREFIX: &str = "/.well-known/acme-challenge/";

lazy_static! {
    static ref BASE64_ENGINE: engine::GeneralPurpose =
        engine::GeneralPurpose::new(&alphabet::URL_SAFE, general_purpose::NO_PAD);
}

/// One outstanding HTTP-01 challenge.
///
/// `response` is the expected response the challenge module computed (the key authorization),
/// and `validation` is the payload served to the validating party. Both are opaque here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Http01Resource {
    token: Vec<u8>,
    response: String,
    validation: String,
}

impl Http01Resource {
    pub fn new(
        token: impl Into<Vec<u8>>,
        response: impl Into<String>,
        validation: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            response: response.into(),
            validation: validation.into(),
        }
    }

    /// Build a resource from an already base64url encoded token, as found in challenge
    /// objects and config files.
    ///
    /// # Errors
    ///
    /// Returns [`base64::DecodeError`] if `token` isn't unpadded base64url.
    pub fn from_encoded_token(
        token: &str,
        response: impl Into<String>,
        validation: impl Into<String>,
    ) -> Result<Self, base64::DecodeError> {
        Ok(Self::new(BASE64_ENGINE.decode(token)?, response, validation))
    }

    #[must_use]
    pub fn token(&self) -> &[u8] {
        &self.token
    }

    /// The unpadded base64url form of the token.
    #[must_use]
    pub fn encoded_token(&self) -> String {
        BASE64_ENGINE.encode(&self.token)
    }

    #[must_use]
    pub fn response(&self) -> &str {
        &self.response
    }

    #[must_use]
    pub fn validation(&self) -> &str {
        &self.validation
    }

    /// The request path this resource is served on.
    #[must_use]
    pub fn path(&self) -> String {
        format!("{CHALLENGE_PATH_PREFIX}{}", self.encoded_token())
    }
}

/// The set of active [`Http01Resource`]s, keyed by request path.
///
/// Clones share the same set: the launcher adds and removes resources through one handle while
/// an [`Http01Server`][super::Http01Server] reads through another. Lookups return a copy of the
/// resource so request handlers never hold the lock across an await point.
#[derive(Debug, Clone, Default)]
#[allow(clippy::module_name_repetitions)]
pub struct ResourceTable {
    resources: Arc<RwLock<HashMap<String, Http01Resource>>>,
}

impl ResourceTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `resource`. Returns `false` (and keeps the existing entry) if a resource for the same
    /// path is already present.
    pub fn add(&self, resource: Http01Resource) -> bool {
        let mut resources = self.resources.write();
        let path = resource.path();
        if resources.contains_key(&path) {
            return false;
        }
        resources.insert(path, resource);
        true
    }

    /// Remove the resource served on the same path as `resource` (if any).
    pub fn remove(&self, resource: &Http01Resource) -> Option<Http01Resource> {
        self.resources.write().remove(&resource.path())
    }

    /// Find the resource served on request path `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceNotFound`] if no active resource matches.
    pub fn lookup(&self, path: &str) -> Result<Http01Resource, Error> {
        self.resources
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound(path.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.read().is_empty()
    }
}

impl FromIterator<Http01Resource> for ResourceTable {
    fn from_iter<T: IntoIterator<Item = Http01Resource>>(iter: T) -> Self {
        let table = Self::new();
        for resource in iter {
            table.add(resource);
        }
        table
    }
}

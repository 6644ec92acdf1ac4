//! Plain HTTP responder for HTTP-01 validation requests.
//!
//! # Endpoints
//!
//! ## `/` (GET)
//!
//!   Returns HTTP 200 (OK) and the plain text body `ACME client standalone challenge solver`,
//!   whatever resources are active.
//!
//! ## `/.well-known/acme-challenge/<token>` (GET)
//!
//!   Returns HTTP 200 (OK) with the resource's validation payload as a plain text body when an
//!   [`Http01Resource`] for `<token>` is in the server's [`ResourceTable`], and HTTP 404 (Not
//!   Found) otherwise. `<token>` is the unpadded base64url encoding of the challenge token.
//!
//!   The table is read on every request: resources added after the server started are served
//!   straight away and removed ones 404 straight away.
//!
//! Every other path or method returns HTTP 404 (Not Found), or 405 (Method Not Allowed) for
//! non-GET requests to `/`.

mod http_error;
mod resources;
mod routes;
pub mod server;

pub use resources::{Http01Resource, ResourceTable, CHALLENGE_PATH_PREFIX};
pub use server::Http01Server;

/// Body served on `/`.
pub const INDEX: &str = "ACME client standalone challenge solver";

#![allow(dead_code)]

use hyper::{Body, Client, Method, Request, StatusCode};
use std::net::SocketAddr;
use std::time::Duration;

pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Send a request without connection pooling, so no idle connection outlives the test.
pub async fn request(method: Method, addr: SocketAddr, path: &str) -> (StatusCode, String) {
    let client = Client::builder()
        .pool_max_idle_per_host(0)
        .build_http::<Body>();
    let req = Request::builder()
        .method(method)
        .uri(format!("http://{addr}{path}"))
        .body(Body::empty())
        .unwrap();
    let resp = client.request(req).await.unwrap();
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

pub async fn get(addr: SocketAddr, path: &str) -> (StatusCode, String) {
    request(Method::GET, addr, path).await
}

/// Whether this host can bind IPv6 loopback sockets.
pub fn has_ipv6() -> bool {
    std::net::TcpListener::bind("[::1]:0").is_ok()
}

mod common;

use acme_standalone::error::Error;
use acme_standalone::http01::INDEX;
use acme_standalone::listener::BoundListener;
use acme_standalone::dual_stack::SHUTDOWN_TIMEOUT;
use acme_standalone::probe::{insecure_connector, probe_sni};
use acme_standalone::{
    CertEntry, CertSelector, DualStackServers, Fallback, Http01Resource, ResourceTable,
};
use common::{get, has_ipv6, HANDSHAKE_TIMEOUT};
use hyper::StatusCode;
use rustls::pki_types::ServerName;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

fn assert_ports_equal(addrs: &[SocketAddr]) {
    assert!(!addrs.is_empty() && addrs.len() <= 2, "{addrs:?}");
    assert!(addrs.iter().all(|addr| addr.port() == addrs[0].port()));
    assert_ne!(addrs[0].port(), 0);
}

#[tokio::test]
async fn ports_equal() {
    for addr in ["0.0.0.0:0", "127.0.0.1:0", "[::]:0", "[::1]:0"] {
        let addr: SocketAddr = addr.parse().unwrap();
        if addr.is_ipv6() && !has_ipv6() {
            continue;
        }
        let servers =
            DualStackServers::http01(addr, Fallback::Degrade, &ResourceTable::new()).unwrap();
        let addrs = servers.socket_addresses();
        assert_ports_equal(addrs);
        assert_eq!(addrs[0].ip(), addr.ip());
        if has_ipv6() {
            assert_eq!(addrs.len(), 2, "{addrs:?}");
            assert_ne!(addrs[0].is_ipv4(), addrs[1].is_ipv4());
        }
        servers.shutdown_and_close().await.unwrap();
    }
}

#[tokio::test]
async fn tls_sni_on_every_address() {
    let entry = CertEntry::self_signed("localhost").unwrap();
    let selector: CertSelector = [entry.clone()].into_iter().collect();
    let mut servers =
        DualStackServers::tls_sni("127.0.0.1:0".parse().unwrap(), Fallback::Degrade, &selector)
            .unwrap();
    servers.serve_forever();

    for addr in servers.socket_addresses() {
        let cert = probe_sni(
            "localhost",
            &addr.ip().to_string(),
            addr.port(),
            HANDSHAKE_TIMEOUT,
        )
        .await
        .unwrap();
        assert_eq!(&cert, entry.certificate(), "{addr}");
    }

    servers.shutdown_and_close().await.unwrap();
}

#[tokio::test]
async fn http01_on_every_address() {
    let resource = Http01Resource::new(b"x".repeat(16), "key-authz", "key-authz");
    let resources = ResourceTable::new();
    let mut servers =
        DualStackServers::http01("127.0.0.1:0".parse().unwrap(), Fallback::Degrade, &resources)
            .unwrap();
    servers.serve_forever();

    for addr in servers.socket_addresses() {
        let (status, body) = get(*addr, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, INDEX);

        let (status, _) = get(*addr, "/foo").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get(*addr, &resource.path()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    resources.add(resource.clone());
    for addr in servers.socket_addresses() {
        let (status, body) = get(*addr, &resource.path()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "key-authz");
    }

    servers.shutdown_and_close().await.unwrap();
}

#[tokio::test]
async fn shutdown_releases_port_and_refuses_connections() {
    let mut servers = DualStackServers::http01(
        "127.0.0.1:0".parse().unwrap(),
        Fallback::Degrade,
        &ResourceTable::new(),
    )
    .unwrap();
    servers.serve_forever();
    let addrs = servers.socket_addresses().to_vec();
    for addr in &addrs {
        assert_eq!(get(*addr, "/").await.0, StatusCode::OK);
    }

    servers.shutdown_and_close().await.unwrap();

    for addr in &addrs {
        assert!(tokio::net::TcpStream::connect(addr).await.is_err(), "{addr}");
        BoundListener::bind(*addr).unwrap();
    }
}

#[tokio::test]
async fn secondary_in_use_fails_and_releases_primary() {
    if !has_ipv6() {
        return;
    }
    // Occupy the IPv6 side of a port, leaving the IPv4 side free.
    let occupier = BoundListener::bind("[::1]:0".parse().unwrap()).unwrap();
    let port = occupier.local_addr().port();
    let primary_addr: SocketAddr = ([127, 0, 0, 1], port).into();

    let result = DualStackServers::http01(primary_addr, Fallback::Degrade, &ResourceTable::new());
    assert!(
        matches!(result, Err(Error::Bind { addr, .. }) if addr.is_ipv6() && addr.port() == port),
        "{result:?}"
    );

    // Nothing is left listening on the primary address.
    assert!(tokio::net::TcpStream::connect(primary_addr).await.is_err());
    BoundListener::bind(primary_addr).unwrap();
}

#[tokio::test]
async fn half_sent_request_does_not_stall_shutdown() {
    let mut servers = DualStackServers::http01(
        "127.0.0.1:0".parse().unwrap(),
        Fallback::Degrade,
        &ResourceTable::new(),
    )
    .unwrap();
    servers.serve_forever();
    let addr = servers.socket_addresses()[0];

    // Headers without the terminating blank line, then silence.
    let mut stalled = TcpStream::connect(addr).await.unwrap();
    stalled
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    servers.shutdown_and_close().await.unwrap();
    assert!(started.elapsed() < SHUTDOWN_TIMEOUT, "{:?}", started.elapsed());

    assert!(TcpStream::connect(addr).await.is_err());
    BoundListener::bind(addr).unwrap();
}

#[tokio::test]
async fn no_handshake_completes_after_shutdown() {
    let (entry, name) = (
        CertEntry::self_signed("localhost").unwrap(),
        ServerName::try_from("localhost").unwrap(),
    );
    let selector: CertSelector = [entry].into_iter().collect();
    let mut servers =
        DualStackServers::tls_sni("127.0.0.1:0".parse().unwrap(), Fallback::Degrade, &selector)
            .unwrap();
    servers.serve_forever();
    let addr = servers.socket_addresses()[0];

    let held = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    servers.shutdown_and_close().await.unwrap();

    let connector = insecure_connector().unwrap();
    let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, connector.connect(name, held)).await;
    assert!(matches!(handshake, Ok(Err(_))), "handshake did not fail");
}

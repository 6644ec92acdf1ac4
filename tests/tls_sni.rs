mod common;

use acme_standalone::error::Error;
use acme_standalone::listener::UnboundListener;
use acme_standalone::probe::{insecure_connector, probe_sni};
use acme_standalone::{CertEntry, CertSelector, TlsSniServer};
use common::HANDSHAKE_TIMEOUT;
use rustls::pki_types::ServerName;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Running {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), Error>>,
}

impl Running {
    fn start(server: TlsSniServer) -> Self {
        let addr = server.local_addr();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(server.serve_forever(shutdown.clone()));
        Self {
            addr,
            shutdown,
            task,
        }
    }

    async fn certificate_for(&self, name: &str) -> Result<rustls::pki_types::CertificateDer<'static>, Error> {
        probe_sni(
            name,
            &self.addr.ip().to_string(),
            self.addr.port(),
            HANDSHAKE_TIMEOUT,
        )
        .await
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.task.await.unwrap().unwrap();
    }
}

fn localhost_selector() -> (CertSelector, CertEntry) {
    let entry = CertEntry::self_signed("localhost").unwrap();
    let selector: CertSelector = [entry.clone()].into_iter().collect();
    (selector, entry)
}

#[tokio::test]
async fn presents_registered_certificate() {
    let (selector, entry) = localhost_selector();
    let server = TlsSniServer::bind("127.0.0.1:0".parse().unwrap(), selector).unwrap();
    let running = Running::start(server);

    let cert = running.certificate_for("localhost").await.unwrap();
    assert_eq!(&cert, entry.certificate());

    running.stop().await;
}

#[tokio::test]
async fn unregistered_name_fails_handshake_but_server_keeps_serving() {
    let (selector, entry) = localhost_selector();
    let server = TlsSniServer::bind("127.0.0.1:0".parse().unwrap(), selector).unwrap();
    let running = Running::start(server);

    let err = running.certificate_for("unknown.example").await.unwrap_err();
    assert!(matches!(err, Error::ProbeConnection { .. }), "{err:?}");

    let cert = running.certificate_for("localhost").await.unwrap();
    assert_eq!(&cert, entry.certificate());

    running.stop().await;
}

#[tokio::test]
async fn selects_certificate_per_connection() {
    let first = CertEntry::self_signed("first.example").unwrap();
    let second = CertEntry::self_signed("second.example").unwrap();
    let selector: CertSelector = [first.clone(), second.clone()].into_iter().collect();
    let server = TlsSniServer::bind("127.0.0.1:0".parse().unwrap(), selector).unwrap();
    let running = Running::start(server);

    assert_eq!(&running.certificate_for("second.example").await.unwrap(), second.certificate());
    assert_eq!(&running.certificate_for("first.example").await.unwrap(), first.certificate());
    assert_eq!(&running.certificate_for("FIRST.example").await.unwrap(), first.certificate());

    running.stop().await;
}

#[tokio::test]
async fn certificates_changed_while_serving_take_effect() {
    let selector = CertSelector::new();
    let server = TlsSniServer::bind("127.0.0.1:0".parse().unwrap(), selector.clone()).unwrap();
    let running = Running::start(server);

    assert!(running.certificate_for("late.example").await.is_err());

    let entry = CertEntry::self_signed("late.example").unwrap();
    selector.insert(entry.clone());
    assert_eq!(&running.certificate_for("late.example").await.unwrap(), entry.certificate());

    selector.remove("late.example");
    assert!(running.certificate_for("late.example").await.is_err());

    running.stop().await;
}

#[tokio::test]
async fn deferred_bind() {
    let (selector, entry) = localhost_selector();
    let unbound = UnboundListener::new("127.0.0.1:0".parse().unwrap()).unwrap();
    unbound.socket().set_recv_buffer_size(64 * 1024).unwrap();
    let server = TlsSniServer::new(unbound.bind_and_activate().unwrap(), selector);
    let running = Running::start(server);

    assert_eq!(&running.certificate_for("localhost").await.unwrap(), entry.certificate());

    running.stop().await;
}

#[tokio::test]
async fn serves_ipv6() {
    if !common::has_ipv6() {
        return;
    }
    let (selector, entry) = localhost_selector();
    let server = TlsSniServer::bind("[::1]:0".parse().unwrap(), selector).unwrap();
    let running = Running::start(server);

    assert_eq!(&running.certificate_for("localhost").await.unwrap(), entry.certificate());

    running.stop().await;
}

#[tokio::test]
async fn shutdown_closes_listener() {
    let (selector, _) = localhost_selector();
    let server = TlsSniServer::bind("127.0.0.1:0".parse().unwrap(), selector).unwrap();
    let running = Running::start(server);
    let addr = running.addr;
    running.stop().await;

    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn connection_accepted_before_shutdown_is_dropped() {
    let (selector, _) = localhost_selector();
    let server = TlsSniServer::bind("127.0.0.1:0".parse().unwrap(), selector).unwrap();
    let running = Running::start(server);
    let connector = insecure_connector().unwrap();
    let name = ServerName::try_from("localhost").unwrap();

    // A fresh connection completes its handshake while the server runs.
    let stream = TcpStream::connect(running.addr).await.unwrap();
    connector.connect(name.clone(), stream).await.unwrap();

    // This one is accepted but sends nothing until the server has stopped.
    let held = TcpStream::connect(running.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    running.stop().await;

    let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, connector.connect(name, held)).await;
    assert!(matches!(handshake, Ok(Err(_))), "handshake did not fail");
}

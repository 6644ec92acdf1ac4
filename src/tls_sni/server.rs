use crate::dual_stack::ChallengeServer;
use crate::error::Error;
use crate::listener::BoundListener;
use crate::tls_sni::CertSelector;
use rustls::ServerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A TLS listener that picks the presented certificate from a [`CertSelector`] during each
/// handshake, by the client's SNI name.
#[derive(Debug)]
pub struct TlsSniServer {
    listener: BoundListener,
    selector: CertSelector,
    handshake_timeout: Duration,
}

impl TlsSniServer {
    /// Serve certificates from `selector` on an already bound `listener`.
    #[must_use]
    pub fn new(listener: BoundListener, selector: CertSelector) -> Self {
        Self {
            listener,
            selector,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Bind `addr` and serve certificates from `selector` on it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the listener can't be bound.
    pub fn bind(addr: SocketAddr, selector: CertSelector) -> Result<Self, Error> {
        Ok(Self::new(BoundListener::bind(addr)?, selector))
    }

    /// Bound each handshake by `timeout` instead of [`DEFAULT_HANDSHAKE_TIMEOUT`].
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    #[must_use]
    pub fn selector(&self) -> &CertSelector {
        &self.selector
    }

    /// Accept connections and run TLS handshakes until `shutdown` is cancelled. Connections
    /// still handshaking at that point are dropped, and this returns once every connection task
    /// has finished and the listening socket is closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tls`] if the TLS configuration can't be built, or [`Error::IO`] if the
    /// listener can't be registered with the runtime.
    pub async fn serve_forever(self, shutdown: CancellationToken) -> Result<(), Error> {
        let Self {
            listener,
            selector,
            handshake_timeout,
        } = self;
        let local_addr = listener.local_addr();
        let acceptor = TlsAcceptor::from(Arc::new(server_config(selector)?));
        let listener = TcpListener::from_std(listener.into_std())?;
        tracing::info!("TLS-SNI listening on {local_addr}");

        let connections = TaskTracker::new();
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let acceptor = acceptor.clone();
                        let shutdown = shutdown.clone();
                        connections.spawn(async move {
                            tokio::select! {
                                () = shutdown.cancelled() => {
                                    tracing::debug!("dropping TLS connection with {peer}");
                                }
                                () = handle_connection(acceptor, stream, peer, handshake_timeout) => {}
                            }
                        });
                    }
                    Err(err) => tracing::warn!("TLS-SNI accept on {local_addr} failed: {err}"),
                },
            }
        }

        drop(listener);
        connections.close();
        connections.wait().await;
        tracing::info!("TLS-SNI on {local_addr} stopped");
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChallengeServer for TlsSniServer {
    fn local_addr(&self) -> SocketAddr {
        TlsSniServer::local_addr(self)
    }

    async fn serve_forever(self, shutdown: CancellationToken) -> Result<(), Error> {
        TlsSniServer::serve_forever(self, shutdown).await
    }
}

fn server_config(selector: CertSelector) -> Result<ServerConfig, Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    Ok(ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(selector)))
}

async fn handle_connection(
    acceptor: TlsAcceptor,
    stream: TcpStream,
    peer: SocketAddr,
    handshake_timeout: Duration,
) {
    match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
        Ok(Ok(mut tls)) => {
            let sni = tls.get_ref().1.server_name().unwrap_or_default().to_string();
            tracing::debug!("completed TLS handshake with {peer} for \"{sni}\"");
            if let Err(err) = tls.shutdown().await {
                tracing::debug!("closing TLS connection with {peer}: {err}");
            }
        }
        Ok(Err(err)) => tracing::debug!("TLS handshake with {peer} failed: {err}"),
        Err(_) => tracing::debug!("TLS handshake with {peer} timed out"),
    }
}

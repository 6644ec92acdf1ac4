//! IPv4 and IPv6 challenge responders bound to one port, started and stopped as a unit.
//!
//! [`DualStackServers::bind`] binds a primary listener on the requested address, then tries to
//! bind a secondary listener for the other address family on the *same* port. When the
//! requested port is `0`, the port the primary received is the one mirrored.
//!
//! Whether a secondary listener is needed, and whether failing to bind one matters, depends on
//! the platform:
//!
//! * Only unspecified and loopback addresses have a counterpart in the other family
//!   (`0.0.0.0` ↔ `::`, `127.0.0.1` ↔ `::1`). Any other address is served primary-only.
//! * An IPv6 primary whose `IPV6_V6ONLY` option reads back as cleared already serves IPv4, so
//!   no secondary is attempted.
//! * With [`Fallback::Degrade`], a secondary bind that fails because the address family is not
//!   supported (`EAFNOSUPPORT`, `EPROTONOSUPPORT`) or the address isn't configured on this host
//!   (`EADDRNOTAVAIL`) is dropped with a warning. Any other failure, e.g. the port being in use
//!   for the other family, is fatal. With [`Fallback::Strict`] every secondary failure is fatal.
//!
//! A fatal failure closes the primary listener before the error is returned. The outcome is
//! fixed at construction and never retried.

use crate::error::Error;
use crate::http01::{Http01Server, ResourceTable};
use crate::listener::BoundListener;
use crate::tls_sni::{CertSelector, TlsSniServer};
use serde::Deserialize;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long [`DualStackServers::shutdown_and_close`] waits for each listener task.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A responder that owns one bound listener and serves it until told to stop.
#[async_trait::async_trait]
pub trait ChallengeServer: Send + Sized + 'static {
    /// The address the server's listener is bound to.
    fn local_addr(&self) -> SocketAddr;

    /// Serve until `shutdown` is cancelled, then close the listener.
    async fn serve_forever(self, shutdown: CancellationToken) -> Result<(), Error>;
}

/// What to do when the secondary listener can't be bound.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Fallback {
    /// Serve primary-only when the other address family is unavailable on this host.
    #[default]
    Degrade,
    /// Fail construction on any secondary bind error.
    Strict,
}

enum ServeState<S> {
    Idle(Vec<S>),
    Serving {
        shutdown: CancellationToken,
        tasks: Vec<(SocketAddr, JoinHandle<Result<(), Error>>)>,
    },
    Closed,
}

/// A primary and an optional secondary [`ChallengeServer`] sharing one port number.
pub struct DualStackServers<S> {
    socket_addrs: Vec<SocketAddr>,
    shutdown_timeout: Duration,
    state: ServeState<S>,
}

impl<S: ChallengeServer> DualStackServers<S> {
    /// Bind the primary listener on `addr` and, where applicable, a secondary listener for the
    /// other address family on the same port, wrapping each with `new_server`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the primary can't be bound, or the secondary can't be bound
    /// and `fallback` doesn't allow degrading. No listener is left open.
    pub fn bind<F>(addr: SocketAddr, fallback: Fallback, new_server: F) -> Result<Self, Error>
    where
        F: FnMut(BoundListener) -> S,
    {
        Self::bind_using(addr, fallback, BoundListener::bind, new_server)
    }

    /// Like [`DualStackServers::bind`], but binding each listener with `bind`. Callers can use
    /// this to set socket options through an
    /// [`UnboundListener`][crate::listener::UnboundListener] before activation.
    ///
    /// # Errors
    ///
    /// See [`DualStackServers::bind`].
    pub fn bind_using<B, F>(
        addr: SocketAddr,
        fallback: Fallback,
        mut bind: B,
        new_server: F,
    ) -> Result<Self, Error>
    where
        B: FnMut(SocketAddr) -> Result<BoundListener, Error>,
        F: FnMut(BoundListener) -> S,
    {
        let primary = bind(addr)?;
        let primary_addr = primary.local_addr();

        let secondary = match secondary_addr(primary_addr) {
            _ if primary.dual_stack() => {
                tracing::debug!("{primary_addr} already serves IPv4 and IPv6");
                None
            }
            None => None,
            Some(mirrored) => match bind(mirrored) {
                Ok(listener) => Some(listener),
                Err(err) if fallback == Fallback::Degrade && family_unavailable(&err) => {
                    tracing::warn!("serving {primary_addr} only: {err}");
                    None
                }
                Err(err) => {
                    drop(primary);
                    return Err(err);
                }
            },
        };

        let servers: Vec<S> = std::iter::once(primary)
            .chain(secondary)
            .map(new_server)
            .collect();
        Ok(Self {
            socket_addrs: servers.iter().map(ChallengeServer::local_addr).collect(),
            shutdown_timeout: SHUTDOWN_TIMEOUT,
            state: ServeState::Idle(servers),
        })
    }

    /// Wait up to `timeout` for each listener task in
    /// [`shutdown_and_close`][DualStackServers::shutdown_and_close], instead of
    /// [`SHUTDOWN_TIMEOUT`].
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// The bound address of every live listener, primary first. All share one port.
    #[must_use]
    pub fn socket_addresses(&self) -> &[SocketAddr] {
        &self.socket_addrs
    }

    /// Start each listener on its own task and return. Connections to any of
    /// [`socket_addresses`][DualStackServers::socket_addresses] are served from here on.
    ///
    /// Calling this again while serving does nothing.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn serve_forever(&mut self) {
        let servers = match std::mem::replace(&mut self.state, ServeState::Closed) {
            ServeState::Idle(servers) => servers,
            state => {
                tracing::warn!("{:?} already serving or closed", self.socket_addrs);
                self.state = state;
                return;
            }
        };
        let shutdown = CancellationToken::new();
        let tasks = servers
            .into_iter()
            .map(|server| {
                let addr = server.local_addr();
                (addr, tokio::spawn(server.serve_forever(shutdown.clone())))
            })
            .collect();
        self.state = ServeState::Serving { shutdown, tasks };
    }

    /// Stop every listener task, wait for each to finish, and close every socket. Works
    /// whether or not [`serve_forever`][DualStackServers::serve_forever] was called.
    ///
    /// All listeners are shut down even if one of them fails; the first failure is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShutdownTimeout`] if a task didn't finish in time (it is aborted and its
    /// listener closed), the error a listener task stopped with, or [`Error::ServerTask`] if it
    /// panicked.
    pub async fn shutdown_and_close(mut self) -> Result<(), Error> {
        let (shutdown, tasks) = match std::mem::replace(&mut self.state, ServeState::Closed) {
            ServeState::Serving { shutdown, tasks } => (shutdown, tasks),
            ServeState::Idle(_) | ServeState::Closed => return Ok(()),
        };
        shutdown.cancel();

        let mut result = Ok(());
        for (addr, mut task) in tasks {
            let outcome = match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(served)) => served,
                Ok(Err(join_err)) => Err(join_err.into()),
                Err(_) => {
                    task.abort();
                    // Cancelled once the task and its listener have been dropped.
                    let _ = task.await;
                    Err(Error::ShutdownTimeout {
                        addr,
                        timeout: self.shutdown_timeout,
                    })
                }
            };
            if let Err(err) = outcome {
                tracing::error!("shutting down listener on {addr}: {err}");
                result = result.and(Err(err));
            }
        }
        tracing::info!("closed {:?}", self.socket_addrs);
        result
    }
}

impl DualStackServers<TlsSniServer> {
    /// Dual-stack [`TlsSniServer`]s presenting certificates from `selector`.
    ///
    /// # Errors
    ///
    /// See [`DualStackServers::bind`].
    pub fn tls_sni(
        addr: SocketAddr,
        fallback: Fallback,
        selector: &CertSelector,
    ) -> Result<Self, Error> {
        Self::bind(addr, fallback, |listener| {
            TlsSniServer::new(listener, selector.clone())
        })
    }
}

impl DualStackServers<Http01Server> {
    /// Dual-stack [`Http01Server`]s serving `resources`.
    ///
    /// # Errors
    ///
    /// See [`DualStackServers::bind`].
    pub fn http01(
        addr: SocketAddr,
        fallback: Fallback,
        resources: &ResourceTable,
    ) -> Result<Self, Error> {
        Self::bind(addr, fallback, |listener| {
            Http01Server::new(listener, resources.clone())
        })
    }
}

impl<S> Drop for DualStackServers<S> {
    fn drop(&mut self) {
        if let ServeState::Serving { shutdown, .. } = &self.state {
            shutdown.cancel();
        }
    }
}

impl<S> std::fmt::Debug for DualStackServers<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            ServeState::Idle(_) => "idle",
            ServeState::Serving { .. } => "serving",
            ServeState::Closed => "closed",
        };
        f.debug_struct("DualStackServers")
            .field("socket_addrs", &self.socket_addrs)
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

/// The same port on the other address family, for unspecified and loopback addresses.
fn secondary_addr(primary: SocketAddr) -> Option<SocketAddr> {
    let ip = match primary.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        IpAddr::V4(ip) if ip.is_loopback() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(ip) if ip.is_loopback() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        _ => return None,
    };
    Some(SocketAddr::new(ip, primary.port()))
}

fn family_unavailable(err: &Error) -> bool {
    let Error::Bind { source, .. } = err else {
        return false;
    };
    matches!(
        source.kind(),
        ErrorKind::AddrNotAvailable | ErrorKind::Unsupported
    ) || source.raw_os_error().is_some_and(unsupported_family_code)
}

#[cfg(unix)]
fn unsupported_family_code(code: i32) -> bool {
    code == libc::EAFNOSUPPORT || code == libc::EPROTONOSUPPORT
}

#[cfg(windows)]
fn unsupported_family_code(code: i32) -> bool {
    // WSAEAFNOSUPPORT, WSAEPROTONOSUPPORT
    code == 10047 || code == 10043
}

#[cfg(not(any(unix, windows)))]
fn unsupported_family_code(_code: i32) -> bool {
    false
}

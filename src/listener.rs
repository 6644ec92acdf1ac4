//! TCP listening sockets shared by the TLS-SNI and HTTP-01 responders.
//!
//! Binding is split in two steps so a caller can tune the raw socket before it goes live:
//! [`UnboundListener::new`] opens the socket and [`UnboundListener::bind_and_activate`] binds and
//! listens. [`BoundListener::bind`] does both at once.
//!
//! IPv6 sockets are always created with `IPV6_V6ONLY` set. IPv4 coverage on the same port is the
//! job of [`DualStackServers`][crate::DualStackServers].

use crate::error::Error;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, TcpListener};

const LISTEN_BACKLOG: i32 = 128;

/// A TCP socket for `addr` that has not been bound yet.
#[derive(Debug)]
pub struct UnboundListener {
    addr: SocketAddr,
    socket: Socket,
}

impl UnboundListener {
    /// Open a TCP socket suitable for listening on `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the socket can't be created or configured, e.g. because the
    /// address family is not supported on this host.
    pub fn new(addr: SocketAddr) -> Result<Self, Error> {
        let bind_err = |source| Error::Bind { addr, source };
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(bind_err)?;
        socket.set_reuse_address(true).map_err(bind_err)?;
        if addr.is_ipv6() {
            socket.set_only_v6(true).map_err(bind_err)?;
        }
        Ok(Self { addr, socket })
    }

    /// The raw socket, for inspection or extra options before activation.
    #[must_use]
    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    /// Bind the socket and start listening.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if binding or listening fails. The socket is closed before
    /// returning.
    pub fn bind_and_activate(self) -> Result<BoundListener, Error> {
        let addr = self.addr;
        let bind_err = |source| Error::Bind { addr, source };
        self.socket.bind(&addr.into()).map_err(bind_err)?;
        self.socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;
        self.socket.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = self
            .socket
            .local_addr()
            .map_err(bind_err)?
            .as_socket()
            .unwrap_or(addr);
        tracing::debug!("bound listener on {local_addr}");
        Ok(BoundListener {
            local_addr,
            listener: self.socket.into(),
        })
    }
}

/// A bound, listening, non-blocking TCP socket.
///
/// Dropping it closes the socket.
#[derive(Debug)]
pub struct BoundListener {
    local_addr: SocketAddr,
    listener: TcpListener,
}

impl BoundListener {
    /// Open, bind and activate a listener on `addr`. Port `0` picks a free port; use
    /// [`BoundListener::local_addr`] to find out which.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if any step fails.
    pub fn bind(addr: SocketAddr) -> Result<Self, Error> {
        UnboundListener::new(addr)?.bind_and_activate()
    }

    /// The address the socket is bound to, with the resolved port.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether this listener accepts both IPv4 and IPv6 traffic. Only an IPv6 socket with
    /// `IPV6_V6ONLY` cleared does.
    #[must_use]
    pub fn dual_stack(&self) -> bool {
        if self.local_addr.is_ipv4() {
            return false;
        }
        match socket2::SockRef::from(&self.listener).only_v6() {
            Ok(only_v6) => !only_v6,
            Err(err) => {
                tracing::warn!(
                    "unable to read IPV6_V6ONLY for {}, assuming IPv6 only: {err}",
                    self.local_addr
                );
                false
            }
        }
    }

    pub(crate) fn into_std(self) -> TcpListener {
        self.listener
    }
}

use crate::dual_stack::ChallengeServer;
use crate::error::Error;
use crate::http01::{routes, ResourceTable};
use crate::listener::BoundListener;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on receiving a request's headers, so a stalled client can't hold a connection open.
pub const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// How long in-flight requests get to finish after shutdown before their connections are closed.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub(super) struct AppState {
    pub resources: ResourceTable,
    pub request_timeout: Duration,
}

/// A plain HTTP listener answering HTTP-01 validation requests from a [`ResourceTable`].
#[derive(Debug)]
pub struct Http01Server {
    listener: BoundListener,
    resources: ResourceTable,
    request_timeout: Duration,
}

impl Http01Server {
    /// Serve `resources` on an already bound `listener`.
    #[must_use]
    pub fn new(listener: BoundListener, resources: ResourceTable) -> Self {
        Self {
            listener,
            resources,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Bind `addr` and serve `resources` on it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the listener can't be bound.
    pub fn bind(addr: SocketAddr, resources: ResourceTable) -> Result<Self, Error> {
        Ok(Self::new(BoundListener::bind(addr)?, resources))
    }

    /// Time out requests after `timeout` instead of [`DEFAULT_REQUEST_TIMEOUT`].
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    #[must_use]
    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    /// Serve requests until `shutdown` is cancelled, then give in-flight requests up to
    /// [`DRAIN_TIMEOUT`] to finish. Connections still open after that are closed. The listening
    /// socket and every connection are closed when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the listener can't be registered with the runtime or the
    /// server fails.
    pub async fn serve_forever(self, shutdown: CancellationToken) -> Result<(), Error> {
        let Self {
            listener,
            resources,
            request_timeout,
        } = self;
        let local_addr = listener.local_addr();
        let app = routes::new(AppState {
            resources,
            request_timeout,
        });
        tracing::info!("HTTP-01 listening on {local_addr}");
        let executor = ConnectionExecutor::default();
        let server = axum::Server::from_tcp(listener.into_std())?
            .http1_header_read_timeout(HEADER_READ_TIMEOUT)
            .executor(executor.clone())
            .serve(app.into_make_service())
            .with_graceful_shutdown(shutdown.clone().cancelled_owned());
        let drain_expired = async {
            shutdown.cancelled().await;
            tokio::time::sleep(DRAIN_TIMEOUT).await;
        };

        let served = tokio::select! {
            served = server => served,
            () = drain_expired => {
                tracing::debug!(
                    "HTTP-01 on {local_addr} closing connections open after {DRAIN_TIMEOUT:?}"
                );
                Ok(())
            }
        };
        executor.close().await;
        served?;
        tracing::info!("HTTP-01 on {local_addr} stopped");
        Ok(())
    }
}

/// Runs hyper's connection tasks on a [`TaskTracker`] so they can be closed and waited for.
#[derive(Clone, Default)]
struct ConnectionExecutor {
    connections: TaskTracker,
    closed: CancellationToken,
}

impl ConnectionExecutor {
    async fn close(self) {
        self.closed.cancel();
        self.connections.close();
        self.connections.wait().await;
    }
}

impl<F> hyper::rt::Executor<F> for ConnectionExecutor
where
    F: Future + Send + 'static,
    F::Output: Send,
{
    fn execute(&self, connection: F) {
        let closed = self.closed.clone();
        self.connections.spawn(async move {
            tokio::select! {
                _ = connection => {}
                () = closed.cancelled() => {}
            }
        });
    }
}

#[async_trait::async_trait]
impl ChallengeServer for Http01Server {
    fn local_addr(&self) -> SocketAddr {
        Http01Server::local_addr(self)
    }

    async fn serve_forever(self, shutdown: CancellationToken) -> Result<(), Error> {
        Http01Server::serve_forever(self, shutdown).await
    }
}

//! Listening side: accept loop with backoff, per-connection dispatch, and a
//! close that returns only once the listener is gone.
//!
//! Lifecycle: `Idle -> Starting -> Listening -> Closed`. `Closed` is terminal
//! and is reached either through a fatal accept error or a close request
//! (internal via [`Server::close`], external via the token passed to
//! [`Server::serve_until`]).

mod accept;
mod dispatch;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use crate::config::CloseOrder;
use crate::endpoint::Endpoint;
use crate::error::NetError;
use crate::handler::ConnHandler;
use crate::rendezvous::{self, interruptible, CloseAck, ClosedGuard, Closer, Terminal};
use crate::retry::{classify_io_error, Backoff, RetryDecision, RetryPolicy};

use accept::Acceptor;

#[derive(Debug, Clone)]
enum ServerState {
    Idle,
    Starting(Closer),
    Listening { addr: SocketAddr, closer: Closer },
    Closed,
}

impl Terminal for ServerState {
    fn closed() -> Self {
        ServerState::Closed
    }

    fn is_closed(&self) -> bool {
        matches!(self, ServerState::Closed)
    }
}

/// Configures a [`Server`] before it is built.
pub struct ServerBuilder {
    endpoint: Endpoint,
    policy: RetryPolicy,
    close_order: CloseOrder,
    max_connections: Option<usize>,
    diagnostics: Option<Dispatch>,
}

impl ServerBuilder {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            policy: RetryPolicy::default(),
            close_order: CloseOrder::default(),
            max_connections: None,
            diagnostics: None,
        }
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn close_order(mut self, order: CloseOrder) -> Self {
        self.close_order = order;
        self
    }

    /// Bound the number of in-flight handlers. The accept loop waits for a
    /// free slot before accepting. Zero means unbounded; values above
    /// [`Semaphore::MAX_PERMITS`] are clamped to it.
    pub fn max_connections(mut self, n: usize) -> Self {
        self.max_connections = Some(n.min(Semaphore::MAX_PERMITS)).filter(|n| *n > 0);
        self
    }

    /// Diagnostic sink for the accept loop and every connection task.
    /// Without one, events go to the caller's current default subscriber.
    pub fn diagnostics(mut self, dispatch: Dispatch) -> Self {
        self.diagnostics = Some(dispatch);
        self
    }

    pub fn build<H: ConnHandler>(self, handler: H) -> Server {
        let (state, _) = watch::channel(ServerState::Idle);
        Server {
            endpoint: self.endpoint,
            policy: self.policy,
            close_order: self.close_order,
            limit: self.max_connections.map(|n| Arc::new(Semaphore::new(n))),
            diagnostics: self.diagnostics,
            handler: Arc::new(handler),
            state,
        }
    }
}

/// Owns one listener and dispatches each accepted connection to the handler.
pub struct Server {
    endpoint: Endpoint,
    policy: RetryPolicy,
    close_order: CloseOrder,
    limit: Option<Arc<Semaphore>>,
    diagnostics: Option<Dispatch>,
    handler: Arc<dyn ConnHandler>,
    state: watch::Sender<ServerState>,
}

/// Loop-side ends of a started server.
struct Session<'a> {
    close_rx: mpsc::Receiver<CloseAck>,
    closer: Closer,
    guard: ClosedGuard<'a, ServerState>,
}

impl Server {
    pub fn new<H: ConnHandler>(endpoint: Endpoint, handler: H) -> Self {
        ServerBuilder::new(endpoint).build(handler)
    }

    pub fn builder(endpoint: Endpoint) -> ServerBuilder {
        ServerBuilder::new(endpoint)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Bound address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.state.borrow() {
            ServerState::Listening { addr, .. } => Some(*addr),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().is_closed()
    }

    /// Waits until the listener is bound. Returns None if the server closed
    /// first (e.g. bind failure).
    pub async fn wait_listening(&self) -> Option<SocketAddr> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| matches!(s, ServerState::Listening { .. } | ServerState::Closed))
            .await
            .ok()?;
        let addr = match &*state {
            ServerState::Listening { addr, .. } => Some(*addr),
            _ => None,
        };
        addr
    }

    pub async fn wait_closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| s.is_closed()).await;
    }

    /// Bind and accept until closed. Blocks for the life of the server.
    ///
    /// Returns [`NetError::ServerClosed`] after a close request, or the fatal
    /// bind/accept error that stopped it.
    pub async fn listen_and_serve(&self) -> Result<(), NetError> {
        self.serve_until(CancellationToken::new()).await
    }

    /// Like [`listen_and_serve`](Self::listen_and_serve), but cancelling
    /// `shutdown` acts as a close request.
    pub async fn serve_until(&self, shutdown: CancellationToken) -> Result<(), NetError> {
        let fut = self.bind_and_serve(shutdown);
        match &self.diagnostics {
            Some(dispatch) => fut.with_subscriber(dispatch.clone()).await,
            None => fut.await,
        }
    }

    /// Ask the accept loop to close the listener and wait until it has.
    ///
    /// A no-op on a server that is not running. Concurrent callers all get
    /// an answer; only one close of the listener ever happens.
    pub async fn close(&self) -> Result<(), NetError> {
        let closer = match &*self.state.borrow() {
            ServerState::Starting(closer) | ServerState::Listening { closer, .. } => closer.clone(),
            ServerState::Idle | ServerState::Closed => return Ok(()),
        };
        closer.request().await.map_err(NetError::Close)
    }

    fn begin(&self) -> Result<Session<'_>, NetError> {
        let (closer, close_rx) = rendezvous::channel();
        let mut refused = None;
        self.state.send_if_modified(|s| match s {
            ServerState::Idle => {
                *s = ServerState::Starting(closer.clone());
                true
            }
            ServerState::Starting(_) | ServerState::Listening { .. } => {
                refused = Some(NetError::AlreadyListening);
                false
            }
            ServerState::Closed => {
                refused = Some(NetError::ServerClosed);
                false
            }
        });
        if let Some(err) = refused {
            return Err(err);
        }
        Ok(Session {
            close_rx,
            closer,
            guard: ClosedGuard::new(&self.state),
        })
    }

    async fn bind_and_serve(&self, shutdown: CancellationToken) -> Result<(), NetError> {
        let mut session = self.begin()?;
        let resolving = self.endpoint.resolve();
        let addrs = match interruptible(&mut session.close_rx, &shutdown, resolving).await {
            Ok(resolved) => resolved?,
            Err(interrupt) => {
                session.guard.mark();
                tracing::debug!(endpoint = %self.endpoint, "closed before listening");
                let result = Ok(());
                interrupt.acknowledge(&result);
                rendezvous::drain(&mut session.close_rx, &result);
                return Err(NetError::ServerClosed);
            }
        };
        let bind_err = |source| NetError::Bind {
            addr: self.endpoint.address().to_string(),
            source,
        };
        let listener = TcpListener::bind(&addrs[..]).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        self.run(session, listener, local_addr, shutdown).await
    }

    async fn run<A: Acceptor>(
        &self,
        session: Session<'_>,
        acceptor: A,
        local_addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> Result<(), NetError> {
        let Session {
            mut close_rx,
            closer,
            guard,
        } = session;
        // Declared after close_rx so an abandoned loop drops the listener
        // before any queued close request sees its reply channel vanish.
        let mut acceptor = acceptor;

        self.state.send_replace(ServerState::Listening {
            addr: local_addr,
            closer,
        });
        tracing::info!(%local_addr, endpoint = %self.endpoint, "listening");

        let mut backoff = Backoff::new(self.policy);
        let interrupt = loop {
            let permit = match &self.limit {
                Some(limit) => {
                    match interruptible(&mut close_rx, &shutdown, Arc::clone(limit).acquire_owned())
                        .await
                    {
                        Ok(permit) => permit.ok(),
                        Err(interrupt) => break interrupt,
                    }
                }
                None => None,
            };

            let accepted = match interruptible(&mut close_rx, &shutdown, acceptor.accept()).await {
                Ok(accepted) => accepted,
                Err(interrupt) => break interrupt,
            };

            match accepted {
                Ok((stream, peer)) => {
                    backoff.reset();
                    dispatch::spawn(Arc::clone(&self.handler), stream, peer, permit);
                }
                Err(err) => match backoff.next_delay(classify_io_error(&err, backoff.policy())) {
                    RetryDecision::RetryAfter(delay) => {
                        tracing::warn!(error = %err, ?delay, "accept: transient error, retrying");
                        let sleep = tokio::time::sleep(delay);
                        if let Err(interrupt) = interruptible(&mut close_rx, &shutdown, sleep).await {
                            break interrupt;
                        }
                    }
                    RetryDecision::NoRetry => {
                        tracing::error!(error = %err, %local_addr, "accept: fatal error, closing listener");
                        self.release(&guard, acceptor);
                        rendezvous::drain(&mut close_rx, &Ok(()));
                        return Err(NetError::Accept(err));
                    }
                },
            }
        };

        tracing::debug!(%local_addr, "close requested");
        self.release(&guard, acceptor);
        let result = Ok(());
        interrupt.acknowledge(&result);
        rendezvous::drain(&mut close_rx, &result);
        tracing::info!(%local_addr, "server closed");
        Err(NetError::ServerClosed)
    }

    /// The single place the listener is closed.
    fn release<A: Acceptor>(&self, guard: &ClosedGuard<'_, ServerState>, acceptor: A) {
        match self.close_order {
            CloseOrder::MarkFirst => {
                guard.mark();
                drop(acceptor);
            }
            CloseOrder::CloseFirst => {
                drop(acceptor);
                guard.mark();
            }
        }
    }
}

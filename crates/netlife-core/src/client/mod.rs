//! Dialing side: dial with backoff, hand the connection to the handler, and
//! close it exactly once.
//!
//! A client is single-shot: `Idle -> Dialing -> Connected -> Closed`. Once the
//! handler returns (or a close is requested) the client stays closed and a
//! new one is needed for the next connection.

mod dial;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use crate::config::CloseOrder;
use crate::endpoint::Endpoint;
use crate::error::NetError;
use crate::handler::{run_handler, ConnHandler};
use crate::rendezvous::{
    self, interruptible, CloseAck, CloseResult, ClosedGuard, Closer, Interrupt, Terminal,
};
use crate::retry::{classify_io_error, Backoff, RetryDecision, RetryPolicy};

use dial::{Dialer, TcpDialer};

#[derive(Debug, Clone)]
enum ClientState {
    Idle,
    Dialing(Closer),
    Connected { peer: SocketAddr, closer: Closer },
    Closed,
}

impl Terminal for ClientState {
    fn closed() -> Self {
        ClientState::Closed
    }

    fn is_closed(&self) -> bool {
        matches!(self, ClientState::Closed)
    }
}

/// Configures a [`Client`] before it is built.
pub struct ClientBuilder {
    endpoint: Endpoint,
    policy: RetryPolicy,
    close_order: CloseOrder,
    diagnostics: Option<Dispatch>,
}

impl ClientBuilder {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            policy: RetryPolicy::default(),
            close_order: CloseOrder::default(),
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

    pub fn diagnostics(mut self, dispatch: Dispatch) -> Self {
        self.diagnostics = Some(dispatch);
        self
    }

    pub fn build<H: ConnHandler>(self, handler: H) -> Client {
        let (state, _) = watch::channel(ClientState::Idle);
        Client {
            endpoint: self.endpoint,
            policy: self.policy,
            close_order: self.close_order,
            diagnostics: self.diagnostics,
            handler: Arc::new(handler),
            state,
        }
    }
}

/// Dials one outbound connection and runs the handler on it.
pub struct Client {
    endpoint: Endpoint,
    policy: RetryPolicy,
    close_order: CloseOrder,
    diagnostics: Option<Dispatch>,
    handler: Arc<dyn ConnHandler>,
    state: watch::Sender<ClientState>,
}

impl Client {
    pub fn new<H: ConnHandler>(endpoint: Endpoint, handler: H) -> Self {
        ClientBuilder::new(endpoint).build(handler)
    }

    pub fn builder(endpoint: Endpoint) -> ClientBuilder {
        ClientBuilder::new(endpoint)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().is_closed()
    }

    /// Remote address while connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match &*self.state.borrow() {
            ClientState::Connected { peer, .. } => Some(*peer),
            _ => None,
        }
    }

    /// Waits until a connection is established. Returns None if the client
    /// closed without connecting.
    pub async fn wait_connected(&self) -> Option<SocketAddr> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| matches!(s, ClientState::Connected { .. } | ClientState::Closed))
            .await
            .ok()?;
        let peer = match &*state {
            ClientState::Connected { peer, .. } => Some(*peer),
            _ => None,
        };
        peer
    }

    pub async fn wait_closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| s.is_closed()).await;
    }

    /// Dial (retrying transient errors) and run the handler on the
    /// connection. Blocks until the handler returns.
    ///
    /// Returns the handler's error as [`NetError::Handler`], a fatal dial
    /// error as [`NetError::Dial`], and `Ok(())` if closed before the handler
    /// finished.
    pub async fn connect(&self) -> Result<(), NetError> {
        self.connect_until(CancellationToken::new()).await
    }

    /// Like [`connect`](Self::connect), but cancelling `shutdown` acts as a
    /// close request.
    pub async fn connect_until(&self, shutdown: CancellationToken) -> Result<(), NetError> {
        let fut = self.run(shutdown, TcpDialer);
        match &self.diagnostics {
            Some(dispatch) => fut.with_subscriber(dispatch.clone()).await,
            None => fut.await,
        }
    }

    /// Close the connection (or abandon the dial) and wait until it is done.
    /// Idempotent; a no-op on a client that never connected.
    pub async fn close(&self) -> Result<(), NetError> {
        let closer = match &*self.state.borrow() {
            ClientState::Dialing(closer) | ClientState::Connected { closer, .. } => closer.clone(),
            ClientState::Idle | ClientState::Closed => return Ok(()),
        };
        closer.request().await.map_err(NetError::Close)
    }

    async fn run<D: Dialer>(
        &self,
        shutdown: CancellationToken,
        mut dialer: D,
    ) -> Result<(), NetError> {
        let (closer, mut close_rx) = rendezvous::channel();
        let mut refused = None;
        self.state.send_if_modified(|s| match s {
            ClientState::Idle => {
                *s = ClientState::Dialing(closer.clone());
                true
            }
            ClientState::Dialing(_) | ClientState::Connected { .. } => {
                refused = Some(NetError::AlreadyConnected);
                false
            }
            ClientState::Closed => {
                refused = Some(NetError::ClientClosed);
                false
            }
        });
        if let Some(err) = refused {
            return Err(err);
        }
        let guard = ClosedGuard::new(&self.state);

        let addrs = match interruptible(&mut close_rx, &shutdown, self.endpoint.resolve()).await {
            Ok(resolved) => resolved?,
            Err(interrupt) => {
                self.abandon(&guard, interrupt, &mut close_rx);
                return Ok(());
            }
        };

        // Scoped to this dial sequence, so every connect starts at the minimum.
        let mut backoff = Backoff::new(self.policy);
        let mut stream = loop {
            let dial = dialer.dial(&addrs);
            let dialed = match interruptible(&mut close_rx, &shutdown, dial).await {
                Ok(dialed) => dialed,
                Err(interrupt) => {
                    self.abandon(&guard, interrupt, &mut close_rx);
                    return Ok(());
                }
            };
            match dialed {
                Ok(stream) => break stream,
                Err(err) => match backoff.next_delay(classify_io_error(&err, backoff.policy())) {
                    RetryDecision::RetryAfter(delay) => {
                        tracing::warn!(
                            error = %err,
                            ?delay,
                            endpoint = %self.endpoint,
                            "connect: transient error, retrying"
                        );
                        let sleep = tokio::time::sleep(delay);
                        if let Err(interrupt) = interruptible(&mut close_rx, &shutdown, sleep).await {
                            self.abandon(&guard, interrupt, &mut close_rx);
                            return Ok(());
                        }
                    }
                    RetryDecision::NoRetry => {
                        guard.mark();
                        rendezvous::drain(&mut close_rx, &Ok(()));
                        return Err(NetError::Dial {
                            addr: self.endpoint.address().to_string(),
                            source: err,
                        });
                    }
                },
            }
        };

        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(source) => {
                if let Err(err) = self.release(&guard, stream).await {
                    tracing::debug!(endpoint = %self.endpoint, "connection shutdown: {}", err);
                }
                rendezvous::drain(&mut close_rx, &Ok(()));
                return Err(NetError::Dial {
                    addr: self.endpoint.address().to_string(),
                    source,
                });
            }
        };
        self.state.send_modify(|s| {
            *s = ClientState::Connected {
                peer,
                closer: closer.clone(),
            }
        });
        tracing::debug!(%peer, "connected");

        let outcome = interruptible(
            &mut close_rx,
            &shutdown,
            run_handler(&*self.handler, &mut stream, peer),
        )
        .await;
        let closed = self.release(&guard, stream).await;

        match outcome {
            Ok(handled) => {
                if let Err(err) = &closed {
                    tracing::debug!(%peer, "connection shutdown: {}", err);
                }
                rendezvous::drain(&mut close_rx, &closed);
                handled.map_err(NetError::Handler)
            }
            Err(interrupt) => {
                tracing::debug!(%peer, "closed while handler was running");
                interrupt.acknowledge(&closed);
                rendezvous::drain(&mut close_rx, &closed);
                Ok(())
            }
        }
    }

    /// Close requested before a connection existed.
    fn abandon(
        &self,
        guard: &ClosedGuard<'_, ClientState>,
        interrupt: Interrupt,
        close_rx: &mut mpsc::Receiver<CloseAck>,
    ) {
        guard.mark();
        tracing::debug!(endpoint = %self.endpoint, "closed before connecting");
        let result = Ok(());
        interrupt.acknowledge(&result);
        rendezvous::drain(close_rx, &result);
    }

    /// The single place the connection is closed.
    async fn release(&self, guard: &ClosedGuard<'_, ClientState>, stream: TcpStream) -> CloseResult {
        match self.close_order {
            CloseOrder::MarkFirst => {
                guard.mark();
                shutdown(stream).await
            }
            CloseOrder::CloseFirst => {
                let result = shutdown(stream).await;
                guard.mark();
                result
            }
        }
    }
}

async fn shutdown(mut stream: TcpStream) -> CloseResult {
    match stream.shutdown().await {
        Err(err) if err.kind() != std::io::ErrorKind::NotConnected => Err(err),
        _ => Ok(()),
    }
}

//! Request client: public API over the connection engine.
//!
//! A [`Client`] owns one logical endpoint to one server. It can send typed
//! requests fire-and-forget or await a correlated typed response, while the
//! same connection carries unsolicited requests from the peer that are
//! routed to registered [`RequestHandler`]s.
//!
//! # Example
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use websocket_request::{Client, RequestType, Result};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Ping {
//!     seq: u64,
//! }
//!
//! impl RequestType for Ping {
//!     const TYPE: &'static str = "ping";
//! }
//!
//! #[derive(Serialize, Deserialize)]
//! struct Pong {
//!     seq: u64,
//! }
//!
//! impl RequestType for Pong {
//!     const TYPE: &'static str = "pong";
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder("ws://127.0.0.1:9000")
//!         .on_connect_error(|err, delay| {
//!             eprintln!("connect failed: {err}, retrying in {delay:?}");
//!         })
//!         .build();
//!
//!     client.connect()?;
//!
//!     let pending = client
//!         .send_request_with_response::<Ping, Pong>(&Ping { seq: 1 })
//!         .await?;
//!     let pong = pending.recv().await?;
//!     println!("pong: {}", pong.seq);
//!
//!     client.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Reconnection delay schedule |
//! | `engine` | Connection lifecycle state machine and inbound router |
//! | `pending` | Correlation table entries and caller handles |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnection backoff schedule.
pub(crate) mod backoff;

/// Connection engine task.
pub(crate) mod engine;

/// Pending request correlation.
pub mod pending;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{Error, Result};
use crate::handler::{HandlerRegistry, RequestHandler};
use crate::identifiers::RequestRef;
use crate::protocol::{Envelope, RequestType};
use crate::transport::socket::{self, ClientRequest, Connector};

use engine::{Command, Engine};
use pending::{CorrelationMap, PendingRequest, PendingResponse};

// ============================================================================
// Hooks
// ============================================================================

/// Caller-supplied notification hooks and policies.
///
/// All optional; defaults are no-ops and an always-retry policy.
pub(crate) struct Hooks {
    /// Decorates the handshake request before each connect attempt.
    pub(crate) connector: Option<Connector>,
    /// Invoked on every failed connect attempt with the computed delay.
    pub(crate) on_connect_error: Box<dyn Fn(&Error, Duration) + Send + Sync>,
    /// Invoked when an inbound request has no registered handler.
    pub(crate) on_unknown_type: Box<dyn Fn(&str) + Send + Sync>,
    /// Invoked when a handler fails while decoding or processing.
    pub(crate) on_handler_error: Box<dyn Fn(&str, &Error) + Send + Sync>,
    /// Consulted after an unsolicited disconnect; `false` stops retrying.
    pub(crate) reconnect_policy: Box<dyn Fn() -> bool + Send + Sync>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            connector: None,
            on_connect_error: Box::new(|_, _| {}),
            on_unknown_type: Box::new(|_| {}),
            on_handler_error: Box::new(|_, _| {}),
            reconnect_policy: Box::new(|| true),
        }
    }
}

// ============================================================================
// Shared
// ============================================================================

/// State shared between the client API and the engine task.
pub(crate) struct Shared {
    /// Target WebSocket URL.
    pub(crate) url: String,
    /// Outstanding correlated requests.
    pub(crate) correlation: Mutex<CorrelationMap>,
    /// Registered inbound request handlers, keyed by type tag.
    pub(crate) handlers: Mutex<HandlerRegistry>,
    /// Whether a physical connection is currently open.
    pub(crate) connected: AtomicBool,
    /// Distinguishes "user asked to disconnect" from "transport dropped".
    pub(crate) intentionally_open: AtomicBool,
    /// Notification hooks.
    pub(crate) hooks: Hooks,
}

// ============================================================================
// Client
// ============================================================================

/// A bidirectional request/response client over one WebSocket connection.
///
/// # Thread Safety
///
/// `Client` is `Send + Sync` and cheap to clone; clones share the same
/// connection, correlation table, and handler registry. The engine task
/// exclusively owns the socket, so every entry point may be called
/// concurrently from different tasks.
pub struct Client {
    shared: Arc<Shared>,
    command_tx: mpsc::UnboundedSender<Command>,
}

impl Clone for Client {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            command_tx: self.command_tx.clone(),
        }
    }
}

impl Client {
    /// Creates a client with default hooks.
    ///
    /// Must be called within a tokio runtime; the engine task is spawned
    /// immediately and idles until [`connect`](Self::connect).
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::builder(url).build()
    }

    /// Returns a builder for configuring hooks.
    #[must_use]
    pub fn builder(url: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            url: url.into(),
            hooks: Hooks::default(),
        }
    }

    /// Connects to the server, or reconnects if already connected.
    ///
    /// The connect itself is asynchronous: this returns once the attempt is
    /// issued, not once the connection is up. An already-open connection is
    /// closed with a `"Reconnecting"` reason first. Failed attempts retry
    /// with escalating backoff until [`disconnect`](Self::disconnect).
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`] or the connector's error if the
    /// handshake request cannot even be constructed (bad URL, decorator
    /// failure). Such errors are fatal and not retried.
    pub fn connect(&self) -> Result<()> {
        // Surface construction failures to the caller immediately; the
        // engine rebuilds the request per attempt.
        socket::build_request(&self.shared.url, self.shared.hooks.connector.as_ref())?;

        self.shared
            .intentionally_open
            .store(true, Ordering::SeqCst);
        self.command_tx
            .send(Command::Connect)
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Disconnects from the server.
    ///
    /// Closes an open connection with a `"Disconnecting"` reason and
    /// cancels any scheduled reconnect attempt. No automatic reconnection
    /// occurs afterward until the next [`connect`](Self::connect).
    pub fn disconnect(&self) {
        self.shared
            .intentionally_open
            .store(false, Ordering::SeqCst);
        if self.command_tx.send(Command::Disconnect).is_err() {
            debug!("Disconnect after engine terminated");
        }
    }

    /// Registers a handler for its request type.
    ///
    /// The last registration for a given type tag wins. Handlers may be
    /// registered before or after connecting.
    pub fn register_handler<H: RequestHandler>(&self, handler: H) {
        self.shared.handlers.lock().insert(handler);
    }

    /// Sends a fire-and-forget request.
    ///
    /// No acknowledgement from the peer is expected or awaited.
    ///
    /// # Errors
    ///
    /// Only transmission-level failures are surfaced:
    /// [`Error::NotConnected`], [`Error::ConnectionClosed`],
    /// [`Error::Json`], or [`Error::WebSocket`].
    pub async fn send_request<R: RequestType>(&self, request: &R) -> Result<()> {
        let envelope = Envelope::request(R::TYPE, request.encode()?);
        self.transmit(envelope).await
    }

    /// Sends a correlated request and returns a handle for its response.
    ///
    /// The returned [`PendingResponse`] resolves when a `RESPONSE` envelope
    /// with the matching correlation id arrives; its payload is decoded
    /// with `Resp`'s decoder, which may be a structurally different type
    /// than the request.
    ///
    /// # Errors
    ///
    /// Transmission-level failures only; once this returns `Ok`, the
    /// outcome is reported through the handle.
    pub async fn send_request_with_response<Req, Resp>(
        &self,
        request: &Req,
    ) -> Result<PendingResponse<Resp>>
    where
        Req: RequestType,
        Resp: RequestType,
    {
        let reference = RequestRef::generate();
        let (entry, rx) = PendingRequest::new();

        // Register before transmitting so a fast response always matches.
        self.shared.correlation.lock().insert(reference, entry);

        let envelope = Envelope::correlated(Req::TYPE, reference, request.encode()?);
        match self.transmit(envelope).await {
            Ok(()) => Ok(PendingResponse::new(reference, rx)),
            Err(err) => {
                self.shared.correlation.lock().remove(&reference);
                Err(err)
            }
        }
    }

    /// Returns `true` while a physical connection is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Returns the number of outstanding correlated requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.correlation.lock().len()
    }

    /// Hands one envelope to the engine and waits for the write outcome.
    async fn transmit(&self, envelope: Envelope) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Transmit {
                envelope,
                ack: ack_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        ack_rx.await.map_err(|_| Error::ConnectionClosed)?
    }
}

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for a [`Client`] with custom hooks.
#[must_use]
pub struct ClientBuilder {
    url: String,
    hooks: Hooks,
}

impl ClientBuilder {
    /// Sets the connection decorator, applied to the handshake request
    /// before every connect attempt (e.g. to add auth headers).
    pub fn connector(
        mut self,
        connector: impl Fn(ClientRequest) -> Result<ClientRequest> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.connector = Some(Box::new(connector));
        self
    }

    /// Sets the connect-error notifier, called with the error and the
    /// delay before the next attempt.
    pub fn on_connect_error(
        mut self,
        hook: impl Fn(&Error, Duration) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_connect_error = Box::new(hook);
        self
    }

    /// Sets the unknown-type notifier, called with the raw type tag of an
    /// inbound request nobody handles.
    pub fn on_unknown_type(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.hooks.on_unknown_type = Box::new(hook);
        self
    }

    /// Sets the handler-exception notifier, called with the type tag and
    /// the error when a handler fails.
    pub fn on_handler_error(
        mut self,
        hook: impl Fn(&str, &Error) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_handler_error = Box::new(hook);
        self
    }

    /// Sets the reconnection policy, consulted after an unsolicited
    /// disconnect. Never consulted for connect-attempt failures.
    pub fn reconnect_policy(mut self, policy: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.hooks.reconnect_policy = Box::new(policy);
        self
    }

    /// Builds the client and spawns its engine task.
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn build(self) -> Client {
        let shared = Arc::new(Shared {
            url: self.url,
            correlation: Mutex::new(CorrelationMap::default()),
            handlers: Mutex::new(HandlerRegistry::default()),
            connected: AtomicBool::new(false),
            intentionally_open: AtomicBool::new(false),
            hooks: self.hooks,
        });

        let command_tx = Engine::spawn(Arc::clone(&shared));

        Client { shared, command_tx }
    }
}

// ============================================================================
// Tests
// ============================================================================

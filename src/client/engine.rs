//! Connection engine: lifecycle state machine and inbound router.
//!
//! A single spawned task owns the physical WebSocket for its whole life.
//! The socket handle never leaves this task and is replaced wholesale on
//! every reconnect attempt, so there is no send-after-close race: all
//! writes funnel through the engine's command channel.
//!
//! Handler invocations run on their own spawned tasks, with replies
//! funneled back through a per-session channel, so a handler can call back
//! into the same client while the engine keeps servicing the socket and
//! the command channel.
//!
//! # State Machine
//!
//! ```text
//! Idle ──connect()──► Connecting ──ok──► Connected
//!  ▲                      │  ▲              │
//!  │            connect error│  │            │ unsolicited drop
//!  │   (backoff 5s..60s,     │  │            ▼
//!  │    notifier hook)       ▼  │        policy? ──false──► Idle
//!  │                      Backoff└──1s──────┘true
//!  └────────── disconnect() cancels any of the above
//! ```
//!
//! Scheduled retries are cancellable sleeps: a `Disconnect` command arriving
//! mid-backoff cancels the pending attempt deterministically instead of
//! relying on a flag check when the timer fires.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::from_str;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::client::backoff::{RECONNECT_DELAY, ReconnectBackoff};
use crate::client::{Shared, pending};
use crate::error::{Error, Result};
use crate::protocol::Envelope;
use crate::transport::socket::{self, WsSink, WsStream};

// ============================================================================
// Command
// ============================================================================

/// Commands from the client API to the engine task.
pub(crate) enum Command {
    /// Begin connecting; closes and replaces any open connection.
    Connect,
    /// Close the connection and return to idle. Cancels scheduled retries.
    Disconnect,
    /// Serialize and transmit one envelope on the open connection.
    Transmit {
        envelope: Envelope,
        ack: oneshot::Sender<Result<()>>,
    },
}

// ============================================================================
// Session Outcomes
// ============================================================================

/// Why a connected session ended.
enum SessionEnd {
    /// The peer or network dropped the connection.
    Dropped,
    /// Explicit `disconnect()`.
    Disconnected,
    /// Explicit `connect()` while connected; close and dial again.
    Reconnect,
    /// The client handle was dropped.
    Shutdown,
}

/// How a cancellable delay ended.
enum Wait {
    /// Delay elapsed; proceed with the scheduled attempt.
    Elapsed,
    /// Explicit `connect()` arrived; attempt immediately.
    Connect,
    /// Explicit `disconnect()` arrived; abandon the scheduled attempt.
    Cancelled,
    /// The client handle was dropped.
    Shutdown,
}

/// Whether the engine keeps serving after leaving the connect loop.
enum Exit {
    Idle,
    Shutdown,
}

// ============================================================================
// Engine
// ============================================================================

/// The connection engine task state.
pub(crate) struct Engine {
    shared: Arc<Shared>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    backoff: ReconnectBackoff,
}

impl Engine {
    /// Spawns the engine task and returns its command channel.
    pub(crate) fn spawn(shared: Arc<Shared>) -> mpsc::UnboundedSender<Command> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let engine = Self {
            shared,
            command_rx,
            backoff: ReconnectBackoff::new(),
        };
        tokio::spawn(engine.run());

        command_tx
    }

    /// Engine main loop: idle until told to connect, then run the connect
    /// loop until explicitly disconnected or the client is dropped.
    async fn run(mut self) {
        loop {
            match self.command_rx.recv().await {
                Some(Command::Connect) => match self.connect_loop().await {
                    Exit::Idle => {}
                    Exit::Shutdown => break,
                },

                // Already idle; nothing to close or cancel.
                Some(Command::Disconnect) => {}

                Some(Command::Transmit { ack, .. }) => {
                    let _ = ack.send(Err(Error::NotConnected));
                }

                None => break,
            }
        }

        pending::fail_all(&self.shared.correlation, || Error::ConnectionClosed);
        debug!("Connection engine terminated");
    }

    /// Connect, serve, and reconnect until the engine goes idle.
    async fn connect_loop(&mut self) -> Exit {
        loop {
            let request = match socket::build_request(
                &self.shared.url,
                self.shared.hooks.connector.as_ref(),
            ) {
                Ok(request) => request,
                Err(err) => match self.connect_error_wait(err).await {
                    Wait::Elapsed | Wait::Connect => continue,
                    Wait::Cancelled => return Exit::Idle,
                    Wait::Shutdown => return Exit::Shutdown,
                },
            };

            debug!(url = %self.shared.url, "Connecting");
            let stream = match socket::open(request).await {
                Ok(stream) => stream,
                Err(err) => match self.connect_error_wait(err).await {
                    Wait::Elapsed | Wait::Connect => continue,
                    Wait::Cancelled => return Exit::Idle,
                    Wait::Shutdown => return Exit::Shutdown,
                },
            };

            self.backoff.reset();
            self.shared.connected.store(true, Ordering::SeqCst);
            debug!("Connected");

            let end = self.session(stream).await;
            self.shared.connected.store(false, Ordering::SeqCst);

            match end {
                SessionEnd::Dropped => {
                    // A response can never arrive on a future connection.
                    pending::fail_all(&self.shared.correlation, || Error::ConnectionReset);

                    if !self.shared.intentionally_open.load(Ordering::SeqCst) {
                        debug!("Dropped after explicit disconnect; staying idle");
                        return Exit::Idle;
                    }
                    if !(self.shared.hooks.reconnect_policy)() {
                        debug!("Reconnect declined by policy");
                        return Exit::Idle;
                    }

                    // The link was up and then closed: one prompt retry,
                    // no escalation.
                    debug!(delay_secs = RECONNECT_DELAY.as_secs(), "Scheduling reconnect");
                    match self.wait(RECONNECT_DELAY).await {
                        Wait::Elapsed | Wait::Connect => {}
                        Wait::Cancelled => return Exit::Idle,
                        Wait::Shutdown => return Exit::Shutdown,
                    }
                }

                SessionEnd::Reconnect => {
                    pending::fail_all(&self.shared.correlation, || Error::ConnectionReset);
                }

                SessionEnd::Disconnected => {
                    pending::fail_all(&self.shared.correlation, || Error::ConnectionClosed);
                    return Exit::Idle;
                }

                SessionEnd::Shutdown => {
                    return Exit::Shutdown;
                }
            }
        }
    }

    /// Notifies the connect-error hook and waits out the escalating delay.
    ///
    /// Skipped entirely when a disconnect raced the attempt.
    async fn connect_error_wait(&mut self, err: Error) -> Wait {
        if !self.shared.intentionally_open.load(Ordering::SeqCst) {
            debug!(error = %err, "Connect attempt failed after disconnect");
            return Wait::Cancelled;
        }

        let delay = self.backoff.next_delay();
        warn!(
            error = %err,
            failures = self.backoff.failures(),
            delay_secs = delay.as_secs(),
            "Connect attempt failed"
        );
        (self.shared.hooks.on_connect_error)(&err, delay);
        self.wait(delay).await
    }

    /// Sleeps for `delay` while still answering commands.
    ///
    /// Transmit attempts during the delay fail with `NotConnected`;
    /// connect/disconnect commands end the wait.
    async fn wait(&mut self, delay: Duration) -> Wait {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return Wait::Elapsed,

                command = self.command_rx.recv() => match command {
                    Some(Command::Connect) => return Wait::Connect,
                    Some(Command::Disconnect) => return Wait::Cancelled,
                    Some(Command::Transmit { ack, .. }) => {
                        let _ = ack.send(Err(Error::NotConnected));
                    }
                    None => return Wait::Shutdown,
                },
            }
        }
    }

    /// Serves one physical connection until it ends.
    async fn session(&mut self, stream: WsStream) -> SessionEnd {
        let shared = Arc::clone(&self.shared);
        let (mut ws_write, mut ws_read) = stream.split();

        // Replies from spawned handler tasks. Dropped with the session, so a
        // late reply can never cross onto a newer connection.
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Envelope>();

        loop {
            tokio::select! {
                message = ws_read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        Self::route_text(&shared, text.as_str(), &reply_tx);
                    }

                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "WebSocket closed by peer");
                        return SessionEnd::Dropped;
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        return SessionEnd::Dropped;
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        return SessionEnd::Dropped;
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                },

                reply = reply_rx.recv() => {
                    // The session holds `reply_tx`, so `None` is unreachable.
                    if let Some(envelope) = reply
                        && let Err(e) = Self::write(&mut ws_write, &envelope).await
                    {
                        warn!(error = %e, "Failed to send handler response");
                    }
                }

                command = self.command_rx.recv() => match command {
                    Some(Command::Transmit { envelope, ack }) => {
                        let result = Self::write(&mut ws_write, &envelope).await;
                        let _ = ack.send(result);
                    }

                    Some(Command::Disconnect) => {
                        socket::close(&mut ws_write, "Disconnecting").await;
                        return SessionEnd::Disconnected;
                    }

                    Some(Command::Connect) => {
                        socket::close(&mut ws_write, "Reconnecting").await;
                        return SessionEnd::Reconnect;
                    }

                    None => {
                        socket::close(&mut ws_write, "Disconnecting").await;
                        return SessionEnd::Shutdown;
                    }
                },
            }
        }
    }

    /// Routes one inbound text frame.
    ///
    /// Every frame lands in exactly one of: a pending-request slot, a
    /// registered handler, or a notifier hook. Handlers run on their own
    /// spawned task, so a handler that sends a follow-up request on the same
    /// client never blocks the engine. Nothing raised here ever propagates
    /// out of the dispatch loop.
    fn route_text(shared: &Arc<Shared>, text: &str, reply_tx: &mpsc::UnboundedSender<Envelope>) {
        let envelope: Envelope = match from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Discarding unparseable frame");
                return;
            }
        };

        // Response path: match against the correlation table.
        if envelope.is_response()
            && let Some(reference) = envelope.reference
        {
            let pending = shared.correlation.lock().remove(&reference);
            let Some(pending) = pending else {
                // Protocol violation by the peer; discard rather than crash.
                warn!(%reference, "Response for unknown request");
                return;
            };

            if envelope.is_success() {
                trace!(%reference, "Response matched");
                pending.resolve(Ok(envelope.data));
            } else {
                let message = envelope.error.unwrap_or_default();
                let errno = envelope.errno.unwrap_or_default();
                debug!(%reference, %message, errno, "Failure response matched");
                pending.resolve(Err(Error::response(message, errno)));
            }
            return;
        }

        // Request path: dispatch to the registered handler.
        let handler = shared.handlers.lock().get(&envelope.type_tag);
        let Some(handler) = handler else {
            debug!(type_tag = %envelope.type_tag, "No handler for inbound request");
            (shared.hooks.on_unknown_type)(&envelope.type_tag);
            return;
        };

        let shared = Arc::clone(shared);
        let type_tag = envelope.type_tag;
        if let Some(reference) = envelope.reference {
            let reply_tx = reply_tx.clone();
            tokio::spawn(async move {
                match handler.dispatch_with_response(envelope.data).await {
                    Ok(reply) => {
                        // Fails only if the session already ended.
                        let _ = reply_tx.send(Envelope::response(reference, reply));
                    }
                    Err(err) => {
                        (shared.hooks.on_handler_error)(&type_tag, &err);
                    }
                }
            });
        } else {
            tokio::spawn(async move {
                if let Err(err) = handler.dispatch(envelope.data).await {
                    (shared.hooks.on_handler_error)(&type_tag, &err);
                }
            });
        }
    }

    /// Serializes and transmits one envelope.
    async fn write(ws_write: &mut WsSink, envelope: &Envelope) -> Result<()> {
        let json = serde_json::to_string(envelope)?;
        trace!(type_tag = %envelope.type_tag, "Sending frame");
        ws_write.send(Message::Text(json.into())).await?;
        Ok(())
    }
}

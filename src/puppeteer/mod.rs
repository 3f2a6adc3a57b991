//! Controller side of the protocol
//!
//! [`BrowserPuppeteer`] runs a websocket server that accepts exactly one
//! puppet at a time and keeps at most one request in flight. Replies (ack/nak)
//! settle the pending request; every other upstream message is published as a
//! [`PuppeteerEvent`].

pub mod server;

use crate::codec::{decode, encode, message_type, truncate, JsFunction, Jsonf};
use crate::config::PuppeteerConfig;
use crate::error::{BrowserError, Result};
use crate::protocol::{CapturedEvent, Command, DownstreamMessage, UpstreamMessage};
use crate::selector::UniqueSelectorOptions;
use axum::extract::ws::Message;
use axum::http::StatusCode;
use futures::future::BoxFuture;
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Inbound messages are traced up to this many characters
const MAX_TRACE_RAW_LENGTH: usize = 300;

const EVENT_CAPACITY: usize = 256;

/// Notifications for collaborators
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum PuppeteerEvent {
    #[serde(rename = "puppetConnected")]
    PuppetConnected { puppet_id: u64 },
    #[serde(rename = "puppetDisconnected")]
    PuppetDisconnected { puppet_id: u64 },
    #[serde(rename = "selector-became-visible")]
    SelectorBecameVisible { selector: String },
    #[serde(rename = "captured-event")]
    CapturedEvent { event: CapturedEvent },
    #[serde(rename = "insert-assertion")]
    InsertAssertion,
    #[serde(rename = "console-pipe")]
    ConsolePipe { message_type: String, message: String },
}

impl PuppeteerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PuppeteerEvent::PuppetConnected { .. } => "puppetConnected",
            PuppeteerEvent::PuppetDisconnected { .. } => "puppetDisconnected",
            PuppeteerEvent::SelectorBecameVisible { .. } => "selector-became-visible",
            PuppeteerEvent::CapturedEvent { .. } => "captured-event",
            PuppeteerEvent::InsertAssertion => "insert-assertion",
            PuppeteerEvent::ConsolePipe { .. } => "console-pipe",
        }
    }
}

pub(crate) struct Session {
    puppet_id: u64,
    conn_id: u64,
    outbound: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
}

struct Pending {
    id: u64,
    description: String,
    reply: oneshot::Sender<Result<Option<Jsonf>>>,
}

pub(crate) struct PuppeteerState {
    config: PuppeteerConfig,
    session: Mutex<Option<Session>>,
    pending: Mutex<Option<Pending>>,
    blacklist: Mutex<HashSet<u64>>,
    events: broadcast::Sender<PuppeteerEvent>,
    next_id: AtomicU64,
}

impl PuppeteerState {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn emit(&self, event: PuppeteerEvent) {
        trace!("emitting {}", event.name());
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn is_puppet_connected(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Why a handshake from `puppet_id` would be refused, if it would
    fn admission(&self, puppet_id: u64) -> std::result::Result<(), (StatusCode, String)> {
        if self.blacklist.lock().contains(&puppet_id) {
            return Err((StatusCode::FORBIDDEN, format!("puppet id {} is on blacklist", puppet_id)));
        }
        if self.is_puppet_connected() {
            return Err((StatusCode::CONFLICT, "already connected".to_string()));
        }
        Ok(())
    }

    fn install_session(
        &self,
        puppet_id: u64,
        outbound: mpsc::UnboundedSender<Message>,
    ) -> Option<(u64, CancellationToken)> {
        if self.blacklist.lock().contains(&puppet_id) {
            return None;
        }

        let mut session = self.session.lock();
        if session.is_some() {
            return None;
        }

        let conn_id = self.next_id();
        let cancel = CancellationToken::new();
        *session = Some(Session { puppet_id, conn_id, outbound, cancel: cancel.clone() });
        Some((conn_id, cancel))
    }

    /// Tear down the current session; `conn_id` restricts it to one connection
    fn close_session(&self, conn_id: Option<u64>) -> Option<u64> {
        let session = {
            let mut slot = self.session.lock();
            let stale = match (slot.as_ref(), conn_id) {
                (Some(current), Some(id)) => current.conn_id != id,
                _ => false,
            };
            if stale {
                return None;
            }
            slot.take()?
        };

        debug!("closeConnection, puppet id: {}", session.puppet_id);
        session.close();

        if let Some(pending) = self.pending.lock().take() {
            warn!("connection lost while waiting for a reply to {}", pending.description);
            let _ = pending.reply.send(Err(BrowserError::ConnectionLost));
        }

        self.emit(PuppeteerEvent::PuppetDisconnected { puppet_id: session.puppet_id });
        Some(session.puppet_id)
    }

    fn transmit(&self, raw: String) -> Result<()> {
        let session = self.session.lock();
        match session.as_ref() {
            Some(session) if session.send_text(raw) => Ok(()),
            _ => Err(BrowserError::NotConnected),
        }
    }

    /// Free the pending slot if it still belongs to request `id`
    fn release(&self, id: u64) {
        let mut pending = self.pending.lock();
        if pending.as_ref().is_some_and(|p| p.id == id) {
            *pending = None;
        }
    }

    fn settle(&self, kind: &str, result: Result<Option<Jsonf>>) {
        match self.pending.lock().take() {
            Some(pending) => {
                if pending.reply.send(result).is_err() {
                    debug!("{} for {} arrived after the caller gave up", kind, pending.description);
                }
            }
            None => warn!("received {} without a pending request", kind),
        }
    }

    async fn wait_for_connection(&self, timeout: Duration) -> Result<()> {
        let started = Instant::now();

        loop {
            if self.is_puppet_connected() {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(BrowserError::Timeout(format!(
                    "waitForConnection: timed out after {}ms",
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(self.config.connection_poll_interval).await;
        }
    }

    fn on_message(&self, raw: &str) {
        trace!("_onWsMessage: {}", truncate(raw, MAX_TRACE_RAW_LENGTH));

        let message = match decode::<UpstreamMessage>(raw) {
            Ok(message) => message,
            Err(e) => {
                match message_type(raw) {
                    Some(kind) if UpstreamMessage::KNOWN_TYPES.contains(&kind.as_str()) => {
                        warn!("malformed \"{}\" message: {}", kind, e)
                    }
                    Some(kind) => info!("unknown event type: \"{}\"", kind),
                    None => warn!("unparseable message: {}", e),
                }
                return;
            }
        };

        match message {
            UpstreamMessage::Ack { result } => self.settle("ack", Ok(result)),
            UpstreamMessage::Nak { error } => self.settle("nak", Err(error.into())),
            UpstreamMessage::SelectorBecameVisible { selector } => {
                self.emit(PuppeteerEvent::SelectorBecameVisible { selector })
            }
            UpstreamMessage::CapturedEvent { event } => {
                self.emit(PuppeteerEvent::CapturedEvent { event })
            }
            UpstreamMessage::InsertAssertion => self.emit(PuppeteerEvent::InsertAssertion),
            UpstreamMessage::ConsolePipe { message_type, message } => {
                self.emit(PuppeteerEvent::ConsolePipe { message_type, message })
            }
        }
    }
}

/// Reply to a request sent with [`BrowserPuppeteer::send_message`]
///
/// Resolves with the ack result or fails with the nak error. Dropping it
/// before it resolves frees the request slot.
pub struct PendingReply {
    state: Arc<PuppeteerState>,
    id: u64,
    future: BoxFuture<'static, Result<Option<Jsonf>>>,
}

impl Future for PendingReply {
    type Output = Result<Option<Jsonf>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.state.release(self.id);
    }
}

struct ServerHandle {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// The controller: one websocket server, one puppet, one request at a time
pub struct BrowserPuppeteer {
    state: Arc<PuppeteerState>,
    server: Mutex<Option<ServerHandle>>,
}

impl Default for BrowserPuppeteer {
    fn default() -> Self {
        Self::new(PuppeteerConfig::default())
    }
}

impl BrowserPuppeteer {
    pub fn new(config: PuppeteerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            state: Arc::new(PuppeteerState {
                config,
                session: Mutex::new(None),
                pending: Mutex::new(None),
                blacklist: Mutex::new(HashSet::new()),
                events,
                next_id: AtomicU64::new(1),
            }),
            server: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PuppeteerConfig {
        &self.state.config
    }

    /// Bind and serve; returns the bound address (useful with port 0)
    pub async fn start(&self) -> Result<SocketAddr> {
        if self.server.lock().is_some() {
            return Err(BrowserError::InvalidOptions("puppeteer already started".to_string()));
        }

        let listener = TcpListener::bind(self.state.config.bind_address()).await?;
        let addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let app = server::router(self.state.clone());

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
            {
                error!("puppeteer server error: {}", e);
            }
        });

        *self.server.lock() = Some(ServerHandle { addr, shutdown, task });
        info!("puppeteer listening on {}", addr);
        Ok(addr)
    }

    /// Close the puppet connection and shut the server down
    pub async fn stop(&self) {
        debug!("stopping...");
        self.state.close_session(None);

        let server = self.server.lock().take();
        if let Some(server) = server {
            server.shutdown.cancel();
            if let Err(e) = server.task.await {
                warn!("puppeteer server task failed: {}", e);
            }
        }
        debug!("stopped");
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().as_ref().map(|s| s.addr)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PuppeteerEvent> {
        self.state.events.subscribe()
    }

    pub fn is_puppet_connected(&self) -> bool {
        self.state.is_puppet_connected()
    }

    pub fn puppet_id(&self) -> Option<u64> {
        self.state.session.lock().as_ref().map(|s| s.puppet_id)
    }

    /// Wait until a puppet is connected, polling; defaults to the configured timeout
    pub async fn wait_for_connection(&self, timeout: Option<Duration>) -> Result<()> {
        self.state
            .wait_for_connection(timeout.unwrap_or(self.state.config.wait_for_connection_timeout))
            .await
    }

    /// Close the current connection; the puppet may reconnect
    pub fn close_connection(&self) {
        self.state.close_session(None);
    }

    /// Close the current connection and refuse that puppet from now on
    pub fn terminate_connection(&self) {
        let puppet_id = self.puppet_id();
        if let Some(puppet_id) = puppet_id {
            self.state.blacklist.lock().insert(puppet_id);
            self.state.close_session(None);
            info!("puppet {} terminated and blacklisted", puppet_id);
        }
    }

    /// Send a request to the puppet
    ///
    /// Fails immediately with `ConcurrentRequest` while another request is
    /// pending. The returned reply first waits for a puppet if none is
    /// connected, then for the ack/nak.
    pub fn send_message(&self, message: DownstreamMessage) -> Result<PendingReply> {
        let raw = encode(&message)?;
        let description = message.name().to_string();
        let id = self.state.next_id();
        let (reply, replied) = oneshot::channel();

        {
            let mut pending = self.state.pending.lock();
            if let Some(current) = pending.as_ref() {
                return Err(BrowserError::ConcurrentRequest {
                    message: description,
                    current: current.description.clone(),
                });
            }
            *pending = Some(Pending { id, description: description.clone(), reply });
        }

        let state = self.state.clone();
        let future = async move {
            let sent = async {
                state.wait_for_connection(state.config.wait_for_connection_timeout).await?;
                trace!("sending message, type: {}", description);
                state.transmit(raw)
            };

            if let Err(e) = sent.await {
                state.release(id);
                return Err(e);
            }

            replied.await.map_err(|_| BrowserError::ConnectionLost)?
        };

        Ok(PendingReply { state: self.state.clone(), id, future: Box::pin(future) })
    }

    pub async fn exec_command(&self, command: Command) -> Result<Option<Jsonf>> {
        self.send_message(DownstreamMessage::ExecCommand { command })?.await
    }

    pub async fn exec_function(
        &self,
        function: JsFunction,
        args: Vec<Jsonf>,
    ) -> Result<Option<Jsonf>> {
        self.send_message(DownstreamMessage::ExecFunction { function, args })?.await
    }

    pub async fn set_transmit_events(&self, value: bool) -> Result<()> {
        self.send_message(DownstreamMessage::SetTransmitEvents { value })?.await.map(|_| ())
    }

    pub async fn set_selector_became_visible_selectors(
        &self,
        selectors: Vec<String>,
    ) -> Result<()> {
        self.send_message(DownstreamMessage::SetSelectorBecameVisibleData { selectors })?
            .await
            .map(|_| ())
    }

    pub async fn set_mouseover_selectors(&self, selectors: Vec<String>) -> Result<()> {
        self.send_message(DownstreamMessage::SetMouseoverSelectors { selectors })?
            .await
            .map(|_| ())
    }

    pub async fn set_ignored_classes(&self, classes: Vec<String>) -> Result<()> {
        self.send_message(DownstreamMessage::SetIgnoredClasses { classes })?.await.map(|_| ())
    }

    pub async fn set_unique_selector_options(&self, options: UniqueSelectorOptions) -> Result<()> {
        self.send_message(DownstreamMessage::SetUniqueSelectorOptions { options })?
            .await
            .map(|_| ())
    }

    pub async fn clear_persistent_data(&self) -> Result<()> {
        debug!("clearPersistentData");
        self.send_message(DownstreamMessage::ClearPersistentData)?.await.map(|_| ())
    }

    /// Ask the puppet to shut itself down after acknowledging
    pub async fn terminate_puppet(&self) -> Result<()> {
        self.send_message(DownstreamMessage::TerminatePuppet)?.await.map(|_| ())
    }
}

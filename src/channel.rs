//! Reconnecting websocket client used by the puppet
//!
//! State machine:
//!
//! ```text
//! Disconnected --tick--> Connecting --ok--> Connected
//!      ^                     |                  |
//!      +--- error/timeout ---+---- close/error -+
//! any --close()--> Closed (terminal)
//! ```
//!
//! A background task ticks every `reconnect_interval` and dials only while
//! `Disconnected`. Sending never queues: it fails with `NotConnected` unless a
//! connection is up.

use crate::config::ChannelOptions;
use crate::error::{BrowserError, Result};
use futures::{SinkExt, StreamExt};
use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Outbound half of a message connection
pub trait Transport: Send + Sync {
    /// Send one text frame, failing fast when not connected
    fn send(&self, message: String) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Close for good; no further reconnection
    fn close(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

struct Shared {
    url: Url,
    state: Mutex<ChannelState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    connected: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl Shared {
    fn set_state(&self, next: ChannelState) -> bool {
        let mut state = self.state.lock();
        if *state == ChannelState::Closed {
            return false;
        }
        *state = next;
        true
    }
}

/// Self-healing websocket connection
#[derive(Clone)]
pub struct ReliableChannel {
    shared: Arc<Shared>,
}

impl ReliableChannel {
    /// Start connecting to `url`; inbound text frames arrive on the returned receiver
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(url: Url, options: ChannelOptions) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (connected, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            url,
            state: Mutex::new(ChannelState::Disconnected),
            outbound: Mutex::new(None),
            connected,
            cancel: CancellationToken::new(),
        });

        tokio::spawn(reconnect_loop(shared.clone(), options, inbound_tx));

        (Self { shared }, inbound_rx)
    }

    pub fn url(&self) -> &Url {
        &self.shared.url
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    pub fn send(&self, message: impl Into<String>) -> Result<()> {
        if !self.is_connected() {
            return Err(BrowserError::NotConnected);
        }

        let outbound = self.shared.outbound.lock();
        let sender = outbound.as_ref().ok_or(BrowserError::NotConnected)?;
        sender
            .send(Message::Text(message.into().into()))
            .map_err(|_| BrowserError::NotConnected)
    }

    /// Connection state changes, `true` while connected
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shared.connected.subscribe()
    }

    /// Resolve once connected; fails if the channel is closed first
    pub async fn wait_connected(&self) -> Result<()> {
        let mut connected = self.subscribe();

        loop {
            if *connected.borrow_and_update() {
                return Ok(());
            }
            if self.state() == ChannelState::Closed {
                return Err(BrowserError::NotConnected);
            }
            if connected.changed().await.is_err() {
                return Err(BrowserError::NotConnected);
            }
        }
    }

    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if *state == ChannelState::Closed {
                return;
            }
            *state = ChannelState::Closed;
        }

        if let Some(sender) = self.shared.outbound.lock().take() {
            let _ = sender.send(Message::Close(None));
        }

        self.shared.cancel.cancel();
        self.shared.connected.send_replace(false);
        debug!("channel to {} closed", self.shared.url);
    }
}

impl Transport for ReliableChannel {
    fn send(&self, message: String) -> Result<()> {
        ReliableChannel::send(self, message)
    }

    fn is_connected(&self) -> bool {
        ReliableChannel::is_connected(self)
    }

    fn close(&self) {
        ReliableChannel::close(self)
    }
}

async fn reconnect_loop(
    shared: Arc<Shared>,
    options: ChannelOptions,
    inbound: mpsc::UnboundedSender<String>,
) {
    let mut ticker = tokio::time::interval(options.reconnect_interval);

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = ticker.tick() => {
                let should_dial = {
                    let mut state = shared.state.lock();
                    if *state == ChannelState::Disconnected {
                        *state = ChannelState::Connecting;
                        true
                    } else {
                        false
                    }
                };

                if should_dial {
                    tokio::spawn(connect(shared.clone(), inbound.clone(), options.connect_timeout));
                }
            }
        }
    }

    trace!("reconnect loop for {} stopped", shared.url);
}

async fn connect(shared: Arc<Shared>, inbound: mpsc::UnboundedSender<String>, timeout: Duration) {
    let dial = tokio_tungstenite::connect_async(shared.url.as_str());
    let handshake = tokio::time::timeout(timeout, dial);
    let stream = match handshake.await {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => {
            debug!("connecting to {} failed: {}", shared.url, e);
            shared.set_state(ChannelState::Disconnected);
            return;
        }
        Err(_) => {
            debug!("handshake with {} timed out after {:?}", shared.url, timeout);
            shared.set_state(ChannelState::Disconnected);
            return;
        }
    };

    let (mut sink, mut source) = stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    *shared.outbound.lock() = Some(outbound_tx);
    if !shared.set_state(ChannelState::Connected) {
        // closed while the handshake was in flight
        shared.outbound.lock().take();
        let _ = sink.send(Message::Close(None)).await;
        return;
    }
    shared.connected.send_replace(true);
    debug!("connected to {}", shared.url);

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(e) = sink.send(message).await {
                warn!("websocket send failed: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    trace!("channel recv: {}", text.as_str());
                    if inbound.send(text.as_str().to_owned()).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("connection to {} closed by peer", shared.url);
                    break;
                }
                Some(Err(e)) => {
                    warn!("connection to {} failed: {}", shared.url, e);
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    if shared.set_state(ChannelState::Disconnected) {
        shared.outbound.lock().take();
        shared.connected.send_replace(false);
    }

    // let the writer flush a pending close frame
    let _ = writer.await;
}

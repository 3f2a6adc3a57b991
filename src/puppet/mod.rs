//! In-page agent
//!
//! The puppet runs next to a page ([`Document`]), receives downstream
//! messages over a [`Transport`], executes commands against the page and
//! streams captured user events back. Capture is mutually exclusive with
//! command execution: `can_capture = transmit_events && !is_executing`.

pub mod capture;
pub mod commands;
pub mod debounce;
pub mod observer;

pub use commands::PuppetCommands;
pub use debounce::Debouncer;
pub use observer::SelectorObserver;

use crate::channel::{ReliableChannel, Transport};
use crate::codec::{decode, encode, Jsonf};
use crate::config::PuppetConfig;
use crate::dom::{Document, NodeId};
use crate::error::{BrowserError, Result};
use crate::protocol::{DownstreamMessage, UpstreamMessage};
use crate::selector::UniqueSelector;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Scroll capture and insert-assertion requests are debounced by this much
pub const CAPTURE_DEBOUNCE: Duration = Duration::from_millis(500);

struct PuppetInner {
    document: Arc<dyn Document>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    runtime: OnceLock<Handle>,

    transmit_events: AtomicBool,
    is_executing: AtomicBool,
    is_terminating: AtomicBool,
    /// Held for the whole run of an exec message; exec messages run one at a time
    exec_lock: tokio::sync::Mutex<()>,

    unique_selector: RwLock<UniqueSelector>,
    /// Mouseover selectors joined into one selector list
    mouseover_selector: RwLock<Option<String>>,
    observer: Mutex<Option<SelectorObserver>>,
    /// Element focused when the window lost focus
    active_before_blur: Mutex<Option<NodeId>>,

    scroll_debounce: Debouncer,
    insert_assertion_debounce: Debouncer,
}

impl PuppetInner {
    fn can_capture(&self) -> bool {
        self.transmit_events.load(Ordering::SeqCst) && !self.is_executing.load(Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.transport.read().as_ref().is_some_and(|t| t.is_connected())
    }

    fn send(&self, message: &UpstreamMessage) -> Result<()> {
        let raw = encode(message)?;
        let transport = self.transport.read().clone().ok_or(BrowserError::NotConnected)?;
        transport.send(raw)
    }

    /// Send, logging instead of failing; used for unsolicited upstream messages
    fn notify(&self, message: &UpstreamMessage) {
        if let Err(e) = self.send(message) {
            debug!("dropping {} message: {}", message.name(), e);
        }
    }
}

/// The in-page agent
#[derive(Clone)]
pub struct BrowserPuppet {
    inner: Arc<PuppetInner>,
}

impl BrowserPuppet {
    pub fn new(document: Arc<dyn Document>) -> Self {
        Self {
            inner: Arc::new(PuppetInner {
                document,
                transport: RwLock::new(None),
                runtime: OnceLock::new(),
                transmit_events: AtomicBool::new(false),
                is_executing: AtomicBool::new(false),
                is_terminating: AtomicBool::new(false),
                exec_lock: tokio::sync::Mutex::new(()),
                unique_selector: RwLock::new(UniqueSelector::default()),
                mouseover_selector: RwLock::new(None),
                observer: Mutex::new(None),
                active_before_blur: Mutex::new(None),
                scroll_debounce: Debouncer::new(CAPTURE_DEBOUNCE),
                insert_assertion_debounce: Debouncer::new(CAPTURE_DEBOUNCE),
            }),
        }
    }

    /// Connect to the controller and start serving
    pub fn start(&self, config: &PuppetConfig) -> Result<JoinHandle<()>> {
        let url = config.connect_url()?;
        info!("puppet {} connecting to {}", config.puppet_id, config.server_url);

        let (channel, inbound) = ReliableChannel::open(url, config.channel.clone());
        self.attach(Arc::new(channel), inbound)
    }

    /// Serve messages from `inbound`, replying and capturing through `transport`
    ///
    /// Every message is handled on its own task, so a long wait never blocks
    /// reception of the next message.
    pub fn attach(
        &self,
        transport: Arc<dyn Transport>,
        mut inbound: mpsc::UnboundedReceiver<String>,
    ) -> Result<JoinHandle<()>> {
        let runtime = Handle::try_current()
            .map_err(|e| {
                BrowserError::InvalidOptions(format!("puppet needs a tokio runtime: {}", e))
            })?;
        let _ = self.inner.runtime.set(runtime.clone());

        *self.inner.transport.write() = Some(transport);
        self.attach_capture()?;

        let puppet = self.clone();
        Ok(runtime.spawn(async move {
            while let Some(raw) = inbound.recv().await {
                let puppet = puppet.clone();
                tokio::spawn(async move { puppet.handle_message(&raw).await });
            }
            debug!("puppet inbound stream ended");
        }))
    }

    pub fn document(&self) -> &Arc<dyn Document> {
        &self.inner.document
    }

    pub fn can_capture(&self) -> bool {
        self.inner.can_capture()
    }

    pub fn is_executing(&self) -> bool {
        self.inner.is_executing.load(Ordering::SeqCst)
    }

    pub fn is_terminating(&self) -> bool {
        self.inner.is_terminating.load(Ordering::SeqCst)
    }

    pub fn set_transmit_events(&self, value: bool) {
        self.inner.transmit_events.store(value, Ordering::SeqCst);
    }

    /// Selector synthesizer currently used for captured events
    pub fn unique_selector(&self) -> UniqueSelector {
        self.inner.unique_selector.read().clone()
    }

    /// Start reporting `selector-became-visible` for `selectors`, replacing the previous set
    pub fn set_selector_became_visible_selectors(&self, selectors: Vec<String>) {
        let observer = SelectorObserver::new(self.inner.document.as_ref(), selectors);
        *self.inner.observer.lock() = Some(observer);
    }

    pub fn set_mouseover_selectors(&self, selectors: &[String]) {
        let joined = (!selectors.is_empty()).then(|| selectors.join(", "));
        *self.inner.mouseover_selector.write() = joined;
    }

    /// Handle one raw downstream message; exactly one ack or nak is sent back
    pub async fn handle_message(&self, raw: &str) {
        if self.is_terminating() {
            warn!("message received while terminating");
            self.reply(Err(BrowserError::Terminating));
            return;
        }

        let result = match decode::<DownstreamMessage>(raw) {
            Ok(message) => {
                debug!("processing {}", message.name());
                self.process(message).await
            }
            Err(e) => Err(BrowserError::Protocol(format!("unknown message: {}", e))),
        };

        self.reply(result);

        if self.is_terminating() {
            if let Some(transport) = self.inner.transport.write().take() {
                transport.close();
            }
            info!("puppet terminated");
        }
    }

    fn reply(&self, result: Result<Option<Jsonf>>) {
        let message = match result {
            Ok(value) => UpstreamMessage::ack(value),
            Err(e) => {
                debug!("sending nak: {}", e);
                UpstreamMessage::nak(&e)
            }
        };

        if let Err(e) = self.inner.send(&message) {
            error!("failed to send {}: {}", message.name(), e);
        }
    }

    async fn process(&self, message: DownstreamMessage) -> Result<Option<Jsonf>> {
        match message {
            DownstreamMessage::ExecCommand { command } => {
                self.executing(self.exec_command(&command)).await
            }
            DownstreamMessage::ExecFunction { function, args } => {
                self.executing(self.exec_function(&function, args)).await.map(Some)
            }
            DownstreamMessage::SetSelectorBecameVisibleData { selectors } => {
                self.set_selector_became_visible_selectors(selectors);
                Ok(None)
            }
            DownstreamMessage::SetTransmitEvents { value } => {
                self.set_transmit_events(value);
                Ok(None)
            }
            DownstreamMessage::TerminatePuppet => {
                self.inner.is_terminating.store(true, Ordering::SeqCst);
                Ok(None)
            }
            DownstreamMessage::ClearPersistentData => {
                self.inner.document.clear_persistent_data()?;
                Ok(None)
            }
            DownstreamMessage::SetMouseoverSelectors { selectors } => {
                self.set_mouseover_selectors(&selectors);
                Ok(None)
            }
            DownstreamMessage::SetIgnoredClasses { classes } => {
                self.inner.unique_selector.write().set_ignored_classes(classes);
                Ok(None)
            }
            DownstreamMessage::SetUniqueSelectorOptions { options } => {
                *self.inner.unique_selector.write() = UniqueSelector::new(options)?;
                Ok(None)
            }
        }
    }

    /// Run `operation` with capture switched off
    ///
    /// Overlapping exec messages queue on `exec_lock`, so capture stays off
    /// until the last of them finishes.
    async fn executing<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        let _running = self.inner.exec_lock.lock().await;
        self.inner.is_executing.store(true, Ordering::SeqCst);
        if let Err(e) = self.inner.document.set_capture_suspended(true) {
            warn!("failed to suspend capture: {}", e);
        }

        let result = operation.await;

        if let Err(e) = self.inner.document.set_capture_suspended(false) {
            warn!("failed to resume capture: {}", e);
        }
        self.inner.is_executing.store(false, Ordering::SeqCst);

        result
    }

    fn attach_capture(&self) -> Result<()> {
        let weak = Arc::downgrade(&self.inner);
        self.inner.document.attach_capture(Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_dom_event(event);
            }
        }))
    }
}

//! # browser-puppeteer
//!
//! Record user actions in a browser page and replay commands against it.
//!
//! ## Features
//!
//! - **Unique selectors**: Synthesize the shortest CSS selector that matches exactly one element
//! - **Puppet**: In-page agent that executes commands and streams captured user events
//! - **Puppeteer**: Single-session controller that accepts one puppet over a websocket
//! - **Reliable channel**: Reconnecting websocket client with fail-fast sends
//! - **Chrome glue**: Run the puppet against a real headless_chrome tab (`chrome` feature)
//!
//! ## Recording a session
//!
//! ```rust,no_run
//! use browser_puppeteer::{BrowserPuppeteer, PuppeteerConfig, PuppeteerEvent};
//!
//! # async fn run() -> browser_puppeteer::Result<()> {
//! let puppeteer = BrowserPuppeteer::new(PuppeteerConfig::default());
//! let mut events = puppeteer.subscribe();
//! puppeteer.start().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let PuppeteerEvent::CapturedEvent { event } = event {
//!         println!("{:?} on {:?}", event.event_type, event.selector);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Driving the page
//!
//! ```rust,no_run
//! use browser_puppeteer::{BrowserPuppeteer, Command, PuppeteerConfig};
//!
//! # async fn run() -> browser_puppeteer::Result<()> {
//! # let puppeteer = BrowserPuppeteer::new(PuppeteerConfig::default());
//! puppeteer.wait_for_connection(None).await?;
//! puppeteer.exec_command(Command::set_value("#user", "alice")).await?;
//! puppeteer.exec_command(Command::click("#submit")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`selector`]: Unique CSS selector synthesis
//! - [`dom`]: The page capability and an in-memory DOM
//! - [`puppet`]: The in-page agent
//! - [`puppeteer`]: The controller session
//! - [`channel`]: Reconnecting websocket client
//! - [`codec`]: JSON with function and regular expression values
//! - [`protocol`]: Wire messages and commands
//! - [`browser`]: Chrome launch and tab access (requires `chrome` feature)

pub mod channel;
pub mod codec;
pub mod config;
pub mod dom;
pub mod error;
pub mod protocol;
pub mod puppet;
pub mod puppeteer;
pub mod recorder;
pub mod selector;

#[cfg(feature = "chrome")]
pub mod browser;

pub use channel::{ChannelState, ReliableChannel, Transport};
pub use codec::{JsFunction, JsRegExp, Jsonf};
pub use config::{ChannelOptions, PuppetConfig, PuppeteerConfig};
pub use dom::{BoundingBox, Document, DomEvent, ElementInfo, ElementNode, MemoryDocument, NodeId};
pub use error::{BrowserError, Result};
pub use protocol::{CapturedEvent, Command, DownstreamMessage, UpstreamMessage};
pub use puppet::{BrowserPuppet, PuppetCommands};
pub use puppeteer::{BrowserPuppeteer, PendingReply, PuppeteerEvent};
pub use recorder::RecorderSettings;
pub use selector::{UniqueSelector, UniqueSelectorOptions};

#[cfg(feature = "chrome")]
pub use browser::{BrowserSession, ChromeDocument, ConnectionOptions, LaunchOptions};

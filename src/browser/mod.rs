//! Real browser glue: launching Chrome and exposing a tab as a [`Document`](crate::dom::Document)

pub mod chrome;
pub mod config;
pub mod session;

pub use chrome::ChromeDocument;
pub use config::{ConnectionOptions, LaunchOptions};
pub use session::BrowserSession;

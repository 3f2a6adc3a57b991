//! Recorder settings pushed to every freshly connected puppet

use crate::error::Result;
use crate::puppeteer::BrowserPuppeteer;
use crate::selector::UniqueSelectorOptions;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What the puppet should observe while recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderSettings {
    #[serde(default = "default_transmit_events")]
    pub transmit_events: bool,

    /// Selectors reported when they turn visible
    #[serde(default)]
    pub selector_became_visible: Vec<String>,

    /// Only mouseovers on elements matching one of these are captured
    #[serde(default)]
    pub mouseover_selectors: Vec<String>,

    #[serde(default)]
    pub ignored_classes: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_selector_options: Option<UniqueSelectorOptions>,
}

fn default_transmit_events() -> bool {
    true
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            transmit_events: true,
            selector_became_visible: Vec::new(),
            mouseover_selectors: Vec::new(),
            ignored_classes: Vec::new(),
            unique_selector_options: None,
        }
    }
}

impl RecorderSettings {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Push the settings to the connected puppet, one request at a time
    pub async fn apply(&self, puppeteer: &BrowserPuppeteer) -> Result<()> {
        debug!("applying recorder settings");

        puppeteer.set_transmit_events(self.transmit_events).await?;

        if !self.selector_became_visible.is_empty() {
            puppeteer
                .set_selector_became_visible_selectors(self.selector_became_visible.clone())
                .await?;
        }
        if !self.mouseover_selectors.is_empty() {
            puppeteer.set_mouseover_selectors(self.mouseover_selectors.clone()).await?;
        }
        if !self.ignored_classes.is_empty() {
            puppeteer.set_ignored_classes(self.ignored_classes.clone()).await?;
        }
        if let Some(options) = &self.unique_selector_options {
            puppeteer.set_unique_selector_options(options.clone()).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PuppeteerConfig;
    use futures::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn test_defaults_from_empty_object() {
        let settings = RecorderSettings::from_json("{}").unwrap();
        assert_eq!(settings, RecorderSettings::default());
        assert!(settings.transmit_events);
    }

    #[test]
    fn test_parse_full_settings() {
        let settings = RecorderSettings::from_json(
            r#"{
                "transmitEvents": false,
                "selectorBecameVisible": [".toast"],
                "mouseoverSelectors": [".menu li"],
                "ignoredClasses": ["active"],
                "uniqueSelectorOptions": {"preferredClass": "/test--[^ ]+/", "useIds": false}
            }"#,
        )
        .unwrap();

        assert!(!settings.transmit_events);
        assert_eq!(settings.selector_became_visible, [".toast"]);
        assert_eq!(settings.mouseover_selectors, [".menu li"]);
        let options = settings.unique_selector_options.unwrap();
        assert!(!options.use_ids);
        assert_eq!(options.preferred_class_pattern.unwrap().pattern(), "test--[^ ]+");
    }

    #[test]
    fn test_from_missing_file() {
        assert!(RecorderSettings::from_file("/nonexistent/recorder.json").is_err());
    }

    #[tokio::test]
    async fn test_apply_sends_settings_in_order() {
        let puppeteer = BrowserPuppeteer::new(
            PuppeteerConfig::new().port(0).connection_poll_interval(Duration::from_millis(20)),
        );
        let addr = puppeteer.start().await.unwrap();
        let (mut client, _) = connect_async(format!("ws://{}/?puppet-id=1", addr)).await.unwrap();
        puppeteer.wait_for_connection(Some(Duration::from_secs(2))).await.unwrap();

        let settings = RecorderSettings {
            mouseover_selectors: vec![".menu li".into()],
            ignored_classes: vec!["active".into()],
            ..RecorderSettings::default()
        };

        let fake_puppet = async {
            let mut received = Vec::new();
            while received.len() < 3 {
                if let Some(Ok(Message::Text(text))) = client.next().await {
                    let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                    received.push(value["type"].as_str().unwrap().to_string());
                    client.send(Message::Text(r#"{"type":"ack"}"#.into())).await.unwrap();
                }
            }
            received
        };

        let (applied, received) = tokio::join!(settings.apply(&puppeteer), fake_puppet);
        applied.unwrap();
        assert_eq!(
            received,
            ["set-transmit-events", "set-mouseover-selectors", "set-ignored-classes"]
        );

        puppeteer.stop().await;
    }
}

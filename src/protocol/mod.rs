//! Wire protocol between the puppeteer (controller) and the puppet (in-page agent)
//!
//! Every message is a JSON object tagged by `type`. Downstream messages flow
//! from the controller to the puppet, upstream messages the other way.

pub mod command;

pub use command::{AssertOptions, Command, FileData, WaitTimings};

use crate::codec::{JsFunction, Jsonf};
use crate::error::BrowserError;
use crate::selector::UniqueSelectorOptions;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Controller to puppet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DownstreamMessage {
    ExecCommand {
        command: Command,
    },
    ExecFunction {
        #[serde(rename = "fn")]
        function: JsFunction,
        #[serde(default)]
        args: Vec<Jsonf>,
    },
    SetSelectorBecameVisibleData {
        selectors: Vec<String>,
    },
    SetTransmitEvents {
        value: bool,
    },
    TerminatePuppet,
    ClearPersistentData,
    SetMouseoverSelectors {
        selectors: Vec<String>,
    },
    SetIgnoredClasses {
        classes: Vec<String>,
    },
    SetUniqueSelectorOptions {
        options: UniqueSelectorOptions,
    },
}

impl DownstreamMessage {
    pub fn name(&self) -> &'static str {
        match self {
            DownstreamMessage::ExecCommand { .. } => "exec-command",
            DownstreamMessage::ExecFunction { .. } => "exec-function",
            DownstreamMessage::SetSelectorBecameVisibleData { .. } => {
                "set-selector-became-visible-data"
            }
            DownstreamMessage::SetTransmitEvents { .. } => "set-transmit-events",
            DownstreamMessage::TerminatePuppet => "terminate-puppet",
            DownstreamMessage::ClearPersistentData => "clear-persistent-data",
            DownstreamMessage::SetMouseoverSelectors { .. } => "set-mouseover-selectors",
            DownstreamMessage::SetIgnoredClasses { .. } => "set-ignored-classes",
            DownstreamMessage::SetUniqueSelectorOptions { .. } => "set-unique-selector-options",
        }
    }

    /// Messages that run page code and suspend event capture while they do
    pub fn is_exec(&self) -> bool {
        matches!(
            self,
            DownstreamMessage::ExecCommand { .. } | DownstreamMessage::ExecFunction { .. }
        )
    }
}

/// Puppet to controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UpstreamMessage {
    SelectorBecameVisible {
        selector: String,
    },
    CapturedEvent {
        event: CapturedEvent,
    },
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Jsonf>,
    },
    Nak {
        error: ErrorDto,
    },
    InsertAssertion,
    ConsolePipe {
        #[serde(rename = "messageType")]
        message_type: String,
        message: String,
    },
}

impl UpstreamMessage {
    pub const KNOWN_TYPES: [&'static str; 6] = [
        "selector-became-visible",
        "captured-event",
        "ack",
        "nak",
        "insert-assertion",
        "console-pipe",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            UpstreamMessage::SelectorBecameVisible { .. } => "selector-became-visible",
            UpstreamMessage::CapturedEvent { .. } => "captured-event",
            UpstreamMessage::Ack { .. } => "ack",
            UpstreamMessage::Nak { .. } => "nak",
            UpstreamMessage::InsertAssertion => "insert-assertion",
            UpstreamMessage::ConsolePipe { .. } => "console-pipe",
        }
    }

    pub fn ack(result: Option<Jsonf>) -> Self {
        UpstreamMessage::Ack { result }
    }

    pub fn nak(error: &BrowserError) -> Self {
        UpstreamMessage::Nak { error: ErrorDto::from(error) }
    }
}

/// Error payload of a nak
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDto {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl From<&BrowserError> for ErrorDto {
    fn from(error: &BrowserError) -> Self {
        let message = error.to_string();
        Self {
            stack: Some(format!("{}: {}", error.kind(), message)),
            kind: Some(error.kind().to_string()),
            message,
        }
    }
}

impl From<ErrorDto> for BrowserError {
    fn from(dto: ErrorDto) -> Self {
        BrowserError::Remote { message: dto.message, stack: dto.stack }
    }
}

/// Kind of a captured user event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapturedEventType {
    Click,
    Focus,
    Input,
    Scroll,
    Keydown,
    Change,
    Mouseover,
}

/// A user interaction captured in the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedEvent {
    #[serde(rename = "type")]
    pub event_type: CapturedEventType,

    /// Milliseconds since the Unix epoch
    #[serde(rename = "$timestamp")]
    pub timestamp: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    /// Unsimplified ancestor chain, omitted for `change`
    #[serde(rename = "$fullSelectorPath", default, skip_serializing_if = "Option::is_none")]
    pub full_selector_path: Option<String>,

    /// Current value, `input` only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_code: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctrl_key: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift_key: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_key: Option<bool>,

    pub target: TargetNode,
}

/// Snapshot of the event target sent along with a captured event
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetNode {
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub inner_text: String,
    #[serde(default)]
    pub tag_name: String,

    /// `type` property of form controls
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,

    /// Only set for scroll events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_top: Option<f64>,

    /// Names of the selected files of a file input
    #[serde(rename = "$fileNames", default, skip_serializing_if = "Option::is_none")]
    pub file_names: Option<Vec<String>>,

    /// Every `data-*` attribute of the target
    #[serde(flatten)]
    pub data: IndexMap<String, String>,
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// MIME type used for uploads that do not name one
pub const DEFAULT_UPLOAD_MIME: &str = "application/octet-stream";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 500;
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 20_000;

/// A command executed by the puppet against the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    Click {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<AssertOptions>,
    },
    SetValue {
        selector: String,
        value: String,
    },
    GetValue {
        selector: String,
    },
    PressKey {
        selector: String,
        key_code: u32,
    },
    Scroll {
        selector: String,
        scroll_top: f64,
    },
    ScrollTo {
        selector: String,
    },
    Mouseover {
        selector: String,
    },
    WaitForVisible {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        poll_interval: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    WaitWhileVisible {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        poll_interval: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial_delay: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    Focus {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<AssertOptions>,
    },
    IsVisible {
        selector: String,
    },
    UploadFileAndAssign {
        selector: String,
        file_data: FileData,
        destination_variable: String,
    },
    Composite {
        commands: Vec<Command>,
    },
}

impl Command {
    /// Wire name of the command, used as the prefix of error messages
    pub fn name(&self) -> &'static str {
        match self {
            Command::Click { .. } => "click",
            Command::SetValue { .. } => "setValue",
            Command::GetValue { .. } => "getValue",
            Command::PressKey { .. } => "pressKey",
            Command::Scroll { .. } => "scroll",
            Command::ScrollTo { .. } => "scrollTo",
            Command::Mouseover { .. } => "mouseover",
            Command::WaitForVisible { .. } => "waitForVisible",
            Command::WaitWhileVisible { .. } => "waitWhileVisible",
            Command::Focus { .. } => "focus",
            Command::IsVisible { .. } => "isVisible",
            Command::UploadFileAndAssign { .. } => "uploadFileAndAssign",
            Command::Composite { .. } => "composite",
        }
    }

    /// Target selector; composites have none
    pub fn selector(&self) -> Option<&str> {
        match self {
            Command::Click { selector, .. }
            | Command::SetValue { selector, .. }
            | Command::GetValue { selector }
            | Command::PressKey { selector, .. }
            | Command::Scroll { selector, .. }
            | Command::ScrollTo { selector }
            | Command::Mouseover { selector }
            | Command::WaitForVisible { selector, .. }
            | Command::WaitWhileVisible { selector, .. }
            | Command::Focus { selector, .. }
            | Command::IsVisible { selector }
            | Command::UploadFileAndAssign { selector, .. } => Some(selector),
            Command::Composite { .. } => None,
        }
    }

    pub fn click(selector: impl Into<String>) -> Self {
        Command::Click { selector: selector.into(), options: None }
    }

    pub fn set_value(selector: impl Into<String>, value: impl Into<String>) -> Self {
        Command::SetValue { selector: selector.into(), value: value.into() }
    }

    pub fn get_value(selector: impl Into<String>) -> Self {
        Command::GetValue { selector: selector.into() }
    }

    pub fn wait_for_visible(selector: impl Into<String>) -> Self {
        Command::WaitForVisible { selector: selector.into(), poll_interval: None, timeout: None }
    }

    pub fn wait_while_visible(selector: impl Into<String>) -> Self {
        Command::WaitWhileVisible {
            selector: selector.into(),
            poll_interval: None,
            initial_delay: None,
            timeout: None,
        }
    }

    pub fn composite(commands: Vec<Command>) -> Self {
        Command::Composite { commands }
    }
}

/// Per-command element assertion switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertOptions {
    #[serde(default = "default_true")]
    pub assert_visibility: bool,
}

impl Default for AssertOptions {
    fn default() -> Self {
        Self { assert_visibility: true }
    }
}

impl AssertOptions {
    pub fn assert_visibility(options: Option<&AssertOptions>) -> bool {
        options.is_none_or(|o| o.assert_visibility)
    }
}

/// Base64 file payload of an upload command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileData {
    pub base64: String,
    pub name: String,
    #[serde(rename = "type", alias = "mime", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl FileData {
    pub fn mime_type(&self) -> &str {
        self.mime_type.as_deref().unwrap_or(DEFAULT_UPLOAD_MIME)
    }
}

/// Resolved timings of the two wait commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimings {
    pub poll_interval: Duration,
    pub initial_delay: Duration,
    pub timeout: Duration,
}

impl WaitTimings {
    pub fn resolve(
        poll_interval: Option<u64>,
        initial_delay: Option<u64>,
        timeout: Option<u64>,
    ) -> Self {
        Self {
            poll_interval: Duration::from_millis(poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL_MS)),
            initial_delay: Duration::from_millis(initial_delay.unwrap_or(DEFAULT_INITIAL_DELAY_MS)),
            timeout: Duration::from_millis(timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS)),
        }
    }
}

fn default_true() -> bool {
    true
}

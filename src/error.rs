use thiserror::Error;

/// Errors produced by the puppet, the puppeteer and everything between them
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Unknown or malformed protocol message / command
    #[error("{0}")]
    Protocol(String),

    #[error("{command}: selector not found: \"{selector}\"")]
    SelectorNotFound { command: String, selector: String },

    #[error("{command}: selector not unique: \"{selector}\"")]
    SelectorNotUnique { command: String, selector: String },

    #[error("{command}: selector not visible: \"{selector}\"")]
    SelectorNotVisible { command: String, selector: String },

    /// A command found its element but could not act on it
    #[error("{command}: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("{0}")]
    Timeout(String),

    #[error("cannot process message, puppet is terminating")]
    Terminating,

    /// A second request was sent while one is still waiting for its ack/nak
    #[error("Cannot send multiple messages - {message}, current message: {current}")]
    ConcurrentRequest { message: String, current: String },

    #[error("connection to puppet lost before a reply arrived")]
    ConnectionLost,

    #[error("cannot send message, channel not connected")]
    NotConnected,

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("invalid node: {0}")]
    InvalidNode(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("script failed: {0}")]
    ScriptFailed(String),

    /// Error reported by the remote side in a nak
    #[error("{message}")]
    Remote { message: String, stack: Option<String> },

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to connect to browser: {0}")]
    ConnectionFailed(String),

    #[error("Tab operation failed: {0}")]
    TabOperationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),
}

impl BrowserError {
    /// Stable short name, sent along with the message in nak payloads
    pub fn kind(&self) -> &'static str {
        match self {
            BrowserError::Protocol(_) => "ProtocolError",
            BrowserError::SelectorNotFound { .. }
            | BrowserError::SelectorNotUnique { .. }
            | BrowserError::SelectorNotVisible { .. }
            | BrowserError::CommandFailed { .. } => "ElementResolutionError",
            BrowserError::Timeout(_) => "TimeoutError",
            BrowserError::Terminating => "TerminationError",
            BrowserError::ConcurrentRequest { .. } => "ConcurrencyViolationError",
            BrowserError::ConnectionLost => "ConnectionLostError",
            BrowserError::NotConnected
            | BrowserError::ConnectionRefused(_)
            | BrowserError::WebSocket(_) => "ConnectionError",
            BrowserError::InvalidNode(_) => "InvalidNodeError",
            BrowserError::InvalidSelector(_) => "SyntaxError",
            BrowserError::InvalidOptions(_) => "InvalidOptionsError",
            BrowserError::ScriptFailed(_) => "ScriptError",
            BrowserError::Remote { .. } => "RemoteError",
            BrowserError::Json(_) => "SerializationError",
            BrowserError::Io(_) => "IoError",
            BrowserError::LaunchFailed(_)
            | BrowserError::ConnectionFailed(_)
            | BrowserError::TabOperationFailed(_)
            | BrowserError::NavigationFailed(_) => "BrowserError",
        }
    }

    /// True for failures to resolve a command's element
    pub fn is_element_resolution(&self) -> bool {
        self.kind() == "ElementResolutionError"
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BrowserError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        BrowserError::WebSocket(e.to_string())
    }
}

impl From<url::ParseError> for BrowserError {
    fn from(e: url::ParseError) -> Self {
        BrowserError::InvalidOptions(format!("invalid URL: {}", e))
    }
}

impl From<regex::Error> for BrowserError {
    fn from(e: regex::Error) -> Self {
        BrowserError::InvalidOptions(format!("invalid regular expression: {}", e))
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, BrowserError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_resolution_messages() {
        let err = BrowserError::SelectorNotFound {
            command: "getValue".to_string(),
            selector: "#missing".to_string(),
        };
        assert_eq!(err.to_string(), "getValue: selector not found: \"#missing\"");
        assert!(err.is_element_resolution());

        let err = BrowserError::SelectorNotUnique {
            command: "click".to_string(),
            selector: "li".to_string(),
        };
        assert_eq!(err.to_string(), "click: selector not unique: \"li\"");
    }

    #[test]
    fn test_kind() {
        assert_eq!(BrowserError::Terminating.kind(), "TerminationError");
        assert_eq!(BrowserError::Timeout("x".into()).kind(), "TimeoutError");
        assert_eq!(BrowserError::Protocol("x".into()).kind(), "ProtocolError");
        assert!(!BrowserError::ConnectionLost.is_element_resolution());
    }

    #[test]
    fn test_remote_displays_message() {
        let err = BrowserError::Remote {
            message: "boom".to_string(),
            stack: Some("at x".to_string()),
        };
        assert_eq!(err.to_string(), "boom");
    }
}

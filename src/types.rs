use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// --- Enums ---

/// Connection status of a [`Client`](crate::eventsource::Client).
///
/// Exactly one value holds at any instant. A client starts `Closed`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Connecting,
    Open,
    #[default]
    Closed,
}

impl ConnectionStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Open => write!(f, "OPEN"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// What went wrong on the transport. Informational only: every kind is
/// handled the same way by the client.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The connection could not be established.
    Connect,
    /// The server answered with a non-success HTTP status.
    Status(u16),
    /// Reading or decoding the stream failed mid-way.
    Stream,
    /// The server ended the stream.
    EndOfStream,
}

/// Which user callback a [`HandlerFault`] came from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultSource {
    MessageHandler,
    ErrorHandler,
    StatusObserver,
}

// --- Event Structs ---

/// A message notification delivered by the transport.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// Event type, `"message"` when the server did not name one.
    pub event: String,
    /// Raw payload.
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// `data` decoded as JSON, when it is valid JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Value>,
}

impl MessageEvent {
    /// Builds a plain `"message"` event, parsing `data` as JSON when possible.
    pub fn new(data: impl Into<String>) -> Self {
        let data = data.into();
        let parsed = serde_json::from_str(&data).ok();
        Self {
            event: "message".to_string(),
            data,
            id: None,
            parsed,
        }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = event.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.id = if id.is_empty() { None } else { Some(id) };
        self
    }
}

/// An error notification delivered by the transport.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorEvent {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// A panic caught while running a user callback.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HandlerFault {
    pub source: FaultSource,
    pub message: String,
}

impl HandlerFault {
    pub(crate) fn from_panic(source: FaultSource, payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { source, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_defaults_to_closed() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Closed);
        assert!(ConnectionStatus::default().is_closed());
        assert!(!ConnectionStatus::default().is_open());
        assert!(ConnectionStatus::Open.is_open());
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let value = serde_json::to_value(ConnectionStatus::Connecting).unwrap();
        assert_eq!(value, json!("CONNECTING"));
        assert_eq!(ConnectionStatus::Open.to_string(), "OPEN");
    }

    #[test]
    fn test_message_event_parses_json_data() {
        let event = MessageEvent::new(r#"{"price": 42}"#);
        assert_eq!(event.event, "message");
        assert_eq!(event.parsed, Some(json!({"price": 42})));
    }

    #[test]
    fn test_message_event_keeps_plain_text_unparsed() {
        let event = MessageEvent::new("hello world").with_event("greeting").with_id("");
        assert_eq!(event.data, "hello world");
        assert_eq!(event.event, "greeting");
        assert!(event.parsed.is_none());
        assert!(event.id.is_none());
    }

    #[test]
    fn test_fault_from_panic_payloads() {
        let fault = HandlerFault::from_panic(FaultSource::MessageHandler, Box::new("boom"));
        assert_eq!(fault.message, "boom");

        let fault =
            HandlerFault::from_panic(FaultSource::ErrorHandler, Box::new(String::from("bang")));
        assert_eq!(fault.message, "bang");

        let fault = HandlerFault::from_panic(FaultSource::StatusObserver, Box::new(7u8));
        assert_eq!(fault.message, "non-string panic payload");
    }
}

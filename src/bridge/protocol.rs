//! Wire types exchanged with the backend peer.
//!
//! Outbound: `{ "type": "query", "data": null, "echo": "<token>" }`
//! Inbound:  `{ "data": <any>, "echo": "<token>" }`

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Correlates one outbound message with its reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Generate a new random token (UUID v4).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Interpret an inbound `echo` field. Only strings can match.
    pub fn from_echo(echo: &Value) -> Option<Self> {
        echo.as_str().map(|s| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Intent of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Query,
}

/// Message sent to the peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,

    #[serde(default)]
    pub data: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<Token>,
}

impl Message {
    /// A query expecting a reply tagged with `token`.
    pub fn query(token: Token) -> Self {
        Self {
            kind: MessageKind::Query,
            data: Value::Null,
            echo: Some(token),
        }
    }
}

/// Opaque JSON payload, kept exactly as the peer sent it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Option<Box<RawValue>>);

impl Payload {
    /// The raw JSON text. Absent or `null` data renders as `null`.
    pub fn as_json(&self) -> &str {
        self.0.as_deref().map_or("null", RawValue::get)
    }

    /// Parse into a dynamic value.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::from_str(self.as_json())
    }
}

/// Reply received from the peer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default)]
    pub data: Payload,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<Value>,
}

impl Reply {
    /// Parse one inbound text frame.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// The correlation token, if the echo can carry one.
    pub fn token(&self) -> Option<Token> {
        self.echo.as_ref().and_then(Token::from_echo)
    }

    pub fn into_payload(self) -> Payload {
        self.data
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

/// A deserialized JSON-RPC envelope as it appeared on the wire.
///
/// `params`, `result` and `error` are kept as raw JSON fragments so that a
/// field carrying JSON `null` stays distinguishable from an absent field,
/// and so the trace output reproduces exactly what the wire carried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(
        default,
        deserialize_with = "raw_fragment",
        skip_serializing_if = "Option::is_none"
    )]
    pub params: Option<Box<RawValue>>,
    #[serde(
        default,
        deserialize_with = "raw_fragment",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Box<RawValue>>,
    #[serde(
        default,
        deserialize_with = "raw_fragment",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<Box<RawValue>>,
}

/// Captures a fragment field as `Some` whenever the key is present, even
/// when its value is JSON `null`. The derived `Option` impl would fold a
/// present `null` into `None`, erasing the distinction the classifier and
/// the trace output depend on; the absent-key case never reaches this
/// function and falls back to the field default instead.
fn raw_fragment<'de, D>(deserializer: D) -> Result<Option<Box<RawValue>>, D::Error>
where
    D: Deserializer<'de>,
{
    Box::<RawValue>::deserialize(deserializer).map(Some)
}

impl RawMessage {
    /// Classifies the envelope from the presence or absence of its fields.
    pub fn kind(&self) -> MessageKind {
        match (self.id.is_some(), self.method.is_some()) {
            (true, true) => MessageKind::Request,
            (true, false) if self.result.is_some() => MessageKind::Response,
            (true, false) if self.error.is_some() => MessageKind::Error,
            (false, true) => MessageKind::Notification,
            _ => MessageKind::Unknown,
        }
    }
}

/// Semantic shape of a JSON-RPC envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Error,
    Notification,
    Unknown,
}

/// Which peer produced the bytes of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Client,
    Server,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Client => "client",
            Origin::Server => "server",
        }
    }
}

/// One record of the trace output.
///
/// `method` is carried directly for requests and notifications; for
/// responses and errors it is recovered from the request correlator and is
/// an empty string when no matching request was seen.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    #[serde(rename = "msgKind")]
    pub kind: MessageKind,
    pub from: Origin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub msg: RawMessage,
}

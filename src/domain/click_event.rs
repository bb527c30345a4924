//! Click event model and its broker wire format.
//!
//! A [`ClickEvent`] is created on every successful resolve and travels to the
//! broker as a versioned JSON [`ClickMessage`]:
//!
//! ```json
//! {"v":1,"event_id":"9f1c…","code":"Ab12Cd","occurred_at":"2025-01-01T12:00:00.000000Z"}
//! ```
//!
//! The consumer decodes payloads with [`decode_click_message`], which rejects
//! anything malformed with a [`MessageError`]. Malformed data cannot become
//! well-formed on redelivery, so these errors are never retried.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::entities::NewClick;
use crate::utils::code_generator::is_well_formed_code;

/// Current version of the click message schema.
pub const CLICK_MESSAGE_VERSION: u32 = 1;

/// A redirect that should be counted.
///
/// `event_id` is assigned once at creation and survives publish retries and
/// broker redeliveries, so it anchors the idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    pub event_id: String,
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

impl ClickEvent {
    /// Creates an event for a redirect happening now.
    pub fn new(code: impl Into<String>) -> Self {
        Self::at(code, Utc::now())
    }

    /// Creates an event with an explicit timestamp.
    pub fn at(code: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_id: new_event_id(),
            code: code.into(),
            occurred_at,
        }
    }

    pub fn to_message(&self) -> ClickMessage {
        ClickMessage {
            v: CLICK_MESSAGE_VERSION,
            event_id: Some(self.event_id.clone()),
            code: self.code.clone(),
            occurred_at: format_timestamp(&self.occurred_at),
        }
    }

    /// Serializes the event into its broker payload.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_message())
    }
}

/// Broker payload for a click.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickMessage {
    pub v: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub code: String,
    pub occurred_at: String,
}

/// Lenient decoding target so that every missing field is reported by name.
#[derive(Debug, Deserialize)]
struct RawClickMessage {
    v: Option<u32>,
    event_id: Option<String>,
    code: Option<String>,
    occurred_at: Option<String>,
}

/// Reasons a click payload is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("payload is not valid JSON: {0}")]
    Malformed(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("unsupported message version {0}")]
    UnsupportedVersion(u32),

    #[error("invalid short code '{0}'")]
    InvalidCode(String),

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// A decoded and validated click, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedClick {
    pub code: String,
    pub occurred_at: DateTime<Utc>,
    pub idempotency_key: String,
}

impl From<ValidatedClick> for NewClick {
    fn from(click: ValidatedClick) -> Self {
        NewClick {
            code: click.code,
            clicked_at: click.occurred_at,
            idempotency_key: click.idempotency_key,
        }
    }
}

/// Decodes and validates a broker payload.
///
/// `message_id` is the broker's identifier for the message. It seeds the
/// idempotency key when the payload carries no `event_id`, which keeps
/// redeliveries of the same message collapsing into one record.
pub fn decode_click_message(payload: &str, message_id: &str) -> Result<ValidatedClick, MessageError> {
    let raw: RawClickMessage =
        serde_json::from_str(payload).map_err(|e| MessageError::Malformed(e.to_string()))?;

    match raw.v {
        None => return Err(MessageError::MissingField("v")),
        Some(CLICK_MESSAGE_VERSION) => {}
        Some(other) => return Err(MessageError::UnsupportedVersion(other)),
    }

    let code = raw
        .code
        .filter(|c| !c.is_empty())
        .ok_or(MessageError::MissingField("code"))?;
    if !is_well_formed_code(&code) {
        return Err(MessageError::InvalidCode(code));
    }

    let occurred_at = raw
        .occurred_at
        .filter(|t| !t.is_empty())
        .ok_or(MessageError::MissingField("occurred_at"))?;
    let occurred_at = DateTime::parse_from_rfc3339(&occurred_at)
        .map_err(|_| MessageError::InvalidTimestamp(occurred_at.clone()))?
        .with_timezone(&Utc);

    let source = match raw.event_id {
        Some(id) if id.is_empty() => return Err(MessageError::MissingField("event_id")),
        Some(id) => id,
        None => message_id.to_string(),
    };

    let idempotency_key = idempotency_key(&source, &code, &occurred_at);

    Ok(ValidatedClick {
        code,
        occurred_at,
        idempotency_key,
    })
}

/// Derives the deterministic de-duplication key for a click.
pub fn idempotency_key(source: &str, code: &str, occurred_at: &DateTime<Utc>) -> String {
    let material = format!("{}|{}|{}", source, code, format_timestamp(occurred_at));
    hex::encode(Sha256::digest(material.as_bytes()))
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn new_event_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

//! Envelope construction and normalization
//!
//! Every call the client accepts is turned into a fully-stamped envelope
//! before any transport sees it: payload bucket coerced to an object,
//! context merged with library metadata, timestamp normalized to RFC 3339,
//! and a fresh UUIDv4 message id assigned.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Library name injected into every envelope's context
pub const LIBRARY_NAME: &str = "beacon";

/// Library version injected into every envelope's context
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The six semantic event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Track,
    Identify,
    Group,
    Page,
    Screen,
    Alias,
}

impl EventKind {
    /// Wire value for the `type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Track => "track",
            EventKind::Identify => "identify",
            EventKind::Group => "group",
            EventKind::Page => "page",
            EventKind::Screen => "screen",
            EventKind::Alias => "alias",
        }
    }

    /// Payload bucket this kind carries, if any
    ///
    /// Track, page and screen calls carry `properties`; identify and group
    /// carry `traits`; alias carries neither.
    pub fn bucket(&self) -> Option<&'static str> {
        match self {
            EventKind::Track | EventKind::Page | EventKind::Screen => Some("properties"),
            EventKind::Identify | EventKind::Group => Some("traits"),
            EventKind::Alias => None,
        }
    }
}

/// A normalized, fully-stamped analytics event ready for transmission
///
/// Immutable once built: the inner map is only readable. Serializes as the
/// bare JSON object, so a batch of envelopes is exactly the wire array.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(transparent)]
pub struct Envelope(Map<String, Value>);

impl Envelope {
    /// Look up a top-level field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The stamped message id
    pub fn message_id(&self) -> &str {
        self.0
            .get("messageId")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Read access to all fields
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Builds envelopes from raw call fields
///
/// One builder per client; stateless apart from the injected library
/// metadata, so it is safe to share across caller threads.
#[derive(Debug, Clone)]
pub(crate) struct EnvelopeBuilder {
    library: Value,
}

impl EnvelopeBuilder {
    pub fn new() -> Self {
        Self {
            library: serde_json::json!({
                "name": LIBRARY_NAME,
                "version": LIBRARY_VERSION,
            }),
        }
    }

    /// Normalize raw caller fields into a stamped envelope
    pub fn build(&self, mut fields: Map<String, Value>, kind: EventKind) -> Envelope {
        if let Some(bucket) = kind.bucket() {
            let normalized = match fields.remove(bucket) {
                // Caller-provided object payloads pass through untouched.
                Some(Value::Object(map)) if !map.is_empty() => Value::Object(map),
                // Absent, null, empty, or non-object values all become the
                // empty object; an empty array must never reach the wire.
                _ => Value::Object(Map::new()),
            };
            fields.insert(bucket.to_string(), normalized);
        }

        let mut context = match fields.remove("context") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        // Injected library metadata wins on key collision.
        context.insert("library".to_string(), self.library.clone());
        fields.insert("context".to_string(), Value::Object(context));

        let ts = fields.remove("timestamp");
        fields.insert(
            "timestamp".to_string(),
            Value::String(format_time(ts.as_ref())),
        );

        fields.insert(
            "messageId".to_string(),
            Value::String(message_id()),
        );

        fields.insert(
            "type".to_string(),
            Value::String(kind.as_str().to_string()),
        );

        Envelope(fields)
    }
}

/// Generate a fresh UUIDv4 message id
///
/// `uuid` draws from the OS CSPRNG and sets the version/variant bits
/// itself, so ids are both unguessable and wire-compatible.
pub(crate) fn message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Normalize a caller-supplied timestamp to an RFC 3339 string
///
/// Accepts nothing (now), an integer epoch second, or a fractional epoch
/// second with microsecond precision. Any other JSON value falls back to
/// the current time rather than failing the call.
pub(crate) fn format_time(ts: Option<&Value>) -> String {
    let now = || Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false);

    let number = match ts {
        None | Some(Value::Null) => return now(),
        Some(Value::Number(n)) => n,
        Some(_) => return now(),
    };

    if let Some(secs) = number.as_i64() {
        return match DateTime::<Utc>::from_timestamp(secs, 0) {
            Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, false),
            None => now(),
        };
    }

    match number.as_f64() {
        Some(f) if f.is_finite() => {
            let mut secs = f.trunc() as i64;
            let mut micros = ((f - f.trunc()) * 1_000_000.0).round() as i64;
            if micros >= 1_000_000 {
                secs += 1;
                micros = 0;
            }
            if micros < 0 {
                secs -= 1;
                micros += 1_000_000;
            }
            match DateTime::<Utc>::from_timestamp(secs, (micros as u32) * 1_000) {
                Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Micros, false),
                None => now(),
            }
        }
        _ => now(),
    }
}

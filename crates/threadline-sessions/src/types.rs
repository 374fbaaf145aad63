use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::id::SessionId;
use crate::title::{derive_title, FALLBACK_TITLE};

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// One entry of a transcript.
///
/// Fields this crate does not interpret (`id`, `metadata`, ...) are kept in
/// `extra` and written back unchanged, `"id": null` included. A message
/// without a `parts` key reads as having no parts and is written back with
/// `"parts": []`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// A message with a single text part.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::text(text)],
            extra: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.extra.insert("id".to_string(), Value::String(id.into()));
        self
    }

    /// Client-assigned id, when it is a string.
    pub fn id(&self) -> Option<&str> {
        self.extra.get("id").and_then(Value::as_str)
    }

    /// All text parts joined with newlines; other parts are ignored.
    pub fn plain_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One fragment of a message.
///
/// Wire form is a JSON object tagged by `"type"`. Only `"text"` is
/// understood; every other kind (files, tool calls, reasoning, ...) is held
/// as raw JSON so it survives a load/save cycle untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(TextPart),
    Opaque(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(TextPart {
            text: text.into(),
            extra: Map::new(),
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(t) => Some(&t.text),
            Part::Opaque(_) => None,
        }
    }

    fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Part::Opaque(value);
        };
        let is_text = map.get("type").and_then(Value::as_str) == Some("text")
            && map.get("text").is_some_and(Value::is_string);
        if !is_text {
            return Part::Opaque(Value::Object(map));
        }
        map.remove("type");
        match map.remove("text") {
            Some(Value::String(text)) => Part::Text(TextPart { text, extra: map }),
            // checked above
            _ => Part::Opaque(Value::Object(map)),
        }
    }
}

#[derive(Serialize)]
struct TaggedText<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    inner: &'a TextPart,
}

impl Serialize for Part {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Part::Text(inner) => TaggedText { kind: "text", inner }.serialize(serializer),
            Part::Opaque(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Part::from_value)
    }
}

/// Everything persisted for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    pub title: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_modified: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl SessionRecord {
    /// Build a record, deriving the title from the transcript.
    pub fn new(id: SessionId, messages: Vec<Message>, last_modified: DateTime<Utc>) -> Self {
        Self {
            title: derive_title(&messages),
            id,
            last_modified,
            messages,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            last_modified: self.last_modified,
        }
    }
}

/// Listing entry: `{id, title, lastModified}` with epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub title: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_modified: DateTime<Utc>,
}

/// A session as seen by callers.
///
/// Ids are minted without touching storage, so a session is either
/// `Unsaved` (id only) or `Saved` (a record exists).
#[derive(Debug, Clone, PartialEq)]
pub enum Session {
    Unsaved(SessionId),
    Saved(SessionRecord),
}

impl Session {
    pub fn id(&self) -> &SessionId {
        match self {
            Session::Unsaved(id) => id,
            Session::Saved(record) => &record.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Session::Unsaved(_) => FALLBACK_TITLE,
            Session::Saved(record) => &record.title,
        }
    }

    pub fn messages(&self) -> &[Message] {
        match self {
            Session::Unsaved(_) => &[],
            Session::Saved(record) => &record.messages,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, Session::Saved(_))
    }

    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Session::Unsaved(_) => Vec::new(),
            Session::Saved(record) => record.messages,
        }
    }
}

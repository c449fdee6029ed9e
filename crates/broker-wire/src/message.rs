//! The message data model: kinds, content types, payloads, and the
//! kind-specific header records that make up a [`Message`].
//!
//! A tagged union (`enum Message`) stands in for the per-kind class
//! hierarchy a hand-rolled port of this protocol would otherwise produce —
//! one enum, one set of header structs, a single encode/decode dispatch.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// The closed set of message kinds, with their frozen wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Req,
    Res,
    Push,
    Pull,
    Pub,
    Sub,
    Ack,
    Mon,
    Sreq,
}

impl Kind {
    pub fn to_u8(self) -> u8 {
        match self {
            Kind::Req => 1,
            Kind::Res => 2,
            Kind::Push => 3,
            Kind::Pull => 4,
            Kind::Pub => 5,
            Kind::Sub => 6,
            Kind::Ack => 7,
            Kind::Mon => 0xF0,
            Kind::Sreq => 0xFF,
        }
    }

    pub fn from_u8(byte: u8) -> Result<Self, CodecError> {
        match byte {
            1 => Ok(Kind::Req),
            2 => Ok(Kind::Res),
            3 => Ok(Kind::Push),
            4 => Ok(Kind::Pull),
            5 => Ok(Kind::Pub),
            6 => Ok(Kind::Sub),
            7 => Ok(Kind::Ack),
            0xF0 => Ok(Kind::Mon),
            0xFF => Ok(Kind::Sreq),
            other => Err(CodecError::InvalidKind(other)),
        }
    }
}

/// Content-type tag. `"str"` is never accepted on decode — `"string"`/3 is
/// the sole canonical spelling (see DESIGN.md open-question resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Raw,
    Json,
    String,
}

impl ContentType {
    pub fn to_u8(self) -> u8 {
        match self {
            ContentType::Raw => 1,
            ContentType::Json => 2,
            ContentType::String => 3,
        }
    }

    pub fn from_u8(byte: u8) -> Result<Self, CodecError> {
        match byte {
            1 => Ok(ContentType::Raw),
            2 => Ok(ContentType::Json),
            3 => Ok(ContentType::String),
            other => Err(CodecError::InvalidContentType(other)),
        }
    }
}

/// A decoded payload, tagged by its content type so the codec can refuse
/// malformed JSON at decode time instead of erasing everything to bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Raw(Bytes),
    String(String),
    Json(serde_json::Value),
}

impl Payload {
    pub fn content_type(&self) -> ContentType {
        match self {
            Payload::Raw(_) => ContentType::Raw,
            Payload::String(_) => ContentType::String,
            Payload::Json(_) => ContentType::Json,
        }
    }

    pub fn empty(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Raw => Payload::Raw(Bytes::new()),
            ContentType::String => Payload::String(String::new()),
            ContentType::Json => Payload::Json(serde_json::Value::Null),
        }
    }

    /// Encode this payload's bytes onto the wire (without any length prefix).
    pub fn encoded_bytes(&self) -> Result<Bytes, CodecError> {
        match self {
            Payload::Raw(bytes) => Ok(bytes.clone()),
            Payload::String(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            Payload::Json(value) => Ok(Bytes::from(serde_json::to_vec(value)?)),
        }
    }

    pub fn decode(content_type: ContentType, bytes: &[u8]) -> Result<Self, CodecError> {
        match content_type {
            ContentType::Raw => Ok(Payload::Raw(Bytes::copy_from_slice(bytes))),
            ContentType::String => {
                Ok(Payload::String(std::str::from_utf8(bytes)?.to_owned()))
            }
            ContentType::Json => Ok(Payload::Json(serde_json::from_slice(bytes)?)),
        }
    }

    /// Typed accessor used by internal request handlers, which always deal
    /// in JSON payloads.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// Header fields shared by `req`, `res`, and `sreq` — the richest schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ReqHeader {
    pub id: u64,
    pub content_type: ContentType,
    pub error: u8,
    pub topic: String,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PubHeader {
    pub id: u64,
    pub content_type: ContentType,
    pub topic: String,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubHeader {
    pub id: u64,
    pub content_type: ContentType,
    pub topic: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushHeader {
    pub id: u64,
    pub content_type: ContentType,
    pub topic: String,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PullHeader {
    pub id: u64,
    pub content_type: ContentType,
    pub topic: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AckHeader {
    pub id: u64,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonHeader {
    pub id: u64,
    pub content_type: ContentType,
}

/// One message on the wire. Variant order matches the `kind` enum; each
/// variant carries exactly the header fields the spec's per-kind schema
/// table lists for it.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Req { header: ReqHeader, payload: Payload },
    Res { header: ReqHeader, payload: Payload },
    Sreq { header: ReqHeader, payload: Payload },
    Push { header: PushHeader, items: Vec<Payload> },
    Pub { header: PubHeader, payload: Payload },
    Sub { header: SubHeader },
    Pull { header: PullHeader },
    Ack { header: AckHeader },
    Mon { header: MonHeader, payload: Payload },
}

impl Message {
    pub fn kind(&self) -> Kind {
        match self {
            Message::Req { .. } => Kind::Req,
            Message::Res { .. } => Kind::Res,
            Message::Sreq { .. } => Kind::Sreq,
            Message::Push { .. } => Kind::Push,
            Message::Pub { .. } => Kind::Pub,
            Message::Sub { .. } => Kind::Sub,
            Message::Pull { .. } => Kind::Pull,
            Message::Ack { .. } => Kind::Ack,
            Message::Mon { .. } => Kind::Mon,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Message::Req { header, .. }
            | Message::Res { header, .. }
            | Message::Sreq { header, .. } => header.id,
            Message::Push { header, .. } => header.id,
            Message::Pub { header, .. } => header.id,
            Message::Sub { header } => header.id,
            Message::Pull { header } => header.id,
            Message::Ack { header } => header.id,
            Message::Mon { header, .. } => header.id,
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            Message::Req { header, .. }
            | Message::Res { header, .. }
            | Message::Sreq { header, .. } => &header.topic,
            Message::Push { header, .. } => &header.topic,
            Message::Pub { header, .. } => &header.topic,
            Message::Sub { header } => &header.topic,
            Message::Pull { header } => &header.topic,
            Message::Ack { header } => &header.topic,
            Message::Mon { .. } => "",
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Message::Req { header, .. }
            | Message::Res { header, .. }
            | Message::Sreq { header, .. } => &header.source,
            Message::Push { header, .. } => &header.source,
            Message::Pub { header, .. } => &header.source,
            Message::Sub { header } => &header.source,
            Message::Pull { header } => &header.source,
            _ => "",
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            Message::Req { header, .. }
            | Message::Res { header, .. }
            | Message::Sreq { header, .. } => Some(&header.target),
            Message::Push { header, .. } => Some(&header.target),
            Message::Pub { header, .. } => Some(&header.target),
            _ => None,
        }
    }

    /// Returns `true` iff this is a `res` whose `error` field equals the
    /// numeric code resolved from `code`, looked up by name when given a
    /// string and used directly when given a number. Mirrors the spec's
    /// resolution of the source's ambiguous `isError` comparison.
    pub fn is_error(&self, code: ErrorCodeRef<'_>) -> bool {
        let Message::Res { header, .. } = self else {
            return false;
        };
        match code {
            ErrorCodeRef::Numeric(n) => header.error == n,
            ErrorCodeRef::Named(name) => crate::error_codes::by_name(name) == Some(header.error),
        }
    }
}

/// Either spelling a caller might use to ask `Message::is_error` a question.
pub enum ErrorCodeRef<'a> {
    Numeric(u8),
    Named(&'a str),
}

/// Serde-visible shape used only for the JSON payloads of internal request
/// topics (see `broker-wire::internal`); distinct from the wire `Message`
/// enum, which is never itself serialized through serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub event: MonitorEventKind,
    pub channel: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorEventKind {
    Register,
    Unregister,
}

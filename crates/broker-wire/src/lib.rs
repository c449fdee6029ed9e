//! Wire framing and message types for the broker.
//!
//! This crate owns the one thing every peer in the system must agree on
//! byte-for-byte: the `[totalLen][headerLen][header][payload]` frame and the
//! per-kind header schemas layered on top of it. Everything above the wire —
//! registries, queues, routing — lives in the root crate and talks in terms
//! of [`message::Message`], never raw bytes.

pub mod codec;
pub mod error;
pub mod error_codes;
pub mod message;

pub use codec::{decode_message, RawFrameCodec, WireCodec};
pub use error::CodecError;
pub use message::{
    AckHeader, ContentType, ErrorCodeRef, Kind, Message, MonHeader, MonitorEvent,
    MonitorEventKind, Payload, PubHeader, PullHeader, PushHeader, ReqHeader, SubHeader,
};

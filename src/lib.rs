//! In-process message broker: request/response, push/pull work queues, and
//! publish/subscribe over a length-prefixed binary wire protocol.
//!
//! The wire format and message types live in the `broker-wire` crate; this
//! crate is everything above the wire — channel registry, task queues,
//! routing, connection lifecycle, configuration, and the CLI entrypoint.

pub mod config;
pub mod connection;
pub mod error;
pub mod ids;
pub mod pattern;
pub mod queues;
pub mod registry;
pub mod router;

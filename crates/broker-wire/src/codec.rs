//! `tokio_util::codec::{Decoder, Encoder}` implementation of the wire
//! framing described in the spec:
//!
//! ```text
//! [ uint32 BE totalLen ][ uint32 BE headerLen ][ header bytes ][ payload bytes ]
//! ```
//!
//! `BytesMut`'s append-then-try-parse discipline already gives the
//! Reassembler's buffering behavior for free, so there is no separate
//! reassembler type — `decode` below both reassembles and parses.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;
use crate::message::{
    AckHeader, ContentType, Kind, Message, MonHeader, Payload, PubHeader, PullHeader, PushHeader,
    ReqHeader, SubHeader,
};

const FRAME_PREFIX_LEN: usize = 8;

/// The broker's wire codec. One instance per connection; `header_scratch` is
/// reused across `encode` calls but cleared up front each time so a prior
/// frame's bytes can never leak into the next one.
#[derive(Debug, Default)]
pub struct WireCodec {
    header_scratch: Vec<u8>,
}

impl WireCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Small cursor over an in-memory header/payload slice.
// ---------------------------------------------------------------------------

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        if self.remaining() < 1 {
            return Err(CodecError::MalformedFrame("header ended mid-field (u8)"));
        }
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn read_u32_be(&mut self) -> Result<u32, CodecError> {
        if self.remaining() < 4 {
            return Err(CodecError::MalformedFrame("header ended mid-field (u32)"));
        }
        let bytes = [
            self.buf[self.pos],
            self.buf[self.pos + 1],
            self.buf[self.pos + 2],
            self.buf[self.pos + 3],
        ];
        self.pos += 4;
        Ok(u32::from_be_bytes(bytes))
    }

    fn read_u64_be(&mut self) -> Result<u64, CodecError> {
        if self.remaining() < 8 {
            return Err(CodecError::MalformedFrame("header ended mid-field (u64)"));
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.buf[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(u64::from_be_bytes(bytes))
    }

    /// Unsigned LEB128 length prefix followed by that many UTF-8 bytes.
    fn read_varstring(&mut self) -> Result<String, CodecError> {
        let mut rest = &self.buf[self.pos..];
        let before = rest.len();
        let len = leb128::read::unsigned(&mut rest)
            .map_err(|_| CodecError::MalformedFrame("bad varint string length"))?;
        self.pos += before - rest.len();
        let len = usize::try_from(len)
            .map_err(|_| CodecError::MalformedFrame("varint string length overflow"))?;
        if self.remaining() < len {
            return Err(CodecError::MalformedFrame("string bytes run past header end"));
        }
        let s = std::str::from_utf8(&self.buf[self.pos..self.pos + len])?.to_owned();
        self.pos += len;
        Ok(s)
    }
}

fn write_varstring(out: &mut Vec<u8>, s: &str) {
    leb128::write::unsigned(out, s.len() as u64).expect("writing to a Vec never fails");
    out.extend_from_slice(s.as_bytes());
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

impl Encoder<Message> for WireCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), CodecError> {
        self.header_scratch.clear();
        let header = &mut self.header_scratch;
        let kind = item.kind();
        let id = item.id();

        let mut payload_buf: Vec<u8> = Vec::new();
        let mut item_count: u32 = 0;

        match &item {
            Message::Req { header: h, payload } | Message::Res { header: h, payload } | Message::Sreq { header: h, payload } => {
                header.extend_from_slice(&id.to_be_bytes());
                header.push(kind.to_u8());
                header.push(h.content_type.to_u8());
                header.push(h.error);
                write_varstring(header, &h.topic);
                write_varstring(header, &h.source);
                write_varstring(header, &h.target);
                payload_buf = payload.encoded_bytes()?.to_vec();
            }
            Message::Pub { header: h, payload } => {
                header.extend_from_slice(&id.to_be_bytes());
                header.push(kind.to_u8());
                header.push(h.content_type.to_u8());
                write_varstring(header, &h.topic);
                write_varstring(header, &h.source);
                write_varstring(header, &h.target);
                payload_buf = payload.encoded_bytes()?.to_vec();
            }
            Message::Sub { header: h } => {
                header.extend_from_slice(&id.to_be_bytes());
                header.push(kind.to_u8());
                header.push(h.content_type.to_u8());
                write_varstring(header, &h.topic);
                write_varstring(header, &h.source);
            }
            Message::Pull { header: h } => {
                header.extend_from_slice(&id.to_be_bytes());
                header.push(kind.to_u8());
                header.push(h.content_type.to_u8());
                write_varstring(header, &h.topic);
                write_varstring(header, &h.source);
            }
            Message::Ack { header: h } => {
                header.extend_from_slice(&id.to_be_bytes());
                header.push(kind.to_u8());
                write_varstring(header, &h.topic);
            }
            Message::Mon { header: h, payload } => {
                header.extend_from_slice(&id.to_be_bytes());
                header.push(kind.to_u8());
                header.push(h.content_type.to_u8());
                payload_buf = payload.encoded_bytes()?.to_vec();
            }
            Message::Push { header: h, items } => {
                header.extend_from_slice(&id.to_be_bytes());
                header.push(kind.to_u8());
                header.push(h.content_type.to_u8());
                write_varstring(header, &h.topic);
                write_varstring(header, &h.source);
                write_varstring(header, &h.target);
                item_count = u32::try_from(items.len())
                    .map_err(|_| CodecError::MalformedFrame("push item count overflow"))?;
                header.extend_from_slice(&item_count.to_be_bytes());

                for it in items {
                    let bytes = it.encoded_bytes()?;
                    let len = u32::try_from(bytes.len())
                        .map_err(|_| CodecError::MalformedFrame("push item too large"))?;
                    payload_buf.extend_from_slice(&len.to_be_bytes());
                    payload_buf.extend_from_slice(&bytes);
                }
            }
        }

        let header_len = u32::try_from(header.len())
            .map_err(|_| CodecError::MalformedFrame("header too large"))?;
        let payload_len = u32::try_from(payload_buf.len())
            .map_err(|_| CodecError::MalformedFrame("payload too large"))?;
        let total_len = FRAME_PREFIX_LEN as u32 + header_len + payload_len;

        dst.reserve(FRAME_PREFIX_LEN + header.len() + payload_buf.len());
        dst.put_u32(total_len);
        dst.put_u32(header_len);
        dst.put_slice(header);
        dst.put_slice(&payload_buf);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

impl Decoder for WireCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, CodecError> {
        let Some(frame) = next_frame(src)? else {
            return Ok(None);
        };
        decode_message(&frame).map(Some)
    }
}

/// Pulls one complete frame (the full `[totalLen][headerLen][header][payload]`
/// run) out of `src` once enough bytes are buffered, leaving any trailing
/// bytes for the next call. Returns `Ok(None)` when more bytes are needed.
fn next_frame(src: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
    if src.len() < FRAME_PREFIX_LEN {
        return Ok(None);
    }
    let total_len = u32::from_be_bytes(src[0..4].try_into().unwrap());
    if (total_len as usize) < FRAME_PREFIX_LEN {
        return Err(CodecError::FrameTooShort(total_len));
    }
    let header_len = u32::from_be_bytes(src[4..8].try_into().unwrap());
    if header_len > total_len - FRAME_PREFIX_LEN as u32 {
        return Err(CodecError::HeaderOverflow { header_len, total_len });
    }
    if src.len() < total_len as usize {
        src.reserve(total_len as usize - src.len());
        return Ok(None);
    }
    Ok(Some(src.split_to(total_len as usize).freeze()))
}

/// Parses a complete, already-framed byte run (as produced by [`next_frame`]
/// or [`RawFrameCodec`]) into a [`Message`]. Kept separate from the
/// `Decoder` impl so the connection layer can hold on to the original frame
/// bytes for raw forwarding while still getting a parsed `Message` to route.
pub fn decode_message(frame: &Bytes) -> Result<Message, CodecError> {
    if frame.len() < FRAME_PREFIX_LEN {
        return Err(CodecError::FrameTooShort(frame.len() as u32));
    }
    let header_len = u32::from_be_bytes(frame[4..8].try_into().unwrap()) as usize;
    if FRAME_PREFIX_LEN + header_len > frame.len() {
        return Err(CodecError::HeaderOverflow {
            header_len: header_len as u32,
            total_len: frame.len() as u32,
        });
    }
    let header_bytes = &frame[FRAME_PREFIX_LEN..FRAME_PREFIX_LEN + header_len];
    let payload_bytes = &frame[FRAME_PREFIX_LEN + header_len..];
    parse_message(header_bytes, payload_bytes)
}

/// A `Decoder` that yields complete frames as raw bytes without parsing
/// them. The Connection Lifecycle layer uses this so it can forward `req`/
/// `res` traffic byte-for-byte (see the "forwarding by raw bytes" design
/// note) while still calling [`decode_message`] on the same bytes to decide
/// where to route them.
#[derive(Debug, Default)]
pub struct RawFrameCodec;

impl Decoder for RawFrameCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
        next_frame(src)
    }
}

impl Encoder<Bytes> for RawFrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), CodecError> {
        dst.reserve(item.len());
        dst.put_slice(&item);
        Ok(())
    }
}

fn parse_message(header_bytes: &[u8], payload_bytes: &[u8]) -> Result<Message, CodecError> {
    let mut cur = Cursor::new(header_bytes);
    let id = cur.read_u64_be()?;
    let kind = Kind::from_u8(cur.read_u8()?)?;

    let message = match kind {
        Kind::Req | Kind::Res | Kind::Sreq => {
            let content_type = ContentType::from_u8(cur.read_u8()?)?;
            let error = cur.read_u8()?;
            let topic = cur.read_varstring()?;
            let source = cur.read_varstring()?;
            let target = cur.read_varstring()?;
            let header = ReqHeader { id, content_type, error, topic, source, target };
            let payload = Payload::decode(content_type, payload_bytes)?;
            match kind {
                Kind::Req => Message::Req { header, payload },
                Kind::Res => Message::Res { header, payload },
                Kind::Sreq => Message::Sreq { header, payload },
                _ => unreachable!(),
            }
        }
        Kind::Pub => {
            let content_type = ContentType::from_u8(cur.read_u8()?)?;
            let topic = cur.read_varstring()?;
            let source = cur.read_varstring()?;
            let target = cur.read_varstring()?;
            let header = PubHeader { id, content_type, topic, source, target };
            let payload = Payload::decode(content_type, payload_bytes)?;
            Message::Pub { header, payload }
        }
        Kind::Sub => {
            let content_type = ContentType::from_u8(cur.read_u8()?)?;
            let topic = cur.read_varstring()?;
            let source = cur.read_varstring()?;
            Message::Sub { header: SubHeader { id, content_type, topic, source } }
        }
        Kind::Pull => {
            let content_type = ContentType::from_u8(cur.read_u8()?)?;
            let topic = cur.read_varstring()?;
            let source = cur.read_varstring()?;
            Message::Pull { header: PullHeader { id, content_type, topic, source } }
        }
        Kind::Ack => {
            let topic = cur.read_varstring()?;
            Message::Ack { header: AckHeader { id, topic } }
        }
        Kind::Mon => {
            let content_type = ContentType::from_u8(cur.read_u8()?)?;
            let payload = Payload::decode(content_type, payload_bytes)?;
            Message::Mon { header: MonHeader { id, content_type }, payload }
        }
        Kind::Push => {
            let content_type = ContentType::from_u8(cur.read_u8()?)?;
            let topic = cur.read_varstring()?;
            let source = cur.read_varstring()?;
            let target = cur.read_varstring()?;
            let item_count = cur.read_u32_be()?;
            let header = PushHeader { id, content_type, topic, source, target };

            // Each item contributes at least a 4-byte length prefix, so an
            // `itemCount` that couldn't possibly fit in the remaining payload
            // is malformed. Reject it before trusting it as a `Vec` capacity
            // hint; the wire value is attacker-controlled.
            if (item_count as usize) > payload_bytes.len() / 4 {
                return Err(CodecError::MalformedFrame(
                    "push item count exceeds what the payload could possibly hold",
                ));
            }

            let mut items = Vec::with_capacity(item_count as usize);
            let mut rest = payload_bytes;
            for _ in 0..item_count {
                if rest.len() < 4 {
                    return Err(CodecError::MalformedFrame("push item length truncated"));
                }
                let item_len = u32::from_be_bytes(rest[0..4].try_into().unwrap()) as usize;
                rest = &rest[4..];
                if item_len > rest.len() {
                    return Err(CodecError::MalformedFrame(
                        "push item length exceeds remaining payload",
                    ));
                }
                items.push(Payload::decode(content_type, &rest[..item_len])?);
                rest = &rest[item_len..];
            }
            Message::Push { header, items }
        }
    };

    Ok(message)
}

/// Re-export for callers that want to encode a single message into a
/// standalone `Bytes` buffer without going through a `Framed` stream (used
/// by the router when forwarding is *not* involved, e.g. broker-originated
/// replies before the `Framed` sink accepts them).
pub fn encode_standalone(msg: Message) -> Result<Bytes, CodecError> {
    let mut codec = WireCodec::new();
    let mut buf = BytesMut::new();
    codec.encode(msg, &mut buf)?;
    Ok(buf.freeze())
}

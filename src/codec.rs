//! tokio-util codecs built on the frame splitter.
//!
//! - [`ItemCodec`] yields one flat [`Item`] per frame.
//! - [`CommandCodec`] yields one client request: an inline line, or a
//!   multibulk array together with all of its bulk elements.
//! - [`ReplyCodec`] yields one complete backend reply, nested arrays included.
//!
//! The request and reply codecs keep the exact wire bytes they consumed so the
//! proxy can forward them untouched. Both encode `Bytes` as-is.

use std::ops::Range;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, FramedRead};

use crate::frame::{split, try_decode_item, Frame, Split};
use crate::types::{Item, ProtocolError, RcpError, MAX_MULTIBULK_LEN};

/// Reads one [`Item`] at a time from a byte source.
pub type ItemReader<R> = FramedRead<R, ItemCodec>;

/// Flat frame-to-item codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct ItemCodec;

impl Decoder for ItemCodec {
    type Item = Item;
    type Error = RcpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Item>, RcpError> {
        Ok(try_decode_item(src, false)?.map(|(_, item)| item))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Item>, RcpError> {
        Ok(try_decode_item(src, true)?.map(|(_, item)| item))
    }
}

impl Encoder<Item> for ItemCodec {
    type Error = RcpError;

    fn encode(&mut self, item: Item, dst: &mut BytesMut) -> Result<(), RcpError> {
        item.encode(dst);
        Ok(())
    }
}

/// One client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    raw: Bytes,
    parts: Vec<Bytes>,
}

impl Command {
    /// The request exactly as it arrived on the wire.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Command name followed by its arguments.
    pub fn parts(&self) -> &[Bytes] {
        &self.parts
    }

    pub fn name(&self) -> Option<&[u8]> {
        self.parts.first().map(|p| &p[..])
    }
}

/// Decoder for client requests.
///
/// A multibulk request that arrives over several reads is scanned once: the
/// codec remembers how far it got and resumes there on the next call.
#[derive(Debug, Default)]
pub struct CommandCodec {
    scan: Option<CommandScan>,
}

/// Progress through a partially received multibulk request.
#[derive(Debug)]
struct CommandScan {
    /// Bytes of `src` already validated.
    offset: usize,
    remaining: i64,
    spans: Vec<Range<usize>>,
}

impl CommandCodec {
    fn decode_command(&mut self, src: &mut BytesMut, at_eof: bool) -> Result<Option<Command>, RcpError> {
        loop {
            let mut scan = match self.scan.take() {
                Some(scan) => scan,
                None => {
                    let head = match split(src, at_eof)? {
                        Split::Incomplete => return Ok(None),
                        Split::Frame(frame) => frame,
                    };
                    match head.sigil() {
                        b'*' => {
                            let count = head.value();
                            if count > MAX_MULTIBULK_LEN {
                                return Err(ProtocolError::InvalidMultibulkLength.into());
                            }
                            if count <= 0 {
                                // empty request, nothing to forward
                                src.advance(head.len());
                                continue;
                            }
                            CommandScan {
                                offset: head.len(),
                                remaining: count,
                                spans: Vec::with_capacity(count.min(1024) as usize),
                            }
                        }
                        b'$' | b':' | b'+' | b'-' => {
                            return Err(ProtocolError::UnexpectedRequest(char::from(head.sigil())).into());
                        }
                        _ => {
                            let raw = src.split_to(head.len()).freeze();
                            let parts = tokenize(&raw.slice(head.line()));
                            if parts.is_empty() {
                                continue;
                            }
                            return Ok(Some(Command { raw, parts }));
                        }
                    }
                }
            };

            while scan.remaining > 0 {
                let frame = match split(&src[scan.offset..], at_eof)? {
                    Split::Incomplete => {
                        self.scan = Some(scan);
                        return Ok(None);
                    }
                    Split::Frame(frame) => frame,
                };
                if frame.sigil() != b'$' {
                    return Err(ProtocolError::ExpectedBulk(char::from(frame.sigil())).into());
                }
                let Some(payload) = frame.payload() else {
                    return Err(ProtocolError::InvalidBulkLength.into());
                };
                scan.spans.push(scan.offset + payload.start..scan.offset + payload.end);
                scan.offset += frame.len();
                scan.remaining -= 1;
            }

            let raw = src.split_to(scan.offset).freeze();
            let parts = scan.spans.into_iter().map(|span| raw.slice(span)).collect();
            return Ok(Some(Command { raw, parts }));
        }
    }
}

impl Decoder for CommandCodec {
    type Item = Command;
    type Error = RcpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Command>, RcpError> {
        self.decode_command(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Command>, RcpError> {
        match self.decode_command(src, true)? {
            None if !src.is_empty() => Err(ProtocolError::Incomplete.into()),
            command => Ok(command),
        }
    }
}

impl Encoder<Bytes> for CommandCodec {
    type Error = RcpError;

    fn encode(&mut self, data: Bytes, dst: &mut BytesMut) -> Result<(), RcpError> {
        dst.extend_from_slice(&data);
        Ok(())
    }
}

/// Split an inline request on ASCII whitespace.
fn tokenize(line: &Bytes) -> Vec<Bytes> {
    let mut parts = Vec::new();
    let mut start = None;
    for (i, b) in line.iter().enumerate() {
        match (b.is_ascii_whitespace(), start) {
            (true, Some(s)) => {
                parts.push(line.slice(s..i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        parts.push(line.slice(s..));
    }
    parts
}

/// One complete backend reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    raw: Bytes,
    head: Item,
}

impl Reply {
    /// The reply exactly as it arrived on the wire.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// The reply's first frame, decoded. For arrays this is only the header.
    pub fn head(&self) -> &Item {
        &self.head
    }

    /// Error message without the leading `-`, if this is an error reply.
    pub fn error_message(&self) -> Option<&Bytes> {
        match &self.head {
            Item::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn into_raw(self) -> Bytes {
        self.raw
    }
}

/// Decoder for backend replies.
///
/// Elements of an array reply are counted as they arrive, nested arrays
/// included. Like [`CommandCodec`], the scan resumes where the previous read
/// left off.
#[derive(Debug, Default)]
pub struct ReplyCodec {
    scan: Option<ReplyScan>,
}

/// Progress through a partially received reply.
#[derive(Debug, Clone, Copy)]
struct ReplyScan {
    head: Frame,
    /// Bytes of `src` already validated.
    offset: usize,
    /// Elements still owed by the array headers seen so far.
    pending: u64,
}

impl ReplyCodec {
    fn decode_reply(&mut self, src: &mut BytesMut, at_eof: bool) -> Result<Option<Reply>, RcpError> {
        let mut scan = match self.scan.take() {
            Some(scan) => scan,
            None => match split(src, at_eof)? {
                Split::Incomplete => return Ok(None),
                Split::Frame(head) => ReplyScan {
                    head,
                    offset: head.len(),
                    pending: element_count(head.sigil(), head.value()),
                },
            },
        };

        while scan.pending > 0 {
            let frame = match split(&src[scan.offset..], at_eof)? {
                Split::Incomplete => {
                    self.scan = Some(scan);
                    return Ok(None);
                }
                Split::Frame(frame) => frame,
            };
            scan.pending = (scan.pending - 1)
                .checked_add(element_count(frame.sigil(), frame.value()))
                .ok_or(ProtocolError::InvalidMultibulkLength)?;
            scan.offset += frame.len();
        }

        let raw = src.split_to(scan.offset).freeze();
        let head = scan.head.to_item(&raw);
        Ok(Some(Reply { raw, head }))
    }
}

fn element_count(sigil: u8, value: i64) -> u64 {
    if sigil == b'*' && value > 0 {
        value as u64
    } else {
        0
    }
}

impl Decoder for ReplyCodec {
    type Item = Reply;
    type Error = RcpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Reply>, RcpError> {
        self.decode_reply(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Reply>, RcpError> {
        match self.decode_reply(src, true)? {
            None if !src.is_empty() => Err(ProtocolError::Incomplete.into()),
            reply => Ok(reply),
        }
    }
}

impl Encoder<Bytes> for ReplyCodec {
    type Error = RcpError;

    fn encode(&mut self, data: Bytes, dst: &mut BytesMut) -> Result<(), RcpError> {
        dst.extend_from_slice(&data);
        Ok(())
    }
}

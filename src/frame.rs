//! Frame splitting and canonical encoding.
//!
//! [`split`] locates exactly one wire frame at the start of a buffer that may
//! still be growing. It never consumes anything itself: callers append newly
//! arrived bytes and call it again until it resolves to a [`Frame`], and then
//! advance their buffer by [`Frame::len`].
//!
//! Every line may end in `\r\n` or a bare `\n`. A bulk frame is its header
//! line plus the declared number of payload bytes plus one more terminator.
//! Array headers are *not* followed into their elements here; composing
//! elements is left to the readers in [`crate::codec`].

use std::ops::Range;

use bytes::{BufMut, Bytes, BytesMut};

use crate::types::{Item, ProtocolError, CRLF, MAX_BULK_LEN, MAX_INLINE_LEN};

/// Room for the decimal form of any `i64`: sign plus 19 digits.
pub const MAX_INT_LEN: usize = 20;

/// Outcome of a successful [`split`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    /// More bytes are needed; nothing may be consumed yet.
    Incomplete,
    /// A complete frame sits at the start of the buffer.
    Frame(Frame),
}

/// A located, validated frame at the start of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    sigil: u8,
    /// End of the first line's content, terminator excluded.
    line_end: usize,
    /// Length of the first line including its terminator.
    header_len: usize,
    /// Parsed integer for `:`, `$` and `*` frames.
    value: i64,
    len: usize,
}

#[allow(clippy::len_without_is_empty)]
impl Frame {
    /// Number of buffer bytes this frame spans, i.e. how far to advance.
    pub fn len(&self) -> usize {
        self.len
    }

    /// First byte of the frame.
    pub fn sigil(&self) -> u8 {
        self.sigil
    }

    /// Declared integer of an integer, bulk or array header.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Content of the first line, terminator excluded.
    pub fn line(&self) -> Range<usize> {
        0..self.line_end
    }

    /// Payload span of a non-null bulk frame.
    pub fn payload(&self) -> Option<Range<usize>> {
        (self.sigil == b'$' && self.value >= 0)
            .then(|| self.header_len..self.header_len + self.value as usize)
    }

    /// Decode the frame into an [`Item`].
    ///
    /// `raw` must start at the frame's first byte and hold at least
    /// [`Frame::len`] bytes, as located by [`split`]. Payloads are sliced out
    /// of `raw` without copying.
    pub fn to_item(&self, raw: &Bytes) -> Item {
        match self.sigil {
            b'+' => Item::SimpleString(raw.slice(1..self.line_end)),
            b'-' => Item::Error(raw.slice(1..self.line_end)),
            b':' => Item::Integer(self.value),
            b'*' => Item::Array(self.value),
            b'$' => Item::Bulk(self.payload().map(|span| raw.slice(span))),
            _ => Item::Inline(raw.slice(self.line())),
        }
    }
}

/// Locate one frame at the start of `buf`.
///
/// `at_eof` says whether more bytes can still arrive. While they can, a
/// partial frame yields [`Split::Incomplete`]; once they can't, the same
/// partial frame is [`ProtocolError::Incomplete`]. An empty buffer is always
/// `Incomplete`, since a stream may cleanly end between frames.
pub fn split(buf: &[u8], at_eof: bool) -> Result<Split, ProtocolError> {
    if buf.is_empty() {
        return Ok(Split::Incomplete);
    }

    let Some(newline) = buf.iter().position(|&b| b == b'\n') else {
        if buf.len() > MAX_INLINE_LEN {
            return Err(ProtocolError::LineTooLong);
        }
        return incomplete(at_eof);
    };
    let line_end = if newline > 0 && buf[newline - 1] == b'\r' {
        newline - 1
    } else {
        newline
    };
    let header_len = newline + 1;

    let sigil = buf[0];
    let mut frame = Frame {
        sigil,
        line_end,
        header_len,
        value: 0,
        len: header_len,
    };

    match sigil {
        b':' => frame.value = atoi(&buf[1..line_end])?,
        b'*' => {
            frame.value =
                atoi(&buf[1..line_end]).map_err(|_| ProtocolError::InvalidMultibulkLength)?;
            if frame.value < -1 {
                return Err(ProtocolError::InvalidMultibulkLength);
            }
        }
        b'$' => {
            frame.value = atoi(&buf[1..line_end]).map_err(|_| ProtocolError::InvalidBulkLength)?;
            if frame.value < -1 || frame.value > MAX_BULK_LEN {
                return Err(ProtocolError::InvalidBulkLength);
            }
            if frame.value >= 0 {
                let payload_end = header_len + frame.value as usize;
                frame.len = match buf.get(payload_end) {
                    None => return incomplete(at_eof),
                    Some(b'\n') => payload_end + 1,
                    Some(b'\r') => match buf.get(payload_end + 1) {
                        None => return incomplete(at_eof),
                        Some(b'\n') => payload_end + 2,
                        Some(_) => return Err(ProtocolError::BadTerminator),
                    },
                    Some(_) => return Err(ProtocolError::BadTerminator),
                };
            }
        }
        _ => {}
    }

    Ok(Split::Frame(frame))
}

fn incomplete(at_eof: bool) -> Result<Split, ProtocolError> {
    if at_eof {
        Err(ProtocolError::Incomplete)
    } else {
        Ok(Split::Incomplete)
    }
}

/// Split one frame off the front of `src` and decode it.
///
/// Returns the frame's raw bytes alongside the decoded item, or `None` when
/// more data is needed.
pub fn try_decode_item(
    src: &mut BytesMut,
    at_eof: bool,
) -> Result<Option<(Bytes, Item)>, ProtocolError> {
    match split(src, at_eof)? {
        Split::Incomplete => Ok(None),
        Split::Frame(frame) => {
            let raw = src.split_to(frame.len()).freeze();
            let item = frame.to_item(&raw);
            Ok(Some((raw, item)))
        }
    }
}

/// Append the canonical wire form of `item` to `dst`.
pub fn encode_item(item: &Item, dst: &mut BytesMut) {
    let mut scratch = [0u8; MAX_INT_LEN];
    match item {
        Item::Inline(v) => {
            dst.reserve(v.len() + CRLF.len());
            dst.put_slice(v);
        }
        Item::SimpleString(v) => {
            dst.reserve(1 + v.len() + CRLF.len());
            dst.put_u8(b'+');
            dst.put_slice(v);
        }
        Item::Error(v) => {
            dst.reserve(1 + v.len() + CRLF.len());
            dst.put_u8(b'-');
            dst.put_slice(v);
        }
        Item::Integer(i) => {
            dst.put_u8(b':');
            dst.put_slice(itoa(&mut scratch, *i));
        }
        Item::Bulk(None) => dst.put_slice(b"$-1"),
        Item::Bulk(Some(v)) => {
            dst.reserve(1 + MAX_INT_LEN + v.len() + 2 * CRLF.len());
            dst.put_u8(b'$');
            dst.put_slice(itoa(&mut scratch, v.len() as i64));
            dst.put_slice(CRLF);
            dst.put_slice(v);
        }
        Item::Array(n) => {
            dst.put_u8(b'*');
            dst.put_slice(itoa(&mut scratch, *n));
        }
    }
    dst.put_slice(CRLF);
}

/// Write the decimal form of `val` into the tail of `dst` and return it.
pub fn itoa(dst: &mut [u8; MAX_INT_LEN], val: i64) -> &[u8] {
    let mut n = val.unsigned_abs();
    let mut i = MAX_INT_LEN;
    loop {
        i -= 1;
        dst[i] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    if val < 0 {
        i -= 1;
        dst[i] = b'-';
    }
    &dst[i..]
}

/// Parse an optionally negative decimal integer.
///
/// Only a leading `-` and ASCII digits are accepted, with at least one digit.
/// Values outside the `i64` range are rejected.
pub fn atoi(src: &[u8]) -> Result<i64, ProtocolError> {
    let (negative, digits) = match src.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, src),
    };
    if digits.is_empty() {
        return Err(ProtocolError::InvalidInteger);
    }

    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(ProtocolError::InvalidInteger);
        }
        let digit = i64::from(b - b'0');
        value = value
            .checked_mul(10)
            .and_then(|v| {
                // accumulate negatives downward so i64::MIN fits
                if negative {
                    v.checked_sub(digit)
                } else {
                    v.checked_add(digit)
                }
            })
            .ok_or(ProtocolError::InvalidInteger)?;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoding_table() -> Vec<(Item, &'static [u8])> {
        vec![
            (Item::SimpleString(Bytes::from_static(b"OK")), &b"+OK\r\n"[..]),
            (Item::error("Error message"), &b"-Error message\r\n"[..]),
            (Item::Integer(0), &b":0\r\n"[..]),
            (Item::Integer(1000), &b":1000\r\n"[..]),
            (Item::bulk("foobar"), &b"$6\r\nfoobar\r\n"[..]),
            (Item::bulk(Bytes::new()), &b"$0\r\n\r\n"[..]),
            (Item::Bulk(None), &b"$-1\r\n"[..]),
            (Item::Array(0), &b"*0\r\n"[..]),
            (Item::Array(2), &b"*2\r\n"[..]),
            (Item::Array(-1), &b"*-1\r\n"[..]),
            (Item::Integer(-9223372036854775807), &b":-9223372036854775807\r\n"[..]),
            (Item::Integer(i64::MIN), &b":-9223372036854775808\r\n"[..]),
            (Item::Integer(i64::MAX), &b":9223372036854775807\r\n"[..]),
            (Item::Inline(Bytes::from_static(b"EXISTS somekey")), &b"EXISTS somekey\r\n"[..]),
        ]
    }

    fn split_frame(buf: &[u8], at_eof: bool) -> Frame {
        match split(buf, at_eof) {
            Ok(Split::Frame(frame)) => frame,
            other => panic!("expected a frame for {:?}, got {:?}", String::from_utf8_lossy(buf), other),
        }
    }

    #[test]
    fn encodes_canonical_form() {
        for (item, expected) in encoding_table() {
            assert_eq!(&item.to_bytes()[..], expected, "encoding {item}");
        }
    }

    #[test]
    fn decode_reverses_encode() {
        for (item, encoded) in encoding_table() {
            let raw = Bytes::from_static(encoded);
            let frame = split_frame(&raw, true);
            assert_eq!(frame.len(), encoded.len());
            assert_eq!(frame.to_item(&raw), item);
        }
    }

    #[test]
    fn empty_bulk_decodes_to_present_payload() {
        let raw = Bytes::from_static(b"$0\r\n\r\n");
        let item = split_frame(&raw, true).to_item(&raw);
        assert_eq!(item, Item::Bulk(Some(Bytes::new())));
    }

    #[test]
    fn empty_buffer_needs_more_data() {
        assert_eq!(split(b"", false), Ok(Split::Incomplete));
        assert_eq!(split(b"", true), Ok(Split::Incomplete));
    }

    #[test]
    fn rejects_malformed_frames() {
        let cases: &[(&[u8], ProtocolError)] = &[
            (&b":\n"[..], ProtocolError::InvalidInteger),
            (&b":\0\n"[..], ProtocolError::InvalidInteger),
            (&b":-\r\n"[..], ProtocolError::InvalidInteger),
            (&b":12a\r\n"[..], ProtocolError::InvalidInteger),
            (&b":99999999999999999999\r\n"[..], ProtocolError::InvalidInteger),
            (&b"$-3\n"[..], ProtocolError::InvalidBulkLength),
            (&b"$x\r\n"[..], ProtocolError::InvalidBulkLength),
            (&b"*-2\r\n"[..], ProtocolError::InvalidMultibulkLength),
            (&b"$1\n\0\0\0\0"[..], ProtocolError::BadTerminator),
            (&b"$3\r\nfoo\rx"[..], ProtocolError::BadTerminator),
        ];
        for (input, expected) in cases {
            assert_eq!(split(input, true), Err(*expected), "input {:?}", String::from_utf8_lossy(input));
            assert_eq!(split(input, false), Err(*expected), "input {:?}", String::from_utf8_lossy(input));
        }
    }

    #[test]
    fn truncated_bulk_at_eof_is_fatal() {
        assert_eq!(split(b"$5\r\nab", true), Err(ProtocolError::Incomplete));
        assert_eq!(split(b"$5\r\nab", false), Ok(Split::Incomplete));
    }

    #[test]
    fn oversized_bulk_length_is_rejected() {
        let header = format!("${}\r\n", MAX_BULK_LEN + 1);
        assert_eq!(split(header.as_bytes(), false), Err(ProtocolError::InvalidBulkLength));
    }

    #[test]
    fn unterminated_long_line_is_rejected() {
        let line = vec![b'a'; MAX_INLINE_LEN + 1];
        assert_eq!(split(&line, false), Err(ProtocolError::LineTooLong));
    }

    #[test]
    fn proper_prefixes_are_incomplete() {
        for (item, encoded) in encoding_table() {
            for n in 1..encoded.len() {
                let prefix = &encoded[..n];
                assert_eq!(split(prefix, false), Ok(Split::Incomplete), "prefix {n} of {item}");
                assert_eq!(split(prefix, true), Err(ProtocolError::Incomplete), "prefix {n} of {item}");
            }
        }
    }

    #[test]
    fn accepts_bare_line_feeds() {
        let raw = Bytes::from_static(b"$0\n\n");
        let frame = split_frame(&raw, true);
        assert_eq!(frame.len(), 4);
        assert_eq!(frame.to_item(&raw), Item::bulk(Bytes::new()));

        let raw = Bytes::from_static(b"+OK\nrest");
        let frame = split_frame(&raw, false);
        assert_eq!(frame.len(), 4);
        assert_eq!(frame.to_item(&raw), Item::SimpleString(Bytes::from_static(b"OK")));
    }

    #[test]
    fn bulk_payload_is_binary_safe() {
        let raw = Bytes::from_static(b"$4\r\na\r\nb\r\n");
        let frame = split_frame(&raw, true);
        assert_eq!(frame.to_item(&raw), Item::bulk(&b"a\r\nb"[..]));
    }

    #[test]
    fn scans_back_to_back_frames() {
        let table = encoding_table();
        let mut stream = BytesMut::new();
        for _ in 0..100 {
            for (_, encoded) in &table {
                stream.extend_from_slice(encoded);
            }
        }

        let mut scanned = 0;
        while let Some((raw, item)) = try_decode_item(&mut stream, true).unwrap() {
            let (expected_item, expected_raw) = &table[scanned % table.len()];
            assert_eq!(&raw[..], *expected_raw);
            assert_eq!(&item, expected_item);
            scanned += 1;
        }
        assert_eq!(scanned, 100 * table.len());
        assert!(stream.is_empty());
    }

    #[test]
    fn atoi_bounds() {
        assert_eq!(atoi(b"0"), Ok(0));
        assert_eq!(atoi(b"-0"), Ok(0));
        assert_eq!(atoi(b"-9223372036854775808"), Ok(i64::MIN));
        assert_eq!(atoi(b"9223372036854775808"), Err(ProtocolError::InvalidInteger));
        assert_eq!(atoi(b""), Err(ProtocolError::InvalidInteger));
        assert_eq!(atoi(b"+1"), Err(ProtocolError::InvalidInteger));
        assert_eq!(atoi(b"1-"), Err(ProtocolError::InvalidInteger));
    }

    #[test]
    fn itoa_uses_fixed_scratch() {
        let mut scratch = [0u8; MAX_INT_LEN];
        assert_eq!(itoa(&mut scratch, 0), b"0");
        assert_eq!(itoa(&mut scratch, -42), b"-42");
        assert_eq!(itoa(&mut scratch, i64::MIN), b"-9223372036854775808");
    }
}

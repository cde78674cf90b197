//! BER-TLV codec, restricted to the definite-length subset PIV uses
//!
//! Tags are one byte, or two bytes when the first byte's low five bits are
//! all set (the public-key template `7F 49` is the common case). Lengths
//! use the short form below 0x80 and the `81`/`82`/`83` long forms up to
//! 0xFFFFFF. The indefinite form (`0x80`) and longer length fields are
//! rejected outright.

use std::collections::BTreeMap;
use std::fmt;

use crate::prelude::*;

/// A BER-TLV tag, one or two bytes on the wire.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(u16);

impl Tag {
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    fn write(self, out: &mut Vec<u8>) {
        if self.0 > 0xFF {
            out.push((self.0 >> 8) as u8);
        }
        out.push(self.0 as u8);
    }
}

impl From<u8> for Tag {
    fn from(b: u8) -> Self {
        Self(b as u16)
    }
}

impl From<u16> for Tag {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 > 0xFF {
            write!(f, "Tag({:#06X})", self.0)
        } else {
            write!(f, "Tag({:#04X})", self.0)
        }
    }
}

/// Append one TLV to `out`. Fails only when `value` exceeds the 0xFFFFFF
/// ceiling of the three-byte long form.
pub fn encode_into(out: &mut Vec<u8>, tag: impl Into<Tag>, value: &[u8]) -> Result<()> {
    tag.into().write(out);
    write_length(out, value.len())?;
    out.extend_from_slice(value);
    Ok(())
}

/// Encode one TLV as a fresh buffer.
pub fn encode(tag: impl Into<Tag>, value: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(value.len() + 5);
    encode_into(&mut out, tag, value)?;
    Ok(out)
}

pub(crate) fn write_length(out: &mut Vec<u8>, len: usize) -> Result<()> {
    match len {
        0..=0x7F => out.push(len as u8),
        0x80..=0xFF => {
            out.push(0x81);
            out.push(len as u8);
        }
        0x100..=0xFFFF => {
            out.push(0x82);
            out.push((len >> 8) as u8);
            out.push(len as u8);
        }
        0x1_0000..=0xFF_FFFF => {
            out.push(0x83);
            out.push((len >> 16) as u8);
            out.push((len >> 8) as u8);
            out.push(len as u8);
        }
        _ => {
            return Err(Error::invalid_argument(
                "value",
                format!("TLV value of {len} bytes exceeds the 3-byte length form"),
            ))
        }
    }
    Ok(())
}

/// Iterate the TLVs in `buf`. Each item is `(tag, value_slice)`; decoding
/// errors (truncation, indefinite length) surface as `Err` items and end
/// the iteration.
pub fn iter(buf: &[u8]) -> TlvIter<'_> {
    TlvIter { rest: buf }
}

pub struct TlvIter<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = Result<(Tag, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        match read_tlv(self.rest) {
            Ok((tag, value, rest)) => {
                self.rest = rest;
                Some(Ok((tag, value)))
            }
            Err(e) => {
                // Poison the iterator so a bad byte cannot loop forever.
                self.rest = &[];
                Some(Err(e))
            }
        }
    }
}

fn read_tlv(buf: &[u8]) -> Result<(Tag, &[u8], &[u8])> {
    let (tag, rest) = read_tag(buf)?;
    let (len, rest) = read_length(rest)?;
    if rest.len() < len {
        return Err(Error::protocol(format!(
            "TLV {tag:?} claims {len} bytes but only {} remain",
            rest.len()
        )));
    }
    Ok((tag, &rest[..len], &rest[len..]))
}

fn read_tag(buf: &[u8]) -> Result<(Tag, &[u8])> {
    let first = *buf.first().ok_or_else(|| Error::protocol("empty TLV"))?;
    if first & 0x1F == 0x1F {
        // Two-byte tag; PIV never nests deeper.
        let second = *buf
            .get(1)
            .ok_or_else(|| Error::protocol("truncated two-byte TLV tag"))?;
        Ok((Tag::new(((first as u16) << 8) | second as u16), &buf[2..]))
    } else {
        Ok((Tag::from(first), &buf[1..]))
    }
}

fn read_length(buf: &[u8]) -> Result<(usize, &[u8])> {
    let first = *buf
        .first()
        .ok_or_else(|| Error::protocol("TLV truncated before length"))?;
    match first {
        0..=0x7F => Ok((first as usize, &buf[1..])),
        0x80 => Err(Error::protocol("BER indefinite length is not allowed")),
        0x81..=0x83 => {
            let n = (first - 0x80) as usize;
            if buf.len() < 1 + n {
                return Err(Error::protocol("TLV length field truncated"));
            }
            let mut len = 0usize;
            for &b in &buf[1..1 + n] {
                len = (len << 8) | b as usize;
            }
            Ok((len, &buf[1 + n..]))
        }
        _ => Err(Error::protocol(format!(
            "unsupported TLV length byte {first:#04X}"
        ))),
    }
}

/// Read the first TLV in `buf`, requiring `tag`. Trailing bytes after the
/// TLV are ignored; a different tag is an error.
pub fn read_single(buf: &[u8], tag: impl Into<Tag>) -> Result<&[u8]> {
    let expected = tag.into();
    let (found, value, _) = read_tlv(buf)?;
    if found != expected {
        return Err(Error::protocol(format!(
            "expected {expected:?}, device sent {found:?}"
        )));
    }
    Ok(value)
}

/// Decode `buf` into a tag → value map. Tag order is irrelevant to every
/// caller of this helper; duplicate tags take the last occurrence.
pub fn tag_map(buf: &[u8]) -> Result<BTreeMap<u16, &[u8]>> {
    let mut map = BTreeMap::new();
    for item in iter(buf) {
        let (tag, value) = item?;
        map.insert(tag.raw(), value);
    }
    Ok(map)
}

use bytes::{Buf, BufMut, BytesMut};
use rmp::Marker;
use rmpv::Value as Raw;

use crate::error::{FrameError, Result};
use crate::message::OutgoingMessage;
#[cfg(feature = "async")]
use crate::message::IncomingMessage;

/// Default maximum size of a single buffered message: 64 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Configuration for the message codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest message the decoder will buffer before giving up. Default: 64 MiB.
    pub max_message_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Encode a message as `[kind, {fields}]` MessagePack.
///
/// Messages are not length-prefixed; MessagePack is self-delimiting.
pub fn encode_message(message: &OutgoingMessage, dst: &mut BytesMut) -> Result<()> {
    encode_raw(&message.to_value(), dst)
}

/// Encode any MessagePack value onto the buffer.
pub fn encode_raw(value: &Raw, dst: &mut BytesMut) -> Result<()> {
    let mut writer = dst.writer();
    rmpv::encode::write_value(&mut writer, value)
        .map_err(|e| FrameError::Msgpack(e.to_string()))
}

/// Decode one MessagePack value from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't hold a complete value yet, leaving
/// the buffer untouched. On success, consumes exactly the value's bytes.
pub fn decode_value(src: &mut BytesMut, max_message_size: usize) -> Result<Option<Raw>> {
    match decode_progress(src, max_message_size)? {
        Progress::Value(value) => Ok(Some(value)),
        Progress::Need(_) => Ok(None),
    }
}

enum Progress {
    Value(Raw),
    /// At least this many bytes must be buffered before the value can finish.
    Need(usize),
}

fn decode_progress(src: &mut BytesMut, max_message_size: usize) -> Result<Progress> {
    let len = match scan(src)? {
        Scan::Complete(len) => len,
        Scan::Incomplete(need) => {
            if need > max_message_size {
                return Err(FrameError::MessageTooLarge {
                    size: need,
                    max: max_message_size,
                });
            }
            return Ok(Progress::Need(need));
        }
    };
    if len > max_message_size {
        return Err(FrameError::MessageTooLarge {
            size: len,
            max: max_message_size,
        });
    }

    let mut frame = &src[..len];
    let value =
        rmpv::decode::read_value(&mut frame).map_err(|e| FrameError::Msgpack(e.to_string()))?;
    src.advance(len);
    Ok(Progress::Value(value))
}

#[derive(Debug, PartialEq, Eq)]
enum Scan {
    Complete(usize),
    Incomplete(usize),
}

enum Header {
    /// Fixed number of bytes after the marker.
    Fixed(usize),
    /// Big-endian length of `width` bytes, then `extra` + length body bytes.
    Sized { width: usize, extra: usize },
    /// Big-endian count of `width` bytes, then `per` values per counted item.
    Items { width: usize, per: u64 },
}

/// Walk MessagePack headers to find where the first value ends, without
/// building it. Bodies of strings, binaries and extensions are skipped.
fn scan(src: &[u8]) -> Result<Scan> {
    let mut pos = 0usize;
    let mut remaining: u64 = 1;
    while remaining > 0 {
        remaining -= 1;
        let Some(&byte) = src.get(pos) else {
            return Ok(Scan::Incomplete(pos + 1));
        };
        pos += 1;
        let header = match Marker::from_u8(byte) {
            Marker::FixPos(_) | Marker::FixNeg(_) | Marker::Null | Marker::True | Marker::False => {
                Header::Fixed(0)
            }
            Marker::U8 | Marker::I8 => Header::Fixed(1),
            Marker::U16 | Marker::I16 | Marker::FixExt1 => Header::Fixed(2),
            Marker::FixExt2 => Header::Fixed(3),
            Marker::U32 | Marker::I32 | Marker::F32 => Header::Fixed(4),
            Marker::FixExt4 => Header::Fixed(5),
            Marker::U64 | Marker::I64 | Marker::F64 => Header::Fixed(8),
            Marker::FixExt8 => Header::Fixed(9),
            Marker::FixExt16 => Header::Fixed(17),
            Marker::FixStr(n) => Header::Fixed(usize::from(n)),
            Marker::Str8 | Marker::Bin8 => Header::Sized { width: 1, extra: 0 },
            Marker::Str16 | Marker::Bin16 => Header::Sized { width: 2, extra: 0 },
            Marker::Str32 | Marker::Bin32 => Header::Sized { width: 4, extra: 0 },
            Marker::Ext8 => Header::Sized { width: 1, extra: 1 },
            Marker::Ext16 => Header::Sized { width: 2, extra: 1 },
            Marker::Ext32 => Header::Sized { width: 4, extra: 1 },
            Marker::FixArray(n) => {
                remaining += u64::from(n);
                Header::Fixed(0)
            }
            Marker::FixMap(n) => {
                remaining += 2 * u64::from(n);
                Header::Fixed(0)
            }
            Marker::Array16 => Header::Items { width: 2, per: 1 },
            Marker::Array32 => Header::Items { width: 4, per: 1 },
            Marker::Map16 => Header::Items { width: 2, per: 2 },
            Marker::Map32 => Header::Items { width: 4, per: 2 },
            Marker::Reserved => {
                return Err(FrameError::Msgpack(format!("reserved marker {byte:#04x}")))
            }
        };
        match header {
            Header::Fixed(n) => pos += n,
            Header::Sized { width, extra } => {
                let Some(len) = read_length(src, pos, width) else {
                    return Ok(Scan::Incomplete(pos + width));
                };
                pos = pos.saturating_add(width + extra).saturating_add(len);
            }
            Header::Items { width, per } => {
                let Some(count) = read_length(src, pos, width) else {
                    return Ok(Scan::Incomplete(pos + width));
                };
                pos += width;
                remaining += per * count as u64;
            }
        }
        if pos > src.len() {
            return Ok(Scan::Incomplete(pos));
        }
    }
    Ok(Scan::Complete(pos))
}

fn read_length(src: &[u8], pos: usize, width: usize) -> Option<usize> {
    let bytes = src.get(pos..pos + width)?;
    Some(
        bytes
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | usize::from(b)),
    )
}

/// Host-side codec for a Pkl server's stdio.
///
/// Decodes [`IncomingMessage`]s and encodes [`OutgoingMessage`]s. A record
/// that parses as MessagePack but not as a known message is yielded as
/// `Some(Err(..))`, so the stream keeps going; only stream-level failures are
/// returned as codec errors.
#[cfg(feature = "async")]
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    config: FrameConfig,
    /// Buffered length below which the pending message cannot be complete.
    needed: usize,
}

#[cfg(feature = "async")]
impl MessageCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self { config, needed: 0 }
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Decoder for MessageCodec {
    type Item = Result<IncomingMessage>;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.is_empty() || src.len() < self.needed {
            return Ok(None);
        }
        match decode_progress(src, self.config.max_message_size)? {
            Progress::Value(raw) => {
                self.needed = 0;
                Ok(Some(IncomingMessage::from_value(raw)))
            }
            Progress::Need(needed) => {
                self.needed = needed;
                src.reserve(needed - src.len());
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Encoder<OutgoingMessage> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, item: OutgoingMessage, dst: &mut BytesMut) -> Result<()> {
        encode_message(&item, dst)
    }
}

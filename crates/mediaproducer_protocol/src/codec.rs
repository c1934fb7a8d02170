//! Length-prefixed framing for strings and the file size field.
//!
//! Strings are `[LEN:2][BYTES:LEN]` with LEN counting encoded bytes, not
//! characters. The size field is a big-endian `i64`.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use serde::Serialize;
use std::io::{self, Read, Write};
#[cfg(feature = "async")]
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ProtocolError, Result};

/// Largest encoded string the 2-byte length prefix can describe.
pub const MAX_STRING_BYTES: usize = u16::MAX as usize;

/// Width of the string length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Width of the file size field.
pub const SIZE_FIELD_SIZE: usize = 8;

/// How string bodies are turned into bytes.
///
/// `ModifiedUtf8` is the form legacy consumers expect: U+0000 becomes the
/// overlong pair `0xC0 0x80`, and characters above U+FFFF are written as two
/// UTF-16 surrogates, each as its own three-byte sequence. `Utf8` is plain
/// UTF-8 for consumers that do not need that compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StringEncoding {
    #[default]
    ModifiedUtf8,
    Utf8,
}

impl StringEncoding {
    /// Encode a string body (no prefix), enforcing the 65535-byte limit.
    pub fn encode(self, s: &str) -> Result<Vec<u8>> {
        let bytes = match self {
            StringEncoding::ModifiedUtf8 => encode_modified_utf8(s),
            StringEncoding::Utf8 => s.as_bytes().to_vec(),
        };
        if bytes.len() > MAX_STRING_BYTES {
            return Err(ProtocolError::EncodingTooLarge {
                len: bytes.len(),
                max: MAX_STRING_BYTES,
            });
        }
        Ok(bytes)
    }

    /// Decode a string body previously sized by its length prefix.
    pub fn decode(self, bytes: &[u8]) -> Result<String> {
        match self {
            StringEncoding::ModifiedUtf8 => decode_modified_utf8(bytes),
            StringEncoding::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|e| ProtocolError::MalformedString(e.to_string())),
        }
    }
}

/// Encode `s` as a complete frame: length prefix followed by the body.
pub fn encode_string(s: &str, encoding: StringEncoding) -> Result<Vec<u8>> {
    let body = encoding.encode(s)?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    frame.write_u16::<BigEndian>(body.len() as u16)?;
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Write a string frame, returning the number of bytes written.
pub fn write_string<W: Write>(w: &mut W, s: &str, encoding: StringEncoding) -> Result<usize> {
    let frame = encode_string(s, encoding)?;
    w.write_all(&frame)?;
    Ok(frame.len())
}

/// Read one string frame.
///
/// A stream that ends before the first prefix byte gives `EndOfStream`; one
/// that ends inside the frame gives `TruncatedStream`.
pub fn read_string<R: Read>(r: &mut R, encoding: StringEncoding) -> Result<String> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    read_full(r, &mut prefix).map_err(frame_start)?;
    let mut body = vec![0u8; decode_length(&prefix)];
    read_full(r, &mut body)?;
    encoding.decode(&body)
}

/// Async form of [`read_string`], same errors.
#[cfg(feature = "async")]
pub async fn read_string_async<R>(r: &mut R, encoding: StringEncoding) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    read_full_async(r, &mut prefix).await.map_err(frame_start)?;
    let mut body = vec![0u8; decode_length(&prefix)];
    read_full_async(r, &mut body).await?;
    encoding.decode(&body)
}

/// Interpret a 2-byte length prefix.
pub fn decode_length(prefix: &[u8; LENGTH_PREFIX_SIZE]) -> usize {
    BigEndian::read_u16(prefix) as usize
}

/// Encode a file size as the 8-byte signed big-endian field.
pub fn encode_size(size: u64) -> Result<[u8; SIZE_FIELD_SIZE]> {
    let signed = i64::try_from(size).map_err(|_| ProtocolError::SizeOutOfRange(size))?;
    let mut buf = [0u8; SIZE_FIELD_SIZE];
    BigEndian::write_i64(&mut buf, signed);
    Ok(buf)
}

pub fn write_size<W: Write>(w: &mut W, size: u64) -> Result<()> {
    w.write_all(&encode_size(size)?)?;
    Ok(())
}

pub fn read_size<R: Read>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; SIZE_FIELD_SIZE];
    read_full(r, &mut buf)?;
    decode_size(&buf)
}

#[cfg(feature = "async")]
pub async fn read_size_async<R>(r: &mut R) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; SIZE_FIELD_SIZE];
    read_full_async(r, &mut buf).await?;
    decode_size(&buf)
}

fn decode_size(buf: &[u8; SIZE_FIELD_SIZE]) -> Result<u64> {
    let signed = BigEndian::read_i64(buf);
    u64::try_from(signed).map_err(|_| ProtocolError::NegativeSize(signed))
}

/// Nothing of the frame arrived: the peer closed cleanly between frames.
fn frame_start(err: ProtocolError) -> ProtocolError {
    match err {
        ProtocolError::TruncatedStream { got: 0, .. } => ProtocolError::EndOfStream,
        other => other,
    }
}

/// Fill `buf` completely, looping over short reads.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut got = 0;
    while got < buf.len() {
        match r.read(&mut buf[got..]) {
            Ok(0) => {
                return Err(ProtocolError::TruncatedStream {
                    expected: buf.len(),
                    got,
                })
            }
            Ok(n) => got += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(feature = "async")]
async fn read_full_async<R>(r: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut got = 0;
    while got < buf.len() {
        match r.read(&mut buf[got..]).await {
            Ok(0) => {
                return Err(ProtocolError::TruncatedStream {
                    expected: buf.len(),
                    got,
                })
            }
            Ok(n) => got += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let lead = bytes[i];
        match lead >> 4 {
            0..=7 => {
                units.push(lead as u16);
                i += 1;
            }
            12 | 13 => {
                let b2 = continuation(bytes, i + 1)?;
                units.push(((lead as u16 & 0x1F) << 6) | (b2 as u16 & 0x3F));
                i += 2;
            }
            14 => {
                let b2 = continuation(bytes, i + 1)?;
                let b3 = continuation(bytes, i + 2)?;
                units.push(
                    ((lead as u16 & 0x0F) << 12) | ((b2 as u16 & 0x3F) << 6) | (b3 as u16 & 0x3F),
                );
                i += 3;
            }
            _ => {
                return Err(ProtocolError::MalformedString(format!(
                    "invalid lead byte 0x{lead:02X} at offset {i}"
                )))
            }
        }
    }
    String::from_utf16(&units)
        .map_err(|_| ProtocolError::MalformedString("unpaired surrogate".to_string()))
}

fn continuation(bytes: &[u8], idx: usize) -> Result<u8> {
    match bytes.get(idx) {
        Some(&b) if b & 0xC0 == 0x80 => Ok(b),
        Some(&b) => Err(ProtocolError::MalformedString(format!(
            "expected continuation byte at offset {idx}, got 0x{b:02X}"
        ))),
        None => Err(ProtocolError::MalformedString(
            "partial character at end of input".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_string_roundtrip_both_encodings() {
        let samples = ["", "clip.mp4", "naïve café.mov", "a\0b", "日本語.mkv", "🎬 take 2.avi"];
        for encoding in [StringEncoding::ModifiedUtf8, StringEncoding::Utf8] {
            for s in samples {
                let frame = encode_string(s, encoding).unwrap();
                let decoded = read_string(&mut Cursor::new(frame), encoding).unwrap();
                assert_eq!(decoded, s, "{:?} roundtrip failed for {:?}", encoding, s);
            }
        }
    }

    #[test]
    fn test_length_counts_bytes_not_chars() {
        let frame = encode_string("é", StringEncoding::Utf8).unwrap();
        assert_eq!(&frame[..2], &[0x00, 0x02]);
        assert_eq!(frame.len(), 4);
    }

    #[test]
    fn test_modified_utf8_never_emits_nul() {
        let body = StringEncoding::ModifiedUtf8.encode("\0\0").unwrap();
        assert_eq!(body, vec![0xC0, 0x80, 0xC0, 0x80]);
    }

    #[test]
    fn test_encoding_too_large() {
        let at_limit = "a".repeat(MAX_STRING_BYTES);
        assert!(encode_string(&at_limit, StringEncoding::Utf8).is_ok());

        let over = "a".repeat(MAX_STRING_BYTES + 1);
        let err = encode_string(&over, StringEncoding::Utf8).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::EncodingTooLarge { len, max } if len == MAX_STRING_BYTES + 1 && max == MAX_STRING_BYTES
        ));
    }

    #[test]
    fn test_limit_applies_to_encoded_form() {
        // 21846 * 3 bytes = 65538, over the limit although only 21846 chars
        let s = "€".repeat(21_846);
        assert!(matches!(
            encode_string(&s, StringEncoding::ModifiedUtf8),
            Err(ProtocolError::EncodingTooLarge { .. })
        ));
    }

    #[test]
    fn test_truncated_prefix() {
        let err = read_string(&mut Cursor::new(vec![0x00]), StringEncoding::Utf8).unwrap_err();
        assert!(matches!(err, ProtocolError::TruncatedStream { expected: 2, got: 1 }));
    }

    #[test]
    fn test_empty_stream_is_end_of_stream() {
        let err = read_string(&mut Cursor::new(Vec::new()), StringEncoding::Utf8).unwrap_err();
        assert!(matches!(err, ProtocolError::EndOfStream));
        assert!(!err.is_truncation());
    }

    #[test]
    fn test_truncated_body() {
        let data = vec![0x00, 0x07, b'S', b'U', b'C'];
        let err = read_string(&mut Cursor::new(data), StringEncoding::Utf8).unwrap_err();
        assert!(matches!(err, ProtocolError::TruncatedStream { expected: 7, got: 3 }));
        assert!(err.is_truncation());
    }

    #[test]
    fn test_malformed_modified_utf8() {
        // 4-byte UTF-8 lead is not valid in modified UTF-8
        let err = StringEncoding::ModifiedUtf8
            .decode(&[0xF0, 0x9F, 0x8E, 0xAC])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedString(_)));

        // lone high surrogate
        let err = StringEncoding::ModifiedUtf8
            .decode(&[0xED, 0xA0, 0xBD])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedString(_)));
    }

    #[test]
    fn test_size_roundtrip() {
        for size in [0u64, 1, 4096, u32::MAX as u64 + 1, i64::MAX as u64] {
            let mut buf = Vec::new();
            write_size(&mut buf, size).unwrap();
            assert_eq!(buf.len(), SIZE_FIELD_SIZE);
            assert_eq!(read_size(&mut Cursor::new(buf)).unwrap(), size);
        }
    }

    #[test]
    fn test_size_out_of_range() {
        assert!(matches!(
            encode_size(i64::MAX as u64 + 1),
            Err(ProtocolError::SizeOutOfRange(_))
        ));
    }

    #[test]
    fn test_negative_size_rejected() {
        let buf = (-1i64).to_be_bytes();
        assert!(matches!(
            read_size(&mut Cursor::new(buf)),
            Err(ProtocolError::NegativeSize(-1))
        ));
    }

    /// Reader that hands out one byte per call.
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(1);
            std::io::Read::read(&mut self.0, &mut buf[..n])
        }
    }

    #[test]
    fn test_short_reads_are_completed() {
        let mut data = encode_string("QUEUE_FULL", StringEncoding::ModifiedUtf8).unwrap();
        data.extend_from_slice(&encode_size(123_456).unwrap());
        let mut reader = Trickle(Cursor::new(data));
        assert_eq!(
            read_string(&mut reader, StringEncoding::ModifiedUtf8).unwrap(),
            "QUEUE_FULL"
        );
        assert_eq!(read_size(&mut reader).unwrap(), 123_456);
    }

    #[cfg(feature = "async")]
    mod nonblocking {
        use super::*;

        #[tokio::test]
        async fn test_async_truncated_reply() {
            let data = vec![0x00, 0x07, b'S', b'U', b'C'];
            let err = read_string_async(&mut data.as_slice(), StringEncoding::ModifiedUtf8)
                .await
                .unwrap_err();
            assert!(matches!(err, ProtocolError::TruncatedStream { expected: 7, got: 3 }));
        }

        #[tokio::test]
        async fn test_async_empty_stream() {
            let err = read_string_async(&mut &b""[..], StringEncoding::ModifiedUtf8)
                .await
                .unwrap_err();
            assert!(matches!(err, ProtocolError::EndOfStream));
        }

        #[tokio::test]
        async fn test_async_frames_in_sequence() {
            let mut data = encode_string("DUPLICATE_FILE", StringEncoding::ModifiedUtf8).unwrap();
            data.extend_from_slice(&encode_size(7).unwrap());
            let mut reader = data.as_slice();
            assert_eq!(
                read_string_async(&mut reader, StringEncoding::ModifiedUtf8)
                    .await
                    .unwrap(),
                "DUPLICATE_FILE"
            );
            assert_eq!(read_size_async(&mut reader).await.unwrap(), 7);
            assert!(reader.is_empty());
        }

        #[tokio::test]
        async fn test_async_negative_size() {
            let buf = (-5i64).to_be_bytes();
            assert!(matches!(
                read_size_async(&mut &buf[..]).await,
                Err(ProtocolError::NegativeSize(-5))
            ));
        }
    }
}

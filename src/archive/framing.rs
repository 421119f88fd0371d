//! Length-prefixed, checksummed record framing for the archive file.
//!
//! ```text
//! | magic "MREC" (4) | version u16 LE | length u32 LE | payload crc32 u32 LE | header crc32 u32 LE | payload |
//! ```
//!
//! The header checksum covers the first 14 header bytes, so a damaged
//! length field is detected before it is trusted. A frame is written with
//! a single `write_all`, so a crash can only leave a prefix of the final
//! frame (or, on some file systems, a zero-filled tail). Both shapes are
//! reported as [`Frame::Torn`]; every other defect is
//! [`FrameError::Corrupt`].

use std::io::{self, BufRead};

pub(crate) const MAGIC: [u8; 4] = *b"MREC";
pub(crate) const SCHEMA_VERSION: u16 = 1;
pub(crate) const HEADER_LEN: usize = 18;
const CHECKED_HEADER_LEN: usize = 14;
pub(crate) const MAX_PAYLOAD_LEN: usize = 1 << 30;

/// Length field for a payload of `len` bytes, `None` above the limit
/// enforced on decode.
pub(crate) fn frame_len(len: usize) -> Option<u32> {
    if len > MAX_PAYLOAD_LEN {
        return None;
    }
    u32::try_from(len).ok()
}

/// Encodes one payload as a complete frame. `None` if the payload is
/// larger than [`MAX_PAYLOAD_LEN`].
pub(crate) fn encode_frame(payload: &[u8]) -> Option<Vec<u8>> {
    let len = frame_len(payload.len())?;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&MAGIC);
    frame.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&crc32(payload).to_le_bytes());
    let header_crc = crc32(&frame[..CHECKED_HEADER_LEN]);
    frame.extend_from_slice(&header_crc.to_le_bytes());
    frame.extend_from_slice(payload);
    Some(frame)
}

#[derive(Debug)]
pub(crate) enum Frame {
    /// A complete, checksum-verified payload.
    Record(Vec<u8>),
    /// Clean end of stream at a frame boundary.
    End,
    /// Partially written trailing frame starting at `offset`.
    Torn { offset: u64, reason: String },
}

#[derive(Debug)]
pub(crate) enum FrameError {
    Io(io::Error),
    Corrupt { offset: u64, reason: String },
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        FrameError::Io(e)
    }
}

/// Sequential frame decoder. `offset` is the start of the next frame.
#[derive(Debug)]
pub(crate) struct FrameReader<R> {
    inner: R,
    offset: u64,
}

impl<R: BufRead> FrameReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    /// Byte offset just past the last complete frame returned.
    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn next_frame(&mut self) -> Result<Frame, FrameError> {
        let start = self.offset;
        let mut header = [0u8; HEADER_LEN];
        let got = read_full(&mut self.inner, &mut header)?;
        if got == 0 {
            return Ok(Frame::End);
        }
        if got < HEADER_LEN {
            return self.torn_or_corrupt(start, &header[..got], "header cut short");
        }

        if header[..4] != MAGIC {
            return self.torn_or_corrupt(start, &header, "bad record magic");
        }
        let header_crc = u32::from_le_bytes([header[14], header[15], header[16], header[17]]);
        if crc32(&header[..CHECKED_HEADER_LEN]) != header_crc {
            if self.inner.fill_buf()?.is_empty() {
                return Ok(Frame::Torn {
                    offset: start,
                    reason: "header checksum mismatch in final record".into(),
                });
            }
            return Err(FrameError::Corrupt {
                offset: start,
                reason: "header checksum mismatch".into(),
            });
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != SCHEMA_VERSION {
            return Err(FrameError::Corrupt {
                offset: start,
                reason: format!("unsupported record schema version {version}"),
            });
        }
        let len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]);
        let checksum = u32::from_le_bytes([header[10], header[11], header[12], header[13]]);
        if len as usize > MAX_PAYLOAD_LEN {
            return Err(FrameError::Corrupt {
                offset: start,
                reason: format!("record length {len} exceeds limit"),
            });
        }

        let mut payload = vec![0u8; len as usize];
        let got = read_full(&mut self.inner, &mut payload)?;
        if got < payload.len() {
            return Ok(Frame::Torn {
                offset: start,
                reason: format!("payload cut short: {got} of {len} bytes"),
            });
        }

        if crc32(&payload) != checksum {
            if self.inner.fill_buf()?.is_empty() {
                return Ok(Frame::Torn {
                    offset: start,
                    reason: "checksum mismatch in final record".into(),
                });
            }
            return Err(FrameError::Corrupt {
                offset: start,
                reason: "checksum mismatch".into(),
            });
        }

        self.offset = start + (HEADER_LEN + payload.len()) as u64;
        Ok(Frame::Record(payload))
    }

    /// A defect is a torn tail only if nothing but zero bytes follow it.
    fn torn_or_corrupt(
        &mut self,
        start: u64,
        seen: &[u8],
        reason: &str,
    ) -> Result<Frame, FrameError> {
        let prefix_of_magic = seen.len() < MAGIC.len() && MAGIC.starts_with(seen);
        let partial_header = seen.len() < HEADER_LEN && seen.starts_with(&MAGIC);
        if prefix_of_magic || partial_header {
            return Ok(Frame::Torn {
                offset: start,
                reason: reason.to_string(),
            });
        }
        if seen.iter().all(|&b| b == 0) && self.rest_is_zero()? {
            return Ok(Frame::Torn {
                offset: start,
                reason: "zero-filled tail".into(),
            });
        }
        Err(FrameError::Corrupt {
            offset: start,
            reason: reason.to_string(),
        })
    }

    fn rest_is_zero(&mut self) -> io::Result<bool> {
        loop {
            let buf = self.inner.fill_buf()?;
            if buf.is_empty() {
                return Ok(true);
            }
            if buf.iter().any(|&b| b != 0) {
                return Ok(false);
            }
            let n = buf.len();
            self.inner.consume(n);
        }
    }
}

/// Reads until `buf` is full or EOF; returns the number of bytes read.
fn read_full<R: BufRead>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

const CRC_TABLE: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

/// CRC-32 (IEEE 802.3, reflected), as used by zip and PNG.
pub(crate) fn crc32(bytes: &[u8]) -> u32 {
    let mut c = 0xFFFF_FFFFu32;
    for &b in bytes {
        c = CRC_TABLE[((c ^ b as u32) & 0xFF) as usize] ^ (c >> 8);
    }
    c ^ 0xFFFF_FFFF
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frames(payloads: &[&[u8]]) -> Vec<u8> {
        payloads
            .iter()
            .flat_map(|p| encode_frame(p).unwrap())
            .collect()
    }

    fn decode_all(bytes: &[u8]) -> (Vec<Vec<u8>>, Result<Frame, FrameError>) {
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let mut out = Vec::new();
        loop {
            match reader.next_frame() {
                Ok(Frame::Record(p)) => out.push(p),
                other => return (out, other),
            }
        }
    }

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_every_cut_is_torn_or_clean() {
        let bytes = frames(&[b"alpha", b"{\"x\":[1.0]}", b""]);
        let boundaries = [0, HEADER_LEN + 5, 2 * HEADER_LEN + 16, bytes.len()];
        for cut in 0..=bytes.len() {
            let (records, tail) = decode_all(&bytes[..cut]);
            let complete = boundaries.iter().filter(|&&b| b <= cut).count() - 1;
            assert_eq!(records.len(), complete, "cut at {cut}");
            match tail {
                Ok(Frame::End) => assert!(boundaries.contains(&cut), "cut at {cut}"),
                Ok(Frame::Torn { offset, .. }) => {
                    assert_eq!(offset as usize, boundaries[complete], "cut at {cut}")
                }
                other => panic!("cut at {cut}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_flipped_byte_in_middle_is_corrupt() {
        let mut bytes = frames(&[b"first", b"second", b"third"]);
        bytes[HEADER_LEN + 2] ^= 0x40;
        let (records, tail) = decode_all(&bytes);
        assert!(records.is_empty());
        assert!(matches!(tail, Err(FrameError::Corrupt { offset: 0, .. })));
    }

    #[test]
    fn test_flipped_byte_in_final_record_is_torn() {
        let mut bytes = frames(&[b"first", b"second"]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let (records, tail) = decode_all(&bytes);
        assert_eq!(records, vec![b"first".to_vec()]);
        assert!(matches!(tail, Ok(Frame::Torn { .. })));
    }

    #[test]
    fn test_zero_filled_tail_is_torn() {
        let mut bytes = frames(&[b"first"]);
        bytes.extend(std::iter::repeat(0u8).take(4096));
        let (records, tail) = decode_all(&bytes);
        assert_eq!(records.len(), 1);
        assert!(matches!(tail, Ok(Frame::Torn { offset, .. }) if offset as usize == HEADER_LEN + 5));
    }

    #[test]
    fn test_garbage_after_records_is_corrupt() {
        let mut bytes = frames(&[b"first"]);
        bytes.extend_from_slice(b"not a frame at all");
        let (_, tail) = decode_all(&bytes);
        assert!(matches!(tail, Err(FrameError::Corrupt { .. })));
    }

    #[test]
    fn test_unknown_version_is_corrupt() {
        let mut bytes = frames(&[b"first"]);
        bytes[4] = 9;
        let header_crc = crc32(&bytes[..CHECKED_HEADER_LEN]);
        bytes[CHECKED_HEADER_LEN..HEADER_LEN].copy_from_slice(&header_crc.to_le_bytes());
        let (_, tail) = decode_all(&bytes);
        assert!(matches!(
            tail,
            Err(FrameError::Corrupt { ref reason, .. }) if reason.contains("version")
        ));
    }

    #[test]
    fn test_damaged_length_in_middle_record_is_corrupt() {
        let mut bytes = frames(&[b"first", b"second", b"third"]);
        let second = HEADER_LEN + 5;
        // Length now points far past the end of the file.
        bytes[second + 9] ^= 0x10;
        let (records, tail) = decode_all(&bytes);
        assert_eq!(records, vec![b"first".to_vec()]);
        assert!(matches!(
            tail,
            Err(FrameError::Corrupt { offset, ref reason })
                if offset as usize == second && reason.contains("header checksum")
        ));
    }

    #[test]
    fn test_damaged_header_of_final_record_is_torn() {
        let mut bytes = frames(&[b"first", b"second"]);
        let second = HEADER_LEN + 5;
        bytes[second + 6] ^= 0x01;
        bytes.truncate(second + HEADER_LEN);
        let (records, tail) = decode_all(&bytes);
        assert_eq!(records.len(), 1);
        assert!(matches!(tail, Ok(Frame::Torn { offset, .. }) if offset as usize == second));
    }

    #[test]
    fn test_payload_limit_is_shared_by_encoder_and_decoder() {
        assert_eq!(frame_len(0), Some(0));
        assert_eq!(frame_len(MAX_PAYLOAD_LEN), Some(MAX_PAYLOAD_LEN as u32));
        assert_eq!(frame_len(MAX_PAYLOAD_LEN + 1), None);
        assert_eq!(frame_len(usize::MAX), None);
    }

    #[test]
    fn test_oversized_length_field_is_corrupt() {
        let mut bytes = frames(&[b"first"]);
        let len = (MAX_PAYLOAD_LEN as u32) + 1;
        bytes[6..10].copy_from_slice(&len.to_le_bytes());
        let header_crc = crc32(&bytes[..CHECKED_HEADER_LEN]);
        bytes[CHECKED_HEADER_LEN..HEADER_LEN].copy_from_slice(&header_crc.to_le_bytes());
        let (_, tail) = decode_all(&bytes);
        assert!(matches!(
            tail,
            Err(FrameError::Corrupt { ref reason, .. }) if reason.contains("exceeds limit")
        ));
    }
}

//! The protocol's variable-length integers.
//! [VarInt and VarLong](https://wiki.vg/Protocol#VarInt_and_VarLong)

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::Error;

/// A VarInt never spans more than this many bytes.
pub const MAX_LEN: usize = 5;

const SEGMENT_BITS: u8 = 0x7F;
const CONTINUE_BIT: u8 = 0x80;

/// Appends `value` to `buf`, low 7-bit group first.
pub fn write(buf: &mut Vec<u8>, mut value: u32) {
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let group = (value & u32::from(SEGMENT_BITS)) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(group);
            return;
        }
        buf.push(group | CONTINUE_BIT);
    }
}

#[must_use]
pub fn encode(value: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_LEN);
    write(&mut buf, value);
    buf
}

/// Decodes the VarInt starting at `buf[offset]`.
///
/// Returns the value and how many bytes it occupied.
///
/// # Errors
/// [`Error::ProtocolViolation`] if no terminating byte shows up within
/// [`MAX_LEN`] bytes, or the buffer ends first.
pub fn decode(buf: &[u8], offset: usize) -> Result<(u32, usize), Error> {
    let mut value = 0u32;
    for (i, &byte) in buf.iter().skip(offset).take(MAX_LEN).enumerate() {
        value |= u32::from(byte & SEGMENT_BITS) << (7 * i);
        if byte & CONTINUE_BIT == 0 {
            return Ok((value, i + 1));
        }
    }
    if buf.len().saturating_sub(offset) >= MAX_LEN {
        Err(Error::ProtocolViolation(format!(
            "VarInt is longer than {MAX_LEN} bytes"
        )))
    } else {
        Err(Error::ProtocolViolation("VarInt is truncated".into()))
    }
}

/// Reads a VarInt from `reader` one byte at a time.
///
/// # Errors
/// [`Error::Cancelled`] if `cancel` fires while waiting for a byte,
/// [`Error::ProtocolViolation`] past [`MAX_LEN`] bytes, and
/// [`Error::IoError`] if the stream fails or ends.
pub async fn read<R>(reader: &mut R, cancel: &CancellationToken) -> Result<u32, Error>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut value = 0u32;
    for i in 0..MAX_LEN {
        let byte = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            byte = reader.read_u8() => byte?,
        };
        value |= u32::from(byte & SEGMENT_BITS) << (7 * i);
        if byte & CONTINUE_BIT == 0 {
            return Ok(value);
        }
    }
    Err(Error::ProtocolViolation(format!(
        "VarInt is longer than {MAX_LEN} bytes"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        for value in [0, 1, 127, 128, 255, 1 << 21, i32::MAX as u32, u32::MAX] {
            let bytes = encode(value);
            assert_eq!(decode(&bytes, 0).unwrap(), (value, bytes.len()));
        }
    }

    #[test]
    fn known_encodings() {
        assert_eq!(encode(0), [0x00]);
        assert_eq!(encode(127), [0x7F]);
        assert_eq!(encode(128), [0x80, 0x01]);
        assert_eq!(encode(772), [0x84, 0x06]);
        assert_eq!(encode(25565), [0xDD, 0xC7, 0x01]);
        assert_eq!(encode(u32::MAX), [0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn decodes_at_offset() {
        let buf = [0xAA, 0xDD, 0xC7, 0x01, 0x00];
        assert_eq!(decode(&buf, 1).unwrap(), (25565, 3));
    }

    #[test]
    fn rejects_six_continuation_bytes() {
        let buf = [0x80; 6];
        assert!(matches!(decode(&buf, 0), Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn rejects_truncated() {
        assert!(matches!(decode(&[0x80], 0), Err(Error::ProtocolViolation(_))));
        assert!(matches!(decode(&[], 0), Err(Error::ProtocolViolation(_))));
    }

    #[tokio::test]
    async fn reads_from_stream() {
        let token = CancellationToken::new();
        let mut data: &[u8] = &[0xDD, 0xC7, 0x01, 0x42];
        assert_eq!(read(&mut data, &token).await.unwrap(), 25565);
        assert_eq!(data, [0x42]);
    }

    #[tokio::test]
    async fn stream_overflow() {
        let token = CancellationToken::new();
        let mut data: &[u8] = &[0xFF; 6];
        assert!(matches!(
            read(&mut data, &token).await,
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[tokio::test]
    async fn stream_cancelled_while_waiting() {
        let (mut client, _server) = tokio::io::duplex(64);
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            read(&mut client, &token).await,
            Err(Error::Cancelled)
        ));
    }

    #[tokio::test]
    async fn stream_ends_early() {
        let token = CancellationToken::new();
        let mut data: &[u8] = &[0x80];
        assert!(matches!(
            read(&mut data, &token).await,
            Err(Error::IoError(_))
        ));
    }
}

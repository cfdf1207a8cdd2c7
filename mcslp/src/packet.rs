//! Frames exchanged during a status query.
//! [Server List Ping](https://wiki.vg/Server_List_Ping)

use std::borrow::Cow;

use crate::{Error, varint};

/// Protocol version announced when the caller does not pick one (1.21.8).
pub const DEFAULT_PROTOCOL_VERSION: u32 = 772;
/// Longest host, in UTF-8 bytes, a handshake may carry.
pub const MAX_HOST_LEN: usize = 255;

const HANDSHAKE_ID: u32 = 0x00;
const STATUS_REQUEST_ID: u32 = 0x00;
const NEXT_STATE_STATUS: u32 = 1;

/// The pre-Netty ping: `0xFE` followed by the `0x01` payload byte.
pub const LEGACY_QUERY: [u8; 2] = [0xFE, 0x01];
/// First byte of the legacy kick packet servers answer with.
pub const LEGACY_KICK: u8 = 0xFF;

/// Prefixes `payload` with its own VarInt length.
#[must_use]
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + varint::MAX_LEN);
    #[allow(clippy::cast_possible_truncation)]
    varint::write(&mut out, payload.len() as u32);
    out.extend_from_slice(payload);
    out
}

/// Builds the handshake frame that switches the connection to the status state.
///
/// # Errors
/// [`Error::AddressTooLong`] if `host` exceeds [`MAX_HOST_LEN`] bytes.
pub fn handshake(host: &str, port: u16, protocol_version: u32) -> Result<Vec<u8>, Error> {
    let host = host.as_bytes();
    if host.len() > MAX_HOST_LEN {
        return Err(Error::AddressTooLong(host.len()));
    }
    let mut payload = Vec::with_capacity(host.len() + 16);
    varint::write(&mut payload, HANDSHAKE_ID);
    varint::write(&mut payload, protocol_version);
    #[allow(clippy::cast_possible_truncation)]
    varint::write(&mut payload, host.len() as u32);
    payload.extend_from_slice(host);
    payload.extend_from_slice(&port.to_be_bytes());
    varint::write(&mut payload, NEXT_STATE_STATUS);
    Ok(frame(&payload))
}

#[must_use]
pub fn status_request() -> Vec<u8> {
    frame(&varint::encode(STATUS_REQUEST_ID))
}

/// Splits a status response body (the bytes after the frame length) into its
/// packet id and JSON text.
///
/// # Errors
/// [`Error::ProtocolViolation`] if a VarInt is malformed or the JSON string
/// claims more bytes than the frame holds.
pub fn split_response(body: &[u8]) -> Result<(u32, Cow<'_, str>), Error> {
    let (packet_id, id_len) = varint::decode(body, 0)?;
    let (json_len, len_len) = varint::decode(body, id_len)?;
    let start = id_len + len_len;
    let available = body.len() - start;
    let json_len = json_len as usize;
    if json_len > available {
        return Err(Error::ProtocolViolation(format!(
            "status payload declares {json_len} bytes but only {available} arrived"
        )));
    }
    Ok((
        packet_id,
        String::from_utf8_lossy(&body[start..start + json_len]),
    ))
}

//! Length-prefixed framing.
//!
//! A frame is a 4-byte big-endian unsigned length followed by exactly that
//! many payload bytes. Zero-length frames are valid. There is no magic number,
//! version or checksum, and incoming lengths are not capped here; callers that
//! need a limit must check [`decode_header`] themselves.

use crate::error::{NetworkError, Result};
use crate::socket::Socket;

/// Size of the length prefix in bytes.
pub const FRAME_HEADER_LEN: usize = 4;

/// Encode a payload length as a frame header.
pub fn encode_header(len: usize) -> Result<[u8; FRAME_HEADER_LEN]> {
    let len = u32::try_from(len).map_err(|_| NetworkError::FrameTooLarge(len))?;
    Ok(len.to_be_bytes())
}

/// Decode a frame header into a payload length.
pub fn decode_header(header: [u8; FRAME_HEADER_LEN]) -> usize {
    u32::from_be_bytes(header) as usize
}

/// Build the full wire representation of one frame.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let header = encode_header(payload.len())?;
    let mut wire = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    wire.extend_from_slice(&header);
    wire.extend_from_slice(payload);
    Ok(wire)
}

/// Send one frame.
///
/// Header and payload go out in a single full-transfer send, so the call
/// either succeeds as a whole or reports failure.
pub fn write_frame(socket: &Socket, payload: &[u8]) -> Result<()> {
    let wire = encode_frame(payload)?;
    NetworkError::check_transfer(wire.len(), socket.send_all(&wire))
}

/// Receive one frame.
///
/// Waits up to `timeout_ms` for the first byte (negative waits forever), then
/// reads the header and payload in full. A short read anywhere fails the
/// whole frame and no partial payload is returned.
pub fn read_frame(socket: &Socket, timeout_ms: i32) -> Result<Vec<u8>> {
    if !socket.wait_readable(timeout_ms)? {
        return Err(NetworkError::Timeout);
    }

    let mut header = [0u8; FRAME_HEADER_LEN];
    NetworkError::check_transfer(FRAME_HEADER_LEN, socket.recv_exact(&mut header))?;

    let len = decode_header(header);
    let mut payload = vec![0u8; len];
    if len > 0 {
        NetworkError::check_transfer(len, socket.recv_exact(&mut payload))?;
    }
    Ok(payload)
}

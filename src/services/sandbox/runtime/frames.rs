//! Docker multiplexed stream frames.
//!
//! An attached, non-TTY container stream interleaves stdout and stderr in
//! frames: an 8-byte header `[stream type][0 0 0][u32 big-endian length]`
//! followed by `length` bytes of payload.

use crate::services::sandbox::protocol::ExecutionResult;

/// Size of a frame header in bytes
pub const FRAME_HEADER_LEN: usize = 8;

/// stdin, stdout, stderr
const MAX_STREAM_TYPE: u8 = 2;

fn is_frame_header(bytes: &[u8]) -> bool {
    bytes.len() >= FRAME_HEADER_LEN && bytes[0] <= MAX_STREAM_TYPE && bytes[1..4] == [0, 0, 0]
}

/// Remove frame headers, concatenating the payloads in order.
///
/// Input that does not start with a frame header is returned unchanged, so
/// already-unframed JSON passes straight through. A truncated final frame
/// contributes whatever payload bytes are present.
pub fn strip_stream_frames(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut rest = data;

    while is_frame_header(rest) {
        let len = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let end = FRAME_HEADER_LEN.saturating_add(len).min(rest.len());
        out.extend_from_slice(&rest[FRAME_HEADER_LEN..end]);
        rest = &rest[end..];
    }

    out.extend_from_slice(rest);
    out
}

/// Decode container output as a result.
///
/// Tries plain JSON first and retries with frame headers stripped; the
/// second error is the one reported.
pub fn parse_container_output(raw: &[u8]) -> Result<ExecutionResult, serde_json::Error> {
    match serde_json::from_slice(raw) {
        Ok(result) => Ok(result),
        Err(_) => serde_json::from_slice(&strip_stream_frames(raw)),
    }
}

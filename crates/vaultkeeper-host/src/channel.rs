//! Native messaging framing: 4-byte native-endian length prefix + JSON.
//!
//! Both directions use the same frame shape. A cleanly closed stream (EOF
//! exactly at a frame boundary) ends the channel normally; a partial length
//! prefix or truncated payload is a protocol violation — further reads would
//! desynchronize, so the caller must terminate the channel.

use std::io::{self, Read, Write};

/// Upper bound on a single message, matching browser native messaging limits.
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Read one framed message. `Ok(None)` means the peer closed the stream
/// cleanly; any framing violation surfaces as `InvalidData`.
pub fn read_message<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut prefix = [0u8; 4];
    let mut filled = 0;
    while filled < prefix.len() {
        match reader.read(&mut prefix[filled..])? {
            0 if filled == 0 => return Ok(None),
            0 => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("truncated length prefix: got {} of 4 bytes", filled),
                ))
            }
            n => filled += n,
        }
    }

    let length = u32::from_ne_bytes(prefix) as usize;
    if length > MAX_MESSAGE_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {} exceeds limit {}", length, MAX_MESSAGE_LEN),
        ));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("truncated payload: expected {} bytes", length),
            )
        } else {
            err
        }
    })?;
    Ok(Some(payload))
}

/// Write one framed message and flush.
pub fn write_message<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_MESSAGE_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "response length {} exceeds limit {}",
                payload.len(),
                MAX_MESSAGE_LEN
            ),
        ));
    }
    writer.write_all(&(payload.len() as u32).to_ne_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

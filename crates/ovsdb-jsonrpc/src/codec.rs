//! Frame decoder for concatenated JSON objects
//!
//! OVSDB frames arrive back to back on the byte stream with no delimiter
//! or length prefix. The decoder buffers input and carves off each complete
//! top-level JSON value; an incomplete tail stays buffered until more bytes
//! arrive. A syntactically invalid prefix poisons the stream.

use crate::error::RpcError;
use serde_json::Value;

/// Cap on a single buffered frame (16 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_frame_bytes: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame(max_frame_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_bytes,
        }
    }

    /// Append raw bytes read from the stream
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Carve the next complete JSON value off the front of the buffer.
    ///
    /// Returns `Ok(None)` when the buffered bytes form only a prefix of a
    /// frame. Malformed input and a frame exceeding the size cap are fatal
    /// for the connection.
    pub fn next_frame(&mut self) -> Result<Option<Value>, RpcError> {
        // skip leading whitespace so the size cap measures the frame itself
        let start = self
            .buf
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(self.buf.len());
        if start > 0 {
            self.buf.drain(..start);
        }
        if self.buf.is_empty() {
            return Ok(None);
        }

        let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
        match stream.next() {
            Some(Ok(frame)) => {
                let consumed = stream.byte_offset();
                self.buf.drain(..consumed);
                Ok(Some(frame))
            }
            Some(Err(e)) if e.is_eof() => {
                if self.buf.len() > self.max_frame_bytes {
                    return Err(RpcError::decode(format!(
                        "frame exceeds {} bytes",
                        self.max_frame_bytes
                    )));
                }
                Ok(None)
            }
            Some(Err(e)) => Err(RpcError::decode(e.to_string())),
            None => Ok(None),
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

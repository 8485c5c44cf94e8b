//! Newline framing over an arbitrarily chunked byte stream.

/// Upper bound on a single accumulated line.
///
/// The protocol puts no limit on line length, so a buggy engine emitting an
/// unterminated stream would otherwise grow the buffer without bound. Once
/// the accumulation crosses this cap with no newline in sight, the buffer
/// drops data until the next newline and logs a warning.
pub const MAX_LINE_LEN: usize = 8 * 1024 * 1024;

/// Accumulates raw stdout chunks and splits them into complete messages.
///
/// Byte-based so that multi-byte UTF-8 sequences split across chunk
/// boundaries reassemble correctly. After every [`feed`](Self::feed) the
/// buffer holds at most one partial (non-newline-terminated) tail.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    discarding: bool,
}

impl FrameBuffer {
    /// Create an empty frame buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every complete message it closed off.
    ///
    /// Messages are trimmed of the terminating newline (and a preceding
    /// carriage return); empty or whitespace-only messages are discarded.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut chunk = chunk;
        if self.discarding {
            // Still inside an oversized line; drop bytes without buffering
            // them until its terminating newline shows up.
            match chunk.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    chunk = &chunk[pos + 1..];
                    self.discarding = false;
                }
                None => return Vec::new(),
            }
        }

        self.buf.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).take(pos).collect();
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if !text.is_empty() {
                messages.push(text.to_string());
            }
        }

        if self.buf.len() > MAX_LINE_LEN {
            tracing::warn!(
                len = self.buf.len(),
                "unterminated line exceeded {} bytes, discarding",
                MAX_LINE_LEN
            );
            self.buf.clear();
            self.discarding = true;
        }

        messages
    }

    /// Number of buffered bytes belonging to a partial message.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

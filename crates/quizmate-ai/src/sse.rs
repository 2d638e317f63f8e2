//! Incremental decoder for `data: `-framed streaming responses

use crate::providers::ChatProvider;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Turns raw response bytes into text fragments.
///
/// Bytes may arrive split anywhere, including inside a multi-byte character
/// or in the middle of a line; the output does not depend on where.
pub struct FrameDecoder {
    provider: &'static dyn ChatProvider,
    /// Bytes of an incomplete UTF-8 sequence from the previous chunk
    pending: Vec<u8>,
    /// Text after the last newline seen so far
    buffer: String,
    finished: bool,
}

impl FrameDecoder {
    pub fn new(provider: &'static dyn ChatProvider) -> Self {
        Self {
            provider,
            pending: Vec::new(),
            buffer: String::new(),
            finished: false,
        }
    }

    /// Whether the `[DONE]` sentinel has been seen
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one chunk and return the non-empty fragments it completes.
    /// After the sentinel every call returns nothing.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }

        let text = self.decode_utf8(chunk);
        self.buffer.push_str(&text);

        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };
        let complete: String = self.buffer.drain(..=last_newline).collect();

        let mut fragments = Vec::new();
        for line in complete.split('\n') {
            let line = line.trim();
            let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
                continue;
            };

            if payload == DONE_SENTINEL {
                self.finished = true;
                self.buffer.clear();
                self.pending.clear();
                break;
            }

            match self.provider.extract_stream_fragment(payload) {
                Ok(fragment) if !fragment.is_empty() => fragments.push(fragment),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("Skipping malformed stream frame: {} ({})", payload, e);
                }
            }
        }

        fragments
    }

    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Truncated sequence: keep it for the next chunk
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
        out
    }
}

impl std::fmt::Debug for FrameDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("pending", &self.pending)
            .field("buffer", &self.buffer)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

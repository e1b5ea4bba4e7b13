//! Streaming UTF-8 decoding of terminal output.
//!
//! PTY reads split the byte stream at arbitrary points, including inside a
//! multi-byte sequence. [`Utf8Decoder`] yields whole code points as soon as
//! they are complete and carries an unfinished tail over to the next chunk.
//! Invalid bytes become U+FFFD.

/// Incremental byte-to-`char` decoder.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every code point it completes, in order.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<char> {
        self.pending.extend_from_slice(chunk);

        let mut out = Vec::with_capacity(self.pending.len());
        let mut pos = 0;
        while pos < self.pending.len() {
            match std::str::from_utf8(&self.pending[pos..]) {
                Ok(valid) => {
                    out.extend(valid.chars());
                    pos = self.pending.len();
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.pending[pos..pos + valid_up_to]) {
                        out.extend(valid.chars());
                    }
                    pos += valid_up_to;
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            pos += bad;
                        }
                        // Incomplete sequence at the end: wait for more bytes.
                        None => break,
                    }
                }
            }
        }

        self.pending.drain(..pos);
        out
    }

    /// Flush an unfinished trailing sequence at end of stream.
    pub fn finish(&mut self) -> Option<char> {
        if self.pending.is_empty() {
            None
        } else {
            self.pending.clear();
            Some(char::REPLACEMENT_CHARACTER)
        }
    }

    /// Number of bytes held back waiting for the rest of a sequence.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

//! Incremental UTF-8 decoding for chunked response bodies.
//!
//! The chat endpoint streams plain text, and a read boundary can land in the
//! middle of a multi-byte sequence. Incomplete trailing bytes are carried
//! into the next read instead of being mangled into replacement characters;
//! genuinely invalid bytes decode to U+FFFD.

/// Stateful decoder: feed raw reads in arrival order, get text out.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one read's worth of bytes, joining any carried prefix.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut data = std::mem::take(&mut self.carry);
        data.extend_from_slice(bytes);

        let mut out = String::with_capacity(data.len());
        let mut rest = data.as_slice();
        while !rest.is_empty() {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(err) => {
                    let (valid, tail) = rest.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        out.push_str(text);
                    }
                    match err.error_len() {
                        // Incomplete sequence at the end of this read; wait
                        // for the rest of it.
                        None => {
                            self.carry = tail.to_vec();
                            break;
                        }
                        Some(bad) => {
                            out.push('\u{FFFD}');
                            rest = &tail[bad..];
                            continue;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush at end of stream. A dangling partial sequence becomes one
    /// replacement character.
    pub fn finish(&mut self) -> String {
        if self.carry.is_empty() {
            String::new()
        } else {
            self.carry.clear();
            "\u{FFFD}".to_string()
        }
    }
}

const REPLACEMENT: char = char::REPLACEMENT_CHARACTER;

/// Streaming UTF-8 decoder for response body chunks.
///
/// A multi-byte character split across two chunks is held back until the rest
/// of it arrives. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let owned;
        let mut input = if self.pending.is_empty() {
            chunk
        } else {
            self.pending.extend_from_slice(chunk);
            owned = std::mem::take(&mut self.pending);
            owned.as_slice()
        };

        let mut output = String::with_capacity(input.len());
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    output.push_str(valid);
                    break;
                }
                Err(error) => {
                    let (valid, after_valid) = input.split_at(error.valid_up_to());
                    output.push_str(std::str::from_utf8(valid).unwrap_or_default());

                    match error.error_len() {
                        Some(invalid_len) => {
                            output.push(REPLACEMENT);
                            input = &after_valid[invalid_len..];
                        }
                        None => {
                            // Truncated sequence at the end of the chunk.
                            self.pending.extend_from_slice(after_valid);
                            break;
                        }
                    }
                }
            }
        }

        output
    }

    /// Flushes bytes still held back when the stream ends.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }

        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_characters_split_across_chunks() {
        let text = "Photosynthèse 🌱";
        let bytes = text.as_bytes();

        for split in 0..=bytes.len() {
            let mut decoder = Utf8ChunkDecoder::new();
            let mut decoded = decoder.decode(&bytes[..split]);
            decoded.push_str(&decoder.decode(&bytes[split..]));
            decoded.push_str(&decoder.finish());
            assert_eq!(decoded, text, "split at byte {split}");
        }
    }

    #[test]
    fn replaces_invalid_sequences() {
        let mut decoder = Utf8ChunkDecoder::new();

        let decoded = decoder.decode(b"a\xffb");

        assert_eq!(decoded, "a\u{fffd}b");
    }

    #[test]
    fn finish_flushes_truncated_tail_lossily() {
        let mut decoder = Utf8ChunkDecoder::new();

        assert_eq!(decoder.decode(&[b'x', 0xe2, 0x82]), "x");
        assert_eq!(decoder.finish(), "\u{fffd}");
        assert_eq!(decoder.finish(), "");
    }
}

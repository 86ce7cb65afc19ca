//! Incremental UTF-8 decoding for subprocess output that arrives in
//! arbitrary chunks. A multi-byte code point split across two reads must
//! come out whole, and garbage bytes must never abort the stream.

/// Streaming UTF-8 decoder. Holds back an incomplete trailing sequence
/// (at most three bytes) between calls and replaces invalid sequences
/// with U+FFFD instead of failing.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes as much of `chunk` as possible, prefixed with any bytes
    /// held over from the previous call. Invalid sequences become one
    /// replacement character per maximal invalid subsequence, matching
    /// `String::from_utf8_lossy` on the concatenated stream.
    pub fn feed(&mut self, chunk: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);

        let mut out = String::with_capacity(buf.len());
        let mut rest: &[u8] = &buf;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            // Valid prefix of a longer sequence at the end of
                            // the buffer; wait for the rest.
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Ends the stream. A sequence that never completed is rendered as a
    /// single replacement character.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }
}

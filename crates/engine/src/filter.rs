//! Newline-boundary filtering of decoded engine output. Lines are only
//! judged once complete, so a noise marker split across two reads still
//! drops the line, and a genuine line that merely shares a substring
//! with a marker mid-stream never does.

/// Marker pairs that identify engine noise. A line is dropped when it
/// contains both halves of any pair. The connectex form is what the
/// engine emits on Windows, the refused form on unix.
const NOISE_MARKER_PAIRS: [(&str, &str); 2] = [
    ("Ollama Get", "connectex"),
    ("Ollama Get", "connection refused"),
];

/// True for diagnostic chatter the engine prints when its local model
/// backend is absent. Matched per complete line, never per fragment.
pub fn is_engine_noise(line: &str) -> bool {
    NOISE_MARKER_PAIRS
        .iter()
        .any(|(first, second)| line.contains(first) && line.contains(second))
}

/// Buffers decoded text until newline boundaries and applies a
/// drop-predicate to each complete line. Kept lines are forwarded
/// verbatim, terminator included. A trailing partial line stays
/// buffered until more text or [`flush`](Self::flush) arrives.
pub struct LineFilterPipeline {
    buffer: String,
    drop_line: Box<dyn Fn(&str) -> bool + Send>,
}

impl LineFilterPipeline {
    pub fn new(drop_line: impl Fn(&str) -> bool + Send + 'static) -> Self {
        Self {
            buffer: String::new(),
            drop_line: Box::new(drop_line),
        }
    }

    /// Pipeline preloaded with [`is_engine_noise`].
    pub fn with_engine_noise_filter() -> Self {
        Self::new(is_engine_noise)
    }

    /// Appends a decoded fragment and returns every complete line that
    /// survived the predicate, in order.
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.buffer.push_str(fragment);
        let mut kept = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            if !(self.drop_line)(line_content(&line)) {
                kept.push(line);
            }
        }
        kept
    }

    /// Ends the stream. A buffered partial line is forwarded without a
    /// terminator unless the predicate matches it too.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        if (self.drop_line)(&rest) {
            None
        } else {
            Some(rest)
        }
    }
}

/// The predicate sees line content, not terminators.
fn line_content(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
}

//! Line re-chunking of streamed answer text.

/// Regroups arbitrary text fragments into newline-terminated lines.
///
/// Complete lines are released as soon as their newline arrives; the
/// unterminated tail stays buffered until [`LineChunker::finish`].
#[derive(Debug, Default)]
pub struct LineChunker {
    buffer: String,
}

impl LineChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment and take every line it completes.
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.buffer.push_str(fragment);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let rest = self.buffer.split_off(pos + 1);
            lines.push(std::mem::replace(&mut self.buffer, rest));
        }
        lines
    }

    /// Take the unterminated remainder, if any.
    pub fn finish(self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer)
        }
    }
}

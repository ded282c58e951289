const DELIMITER: u8 = b'\n';

/// Splits an inbound byte stream into newline-terminated lines.
///
/// Bytes are buffered until a delimiter arrives, so a line split across
/// several reads (including inside a multibyte character) is emitted whole.
#[derive(Debug, Default, Clone)]
pub struct LineCodec {
    buffer: Vec<u8>,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every line completed by it, oldest first.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..]
            .iter()
            .position(|byte| *byte == DELIMITER)
        {
            let end = start + offset;
            lines.push(String::from_utf8_lossy(&self.buffer[start..end]).into_owned());
            start = end + 1;
        }
        self.buffer.drain(..start);

        lines
    }

    /// Number of bytes held for a line that has not been terminated yet.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

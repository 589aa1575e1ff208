//! Newline framing for child output streams.

/// Splits an arbitrarily chunked byte stream into complete lines.
///
/// Bytes after the last `\n` are held until more data arrives or the stream ends.
/// Lines are decoded lossily, a trailing `\r` is dropped and blank lines are skipped.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
    // Prefix of `buffer` already known to contain no newline.
    scanned: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        let mut cursor = self.scanned;
        while let Some(offset) = self.buffer[cursor..].iter().position(|b| *b == b'\n') {
            let end = cursor + offset;
            if let Some(line) = decode_line(&self.buffer[start..end]) {
                lines.push(line);
            }
            start = end + 1;
            cursor = start;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        lines
    }

    /// Flushes the unterminated tail at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        decode_line(&tail)
    }
}

fn decode_line(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    let text = String::from_utf8_lossy(bytes);
    if text.trim().is_empty() {
        None
    } else {
        Some(text.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut framer = LineFramer::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(framer.push(chunk));
        }
        out.extend(framer.finish());
        out
    }

    #[test]
    fn every_split_point_yields_the_same_lines() {
        let input: &[u8] = b"alpha\nbeta gamma\n\n  \ndelta\r\nepsilon\n";
        let expected = vec!["alpha", "beta gamma", "delta", "epsilon"];
        assert_eq!(frame_all(&[input]), expected);
        for first in 0..=input.len() {
            for second in first..=input.len() {
                let chunks = [&input[..first], &input[first..second], &input[second..]];
                assert_eq!(frame_all(&chunks), expected, "split at {first}/{second}");
            }
        }
    }

    #[test]
    fn byte_at_a_time() {
        let input = b"one\ntwo\nthree";
        let chunks: Vec<&[u8]> = input.chunks(1).collect();
        assert_eq!(frame_all(&chunks), vec!["one", "two", "three"]);
    }

    #[test]
    fn trailing_fragment_emitted_once() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"partial").is_empty());
        assert!(framer.push(b" line").is_empty());
        assert_eq!(framer.finish().as_deref(), Some("partial line"));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn blank_tail_is_dropped() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"done\n   "), vec!["done"]);
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn multibyte_split_across_chunks() {
        let input = "héllo wörld\n".as_bytes();
        let (a, b) = input.split_at(2);
        assert_eq!(frame_all(&[a, b]), vec!["héllo wörld"]);
    }
}

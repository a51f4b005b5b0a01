// SerialScribe - core/reassembler.rs
//
// Turns an arbitrary byte stream into discrete, newline-delimited lines.
//
// Decoding policy: permissive UTF-8. Invalid byte sequences are dropped (not
// replaced with U+FFFD) and counted, so a noisy line never kills a session
// and the loss stays observable through `dropped_bytes()`. A multi-byte
// character split across two reads is held back until the next chunk
// completes it, so the output never depends on where the device happened to
// cut the stream.
//
// Each complete segment is trimmed of surrounding whitespace (which also
// removes the `\r` of CRLF devices) and emitted with a single trailing `\n`.

use crate::util::constants::MAX_PARTIAL_LINE_BYTES;
use std::borrow::Cow;

/// Stateful line splitter for one capture session.
#[derive(Debug)]
pub struct LineReassembler {
    /// Decoded text after the last emitted newline.
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence from the previous chunk.
    incomplete: Vec<u8>,
    /// Total bytes discarded by the decode and overflow policies.
    dropped_bytes: u64,
    max_partial: usize,
}

impl LineReassembler {
    pub fn new() -> Self {
        Self::with_max_partial(MAX_PARTIAL_LINE_BYTES)
    }

    /// Create a reassembler that discards a newline-free fragment once it
    /// grows beyond `max_partial` bytes.
    pub fn with_max_partial(max_partial: usize) -> Self {
        Self {
            buffer: String::new(),
            incomplete: Vec::new(),
            dropped_bytes: 0,
            max_partial: max_partial.max(1),
        }
    }

    /// Decode `chunk`, append it to the carry-over, and return the lines it
    /// completed.
    ///
    /// The iterator is lazy. Lines it does not get to yield before being
    /// dropped stay buffered and come out first on the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Lines<'_> {
        self.decode(chunk);

        if self.buffer.len() > self.max_partial && !self.buffer.contains('\n') {
            tracing::warn!(
                bytes = self.buffer.len(),
                max = self.max_partial,
                "Partial line exceeded limit without a newline; discarding fragment"
            );
            self.dropped_bytes += self.buffer.len() as u64;
            self.buffer.clear();
        }

        Lines {
            buffer: &mut self.buffer,
            consumed: 0,
        }
    }

    /// Emit whatever is left in the carry-over as a final line.
    ///
    /// A carry-over of only whitespace (such as the `\r` of a CRLF pair cut
    /// off by the last read) is discarded rather than written as a blank line.
    ///
    /// An unfinished multi-byte sequence at the very end cannot be completed
    /// any more and is counted as dropped.
    pub fn flush(&mut self) -> Option<String> {
        if !self.incomplete.is_empty() {
            self.dropped_bytes += self.incomplete.len() as u64;
            self.incomplete.clear();
        }
        let text = self.buffer.trim();
        if text.is_empty() {
            self.buffer.clear();
            return None;
        }
        let line = format!("{text}\n");
        self.buffer.clear();
        Some(line)
    }

    /// Text received after the last newline.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Total bytes discarded so far.
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }

    fn decode(&mut self, chunk: &[u8]) {
        let bytes: Cow<'_, [u8]> = if self.incomplete.is_empty() {
            Cow::Borrowed(chunk)
        } else {
            let mut joined = std::mem::take(&mut self.incomplete);
            joined.extend_from_slice(chunk);
            Cow::Owned(joined)
        };

        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.buffer.push_str(text);
                    }
                    match e.error_len() {
                        Some(bad) => {
                            self.dropped_bytes += bad as u64;
                            rest = &after[bad..];
                        }
                        None => {
                            // Sequence cut off by the chunk boundary.
                            self.incomplete.extend_from_slice(after);
                            return;
                        }
                    }
                }
            }
        }
    }
}

impl Default for LineReassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy iterator over the lines completed by one `feed` call.
pub struct Lines<'a> {
    buffer: &'a mut String,
    /// Bytes of `buffer` already yielded; removed when the iterator drops.
    consumed: usize,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let rest = &self.buffer[self.consumed..];
        let nl = rest.find('\n')?;
        let line = format!("{}\n", rest[..nl].trim());
        self.consumed += nl + 1;
        Some(line)
    }
}

impl Drop for Lines<'_> {
    fn drop(&mut self) {
        self.buffer.drain(..self.consumed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut r = LineReassembler::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(r.feed(chunk));
        }
        out
    }

    #[test]
    fn test_complete_lines_are_trimmed_and_terminated() {
        let lines = collect_all(&[b"  temp=21.5 \r\nstatus OK\n"]);
        assert_eq!(lines, vec!["temp=21.5\n", "status OK\n"]);
    }

    #[test]
    fn test_partial_line_carried_across_feeds() {
        let mut r = LineReassembler::new();
        assert_eq!(r.feed(b"hel").count(), 0);
        assert_eq!(r.pending(), "hel");
        let lines: Vec<_> = r.feed(b"lo\nwor").collect();
        assert_eq!(lines, vec!["hello\n"]);
        assert_eq!(r.pending(), "wor");
    }

    #[test]
    fn test_every_split_point_matches_single_feed() {
        // CRLF, blank line, two- and three-byte characters, one invalid byte.
        let stream: &[u8] = b"alpha\r\n\n  b\xC3\xA9ta \n\xE2\x82\xAC=1\xFF\ngamma";
        let expected = collect_all(&[stream]);
        assert_eq!(expected, vec!["alpha\n", "\n", "b\u{e9}ta\n", "\u{20ac}=1\n"]);

        for a in 0..=stream.len() {
            for b in a..=stream.len() {
                let got = collect_all(&[&stream[..a], &stream[a..b], &stream[b..]]);
                assert_eq!(got, expected, "split at {a}/{b}");
            }
        }
    }

    #[test]
    fn test_invalid_bytes_dropped_and_counted() {
        let mut r = LineReassembler::new();
        let lines: Vec<_> = r.feed(b"ok\xFF\xFE\n").collect();
        assert_eq!(lines, vec!["ok\n"]);
        assert_eq!(r.dropped_bytes(), 2);
    }

    #[test]
    fn test_unconsumed_lines_survive_to_next_feed() {
        let mut r = LineReassembler::new();
        {
            let mut lines = r.feed(b"one\ntwo\nthree\n");
            assert_eq!(lines.next().as_deref(), Some("one\n"));
        }
        let rest: Vec<_> = r.feed(b"four\n").collect();
        assert_eq!(rest, vec!["two\n", "three\n", "four\n"]);
    }

    #[test]
    fn test_oversized_fragment_discarded() {
        let mut r = LineReassembler::with_max_partial(8);
        assert_eq!(r.feed(b"0123456789").count(), 0);
        assert_eq!(r.pending(), "");
        assert_eq!(r.dropped_bytes(), 10);
        let lines: Vec<_> = r.feed(b"ok\n").collect();
        assert_eq!(lines, vec!["ok\n"]);
    }

    #[test]
    fn test_flush_emits_remainder() {
        let mut r = LineReassembler::new();
        assert_eq!(r.feed(b"tail \xE2\x82").count(), 0);
        assert_eq!(r.flush().as_deref(), Some("tail\n"));
        assert_eq!(r.dropped_bytes(), 2);
        assert_eq!(r.flush(), None);
    }

    #[test]
    fn test_flush_discards_whitespace_only_remainder() {
        let mut r = LineReassembler::new();
        let lines: Vec<_> = r.feed(b"hello\r\n\r").collect();
        assert_eq!(lines, vec!["hello\n"]);
        assert_eq!(r.pending(), "\r");
        assert_eq!(r.flush(), None);
        assert_eq!(r.pending(), "");
        assert_eq!(r.dropped_bytes(), 0);
    }
}

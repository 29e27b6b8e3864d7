//! Reassembly of newline-delimited frames from an arbitrary byte stream
//!
//! A reliable stream hands data over in chunks whose boundaries have nothing to do with
//! message boundaries. The reassembler keeps whatever trails the last newline of a chunk
//! and prepends it to the next one, so callers only ever see whole frames.

const FRAME_DELIMITER: u8 = b'\n';

/// Buffers partial frames between reads of a stream transport
#[derive(Debug, Default)]
pub struct FrameReassembler {
    /// Bytes received after the most recent newline
    pending: Vec<u8>,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every frame it completes, in order
    ///
    /// A chunk without a newline is buffered and yields nothing. Otherwise everything up to
    /// the last newline is joined onto the pending bytes and split into frames, and the tail
    /// after that newline becomes the new pending data. Two consecutive newlines yield an
    /// empty frame. The split happens on raw bytes, so a multi-byte character cut in half
    /// by a chunk boundary is still decoded correctly.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let Some(last_newline) = chunk.iter().rposition(|&b| b == FRAME_DELIMITER) else {
            self.pending.extend_from_slice(chunk);
            return Vec::new();
        };

        let (before, after) = (&chunk[..last_newline], &chunk[last_newline + 1..]);
        self.pending.extend_from_slice(before);

        let complete = std::mem::replace(&mut self.pending, after.to_vec());
        complete
            .split(|&b| b == FRAME_DELIMITER)
            .map(|frame| String::from_utf8_lossy(frame).into_owned())
            .collect()
    }

    /// Number of bytes waiting for a newline
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut reassembler = FrameReassembler::new();
        chunks
            .iter()
            .flat_map(|chunk| reassembler.feed(chunk))
            .collect()
    }

    #[test]
    fn test_single_complete_frame() {
        assert_eq!(feed_all(&[b"EXIT\n"]), vec!["EXIT"]);
    }

    #[test]
    fn test_chunk_without_newline_is_buffered() {
        let mut reassembler = FrameReassembler::new();

        assert!(reassembler.feed(b"HELO ali").is_empty());
        assert_eq!(reassembler.pending_len(), 8);
        assert_eq!(
            reassembler.feed(b"ce 127.0.0.1 9001\n"),
            vec!["HELO alice 127.0.0.1 9001"]
        );
        assert_eq!(reassembler.pending_len(), 0);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        assert_eq!(
            feed_all(&[b"RJCT bob\nEXIT\nMESG a: b\n"]),
            vec!["RJCT bob", "EXIT", "MESG a: b"]
        );
    }

    #[test]
    fn test_trailing_partial_frame_is_kept() {
        let mut reassembler = FrameReassembler::new();

        assert_eq!(reassembler.feed(b"EXIT\nHELO bo"), vec!["EXIT"]);
        assert_eq!(reassembler.feed(b"b 1.2.3.4 5\nEX"), vec!["HELO bob 1.2.3.4 5"]);
        assert_eq!(reassembler.feed(b"IT\n"), vec!["EXIT"]);
    }

    #[test]
    fn test_lone_newline_yields_empty_frame() {
        assert_eq!(feed_all(&[b"\n"]), vec![""]);
        assert_eq!(feed_all(&[b"EXIT\n\nEXIT\n"]), vec!["EXIT", "", "EXIT"]);
    }

    #[test]
    fn test_newline_at_start_of_chunk_completes_pending() {
        assert_eq!(feed_all(&[b"EXIT", b"\nEX", b"IT", b"\n"]), vec!["EXIT", "EXIT"]);
    }

    #[test]
    fn test_empty_chunk_is_ignored() {
        let mut reassembler = FrameReassembler::new();
        assert!(reassembler.feed(b"").is_empty());
        assert_eq!(reassembler.pending_len(), 0);
    }

    #[test]
    fn test_every_two_way_split_yields_same_frames() {
        let stream: &[u8] =
            b"HELO alice 127.0.0.1 9001\nMESG alice: a: b\nEXIT\nACPT a 1.1.1.1 1:b 2.2.2.2 2\n";
        let expected = vec![
            "HELO alice 127.0.0.1 9001",
            "MESG alice: a: b",
            "EXIT",
            "ACPT a 1.1.1.1 1:b 2.2.2.2 2",
        ];

        for split in 0..=stream.len() {
            let (left, right) = stream.split_at(split);
            assert_eq!(feed_all(&[left, right]), expected, "split at {}", split);
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let stream = b"JOIN bob 127.0.0.1 9002\nEXIT bob\n";
        let chunks: Vec<&[u8]> = stream.chunks(1).collect();

        assert_eq!(feed_all(&chunks), vec!["JOIN bob 127.0.0.1 9002", "EXIT bob"]);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let text = "MESG alice: héllo\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;

        assert_eq!(
            feed_all(&[&text[..split], &text[split..]]),
            vec!["MESG alice: héllo"]
        );
    }
}

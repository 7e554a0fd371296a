//! Purpose: Forward-only buffered reader that counts consumed bytes.
//! Exports: `OffsetReader`.
//! Role: Byte source under the feed decoder; every diagnostic offset comes from here.
//! Invariants: `offset()` equals the number of bytes consumed, never bytes buffered.
//! Invariants: Never seeks; reads from the inner source only when the buffer is empty.
use std::io::{self, BufRead, BufReader, Read};

pub struct OffsetReader<R> {
    inner: BufReader<R>,
    offset: u64,
}

impl<R: Read> OffsetReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            offset: 0,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Buffered bytes not yet consumed; empty only when the source reported end of input.
    pub fn fill(&mut self) -> io::Result<&[u8]> {
        loop {
            match self.inner.fill_buf() {
                Ok(_) => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(self.inner.buffer())
    }

    pub fn consume(&mut self, amount: usize) {
        self.inner.consume(amount);
        self.offset += amount as u64;
    }

    /// Consume JSON whitespace and return the next byte without consuming it.
    pub fn skip_whitespace(&mut self) -> io::Result<Option<u8>> {
        loop {
            let available = self.fill()?;
            if available.is_empty() {
                return Ok(None);
            }
            match available.iter().position(|b| !is_json_whitespace(*b)) {
                Some(pos) => {
                    let next = available[pos];
                    self.consume(pos);
                    return Ok(Some(next));
                }
                None => {
                    let len = available.len();
                    self.consume(len);
                }
            }
        }
    }

    /// Consume up to and including the next `\n`. Returns the number of bytes dropped.
    pub fn skip_line(&mut self) -> io::Result<u64> {
        let start = self.offset;
        loop {
            let available = self.fill()?;
            if available.is_empty() {
                break;
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    self.consume(pos + 1);
                    break;
                }
                None => {
                    let len = available.len();
                    self.consume(len);
                }
            }
        }
        Ok(self.offset - start)
    }
}

pub fn is_json_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

#[cfg(test)]
mod tests {
    use super::OffsetReader;
    use std::io::{self, Read};

    /// Hands out at most `chunk` bytes per read to exercise refills.
    struct Trickle<'a> {
        data: &'a [u8],
        chunk: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let take = self.data.len().min(self.chunk).min(buf.len());
            buf[..take].copy_from_slice(&self.data[..take]);
            self.data = &self.data[take..];
            Ok(take)
        }
    }

    #[test]
    fn whitespace_skip_counts_bytes_across_refills() {
        let mut reader = OffsetReader::new(Trickle {
            data: b" \n\t \r\n  x",
            chunk: 3,
        });
        assert_eq!(reader.skip_whitespace().expect("skip"), Some(b'x'));
        assert_eq!(reader.offset(), 8);
        reader.consume(1);
        assert_eq!(reader.skip_whitespace().expect("skip"), None);
        assert_eq!(reader.offset(), 9);
    }

    /// Plays back scripted read results, one per call; `None` means end of input.
    struct Script {
        reads: Vec<Option<&'static [u8]>>,
        calls: usize,
    }

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let step = self.reads.get(self.calls).copied().flatten();
            self.calls += 1;
            let data = step.unwrap_or_default();
            buf[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }
    }

    #[test]
    fn end_of_input_is_reported_after_a_single_empty_read() {
        let mut reader = OffsetReader::new(Script {
            reads: vec![Some(&b"ab"[..]), None, Some(&b"cd"[..])],
            calls: 0,
        });
        assert_eq!(reader.fill().expect("fill"), b"ab");
        reader.consume(2);
        assert!(reader.fill().expect("fill").is_empty());
        assert_eq!(reader.inner.get_ref().calls, 2);
        assert_eq!(reader.fill().expect("fill"), b"cd");
        assert_eq!(reader.inner.get_ref().calls, 3);
    }

    #[test]
    fn skip_line_stops_after_newline() {
        let mut reader = OffsetReader::new(&b"garbage here\n{}"[..]);
        assert_eq!(reader.skip_line().expect("skip"), 13);
        assert_eq!(reader.fill().expect("fill"), b"{}");
        assert_eq!(reader.offset(), 13);
    }

    #[test]
    fn skip_line_at_end_of_input_drops_remainder() {
        let mut reader = OffsetReader::new(&b"no newline"[..]);
        assert_eq!(reader.skip_line().expect("skip"), 10);
        assert!(reader.fill().expect("fill").is_empty());
    }
}

//! Purpose: Synthetic feed source for load tests, paced against a wall-clock deadline.
//! Exports: `Generator`, `GeneratorConfig`, `Clock`, `SystemClock`, `ManualClock`.
//! Role: A `Read` byte source fed into the decoder like any real feed file or socket.
//! Invariants: One put operation is rendered per refill; nothing is rendered at or after the deadline.
//! Invariants: Once the deadline has been observed the generator stays at end of input.
//! Invariants: The clock is injected; no global time is read outside `SystemClock`.
use std::io::{self, Read};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::error::Error;
use crate::core::id::DocumentId;

/// Source of "now" for deadline checks.
pub trait Clock {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Settable clock; clones share the same instant.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<OffsetDateTime>>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, step: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += step;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// Filler bytes in each document's `test` field.
    pub size: usize,
    pub deadline: OffsetDateTime,
    pub namespace: String,
    pub doc_type: String,
}

impl GeneratorConfig {
    pub fn new(size: usize, deadline: OffsetDateTime) -> Self {
        Self {
            size,
            deadline,
            namespace: "test".to_string(),
            doc_type: "test".to_string(),
        }
    }

    /// Deadline `duration` from now on the real clock.
    pub fn for_duration(size: usize, duration: Duration) -> Self {
        Self::new(size, SystemClock.now() + duration)
    }

    pub fn with_document_type(
        mut self,
        namespace: impl Into<String>,
        doc_type: impl Into<String>,
    ) -> Self {
        self.namespace = namespace.into();
        self.doc_type = doc_type.into();
        self
    }
}

pub struct Generator<C = SystemClock> {
    config: GeneratorConfig,
    clock: C,
    generated: u64,
    pending: Vec<u8>,
    cursor: usize,
    finished: bool,
}

impl Generator<SystemClock> {
    pub fn new(config: GeneratorConfig) -> Result<Self, Error> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> Generator<C> {
    pub fn with_clock(config: GeneratorConfig, clock: C) -> Result<Self, Error> {
        DocumentId::new(config.namespace.as_str(), config.doc_type.as_str(), "0")?;
        Ok(Self {
            pending: Vec::with_capacity(config.size + 64),
            config,
            clock,
            generated: 0,
            cursor: 0,
            finished: false,
        })
    }

    /// Documents rendered so far.
    pub fn generated(&self) -> u64 {
        self.generated
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn deadline_passed(&mut self) -> bool {
        if !self.finished && self.clock.now() >= self.config.deadline {
            self.finished = true;
            tracing::debug!(
                deadline = %rfc3339(self.config.deadline),
                generated = self.generated,
                "synthetic feed reached deadline"
            );
        }
        self.finished
    }

    fn render_next(&mut self) -> io::Result<()> {
        self.pending.clear();
        self.cursor = 0;
        let id = DocumentId::new(
            self.config.namespace.as_str(),
            self.config.doc_type.as_str(),
            self.generated.to_string(),
        )
        .map_err(io::Error::other)?;
        self.pending.extend_from_slice(b"{\"put\":");
        serde_json::to_writer(&mut self.pending, &id)?;
        self.pending.extend_from_slice(b",\"fields\":{\"test\":\"");
        let start = self.pending.len();
        self.pending.resize(start + self.config.size, 0);
        let filler = &mut self.pending[start..];
        getrandom::fill(filler).map_err(|err| io::Error::other(err.to_string()))?;
        for byte in filler.iter_mut() {
            *byte = b'a' + *byte % 26;
        }
        self.pending.extend_from_slice(b"\"}}\n");
        self.generated += 1;
        Ok(())
    }
}

impl<C: Clock> Read for Generator<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.cursor == self.pending.len() {
            if self.deadline_passed() {
                return Ok(0);
            }
            self.render_next()?;
        }
        let remaining = &self.pending[self.cursor..];
        let take = remaining.len().min(buf.len());
        buf[..take].copy_from_slice(&remaining[..take]);
        self.cursor += take;
        Ok(take)
    }
}

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::{Clock, Generator, GeneratorConfig, ManualClock};
    use crate::core::decoder::Decoder;
    use crate::core::error::ErrorKind;
    use std::io::Read;
    use std::time::Duration;
    use time::OffsetDateTime;

    fn start() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp")
    }

    #[test]
    fn renders_put_operations_until_deadline() {
        let clock = ManualClock::new(start());
        let config = GeneratorConfig::new(5, start() + Duration::from_secs(2));
        let mut generator = Generator::with_clock(config, clock.clone()).expect("generator");

        let mut first = String::new();
        let mut buf = [0u8; 256];
        let n = generator.read(&mut buf).expect("read");
        first.push_str(std::str::from_utf8(&buf[..n]).expect("utf8"));
        assert!(first.starts_with("{\"put\":\"id:test:test::0\",\"fields\":{\"test\":\""));
        assert!(first.ends_with("\"}}\n"));
        let value: serde_json::Value = serde_json::from_str(&first).expect("json");
        let filler = value["fields"]["test"].as_str().expect("filler");
        assert_eq!(filler.len(), 5);
        assert!(filler.bytes().all(|b| b.is_ascii_lowercase()));

        clock.advance(Duration::from_secs(1));
        let n = generator.read(&mut buf).expect("read");
        assert!(std::str::from_utf8(&buf[..n]).expect("utf8").contains("::1\""));

        clock.advance(Duration::from_secs(1));
        assert_eq!(generator.read(&mut buf).expect("read"), 0);
        assert_eq!(generator.generated(), 2);
    }

    #[test]
    fn small_buffers_receive_whole_document_in_pieces() {
        let clock = ManualClock::new(start());
        let config = GeneratorConfig::new(40, start() + Duration::from_secs(1));
        let mut generator = Generator::with_clock(config, clock.clone()).expect("generator");
        let mut out = Vec::new();
        let mut chunk = [0u8; 7];
        loop {
            let n = generator.read(&mut chunk).expect("read");
            out.extend_from_slice(&chunk[..n]);
            if out.ends_with(b"\n") {
                break;
            }
        }
        assert_eq!(generator.generated(), 1);
        let value: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(value["fields"]["test"].as_str().map(str::len), Some(40));
    }

    #[test]
    fn end_of_input_is_sticky() {
        let clock = ManualClock::new(start() + Duration::from_secs(5));
        let config = GeneratorConfig::new(1, start());
        let mut generator = Generator::with_clock(config, clock.clone()).expect("generator");
        let mut buf = [0u8; 64];
        assert_eq!(generator.read(&mut buf).expect("read"), 0);
        clock.set(start() - Duration::from_secs(60));
        assert_eq!(generator.read(&mut buf).expect("read"), 0);
        assert_eq!(generator.generated(), 0);
    }

    #[test]
    fn custom_document_type_is_validated() {
        let clock = ManualClock::new(start());
        let config = GeneratorConfig::new(1, start() + Duration::from_secs(1))
            .with_document_type("music", "song");
        let mut generator = Generator::with_clock(config, clock).expect("generator");
        let mut buf = [0u8; 128];
        let n = generator.read(&mut buf).expect("read");
        assert!(buf[..n].starts_with(b"{\"put\":\"id:music:song::0\""));

        let bad = GeneratorConfig::new(1, start()).with_document_type("", "song");
        let err = Generator::with_clock(bad, ManualClock::new(start())).err().expect("error");
        assert_eq!(err.kind(), ErrorKind::Identifier);
    }

    #[test]
    fn document_type_with_json_specials_is_escaped() {
        let clock = ManualClock::new(start());
        let config = GeneratorConfig::new(3, start() + Duration::from_secs(1))
            .with_document_type("a\"b\\c", "t\n");
        let generator = Generator::with_clock(config, clock).expect("generator");
        let doc = Decoder::new(generator)
            .decode()
            .expect("decode")
            .expect("document");
        assert_eq!(doc.id.namespace(), "a\"b\\c");
        assert_eq!(doc.id.doc_type(), "t\n");
        assert_eq!(doc.id.user_specific(), "0");
    }

    #[test]
    fn for_duration_sets_deadline_ahead_of_now() {
        let before = OffsetDateTime::now_utc();
        let config = GeneratorConfig::for_duration(4, Duration::from_secs(30));
        assert!(config.deadline >= before + Duration::from_secs(30));
        assert_eq!(config.size, 4);
        assert_eq!((config.namespace.as_str(), config.doc_type.as_str()), ("test", "test"));
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(start());
        let other = clock.clone();
        other.advance(Duration::from_millis(1500));
        assert_eq!(clock.now(), start() + Duration::from_millis(1500));
    }
}

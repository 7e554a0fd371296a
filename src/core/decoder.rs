//! Purpose: Decode feed operations one JSON object at a time from a byte stream.
//! Exports: `Decoder`, `DecoderConfig`, `Framing`.
//! Role: Turns raw feed input (JSON array or whitespace-separated objects) into `Document`s.
//! Invariants: Framing is detected once from the first non-whitespace byte and cached.
//! Invariants: A call never reads past the closing brace of the object it returns.
//! Invariants: Errors carry the absolute byte offset where the failing token began.
//! Invariants: Array framing cannot resynchronize; any failure halts the decoder for good.
use std::io::{self, Read};
use std::ops::Range;

use bstr::ByteSlice;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::value::RawValue;

use crate::core::document::{Document, Operation};
use crate::core::error::{Error, ErrorKind};
use crate::core::id::DocumentId;
use crate::core::offset::OffsetReader;

const DEFAULT_MAX_RECORD_BYTES: usize = 64 * 1024 * 1024;
const MAX_SNIPPET_BYTES: usize = 16;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DecoderConfig {
    /// Largest single operation object buffered before giving up.
    pub max_record_bytes: usize,
}

impl DecoderConfig {
    pub fn new() -> Self {
        Self {
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }

    pub fn with_max_record_bytes(mut self, max_record_bytes: usize) -> Self {
        self.max_record_bytes = max_record_bytes;
        self
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Framing {
    /// One JSON array of operation objects.
    Array,
    /// Top-level operation objects separated by whitespace.
    Lines,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum ArrayState {
    Opened,
    AfterElement,
    Closed,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Mode {
    Undetected,
    Lines,
    Array(ArrayState),
}

pub struct Decoder<R> {
    reader: OffsetReader<R>,
    config: DecoderConfig,
    mode: Mode,
    /// Offset of the failure that left the stream misaligned.
    halted: Option<u64>,
}

/// Operation keys stay raw so failures can point at the exact token.
#[derive(Deserialize)]
struct RawOperation<'a> {
    #[serde(borrow)]
    put: Option<&'a RawValue>,
    #[serde(borrow)]
    update: Option<&'a RawValue>,
    #[serde(borrow)]
    remove: Option<&'a RawValue>,
    #[serde(borrow)]
    fields: Option<&'a RawValue>,
    condition: Option<String>,
    create: Option<bool>,
}

fn framing_error(offset: u64, message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Framing)
        .with_offset(offset)
        .with_message(message)
}

fn schema_error(offset: u64, message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Schema)
        .with_offset(offset)
        .with_message(message)
}

fn io_error(err: io::Error, offset: u64) -> Error {
    Error::new(ErrorKind::Io)
        .with_offset(offset)
        .with_message(err.to_string())
        .with_source(err)
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, DecoderConfig::default())
    }

    pub fn with_config(reader: R, config: DecoderConfig) -> Self {
        Self {
            reader: OffsetReader::new(reader),
            config,
            mode: Mode::Undetected,
            halted: None,
        }
    }

    /// Bytes consumed from the source so far.
    pub fn offset(&self) -> u64 {
        self.reader.offset()
    }

    /// Detected framing; `None` until the first non-whitespace byte has been seen.
    pub fn framing(&self) -> Option<Framing> {
        match self.mode {
            Mode::Undetected => None,
            Mode::Lines => Some(Framing::Lines),
            Mode::Array(_) => Some(Framing::Array),
        }
    }

    /// Next operation, `Ok(None)` once the source is exhausted.
    pub fn decode(&mut self) -> Result<Option<Document>, Error> {
        if let Some(at) = self.halted {
            return Err(framing_error(
                self.offset(),
                format!("decoder halted by earlier failure at byte offset {at}"),
            ));
        }
        let result = self.decode_next();
        if let Err(err) = &result {
            if matches!(self.mode, Mode::Array(_)) && self.halted.is_none() {
                self.halt(err.offset());
            }
        }
        result
    }

    /// Drop input through the next newline so decoding can resume after a failure.
    /// Only line framing has record boundaries to resume at.
    pub fn skip_line(&mut self) -> Result<u64, Error> {
        if matches!(self.mode, Mode::Array(_)) {
            return Err(framing_error(
                self.offset(),
                "array framing cannot resynchronize after a failure",
            ));
        }
        let offset = self.offset();
        let skipped = self
            .reader
            .skip_line()
            .map_err(|err| io_error(err, offset))?;
        self.halted = None;
        Ok(skipped)
    }

    fn halt(&mut self, at: Option<u64>) {
        let at = at.unwrap_or_else(|| self.offset());
        tracing::warn!(offset = at, framing = ?self.framing(), "feed decoder halted");
        self.halted = Some(at);
    }

    /// Record a failure that leaves the stream between record boundaries.
    fn misaligned(&mut self, err: Error) -> Error {
        self.halt(err.offset());
        err
    }

    fn skip_whitespace(&mut self) -> Result<Option<u8>, Error> {
        let offset = self.offset();
        match self.reader.skip_whitespace() {
            Ok(next) => Ok(next),
            Err(err) => Err(self.misaligned(io_error(err, offset))),
        }
    }

    fn decode_next(&mut self) -> Result<Option<Document>, Error> {
        if self.mode == Mode::Undetected {
            match self.skip_whitespace()? {
                None => return Ok(None),
                Some(b'[') => {
                    self.reader.consume(1);
                    self.mode = Mode::Array(ArrayState::Opened);
                }
                Some(_) => self.mode = Mode::Lines,
            }
            tracing::debug!(framing = ?self.framing(), "detected feed framing");
        }
        match self.mode {
            Mode::Array(state) => self.next_element(state),
            _ => match self.skip_whitespace()? {
                None => Ok(None),
                Some(b'{') => self.read_document().map(Some),
                Some(_) => Err(self.unexpected("expected '{' to start an operation")),
            },
        }
    }

    fn next_element(&mut self, state: ArrayState) -> Result<Option<Document>, Error> {
        let next = self.skip_whitespace()?;
        match (state, next) {
            (ArrayState::Closed, None) => Ok(None),
            (ArrayState::Closed, Some(_)) => {
                Err(self.unexpected("trailing data after closing ']'"))
            }
            (_, None) => Err(self.missing_close()),
            (_, Some(b']')) => {
                self.reader.consume(1);
                self.mode = Mode::Array(ArrayState::Closed);
                tracing::debug!(offset = self.offset(), "feed array closed");
                self.next_element(ArrayState::Closed)
            }
            (ArrayState::Opened, Some(b'{')) => self.read_element(),
            (ArrayState::AfterElement, Some(b',')) => {
                self.reader.consume(1);
                match self.skip_whitespace()? {
                    Some(b'{') => self.read_element(),
                    Some(b']') => Err(self.unexpected("trailing comma before ']'")),
                    Some(_) => Err(self.unexpected("expected '{' to start an array element")),
                    None => Err(self.missing_close()),
                }
            }
            (ArrayState::AfterElement, Some(_)) => {
                Err(self.unexpected("expected ',' or ']' after array element"))
            }
            (ArrayState::Opened, Some(_)) => {
                Err(self.unexpected("expected '{' to start an array element"))
            }
        }
    }

    fn read_element(&mut self) -> Result<Option<Document>, Error> {
        self.mode = Mode::Array(ArrayState::AfterElement);
        self.read_document().map(Some)
    }

    fn missing_close(&mut self) -> Error {
        let err = framing_error(self.offset(), "unexpected end of input, missing closing ']'");
        self.misaligned(err)
    }

    fn unexpected(&mut self, message: &str) -> Error {
        let offset = self.offset();
        let found = match self.reader.fill() {
            Ok(available) => snippet(available),
            Err(_) => String::new(),
        };
        let err = framing_error(offset, format!("{message}, found {found:?}"));
        self.misaligned(err)
    }

    fn read_document(&mut self) -> Result<Document, Error> {
        let start = self.offset();
        let object = self.read_object()?;
        let document = parse_operation(object, start)?;
        tracing::trace!(
            offset = start,
            operation = %document.operation,
            id = %document.id,
            "decoded feed operation"
        );
        Ok(document)
    }

    /// Buffer one object starting at the current `{`, through its matching `}`.
    fn read_object(&mut self) -> Result<Bytes, Error> {
        let start = self.offset();
        let mut scanner = Scanner::new(start);
        let mut buf = Vec::new();
        loop {
            let offset = self.offset();
            let available = match self.reader.fill() {
                Ok(available) => available,
                Err(err) => return Err(self.misaligned(io_error(err, offset))),
            };
            if available.is_empty() {
                let err = scanner.end_of_input();
                return Err(self.misaligned(err));
            }
            let outcome = scanner.feed(available);
            let used = match outcome {
                Scan::Done(used) | Scan::Pending(used) => used,
                Scan::Failed(used, _) => used,
            };
            let allowance = self.config.max_record_bytes - buf.len();
            if used > allowance {
                self.reader.consume(allowance);
                let err = framing_error(
                    start,
                    format!(
                        "operation exceeds size limit of {} bytes",
                        self.config.max_record_bytes
                    ),
                );
                return Err(self.misaligned(err));
            }
            buf.extend_from_slice(&available[..used]);
            self.reader.consume(used);
            match outcome {
                Scan::Done(_) => return Ok(Bytes::from(buf)),
                Scan::Pending(_) => continue,
                Scan::Failed(_, err) => return Err(self.misaligned(err)),
            }
        }
    }
}

impl<R: Read> Iterator for Decoder<R> {
    type Item = Result<Document, Error>;

    /// Stops after end of input or once the decoder has halted.
    fn next(&mut self) -> Option<Self::Item> {
        if self.halted.is_some() {
            return None;
        }
        self.decode().transpose()
    }
}

enum Scan {
    /// Object closed; bytes used including the final `}`.
    Done(usize),
    /// Whole chunk used; object still open.
    Pending(usize),
    /// Bytes used before the offending byte.
    Failed(usize, Error),
}

/// Tracks string and nesting state to find where an object ends.
/// Full JSON validation happens afterwards in serde_json.
struct Scanner {
    object_start: u64,
    position: u64,
    /// Closing byte expected for each open `{` or `[`, innermost last.
    closers: Vec<u8>,
    in_string: bool,
    escaped: bool,
    string_start: u64,
}

impl Scanner {
    fn new(object_start: u64) -> Self {
        Self {
            object_start,
            position: object_start,
            closers: Vec::new(),
            in_string: false,
            escaped: false,
            string_start: object_start,
        }
    }

    fn feed(&mut self, chunk: &[u8]) -> Scan {
        for (idx, &byte) in chunk.iter().enumerate() {
            let at = self.position;
            self.position += 1;
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                } else if byte < 0x20 {
                    let err = Error::new(ErrorKind::Syntax)
                        .with_offset(self.string_start)
                        .with_message(format!(
                            "unterminated string, control character 0x{byte:02x} at byte offset {at}"
                        ));
                    return Scan::Failed(idx, err);
                }
                continue;
            }
            match byte {
                b'"' => {
                    self.in_string = true;
                    self.string_start = at;
                }
                b'{' => self.closers.push(b'}'),
                b'[' => self.closers.push(b']'),
                b'}' | b']' => match self.closers.pop() {
                    Some(expected) if expected == byte => {
                        if self.closers.is_empty() {
                            return Scan::Done(idx + 1);
                        }
                    }
                    expected => {
                        let message = match expected {
                            Some(expected) => format!(
                                "mismatched '{}', expected '{}'",
                                byte as char, expected as char
                            ),
                            None => format!("unbalanced '{}'", byte as char),
                        };
                        let err = Error::new(ErrorKind::Syntax)
                            .with_offset(at)
                            .with_message(message);
                        return Scan::Failed(idx, err);
                    }
                },
                _ => {}
            }
        }
        Scan::Pending(chunk.len())
    }

    fn end_of_input(&self) -> Error {
        let (offset, message) = if self.in_string {
            (self.string_start, "unexpected end of input in string")
        } else {
            (self.object_start, "unexpected end of input in object")
        };
        Error::new(ErrorKind::Syntax)
            .with_offset(offset)
            .with_message(message)
    }
}

fn parse_operation(object: Bytes, start: u64) -> Result<Document, Error> {
    let raw: RawOperation<'_> =
        serde_json::from_slice(&object).map_err(|err| json_error(&object, start, err))?;
    let token_offset = |token: &RawValue| {
        range_within(&object, token.get().as_bytes())
            .map_or(start, |range| start + range.start as u64)
    };

    let mut keys = [
        (Operation::Put, raw.put),
        (Operation::Update, raw.update),
        (Operation::Remove, raw.remove),
    ]
    .into_iter()
    .filter_map(|(operation, token)| token.map(|token| (operation, token)));
    let (operation, token) = keys.next().ok_or_else(|| {
        schema_error(
            start,
            "operation object must contain one of \"put\", \"update\", or \"remove\"",
        )
    })?;
    if let Some((other, _)) = keys.next() {
        return Err(schema_error(
            start,
            format!("operation object has both \"{operation}\" and \"{other}\""),
        ));
    }

    let at = token_offset(token);
    let literal: String = serde_json::from_str(token.get()).map_err(|err| {
        schema_error(at, format!("\"{operation}\" must be a document id string")).with_source(err)
    })?;
    let id = DocumentId::parse(&literal).map_err(|err| err.with_offset(at))?;

    let fields = if operation.takes_fields() {
        let token = raw.fields.ok_or_else(|| {
            schema_error(start, format!("\"{operation}\" operation requires \"fields\""))
        })?;
        if !token.get().starts_with('{') {
            return Err(schema_error(
                token_offset(token),
                "\"fields\" must be a JSON object",
            ));
        }
        let range = range_within(&object, token.get().as_bytes())
            .ok_or_else(|| schema_error(start, "fields payload is not contiguous"))?;
        Some(object.slice(range))
    } else {
        None
    };

    let create = raw.create.unwrap_or(false);
    if create && operation == Operation::Remove {
        return Err(schema_error(
            start,
            "\"create\" is not supported for remove operations",
        ));
    }

    Ok(Document {
        id,
        operation,
        fields,
        condition: raw.condition,
        create,
    })
}

/// Byte range of `part` inside `whole`, when `part` borrows from it.
fn range_within(whole: &[u8], part: &[u8]) -> Option<Range<usize>> {
    let base = whole.as_ptr() as usize;
    let begin = part.as_ptr() as usize;
    if begin < base || begin + part.len() > base + whole.len() {
        return None;
    }
    let start = begin - base;
    Some(start..start + part.len())
}

fn json_error(object: &[u8], start: u64, err: serde_json::Error) -> Error {
    let kind = match err.classify() {
        serde_json::error::Category::Data => ErrorKind::Schema,
        _ => ErrorKind::Syntax,
    };
    let at = start + position_index(object, err.line(), err.column()) as u64;
    let text = err.to_string();
    let cause = match text.rfind(" at line ") {
        Some(pos) if err.line() > 0 => text[..pos].to_string(),
        _ => text,
    };
    Error::new(kind)
        .with_offset(at)
        .with_message(cause)
        .with_source(err)
}

/// Convert serde_json's 1-based line/column into an index into `object`.
fn position_index(object: &[u8], line: usize, column: usize) -> usize {
    if line == 0 || object.is_empty() {
        return 0;
    }
    let line_start = object
        .split_inclusive(|b| *b == b'\n')
        .take(line - 1)
        .map(<[u8]>::len)
        .sum::<usize>();
    (line_start + column.saturating_sub(1)).min(object.len() - 1)
}

fn snippet(bytes: &[u8]) -> String {
    if bytes.len() <= MAX_SNIPPET_BYTES {
        return bytes.to_str_lossy().into_owned();
    }
    format!("{}...", bytes[..MAX_SNIPPET_BYTES].to_str_lossy())
}

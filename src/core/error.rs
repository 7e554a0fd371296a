//! Purpose: Single error value shared by id parsing, feed decoding, and generation.
//! Exports: `Error`, `ErrorKind`.
//! Role: Carries the failure category plus byte offset and offending literal for diagnostics.
//! Invariants: Offsets are absolute positions in the decoded stream, never object-relative.
//! Invariants: Display text is stable; callers may match on the `invalid json at byte offset` prefix.
use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Top-level structure is wrong: neither `[` nor an object, bad separators, trailing bytes.
    Framing,
    /// A JSON token inside an object is malformed.
    Syntax,
    /// Well-formed JSON that is not a valid feed operation.
    Schema,
    /// The document id literal violates the id grammar.
    Identifier,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    literal: Option<String>,
    offset: Option<u64>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            literal: None,
            offset: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn literal(&self) -> Option<&str> {
        self.literal.as_deref()
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_literal(mut self, literal: impl Into<String>) -> Self {
        self.literal = Some(literal.into());
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    fn label(&self) -> &'static str {
        match self.kind {
            ErrorKind::Framing | ErrorKind::Syntax | ErrorKind::Schema => "invalid json",
            ErrorKind::Identifier => "invalid document id",
            ErrorKind::Io => "read failed",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())?;
        if let Some(literal) = &self.literal {
            write!(f, " {literal:?}")?;
        }
        if let Some(offset) = self.offset {
            write!(f, " at byte offset {offset}")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind};
    use std::error::Error as _;
    use std::io;

    #[test]
    fn display_names_offset_and_cause() {
        let err = Error::new(ErrorKind::Syntax)
            .with_offset(122)
            .with_message("unterminated string");
        assert_eq!(
            err.to_string(),
            "invalid json at byte offset 122: unterminated string"
        );
    }

    #[test]
    fn display_quotes_identifier_literal() {
        let err = Error::new(ErrorKind::Identifier)
            .with_literal("idd:ns:type::x")
            .with_message("must start with \"id:\"");
        assert_eq!(
            err.to_string(),
            "invalid document id \"idd:ns:type::x\": must start with \"id:\""
        );
    }

    #[test]
    fn source_chain_is_preserved() {
        let err = Error::new(ErrorKind::Io)
            .with_offset(3)
            .with_source(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        assert_eq!(err.to_string(), "read failed at byte offset 3");
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("closed"));
    }
}

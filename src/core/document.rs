//! Purpose: Typed feed operations produced by the decoder.
//! Exports: `Operation`, `Document`.
//! Role: Hand-off value between decoding and whatever ships documents to the backend.
//! Invariants: `fields` holds the verbatim JSON bytes of the payload; it is never re-encoded.
//! Invariants: Remove operations never carry fields.
use std::fmt;

use bytes::Bytes;

use crate::core::id::DocumentId;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    Put,
    Update,
    Remove,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::Put, Operation::Update, Operation::Remove];

    /// JSON key naming this operation in a feed object.
    pub fn key(self) -> &'static str {
        match self {
            Operation::Put => "put",
            Operation::Update => "update",
            Operation::Remove => "remove",
        }
    }

    pub fn takes_fields(self) -> bool {
        !matches!(self, Operation::Remove)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub operation: Operation,
    pub fields: Option<Bytes>,
    /// Test-and-set condition; passed through untouched.
    pub condition: Option<String>,
    /// Create the document if an update targets a missing one.
    pub create: bool,
}

impl Document {
    pub fn put(id: DocumentId, fields: impl Into<Bytes>) -> Self {
        Self::with_fields(id, Operation::Put, fields)
    }

    pub fn update(id: DocumentId, fields: impl Into<Bytes>) -> Self {
        Self::with_fields(id, Operation::Update, fields)
    }

    pub fn remove(id: DocumentId) -> Self {
        Self {
            id,
            operation: Operation::Remove,
            fields: None,
            condition: None,
            create: false,
        }
    }

    fn with_fields(id: DocumentId, operation: Operation, fields: impl Into<Bytes>) -> Self {
        Self {
            id,
            operation,
            fields: Some(fields.into()),
            condition: None,
            create: false,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Payload as text; fields are always valid UTF-8 JSON when produced by the decoder.
    pub fn fields_str(&self) -> Option<&str> {
        self.fields
            .as_deref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

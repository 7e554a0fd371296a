//! Purpose: Define the stable public Rust API boundary for docfeed.
//! Exports: Document ids, feed operations, the decoder, and the synthetic generator.
//! Role: Public, additive-only surface; hides the byte-level reader internals.
//! Invariants: This module is the only public path to core types.
//! Invariants: Internal modules remain private and are not directly exposed.

pub use crate::core::decoder::{Decoder, DecoderConfig, Framing};
pub use crate::core::document::{Document, Operation};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::generator::{Clock, Generator, GeneratorConfig, ManualClock, SystemClock};
pub use crate::core::id::{DocumentId, IdOption};

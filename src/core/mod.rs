// Core modules implementing id parsing, feed decoding, generation, and error modeling.
pub mod decoder;
pub mod document;
pub mod error;
pub mod generator;
pub mod id;
pub mod offset;

//! Purpose: Document id parsing and feed-operation decoding for bulk document pipelines.
//! Exports: `api` (ids, documents, decoder, synthetic generator, errors).
//! Role: Core consumed by feed clients; transport, auth, and CLI live in those clients.
//! Invariants: Decoding is single-pass and forward-only over any `std::io::Read`.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
mod core;

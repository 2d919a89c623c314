//! Response decoder module
//!
//! Extracts records from JSON response bodies and reads/writes the
//! CSV files produced by the batch jobs.

pub mod csv;
mod decoders;
mod types;

pub use decoders::{lookup, lookup_string, JsonDecoder};
pub use types::RecordDecoder;

#[cfg(test)]
mod tests;

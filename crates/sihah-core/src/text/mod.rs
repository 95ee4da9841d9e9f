//! Hebrew-aware text normalization and analysis.
//!
//! Everything here is pure and deterministic: no I/O, no clocks, and the
//! lexicons are compiled in.

pub mod analyzer;
pub mod bidi;
pub mod entities;
pub mod hebrew;
pub mod sentiment;

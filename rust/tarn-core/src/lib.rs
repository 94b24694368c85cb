//! Tarn Core
//!
//! Shared value model, concrete/abstract type tables, iterators, structured
//! error values, and the compiled program format used by the dispatch
//! builder and the VM.

pub mod diagnostics;
pub mod iterator;
pub mod program;
pub mod types;
pub mod values;

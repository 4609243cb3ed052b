//! Markdown repair passes for generated answers.
//!
//! Every pass is a pure `&str -> String` function that leaves fenced code
//! untouched unless the block is provably a misplaced table.

pub mod fence;
mod finalize;
mod tables;

pub use finalize::finalize_document;
pub use tables::repair_tables;

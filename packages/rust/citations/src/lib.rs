//! Source catalog and citation resolution.
//!
//! [`SourceCatalog`] maps reference keys to citation entries for one turn;
//! [`CitationResolver`] rewrites every citation reference in the finished
//! answer into a `[[SOURCE:name:doc_id:url]]` marker, deleting the ones that
//! point at nothing.

mod catalog;
pub mod markers;
mod resolver;
mod rules;

pub use catalog::{CatalogEntry, NameCleaner, SourceCatalog};
pub use markers::{MarkerMatch, find_markers, render_plain, replace_markers};
pub use resolver::{CitationResolver, Resolution, ResolveStats, resolve_citations};
pub use rules::RuleKind;

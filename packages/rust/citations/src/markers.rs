//! Scanning and rendering of emitted citation markers.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use citeflow_shared::{CitationMarker, LinkTarget, RenderConfig};

pub(crate) static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[SOURCE:[^\n]*?\]\]").expect("valid regex"));

/// A marker found in text, with its byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerMatch {
    pub range: Range<usize>,
    pub marker: CitationMarker,
}

/// All well-formed markers in `text`, in order.
pub fn find_markers(text: &str) -> Vec<MarkerMatch> {
    MARKER_RE
        .find_iter(text)
        .filter_map(|m| {
            CitationMarker::parse(m.as_str()).ok().map(|marker| MarkerMatch {
                range: m.range(),
                marker,
            })
        })
        .collect()
}

/// Replace every well-formed marker with `f(marker)`. Malformed tokens are
/// copied through.
pub fn replace_markers<F>(text: &str, mut f: F) -> String
where
    F: FnMut(&CitationMarker) -> String,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for found in find_markers(text) {
        out.push_str(&text[last..found.range.start]);
        out.push_str(&f(&found.marker));
        last = found.range.end;
    }
    out.push_str(&text[last..]);
    out
}

/// Render markers as Markdown links for terminal display.
///
/// A marker with a source URL links there; one with a full-length doc id links
/// to the document view; anything else becomes emphasized text.
pub fn render_plain(text: &str, render: &RenderConfig) -> String {
    replace_markers(text, |marker| match marker.link_target(render) {
        LinkTarget::Url(url) | LinkTarget::Document(url) => format!("[{}]({url})", marker.name),
        LinkTarget::Plain => format!("*{}*", marker.name),
    })
}

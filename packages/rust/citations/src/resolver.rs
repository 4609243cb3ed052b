//! Rewrites citation references into canonical markers.
//!
//! Every rule in [`RuleKind::PRECEDENCE`] runs as its own pass over the
//! output of the previous one. Fenced code, inline code spans and markers
//! already emitted are never rewritten, which makes resolution idempotent.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{debug, instrument, trace};

use citeflow_markdown::fence;

use crate::catalog::SourceCatalog;
use crate::markers::MARKER_RE;
use crate::rules::{self, RuleKind};

static CODE_SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`\n]*`").expect("valid regex"));

static DOUBLE_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(?:\s*,)+").expect("valid regex"));

static ADJACENT_MARKERS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\]\][ \t]*\[\[SOURCE:").expect("valid regex"));

static INNER_SPACES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\S)[ \t]{2,}").expect("valid regex"));

static NEWLINE_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Counts from one resolution run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Markers emitted.
    pub resolved: usize,
    /// References (or list entries) deleted as unresolvable.
    pub dropped: usize,
}

/// Resolved text plus what happened to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub text: String,
    pub stats: ResolveStats,
}

/// Applies the rule table against one turn's catalog.
#[derive(Debug, Clone, Copy)]
pub struct CitationResolver<'a> {
    catalog: &'a SourceCatalog,
}

impl<'a> CitationResolver<'a> {
    pub fn new(catalog: &'a SourceCatalog) -> Self {
        Self { catalog }
    }

    /// Rule application order.
    pub fn rule_order() -> &'static [RuleKind] {
        &RuleKind::PRECEDENCE
    }

    /// Resolve every citation reference in `text`.
    #[instrument(skip_all, fields(len = text.len(), sources = self.catalog.len()))]
    pub fn resolve(&self, text: &str) -> Resolution {
        let mut stats = ResolveStats::default();
        let mut current = text.to_string();

        for &kind in Self::rule_order() {
            current = fence::map_prose(&current, |prose| {
                map_open(prose, &PROTECTED_RE, |span| self.apply(kind, span, &mut stats))
            });
        }

        let text = fence::map_prose(&current, cosmetic_repair);

        debug!(
            resolved = stats.resolved,
            dropped = stats.dropped,
            "citations resolved"
        );
        Resolution { text, stats }
    }

    /// Run one rule over an unprotected span.
    fn apply(&self, kind: RuleKind, span: &str, stats: &mut ResolveStats) -> String {
        let mut out = String::with_capacity(span.len());
        let mut last = 0;

        for caps in kind.regex().captures_iter(span) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(replacement) = self.rewrite(kind, span, &caps, stats) else {
                continue;
            };
            trace!(rule = %kind, reference = whole.as_str(), "rewriting reference");
            out.push_str(&span[last..whole.start()]);
            last = whole.end();
            if replacement.is_empty() {
                last += close_gap(&mut out, &span[last..]);
            } else {
                out.push_str(&replacement);
            }
        }

        out.push_str(&span[last..]);
        out
    }

    /// Replacement text for one match, or `None` to leave it as written.
    fn rewrite(
        &self,
        kind: RuleKind,
        span: &str,
        caps: &Captures<'_>,
        stats: &mut ResolveStats,
    ) -> Option<String> {
        let whole = caps.get(0)?;
        match kind {
            RuleKind::Paired | RuleKind::Qualified | RuleKind::Single => {
                let numbers = (1..caps.len()).filter_map(|i| caps.get(i)).map(|m| m.as_str());
                Some(self.markers_for(numbers, stats))
            }
            RuleKind::NumericList | RuleKind::Parenthetical => {
                Some(self.markers_for(rules::numbers(whole.as_str()), stats))
            }
            RuleKind::Named => {
                let name = caps.get(1).map_or("", |m| m.as_str());
                let entry = match name.parse::<u32>() {
                    Ok(ordinal) => self.catalog.by_ordinal(ordinal),
                    Err(_) => self.catalog.by_name(name),
                };
                match entry {
                    Some(entry) => {
                        stats.resolved += 1;
                        Some(entry.marker.to_string())
                    }
                    None => {
                        stats.dropped += 1;
                        Some(String::new())
                    }
                }
            }
            RuleKind::Bare => {
                if self.catalog.is_empty() || !is_bare_citation(span, whole.start(), whole.end()) {
                    return None;
                }
                Some(self.markers_for(rules::numbers(whole.as_str()), stats))
            }
            RuleKind::Orphan => {
                stats.dropped += rules::numbers(whole.as_str()).count().max(1);
                Some(String::new())
            }
        }
    }

    /// Markers for each resolvable ordinal, joined by `, `.
    fn markers_for<'t>(
        &self,
        numbers: impl Iterator<Item = &'t str>,
        stats: &mut ResolveStats,
    ) -> String {
        let mut markers = Vec::new();
        for number in numbers {
            match number.parse::<u32>().ok().and_then(|n| self.catalog.by_ordinal(n)) {
                Some(entry) => markers.push(entry.marker.to_string()),
                None => stats.dropped += 1,
            }
        }
        stats.resolved += markers.len();
        markers.join(", ")
    }
}

/// Resolve `text` against `catalog` and return only the text.
pub fn resolve_citations(text: &str, catalog: &SourceCatalog) -> String {
    CitationResolver::new(catalog).resolve(text).text
}

/// Tidy the gap a deleted reference left between `out` and `rest`.
///
/// When the next visible character is `,`, `.` or a line break, the spaces
/// on both sides go, and so does a comma directly before the gap (`a, [x], b`
/// reads `a, b`). Returns how many bytes of `rest` were consumed.
fn close_gap(out: &mut String, rest: &str) -> usize {
    let after = rest.trim_start_matches([' ', '\t']);
    if !after.starts_with([',', '.', '\n', '\r']) {
        return 0;
    }
    out.truncate(out.trim_end_matches([' ', '\t']).len());
    if out.ends_with(',') {
        out.pop();
    }
    rest.len() - after.len()
}

/// `[N]` is a citation unless it indexes something (`arr[1]`, `m[1][2]`) or
/// starts a link or reference definition (`[1](url)`, `[1]: url`). A run of
/// bare groups such as `[1][3]` is judged by what precedes the first group.
fn is_bare_citation(span: &str, start: usize, end: usize) -> bool {
    if span[end..].starts_with(['(', ':']) {
        return false;
    }

    let mut head = &span[..start];
    loop {
        match head.chars().next_back() {
            Some(']') => match preceding_bare_group(head) {
                Some(open) => head = &head[..open],
                None => return false,
            },
            Some(c) if c.is_alphanumeric() || c == '_' => return false,
            _ => return true,
        }
    }
}

/// Start of a `[digits]` group ending `text`, if there is one.
fn preceding_bare_group(text: &str) -> Option<usize> {
    let inner = text.strip_suffix(']')?;
    let digits = inner.trim_end_matches(|c: char| c.is_ascii_digit());
    if digits.len() == inner.len() {
        return None;
    }
    digits.strip_suffix('[').map(str::len)
}

// ---------------------------------------------------------------------------
// Protected spans
// ---------------------------------------------------------------------------

static PROTECTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("{}|{}", MARKER_RE.as_str(), CODE_SPAN_RE.as_str())).expect("valid regex")
});

/// Apply `f` to the stretches of `text` not matched by `protected`.
fn map_open<F>(text: &str, protected: &Regex, mut f: F) -> String
where
    F: FnMut(&str) -> String,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in protected.find_iter(text) {
        out.push_str(&f(&text[last..m.start()]));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&f(&text[last..]));
    out
}

// ---------------------------------------------------------------------------
// Cosmetic repair
// ---------------------------------------------------------------------------

/// Tidy punctuation and whitespace left behind by rewrites.
fn cosmetic_repair(prose: &str) -> String {
    let tidied = map_open(prose, &CODE_SPAN_RE, |span| {
        let s = DOUBLE_COMMA_RE.replace_all(span, ",");
        INNER_SPACES_RE.replace_all(&s, "$1 ").into_owned()
    });
    let s = ADJACENT_MARKERS_RE.replace_all(&tidied, "]], [[SOURCE:");
    NEWLINE_RUN_RE.replace_all(&s, "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NameCleaner;
    use citeflow_shared::SourceRecord;

    const DOC_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const DOC_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const DOC_C: &str = "cccccccccccccccccccccccccccccccc";

    fn catalog() -> SourceCatalog {
        let records = vec![
            SourceRecord {
                ordinal: 1,
                title: "Paper A".into(),
                doc_id: DOC_A.into(),
                source_url: None,
            },
            SourceRecord {
                ordinal: 2,
                title: "uploads/Budget: 2024.xlsx".into(),
                doc_id: DOC_B.into(),
                source_url: None,
            },
            SourceRecord {
                ordinal: 3,
                title: "Site".into(),
                doc_id: DOC_C.into(),
                source_url: Some("https://example.com/x".into()),
            },
        ];
        SourceCatalog::build(&records, &NameCleaner::default())
    }

    fn a() -> String {
        format!("[[SOURCE:Paper A:{DOC_A}:]]")
    }
    fn b() -> String {
        format!("[[SOURCE:Budget- 2024.xlsx:{DOC_B}:]]")
    }
    fn c() -> String {
        format!("[[SOURCE:Site:{DOC_C}:https://example.com/x]]")
    }

    fn resolve(text: &str) -> String {
        resolve_citations(text, &catalog())
    }

    #[test]
    fn resolves_single_reference() {
        assert_eq!(resolve("see [Source 1]"), format!("see {}", a()));
    }

    #[test]
    fn unresolvable_reference_leaves_nothing_behind() {
        assert_eq!(resolve("[Source 9]"), "");
        assert_eq!(resolve("Growth was strong [Source 9]."), "Growth was strong.");
        assert_eq!(resolve("One [Source 9] two"), "One two");
    }

    #[test]
    fn resolves_paired_form() {
        assert_eq!(resolve("x [Source 1, Source 2]"), format!("x {}, {}", a(), b()));
    }

    #[test]
    fn resolves_numeric_lists() {
        assert_eq!(resolve("[Sources 1, 3]"), format!("{}, {}", a(), c()));
        assert_eq!(resolve("[Source 1 and 2]"), format!("{}, {}", a(), b()));
        assert_eq!(resolve("[source 2 & source 3]"), format!("{}, {}", b(), c()));
    }

    #[test]
    fn numeric_list_drops_unknown_numbers() {
        let resolution = CitationResolver::new(&catalog()).resolve("[Sources 1, 7, 3]");
        assert_eq!(resolution.text, format!("{}, {}", a(), c()));
        assert_eq!(resolution.stats, ResolveStats { resolved: 2, dropped: 1 });
    }

    #[test]
    fn resolves_parenthetical_form() {
        assert_eq!(resolve("as shown (Source 3)."), format!("as shown {}.", c()));
    }

    #[test]
    fn qualified_form_drops_free_text() {
        assert_eq!(resolve("[Source 2: the budget sheet]"), b());
    }

    #[test]
    fn named_form_looks_up_cleaned_name() {
        assert_eq!(resolve("[Source: Paper A]"), a());
        assert_eq!(resolve("[Source: Budget: 2024.xlsx]"), b());
        assert_eq!(resolve("[Source: 3]"), c());
        assert_eq!(resolve("Per [Source: Nowhere] this"), "Per this");
    }

    #[test]
    fn resolves_bare_numbers() {
        assert_eq!(resolve("fact [2]"), format!("fact {}", b()));
        assert_eq!(resolve("fact [1][3]"), format!("fact {}, {}", a(), c()));
    }

    #[test]
    fn bare_guard_keeps_indexing_and_links() {
        for text in ["arr[1]", "m[1][2]", "see [1](https://x.dev)", "[1]: https://x.dev", "x_[2]"] {
            assert_eq!(resolve(text), text);
        }
    }

    #[test]
    fn bare_numbers_are_kept_without_sources() {
        let empty = SourceCatalog::build(&[], &NameCleaner::default());
        assert_eq!(resolve_citations("step [1]", &empty), "step [1]");
        assert_eq!(resolve_citations("claim [Source 1].", &empty), "claim.");
    }

    #[test]
    fn orphan_forms_are_deleted() {
        assert_eq!(resolve("a [Source 8, Source 9: both] b"), "a b");
    }

    #[test]
    fn adjacent_markers_get_separated() {
        assert_eq!(resolve("[Source 1] [Source 2]"), format!("{}, {}", a(), b()));
        assert_eq!(resolve("[Source 1][Source 3]"), format!("{}, {}", a(), c()));
    }

    #[test]
    fn deleted_entries_leave_no_double_commas() {
        assert_eq!(
            resolve("[Source 1], [Source 9], [Source 2]"),
            format!("{}, {}", a(), b())
        );
    }

    #[test]
    fn code_is_never_rewritten() {
        let text = "Index with `arr[Source 1]` or\n\n```\nx = [Source 1]\ny  =  [2]\n```\n";
        assert_eq!(resolve(text), text);
    }

    #[test]
    fn whitespace_cleanup_keeps_indentation() {
        assert_eq!(resolve("    indented  text\n\n\n\nnext"), "    indented text\n\nnext");
    }

    #[test]
    fn resolution_is_idempotent() {
        let inputs = [
            "see [Source 1] and [Sources 2, 9] (Source 3) [Source: Paper A] [2]",
            "[Source 1][1] x[2] [Source 7: gone] ,, done .",
            "`[Source 1]` [[SOURCE:Paper A:abc:]]\n\n\n\n[3]",
            "a . . b",
            "Costs [Source 9] , [Source 8] . Next",
            "See [Source 1] , , . done",
            "He paused . . . then spoke [Source 1].",
        ];
        let catalog = catalog();
        for input in inputs {
            let once = resolve_citations(input, &catalog);
            assert_eq!(resolve_citations(&once, &catalog), once, "input: {input}");
        }
    }

    #[test]
    fn cleanup_reaches_a_fixpoint_around_punctuation() {
        let references = ["[Source 1]", "[Source 9]", "[7]", "[Source 8: gone]", ""];
        let gaps = ["", " ", "  ", "\t", " \t "];
        let tails = [".", ",", " .", " ,", " . .", " , , .", ",,", " ...", "\n", " and more"];

        let catalog = catalog();
        for reference in references {
            for gap in gaps {
                for tail in tails {
                    let input = format!("Claim{gap}{reference}{gap}{tail} end");
                    let once = resolve_citations(&input, &catalog);
                    let twice = resolve_citations(&once, &catalog);
                    assert_eq!(twice, once, "input: {input:?}");
                }
            }
        }
    }

    #[test]
    fn spaced_ellipsis_is_left_alone() {
        assert_eq!(resolve("a . . b"), "a . . b");
        assert_eq!(
            resolve("He paused . . . then spoke [Source 1]."),
            format!("He paused . . . then spoke {}.", a())
        );
    }

    #[test]
    fn deleted_references_merge_with_surrounding_punctuation() {
        assert_eq!(resolve("Costs [Source 9] , [Source 8] . Next"), "Costs. Next");
        assert_eq!(resolve("a\t [Source 9]\t, b"), "a, b");
        assert_eq!(resolve("first [Source 9]\nsecond"), "first\nsecond");
        assert_eq!(resolve("claim [Source 1], [Source 9]."), format!("claim {}.", a()));
    }

    #[test]
    fn rule_order_matches_precedence() {
        let order = CitationResolver::rule_order();
        assert_eq!(order.first(), Some(&RuleKind::Paired));
        assert_eq!(order.last(), Some(&RuleKind::Orphan));
        assert_eq!(order.len(), 8);
    }
}

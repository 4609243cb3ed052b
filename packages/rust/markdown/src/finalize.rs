//! Final cleanup of a resolved answer before it is rendered.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::fence::{self, Segment};

/// `Sources Used:` / `Citation Coverage:` summary lines, optionally bulleted or bold.
static SUMMARY_BANNER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[ \t]*(?:[-*+][ \t]+)?(?:\*\*|__)?[ \t]*(?:sources[ \t]+used|citation[ \t]+coverage)[ \t]*(?:\*\*|__)?[ \t]*:",
    )
    .expect("valid regex")
});

/// Emoji-prefixed source listing headers such as `📚 Sources` or `🔗 **References:**`.
static EMOJI_BANNER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[ \t]*(?:[-*+][ \t]+)?(?:\*\*|__|#{1,6}[ \t]+)?[ \t]*(?:📚|📄|📖|📑|📎|🔗|📘|🗂\x{FE0F}?)[ \t]*(?:\*\*|__)?[ \t]*(?:\w+[ \t]+){0,2}(?:sources?|references?|citations?|documents?)\b",
    )
    .expect("valid regex")
});

static RULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*(?:-{3,}|\*{3,}|_{3,})[ \t]*$").expect("valid regex"));

static BLANK_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(?:[ \t\r]*\n){2,}").expect("valid regex"));

/// Strip generator banners, collapse blank runs and trim.
///
/// Fenced code is never modified apart from the outer trim.
pub fn finalize_document(text: &str) -> String {
    let mut stripped = 0usize;
    let without_banners = fence::map_prose(text, |prose| {
        let mut out = String::with_capacity(prose.len());
        for line in prose.split_inclusive('\n') {
            if is_banner(line) {
                stripped += 1;
                continue;
            }
            out.push_str(line);
        }
        out
    });

    let without_rule = if stripped > 0 {
        debug!(stripped, "removed banner lines");
        strip_trailing_rule(&without_banners)
    } else {
        without_banners
    };

    let collapsed = fence::map_prose(&without_rule, |prose| {
        BLANK_RUN_RE.replace_all(prose, "\n\n").into_owned()
    });

    collapsed.trim().to_string()
}

fn is_banner(line: &str) -> bool {
    SUMMARY_BANNER_RE.is_match(line) || EMOJI_BANNER_RE.is_match(line)
}

/// Drop a horizontal rule left as the last line once banners are gone.
///
/// A rule directly under a text line is a setext heading and stays.
fn strip_trailing_rule(text: &str) -> String {
    let segments = fence::split_segments(text);
    let Some(Segment::Prose(tail)) = segments.last() else {
        return text.to_string();
    };
    let prefix = &text[..text.len() - tail.len()];

    let trimmed = tail.trim_end();
    let (before, last_line) = trimmed.rsplit_once('\n').unwrap_or(("", trimmed));
    let previous_line = before.rsplit('\n').next().unwrap_or_default();

    if RULE_RE.is_match(last_line) && previous_line.trim().is_empty() {
        debug!("removed dangling horizontal rule");
        format!("{prefix}{before}")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_summary_banners() {
        let input = "Answer text.\n\nSources Used: 3\n**Citation Coverage:** 80%\n";
        assert_eq!(finalize_document(input), "Answer text.");
    }

    #[test]
    fn strips_bulleted_and_bold_variants() {
        let input = "Body.\n- **Sources Used:** A, B\n* Citation coverage: full\nMore body.";
        assert_eq!(finalize_document(input), "Body.\nMore body.");
    }

    #[test]
    fn strips_emoji_source_listings() {
        let input = "Main point.\n\n📚 Sources\n📄 Referenced documents:\n🔗 **References**\nEnd.";
        assert_eq!(finalize_document(input), "Main point.\n\nEnd.");
    }

    #[test]
    fn emoji_without_source_wording_stays() {
        let input = "📚 Reading list for next week";
        assert_eq!(finalize_document(input), input);
    }

    #[test]
    fn removes_dangling_rule_after_banner() {
        let input = "The answer.\n\n---\n📚 Sources used in this answer\n";
        assert_eq!(finalize_document(input), "The answer.");
    }

    #[test]
    fn keeps_rule_when_nothing_was_stripped() {
        let input = "The answer.\n\n---";
        assert_eq!(finalize_document(input), input);
    }

    #[test]
    fn keeps_setext_heading_underline() {
        let input = "Heading\n---\nSources Used: 1";
        assert_eq!(finalize_document(input), "Heading\n---");
    }

    #[test]
    fn collapses_blank_runs() {
        let input = "a\n\n\n\nb\n \n\t\nc";
        assert_eq!(finalize_document(input), "a\n\nb\n\nc");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(finalize_document("\n\n  hello  \n\n"), "hello");
    }

    #[test]
    fn banners_and_blank_runs_inside_code_are_kept() {
        let input = "```text\nSources Used: 2\n\n\n\nend\n```";
        assert_eq!(finalize_document(input), input);
    }

    #[test]
    fn mid_line_mention_is_not_a_banner() {
        let input = "The report lists the sources used: two papers.";
        assert_eq!(finalize_document(input), input);
    }

    #[test]
    fn finalize_is_idempotent() {
        let input = "Text.\n\n\n\n📑 Sources\n\n---\n";
        let once = finalize_document(input);
        assert_eq!(finalize_document(&once), once);
    }
}

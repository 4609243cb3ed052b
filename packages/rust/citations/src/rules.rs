//! Citation reference grammars, in precedence order.
//!
//! Each [`RuleKind`] owns one pattern. The resolver walks
//! [`RuleKind::PRECEDENCE`] front to back, so an earlier rule claims any text
//! a later rule would also match.

use std::sync::LazyLock;

use regex::Regex;

/// Separator between numbers in a list: `,`, `, and`, `&`, or `and`,
/// optionally repeating the `Source` word.
const LIST_SEP: &str = r"\s*(?:,\s*(?:and\s+)?|&\s*|\band\s+)(?:sources?\s+)?";

static PAIRED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[\s*sources?\s+(\d+)\s*,\s*sources?\s+(\d+)\s*\]").expect("valid regex")
});

static NUMERIC_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\[\s*sources?\s+\d+(?:{LIST_SEP}\d+)+\s*\]")).expect("valid regex")
});

static PARENTHETICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\(\s*sources?\s+\d+(?:{LIST_SEP}\d+)*\s*\)")).expect("valid regex")
});

static QUALIFIED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[\s*sources?\s+(\d+)\s*:[^\]\n]*\]").expect("valid regex")
});

static NAMED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[\s*sources?\s*:\s*([^\]\n]*?)\s*\]").expect("valid regex")
});

static SINGLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[\s*sources?\s+(\d+)\s*\]").expect("valid regex"));

static BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("valid regex"));

static ORPHAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\[\s*sources?\s+\d+(?:{LIST_SEP}\d+)*\s*(?::[^\]\n]*)?\]"
    ))
    .expect("valid regex")
});

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

/// One citation reference grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// `[Source N, Source M]`
    Paired,
    /// `[Source N, M, ...]`, `[Sources N and M]`, `[Source N, Source M & O]`
    NumericList,
    /// `(Source N)`, `(Sources N, M)`
    Parenthetical,
    /// `[Source N: free text]`
    Qualified,
    /// `[Source: Name]`
    Named,
    /// `[Source N]`, `[Sources N]`
    Single,
    /// `[N]`
    Bare,
    /// Any leftover `[Source(s) N...]`; always deleted.
    Orphan,
}

impl RuleKind {
    /// Application order. Earlier rules win on overlapping text.
    pub const PRECEDENCE: [RuleKind; 8] = [
        RuleKind::Paired,
        RuleKind::NumericList,
        RuleKind::Parenthetical,
        RuleKind::Qualified,
        RuleKind::Named,
        RuleKind::Single,
        RuleKind::Bare,
        RuleKind::Orphan,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RuleKind::Paired => "paired",
            RuleKind::NumericList => "numeric_list",
            RuleKind::Parenthetical => "parenthetical",
            RuleKind::Qualified => "qualified",
            RuleKind::Named => "named",
            RuleKind::Single => "single",
            RuleKind::Bare => "bare",
            RuleKind::Orphan => "orphan",
        }
    }

    pub(crate) fn regex(self) -> &'static Regex {
        match self {
            RuleKind::Paired => &PAIRED_RE,
            RuleKind::NumericList => &NUMERIC_LIST_RE,
            RuleKind::Parenthetical => &PARENTHETICAL_RE,
            RuleKind::Qualified => &QUALIFIED_RE,
            RuleKind::Named => &NAMED_RE,
            RuleKind::Single => &SINGLE_RE,
            RuleKind::Bare => &BARE_RE,
            RuleKind::Orphan => &ORPHAN_RE,
        }
    }

    /// Whether this rule matches `text` anywhere.
    pub fn matches(self, text: &str) -> bool {
        self.regex().is_match(text)
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Every decimal number in a matched reference, in order.
pub(crate) fn numbers(reference: &str) -> impl Iterator<Item = &str> {
    NUMBER_RE.find_iter(reference).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_rule(text: &str) -> Option<RuleKind> {
        RuleKind::PRECEDENCE.into_iter().find(|k| k.matches(text))
    }

    #[test]
    fn precedence_picks_most_specific_rule() {
        assert_eq!(first_rule("[Source 1, Source 2]"), Some(RuleKind::Paired));
        assert_eq!(first_rule("[Sources 1, 2, 3]"), Some(RuleKind::NumericList));
        assert_eq!(first_rule("[Source 1 and 2]"), Some(RuleKind::NumericList));
        assert_eq!(first_rule("[source 4 & source 5]"), Some(RuleKind::NumericList));
        assert_eq!(first_rule("(Source 2)"), Some(RuleKind::Parenthetical));
        assert_eq!(first_rule("[Source 3: Annual report]"), Some(RuleKind::Qualified));
        assert_eq!(first_rule("[Source: Annual report]"), Some(RuleKind::Named));
        assert_eq!(first_rule("[SOURCE 7]"), Some(RuleKind::Single));
        assert_eq!(first_rule("[7]"), Some(RuleKind::Bare));
        assert_eq!(first_rule("[Source one]"), None);
    }

    #[test]
    fn paired_rule_needs_both_source_words() {
        assert!(RuleKind::Paired.matches("[Source 1, Source 2]"));
        assert!(!RuleKind::Paired.matches("[Source 1, 2]"));
        assert!(!RuleKind::Paired.matches("[Source 1, Source 2, Source 3]"));
    }

    #[test]
    fn numeric_list_requires_two_numbers() {
        assert!(!RuleKind::NumericList.matches("[Source 1]"));
        assert!(RuleKind::NumericList.matches("[Sources 1, and 2]"));
    }

    #[test]
    fn orphan_covers_every_bracketed_source_form() {
        for text in ["[Source 9]", "[Sources 8, 9]", "[Source 9: text]", "[source 1 and source 2]"] {
            assert!(RuleKind::Orphan.matches(text), "{text}");
        }
        assert!(!RuleKind::Orphan.matches("[Source: Name]"));
    }

    #[test]
    fn no_rule_matches_a_marker_body() {
        let marker = "[[SOURCE:Paper A:0123456789abcdef0123456789abcdef:]]";
        for kind in RuleKind::PRECEDENCE {
            if kind == RuleKind::Named {
                continue;
            }
            assert!(!kind.matches(marker), "{kind} matched a marker");
        }
    }

    #[test]
    fn numbers_extracts_in_order() {
        let found: Vec<_> = numbers("[Sources 3, 1 and source 12]").collect();
        assert_eq!(found, vec!["3", "1", "12"]);
    }
}

//! Core domain types for answer assembly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RenderConfig;
use crate::error::{CiteflowError, Result};

/// Opening token of every citation marker.
pub const MARKER_PREFIX: &str = "[[SOURCE:";

/// Closing token of every citation marker.
pub const MARKER_SUFFIX: &str = "]]";

// ---------------------------------------------------------------------------
// TurnId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one assistant turn (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(pub Uuid);

impl TurnId {
    /// Generate a new time-sortable turn identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SourceRecord
// ---------------------------------------------------------------------------

/// One entry of a completion event's source list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// 1-based position in the completion list.
    pub ordinal: u32,
    /// Display title as sent upstream (not yet cleaned).
    pub title: String,
    /// Backend document identifier; may be empty.
    pub doc_id: String,
    /// Direct link to the source, when the backend has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl SourceRecord {
    /// The numeric catalog key for this record (`"Source 3"`).
    pub fn ordinal_key(&self) -> String {
        format!("Source {}", self.ordinal)
    }
}

// ---------------------------------------------------------------------------
// CitationMarker
// ---------------------------------------------------------------------------

/// Canonical renderer-facing citation token:
/// `[[SOURCE:<name>:<doc_id>:<source_url-or-empty>]]`.
///
/// `name` never contains `:`; the source URL is the last field so its own
/// colons survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationMarker {
    pub name: String,
    pub doc_id: String,
    pub source_url: String,
}

/// Where a rendered citation should point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// The source's own URL, used verbatim.
    Url(String),
    /// A document-view link built from a usable doc id.
    Document(String),
    /// No usable link; show the name as emphasized text.
    Plain,
}

impl CitationMarker {
    /// Parse a complete marker token (including the brackets).
    pub fn parse(token: &str) -> Result<Self> {
        let inner = token
            .strip_prefix(MARKER_PREFIX)
            .and_then(|rest| rest.strip_suffix(MARKER_SUFFIX))
            .ok_or_else(|| CiteflowError::parse(format!("not a citation marker: {token}")))?;

        let Some((name, (doc_id, source_url))) = inner
            .split_once(':')
            .and_then(|(name, rest)| split_doc_id_and_url(rest).map(|fields| (name, fields)))
        else {
            return Err(CiteflowError::parse(format!(
                "citation marker needs name, doc id and url fields: {token}"
            )));
        };

        Ok(Self {
            name: name.to_string(),
            doc_id: doc_id.to_string(),
            source_url: source_url.to_string(),
        })
    }

    /// Resolve the link a renderer should attach to this citation.
    ///
    /// Prefers the source URL; falls back to a document-view link when the
    /// doc id is long enough to be a real identifier.
    pub fn link_target(&self, render: &RenderConfig) -> LinkTarget {
        if !self.source_url.is_empty() {
            return LinkTarget::Url(self.source_url.clone());
        }
        if self.doc_id.len() >= render.min_doc_id_len {
            return LinkTarget::Document(
                render.document_view_url.replace("{doc_id}", &self.doc_id),
            );
        }
        LinkTarget::Plain
    }
}

/// Split `<doc_id>:<source_url>`. Doc ids may contain colons (`doc:3`), so
/// the URL starts at the first colon followed by `scheme://`. Without one the
/// URL is empty when the field ends in a colon.
fn split_doc_id_and_url(rest: &str) -> Option<(&str, &str)> {
    rest.match_indices(':')
        .map(|(i, _)| (&rest[..i], &rest[i + 1..]))
        .find(|(_, url)| has_url_scheme(url))
        .or_else(|| rest.strip_suffix(':').map(|doc_id| (doc_id, "")))
        .or_else(|| rest.split_once(':'))
}

fn has_url_scheme(text: &str) -> bool {
    text.split_once("://").is_some_and(|(scheme, _)| {
        let mut chars = scheme.chars();
        chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

impl std::fmt::Display for CitationMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{MARKER_PREFIX}{}:{}:{}{MARKER_SUFFIX}",
            self.name, self.doc_id, self.source_url
        )
    }
}

// ---------------------------------------------------------------------------
// AnswerDocument
// ---------------------------------------------------------------------------

/// The derived texts of one assistant turn, each produced from the previous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerDocument {
    /// Turn this answer belongs to.
    pub turn_id: TurnId,
    /// Concatenated content deltas, untouched.
    pub raw_text: String,
    /// Raw text with citation references replaced by markers.
    pub resolved_text: String,
    /// Table-repaired, banner-stripped text handed to the renderer.
    pub final_text: String,
    /// Sources from the completion event, in ordinal order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRecord>,
    /// When post-processing finished.
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC_ID: &str = "0f8c2a4e9b1d4c7a8e3f5a6b7c8d9e0f";

    #[test]
    fn turn_ids_are_unique_v7() {
        let first = TurnId::new();
        let second = TurnId::new();
        assert_ne!(first, second);
        assert_eq!(first.0.get_version_num(), 7);
    }

    #[test]
    fn marker_display() {
        let marker = CitationMarker {
            name: "Paper A".into(),
            doc_id: DOC_ID.into(),
            source_url: String::new(),
        };
        assert_eq!(marker.to_string(), format!("[[SOURCE:Paper A:{DOC_ID}:]]"));
    }

    #[test]
    fn marker_parse_keeps_url_colons() {
        let token = "[[SOURCE:Annual Report:abc:https://example.org:8443/r.pdf]]";
        let marker = CitationMarker::parse(token).expect("parse marker");
        assert_eq!(marker.name, "Annual Report");
        assert_eq!(marker.doc_id, "abc");
        assert_eq!(marker.source_url, "https://example.org:8443/r.pdf");
        assert_eq!(marker.to_string(), token);
    }

    #[test]
    fn marker_parse_keeps_colons_in_doc_id() {
        let marker = CitationMarker {
            name: "Handbook".into(),
            doc_id: "doc:3".into(),
            source_url: String::new(),
        };
        let parsed = CitationMarker::parse(&marker.to_string()).expect("parse marker");
        assert_eq!(parsed, marker);

        let with_url = CitationMarker {
            source_url: "https://example.org:8443/h.pdf".into(),
            ..marker
        };
        let parsed = CitationMarker::parse(&with_url.to_string()).expect("parse marker");
        assert_eq!(parsed, with_url);
    }

    #[test]
    fn marker_parse_rejects_garbage() {
        assert!(CitationMarker::parse("[Source 1]").is_err());
        assert!(CitationMarker::parse("[[SOURCE:only-name]]").is_err());
    }

    #[test]
    fn link_target_prefers_url_then_doc_id() {
        let render = RenderConfig::default();

        let with_url = CitationMarker {
            name: "A".into(),
            doc_id: DOC_ID.into(),
            source_url: "https://example.org/a".into(),
        };
        assert_eq!(
            with_url.link_target(&render),
            LinkTarget::Url("https://example.org/a".into())
        );

        let with_doc = CitationMarker {
            source_url: String::new(),
            ..with_url.clone()
        };
        assert_eq!(
            with_doc.link_target(&render),
            LinkTarget::Document(format!("http://localhost:3000/documents/{DOC_ID}"))
        );

        let short_doc = CitationMarker {
            doc_id: "chunk-17".into(),
            source_url: String::new(),
            ..with_url
        };
        assert_eq!(short_doc.link_target(&render), LinkTarget::Plain);
    }

    #[test]
    fn answer_document_serialization() {
        let doc = AnswerDocument {
            turn_id: TurnId::new(),
            raw_text: "see [Source 1]".into(),
            resolved_text: "see [[SOURCE:A:x:]]".into(),
            final_text: "see [[SOURCE:A:x:]]".into(),
            sources: vec![SourceRecord {
                ordinal: 1,
                title: "A".into(),
                doc_id: "x".into(),
                source_url: None,
            }],
            completed_at: Utc::now(),
        };

        let json = serde_json::to_string(&doc).expect("serialize");
        assert!(!json.contains("source_url"));
        let parsed: AnswerDocument = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.sources.len(), 1);
        assert_eq!(parsed.final_text, doc.final_text);
    }
}

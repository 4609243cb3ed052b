//! Fenced code block scanning.
//!
//! Splits Markdown into prose and fenced segments so later passes can rewrite
//! prose without ever touching code. Fences follow CommonMark: up to three
//! spaces of indentation, three or more backticks or tildes, closed by a line
//! of the same character at least as long. An unclosed fence runs to the end
//! of the text.

/// A contiguous piece of a Markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Text outside any fenced block.
    Prose(&'a str),
    /// A fenced block, fences included.
    Fenced(FencedBlock<'a>),
}

/// One fenced block and its parts, all borrowed from the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock<'a> {
    /// Whole block from the opening fence through the closing fence's line ending.
    pub raw: &'a str,
    /// Info string after the opening fence, trimmed (`rust`, `text`, or empty).
    pub info: &'a str,
    /// Lines between the fences.
    pub body: &'a str,
    /// Whether a closing fence was found.
    pub closed: bool,
}

impl FencedBlock<'_> {
    /// First word of the info string, lowercased.
    pub fn language(&self) -> String {
        self.info
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }
}

/// Split `text` into alternating prose and fenced segments.
///
/// Concatenating the segments' text reproduces the input exactly.
pub fn split_segments(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut prose_start = 0;
    let mut offset = 0;
    let mut lines = text.split_inclusive('\n');

    while let Some(line) = lines.next() {
        let line_start = offset;
        offset += line.len();

        let Some((fence_char, fence_len, info)) = fence_open(line_content(line)) else {
            continue;
        };

        if prose_start < line_start {
            segments.push(Segment::Prose(&text[prose_start..line_start]));
        }

        let body_start = offset;
        let mut closed = false;
        let mut body_end = text.len();
        for inner in lines.by_ref() {
            let inner_start = offset;
            offset += inner.len();
            if is_fence_close(line_content(inner), fence_char, fence_len) {
                body_end = inner_start;
                closed = true;
                break;
            }
        }

        segments.push(Segment::Fenced(FencedBlock {
            raw: &text[line_start..offset],
            info,
            body: &text[body_start..body_end],
            closed,
        }));
        prose_start = offset;
    }

    if prose_start < text.len() {
        segments.push(Segment::Prose(&text[prose_start..]));
    }

    segments
}

/// Rewrite every prose segment with `f`, copying fenced blocks verbatim.
pub fn map_prose<F>(text: &str, mut f: F) -> String
where
    F: FnMut(&str) -> String,
{
    let mut out = String::with_capacity(text.len());
    for segment in split_segments(text) {
        match segment {
            Segment::Prose(prose) => out.push_str(&f(prose)),
            Segment::Fenced(block) => out.push_str(block.raw),
        }
    }
    out
}

/// A line without its `\n` / `\r\n` terminator.
pub(crate) fn line_content(line: &str) -> &str {
    line.trim_end_matches('\n').trim_end_matches('\r')
}

/// Parse an opening fence: `(fence char, fence length, info string)`.
fn fence_open(line: &str) -> Option<(char, usize, &str)> {
    let rest = strip_indent(line)?;
    let fence_char = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let fence_len = rest.chars().take_while(|c| *c == fence_char).count();
    if fence_len < 3 {
        return None;
    }

    let info = rest[fence_len..].trim();
    if fence_char == '`' && info.contains('`') {
        return None;
    }
    Some((fence_char, fence_len, info))
}

fn is_fence_close(line: &str, fence_char: char, fence_len: usize) -> bool {
    let Some(rest) = strip_indent(line) else {
        return false;
    };
    let run = rest.chars().take_while(|c| *c == fence_char).count();
    run >= fence_len && rest[run..].trim().is_empty()
}

/// Strip up to three leading spaces; four or more means indented code, not a fence.
fn strip_indent(line: &str) -> Option<&str> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    (indent <= 3).then(|| &line[indent..])
}

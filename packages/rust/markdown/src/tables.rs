//! Table repair for generated Markdown.
//!
//! Generated answers regularly emit tables the renderer cannot display:
//! pipe tables wrapped in a code fence, tab/space aligned columns inside a
//! fence, or pipe tables with no separator row. Three passes rewrite exactly
//! those shapes. Anything that looks like real code, or that already renders
//! as a table, is left byte-for-byte untouched; when in doubt a block is left
//! alone.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::fence::{self, Segment, line_content};

/// Fence languages that may hold accidentally fenced tabular text.
const PLAIN_LANGUAGES: &[&str] = &[
    "", "text", "txt", "plain", "plaintext", "tsv", "table", "markdown", "md",
];

/// Substrings that mark a fenced block as code.
const CODE_SIGNALS: &[&str] = &[
    "{", "}", "(", ")", ";", "//", "def ", "class ", "import ", "function ", "const ", "let ",
    "var ", "return ", "=>",
];

static PIPE_ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\|.*\|\s*$").expect("valid regex"));

static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\|?\s*:?-+:?\s*(?:\|\s*:?-+:?\s*)*\|?\s*$").expect("valid regex")
});

static CELL_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\t[ \t]*| {2,}").expect("valid regex"));

/// Run all table repair passes.
pub fn repair_tables(md: &str) -> String {
    let mut result = unwrap_fenced_pipe_tables(md);
    result = convert_fenced_columns(&result);
    result = insert_missing_separators(&result);
    result
}

// ---------------------------------------------------------------------------
// Pass 1: Unwrap fenced pipe tables
// ---------------------------------------------------------------------------

/// Remove the fence around blocks whose body is nothing but pipe rows.
fn unwrap_fenced_pipe_tables(md: &str) -> String {
    let mut out = String::with_capacity(md.len());
    for segment in fence::split_segments(md) {
        match segment {
            Segment::Prose(prose) => out.push_str(prose),
            Segment::Fenced(block) if block.closed && is_all_pipe_rows(block.body) => {
                debug!(info = block.info, "unwrapping fenced pipe table");
                out.push_str(block.body);
            }
            Segment::Fenced(block) => out.push_str(block.raw),
        }
    }
    out
}

fn is_all_pipe_rows(body: &str) -> bool {
    let mut rows = body.lines().filter(|l| !l.trim().is_empty()).peekable();
    rows.peek().is_some() && rows.all(is_pipe_row)
}

// ---------------------------------------------------------------------------
// Pass 2: Convert fenced column-aligned text
// ---------------------------------------------------------------------------

/// Rewrite fenced tab/space aligned columns as a pipe table.
fn convert_fenced_columns(md: &str) -> String {
    let mut out = String::with_capacity(md.len());
    for segment in fence::split_segments(md) {
        match segment {
            Segment::Prose(prose) => out.push_str(prose),
            Segment::Fenced(block) => {
                let table = (block.closed && PLAIN_LANGUAGES.contains(&block.language().as_str()))
                    .then(|| columns_to_table(block.body))
                    .flatten();
                match table {
                    Some(table) => {
                        debug!(info = block.info, "converted fenced columns to table");
                        out.push_str(&table);
                    }
                    None => out.push_str(block.raw),
                }
            }
        }
    }
    out
}

/// Build a pipe table from column-aligned lines, or `None` if the body is not
/// confidently tabular.
fn columns_to_table(body: &str) -> Option<String> {
    let lines: Vec<&str> = body.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() < 2 || lines.iter().any(|l| has_code_signal(l)) {
        return None;
    }

    let rows: Vec<Vec<String>> = lines
        .iter()
        .map(|line| {
            CELL_SPLIT_RE
                .split(line.trim())
                .map(|cell| cell.trim().replace('|', "\\|"))
                .collect()
        })
        .collect();

    if rows.iter().any(|row| row.len() < 2) {
        return None;
    }

    let columns = rows[0].len();
    let mut table = String::new();
    push_row(&mut table, &rows[0]);
    push_row(&mut table, &vec!["---".to_string(); columns]);
    for row in &rows[1..] {
        let mut cells = row.clone();
        cells.resize(columns, String::new());
        push_row(&mut table, &cells);
    }
    Some(table)
}

fn has_code_signal(line: &str) -> bool {
    CODE_SIGNALS.iter().any(|signal| line.contains(signal))
}

fn push_row(table: &mut String, cells: &[String]) {
    table.push_str("| ");
    table.push_str(&cells.join(" | "));
    table.push_str(" |\n");
}

// ---------------------------------------------------------------------------
// Pass 3: Insert missing separator rows
// ---------------------------------------------------------------------------

/// Insert a `|---|` row under pipe-table headers that lack one.
fn insert_missing_separators(md: &str) -> String {
    fence::map_prose(md, |prose| {
        let lines: Vec<&str> = prose.split_inclusive('\n').collect();
        let mut out = String::with_capacity(prose.len());

        for (i, line) in lines.iter().enumerate() {
            out.push_str(line);

            let header = line_content(line);
            let starts_block = i == 0 || !is_pipe_row(line_content(lines[i - 1]));
            let followed_by_row = lines
                .get(i + 1)
                .map(|next| line_content(next))
                .is_some_and(|next| is_pipe_row(next) && !is_separator(next));

            if starts_block && is_pipe_row(header) && !is_separator(header) && followed_by_row {
                let columns = count_cells(header);
                debug!(columns, "inserting missing table separator");
                out.push('|');
                out.push_str(&"---|".repeat(columns));
                out.push_str(&line[header.len()..]);
            }
        }
        out
    })
}

fn is_pipe_row(line: &str) -> bool {
    PIPE_ROW_RE.is_match(line)
}

fn is_separator(line: &str) -> bool {
    line.contains('-') && SEPARATOR_RE.is_match(line)
}

/// Number of cells in a pipe row, ignoring escaped pipes.
fn count_cells(row: &str) -> usize {
    let inner = row.trim();
    let inner = inner.strip_prefix('|').unwrap_or(inner);
    let inner = inner.strip_suffix('|').unwrap_or(inner);

    let mut count = 1;
    let mut escaped = false;
    for c in inner.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            '|' if !escaped => count += 1,
            _ => escaped = false,
        }
    }
    count
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! File-block protocol codec.
//!
//! The provider returns plain text containing zero or more file blocks. A
//! block begins with a marker naming a path and runs to the next marker, an
//! end marker, or end of input. Two marker dialects are accepted:
//!
//! - `<!-- FILE: path -->`
//! - `--- FILE: path ---` with an optional `--- END FILE ---`
//!
//! When neither dialect yields a block, a heading-based secondary grammar
//! (filename heading followed by a fenced block) is tried before giving up.

use regex::Regex;
use tracing::debug;

use crate::error::CodecError;
use crate::models::FileSet;

/// Blocks shorter than this are treated as noise, not real files.
const MIN_BLOCK_BYTES: usize = 3;

#[derive(Debug)]
enum Event {
    Start { path: String, content_from: usize },
    End,
}

/// Parse provider output into a path-keyed file set.
///
/// Markers are collected in order of appearance; a repeated path keeps the
/// later block (last-write-wins). An empty result is a hard parse failure.
pub fn parse_file_blocks(text: &str) -> Result<FileSet, CodecError> {
    let mut files = scan_markers(text);

    if files.is_empty() {
        files = parse_heading_fallback(text);
        if !files.is_empty() {
            debug!("Parsed {} file(s) via heading fallback grammar", files.len());
        }
    } else {
        debug!("Parsed {} file(s) via marker grammar", files.len());
    }

    if files.is_empty() {
        return Err(CodecError::NoFilesParsed);
    }
    Ok(files)
}

fn scan_markers(text: &str) -> FileSet {
    let mut events: Vec<(usize, Event)> = Vec::new();

    // HTML-comment markers may appear anywhere, including mid-line.
    let mut idx = 0;
    while let Some(pos) = text[idx..].find("<!--") {
        let start = idx + pos;
        let Some(rel) = text[start + 4..].find("-->") else {
            break;
        };
        let inner_end = start + 4 + rel;
        let after = inner_end + 3;
        let inner = text[start + 4..inner_end].trim();
        if let Some(path) = inner.strip_prefix("FILE:") {
            let path = path.trim();
            if !path.is_empty() {
                events.push((
                    start,
                    Event::Start {
                        path: path.to_string(),
                        content_from: after,
                    },
                ));
            }
        }
        idx = after;
    }

    // Dash markers are line tokens: the whole line is the marker.
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let t = line.trim();
        if t.len() >= 7 && t.starts_with("---") && t.ends_with("---") {
            let inner = t.trim_matches('-').trim();
            if let Some(path) = inner.strip_prefix("FILE:") {
                let path = path.trim();
                if !path.is_empty() {
                    events.push((
                        offset,
                        Event::Start {
                            path: path.to_string(),
                            content_from: offset + line.len(),
                        },
                    ));
                }
            } else if inner.eq_ignore_ascii_case("END FILE") {
                events.push((offset, Event::End));
            }
        }
        offset += line.len();
    }

    events.sort_by_key(|(pos, _)| *pos);

    let mut files = FileSet::new();
    for (i, (_, event)) in events.iter().enumerate() {
        let Event::Start { path, content_from } = event else {
            continue;
        };
        let until = events
            .get(i + 1)
            .map(|(pos, _)| *pos)
            .unwrap_or_else(|| text.len());
        let raw = if *content_from < until {
            &text[*content_from..until]
        } else {
            ""
        };
        let content = strip_fence_lines(raw.trim());
        if content.len() >= MIN_BLOCK_BYTES {
            files.insert(path.clone(), content);
        } else if !content.is_empty() {
            debug!("Discarding noise block for {} ({} bytes)", path, content.len());
        }
    }
    files
}

/// Secondary grammar: a heading line naming a filename (optionally bold or a
/// markdown heading) immediately followed by a fenced code block.
fn parse_heading_fallback(text: &str) -> FileSet {
    let heading_re = Regex::new(
        r"(?m)^(?:\*\*|#{1,6}\s+)?([A-Za-z0-9_./\-]+\.[A-Za-z0-9]{1,8})(?:\*\*)?:?\s*\n```[A-Za-z0-9]*\n([\s\S]*?)\n```",
    )
    .unwrap();

    let mut files = FileSet::new();
    for caps in heading_re.captures_iter(text) {
        let path = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let content = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        if !path.is_empty() && content.len() >= MIN_BLOCK_BYTES {
            files.insert(path, content);
        }
    }
    files
}

/// Drop a single leading and/or trailing code-fence line. Providers sometimes
/// wrap block content in fences despite instructions not to.
fn strip_fence_lines(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let start = if is_fence_line(lines[0]) { 1 } else { 0 };
    let end = if lines.len() > start && is_fence_line(lines[lines.len() - 1]) {
        lines.len() - 1
    } else {
        lines.len()
    };
    lines[start..end].join("\n").trim().to_string()
}

/// A line consisting solely of fence punctuation and an optional language tag.
fn is_fence_line(line: &str) -> bool {
    let t = line.trim();
    let rest = if let Some(r) = t.strip_prefix("```") {
        r.trim_start_matches('`')
    } else if let Some(r) = t.strip_prefix("~~~") {
        r.trim_start_matches('~')
    } else {
        return false;
    };
    rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '_')
}

/// Serialize a file set back into dialect-1 protocol text. Used to embed the
/// current output into edit and repair prompts; the archive assembler works
/// from the map directly, not from this.
pub fn render_file_blocks(files: &FileSet) -> String {
    let mut out = String::new();
    for (path, content) in files.iter() {
        out.push_str("<!-- FILE: ");
        out.push_str(path);
        out.push_str(" -->\n");
        out.push_str(content.trim_end());
        out.push_str("\n\n");
    }
    out
}

//! Bounded excerpts of long text around highlighted tokens.

use super::tokenize::{Tokens, tokenize};
use ahash::AHashSet;

/// Marker between two non-adjacent kept lines, and after a cut-off tail.
pub const ELLIPSIS: &str = "...";

/// Longest prefix of `line` that fits in `max_bytes` on a char boundary.
fn clip(line: &str, max_bytes: usize) -> &str {
    if line.len() <= max_bytes {
        return line;
    }
    let mut end = max_bytes;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

/// Select lines of `text` covering `tokens` within `max_bytes`.
///
/// Text that already fits is returned trimmed but otherwise verbatim. Otherwise
/// the first line is always kept, then every line bringing a highlighted token
/// not covered yet (while it fits), then any remaining lines in order until the
/// first one that does not fit. Each kept line costs its length plus one
/// separator byte.
pub fn select_snippets(text: &str, tokens: &Tokens, max_bytes: usize) -> String {
    let text = text.trim();
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let Some(&first) = lines.first() else {
        return String::new();
    };

    let head = clip(first, max_bytes);
    let mut kept = vec![0];
    let mut count = head.len() + 1;
    let mut seen: AHashSet<&str> = tokenize(head)
        .iter()
        .filter_map(|t| tokens.get(t).map(String::as_str))
        .collect();

    for (i, line) in lines.iter().enumerate().skip(1) {
        if count >= max_bytes {
            break;
        }
        let line_tokens = tokenize(line);
        let fresh: Vec<&str> = tokens
            .iter()
            .map(String::as_str)
            .filter(|t| !seen.contains(t) && line_tokens.contains(*t))
            .collect();
        if !fresh.is_empty() && count + line.len() + 1 < max_bytes {
            kept.push(i);
            count += line.len() + 1;
            seen.extend(fresh);
        }
    }

    if count < max_bytes {
        for (i, line) in lines.iter().enumerate() {
            if kept.contains(&i) {
                continue;
            }
            if count + line.len() >= max_bytes {
                break;
            }
            kept.push(i);
            count += line.len() + 1;
        }
    }
    kept.sort_unstable();

    let mut out = String::with_capacity(count + ELLIPSIS.len() * kept.len());
    for (pos, &idx) in kept.iter().enumerate() {
        if pos > 0 {
            if idx == kept[pos - 1] + 1 {
                out.push(' ');
            } else {
                out.push_str(ELLIPSIS);
            }
        }
        out.push_str(if idx == 0 { head } else { lines[idx] });
    }

    let last_kept = kept.last().copied().unwrap_or_default();
    if last_kept != lines.len() - 1 || head.len() < first.len() {
        out.push_str(ELLIPSIS);
    }
    out
}

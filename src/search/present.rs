//! Result folding, pagination and highlighting for display.

use super::scoring::RankedDoc;
use super::snippet::select_snippets;
use super::tokenize::{Tokens, normalize, token_spans};
use crate::path::project_of_package;
use ahash::AHashMap;
use std::fmt;

/// Wrap every word of `text` whose normalized form is in `tokens` in `**`.
pub fn mark_text(text: &str, tokens: &Tokens) -> String {
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;

    for span in token_spans(text) {
        let word = &text[span.clone()];
        if tokens.contains(&normalize(word)) {
            out.push_str(&text[copied..span.start]);
            out.push_str("**");
            out.push_str(word);
            out.push_str("**");
            copied = span.end;
        }
    }
    out.push_str(&text[copied..]);
    out
}

/// A result folded under an earlier-ranked parent package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPackage {
    pub marked_name: String,
    pub import_path: String,
    /// Path below the parent, starting with `/`
    pub sub_path: String,
    pub synopsis: String,
}

/// One displayed result.
#[derive(Debug, Clone, PartialEq)]
pub struct ShownDoc {
    /// 1-based position among unfolded results
    pub index: usize,
    pub marked_name: String,
    pub marked_path: String,
    pub synopsis: String,
    /// Highlighted excerpt of description and readme
    pub summary: String,
    pub star_count: i64,
    pub score: f64,
    pub subs: Vec<SubPackage>,
}

/// One page of presented results.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
    /// Ids matched by the index
    pub total_results: usize,
    /// Results left after folding
    pub total_entries: usize,
    pub folded: usize,
    /// Zero-based page number
    pub page: usize,
    pub page_size: usize,
    pub docs: Vec<ShownDoc>,
}

impl ResultPage {
    pub fn page_count(&self) -> usize {
        self.total_entries.div_ceil(self.page_size.max(1))
    }
}

fn display_name(doc: &RankedDoc) -> String {
    if doc.doc.name == "main" {
        format!("main - {}", project_of_package(&doc.doc.import_path))
    } else {
        doc.doc.name.clone()
    }
}

/// Fold, paginate and highlight ranked results.
///
/// A result whose import path lies below an earlier unfolded result is
/// attached to it as a sub-package instead of taking a slot of its own.
pub fn present(
    ranked: &[RankedDoc],
    total_results: usize,
    tokens: &Tokens,
    page: usize,
    page_size: usize,
    snippet_bytes: usize,
) -> ResultPage {
    let start = page.saturating_mul(page_size);
    let in_page = |idx: usize| idx >= start && idx < start.saturating_add(page_size);

    let mut shown: Vec<ShownDoc> = Vec::new();
    let mut slots: AHashMap<&str, usize> = AHashMap::new();
    let mut folded = 0;
    let mut entries = 0;

    'results: for hit in ranked {
        let path = hit.doc.import_path.as_str();
        let parts: Vec<&str> = path.split('/').collect();

        for cut in (2..parts.len()).rev() {
            let parent = parts[..cut].join("/");
            if let Some(&slot) = slots.get(parent.as_str()) {
                if in_page(slot) {
                    shown[slot - start].subs.push(SubPackage {
                        marked_name: mark_text(&display_name(hit), tokens),
                        import_path: path.to_string(),
                        sub_path: format!("/{}", parts[cut..].join("/")),
                        synopsis: hit.doc.synopsis.clone(),
                    });
                }
                folded += 1;
                continue 'results;
            }
        }

        slots.insert(path, entries);
        if in_page(entries) {
            let raw = select_snippets(
                &format!("{}\n{}", hit.doc.description, hit.doc.readme_text),
                tokens,
                snippet_bytes,
            );
            shown.push(ShownDoc {
                index: entries + 1,
                marked_name: mark_text(&display_name(hit), tokens),
                marked_path: mark_text(path, tokens),
                synopsis: hit.doc.synopsis.clone(),
                summary: mark_text(&raw, tokens),
                star_count: hit.doc.star_count.max(0),
                score: hit.score,
                subs: Vec::new(),
            });
        }
        entries += 1;
    }

    ResultPage {
        total_results,
        total_entries: entries,
        folded,
        page,
        page_size,
        docs: shown,
    }
}

impl fmt::Display for ResultPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} results, {} shown as {} entries ({} folded). Page {} of {}.",
            self.total_results,
            self.total_entries + self.folded,
            self.total_entries,
            self.folded,
            self.page + 1,
            self.page_count().max(1)
        )?;

        for doc in &self.docs {
            writeln!(f)?;
            writeln!(f, "{}. {} ({})", doc.index, doc.marked_name, doc.marked_path)?;
            writeln!(f, "   stars: {}, score: {:.3}", doc.star_count, doc.score)?;
            if !doc.synopsis.is_empty() {
                writeln!(f, "   {}", doc.synopsis)?;
            }
            if !doc.summary.is_empty() && doc.summary != doc.synopsis {
                writeln!(f, "   {}", doc.summary)?;
            }
            for sub in &doc.subs {
                writeln!(f, "   - {} {}  {}", sub.marked_name, sub.sub_path, sub.synopsis)?;
            }
        }
        Ok(())
    }
}

//! Static authority and query-match scoring.

use super::tokenize::{Tokens, strip_urls, tokenize};
use crate::path::{author_of_package, project_of_package};
use crate::types::Document;
use ahash::AHashMap;
use std::cmp::Ordering;

fn score_by_project(count: usize, same_project: bool) -> f64 {
    let value = 1.0 / (count as f64).sqrt();
    if same_project { value * 0.1 } else { value }
}

fn score_by_author(count: usize, same_author: bool) -> f64 {
    let value = 1.0 / (count as f64).sqrt();
    if same_author { value * 0.5 } else { value }
}

/// Query-independent authority of a document.
///
/// Each importer contributes `1/sqrt(n)` where `n` counts importers from the
/// same project (×0.1 when it is this package's own project), capped by the
/// analogous per-author value (×0.5 for the same author). Description quality,
/// a real package name and stars add fixed bonuses.
pub fn static_score(doc: &Document) -> f64 {
    let mut score = 1.0;

    let author = if doc.author.is_empty() {
        author_of_package(&doc.import_path)
    } else {
        doc.author.clone()
    };
    let project = project_of_package(&doc.import_path);

    let mut project_counts: AHashMap<String, usize> = AHashMap::new();
    let mut author_counts: AHashMap<String, usize> = AHashMap::new();
    for importer in &doc.importers {
        *project_counts.entry(project_of_package(importer)).or_default() += 1;
        let importer_author = author_of_package(importer);
        if !importer_author.is_empty() {
            *author_counts.entry(importer_author).or_default() += 1;
        }
    }

    for importer in &doc.importers {
        let importer_project = project_of_package(importer);
        let mut value = score_by_project(
            project_counts.get(&importer_project).copied().unwrap_or(1),
            importer_project == project,
        );

        let importer_author = author_of_package(importer);
        if !importer_author.is_empty() {
            value = value.min(score_by_author(
                author_counts.get(&importer_author).copied().unwrap_or(1),
                importer_author == author,
            ));
        }
        score += value;
    }

    let description = doc.description.trim();
    if !description.is_empty() {
        score += 1.0;
        if description.len() > 100 {
            score += 0.5;
        }
        if description.starts_with(&format!("Package {}", doc.name)) {
            score += 0.5;
        } else if description.starts_with(&format!("package {}", doc.name)) {
            score += 0.4;
        }
    }

    if !doc.name.is_empty() && doc.name != "main" {
        score += 0.1;
    }

    score += (doc.star_count.saturating_sub(3).max(0) as f64).sqrt() * 0.5;
    score
}

/// Match `token` against a lower-cased field and its token set.
///
/// Tries a substring match first, then set membership, then any field token
/// starting or ending with `token`.
pub fn match_token(token: &str, text: &str, field_tokens: &Tokens) -> bool {
    text.contains(token)
        || field_tokens.contains(token)
        || field_tokens
            .iter()
            .any(|t| t.starts_with(token) || t.ends_with(token))
}

/// Query relevance of a document. An empty query scores 1.
pub fn match_score(doc: &Document, tokens: &Tokens) -> f64 {
    if tokens.is_empty() {
        return 1.0;
    }

    let synopsis_text = strip_urls(&doc.synopsis);
    let synopsis = synopsis_text.to_lowercase();
    let synopsis_tokens = tokenize(&synopsis_text);
    let name = doc.name.to_lowercase();
    let name_tokens = tokenize(&name);
    let path = doc.import_path.to_lowercase();
    let path_tokens = tokenize(&doc.import_path);

    let mut score = 0.02 * tokens.len() as f64;
    for token in tokens {
        if match_token(token, &synopsis, &synopsis_tokens) {
            score += 0.25;
        }
        if match_token(token, &name, &name_tokens) {
            score += 0.4;
        }
        if match_token(token, &path, &path_tokens) {
            score += 0.1;
        }
    }
    score
}

/// A search hit with its scores.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDoc {
    pub doc: Document,
    pub match_score: f64,
    /// `(static - 0.9) * match`
    pub score: f64,
}

impl RankedDoc {
    /// Score `doc` against `tokens`, recomputing a stale static score.
    pub fn new(mut doc: Document, tokens: &Tokens) -> Self {
        if doc.needs_static_score() {
            doc.static_score = static_score(&doc);
        }
        let match_score = match_score(&doc, tokens);
        let score = (doc.static_score - 0.9) * match_score;
        Self {
            doc,
            match_score,
            score,
        }
    }
}

/// Final result order: score, then stars (both descending), then shorter
/// import path, then the path itself.
pub fn compare_ranked(a: &RankedDoc, b: &RankedDoc) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.doc.star_count.cmp(&a.doc.star_count))
        .then_with(|| a.doc.import_path.len().cmp(&b.doc.import_path.len()))
        .then_with(|| a.doc.import_path.cmp(&b.doc.import_path))
}

/// Sort hits into their final order.
pub fn rank(docs: &mut [RankedDoc]) {
    docs.sort_by(compare_ranked);
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;
    use rstest::rstest;

    fn doc(path: &str) -> Document {
        Document {
            name: path.rsplit('/').next().unwrap_or_default().to_string(),
            import_path: path.to_string(),
            ..Document::default()
        }
    }

    #[test]
    fn bare_document_scores_base_plus_name() {
        let score = static_score(&doc("example.com/foo"));
        check!((score - 1.1).abs() < 1e-9);
    }

    #[rstest]
    #[case("Package foo does things.", 1.0 + 1.0 + 0.5 + 0.1)]
    #[case("package foo does things.", 1.0 + 1.0 + 0.4 + 0.1)]
    #[case("Does things.", 1.0 + 1.0 + 0.1)]
    fn description_bonus(#[case] description: &str, #[case] expected: f64) {
        let mut d = doc("example.com/foo");
        d.description = description.to_string();
        check!((static_score(&d) - expected).abs() < 1e-9);
    }

    #[test]
    fn stars_add_square_root_bonus() {
        let mut d = doc("example.com/foo");
        d.star_count = 7;
        check!((static_score(&d) - (1.1 + 1.0)).abs() < 1e-9);
        d.star_count = -1;
        check!((static_score(&d) - 1.1).abs() < 1e-9);
    }

    #[rstest]
    #[case(i64::MIN)]
    #[case(i64::MIN + 2)]
    #[case(-1_000_000)]
    fn extreme_negative_stars_add_nothing(#[case] stars: i64) {
        let mut d = doc("example.com/foo");
        d.star_count = stars;
        check!((static_score(&d) - 1.1).abs() < 1e-9);
    }

    #[test]
    fn importers_from_one_project_share_authority() {
        let mut d = doc("github.com/alice/lib");
        d.importers = vec![
            "github.com/bob/app/a".to_string(),
            "github.com/bob/app/b".to_string(),
            "github.com/carol/tool".to_string(),
        ];
        // bob/app: 2 importers → 1/sqrt(2) each; carol: 1.
        let expected = 1.1 + 2.0 * (1.0 / 2f64.sqrt()) + 1.0;
        check!((static_score(&d) - expected).abs() < 1e-9);
    }

    #[test]
    fn same_project_importer_is_discounted() {
        let mut d = doc("github.com/alice/lib");
        d.importers = vec!["github.com/alice/lib/sub".to_string()];
        // project discount 0.1 beats the author discount 0.5
        check!((static_score(&d) - (1.1 + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn match_score_weights_fields() {
        let mut d = doc("example.com/webby");
        d.synopsis = "A tiny web toolkit".to_string();
        let tokens = tokenize("web");
        // synopsis 0.25 + name 0.4 (substring) + path 0.1 + base 0.02
        check!((match_score(&d, &tokens) - 0.77).abs() < 1e-9);
        check!(match_score(&d, &Tokens::default()) == 1.0);
    }

    #[test]
    fn stars_break_score_ties() {
        let tokens = tokenize("web");
        let mut popular = doc("example.com/a/web");
        popular.star_count = 10;
        let mut plain = doc("example.com/b/web");
        plain.star_count = 0;
        // Identical static scores so only the stars differ.
        popular.static_score = 2.0;
        plain.static_score = 2.0;

        let mut ranked = vec![RankedDoc::new(plain, &tokens), RankedDoc::new(popular, &tokens)];
        rank(&mut ranked);
        check!(ranked[0].doc.import_path == "example.com/a/web");
    }

    #[test]
    fn shorter_path_wins_remaining_ties() {
        let tokens = tokenize("web");
        let mut short = doc("x.io/web");
        let mut long = doc("x.io/zz/web");
        short.static_score = 2.0;
        long.static_score = 2.0;

        let mut ranked = vec![RankedDoc::new(long, &tokens), RankedDoc::new(short, &tokens)];
        rank(&mut ranked);
        check!(ranked[0].doc.import_path == "x.io/web");
    }
}

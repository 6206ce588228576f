//! Full-text search over package documents.
//!
//! Tokenization, the store-backed inverted index, ranking, snippet
//! selection and result presentation.

pub(crate) mod index;
pub(crate) mod present;
pub(crate) mod scoring;
pub(crate) mod snippet;
pub(crate) mod tokenize;

pub use index::TokenSet;
pub use present::{ResultPage, ShownDoc, SubPackage, mark_text, present};
pub use scoring::{RankedDoc, compare_ranked, match_score, match_token, rank, static_score};
pub use snippet::select_snippets;
pub use tokenize::{Tokens, append_tokens, tokenize, tokenize_all};

//! Text tokenization and stemming for the inverted index.

use ahash::AHashSet;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::borrow::Cow;
use std::ops::Range;
use std::sync::LazyLock;

/// Normalized search tokens.
pub type Tokens = AHashSet<String>;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("URL pattern compiles"));

static STEMMER: LazyLock<Stemmer> = LazyLock::new(|| Stemmer::create(Algorithm::English));

/// Role of a character while scanning for tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharKind {
    /// Breaks tokens and is dropped
    Separator,
    /// Begins a new token
    Start,
    /// Extends the current token (or begins one if none is open)
    Body,
}

/// Wide characters (code point above 127) always stand alone, so CJK text
/// without separators still yields tokens. Letters and digits only extend a
/// run of the same class.
fn classify(last: Option<char>, current: char) -> CharKind {
    if !current.is_alphanumeric() {
        return CharKind::Separator;
    }
    if current as u32 > 127 {
        return CharKind::Start;
    }
    if current.is_alphabetic() {
        return if last.is_some_and(char::is_alphabetic) {
            CharKind::Body
        } else {
            CharKind::Start
        };
    }
    if last.is_some_and(char::is_numeric) {
        CharKind::Body
    } else {
        CharKind::Start
    }
}

/// Byte ranges of the raw (unnormalized) tokens of `text`.
pub fn token_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut last = None;

    for (i, c) in text.char_indices() {
        match classify(last, c) {
            CharKind::Separator => {
                if let Some(s) = start.take() {
                    spans.push(s..i);
                }
            }
            CharKind::Start => {
                if let Some(s) = start.replace(i) {
                    spans.push(s..i);
                }
            }
            CharKind::Body => {
                start.get_or_insert(i);
            }
        }
        last = Some(c);
    }

    if let Some(s) = start {
        spans.push(s..text.len());
    }
    spans
}

/// A token made of letters only, mixing upper and lower case.
fn is_camel(token: &str) -> bool {
    let mut upper = false;
    let mut lower = false;
    for c in token.chars() {
        if !c.is_alphabetic() {
            return false;
        }
        if c.is_uppercase() {
            upper = true;
        } else {
            lower = true;
        }
    }
    upper && lower
}

/// Split a camel-case word into its parts.
///
/// A part starts at an upper-case letter following a lower-case one, or at
/// the last capital of an acronym: `HTTPServer` → `HTTP`, `Server`.
fn camel_parts(token: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = token.char_indices().collect();
    let mut parts = Vec::new();
    let mut start = 0;

    for (pos, &(i, c)) in chars.iter().enumerate().skip(1) {
        if !c.is_uppercase() {
            continue;
        }
        let prev = chars[pos - 1].1;
        let next_is_lower = chars.get(pos + 1).is_some_and(|&(_, n)| n.is_lowercase());
        if prev.is_lowercase() || (prev.is_uppercase() && next_is_lower) {
            parts.push(&token[start..i]);
            start = i;
        }
    }
    parts.push(&token[start..]);
    parts
}

/// Replace every URL in `text` with a space.
pub fn strip_urls(text: &str) -> Cow<'_, str> {
    URL_PATTERN.replace_all(text, " ")
}

/// Case-fold and stem one word.
pub fn normalize(word: &str) -> String {
    STEMMER.stem(&word.to_lowercase()).into_owned()
}

fn is_wide(token: &str) -> bool {
    token.chars().next().is_some_and(|c| c as u32 > 127)
}

/// Tokenize `text` into `tokens`.
///
/// URLs are stripped first. Every raw token is normalized; camel-case words
/// also contribute their parts and hyphen-joined bigrams of adjacent parts,
/// and consecutive wide-character tokens contribute their concatenation.
pub fn append_tokens(tokens: &mut Tokens, text: &str) {
    let text = strip_urls(text);
    let mut last: Option<String> = None;

    for span in token_spans(&text) {
        let raw = &text[span];

        if is_camel(raw) {
            let mut prev: Option<String> = None;
            for part in camel_parts(raw) {
                let part = normalize(part);
                if let Some(prev) = &prev {
                    tokens.insert(format!("{}-{}", prev, part));
                }
                tokens.insert(part.clone());
                prev = Some(part);
            }
        }

        let token = normalize(raw);
        if token.is_empty() {
            continue;
        }
        if let Some(last) = last.as_deref().filter(|l| is_wide(l) && is_wide(&token)) {
            tokens.insert(format!("{}{}", last, token));
        }
        tokens.insert(token.clone());
        last = Some(token);
    }
}

/// Tokenize one piece of text.
pub fn tokenize(text: &str) -> Tokens {
    let mut tokens = Tokens::default();
    append_tokens(&mut tokens, text);
    tokens
}

/// Tokenize several fields into one set.
pub fn tokenize_all<'a>(texts: impl IntoIterator<Item = &'a str>) -> Tokens {
    let mut tokens = Tokens::default();
    for text in texts {
        append_tokens(&mut tokens, text);
    }
    tokens
}

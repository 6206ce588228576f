use assert2::check;
use pkgsearch::search::{TokenSet, Tokens, tokenize};
use pkgsearch::{MemoryStore, Store};
use rstest::{fixture, rstest};
use std::sync::Arc;

#[fixture]
fn index() -> TokenSet {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    TokenSet::new(store, "index:")
}

fn tokens(words: &[&str]) -> Tokens {
    words.iter().map(ToString::to_string).collect()
}

/// Test: every indexed token finds its document, and nothing else does.
#[rstest]
#[tokio::test]
async fn index_round_trip(index: TokenSet) {
    let indexed = tokenize("Package router implements an HTTPServer request router");
    index.index("doc", "example.com/router", &indexed).await.unwrap();

    for token in &indexed {
        let hits = index.search("doc", &tokens(&[token.as_str()])).await.unwrap();
        check!(hits == ["example.com/router"], "token {}", token);
    }
    check!(index.search("doc", &tokens(&["database"])).await.unwrap().is_empty());
    check!(index.search("doc", &indexed).await.unwrap() == ["example.com/router"]);
}

/// Test: reindexing drops every token missing from the new set.
#[rstest]
#[tokio::test]
async fn reindex_replaces_token_set(index: TokenSet) {
    let old = tokens(&["alpha", "beta", "gamma"]);
    let new = tokens(&["beta", "delta"]);
    index.index("doc", "example.com/a", &old).await.unwrap();
    index.index("doc", "example.com/a", &new).await.unwrap();

    for gone in ["alpha", "gamma"] {
        check!(index.search("doc", &tokens(&[gone])).await.unwrap().is_empty());
    }
    for kept in ["beta", "delta"] {
        check!(index.search("doc", &tokens(&[kept])).await.unwrap() == ["example.com/a"]);
    }
    check!(index.count("doc", &tokens(&["beta"])).await.unwrap() == 1);
}

/// Test: adding query tokens never widens the result.
#[rstest]
#[case(&["web"], &["server"])]
#[case(&["web", "server"], &["json"])]
#[case(&["json"], &["missing"])]
#[tokio::test]
async fn more_tokens_never_match_more(index: TokenSet, #[case] a: &[&str], #[case] b: &[&str]) {
    let docs = [
        ("example.com/web", &["web", "server", "http"][..]),
        ("example.com/api", &["web", "json", "server"][..]),
        ("example.com/cli", &["json", "cli"][..]),
    ];
    for (id, words) in docs {
        index.index("doc", id, &tokens(words)).await.unwrap();
    }

    let narrow: Tokens = a.iter().chain(b).map(ToString::to_string).collect();
    let wide = index.search("doc", &tokens(a)).await.unwrap();
    let narrowed = index.search("doc", &narrow).await.unwrap();

    check!(narrowed.len() <= wide.len());
    for id in &narrowed {
        check!(wide.contains(id), "{} matched {:?} but not {:?}", id, narrow, a);
    }
}

/// Test: query token order does not matter.
#[rstest]
#[tokio::test]
async fn token_order_is_irrelevant(index: TokenSet) {
    index.index("doc", "example.com/x", &tokens(&["a", "b", "c"])).await.unwrap();
    index.index("doc", "example.com/y", &tokens(&["a", "c"])).await.unwrap();

    let forward = index.search("doc", &tokens(&["a", "c"])).await.unwrap();
    let backward = index.search("doc", &tokens(&["c", "a"])).await.unwrap();
    check!(forward == backward);
    check!(forward == ["example.com/x", "example.com/y"]);
}

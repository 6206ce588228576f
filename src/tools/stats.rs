//! Statistics handlers.

use crate::engine::Engine;
use std::fmt::Write as _;

pub async fn handle_crawler_stats(engine: &Engine) -> String {
    engine.crawler_stats().await.to_string()
}

pub async fn handle_database_stats(engine: &Engine) -> String {
    let stats = engine.database_stats().await;
    let width = stats.iter().map(|(name, _)| name.len()).max().unwrap_or(0);

    let mut output = String::from("Records per collection:\n");
    for (name, count) in stats {
        let _ = if count < 0 {
            writeln!(output, "  {:width$}  unavailable", name, width = width)
        } else {
            writeln!(output, "  {:width$}  {}", name, count, width = width)
        };
    }
    output
}

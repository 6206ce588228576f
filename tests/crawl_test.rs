mod common;

use assert2::{check, let_assert};
use chrono::{Duration, Utc};
use common::{
    FakeFetcher, crawling_engine, crawling_engine_with, engine, ingest, make_due, package,
};
use pkgsearch::{Engine, FetchError, Frontier, PackageView};
use rstest::rstest;
use std::collections::HashSet;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Let entries enqueued "now" fall strictly before the next due query.
async fn tick() {
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
}

#[rstest]
#[tokio::test]
async fn enqueue_only_creates_missing_entries(engine: Engine) {
    let scheduler = engine.scheduler();
    check!(scheduler.enqueue(Frontier::Package, "example.com/a").await);
    let first = scheduler.find(Frontier::Package, "example.com/a").await.unwrap();

    check!(!scheduler.enqueue(Frontier::Package, "example.com/a").await);
    let second = scheduler.find(Frontier::Package, "example.com/a").await.unwrap();
    check!(first == second);
    check!(engine.append_packages(&["example.com/a".to_string()]).await == 0);
}

#[rstest]
#[tokio::test]
async fn reschedule_lands_within_jitter_bounds(engine: Engine) {
    let age = engine.config().crawl.package_age();
    let before = Utc::now();
    let due = engine
        .scheduler()
        .reschedule(Frontier::Package, "example.com/a")
        .await
        .unwrap();
    let after = Utc::now();

    check!(due >= before + age * 4 / 5);
    check!(due <= after + age * 11 / 10);

    let_assert!(Ok(Some(entry)) = engine.scheduler().find(Frontier::Package, "example.com/a").await);
    let slack = Duration::milliseconds(1);
    check!(entry.due_time >= before + age * 4 / 5 - slack);
    check!(entry.due_time <= after + age * 11 / 10);
    check!(!entry.is_due(Utc::now()));
}

/// Test: pushing a package discovers its imports, and indexing both fills in
/// the reverse import edge.
#[rstest]
#[tokio::test]
async fn pushed_imports_become_importers(engine: Engine) {
    ingest(&engine, package("example.com/a", &["example.com/b"])).await;

    let_assert!(Ok(Some(discovered)) = engine.scheduler().find(Frontier::Package, "example.com/b").await);
    check!(discovered.due_time <= Utc::now());
    let_assert!(Ok(PackageView::Scheduled(_)) = engine.view("example.com/b").await);

    ingest(&engine, package("example.com/b", &[])).await;
    let_assert!(Ok(PackageView::Found(b)) = engine.view("example.com/b").await);
    check!(b.importers == ["example.com/a"]);
    let_assert!(Ok(PackageView::Found(a)) = engine.view("example.com/a").await);
    check!(a.importers.is_empty());
    check!(a.declared_imports == ["example.com/b"]);
}

/// Test: a removed import drops the importer edge on the next refresh.
#[rstest]
#[tokio::test]
async fn dropped_import_refreshes_target(engine: Engine) {
    ingest(&engine, package("example.com/b", &[])).await;
    ingest(&engine, package("example.com/a", &["example.com/b"])).await;
    let_assert!(Ok(PackageView::Found(b)) = engine.view("example.com/b").await);
    check!(b.importers == ["example.com/a"]);

    ingest(&engine, package("example.com/a", &[])).await;
    let_assert!(Ok(PackageView::Found(b)) = engine.view("example.com/b").await);
    check!(b.importers.is_empty());
}

/// Test: an evicted package stops counting as an importer.
#[rstest]
#[tokio::test]
async fn evicted_importer_is_dropped_from_targets(engine: Engine) {
    ingest(&engine, package("example.com/b", &[])).await;
    ingest(&engine, package("example.com/a", &["example.com/b"])).await;
    let_assert!(Ok(PackageView::Found(b)) = engine.view("example.com/b").await);
    check!(b.importers == ["example.com/a"]);

    engine.report_invalid("example.com/a").await;
    check!(engine.process_pending().await.unwrap() == (0, 1));
    let_assert!(Ok(PackageView::Found(b)) = engine.view("example.com/b").await);
    check!(b.importers.is_empty());
    let_assert!(Ok(PackageView::NotScheduled) = engine.view("example.com/a").await);
}

#[tokio::test]
async fn crawler_follows_imports() {
    let fetcher = FakeFetcher::new();
    fetcher.add_package(package("example.com/a", &["example.com/b"]));
    fetcher.add_package(package("example.com/b", &[]));
    let engine = crawling_engine(fetcher.clone());
    let_assert!(Some(crawler) = engine.crawler().cloned());
    let cancel = CancellationToken::new();

    check!(engine.append_packages(&["example.com/a".to_string()]).await == 1);
    make_due(&engine, Frontier::Package, "example.com/a").await;

    let first = crawler.run_cycle(&cancel).await;
    check!(first.packages >= 1);
    check!(!first.interrupted);
    tick().await;
    crawler.run_cycle(&cancel).await;
    check!(engine.process_pending().await.unwrap().0 == 2);

    let mut calls = fetcher.calls();
    calls.sort();
    check!(calls == ["example.com/a", "example.com/b"]);

    let_assert!(Ok(PackageView::Found(b)) = engine.view("example.com/b").await);
    check!(b.importers == ["example.com/a"]);
    check!(engine.search("b").await.unwrap().total == 1);

    // Both are rescheduled, so a further cycle fetches nothing.
    let idle = crawler.run_cycle(&cancel).await;
    check!(idle.packages == 0);
    check!(fetcher.calls().len() == 2);
}

#[tokio::test]
async fn invalid_package_is_evicted_everywhere() {
    let fetcher = FakeFetcher::new();
    let engine = crawling_engine(fetcher.clone());
    let_assert!(Some(crawler) = engine.crawler().cloned());

    ingest(&engine, package("example.com/gone", &[])).await;
    check!(engine.search("gone").await.unwrap().total == 1);

    fetcher.fail_package("example.com/gone", FetchError::Invalid("repository deleted".to_string()));
    make_due(&engine, Frontier::Package, "example.com/gone").await;
    let report = crawler.run_cycle(&CancellationToken::new()).await;
    check!(report.packages == 1);

    let_assert!(Ok(PackageView::NotScheduled) = engine.view("example.com/gone").await);
    check!(engine.search("gone").await.unwrap().total == 0);
}

#[tokio::test]
async fn transient_failure_reschedules() {
    let fetcher = FakeFetcher::new();
    fetcher.fail_package("example.com/slow", FetchError::transient("connection reset"));
    let engine = crawling_engine(fetcher.clone());
    let_assert!(Some(crawler) = engine.crawler().cloned());

    engine.append_packages(&["example.com/slow".to_string()]).await;
    make_due(&engine, Frontier::Package, "example.com/slow").await;
    let report = crawler.run_cycle(&CancellationToken::new()).await;
    check!(report.packages == 1);
    check!(fetcher.calls() == ["example.com/slow"]);

    let age = engine.config().crawl.package_age();
    let_assert!(Ok(Some(entry)) = engine.scheduler().find(Frontier::Package, "example.com/slow").await);
    check!(entry.due_time > Utc::now() + age / 2);
    let_assert!(Ok(PackageView::Scheduled(_)) = engine.view("example.com/slow").await);
}

#[tokio::test]
async fn author_crawl_discovers_projects() {
    let fetcher = FakeFetcher::new();
    fetcher.add_author("github.com", "alice", &["github.com/alice/x", "github.com/alice/y"]);
    fetcher.add_package(package("github.com/alice/x", &[]));
    fetcher.add_package(package("github.com/alice/y", &[]));
    let engine = crawling_engine(fetcher.clone());
    let_assert!(Some(crawler) = engine.crawler().cloned());

    check!(engine.scheduler().enqueue_author("github.com", "alice").await);
    make_due(&engine, Frontier::Author, "github.com:alice").await;
    let report = crawler.run_cycle(&CancellationToken::new()).await;
    check!(report.authors == 1);

    for project in ["github.com/alice/x", "github.com/alice/y"] {
        let_assert!(Ok(Some(_)) = engine.scheduler().find(Frontier::Package, project).await);
    }
    let_assert!(Ok(Some(author)) = engine.scheduler().find(Frontier::Author, "github.com:alice").await);
    check!(!author.is_due(Utc::now()));
}

#[tokio::test]
async fn cancelled_cycle_starts_nothing() {
    let fetcher = FakeFetcher::new();
    let engine = crawling_engine(fetcher.clone());
    let_assert!(Some(crawler) = engine.crawler().cloned());
    engine.append_packages(&["example.com/a".to_string()]).await;
    make_due(&engine, Frontier::Package, "example.com/a").await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = crawler.run_cycle(&cancel).await;
    check!(report.interrupted);
    check!(report.packages == 0);
    check!(report.passes == 0);
    check!(fetcher.calls().is_empty());
    check!(engine.list_due(Frontier::Package, -1).await.unwrap() == ["example.com/a"]);
}

async fn due_packages(engine: &Engine, fetcher: &FakeFetcher, paths: &[&str]) {
    for path in paths {
        fetcher.add_package(package(path, &[]));
        engine.append_packages(&[path.to_string()]).await;
        make_due(engine, Frontier::Package, path).await;
    }
}

fn gaps(calls: &[(String, Instant)]) -> Vec<std::time::Duration> {
    calls.windows(2).map(|w| w[1].1.duration_since(w[0].1)).collect()
}

/// Test: fetches on one host are sequential and spaced by the request delay.
#[tokio::test]
async fn same_host_fetches_are_spaced() {
    let fetcher = FakeFetcher::new();
    let engine = crawling_engine_with(fetcher.clone(), 50, 60);
    let_assert!(Some(crawler) = engine.crawler().cloned());
    due_packages(&engine, &fetcher, &["example.com/a", "example.com/b", "example.com/c"]).await;

    let report = crawler.run_cycle(&CancellationToken::new()).await;
    check!(report.packages == 3);
    check!(!report.interrupted);
    let calls = fetcher.timed_calls();
    check!(calls.len() == 3);
    for gap in gaps(&calls) {
        check!(gap >= std::time::Duration::from_millis(45));
    }
}

/// Test: different hosts are crawled side by side.
#[tokio::test]
async fn hosts_are_crawled_concurrently() {
    let fetcher = FakeFetcher::new();
    let engine = crawling_engine_with(fetcher.clone(), 100, 60);
    let_assert!(Some(crawler) = engine.crawler().cloned());
    due_packages(
        &engine,
        &fetcher,
        &["example.com/a", "example.com/b", "example.org/c", "example.org/d"],
    )
    .await;

    let report = crawler.run_cycle(&CancellationToken::new()).await;
    check!(report.packages == 4);
    let calls = fetcher.timed_calls();
    let_assert!([first, second, ..] = calls.as_slice());
    let host = |path: &str| path.split('/').next().unwrap_or_default().to_string();
    check!(host(&first.0) != host(&second.0));
    check!(second.1.duration_since(first.1) < std::time::Duration::from_millis(50));
}

/// Test: once the cycle deadline passes no new fetch starts and the rest
/// stays due.
#[tokio::test]
async fn cycle_deadline_stops_new_fetches() {
    let fetcher = FakeFetcher::new();
    let engine = crawling_engine_with(fetcher.clone(), 300, 1);
    let_assert!(Some(crawler) = engine.crawler().cloned());
    let paths: Vec<String> = (0..6).map(|i| format!("example.com/p{}", i)).collect();
    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    due_packages(&engine, &fetcher, &refs).await;

    let started = Instant::now();
    let report = crawler.run_cycle(&CancellationToken::new()).await;
    check!(report.interrupted);
    let calls = fetcher.timed_calls();
    check!(calls.len() < 6);
    check!(report.packages == calls.len());
    for (_, at) in &calls {
        check!(at.duration_since(started) < std::time::Duration::from_millis(1_100));
    }

    let left = engine.list_due(Frontier::Package, -1).await.unwrap();
    check!(left.len() == 6 - calls.len());
}

/// Test: authors and packages of one host share the host's request spacing.
#[tokio::test]
async fn authors_and_packages_share_host_spacing() {
    let fetcher = FakeFetcher::new();
    fetcher.add_author("github.com", "alice", &[]);
    let engine = crawling_engine_with(fetcher.clone(), 100, 60);
    let_assert!(Some(crawler) = engine.crawler().cloned());
    check!(engine.scheduler().enqueue_author("github.com", "alice").await);
    make_due(&engine, Frontier::Author, "github.com:alice").await;
    due_packages(&engine, &fetcher, &["github.com/bob/x"]).await;

    let report = crawler.run_cycle(&CancellationToken::new()).await;
    check!(report.authors >= 1);
    check!(report.packages == 1);
    let calls = fetcher.timed_calls();
    let ids: HashSet<&str> = calls.iter().map(|(id, _)| id.as_str()).collect();
    check!(ids.contains("github.com:alice"));
    check!(ids.contains("github.com/bob/x"));
    for gap in gaps(&calls) {
        check!(gap >= std::time::Duration::from_millis(95));
    }
}

/// Test: small due-list requests hand out disjoint batches.
#[rstest]
#[tokio::test]
async fn list_due_batches_are_disjoint(engine: Engine) {
    let ids: Vec<String> = (0..5).map(|i| format!("example.com/p{}", i)).collect();
    check!(engine.append_packages(&ids).await == 5);
    for id in &ids {
        make_due(&engine, Frontier::Package, id).await;
    }

    let first = engine.list_due(Frontier::Package, 2).await.unwrap();
    let second = engine.list_due(Frontier::Package, 2).await.unwrap();
    check!(first.len() == 2);
    check!(second.len() == 2);
    let seen: HashSet<&String> = first.iter().chain(&second).collect();
    check!(seen.len() == 4);

    let all = engine.list_due(Frontier::Package, -1).await.unwrap();
    check!(all.len() == 5);
    check!(engine.list_due(Frontier::Package, 0).await.unwrap().is_empty());
}

#[rstest]
#[tokio::test]
async fn touch_makes_package_due(engine: Engine) {
    engine
        .scheduler()
        .reschedule(Frontier::Package, "example.com/a")
        .await
        .unwrap();
    check!(!engine.touch("example.com/a").await);
    tick().await;
    check!(engine.touch("example.com/a").await);
}

#[rstest]
#[tokio::test]
async fn crawler_stats_count_hosts(engine: Engine) {
    engine
        .append_packages(&[
            "example.com/a".to_string(),
            "example.com/b".to_string(),
            "example.org/c".to_string(),
        ])
        .await;
    tick().await;

    let stats = engine.crawler_stats().await;
    check!(stats.packages.total == 3);
    check!(stats.packages.due == 3);
    check!(stats.authors.total == 0);
    let_assert!(Some(host) = stats.packages.hosts.iter().find(|h| h.host == "example.com"));
    check!(host.total == 2);
    check!(stats.to_string().contains("example.org"));
}

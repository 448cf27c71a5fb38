// tests/pipeline.rs
//
// Extraction–classification pipeline over a scripted scraper and the
// built-in keyword classifier.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{memory_store, MockScraper};
use forum_recon::aggregate::Aggregator;
use forum_recon::classify::{Classifier, KeywordClassifier};
use forum_recon::model::{ItemStatus, Severity, Target, TargetId};
use forum_recon::pipeline::Pipeline;
use forum_recon::registry::TargetRegistry;
use forum_recon::{Error, ErrorKind};

struct Fixture {
    scraper: Arc<MockScraper>,
    registry: Arc<TargetRegistry>,
    pipeline: Pipeline,
    target: Target,
}

async fn fixture() -> Fixture {
    let scraper = MockScraper::new();
    let registry = Arc::new(TargetRegistry::new(memory_store()));
    let classifier: Arc<dyn Classifier> = Arc::new(KeywordClassifier::seeded().unwrap());
    let pipeline = Pipeline::new(
        registry.clone(),
        scraper.clone(),
        classifier,
        Duration::from_secs(30),
        4,
    );
    let target = registry.register("http://f1.example", "F1", "").await.unwrap();
    Fixture {
        scraper,
        registry,
        pipeline,
        target,
    }
}

const T1: &str = "http://f1.example/threads/1";
const T2: &str = "http://f1.example/threads/2";
const T3: &str = "http://f1.example/threads/3";

/// Two phishing threads and one empty page the classifier cannot judge.
fn script_three_threads(f: &Fixture) {
    f.scraper.set_threads(&f.target.address, &[T1, T2, T3]);
    f.scraper.set_post(T1, "Phishing kit", "fresh pages for sale");
    f.scraper.set_post(T2, "Scam pages", "otp code bypass");
    f.scraper.set_post(T3, "", "   ");
}

#[tokio::test]
async fn full_pass_classifies_and_aggregates() {
    let f = fixture().await;
    script_three_threads(&f);

    let items = f.pipeline.run_full_pass(&f.target.id).await.unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|it| it.status.is_terminal()));

    let medium = items.iter().filter(|it| it.severity == Severity::Medium).count();
    let failed: Vec<_> = items
        .iter()
        .filter(|it| it.status == ItemStatus::Failed)
        .collect();
    assert_eq!(medium, 2);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].thread_url, T3);
    assert_eq!(failed[0].severity, Severity::Unassigned);
    assert!(failed[0].failure.is_some());

    let summary = Aggregator::new(f.registry.clone())
        .summarize(&f.target.id)
        .await
        .unwrap();
    assert_eq!(summary.counts.unassigned, 1);
    assert_eq!(summary.counts.low, 0);
    assert_eq!(summary.counts.medium, 2);
    assert_eq!(summary.counts.high, 0);
    assert_eq!(summary.total, 3);
}

#[tokio::test]
async fn rerun_is_additive() {
    let f = fixture().await;
    script_three_threads(&f);
    f.pipeline.run_full_pass(&f.target.id).await.unwrap();

    // A new thread appears next to the known ones.
    let t4 = "http://f1.example/threads/4";
    f.scraper.set_threads(&f.target.address, &[T1, T2, T3, t4]);
    f.scraper.set_post(t4, "Botnet rental", "");

    let second = f.pipeline.run_full_pass(&f.target.id).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].thread_url, t4);
    assert_eq!(second[0].severity, Severity::High);

    let all = f.registry.store().list_items(&f.target.id).await.unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.iter().all(|it| it.status.is_terminal()));

    // Nothing new: nothing created, nothing lost.
    assert!(f.pipeline.run_full_pass(&f.target.id).await.unwrap().is_empty());
    assert_eq!(f.registry.store().list_items(&f.target.id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn extract_alone_leaves_items_extracted() {
    let f = fixture().await;
    script_three_threads(&f);

    let ex = f.pipeline.extract(&f.target.id).await.unwrap();
    assert_eq!(ex.discovered, 3);
    assert_eq!(ex.fetched.len(), 3);
    assert!(ex.fetched.iter().all(|it| it.status == ItemStatus::Extracted));
    assert!(ex
        .fetched
        .iter()
        .all(|it| it.severity == Severity::Unassigned));

    let done = f.pipeline.classify_pending(&f.target.id).await.unwrap();
    assert_eq!(done.len(), 3);
    assert!(done.iter().all(|it| it.status.is_terminal()));
    assert!(f.pipeline.classify_pending(&f.target.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn thread_fetch_failure_is_scoped_to_its_item() {
    let f = fixture().await;
    f.scraper.set_threads(&f.target.address, &[T1, T2]);
    f.scraper.set_post(T1, "Exploit pack", "");
    f.scraper
        .fail_post(T2, Error::unreachable(T2, "connection reset by peer"));

    let ex = f.pipeline.extract(&f.target.id).await.unwrap();
    assert_eq!(ex.fetched.len(), 2);
    assert_eq!(ex.retried, 0);
    let failed = ex.fetched.iter().find(|it| it.thread_url == T2).unwrap();
    assert_eq!(failed.status, ItemStatus::Failed);
    assert!(failed.fetch_failed);
    assert!(failed.failure.as_deref().unwrap().contains("connection reset"));

    // T2 is still down: it fails again, T1 gets classified.
    let done = f.pipeline.run_full_pass(&f.target.id).await.unwrap();
    assert_eq!(done.len(), 2);
    let t1 = done.iter().find(|it| it.thread_url == T1).unwrap();
    assert_eq!(t1.severity, Severity::High);
    let t2 = done.iter().find(|it| it.thread_url == T2).unwrap();
    assert_eq!(t2.status, ItemStatus::Failed);
}

#[tokio::test]
async fn failed_thread_fetch_is_retried_by_next_pass() {
    let f = fixture().await;
    f.scraper.set_threads(&f.target.address, &[T1]);
    f.scraper
        .fail_post(T1, Error::unreachable(T1, "connection reset by peer"));

    let first = f.pipeline.run_full_pass(&f.target.id).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].status, ItemStatus::Failed);
    let item_id = first[0].id;

    f.scraper.set_post(T1, "Hijacking sessions", "");
    let second = f.pipeline.run_full_pass(&f.target.id).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, item_id, "the same item is fetched again");
    assert_eq!(second[0].status, ItemStatus::Classified);
    assert_eq!(second[0].severity, Severity::High);
    assert!(second[0].failure.is_none());

    let stored = f.registry.store().list_items(&f.target.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, ItemStatus::Classified);

    // Settled now: nothing left to fetch.
    assert!(f.pipeline.run_full_pass(&f.target.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn unlisted_failed_thread_is_not_retried() {
    let f = fixture().await;
    f.scraper.set_threads(&f.target.address, &[T1]);
    f.scraper
        .fail_post(T1, Error::unreachable(T1, "connection reset by peer"));
    f.pipeline.extract(&f.target.id).await.unwrap();

    f.scraper.set_threads(&f.target.address, &[]);
    let calls = f.scraper.calls();
    let ex = f.pipeline.extract(&f.target.id).await.unwrap();
    assert!(ex.fetched.is_empty());
    assert_eq!(f.scraper.calls(), calls + 1, "only the listing is fetched");
}

#[tokio::test]
async fn unreachable_listing_is_upstream_and_creates_nothing() {
    let f = fixture().await;
    // no listing scripted for the target
    let err = f.pipeline.run_full_pass(&f.target.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert!(f
        .registry
        .store()
        .list_items(&f.target.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_listing_times_out() {
    let f = fixture().await;
    script_three_threads(&f);
    f.scraper.delay_listing(Duration::from_secs(90));

    let err = f.pipeline.extract(&f.target.id).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { after_secs: 30, .. }));
}

#[tokio::test(start_paused = true)]
async fn slow_threads_fail_individually() {
    let f = fixture().await;
    script_three_threads(&f);
    f.scraper.delay_posts(Duration::from_secs(90));

    let items = f.pipeline.run_full_pass(&f.target.id).await.unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|it| it.status == ItemStatus::Failed));
    assert!(items
        .iter()
        .all(|it| it.failure.as_deref().unwrap().contains("timed out")));
}

#[tokio::test]
async fn unknown_target_fails_before_any_network_call() {
    let f = fixture().await;
    script_three_threads(&f);
    let ghost = TargetId::new();

    assert_eq!(
        f.pipeline.extract(&ghost).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        f.pipeline.run_full_pass(&ghost).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        f.pipeline.classify_pending(&ghost).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(f.scraper.calls(), 0);
}

#[tokio::test]
async fn classify_rejects_items_not_awaiting_classification() {
    let f = fixture().await;
    script_three_threads(&f);
    let items = f.pipeline.run_full_pass(&f.target.id).await.unwrap();

    let err = f.pipeline.classify(items[0].clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn classify_single_item_persists_result() {
    let f = fixture().await;
    script_three_threads(&f);
    let ex = f.pipeline.extract(&f.target.id).await.unwrap();
    let first = ex.fetched.iter().find(|it| it.thread_url == T1).unwrap().clone();

    let done = f.pipeline.classify(first.clone()).await.unwrap();
    assert_eq!(done.status, ItemStatus::Classified);
    assert_eq!(done.severity, Severity::Medium);

    let stored = f.registry.store().list_items(&f.target.id).await.unwrap();
    let stored = stored.iter().find(|it| it.id == first.id).unwrap();
    assert_eq!(stored.status, ItemStatus::Classified);
}

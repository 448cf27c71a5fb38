// tests/aggregate.rs
mod common;

use std::sync::Arc;

use common::{memory_store, FlakyStore};
use forum_recon::aggregate::Aggregator;
use forum_recon::model::{Item, Severity, TargetId, ThreadContent};
use forum_recon::registry::TargetRegistry;
use forum_recon::ErrorKind;

async fn seed(registry: &TargetRegistry, host: &str, severities: &[Option<Severity>]) -> TargetId {
    let t = registry
        .register(&format!("http://{host}.example"), host, "")
        .await
        .unwrap();
    for (i, sev) in severities.iter().enumerate() {
        let mut it = Item::discovered(t.id, format!("http://{host}.example/threads/{i}"));
        it.mark_extracted(ThreadContent {
            title: format!("thread {i}"),
            ..Default::default()
        });
        match sev {
            Some(s) => assert!(it.mark_classified(*s)),
            None => assert!(it.mark_failed("classifier gave up")),
        }
        registry.store().insert_item(it).await.unwrap();
    }
    t.id
}

#[tokio::test]
async fn empty_target_has_all_zero_counts() {
    let registry = Arc::new(TargetRegistry::new(memory_store()));
    let id = seed(&registry, "quiet", &[]).await;

    let s = Aggregator::new(registry).summarize(&id).await.unwrap();
    assert_eq!(s.total, 0);
    assert_eq!(s.counts.sum(), 0);
    assert_eq!(s.name, "quiet");
    assert!(s.last_scanned_at.is_none());
}

#[tokio::test]
async fn buckets_always_sum_to_total() {
    let registry = Arc::new(TargetRegistry::new(memory_store()));
    let id = seed(
        &registry,
        "busy",
        &[
            Some(Severity::High),
            Some(Severity::High),
            Some(Severity::Low),
            Some(Severity::Unassigned),
            None,
        ],
    )
    .await;
    // Discovered-only items still count as unassigned.
    registry
        .store()
        .insert_item(Item::discovered(id, "http://busy.example/threads/pending"))
        .await
        .unwrap();

    let s = Aggregator::new(registry).summarize(&id).await.unwrap();
    assert_eq!(s.counts.high, 2);
    assert_eq!(s.counts.low, 1);
    assert_eq!(s.counts.medium, 0);
    assert_eq!(s.counts.unassigned, 3);
    assert_eq!(s.total, 6);
    assert_eq!(s.counts.sum(), s.total);
}

#[tokio::test]
async fn unknown_target_is_not_found() {
    let registry = Arc::new(TargetRegistry::new(memory_store()));
    let err = Aggregator::new(registry)
        .summarize(&TargetId::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn summarize_many_skips_vanished_targets() {
    let registry = Arc::new(TargetRegistry::new(memory_store()));
    let a = seed(&registry, "a", &[Some(Severity::Medium)]).await;
    let b = seed(&registry, "b", &[Some(Severity::Low)]).await;
    registry.remove(&b).await.unwrap();

    let agg = Aggregator::new(registry);
    let out = agg
        .summarize_many(&[a, b, TargetId::new()])
        .await
        .unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].target_id, a);
    assert_eq!(out[0].counts.medium, 1);
}

#[tokio::test]
async fn summarize_all_follows_registration_order() {
    let registry = Arc::new(TargetRegistry::new(memory_store()));
    let first = seed(&registry, "first", &[Some(Severity::High)]).await;
    let second = seed(&registry, "second", &[None, None]).await;

    let out = Aggregator::new(registry).summarize_all().await.unwrap();
    let ids: Vec<_> = out.iter().map(|s| s.target_id).collect();
    assert_eq!(ids, vec![first, second]);
    assert_eq!(out[1].counts.unassigned, 2);
}

#[tokio::test]
async fn summarize_all_leaves_out_targets_removed_midway() {
    let store = FlakyStore::new();
    let registry = Arc::new(TargetRegistry::new(store.clone()));
    let gone = seed(&registry, "gone", &[Some(Severity::High)]).await;
    let stays = seed(&registry, "stays", &[Some(Severity::Low)]).await;

    store.vanish_after_listing(gone);
    let out = Aggregator::new(registry.clone()).summarize_all().await.unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].target_id, stays);
    assert_eq!(out[0].counts.low, 1);
    assert_eq!(
        registry.get(&gone).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn summary_serializes_flat_counts() {
    let registry = Arc::new(TargetRegistry::new(memory_store()));
    let id = seed(&registry, "f1", &[Some(Severity::Medium)]).await;
    let s = Aggregator::new(registry).summarize(&id).await.unwrap();

    let v = serde_json::to_value(&s).unwrap();
    assert_eq!(v["medium"], 1);
    assert_eq!(v["unassigned"], 0);
    assert_eq!(v["total"], 1);
    assert_eq!(v["name"], "f1");
}

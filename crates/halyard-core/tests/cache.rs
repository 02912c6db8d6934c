mod common;

use std::sync::Arc;

use common::*;
use halyard_core::fetch::{ManualClock, MemoryCacheStore, ResourceLoader, ScriptedTransport};
use halyard_core::{Halyard, HalyardConfig, RequestContext};
use serde_json::json;

fn uri_a() -> String {
    format!("{BASE}/a")
}

#[tokio::test]
async fn default_max_age_counts_down_between_hits() {
    let harness = Harness::new();
    harness
        .transport
        .respond_hal(uri_a(), json!({"_links": {"self": {"href": "/a"}}}), None);

    let first = harness.loader.get(&uri_a()).await.unwrap();
    assert_eq!(first.max_age, Some(60));
    assert_eq!(harness.transport.call_count(&uri_a()), 1);

    harness.clock.advance_secs(10);
    let second = harness.loader.get(&uri_a()).await.unwrap();
    assert_eq!(second.max_age, Some(50));
    assert_eq!(second.body, first.body);
    assert_eq!(harness.transport.call_count(&uri_a()), 1);

    harness.clock.advance_secs(50);
    let third = harness.loader.get(&uri_a()).await.unwrap();
    assert_eq!(third.max_age, Some(60));
    assert_eq!(harness.transport.call_count(&uri_a()), 2);
}

#[tokio::test]
async fn repeated_fresh_reads_return_the_same_document() {
    let harness = Harness::new();
    harness
        .transport
        .respond_hal(uri_a(), json!({"n": 1, "_links": {"self": {"href": "/a"}}}), Some(120));
    let mut bodies = Vec::new();
    for _ in 0..4 {
        harness.clock.advance_secs(5);
        bodies.push(harness.loader.get(&uri_a()).await.unwrap().body);
    }
    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(harness.transport.call_count(&uri_a()), 1);
    let stats = harness.loader.stats();
    assert_eq!((stats.misses, stats.hits), (1, 3));
}

#[tokio::test]
async fn navigation_reports_the_remaining_freshness() {
    let harness = Harness::new();
    publish_catalog(&harness, sample_items()).await;

    let warm = RequestContext::new();
    harness
        .client
        .entry_point::<Catalog>(&warm, &format!("{BASE}/"))
        .unwrap()
        .state_value()
        .await
        .unwrap();

    harness.clock.advance_secs(25);
    let ctx = RequestContext::new();
    let root = harness
        .client
        .entry_point::<Catalog>(&ctx, &format!("{BASE}/"))
        .unwrap();
    root.state_value().await.unwrap();
    assert_eq!(ctx.metrics().effective_max_age(), Some(35));
    assert_eq!(harness.transport.call_count(&format!("{BASE}/")), 1);

    let first = &root.many("item").await.unwrap()[0];
    first.state_value().await.unwrap();
    assert_eq!(ctx.metrics().effective_max_age(), Some(35));
}

#[tokio::test]
async fn engine_wires_the_cache_from_config() {
    let transport = ScriptedTransport::new();
    transport.respond_hal(
        uri_a(),
        json!({"label": "a", "_links": {"self": {"href": "/a"}}}),
        None,
    );
    let mut config = HalyardConfig::default();
    config.cache.default_max_age_secs = 20;
    let clock = ManualClock::default();
    let engine = Halyard::builder()
        .config(config)
        .transport(Arc::new(transport.clone()))
        .cache_store(Arc::new(MemoryCacheStore::new()))
        .clock(Arc::new(clock.clone()))
        .contract::<Catalog>()
        .build()
        .unwrap();

    for _ in 0..3 {
        let ctx = engine.request("/tags/a");
        let tag = engine.client().bind_as::<Tag>(&ctx, uri_a()).unwrap();
        let props: TagProps = tag.state().await.unwrap();
        assert_eq!(props.label, "a");
        clock.advance_secs(5);
    }
    assert_eq!(transport.call_count(&uri_a()), 1);
    let stats = engine.cache_stats().unwrap();
    assert_eq!(stats.hits, 2);

    clock.advance_secs(10);
    let ctx = engine.request("/tags/a");
    let tag = engine.client().bind_as::<Tag>(&ctx, uri_a()).unwrap();
    tag.state_value().await.unwrap();
    assert_eq!(transport.call_count(&uri_a()), 2);
    assert_eq!(ctx.metrics().effective_max_age(), Some(20));
}

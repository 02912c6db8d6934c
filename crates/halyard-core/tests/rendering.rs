mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use halyard_core::protocol::{Link, VND_ERROR_JSON};
use halyard_core::{
    handle, ContractDecl, ContractRef, ContractRegistry, Emission, EmbedPolicy, ErrorRenderer,
    HalyardError, MemberDecl, RenderableResource, Renderer, RequestContext, ResourceContract,
    ResourceHandle, ResponseHandler, ReturnShape,
};
use serde_json::{json, Value};

struct Pointer;

impl ResourceContract for Pointer {
    const NAME: &'static str = "Pointer";

    fn declare() -> ContractDecl {
        ContractDecl::new(Self::NAME)
            .member(MemberDecl::self_link("link", ReturnShape::One))
            .member(MemberDecl::relation(
                "item",
                "item",
                ContractRef::of::<Target>(),
                ReturnShape::One,
            ))
    }
}

struct Target;

impl ResourceContract for Target {
    const NAME: &'static str = "Target";

    fn declare() -> ContractDecl {
        ContractDecl::new(Self::NAME)
            .member(MemberDecl::self_link("link", ReturnShape::One))
            .member(MemberDecl::state("props", ReturnShape::Maybe))
    }
}

struct At(&'static str);

impl RenderableResource for At {
    fn self_link(&self) -> Result<Option<Link>, HalyardError> {
        Ok(Some(Link::new(self.0)))
    }
}

struct PointerImpl;

impl RenderableResource for PointerImpl {
    fn self_link(&self) -> Result<Option<Link>, HalyardError> {
        Ok(Some(Link::new("/pointer")))
    }

    fn relation(&self, rel: &str) -> Emission<ResourceHandle> {
        match rel {
            "item" => Emission::one(handle(At("/x"))),
            _ => Emission::empty(),
        }
    }
}

fn renderer() -> Renderer {
    Renderer::new(Arc::new(ContractRegistry::new()))
}

fn handler() -> ResponseHandler {
    ResponseHandler::new(renderer(), Arc::new(ErrorRenderer::new()))
}

#[tokio::test]
async fn required_link_relation_renders_target_self_link() {
    let doc = renderer()
        .render_as::<Pointer>(&RequestContext::new(), handle(PointerImpl))
        .await
        .unwrap();
    let value = doc.to_value();
    assert_eq!(value["_links"]["item"]["href"], "/x");
    assert_eq!(value["_links"]["self"]["href"], "/pointer");
    assert!(value.get("_embedded").is_none());
}

struct Failing;

impl RenderableResource for Failing {
    fn self_link(&self) -> Result<Option<Link>, HalyardError> {
        Ok(Some(Link::new("/failing")))
    }

    fn state(&self) -> Emission<Value> {
        Emission::future_one(async { Err::<Value, _>(anyhow::anyhow!("database unavailable")) })
    }
}

#[tokio::test]
async fn state_runtime_error_becomes_500_error_document() {
    let ctx = RequestContext::for_uri("/failing");
    let response = handler().respond_as::<Target>(&ctx, handle(Failing)).await;
    assert_eq!(response.status, 500);
    assert_eq!(response.content_type, VND_ERROR_JSON);
    let body = response.body.to_value();
    assert_eq!(body["message"], "database unavailable");
    assert_eq!(body["_links"]["about"]["href"], "/failing");
    assert!(body["_embedded"]["diagnostics"].is_object());
}

#[tokio::test]
async fn rendered_self_link_equals_implementation() {
    let items = sample_items();
    for item in items {
        let expected = item.self_link().unwrap();
        let doc = renderer()
            .render_as::<Item>(&RequestContext::new(), handle(item))
            .await
            .unwrap();
        assert_eq!(doc.self_link().cloned(), expected);
    }
}

#[tokio::test]
async fn optional_relations_leave_no_trace_when_empty() {
    let desk = sample_items().remove(1);
    assert!(desk.related.is_none() && desk.tags.is_empty());
    let doc = renderer()
        .render_as::<Item>(&RequestContext::new(), handle(desk))
        .await
        .unwrap();
    let value = doc.to_value();
    assert!(value["_links"].get("related").is_none());
    assert!(value.get("_embedded").is_none());
    assert_eq!(value["name"], "desk");
}

struct Slow {
    id: u32,
    delay_ms: u64,
}

impl RenderableResource for Slow {
    fn self_link(&self) -> Result<Option<Link>, HalyardError> {
        Ok(Some(Link::new(format!("/slow/{}", self.id))))
    }

    fn state(&self) -> Emission<Value> {
        let (id, delay) = (self.id, Duration::from_millis(self.delay_ms));
        Emission::future_maybe(async move {
            tokio::time::sleep(delay).await;
            Ok::<_, HalyardError>(Some(json!({"id": id})))
        })
    }
}

struct SlowList;

impl ResourceContract for SlowList {
    const NAME: &'static str = "SlowList";

    fn declare() -> ContractDecl {
        ContractDecl::new(Self::NAME)
            .member(MemberDecl::self_link("link", ReturnShape::One))
            .member(
                MemberDecl::relation(
                    "entries",
                    "entry",
                    ContractRef::of::<Target>(),
                    ReturnShape::Stream,
                )
                .with_embed(EmbedPolicy::LinkAndEmbed),
            )
    }
}

struct SlowListImpl(usize);

impl RenderableResource for SlowListImpl {
    fn self_link(&self) -> Result<Option<Link>, HalyardError> {
        Ok(Some(Link::new("/slow")))
    }

    fn relation(&self, rel: &str) -> Emission<ResourceHandle> {
        if rel != "entry" {
            return Emission::empty();
        }
        let count = self.0;
        // later entries finish rendering first
        Emission::stream(futures_util::stream::iter((0..count).map(move |idx| {
            Ok::<_, HalyardError>(handle(Slow {
                id: idx as u32,
                delay_ms: ((count - idx) * 3) as u64,
            }))
        })))
    }
}

#[tokio::test]
async fn many_relations_preserve_emission_order() {
    let doc = renderer()
        .render_as::<SlowList>(&RequestContext::new(), handle(SlowListImpl(12)))
        .await
        .unwrap();
    let linked: Vec<_> = doc.links("entry").iter().map(|l| l.href.clone()).collect();
    let expected: Vec<_> = (0..12).map(|idx| format!("/slow/{idx}")).collect();
    assert_eq!(linked, expected);
    let embedded: Vec<_> = doc
        .embedded("entry")
        .iter()
        .map(|entry| entry.state["id"].as_u64().unwrap())
        .collect();
    assert_eq!(embedded, (0..12).collect::<Vec<u64>>());
}

#[tokio::test(start_paused = true)]
async fn list_entries_render_concurrently() {
    let started = tokio::time::Instant::now();
    let doc = renderer()
        .render_as::<SlowList>(&RequestContext::new(), handle(SlowListImpl(12)))
        .await
        .unwrap();
    let elapsed = started.elapsed();
    assert_eq!(doc.embedded("entry").len(), 12);
    // slowest entry takes 36ms, all twelve in sequence would take 234ms
    assert!(elapsed >= Duration::from_millis(36), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(100), "{elapsed:?}");
}

struct Pair;

impl ResourceContract for Pair {
    const NAME: &'static str = "Pair";

    fn declare() -> ContractDecl {
        ContractDecl::new(Self::NAME)
            .member(MemberDecl::self_link("link", ReturnShape::One))
            .member(MemberDecl::state("props", ReturnShape::Maybe))
            .member(
                MemberDecl::relation(
                    "entries",
                    "entry",
                    ContractRef::of::<Target>(),
                    ReturnShape::Stream,
                )
                .with_embed(EmbedPolicy::LinkAndEmbed),
            )
    }
}

/// Broken state next to an entry that takes a minute to render.
struct BrokenBesideStalled;

impl RenderableResource for BrokenBesideStalled {
    fn self_link(&self) -> Result<Option<Link>, HalyardError> {
        Ok(Some(Link::new("/pair")))
    }

    fn state(&self) -> Emission<Value> {
        Emission::future_maybe(async { Err::<Option<Value>, _>(anyhow::anyhow!("state lookup failed")) })
    }

    fn relation(&self, rel: &str) -> Emission<ResourceHandle> {
        match rel {
            "entry" => Emission::one(handle(Slow {
                id: 0,
                delay_ms: 60_000,
            })),
            _ => Emission::empty(),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn first_failing_branch_aborts_slow_siblings() {
    let started = tokio::time::Instant::now();
    let err = renderer()
        .render_as::<Pair>(&RequestContext::new(), handle(BrokenBesideStalled))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "state lookup failed");
    assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());

    let started = tokio::time::Instant::now();
    let ctx = RequestContext::for_uri("/pair");
    let response = handler().respond_as::<Pair>(&ctx, handle(BrokenBesideStalled)).await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body.to_value()["message"], "state lookup failed");
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn single_entry_many_relation_is_still_an_array() {
    let doc = renderer()
        .render_as::<SlowList>(&RequestContext::new(), handle(SlowListImpl(1)))
        .await
        .unwrap();
    let value = doc.to_value();
    assert!(value["_links"]["entry"].is_array());
    assert!(value["_embedded"]["entry"].is_array());
}

//! Store and decorator tests (in-memory DB, manual clock).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode};

use super::{CacheDispatcher, CacheKey, CacheStore, CacheValue, StoreError};
use crate::clock::ManualClock;
use crate::dispatch::mock::{MockDispatcher, Recorder, Script};
use crate::dispatch::{Dispatch, RequestOptions};

const T0: i64 = 1_700_000_000_000;

async fn store() -> (CacheStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    let store = CacheStore::open_memory()
        .await
        .unwrap()
        .with_clock(clock.clone());
    (store, clock)
}

fn key(path: &str) -> CacheKey {
    CacheKey {
        origin: "https://cache.test".into(),
        method: Method::GET,
        path: path.into(),
        headers: HeaderMap::new(),
    }
}

fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
    let mut h = HeaderMap::new();
    for (k, v) in pairs {
        h.append(*k, HeaderValue::from_static(*v));
    }
    h
}

fn redirect(cc: &'static str) -> HeaderMap {
    headers(&[("cache-control", cc), ("location", "https://cache.test/next")])
}

/// Hand-built value with a stored body, bypassing admission.
fn ranged_value(start: u64, body: &'static [u8], now: i64, ttl_secs: i64) -> CacheValue {
    CacheValue {
        status: StatusCode::PARTIAL_CONTENT,
        status_message: "Partial Content".into(),
        headers: HeaderMap::new(),
        body: Some(Bytes::from_static(body)),
        start,
        end: start + body.len() as u64,
        cache_control: BTreeMap::new(),
        etag: Some("\"r\"".into()),
        vary: BTreeMap::new(),
        cached_at: now,
        stale_at: now + ttl_secs * 1000,
        delete_at: now + ttl_secs * 1000,
    }
}

async fn row_count(store: &CacheStore) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM cache_entries")
        .fetch_one(&store.pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn admitted_response_is_served_until_delete_at() {
    let (store, clock) = store().await;
    let k = key("/old");
    let id = store
        .admit_and_store(&k, StatusCode::MOVED_PERMANENTLY, &redirect("public, max-age=60"))
        .await
        .unwrap();
    assert!(id.is_some());

    let hit = store.lookup(&k).await.unwrap().expect("fresh entry");
    assert_eq!(hit.value.status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(hit.url, "https://cache.test/old");
    assert_eq!(
        hit.value.headers.get("location").unwrap(),
        "https://cache.test/next"
    );
    assert_eq!(hit.value.delete_at, T0 + 60_000);

    clock.advance(Duration::from_secs(59));
    assert!(store.lookup(&k).await.unwrap().is_some());

    clock.advance(Duration::from_secs(1));
    assert!(store.lookup(&k).await.unwrap().is_none());
}

#[tokio::test]
async fn refused_responses_are_not_stored() {
    let (store, _clock) = store().await;
    let k = key("/private");
    for cc in ["private, max-age=60", "public, no-store, max-age=60", "public"] {
        let id = store
            .admit_and_store(&k, StatusCode::FOUND, &redirect(cc))
            .await
            .unwrap();
        assert_eq!(id, None, "{}", cc);
    }
    let with_body = headers(&[("cache-control", "public, max-age=60"), ("content-length", "3")]);
    assert_eq!(
        store
            .admit_and_store(&k, StatusCode::OK, &with_body)
            .await
            .unwrap(),
        None
    );
    assert_eq!(row_count(&store).await, 0);
    assert!(store.lookup(&k).await.unwrap().is_none());
}

#[tokio::test]
async fn vary_constraint_must_match_exactly() {
    let (store, _clock) = store().await;
    let mut gzip = key("/v");
    gzip.headers
        .insert("accept-encoding", HeaderValue::from_static("gzip"));
    let resp = headers(&[
        ("cache-control", "public, max-age=60"),
        ("vary", "Accept-Encoding"),
    ]);
    store
        .admit_and_store(&gzip, StatusCode::MOVED_PERMANENTLY, &resp)
        .await
        .unwrap()
        .expect("admitted");

    assert!(store.lookup(&gzip).await.unwrap().is_some());

    let mut br = key("/v");
    br.headers.insert("accept-encoding", HeaderValue::from_static("br"));
    assert!(store.lookup(&br).await.unwrap().is_none());

    assert!(store.lookup(&key("/v")).await.unwrap().is_none());
}

#[tokio::test]
async fn method_is_part_of_identity() {
    let (store, _clock) = store().await;
    let get = key("/m");
    store
        .admit_and_store(&get, StatusCode::MOVED_PERMANENTLY, &redirect("public, max-age=60"))
        .await
        .unwrap();
    let mut head = key("/m");
    head.method = Method::HEAD;
    assert!(store.lookup(&head).await.unwrap().is_none());
    assert!(store.lookup(&get).await.unwrap().is_some());
}

#[tokio::test]
async fn ranged_lookup_needs_exact_window() {
    let (store, _clock) = store().await;
    let k = key("/blob");
    store
        .insert(&k, &ranged_value(0, b"0123456789", T0, 60))
        .await
        .unwrap();

    let with_range = |v: &'static str| {
        let mut k = key("/blob");
        k.headers.insert("range", HeaderValue::from_static(v));
        k
    };

    let hit = store.lookup(&with_range("bytes=0-9")).await.unwrap().unwrap();
    assert_eq!(hit.value.body.as_deref(), Some(&b"0123456789"[..]));
    assert!(store.lookup(&with_range("bytes=0-19")).await.unwrap().is_none());
    assert!(store.lookup(&with_range("bytes=5-9")).await.unwrap().is_none());
    assert!(store.lookup(&with_range("bytes=-5")).await.unwrap().is_none());
    // A partial entry never answers a whole-resource request.
    assert!(store.lookup(&k).await.unwrap().is_none());
}

#[tokio::test]
async fn out_of_bounds_ranges_miss_instead_of_failing() {
    let (store, _clock) = store().await;
    let k = key("/blob");
    store
        .insert(&k, &ranged_value(5, b"56789", T0, 60))
        .await
        .unwrap();

    for range in [
        "bytes=5-18446744073709551615",
        "bytes=18446744073709551614-",
        "bytes=9223372036854775808-9223372036854775809",
    ] {
        let mut k = key("/blob");
        k.headers.insert("range", HeaderValue::from_static(range));
        assert!(store.lookup(&k).await.unwrap().is_none(), "{}", range);
    }
}

#[tokio::test]
async fn overlapping_entries_coexist_soonest_expiry_first() {
    let (store, _clock) = store().await;
    let k = key("/dup");
    let long = store
        .admit_and_store(&k, StatusCode::MOVED_PERMANENTLY, &redirect("public, max-age=300"))
        .await
        .unwrap()
        .unwrap();
    let short = store
        .admit_and_store(&k, StatusCode::MOVED_PERMANENTLY, &redirect("public, max-age=30"))
        .await
        .unwrap()
        .unwrap();
    assert!(short > long, "ids increase");
    assert_eq!(row_count(&store).await, 2);
    assert_eq!(store.lookup(&k).await.unwrap().unwrap().id, short);
}

#[tokio::test]
async fn prune_runs_at_most_once_per_window() {
    let (store, clock) = store().await;
    let k = key("/p");
    store
        .admit_and_store(&k, StatusCode::MOVED_PERMANENTLY, &redirect("public, max-age=10"))
        .await
        .unwrap();
    assert_eq!(row_count(&store).await, 1);

    // Expired, but the insert above already used this window's prune.
    clock.advance(Duration::from_secs(30));
    assert!(store.lookup(&k).await.unwrap().is_none());
    assert_eq!(row_count(&store).await, 1);

    clock.advance(Duration::from_secs(31));
    assert!(store.lookup(&k).await.unwrap().is_none());
    assert_eq!(row_count(&store).await, 0);
}

#[tokio::test]
async fn explicit_prune_removes_only_expired_rows() {
    let (store, clock) = store().await;
    store
        .admit_and_store(&key("/a"), StatusCode::FOUND, &redirect("public, max-age=5"))
        .await
        .unwrap();
    store
        .admit_and_store(&key("/b"), StatusCode::FOUND, &redirect("public, max-age=500"))
        .await
        .unwrap();
    clock.advance(Duration::from_secs(5));
    assert_eq!(store.prune().await.unwrap(), 1);
    assert_eq!(row_count(&store).await, 1);
    assert!(store.lookup(&key("/b")).await.unwrap().is_some());
}

#[tokio::test]
async fn malformed_keys_and_values_fail_fast() {
    let (store, _clock) = store().await;
    let bad_key = key("no-slash");
    assert!(matches!(
        store.lookup(&bad_key).await,
        Err(StoreError::InvalidKey(_))
    ));

    let mut bad_value = ranged_value(10, b"abc", T0, 60);
    bad_value.end = 5;
    assert!(matches!(
        store.insert(&key("/x"), &bad_value).await,
        Err(StoreError::InvalidValue(_))
    ));

    let mut no_ttl = ranged_value(0, b"abc", T0, 60);
    no_ttl.delete_at = T0;
    assert!(matches!(
        store.insert(&key("/x"), &no_ttl).await,
        Err(StoreError::InvalidValue(_))
    ));
    assert_eq!(row_count(&store).await, 0);
}

#[tokio::test]
async fn closed_store_reports_database_error() {
    let (store, _clock) = store().await;
    store.close().await;
    assert!(matches!(
        store.lookup(&key("/c")).await,
        Err(StoreError::Database(_))
    ));
}

#[tokio::test]
async fn entries_survive_reopen_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");
    let k = key("/persist");

    let store = CacheStore::open_at(&path).await.unwrap();
    store
        .admit_and_store(&k, StatusCode::PERMANENT_REDIRECT, &redirect("public, max-age=3600"))
        .await
        .unwrap()
        .unwrap();
    store.close().await;

    let reopened = CacheStore::open_at(&path).await.unwrap();
    let hit = reopened.lookup(&k).await.unwrap().unwrap();
    assert_eq!(hit.value.status, StatusCode::PERMANENT_REDIRECT);
    assert_eq!(hit.value.cache_control.get("max-age"), Some(&Some("3600".to_string())));
    reopened.close().await;
}

fn request(path: &str) -> RequestOptions {
    RequestOptions::new("https://cache.test", path, Method::GET)
}

#[tokio::test]
async fn dispatcher_answers_repeat_from_cache() {
    let (store, _clock) = store().await;
    let mock = MockDispatcher::new(vec![Script::ok(
        301,
        &[
            ("cache-control", "public, max-age=60"),
            ("location", "https://cache.test/new"),
        ],
        &[],
    )]);
    let cached = CacheDispatcher::new(mock.clone(), store);

    let mut first = Recorder::default();
    cached.dispatch(request("/moved"), &mut first).await;
    assert!(first.completed);
    assert_eq!(first.headers[0].0, StatusCode::MOVED_PERMANENTLY);

    let mut second = Recorder::default();
    cached.dispatch(request("/moved"), &mut second).await;
    assert_eq!(mock.calls(), 1, "second request answered without calling through");
    assert!(second.completed);
    assert_eq!(second.connects, 1);
    assert_eq!(second.headers.len(), 1);
    assert_eq!(second.headers[0].0, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(
        second.headers[0].1.get("location").unwrap(),
        "https://cache.test/new"
    );
}

#[tokio::test]
async fn dispatcher_does_not_cache_bodies() {
    let (store, _clock) = store().await;
    let mock = MockDispatcher::new(vec![Script::ok(
        200,
        &[("cache-control", "public, max-age=60")],
        &[&b"payload"[..]],
    )]);
    let cached = CacheDispatcher::new(mock.clone(), store);

    for _ in 0..2 {
        let mut rec = Recorder::default();
        cached.dispatch(request("/body"), &mut rec).await;
        assert!(rec.completed);
        assert_eq!(rec.body, b"payload");
    }
    assert_eq!(mock.calls(), 2);
    assert_eq!(row_count(cached.store()).await, 0);
}

#[tokio::test]
async fn dispatcher_bypasses_no_store_and_unsafe_methods() {
    let (store, _clock) = store().await;
    let mock = MockDispatcher::new(vec![Script::ok(
        301,
        &[("cache-control", "public, max-age=60")],
        &[],
    )]);
    let cached = CacheDispatcher::new(mock.clone(), store);

    let mut no_store = request("/ns");
    no_store
        .headers
        .insert("cache-control", HeaderValue::from_static("no-store"));
    cached.dispatch(no_store.clone(), &mut Recorder::default()).await;
    cached.dispatch(no_store, &mut Recorder::default()).await;
    assert_eq!(mock.calls(), 2);

    let post = RequestOptions::new("https://cache.test", "/ns", Method::POST);
    cached.dispatch(post.clone(), &mut Recorder::default()).await;
    cached.dispatch(post, &mut Recorder::default()).await;
    assert_eq!(mock.calls(), 4);
    assert_eq!(row_count(cached.store()).await, 0);
}

#[tokio::test]
async fn dispatcher_surfaces_store_failure() {
    let (store, _clock) = store().await;
    store.close().await;
    let mock = MockDispatcher::new(vec![Script::ok(200, &[], &[])]);
    let cached = CacheDispatcher::new(mock.clone(), store);

    let mut rec = Recorder::default();
    cached.dispatch(request("/down"), &mut rec).await;
    assert_eq!(mock.calls(), 0);
    assert_eq!(rec.connects, 1);
    assert!(matches!(rec.error, Some(crate::error::HttpError::Store(_))));
}

#[tokio::test]
async fn dispatcher_forwards_upgrade_without_admitting() {
    let (store, _clock) = store().await;
    let mock = MockDispatcher::new(vec![Script::upgrade(&[
        ("cache-control", "public, max-age=60"),
        ("upgrade", "websocket"),
    ])]);
    let cached = CacheDispatcher::new(mock.clone(), store);

    for expected_calls in 1..=2 {
        let mut rec = Recorder::default();
        cached.dispatch(request("/ws"), &mut rec).await;
        assert_eq!(rec.upgrades, 1);
        assert!(rec.headers.is_empty());
        assert!(!rec.completed);
        assert!(rec.error.is_none());
        assert_eq!(mock.calls(), expected_calls);
    }
    assert_eq!(row_count(cached.store()).await, 0);
}

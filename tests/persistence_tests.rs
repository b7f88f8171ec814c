//! Persistence across restarts
//!
//! The index is rebuilt from the on-disk store at startup; these tests
//! restart the resolver over the same directory and check what survives.

mod fixtures;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use fixtures::{url, TestCache, LOCK_TIMEOUT};
use jscache::{derive_key, BlobKind, FsBlobStore, HttpResponse, ResolveOptions, StoreError};

fn blob_path(cache: &TestCache, u: &str, kind: BlobKind) -> PathBuf {
    let key = derive_key(u);
    cache
        .dir
        .path()
        .join(key.shard())
        .join(key.as_str())
        .join(kind.file_name())
}

// =============================================================================
// Reload
// =============================================================================

#[test]
fn test_entries_and_bytecode_survive_restart() {
    let mut cache = TestCache::new();
    let u = url("persist.js");
    cache.http.respond(
        &u,
        HttpResponse::ok("export default 1").with_header("ETag", "\"v1\""),
    );
    cache.resolver().resolve(&u).unwrap();
    cache.settle();

    cache.restart();

    let resource = cache.resolver().resolve(&u).unwrap();
    assert!(resource.served_from_cache);
    assert_eq!(resource.source, "export default 1");
    assert_eq!(resource.bytecode.as_deref(), Some(&b"bytecode:export default 1"[..]));
    assert_eq!(cache.http.call_count(&u), 1);
    assert_eq!(cache.engine.compile_count(), 1);

    let entry = cache.index().peek(&u).unwrap();
    assert_eq!(entry.etag(), Some("\"v1\""));
}

#[test]
fn test_counters_start_fresh_after_restart() {
    let mut cache = TestCache::new();
    let u = url("counted.js");
    cache.http.respond(&u, HttpResponse::ok("x"));
    cache.resolver().resolve(&u).unwrap();
    cache.resolver().resolve(&u).unwrap();
    assert_eq!(cache.resolver().cache_stats().hits, 1);

    cache.restart();

    let stats = cache.resolver().cache_stats();
    assert_eq!(stats.entry_count, 1);
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 0);
}

#[test]
fn test_ttl_survives_restart() {
    let mut cache = TestCache::new();
    let u = url("short.js");
    cache.http.respond(&u, HttpResponse::ok("short"));
    let opts = ResolveOptions {
        ttl: Some(Duration::from_secs(30)),
        force_refresh: false,
    };
    cache.resolver().resolve_with(&u, opts).unwrap();

    cache.restart();
    cache.clock.advance(Duration::from_secs(31));

    let resource = cache.resolver().resolve(&u).unwrap();
    assert!(!resource.served_from_cache);
    assert_eq!(cache.http.call_count(&u), 2);
}

// =============================================================================
// Bad records are skipped
// =============================================================================

#[test]
fn test_expired_records_are_dropped_at_load() {
    let mut cache = TestCache::new();
    let u = url("old.js");
    cache.http.respond(&u, HttpResponse::ok("old"));
    let opts = ResolveOptions {
        ttl: Some(Duration::from_secs(10)),
        force_refresh: false,
    };
    cache.resolver().resolve_with(&u, opts).unwrap();
    assert!(blob_path(&cache, &u, BlobKind::Metadata).exists());

    cache.clock.advance(Duration::from_secs(11));
    cache.restart();

    assert!(cache.resolver().cached_urls().is_empty());
    assert!(!blob_path(&cache, &u, BlobKind::Metadata).exists());
    assert!(!blob_path(&cache, &u, BlobKind::Source).exists());
}

#[test]
fn test_corrupt_metadata_is_skipped() {
    let mut cache = TestCache::new();
    let good = url("good.js");
    let bad = url("bad.js");
    cache.http.respond(&good, HttpResponse::ok("good"));
    cache.http.respond(&bad, HttpResponse::ok("bad"));
    cache.resolver().resolve(&good).unwrap();
    cache.resolver().resolve(&bad).unwrap();
    cache.settle();

    fs::write(blob_path(&cache, &bad, BlobKind::Metadata), b"{ not json").unwrap();
    cache.restart();

    assert_eq!(cache.resolver().cached_urls(), vec![good.clone()]);
    assert!(!blob_path(&cache, &bad, BlobKind::Metadata).exists());

    // The bad URL is simply fetched again.
    assert!(!cache.resolver().resolve(&bad).unwrap().served_from_cache);
}

#[test]
fn test_tampered_source_is_skipped() {
    let mut cache = TestCache::new();
    let u = url("tampered.js");
    cache.http.respond(&u, HttpResponse::ok("original"));
    cache.resolver().resolve(&u).unwrap();
    cache.settle();

    fs::write(blob_path(&cache, &u, BlobKind::Source), b"injected").unwrap();
    cache.restart();

    assert!(cache.resolver().cached_urls().is_empty());
}

#[test]
fn test_missing_source_is_skipped() {
    let mut cache = TestCache::new();
    let u = url("halfway.js");
    cache.http.respond(&u, HttpResponse::ok("body"));
    cache.resolver().resolve(&u).unwrap();

    fs::remove_file(blob_path(&cache, &u, BlobKind::Source)).unwrap();
    cache.restart();

    assert!(cache.resolver().cached_urls().is_empty());
}

// =============================================================================
// Store ownership
// =============================================================================

#[test]
fn test_second_owner_is_locked_out() {
    let cache = TestCache::new();
    let result = FsBlobStore::open(cache.dir.path(), Duration::from_millis(100));
    assert!(matches!(result, Err(StoreError::Locked(_))));
}

#[test]
fn test_lock_released_on_restart() {
    let mut cache = TestCache::new();
    cache.restart();
    cache.restart();
    assert!(cache.resolver().cached_urls().is_empty());
    assert!(FsBlobStore::open(cache.dir.path(), LOCK_TIMEOUT / 50).is_err());
}

#[test]
fn test_clear_removes_everything_on_disk() {
    let mut cache = TestCache::new();
    for name in ["a.js", "b.js"] {
        cache.http.respond(&url(name), HttpResponse::ok(name));
        cache.resolver().resolve(&url(name)).unwrap();
    }
    cache.settle();

    cache.resolver().clear_cache();
    assert!(!blob_path(&cache, &url("a.js"), BlobKind::Metadata).exists());

    cache.restart();
    assert!(cache.resolver().cached_urls().is_empty());
}

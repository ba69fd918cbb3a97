use biomap_cache::{CacheError, CacheManager, CachePolicy, ResolutionSource};
use biomap_core::MappingPath;
use biomap_test_utils::{exact, linear_path, memory_cache, CountingResolver};
use futures::future::join_all;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn path() -> MappingPath {
    linear_path(&[("uniprot_to_ensembl", "uniprot_ac", "ensembl_gene")])
}

async fn resolve_concurrently(
    cache: &Arc<CacheManager>,
    resolver: &Arc<CountingResolver>,
    identifier: &str,
    callers: usize,
) -> Vec<Result<biomap_cache::Resolution, CacheError>> {
    let handles = (0..callers).map(|_| {
        let cache = Arc::clone(cache);
        let resolver = Arc::clone(resolver);
        let identifier = identifier.to_string();
        tokio::spawn(async move { cache.resolve(&identifier, &path(), resolver.as_ref()).await })
    });
    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_upstream_call() {
    let cache = memory_cache(CachePolicy::default());
    let resolver = Arc::new(
        CountingResolver::new()
            .with_mapping("P04637", &["ENSG00000141510"])
            .with_delay(Duration::from_millis(50)),
    );

    let results = resolve_concurrently(&cache, &resolver, "P04637", 32).await;

    assert_eq!(resolver.calls_for("P04637"), 1);
    let upstream = results
        .iter()
        .filter(|r| r.as_ref().unwrap().source == ResolutionSource::Upstream)
        .count();
    assert_eq!(upstream, 1);
    for result in &results {
        assert_eq!(result.as_ref().unwrap().targets, exact(&["ENSG00000141510"]));
    }
    assert_eq!(cache.in_flight(), 0);
    assert_eq!(cache.stats().upstream_calls, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_failures_share_one_upstream_call() {
    let cache = memory_cache(CachePolicy::default());
    let resolver = Arc::new(
        CountingResolver::new()
            .failing_on("BROKEN")
            .with_delay(Duration::from_millis(50)),
    );

    let results = resolve_concurrently(&cache, &resolver, "BROKEN", 16).await;

    assert_eq!(resolver.calls_for("BROKEN"), 1);
    assert!(results.iter().all(Result::is_err));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_keys_resolve_independently() {
    let cache = memory_cache(CachePolicy::default());
    let resolver = Arc::new(
        CountingResolver::new()
            .with_mapping("A", &["a"])
            .with_mapping("B", &["b"])
            .with_delay(Duration::from_millis(20)),
    );

    let (a, b) = tokio::join!(
        resolve_concurrently(&cache, &resolver, "A", 8),
        resolve_concurrently(&cache, &resolver, "B", 8),
    );

    assert_eq!(resolver.calls_for("A"), 1);
    assert_eq!(resolver.calls_for("B"), 1);
    assert!(a.iter().all(|r| r.as_ref().unwrap().targets == exact(&["a"])));
    assert!(b.iter().all(|r| r.as_ref().unwrap().targets == exact(&["b"])));
}

#[tokio::test]
async fn cache_hit_returns_original_targets() {
    let cache = memory_cache(CachePolicy::default());
    let resolver = CountingResolver::new().with_mapping("A1", &["B1", "B2"]);

    let first = cache.resolve("A1", &path(), &resolver).await.unwrap();
    let second = cache.resolve("A1", &path(), &resolver).await.unwrap();
    let third = cache.resolve("A1", &path(), &resolver).await.unwrap();

    assert_eq!(first.source, ResolutionSource::Upstream);
    assert_eq!(second.source, ResolutionSource::Cache);
    assert_eq!(first.targets, second.targets);
    assert_eq!(second.targets, third.targets);
    assert_eq!(resolver.calls(), 1);
    assert_eq!(cache.stats().hits, 2);
}

#[tokio::test]
async fn stored_targets_are_independent_copies() {
    let cache = memory_cache(CachePolicy::default());
    let resolver = CountingResolver::new().with_mapping("A1", &["B1", "B2"]);

    let mut first = cache.resolve("A1", &path(), &resolver).await.unwrap();
    first.targets.clear();

    let again = cache.resolve("A1", &path(), &resolver).await.unwrap();
    assert_eq!(again.targets, exact(&["B1", "B2"]));

    let entry = cache.entry("A1", path().id()).await.unwrap();
    assert_eq!(entry.targets, exact(&["B1", "B2"]));
}

#[tokio::test]
async fn upstream_failure_is_negatively_cached() {
    let cache = memory_cache(CachePolicy::default());
    let resolver = CountingResolver::new().failing_on("BROKEN");

    let first = cache.resolve("BROKEN", &path(), &resolver).await.unwrap_err();
    assert!(matches!(first, CacheError::Upstream { .. }));

    let second = cache.resolve("BROKEN", &path(), &resolver).await.unwrap_err();
    assert!(matches!(second, CacheError::RecentFailure { .. }));
    assert!(!second.is_no_mapping());
    assert_eq!(resolver.calls_for("BROKEN"), 1);
    assert_eq!(cache.stats().negative_hits, 1);

    let entry = cache.entry("BROKEN", path().id()).await.unwrap();
    assert!(entry.is_failure());
    assert!(entry.reason.unwrap().contains("BROKEN"));
}

#[tokio::test]
async fn refreshing_replaces_a_recorded_failure() {
    let cache = memory_cache(CachePolicy::default());
    let resolver = CountingResolver::new()
        .with_mapping("P2", &["G2"])
        .failing_first("P2", 1);

    let first = cache.resolve("P2", &path(), &resolver).await.unwrap_err();
    assert!(matches!(first, CacheError::Upstream { .. }));
    assert!(matches!(
        cache.resolve("P2", &path(), &resolver).await,
        Err(CacheError::RecentFailure { .. })
    ));

    let refreshed = cache
        .resolve_refreshing_failures("P2", &path(), &resolver)
        .await
        .unwrap();
    assert_eq!(refreshed.source, ResolutionSource::Upstream);
    assert_eq!(refreshed.targets, exact(&["G2"]));
    assert_eq!(resolver.calls_for("P2"), 2);

    let cached = cache.resolve("P2", &path(), &resolver).await.unwrap();
    assert_eq!(cached.source, ResolutionSource::Cache);
    assert!(!cache.entry("P2", path().id()).await.unwrap().is_negative());
}

#[tokio::test]
async fn empty_resolution_is_negatively_cached() {
    let cache = memory_cache(CachePolicy::default());
    let resolver = CountingResolver::new();

    for _ in 0..3 {
        let err = cache.resolve("A2", &path(), &resolver).await.unwrap_err();
        assert!(err.is_no_mapping());
    }
    assert_eq!(resolver.calls_for("A2"), 1);
}

#[tokio::test]
async fn negative_entry_expires() {
    let cache = memory_cache(CachePolicy::default().with_negative_ttl(Duration::from_millis(30)));
    let resolver = CountingResolver::new().failing_on("BROKEN");

    let _ = cache.resolve("BROKEN", &path(), &resolver).await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    let err = cache.resolve("BROKEN", &path(), &resolver).await.unwrap_err();

    assert!(matches!(err, CacheError::Upstream { .. }));
    assert_eq!(resolver.calls_for("BROKEN"), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lock_timeout_falls_back_to_direct_resolution() {
    let cache = memory_cache(CachePolicy::default().with_lock_timeout(Duration::from_millis(20)));
    let resolver = Arc::new(
        CountingResolver::new()
            .with_mapping("SLOW", &["s"])
            .with_delay(Duration::from_millis(300)),
    );

    let leader = {
        let cache = Arc::clone(&cache);
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { cache.resolve("SLOW", &path(), resolver.as_ref()).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    let follower = cache.resolve("SLOW", &path(), resolver.as_ref()).await.unwrap();
    assert_eq!(follower.source, ResolutionSource::Fallback);
    assert_eq!(follower.targets, exact(&["s"]));

    let leader = leader.await.unwrap().unwrap();
    assert_eq!(leader.source, ResolutionSource::Upstream);
    assert_eq!(resolver.calls_for("SLOW"), 2);
    assert_eq!(cache.stats().lock_timeouts, 1);
    assert_eq!(cache.stats().coalesced, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lock_timeout_without_fallback_is_an_error() {
    let cache = memory_cache(
        CachePolicy::default()
            .with_lock_timeout(Duration::from_millis(20))
            .with_fallback_on_lock_timeout(false),
    );
    let resolver = Arc::new(
        CountingResolver::new()
            .with_mapping("SLOW", &["s"])
            .with_delay(Duration::from_millis(300)),
    );

    let leader = {
        let cache = Arc::clone(&cache);
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { cache.resolve("SLOW", &path(), resolver.as_ref()).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    let err = cache.resolve("SLOW", &path(), resolver.as_ref()).await.unwrap_err();
    assert!(matches!(err, CacheError::LockTimeout { waited_ms: 20, .. }));
    assert_eq!(cache.stats().coalesced, 0);
    assert!(leader.await.unwrap().is_ok());
    assert_eq!(resolver.calls_for("SLOW"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abandoned_leader_hands_over_to_waiter() {
    let cache = memory_cache(CachePolicy::default());
    let resolver = Arc::new(
        CountingResolver::new()
            .with_mapping("X", &["x"])
            .with_delay(Duration::from_millis(200)),
    );

    let leader = {
        let cache = Arc::clone(&cache);
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { cache.resolve("X", &path(), resolver.as_ref()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let follower = {
        let cache = Arc::clone(&cache);
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { cache.resolve("X", &path(), resolver.as_ref()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    leader.abort();

    let resolved = follower.await.unwrap().unwrap();
    assert_eq!(resolved.source, ResolutionSource::Upstream);
    assert_eq!(resolved.targets, exact(&["x"]));
    assert_eq!(resolver.calls_for("X"), 2);
    assert_eq!(cache.in_flight(), 0);
}

#[tokio::test]
async fn invalidate_forces_refetch() {
    let cache = memory_cache(CachePolicy::default());
    let resolver = CountingResolver::new().with_mapping("A1", &["B1"]);

    cache.resolve("A1", &path(), &resolver).await.unwrap();
    cache.invalidate("A1", path().id()).await.unwrap();
    let again = cache.resolve("A1", &path(), &resolver).await.unwrap();

    assert_eq!(again.source, ResolutionSource::Upstream);
    assert_eq!(resolver.calls(), 2);
}

#[tokio::test]
async fn uncached_resolution_leaves_store_untouched() {
    let cache = memory_cache(CachePolicy::default());
    let resolver = CountingResolver::new().with_mapping("A1", &["B1"]);

    let resolved = cache.resolve_uncached("A1", &path(), &resolver).await.unwrap();
    assert_eq!(resolved.source, ResolutionSource::Uncached);
    assert!(cache.entry("A1", path().id()).await.is_none());
}

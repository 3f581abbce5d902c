//! Memoization through the database context's cache.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use strata_core::{CacheConfig, CacheError, DatabaseConfig, ShardConfig, StrataError};
use strata_model::{ClassBuilder, ModelAccess};
use strata_storage::{Connectors, Database, Filter, MemoryConnector, TtlPolicy};
use strata_test_utils::fixtures::{classes, doc, test_database};
use strata_test_utils::{MockRemoteConnector, SchemaRegistry};

#[tokio::test]
async fn test_memoized_counter() {
    let (db, _) = test_database().await.unwrap();
    let cache = db.cache().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let next = cache.memoize("Counter", "next", TtlPolicy::Default);

    let compute = || {
        let counter = counter.clone();
        async move { Ok::<_, StrataError>(counter.fetch_add(1, Ordering::SeqCst) + 1) }
    };

    let first: usize = next.call(&[], compute).await.unwrap();
    let second: usize = next.call(&[], compute).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    cache.adapter().delete(&next.key(&[])).await.unwrap();
    let third: usize = next.call(&[], compute).await.unwrap();
    assert_ne!(third, first);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_instance_invalidate_hook() {
    let classes = classes().unwrap();
    let (db, _) = test_database().await.unwrap();
    let cache = db.cache().unwrap();
    let users = db.model(&classes.user);

    let mut user = users.make(doc(json!({"username": "lee"}))).unwrap();
    user.save().await.unwrap();
    let id = user.id().unwrap();

    let by_id = cache.memoize("User", "byId", TtlPolicy::Fixed(Duration::from_secs(300)));
    let load = || {
        let users = users.clone();
        async move {
            let found = users.get(id, None).await?;
            Ok::<_, StrataError>(found.map(|u| u.to_object(None, false)))
        }
    };

    let cached = by_id.call(&[&id], load).await.unwrap();
    assert_eq!(cached.as_ref().and_then(|u| u.get("username")), Some(&json!("lee")));

    user.update(doc(json!({"username": "lea"}))).await.unwrap();
    let stale = by_id.call(&[&id], load).await.unwrap();
    assert_eq!(stale.as_ref().and_then(|u| u.get("username")), Some(&json!("lee")));

    user.invalidate(&cache, "byId", &[&id]).await.unwrap();
    let fresh = by_id.call(&[&id], load).await.unwrap();
    assert_eq!(fresh.as_ref().and_then(|u| u.get("username")), Some(&json!("lea")));
}

#[tokio::test]
async fn test_remote_cache_through_context() {
    let remote = MockRemoteConnector::new();
    let config = DatabaseConfig::new(ShardConfig::new("mem://meta", "app")).with_cache(
        CacheConfig::memcached(vec!["127.0.0.1:11211".to_string()], 120).with_prefix("app"),
    );
    let db = Database::new(
        config,
        Connectors::new(Arc::new(MemoryConnector::new())).with_remote_cache(Arc::new(remote.clone())),
    );
    db.init().await.unwrap();
    assert!(remote.client_handle().is_connected());

    let cache = db.cache().unwrap();
    let memo = cache.memoize("Report", "daily", TtlPolicy::Default);
    let value: Vec<u32> = memo.call(&[&"2024-01-01"], || async { Ok(vec![1, 2, 3]) }).await.unwrap();
    assert_eq!(value, vec![1, 2, 3]);

    let key = memo.key(&[&"2024-01-01"]);
    assert!(key.starts_with("app.Report.daily("));
    assert_eq!(remote.client_handle().expiry(&key), Some(120));
    assert_eq!(remote.client_handle().keys(), vec![key.clone()]);

    let again: Vec<u32> = memo
        .call(&[&"2024-01-01"], || async { Ok(vec![9]) })
        .await
        .unwrap();
    assert_eq!(again, vec![1, 2, 3]);
    assert_eq!(remote.client_handle().set_count(), 1);

    remote.client_handle().set_failing(true);
    let err = memo
        .call(&[&"2024-01-02"], || async { Ok(vec![0u32]) })
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::Cache(CacheError::Backend { .. })));

    remote.client_handle().set_failing(false);
    memo.invalidate(&[&"2024-01-01"]).await.unwrap();
    assert!(remote.client_handle().keys().is_empty());
    db.close().await.unwrap();
    assert!(!remote.client_handle().is_connected());
}

#[tokio::test]
async fn test_computed_properties_resolve_concurrently() {
    let schemas = SchemaRegistry::new();
    let (db, _) = test_database().await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let article = ClassBuilder::new("Article")
        .field("title", strata_core::FieldDescriptor::string().required())
        .unwrap()
        .computed("slug", |m| {
            let title = m
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_lowercase()
                .replace(' ', "-");
            Box::pin(async move { Ok(Value::from(title)) })
        })
        .computed("views", move |_| {
            let seen = seen.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(Value::from(42))
            })
        })
        .build(&schemas)
        .unwrap();

    let mut post = db
        .model(&article)
        .make(doc(json!({"title": "Hello World"})))
        .unwrap();
    post.save().await.unwrap();

    let full = post.to_object_async(None, false).await.unwrap();
    assert_eq!(full.get("slug"), Some(&json!("hello-world")));
    assert_eq!(full.get("views"), Some(&json!(42)));
    assert_eq!(full.get("title"), Some(&json!("Hello World")));

    let only_slug = post.to_object_async(Some(&["slug"]), false).await.unwrap();
    assert_eq!(only_slug.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stored = db.model(&article).find(&Filter::new(), None).await.unwrap();
    assert_eq!(stored.len(), 1);
}

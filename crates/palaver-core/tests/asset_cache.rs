use palaver_core::{AssetCache, AssetKind, CoreError, HttpAssetFetcher, ItemType, SessionAssets};
use palaver_test_utils::{AssetsBuilder, StaticAssetFetcher, TEST_ASSETS_URL};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_cache() -> AssetCache {
    let fetcher = HttpAssetFetcher::new(Duration::from_secs(5)).unwrap();
    AssetCache::new(Arc::new(fetcher))
}

#[tokio::test]
async fn test_repeated_gets_fetch_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/group"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"uuid": "g1", "name": "Testers"},
            {"uuid": "g2", "name": "Adults", "query": "age > 18"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(http_cache());
    let assets = SessionAssets::new(Arc::clone(&cache), server.uri());

    let first = assets.groups().await.unwrap();
    let second = assets.groups().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_kind_mismatch_never_replaces_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/field"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"key": "age", "name": "Age", "type": "number"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let cache = http_cache();
    let locator = format!("{}/field", server.uri());

    cache
        .get(&locator, AssetKind::set(ItemType::Field))
        .await
        .unwrap();

    for wrong in [
        AssetKind::object(ItemType::Field),
        AssetKind::set(ItemType::Group),
    ] {
        match cache.get(&locator, wrong).await {
            Err(CoreError::AssetTypeMismatch { locator: l, .. }) => assert_eq!(l, locator),
            other => panic!("Expected AssetTypeMismatch, got {:?}", other),
        }
    }

    // the original entry is still served
    assert!(cache
        .get(&locator, AssetKind::set(ItemType::Field))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_server_errors_surface_as_fetch_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let cache = http_cache();
    let locator = format!("{}/resthook", server.uri());

    for _ in 0..2 {
        assert!(matches!(
            cache.get(&locator, AssetKind::set(ItemType::Resthook)).await,
            Err(CoreError::CacheFetchError { .. })
        ));
    }
    assert!(cache.is_empty());
}

#[test]
fn test_failed_include_changes_nothing() {
    let cache = AssetCache::new(Arc::new(StaticAssetFetcher::new()));
    let groups = format!("{}/group", TEST_ASSETS_URL);

    cache
        .include(
            &json!([
                {"url": groups, "type": "group", "is_set": true, "content": [{"uuid": "g1", "name": "Testers"}]}
            ])
            .to_string(),
        )
        .unwrap();
    let added_on = cache.entry_info(&groups).unwrap().added_on;

    let result = cache.include(
        &json!([
            {"url": groups, "type": "group", "is_set": true, "content": []},
            {"url": format!("{}/field", TEST_ASSETS_URL), "type": "field", "is_set": true, "content": []},
            {"type": "resthook", "is_set": true, "content": []}
        ])
        .to_string(),
    );

    assert!(matches!(result, Err(CoreError::ValidationError(_))));
    assert_eq!(cache.len(), 1);
    assert!(!cache.contains(&format!("{}/field", TEST_ASSETS_URL)));
    assert_eq!(cache.entry_info(&groups).unwrap().added_on, added_on);
}

#[tokio::test]
async fn test_included_assets_skip_the_fetcher() {
    let fetcher = Arc::new(StaticAssetFetcher::new());
    let assets = AssetsBuilder::new()
        .field("age", "Age", "number")
        .build_with_fetcher(fetcher.clone())
        .unwrap();

    let fields = assets.fields().await.unwrap();
    assert_eq!(fields[0].key, "age");
    assert_eq!(fetcher.fetch_count(&format!("{}/field", TEST_ASSETS_URL)), 0);

    assert!(assets.flow(&"missing".into()).await.is_err());
    assert_eq!(
        fetcher.fetch_count(&format!("{}/flow/missing", TEST_ASSETS_URL)),
        1
    );
}

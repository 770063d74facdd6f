use std::sync::Arc;

use super::cache::{Asset, AssetCache, AssetKind, AssetSet, AssetValue, ItemType};
use crate::domain::asset_types::{Channel, Classifier, Field, Group, Resthook};
use crate::domain::flow::Flow;
use crate::domain::location::LocationHierarchy;
use crate::domain::{ChannelUuid, ClassifierUuid, FlowUuid, GroupUuid};
use crate::{CoreError, EngineConfig};

/// Typed view of the asset cache for one asset server
///
/// Sets live at `{base}/{type}` and single objects at `{base}/{type}/{uuid}`.
#[derive(Debug, Clone)]
pub struct SessionAssets {
    cache: Arc<AssetCache>,
    base_url: String,
}

impl SessionAssets {
    /// Create a view rooted at `base_url`
    pub fn new(cache: Arc<AssetCache>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            cache,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// A view of the configured asset server, backed by a new HTTP cache
    pub fn from_config(config: &EngineConfig) -> Result<Self, CoreError> {
        let cache = AssetCache::from_config(config)?;
        Ok(Self::new(Arc::new(cache), config.asset_server_url.as_str()))
    }

    /// The underlying cache
    pub fn cache(&self) -> &Arc<AssetCache> {
        &self.cache
    }

    /// Locator of the set of assets of the given type
    pub fn set_locator(&self, item_type: ItemType) -> String {
        format!("{}/{}", self.base_url, item_type)
    }

    /// Locator of a single asset
    pub fn object_locator(&self, item_type: ItemType, uuid: &str) -> String {
        format!("{}/{}/{}", self.base_url, item_type, uuid)
    }

    async fn object(&self, item_type: ItemType, uuid: &str) -> Result<(String, Asset), CoreError> {
        let locator = self.object_locator(item_type, uuid);
        match self.cache.get(&locator, AssetKind::object(item_type)).await? {
            AssetValue::Object(asset) if asset.item_type() == item_type => Ok((locator, asset)),
            other => Err(mismatch(&locator, AssetKind::object(item_type), &other)),
        }
    }

    async fn set(&self, item_type: ItemType) -> Result<(String, Arc<AssetSet>), CoreError> {
        let locator = self.set_locator(item_type);
        match self.cache.get(&locator, AssetKind::set(item_type)).await? {
            AssetValue::Set(set) if set.item_type() == item_type => Ok((locator, set)),
            other => Err(mismatch(&locator, AssetKind::set(item_type), &other)),
        }
    }

    /// The channel with the given UUID
    pub async fn channel(&self, uuid: &ChannelUuid) -> Result<Channel, CoreError> {
        match self.object(ItemType::Channel, uuid.as_str()).await? {
            (_, Asset::Channel(channel)) => Ok(channel),
            (locator, other) => Err(object_mismatch(&locator, ItemType::Channel, &other)),
        }
    }

    /// The flow with the given UUID
    pub async fn flow(&self, uuid: &FlowUuid) -> Result<Arc<Flow>, CoreError> {
        match self.object(ItemType::Flow, uuid.as_str()).await? {
            (_, Asset::Flow(flow)) => Ok(flow),
            (locator, other) => Err(object_mismatch(&locator, ItemType::Flow, &other)),
        }
    }

    /// All groups
    pub async fn groups(&self) -> Result<Vec<Group>, CoreError> {
        let (_, set) = self.set(ItemType::Group).await?;
        Ok(set
            .items()
            .iter()
            .filter_map(|a| match a {
                Asset::Group(g) => Some(g.clone()),
                _ => None,
            })
            .collect())
    }

    /// The group with the given UUID, if it exists
    pub async fn group(&self, uuid: &GroupUuid) -> Result<Option<Group>, CoreError> {
        Ok(self.groups().await?.into_iter().find(|g| &g.uuid == uuid))
    }

    /// All classifiers
    pub async fn classifiers(&self) -> Result<Vec<Classifier>, CoreError> {
        let (_, set) = self.set(ItemType::Classifier).await?;
        Ok(set
            .items()
            .iter()
            .filter_map(|a| match a {
                Asset::Classifier(c) => Some(c.clone()),
                _ => None,
            })
            .collect())
    }

    /// The classifier with the given UUID, if it exists
    pub async fn classifier(&self, uuid: &ClassifierUuid) -> Result<Option<Classifier>, CoreError> {
        Ok(self.classifiers().await?.into_iter().find(|c| &c.uuid == uuid))
    }

    /// All resthooks
    pub async fn resthooks(&self) -> Result<Vec<Resthook>, CoreError> {
        let (_, set) = self.set(ItemType::Resthook).await?;
        Ok(set
            .items()
            .iter()
            .filter_map(|a| match a {
                Asset::Resthook(r) => Some(r.clone()),
                _ => None,
            })
            .collect())
    }

    /// The resthook with the given slug, if it exists
    pub async fn resthook(&self, slug: &str) -> Result<Option<Resthook>, CoreError> {
        Ok(self.resthooks().await?.into_iter().find(|r| r.slug == slug))
    }

    /// All contact fields
    pub async fn fields(&self) -> Result<Vec<Field>, CoreError> {
        let (_, set) = self.set(ItemType::Field).await?;
        Ok(set
            .items()
            .iter()
            .filter_map(|a| match a {
                Asset::Field(f) => Some(f.clone()),
                _ => None,
            })
            .collect())
    }

    /// The field with the given key, if it exists
    pub async fn field(&self, key: &str) -> Result<Option<Field>, CoreError> {
        Ok(self.fields().await?.into_iter().find(|f| f.key == key))
    }

    /// All location hierarchies
    pub async fn locations(&self) -> Result<Vec<Arc<LocationHierarchy>>, CoreError> {
        let (_, set) = self.set(ItemType::LocationHierarchy).await?;
        Ok(set
            .items()
            .iter()
            .filter_map(|a| match a {
                Asset::LocationHierarchy(h) => Some(Arc::clone(h)),
                _ => None,
            })
            .collect())
    }
}

fn mismatch(locator: &str, expected: AssetKind, actual: &AssetValue) -> CoreError {
    CoreError::AssetTypeMismatch {
        locator: locator.to_string(),
        expected: expected.to_string(),
        actual: actual.kind().to_string(),
    }
}

fn object_mismatch(locator: &str, expected: ItemType, actual: &Asset) -> CoreError {
    CoreError::AssetTypeMismatch {
        locator: locator.to_string(),
        expected: expected.to_string(),
        actual: actual.item_type().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::fetcher::MockAssetFetcher;
    use serde_json::json;

    fn assets_with(payload: serde_json::Value) -> SessionAssets {
        let mut fetcher = MockAssetFetcher::new();
        fetcher.expect_fetch().never();
        let cache = AssetCache::new(Arc::new(fetcher));
        cache.include(&payload.to_string()).unwrap();
        SessionAssets::new(Arc::new(cache), "http://assets.example.com/")
    }

    #[test]
    fn test_locators() {
        let assets = assets_with(json!([]));
        assert_eq!(
            assets.set_locator(ItemType::Group),
            "http://assets.example.com/group"
        );
        assert_eq!(
            assets.object_locator(ItemType::Flow, "f1"),
            "http://assets.example.com/flow/f1"
        );
    }

    #[tokio::test]
    async fn test_typed_lookups() {
        let assets = assets_with(json!([
            {"url": "http://assets.example.com/group", "type": "group", "is_set": true, "content": [
                {"uuid": "g1", "name": "Testers"}
            ]},
            {"url": "http://assets.example.com/resthook", "type": "resthook", "is_set": true, "content": [
                {"slug": "new-registration", "subscribers": ["http://example.com/hook"]}
            ]},
            {"url": "http://assets.example.com/field", "type": "field", "is_set": true, "content": [
                {"key": "age", "name": "Age", "type": "number"}
            ]},
            {"url": "http://assets.example.com/location_hierarchy", "type": "location_hierarchy", "is_set": true, "content": [
                {"name": "Rwanda", "children": [{"name": "Kigali City"}]}
            ]}
        ]));

        assert_eq!(
            assets.group(&GroupUuid::from("g1")).await.unwrap().unwrap().name,
            "Testers"
        );
        assert!(assets.group(&GroupUuid::from("g2")).await.unwrap().is_none());
        assert_eq!(
            assets.resthook("new-registration").await.unwrap().unwrap().subscribers,
            vec!["http://example.com/hook"]
        );
        assert_eq!(assets.field("age").await.unwrap().unwrap().value_type, "number");

        let locations = assets.locations().await.unwrap();
        assert_eq!(locations[0].root().name(), "Rwanda");
        assert_eq!(locations[0].len(), 2);
    }

    #[tokio::test]
    async fn test_wrong_payload_is_a_mismatch() {
        let assets = assets_with(json!([
            {"url": "http://assets.example.com/group", "type": "field", "is_set": true, "content": []}
        ]));

        assert!(matches!(
            assets.groups().await,
            Err(CoreError::AssetTypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_from_config_reads_asset_server() {
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/org/1/group"))
            .and(header("authorization", "Bearer sesame"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"uuid": "g1", "name": "Testers"}])),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/org/1/flow/nope"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let config = EngineConfig {
            asset_server_url: format!("{}/org/1/", server.uri()),
            asset_server_token: Some("sesame".to_string()),
            ..EngineConfig::default()
        };
        let assets = SessionAssets::from_config(&config).unwrap();

        let groups = assets.groups().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Testers");
        assert!(assets.group(&GroupUuid::from("g1")).await.unwrap().is_some());

        let locator = format!("{}/org/1/flow/nope", server.uri());
        assert_eq!(
            assets.flow(&FlowUuid::from("nope")).await.unwrap_err(),
            CoreError::AssetNotFound(locator.clone())
        );
        assert!(!assets.cache().contains(&locator));
    }
}

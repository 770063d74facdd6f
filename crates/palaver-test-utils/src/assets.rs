//! Asset payload builders and an in-memory fetcher.

use async_trait::async_trait;
use palaver_core::{AssetCache, AssetFetcher, CoreError, ItemType, SessionAssets};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Base URL the built assets are rooted at
pub const TEST_ASSETS_URL: &str = "http://assets.test.palaver.io";

/// Fetcher serving payloads from memory and counting fetches per locator
///
/// Locators it doesn't know fail like a 404 would.
#[derive(Debug, Default)]
pub struct StaticAssetFetcher {
    payloads: Mutex<HashMap<String, Value>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl StaticAssetFetcher {
    /// Create a fetcher with nothing to serve
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `content` at `locator`
    pub fn serve(self, locator: &str, content: Value) -> Self {
        self.payloads.lock().insert(locator.to_string(), content);
        self
    }

    /// How many times `locator` was fetched
    pub fn fetch_count(&self, locator: &str) -> usize {
        self.fetches.lock().get(locator).copied().unwrap_or(0)
    }
}

#[async_trait]
impl AssetFetcher for StaticAssetFetcher {
    async fn fetch(&self, locator: &str) -> Result<Value, CoreError> {
        *self.fetches.lock().entry(locator.to_string()).or_insert(0) += 1;
        self.payloads
            .lock()
            .get(locator)
            .cloned()
            .ok_or_else(|| CoreError::AssetNotFound(locator.to_string()))
    }
}

/// Builds the envelope payload a cache is seeded with
///
/// Flows become single objects, everything else is collected into one set per
/// type. Types never added are still included as empty sets so lookups don't
/// fall through to the fetcher.
#[derive(Debug, Clone, Default)]
pub struct AssetsBuilder {
    flows: Vec<Value>,
    sets: HashMap<ItemType, Vec<Value>>,
}

impl AssetsBuilder {
    /// Start with no assets
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a flow definition
    pub fn flow(mut self, definition: Value) -> Self {
        self.flows.push(definition);
        self
    }

    /// Add a static group
    pub fn group(self, uuid: &str, name: &str) -> Self {
        self.item(ItemType::Group, json!({"uuid": uuid, "name": name}))
    }

    /// Add a group whose membership is computed from `query`
    pub fn dynamic_group(self, uuid: &str, name: &str, query: &str) -> Self {
        self.item(
            ItemType::Group,
            json!({"uuid": uuid, "name": name, "query": query}),
        )
    }

    /// Add a contact field
    pub fn field(self, key: &str, name: &str, value_type: &str) -> Self {
        self.item(
            ItemType::Field,
            json!({"key": key, "name": name, "type": value_type}),
        )
    }

    /// Add a classifier with the given intents
    pub fn classifier(self, uuid: &str, name: &str, intents: &[&str]) -> Self {
        self.item(
            ItemType::Classifier,
            json!({"uuid": uuid, "name": name, "type": "test", "intents": intents}),
        )
    }

    /// Add a resthook with its subscriber URLs
    pub fn resthook(self, slug: &str, subscribers: &[&str]) -> Self {
        self.item(
            ItemType::Resthook,
            json!({"slug": slug, "subscribers": subscribers}),
        )
    }

    /// Add a channel
    pub fn channel(self, uuid: &str, name: &str, address: &str, schemes: &[&str]) -> Self {
        self.item(
            ItemType::Channel,
            json!({"uuid": uuid, "name": name, "address": address, "schemes": schemes, "roles": ["send", "receive"]}),
        )
    }

    /// Add a location hierarchy given as nested JSON
    pub fn locations(self, hierarchy: Value) -> Self {
        self.item(ItemType::LocationHierarchy, hierarchy)
    }

    fn item(mut self, item_type: ItemType, content: Value) -> Self {
        self.sets.entry(item_type).or_default().push(content);
        self
    }

    /// The envelopes as a JSON array
    pub fn payload(&self) -> Value {
        let mut envelopes: Vec<Value> = self
            .flows
            .iter()
            .map(|flow| {
                json!({
                    "url": format!("{}/flow/{}", TEST_ASSETS_URL, flow["uuid"].as_str().unwrap_or_default()),
                    "type": "flow",
                    "content": flow,
                })
            })
            .collect();

        let set_types = [
            ItemType::Channel,
            ItemType::Classifier,
            ItemType::Field,
            ItemType::Group,
            ItemType::LocationHierarchy,
            ItemType::Resthook,
        ];
        for item_type in set_types {
            let items = self.sets.get(&item_type).cloned().unwrap_or_default();
            envelopes.push(json!({
                "url": format!("{}/{}", TEST_ASSETS_URL, item_type),
                "type": item_type.as_str(),
                "is_set": true,
                "content": items,
            }));
        }

        Value::Array(envelopes)
    }

    /// Seed a cache backed by `fetcher` and wrap it for sessions
    pub fn build_with_fetcher(
        &self,
        fetcher: Arc<dyn AssetFetcher>,
    ) -> Result<Arc<SessionAssets>, CoreError> {
        let cache = AssetCache::new(fetcher);
        cache.include(&self.payload().to_string())?;
        Ok(Arc::new(SessionAssets::new(Arc::new(cache), TEST_ASSETS_URL)))
    }

    /// Seed a cache whose misses always fail
    pub fn build(&self) -> Result<Arc<SessionAssets>, CoreError> {
        self.build_with_fetcher(Arc::new(StaticAssetFetcher::new()))
    }
}

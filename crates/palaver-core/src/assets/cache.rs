//! Read-through cache of externally hosted assets
//!
//! Entries are keyed by locator. A single mutex guards the whole map; it is
//! never held across a fetch, so concurrent misses for the same locator may
//! fetch more than once and the first value stored wins.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use super::fetcher::{AssetFetcher, HttpAssetFetcher};
use crate::config::EngineConfig;
use crate::domain::asset_types::{Channel, Classifier, Field, Group, Resthook};
use crate::domain::flow::Flow;
use crate::domain::location::{LocationHierarchy, DEFAULT_LOCATION_LEVELS};
use crate::CoreError;

/// The kinds of object an asset can be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    /// A [`Channel`]
    Channel,
    /// A [`Classifier`]
    Classifier,
    /// A [`Field`]
    Field,
    /// A [`Flow`]
    Flow,
    /// A [`Group`]
    Group,
    /// A [`LocationHierarchy`]
    LocationHierarchy,
    /// A [`Resthook`]
    Resthook,
}

impl ItemType {
    /// The tag used in asset envelopes and locators
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Channel => "channel",
            ItemType::Classifier => "classifier",
            ItemType::Field => "field",
            ItemType::Flow => "flow",
            ItemType::Group => "group",
            ItemType::LocationHierarchy => "location_hierarchy",
            ItemType::Resthook => "resthook",
        }
    }
}

impl FromStr for ItemType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "channel" => Ok(ItemType::Channel),
            "classifier" => Ok(ItemType::Classifier),
            "field" => Ok(ItemType::Field),
            "flow" => Ok(ItemType::Flow),
            "group" => Ok(ItemType::Group),
            "location_hierarchy" => Ok(ItemType::LocationHierarchy),
            "resthook" => Ok(ItemType::Resthook),
            other => Err(CoreError::ValidationError(format!(
                "unknown asset type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a caller expects to find at a locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetKind {
    /// Type of the object(s)
    pub item_type: ItemType,
    /// Whether the payload is a homogeneous set rather than a single object
    pub is_set: bool,
}

impl AssetKind {
    /// A single object of the given type
    pub fn object(item_type: ItemType) -> Self {
        Self {
            item_type,
            is_set: false,
        }
    }

    /// A set of objects of the given type
    pub fn set(item_type: ItemType) -> Self {
        Self {
            item_type,
            is_set: true,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_set {
            write!(f, "set of {}", self.item_type)
        } else {
            write!(f, "{}", self.item_type)
        }
    }
}

/// A single decoded asset
#[derive(Debug, Clone)]
pub enum Asset {
    /// A channel
    Channel(Channel),
    /// A classifier
    Classifier(Classifier),
    /// A field
    Field(Field),
    /// A flow
    Flow(Arc<Flow>),
    /// A group
    Group(Group),
    /// A location hierarchy
    LocationHierarchy(Arc<LocationHierarchy>),
    /// A resthook
    Resthook(Resthook),
}

impl Asset {
    /// Type of this asset
    pub fn item_type(&self) -> ItemType {
        match self {
            Asset::Channel(_) => ItemType::Channel,
            Asset::Classifier(_) => ItemType::Classifier,
            Asset::Field(_) => ItemType::Field,
            Asset::Flow(_) => ItemType::Flow,
            Asset::Group(_) => ItemType::Group,
            Asset::LocationHierarchy(_) => ItemType::LocationHierarchy,
            Asset::Resthook(_) => ItemType::Resthook,
        }
    }

    fn decode(
        item_type: ItemType,
        content: &serde_json::Value,
        max_location_levels: usize,
    ) -> Result<Self, CoreError> {
        fn parse<T: serde::de::DeserializeOwned>(
            item_type: ItemType,
            content: &serde_json::Value,
        ) -> Result<T, CoreError> {
            serde_json::from_value(content.clone())
                .map_err(|e| CoreError::ParseError(format!("invalid {}: {}", item_type, e)))
        }

        Ok(match item_type {
            ItemType::Channel => Asset::Channel(parse(item_type, content)?),
            ItemType::Classifier => Asset::Classifier(parse(item_type, content)?),
            ItemType::Field => Asset::Field(parse(item_type, content)?),
            ItemType::Flow => Asset::Flow(Arc::new(Flow::read(content)?)),
            ItemType::Group => Asset::Group(parse(item_type, content)?),
            ItemType::LocationHierarchy => Asset::LocationHierarchy(Arc::new(
                LocationHierarchy::read(content, max_location_levels)?,
            )),
            ItemType::Resthook => Asset::Resthook(parse(item_type, content)?),
        })
    }
}

/// A homogeneous sequence of assets
#[derive(Debug, Clone)]
pub struct AssetSet {
    item_type: ItemType,
    items: Vec<Asset>,
}

impl AssetSet {
    /// Type of every item in the set
    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    /// The items in payload order
    pub fn items(&self) -> &[Asset] {
        &self.items
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A cached payload: one asset or a set of them
#[derive(Debug, Clone)]
pub enum AssetValue {
    /// A single asset
    Object(Asset),
    /// A set of assets
    Set(Arc<AssetSet>),
}

impl AssetValue {
    /// The kind of this payload
    pub fn kind(&self) -> AssetKind {
        match self {
            AssetValue::Object(asset) => AssetKind::object(asset.item_type()),
            AssetValue::Set(set) => AssetKind::set(set.item_type),
        }
    }

    fn decode(
        kind: AssetKind,
        content: &serde_json::Value,
        max_location_levels: usize,
    ) -> Result<Self, CoreError> {
        if !kind.is_set {
            return Asset::decode(kind.item_type, content, max_location_levels)
                .map(AssetValue::Object);
        }

        let elements = content.as_array().ok_or_else(|| {
            CoreError::ParseError(format!("expected an array for {}", kind))
        })?;
        let items = elements
            .iter()
            .map(|e| Asset::decode(kind.item_type, e, max_location_levels))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AssetValue::Set(Arc::new(AssetSet {
            item_type: kind.item_type,
            items,
        })))
    }
}

/// Timestamps of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntryInfo {
    /// When the entry was stored
    pub added_on: DateTime<Utc>,
    /// When the entry was last read
    pub accessed_on: DateTime<Utc>,
}

#[derive(Debug)]
struct CacheEntry {
    value: AssetValue,
    info: CacheEntryInfo,
}

impl CacheEntry {
    fn new(value: AssetValue, now: DateTime<Utc>) -> Self {
        Self {
            value,
            info: CacheEntryInfo {
                added_on: now,
                accessed_on: now,
            },
        }
    }

    fn checked_value(&self, locator: &str, kind: AssetKind) -> Result<AssetValue, CoreError> {
        let actual = self.value.kind();
        if actual != kind {
            return Err(CoreError::AssetTypeMismatch {
                locator: locator.to_string(),
                expected: kind.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(self.value.clone())
    }
}

#[derive(Deserialize)]
struct AssetEnvelope {
    #[serde(default)]
    url: Option<String>,
    #[serde(rename = "type", default)]
    item_type: Option<String>,
    #[serde(default)]
    content: Option<serde_json::Value>,
    #[serde(default)]
    is_set: bool,
}

/// Concurrency-safe read-through cache of assets keyed by locator
pub struct AssetCache {
    fetcher: Arc<dyn AssetFetcher>,
    max_location_levels: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetCache")
            .field("max_location_levels", &self.max_location_levels)
            .field("len", &self.len())
            .finish()
    }
}

impl AssetCache {
    /// Create an empty cache that fetches misses through `fetcher`
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            fetcher,
            max_location_levels: DEFAULT_LOCATION_LEVELS,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Create an empty cache fetching over HTTP as configured
    pub fn from_config(config: &EngineConfig) -> Result<Self, CoreError> {
        let mut fetcher = HttpAssetFetcher::new(config.http_timeout())?;
        if let Some(token) = &config.asset_server_token {
            fetcher = fetcher.with_auth_token(token.clone());
        }
        Ok(Self::new(Arc::new(fetcher)).with_max_location_levels(config.max_location_levels))
    }

    /// Set how many levels of location hierarchies are indexed
    pub fn with_max_location_levels(mut self, levels: usize) -> Self {
        self.max_location_levels = levels;
        self
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the asset at `locator`, fetching it on a miss
    ///
    /// A cached payload of a different kind is an error and is never replaced.
    pub async fn get(&self, locator: &str, kind: AssetKind) -> Result<AssetValue, CoreError> {
        if let Some(value) = self.lookup(locator, kind)? {
            debug!(locator, kind = %kind, "Asset cache hit");
            return Ok(value);
        }

        debug!(locator, kind = %kind, "Asset cache miss");
        let content = self.fetcher.fetch(locator).await?;
        let value = AssetValue::decode(kind, &content, self.max_location_levels).map_err(|e| {
            CoreError::CacheFetchError {
                locator: locator.to_string(),
                reason: e.to_string(),
            }
        })?;

        self.store(locator, kind, value)
    }

    fn lookup(&self, locator: &str, kind: AssetKind) -> Result<Option<AssetValue>, CoreError> {
        let mut entries = self.entries();
        match entries.get_mut(locator) {
            Some(entry) => {
                let value = entry.checked_value(locator, kind)?;
                entry.info.accessed_on = Utc::now();
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn store(
        &self,
        locator: &str,
        kind: AssetKind,
        value: AssetValue,
    ) -> Result<AssetValue, CoreError> {
        let mut entries = self.entries();
        let entry = entries
            .entry(locator.to_string())
            .or_insert_with(|| CacheEntry::new(value, Utc::now()));
        entry.checked_value(locator, kind)
    }

    /// Bulk load a JSON array of asset envelopes
    ///
    /// Every envelope is validated and decoded before anything is stored, so a
    /// failure leaves the cache as it was. Entries from earlier loads are kept.
    pub fn include(&self, raw: &str) -> Result<(), CoreError> {
        let envelopes: Vec<AssetEnvelope> = serde_json::from_str(raw)
            .map_err(|e| CoreError::ParseError(format!("invalid asset payload: {}", e)))?;

        let staged = envelopes
            .into_iter()
            .enumerate()
            .map(|(i, envelope)| self.stage(i, envelope))
            .collect::<Result<Vec<_>, _>>()?;

        let count = staged.len();
        let now = Utc::now();
        let mut entries = self.entries();
        for (locator, value) in staged {
            entries.insert(locator, CacheEntry::new(value, now));
        }
        drop(entries);

        info!(count, "Included assets");
        Ok(())
    }

    fn stage(
        &self,
        index: usize,
        envelope: AssetEnvelope,
    ) -> Result<(String, AssetValue), CoreError> {
        let invalid = |reason: String| {
            CoreError::ValidationError(format!("asset envelope {}: {}", index, reason))
        };

        let locator = envelope
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| invalid("missing url".to_string()))?;
        url::Url::parse(&locator).map_err(|e| invalid(format!("invalid url {}: {}", locator, e)))?;

        let item_type: ItemType = envelope
            .item_type
            .ok_or_else(|| invalid("missing type".to_string()))?
            .parse()
            .map_err(|e: CoreError| invalid(e.to_string()))?;

        let content = envelope
            .content
            .ok_or_else(|| invalid("missing content".to_string()))?;

        let kind = AssetKind {
            item_type,
            is_set: envelope.is_set,
        };
        let value = AssetValue::decode(kind, &content, self.max_location_levels)
            .map_err(|e| invalid(e.to_string()))?;

        Ok((locator, value))
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Whether an entry exists for `locator`
    pub fn contains(&self, locator: &str) -> bool {
        self.entries().contains_key(locator)
    }

    /// Timestamps of the entry for `locator`
    pub fn entry_info(&self, locator: &str) -> Option<CacheEntryInfo> {
        self.entries().get(locator).map(|e| e.info)
    }
}

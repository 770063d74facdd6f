/// The locator-keyed asset cache
pub mod cache;

/// Fetching of assets on cache misses
pub mod fetcher;

/// Typed per-session view of the cache
pub mod session_assets;

pub use cache::{Asset, AssetCache, AssetKind, AssetSet, AssetValue, CacheEntryInfo, ItemType};
pub use fetcher::{AssetFetcher, HttpAssetFetcher};
pub use session_assets::SessionAssets;

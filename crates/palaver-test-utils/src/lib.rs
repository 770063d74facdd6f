//! Testing utilities for the Palaver engine.
//!
//! Deterministic stand-ins for the external services, an engine wired to
//! them, and builders for the asset payloads sessions read from.

pub mod assets;
pub mod engine;
pub mod services;

pub use assets::{AssetsBuilder, StaticAssetFetcher, TEST_ASSETS_URL};
pub use engine::{init_test_tracing, test_engine, test_engine_builder};
pub use services::{
    mock_trace, RecordingWebhookService, TestAirtimeService, TestClassificationService,
};

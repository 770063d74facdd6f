//! Engines wired to the deterministic test services.

use palaver_core::domain::asset_types::Classifier;
use palaver_core::services::{AirtimeService, ClassificationService};
use palaver_core::{Engine, EngineBuilder};
use std::sync::Arc;

use crate::services::{RecordingWebhookService, TestAirtimeService, TestClassificationService};

/// Builder preloaded with test services
///
/// Webhooks answer 200 with `{}`, classifiers return their own intents and
/// airtime is sent in RWF. Any of these can be replaced before building.
pub fn test_engine_builder() -> EngineBuilder {
    Engine::builder()
        .with_webhook_service(Arc::new(RecordingWebhookService::new()))
        .with_classification_service_factory(Arc::new(|classifier: &Classifier| {
            let service: Arc<dyn ClassificationService> =
                Arc::new(TestClassificationService::new(classifier));
            Ok(service)
        }))
        .with_airtime_service_factory(Arc::new(|| {
            Ok(Arc::new(TestAirtimeService::new("RWF")) as Arc<dyn AirtimeService>)
        }))
}

/// An engine using the test services and default configuration
pub fn test_engine() -> Arc<Engine> {
    match test_engine_builder().build() {
        Ok(engine) => Arc::new(engine),
        Err(e) => panic!("default test engine failed to build: {}", e),
    }
}

/// Route tracing output to the test harness
pub fn init_test_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_target(false)
        .with_test_writer()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

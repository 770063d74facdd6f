use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::session::Session;
use crate::assets::SessionAssets;
use crate::config::EngineConfig;
use crate::domain::flow::{CategoryRouter, ExitRouter};
use crate::services::{AirtimeServiceFactory, ClassificationServiceFactory, WebhookService};
use crate::types::{LiteralEvaluator, TemplateEvaluator};
use crate::CoreError;

/// Shared runtime for sessions: configuration, external services and the
/// pluggable template evaluator and exit router
pub struct Engine {
    config: EngineConfig,
    webhook_service: Option<Arc<dyn WebhookService>>,
    classification_factory: Option<ClassificationServiceFactory>,
    airtime_factory: Option<AirtimeServiceFactory>,
    evaluator: Arc<dyn TemplateEvaluator>,
    router: Arc<dyn ExitRouter>,
}

impl Engine {
    /// Start building an engine
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Service used for webhook and resthook calls, if configured
    pub fn webhook_service(&self) -> Option<&Arc<dyn WebhookService>> {
        self.webhook_service.as_ref()
    }

    /// Factory for classifier services, if configured
    pub fn classification_factory(&self) -> Option<&ClassificationServiceFactory> {
        self.classification_factory.as_ref()
    }

    /// Factory for the airtime service, if configured
    pub fn airtime_factory(&self) -> Option<&AirtimeServiceFactory> {
        self.airtime_factory.as_ref()
    }

    /// Template evaluator
    pub fn evaluator(&self) -> &dyn TemplateEvaluator {
        self.evaluator.as_ref()
    }

    /// Exit router
    pub fn router(&self) -> &dyn ExitRouter {
        self.router.as_ref()
    }

    /// Create an empty session that reads assets through `assets`
    pub fn new_session(self: &Arc<Self>, assets: Arc<SessionAssets>) -> Session {
        Session::new(Arc::clone(self), assets)
    }

    /// Restore a session serialized with [`Session::to_json`]
    pub fn read_session(
        self: &Arc<Self>,
        assets: Arc<SessionAssets>,
        data: &serde_json::Value,
    ) -> Result<Session, CoreError> {
        Session::read(Arc::clone(self), assets, data)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("webhook_service", &self.webhook_service.is_some())
            .field("classification_factory", &self.classification_factory.is_some())
            .field("airtime_factory", &self.airtime_factory.is_some())
            .field("evaluator", &self.evaluator)
            .field("router", &self.router)
            .finish()
    }
}

/// Builder for [`Engine`]
#[derive(Default)]
pub struct EngineBuilder {
    config: Option<EngineConfig>,
    webhook_service: Option<Arc<dyn WebhookService>>,
    classification_factory: Option<ClassificationServiceFactory>,
    airtime_factory: Option<AirtimeServiceFactory>,
    evaluator: Option<Arc<dyn TemplateEvaluator>>,
    router: Option<Arc<dyn ExitRouter>>,
}

impl EngineBuilder {
    /// Use the given configuration instead of the defaults
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Service for webhook and resthook calls
    pub fn with_webhook_service(mut self, service: Arc<dyn WebhookService>) -> Self {
        self.webhook_service = Some(service);
        self
    }

    /// Factory creating a classification service per classifier
    pub fn with_classification_service_factory(
        mut self,
        factory: ClassificationServiceFactory,
    ) -> Self {
        self.classification_factory = Some(factory);
        self
    }

    /// Factory creating the airtime service
    pub fn with_airtime_service_factory(mut self, factory: AirtimeServiceFactory) -> Self {
        self.airtime_factory = Some(factory);
        self
    }

    /// Evaluator for templates in action fields
    pub fn with_template_evaluator(mut self, evaluator: Arc<dyn TemplateEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Router picking exits out of nodes
    pub fn with_exit_router(mut self, router: Arc<dyn ExitRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// Validate the configuration and build the engine
    pub fn build(self) -> Result<Engine, CoreError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        info!(
            webhooks = self.webhook_service.is_some(),
            classification = self.classification_factory.is_some(),
            airtime = self.airtime_factory.is_some(),
            max_steps = config.max_steps_per_session,
            "Engine built"
        );

        Ok(Engine {
            config,
            webhook_service: self.webhook_service,
            classification_factory: self.classification_factory,
            airtime_factory: self.airtime_factory,
            evaluator: self.evaluator.unwrap_or_else(|| Arc::new(LiteralEvaluator)),
            router: self.router.unwrap_or_else(|| Arc::new(CategoryRouter)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let engine = Engine::builder().build().unwrap();

        assert_eq!(engine.config(), &EngineConfig::default());
        assert!(engine.webhook_service().is_none());
        assert!(engine.classification_factory().is_none());
        assert!(engine.airtime_factory().is_none());
        assert_eq!(
            engine
                .evaluator()
                .render("@contact.name", &serde_json::json!({}))
                .unwrap(),
            "@contact.name"
        );
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = EngineConfig {
            max_steps_per_session: 0,
            ..Default::default()
        };

        assert!(matches!(
            Engine::builder().with_config(config).build(),
            Err(CoreError::ConfigurationError(_))
        ));
    }
}

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::ServiceOutcome;
use crate::domain::asset_types::Classifier;
use crate::CoreError;

/// An intent extracted from input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedIntent {
    /// Intent name
    pub name: String,
    /// Confidence between 0 and 1
    pub confidence: Decimal,
}

/// An entity extracted from input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    /// Entity value
    pub value: String,
    /// Confidence between 0 and 1
    pub confidence: Decimal,
}

/// Ranked intents and named entities extracted from input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Intents, most likely first
    #[serde(default)]
    pub intents: Vec<ExtractedIntent>,
    /// Entities keyed by entity name, most likely first
    #[serde(default)]
    pub entities: BTreeMap<String, Vec<ExtractedEntity>>,
}

impl Classification {
    /// The intent with the highest confidence, the earliest on ties
    pub fn top_intent(&self) -> Option<&ExtractedIntent> {
        self.intents.iter().fold(None, |best, intent| match best {
            Some(b) if b.confidence >= intent.confidence => Some(b),
            _ => Some(intent),
        })
    }
}

/// Classifies free text into intents and entities
#[async_trait]
pub trait ClassificationService: Send + Sync {
    /// Classify `input`
    async fn classify(&self, input: &str) -> ServiceOutcome<Classification>;
}

/// Creates the service for a classifier asset
pub type ClassificationServiceFactory =
    Arc<dyn Fn(&Classifier) -> Result<Arc<dyn ClassificationService>, CoreError> + Send + Sync>;

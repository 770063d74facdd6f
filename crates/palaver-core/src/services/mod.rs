//! Contracts for the external services actions call through
//!
//! Implementations live outside this crate. The engine only shapes their
//! results into events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Webhook dispatch
pub mod webhooks;

/// NLU classification
pub mod classification;

/// Airtime transfer
pub mod airtime;

pub use airtime::{
    select_product, AirtimeError, AirtimeProduct, AirtimeService, AirtimeServiceFactory,
    AirtimeTransfer,
};
pub use classification::{
    Classification, ClassificationService, ClassificationServiceFactory, ExtractedEntity,
    ExtractedIntent,
};
pub use webhooks::{pick_result_call, CallStatus, WebhookCall, WebhookRequest, WebhookService};

/// A trace of one HTTP exchange made by a service, kept for observability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTrace {
    /// Requested URL
    pub url: String,
    /// HTTP method
    pub method: String,
    /// Response status code, none if no response was received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Raw request
    pub request: String,
    /// Raw response
    #[serde(default)]
    pub response: String,
    /// Time taken
    pub elapsed_ms: u64,
    /// When the request was made
    pub created_on: DateTime<Utc>,
}

/// The result of a service call along with the HTTP traces it produced
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceOutcome<T, E = CoreError> {
    /// What the service returned
    pub result: Result<T, E>,
    /// HTTP exchanges made while producing the result
    pub traces: Vec<HttpTrace>,
}

impl<T, E> ServiceOutcome<T, E> {
    /// A successful outcome
    pub fn success(value: T, traces: Vec<HttpTrace>) -> Self {
        Self {
            result: Ok(value),
            traces,
        }
    }

    /// A failed outcome
    pub fn failure(error: E, traces: Vec<HttpTrace>) -> Self {
        Self {
            result: Err(error),
            traces,
        }
    }
}

//! Deterministic service implementations for tests.

use async_trait::async_trait;
use chrono::Utc;
use palaver_core::domain::asset_types::Classifier;
use palaver_core::services::{
    AirtimeError, AirtimeService, AirtimeTransfer, CallStatus, Classification,
    ClassificationService, ExtractedEntity, ExtractedIntent, HttpTrace, ServiceOutcome,
    WebhookCall, WebhookRequest, WebhookService,
};
use palaver_core::{CoreError, Urn};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// A trace of an exchange that never happened
pub fn mock_trace(method: &str, url: &str, status_code: u16, response: &str) -> HttpTrace {
    HttpTrace {
        url: url.to_string(),
        method: method.to_string(),
        status_code: Some(status_code),
        request: format!("{} {} HTTP/1.1\r\n\r\n", method, url),
        response: response.to_string(),
        elapsed_ms: 0,
        created_on: Utc::now(),
    }
}

/// Classification service returning every intent of its classifier
///
/// The first intent gets a confidence of 0.5 and each following one half of
/// the previous. A single `location` entity of "Quito" is always extracted.
#[derive(Debug, Clone)]
pub struct TestClassificationService {
    classifier: Classifier,
}

impl TestClassificationService {
    /// Create a service for `classifier`
    pub fn new(classifier: &Classifier) -> Self {
        Self {
            classifier: classifier.clone(),
        }
    }
}

#[async_trait]
impl ClassificationService for TestClassificationService {
    async fn classify(&self, _input: &str) -> ServiceOutcome<Classification> {
        let mut confidence = Decimal::new(5, 1);
        let intents = self
            .classifier
            .intents
            .iter()
            .map(|name| {
                let intent = ExtractedIntent {
                    name: name.clone(),
                    confidence,
                };
                confidence /= Decimal::from(2);
                intent
            })
            .collect();

        let mut entities = BTreeMap::new();
        entities.insert(
            "location".to_string(),
            vec![ExtractedEntity {
                value: "Quito".to_string(),
                confidence: Decimal::from(1),
            }],
        );

        ServiceOutcome::success(
            Classification { intents, entities },
            vec![mock_trace("GET", "http://test.acme.ai?classify", 200, r#"{"intents":[]}"#)],
        )
    }
}

/// Airtime service that sends the full amount in one fixed currency
#[derive(Debug, Clone)]
pub struct TestAirtimeService {
    currency: String,
}

impl TestAirtimeService {
    /// Create a service that only transfers in `currency`
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
        }
    }
}

#[async_trait]
impl AirtimeService for TestAirtimeService {
    async fn transfer(
        &self,
        sender: Option<&Urn>,
        recipient: &Urn,
        amounts: &BTreeMap<String, Decimal>,
    ) -> ServiceOutcome<AirtimeTransfer, AirtimeError> {
        let traces = vec![mock_trace("GET", "http://send.airtime.com", 200, r#"{"status":"ok"}"#)];

        let Some(amount) = amounts.get(&self.currency).copied() else {
            return ServiceOutcome::failure(
                AirtimeError::NoAmountForCurrency(self.currency.clone()),
                traces,
            );
        };

        ServiceOutcome::success(
            AirtimeTransfer {
                sender: sender.cloned(),
                recipient: recipient.clone(),
                currency: self.currency.clone(),
                desired_amount: amount,
                actual_amount: amount,
            },
            traces,
        )
    }
}

#[derive(Debug, Clone)]
struct ScriptedResponse {
    url_prefix: String,
    status_code: Option<u16>,
    body: String,
}

/// Webhook service answering from a script and recording every request
///
/// Requests matching no scripted prefix get a 200 with an empty JSON object.
/// A scripted status of `None` simulates a connection error.
#[derive(Debug, Default)]
pub struct RecordingWebhookService {
    script: Mutex<Vec<ScriptedResponse>>,
    requests: Mutex<Vec<WebhookRequest>>,
}

impl RecordingWebhookService {
    /// Create a service with no scripted responses
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests to URLs starting with `url_prefix`
    pub fn respond(self, url_prefix: &str, status_code: Option<u16>, body: &str) -> Self {
        self.script.lock().push(ScriptedResponse {
            url_prefix: url_prefix.to_string(),
            status_code,
            body: body.to_string(),
        });
        self
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<WebhookRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl WebhookService for RecordingWebhookService {
    async fn call(&self, request: WebhookRequest) -> Result<WebhookCall, CoreError> {
        let url = request.url.to_string();
        let scripted = self
            .script
            .lock()
            .iter()
            .find(|s| url.starts_with(&s.url_prefix))
            .cloned();
        let (status_code, body) = match scripted {
            Some(s) => (s.status_code, s.body),
            None => (Some(200), "{}".to_string()),
        };

        let status = match status_code {
            Some(code) if (200..300).contains(&code) => CallStatus::Success,
            Some(_) => CallStatus::ResponseError,
            None => CallStatus::ConnectionError,
        };
        let raw_request = format!(
            "{} {} HTTP/1.1\r\n\r\n{}",
            request.method,
            url,
            request.body.as_deref().unwrap_or_default()
        );

        let call = WebhookCall {
            url,
            method: request.method.clone(),
            status,
            status_code,
            request: raw_request,
            response: if status_code.is_some() { body } else { String::new() },
            elapsed_ms: 1,
        };
        self.requests.lock().push(request);
        Ok(call)
    }
}

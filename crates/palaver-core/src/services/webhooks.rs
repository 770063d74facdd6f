use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::CoreError;

/// Status of a webhook call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// A 2xx response was received
    Success,
    /// A non-2xx response was received
    ResponseError,
    /// No response was received
    ConnectionError,
}

impl CallStatus {
    /// Whether the call succeeded
    pub fn is_success(self) -> bool {
        self == CallStatus::Success
    }

    /// Result category for a call with this status
    pub fn category(self) -> &'static str {
        if self.is_success() {
            "Success"
        } else {
            "Failure"
        }
    }
}

/// A fully rendered outgoing webhook request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    /// HTTP method, uppercase
    pub method: String,
    /// Destination
    pub url: url::Url,
    /// Extra headers
    pub headers: BTreeMap<String, String>,
    /// Body, sent as JSON unless `headers` set a content type
    pub body: Option<String>,
}

/// The result of one webhook call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookCall {
    /// Requested URL
    pub url: String,
    /// HTTP method
    pub method: String,
    /// Outcome
    pub status: CallStatus,
    /// Response status code, none on connection errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Raw request
    pub request: String,
    /// Response body
    #[serde(default)]
    pub response: String,
    /// Time taken
    pub elapsed_ms: u64,
}

/// Performs webhook calls
///
/// A request with a body and no `Content-Type` header of its own is sent with
/// `Content-Type: application/json`. Resthook payloads rely on this.
///
/// Connection and response failures are reported through the returned
/// [`WebhookCall`]'s status. An `Err` means the call couldn't be attempted,
/// e.g. a header that can't be sent, and fails the run.
#[async_trait]
pub trait WebhookService: Send + Sync {
    /// Make the call
    async fn call(&self, request: WebhookRequest) -> Result<WebhookCall, CoreError>;
}

/// The call whose response becomes the saved result of a set of calls
///
/// The last successful call if any succeeded, otherwise the last failed call,
/// otherwise none.
pub fn pick_result_call(calls: &[WebhookCall]) -> Option<&WebhookCall> {
    calls
        .iter()
        .rev()
        .find(|c| c.status.is_success())
        .or_else(|| calls.last())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(url: &str, status: CallStatus, status_code: Option<u16>) -> WebhookCall {
        WebhookCall {
            url: url.to_string(),
            method: "POST".to_string(),
            status,
            status_code,
            request: String::new(),
            response: String::new(),
            elapsed_ms: 1,
        }
    }

    #[test]
    fn test_pick_result_call_prefers_success() {
        let calls = vec![
            call("http://a", CallStatus::ResponseError, Some(500)),
            call("http://b", CallStatus::Success, Some(200)),
            call("http://c", CallStatus::ConnectionError, None),
        ];
        assert_eq!(pick_result_call(&calls).unwrap().url, "http://b");

        let calls = vec![
            call("http://a", CallStatus::Success, Some(200)),
            call("http://b", CallStatus::Success, Some(201)),
        ];
        assert_eq!(pick_result_call(&calls).unwrap().url, "http://b");
    }

    #[test]
    fn test_pick_result_call_falls_back_to_last_failure() {
        let calls = vec![
            call("http://a", CallStatus::ResponseError, Some(500)),
            call("http://b", CallStatus::ConnectionError, None),
            call("http://c", CallStatus::ResponseError, Some(410)),
        ];
        assert_eq!(pick_result_call(&calls).unwrap().url, "http://c");

        assert!(pick_result_call(&[]).is_none());
    }

    #[test]
    fn test_call_status_category() {
        assert_eq!(CallStatus::Success.category(), "Success");
        assert_eq!(CallStatus::ResponseError.category(), "Failure");
        assert_eq!(CallStatus::ConnectionError.category(), "Failure");
    }
}

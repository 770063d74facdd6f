use async_trait::async_trait;
use palaver_core::services::{CallStatus, WebhookCall, WebhookRequest, WebhookService};
use palaver_core::{CoreError, EngineConfig};
use reqwest::{Client, Method};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::http::{build_client, send};
use crate::ServiceError;

/// Webhook service that makes real HTTP calls
///
/// Bodies are sent as JSON unless the request sets its own `Content-Type`.
/// Response bodies are cut at the configured size.
#[derive(Debug, Clone)]
pub struct HttpWebhookService {
    client: Client,
    user_agent: String,
    max_body_bytes: usize,
}

impl HttpWebhookService {
    /// Create a service using the engine's timeout, user agent and body cap
    pub fn new(config: &EngineConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(config.http_timeout(), &config.webhook_user_agent)?,
            user_agent: config.webhook_user_agent.clone(),
            max_body_bytes: config.webhook_max_body_bytes,
        })
    }
}

#[async_trait]
impl WebhookService for HttpWebhookService {
    async fn call(&self, request: WebhookRequest) -> Result<WebhookCall, CoreError> {
        let method = Method::from_str(&request.method).map_err(|_| {
            ServiceError::InvalidRequest(format!("Invalid HTTP method: {}", request.method))
        })?;

        let exchange = send(
            &self.client,
            method,
            &request.url,
            &request.headers,
            request.body.as_deref(),
            self.max_body_bytes,
            &self.user_agent,
        )
        .await?;

        let status = match (&exchange.connection_error, exchange.status_code) {
            (None, Some(_)) if exchange.is_success() => CallStatus::Success,
            (None, Some(_)) => CallStatus::ResponseError,
            (Some(reason), _) => {
                warn!(url = %exchange.url, error = %reason, "Webhook call got no response");
                CallStatus::ConnectionError
            }
            (None, None) => CallStatus::ConnectionError,
        };

        debug!(
            url = %exchange.url,
            status_code = ?exchange.status_code,
            elapsed_ms = exchange.elapsed_ms,
            "Webhook called"
        );

        Ok(WebhookCall {
            url: exchange.url,
            method: exchange.method,
            status,
            status_code: exchange.status_code,
            request: exchange.request,
            response: exchange.response,
            elapsed_ms: exchange.elapsed_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(max_body_bytes: usize) -> HttpWebhookService {
        let config = EngineConfig {
            webhook_user_agent: "palaver-test".to_string(),
            webhook_max_body_bytes: max_body_bytes,
            ..Default::default()
        };
        HttpWebhookService::new(&config).unwrap()
    }

    fn request(method: &str, url: &str, body: Option<&str>) -> WebhookRequest {
        WebhookRequest {
            method: method.to_string(),
            url: url::Url::parse(url).unwrap(),
            headers: BTreeMap::new(),
            body: body.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .and(header("user-agent", "palaver-test"))
            .and(body_string(r#"{"name":"Ben"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let call = service(10_000)
            .call(request(
                "POST",
                &format!("{}/hook", server.uri()),
                Some(r#"{"name":"Ben"}"#),
            ))
            .await
            .unwrap();

        assert_eq!(call.status, CallStatus::Success);
        assert_eq!(call.status_code, Some(200));
        assert_eq!(call.method, "POST");
        assert_eq!(call.response, r#"{"ok":true}"#);
        assert!(call.request.starts_with("POST /hook HTTP/1.1\r\n"));
        assert!(call.request.ends_with(r#"{"name":"Ben"}"#));
    }

    #[tokio::test]
    async fn test_error_status_is_response_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let call = service(10_000)
            .call(request("GET", &format!("{}/down", server.uri()), None))
            .await
            .unwrap();

        assert_eq!(call.status, CallStatus::ResponseError);
        assert_eq!(call.status_code, Some(503));
        assert_eq!(call.response, "unavailable");
    }

    #[tokio::test]
    async fn test_response_body_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(100)))
            .mount(&server)
            .await;

        let call = service(10)
            .call(request("GET", &server.uri(), None))
            .await
            .unwrap();

        assert_eq!(call.response, "x".repeat(10));
    }

    #[tokio::test]
    async fn test_refused_connection() {
        // nothing listens on a port just released
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/gone", listener.local_addr().unwrap());
        drop(listener);

        let call = service(10_000).call(request("GET", &url, None)).await.unwrap();

        assert_eq!(call.status, CallStatus::ConnectionError);
        assert_eq!(call.status_code, None);
        assert_eq!(call.response, "");
    }

    #[tokio::test]
    async fn test_invalid_method_is_hard_error() {
        let result = service(10_000)
            .call(request("GE T", "http://example.com", None))
            .await;

        assert!(matches!(result, Err(CoreError::ExecutionError(_))));
    }

    #[tokio::test]
    async fn test_invalid_header_is_hard_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut request = request("GET", &server.uri(), None);
        request
            .headers
            .insert("Authorization".to_string(), "Token abc\r\n".to_string());

        match service(10_000).call(request).await {
            Err(CoreError::ExecutionError(msg)) => assert!(msg.contains("Authorization")),
            other => panic!("Expected ExecutionError, got {:?}", other),
        }
    }
}

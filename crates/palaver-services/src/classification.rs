use async_trait::async_trait;
use palaver_core::services::{
    Classification, ClassificationService, ExtractedEntity, ExtractedIntent, ServiceOutcome,
};
use palaver_core::EngineConfig;
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

use crate::http::{build_client, send};
use crate::ServiceError;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Deserialize)]
struct IntentMatch {
    name: String,
    confidence: Decimal,
}

#[derive(Debug, Deserialize)]
struct EntityMatch {
    value: String,
    confidence: Decimal,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    intent_ranking: Vec<IntentMatch>,
    #[serde(default)]
    entities: BTreeMap<String, Vec<EntityMatch>>,
}

impl From<ParseResponse> for Classification {
    fn from(response: ParseResponse) -> Self {
        let intents = response
            .intent_ranking
            .into_iter()
            .map(|i| ExtractedIntent {
                name: i.name,
                confidence: i.confidence,
            })
            .collect();
        let entities = response
            .entities
            .into_iter()
            .map(|(label, matches)| {
                let matches = matches
                    .into_iter()
                    .map(|m| ExtractedEntity {
                        value: m.value,
                        confidence: m.confidence,
                    })
                    .collect();
                (label, matches)
            })
            .collect();

        Classification { intents, entities }
    }
}

/// Classifier backed by an NLU server's parse endpoint
///
/// Input is posted as a form to `{base}/parse` with the repository's access
/// token. The response must carry an `intent_ranking`; `entities` are grouped
/// by label.
#[derive(Debug, Clone)]
pub struct HttpClassificationService {
    client: Client,
    endpoint: Url,
    access_token: String,
    user_agent: String,
    max_body_bytes: usize,
}

impl HttpClassificationService {
    /// Create a service for the NLU server at `base_url`
    pub fn new(
        config: &EngineConfig,
        base_url: &str,
        access_token: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let endpoint = Url::parse(&format!("{}/parse", base_url.trim_end_matches('/')))
            .map_err(|e| {
                ServiceError::InvalidRequest(format!("Invalid NLU server URL: {}", e))
            })?;

        Ok(Self {
            client: build_client(config.http_timeout(), &config.webhook_user_agent)?,
            endpoint,
            access_token: access_token.into(),
            user_agent: config.webhook_user_agent.clone(),
            max_body_bytes: config.webhook_max_body_bytes,
        })
    }
}

#[async_trait]
impl ClassificationService for HttpClassificationService {
    async fn classify(&self, input: &str) -> ServiceOutcome<Classification> {
        let mut headers = BTreeMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.access_token),
        );
        headers.insert("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string());
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("text", input)
            .finish();

        let exchange = match send(
            &self.client,
            Method::POST,
            &self.endpoint,
            &headers,
            Some(&body),
            self.max_body_bytes,
            &self.user_agent,
        )
        .await
        {
            Ok(exchange) => exchange,
            Err(e) => return ServiceOutcome::failure(e.into(), vec![]),
        };
        let traces = vec![exchange.trace()];

        let parsed = exchange.check().and_then(|_| {
            serde_json::from_str::<ParseResponse>(&exchange.response)
                .map_err(|e| ServiceError::Decode(e.to_string()))
        });

        match parsed {
            Ok(response) => {
                let classification = Classification::from(response);
                debug!(
                    intents = classification.intents.len(),
                    top_intent = ?classification.top_intent().map(|i| &i.name),
                    "Input classified"
                );
                ServiceOutcome::success(classification, traces)
            }
            Err(e) => ServiceOutcome::failure(e.into(), traces),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::CoreError;
    use serde_json::json;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "123e4567-e89b-12d3-a456-426655440000";

    fn service(server: &MockServer) -> HttpClassificationService {
        HttpClassificationService::new(&EngineConfig::default(), &server.uri(), TOKEN).unwrap()
    }

    #[tokio::test]
    async fn test_classify_ranks_intents_and_groups_entities() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/parse"))
            .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
            .and(header("content-type", FORM_CONTENT_TYPE))
            .and(body_string("text=book+a+flight+to+Quito"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "intent": {"name": "book_flight", "confidence": 0.83},
                "intent_ranking": [
                    {"name": "book_flight", "confidence": 0.83},
                    {"name": "book_hotel", "confidence": 0.17}
                ],
                "entities": {
                    "destination": [{"value": "quito", "entity": "quito", "confidence": 0.8}]
                },
                "text": "book a flight to Quito",
                "language": "pt_br"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = service(&server).classify("book a flight to Quito").await;

        let classification = outcome.result.unwrap();
        assert_eq!(classification.intents.len(), 2);
        assert_eq!(classification.top_intent().unwrap().name, "book_flight");
        assert_eq!(classification.intents[1].confidence, Decimal::new(17, 2));
        assert_eq!(
            classification.entities["destination"],
            vec![ExtractedEntity {
                value: "quito".to_string(),
                confidence: Decimal::new(8, 1),
            }]
        );
        assert_eq!(outcome.traces.len(), 1);
        assert!(outcome.traces[0]
            .request
            .starts_with("POST /parse HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn test_classify_rejects_responses_without_ranking() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("xx"))
            .mount(&server)
            .await;

        let service = service(&server);
        for _ in 0..2 {
            let outcome = service.classify("Hello").await;
            match outcome.result {
                Err(CoreError::ServiceError(msg)) => {
                    assert!(msg.contains("Invalid response"), "{}", msg)
                }
                other => panic!("Expected ServiceError, got {:?}", other),
            }
            assert_eq!(outcome.traces.len(), 1);
            assert_eq!(outcome.traces[0].status_code, Some(200));
        }
    }

    #[tokio::test]
    async fn test_classify_error_status_keeps_trace() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let outcome = service(&server).classify("Hello").await;

        assert!(matches!(outcome.result, Err(CoreError::ServiceError(_))));
        assert_eq!(outcome.traces[0].status_code, Some(401));
        assert_eq!(outcome.traces[0].response, "bad token");
    }
}

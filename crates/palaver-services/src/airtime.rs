use async_trait::async_trait;
use palaver_core::Urn;
use palaver_core::services::{
    select_product, AirtimeError, AirtimeProduct, AirtimeService, AirtimeTransfer, HttpTrace,
    ServiceOutcome,
};
use palaver_core::EngineConfig;
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};
use url::Url;

use crate::http::{build_client, send, Exchange};
use crate::ServiceError;

/// Products a provider can send to a recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCatalog {
    /// Currency the recipient's network is priced in
    pub currency: String,
    /// Available products
    pub products: Vec<AirtimeProduct>,
}

/// A top-up provider: lists products for a number and buys one
#[async_trait]
pub trait AirtimeProvider: Send + Sync {
    /// Products available to `recipient`
    async fn catalog(&self, recipient: &Urn) -> ServiceOutcome<ProductCatalog, ServiceError>;

    /// Buy `product` for `recipient`, returning the value actually sent
    async fn purchase(
        &self,
        sender: Option<&Urn>,
        recipient: &Urn,
        product: &AirtimeProduct,
    ) -> ServiceOutcome<Decimal, ServiceError>;
}

/// Airtime service that sends the most valuable product not exceeding the
/// amount configured for the recipient's currency
#[derive(Debug, Clone)]
pub struct CatalogAirtimeService<P> {
    provider: P,
}

impl<P: AirtimeProvider> CatalogAirtimeService<P> {
    /// Create a service buying from `provider`
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: AirtimeProvider> AirtimeService for CatalogAirtimeService<P> {
    async fn transfer(
        &self,
        sender: Option<&Urn>,
        recipient: &Urn,
        amounts: &BTreeMap<String, Decimal>,
    ) -> ServiceOutcome<AirtimeTransfer, AirtimeError> {
        let catalog = self.provider.catalog(recipient).await;
        let mut traces = catalog.traces;
        let catalog = match catalog.result {
            Ok(catalog) => catalog,
            Err(e) => return ServiceOutcome::failure(AirtimeError::Provider(e.to_string()), traces),
        };

        let Some(amount) = amounts.get(&catalog.currency).copied() else {
            return ServiceOutcome::failure(
                AirtimeError::NoAmountForCurrency(catalog.currency),
                traces,
            );
        };

        let Some(product) = select_product(&catalog.products, amount) else {
            let minimum = catalog
                .products
                .iter()
                .map(|p| p.value)
                .filter(|v| *v > Decimal::ZERO)
                .min()
                .unwrap_or_default();
            return ServiceOutcome::failure(
                AirtimeError::BelowMinimum {
                    currency: catalog.currency,
                    amount,
                    minimum,
                },
                traces,
            );
        };

        debug!(
            recipient = recipient.as_str(),
            product = %product.code,
            value = %product.value,
            "Selected airtime product"
        );

        let purchase = self.provider.purchase(sender, recipient, product).await;
        traces.extend(purchase.traces);
        match purchase.result {
            Ok(actual_amount) => {
                info!(
                    recipient = recipient.as_str(),
                    currency = %catalog.currency,
                    amount = %actual_amount,
                    "Airtime transferred"
                );
                ServiceOutcome::success(
                    AirtimeTransfer {
                        sender: sender.cloned(),
                        recipient: recipient.clone(),
                        currency: catalog.currency,
                        desired_amount: amount,
                        actual_amount,
                    },
                    traces,
                )
            }
            Err(e) => ServiceOutcome::failure(AirtimeError::Provider(e.to_string()), traces),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PurchaseResponse {
    sent: Decimal,
}

/// Provider speaking a small JSON API
///
/// `GET {base}/catalog/{number}` lists products. `POST {base}/topups` buys
/// one and answers with the value sent.
#[derive(Debug, Clone)]
pub struct HttpAirtimeProvider {
    client: Client,
    base_url: Url,
    api_token: String,
    user_agent: String,
    max_body_bytes: usize,
}

impl HttpAirtimeProvider {
    /// Create a provider at `base_url` authenticating with `api_token`
    pub fn new(
        config: &EngineConfig,
        base_url: &str,
        api_token: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ServiceError::InvalidRequest(format!("Invalid provider URL: {}", e)))?;

        Ok(Self {
            client: build_client(config.http_timeout(), &config.webhook_user_agent)?,
            base_url,
            api_token: api_token.into(),
            user_agent: config.webhook_user_agent.clone(),
            max_body_bytes: config.webhook_max_body_bytes,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        let url = format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path);
        Url::parse(&url).map_err(|e| ServiceError::InvalidRequest(e.to_string()))
    }

    async fn exchange(
        &self,
        method: Method,
        url: &Url,
        body: Option<&str>,
    ) -> Result<Exchange, ServiceError> {
        let mut headers = BTreeMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.api_token),
        );
        send(
            &self.client,
            method,
            url,
            &headers,
            body,
            self.max_body_bytes,
            &self.user_agent,
        )
        .await
    }
}

fn decode<T: for<'de> Deserialize<'de>>(exchange: &Exchange) -> Result<T, ServiceError> {
    exchange.check()?;
    serde_json::from_str(&exchange.response).map_err(|e| ServiceError::Decode(e.to_string()))
}

fn outcome<T>(
    result: Result<T, ServiceError>,
    traces: Vec<HttpTrace>,
) -> ServiceOutcome<T, ServiceError> {
    match result {
        Ok(value) => ServiceOutcome::success(value, traces),
        Err(e) => ServiceOutcome::failure(e, traces),
    }
}

#[async_trait]
impl AirtimeProvider for HttpAirtimeProvider {
    async fn catalog(&self, recipient: &Urn) -> ServiceOutcome<ProductCatalog, ServiceError> {
        let number = recipient.path().trim_start_matches('+');
        let url = match self.endpoint(&format!("catalog/{}", number)) {
            Ok(url) => url,
            Err(e) => return ServiceOutcome::failure(e, vec![]),
        };

        let exchange = match self.exchange(Method::GET, &url, None).await {
            Ok(exchange) => exchange,
            Err(e) => return ServiceOutcome::failure(e, vec![]),
        };
        outcome(decode(&exchange), vec![exchange.trace()])
    }

    async fn purchase(
        &self,
        sender: Option<&Urn>,
        recipient: &Urn,
        product: &AirtimeProduct,
    ) -> ServiceOutcome<Decimal, ServiceError> {
        let url = match self.endpoint("topups") {
            Ok(url) => url,
            Err(e) => return ServiceOutcome::failure(e, vec![]),
        };
        let body = json!({
            "sender": sender.map(|s| s.path()),
            "recipient": recipient.path(),
            "product": product.code,
        })
        .to_string();

        let exchange = match self.exchange(Method::POST, &url, Some(&body)).await {
            Ok(exchange) => exchange,
            Err(e) => return ServiceOutcome::failure(e, vec![]),
        };
        let result = decode::<PurchaseResponse>(&exchange).map(|r| r.sent);
        outcome(result, vec![exchange.trace()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn recipient() -> Urn {
        Urn::parse("tel:+250788123123").unwrap()
    }

    fn amounts(pairs: &[(&str, i64)]) -> BTreeMap<String, Decimal> {
        pairs
            .iter()
            .map(|(c, a)| (c.to_string(), Decimal::from(*a)))
            .collect()
    }

    async fn mount_catalog(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/catalog/250788123123"))
            .and(header("authorization", "Bearer sesame"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "currency": "RWF",
                "products": [
                    {"code": "p500", "value": "500"},
                    {"code": "p1000", "value": "1000"},
                    {"code": "p5000", "value": "5000"}
                ]
            })))
            .mount(server)
            .await;
    }

    fn service(server: &MockServer) -> CatalogAirtimeService<HttpAirtimeProvider> {
        let provider =
            HttpAirtimeProvider::new(&EngineConfig::default(), &server.uri(), "sesame").unwrap();
        CatalogAirtimeService::new(provider)
    }

    #[tokio::test]
    async fn test_transfer_buys_nearest_product_under_amount() {
        let server = MockServer::start().await;
        mount_catalog(&server).await;
        Mock::given(method("POST"))
            .and(path("/topups"))
            .and(body_json(json!({
                "sender": null,
                "recipient": "+250788123123",
                "product": "p1000"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sent": "1000"})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = service(&server)
            .transfer(None, &recipient(), &amounts(&[("RWF", 1500), ("USD", 2)]))
            .await;

        let transfer = outcome.result.unwrap();
        assert_eq!(transfer.currency, "RWF");
        assert_eq!(transfer.desired_amount, Decimal::from(1500));
        assert_eq!(transfer.actual_amount, Decimal::from(1000));
        assert_eq!(outcome.traces.len(), 2);
        assert_eq!(outcome.traces[0].status_code, Some(200));
    }

    #[tokio::test]
    async fn test_transfer_without_amount_for_currency() {
        let server = MockServer::start().await;
        mount_catalog(&server).await;

        let outcome = service(&server)
            .transfer(None, &recipient(), &amounts(&[("USD", 2)]))
            .await;

        assert_eq!(
            outcome.result,
            Err(AirtimeError::NoAmountForCurrency("RWF".to_string()))
        );
        assert_eq!(outcome.traces.len(), 1);
    }

    #[tokio::test]
    async fn test_transfer_below_minimum_product() {
        let server = MockServer::start().await;
        mount_catalog(&server).await;

        let outcome = service(&server)
            .transfer(None, &recipient(), &amounts(&[("RWF", 100)]))
            .await;

        assert_eq!(
            outcome.result,
            Err(AirtimeError::BelowMinimum {
                currency: "RWF".to_string(),
                amount: Decimal::from(100),
                minimum: Decimal::from(500),
            })
        );
    }

    #[tokio::test]
    async fn test_provider_error_keeps_traces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let outcome = service(&server)
            .transfer(None, &recipient(), &amounts(&[("RWF", 500)]))
            .await;

        assert!(matches!(outcome.result, Err(AirtimeError::Provider(_))));
        assert_eq!(outcome.traces.len(), 1);
        assert_eq!(outcome.traces[0].status_code, Some(401));
        assert_eq!(outcome.traces[0].response, "bad token");
    }
}

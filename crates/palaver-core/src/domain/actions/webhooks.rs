use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

use super::{action_common, log_no_contact, result_event, Action, EventLog, RunView};
use crate::assets::SessionAssets;
use crate::domain::events::{RunResultChangedEvent, WebhookCalledEvent};
use crate::domain::flow::Node;
use crate::domain::inspect::{ProducesResults, ResultInfo};
use crate::domain::ActionUuid;
use crate::services::{pick_result_call, WebhookCall, WebhookRequest};
use crate::CoreError;

const METHODS: [&str; 6] = ["GET", "POST", "PUT", "DELETE", "HEAD", "PATCH"];

fn default_method() -> String {
    "GET".to_string()
}

fn webhook_categories() -> Vec<String> {
    vec!["Success".to_string(), "Failure".to_string()]
}

fn parse_url(url: &str) -> Result<Url, CoreError> {
    Url::parse(url).map_err(|e| CoreError::ExecutionError(format!("invalid URL '{}': {}", url, e)))
}

/// The result saved for a call: its status code, categorized by status, with
/// any JSON response body as extra
fn call_result(name: &str, call: &WebhookCall) -> RunResultChangedEvent {
    let value = call.status_code.map(|c| c.to_string()).unwrap_or_default();
    let extra = serde_json::from_str::<serde_json::Value>(&call.response).ok();
    result_event(
        name,
        &value,
        call.status.category(),
        Some(format!("{} {}", call.method, call.url)),
        extra,
    )
}

/// Action: call an arbitrary URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallWebhookAction {
    /// UUID of this action
    pub uuid: ActionUuid,
    /// HTTP method
    #[serde(default = "default_method")]
    pub method: String,
    /// URL template
    pub url: String,
    /// Header templates
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Body template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Result to save the call under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_name: Option<String>,
}

impl CallWebhookAction {
    /// Type tag
    pub const TYPE: &'static str = "call_webhook";
}

impl ProducesResults for CallWebhookAction {
    fn results(&self, node: &Node, include: &mut dyn FnMut(ResultInfo)) {
        if let Some(name) = &self.result_name {
            include(ResultInfo::new(name, webhook_categories(), node.uuid()));
        }
    }
}

#[async_trait]
impl Action for CallWebhookAction {
    action_common!(Self::TYPE);

    async fn validate(&self, _assets: &SessionAssets) -> Result<(), CoreError> {
        if !METHODS.contains(&self.method.to_uppercase().as_str()) {
            return Err(CoreError::ValidationError(format!(
                "unsupported webhook method: {}",
                self.method
            )));
        }
        Ok(())
    }

    async fn execute(&self, run: &RunView<'_>, log: &mut EventLog) -> Result<(), CoreError> {
        let Some(service) = run.engine.webhook_service() else {
            log.error("no webhook service available");
            return Ok(());
        };

        let url = run.render(&self.url, log);
        let url = url.trim();
        if url.is_empty() {
            log.error("webhook URL evaluated to empty string");
            return Ok(());
        }
        let url = parse_url(url)?;

        let headers = self
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), run.render(value, log)))
            .collect();
        let body = self.body.as_ref().map(|b| run.render(b, log));

        let request = WebhookRequest {
            method: self.method.to_uppercase(),
            url,
            headers,
            body,
        };

        match service.call(request).await {
            Ok(call) => {
                if let Some(name) = &self.result_name {
                    let result = call_result(name, &call);
                    log.push(WebhookCalledEvent::new(call, None));
                    log.push(result);
                } else {
                    log.push(WebhookCalledEvent::new(call, None));
                }
            }
            Err(e) => log.error(format!("webhook call failed: {}", e)),
        }
        Ok(())
    }
}

/// Action: call every subscriber of a resthook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResthookAction {
    /// UUID of this action
    pub uuid: ActionUuid,
    /// Slug of the resthook
    pub resthook: String,
    /// Result to save the picked call under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_name: Option<String>,
}

impl CallResthookAction {
    /// Type tag
    pub const TYPE: &'static str = "call_resthook";

    fn payload(&self, run: &RunView<'_>) -> serde_json::Value {
        let context = run.context();
        json!({
            "resthook": self.resthook,
            "flow": run.run.flow(),
            "run": {
                "uuid": run.run.uuid(),
                "created_on": run.run.created_on(),
            },
            "contact": context["contact"],
            "results": context["results"],
            "input": context["input"],
        })
    }
}

impl ProducesResults for CallResthookAction {
    fn results(&self, node: &Node, include: &mut dyn FnMut(ResultInfo)) {
        if let Some(name) = &self.result_name {
            include(ResultInfo::new(name, webhook_categories(), node.uuid()));
        }
    }
}

#[async_trait]
impl Action for CallResthookAction {
    action_common!(Self::TYPE);

    async fn validate(&self, _assets: &SessionAssets) -> Result<(), CoreError> {
        if self.resthook.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "resthook slug can't be empty".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, run: &RunView<'_>, log: &mut EventLog) -> Result<(), CoreError> {
        if run.contact.is_none() {
            log_no_contact(log, Self::TYPE);
            return Ok(());
        }
        let Some(service) = run.engine.webhook_service() else {
            log.error("no webhook service available");
            return Ok(());
        };

        let subscribers = run
            .assets
            .resthook(&self.resthook)
            .await?
            .map(|r| r.subscribers)
            .unwrap_or_default();
        debug!(
            resthook = %self.resthook,
            subscribers = subscribers.len(),
            "Calling resthook subscribers"
        );

        let body = serde_json::to_string(&self.payload(run))?;

        let mut calls = Vec::with_capacity(subscribers.len());
        for subscriber in &subscribers {
            let request = WebhookRequest {
                method: "POST".to_string(),
                url: parse_url(subscriber)?,
                headers: BTreeMap::new(),
                body: Some(body.clone()),
            };

            match service.call(request).await {
                Ok(call) => {
                    log.push(WebhookCalledEvent::new(
                        call.clone(),
                        Some(self.resthook.clone()),
                    ));
                    calls.push(call);
                }
                Err(e) => log.error(format!("resthook call to {} failed: {}", subscriber, e)),
            }
        }

        if let (Some(name), Some(call)) = (&self.result_name, pick_result_call(&calls)) {
            log.push(call_result(name, call));
        }
        Ok(())
    }
}

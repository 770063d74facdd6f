use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{event_common, BaseEvent, Event, EventTarget};
use crate::domain::asset_types::ClassifierReference;
use crate::domain::contact::Urn;
use crate::services::{AirtimeTransfer, HttpTrace, WebhookCall};
use crate::CoreError;

/// Event: a webhook or resthook subscriber was called
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookCalledEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: BaseEvent,
    /// The call
    #[serde(flatten)]
    pub call: WebhookCall,
    /// Resthook the call was made for, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resthook: Option<String>,
}

impl WebhookCalledEvent {
    /// Type tag
    pub const TYPE: &'static str = "webhook_called";

    /// Create a new event
    pub fn new(call: WebhookCall, resthook: Option<String>) -> Self {
        Self {
            base: BaseEvent::new(),
            call,
            resthook,
        }
    }
}

impl Event for WebhookCalledEvent {
    event_common!(Self::TYPE);

    fn apply(&self, target: &mut EventTarget<'_>) -> Result<(), CoreError> {
        target.run.set_webhook(self.call.clone());
        Ok(())
    }
}

/// Event: an NLU or other service was called. Changes nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCalledEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: BaseEvent,
    /// Kind of service, e.g. `classifier`
    pub service: String,
    /// Classifier used, for classifier calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<ClassifierReference>,
    /// HTTP exchanges made
    #[serde(default)]
    pub http_logs: Vec<HttpTrace>,
}

impl ServiceCalledEvent {
    /// Type tag
    pub const TYPE: &'static str = "service_called";

    /// Create a new event for a classifier call
    pub fn for_classifier(classifier: ClassifierReference, http_logs: Vec<HttpTrace>) -> Self {
        Self {
            base: BaseEvent::new(),
            service: "classifier".to_string(),
            classifier: Some(classifier),
            http_logs,
        }
    }

    /// Create a new event for a failed airtime transfer
    pub fn for_airtime(http_logs: Vec<HttpTrace>) -> Self {
        Self {
            base: BaseEvent::new(),
            service: "airtime".to_string(),
            classifier: None,
            http_logs,
        }
    }
}

impl Event for ServiceCalledEvent {
    event_common!(Self::TYPE);

    fn apply(&self, _target: &mut EventTarget<'_>) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Event: airtime was transferred to the contact. Changes nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirtimeTransferredEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: BaseEvent,
    /// Sender, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Urn>,
    /// Recipient
    pub recipient: Urn,
    /// Currency of the transfer
    pub currency: String,
    /// Amount configured for that currency
    pub desired_amount: Decimal,
    /// Amount actually transferred
    pub actual_amount: Decimal,
    /// HTTP exchanges made
    #[serde(default)]
    pub http_logs: Vec<HttpTrace>,
}

impl AirtimeTransferredEvent {
    /// Type tag
    pub const TYPE: &'static str = "airtime_transferred";

    /// Create a new event
    pub fn new(transfer: AirtimeTransfer, http_logs: Vec<HttpTrace>) -> Self {
        Self {
            base: BaseEvent::new(),
            sender: transfer.sender,
            recipient: transfer.recipient,
            currency: transfer.currency,
            desired_amount: transfer.desired_amount,
            actual_amount: transfer.actual_amount,
            http_logs,
        }
    }
}

impl Event for AirtimeTransferredEvent {
    event_common!(Self::TYPE);

    fn apply(&self, _target: &mut EventTarget<'_>) -> Result<(), CoreError> {
        Ok(())
    }
}

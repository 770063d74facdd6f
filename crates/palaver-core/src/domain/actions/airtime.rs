use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use super::{action_common, log_no_contact, result_event, Action, EventLog, RunView};
use crate::assets::SessionAssets;
use crate::domain::contact::TEL_SCHEME;
use crate::domain::events::{AirtimeTransferredEvent, ServiceCalledEvent};
use crate::domain::flow::Node;
use crate::domain::inspect::{ProducesResults, ResultInfo};
use crate::domain::ActionUuid;
use crate::CoreError;

/// Action: send airtime to the contact's phone number
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferAirtimeAction {
    /// UUID of this action
    pub uuid: ActionUuid,
    /// Amount to send, keyed by currency code
    pub amounts: BTreeMap<String, Decimal>,
    /// Result to save the transferred amount under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_name: Option<String>,
}

impl TransferAirtimeAction {
    /// Type tag
    pub const TYPE: &'static str = "transfer_airtime";

    fn failed(&self, log: &mut EventLog, reason: String) {
        log.error(reason);
        if let Some(name) = &self.result_name {
            log.push(result_event(name, "0", "Failure", None, None));
        }
    }
}

impl ProducesResults for TransferAirtimeAction {
    fn results(&self, node: &Node, include: &mut dyn FnMut(ResultInfo)) {
        if let Some(name) = &self.result_name {
            include(ResultInfo::new(
                name,
                vec!["Success".to_string(), "Failure".to_string()],
                node.uuid(),
            ));
        }
    }
}

#[async_trait]
impl Action for TransferAirtimeAction {
    action_common!(Self::TYPE);

    async fn validate(&self, _assets: &SessionAssets) -> Result<(), CoreError> {
        if self.amounts.is_empty() {
            return Err(CoreError::ValidationError(
                "airtime transfer needs at least one amount".to_string(),
            ));
        }
        if let Some((currency, _)) = self.amounts.iter().find(|(_, a)| a.is_sign_negative()) {
            return Err(CoreError::ValidationError(format!(
                "airtime amount for {} can't be negative",
                currency
            )));
        }
        Ok(())
    }

    async fn execute(&self, run: &RunView<'_>, log: &mut EventLog) -> Result<(), CoreError> {
        let Some(contact) = run.contact else {
            log_no_contact(log, Self::TYPE);
            return Ok(());
        };
        let Some(recipient) = contact.preferred_urn(TEL_SCHEME) else {
            self.failed(log, "can't transfer airtime to contact without a tel URN".to_string());
            return Ok(());
        };
        let Some(factory) = run.engine.airtime_factory() else {
            self.failed(log, "no airtime service available".to_string());
            return Ok(());
        };
        let service = match factory() {
            Ok(service) => service,
            Err(e) => {
                self.failed(log, e.to_string());
                return Ok(());
            }
        };

        let sender = run.run.input().and_then(|i| i.urn.as_ref());
        let outcome = service.transfer(sender, recipient, &self.amounts).await;

        match outcome.result {
            Ok(transfer) => {
                let amount = transfer.actual_amount.to_string();
                let extra = serde_json::to_value(&transfer)?;
                log.push(AirtimeTransferredEvent::new(transfer, outcome.traces));
                if let Some(name) = &self.result_name {
                    log.push(result_event(name, &amount, "Success", None, Some(extra)));
                }
            }
            Err(e) => {
                warn!(recipient = recipient.as_str(), error = %e, "Airtime transfer failed");
                if !outcome.traces.is_empty() {
                    log.push(ServiceCalledEvent::for_airtime(outcome.traces));
                }
                self.failed(log, format!("airtime transfer failed: {}", e));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::Engine;
    use crate::domain::actions::testing::{session_assets, Fixture};
    use crate::domain::contact::{Contact, Urn};
    use crate::domain::ContactUuid;
    use crate::services::{AirtimeError, AirtimeService, AirtimeTransfer, ServiceOutcome};
    use serde_json::json;
    use std::sync::Arc;

    /// Sends the configured RWF amount rounded down to the nearest 100
    struct RwfAirtime;

    #[async_trait]
    impl AirtimeService for RwfAirtime {
        async fn transfer(
            &self,
            sender: Option<&Urn>,
            recipient: &Urn,
            amounts: &BTreeMap<String, Decimal>,
        ) -> ServiceOutcome<AirtimeTransfer, AirtimeError> {
            let Some(amount) = amounts.get("RWF") else {
                return ServiceOutcome::failure(
                    AirtimeError::NoAmountForCurrency("RWF".to_string()),
                    vec![],
                );
            };
            let hundred = Decimal::from(100);
            ServiceOutcome::success(
                AirtimeTransfer {
                    sender: sender.cloned(),
                    recipient: recipient.clone(),
                    currency: "RWF".to_string(),
                    desired_amount: *amount,
                    actual_amount: (*amount / hundred).floor() * hundred,
                },
                vec![],
            )
        }
    }

    fn fixture(contact: Contact) -> Fixture {
        let engine = Engine::builder()
            .with_airtime_service_factory(Arc::new(|| {
                Ok(Arc::new(RwfAirtime) as Arc<dyn AirtimeService>)
            }))
            .build()
            .unwrap();
        Fixture::new(engine, session_assets(json!([])), Some(contact))
    }

    fn with_phone() -> Contact {
        Contact::new(ContactUuid::from("c1"), "Ben")
            .with_urn(Urn::parse("tel:+250788123123").unwrap())
    }

    fn action(amounts: serde_json::Value) -> TransferAirtimeAction {
        serde_json::from_value(json!({
            "uuid": "a1",
            "amounts": amounts,
            "result_name": "Reward"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_transfer_saves_actual_amount() {
        let log = fixture(with_phone())
            .execute(&action(json!({"RWF": "550", "USD": "0.5"})))
            .await
            .unwrap();
        assert_eq!(
            log.event_types(),
            vec!["airtime_transferred", "run_result_changed"]
        );

        let transferred = log.events()[0].to_json().unwrap();
        assert_eq!(transferred["recipient"], "tel:+250788123123");
        assert_eq!(transferred["currency"], "RWF");

        let result = log.events()[1].to_json().unwrap();
        assert_eq!(result["value"], "500");
        assert_eq!(result["category"], "Success");
    }

    #[tokio::test]
    async fn test_transfer_without_currency_fails_softly() {
        let log = fixture(with_phone())
            .execute(&action(json!({"USD": "1"})))
            .await
            .unwrap();
        assert_eq!(log.event_types(), vec!["error", "run_result_changed"]);
        assert_eq!(log.events()[1].to_json().unwrap()["category"], "Failure");
    }

    #[tokio::test]
    async fn test_transfer_needs_tel_urn() {
        let contact = Contact::new(ContactUuid::from("c1"), "Ben")
            .with_urn(Urn::parse("twitter:bensmith").unwrap());
        let log = fixture(contact)
            .execute(&action(json!({"RWF": "500"})))
            .await
            .unwrap();
        assert_eq!(log.event_types(), vec!["error", "run_result_changed"]);
    }

    #[tokio::test]
    async fn test_validate_amounts() {
        let assets = session_assets(json!([]));
        assert!(matches!(
            action(json!({})).validate(&assets).await,
            Err(CoreError::ValidationError(_))
        ));
        assert!(matches!(
            action(json!({"RWF": "-5"})).validate(&assets).await,
            Err(CoreError::ValidationError(_))
        ));
        assert!(action(json!({"RWF": "5"})).validate(&assets).await.is_ok());
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{action_common, missing_or_ok, result_event, Action, EventLog, RunView};
use crate::assets::SessionAssets;
use crate::domain::asset_types::ClassifierReference;
use crate::domain::events::ServiceCalledEvent;
use crate::domain::flow::Node;
use crate::domain::inspect::{ProducesResults, ResultInfo};
use crate::domain::ActionUuid;
use crate::error::MissingReference;
use crate::CoreError;

const CATEGORY_SUCCESS: &str = "Success";
const CATEGORY_SKIPPED: &str = "Skipped";
const CATEGORY_FAILURE: &str = "Failure";

/// Action: classify input into an intent using an NLU classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallClassifierAction {
    /// UUID of this action
    pub uuid: ActionUuid,
    /// The classifier to use
    pub classifier: ClassifierReference,
    /// Input template
    pub input: String,
    /// Result to save the top intent under
    pub result_name: String,
}

impl CallClassifierAction {
    /// Type tag
    pub const TYPE: &'static str = "call_classifier";

    fn failed(&self, log: &mut EventLog, input: &str, reason: String) {
        log.error(reason);
        log.push(result_event(
            &self.result_name,
            "",
            CATEGORY_FAILURE,
            Some(input.to_string()),
            None,
        ));
    }
}

impl ProducesResults for CallClassifierAction {
    fn results(&self, node: &Node, include: &mut dyn FnMut(ResultInfo)) {
        let categories = [CATEGORY_SUCCESS, CATEGORY_SKIPPED, CATEGORY_FAILURE]
            .iter()
            .map(|c| c.to_string())
            .collect();
        include(ResultInfo::new(&self.result_name, categories, node.uuid()));
    }
}

#[async_trait]
impl Action for CallClassifierAction {
    action_common!(Self::TYPE);

    async fn validate(&self, assets: &SessionAssets) -> Result<(), CoreError> {
        let missing = match assets.classifier(&self.classifier.uuid).await? {
            Some(_) => vec![],
            None => vec![MissingReference::new(
                "classifier",
                self.classifier.uuid.as_str(),
                Some(self.classifier.name.clone()),
            )],
        };
        missing_or_ok(missing)
    }

    async fn execute(&self, run: &RunView<'_>, log: &mut EventLog) -> Result<(), CoreError> {
        let input = run.render(&self.input, log);
        let input = input.trim();
        if input.is_empty() {
            log.push(result_event(&self.result_name, "", CATEGORY_SKIPPED, None, None));
            return Ok(());
        }

        let Some(classifier) = run.assets.classifier(&self.classifier.uuid).await? else {
            self.failed(log, input, format!("no such classifier: {}", self.classifier.name));
            return Ok(());
        };
        let Some(factory) = run.engine.classification_factory() else {
            self.failed(log, input, "no classification service available".to_string());
            return Ok(());
        };
        let service = match factory(&classifier) {
            Ok(service) => service,
            Err(e) => {
                self.failed(log, input, e.to_string());
                return Ok(());
            }
        };

        let outcome = service.classify(input).await;
        log.push(ServiceCalledEvent::for_classifier(
            self.classifier.clone(),
            outcome.traces,
        ));

        match outcome.result {
            Ok(classification) => match classification.top_intent() {
                Some(intent) => {
                    let extra = serde_json::to_value(&classification)?;
                    log.push(result_event(
                        &self.result_name,
                        &intent.name,
                        CATEGORY_SUCCESS,
                        Some(input.to_string()),
                        Some(extra),
                    ));
                }
                None => log.push(result_event(
                    &self.result_name,
                    "",
                    CATEGORY_FAILURE,
                    Some(input.to_string()),
                    None,
                )),
            },
            Err(e) => {
                warn!(classifier = %self.classifier.name, error = %e, "Classification failed");
                self.failed(log, input, format!("classification failed: {}", e));
            }
        }
        Ok(())
    }
}

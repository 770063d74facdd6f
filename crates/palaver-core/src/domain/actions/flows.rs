use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{action_common, Action, EventLog, RunView};
use crate::assets::SessionAssets;
use crate::domain::asset_types::FlowReference;
use crate::domain::events::FlowTriggeredEvent;
use crate::domain::inspect::ProducesResults;
use crate::domain::ActionUuid;
use crate::error::{MissingReference, MissingReferences};
use crate::CoreError;

/// Action: start a child run of another flow. The parent waits for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterFlowAction {
    /// UUID of this action
    pub uuid: ActionUuid,
    /// The flow to enter
    pub flow: FlowReference,
}

impl EnterFlowAction {
    /// Type tag
    pub const TYPE: &'static str = crate::domain::flow::ENTER_FLOW_ACTION;
}

impl ProducesResults for EnterFlowAction {}

#[async_trait]
impl Action for EnterFlowAction {
    action_common!(Self::TYPE);

    async fn validate(&self, assets: &SessionAssets) -> Result<(), CoreError> {
        match assets.flow(&self.flow.uuid).await {
            Ok(_) => Ok(()),
            Err(CoreError::AssetNotFound(_)) => {
                Err(CoreError::MissingDependencies(MissingReferences(vec![
                    MissingReference::new(
                        "flow",
                        self.flow.uuid.as_str(),
                        Some(self.flow.name.clone()),
                    ),
                ])))
            }
            Err(e) => Err(e),
        }
    }

    async fn execute(&self, _run: &RunView<'_>, log: &mut EventLog) -> Result<(), CoreError> {
        log.push(FlowTriggeredEvent::new(self.flow.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actions::testing::session_assets;
    use serde_json::json;

    #[tokio::test]
    async fn test_validate_missing_flow() {
        let action: EnterFlowAction = serde_json::from_value(json!({
            "uuid": "a1",
            "flow": {"uuid": "f9", "name": "Gone"}
        }))
        .unwrap();

        match action.validate(&session_assets(json!([]))).await {
            Err(CoreError::MissingDependencies(missing)) => {
                assert_eq!(missing.0[0].item_type, "flow")
            }
            other => panic!("Expected MissingDependencies, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_validate_known_flow() {
        let assets = session_assets(json!([
            {"url": "http://assets.example.com/flow/f2", "type": "flow", "content": {
                "uuid": "f2", "name": "Child", "nodes": []
            }}
        ]));
        let action: EnterFlowAction = serde_json::from_value(json!({
            "uuid": "a1",
            "flow": {"uuid": "f2", "name": "Child"}
        }))
        .unwrap();

        assert!(action.validate(&assets).await.is_ok());
    }
}

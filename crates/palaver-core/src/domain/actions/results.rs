use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{action_common, Action, EventLog, RunView};
use crate::assets::SessionAssets;
use crate::domain::events::RunResultChangedEvent;
use crate::domain::flow::Node;
use crate::domain::inspect::{ProducesResults, ResultInfo};
use crate::domain::ActionUuid;
use crate::CoreError;

/// Action: save a result on the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRunResultAction {
    /// UUID of this action
    pub uuid: ActionUuid,
    /// Name of the result
    pub name: String,
    /// Value template
    #[serde(default)]
    pub value: String,
    /// Category to save the value under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl SetRunResultAction {
    /// Type tag
    pub const TYPE: &'static str = "set_run_result";
}

impl ProducesResults for SetRunResultAction {
    fn results(&self, node: &Node, include: &mut dyn FnMut(ResultInfo)) {
        include(ResultInfo::new(
            &self.name,
            self.category.iter().cloned().collect(),
            node.uuid(),
        ));
    }
}

#[async_trait]
impl Action for SetRunResultAction {
    action_common!(Self::TYPE);

    async fn validate(&self, _assets: &SessionAssets) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "result name can't be empty".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, run: &RunView<'_>, log: &mut EventLog) -> Result<(), CoreError> {
        let value = run.render(&self.value, log);
        log.push(RunResultChangedEvent::new(
            &self.name,
            &value,
            self.category.clone(),
            None,
            None,
        ));
        Ok(())
    }
}

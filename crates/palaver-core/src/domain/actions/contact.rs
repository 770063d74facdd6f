use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{action_common, log_no_contact, missing_or_ok, Action, EventLog, RunView};
use crate::assets::SessionAssets;
use crate::domain::asset_types::FieldReference;
use crate::domain::events::ContactFieldChangedEvent;
use crate::domain::inspect::ProducesResults;
use crate::domain::ActionUuid;
use crate::error::MissingReference;
use crate::CoreError;

/// Action: set or clear a contact field. An empty value clears it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetContactFieldAction {
    /// UUID of this action
    pub uuid: ActionUuid,
    /// The field to set
    pub field: FieldReference,
    /// Value template
    #[serde(default)]
    pub value: String,
}

impl SetContactFieldAction {
    /// Type tag
    pub const TYPE: &'static str = "set_contact_field";
}

impl ProducesResults for SetContactFieldAction {}

#[async_trait]
impl Action for SetContactFieldAction {
    action_common!(Self::TYPE);

    async fn validate(&self, assets: &SessionAssets) -> Result<(), CoreError> {
        let missing = match assets.field(&self.field.key).await? {
            Some(_) => vec![],
            None => vec![MissingReference::new(
                "field",
                self.field.key.as_str(),
                Some(self.field.name.clone()),
            )],
        };
        missing_or_ok(missing)
    }

    async fn execute(&self, run: &RunView<'_>, log: &mut EventLog) -> Result<(), CoreError> {
        let Some(contact) = run.contact else {
            log_no_contact(log, Self::TYPE);
            return Ok(());
        };

        let rendered = run.render(&self.value, log);
        let value = Some(rendered.trim().to_string()).filter(|v| !v.is_empty());

        if contact.field(&self.field.key) != value.as_deref() {
            log.push(ContactFieldChangedEvent::new(self.field.clone(), value));
        }
        Ok(())
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{action_common, log_no_contact, missing_or_ok, Action, EventLog, RunView};
use crate::assets::SessionAssets;
use crate::domain::asset_types::GroupReference;
use crate::domain::events::ContactGroupsChangedEvent;
use crate::domain::inspect::ProducesResults;
use crate::domain::ActionUuid;
use crate::error::MissingReference;
use crate::CoreError;

async fn check_groups(
    assets: &SessionAssets,
    groups: &[GroupReference],
) -> Result<(), CoreError> {
    let known = assets.groups().await?;
    let missing = groups
        .iter()
        .filter(|r| !known.iter().any(|g| g.uuid == r.uuid))
        .map(|r| MissingReference::new("group", r.uuid.as_str(), Some(r.name.clone())))
        .collect();
    missing_or_ok(missing)
}

/// Action: add the contact to static groups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddContactGroupsAction {
    /// UUID of this action
    pub uuid: ActionUuid,
    /// Groups to add the contact to
    pub groups: Vec<GroupReference>,
}

impl AddContactGroupsAction {
    /// Type tag
    pub const TYPE: &'static str = "add_contact_groups";
}

impl ProducesResults for AddContactGroupsAction {}

#[async_trait]
impl Action for AddContactGroupsAction {
    action_common!(Self::TYPE);

    async fn validate(&self, assets: &SessionAssets) -> Result<(), CoreError> {
        check_groups(assets, &self.groups).await
    }

    async fn execute(&self, run: &RunView<'_>, log: &mut EventLog) -> Result<(), CoreError> {
        let Some(contact) = run.contact else {
            log_no_contact(log, Self::TYPE);
            return Ok(());
        };

        let mut added: Vec<GroupReference> = Vec::new();
        for reference in &self.groups {
            let Some(group) = run.assets.group(&reference.uuid).await? else {
                log.error(format!("no such group: {}", reference.name));
                continue;
            };
            if group.is_dynamic() {
                log.error(format!("can't add contacts to dynamic group '{}'", group.name));
                continue;
            }
            if !contact.in_group(&group.uuid) && !added.iter().any(|g| g.uuid == group.uuid) {
                added.push(group.reference());
            }
        }

        if !added.is_empty() {
            log.push(ContactGroupsChangedEvent::new(added, Vec::new()));
        }
        Ok(())
    }
}

/// Action: remove the contact from static groups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveContactGroupsAction {
    /// UUID of this action
    pub uuid: ActionUuid,
    /// Groups to remove the contact from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupReference>,
    /// Remove the contact from every static group instead
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub all_groups: bool,
}

impl RemoveContactGroupsAction {
    /// Type tag
    pub const TYPE: &'static str = "remove_contact_groups";
}

impl ProducesResults for RemoveContactGroupsAction {}

#[async_trait]
impl Action for RemoveContactGroupsAction {
    action_common!(Self::TYPE);

    async fn validate(&self, assets: &SessionAssets) -> Result<(), CoreError> {
        if self.all_groups && !self.groups.is_empty() {
            return Err(CoreError::ValidationError(
                "can't specify groups when removing from all groups".to_string(),
            ));
        }
        check_groups(assets, &self.groups).await
    }

    async fn execute(&self, run: &RunView<'_>, log: &mut EventLog) -> Result<(), CoreError> {
        let Some(contact) = run.contact else {
            log_no_contact(log, Self::TYPE);
            return Ok(());
        };

        let known = run.assets.groups().await?;
        let mut removed: Vec<GroupReference> = Vec::new();

        if self.all_groups {
            // dynamic membership is query driven so those are left alone
            for membership in &contact.groups {
                let is_static = known
                    .iter()
                    .find(|g| g.uuid == membership.uuid)
                    .is_some_and(|g| !g.is_dynamic());
                if is_static {
                    removed.push(membership.clone());
                }
            }
        } else {
            for reference in &self.groups {
                let Some(group) = known.iter().find(|g| g.uuid == reference.uuid) else {
                    log.error(format!("no such group: {}", reference.name));
                    continue;
                };
                if group.is_dynamic() {
                    log.error(format!(
                        "can't remove contacts from dynamic group '{}'",
                        group.name
                    ));
                    continue;
                }
                if contact.in_group(&group.uuid) && !removed.iter().any(|g| g.uuid == group.uuid) {
                    removed.push(group.reference());
                }
            }
        }

        if !removed.is_empty() {
            log.push(ContactGroupsChangedEvent::new(Vec::new(), removed));
        }
        Ok(())
    }
}

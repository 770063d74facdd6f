use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{event_common, BaseEvent, Event, EventOrigin, EventTarget};
use crate::assets::SessionAssets;
use crate::domain::asset_types::{FieldReference, GroupReference};
use crate::domain::contact::Contact;
use crate::error::{MissingReference, MissingReferences};
use crate::CoreError;

async fn check_groups(
    assets: &SessionAssets,
    groups: &[GroupReference],
) -> Result<(), CoreError> {
    let mut missing = MissingReferences::default();
    for group in groups {
        if assets.group(&group.uuid).await?.is_none() {
            missing.0.push(MissingReference::new(
                "group",
                group.uuid.as_str(),
                Some(group.name.clone()),
            ));
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CoreError::MissingDependencies(missing))
    }
}

/// Event: the contact was replaced with a new snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactChangedEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: BaseEvent,
    /// The new contact state
    pub contact: Contact,
}

impl ContactChangedEvent {
    /// Type tag
    pub const TYPE: &'static str = "contact_changed";

    /// Create a new event
    pub fn new(contact: Contact) -> Self {
        Self {
            base: BaseEvent::new(),
            contact,
        }
    }
}

impl Event for ContactChangedEvent {
    event_common!(Self::TYPE);

    fn allowed_origin(&self) -> EventOrigin {
        EventOrigin::Either
    }

    fn apply(&self, target: &mut EventTarget<'_>) -> Result<(), CoreError> {
        *target.contact = Some(self.contact.clone());
        Ok(())
    }
}

/// Event: the contact was added to groups out of band
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactGroupsAddedEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: BaseEvent,
    /// Groups added
    pub groups: Vec<GroupReference>,
}

impl ContactGroupsAddedEvent {
    /// Type tag
    pub const TYPE: &'static str = "contact_groups_added";

    /// Create a new event
    pub fn new(groups: Vec<GroupReference>) -> Self {
        Self {
            base: BaseEvent::new(),
            groups,
        }
    }
}

#[async_trait]
impl Event for ContactGroupsAddedEvent {
    event_common!(Self::TYPE);

    fn allowed_origin(&self) -> EventOrigin {
        EventOrigin::Either
    }

    async fn validate(&self, assets: &SessionAssets) -> Result<(), CoreError> {
        check_groups(assets, &self.groups).await
    }

    fn apply(&self, target: &mut EventTarget<'_>) -> Result<(), CoreError> {
        let contact = target.require_contact(Self::TYPE)?;
        for group in &self.groups {
            contact.add_group(group.clone());
        }
        Ok(())
    }
}

/// Event: the engine changed the contact's group memberships
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactGroupsChangedEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: BaseEvent,
    /// Groups the contact was added to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups_added: Vec<GroupReference>,
    /// Groups the contact was removed from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups_removed: Vec<GroupReference>,
}

impl ContactGroupsChangedEvent {
    /// Type tag
    pub const TYPE: &'static str = "contact_groups_changed";

    /// Create a new event
    pub fn new(groups_added: Vec<GroupReference>, groups_removed: Vec<GroupReference>) -> Self {
        Self {
            base: BaseEvent::new(),
            groups_added,
            groups_removed,
        }
    }
}

#[async_trait]
impl Event for ContactGroupsChangedEvent {
    event_common!(Self::TYPE);

    async fn validate(&self, assets: &SessionAssets) -> Result<(), CoreError> {
        check_groups(assets, &self.groups_added).await?;
        check_groups(assets, &self.groups_removed).await
    }

    fn apply(&self, target: &mut EventTarget<'_>) -> Result<(), CoreError> {
        let contact = target.require_contact(Self::TYPE)?;
        for group in &self.groups_added {
            contact.add_group(group.clone());
        }
        for group in &self.groups_removed {
            contact.remove_group(&group.uuid);
        }
        Ok(())
    }
}

/// Event: a contact field was set or cleared
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactFieldChangedEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: BaseEvent,
    /// The field that changed
    pub field: FieldReference,
    /// New value, none if cleared
    #[serde(default)]
    pub value: Option<String>,
}

impl ContactFieldChangedEvent {
    /// Type tag
    pub const TYPE: &'static str = "contact_field_changed";

    /// Create a new event
    pub fn new(field: FieldReference, value: Option<String>) -> Self {
        Self {
            base: BaseEvent::new(),
            field,
            value,
        }
    }
}

#[async_trait]
impl Event for ContactFieldChangedEvent {
    event_common!(Self::TYPE);

    async fn validate(&self, assets: &SessionAssets) -> Result<(), CoreError> {
        match assets.field(&self.field.key).await? {
            Some(_) => Ok(()),
            None => Err(CoreError::MissingDependencies(MissingReferences(vec![
                MissingReference::new("field", self.field.key.as_str(), None),
            ]))),
        }
    }

    fn apply(&self, target: &mut EventTarget<'_>) -> Result<(), CoreError> {
        let contact = target.require_contact(Self::TYPE)?;
        contact.set_field(&self.field.key, self.value.clone());
        Ok(())
    }
}

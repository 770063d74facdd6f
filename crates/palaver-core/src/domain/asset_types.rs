use serde::{Deserialize, Serialize};

use crate::domain::{ChannelUuid, ClassifierUuid, FlowUuid, GroupUuid};

/// A channel through which contacts are reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Unique identifier
    pub uuid: ChannelUuid,
    /// Display name
    pub name: String,
    /// Address, e.g. a phone number or short code
    #[serde(default)]
    pub address: String,
    /// URN schemes this channel can send to
    #[serde(default)]
    pub schemes: Vec<String>,
    /// Roles, e.g. `send`, `receive`
    #[serde(default)]
    pub roles: Vec<String>,
}

/// A contact group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Unique identifier
    pub uuid: GroupUuid,
    /// Display name
    pub name: String,
    /// Membership query for dynamic groups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl Group {
    /// Whether membership is computed from a query rather than managed by flows
    pub fn is_dynamic(&self) -> bool {
        self.query.as_deref().map_or(false, |q| !q.is_empty())
    }

    /// A reference to this group
    pub fn reference(&self) -> GroupReference {
        GroupReference {
            uuid: self.uuid.clone(),
            name: self.name.clone(),
        }
    }
}

/// Reference to a group by UUID, with the name kept for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupReference {
    /// UUID of the group
    pub uuid: GroupUuid,
    /// Name of the group
    #[serde(default)]
    pub name: String,
}

impl GroupReference {
    /// Create a new group reference
    pub fn new(uuid: &str, name: &str) -> Self {
        Self {
            uuid: GroupUuid::from(uuid),
            name: name.to_string(),
        }
    }
}

/// An NLU classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classifier {
    /// Unique identifier
    pub uuid: ClassifierUuid,
    /// Display name
    pub name: String,
    /// Kind of classifier service, e.g. `wit`
    #[serde(rename = "type")]
    pub classifier_type: String,
    /// Intents the classifier can produce
    #[serde(default)]
    pub intents: Vec<String>,
}

/// Reference to a classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierReference {
    /// UUID of the classifier
    pub uuid: ClassifierUuid,
    /// Name of the classifier
    #[serde(default)]
    pub name: String,
}

/// A contact field definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Key used in contact field maps
    pub key: String,
    /// Display name
    pub name: String,
    /// Value type, e.g. `text`, `number`
    #[serde(rename = "type", default = "default_field_type")]
    pub value_type: String,
}

fn default_field_type() -> String {
    "text".to_string()
}

/// Reference to a contact field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldReference {
    /// Key of the field
    pub key: String,
    /// Name of the field
    #[serde(default)]
    pub name: String,
}

/// A named set of subscriber URLs invoked together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resthook {
    /// Slug the resthook is triggered by
    pub slug: String,
    /// Subscriber URLs
    #[serde(default)]
    pub subscribers: Vec<String>,
}

/// Reference to a flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowReference {
    /// UUID of the flow
    pub uuid: FlowUuid,
    /// Name of the flow
    #[serde(default)]
    pub name: String,
}

impl FlowReference {
    /// Create a new flow reference
    pub fn new(uuid: &str, name: &str) -> Self {
        Self {
            uuid: FlowUuid::from(uuid),
            name: name.to_string(),
        }
    }
}

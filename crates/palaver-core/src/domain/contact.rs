use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::asset_types::GroupReference;
use crate::domain::{ContactUuid, GroupUuid};
use crate::CoreError;

/// Value object: a contact URN such as `tel:+250788123123`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Urn(String);

/// URN scheme for phone numbers
pub const TEL_SCHEME: &str = "tel";

impl Urn {
    /// Parse a URN of the form `scheme:path`
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value.split_once(':') {
            Some((scheme, path))
                if !scheme.is_empty()
                    && !path.is_empty()
                    && scheme.chars().all(|c| c.is_ascii_alphanumeric()) =>
            {
                Ok(Self(format!("{}:{}", scheme.to_lowercase(), path)))
            }
            _ => Err(CoreError::ParseError(format!("invalid URN: {}", value))),
        }
    }

    /// The scheme, e.g. `tel`
    pub fn scheme(&self) -> &str {
        self.0.split_once(':').map(|(s, _)| s).unwrap_or_default()
    }

    /// The path, e.g. `+250788123123`
    pub fn path(&self) -> &str {
        self.0.split_once(':').map(|(_, p)| p).unwrap_or_default()
    }

    /// The full URN
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Urn {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Urn::parse(&value)
    }
}

impl From<Urn> for String {
    fn from(urn: Urn) -> Self {
        urn.0
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The person a session is interacting with
///
/// Shared by every run in a session. Only event application mutates it, which
/// is why the mutators are crate-private.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Unique identifier
    pub uuid: ContactUuid,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Preferred language as an ISO-639-3 code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// URNs in priority order
    #[serde(default)]
    pub urns: Vec<Urn>,

    /// Groups the contact belongs to
    #[serde(default)]
    pub groups: Vec<GroupReference>,

    /// Field values keyed by field key
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Contact {
    /// Create a contact with no URNs, groups or fields
    pub fn new(uuid: ContactUuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            language: None,
            urns: Vec::new(),
            groups: Vec::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a URN, builder style
    pub fn with_urn(mut self, urn: Urn) -> Self {
        self.urns.push(urn);
        self
    }

    /// Whether the contact is in the given group
    pub fn in_group(&self, uuid: &GroupUuid) -> bool {
        self.groups.iter().any(|g| &g.uuid == uuid)
    }

    /// The highest priority URN with the given scheme
    pub fn preferred_urn(&self, scheme: &str) -> Option<&Urn> {
        self.urns.iter().find(|u| u.scheme() == scheme)
    }

    /// Value of the given field
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub(crate) fn add_group(&mut self, group: GroupReference) {
        if !self.in_group(&group.uuid) {
            self.groups.push(group);
        }
    }

    pub(crate) fn remove_group(&mut self, uuid: &GroupUuid) {
        self.groups.retain(|g| &g.uuid != uuid);
    }

    pub(crate) fn set_field(&mut self, key: &str, value: Option<String>) {
        match value {
            Some(value) => {
                self.fields.insert(key.to_string(), value);
            }
            None => {
                self.fields.remove(key);
            }
        }
    }

    /// Representation of this contact in the evaluation context
    pub fn to_context(&self) -> serde_json::Value {
        json!({
            "uuid": self.uuid,
            "name": self.name,
            "language": self.language,
            "urns": self.urns.iter().map(Urn::as_str).collect::<Vec<_>>(),
            "groups": self.groups.iter().map(|g| g.name.as_str()).collect::<Vec<_>>(),
            "fields": self.fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urn_parsing() {
        let urn = Urn::parse("TEL:+250788123123").unwrap();
        assert_eq!(urn.scheme(), "tel");
        assert_eq!(urn.path(), "+250788123123");
        assert_eq!(urn.to_string(), "tel:+250788123123");

        assert!(Urn::parse("+250788123123").is_err());
        assert!(Urn::parse("tel:").is_err());
        assert!(Urn::parse("te l:123").is_err());
    }

    #[test]
    fn test_contact_deserialization() {
        let contact: Contact = serde_json::from_value(json!({
            "uuid": "5d76d86b-3bb9-4d5a-b822-c9d86f5d8e4f",
            "name": "Ryan Lewis",
            "urns": ["tel:+12065551212", "twitter:ryan"],
            "groups": [{"uuid": "b7cf0d83-f1c9-411c-96fd-c511a4cfa86d", "name": "Testers"}],
            "fields": {"gender": "M"}
        }))
        .unwrap();

        assert_eq!(contact.name, "Ryan Lewis");
        assert_eq!(
            contact.preferred_urn(TEL_SCHEME).map(Urn::path),
            Some("+12065551212")
        );
        assert!(contact.in_group(&GroupUuid::from("b7cf0d83-f1c9-411c-96fd-c511a4cfa86d")));
        assert_eq!(contact.field("gender"), Some("M"));

        let bad = serde_json::from_value::<Contact>(json!({"uuid": "x", "urns": ["nope"]}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_contact_mutators() {
        let mut contact = Contact::new(ContactUuid::from("c1"), "Bob");
        let testers = GroupReference::new("g1", "Testers");

        contact.add_group(testers.clone());
        contact.add_group(testers.clone());
        assert_eq!(contact.groups.len(), 1);

        contact.remove_group(&testers.uuid);
        contact.remove_group(&testers.uuid);
        assert!(contact.groups.is_empty());

        contact.set_field("age", Some("23".to_string()));
        assert_eq!(contact.field("age"), Some("23"));
        contact.set_field("age", None);
        assert_eq!(contact.field("age"), None);
    }
}

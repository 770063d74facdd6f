/// Hierarchical location index
pub mod location;

/// Contacts and URNs
pub mod contact;

/// Asset object types (channels, groups, classifiers, ...)
pub mod asset_types;

/// Flow definitions
pub mod flow;

/// Runs and their state
pub mod run;

/// Events, the sole mutators of run and contact state
pub mod events;

/// Actions executed by flow nodes
pub mod actions;

/// Static analysis of flows
pub mod inspect;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random identifier
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// The identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Value object: Contact UUID
    ContactUuid
);
string_id!(
    /// Value object: Run UUID
    RunUuid
);
string_id!(
    /// Value object: Step UUID
    StepUuid
);
string_id!(
    /// Value object: Flow UUID
    FlowUuid
);
string_id!(
    /// Value object: Node UUID
    NodeUuid
);
string_id!(
    /// Value object: Exit UUID
    ExitUuid
);
string_id!(
    /// Value object: Action UUID
    ActionUuid
);
string_id!(
    /// Value object: Category UUID
    CategoryUuid
);
string_id!(
    /// Value object: Group UUID
    GroupUuid
);
string_id!(
    /// Value object: Channel UUID
    ChannelUuid
);
string_id!(
    /// Value object: Classifier UUID
    ClassifierUuid
);

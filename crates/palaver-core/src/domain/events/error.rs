use serde::{Deserialize, Serialize};

use super::{event_common, BaseEvent, Event, EventTarget};
use crate::domain::run::RunStatus;
use crate::CoreError;

/// Event: a soft failure the flow author should see. Changes nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: BaseEvent,
    /// Description of the problem
    pub text: String,
}

impl ErrorEvent {
    /// Type tag
    pub const TYPE: &'static str = "error";

    /// Create a new event
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            base: BaseEvent::new(),
            text: text.into(),
        }
    }
}

impl Event for ErrorEvent {
    event_common!(Self::TYPE);

    fn apply(&self, _target: &mut EventTarget<'_>) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Event: a hard failure ended the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: BaseEvent,
    /// Description of the failure
    pub text: String,
}

impl FailureEvent {
    /// Type tag
    pub const TYPE: &'static str = "failure";

    /// Create a new event
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            base: BaseEvent::new(),
            text: text.into(),
        }
    }
}

impl Event for FailureEvent {
    event_common!(Self::TYPE);

    fn apply(&self, target: &mut EventTarget<'_>) -> Result<(), CoreError> {
        target.run.exit(RunStatus::Errored, self.base.created_on);
        Ok(())
    }
}

use serde::{Deserialize, Serialize};

use super::{event_common, BaseEvent, Event, EventOrigin, EventTarget};
use crate::domain::asset_types::FlowReference;
use crate::domain::contact::Urn;
use crate::domain::run::{Input, RunResult, RunStatus, RunWait, Step};
use crate::domain::{NodeUuid, RunUuid, StepUuid};
use crate::CoreError;

/// Event: a run saved a result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResultChangedEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: BaseEvent,
    /// Name of the result
    pub name: String,
    /// Value saved
    pub value: String,
    /// Category the value was put in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Input that produced the value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Additional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl RunResultChangedEvent {
    /// Type tag
    pub const TYPE: &'static str = "run_result_changed";

    /// Create a new event
    pub fn new(
        name: &str,
        value: &str,
        category: Option<String>,
        input: Option<String>,
        extra: Option<serde_json::Value>,
    ) -> Self {
        Self {
            base: BaseEvent::new(),
            name: name.to_string(),
            value: value.to_string(),
            category,
            input,
            extra,
        }
    }
}

impl Event for RunResultChangedEvent {
    event_common!(Self::TYPE);

    fn apply(&self, target: &mut EventTarget<'_>) -> Result<(), CoreError> {
        let node_uuid = target
            .run
            .current_step()
            .map(|s| s.node_uuid.clone())
            .ok_or_else(|| {
                CoreError::ExecutionError("can't save a result before the first step".to_string())
            })?;

        target.run.save_result(RunResult {
            name: self.name.clone(),
            value: self.value.clone(),
            category: self.category.clone(),
            node_uuid,
            input: self.input.clone(),
            extra: self.extra.clone(),
            created_on: self.base.created_on,
        });
        Ok(())
    }
}

/// Event: a run arrived at a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepStartedEvent {
    /// Common event fields. `step_uuid` is the new step.
    #[serde(flatten)]
    pub base: BaseEvent,
    /// Node arrived at
    pub node_uuid: NodeUuid,
}

impl StepStartedEvent {
    /// Type tag
    pub const TYPE: &'static str = "step_started";

    /// Create a new event for a fresh step
    pub fn new(node_uuid: NodeUuid) -> Self {
        let mut base = BaseEvent::new();
        base.step_uuid = Some(StepUuid::generate());
        Self { base, node_uuid }
    }
}

impl Event for StepStartedEvent {
    event_common!(Self::TYPE);

    fn apply(&self, target: &mut EventTarget<'_>) -> Result<(), CoreError> {
        let uuid = self.base.step_uuid.clone().ok_or_else(|| {
            CoreError::ExecutionError("step_started event has no step UUID".to_string())
        })?;

        target.run.push_step(Step {
            uuid,
            node_uuid: self.node_uuid.clone(),
            arrived_on: self.base.created_on,
        });
        Ok(())
    }
}

/// Event: a run is now waiting for a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgWaitEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: BaseEvent,
    /// Seconds before the wait times out, if it does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl MsgWaitEvent {
    /// Type tag
    pub const TYPE: &'static str = "msg_wait";

    /// Create a new event
    pub fn new(timeout_seconds: Option<u64>) -> Self {
        Self {
            base: BaseEvent::new(),
            timeout_seconds,
        }
    }
}

impl Event for MsgWaitEvent {
    event_common!(Self::TYPE);

    fn apply(&self, target: &mut EventTarget<'_>) -> Result<(), CoreError> {
        target.run.set_status(RunStatus::Waiting);
        target.run.set_wait(Some(RunWait::Input {
            timeout_seconds: self.timeout_seconds,
        }));
        Ok(())
    }
}

/// Event: a message was received by a waiting run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgReceivedEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: BaseEvent,
    /// The message
    pub msg: Input,
}

impl MsgReceivedEvent {
    /// Type tag
    pub const TYPE: &'static str = "msg_received";

    /// Create a new event
    pub fn new(text: &str, urn: Option<Urn>) -> Self {
        Self {
            base: BaseEvent::new(),
            msg: Input {
                text: text.to_string(),
                urn,
            },
        }
    }
}

impl Event for MsgReceivedEvent {
    event_common!(Self::TYPE);

    fn allowed_origin(&self) -> EventOrigin {
        EventOrigin::Either
    }

    fn apply(&self, target: &mut EventTarget<'_>) -> Result<(), CoreError> {
        target.run.set_input(self.msg.clone());
        target.run.set_wait(None);
        target.run.set_status(RunStatus::Active);
        Ok(())
    }
}

/// Event: a run triggered a child run and now waits for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowTriggeredEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: BaseEvent,
    /// Flow the child run walks
    pub flow: FlowReference,
    /// UUID of the child run
    pub run_uuid: RunUuid,
}

impl FlowTriggeredEvent {
    /// Type tag
    pub const TYPE: &'static str = "flow_triggered";

    /// Create a new event for a fresh child run
    pub fn new(flow: FlowReference) -> Self {
        Self {
            base: BaseEvent::new(),
            flow,
            run_uuid: RunUuid::generate(),
        }
    }
}

impl Event for FlowTriggeredEvent {
    event_common!(Self::TYPE);

    fn apply(&self, target: &mut EventTarget<'_>) -> Result<(), CoreError> {
        target.run.set_status(RunStatus::Waiting);
        target.run.set_wait(Some(RunWait::Child {
            run_uuid: self.run_uuid.clone(),
            flow: self.flow.clone(),
        }));
        Ok(())
    }
}

/// Event: a child run this run was waiting on reached a terminal state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildRunExitedEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: BaseEvent,
    /// UUID of the child run
    pub run_uuid: RunUuid,
    /// Terminal status of the child run
    pub status: RunStatus,
}

impl ChildRunExitedEvent {
    /// Type tag
    pub const TYPE: &'static str = "child_run_exited";

    /// Create a new event
    pub fn new(run_uuid: RunUuid, status: RunStatus) -> Self {
        Self {
            base: BaseEvent::new(),
            run_uuid,
            status,
        }
    }
}

impl Event for ChildRunExitedEvent {
    event_common!(Self::TYPE);

    fn apply(&self, target: &mut EventTarget<'_>) -> Result<(), CoreError> {
        target.run.set_wait(None);
        target.run.set_status(RunStatus::Active);
        Ok(())
    }
}

/// Event: a run exited its flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCompletedEvent {
    /// Common event fields
    #[serde(flatten)]
    pub base: BaseEvent,
}

impl RunCompletedEvent {
    /// Type tag
    pub const TYPE: &'static str = "run_completed";

    /// Create a new event
    pub fn new() -> Self {
        Self {
            base: BaseEvent::new(),
        }
    }
}

impl Default for RunCompletedEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl Event for RunCompletedEvent {
    event_common!(Self::TYPE);

    fn apply(&self, target: &mut EventTarget<'_>) -> Result<(), CoreError> {
        target.run.exit(RunStatus::Completed, self.base.created_on);
        Ok(())
    }
}

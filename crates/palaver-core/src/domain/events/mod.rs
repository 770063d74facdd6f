//! Events, the only mutators of run and contact state
//!
//! Every state change in a session is an [`Event`] applied to an
//! [`EventTarget`]. Because a run records each event it applied, replaying that
//! log against a pristine run rebuilds the same state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, PoisonError, RwLock};

use crate::assets::SessionAssets;
use crate::domain::contact::Contact;
use crate::domain::run::Run;
use crate::domain::StepUuid;
use crate::CoreError;

/// Contact events
pub mod contact;

/// Run lifecycle and result events
pub mod run;

/// Events recording external service calls
pub mod services;

/// Soft and hard failure events
pub mod error;

pub use contact::{
    ContactChangedEvent, ContactFieldChangedEvent, ContactGroupsAddedEvent,
    ContactGroupsChangedEvent,
};
pub use error::{ErrorEvent, FailureEvent};
pub use run::{
    ChildRunExitedEvent, FlowTriggeredEvent, MsgReceivedEvent, MsgWaitEvent, RunCompletedEvent,
    RunResultChangedEvent, StepStartedEvent,
};
pub use services::{AirtimeTransferredEvent, ServiceCalledEvent, WebhookCalledEvent};

/// Who produced an event, or who may produce an event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    /// Generated by the engine while executing a flow
    Engine,
    /// Supplied by the caller of the engine
    Caller,
    /// Either of the above
    Either,
}

impl EventOrigin {
    /// Whether an event produced by `origin` is permitted by this allowance
    pub fn permits(self, origin: EventOrigin) -> bool {
        self == EventOrigin::Either || self == origin
    }
}

impl Default for EventOrigin {
    fn default() -> Self {
        EventOrigin::Engine
    }
}

/// Fields common to every event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseEvent {
    /// When the event was created
    pub created_on: DateTime<Utc>,

    /// Step the event was generated in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_uuid: Option<StepUuid>,

    /// Who produced the event
    #[serde(default)]
    pub origin: EventOrigin,
}

impl BaseEvent {
    /// A base for an engine event created now
    pub fn new() -> Self {
        Self {
            created_on: Utc::now(),
            step_uuid: None,
            origin: EventOrigin::Engine,
        }
    }
}

impl Default for BaseEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// The state an event is applied to
#[derive(Debug)]
pub struct EventTarget<'a> {
    /// The run the event belongs to
    pub run: &'a mut Run,
    /// The session's contact, shared by all runs
    pub contact: &'a mut Option<Contact>,
}

impl<'a> EventTarget<'a> {
    /// The contact, or an error if the session has none
    pub fn require_contact(&mut self, event_type: &str) -> Result<&mut Contact, CoreError> {
        self.contact.as_mut().ok_or_else(|| {
            CoreError::ExecutionError(format!("can't apply {} without a contact", event_type))
        })
    }
}

/// An immutable record of one state change
#[async_trait]
pub trait Event: Debug + Send + Sync {
    /// The type tag of this event
    fn event_type(&self) -> &'static str;

    /// The common fields of this event
    fn base(&self) -> &BaseEvent;

    /// Mutable access to the common fields, used before the event is applied
    fn base_mut(&mut self) -> &mut BaseEvent;

    /// Who may produce events of this type
    fn allowed_origin(&self) -> EventOrigin {
        EventOrigin::Engine
    }

    /// Check referential integrity against the session's assets
    async fn validate(&self, _assets: &SessionAssets) -> Result<(), CoreError> {
        Ok(())
    }

    /// Apply this event. This is the only way run and contact state changes.
    fn apply(&self, target: &mut EventTarget<'_>) -> Result<(), CoreError>;

    /// Serialize with the type tag included
    fn to_json(&self) -> Result<serde_json::Value, CoreError>;
}

/// Apply an event to a run and record it in the run's event log
pub(crate) fn apply_event(
    event: Arc<dyn Event>,
    run: &mut Run,
    contact: &mut Option<Contact>,
) -> Result<(), CoreError> {
    event.apply(&mut EventTarget {
        run: &mut *run,
        contact,
    })?;
    run.record(event);
    Ok(())
}

/// Serialize an event struct and add its type tag
pub(crate) fn to_tagged_json<T: Serialize>(
    event_type: &str,
    event: &T,
) -> Result<serde_json::Value, CoreError> {
    let mut value = serde_json::to_value(event)?;
    match value.as_object_mut() {
        Some(map) => {
            map.insert(
                "type".to_string(),
                serde_json::Value::String(event_type.to_string()),
            );
            Ok(value)
        }
        None => Err(CoreError::SerializationError(format!(
            "{} event didn't serialize to an object",
            event_type
        ))),
    }
}

macro_rules! event_common {
    ($tag:expr) => {
        fn event_type(&self) -> &'static str {
            $tag
        }

        fn base(&self) -> &$crate::domain::events::BaseEvent {
            &self.base
        }

        fn base_mut(&mut self) -> &mut $crate::domain::events::BaseEvent {
            &mut self.base
        }

        fn to_json(&self) -> Result<serde_json::Value, $crate::CoreError> {
            $crate::domain::events::to_tagged_json($tag, self)
        }
    };
}
pub(crate) use event_common;

/// Reads an event of a registered type from JSON
pub type EventReader = fn(&serde_json::Value) -> Result<Box<dyn Event>, CoreError>;

static EVENT_READERS: Lazy<RwLock<HashMap<&'static str, EventReader>>> =
    Lazy::new(|| RwLock::new(builtin_readers()));

fn read_typed<T: Event + DeserializeOwned + 'static>(
    data: &serde_json::Value,
) -> Result<Box<dyn Event>, CoreError> {
    let event: T = serde_json::from_value(data.clone())
        .map_err(|e| CoreError::ParseError(format!("invalid event: {}", e)))?;
    Ok(Box::new(event))
}

fn builtin_readers() -> HashMap<&'static str, EventReader> {
    let mut readers: HashMap<&'static str, EventReader> = HashMap::new();
    readers.insert(ContactChangedEvent::TYPE, read_typed::<ContactChangedEvent>);
    readers.insert(ContactGroupsAddedEvent::TYPE, read_typed::<ContactGroupsAddedEvent>);
    readers.insert(ContactGroupsChangedEvent::TYPE, read_typed::<ContactGroupsChangedEvent>);
    readers.insert(ContactFieldChangedEvent::TYPE, read_typed::<ContactFieldChangedEvent>);
    readers.insert(RunResultChangedEvent::TYPE, read_typed::<RunResultChangedEvent>);
    readers.insert(WebhookCalledEvent::TYPE, read_typed::<WebhookCalledEvent>);
    readers.insert(ServiceCalledEvent::TYPE, read_typed::<ServiceCalledEvent>);
    readers.insert(AirtimeTransferredEvent::TYPE, read_typed::<AirtimeTransferredEvent>);
    readers.insert(ErrorEvent::TYPE, read_typed::<ErrorEvent>);
    readers.insert(FailureEvent::TYPE, read_typed::<FailureEvent>);
    readers.insert(StepStartedEvent::TYPE, read_typed::<StepStartedEvent>);
    readers.insert(MsgWaitEvent::TYPE, read_typed::<MsgWaitEvent>);
    readers.insert(MsgReceivedEvent::TYPE, read_typed::<MsgReceivedEvent>);
    readers.insert(FlowTriggeredEvent::TYPE, read_typed::<FlowTriggeredEvent>);
    readers.insert(ChildRunExitedEvent::TYPE, read_typed::<ChildRunExitedEvent>);
    readers.insert(RunCompletedEvent::TYPE, read_typed::<RunCompletedEvent>);
    readers
}

/// Register a reader for a new event type, replacing any existing one
pub fn register_event_type(event_type: &'static str, reader: EventReader) {
    EVENT_READERS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(event_type, reader);
}

/// Read an event from JSON, dispatching on its `type` tag
pub fn read_event(data: &serde_json::Value) -> Result<Box<dyn Event>, CoreError> {
    let event_type = data
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| CoreError::ParseError("event is missing a type".to_string()))?;

    let reader = EVENT_READERS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(event_type)
        .copied()
        .ok_or_else(|| CoreError::ParseError(format!("unknown event type: {}", event_type)))?;

    reader(data)
}

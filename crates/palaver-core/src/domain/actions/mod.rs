//! Actions executed by flow nodes
//!
//! An action never mutates state itself. It validates its asset references,
//! then executes against a read-only [`RunView`], recording the changes it
//! wants as events in an [`EventLog`]. The session applies those events.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, PoisonError, RwLock};

use crate::application::Engine;
use crate::assets::SessionAssets;
use crate::domain::contact::Contact;
use crate::domain::events::{ErrorEvent, Event, RunResultChangedEvent};
use crate::domain::flow::Node;
use crate::domain::inspect::ProducesResults;
use crate::domain::run::Run;
use crate::domain::ActionUuid;
use crate::error::{MissingReference, MissingReferences};
use crate::CoreError;

/// Airtime transfer
pub mod airtime;

/// NLU classification
pub mod classify;

/// Contact field updates
pub mod contact;

/// Child flows
pub mod flows;

/// Contact group membership
pub mod groups;

/// Run results
pub mod results;

/// Webhooks and resthooks
pub mod webhooks;

pub use airtime::TransferAirtimeAction;
pub use classify::CallClassifierAction;
pub use contact::SetContactFieldAction;
pub use flows::EnterFlowAction;
pub use groups::{AddContactGroupsAction, RemoveContactGroupsAction};
pub use results::SetRunResultAction;
pub use webhooks::{CallResthookAction, CallWebhookAction};

/// Read-only view of a run handed to executing actions
pub struct RunView<'a> {
    /// The run being executed
    pub run: &'a Run,
    /// The session's contact, if any
    pub contact: Option<&'a Contact>,
    /// The session's assets
    pub assets: &'a SessionAssets,
    /// The engine, for services and template evaluation
    pub engine: &'a Engine,
    /// The node whose actions are running
    pub node: &'a Node,
}

impl<'a> RunView<'a> {
    /// The context templates are evaluated against
    pub fn context(&self) -> serde_json::Value {
        let run = self.run.to_context();
        json!({
            "contact": self.contact.map(Contact::to_context),
            "results": run["results"],
            "input": run["input"],
            "webhook": run["webhook"],
            "run": run,
        })
    }

    /// Render a template, logging an error event and yielding an empty string
    /// if evaluation fails
    pub fn render(&self, template: &str, log: &mut EventLog) -> String {
        match self.engine.evaluator().render(template, &self.context()) {
            Ok(rendered) => rendered,
            Err(e) => {
                log.error(format!("error evaluating '{}': {}", template, e));
                String::new()
            }
        }
    }
}

/// Collects the events an executing action emits, in emission order
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<Box<dyn Event>>,
}

impl EventLog {
    /// Record an event
    pub fn push(&mut self, event: impl Event + 'static) {
        self.events.push(Box::new(event));
    }

    /// Record a soft failure
    pub fn error(&mut self, text: impl Into<String>) {
        self.push(ErrorEvent::new(text));
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Type tags of the recorded events
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.iter().map(|e| e.event_type()).collect()
    }

    /// The recorded events
    pub fn events(&self) -> &[Box<dyn Event>] {
        &self.events
    }

    /// Take the recorded events
    pub fn into_events(self) -> Vec<Box<dyn Event>> {
        self.events
    }
}

/// A step of behaviour in a flow node
#[async_trait]
pub trait Action: ProducesResults + Debug + Send + Sync {
    /// UUID of this action
    fn uuid(&self) -> &ActionUuid;

    /// The type tag of this action
    fn action_type(&self) -> &'static str;

    /// Check every asset this action references exists
    async fn validate(&self, _assets: &SessionAssets) -> Result<(), CoreError> {
        Ok(())
    }

    /// Perform the action, recording the resulting changes as events
    ///
    /// Missing runtime preconditions and failed service calls are recorded as
    /// events. An `Err` is a hard failure that aborts the run.
    async fn execute(&self, run: &RunView<'_>, log: &mut EventLog) -> Result<(), CoreError>;

    /// Serialize with the type tag included
    fn to_json(&self) -> Result<serde_json::Value, CoreError>;
}

macro_rules! action_common {
    ($tag:expr) => {
        fn uuid(&self) -> &$crate::domain::ActionUuid {
            &self.uuid
        }

        fn action_type(&self) -> &'static str {
            $tag
        }

        fn to_json(&self) -> Result<serde_json::Value, $crate::CoreError> {
            $crate::domain::events::to_tagged_json($tag, self)
        }
    };
}
pub(crate) use action_common;

/// Log that an action needing a contact ran in a session without one
pub(crate) fn log_no_contact(log: &mut EventLog, action_type: &str) {
    log.error(format!(
        "can't execute action of type {} in session without a contact",
        action_type
    ));
}

/// A result event for the current node
pub(crate) fn result_event(
    name: &str,
    value: &str,
    category: &str,
    input: Option<String>,
    extra: Option<serde_json::Value>,
) -> RunResultChangedEvent {
    RunResultChangedEvent::new(name, value, Some(category.to_string()), input, extra)
}

/// Turn collected missing references into a validation result
pub(crate) fn missing_or_ok(missing: Vec<MissingReference>) -> Result<(), CoreError> {
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CoreError::MissingDependencies(MissingReferences(missing)))
    }
}

/// Reads an action of a registered type from JSON
pub type ActionReader = fn(&serde_json::Value) -> Result<Arc<dyn Action>, CoreError>;

static ACTION_READERS: Lazy<RwLock<HashMap<&'static str, ActionReader>>> =
    Lazy::new(|| RwLock::new(builtin_readers()));

fn read_typed<T: Action + DeserializeOwned + 'static>(
    data: &serde_json::Value,
) -> Result<Arc<dyn Action>, CoreError> {
    let action: T = serde_json::from_value(data.clone())
        .map_err(|e| CoreError::ParseError(format!("invalid action: {}", e)))?;
    Ok(Arc::new(action))
}

fn builtin_readers() -> HashMap<&'static str, ActionReader> {
    let mut readers: HashMap<&'static str, ActionReader> = HashMap::new();
    readers.insert(CallResthookAction::TYPE, read_typed::<CallResthookAction>);
    readers.insert(CallWebhookAction::TYPE, read_typed::<CallWebhookAction>);
    readers.insert(AddContactGroupsAction::TYPE, read_typed::<AddContactGroupsAction>);
    readers.insert(RemoveContactGroupsAction::TYPE, read_typed::<RemoveContactGroupsAction>);
    readers.insert(SetContactFieldAction::TYPE, read_typed::<SetContactFieldAction>);
    readers.insert(SetRunResultAction::TYPE, read_typed::<SetRunResultAction>);
    readers.insert(CallClassifierAction::TYPE, read_typed::<CallClassifierAction>);
    readers.insert(TransferAirtimeAction::TYPE, read_typed::<TransferAirtimeAction>);
    readers.insert(EnterFlowAction::TYPE, read_typed::<EnterFlowAction>);
    readers
}

/// Register a reader for a new action type, replacing any existing one
pub fn register_action_type(action_type: &'static str, reader: ActionReader) {
    ACTION_READERS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(action_type, reader);
}

/// Read an action from JSON, dispatching on its `type` tag
pub fn read_action(data: &serde_json::Value) -> Result<Arc<dyn Action>, CoreError> {
    let action_type = data
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| CoreError::ParseError("action is missing a type".to_string()))?;

    let reader = ACTION_READERS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(action_type)
        .copied()
        .ok_or_else(|| CoreError::ParseError(format!("unknown action type: {}", action_type)))?;

    reader(data)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::assets::fetcher::MockAssetFetcher;
    use crate::assets::AssetCache;
    use crate::domain::events::{apply_event, StepStartedEvent};
    use crate::domain::flow::Flow;
    use crate::domain::NodeUuid;

    pub(crate) const ASSETS_URL: &str = "http://assets.example.com";

    /// Assets served from an included payload, everything else is a 404
    pub(crate) fn session_assets(payload: serde_json::Value) -> SessionAssets {
        let mut fetcher = MockAssetFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|locator| Err(CoreError::AssetNotFound(locator.to_string())));
        let cache = AssetCache::new(Arc::new(fetcher));
        cache.include(&payload.to_string()).unwrap();
        SessionAssets::new(Arc::new(cache), ASSETS_URL)
    }

    /// A run positioned at the only node of a one node flow
    pub(crate) struct Fixture {
        pub flow: Flow,
        pub run: Run,
        pub contact: Option<Contact>,
        pub assets: SessionAssets,
        pub engine: Engine,
    }

    impl Fixture {
        pub(crate) fn new(engine: Engine, assets: SessionAssets, contact: Option<Contact>) -> Self {
            let flow = Flow::read(&json!({
                "uuid": "f1",
                "name": "Test",
                "nodes": [{"uuid": "n1", "exits": [{"uuid": "e1"}]}]
            }))
            .unwrap();
            let mut run = Run::new(flow.reference(), None);
            apply_event(
                Arc::new(StepStartedEvent::new(NodeUuid::from("n1"))),
                &mut run,
                &mut None,
            )
            .unwrap();

            Self {
                flow,
                run,
                contact,
                assets,
                engine,
            }
        }

        pub(crate) async fn execute(&self, action: &dyn Action) -> Result<EventLog, CoreError> {
            let view = RunView {
                run: &self.run,
                contact: self.contact.as_ref(),
                assets: &self.assets,
                engine: &self.engine,
                node: &self.flow.nodes()[0],
            };
            let mut log = EventLog::default();
            action.execute(&view, &mut log).await?;
            Ok(log)
        }
    }
}

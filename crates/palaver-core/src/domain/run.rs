use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::asset_types::FlowReference;
use crate::domain::contact::{Contact, Urn};
use crate::domain::events::{apply_event, read_event, Event};
use crate::domain::inspect::snakify;
use crate::domain::{NodeUuid, RunUuid, StepUuid};
use crate::services::webhooks::WebhookCall;
use crate::CoreError;

/// Run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run is stepping through its flow
    Active,
    /// Run is waiting for input or for a child run
    Waiting,
    /// Run exited its flow
    Completed,
    /// Run was aborted by a hard failure
    Errored,
}

impl RunStatus {
    /// Whether the run can no longer change
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Errored)
    }
}

/// What a waiting run is waiting for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunWait {
    /// A message from the contact
    Input {
        /// Seconds before the wait times out, if it does
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_seconds: Option<u64>,
    },
    /// A child run to reach a terminal state
    Child {
        /// UUID of the child run
        run_uuid: RunUuid,
        /// Flow the child run walks
        flow: FlowReference,
    },
}

/// A visit of a run to a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Unique identifier
    pub uuid: StepUuid,
    /// Node visited
    pub node_uuid: NodeUuid,
    /// When the run arrived at the node
    pub arrived_on: DateTime<Utc>,
}

/// Input received by a run, typically a message from the contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    /// Text of the input
    pub text: String,
    /// URN the input came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urn: Option<Urn>,
}

/// A result saved by a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Name as written in the flow
    pub name: String,
    /// Value
    pub value: String,
    /// Category the value was put in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Node that saved the result
    pub node_uuid: NodeUuid,
    /// Input that produced the value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Additional structured data, e.g. a parsed webhook response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
    /// When the result was saved
    pub created_on: DateTime<Utc>,
}

/// Aggregate: one walk of a flow for one contact
#[derive(Debug, Clone)]
pub struct Run {
    uuid: RunUuid,
    flow: FlowReference,
    parent_uuid: Option<RunUuid>,
    status: RunStatus,
    path: Vec<Step>,
    wait: Option<RunWait>,
    input: Option<Input>,
    results: BTreeMap<String, RunResult>,
    webhook: Option<WebhookCall>,
    events: Vec<Arc<dyn Event>>,
    created_on: DateTime<Utc>,
    modified_on: DateTime<Utc>,
    exited_on: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize)]
struct RunEnvelope {
    uuid: RunUuid,
    flow: FlowReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_uuid: Option<RunUuid>,
    status: RunStatus,
    #[serde(default)]
    path: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wait: Option<RunWait>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input: Option<Input>,
    #[serde(default)]
    results: BTreeMap<String, RunResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    webhook: Option<WebhookCall>,
    #[serde(default)]
    events: Vec<serde_json::Value>,
    created_on: DateTime<Utc>,
    modified_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exited_on: Option<DateTime<Utc>>,
}

impl Run {
    /// Create a new active run of the given flow
    pub fn new(flow: FlowReference, parent_uuid: Option<RunUuid>) -> Self {
        Self::with_uuid(RunUuid::generate(), flow, parent_uuid)
    }

    /// Create a new active run with a known UUID
    pub fn with_uuid(uuid: RunUuid, flow: FlowReference, parent_uuid: Option<RunUuid>) -> Self {
        let now = Utc::now();
        Self {
            uuid,
            flow,
            parent_uuid,
            status: RunStatus::Active,
            path: Vec::new(),
            wait: None,
            input: None,
            results: BTreeMap::new(),
            webhook: None,
            events: Vec::new(),
            created_on: now,
            modified_on: now,
            exited_on: None,
        }
    }

    /// A copy of this run's identity with none of its state or events
    pub fn pristine(&self) -> Self {
        Self {
            uuid: self.uuid.clone(),
            flow: self.flow.clone(),
            parent_uuid: self.parent_uuid.clone(),
            status: RunStatus::Active,
            path: Vec::new(),
            wait: None,
            input: None,
            results: BTreeMap::new(),
            webhook: None,
            events: Vec::new(),
            created_on: self.created_on,
            modified_on: self.created_on,
            exited_on: None,
        }
    }

    /// Rebuild a run and the contact by applying `events` to a pristine copy
    /// of `template`, starting without a contact
    pub fn replay(
        template: &Run,
        events: &[Arc<dyn Event>],
    ) -> Result<(Run, Option<Contact>), CoreError> {
        Self::replay_from(template, None, events)
    }

    /// Like [`Run::replay`] but starting from the given contact state
    pub fn replay_from(
        template: &Run,
        contact: Option<Contact>,
        events: &[Arc<dyn Event>],
    ) -> Result<(Run, Option<Contact>), CoreError> {
        let mut run = template.pristine();
        let mut contact = contact;
        for event in events {
            apply_event(Arc::clone(event), &mut run, &mut contact)?;
        }
        Ok((run, contact))
    }

    /// UUID of this run
    pub fn uuid(&self) -> &RunUuid {
        &self.uuid
    }

    /// Flow this run walks
    pub fn flow(&self) -> &FlowReference {
        &self.flow
    }

    /// The run that triggered this one, if any
    pub fn parent_uuid(&self) -> Option<&RunUuid> {
        self.parent_uuid.as_ref()
    }

    /// Current status
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Steps taken so far
    pub fn path(&self) -> &[Step] {
        &self.path
    }

    /// The step the run is currently at
    pub fn current_step(&self) -> Option<&Step> {
        self.path.last()
    }

    /// What the run is waiting for
    pub fn wait(&self) -> Option<&RunWait> {
        self.wait.as_ref()
    }

    /// Last input received
    pub fn input(&self) -> Option<&Input> {
        self.input.as_ref()
    }

    /// Saved results keyed by snakified name
    pub fn results(&self) -> &BTreeMap<String, RunResult> {
        &self.results
    }

    /// Result with the given name or key
    pub fn result(&self, name: &str) -> Option<&RunResult> {
        self.results.get(&snakify(name))
    }

    /// Last webhook call made
    pub fn webhook(&self) -> Option<&WebhookCall> {
        self.webhook.as_ref()
    }

    /// Events applied to this run, in order
    pub fn events(&self) -> &[Arc<dyn Event>] {
        &self.events
    }

    /// When the run was created
    pub fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    /// When the run last changed
    pub fn modified_on(&self) -> DateTime<Utc> {
        self.modified_on
    }

    /// When the run exited, if it has
    pub fn exited_on(&self) -> Option<DateTime<Utc>> {
        self.exited_on
    }

    pub(crate) fn record(&mut self, event: Arc<dyn Event>) {
        self.modified_on = event.base().created_on;
        self.events.push(event);
    }

    pub(crate) fn push_step(&mut self, step: Step) {
        self.path.push(step);
    }

    pub(crate) fn set_status(&mut self, status: RunStatus) {
        self.status = status;
    }

    pub(crate) fn set_wait(&mut self, wait: Option<RunWait>) {
        self.wait = wait;
    }

    pub(crate) fn set_input(&mut self, input: Input) {
        self.input = Some(input);
    }

    pub(crate) fn save_result(&mut self, result: RunResult) {
        self.results.insert(snakify(&result.name), result);
    }

    pub(crate) fn set_webhook(&mut self, call: WebhookCall) {
        self.webhook = Some(call);
    }

    pub(crate) fn exit(&mut self, status: RunStatus, at: DateTime<Utc>) {
        self.status = status;
        self.wait = None;
        self.exited_on = Some(at);
    }

    /// Representation of this run in the evaluation context
    pub fn to_context(&self) -> serde_json::Value {
        let results: BTreeMap<&String, serde_json::Value> = self
            .results
            .iter()
            .map(|(key, r)| {
                (
                    key,
                    json!({"name": r.name, "value": r.value, "category": r.category}),
                )
            })
            .collect();

        json!({
            "uuid": self.uuid,
            "flow": self.flow,
            "status": self.status,
            "results": results,
            "input": self.input.as_ref().map(|i| i.text.as_str()),
            "webhook": self.webhook.as_ref().map(|w| json!({"status_code": w.status_code, "body": w.response})),
        })
    }

    /// Serialize this run, including its event log
    pub fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        let events = self
            .events
            .iter()
            .map(|e| e.to_json())
            .collect::<Result<Vec<_>, _>>()?;

        let envelope = RunEnvelope {
            uuid: self.uuid.clone(),
            flow: self.flow.clone(),
            parent_uuid: self.parent_uuid.clone(),
            status: self.status,
            path: self.path.clone(),
            wait: self.wait.clone(),
            input: self.input.clone(),
            results: self.results.clone(),
            webhook: self.webhook.clone(),
            events,
            created_on: self.created_on,
            modified_on: self.modified_on,
            exited_on: self.exited_on,
        };
        Ok(serde_json::to_value(envelope)?)
    }

    /// Read a run serialized by [`Run::to_json`]
    pub fn read(data: &serde_json::Value) -> Result<Self, CoreError> {
        let envelope: RunEnvelope = serde_json::from_value(data.clone())
            .map_err(|e| CoreError::ParseError(format!("invalid run: {}", e)))?;

        let events = envelope
            .events
            .iter()
            .map(|e| read_event(e).map(Arc::from))
            .collect::<Result<Vec<Arc<dyn Event>>, _>>()?;

        Ok(Self {
            uuid: envelope.uuid,
            flow: envelope.flow,
            parent_uuid: envelope.parent_uuid,
            status: envelope.status,
            path: envelope.path,
            wait: envelope.wait,
            input: envelope.input,
            results: envelope.results,
            webhook: envelope.webhook,
            events,
            created_on: envelope.created_on,
            modified_on: envelope.modified_on,
            exited_on: envelope.exited_on,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{
        ContactChangedEvent, MsgReceivedEvent, MsgWaitEvent, RunCompletedEvent,
        RunResultChangedEvent, StepStartedEvent,
    };
    use crate::domain::ContactUuid;

    fn applied(run: &mut Run, contact: &mut Option<Contact>, event: impl Event + 'static) {
        apply_event(Arc::new(event), run, contact).unwrap();
    }

    #[test]
    fn test_events_drive_run_state() {
        let mut run = Run::new(FlowReference::new("f1", "Test"), None);
        let mut contact = None;

        applied(
            &mut run,
            &mut contact,
            ContactChangedEvent::new(Contact::new(ContactUuid::from("c1"), "Ann")),
        );
        applied(&mut run, &mut contact, StepStartedEvent::new(NodeUuid::from("n1")));
        let step_uuid = run.current_step().unwrap().uuid.clone();

        let mut result = RunResultChangedEvent::new(
            "Favorite Color",
            "red",
            Some("Red".to_string()),
            None,
            None,
        );
        result.base.step_uuid = Some(step_uuid);
        applied(&mut run, &mut contact, result);
        applied(&mut run, &mut contact, MsgWaitEvent::new(None));

        assert_eq!(run.status(), RunStatus::Waiting);
        assert_eq!(run.wait(), Some(&RunWait::Input { timeout_seconds: None }));
        assert_eq!(run.result("favorite color").unwrap().value, "red");
        assert_eq!(
            run.result("favorite_color").unwrap().node_uuid,
            NodeUuid::from("n1")
        );

        applied(&mut run, &mut contact, MsgReceivedEvent::new("blue", None));
        assert_eq!(run.status(), RunStatus::Active);
        assert_eq!(run.input().unwrap().text, "blue");

        applied(&mut run, &mut contact, RunCompletedEvent::new());
        assert_eq!(run.status(), RunStatus::Completed);
        assert!(run.exited_on().is_some());
        assert_eq!(run.events().len(), 6);
        assert_eq!(contact.unwrap().name, "Ann");
    }

    #[test]
    fn test_replay_reproduces_state() {
        let mut run = Run::new(FlowReference::new("f1", "Test"), None);
        let mut contact = None;

        applied(
            &mut run,
            &mut contact,
            ContactChangedEvent::new(Contact::new(ContactUuid::from("c1"), "Ann")),
        );
        applied(&mut run, &mut contact, StepStartedEvent::new(NodeUuid::from("n1")));
        applied(&mut run, &mut contact, RunCompletedEvent::new());

        let (replayed, replayed_contact) = Run::replay(&run, run.events()).unwrap();

        assert_eq!(replayed.to_json().unwrap(), run.to_json().unwrap());
        assert_eq!(replayed_contact, contact);
    }

    #[test]
    fn test_run_serialization() {
        let mut run = Run::new(
            FlowReference::new("f1", "Test"),
            Some(RunUuid::from("parent")),
        );
        let mut contact = None;
        applied(&mut run, &mut contact, StepStartedEvent::new(NodeUuid::from("n1")));

        let json = run.to_json().unwrap();
        assert_eq!(json["status"], "active");
        assert_eq!(json["parent_uuid"], "parent");
        assert_eq!(json["events"][0]["type"], "step_started");

        let read = Run::read(&json).unwrap();
        assert_eq!(read.to_json().unwrap(), json);
        assert_eq!(read.path().len(), 1);
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Errored.is_terminal());
        assert!(!RunStatus::Waiting.is_terminal());
        assert!(!RunStatus::Active.is_terminal());
    }
}

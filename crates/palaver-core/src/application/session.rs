//! The session control loop
//!
//! A session owns a contact and a stack of runs. Driving a session repeatedly
//! picks the newest active run, routes it to its next node, executes that
//! node's actions and applies the events they emit, until every run is waiting
//! or has exited. Every state change goes through an event so that replaying a
//! run's event log rebuilds the run.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::engine::Engine;
use crate::assets::SessionAssets;
use crate::domain::actions::{EventLog, RunView};
use crate::domain::asset_types::FlowReference;
use crate::domain::contact::Contact;
use crate::domain::events::{
    apply_event, ChildRunExitedEvent, ContactChangedEvent, ErrorEvent, Event, EventOrigin,
    FailureEvent, MsgWaitEvent, RunCompletedEvent, RunResultChangedEvent, StepStartedEvent,
};
use crate::domain::flow::{Flow, Node};
use crate::domain::run::{Run, RunStatus, RunWait};
use crate::domain::{FlowUuid, NodeUuid, RunUuid};
use crate::CoreError;

/// What starts a session: a flow and, optionally, the contact it runs for
#[derive(Debug, Clone)]
pub struct Trigger {
    /// The flow to start
    pub flow: FlowReference,
    /// The contact, if any
    pub contact: Option<Contact>,
}

impl Trigger {
    /// Trigger `flow` without a contact
    pub fn new(flow: FlowReference) -> Self {
        Self {
            flow,
            contact: None,
        }
    }

    /// Run for the given contact
    pub fn with_contact(mut self, contact: Contact) -> Self {
        self.contact = Some(contact);
        self
    }
}

/// Overall status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Not started, or still being driven
    Active,
    /// Waiting for input
    Waiting,
    /// Every run completed
    Completed,
    /// A run errored
    Errored,
}

#[derive(Deserialize)]
struct SessionEnvelope {
    #[serde(default)]
    contact: Option<Contact>,
    #[serde(default)]
    runs: Vec<serde_json::Value>,
}

/// A contact's passage through one or more flows
pub struct Session {
    engine: Arc<Engine>,
    assets: Arc<SessionAssets>,
    runs: Vec<Run>,
    contact: Option<Contact>,
    flows: HashMap<FlowUuid, Arc<Flow>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("status", &self.status())
            .field("runs", &self.runs.len())
            .field("contact", &self.contact.as_ref().map(|c| &c.uuid))
            .finish()
    }
}

impl Session {
    pub(crate) fn new(engine: Arc<Engine>, assets: Arc<SessionAssets>) -> Self {
        Self {
            engine,
            assets,
            runs: Vec::new(),
            contact: None,
            flows: HashMap::new(),
        }
    }

    pub(crate) fn read(
        engine: Arc<Engine>,
        assets: Arc<SessionAssets>,
        data: &serde_json::Value,
    ) -> Result<Self, CoreError> {
        let envelope: SessionEnvelope = serde_json::from_value(data.clone())
            .map_err(|e| CoreError::ParseError(format!("invalid session: {}", e)))?;
        let runs = envelope
            .runs
            .iter()
            .map(Run::read)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            engine,
            assets,
            runs,
            contact: envelope.contact,
            flows: HashMap::new(),
        })
    }

    /// Serialize the contact and every run with its event log
    pub fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        let runs = self
            .runs
            .iter()
            .map(Run::to_json)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(json!({
            "status": self.status(),
            "contact": self.contact,
            "runs": runs,
        }))
    }

    /// The engine this session runs on
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// The assets this session reads
    pub fn assets(&self) -> &Arc<SessionAssets> {
        &self.assets
    }

    /// Runs in the order they were started
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// The run with the given UUID
    pub fn run(&self, uuid: &RunUuid) -> Option<&Run> {
        self.runs.iter().find(|r| r.uuid() == uuid)
    }

    /// The session's contact
    pub fn contact(&self) -> Option<&Contact> {
        self.contact.as_ref()
    }

    /// The run waiting for input, if any
    pub fn waiting_run(&self) -> Option<&Run> {
        self.waiting_index().map(|idx| &self.runs[idx])
    }

    /// Overall status
    pub fn status(&self) -> SessionStatus {
        let any = |status: RunStatus| self.runs.iter().any(|r| r.status() == status);

        if self.runs.is_empty() {
            SessionStatus::Active
        } else if any(RunStatus::Errored) {
            SessionStatus::Errored
        } else if any(RunStatus::Active) {
            SessionStatus::Active
        } else if any(RunStatus::Waiting) {
            SessionStatus::Waiting
        } else {
            SessionStatus::Completed
        }
    }

    /// Start the trigger's flow and drive the session until it waits or exits
    pub async fn start(&mut self, trigger: Trigger) -> Result<(), CoreError> {
        if !self.runs.is_empty() {
            return Err(CoreError::SessionError(
                "session has already been started".to_string(),
            ));
        }

        let flow = self.load_flow(&trigger.flow.uuid).await?;
        if let Err(e) = flow.check_dependencies(&self.assets).await {
            if e.is_hard_failure() {
                return Err(e);
            }
            warn!(flow = %flow.name(), error = %e, "Flow has missing dependencies");
        }

        let run = Run::new(flow.reference(), None);
        info!(
            flow = %flow.name(),
            flow_uuid = %flow.uuid(),
            run_uuid = %run.uuid(),
            "Starting session"
        );
        self.runs.push(run);

        if let Some(contact) = trigger.contact {
            self.apply(0, Box::new(ContactChangedEvent::new(contact)))?;
        }

        self.drive().await
    }

    /// Resume a waiting session with caller supplied events
    ///
    /// Every event is marked as caller produced. If any event's type may not
    /// come from a caller, any fails validation, or any can't be applied to
    /// the run, nothing is applied and the session keeps waiting.
    pub async fn resume(&mut self, events: Vec<Box<dyn Event>>) -> Result<(), CoreError> {
        let status = self.status();
        if status != SessionStatus::Waiting {
            return Err(CoreError::SessionError(format!(
                "can't resume a session with status {:?}",
                status
            )));
        }
        let idx = self.waiting_index().ok_or_else(|| {
            CoreError::SessionError("no run is waiting for input".to_string())
        })?;

        let mut events = events;
        for event in events.iter_mut() {
            if !event.allowed_origin().permits(EventOrigin::Caller) {
                return Err(CoreError::ValidationError(format!(
                    "{} events can't be supplied by callers",
                    event.event_type()
                )));
            }
            event.base_mut().origin = EventOrigin::Caller;
        }
        for event in &events {
            event.validate(&self.assets).await?;
        }

        info!(
            run_uuid = %self.runs[idx].uuid(),
            events = events.len(),
            "Resuming session"
        );

        // applied to copies first so a rejected batch leaves the session as it was
        let step_uuid = self.runs[idx].current_step().map(|s| s.uuid.clone());
        let mut staged_run = self.runs[idx].clone();
        let mut staged_contact = self.contact.clone();
        for mut event in events {
            if event.base().step_uuid.is_none() {
                event.base_mut().step_uuid = step_uuid.clone();
            }
            let event_type = event.event_type();
            if let Err(e) = apply_event(Arc::from(event), &mut staged_run, &mut staged_contact) {
                warn!(event_type, error = %e, "Rejected caller events");
                return Err(CoreError::ValidationError(format!(
                    "can't apply caller {} event: {}",
                    event_type, e
                )));
            }
        }
        self.runs[idx] = staged_run;
        self.contact = staged_contact;

        if self.runs[idx].status() == RunStatus::Active {
            self.drive().await
        } else {
            Ok(())
        }
    }

    fn waiting_index(&self) -> Option<usize> {
        self.runs
            .iter()
            .rposition(|r| matches!(r.wait(), Some(RunWait::Input { .. })))
    }

    async fn load_flow(&mut self, uuid: &FlowUuid) -> Result<Arc<Flow>, CoreError> {
        if let Some(flow) = self.flows.get(uuid) {
            return Ok(Arc::clone(flow));
        }
        let flow = self.assets.flow(uuid).await?;
        self.flows.insert(uuid.clone(), Arc::clone(&flow));
        Ok(flow)
    }

    async fn drive(&mut self) -> Result<(), CoreError> {
        loop {
            self.resume_parents()?;

            let Some(idx) = self
                .runs
                .iter()
                .rposition(|r| r.status() == RunStatus::Active)
            else {
                debug!(status = ?self.status(), "Session paused");
                return Ok(());
            };

            let flow_uuid = self.runs[idx].flow().uuid.clone();
            let loaded = self.load_flow(&flow_uuid).await;
            let flow = match loaded {
                Ok(flow) => flow,
                Err(e) => return Err(self.fail(idx, e)),
            };

            let destination = match self.runs[idx].current_step().map(|s| s.node_uuid.clone()) {
                None => flow.nodes().first().map(|n| n.uuid().clone()),
                Some(node_uuid) => match flow.node(&node_uuid) {
                    Some(node) => self.route(idx, node)?,
                    None => return Err(self.fail(idx, unknown_node(&node_uuid))),
                },
            };

            let Some(node_uuid) = destination else {
                self.apply(idx, Box::new(RunCompletedEvent::new()))?;
                info!(run_uuid = %self.runs[idx].uuid(), "Run completed");
                continue;
            };

            self.check_step_limit(idx)?;
            self.apply(idx, Box::new(StepStartedEvent::new(node_uuid.clone())))?;

            match flow.node(&node_uuid) {
                Some(node) => self.execute_node(idx, node).await?,
                None => return Err(self.fail(idx, unknown_node(&node_uuid))),
            }
        }
    }

    /// Pick the exit out of the run's current node, saving the router's result
    fn route(&mut self, idx: usize, node: &Node) -> Result<Option<NodeUuid>, CoreError> {
        let routed = self.engine.router().route(node, &self.runs[idx]);
        let route = match routed {
            Ok(Some(route)) => route,
            Ok(None) => return Ok(None),
            Err(e) => return Err(self.fail(idx, e)),
        };

        if let (Some(router), Some(category)) = (node.router(), &route.category) {
            if let Some(name) = &router.result_name {
                let value = route.operand.clone().unwrap_or_else(|| category.clone());
                let input = self.runs[idx].input().map(|i| i.text.clone());
                self.apply(
                    idx,
                    Box::new(RunResultChangedEvent::new(
                        name,
                        &value,
                        Some(category.clone()),
                        input,
                        None,
                    )),
                )?;
            }
        }

        match node.exit(&route.exit_uuid) {
            Some(exit) => Ok(exit.destination_uuid.clone()),
            None => Err(self.fail(
                idx,
                CoreError::ExecutionError(format!(
                    "router picked unknown exit {}",
                    route.exit_uuid
                )),
            )),
        }
    }

    async fn execute_node(&mut self, idx: usize, node: &Node) -> Result<(), CoreError> {
        for action in node.actions() {
            if self.runs[idx].status() != RunStatus::Active {
                break;
            }

            let validated = action.validate(&self.assets).await;
            match validated {
                Ok(()) => {}
                Err(e) if !e.is_hard_failure() => {
                    warn!(
                        action_uuid = %action.uuid(),
                        action_type = action.action_type(),
                        error = %e,
                        "Skipping invalid action"
                    );
                    self.apply(idx, Box::new(ErrorEvent::new(e.to_string())))?;
                    continue;
                }
                Err(e) => return Err(self.fail(idx, e)),
            }

            let mut log = EventLog::default();
            let executed = {
                let view = RunView {
                    run: &self.runs[idx],
                    contact: self.contact.as_ref(),
                    assets: self.assets.as_ref(),
                    engine: self.engine.as_ref(),
                    node,
                };
                action.execute(&view, &mut log).await
            };
            debug!(
                action_uuid = %action.uuid(),
                action_type = action.action_type(),
                events = log.len(),
                "Executed action"
            );

            for event in log.into_events() {
                self.process(idx, event).await?;
            }
            if let Err(e) = executed {
                return Err(self.fail(idx, e));
            }

            self.start_child(idx).await?;
        }

        if self.runs[idx].status() == RunStatus::Active {
            if let Some(wait) = node.wait() {
                self.apply(idx, Box::new(MsgWaitEvent::new(wait.timeout_seconds)))?;
            }
        }
        Ok(())
    }

    /// Validate and apply an event emitted by an action
    async fn process(&mut self, idx: usize, event: Box<dyn Event>) -> Result<(), CoreError> {
        let validated = event.validate(&self.assets).await;
        match validated {
            Ok(()) => self.apply(idx, event),
            Err(e) if !e.is_hard_failure() => {
                warn!(event_type = event.event_type(), error = %e, "Dropping invalid event");
                self.apply(idx, Box::new(ErrorEvent::new(e.to_string())))
            }
            Err(e) => Err(self.fail(idx, e)),
        }
    }

    /// Apply an event to a run, stamping it with the run's current step
    fn apply(&mut self, idx: usize, mut event: Box<dyn Event>) -> Result<(), CoreError> {
        if event.base().step_uuid.is_none() {
            event.base_mut().step_uuid = self.runs[idx].current_step().map(|s| s.uuid.clone());
        }

        match apply_event(Arc::from(event), &mut self.runs[idx], &mut self.contact) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(idx, e)),
        }
    }

    /// Mark a run as errored with a failure event and hand back the error
    fn fail(&mut self, idx: usize, err: CoreError) -> CoreError {
        let run = &mut self.runs[idx];
        error!(run_uuid = %run.uuid(), error = %err, "Run failed");

        if !run.status().is_terminal() {
            let mut event = FailureEvent::new(err.to_string());
            event.base.step_uuid = run.current_step().map(|s| s.uuid.clone());
            if let Err(e) = apply_event(Arc::new(event), run, &mut self.contact) {
                error!(error = %e, "Failed to record run failure");
            }
        }
        err
    }

    fn check_step_limit(&mut self, idx: usize) -> Result<(), CoreError> {
        let steps: usize = self.runs.iter().map(|r| r.path().len()).sum();
        let max_steps = self.engine.config().max_steps_per_session;
        if steps >= max_steps {
            return Err(self.fail(
                idx,
                CoreError::ExecutionError(format!(
                    "reached maximum number of steps per session: {}",
                    max_steps
                )),
            ));
        }
        Ok(())
    }

    /// Create the child run a `flow_triggered` event just asked for
    async fn start_child(&mut self, idx: usize) -> Result<(), CoreError> {
        let Some(RunWait::Child { run_uuid, flow }) = self.runs[idx].wait().cloned() else {
            return Ok(());
        };
        if self.runs.iter().any(|r| r.uuid() == &run_uuid) {
            return Ok(());
        }

        let loaded = self.load_flow(&flow.uuid).await;
        let child_flow = match loaded {
            Ok(flow) => flow,
            Err(e) => return Err(self.fail(idx, e)),
        };
        let parent_uuid = self.runs[idx].uuid().clone();
        info!(
            parent_uuid = %parent_uuid,
            run_uuid = %run_uuid,
            flow = %child_flow.name(),
            "Starting child run"
        );
        self.runs.push(Run::with_uuid(
            run_uuid,
            child_flow.reference(),
            Some(parent_uuid),
        ));
        Ok(())
    }

    /// Wake parents whose child runs have exited
    fn resume_parents(&mut self) -> Result<(), CoreError> {
        for idx in 0..self.runs.len() {
            let Some(RunWait::Child { run_uuid, .. }) = self.runs[idx].wait() else {
                continue;
            };
            let Some(child) = self.runs.iter().find(|r| r.uuid() == run_uuid) else {
                continue;
            };
            let status = child.status();
            if !status.is_terminal() {
                continue;
            }

            let child_uuid = child.uuid().clone();
            self.apply(idx, Box::new(ChildRunExitedEvent::new(child_uuid, status)))?;
            if status == RunStatus::Errored {
                return Err(self.fail(
                    idx,
                    CoreError::ExecutionError("child run errored".to_string()),
                ));
            }
        }
        Ok(())
    }
}

fn unknown_node(uuid: &NodeUuid) -> CoreError {
    CoreError::ExecutionError(format!("run is at unknown node {}", uuid))
}

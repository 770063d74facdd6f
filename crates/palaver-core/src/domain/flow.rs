use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::assets::SessionAssets;
use crate::domain::actions::{read_action, Action};
use crate::domain::asset_types::FlowReference;
use crate::domain::inspect::{ProducesResults, ResultInfo};
use crate::domain::run::Run;
use crate::domain::{CategoryUuid, ExitUuid, FlowUuid, NodeUuid};
use crate::error::MissingReferences;
use crate::CoreError;

/// Name of the action type that starts a child run
pub const ENTER_FLOW_ACTION: &str = "enter_flow";

/// A flow definition: a graph of nodes containing actions
#[derive(Debug, Clone)]
pub struct Flow {
    uuid: FlowUuid,
    name: String,
    language: Option<String>,
    nodes: Vec<Node>,
}

/// A node in a flow
#[derive(Debug, Clone)]
pub struct Node {
    uuid: NodeUuid,
    actions: Vec<Arc<dyn Action>>,
    wait: Option<Wait>,
    router: Option<Router>,
    exits: Vec<Exit>,
}

/// Marks a node as waiting for a message once its actions have run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wait {
    /// Seconds before the wait times out, if it does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// Routing configuration of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    /// Name of the result saved when a category is picked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_name: Option<String>,

    /// Key of a run result whose category is switched on. The run input is
    /// used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand: Option<String>,

    /// Categories in match order
    #[serde(default)]
    pub categories: Vec<Category>,

    /// Category picked when nothing matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_category_uuid: Option<CategoryUuid>,
}

/// A routing category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Unique identifier
    pub uuid: CategoryUuid,
    /// Name, matched case-insensitively against the operand
    pub name: String,
    /// Exit taken when this category is picked
    pub exit_uuid: ExitUuid,
}

/// An exit of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exit {
    /// Unique identifier
    pub uuid: ExitUuid,
    /// Node this exit leads to, or none if it leaves the flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_uuid: Option<NodeUuid>,
}

#[derive(Deserialize)]
struct FlowEnvelope {
    uuid: FlowUuid,
    name: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    nodes: Vec<NodeEnvelope>,
}

#[derive(Deserialize)]
struct NodeEnvelope {
    uuid: NodeUuid,
    #[serde(default)]
    actions: Vec<serde_json::Value>,
    #[serde(default)]
    wait: Option<Wait>,
    #[serde(default)]
    router: Option<Router>,
    #[serde(default)]
    exits: Vec<Exit>,
}

impl Flow {
    /// Read and structurally validate a flow definition
    pub fn read(data: &serde_json::Value) -> Result<Self, CoreError> {
        let envelope: FlowEnvelope = serde_json::from_value(data.clone())
            .map_err(|e| CoreError::ParseError(format!("invalid flow: {}", e)))?;

        let mut nodes = Vec::with_capacity(envelope.nodes.len());
        for node in envelope.nodes {
            let actions = node
                .actions
                .iter()
                .map(read_action)
                .collect::<Result<Vec<_>, _>>()?;

            nodes.push(Node {
                uuid: node.uuid,
                actions,
                wait: node.wait,
                router: node.router,
                exits: node.exits,
            });
        }

        let flow = Self {
            uuid: envelope.uuid,
            name: envelope.name,
            language: envelope.language,
            nodes,
        };
        flow.validate()?;
        Ok(flow)
    }

    /// Serialize back to the JSON definition format
    pub fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        let nodes = self
            .nodes
            .iter()
            .map(Node::to_json)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(json!({
            "uuid": self.uuid,
            "name": self.name,
            "language": self.language,
            "nodes": nodes,
        }))
    }

    /// Check the graph is internally consistent
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut node_uuids = HashSet::new();
        for node in &self.nodes {
            if !node_uuids.insert(&node.uuid) {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate node UUID: {}",
                    node.uuid
                )));
            }
        }

        let mut action_uuids = HashSet::new();
        for node in &self.nodes {
            for (i, action) in node.actions.iter().enumerate() {
                if !action_uuids.insert(action.uuid()) {
                    return Err(CoreError::ValidationError(format!(
                        "Duplicate action UUID: {}",
                        action.uuid()
                    )));
                }
                if action.action_type() == ENTER_FLOW_ACTION && i + 1 != node.actions.len() {
                    return Err(CoreError::ValidationError(format!(
                        "Action {} in node {} enters a flow but isn't the last action",
                        action.uuid(),
                        node.uuid
                    )));
                }
            }

            for exit in &node.exits {
                if let Some(destination) = &exit.destination_uuid {
                    if !node_uuids.contains(destination) {
                        return Err(CoreError::ValidationError(format!(
                            "Exit {} of node {} references non-existent node: {}",
                            exit.uuid, node.uuid, destination
                        )));
                    }
                }
            }

            if let Some(router) = &node.router {
                router.validate(node)?;
            }
        }

        Ok(())
    }

    /// Check every asset the flow's actions reference is available
    pub async fn check_dependencies(&self, assets: &SessionAssets) -> Result<(), CoreError> {
        let mut missing = MissingReferences::default();
        for node in &self.nodes {
            for action in &node.actions {
                match action.validate(assets).await {
                    Ok(()) => {}
                    Err(CoreError::MissingDependencies(refs)) => missing.0.extend(refs.0),
                    Err(e) => return Err(e),
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::MissingDependencies(missing))
        }
    }

    /// UUID of this flow
    pub fn uuid(&self) -> &FlowUuid {
        &self.uuid
    }

    /// Name of this flow
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default language of this flow
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Nodes in declared order; the first is the entry node
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Look up a node by UUID
    pub fn node(&self, uuid: &NodeUuid) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.uuid == uuid)
    }

    /// A reference to this flow
    pub fn reference(&self) -> FlowReference {
        FlowReference {
            uuid: self.uuid.clone(),
            name: self.name.clone(),
        }
    }
}

impl Node {
    /// UUID of this node
    pub fn uuid(&self) -> &NodeUuid {
        &self.uuid
    }

    /// Actions in execution order
    pub fn actions(&self) -> &[Arc<dyn Action>] {
        &self.actions
    }

    /// Wait applied after the actions, if any
    pub fn wait(&self) -> Option<&Wait> {
        self.wait.as_ref()
    }

    /// Router, if any
    pub fn router(&self) -> Option<&Router> {
        self.router.as_ref()
    }

    /// Exits in declared order
    pub fn exits(&self) -> &[Exit] {
        &self.exits
    }

    /// Look up an exit by UUID
    pub fn exit(&self, uuid: &ExitUuid) -> Option<&Exit> {
        self.exits.iter().find(|e| &e.uuid == uuid)
    }

    fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        let actions = self
            .actions
            .iter()
            .map(|a| a.to_json())
            .collect::<Result<Vec<_>, _>>()?;

        let mut node = json!({
            "uuid": self.uuid,
            "actions": actions,
            "exits": self.exits,
        });
        if let Some(wait) = &self.wait {
            node["wait"] = serde_json::to_value(wait)?;
        }
        if let Some(router) = &self.router {
            node["router"] = serde_json::to_value(router)?;
        }
        Ok(node)
    }
}

impl Router {
    fn validate(&self, node: &Node) -> Result<(), CoreError> {
        for category in &self.categories {
            if node.exit(&category.exit_uuid).is_none() {
                return Err(CoreError::ValidationError(format!(
                    "Category {} of node {} references non-existent exit: {}",
                    category.uuid, node.uuid, category.exit_uuid
                )));
            }
        }
        if let Some(default) = &self.default_category_uuid {
            if !self.categories.iter().any(|c| &c.uuid == default) {
                return Err(CoreError::ValidationError(format!(
                    "Default category of node {} references non-existent category: {}",
                    node.uuid, default
                )));
            }
        }
        Ok(())
    }

    /// Category with the given UUID
    pub fn category(&self, uuid: &CategoryUuid) -> Option<&Category> {
        self.categories.iter().find(|c| &c.uuid == uuid)
    }
}

impl ProducesResults for Router {
    fn results(&self, node: &Node, include: &mut dyn FnMut(ResultInfo)) {
        if let Some(name) = &self.result_name {
            let categories = self.categories.iter().map(|c| c.name.clone()).collect();
            include(ResultInfo::new(name, categories, node.uuid()));
        }
    }
}

/// The outcome of routing a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Exit to take
    pub exit_uuid: ExitUuid,
    /// Name of the category that was picked, if any
    pub category: Option<String>,
    /// Operand the category was matched against
    pub operand: Option<String>,
}

/// Picks the exit a run takes out of a node once its actions are done
pub trait ExitRouter: fmt::Debug + Send + Sync {
    /// Route `node` for `run`. `None` means the node has no exits and the run
    /// leaves the flow.
    fn route(&self, node: &Node, run: &Run) -> Result<Option<Route>, CoreError>;
}

/// Default routing: match the operand against category names, falling back to
/// the default category and then to the first exit
#[derive(Debug, Default, Clone, Copy)]
pub struct CategoryRouter;

impl ExitRouter for CategoryRouter {
    fn route(&self, node: &Node, run: &Run) -> Result<Option<Route>, CoreError> {
        let first_exit = || {
            node.exits.first().map(|exit| Route {
                exit_uuid: exit.uuid.clone(),
                category: None,
                operand: None,
            })
        };

        let Some(router) = &node.router else {
            return Ok(first_exit());
        };

        let operand = match &router.operand {
            Some(key) => run.result(key).and_then(|r| r.category.clone()),
            None => run.input().map(|i| i.text.clone()),
        };

        let matched = operand.as_deref().and_then(|operand| {
            router
                .categories
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(operand.trim()))
        });
        let picked = matched.or_else(|| {
            router
                .default_category_uuid
                .as_ref()
                .and_then(|uuid| router.category(uuid))
        });

        match picked {
            Some(category) => Ok(Some(Route {
                exit_uuid: category.exit_uuid.clone(),
                category: Some(category.name.clone()),
                operand,
            })),
            None => Ok(first_exit()),
        }
    }
}

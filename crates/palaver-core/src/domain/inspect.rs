//! Static analysis of flow definitions
//!
//! Every action kind and every router declares the results it can save through
//! [`ProducesResults`]. [`flow_results`] walks a flow's nodes and merges those
//! declarations by result key.

use serde::{Deserialize, Serialize};

use crate::domain::flow::{Flow, Node};
use crate::domain::NodeUuid;

/// A result a flow can save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultInfo {
    /// Key the result is stored under, the snakified name
    pub key: String,
    /// Name as written in the flow
    pub name: String,
    /// Possible categories
    pub categories: Vec<String>,
    /// Nodes that save this result
    pub node_uuids: Vec<NodeUuid>,
}

impl ResultInfo {
    /// Describe a result saved by the given node
    pub fn new(name: &str, categories: Vec<String>, node_uuid: &NodeUuid) -> Self {
        Self {
            key: snakify(name),
            name: name.to_string(),
            categories,
            node_uuids: vec![node_uuid.clone()],
        }
    }

    fn merge(&mut self, other: ResultInfo) {
        for category in other.categories {
            if !self.categories.contains(&category) {
                self.categories.push(category);
            }
        }
        for node_uuid in other.node_uuids {
            if !self.node_uuids.contains(&node_uuid) {
                self.node_uuids.push(node_uuid);
            }
        }
    }
}

/// Something that can declare the results it saves
pub trait ProducesResults {
    /// Report each result this item can save when run as part of `node`
    fn results(&self, _node: &Node, _include: &mut dyn FnMut(ResultInfo)) {}
}

/// Convert a result name to its key, e.g. `Favorite Color` to `favorite_color`
pub fn snakify(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            key.extend(c.to_lowercase());
        } else if !key.is_empty() && !key.ends_with('_') {
            key.push('_');
        }
    }
    while key.ends_with('_') {
        key.pop();
    }
    key
}

/// All results a flow can save, merged by key in order of first appearance
pub fn flow_results(flow: &Flow) -> Vec<ResultInfo> {
    let mut merged: Vec<ResultInfo> = Vec::new();
    let mut include = |info: ResultInfo| match merged.iter_mut().find(|r| r.key == info.key) {
        Some(existing) => existing.merge(info),
        None => merged.push(info),
    };

    for node in flow.nodes() {
        for action in node.actions() {
            action.results(node, &mut include);
        }
        if let Some(router) = node.router() {
            router.results(node, &mut include);
        }
    }

    merged
}

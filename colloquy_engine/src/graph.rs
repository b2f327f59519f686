//! The dialogue graph: every node of one piece of content, addressable by id.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::Value;
use crate::error::GraphError;
use crate::node::{DialogueNode, NodeId};

/// Immutable set of dialogue nodes plus the entry id and declared variables.
///
/// Declaration order of nodes is kept so a graph serializes back the way it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueGraph {
    title: String,
    entry: NodeId,
    variables: BTreeMap<String, Value>,
    nodes: HashMap<NodeId, DialogueNode>,
    order: Vec<NodeId>,
}

impl DialogueGraph {
    /// Build a graph from nodes. References are not checked here; content coming
    /// from files goes through `colloquy_data::validate_graph` first.
    pub fn from_nodes(entry: impl Into<NodeId>, nodes: impl IntoIterator<Item = DialogueNode>) -> Self {
        let mut graph = Self {
            title: String::new(),
            entry: entry.into(),
            variables: BTreeMap::new(),
            nodes: HashMap::new(),
            order: Vec::new(),
        };
        for node in nodes {
            if !graph.nodes.contains_key(&node.id) {
                graph.order.push(node.id.clone());
            }
            graph.nodes.insert(node.id.clone(), node);
        }
        graph
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_variables(mut self, variables: BTreeMap<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Variables the content declares, with their starting values.
    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    /// Look up a node by id.
    ///
    /// # Errors
    /// `GraphError::NodeNotFound` if no node has this id.
    pub fn resolve(&self, id: &str) -> Result<&DialogueNode, GraphError> {
        self.nodes
            .get(id)
            .ok_or_else(|| GraphError::NodeNotFound { id: id.to_string() })
    }

    /// # Errors
    /// `GraphError::NodeNotFound` if the entry id is dangling.
    pub fn entry_node(&self) -> Result<&DialogueNode, GraphError> {
        self.resolve(&self.entry)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &DialogueNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids reachable from the entry via branch, choice and `next` edges, breadth first.
    pub fn reachable_ids(&self) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([self.entry.as_str()]);
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if !seen.insert(id) {
                continue;
            }
            order.push(node.id.clone());
            queue.extend(node.branches.iter().map(|b| b.target.as_str()));
            queue.extend(node.choices.iter().filter_map(|c| c.target.as_deref()));
            queue.extend(node.next.as_deref());
        }
        order
    }
}

//! Cross-thread scene change requests
//!
//! Other threads never touch the node tree. They queue requests here and the
//! scene applies them at the start of its next frame.

use std::sync::{Arc, Mutex, PoisonError};

use super::node::NodeId;
use super::visitors::NodeBlueprint;

/// Deferred change to a scene
#[derive(Debug)]
pub enum NodeAction {
    /// Attach `child` under `parent`
    Insert {
        /// New parent
        parent: NodeId,
        /// Node to attach
        child: NodeId,
    },
    /// Detach `child` from `parent`
    Remove {
        /// Current parent
        parent: NodeId,
        /// Node to detach
        child: NodeId,
    },
    /// Change the active flag of a node
    SetActive {
        /// Node to change
        node: NodeId,
        /// New state
        active: bool,
    },
    /// Build a subtree from a blueprint and attach it under `parent`
    Instantiate {
        /// New parent
        parent: NodeId,
        /// Subtree to build
        blueprint: NodeBlueprint,
    },
    /// Destroy a node and its subtree
    Destroy(NodeId),
}

/// Cloneable handle to a scene's pending actions
#[derive(Debug, Clone, Default)]
pub struct AsyncNodeQueue {
    actions: Arc<Mutex<Vec<NodeAction>>>,
}

impl AsyncNodeQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an arbitrary action
    pub fn push(&self, action: NodeAction) {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
    }

    /// Queue attaching `child` under `parent`
    pub fn insert_node(&self, parent: NodeId, child: NodeId) {
        self.push(NodeAction::Insert { parent, child });
    }

    /// Queue detaching `child` from `parent`
    pub fn remove_node(&self, parent: NodeId, child: NodeId) {
        self.push(NodeAction::Remove { parent, child });
    }

    /// Queue an active flag change
    pub fn set_active(&self, node: NodeId, active: bool) {
        self.push(NodeAction::SetActive { node, active });
    }

    /// Queue building `blueprint` under `parent`
    pub fn instantiate(&self, parent: NodeId, blueprint: NodeBlueprint) {
        self.push(NodeAction::Instantiate { parent, blueprint });
    }

    /// Queue destroying a node
    pub fn destroy(&self, node: NodeId) {
        self.push(NodeAction::Destroy(node));
    }

    /// Number of pending actions
    pub fn len(&self) -> usize {
        self.actions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn drain(&self) -> Vec<NodeAction> {
        std::mem::take(&mut *self.actions.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

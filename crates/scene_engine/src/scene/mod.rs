//! Scene graph
//!
//! A hierarchy of typed nodes with active/inactive child lists, dirty-flagged
//! transform propagation and an octree over the bounding spheres of all
//! meshes that are part of the scene.

pub mod actions;
pub mod node;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod tree;
pub mod visitors;

pub use actions::{AsyncNodeQueue, NodeAction};
pub use node::{
    model_channel, LightData, LodSwitchData, LodThreshold, MeshData, ModelLoader, ModelState, Node, NodeData,
    NodeFlags, NodeId, NodeKind, NodeType,
};
pub use scene::Scene;
pub use tree::NodeTree;
pub use visitors::{BlueprintNode, BoundsVisitor, CopyVisitor, FindByNameVisitor, NodeBlueprint, PrintVisitor};

/// Scene graph errors
///
/// Every error leaves the scene unchanged.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// No node with this id exists in the scene
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),

    /// The node already has a parent
    #[error("node {0} already has a parent")]
    AlreadyChild(NodeId),

    /// The node would become its own ancestor
    #[error("attaching {child} under {parent} would create a cycle")]
    Cycle {
        /// Requested parent
        parent: NodeId,
        /// Requested child
        child: NodeId,
    },

    /// The node is not a child of the given parent
    #[error("node {0} is not a child of the given parent")]
    NotAChild(NodeId),

    /// The operation is not allowed on the scene root
    #[error("operation not allowed on the scene root")]
    RootNode,

    /// The operation needs a different node type
    #[error("node {id} is a {actual:?}, expected {expected:?}")]
    WrongType {
        /// Node that was passed
        id: NodeId,
        /// Type the operation works on
        expected: NodeType,
        /// Type of the node
        actual: NodeType,
    },

    /// A blueprint without entries
    #[error("blueprint is empty")]
    EmptyBlueprint,

    /// Rejected configuration
    #[error("invalid scene configuration: {0}")]
    InvalidConfig(String),
}

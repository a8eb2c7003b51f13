//! Scene graph nodes
//!
//! A node is a plain record in the scene's node arena. Per-type behaviour is
//! selected by matching on [`NodeData`], which carries the payload of the
//! concrete node type.

use std::fmt;
use std::sync::mpsc;

use bitflags::bitflags;

use super::visitors::NodeBlueprint;
use crate::foundation::math::{Mat4, Transform, Vec3};
use crate::spatial::Sphere;

/// Unique node identifier within a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Coarse node category used for fast dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Organizational node without spatial meaning
    Node,
    /// Node that gets drawn
    Renderable,
    /// Drawn node with a bounding volume tracked by the octree
    Volume,
    /// Node backed by a physics body
    Physics,
    /// Light source
    Light,
    /// Camera
    Camera,
    /// Node contributing a local transform to its subtree
    Transformation,
    /// Audio source or listener
    Audio,
}

/// Concrete node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// Plain grouping node
    Node,
    /// Local transformation
    Transform,
    /// Camera
    Camera,
    /// Light source
    Light,
    /// Mesh with a bounding sphere
    Mesh,
    /// Renderable without bounds
    Render,
    /// Keeps exactly one child active
    Switch,
    /// Position the LOD switches measure distance to
    LodTrigger,
    /// Activates children by distance to LOD triggers
    LodSwitch,
    /// Particle emitter
    Emitter,
    /// Placeholder for an asynchronously loaded subtree
    Model,
    /// Physics body
    Physics,
    /// Audio source
    AudioSource,
    /// Audio listener
    AudioListener,
}

impl NodeType {
    /// Category of this node type
    pub fn kind(self) -> NodeKind {
        match self {
            Self::Node | Self::Switch | Self::LodTrigger | Self::LodSwitch | Self::Emitter | Self::Model => {
                NodeKind::Node
            }
            Self::Transform => NodeKind::Transformation,
            Self::Camera => NodeKind::Camera,
            Self::Light => NodeKind::Light,
            Self::Mesh => NodeKind::Volume,
            Self::Render => NodeKind::Renderable,
            Self::Physics => NodeKind::Physics,
            Self::AudioSource | Self::AudioListener => NodeKind::Audio,
        }
    }

    /// Name used when printing trees
    pub fn name(self) -> &'static str {
        match self {
            Self::Node => "Node",
            Self::Transform => "Transform",
            Self::Camera => "Camera",
            Self::Light => "Light",
            Self::Mesh => "Mesh",
            Self::Render => "Render",
            Self::Switch => "Switch",
            Self::LodTrigger => "LodTrigger",
            Self::LodSwitch => "LodSwitch",
            Self::Emitter => "Emitter",
            Self::Model => "Model",
            Self::Physics => "Physics",
            Self::AudioSource => "AudioSource",
            Self::AudioListener => "AudioListener",
        }
    }
}

bitflags! {
    /// Node state bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// Node sits in its parent's active children
        const ACTIVE = 1 << 0;
        /// Cached world state is stale
        const TRANSFORM_DIRTY = 1 << 1;
        /// Node is registered with the scene
        const IN_SCENE = 1 << 2;
        /// Node waits in the data update queue
        const DATA_DIRTY = 1 << 3;
    }
}

/// Mesh payload
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    /// Bounding sphere in local space
    pub local_sphere: Sphere,
    /// Bounding sphere after the last transform update
    pub world_sphere: Sphere,
    /// World matrix from the last transform update
    pub world: Mat4,
    /// Material name handed to the renderer
    pub material: Option<String>,
}

impl MeshData {
    /// Mesh with the given local bounds
    pub fn new(local_sphere: Sphere) -> Self {
        Self {
            local_sphere,
            world_sphere: local_sphere,
            world: Mat4::identity(),
            material: None,
        }
    }

    /// Set the material
    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = Some(material.into());
        self
    }
}

/// Light payload
#[derive(Debug, Clone, PartialEq)]
pub struct LightData {
    /// Light color
    pub color: Vec3,
    /// Light intensity
    pub intensity: f32,
    /// World matrix from the last transform update
    pub world: Mat4,
}

impl Default for LightData {
    fn default() -> Self {
        Self {
            color: Vec3::new(1.0, 1.0, 1.0),
            intensity: 1.0,
            world: Mat4::identity(),
        }
    }
}

/// Distance band in which a LOD level is active, `min <= distance < max`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodThreshold {
    /// Closest distance the level is shown at
    pub min: f32,
    /// Distance from which the level is hidden
    pub max: f32,
}

/// LOD switch payload
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LodSwitchData {
    /// Triggers this switch reacts to
    pub triggers: Vec<NodeId>,
    /// Distance band per child
    pub thresholds: Vec<(NodeId, LodThreshold)>,
    /// World position from the last transform update
    pub world_position: Vec3,
}

/// Load state of a model node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    /// Waiting for the loader
    Pending,
    /// Loaded subtree was attached
    Loaded,
    /// Loader reported an error or went away
    Failed,
}

/// Result a loader delivers for a model node
pub type ModelResult = Result<NodeBlueprint, String>;

/// Main thread end of a model load
#[derive(Debug)]
pub struct ModelTicket {
    receiver: mpsc::Receiver<ModelResult>,
}

impl ModelTicket {
    pub(crate) fn poll(&self) -> Option<Result<NodeBlueprint, String>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => {
                Some(Err("model loader went away without a result".to_string()))
            }
        }
    }
}

/// Worker end of a model load
///
/// The worker builds an inert [`NodeBlueprint`] and hands it over; the scene
/// attaches it on the main thread while processing its data update queue.
#[derive(Debug, Clone)]
pub struct ModelLoader {
    sender: mpsc::Sender<ModelResult>,
}

impl ModelLoader {
    /// Deliver the loaded subtree
    pub fn complete(self, blueprint: NodeBlueprint) {
        if self.sender.send(Ok(blueprint)).is_err() {
            log::warn!("Model finished loading after its node was destroyed");
        }
    }

    /// Report a load failure
    pub fn fail(self, reason: impl Into<String>) {
        if self.sender.send(Err(reason.into())).is_err() {
            log::warn!("Model failed loading after its node was destroyed");
        }
    }
}

/// Create the two ends of a model load
pub fn model_channel() -> (ModelLoader, ModelTicket) {
    let (sender, receiver) = mpsc::channel();
    (ModelLoader { sender }, ModelTicket { receiver })
}

/// Model payload
#[derive(Debug)]
pub struct ModelData {
    /// Asset the model is loaded from
    pub source: String,
    /// Current load state
    pub state: ModelState,
    pub(crate) ticket: Option<ModelTicket>,
}

/// Per-type node payload
#[derive(Debug)]
pub enum NodeData {
    /// Plain grouping node
    Node,
    /// Local transformation, the world matrix is never stored
    Transform(Transform),
    /// Camera world matrix
    Camera(Mat4),
    /// Light source
    Light(LightData),
    /// Mesh with bounds
    Mesh(MeshData),
    /// Renderable world matrix and material
    Render {
        /// World matrix from the last transform update
        world: Mat4,
        /// Material name
        material: Option<String>,
    },
    /// Switch node
    Switch,
    /// LOD trigger world position
    LodTrigger(Vec3),
    /// LOD switch
    LodSwitch(LodSwitchData),
    /// Emitter world matrix
    Emitter(Mat4),
    /// Model placeholder
    Model(ModelData),
    /// Physics body world matrix
    Physics(Mat4),
    /// Audio source world matrix
    AudioSource(Mat4),
    /// Audio listener world matrix
    AudioListener(Mat4),
}

impl NodeData {
    /// Concrete type of this payload
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Node => NodeType::Node,
            Self::Transform(_) => NodeType::Transform,
            Self::Camera(_) => NodeType::Camera,
            Self::Light(_) => NodeType::Light,
            Self::Mesh(_) => NodeType::Mesh,
            Self::Render { .. } => NodeType::Render,
            Self::Switch => NodeType::Switch,
            Self::LodTrigger(_) => NodeType::LodTrigger,
            Self::LodSwitch(_) => NodeType::LodSwitch,
            Self::Emitter(_) => NodeType::Emitter,
            Self::Model(_) => NodeType::Model,
            Self::Physics(_) => NodeType::Physics,
            Self::AudioSource(_) => NodeType::AudioSource,
            Self::AudioListener(_) => NodeType::AudioListener,
        }
    }

    /// Default payload for a node type
    pub fn for_type(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Node => Self::Node,
            NodeType::Transform => Self::Transform(Transform::identity()),
            NodeType::Camera => Self::Camera(Mat4::identity()),
            NodeType::Light => Self::Light(LightData::default()),
            NodeType::Mesh => Self::Mesh(MeshData::new(Sphere::new(Vec3::zeros(), 1.0))),
            NodeType::Render => Self::Render { world: Mat4::identity(), material: None },
            NodeType::Switch => Self::Switch,
            NodeType::LodTrigger => Self::LodTrigger(Vec3::zeros()),
            NodeType::LodSwitch => Self::LodSwitch(LodSwitchData::default()),
            NodeType::Emitter => Self::Emitter(Mat4::identity()),
            NodeType::Model => Self::Model(ModelData {
                source: String::new(),
                state: ModelState::Pending,
                ticket: None,
            }),
            NodeType::Physics => Self::Physics(Mat4::identity()),
            NodeType::AudioSource => Self::AudioSource(Mat4::identity()),
            NodeType::AudioListener => Self::AudioListener(Mat4::identity()),
        }
    }

    /// Copy of the payload for a cloned node
    ///
    /// A pending model load stays with the original node, the copy ends up
    /// with the same source but no loader attached.
    pub fn duplicate(&self) -> Self {
        match self {
            Self::Node => Self::Node,
            Self::Transform(transform) => Self::Transform(transform.clone()),
            Self::Camera(world) => Self::Camera(*world),
            Self::Light(light) => Self::Light(light.clone()),
            Self::Mesh(mesh) => Self::Mesh(mesh.clone()),
            Self::Render { world, material } => Self::Render {
                world: *world,
                material: material.clone(),
            },
            Self::Switch => Self::Switch,
            Self::LodTrigger(position) => Self::LodTrigger(*position),
            Self::LodSwitch(lod) => Self::LodSwitch(lod.clone()),
            Self::Emitter(world) => Self::Emitter(*world),
            Self::Model(model) => Self::Model(ModelData {
                source: model.source.clone(),
                state: model.state,
                ticket: None,
            }),
            Self::Physics(world) => Self::Physics(*world),
            Self::AudioSource(world) => Self::AudioSource(*world),
            Self::AudioListener(world) => Self::AudioListener(*world),
        }
    }
}

/// Scene graph element
#[derive(Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) data: NodeData,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) inactive_children: Vec<NodeId>,
    pub(crate) flags: NodeFlags,
}

impl Node {
    pub(crate) fn new(id: NodeId, name: String, data: NodeData) -> Self {
        Self {
            id,
            name,
            data,
            parent: None,
            children: Vec::new(),
            inactive_children: Vec::new(),
            flags: NodeFlags::ACTIVE | NodeFlags::TRANSFORM_DIRTY,
        }
    }

    /// Node identifier
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Node name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Concrete type
    pub fn node_type(&self) -> NodeType {
        self.data.node_type()
    }

    /// Category
    pub fn kind(&self) -> NodeKind {
        self.node_type().kind()
    }

    /// Type specific payload
    pub fn data(&self) -> &NodeData {
        &self.data
    }

    /// Parent, `None` for roots and detached nodes
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Active children in insertion order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Inactive children in insertion order
    pub fn inactive_children(&self) -> &[NodeId] {
        &self.inactive_children
    }

    /// State bits
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    /// Whether the node is active
    pub fn is_active(&self) -> bool {
        self.flags.contains(NodeFlags::ACTIVE)
    }

    /// Whether the cached world state is stale
    pub fn is_transform_dirty(&self) -> bool {
        self.flags.contains(NodeFlags::TRANSFORM_DIRTY)
    }

    /// Whether the node is registered with its scene
    pub fn is_in_scene(&self) -> bool {
        self.flags.contains(NodeFlags::IN_SCENE)
    }

    /// World matrix received from the last transform update, if the node
    /// type keeps one
    pub fn world_matrix(&self) -> Option<Mat4> {
        match &self.data {
            NodeData::Camera(world)
            | NodeData::Emitter(world)
            | NodeData::Physics(world)
            | NodeData::AudioSource(world)
            | NodeData::AudioListener(world)
            | NodeData::Render { world, .. } => Some(*world),
            NodeData::Light(light) => Some(light.world),
            NodeData::Mesh(mesh) => Some(mesh.world),
            _ => None,
        }
    }
}

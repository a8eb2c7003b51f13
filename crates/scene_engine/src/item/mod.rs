//! Item tree
//!
//! Generic hierarchical key/value tree used to mirror scene state to tools.
//! Items are addressed by slash separated paths of child names.

mod export;

pub use export::ItemExportVisitor;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Value stored under a key of an [`Item`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemValue {
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Text
    Text(String),
    /// Float vector, positions and colors among others
    Vector(Vec<f32>),
}

impl From<bool> for ItemValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ItemValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ItemValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ItemValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ItemValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<f32>> for ItemValue {
    fn from(value: Vec<f32>) -> Self {
        Self::Vector(value)
    }
}

/// Path of child names below an item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ItemPath {
    segments: Vec<String>,
}

impl ItemPath {
    /// Empty path, resolving to the item itself
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a child name
    pub fn push(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }

    /// Path with `segment` appended
    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.push(segment);
        path
    }

    /// Path without its last segment, `None` for the empty path
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            segments: rest.to_vec(),
        })
    }

    /// Child names in order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether the path has no segments
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl FromStr for ItemPath {
    type Err = std::convert::Infallible;

    /// Empty segments are skipped, so leading, trailing and doubled slashes
    /// make no difference
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            segments: text
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }
}

impl From<&str> for ItemPath {
    fn from(text: &str) -> Self {
        match text.parse() {
            Ok(path) => path,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Named node holding values and child items
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Item {
    /// Item name, unique among its siblings by convention
    pub name: String,
    /// Values by key
    #[serde(default)]
    pub values: BTreeMap<String, ItemValue>,
    /// Child items
    #[serde(default)]
    pub children: Vec<Item>,
}

impl Item {
    /// Empty item
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set a value, returning the previous one
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ItemValue>) -> Option<ItemValue> {
        self.values.insert(key.into(), value.into())
    }

    /// Value under `key`
    pub fn get(&self, key: &str) -> Option<&ItemValue> {
        self.values.get(key)
    }

    /// Add a child, returns it for further filling
    pub fn add_child(&mut self, child: Item) -> &mut Item {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// First child called `name`
    pub fn child(&self, name: &str) -> Option<&Item> {
        self.children.iter().find(|child| child.name == name)
    }

    /// First child called `name`
    pub fn child_mut(&mut self, name: &str) -> Option<&mut Item> {
        self.children.iter_mut().find(|child| child.name == name)
    }

    /// Item at `path` below this one
    pub fn resolve(&self, path: &ItemPath) -> Option<&Item> {
        path.segments()
            .iter()
            .try_fold(self, |item, segment| item.child(segment))
    }

    /// Item at `path` below this one
    pub fn resolve_mut(&mut self, path: &ItemPath) -> Option<&mut Item> {
        let mut item = self;
        for segment in path.segments() {
            item = item.child_mut(segment)?;
        }
        Some(item)
    }

    /// Number of items in this subtree, this one included
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Item::count).sum::<usize>()
    }

    /// Pretty RON text of this subtree
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Parse a subtree from RON text
    pub fn from_ron(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }
}

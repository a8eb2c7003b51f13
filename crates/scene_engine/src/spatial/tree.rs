//! Generic spatial partitioning tree
//!
//! One implementation serves both the octree and the quadtree. Region nodes
//! live in a slotmap arena; each tracked object remembers the region that
//! holds it so updates and removals never search the tree.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use super::filter::Filter;
use super::region::Region;
use crate::config::ConfigError;
use crate::foundation::collections::{RegionArena, RegionKey};

/// Configuration for spatial tree behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialIndexConfig {
    /// Maximum objects stored directly in a node before it subdivides
    pub split_threshold: usize,

    /// Maximum subdivision depth (root is depth 0)
    pub max_depth: u32,

    /// Regions whose children would get an edge shorter than this never split
    pub min_node_size: f32,

    /// Children are folded back into their parent once the subtree holds at
    /// most this many objects, `0` disables merging
    pub merge_threshold: usize,
}

impl Default for SpatialIndexConfig {
    fn default() -> Self {
        Self {
            split_threshold: 16,
            max_depth: 8,
            min_node_size: 1.0,
            merge_threshold: 4,
        }
    }
}

impl SpatialIndexConfig {
    /// Set the split threshold
    pub fn with_split_threshold(mut self, split_threshold: usize) -> Self {
        self.split_threshold = split_threshold;
        self
    }

    /// Set the maximum depth
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum node size
    pub fn with_min_node_size(mut self, min_node_size: f32) -> Self {
        self.min_node_size = min_node_size;
        self
    }

    /// Set the merge threshold
    pub fn with_merge_threshold(mut self, merge_threshold: usize) -> Self {
        self.merge_threshold = merge_threshold;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.split_threshold == 0 {
            return Err(ConfigError::Invalid("split threshold must be at least 1".to_string()));
        }
        if !(self.min_node_size.is_finite() && self.min_node_size >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "min node size must be a non-negative number, got {}",
                self.min_node_size
            )));
        }
        if self.merge_threshold > self.split_threshold {
            return Err(ConfigError::Invalid(format!(
                "merge threshold {} exceeds split threshold {}",
                self.merge_threshold, self.split_threshold
            )));
        }
        Ok(())
    }
}

/// Spatial index errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SpatialError {
    /// The key is already tracked
    #[error("object {0} is already in the spatial index")]
    AlreadyPresent(String),

    /// The key is not tracked
    #[error("object {0} is not in the spatial index")]
    NotFound(String),
}

#[derive(Debug)]
struct RegionNode<R, K> {
    region: R,
    depth: u32,
    parent: Option<RegionKey>,
    /// Empty for leaves, `R::FAN_OUT` entries otherwise
    children: Vec<RegionKey>,
    objects: Vec<K>,
}

impl<R, K> RegionNode<R, K> {
    fn new(region: R, depth: u32, parent: Option<RegionKey>) -> Self {
        Self {
            region,
            depth,
            parent,
            children: Vec::new(),
            objects: Vec::new(),
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct ObjectEntry<V> {
    region: RegionKey,
    volume: V,
}

/// Hierarchical bounded-volume index over movable objects
///
/// The tree only stores keys. Whoever owns the object (a scene node, an
/// entity component) keeps the object itself and pushes bounds changes in
/// through [`update`](Self::update).
///
/// Objects sit at the deepest region that fully contains their volume.
/// Regions split lazily once they hold more than
/// [`SpatialIndexConfig::split_threshold`] objects and fold their children
/// back in on removal when the subtree becomes sparse.
#[derive(Debug)]
pub struct SpatialTree<R: Region, K> {
    config: SpatialIndexConfig,
    regions: RegionArena<RegionNode<R, K>>,
    root: RegionKey,
    objects: HashMap<K, ObjectEntry<R::Volume>>,
}

impl<R, K> SpatialTree<R, K>
where
    R: Region,
    K: Copy + Eq + Hash + fmt::Debug,
{
    /// Create an empty tree covering `root_region`
    pub fn new(root_region: R, config: SpatialIndexConfig) -> Self {
        let mut regions = RegionArena::with_key();
        let root = regions.insert(RegionNode::new(root_region, 0, None));

        Self {
            config,
            regions,
            root,
            objects: HashMap::new(),
        }
    }

    /// Region covered by the whole tree
    pub fn root_region(&self) -> R {
        self.regions[self.root].region
    }

    /// Active configuration
    pub fn config(&self) -> &SpatialIndexConfig {
        &self.config
    }

    /// Start tracking `key` with the given bounding volume
    pub fn insert(&mut self, key: K, volume: R::Volume) -> Result<(), SpatialError> {
        if self.objects.contains_key(&key) {
            log::error!("Spatial insert of {key:?} ignored, it is already tracked");
            return Err(SpatialError::AlreadyPresent(format!("{key:?}")));
        }

        if !self.regions[self.root].region.contains(&volume) {
            log::warn!("Volume {volume:?} of {key:?} exceeds the spatial index bounds, keeping it at the root");
        }

        self.insert_from(self.root, key, volume);
        Ok(())
    }

    /// Replace the stored bounding volume of `key`
    ///
    /// Stays in place while the current region still contains the volume.
    /// Otherwise the object climbs to the first ancestor that does and
    /// descends again from there.
    pub fn update(&mut self, key: K, volume: R::Volume) -> Result<(), SpatialError> {
        let Some(entry) = self.objects.get_mut(&key) else {
            log::error!("Spatial update of {key:?} ignored, it is not tracked");
            return Err(SpatialError::NotFound(format!("{key:?}")));
        };

        let current = entry.region;
        if self.regions[current].region.contains(&volume) {
            entry.volume = volume;
            return Ok(());
        }

        let mut ancestor = current;
        while let Some(parent) = self.regions[ancestor].parent {
            ancestor = parent;
            if self.regions[ancestor].region.contains(&volume) {
                break;
            }
        }

        if !self.regions[ancestor].region.contains(&volume) {
            log::warn!("Volume {volume:?} of {key:?} exceeds the spatial index bounds, keeping it at the root");
        }

        if ancestor == current {
            entry.volume = volume;
            return Ok(());
        }

        self.objects.remove(&key);
        self.detach(current, key);
        self.insert_from(ancestor, key, volume);
        self.merge_after_removal(current);
        Ok(())
    }

    /// Stop tracking `key`, returning its last volume
    pub fn remove(&mut self, key: K) -> Result<R::Volume, SpatialError> {
        let Some(entry) = self.objects.remove(&key) else {
            log::error!("Spatial remove of {key:?} ignored, it is not tracked");
            return Err(SpatialError::NotFound(format!("{key:?}")));
        };

        self.detach(entry.region, key);
        self.merge_after_removal(entry.region);

        Ok(entry.volume)
    }

    /// Stored volume of `key`
    pub fn get(&self, key: K) -> Option<R::Volume> {
        self.objects.get(&key).map(|entry| entry.volume)
    }

    /// Whether `key` is tracked
    pub fn contains(&self, key: K) -> bool {
        self.objects.contains_key(&key)
    }

    /// Number of tracked objects
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of regions, including the root
    pub fn node_count(&self) -> usize {
        self.regions.len()
    }

    /// Depth of the deepest region
    pub fn depth(&self) -> u32 {
        self.regions.values().map(|node| node.depth).max().unwrap_or(0)
    }

    /// Depth of the region holding `key`
    pub fn depth_of(&self, key: K) -> Option<u32> {
        self.objects.get(&key).map(|entry| self.regions[entry.region].depth)
    }

    /// Drop every object and collapse the tree to its root
    pub fn clear(&mut self) {
        let root_region = self.root_region();
        self.regions.clear();
        self.objects.clear();
        self.root = self.regions.insert(RegionNode::new(root_region, 0, None));
    }

    /// Visit every region with its depth and the number of objects it holds
    /// directly, parents before children
    pub fn for_each_region(&self, mut f: impl FnMut(&R, u32, usize)) {
        let mut stack = vec![self.root];
        while let Some(key) = stack.pop() {
            let node = &self.regions[key];
            f(&node.region, node.depth, node.objects.len());
            stack.extend(node.children.iter().rev());
        }
    }

    /// Append every object whose volume intersects `filter` to `result`
    pub fn query<F: Filter<R>>(&self, filter: &F, result: &mut Vec<K>) {
        let mut stack = Vec::new();
        self.query_with(std::slice::from_ref(filter), &mut stack, result);
    }

    /// Append every object whose volume intersects all `filters` to `result`
    ///
    /// `stack` is scratch space, callers that query every frame keep it
    /// around to avoid reallocating.
    pub(crate) fn query_with<F: Filter<R>>(
        &self,
        filters: &[F],
        stack: &mut Vec<RegionKey>,
        result: &mut Vec<K>,
    ) {
        stack.clear();
        // The root is always visited, it also holds out of bounds objects
        stack.push(self.root);

        while let Some(key) = stack.pop() {
            let node = &self.regions[key];

            for object in &node.objects {
                if let Some(entry) = self.objects.get(object) {
                    if filters.iter().all(|filter| filter.intersects_volume(&entry.volume)) {
                        result.push(*object);
                    }
                }
            }

            for child in node.children.iter().rev() {
                let region = &self.regions[*child].region;
                if filters.iter().all(|filter| filter.intersects_region(region)) {
                    stack.push(*child);
                }
            }
        }
    }

    fn insert_from(&mut self, start: RegionKey, key: K, volume: R::Volume) {
        let mut current = start;
        loop {
            let node = &self.regions[current];
            if node.is_leaf() {
                break;
            }

            let child = node.children[node.region.child_index(&volume)];
            if !self.regions[child].region.contains(&volume) {
                break;
            }
            current = child;
        }

        self.regions[current].objects.push(key);
        self.objects.insert(key, ObjectEntry { region: current, volume });
        self.try_split(current);
    }

    fn detach(&mut self, region: RegionKey, key: K) {
        let objects = &mut self.regions[region].objects;
        if let Some(position) = objects.iter().position(|object| *object == key) {
            objects.swap_remove(position);
        }
    }

    fn try_split(&mut self, key: RegionKey) {
        let node = &self.regions[key];
        let should_split = node.is_leaf()
            && node.objects.len() > self.config.split_threshold
            && node.depth < self.config.max_depth
            && node.region.edge_length() * 0.5 >= self.config.min_node_size;
        if !should_split {
            return;
        }

        let region = node.region;
        let depth = node.depth;
        let children: Vec<RegionKey> = (0..R::FAN_OUT)
            .map(|index| {
                self.regions
                    .insert(RegionNode::new(region.child(index), depth + 1, Some(key)))
            })
            .collect();

        // Redistribute objects that fit a child, the rest stay here
        let objects = std::mem::take(&mut self.regions[key].objects);
        let mut kept = Vec::new();
        for object in objects {
            let Some(entry) = self.objects.get_mut(&object) else {
                continue;
            };
            let child = children[region.child_index(&entry.volume)];
            if self.regions[child].region.contains(&entry.volume) {
                entry.region = child;
                self.regions[child].objects.push(object);
            } else {
                kept.push(object);
            }
        }

        let node = &mut self.regions[key];
        node.objects = kept;
        node.children.clone_from(&children);

        for child in children {
            self.try_split(child);
        }
    }

    /// Merge upwards from the region an object just left
    fn merge_after_removal(&mut self, region: RegionKey) {
        let Some(node) = self.regions.get(region) else {
            return;
        };
        let start = if node.is_leaf() { node.parent } else { Some(region) };
        if let Some(start) = start {
            self.try_merge(start);
        }
    }

    fn try_merge(&mut self, start: RegionKey) {
        if self.config.merge_threshold == 0 {
            return;
        }

        let mut key = start;
        loop {
            let node = &self.regions[key];
            if node.is_leaf() {
                return;
            }

            let mut total = node.objects.len();
            for child in &node.children {
                let child = &self.regions[*child];
                if !child.is_leaf() {
                    return;
                }
                total += child.objects.len();
            }
            if total > self.config.merge_threshold {
                return;
            }

            let children = std::mem::take(&mut self.regions[key].children);
            for child in children {
                let Some(child_node) = self.regions.remove(child) else {
                    continue;
                };
                for object in child_node.objects {
                    if let Some(entry) = self.objects.get_mut(&object) {
                        entry.region = key;
                    }
                    self.regions[key].objects.push(object);
                }
            }

            match self.regions[key].parent {
                Some(parent) => key = parent,
                None => return,
            }
        }
    }
}

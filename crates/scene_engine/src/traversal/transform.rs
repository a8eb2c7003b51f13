//! Transform update pass
//!
//! Turns local transforms into world matrices in one top-down walk. A matrix
//! stack holds the accumulated matrix that was valid before descending into
//! each transform element; clean subtrees are pruned.

use super::{Hierarchy, TreeVisitor};
use crate::foundation::math::Mat4;

/// Hierarchy whose elements carry transform state
pub trait TransformHierarchy: Hierarchy {
    /// Whether the element contributes a local transform to its descendants
    fn is_transform(&self, id: Self::Id) -> bool;

    /// Whether the cached world state of the element is stale
    fn is_transform_dirty(&self, id: Self::Id) -> bool;

    /// Hand the accumulated parent matrix to the element
    ///
    /// Returns the matrix its children inherit. Transform elements combine
    /// their local transform, everything else stores the matrix and passes
    /// it on unchanged.
    fn update_transform(&mut self, id: Self::Id, parent_world: &Mat4) -> Mat4;

    /// Mark the element up to date
    fn clear_transform_dirty(&mut self, id: Self::Id);
}

/// Visitor recomputing world matrices of dirty elements
///
/// Relies on dirtiness being marked on every ancestor of a changed element,
/// so a clean element means a clean subtree.
#[derive(Debug)]
pub struct TransformUpdateVisitor<Id> {
    current: Mat4,
    stack: Vec<(Id, Mat4)>,
    visited: usize,
    updated: usize,
}

impl<Id> Default for TransformUpdateVisitor<Id> {
    fn default() -> Self {
        Self {
            current: Mat4::identity(),
            stack: Vec::new(),
            visited: 0,
            updated: 0,
        }
    }
}

impl<Id> TransformUpdateVisitor<Id> {
    /// Create a visitor
    pub fn new() -> Self {
        Self::default()
    }

    /// Elements entered by the last pass, pruned ones included
    pub fn visited_count(&self) -> usize {
        self.visited
    }

    /// Elements whose transform was recomputed by the last pass
    pub fn updated_count(&self) -> usize {
        self.updated
    }

    /// Whether every push of the last pass was matched by a pop
    pub fn is_balanced(&self) -> bool {
        self.stack.is_empty()
    }
}

impl<H> TreeVisitor<H> for TransformUpdateVisitor<H::Id>
where
    H: TransformHierarchy,
{
    fn pre_traverse(&mut self, _tree: &mut H) {
        self.current = Mat4::identity();
        self.stack.clear();
        self.visited = 0;
        self.updated = 0;
    }

    fn pre_order_visit(&mut self, tree: &mut H, id: H::Id) -> bool {
        self.visited += 1;

        let is_transform = tree.is_transform(id);
        if is_transform {
            self.stack.push((id, self.current));
        }

        if !tree.is_transform_dirty(id) {
            return false;
        }

        let world = tree.update_transform(id, &self.current);
        if is_transform {
            self.current = world;
        }
        tree.clear_transform_dirty(id);
        self.updated += 1;
        true
    }

    fn post_order_visit(&mut self, _tree: &mut H, id: H::Id) {
        if matches!(self.stack.last(), Some((top, _)) if *top == id) {
            if let Some((_, matrix)) = self.stack.pop() {
                self.current = matrix;
            }
        }
    }

    fn post_traverse(&mut self, _tree: &mut H) {
        if !self.stack.is_empty() {
            log::error!(
                "Transform pass finished with {} matrices left on the stack",
                self.stack.len()
            );
            self.stack.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{translation_of, Vec3};
    use crate::traversal::{traverse, TraversalMode};
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    struct Element {
        children: Vec<u32>,
        local: Option<Mat4>,
        world: Mat4,
        dirty: bool,
    }

    #[derive(Default)]
    struct Chain {
        elements: HashMap<u32, Element>,
    }

    impl Chain {
        fn add(&mut self, id: u32, parent: Option<u32>, local: Option<Mat4>) {
            self.elements.insert(id, Element { children: Vec::new(), local, world: Mat4::identity(), dirty: true });
            if let Some(parent) = parent {
                if let Some(element) = self.elements.get_mut(&parent) {
                    element.children.push(id);
                }
            }
        }
    }

    impl Hierarchy for Chain {
        type Id = u32;

        fn contains(&self, id: u32) -> bool {
            self.elements.contains_key(&id)
        }

        fn collect_children(&self, id: u32, _mode: TraversalMode, out: &mut Vec<u32>) {
            if let Some(element) = self.elements.get(&id) {
                out.extend(&element.children);
            }
        }
    }

    impl TransformHierarchy for Chain {
        fn is_transform(&self, id: u32) -> bool {
            self.elements.get(&id).is_some_and(|e| e.local.is_some())
        }

        fn is_transform_dirty(&self, id: u32) -> bool {
            self.elements.get(&id).is_some_and(|e| e.dirty)
        }

        fn update_transform(&mut self, id: u32, parent_world: &Mat4) -> Mat4 {
            let Some(element) = self.elements.get_mut(&id) else {
                return *parent_world;
            };
            element.world = match element.local {
                Some(local) => parent_world * local,
                None => *parent_world,
            };
            element.world
        }

        fn clear_transform_dirty(&mut self, id: u32) {
            if let Some(element) = self.elements.get_mut(&id) {
                element.dirty = false;
            }
        }
    }

    fn step() -> Option<Mat4> {
        Some(Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0)))
    }

    #[test]
    fn test_chain_accumulates() {
        let mut chain = Chain::default();
        chain.add(1, None, step());
        chain.add(2, Some(1), step());
        chain.add(3, Some(2), step());
        chain.add(4, Some(3), None);
        // Sibling of 2, must not see 2's translation
        chain.add(5, Some(1), None);

        let mut visitor = TransformUpdateVisitor::new();
        traverse(&mut chain, 1, &mut visitor, TraversalMode::ActiveOnly);

        let world = |id: u32| translation_of(&chain.elements[&id].world);
        assert_relative_eq!(world(3), Vec3::new(3.0, 0.0, 0.0));
        assert_relative_eq!(world(4), Vec3::new(3.0, 0.0, 0.0));
        assert_relative_eq!(world(5), Vec3::new(1.0, 0.0, 0.0));
        assert!(visitor.is_balanced());
        assert_eq!(visitor.visited_count(), 5);
        assert_eq!(visitor.updated_count(), 5);
    }

    #[test]
    fn test_clean_subtrees_are_pruned() {
        let mut chain = Chain::default();
        chain.add(1, None, step());
        chain.add(2, Some(1), step());
        chain.add(3, Some(2), step());

        let mut visitor = TransformUpdateVisitor::new();
        traverse(&mut chain, 1, &mut visitor, TraversalMode::ActiveOnly);
        traverse(&mut chain, 1, &mut visitor, TraversalMode::ActiveOnly);

        assert_eq!(visitor.visited_count(), 1);
        assert_eq!(visitor.updated_count(), 0);
        assert!(visitor.is_balanced());
    }
}

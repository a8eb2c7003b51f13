//! Tree traversal framework
//!
//! One depth-first walk parametrized by a [`TreeVisitor`]. The scene graph and
//! the entity scene both implement [`Hierarchy`], so bounds computation,
//! printing, searching, copying and the transform update pass are written
//! once as visitors and run over either tree.
//!
//! The walk is iterative and snapshots a node's children when it enters the
//! node. Visitors may therefore add, remove or reparent nodes while walking.
//! A node removed before the walk reaches it is skipped.

pub mod transform;

pub use transform::{TransformHierarchy, TransformUpdateVisitor};

use std::fmt;

/// Which children a traversal descends into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalMode {
    /// Active children only
    #[default]
    ActiveOnly,
    /// Active children first, then inactive ones
    All,
}

/// Tree shaped structure a traversal can walk
pub trait Hierarchy {
    /// Identifier of a tree element
    type Id: Copy + Eq + fmt::Debug;

    /// Whether `id` names an element of this tree
    fn contains(&self, id: Self::Id) -> bool;

    /// Append the children of `id` to `out` in visiting order
    fn collect_children(&self, id: Self::Id, mode: TraversalMode, out: &mut Vec<Self::Id>);
}

impl<H: Hierarchy> Hierarchy for &H {
    type Id = H::Id;

    fn contains(&self, id: Self::Id) -> bool {
        (**self).contains(id)
    }

    fn collect_children(&self, id: Self::Id, mode: TraversalMode, out: &mut Vec<Self::Id>) {
        (**self).collect_children(id, mode, out);
    }
}

/// Strategy plugged into [`traverse`]
///
/// Read-only visitors implement `TreeVisitor<&T>` and are run with
/// `traverse(&mut &tree, ...)`.
pub trait TreeVisitor<H: Hierarchy> {
    /// Called once before the root is visited, resets accumulated state
    fn pre_traverse(&mut self, _tree: &mut H) {}

    /// Called when entering a node, returns whether to descend into its children
    fn pre_order_visit(&mut self, tree: &mut H, id: H::Id) -> bool;

    /// Called after the children of a node were processed
    ///
    /// Runs for every node whose `pre_order_visit` ran, including pruned ones,
    /// so anything pushed on entry can be popped here unconditionally.
    fn post_order_visit(&mut self, _tree: &mut H, _id: H::Id) {}

    /// Called once after the walk, used to finalize results and check invariants
    fn post_traverse(&mut self, _tree: &mut H) {}
}

enum Step<Id> {
    Enter(Id),
    Exit(Id),
}

/// Walk the subtree under `root` depth first
///
/// Children are visited in insertion order. With [`TraversalMode::All`] the
/// inactive children follow the active ones.
pub fn traverse<H, V>(tree: &mut H, root: H::Id, visitor: &mut V, mode: TraversalMode)
where
    H: Hierarchy,
    V: TreeVisitor<H> + ?Sized,
{
    visitor.pre_traverse(tree);

    if tree.contains(root) {
        let mut stack = vec![Step::Enter(root)];
        let mut children = Vec::new();

        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(id) => {
                    if !tree.contains(id) {
                        continue;
                    }

                    let descend = visitor.pre_order_visit(tree, id);
                    stack.push(Step::Exit(id));

                    if descend {
                        children.clear();
                        tree.collect_children(id, mode, &mut children);
                        stack.extend(children.iter().rev().map(|child| Step::Enter(*child)));
                    }
                }
                Step::Exit(id) => visitor.post_order_visit(tree, id),
            }
        }
    } else {
        log::error!("Traversal root {root:?} is not part of the tree");
    }

    visitor.post_traverse(tree);
}

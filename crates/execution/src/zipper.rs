//! Cursors over immutable trees.
//!
//! A [`NodeZipper`] is a node together with the chain of parents it was reached through. Replacing
//! the node and walking back up rebuilds only the ancestors on that chain; every other subtree is
//! shared with the original tree. A [`NodeMultiZipper`] commits several such edits against one
//! root, rebuilding each affected ancestor once.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::HashSet;

use crate::error::ZipperError;
use crate::result::ResultNodeData;
use crate::ResultNode;

/// A tree the zippers can walk and rebuild.
pub trait TreeNode: Clone {
    /// The direct children, in traversal order.
    fn children(&self) -> &[Self];

    /// A copy of this node with its children replaced.
    fn with_new_children(&self, children: Vec<Self>) -> Self;
}

/// One step from a node back toward the root.
#[derive(Clone, Debug, PartialEq)]
pub struct Breadcrumb<N> {
    parent: N,
    index: usize,
}

impl<N> Breadcrumb<N> {
    pub fn parent(&self) -> &N {
        &self.parent
    }

    /// The index of the child the path went through.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// A node and the breadcrumbs leading back to the root, nearest parent first.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeZipper<N> {
    current: N,
    breadcrumbs: Vec<Breadcrumb<N>>,
}

impl<N: TreeNode> NodeZipper<N> {
    /// A zipper on the root of a tree.
    pub fn root(node: N) -> Self {
        NodeZipper {
            current: node,
            breadcrumbs: Vec::new(),
        }
    }

    /// A zipper on the node reached from `root` through the child `indexes`.
    pub fn at(root: &N, indexes: &[usize]) -> Option<Self> {
        indexes
            .iter()
            .try_fold(NodeZipper::root(root.clone()), |zipper, index| {
                zipper.child(*index)
            })
    }

    /// Move down to a child of the current node.
    pub fn child(&self, index: usize) -> Option<Self> {
        let child = self.current.children().get(index)?.clone();
        let mut breadcrumbs = Vec::with_capacity(self.breadcrumbs.len() + 1);
        breadcrumbs.push(Breadcrumb {
            parent: self.current.clone(),
            index,
        });
        breadcrumbs.extend(self.breadcrumbs.iter().cloned());
        Some(NodeZipper {
            current: child,
            breadcrumbs,
        })
    }

    pub fn current(&self) -> &N {
        &self.current
    }

    pub fn breadcrumbs(&self) -> &[Breadcrumb<N>] {
        &self.breadcrumbs
    }

    /// The number of steps between the root and the current node.
    pub fn depth(&self) -> usize {
        self.breadcrumbs.len()
    }

    /// Child indexes from the root down to the current node.
    pub fn indexes(&self) -> Vec<usize> {
        self.breadcrumbs
            .iter()
            .rev()
            .map(|breadcrumb| breadcrumb.index)
            .collect()
    }

    /// The same position holding another node.
    pub fn with_new_node(&self, node: N) -> Self {
        NodeZipper {
            current: node,
            breadcrumbs: self.breadcrumbs.clone(),
        }
    }

    pub fn modify_node(&self, edit: impl FnOnce(&N) -> N) -> Self {
        self.with_new_node(edit(&self.current))
    }

    /// Rebuild the ancestors of the current node and return the new root.
    ///
    /// Fails when a breadcrumb no longer addresses a child of its parent.
    pub fn to_root(&self) -> Result<N, ZipperError> {
        self.breadcrumbs
            .iter()
            .try_fold(self.current.clone(), |node, breadcrumb| {
                replace_child(&breadcrumb.parent, breadcrumb.index, node)
            })
    }
}

impl NodeZipper<ResultNode> {
    /// Apply an edit to a copy of the current node.
    pub fn transform(&self, edit: impl FnOnce(&mut ResultNodeData)) -> Self {
        self.with_new_node(self.current.transform(edit))
    }
}

fn replace_child<N: TreeNode>(parent: &N, index: usize, child: N) -> Result<N, ZipperError> {
    let mut children = parent.children().to_vec();
    let slot = children
        .get_mut(index)
        .ok_or_else(|| ZipperError::InvalidBatch {
            reason: format!("breadcrumb index {index} is out of range"),
        })?;
    *slot = child;
    Ok(parent.with_new_children(children))
}

/// Order two zippers by position.
///
/// Shallower positions sort first. At equal depth the child indexes are compared from the root
/// toward the current node, and the first differing index decides. Two zippers at the same
/// position are equal when they hold equal nodes; holding different nodes means the set of
/// zippers being ordered is corrupt.
pub fn compare_zippers<N>(
    left: &NodeZipper<N>,
    right: &NodeZipper<N>,
) -> Result<Ordering, ZipperError>
where
    N: TreeNode + PartialEq,
{
    if left.breadcrumbs.len() != right.breadcrumbs.len() {
        return Ok(left.breadcrumbs.len().cmp(&right.breadcrumbs.len()));
    }
    for (l, r) in left.breadcrumbs.iter().rev().zip(right.breadcrumbs.iter().rev()) {
        if l.index != r.index {
            return Ok(l.index.cmp(&r.index));
        }
    }
    if left.current == right.current {
        Ok(Ordering::Equal)
    } else {
        Err(ZipperError::IncomparablePaths {
            indexes: left.indexes(),
        })
    }
}

/// Several zippers into one root, committed together.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeMultiZipper<N> {
    common_root: N,
    zippers: Vec<NodeZipper<N>>,
}

impl<N: TreeNode> NodeMultiZipper<N> {
    /// Every zipper must address a node of `common_root`, and no two zippers may address the
    /// same position.
    pub fn new(common_root: N, zippers: Vec<NodeZipper<N>>) -> Result<Self, ZipperError> {
        let mut positions = HashSet::with_capacity(zippers.len());
        for zipper in &zippers {
            let indexes = zipper.indexes();
            if node_at(&common_root, &indexes).is_none() {
                return Err(ZipperError::InvalidBatch {
                    reason: format!("no node at {indexes:?} in the common root"),
                });
            }
            if !positions.insert(indexes) {
                return Err(ZipperError::InvalidBatch {
                    reason: format!("several edits at {:?}", zipper.indexes()),
                });
            }
        }
        Ok(NodeMultiZipper {
            common_root,
            zippers,
        })
    }

    pub fn common_root(&self) -> &N {
        &self.common_root
    }

    pub fn zippers(&self) -> &[NodeZipper<N>] {
        &self.zippers
    }

    pub fn size(&self) -> usize {
        self.zippers.len()
    }

    /// Replace the node of every zipper, keeping positions.
    pub fn map_nodes(&self, mut edit: impl FnMut(&NodeZipper<N>) -> N) -> Self {
        NodeMultiZipper {
            common_root: self.common_root.clone(),
            zippers: self
                .zippers
                .iter()
                .map(|zipper| zipper.with_new_node(edit(zipper)))
                .collect(),
        }
    }

    /// Apply every edit and return the new root.
    ///
    /// Edits are folded in from the deepest position up. A parent shared by several edits is
    /// rebuilt once, and when the parent is itself edited its children come from the edited
    /// node.
    pub fn to_root_node(&self) -> Result<N, ZipperError> {
        let mut pending: BTreeMap<Vec<usize>, N> = self
            .zippers
            .iter()
            .map(|zipper| (zipper.indexes(), zipper.current.clone()))
            .collect();

        while let Some(depth) = pending.keys().map(Vec::len).max().filter(|depth| *depth > 0) {
            let deepest: Vec<Vec<usize>> = pending
                .keys()
                .filter(|indexes| indexes.len() == depth)
                .cloned()
                .collect();
            let mut by_parent: BTreeMap<Vec<usize>, Vec<(usize, N)>> = BTreeMap::new();
            for mut indexes in deepest {
                let node = pending.remove(&indexes);
                let index = indexes.pop();
                if let (Some(node), Some(index)) = (node, index) {
                    by_parent.entry(indexes).or_default().push((index, node));
                }
            }
            for (parent_indexes, edits) in by_parent {
                let parent = match pending.remove(&parent_indexes) {
                    Some(edited) => edited,
                    None => node_at(&self.common_root, &parent_indexes).ok_or_else(|| {
                        ZipperError::InvalidBatch {
                            reason: format!("no node at {parent_indexes:?} in the common root"),
                        }
                    })?,
                };
                let mut children = parent.children().to_vec();
                for (index, node) in edits {
                    let slot = children.get_mut(index).ok_or_else(|| ZipperError::InvalidBatch {
                        reason: format!(
                            "edited node at {parent_indexes:?} has no child {index} anymore"
                        ),
                    })?;
                    *slot = node;
                }
                pending.insert(parent_indexes, parent.with_new_children(children));
            }
        }

        Ok(pending
            .remove(&Vec::new())
            .unwrap_or_else(|| self.common_root.clone()))
    }
}

fn node_at<N: TreeNode>(root: &N, indexes: &[usize]) -> Option<N> {
    let mut node = root;
    for index in indexes {
        node = node.children().get(*index)?;
    }
    Some(node.clone())
}

//! Maps points in space to allocation indices.
//!
//! A [`SpatialAllocationIndex`] keeps a set of *sample points*, each labelled
//! with an allocation index, in a splay tree ordered by the reflective
//! z-order of [`zorder`]. Looking up a point returns the index of a nearby
//! sample, so records allocated for points close in space share minipools
//! of a [`ProximityPool`](crate::core::pool::ProximityPool).
//!
//! Deleted samples keep their index in a second splay tree of spares, and a
//! later insertion reuses the geometrically nearest spare index.

pub mod zorder;

use tracing::debug;

use crate::core::pool::{PoolDiscipline, TieredArrayPool};
use crate::core::tag::AllocIndex;
use zorder::{Point3, distance_squared, zorder_before};

const LOG2_NODES_PER_BLOCK: u32 = 8;

#[derive(Clone, Copy, Debug, Default)]
struct SplayNode {
    point: Point3,
    index: AllocIndex,
    left: Option<u64>,
    right: Option<u64>,
}

/// Splay tree of sample points, keyed by z-order.
///
/// # Examples
///
/// ```rust
/// use tetstar::core::spatial::SpatialAllocationIndex;
///
/// let mut samples = SpatialAllocationIndex::new();
/// assert_eq!(samples.index_of(&[0.0, 0.0, 0.0]), None);
///
/// let near_origin = samples.insert_point(&[0.0, 0.0, 0.0]);
/// let far_away = samples.insert_point(&[100.0, 100.0, 100.0]);
/// assert_eq!(samples.index_of(&[0.1, 0.0, 0.0]), Some(near_origin));
/// assert_eq!(samples.index_of(&[99.0, 100.0, 100.0]), Some(far_away));
/// ```
#[derive(Clone, Debug)]
pub struct SpatialAllocationIndex {
    nodes: TieredArrayPool<SplayNode>,
    root: Option<u64>,
    spare_root: Option<u64>,
    next_index: AllocIndex,
    samples: usize,
    spares: usize,
}

impl Default for SpatialAllocationIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialAllocationIndex {
    /// Creates an index with no samples.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: TieredArrayPool::new(LOG2_NODES_PER_BLOCK, PoolDiscipline::Recycling),
            root: None,
            spare_root: None,
            next_index: 0,
            samples: 0,
            spares: 0,
        }
    }

    #[inline]
    fn node(&self, id: u64) -> &SplayNode {
        self.nodes.get_allocated(id)
    }

    #[inline]
    fn node_mut(&mut self, id: u64) -> &mut SplayNode {
        self.nodes.get_allocated_mut(id)
    }

    /// Top-down splay of the tree rooted at `root` toward `key`. Returns the
    /// new root, which is either equal to `key` or its in-order neighbour.
    fn splay(&mut self, root: u64, key: &Point3) -> u64 {
        let mut t = root;
        // Assembled left tree (nodes before the key) and right tree.
        let (mut left_root, mut left_max): (Option<u64>, Option<u64>) = (None, None);
        let (mut right_root, mut right_min): (Option<u64>, Option<u64>) = (None, None);

        loop {
            let here = self.node(t).point;
            if zorder_before(key, &here) {
                let Some(mut child) = self.node(t).left else {
                    break;
                };
                if zorder_before(key, &self.node(child).point) {
                    // Rotate right.
                    self.node_mut(t).left = self.node(child).right;
                    self.node_mut(child).right = Some(t);
                    t = child;
                    match self.node(t).left {
                        Some(next) => child = next,
                        None => break,
                    }
                }
                match right_min {
                    Some(min) => self.node_mut(min).left = Some(t),
                    None => right_root = Some(t),
                }
                right_min = Some(t);
                t = child;
            } else if zorder_before(&here, key) {
                let Some(mut child) = self.node(t).right else {
                    break;
                };
                if zorder_before(&self.node(child).point, key) {
                    // Rotate left.
                    self.node_mut(t).right = self.node(child).left;
                    self.node_mut(child).left = Some(t);
                    t = child;
                    match self.node(t).right {
                        Some(next) => child = next,
                        None => break,
                    }
                }
                match left_max {
                    Some(max) => self.node_mut(max).right = Some(t),
                    None => left_root = Some(t),
                }
                left_max = Some(t);
                t = child;
            } else {
                break;
            }
        }

        let (t_left, t_right) = (self.node(t).left, self.node(t).right);
        match left_max {
            Some(max) => self.node_mut(max).right = t_left,
            None => left_root = t_left,
        }
        match right_min {
            Some(min) => self.node_mut(min).left = t_right,
            None => right_root = t_right,
        }
        let node = self.node_mut(t);
        node.left = left_root;
        node.right = right_root;
        t
    }

    fn subtree_max(&self, mut id: u64) -> u64 {
        while let Some(right) = self.node(id).right {
            id = right;
        }
        id
    }

    fn subtree_min(&self, mut id: u64) -> u64 {
        while let Some(left) = self.node(id).left {
            id = left;
        }
        id
    }

    /// Splays toward `point` and returns `(new_root, nearest_node)`, where the
    /// nearest node is the root or its in-order neighbour on the far side of
    /// `point`, whichever is closer.
    fn nearest(&mut self, root: u64, point: &Point3) -> (u64, u64) {
        let root = self.splay(root, point);
        let here = self.node(root).point;
        let neighbour = if zorder_before(point, &here) {
            self.node(root).left.map(|left| self.subtree_max(left))
        } else if zorder_before(&here, point) {
            self.node(root).right.map(|right| self.subtree_min(right))
        } else {
            None
        };
        let nearest = neighbour
            .filter(|&n| {
                distance_squared(&self.node(n).point, point) < distance_squared(&here, point)
            })
            .unwrap_or(root);
        (root, nearest)
    }

    /// Removes the root of a tree; returns the new root.
    fn remove_root(&mut self, root: u64) -> Option<u64> {
        let SplayNode { left, right, .. } = *self.node(root);
        match left {
            None => right,
            Some(left) => {
                let max = self.subtree_max(left);
                self.node_mut(max).right = right;
                Some(left)
            }
        }
    }

    /// Links node `id` in as the new root of the tree rooted at `root`.
    fn insert_node(&mut self, root: Option<u64>, id: u64) -> u64 {
        let point = self.node(id).point;
        let Some(root) = root else {
            let node = self.node_mut(id);
            node.left = None;
            node.right = None;
            return id;
        };
        let root = self.splay(root, &point);
        if zorder_before(&point, &self.node(root).point) {
            let root_left = self.node(root).left;
            self.node_mut(root).left = None;
            let node = self.node_mut(id);
            node.left = root_left;
            node.right = Some(root);
        } else {
            let root_right = self.node(root).right;
            self.node_mut(root).right = None;
            let node = self.node_mut(id);
            node.right = root_right;
            node.left = Some(root);
        }
        id
    }

    /// Allocation index of the sample nearest to `point` along the z-order
    /// search path, or `None` when there are no samples.
    pub fn index_of(&mut self, point: &Point3) -> Option<AllocIndex> {
        let (root, nearest) = self.nearest(self.root?, point);
        self.root = Some(root);
        Some(self.node(nearest).index)
    }

    /// Adds a sample at `point` and returns its allocation index.
    ///
    /// The geometrically nearest spare index is reused when one exists;
    /// otherwise a fresh index is minted.
    pub fn insert_point(&mut self, point: &Point3) -> AllocIndex {
        let id = if let Some(spare_root) = self.spare_root {
            let (spare_root, nearest) = self.nearest(spare_root, point);
            let target = self.node(nearest).point;
            let spare_root = self.splay(spare_root, &target);
            self.spare_root = self.remove_root(spare_root);
            self.spares -= 1;
            debug!(
                "[spatial] reusing spare allocation index {}",
                self.node(spare_root).index
            );
            spare_root
        } else {
            let index = self.next_index;
            self.next_index += 1;
            let (id, node) = self.nodes.allocate();
            node.index = index;
            id
        };
        self.node_mut(id).point = *point;
        self.root = Some(self.insert_node(self.root, id));
        self.samples += 1;
        self.node(id).index
    }

    /// Removes the sample at exactly `point`, keeping its index as a spare.
    /// Returns false when no sample sits at `point`.
    pub fn delete_point(&mut self, point: &Point3) -> bool {
        let Some(root) = self.root else {
            return false;
        };
        let root = self.splay(root, point);
        let here = self.node(root).point;
        if zorder_before(point, &here) || zorder_before(&here, point) {
            self.root = Some(root);
            return false;
        }
        self.root = self.remove_root(root);
        self.samples -= 1;
        self.spare_root = Some(self.insert_node(self.spare_root, root));
        self.spares += 1;
        true
    }

    /// Number of live samples.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.samples
    }

    /// Returns true when there are no live samples.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.samples == 0
    }

    /// Number of spare indices waiting for reuse.
    #[must_use]
    pub const fn spares(&self) -> usize {
        self.spares
    }

    /// Bytes held by the node storage.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.nodes.bytes()
    }

    /// Forgets every sample and spare. Indices restart at zero.
    pub fn restart(&mut self) {
        self.nodes.restart();
        self.root = None;
        self.spare_root = None;
        self.next_index = 0;
        self.samples = 0;
        self.spares = 0;
    }
}

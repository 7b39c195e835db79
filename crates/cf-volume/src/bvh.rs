//! Bounding volume hierarchy over volume primitives.
//!
//! Unstructured cells, AMR blocks and particles are all indexed by the same
//! hierarchy. Each node carries, besides its box, a value range per attribute
//! and the smallest primitive size below it, so the interval iterator can
//! bound values and choose a sampling step at any depth of the tree.
//!
//! Nodes are stored flat in pre-order: a child always has a larger index than
//! its parent, and the root is node 0.

use std::ops::ControlFlow;

use nalgebra::Point3;
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::aabb::Aabb;
use crate::config::BvhConfig;
use crate::range::ValueRange;
use crate::ray::Ray;

/// Maximum traversal stack depth.
const STACK_SIZE: usize = 64;

/// How the value ranges of sibling primitives combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeCombine {
    /// A point takes its value from one primitive; ranges are joined.
    Union,
    /// Primitives overlap and their contributions add; ranges are summed.
    Sum,
}

impl RangeCombine {
    fn apply(self, a: &ValueRange, b: &ValueRange) -> ValueRange {
        match self {
            Self::Union => a.union(b),
            Self::Sum => a.sum(b),
        }
    }
}

/// Leaf or internal node payload.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Leaf node holding primitive indices.
    Leaf {
        /// Indices into the primitive list the hierarchy was built from.
        primitives: SmallVec<[u32; 8]>,
    },
    /// Internal node with two children.
    Internal {
        /// Left child index.
        left: u32,
        /// Right child index.
        right: u32,
    },
}

/// A node of the flattened hierarchy.
#[derive(Debug, Clone)]
pub struct BvhNode {
    /// Bounding box of all primitives below this node.
    pub bbox: Aabb,
    /// Distance from the root.
    pub depth: u32,
    /// Value range of each attribute over this node.
    pub ranges: SmallVec<[ValueRange; 2]>,
    /// Smallest primitive size below this node.
    pub nominal_size: f64,
    /// Leaf or internal payload.
    pub kind: NodeKind,
}

impl BvhNode {
    /// Returns true for leaf nodes.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }
}

/// One step of the overlap-resolving sweep along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SweepSpan {
    pub t_range: ValueRange,
    pub value_range: ValueRange,
    pub nominal_size: f64,
}

/// Bounding volume hierarchy with per-node value ranges.
#[derive(Debug, Clone)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    depth: u32,
    primitive_count: usize,
    combine: RangeCombine,
}

/// Pointer-based tree used while building.
enum BuildNode {
    Leaf {
        bbox: Aabb,
        primitives: SmallVec<[u32; 8]>,
    },
    Internal {
        bbox: Aabb,
        left: Box<Self>,
        right: Box<Self>,
    },
}

impl Bvh {
    /// Build a hierarchy over primitive bounding boxes.
    ///
    /// Subtrees with at least `config.parallel_threshold` primitives are built
    /// with `rayon`. Node ranges start out empty; fill them with
    /// [`Bvh::compute_node_data`].
    ///
    /// # Example
    ///
    /// ```
    /// use cf_volume::{Aabb, Bvh, BvhConfig, RangeCombine};
    /// use nalgebra::Point3;
    ///
    /// let boxes: Vec<Aabb> = (0..10)
    ///     .map(|i| {
    ///         let x = f64::from(i);
    ///         Aabb::new(Point3::new(x, 0.0, 0.0), Point3::new(x + 1.0, 1.0, 1.0))
    ///     })
    ///     .collect();
    /// let bvh = Bvh::build(&boxes, &BvhConfig::default().max_leaf_size(2), RangeCombine::Union);
    /// assert_eq!(bvh.primitive_count(), 10);
    /// assert!(bvh.depth() >= 2);
    /// ```
    #[must_use]
    pub fn build(primitives: &[Aabb], config: &BvhConfig, combine: RangeCombine) -> Self {
        if primitives.is_empty() {
            return Self {
                nodes: Vec::new(),
                depth: 0,
                primitive_count: 0,
                combine,
            };
        }

        #[allow(clippy::cast_possible_truncation)]
        let indices: Vec<u32> = (0..primitives.len() as u32).collect();
        let max_leaf = config.max_leaf_size.max(1);
        let root = Self::build_recursive(primitives, indices, max_leaf, config.parallel_threshold);

        let mut nodes = Vec::with_capacity(2 * primitives.len() / max_leaf + 1);
        let mut depth = 0;
        Self::flatten(root, 0, &mut nodes, &mut depth);

        Self {
            nodes,
            depth,
            primitive_count: primitives.len(),
            combine,
        }
    }

    fn build_recursive(
        primitives: &[Aabb],
        mut indices: Vec<u32>,
        max_leaf_size: usize,
        parallel_threshold: usize,
    ) -> BuildNode {
        let mut bbox = Aabb::empty();
        for &i in &indices {
            bbox.expand(&primitives[i as usize]);
        }

        if indices.len() <= max_leaf_size {
            return BuildNode::Leaf {
                bbox,
                primitives: indices.into_iter().collect(),
            };
        }

        // Median split along the longest axis
        let axis = bbox.longest_axis();
        indices.sort_by(|&a, &b| {
            let ca = primitives[a as usize].center()[axis];
            let cb = primitives[b as usize].center()[axis];
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });
        let right_indices = indices.split_off(indices.len() / 2);
        let left_indices = indices;

        let (left, right) = if left_indices.len() >= parallel_threshold {
            rayon::join(
                || Self::build_recursive(primitives, left_indices, max_leaf_size, parallel_threshold),
                || {
                    Self::build_recursive(primitives, right_indices, max_leaf_size, parallel_threshold)
                },
            )
        } else {
            (
                Self::build_recursive(primitives, left_indices, max_leaf_size, parallel_threshold),
                Self::build_recursive(primitives, right_indices, max_leaf_size, parallel_threshold),
            )
        };

        BuildNode::Internal {
            bbox,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn flatten(node: BuildNode, depth: u32, nodes: &mut Vec<BvhNode>, max_depth: &mut u32) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let index = nodes.len() as u32;
        *max_depth = (*max_depth).max(depth);

        match node {
            BuildNode::Leaf { bbox, primitives } => {
                nodes.push(BvhNode {
                    bbox,
                    depth,
                    ranges: SmallVec::new(),
                    nominal_size: f64::INFINITY,
                    kind: NodeKind::Leaf { primitives },
                });
            }
            BuildNode::Internal { bbox, left, right } => {
                nodes.push(BvhNode {
                    bbox,
                    depth,
                    ranges: SmallVec::new(),
                    nominal_size: f64::INFINITY,
                    kind: NodeKind::Internal { left: 0, right: 0 },
                });
                let l = Self::flatten(*left, depth + 1, nodes, max_depth);
                let r = Self::flatten(*right, depth + 1, nodes, max_depth);
                nodes[index as usize].kind = NodeKind::Internal { left: l, right: r };
            }
        }
        index
    }

    /// Fill per-node value ranges and nominal sizes.
    ///
    /// `primitive_range(p, a)` is the value range of attribute `a` over
    /// primitive `p`, and `primitive_size(p)` its characteristic length.
    /// Leaves are processed in parallel, internal nodes bottom-up.
    pub fn compute_node_data<R, S>(
        &mut self,
        attribute_count: usize,
        primitive_range: R,
        primitive_size: S,
    ) where
        R: Fn(u32, usize) -> ValueRange + Sync,
        S: Fn(u32) -> f64 + Sync,
    {
        let combine = self.combine;
        self.nodes.par_iter_mut().for_each(|node| {
            if let NodeKind::Leaf { primitives } = &node.kind {
                node.ranges = (0..attribute_count)
                    .map(|a| {
                        primitives.iter().fold(ValueRange::empty(), |acc, &p| {
                            combine.apply(&acc, &primitive_range(p, a))
                        })
                    })
                    .collect();
                node.nominal_size = primitives
                    .iter()
                    .map(|&p| primitive_size(p))
                    .fold(f64::INFINITY, f64::min);
            }
        });

        for i in (0..self.nodes.len()).rev() {
            if let NodeKind::Internal { left, right } = self.nodes[i].kind {
                let (l, r) = (&self.nodes[left as usize], &self.nodes[right as usize]);
                let ranges: SmallVec<[ValueRange; 2]> = l
                    .ranges
                    .iter()
                    .zip(&r.ranges)
                    .map(|(a, b)| combine.apply(a, b))
                    .collect();
                let nominal_size = l.nominal_size.min(r.nominal_size);
                self.nodes[i].ranges = ranges;
                self.nodes[i].nominal_size = nominal_size;
            }
        }
    }

    /// All nodes in pre-order.
    #[must_use]
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    /// The root node, if any primitive was indexed.
    #[must_use]
    pub fn root(&self) -> Option<&BvhNode> {
        self.nodes.first()
    }

    /// Depth of the deepest leaf (0 for a single leaf).
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of indexed primitives.
    #[must_use]
    pub const fn primitive_count(&self) -> usize {
        self.primitive_count
    }

    /// How node ranges were combined.
    #[must_use]
    pub const fn combine(&self) -> RangeCombine {
        self.combine
    }

    /// Returns true if no primitive was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Calls `f` for every primitive in a leaf whose box contains `point`.
    ///
    /// Stops early when `f` returns [`ControlFlow::Break`].
    pub fn for_each_containing<F>(&self, point: &Point3<f64>, mut f: F)
    where
        F: FnMut(u32) -> ControlFlow<()>,
    {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = [0u32; STACK_SIZE];
        let mut len = 1;

        while len > 0 {
            len -= 1;
            let node = &self.nodes[stack[len] as usize];
            if !node.bbox.contains(point) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf { primitives } => {
                    for &p in primitives {
                        if f(p).is_break() {
                            return;
                        }
                    }
                }
                NodeKind::Internal { left, right } => {
                    if len + 2 <= STACK_SIZE {
                        stack[len] = *right;
                        stack[len + 1] = *left;
                        len += 2;
                    }
                }
            }
        }
    }

    /// Entry and exit parameters of a node along `ray`, if it is crossed.
    fn clip(&self, index: u32, ray: &Ray) -> Option<ValueRange> {
        let node = &self.nodes[index as usize];
        let span = node.bbox.intersect_ray(&ray.origin, &ray.direction, &ray.t_range)?;
        (span.upper > span.lower).then_some(span)
    }
}

/// Capacity of the pending-node heap of a [`BvhSweep`].
const FRONTIER_SIZE: usize = 64;

/// Capacity of the covering set of a [`BvhSweep`]; further nodes are merged.
const COVERING_SIZE: usize = 16;

/// A node waiting on the sweep frontier.
#[derive(Debug, Clone, Copy)]
struct Pending {
    node: u32,
    entry: f64,
    exit: f64,
}

/// A cut node covering the sweep position.
#[derive(Debug, Clone, Copy)]
struct Covering {
    exit: f64,
    range: ValueRange,
    nominal_size: f64,
}

/// Front-to-back sweep of one ray over the cut of a hierarchy at a depth.
///
/// The cut is every node at `cut_depth` plus every shallower leaf. Nodes of
/// the cut may overlap; the sweep turns them into non-overlapping spans,
/// each ending at the first exit from a covering node or the first entry
/// into another, whichever comes first. A span's value range combines every
/// node covering it.
///
/// Pending nodes sit in a min-heap on their entry parameter, so each node is
/// expanded at most once per ray. All state is inline. When the heap is full
/// an internal node is treated as part of the cut, and when the covering set
/// is full nodes are merged into its last slot; both only widen bounds.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BvhSweep {
    frontier: [Pending; FRONTIER_SIZE],
    frontier_len: usize,
    covering: [Covering; COVERING_SIZE],
    covering_len: usize,
    cursor: f64,
    cut_depth: u32,
    attribute: usize,
}

impl BvhSweep {
    /// Starts a sweep over the part of `ray` inside its `t_range`.
    pub(crate) fn new(bvh: &Bvh, ray: &Ray, cut_depth: u32, attribute: usize) -> Self {
        let mut sweep = Self {
            frontier: [Pending {
                node: 0,
                entry: 0.0,
                exit: 0.0,
            }; FRONTIER_SIZE],
            frontier_len: 0,
            covering: [Covering {
                exit: 0.0,
                range: ValueRange::empty(),
                nominal_size: f64::INFINITY,
            }; COVERING_SIZE],
            covering_len: 0,
            cursor: ray.t_range.lower,
            cut_depth,
            attribute,
        };
        if !bvh.is_empty() {
            sweep.push(bvh, 0, ray);
        }
        sweep
    }

    /// Next span along the ray, or `None` once the cut is exhausted.
    pub(crate) fn next_span(&mut self, bvh: &Bvh, ray: &Ray) -> Option<SweepSpan> {
        let end = ray.t_range.upper;
        loop {
            self.drop_covering_before(self.cursor);
            self.settle(bvh, ray);

            let lower = if self.covering_len > 0 {
                self.cursor
            } else {
                self.peek()?.entry.max(self.cursor)
            };
            if lower >= end {
                return None;
            }

            // Every cut node entered by `lower` now covers the span start.
            while let Some(top) = self.peek() {
                if top.entry > lower {
                    break;
                }
                self.pop();
                if top.exit > lower {
                    self.cover(bvh, top);
                }
                self.settle(bvh, ray);
            }
            if self.covering_len == 0 {
                self.cursor = lower;
                continue;
            }

            let mut upper = self.peek().map_or(end, |next| next.entry.min(end));
            let mut value_range = ValueRange::empty();
            let mut nominal_size = f64::INFINITY;
            for covering in &self.covering[..self.covering_len] {
                upper = upper.min(covering.exit);
                value_range = bvh.combine.apply(&value_range, &covering.range);
                nominal_size = nominal_size.min(covering.nominal_size);
            }

            self.cursor = upper;
            return Some(SweepSpan {
                t_range: ValueRange { lower, upper },
                value_range,
                nominal_size,
            });
        }
    }

    /// Expands internal nodes at the top of the heap until the earliest
    /// pending node belongs to the cut.
    fn settle(&mut self, bvh: &Bvh, ray: &Ray) {
        while let Some(top) = self.peek() {
            let node = &bvh.nodes[top.node as usize];
            let NodeKind::Internal { left, right } = node.kind else {
                return;
            };
            if node.depth >= self.cut_depth || self.frontier_len >= FRONTIER_SIZE {
                return;
            }
            self.pop();
            self.push(bvh, left, ray);
            self.push(bvh, right, ray);
        }
    }

    fn cover(&mut self, bvh: &Bvh, pending: Pending) {
        let node = &bvh.nodes[pending.node as usize];
        let covering = Covering {
            exit: pending.exit,
            range: node
                .ranges
                .get(self.attribute)
                .copied()
                .unwrap_or_else(ValueRange::empty),
            nominal_size: node.nominal_size,
        };
        if self.covering_len < COVERING_SIZE {
            self.covering[self.covering_len] = covering;
            self.covering_len += 1;
        } else {
            let last = &mut self.covering[COVERING_SIZE - 1];
            last.exit = last.exit.max(covering.exit);
            last.range = bvh.combine.apply(&last.range, &covering.range);
            last.nominal_size = last.nominal_size.min(covering.nominal_size);
        }
    }

    fn drop_covering_before(&mut self, t: f64) {
        let mut i = 0;
        while i < self.covering_len {
            if self.covering[i].exit > t {
                i += 1;
            } else {
                self.covering_len -= 1;
                self.covering[i] = self.covering[self.covering_len];
            }
        }
    }

    fn peek(&self) -> Option<Pending> {
        (self.frontier_len > 0).then(|| self.frontier[0])
    }

    fn push(&mut self, bvh: &Bvh, node: u32, ray: &Ray) {
        let Some(span) = bvh.clip(node, ray) else {
            return;
        };
        if span.upper <= self.cursor || self.frontier_len >= FRONTIER_SIZE {
            return;
        }
        let mut i = self.frontier_len;
        self.frontier[i] = Pending {
            node,
            entry: span.lower,
            exit: span.upper,
        };
        self.frontier_len += 1;
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.frontier[parent].entry <= self.frontier[i].entry {
                break;
            }
            self.frontier.swap(parent, i);
            i = parent;
        }
    }

    fn pop(&mut self) {
        if self.frontier_len == 0 {
            return;
        }
        self.frontier_len -= 1;
        self.frontier[0] = self.frontier[self.frontier_len];
        let len = self.frontier_len;
        let mut i = 0;
        loop {
            let (l, r) = (2 * i + 1, 2 * i + 2);
            let mut smallest = i;
            if l < len && self.frontier[l].entry < self.frontier[smallest].entry {
                smallest = l;
            }
            if r < len && self.frontier[r].entry < self.frontier[smallest].entry {
                smallest = r;
            }
            if smallest == i {
                break;
            }
            self.frontier.swap(i, smallest);
            i = smallest;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn slab_boxes(n: u32) -> Vec<Aabb> {
        (0..n)
            .map(|i| {
                let x = f64::from(i);
                Aabb::new(Point3::new(x, 0.0, 0.0), Point3::new(x + 1.0, 1.0, 1.0))
            })
            .collect()
    }

    fn annotated(boxes: &[Aabb], combine: RangeCombine) -> Bvh {
        let mut bvh = Bvh::build(boxes, &BvhConfig::default().max_leaf_size(1), combine);
        bvh.compute_node_data(1, |p, _| ValueRange::point(f64::from(p)), |_| 0.5);
        bvh
    }

    #[test]
    fn test_empty() {
        let bvh = Bvh::build(&[], &BvhConfig::default(), RangeCombine::Union);
        assert!(bvh.is_empty());
        assert!(bvh.root().is_none());
        let ray = Ray::new(Point3::origin(), Vector3::x());
        assert!(sweep_all(&bvh, &ray, 0).is_empty());
    }

    #[test]
    fn test_preorder_children_after_parent() {
        let bvh = Bvh::build(&slab_boxes(13), &BvhConfig::default().max_leaf_size(2), RangeCombine::Union);
        for (i, node) in bvh.nodes().iter().enumerate() {
            if let NodeKind::Internal { left, right } = node.kind {
                assert!(left as usize > i && right as usize > i);
                assert_eq!(bvh.nodes()[left as usize].depth, node.depth + 1);
            }
        }
    }

    #[test]
    fn test_parallel_build_matches_serial() {
        let boxes = slab_boxes(64);
        let serial = Bvh::build(&boxes, &BvhConfig::default().max_leaf_size(2), RangeCombine::Union);
        let parallel = Bvh::build(
            &boxes,
            &BvhConfig::default().max_leaf_size(2).parallel_threshold(4),
            RangeCombine::Union,
        );
        assert_eq!(serial.nodes().len(), parallel.nodes().len());
        assert_eq!(serial.depth(), parallel.depth());
    }

    #[test]
    fn test_node_ranges() {
        let bvh = annotated(&slab_boxes(8), RangeCombine::Union);
        let root = bvh.root().unwrap();
        assert_eq!(root.ranges[0], ValueRange::new(0.0, 7.0));
        assert_eq!(root.nominal_size, 0.5);

        let bvh = annotated(&slab_boxes(4), RangeCombine::Sum);
        assert_eq!(bvh.root().unwrap().ranges[0], ValueRange::point(6.0));
    }

    #[test]
    fn test_point_query() {
        let bvh = annotated(&slab_boxes(8), RangeCombine::Union);
        let mut found = Vec::new();
        bvh.for_each_containing(&Point3::new(3.5, 0.5, 0.5), |p| {
            found.push(p);
            ControlFlow::Continue(())
        });
        assert_eq!(found, vec![3]);
    }

    fn sweep_all(bvh: &Bvh, ray: &Ray, cut_depth: u32) -> Vec<SweepSpan> {
        let mut sweep = BvhSweep::new(bvh, ray, cut_depth, 0);
        std::iter::from_fn(|| sweep.next_span(bvh, ray)).collect()
    }

    #[test]
    fn test_sweep_leaf_cut_is_contiguous() {
        let bvh = annotated(&slab_boxes(8), RangeCombine::Union);
        let ray = Ray::new(Point3::new(-1.0, 0.5, 0.5), Vector3::x());
        let spans = sweep_all(&bvh, &ray, bvh.depth());
        assert_eq!(spans.len(), 8);
        for pair in spans.windows(2) {
            assert!(pair[0].t_range.upper > pair[0].t_range.lower);
            assert_eq!(pair[0].t_range.upper, pair[1].t_range.lower);
        }
        assert_relative_eq!(spans[0].t_range.lower, 1.0);
        assert_relative_eq!(spans[7].t_range.upper, 9.0);
        assert_eq!(spans[3].value_range, ValueRange::point(3.0));
    }

    #[test]
    fn test_sweep_resolves_overlap() {
        let boxes = vec![
            Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0)),
            Aabb::new(Point3::new(1.0, 0.0, 0.0), Point3::new(3.0, 1.0, 1.0)),
        ];
        let bvh = annotated(&boxes, RangeCombine::Sum);
        let ray = Ray::new(Point3::new(-1.0, 0.5, 0.5), Vector3::x());
        let spans = sweep_all(&bvh, &ray, bvh.depth());

        assert_eq!(spans.len(), 3);
        assert_relative_eq!(spans[0].t_range.lower, 1.0);
        assert_relative_eq!(spans[0].t_range.upper, 2.0);
        assert_eq!(spans[0].value_range, ValueRange::point(0.0));
        assert_relative_eq!(spans[1].t_range.upper, 3.0);
        assert_eq!(spans[1].value_range, ValueRange::point(1.0));
        assert_relative_eq!(spans[2].t_range.upper, 4.0);
        assert_eq!(spans[2].value_range, ValueRange::point(1.0));
    }

    #[test]
    fn test_sweep_root_cut() {
        let bvh = annotated(&slab_boxes(8), RangeCombine::Union);
        let ray = Ray::new(Point3::new(-1.0, 0.5, 0.5), Vector3::x());
        let spans = sweep_all(&bvh, &ray, 0);
        assert_eq!(spans.len(), 1);
        assert_relative_eq!(spans[0].t_range.lower, 1.0);
        assert_relative_eq!(spans[0].t_range.upper, 9.0);
        assert_eq!(spans[0].value_range, ValueRange::new(0.0, 7.0));
    }

    #[test]
    fn test_sweep_respects_t_range() {
        let bvh = annotated(&slab_boxes(8), RangeCombine::Union);
        let ray = Ray::new(Point3::new(-1.0, 0.5, 0.5), Vector3::x())
            .with_t_range(ValueRange::new(2.5, 4.5));
        let spans = sweep_all(&bvh, &ray, bvh.depth());
        assert_eq!(spans.len(), 3);
        assert_relative_eq!(spans[0].t_range.lower, 2.5);
        assert_eq!(spans[0].value_range, ValueRange::point(1.0));
        assert_relative_eq!(spans[2].t_range.upper, 4.5);
    }

    #[test]
    fn test_sweep_saturated_stays_conservative() {
        // More coincident boxes than the heap and covering set hold.
        let unit = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let bvh = annotated(&vec![unit; 200], RangeCombine::Sum);
        let ray = Ray::new(Point3::new(-1.0, 0.5, 0.5), Vector3::x());
        let spans = sweep_all(&bvh, &ray, bvh.depth());

        assert_eq!(spans.len(), 1);
        assert_relative_eq!(spans[0].t_range.lower, 1.0);
        assert_relative_eq!(spans[0].t_range.upper, 2.0);
        assert_eq!(spans[0].value_range, ValueRange::point(19900.0));
    }

    #[test]
    fn test_sweep_disjoint_gap() {
        let boxes = vec![
            Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)),
            Aabb::new(Point3::new(3.0, 0.0, 0.0), Point3::new(4.0, 1.0, 1.0)),
        ];
        let bvh = annotated(&boxes, RangeCombine::Union);
        let ray = Ray::new(Point3::new(-1.0, 0.5, 0.5), Vector3::x());
        let spans = sweep_all(&bvh, &ray, bvh.depth());

        assert_eq!(spans.len(), 2);
        assert_relative_eq!(spans[0].t_range.upper, 2.0);
        assert_relative_eq!(spans[1].t_range.lower, 4.0);
        assert_eq!(spans[1].value_range, ValueRange::point(1.0));
    }
}

//! Bounding volume hierarchy over shape bounding boxes.
//!
//! Median split on the longest centroid axis. Construction runs off an
//! explicit worklist, so deep trees cannot overflow the stack. Queries are
//! conservative: every stored box that touches the query is reported.

use crate::geometry::bbox::BoundingBox;
use crate::geometry::curves::Ray;

#[derive(Debug, Clone)]
enum BvhNode {
    Leaf { bbox: BoundingBox, start: usize, end: usize },
    Internal { bbox: BoundingBox, left: usize, right: usize },
}

impl BvhNode {
    fn bbox(&self) -> &BoundingBox {
        match self {
            BvhNode::Leaf { bbox, .. } | BvhNode::Internal { bbox, .. } => bbox,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    entries: Vec<(usize, BoundingBox)>,
}

impl Bvh {
    /// Build from `(id, box)` pairs. An empty input gives an empty tree.
    pub fn build(items: &[(usize, BoundingBox)], leaf_size: usize) -> Self {
        let mut entries = items.to_vec();
        let mut nodes = Vec::new();
        if entries.is_empty() {
            return Self { nodes, entries };
        }
        let leaf_size = leaf_size.max(1);
        let placeholder = BvhNode::Leaf {
            bbox: BoundingBox::empty(),
            start: 0,
            end: 0,
        };
        nodes.push(placeholder.clone());

        let mut work = vec![(0usize, 0usize, entries.len())];
        while let Some((slot, start, end)) = work.pop() {
            let span = &mut entries[start..end];
            let bbox = span.iter().fold(BoundingBox::empty(), |acc, (_, b)| acc.union(b));
            if span.len() <= leaf_size {
                nodes[slot] = BvhNode::Leaf { bbox, start, end };
                continue;
            }
            let centroids = BoundingBox::from_points(&span.iter().map(|(_, b)| b.center()).collect::<Vec<_>>());
            let axis = centroids.longest_axis();
            let mid = span.len() / 2;
            span.select_nth_unstable_by(mid, |(_, a), (_, b)| a.center()[axis].total_cmp(&b.center()[axis]));

            let left = nodes.len();
            nodes.push(placeholder.clone());
            let right = nodes.len();
            nodes.push(placeholder.clone());
            nodes[slot] = BvhNode::Internal { bbox, left, right };
            work.push((left, start, start + mid));
            work.push((right, start + mid, end));
        }
        Self { nodes, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids whose boxes intersect `query`, sorted ascending.
    pub fn query(&self, query: &BoundingBox) -> Vec<usize> {
        self.collect(|b| b.intersects(query), |b| b.intersects(query))
    }

    /// Ids whose boxes the ray enters, sorted ascending.
    pub fn query_ray(&self, ray: &Ray) -> Vec<usize> {
        self.collect(|b| b.ray_entry(ray).is_some(), |b| b.ray_entry(ray).is_some())
    }

    fn collect(&self, visit: impl Fn(&BoundingBox) -> bool, accept: impl Fn(&BoundingBox) -> bool) -> Vec<usize> {
        let mut out = Vec::new();
        if self.nodes.is_empty() {
            return out;
        }
        let mut stack = vec![0usize];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            if !visit(node.bbox()) {
                continue;
            }
            match node {
                BvhNode::Leaf { start, end, .. } => {
                    out.extend(self.entries[*start..*end].iter().filter(|(_, b)| accept(b)).map(|(id, _)| *id));
                }
                BvhNode::Internal { left, right, .. } => {
                    stack.push(*left);
                    stack.push(*right);
                }
            }
        }
        out.sort_unstable();
        out
    }
}

//! Pointerless N-ary scalar-range tree
//!
//! The tree is a complete N-ary tree stored breadth-first in a flat array:
//! the root is index 0 and the children of node `i` are
//! `B*i+1 ..= B*i+B`. Leaf `k` (first leaf at `leaf_offset`) implicitly
//! covers a batch of consecutive cell ids (no per-cell lists are stored);
//! batches hold `B` cells unless the depth cap forces wider batches.
//! Nodes hold only coarse min/max ranges, so traversal re-reads the scalar
//! field to test each candidate cell exactly; the tree prunes leaf batches,
//! it does not cache per-cell ranges.

use serde::{Deserialize, Serialize};
use tracing::debug;
use trivis_core::{next_stamp, Error, LinkedMesh, Result};

const DEFAULT_BRANCHING_FACTOR: usize = 3;
const DEFAULT_MAX_LEVEL: usize = 20;

/// Scalar min/max spanned by a tree node's subtree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarRange {
    pub min: f32,
    pub max: f32,
}

impl ScalarRange {
    fn empty() -> Self {
        Self {
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
        }
    }

    /// Whether `value` lies inside the closed interval
    pub fn contains(&self, value: f32) -> bool {
        self.min <= value && value <= self.max
    }

    fn expand(&mut self, scalar: f32) {
        self.min = self.min.min(scalar);
        self.max = self.max.max(scalar);
    }

    fn union(&mut self, other: &ScalarRange) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }
}

/// Hierarchical min/max index over the cells of a [`LinkedMesh`].
///
/// Building is lazy and memoized: [`ScalarTree::build`] is a no-op unless the
/// mesh (or the tree's own configuration) has been modified since the last
/// build. Queries go through [`ScalarTree::traverse`], which returns an
/// iterator over the qualifying cells; the `&mut self` borrow means one
/// traversal is active per tree at a time.
#[derive(Debug, Clone)]
pub struct ScalarTree {
    branching_factor: usize,
    max_level: usize,
    level: usize,
    leaf_offset: usize,
    /// Cells covered per leaf; equals the branching factor unless the depth
    /// cap forced wider batches
    cells_per_leaf: usize,
    tree: Vec<ScalarRange>,
    build_stamp: u64,
    config_stamp: u64,
    build_count: usize,
}

impl ScalarTree {
    pub fn new() -> Self {
        Self {
            branching_factor: DEFAULT_BRANCHING_FACTOR,
            max_level: DEFAULT_MAX_LEVEL,
            level: 0,
            leaf_offset: 0,
            cells_per_leaf: 0,
            tree: Vec::new(),
            build_stamp: 0,
            config_stamp: next_stamp(),
            build_count: 0,
        }
    }

    /// Set the branching factor (children per node, cells per leaf batch)
    pub fn set_branching_factor(&mut self, branching_factor: usize) {
        self.branching_factor = branching_factor.max(2);
        self.config_stamp = next_stamp();
    }

    /// Set the maximum tree depth
    pub fn set_max_level(&mut self, max_level: usize) {
        self.max_level = max_level.max(1);
        self.config_stamp = next_stamp();
    }

    pub fn branching_factor(&self) -> usize {
        self.branching_factor
    }

    /// Range spanned by the whole dataset, if the tree has been built
    pub fn root_range(&self) -> Option<&ScalarRange> {
        self.tree.first()
    }

    /// Number of times the tree has actually been (re)computed
    pub fn build_count(&self) -> usize {
        self.build_count
    }

    /// Drop the tree; the next build recomputes from scratch
    pub fn initialize(&mut self) {
        self.tree = Vec::new();
        self.level = 0;
        self.leaf_offset = 0;
        self.cells_per_leaf = 0;
        self.build_stamp = 0;
    }

    /// Build (or reuse) the min/max index for `mesh`.
    ///
    /// Returns without recomputing when the existing tree is newer than both
    /// the mesh's modification stamp and this tree's configuration stamp.
    pub fn build(&mut self, mesh: &LinkedMesh) -> Result<()> {
        if !self.tree.is_empty()
            && self.build_stamp > mesh.modified()
            && self.build_stamp > self.config_stamp
        {
            return Ok(());
        }

        if mesh.live_cell_count() == 0 {
            return Err(Error::InvalidData("no cells to index".to_string()));
        }
        let scalars = mesh
            .scalars()
            .ok_or_else(|| Error::InvalidData("mesh has no scalar field".to_string()))?;

        let branching = self.branching_factor;
        let num_cells = mesh.cell_count();
        let num_leafs = num_cells.div_ceil(branching);

        let mut level = 1;
        let mut leaf_capacity = branching;
        while leaf_capacity < num_leafs && level < self.max_level {
            leaf_capacity *= branching;
            level += 1;
        }
        // When the depth cap truncates the tree, widen the per-leaf batch so
        // the available leaves still cover every cell
        let cells_per_leaf = branching.max(num_cells.div_ceil(leaf_capacity));
        let num_leafs = num_cells.div_ceil(cells_per_leaf);
        // Geometric series: internal nodes above the leaf level
        let leaf_offset = (leaf_capacity - 1) / (branching - 1);
        let tree_size = leaf_offset + leaf_capacity;

        let mut tree = vec![ScalarRange::empty(); tree_size];

        // Leaf pass: each leaf spans a batch of consecutive cell ids
        for leaf in 0..num_leafs {
            let node = &mut tree[leaf_offset + leaf];
            let first = leaf * cells_per_leaf;
            for cell in first..(first + cells_per_leaf).min(num_cells) {
                let Some(verts) = mesh.cell(cell) else {
                    continue;
                };
                for &v in &verts {
                    node.expand(scalars[v]);
                }
            }
        }

        // Bottom-up union of child ranges
        for node in (0..leaf_offset).rev() {
            let first_child = branching * node + 1;
            for child in first_child..(first_child + branching).min(tree_size) {
                let range = tree[child];
                tree[node].union(&range);
            }
        }

        self.level = level;
        self.leaf_offset = leaf_offset;
        self.cells_per_leaf = cells_per_leaf;
        self.tree = tree;
        self.build_stamp = next_stamp();
        self.build_count += 1;

        debug!(
            nodes = self.tree.len(),
            level = self.level,
            cells = num_cells,
            "scalar tree built"
        );
        Ok(())
    }

    /// Begin a threshold query: build (or reuse) the tree, then return an
    /// iterator over every live cell whose scalar range contains `value`.
    pub fn traverse<'a>(&'a mut self, mesh: &'a LinkedMesh, value: f32) -> Result<TreeCells<'a>> {
        self.build(mesh)?;
        let scalars = mesh
            .scalars()
            .ok_or_else(|| Error::InvalidData("mesh has no scalar field".to_string()))?;
        let leaf = self.find_start_leaf(0, value);
        Ok(TreeCells {
            tree: self,
            mesh,
            scalars,
            value,
            leaf,
            offset: 0,
        })
    }

    /// Depth-first leftmost descent to the first leaf containing `value`
    fn find_start_leaf(&self, node: usize, value: f32) -> Option<usize> {
        if node >= self.tree.len() || !self.tree[node].contains(value) {
            return None;
        }
        if node >= self.leaf_offset {
            return Some(node);
        }
        let first_child = self.branching_factor * node + 1;
        (first_child..first_child + self.branching_factor)
            .find_map(|child| self.find_start_leaf(child, value))
    }

    /// Next qualifying leaf after `node`: scan right siblings, then ascend
    fn find_next_leaf(&self, mut node: usize, value: f32) -> Option<usize> {
        while node != 0 {
            let parent = (node - 1) / self.branching_factor;
            let last_sibling = self.branching_factor * parent + self.branching_factor;
            for sibling in (node + 1)..=last_sibling {
                if let Some(leaf) = self.find_start_leaf(sibling, value) {
                    return Some(leaf);
                }
            }
            node = parent;
        }
        None
    }
}

impl Default for ScalarTree {
    fn default() -> Self {
        Self::new()
    }
}

/// A cell yielded by a scalar tree traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeCell {
    pub id: usize,
    pub points: [usize; 3],
}

/// Iterator over the cells whose scalar range contains the query value.
///
/// Candidate cells come from leaf batches whose cached range contains the
/// value; each candidate's actual range is recomputed from the scalar field
/// before it is yielded.
pub struct TreeCells<'a> {
    tree: &'a ScalarTree,
    mesh: &'a LinkedMesh,
    scalars: &'a [f32],
    value: f32,
    leaf: Option<usize>,
    offset: usize,
}

impl<'a> TreeCells<'a> {
    /// Copy the query-time scalars of a yielded cell into `out`
    pub fn cell_scalars_into(&self, cell: &TreeCell, out: &mut [f32; 3]) {
        for (o, &v) in out.iter_mut().zip(cell.points.iter()) {
            *o = self.scalars[v];
        }
    }
}

impl<'a> Iterator for TreeCells<'a> {
    type Item = TreeCell;

    fn next(&mut self) -> Option<TreeCell> {
        loop {
            let leaf = self.leaf?;
            let batch = self.tree.cells_per_leaf;
            let first = (leaf - self.tree.leaf_offset) * batch;

            while self.offset < batch {
                let cell = first + self.offset;
                self.offset += 1;
                if cell >= self.mesh.cell_count() {
                    break;
                }
                let Some(verts) = self.mesh.cell(cell) else {
                    continue;
                };
                let mut range = ScalarRange::empty();
                for &v in &verts {
                    range.expand(self.scalars[v]);
                }
                if range.contains(self.value) {
                    return Some(TreeCell {
                        id: cell,
                        points: verts,
                    });
                }
            }

            self.leaf = self.tree.find_next_leaf(leaf, self.value);
            self.offset = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use trivis_core::{Point3f, TriangleMesh};

    /// A strip of `n` triangles where cell `i` spans scalar range [i, i+2]
    fn make_strip(n: usize) -> LinkedMesh {
        let num_points = n + 2;
        let vertices = (0..num_points)
            .map(|i| Point3f::new(i as f32, (i % 2) as f32, 0.0))
            .collect();
        let faces = (0..n).map(|i| [i, i + 1, i + 2]).collect();
        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        mesh.set_scalars((0..num_points).map(|i| i as f32).collect());
        LinkedMesh::from_mesh(&mesh)
    }

    fn brute_force(mesh: &LinkedMesh, value: f32) -> Vec<usize> {
        let scalars = mesh.scalars().unwrap();
        (0..mesh.cell_count())
            .filter_map(|c| mesh.cell(c).map(|verts| (c, verts)))
            .filter(|(_, verts)| {
                let lo = verts.iter().map(|&v| scalars[v]).fold(f32::INFINITY, f32::min);
                let hi = verts
                    .iter()
                    .map(|&v| scalars[v])
                    .fold(f32::NEG_INFINITY, f32::max);
                lo <= value && value <= hi
            })
            .map(|(c, _)| c)
            .collect()
    }

    #[test]
    fn test_build_requires_scalars() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        let linked = LinkedMesh::from_mesh(&mesh);
        let mut tree = ScalarTree::new();
        assert!(tree.build(&linked).is_err());
    }

    #[test]
    fn test_build_requires_cells() {
        let mut mesh = TriangleMesh::new();
        mesh.add_vertex(Point3f::origin());
        mesh.scalars = Some(vec![0.0]);
        let linked = LinkedMesh::from_mesh(&mesh);
        let mut tree = ScalarTree::new();
        assert!(tree.build(&linked).is_err());
    }

    #[test]
    fn test_root_range_covers_dataset() {
        let mesh = make_strip(50);
        let mut tree = ScalarTree::new();
        tree.build(&mesh).unwrap();
        let root = tree.root_range().unwrap();
        assert_relative_eq!(root.min, 0.0);
        assert_relative_eq!(root.max, 51.0);
    }

    #[test]
    fn test_containment_invariant() {
        let mesh = make_strip(100);
        let mut tree = ScalarTree::new();
        tree.build(&mesh).unwrap();

        let b = tree.branching_factor;
        for node in 0..tree.leaf_offset {
            let mut expected = ScalarRange::empty();
            for child in (b * node + 1)..=(b * node + b) {
                if child < tree.tree.len() {
                    expected.union(&tree.tree[child]);
                }
            }
            assert_eq!(tree.tree[node].min, expected.min, "node {node} min");
            assert_eq!(tree.tree[node].max, expected.max, "node {node} max");
        }
    }

    #[test]
    fn test_query_matches_brute_force() {
        let mesh = make_strip(100);
        let mut tree = ScalarTree::new();
        for value in [0.5, 13.0, 50.5, 99.9, 101.0] {
            let mut found: Vec<usize> =
                tree.traverse(&mesh, value).unwrap().map(|c| c.id).collect();
            found.sort_unstable();
            let mut expected = brute_force(&mesh, value);
            expected.sort_unstable();
            assert_eq!(found, expected, "value {value}");
        }
    }

    #[test]
    fn test_query_interior_value() {
        // 100 cells with ranges [i, i+2]; 50.5 lies in cells 49 and 50 only
        let mesh = make_strip(100);
        let mut tree = ScalarTree::new();
        let found: Vec<usize> = tree.traverse(&mesh, 50.5).unwrap().map(|c| c.id).collect();
        assert_eq!(found, vec![49, 50]);
    }

    #[test]
    fn test_query_outside_root_range() {
        let mesh = make_strip(20);
        let mut tree = ScalarTree::new();
        assert_eq!(tree.traverse(&mesh, -1.0).unwrap().count(), 0);
        assert_eq!(tree.traverse(&mesh, 1000.0).unwrap().count(), 0);
    }

    #[test]
    fn test_yields_points_and_scalars() {
        let mesh = make_strip(10);
        let mut tree = ScalarTree::new();
        let mut traversal = tree.traverse(&mesh, 4.5).unwrap();
        let cell = traversal.next().unwrap();
        assert_eq!(cell.points, [cell.id, cell.id + 1, cell.id + 2]);
        let mut buf = [0.0f32; 3];
        traversal.cell_scalars_into(&cell, &mut buf);
        assert_eq!(buf, [cell.id as f32, cell.id as f32 + 1.0, cell.id as f32 + 2.0]);
    }

    #[test]
    fn test_build_is_memoized() {
        let mut mesh = make_strip(30);
        let mut tree = ScalarTree::new();
        tree.build(&mesh).unwrap();
        assert_eq!(tree.build_count(), 1);

        // Unmodified mesh: no recomputation
        tree.build(&mesh).unwrap();
        assert_eq!(tree.build_count(), 1);

        // Topology mutation bumps the mesh stamp and forces a rebuild
        mesh.remove_cell(0);
        tree.build(&mesh).unwrap();
        assert_eq!(tree.build_count(), 2);

        // Reconfiguration also invalidates
        tree.set_branching_factor(4);
        tree.build(&mesh).unwrap();
        assert_eq!(tree.build_count(), 3);
    }

    #[test]
    fn test_tombstoned_cells_are_skipped() {
        let mut mesh = make_strip(100);
        mesh.remove_cell(49);
        let mut tree = ScalarTree::new();
        let found: Vec<usize> = tree.traverse(&mesh, 50.5).unwrap().map(|c| c.id).collect();
        assert_eq!(found, vec![50]);
    }

    #[test]
    fn test_initialize_drops_tree() {
        let mesh = make_strip(10);
        let mut tree = ScalarTree::new();
        tree.build(&mesh).unwrap();
        assert!(tree.root_range().is_some());
        tree.initialize();
        assert!(tree.root_range().is_none());
        tree.build(&mesh).unwrap();
        assert_eq!(tree.build_count(), 2);
    }

    #[test]
    fn test_alternate_branching_factors() {
        let mesh = make_strip(64);
        for b in [2, 3, 5, 8] {
            let mut tree = ScalarTree::new();
            tree.set_branching_factor(b);
            let mut found: Vec<usize> =
                tree.traverse(&mesh, 31.5).unwrap().map(|c| c.id).collect();
            found.sort_unstable();
            let mut expected = brute_force(&mesh, 31.5);
            expected.sort_unstable();
            assert_eq!(found, expected, "branching factor {b}");
        }
    }

    #[test]
    fn test_depth_cap_widens_leaf_batches() {
        // 100 cells overflow the leaf capacity of a depth-capped tree; the
        // batches widen to compensate and queries stay exact
        let mesh = make_strip(100);
        for max_level in [1, 2] {
            let mut tree = ScalarTree::new();
            tree.set_max_level(max_level);
            tree.build(&mesh).unwrap();
            let root = tree.root_range().unwrap();
            assert_relative_eq!(root.min, 0.0);
            assert_relative_eq!(root.max, 101.0);
            let mut found: Vec<usize> =
                tree.traverse(&mesh, 50.5).unwrap().map(|c| c.id).collect();
            found.sort_unstable();
            assert_eq!(found, vec![49, 50], "max level {max_level}");
        }
    }

    #[test]
    fn test_single_cell_dataset() {
        let mesh = make_strip(1);
        let mut tree = ScalarTree::new();
        let found: Vec<usize> = tree.traverse(&mesh, 1.0).unwrap().map(|c| c.id).collect();
        assert_eq!(found, vec![0]);
    }
}

//! Editable indexed triangle mesh with point-to-cell adjacency links
//!
//! [`LinkedMesh`] is the mutable working form of a [`TriangleMesh`]: the
//! connectivity is copied so cells can be inserted and removed, and every
//! point keeps a list of the live cells that reference it ("links"). The
//! link lists are maintained by [`LinkedMesh::remove_cell`] and
//! [`LinkedMesh::insert_cell`]; no other operation mutates topology, so the
//! cross-references cannot drift out of sync.

use crate::mesh::TriangleMesh;
use crate::point::*;
use crate::stamp::next_stamp;

/// Sentinel stored in `verts[0]` of a deleted cell slot.
const TOMBSTONE: usize = usize::MAX;

/// An indexed triangle mesh with editable connectivity and point→cell links.
#[derive(Debug, Clone)]
pub struct LinkedMesh {
    points: Vec<Point3f>,
    normals: Option<Vec<Vector3f>>,
    colors: Option<Vec<[u8; 3]>>,
    scalars: Option<Vec<f32>>,
    /// Cell slots; a removed cell is tombstoned, never compacted in place
    cells: Vec<[usize; 3]>,
    /// Live cell ids incident to each point
    links: Vec<Vec<usize>>,
    live_cells: usize,
    modified: u64,
}

impl LinkedMesh {
    /// Build an editable copy of a triangle mesh, with links.
    pub fn from_mesh(mesh: &TriangleMesh) -> Self {
        let mut links = vec![Vec::new(); mesh.vertices.len()];
        for (ci, face) in mesh.faces.iter().enumerate() {
            for &v in face {
                links[v].push(ci);
            }
        }
        Self {
            points: mesh.vertices.clone(),
            normals: mesh.normals.clone(),
            colors: mesh.colors.clone(),
            scalars: mesh.scalars.clone(),
            cells: mesh.faces.clone(),
            links,
            live_cells: mesh.faces.len(),
            modified: next_stamp(),
        }
    }

    /// Number of points (never shrinks; unused points are dropped on output)
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Number of cell slots, including tombstones
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of live (non-tombstoned) cells
    pub fn live_cell_count(&self) -> usize {
        self.live_cells
    }

    /// Modification stamp; strictly increases with every topology change
    pub fn modified(&self) -> u64 {
        self.modified
    }

    pub fn points(&self) -> &[Point3f] {
        &self.points
    }

    pub fn point(&self, id: usize) -> Point3f {
        self.points[id]
    }

    /// Per-point scalar field, if present
    pub fn scalars(&self) -> Option<&[f32]> {
        self.scalars.as_deref()
    }

    /// The vertex ids of a live cell, or `None` for a tombstone
    pub fn cell(&self, id: usize) -> Option<[usize; 3]> {
        let c = self.cells[id];
        if c[0] == TOMBSTONE {
            None
        } else {
            Some(c)
        }
    }

    /// Live cells incident to a point
    pub fn point_cells(&self, point: usize) -> &[usize] {
        &self.links[point]
    }

    /// Live cells other than `cell` that share the edge `p0`-`p1`
    pub fn cell_edge_neighbors(&self, cell: usize, p0: usize, p1: usize) -> Vec<usize> {
        self.links[p0]
            .iter()
            .copied()
            .filter(|&c| c != cell && self.cells[c].contains(&p1))
            .collect()
    }

    /// Whether any live cell uses the edge `a`-`b`
    pub fn is_edge(&self, a: usize, b: usize) -> bool {
        self.links[a].iter().any(|&c| self.cells[c].contains(&b))
    }

    /// Whether a live cell with exactly the vertices `a`, `b`, `c` exists
    pub fn has_cell(&self, a: usize, b: usize, c: usize) -> bool {
        self.links[a]
            .iter()
            .any(|&ci| self.cells[ci].contains(&b) && self.cells[ci].contains(&c))
    }

    /// Copy the per-point scalars of a cell's vertices into `out`.
    /// Returns false if the mesh has no scalar field or the cell is dead.
    pub fn cell_scalars_into(&self, cell: usize, out: &mut [f32; 3]) -> bool {
        let (Some(scalars), Some(verts)) = (self.scalars.as_ref(), self.cell(cell)) else {
            return false;
        };
        for (o, &v) in out.iter_mut().zip(verts.iter()) {
            *o = scalars[v];
        }
        true
    }

    /// Tombstone a cell and strip the back-links from its points.
    pub fn remove_cell(&mut self, cell: usize) {
        let verts = self.cells[cell];
        if verts[0] == TOMBSTONE {
            return;
        }
        for &v in &verts {
            self.links[v].retain(|&c| c != cell);
        }
        self.cells[cell] = [TOMBSTONE; 3];
        self.live_cells -= 1;
        self.modified = next_stamp();
    }

    /// Append a new cell and add back-links to its points. Returns its id.
    pub fn insert_cell(&mut self, verts: [usize; 3]) -> usize {
        let id = self.cells.len();
        self.cells.push(verts);
        for &v in &verts {
            self.links[v].push(id);
        }
        self.live_cells += 1;
        self.modified = next_stamp();
        id
    }

    /// Compact into a triangle mesh: points still referenced by a live cell
    /// are renumbered densely, attributes follow, tombstones are dropped.
    ///
    /// `replacement_scalars`, indexed by the original point ids, supersedes
    /// the carried-through scalar field when given.
    pub fn into_triangle_mesh(self, replacement_scalars: Option<&[f32]>) -> TriangleMesh {
        let mut remap = vec![TOMBSTONE; self.points.len()];
        let mut vertices = Vec::new();
        let mut normals = self.normals.as_ref().map(|_| Vec::new());
        let mut colors = self.colors.as_ref().map(|_| Vec::new());
        let mut scalars = if replacement_scalars.is_some() || self.scalars.is_some() {
            Some(Vec::new())
        } else {
            None
        };

        for (i, link) in self.links.iter().enumerate() {
            if link.is_empty() {
                continue;
            }
            remap[i] = vertices.len();
            vertices.push(self.points[i]);
            if let (Some(out), Some(src)) = (normals.as_mut(), self.normals.as_ref()) {
                out.push(src[i]);
            }
            if let (Some(out), Some(src)) = (colors.as_mut(), self.colors.as_ref()) {
                out.push(src[i]);
            }
            if let Some(out) = scalars.as_mut() {
                if let Some(repl) = replacement_scalars {
                    out.push(repl[i]);
                } else if let Some(src) = self.scalars.as_ref() {
                    out.push(src[i]);
                }
            }
        }

        let mut faces = Vec::with_capacity(self.live_cells);
        for cell in &self.cells {
            if cell[0] == TOMBSTONE {
                continue;
            }
            faces.push([remap[cell[0]], remap[cell[1]], remap[cell[2]]]);
        }

        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        if let Some(n) = normals {
            mesh.set_normals(n);
        }
        if let Some(c) = colors {
            mesh.set_colors(c);
        }
        if let Some(s) = scalars {
            mesh.set_scalars(s);
        }
        mesh
    }
}

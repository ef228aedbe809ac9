//! Greedy vertex decimation
//!
//! Implements iterative vertex removal over an editable indexed mesh: each
//! sweep classifies the ring of triangles around a vertex, tests the vertex
//! against a distance-to-plane or distance-to-line criterion, re-triangulates
//! the hole the removal would leave, and commits the change only when the
//! realized geometric error fits the vertex's remaining error budget. Error
//! thresholds grow across outer iterations until the target reduction is
//! reached or the iteration budget runs out.

use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::Vector3;
use tracing::{debug, warn};
use trivis_core::{Bounded, Error, LinkedMesh, Point3f, Result, TriangleMesh, Vector3f};

use crate::stats::{DecimationResult, DecimationStats};
use crate::MeshDecimator;

/// Side-test tolerance as a fraction of the bounding box diagonal
const TOLERANCE_FRACTION: f32 = 1.0e-5;

/// Degree-cap warnings emitted per run before going quiet
const MAX_DEGREE_WARNINGS: usize = 5;

// ============================================================
// Vertex ring scratch state
// ============================================================

/// Classification of the vertex under evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VertexKind {
    /// Closed interior fan with no sharp edges
    Simple,
    /// Open fan terminating on mesh boundary edges
    Boundary,
    /// Closed fan crossed by two or more feature edges
    InteriorEdge,
    /// Closed fan with exactly one feature edge
    Corner,
}

#[derive(Debug, Clone, Copy)]
struct RingVertex {
    id: usize,
    coord: Point3f,
}

/// The ordered ring of neighbors and incident triangles around a vertex.
///
/// For a closed ring, `verts[i]` and `verts[i+1]` bound `tris[i]`, in the
/// winding order of the input triangles; a boundary ring is the open path
/// between the two boundary edges, in the same orientation.
struct Ring {
    verts: Vec<RingVertex>,
    tris: Vec<usize>,
    kind: VertexKind,
    /// Area-weighted average plane of the ring
    normal: Vector3f,
    origin: Point3f,
    /// Ring indices of the two vertices defining the feature/boundary line
    fedges: [usize; 2],
}

/// Per-elimination scratch threaded through the recursive triangulation
struct SplitContext {
    /// Position of the vertex being removed
    point: Point3f,
    /// Average plane normal of the ring (orients splitting planes)
    plane_normal: Vector3f,
    tolerance: f32,
    /// Minimum acceptable `min_dist² / chord_len²` for a split
    aspect_threshold: f32,
    /// Candidate replacement triangles, by vertex id
    new_tris: Vec<[usize; 3]>,
    /// Minimum distance from `point` to any splitting plane used so far
    split_error: f32,
}

fn squared_distance_to_line(x: &Point3f, a: &Point3f, b: &Point3f) -> f32 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 == 0.0 {
        return f32::INFINITY;
    }
    (x - a).cross(&ab).norm_squared() / len2
}

/// Minimum perpendicular distance from `x` to the candidate triangulation:
/// the smaller of the closest new-triangle plane and the closest splitting
/// plane encountered while subdividing the ring.
fn realized_error(mesh: &LinkedMesh, new_tris: &[[usize; 3]], x: &Point3f, split_error: f32) -> f32 {
    let mut min_dist = split_error;
    for tri in new_tris {
        let a = mesh.point(tri[0]);
        let b = mesh.point(tri[1]);
        let c = mesh.point(tri[2]);
        let n = (b - a).cross(&(c - a));
        let norm = n.norm();
        if norm == 0.0 {
            continue;
        }
        min_dist = min_dist.min((n.dot(&(x - a)) / norm).abs());
    }
    min_dist
}

// ============================================================
// Decimator
// ============================================================

/// Greedy topology-preserving vertex decimator.
///
/// All thresholds are fractions of the mesh bounding-box diagonal except the
/// feature angles, which are in degrees. The error and angle thresholds grow
/// by their increments after every outer iteration, so early passes remove
/// only the flattest vertices and later passes work progressively harder.
#[derive(Debug, Clone)]
pub struct Decimator {
    /// Stop once this fraction of the input triangles has been removed
    pub target_reduction: f32,
    /// Error tolerance for the first outer iteration
    pub initial_error: f32,
    /// Error tolerance growth per outer iteration
    pub error_increment: f32,
    /// Cap on the error tolerance
    pub maximum_error: f32,
    /// Dihedral feature angle (degrees) for the first outer iteration
    pub initial_feature_angle: f32,
    /// Feature angle growth per outer iteration (degrees)
    pub feature_angle_increment: f32,
    /// Cap on the feature angle (degrees)
    pub maximum_feature_angle: f32,
    /// Outer iteration budget
    pub maximum_iterations: usize,
    /// Sweeps per outer iteration
    pub maximum_sub_iterations: usize,
    /// Minimum allowed ratio for splitting a loop into two sub-loops
    pub aspect_ratio: f32,
    /// Valence cap; vertices with this many or more incident cells are
    /// never eliminated
    pub degree: usize,
    /// Keep feature-edge and corner vertices unless split-eliminated
    pub preserve_edges: bool,
    /// Allow eliminating boundary and interior-edge vertices by loop splitting
    pub boundary_vertex_deletion: bool,
    /// Attach the accumulated per-vertex error as the output scalar field
    pub generate_error_scalars: bool,
}

impl Default for Decimator {
    fn default() -> Self {
        Self {
            target_reduction: 0.90,
            initial_error: 0.0,
            error_increment: 0.005,
            maximum_error: 0.1,
            initial_feature_angle: 30.0,
            feature_angle_increment: 0.0,
            maximum_feature_angle: 60.0,
            maximum_iterations: 6,
            maximum_sub_iterations: 2,
            aspect_ratio: 25.0,
            degree: 25,
            preserve_edges: true,
            boundary_vertex_deletion: true,
            generate_error_scalars: false,
        }
    }
}

impl MeshDecimator for Decimator {
    fn decimate(&self, mesh: &TriangleMesh) -> Result<DecimationResult> {
        let cancel = AtomicBool::new(false);
        self.decimate_with_cancel(mesh, &cancel)
    }
}

impl Decimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target triangle reduction fraction
    pub fn with_target_reduction(mut self, target: f32) -> Self {
        self.target_reduction = target;
        self
    }

    /// Set the initial error tolerance (fraction of the bounding box diagonal)
    pub fn with_initial_error(mut self, error: f32) -> Self {
        self.initial_error = error;
        self
    }

    /// Enable or disable boundary/interior-edge vertex deletion
    pub fn with_boundary_vertex_deletion(mut self, enabled: bool) -> Self {
        self.boundary_vertex_deletion = enabled;
        self
    }

    /// Enable or disable feature edge preservation
    pub fn with_preserve_edges(mut self, enabled: bool) -> Self {
        self.preserve_edges = enabled;
        self
    }

    /// Attach accumulated per-vertex error as output scalars
    pub fn with_error_scalars(mut self, enabled: bool) -> Self {
        self.generate_error_scalars = enabled;
        self
    }

    /// Decimate with a cooperative cancellation flag.
    ///
    /// The flag is polled once per processed vertex; when it is set the
    /// current sweep terminates and whatever has been eliminated so far is
    /// returned as a valid, if incomplete, result.
    pub fn decimate_with_cancel(
        &self,
        input: &TriangleMesh,
        cancel: &AtomicBool,
    ) -> Result<DecimationResult> {
        if input.is_empty() {
            return Err(Error::InvalidData("mesh is empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.target_reduction) {
            return Err(Error::InvalidData(
                "target reduction must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.degree < 3 {
            return Err(Error::InvalidData(
                "degree cap must allow at least a triangle ring".to_string(),
            ));
        }
        if self.aspect_ratio <= 1.0 {
            return Err(Error::InvalidData(
                "aspect ratio must exceed 1.0".to_string(),
            ));
        }

        let original = input.face_count();
        let mut mesh = LinkedMesh::from_mesh(input);
        let diagonal = mesh.diagonal_length();
        if diagonal <= 0.0 {
            return Err(Error::InvalidData(
                "mesh has a degenerate bounding box".to_string(),
            ));
        }
        let tolerance = TOLERANCE_FRACTION * diagonal;
        let error_cap = self.maximum_error * diagonal;

        let mut vertex_error = vec![0.0f32; mesh.point_count()];
        let mut stats = DecimationStats::default();
        let mut error = self.initial_error;
        let mut angle = self.initial_feature_angle;

        let reduction_of =
            |live: usize| (original - live) as f32 / original as f32;

        'outer: while stats.iterations < self.maximum_iterations
            && reduction_of(mesh.live_cell_count()) < self.target_reduction
        {
            stats.iterations += 1;
            let distance = error.min(self.maximum_error) * diagonal;
            let cos_angle = angle.min(self.maximum_feature_angle).to_radians().cos();

            for _ in 0..self.maximum_sub_iterations {
                let before = mesh.live_cell_count();
                for pt in 0..mesh.point_count() {
                    if cancel.load(Ordering::Relaxed) {
                        stats.cancelled = true;
                        break 'outer;
                    }
                    if reduction_of(mesh.live_cell_count()) >= self.target_reduction {
                        break;
                    }
                    self.evaluate_point(
                        &mut mesh,
                        pt,
                        distance,
                        cos_angle,
                        tolerance,
                        error_cap,
                        &mut vertex_error,
                        &mut stats,
                    );
                }
                debug!(
                    iteration = stats.iterations,
                    live = mesh.live_cell_count(),
                    "decimation sub-pass finished"
                );
                if mesh.live_cell_count() == before
                    || reduction_of(mesh.live_cell_count()) >= self.target_reduction
                {
                    break;
                }
            }

            error += self.error_increment;
            angle += self.feature_angle_increment;
        }

        let final_triangles = mesh.live_cell_count();
        debug!(original, final_triangles, "decimation finished");

        let out = if self.generate_error_scalars {
            mesh.into_triangle_mesh(Some(&vertex_error))
        } else {
            mesh.into_triangle_mesh(None)
        };
        Ok(DecimationResult {
            mesh: out,
            original_triangles: original,
            final_triangles,
            stats,
        })
    }

    /// Evaluate one vertex: classify its ring, test it against the error
    /// budget, and commit the re-triangulation when everything passes.
    #[allow(clippy::too_many_arguments)]
    fn evaluate_point(
        &self,
        mesh: &mut LinkedMesh,
        pt: usize,
        distance: f32,
        cos_angle: f32,
        tolerance: f32,
        error_cap: f32,
        vertex_error: &mut [f32],
        stats: &mut DecimationStats,
    ) {
        if mesh.point_cells(pt).len() < 2 {
            return;
        }
        let budget = distance - vertex_error[pt];
        if budget <= 0.0 {
            return;
        }

        let Some(mut ring) = self.build_ring(mesh, pt, stats) else {
            return;
        };
        if !self.evaluate_ring(mesh, &mut ring, cos_angle, stats) {
            return;
        }

        let x = mesh.point(pt);
        let mut ctx = SplitContext {
            point: x,
            plane_normal: ring.normal,
            tolerance,
            aspect_threshold: 1.0 / (self.aspect_ratio * self.aspect_ratio),
            new_tris: Vec::with_capacity(ring.tris.len()),
            split_error: f32::INFINITY,
        };

        let plane_distance = ring.normal.dot(&(x - ring.origin)).abs();
        let ok = match ring.kind {
            VertexKind::Simple => {
                plane_distance < budget
                    && self.triangulate_loop(mesh, &mut ctx, &ring.verts, stats)
            }
            VertexKind::Corner | VertexKind::InteriorEdge if !self.preserve_edges => {
                plane_distance < budget
                    && self.triangulate_loop(mesh, &mut ctx, &ring.verts, stats)
            }
            VertexKind::InteriorEdge if self.boundary_vertex_deletion => {
                let a = ring.verts[ring.fedges[0]];
                let b = ring.verts[ring.fedges[1]];
                squared_distance_to_line(&x, &a.coord, &b.coord) < budget * budget
                    && self.split_and_triangulate(mesh, &mut ctx, &ring, stats)
            }
            VertexKind::Boundary if self.boundary_vertex_deletion => {
                let last = ring.verts.len() - 1;
                let a = ring.verts[0];
                let b = ring.verts[last];
                squared_distance_to_line(&x, &a.coord, &b.coord) < budget * budget
                    && match self.can_split(mesh, &ctx, &ring.verts, 0, last) {
                        Some((_, point_dist)) => {
                            ctx.split_error = ctx.split_error.min(point_dist);
                            self.triangulate_loop(mesh, &mut ctx, &ring.verts, stats)
                        }
                        None => {
                            stats.failed_splits += 1;
                            false
                        }
                    }
            }
            _ => false,
        };
        if !ok {
            return;
        }

        let realized = realized_error(mesh, &ctx.new_tris, &x, ctx.split_error);
        if realized > budget {
            stats.error_rejections += 1;
            return;
        }

        // Commit: remove the star, insert the replacement triangulation, and
        // spread the realized error over every vertex left in the ring.
        // Accumulated error never exceeds the maximum error distance.
        let incident: Vec<usize> = mesh.point_cells(pt).to_vec();
        for cell in incident {
            mesh.remove_cell(cell);
        }
        for tri in &ctx.new_tris {
            mesh.insert_cell(*tri);
        }
        for v in &ring.verts {
            vertex_error[v.id] = (vertex_error[v.id] + realized).min(error_cap);
        }

        match ring.kind {
            VertexKind::Simple => stats.simple_eliminated += 1,
            VertexKind::Boundary => stats.boundary_eliminated += 1,
            VertexKind::InteriorEdge => stats.interior_edge_eliminated += 1,
            VertexKind::Corner => stats.corner_eliminated += 1,
        }
    }

    /// Walk the edge-neighbor links around `pt`, producing the ordered ring
    /// of neighbor vertices and incident triangles. Returns `None` (and
    /// bumps the matching counter) for complex or non-manifold stars.
    fn build_ring(
        &self,
        mesh: &LinkedMesh,
        pt: usize,
        stats: &mut DecimationStats,
    ) -> Option<Ring> {
        let cells = mesh.point_cells(pt);
        let ncells = cells.len();
        if ncells >= self.degree {
            stats.degree_overflows += 1;
            if stats.degree_overflows <= MAX_DEGREE_WARNINGS {
                warn!(
                    point = pt,
                    valence = ncells,
                    cap = self.degree,
                    "vertex valence exceeds degree cap, treating as complex"
                );
            }
            return None;
        }

        let start = cells[0];
        let start_verts = mesh.cell(start)?;
        let at = start_verts.iter().position(|&v| v == pt)?;
        let v1 = start_verts[(at + 1) % 3];
        let v2 = start_verts[(at + 2) % 3];

        let ring_vertex = |id: usize| RingVertex {
            id,
            coord: mesh.point(id),
        };

        let mut verts = vec![ring_vertex(v1), ring_vertex(v2)];
        let mut tris = vec![start];
        let mut boundary = false;

        // Forward walk: cross the edge (pt, last vertex) into the next
        // triangle until the ring closes on v1 or hits a boundary
        let mut tri = start;
        let mut vert = v2;
        loop {
            let neighbors = mesh.cell_edge_neighbors(tri, pt, vert);
            if neighbors.len() > 1 {
                stats.non_manifold_edges += 1;
                return None;
            }
            let Some(&next) = neighbors.first() else {
                boundary = true;
                break;
            };
            let next_verts = mesh.cell(next)?;
            let &third = next_verts.iter().find(|&&v| v != pt && v != vert)?;
            if third == v1 {
                tris.push(next);
                break;
            }
            if tris.len() >= ncells {
                stats.complex_vertices += 1;
                return None;
            }
            verts.push(ring_vertex(third));
            tris.push(next);
            tri = next;
            vert = third;
        }

        if !boundary {
            if tris.len() != ncells || verts.len() < 3 {
                stats.complex_vertices += 1;
                return None;
            }
            return Some(Ring {
                verts,
                tris,
                kind: VertexKind::Simple,
                normal: Vector3::zeros(),
                origin: Point3f::origin(),
                fedges: [0, 0],
            });
        }

        // Boundary: reverse the partial ring and walk out of the other open
        // end, then reverse once more so list order keeps the input winding
        verts.reverse();
        tris.reverse();
        let mut tri = start;
        let mut vert = v1;
        loop {
            let neighbors = mesh.cell_edge_neighbors(tri, pt, vert);
            if neighbors.len() > 1 {
                stats.non_manifold_edges += 1;
                return None;
            }
            let Some(&next) = neighbors.first() else {
                break;
            };
            if tris.len() >= ncells {
                stats.complex_vertices += 1;
                return None;
            }
            let next_verts = mesh.cell(next)?;
            let &third = next_verts.iter().find(|&&v| v != pt && v != vert)?;
            verts.push(ring_vertex(third));
            tris.push(next);
            tri = next;
            vert = third;
        }
        if tris.len() != ncells {
            stats.complex_vertices += 1;
            return None;
        }
        verts.reverse();
        tris.reverse();

        Some(Ring {
            verts,
            tris,
            kind: VertexKind::Boundary,
            normal: Vector3::zeros(),
            origin: Point3f::origin(),
            fedges: [0, 0],
        })
    }

    /// Compute the ring's average plane and feature edges, refining the
    /// classification. Returns false for degenerate (zero-area) rings.
    fn evaluate_ring(
        &self,
        mesh: &LinkedMesh,
        ring: &mut Ring,
        cos_angle: f32,
        stats: &mut DecimationStats,
    ) -> bool {
        let ntris = ring.tris.len();
        let mut normals = Vec::with_capacity(ntris);
        let mut avg_normal: Vector3f = Vector3::zeros();
        let mut centroid: Vector3f = Vector3::zeros();
        let mut total_area = 0.0f32;

        for &t in &ring.tris {
            let Some(tv) = mesh.cell(t) else {
                return false;
            };
            let a = mesh.point(tv[0]);
            let b = mesh.point(tv[1]);
            let c = mesh.point(tv[2]);
            let n = (b - a).cross(&(c - a));
            let norm = n.norm();
            let area = 0.5 * norm;
            // Degenerate triangles contribute no normal
            let unit = if norm > 0.0 { n / norm } else { Vector3::zeros() };
            avg_normal += area * unit;
            centroid += area * ((a.coords + b.coords + c.coords) / 3.0);
            total_area += area;
            normals.push(unit);
        }

        if total_area <= 0.0 || avg_normal.norm() == 0.0 {
            stats.degenerate_rings += 1;
            return false;
        }
        ring.normal = avg_normal.normalize();
        ring.origin = Point3f::from(centroid / total_area);

        match ring.kind {
            VertexKind::Boundary => {
                // The split line for a boundary ring runs between its ends
                ring.fedges = [0, ring.verts.len() - 1];
            }
            _ => {
                // Ring edge i lies between tris[i-1] and tris[i]
                let mut num_fedges = 0;
                for i in 0..ntris {
                    let prev = normals[(i + ntris - 1) % ntris];
                    if prev.dot(&normals[i]) <= cos_angle {
                        if num_fedges < 2 {
                            ring.fedges[num_fedges] = i;
                        }
                        num_fedges += 1;
                    }
                }
                if num_fedges >= 2 {
                    ring.kind = VertexKind::InteriorEdge;
                } else if num_fedges == 1 {
                    ring.kind = VertexKind::Corner;
                }
            }
        }
        true
    }

    /// Split an interior-edge ring along its feature line and triangulate
    /// both sub-loops.
    fn split_and_triangulate(
        &self,
        mesh: &LinkedMesh,
        ctx: &mut SplitContext,
        ring: &Ring,
        stats: &mut DecimationStats,
    ) -> bool {
        let (i, j) = (ring.fedges[0], ring.fedges[1]);
        match self.can_split(mesh, ctx, &ring.verts, i, j) {
            None => {
                stats.failed_splits += 1;
                false
            }
            Some((_, point_dist)) => {
                ctx.split_error = ctx.split_error.min(point_dist);
                let loop1 = ring.verts[i..=j].to_vec();
                let mut loop2 = ring.verts[j..].to_vec();
                loop2.extend_from_slice(&ring.verts[..=i]);
                self.triangulate_loop(mesh, ctx, &loop1, stats)
                    && self.triangulate_loop(mesh, ctx, &loop2, stats)
            }
        }
    }

    /// Test whether the chord `verts[i]`-`verts[j]` may split the loop:
    /// the chord must not already be a mesh edge, every other loop vertex
    /// must sit strictly on its sub-loop's side of the splitting plane, and
    /// the aspect ratio `min_dist² / chord_len²` must clear the threshold.
    ///
    /// Returns the aspect ratio and the distance from the vertex being
    /// removed to the splitting plane.
    fn can_split(
        &self,
        mesh: &LinkedMesh,
        ctx: &SplitContext,
        verts: &[RingVertex],
        i: usize,
        j: usize,
    ) -> Option<(f32, f32)> {
        let a = &verts[i];
        let b = &verts[j];
        // An existing edge here would become non-manifold after the split
        if mesh.is_edge(a.id, b.id) {
            return None;
        }

        let chord = b.coord - a.coord;
        let len2 = chord.norm_squared();
        if len2 == 0.0 {
            return None;
        }
        let mut plane = chord.cross(&ctx.plane_normal);
        let norm = plane.norm();
        if norm == 0.0 {
            return None;
        }
        plane /= norm;

        let mut inner_sign: Option<f32> = None;
        let mut outer_sign: Option<f32> = None;
        let mut min_d2 = f32::INFINITY;
        for (k, v) in verts.iter().enumerate() {
            if k == i || k == j {
                continue;
            }
            let d = plane.dot(&(v.coord - a.coord));
            if d.abs() <= ctx.tolerance {
                return None;
            }
            let sign = d.signum();
            let side = if k > i && k < j {
                &mut inner_sign
            } else {
                &mut outer_sign
            };
            match side {
                Some(expected) if *expected != sign => return None,
                None => *side = Some(sign),
                _ => {}
            }
            min_d2 = min_d2.min(d * d);
        }
        if let (Some(s1), Some(s2)) = (inner_sign, outer_sign) {
            if s1 == s2 {
                return None;
            }
        }

        let aspect = min_d2 / len2;
        if aspect <= ctx.aspect_threshold {
            return None;
        }
        Some((aspect, plane.dot(&(ctx.point - a.coord)).abs()))
    }

    /// Recursively triangulate a loop of ring vertices by the best splitting
    /// chord, emitting candidate triangles into `ctx.new_tris`.
    ///
    /// The moment any 3-loop would duplicate an existing mesh triangle the
    /// whole triangulation aborts and the vertex is kept this pass; no
    /// alternate chords are attempted.
    fn triangulate_loop(
        &self,
        mesh: &LinkedMesh,
        ctx: &mut SplitContext,
        verts: &[RingVertex],
        stats: &mut DecimationStats,
    ) -> bool {
        let n = verts.len();
        if n < 3 {
            return true;
        }
        if n == 3 {
            let (a, b, c) = (verts[0].id, verts[1].id, verts[2].id);
            if mesh.has_cell(a, b, c) {
                stats.duplicate_triangles += 1;
                return false;
            }
            ctx.new_tris.push([a, b, c]);
            return true;
        }

        // Exhaustively test every non-adjacent vertex pair and keep the
        // chord with the best aspect ratio
        let mut best: Option<(usize, usize, f32, f32)> = None;
        for i in 0..n - 2 {
            for j in (i + 2)..n {
                if i == 0 && j == n - 1 {
                    continue;
                }
                if let Some((aspect, point_dist)) = self.can_split(mesh, ctx, verts, i, j) {
                    if best.map_or(true, |(_, _, best_aspect, _)| aspect > best_aspect) {
                        best = Some((i, j, aspect, point_dist));
                    }
                }
            }
        }
        let Some((i, j, _, point_dist)) = best else {
            stats.failed_splits += 1;
            return false;
        };

        ctx.split_error = ctx.split_error.min(point_dist);
        let loop1 = verts[i..=j].to_vec();
        let mut loop2 = verts[j..].to_vec();
        loop2.extend_from_slice(&verts[..=i]);
        self.triangulate_loop(mesh, ctx, &loop1, stats)
            && self.triangulate_loop(mesh, ctx, &loop2, stats)
    }
}

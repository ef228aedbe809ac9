//! Result and statistics types for decimation runs

use trivis_core::TriangleMesh;

/// Per-category counters accumulated over a decimation run.
///
/// Topological failures are expected on irregular meshes; they skip the
/// offending vertex and are tallied here rather than surfaced as errors.
#[derive(Debug, Clone, Default)]
pub struct DecimationStats {
    /// Rings that failed to close consistently
    pub complex_vertices: usize,
    /// Edges with more than one neighbor across them
    pub non_manifold_edges: usize,
    /// Vertices whose valence exceeded the configured degree cap
    pub degree_overflows: usize,
    /// Rings with zero total area or zero average normal
    pub degenerate_rings: usize,
    /// Split-line candidates rejected by the separation or aspect tests
    pub failed_splits: usize,
    /// Triangulations aborted because a new triangle already existed
    pub duplicate_triangles: usize,
    /// Candidate eliminations rejected by the realized-error check
    pub error_rejections: usize,
    /// Eliminated vertices by classification
    pub simple_eliminated: usize,
    pub boundary_eliminated: usize,
    pub interior_edge_eliminated: usize,
    pub corner_eliminated: usize,
    /// Outer iterations actually run
    pub iterations: usize,
    /// Whether the run was cancelled cooperatively
    pub cancelled: bool,
}

impl DecimationStats {
    /// Total vertices eliminated across all classifications
    pub fn vertices_eliminated(&self) -> usize {
        self.simple_eliminated
            + self.boundary_eliminated
            + self.interior_edge_eliminated
            + self.corner_eliminated
    }
}

/// Result of a decimation run.
#[derive(Debug, Clone)]
pub struct DecimationResult {
    /// The reduced mesh
    pub mesh: TriangleMesh,
    /// Number of triangles in the input mesh
    pub original_triangles: usize,
    /// Number of triangles in the output mesh
    pub final_triangles: usize,
    /// Run statistics
    pub stats: DecimationStats,
}

impl DecimationResult {
    /// Fraction of the input triangles removed, in `[0, 1]`
    pub fn reduction(&self) -> f32 {
        if self.original_triangles == 0 {
            0.0
        } else {
            (self.original_triangles - self.final_triangles) as f32
                / self.original_triangles as f32
        }
    }
}

impl std::fmt::Display for DecimationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Decimation: {} -> {} triangles ({:.1}% reduction, {} vertices eliminated)",
            self.original_triangles,
            self.final_triangles,
            self.reduction() * 100.0,
            self.stats.vertices_eliminated()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduction() {
        let result = DecimationResult {
            mesh: TriangleMesh::new(),
            original_triangles: 200,
            final_triangles: 50,
            stats: DecimationStats::default(),
        };
        assert!((result.reduction() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_reduction_empty() {
        let result = DecimationResult {
            mesh: TriangleMesh::new(),
            original_triangles: 0,
            final_triangles: 0,
            stats: DecimationStats::default(),
        };
        assert_eq!(result.reduction(), 0.0);
    }

    #[test]
    fn test_display() {
        let mut stats = DecimationStats::default();
        stats.simple_eliminated = 75;
        let result = DecimationResult {
            mesh: TriangleMesh::new(),
            original_triangles: 200,
            final_triangles: 50,
            stats,
        };
        let display = format!("{result}");
        assert!(display.contains("200"));
        assert!(display.contains("75.0%"));
    }
}

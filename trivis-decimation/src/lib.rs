//! Mesh decimation algorithms
//!
//! This crate reduces the triangle count of a manifold (or near-manifold)
//! triangulated surface while bounding introduced geometric error and
//! preserving sharp features. The engine iteratively removes vertices whose
//! local neighborhood is nearly planar, or nearly collinear along a feature
//! or boundary edge, and re-triangulates the resulting hole.

pub mod decimate;
pub mod stats;

pub use decimate::*;
pub use stats::*;

use trivis_core::{Result, TriangleMesh};

/// Reduce the triangle count of a mesh
pub trait MeshDecimator {
    /// Decimate the mesh, returning the reduced mesh and run statistics
    fn decimate(&self, mesh: &TriangleMesh) -> Result<DecimationResult>;
}

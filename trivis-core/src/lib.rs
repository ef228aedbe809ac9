//! Core data structures and traits for trivis
//!
//! This crate provides the shared mesh abstractions the trivis algorithm
//! crates operate on: point type aliases, a plain triangle surface type,
//! and an editable indexed mesh with point-to-cell adjacency links.

pub mod point;
pub mod mesh;
pub mod linked_mesh;
pub mod traits;
pub mod stamp;
pub mod error;

pub use point::*;
pub use mesh::*;
pub use linked_mesh::*;
pub use traits::*;
pub use stamp::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3};

/// Common result type for trivis operations
pub type Result<T> = std::result::Result<T, Error>;

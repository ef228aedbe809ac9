//! Scalar-range search tree
//!
//! This crate provides a pointerless, level-balanced interval tree over the
//! cells of an indexed mesh, keyed by the min/max of each cell's per-point
//! scalars. It accelerates repeated "find all cells whose scalar range
//! straddles value V" queries without re-scanning every cell.

pub mod tree;

pub use tree::*;

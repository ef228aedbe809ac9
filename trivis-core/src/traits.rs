//! Core traits for trivis

use crate::{linked_mesh::LinkedMesh, mesh::TriangleMesh, point::*};

/// Trait for objects with a spatial extent
pub trait Bounded {
    /// Get the bounding box of the object
    fn bounding_box(&self) -> (Point3f, Point3f);

    /// Get the center point of the object
    fn center(&self) -> Point3f {
        let (min, max) = self.bounding_box();
        Point3f::new(
            (min.x + max.x) / 2.0,
            (min.y + max.y) / 2.0,
            (min.z + max.z) / 2.0,
        )
    }

    /// Get the length of the bounding box diagonal
    fn diagonal_length(&self) -> f32 {
        let (min, max) = self.bounding_box();
        (max - min).norm()
    }
}

fn bounds_of_points(points: &[Point3f]) -> (Point3f, Point3f) {
    if points.is_empty() {
        return (Point3f::origin(), Point3f::origin());
    }

    let mut min = points[0];
    let mut max = points[0];

    for p in points {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        min.z = min.z.min(p.z);

        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
        max.z = max.z.max(p.z);
    }

    (min, max)
}

impl Bounded for TriangleMesh {
    fn bounding_box(&self) -> (Point3f, Point3f) {
        bounds_of_points(&self.vertices)
    }
}

impl Bounded for LinkedMesh {
    fn bounding_box(&self) -> (Point3f, Point3f) {
        bounds_of_points(self.points())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounding_box_diagonal() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(3.0, 4.0, 0.0),
                Point3f::new(0.0, 4.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        assert_relative_eq!(mesh.diagonal_length(), 5.0, epsilon = 1e-6);
        let c = mesh.center();
        assert_relative_eq!(c.x, 1.5, epsilon = 1e-6);
        assert_relative_eq!(c.y, 2.0, epsilon = 1e-6);
    }
}

use nalgebra::{Matrix3, Point2, Point3, Vector2, Vector3};

pub type Real = f64;

pub type Vec2 = Vector2<Real>;
pub type Vec3 = Vector3<Real>;
pub type Pt2 = Point2<Real>;
pub type Pt3 = Point3<Real>;
pub type Mat3 = Matrix3<Real>;

/// Lift a pixel to homogeneous coordinates `(u, v, 1)`.
pub fn to_homogeneous(p: &Pt2) -> Vec3 {
    Vec3::new(p.x, p.y, 1.0)
}

pub fn from_homogeneous(v: &Vec3) -> Pt2 {
    Pt2::new(v.x / v.z, v.y / v.z)
}

/// Undirected angle between two directions, in degrees within `[0, 90]`.
pub fn undirected_angle_deg(a: &Vec3, b: &Vec3) -> Real {
    let na = a.norm();
    let nb = b.norm();
    if na <= 0.0 || nb <= 0.0 {
        return 90.0;
    }
    let cos = (a.dot(b) / (na * nb)).abs().min(1.0);
    cos.acos().to_degrees()
}

/// Same as [`undirected_angle_deg`] for image-plane directions.
pub fn undirected_angle_deg_2d(a: &Vec2, b: &Vec2) -> Real {
    undirected_angle_deg(&Vec3::new(a.x, a.y, 0.0), &Vec3::new(b.x, b.y, 0.0))
}

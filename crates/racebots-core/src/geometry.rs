//! Planar geometry shared by course generation and agent sensing.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Tolerance used by [`quad_contains`].
pub const QUAD_EPSILON: f64 = 1e-2;

/// 2D vector / point.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `angle` (radians).
    #[must_use]
    pub fn from_angle(angle: f64) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// z-component of the 3D cross product.
    #[must_use]
    pub fn cross(self, other: Self) -> f64 {
        self.x * other.y - self.y * other.x
    }

    #[must_use]
    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (self - other).length()
    }

    /// Unit vector in the same direction, or zero for a zero vector.
    #[must_use]
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len > 0.0 { self * (1.0 / len) } else { Self::ZERO }
    }

    /// Same direction, length capped at `max`.
    #[must_use]
    pub fn limited(self, max: f64) -> Self {
        let len = self.length();
        if len > max && len > 0.0 {
            self * (max / len)
        } else {
            self
        }
    }

    /// Rotate counter-clockwise by `angle` radians.
    #[must_use]
    pub fn rotated(self, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    /// Counter-clockwise perpendicular.
    #[must_use]
    pub const fn perpendicular(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Angle of the vector in radians.
    #[must_use]
    pub fn heading(self) -> f64 {
        self.y.atan2(self.x)
    }

    #[must_use]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        self + (other - self) * t
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Vec2 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

/// Line segment used as a corridor wall or an obstacle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Boundary {
    pub a: Vec2,
    pub b: Vec2,
}

impl Boundary {
    #[must_use]
    pub const fn new(a: Vec2, b: Vec2) -> Self {
        Self { a, b }
    }

    #[must_use]
    pub fn length(&self) -> f64 {
        self.a.distance(self.b)
    }

    /// Shortest distance from `point` to any point of the segment.
    #[must_use]
    pub fn distance_to(&self, point: Vec2) -> f64 {
        let edge = self.b - self.a;
        let len_sq = edge.dot(edge);
        if len_sq == 0.0 {
            return point.distance(self.a);
        }
        let t = ((point - self.a).dot(edge) / len_sq).clamp(0.0, 1.0);
        point.distance(self.a + edge * t)
    }
}

/// Parameters of a proper crossing between a wall and a ray segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    /// Position along the wall, in `(0, 1)`.
    pub t: f64,
    /// Position along the ray segment, in `(0, 1)`.
    pub u: f64,
    pub point: Vec2,
}

/// Intersect wall `w1 -> w2` with segment `r1 -> r2`.
///
/// Both parameters must lie strictly inside `(0, 1)`; parallel segments never
/// intersect.
#[must_use]
pub fn segment_intersection(w1: Vec2, w2: Vec2, r1: Vec2, r2: Vec2) -> Option<Intersection> {
    let den = (w1.x - w2.x) * (r1.y - r2.y) - (w1.y - w2.y) * (r1.x - r2.x);
    if den == 0.0 {
        return None;
    }
    let t = ((w1.x - r1.x) * (r1.y - r2.y) - (w1.y - r1.y) * (r1.x - r2.x)) / den;
    let u = -((w1.x - w2.x) * (w1.y - r1.y) - (w1.y - w2.y) * (w1.x - r1.x)) / den;
    if t > 0.0 && t < 1.0 && u > 0.0 && u < 1.0 {
        Some(Intersection {
            t,
            u,
            point: w1 + (w2 - w1) * t,
        })
    } else {
        None
    }
}

/// Ray of finite length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec2,
    /// Unit direction.
    pub direction: Vec2,
    pub length: f64,
}

/// Where a ray struck a boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vec2,
    pub distance: f64,
}

impl Ray {
    #[must_use]
    pub fn new(origin: Vec2, direction: Vec2, length: f64) -> Self {
        Self {
            origin,
            direction: direction.normalized(),
            length,
        }
    }

    /// Ray from `origin` toward `target`, ending there.
    #[must_use]
    pub fn towards(origin: Vec2, target: Vec2) -> Self {
        Self::new(origin, target - origin, origin.distance(target))
    }

    #[must_use]
    pub fn end(&self) -> Vec2 {
        self.origin + self.direction * self.length
    }

    /// Hit against a single boundary.
    #[must_use]
    pub fn cast(&self, wall: &Boundary) -> Option<RayHit> {
        segment_intersection(wall.a, wall.b, self.origin, self.end()).map(|hit| RayHit {
            point: hit.point,
            distance: hit.u * self.length,
        })
    }

    /// Nearest hit among `walls`.
    #[must_use]
    pub fn cast_nearest<'a>(&self, walls: impl IntoIterator<Item = &'a Boundary>) -> Option<RayHit> {
        walls
            .into_iter()
            .filter_map(|wall| self.cast(wall))
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

/// Area of triangle `abc`.
#[must_use]
pub fn triangle_area(a: Vec2, b: Vec2, c: Vec2) -> f64 {
    (b - a).cross(c - a).abs() / 2.0
}

/// Quadrilateral spanned by two consecutive gates, corners in loop order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub corners: [Vec2; 4],
}

impl Quad {
    /// Quad with corners `left0, right0, right1, left1`.
    #[must_use]
    pub const fn between(left0: Vec2, right0: Vec2, left1: Vec2, right1: Vec2) -> Self {
        Self {
            corners: [left0, right0, right1, left1],
        }
    }

    /// Area as two triangles split on the `corners[0]`/`corners[2]` diagonal.
    #[must_use]
    pub fn area(&self) -> f64 {
        let [a, b, c, d] = self.corners;
        triangle_area(a, b, c) + triangle_area(a, c, d)
    }

    /// Sum of the four triangles the point forms with each edge.
    #[must_use]
    pub fn triangle_sum(&self, point: Vec2) -> f64 {
        (0..4)
            .map(|i| triangle_area(point, self.corners[i], self.corners[(i + 1) % 4]))
            .sum()
    }
}

/// Point-in-quad test: the triangle sum equals the quad area within `epsilon`.
#[must_use]
pub fn quad_contains(quad: &Quad, point: Vec2, epsilon: f64) -> bool {
    quad.triangle_sum(point) <= quad.area() + epsilon
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_segments_never_hit() {
        let wall = Boundary::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
        let ray = Ray::new(Vec2::new(0.0, 5.0), Vec2::new(1.0, 0.0), 20.0);
        assert!(ray.cast(&wall).is_none());
        assert!(
            segment_intersection(
                Vec2::new(0.0, 0.0),
                Vec2::new(4.0, 4.0),
                Vec2::new(0.0, 1.0),
                Vec2::new(4.0, 5.0)
            )
            .is_none()
        );
    }

    #[test]
    fn crossing_segments_hit_once() {
        let hit = segment_intersection(
            Vec2::new(0.0, 0.0),
            Vec2::new(4.0, 4.0),
            Vec2::new(0.0, 4.0),
            Vec2::new(4.0, 0.0),
        )
        .expect("segments cross");
        assert!((hit.t - 0.5).abs() < 1e-12);
        assert!((hit.u - 0.5).abs() < 1e-12);
        assert!(hit.point.distance(Vec2::new(2.0, 2.0)) < 1e-12);
    }

    #[test]
    fn ray_reports_distance_and_respects_length() {
        let wall = Boundary::new(Vec2::new(5.0, -3.0), Vec2::new(5.0, 3.0));
        let ray = Ray::new(Vec2::ZERO, Vec2::new(2.0, 0.0), 10.0);
        let hit = ray.cast(&wall).expect("in range");
        assert!((hit.distance - 5.0).abs() < 1e-9);

        let short = Ray::new(Vec2::ZERO, Vec2::new(1.0, 0.0), 4.0);
        assert!(short.cast(&wall).is_none());
    }

    #[test]
    fn nearest_hit_wins() {
        let walls = [
            Boundary::new(Vec2::new(8.0, -1.0), Vec2::new(8.0, 1.0)),
            Boundary::new(Vec2::new(3.0, -1.0), Vec2::new(3.0, 1.0)),
        ];
        let ray = Ray::new(Vec2::ZERO, Vec2::new(1.0, 0.0), 10.0);
        let hit = ray.cast_nearest(&walls).expect("hit");
        assert!((hit.distance - 3.0).abs() < 1e-9);
    }

    #[test]
    fn triangle_area_is_half_cross_magnitude() {
        let area = triangle_area(Vec2::ZERO, Vec2::new(4.0, 0.0), Vec2::new(0.0, 3.0));
        assert!((area - 6.0).abs() < 1e-12);
        let flipped = triangle_area(Vec2::ZERO, Vec2::new(0.0, 3.0), Vec2::new(4.0, 0.0));
        assert!((flipped - 6.0).abs() < 1e-12);
    }

    #[test]
    fn point_in_quad_uses_triangle_sum() {
        let quad = Quad::between(
            Vec2::new(0.0, 10.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(20.0, 12.0),
            Vec2::new(20.0, -2.0),
        );
        let inside = Vec2::new(10.0, 5.0);
        assert!((quad.triangle_sum(inside) - quad.area()).abs() < QUAD_EPSILON);
        assert!(quad_contains(&quad, inside, QUAD_EPSILON));

        let outside = Vec2::new(25.0, 5.0);
        assert!(quad.triangle_sum(outside) > quad.area() + QUAD_EPSILON);
        assert!(!quad_contains(&quad, outside, QUAD_EPSILON));
    }

    #[test]
    fn distance_to_segment_clamps_to_endpoints() {
        let wall = Boundary::new(Vec2::ZERO, Vec2::new(10.0, 0.0));
        assert!((wall.distance_to(Vec2::new(5.0, 3.0)) - 3.0).abs() < 1e-12);
        assert!((wall.distance_to(Vec2::new(13.0, 4.0)) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn rotation_and_limits() {
        let v = Vec2::new(1.0, 0.0).rotated(std::f64::consts::FRAC_PI_2);
        assert!(v.distance(Vec2::new(0.0, 1.0)) < 1e-12);
        assert!((Vec2::new(30.0, 40.0).limited(5.0).length() - 5.0).abs() < 1e-12);
        assert_eq!(Vec2::new(1.0, 1.0).limited(5.0), Vec2::new(1.0, 1.0));
    }
}

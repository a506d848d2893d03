//! Procedural closed corridors.
//!
//! Generation runs in stages: sample random points, wrap them in a convex
//! hull, drop a vertex if the count is odd, subdivide every edge with an
//! outward-displaced midpoint, relax angles and spacing, then sample a closed
//! cubic spline and widen it into gates. Layouts whose centre line or walls
//! cross themselves are resampled. The stages are public so renderers can
//! draw the intermediate layout.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::SimulationError;
use crate::config::CourseConfig;
use crate::geometry::{Boundary, Quad, Vec2, segment_intersection};

/// Gate across the corridor: both wall points and the centre-line point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CrossSection {
    pub left: Vec2,
    pub mid: Vec2,
    pub right: Vec2,
}

impl CrossSection {
    #[must_use]
    pub const fn new(left: Vec2, mid: Vec2, right: Vec2) -> Self {
        Self { left, mid, right }
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.left.distance(self.right)
    }

    fn is_finite(&self) -> bool {
        self.left.is_finite() && self.mid.is_finite() && self.right.is_finite()
    }
}

/// Closed loop of gates with optional per-gate obstacles.
///
/// Every accessor wraps its index, so section `len()` is section `0` again.
#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    sections: Vec<CrossSection>,
    obstacles: Vec<Option<Boundary>>,
}

/// Every intermediate stage of a generated course.
#[derive(Debug, Clone)]
pub struct CourseLayout {
    pub points: Vec<Vec2>,
    pub hull: Vec<Vec2>,
    /// Relaxed spline control points.
    pub control: Vec<Vec2>,
    pub course: Course,
}

impl Course {
    /// Obstacle-free course over `sections`.
    pub fn new(sections: Vec<CrossSection>) -> Result<Self, SimulationError> {
        if sections.len() < 3 {
            return Err(SimulationError::MalformedImport(format!(
                "a course needs at least 3 sections, got {}",
                sections.len()
            )));
        }
        if let Some(index) = sections.iter().position(|section| !section.is_finite()) {
            return Err(SimulationError::MalformedImport(format!(
                "section {index} has a non-finite coordinate"
            )));
        }
        let obstacles = vec![None; sections.len()];
        Ok(Self {
            sections,
            obstacles,
        })
    }

    /// Run the full generation pipeline.
    pub fn generate(config: &CourseConfig, rng: &mut dyn RngCore) -> Result<Self, SimulationError> {
        generate_layout(config, rng).map(|layout| layout.course)
    }

    /// Parse a JSON array of `{left, mid, right}` sections. Obstacles are not carried.
    pub fn from_json(text: &str) -> Result<Self, SimulationError> {
        let sections: Vec<CrossSection> = serde_json::from_str(text)
            .map_err(|err| SimulationError::MalformedImport(err.to_string()))?;
        Self::new(sections)
    }

    pub fn to_json(&self) -> Result<String, SimulationError> {
        Ok(serde_json::to_string(&self.sections)?)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    #[must_use]
    pub fn sections(&self) -> &[CrossSection] {
        &self.sections
    }

    #[must_use]
    pub fn section(&self, index: usize) -> &CrossSection {
        &self.sections[index % self.sections.len()]
    }

    #[must_use]
    pub fn obstacle(&self, index: usize) -> Option<&Boundary> {
        self.obstacles[index % self.obstacles.len()].as_ref()
    }

    /// Iterate over all obstacles that are present.
    pub fn obstacles(&self) -> impl Iterator<Item = &Boundary> + '_ {
        self.obstacles.iter().flatten()
    }

    /// Place (or clear) the obstacle on gate `index`.
    pub fn set_obstacle(&mut self, index: usize, obstacle: Option<Boundary>) {
        let len = self.obstacles.len();
        self.obstacles[index % len] = obstacle;
    }

    /// Quad between gate `index` and gate `index + 1`.
    #[must_use]
    pub fn quad(&self, index: usize) -> Quad {
        let near = self.section(index);
        let far = self.section(index + 1);
        Quad::between(near.left, near.right, far.left, far.right)
    }

    /// Left and right wall segments of quad `index`.
    #[must_use]
    pub fn walls(&self, index: usize) -> [Boundary; 2] {
        let near = self.section(index);
        let far = self.section(index + 1);
        [
            Boundary::new(near.left, far.left),
            Boundary::new(near.right, far.right),
        ]
    }

    /// Centre of gate 0 and the unit direction toward gate 1.
    #[must_use]
    pub fn start_pose(&self) -> (Vec2, Vec2) {
        let start = self.section(0);
        let ahead = self.section(1).mid - start.mid;
        let mut direction = (start.left - start.right).perpendicular().normalized();
        if direction == Vec2::ZERO {
            direction = ahead.normalized();
        } else if direction.dot(ahead) < 0.0 {
            direction = -direction;
        }
        (start.mid, direction)
    }

    /// Sum of centre-line segment lengths around the loop.
    #[must_use]
    pub fn length(&self) -> f64 {
        (0..self.len())
            .map(|i| self.section(i).mid.distance(self.section(i + 1).mid))
            .sum()
    }
}

/// Sample points, build the hull and spline, and decorate gates with obstacles.
///
/// Hulls with fewer than four vertices, corridors that cross themselves and
/// corridors with a folded quad are resampled, up to `max_attempts` tries in
/// total.
pub fn generate_layout(
    config: &CourseConfig,
    rng: &mut dyn RngCore,
) -> Result<CourseLayout, SimulationError> {
    for attempt in 1..=config.max_attempts {
        let points = sample_points(config, rng);
        let mut hull = convex_hull(&points);
        if hull.len() < 4 {
            debug!(attempt, vertices = hull.len(), "degenerate hull; resampling");
            continue;
        }
        force_even(&mut hull);
        let mut control = subdivide(&hull, config.midpoint_displacement, rng);
        relax(&mut control, config);
        let sections = spline_sections(&control, config);
        if !corridor_is_simple(&sections) {
            debug!(attempt, "corridor folds over itself; resampling");
            continue;
        }
        let mut course = Course::new(sections)?;
        place_obstacles(&mut course, config, rng);
        debug!(
            attempt,
            hull = hull.len(),
            sections = course.len(),
            "course generated"
        );
        return Ok(CourseLayout {
            points,
            hull,
            control,
            course,
        });
    }
    warn!(attempts = config.max_attempts, "course generation kept producing degenerate layouts");
    Err(SimulationError::InvalidConfig(
        "course generation failed to produce a simple corridor",
    ))
}

/// Uniform points inside the configured field, centred on the origin.
pub fn sample_points(config: &CourseConfig, rng: &mut dyn RngCore) -> Vec<Vec2> {
    let half_w = config.field_width / 2.0;
    let half_h = config.field_height / 2.0;
    (0..config.point_count)
        .map(|_| {
            Vec2::new(
                rng.random_range(-half_w..half_w),
                rng.random_range(-half_h..half_h),
            )
        })
        .collect()
}

/// Gift-wrapping hull, counter-clockwise from the leftmost point.
///
/// Collinear candidates resolve to the farthest one, so no hull vertex lies
/// on an edge between two others.
#[must_use]
pub fn convex_hull(points: &[Vec2]) -> Vec<Vec2> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let start = points
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)))
        .map_or(0, |(index, _)| index);

    let mut hull = Vec::new();
    let mut current = start;
    loop {
        hull.push(points[current]);
        let origin = points[current];
        let mut candidate = if current == 0 { 1 } else { 0 };
        for (index, &point) in points.iter().enumerate() {
            if index == current {
                continue;
            }
            let cross = (points[candidate] - origin).cross(point - origin);
            let farther = origin.distance(point) > origin.distance(points[candidate]);
            if cross < 0.0 || (cross == 0.0 && farther) {
                candidate = index;
            }
        }
        current = candidate;
        if current == start || hull.len() > points.len() {
            break;
        }
    }
    hull
}

/// Drop the last vertex of an odd-length loop.
pub fn force_even(hull: &mut Vec<Vec2>) {
    if hull.len() % 2 == 1 {
        hull.pop();
    }
}

/// Insert a midpoint on every edge, pushed outward by up to `displacement * edge length`.
///
/// `hull` must be counter-clockwise; the result has twice as many vertices.
pub fn subdivide(hull: &[Vec2], displacement: f64, rng: &mut dyn RngCore) -> Vec<Vec2> {
    let n = hull.len();
    let mut out = Vec::with_capacity(n * 2);
    for i in 0..n {
        let a = hull[i];
        let b = hull[(i + 1) % n];
        out.push(a);
        let edge = b - a;
        let push = if displacement > 0.0 {
            rng.random_range(0.0..displacement) * edge.length()
        } else {
            0.0
        };
        let outward = -edge.perpendicular().normalized();
        out.push(a.lerp(b, 0.5) + outward * push);
    }
    out
}

/// Widen sharp corners and push crowded vertices apart.
pub fn relax(points: &mut [Vec2], config: &CourseConfig) {
    let n = points.len();
    if n < 3 {
        return;
    }
    for _ in 0..config.relax_passes {
        for i in 0..n {
            let prev = points[(i + n - 1) % n];
            let cur = points[i];
            let next_index = (i + 1) % n;
            let to_prev = prev - cur;
            let to_next = points[next_index] - cur;
            let (len_prev, len_next) = (to_prev.length(), to_next.length());
            if len_prev == 0.0 || len_next == 0.0 {
                continue;
            }
            let angle = (to_prev.dot(to_next) / (len_prev * len_next))
                .clamp(-1.0, 1.0)
                .acos();
            if angle < config.min_angle {
                let sign = if to_prev.cross(to_next) >= 0.0 { 1.0 } else { -1.0 };
                let widened = to_next.rotated(sign * (config.min_angle - angle));
                points[next_index] = cur + widened;
            }
        }

        let min_sq = config.min_spacing * config.min_spacing;
        for i in 0..n {
            for j in (i + 1)..n {
                let delta = points[j] - points[i];
                let dist_sq = delta.dot(delta);
                if dist_sq >= min_sq || dist_sq == 0.0 {
                    continue;
                }
                let dist = dist_sq.sqrt();
                let shift = delta * ((config.min_spacing - dist) / 2.0 / dist);
                points[j] += shift;
                points[i] -= shift;
            }
        }
    }
}

fn bezier(p0: Vec2, p1: Vec2, p2: Vec2, p3: Vec2, t: f64) -> (Vec2, Vec2) {
    let u = 1.0 - t;
    let point = p0 * (u * u * u) + p1 * (3.0 * u * u * t) + p2 * (3.0 * u * t * t) + p3 * (t * t * t);
    let tangent = (p1 - p0) * (3.0 * u * u) + (p2 - p1) * (6.0 * u * t) + (p3 - p2) * (3.0 * t * t);
    (point, tangent)
}

const ARC_TABLE_SAMPLES: usize = 64;

/// Evenly spaced curve parameters along one Bezier segment.
///
/// Returns `steps` parameters at equal arc-length intervals
/// starting at `t = 0`, found by inverting a piecewise-linear length table.
fn arc_length_params(p0: Vec2, p1: Vec2, p2: Vec2, p3: Vec2, steps: usize) -> Vec<f64> {
    let table = arc_length_table(p0, p1, p2, p3);
    let total = table[ARC_TABLE_SAMPLES];
    let mut params = Vec::with_capacity(steps);
    let mut k = 0;
    for step in 0..steps {
        let target = total * step as f64 / steps as f64;
        while k + 1 < ARC_TABLE_SAMPLES && table[k + 1] < target {
            k += 1;
        }
        let span = table[k + 1] - table[k];
        let within = if span > 0.0 {
            ((target - table[k]) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        params.push((k as f64 + within) / ARC_TABLE_SAMPLES as f64);
    }
    params
}

/// Cumulative chord length at `t = k / ARC_TABLE_SAMPLES`.
fn arc_length_table(p0: Vec2, p1: Vec2, p2: Vec2, p3: Vec2) -> Vec<f64> {
    let mut table = Vec::with_capacity(ARC_TABLE_SAMPLES + 1);
    table.push(0.0);
    let mut previous = p0;
    let mut length = 0.0;
    for k in 1..=ARC_TABLE_SAMPLES {
        let (point, _) = bezier(p0, p1, p2, p3, k as f64 / ARC_TABLE_SAMPLES as f64);
        length += previous.distance(point);
        table.push(length);
        previous = point;
    }
    table
}

/// Sample a closed Catmull-Rom spline through `control` and emit one gate per sample.
///
/// Gates are spaced by arc length. The longest segment receives
/// `config.resolution` gates and every other segment a proportional, rounded
/// count, so neighbouring gates sit roughly `longest / resolution` apart.
#[must_use]
pub fn spline_sections(control: &[Vec2], config: &CourseConfig) -> Vec<CrossSection> {
    let n = control.len();
    if n < 2 {
        return Vec::new();
    }
    let at = |i: usize| control[i % n];
    let tangents: Vec<Vec2> = (0..n)
        .map(|i| (at(i + 1) - at(i + n - 1)) * 0.5)
        .collect();
    let segments: Vec<[Vec2; 4]> = (0..n)
        .map(|i| {
            let (p0, p3) = (at(i), at(i + 1));
            [
                p0,
                p0 + tangents[i] * (1.0 / 3.0),
                p3 - tangents[(i + 1) % n] * (1.0 / 3.0),
                p3,
            ]
        })
        .collect();
    let lengths: Vec<f64> = segments
        .iter()
        .map(|&[p0, p1, p2, p3]| arc_length_table(p0, p1, p2, p3)[ARC_TABLE_SAMPLES])
        .collect();
    let longest = lengths.iter().copied().fold(0.0_f64, f64::max);

    let mut sections = Vec::new();
    for (&[p0, p1, p2, p3], &length) in segments.iter().zip(&lengths) {
        if p0 == p3 || length == 0.0 {
            continue;
        }
        let steps = ((config.resolution as f64 * length / longest).round() as usize).max(1);
        for t in arc_length_params(p0, p1, p2, p3, steps) {
            let (point, tangent) = bezier(p0, p1, p2, p3, t);
            let mut direction = tangent.normalized();
            if direction == Vec2::ZERO {
                direction = (p3 - p0).normalized();
            }
            let normal = direction.perpendicular() * config.half_width;
            let mid = point * config.scale;
            sections.push(CrossSection::new(
                (point + normal) * config.scale,
                mid,
                (point - normal) * config.scale,
            ));
        }
    }
    sections
}

/// True when no two non-adjacent edges of the closed polyline cross.
#[must_use]
pub fn is_simple_loop(points: &[Vec2]) -> bool {
    let n = points.len();
    if n < 4 {
        return true;
    }
    for i in 0..n {
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            if segment_intersection(points[i], points[i + 1], points[j], points[(j + 1) % n])
                .is_some()
            {
                return false;
            }
        }
    }
    true
}

/// True when the quad between `a` and `b` neither folds nor runs backwards.
///
/// The two gate lines must not cross, and both walls must step the same way
/// as the centre line.
#[must_use]
pub fn quad_is_simple(a: &CrossSection, b: &CrossSection) -> bool {
    let forward = b.mid - a.mid;
    segment_intersection(a.left, a.right, b.left, b.right).is_none()
        && (b.left - a.left).dot(forward) > 0.0
        && (b.right - a.right).dot(forward) > 0.0
}

fn corridor_is_simple(sections: &[CrossSection]) -> bool {
    let n = sections.len();
    if n < 3 {
        return false;
    }
    if !(0..n).all(|i| quad_is_simple(&sections[i], &sections[(i + 1) % n])) {
        return false;
    }
    let mids: Vec<Vec2> = sections.iter().map(|s| s.mid).collect();
    let lefts: Vec<Vec2> = sections.iter().map(|s| s.left).collect();
    let rights: Vec<Vec2> = sections.iter().map(|s| s.right).collect();
    is_simple_loop(&mids) && is_simple_loop(&lefts) && is_simple_loop(&rights)
}

fn place_obstacles(course: &mut Course, config: &CourseConfig, rng: &mut dyn RngCore) {
    if config.obstacle_chance <= 0.0 {
        return;
    }
    for index in config.obstacle_clearance..course.len() {
        if !rng.random_bool(config.obstacle_chance) {
            continue;
        }
        let gate = *course.section(index);
        let (anchor, far) = if rng.random_bool(0.5) {
            (gate.left, gate.right)
        } else {
            (gate.right, gate.left)
        };
        course.set_obstacle(
            index,
            Some(Boundary::new(anchor, anchor.lerp(far, config.obstacle_span))),
        );
    }
}

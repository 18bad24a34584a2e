use std::f32::consts::TAU;

use glam::{IVec2, Vec2};
use gridspace_common::Color;
use gridspace_kernel::World;
use serde::{Deserialize, Serialize};

use crate::canvas::{BlendMode, Canvas};

/// Occluder edges are lengthened by this fraction of a cell at both ends, so shadows of
/// adjacent walls overlap instead of leaving hairline gaps.
const EDGE_PADDING: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityCalculatorConfig {
    /// Rings around the point of view resolved in high detail before raycasting may
    /// take over. [`VisibilityCalculatorConfig::NO_RAYCASTING`] resolves everything in
    /// high detail.
    pub min_rings_before_raycasting: u32,
    /// Shadow triangles that must exist before raycasting may take over.
    pub min_triangles_before_raycasting: u32,
    /// Rays spread evenly around the point of view once raycasting takes over.
    pub ray_count: u32,
    /// Samples taken along a ray per cell length.
    pub ray_points_per_cell: u32,
}

impl VisibilityCalculatorConfig {
    pub const NO_RAYCASTING: u32 = u32::MAX;
}

impl Default for VisibilityCalculatorConfig {
    fn default() -> Self {
        Self {
            min_rings_before_raycasting: 15,
            min_triangles_before_raycasting: 100,
            ray_count: 360,
            ray_points_per_cell: 6,
        }
    }
}

/// Figures from the latest [`VisibilityCalculator::calc`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalculationStats {
    pub high_detail_ring_count: u32,
    pub triangle_count: u32,
    /// Point-in-triangle tests performed while building the triangle set.
    pub triangle_check_count: u32,
    /// Rays cast after the high detail budget ran out; 0 if it never did.
    pub ray_count: u32,
}

/// Region hidden behind one occluding edge: the part of the triangle with its apex at the
/// point of view that lies beyond the edge.
#[derive(Debug, Clone, Copy)]
struct Shadow {
    /// Counter-clockwise around the point of view from `a` to `b`.
    a: Vec2,
    b: Vec2,
}

impl Shadow {
    fn new(pov: Vec2, a: Vec2, b: Vec2) -> Option<Self> {
        let winding = (a - pov).perp_dot(b - pov);
        if winding > 0.0 {
            Some(Self { a, b })
        } else if winding < 0.0 {
            Some(Self { a: b, b: a })
        } else {
            None
        }
    }

    /// Points on the boundary of the shadow count as lit.
    fn hides(&self, pov: Vec2, p: Vec2) -> bool {
        let dp = p - pov;
        if (self.a - pov).perp_dot(dp) <= 0.0 || dp.perp_dot(self.b - pov) <= 0.0 {
            return false;
        }
        let edge = self.b - self.a;
        edge.perp_dot(p - self.a) * edge.perp_dot(pov - self.a) < 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bounds {
    min: Vec2,
    max: Vec2,
}

impl Bounds {
    fn contains(&self, p: Vec2) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    fn corners(&self) -> [Vec2; 4] {
        [
            self.min,
            Vec2::new(self.max.x, self.min.y),
            self.max,
            Vec2::new(self.min.x, self.max.y),
        ]
    }

    /// Distance along `dir` at which a ray starting inside leaves the box.
    fn exit_distance(&self, origin: Vec2, dir: Vec2) -> f32 {
        let axis = |o: f32, d: f32, lo: f32, hi: f32| {
            if d > 0.0 {
                (hi - o) / d
            } else if d < 0.0 {
                (lo - o) / d
            } else {
                f32::INFINITY
            }
        };
        axis(origin.x, dir.x, self.min.x, self.max.x)
            .min(axis(origin.y, dir.y, self.min.y, self.max.y))
            .max(0.0)
    }
}

/// Computes what is visible from a point of view inside a view rectangle.
///
/// Walls are processed in square rings around the point of view, nearest first. Each
/// wall that is not already hidden casts shadows from the outline edges facing the point
/// of view, skipping edges that a neighbour blocks fully. Once both detail budgets are
/// spent, the rest of the view is approximated with evenly spaced rays.
#[derive(Debug, Clone)]
pub struct VisibilityCalculator {
    config: VisibilityCalculatorConfig,
    view: Option<Bounds>,
    pov: Vec2,
    /// Area resolved in high detail; everything outside it relies on `rays`.
    detailed: Bounds,
    shadows: Vec<Shadow>,
    rays: Vec<f32>,
    stats: CalculationStats,
}

impl Default for VisibilityCalculator {
    fn default() -> Self {
        Self::new(VisibilityCalculatorConfig::default())
    }
}

impl VisibilityCalculator {
    pub fn new(config: VisibilityCalculatorConfig) -> Self {
        Self {
            config,
            view: None,
            pov: Vec2::ZERO,
            detailed: Bounds {
                min: Vec2::ZERO,
                max: Vec2::ZERO,
            },
            shadows: Vec::new(),
            rays: Vec::new(),
            stats: CalculationStats::default(),
        }
    }

    pub fn config(&self) -> &VisibilityCalculatorConfig {
        &self.config
    }

    pub fn stats(&self) -> &CalculationStats {
        &self.stats
    }

    pub fn calc(&mut self, world: &World, view_center: Vec2, view_size: Vec2, point_of_view: Vec2) {
        let _span = tracing::trace_span!("visibility_calc").entered();
        let cr = world.cell_resolution();
        let half = view_size.abs() / 2.0;
        let view = Bounds {
            min: view_center - half,
            max: view_center + half,
        };
        self.view = Some(view);
        self.pov = point_of_view;
        self.shadows.clear();
        self.rays.clear();
        self.stats = CalculationStats::default();

        let pov_cell = (point_of_view / cr).floor().as_ivec2();
        let world_last = world.cell_count().as_ivec2() - IVec2::ONE;
        let first = (view.min / cr).floor().as_ivec2().max(IVec2::ZERO);
        let last = ((view.max / cr).ceil().as_ivec2() - IVec2::ONE).min(world_last);

        let mut resolved_rings = 0;
        if first.cmple(last).all() {
            let reach = (first - pov_cell).abs().max((last - pov_cell).abs());
            let max_ring = reach.x.max(reach.y) as u32;
            for ring in 0..=max_ring {
                if ring >= self.config.min_rings_before_raycasting
                    && self.stats.triangle_count >= self.config.min_triangles_before_raycasting
                    && self.config.ray_count > 0
                {
                    break;
                }
                self.process_ring(world, pov_cell, ring as i32, first, last);
                resolved_rings = ring + 1;
            }
            if resolved_rings <= max_ring {
                let r = resolved_rings as i32;
                self.detailed = Bounds {
                    min: (pov_cell - IVec2::splat(r - 1)).as_vec2() * cr,
                    max: (pov_cell + IVec2::splat(r)).as_vec2() * cr,
                };
                self.cast_rays(world, view);
            }
        }
        if self.rays.is_empty() {
            self.detailed = view;
        }
        self.stats.high_detail_ring_count = resolved_rings;
        tracing::trace!(
            rings = self.stats.high_detail_ring_count,
            triangles = self.stats.triangle_count,
            checks = self.stats.triangle_check_count,
            rays = self.stats.ray_count,
            "visibility calculated"
        );
    }

    fn process_ring(&mut self, world: &World, center: IVec2, ring: i32, first: IVec2, last: IVec2) {
        let in_range = |c: IVec2| c.cmpge(first).all() && c.cmple(last).all();
        if ring == 0 {
            if in_range(center) {
                self.process_cell(world, center);
            }
            return;
        }
        for x in center.x - ring..=center.x + ring {
            for y in [center.y - ring, center.y + ring] {
                let c = IVec2::new(x, y);
                if in_range(c) {
                    self.process_cell(world, c);
                }
            }
        }
        for y in center.y - ring + 1..center.y + ring {
            for x in [center.x - ring, center.x + ring] {
                let c = IVec2::new(x, y);
                if in_range(c) {
                    self.process_cell(world, c);
                }
            }
        }
    }

    fn process_cell(&mut self, world: &World, cell: IVec2) {
        let Some(model) = world.cell_at_unchecked(cell.as_uvec2()) else {
            return;
        };
        let Some(shape) = model.shape() else {
            return;
        };
        let cr = world.cell_resolution();
        let origin = cell.as_vec2() * cr;
        let local_pov = (self.pov - origin) / cr;
        let centroid = shape.centroid();
        let obstructed = model.obstructed_sides();

        let mut edges = [(Vec2::ZERO, Vec2::ZERO); 4];
        let mut count = 0;
        for edge in shape.outline() {
            if !edge.sides.is_empty() && edge.sides.is_subset_of(obstructed) {
                continue;
            }
            let d = edge.b - edge.a;
            let mut outward = Vec2::new(d.y, -d.x);
            if outward.dot(centroid - edge.a) > 0.0 {
                outward = -outward;
            }
            if outward.dot(local_pov - edge.a) <= 0.0 {
                continue;
            }
            let pad = d.normalize_or_zero() * EDGE_PADDING;
            if count < edges.len() {
                edges[count] = (origin + (edge.a - pad) * cr, origin + (edge.b + pad) * cr);
                count += 1;
            }
        }
        let edges = &edges[..count];
        if edges.is_empty() {
            return;
        }

        let mut checks = 0;
        let exposed = edges
            .iter()
            .any(|&(a, b)| !self.is_hidden(a, &mut checks) || !self.is_hidden(b, &mut checks));
        self.stats.triangle_check_count += checks;
        if !exposed {
            return;
        }
        for &(a, b) in edges {
            if let Some(shadow) = Shadow::new(self.pov, a, b) {
                self.shadows.push(shadow);
                self.stats.triangle_count += 1;
            }
        }
    }

    fn is_hidden(&self, p: Vec2, checks: &mut u32) -> bool {
        self.shadows.iter().any(|s| {
            *checks += 1;
            s.hides(self.pov, p)
        })
    }

    fn cast_rays(&mut self, world: &World, view: Bounds) {
        let cr = world.cell_resolution();
        let radius = view
            .corners()
            .iter()
            .map(|c| c.distance(self.pov))
            .fold(0.0, f32::max);
        let step = cr / self.config.ray_points_per_cell.max(1) as f32;
        let count = self.config.ray_count;
        let starts_inside = self.detailed.contains(self.pov);
        self.rays.reserve(count as usize);
        for i in 0..count {
            let dir = Vec2::from_angle(i as f32 * TAU / count as f32);
            let mut t = if starts_inside {
                self.detailed.exit_distance(self.pov, dir)
            } else {
                0.0
            };
            let mut length = radius;
            while t <= radius {
                if blocks_point(world, self.pov + dir * t) {
                    length = t;
                    break;
                }
                t += step;
            }
            self.rays.push(length);
        }
        self.stats.ray_count = count;
    }

    /// Whether `pos` is visible from the point of view of the latest `calc()`, or `None`
    /// if nothing was calculated or `pos` lies outside that view.
    pub fn test_visibility_at(&self, pos: Vec2) -> Option<bool> {
        if !self.view?.contains(pos) {
            return None;
        }
        let mut checks = 0;
        if self.is_hidden(pos, &mut checks) {
            return Some(false);
        }
        if self.rays.is_empty() || self.detailed.contains(pos) {
            return Some(true);
        }
        let dp = pos - self.pov;
        let n = self.rays.len();
        let f = dp.y.atan2(dp.x).rem_euclid(TAU) / (TAU / n as f32);
        let i = f.floor() as usize % n;
        let j = (i + 1) % n;
        let reach = self.rays[i] + (self.rays[j] - self.rays[i]) * f.fract();
        Some(dp.length() <= reach)
    }

    /// Darken everything hidden from the point of view. Shadows are drawn out to the
    /// edge of the view.
    pub fn render(&self, canvas: &mut dyn Canvas) {
        let Some(view) = self.view else {
            return;
        };
        let shade = Color::rgba(0, 0, 0, 200);
        let reach = view
            .corners()
            .iter()
            .map(|c| c.distance(self.pov))
            .fold(0.0, f32::max)
            * 2.0;
        let far = |p: Vec2| self.pov + (p - self.pov).normalize_or_zero() * reach;
        for s in &self.shadows {
            let (fa, fb) = (far(s.a), far(s.b));
            canvas.fill_triangle([s.a, s.b, fb], shade, BlendMode::Alpha);
            canvas.fill_triangle([s.a, fb, fa], shade, BlendMode::Alpha);
        }
        let n = self.rays.len();
        for i in 0..n {
            let angle = |k: usize| Vec2::from_angle(k as f32 * TAU / n as f32);
            let (da, db) = (angle(i), angle((i + 1) % n));
            let (na, nb) = (self.pov + da * self.rays[i], self.pov + db * self.rays[(i + 1) % n]);
            canvas.fill_triangle(
                [na, nb, self.pov + db * reach],
                shade,
                BlendMode::Alpha,
            );
            canvas.fill_triangle(
                [na, self.pov + db * reach, self.pov + da * reach],
                shade,
                BlendMode::Alpha,
            );
        }
    }
}

fn blocks_point(world: &World, p: Vec2) -> bool {
    if p.x < 0.0 || p.y < 0.0 {
        return false;
    }
    let cr = world.cell_resolution();
    let cell = (p / cr).floor().as_uvec2();
    if cell.x >= world.cell_count_x() || cell.y >= world.cell_count_y() {
        return false;
    }
    world
        .cell_at_unchecked(cell)
        .and_then(|c| c.shape())
        .is_some_and(|shape| shape.contains_local(p / cr - cell.as_vec2()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_excludes_its_boundary() {
        let pov = Vec2::ZERO;
        let s = Shadow::new(pov, Vec2::new(10.0, 10.0), Vec2::new(10.0, -10.0)).unwrap();
        assert!(s.hides(pov, Vec2::new(20.0, 0.0)));
        assert!(!s.hides(pov, Vec2::new(5.0, 0.0)));
        // On the edge line and on a bounding ray.
        assert!(!s.hides(pov, Vec2::new(10.0, 0.0)));
        assert!(!s.hides(pov, Vec2::new(20.0, 20.0)));
        assert!(Shadow::new(pov, Vec2::new(1.0, 1.0), Vec2::new(2.0, 2.0)).is_none());
    }

    #[test]
    fn exit_distance_from_inside() {
        let b = Bounds {
            min: Vec2::ZERO,
            max: Vec2::splat(10.0),
        };
        assert_eq!(b.exit_distance(Vec2::splat(5.0), Vec2::X), 5.0);
        assert_eq!(b.exit_distance(Vec2::new(2.0, 5.0), -Vec2::X), 2.0);
        assert_eq!(b.exit_distance(Vec2::new(5.0, 9.0), Vec2::Y), 1.0);
    }

    #[test]
    fn default_config_matches_documented_budgets() {
        let c = VisibilityCalculatorConfig::default();
        assert_eq!(
            (
                c.min_rings_before_raycasting,
                c.min_triangles_before_raycasting,
                c.ray_count,
                c.ray_points_per_cell
            ),
            (15, 100, 360, 6)
        );
    }

    #[test]
    fn nothing_calculated_yet() {
        let calc = VisibilityCalculator::default();
        assert_eq!(calc.test_visibility_at(Vec2::ZERO), None);
        assert_eq!(calc.stats(), &CalculationStats::default());
    }
}

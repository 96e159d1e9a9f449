// surface/intersect.rs
// Segment/panel crossing tests for the six panel shapes

use super::panel::{face_from_direction, Panel, PanelGeometry};
use super::Face;
use crate::utils::Vec3;

/// First crossing of the segment `p0 -> p1` with a panel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Crossing {
    /// Fraction of the segment, in `(0, 1]`.
    pub t: f64,
    pub point: Vec3,
    /// Face on the side the segment came from.
    pub face: Face,
}

const PARALLEL: f64 = 1e-15;

impl Panel {
    pub fn crossing(&self, p0: Vec3, p1: Vec3) -> Option<Crossing> {
        let d = p1 - p0;
        if d.mag_sq() == 0.0 {
            return None;
        }
        match self.geometry() {
            PanelGeometry::Rect { corner, .. } => self.plane_crossing(p0, d, *corner),
            PanelGeometry::Tri { points } => self.plane_crossing(p0, d, points[0]),
            PanelGeometry::Disk { center, .. } => self.plane_crossing(p0, d, *center),
            PanelGeometry::Sph { center, radius, .. } | PanelGeometry::Hemi { center, radius, .. } => {
                let f = p0 - *center;
                let a = d.dot(d);
                let b = 2.0 * f.dot(d);
                let c = f.dot(f) - radius * radius;
                self.first_root(p0, d, quadratic_roots(a, b, c))
            }
            PanelGeometry::Cyl { start, radius, .. } => {
                let axis = self.front();
                let f = p0 - *start;
                let dp = d - axis * d.dot(axis);
                let fp = f - axis * f.dot(axis);
                let a = dp.dot(dp);
                if a < PARALLEL {
                    return None;
                }
                let b = 2.0 * fp.dot(dp);
                let c = fp.dot(fp) - radius * radius;
                self.first_root(p0, d, quadratic_roots(a, b, c))
            }
        }
    }

    fn plane_crossing(&self, p0: Vec3, d: Vec3, origin: Vec3) -> Option<Crossing> {
        let n = self.front();
        let denom = n.dot(d);
        if denom.abs() < PARALLEL {
            return None;
        }
        let t = n.dot(origin - p0) / denom;
        if !(t > 0.0 && t <= 1.0) {
            return None;
        }
        let point = p0 + d * t;
        if !self.contains_projected(point) {
            return None;
        }
        Some(Crossing { t, point, face: face_from_direction(n, d) })
    }

    fn first_root(&self, p0: Vec3, d: Vec3, roots: Option<(f64, f64)>) -> Option<Crossing> {
        let (t1, t2) = roots?;
        for t in [t1, t2] {
            if !(t > 0.0 && t <= 1.0) {
                continue;
            }
            let point = p0 + d * t;
            if !self.contains_projected(point) {
                continue;
            }
            // side the segment came from, judged against the normal at the hit
            let face = if (p0 - point).dot(self.normal_at(point)) > 0.0 {
                Face::Front
            } else {
                Face::Back
            };
            return Some(Crossing { t, point, face });
        }
        None
    }
}

/// Real roots of `a t^2 + b t + c`, ascending.
fn quadratic_roots(a: f64, b: f64, c: f64) -> Option<(f64, f64)> {
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 || a == 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    // numerically stable form
    let q = -0.5 * (b + b.signum() * sq);
    let (r1, r2) = if q == 0.0 {
        (0.0, 0.0)
    } else {
        (q / a, c / q)
    };
    Some((r1.min(r2), r1.max(r2)))
}

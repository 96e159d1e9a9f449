// surface/panel.rs
// Panel shapes: geometry, derived front data, areas, sampling and projections

use super::Face;
use crate::error::{SimError, SimResult};
use crate::utils::{orthonormal_basis, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// Tolerance used to reject degenerate panel geometry.
const DEGENERATE: f64 = 1e-14;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelShape {
    Rect,
    Tri,
    Sph,
    Cyl,
    Hemi,
    Disk,
}

/// Defining points of a panel.
///
/// Planar shapes take their front side from the geometry (`Rect` and `Disk`
/// from the sign in `front`/`normal`, `Tri` from right-handed vertex order).
/// Curved shapes use `outward`: true when the front face points away from the
/// center or axis.
#[derive(Clone, Debug, PartialEq)]
pub enum PanelGeometry {
    /// Parallelogram `corner + u*edge1 + v*edge2`, `u, v` in `[0, 1]`.
    Rect { corner: Vec3, edge1: Vec3, edge2: Vec3, front_sign: f64 },
    Tri { points: [Vec3; 3] },
    Sph { center: Vec3, radius: f64, outward: bool },
    Cyl { start: Vec3, end: Vec3, radius: f64, outward: bool },
    /// Dome on the side of `axis` (pointing from the center to the pole).
    Hemi { center: Vec3, radius: f64, axis: Vec3, outward: bool },
    Disk { center: Vec3, radius: f64, normal: Vec3 },
}

impl PanelGeometry {
    pub fn shape(&self) -> PanelShape {
        match self {
            PanelGeometry::Rect { .. } => PanelShape::Rect,
            PanelGeometry::Tri { .. } => PanelShape::Tri,
            PanelGeometry::Sph { .. } => PanelShape::Sph,
            PanelGeometry::Cyl { .. } => PanelShape::Cyl,
            PanelGeometry::Hemi { .. } => PanelShape::Hemi,
            PanelGeometry::Disk { .. } => PanelShape::Disk,
        }
    }

    /// Axis-aligned rectangle perpendicular to `axis` (0..3). `front_sign` is +1
    /// when the front faces the positive axis direction.
    pub fn axis_rect(axis: usize, front_sign: f64, corner: Vec3, size: [f64; 2]) -> Self {
        let units = [Vec3::unit_x(), Vec3::unit_y(), Vec3::unit_z()];
        let a1 = units[(axis + 1) % 3];
        let a2 = units[(axis + 2) % 3];
        let edge1 = a1 * size[0];
        let edge2 = a2 * size[1];
        // edge1 x edge2 points along +axis when both sizes are positive
        let natural = if size[0] * size[1] > 0.0 { 1.0 } else { -1.0 };
        PanelGeometry::Rect { corner, edge1, edge2, front_sign: front_sign.signum() * natural }
    }

    fn translated(&self, delta: Vec3) -> Self {
        let mut g = self.clone();
        match &mut g {
            PanelGeometry::Rect { corner, .. } => *corner += delta,
            PanelGeometry::Tri { points } => {
                for p in points.iter_mut() {
                    *p += delta;
                }
            }
            PanelGeometry::Sph { center, .. }
            | PanelGeometry::Hemi { center, .. }
            | PanelGeometry::Disk { center, .. } => *center += delta,
            PanelGeometry::Cyl { start, end, .. } => {
                *start += delta;
                *end += delta;
            }
        }
        g
    }
}

#[derive(Clone, Debug)]
pub struct Panel {
    pub name: String,
    pub surface: usize,
    geom: PanelGeometry,
    oldgeom: PanelGeometry,
    /// Unit front normal for planar shapes, unit axis for cylinders and
    /// hemispheres, zero for spheres. Always derived from `geom`.
    front: Vec3,
    /// +1 when the front face is on the outside of a curved shape.
    orientation: f64,
    area: f64,
    /// Destination panel (index within the surface) and face per face.
    pub jump: [Option<(usize, Face)>; 2],
    /// Neighboring panels of the same surface, for surface-bound hopping.
    pub neighbors: Vec<usize>,
}

impl Panel {
    pub fn new(name: &str, surface: usize, geom: PanelGeometry) -> SimResult<Self> {
        let mut p = Self {
            name: name.to_string(),
            surface,
            oldgeom: geom.clone(),
            geom,
            front: Vec3::zero(),
            orientation: 1.0,
            area: 0.0,
            jump: [None, None],
            neighbors: Vec::new(),
        };
        p.recompute()?;
        Ok(p)
    }

    pub fn shape(&self) -> PanelShape {
        self.geom.shape()
    }

    pub fn geometry(&self) -> &PanelGeometry {
        &self.geom
    }

    pub fn old_geometry(&self) -> &PanelGeometry {
        &self.oldgeom
    }

    pub fn front(&self) -> Vec3 {
        self.front
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    /// Replace the defining points; front data and area are recomputed.
    pub fn set_geometry(&mut self, geom: PanelGeometry) -> SimResult<()> {
        if geom.shape() != self.shape() {
            return Err(SimError::degenerate(&self.name, "panel shape cannot change"));
        }
        let previous = std::mem::replace(&mut self.geom, geom);
        if let Err(e) = self.recompute() {
            self.geom = previous;
            self.recompute()?;
            return Err(e);
        }
        self.oldgeom = previous;
        Ok(())
    }

    pub fn translate(&mut self, delta: Vec3) -> SimResult<()> {
        let g = self.geom.translated(delta);
        self.set_geometry(g)
    }

    fn recompute(&mut self) -> SimResult<()> {
        let bad = |reason: &str| SimError::degenerate(&self.name, reason);
        match &self.geom {
            PanelGeometry::Rect { edge1, edge2, front_sign, .. } => {
                let n = edge1.cross(*edge2);
                if n.mag() < DEGENERATE {
                    return Err(bad("rectangle edges are parallel or zero"));
                }
                if *front_sign == 0.0 {
                    return Err(bad("rectangle front sign is zero"));
                }
                self.front = n.normalized() * front_sign.signum();
                self.orientation = 1.0;
                self.area = n.mag();
            }
            PanelGeometry::Tri { points } => {
                let n = (points[1] - points[0]).cross(points[2] - points[0]);
                if n.mag() < DEGENERATE {
                    return Err(bad("triangle vertices are collinear"));
                }
                self.front = n.normalized();
                self.orientation = 1.0;
                self.area = 0.5 * n.mag();
            }
            PanelGeometry::Sph { radius, outward, .. } => {
                if !(*radius > 0.0) {
                    return Err(bad("sphere radius must be positive"));
                }
                self.front = Vec3::zero();
                self.orientation = if *outward { 1.0 } else { -1.0 };
                self.area = 4.0 * PI * radius * radius;
            }
            PanelGeometry::Cyl { start, end, radius, outward } => {
                let axis = *end - *start;
                if !(*radius > 0.0) || axis.mag() < DEGENERATE {
                    return Err(bad("cylinder needs positive radius and length"));
                }
                self.front = axis.normalized();
                self.orientation = if *outward { 1.0 } else { -1.0 };
                self.area = TAU * radius * axis.mag();
            }
            PanelGeometry::Hemi { radius, axis, outward, .. } => {
                if !(*radius > 0.0) || axis.mag() < DEGENERATE {
                    return Err(bad("hemisphere needs positive radius and a nonzero axis"));
                }
                self.front = axis.normalized();
                self.orientation = if *outward { 1.0 } else { -1.0 };
                self.area = TAU * radius * radius;
            }
            PanelGeometry::Disk { radius, normal, .. } => {
                if !(*radius > 0.0) || normal.mag() < DEGENERATE {
                    return Err(bad("disk needs positive radius and a nonzero normal"));
                }
                self.front = normal.normalized();
                self.orientation = 1.0;
                self.area = PI * radius * radius;
            }
        }
        Ok(())
    }

    /// Unit normal at a point on (or near) the panel, pointing to the front side.
    pub fn normal_at(&self, p: Vec3) -> Vec3 {
        match &self.geom {
            PanelGeometry::Rect { .. } | PanelGeometry::Tri { .. } | PanelGeometry::Disk { .. } => {
                self.front
            }
            PanelGeometry::Sph { center, .. } | PanelGeometry::Hemi { center, .. } => {
                let r = p - *center;
                let m = r.mag();
                let dir = if m > 0.0 { r / m } else { self.fallback_dir() };
                dir * self.orientation
            }
            PanelGeometry::Cyl { start, .. } => {
                let w = p - *start;
                let radial = w - self.front * w.dot(self.front);
                let m = radial.mag();
                let dir = if m > 0.0 { radial / m } else { orthonormal_basis(self.front).0 };
                dir * self.orientation
            }
        }
    }

    fn fallback_dir(&self) -> Vec3 {
        if self.front.mag_sq() > 0.0 {
            self.front
        } else {
            Vec3::unit_z()
        }
    }

    /// Side of the panel's (extended) surface on which `p` lies.
    pub fn face_of_point(&self, p: Vec3) -> Face {
        let s = match &self.geom {
            PanelGeometry::Rect { corner, .. } => (p - *corner).dot(self.front),
            PanelGeometry::Tri { points } => (p - points[0]).dot(self.front),
            PanelGeometry::Disk { center, .. } => (p - *center).dot(self.front),
            PanelGeometry::Sph { center, radius, .. } | PanelGeometry::Hemi { center, radius, .. } => {
                ((p - *center).mag() - radius) * self.orientation
            }
            PanelGeometry::Cyl { start, radius, .. } => {
                let w = p - *start;
                let radial = w - self.front * w.dot(self.front);
                (radial.mag() - radius) * self.orientation
            }
        };
        if s >= 0.0 {
            Face::Front
        } else {
            Face::Back
        }
    }

    /// Closest point on the panel's extended surface (plane, sphere or cylinder wall).
    pub fn project(&self, p: Vec3) -> Vec3 {
        match &self.geom {
            PanelGeometry::Rect { corner, .. } => p - self.front * (p - *corner).dot(self.front),
            PanelGeometry::Tri { points } => p - self.front * (p - points[0]).dot(self.front),
            PanelGeometry::Disk { center, .. } => p - self.front * (p - *center).dot(self.front),
            PanelGeometry::Sph { center, radius, .. } | PanelGeometry::Hemi { center, radius, .. } => {
                let r = p - *center;
                let m = r.mag();
                let dir = if m > 0.0 { r / m } else { self.fallback_dir() };
                *center + dir * *radius
            }
            PanelGeometry::Cyl { start, radius, .. } => {
                let w = p - *start;
                let along = w.dot(self.front);
                let radial = w - self.front * along;
                let m = radial.mag();
                let dir = if m > 0.0 { radial / m } else { orthonormal_basis(self.front).0 };
                *start + self.front * along + dir * *radius
            }
        }
    }

    /// Whether a point already on the extended surface lies within the panel bounds.
    pub fn contains_projected(&self, p: Vec3) -> bool {
        const TOL: f64 = 1e-12;
        match &self.geom {
            PanelGeometry::Rect { corner, edge1, edge2, .. } => {
                let (u, v) = plane_coords(p - *corner, *edge1, *edge2);
                (-TOL..=1.0 + TOL).contains(&u) && (-TOL..=1.0 + TOL).contains(&v)
            }
            PanelGeometry::Tri { points } => {
                let (u, v) = plane_coords(p - points[0], points[1] - points[0], points[2] - points[0]);
                u >= -TOL && v >= -TOL && u + v <= 1.0 + TOL
            }
            PanelGeometry::Disk { center, radius, .. } => (p - *center).mag() <= radius + TOL,
            PanelGeometry::Sph { .. } => true,
            PanelGeometry::Hemi { center, .. } => (p - *center).dot(self.front) >= -TOL,
            PanelGeometry::Cyl { start, end, .. } => {
                let along = (p - *start).dot(self.front);
                along >= -TOL && along <= (*end - *start).mag() + TOL
            }
        }
    }

    /// Area-uniform random point on the panel.
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        match &self.geom {
            PanelGeometry::Rect { corner, edge1, edge2, .. } => {
                *corner + *edge1 * rng.random::<f64>() + *edge2 * rng.random::<f64>()
            }
            PanelGeometry::Tri { points } => {
                let mut u: f64 = rng.random();
                let mut v: f64 = rng.random();
                if u + v > 1.0 {
                    u = 1.0 - u;
                    v = 1.0 - v;
                }
                points[0] + (points[1] - points[0]) * u + (points[2] - points[0]) * v
            }
            PanelGeometry::Sph { center, radius, .. } => {
                *center + crate::utils::random_unit_vector(rng, 3) * *radius
            }
            PanelGeometry::Hemi { center, radius, .. } => {
                let mut dir = crate::utils::random_unit_vector(rng, 3);
                if dir.dot(self.front) < 0.0 {
                    dir = -dir;
                }
                *center + dir * *radius
            }
            PanelGeometry::Cyl { start, end, radius, .. } => {
                let (u, v) = orthonormal_basis(self.front);
                let theta = TAU * rng.random::<f64>();
                let t: f64 = rng.random();
                *start + (*end - *start) * t + (u * theta.cos() + v * theta.sin()) * *radius
            }
            PanelGeometry::Disk { center, radius, .. } => {
                let (u, v) = orthonormal_basis(self.front);
                let r = radius * rng.random::<f64>().sqrt();
                let theta = TAU * rng.random::<f64>();
                *center + (u * theta.cos() + v * theta.sin()) * r
            }
        }
    }

    /// Shape-relative coordinates of a point on the panel, used for jumps.
    pub fn local_coords(&self, p: Vec3) -> Vec3 {
        match &self.geom {
            PanelGeometry::Rect { corner, edge1, edge2, .. } => {
                let (u, v) = plane_coords(p - *corner, *edge1, *edge2);
                Vec3::new(u, v, 0.0)
            }
            PanelGeometry::Tri { points } => {
                let (u, v) = plane_coords(p - points[0], points[1] - points[0], points[2] - points[0]);
                Vec3::new(u, v, 0.0)
            }
            PanelGeometry::Sph { center, radius, .. } | PanelGeometry::Hemi { center, radius, .. } => {
                let (u, v) = orthonormal_basis(self.fallback_dir());
                let w = (p - *center) / *radius;
                Vec3::new(w.dot(u), w.dot(v), w.dot(self.fallback_dir()))
            }
            PanelGeometry::Cyl { start, end, radius, .. } => {
                let (u, v) = orthonormal_basis(self.front);
                let w = p - *start;
                Vec3::new(w.dot(u) / radius, w.dot(v) / radius, w.dot(self.front) / (*end - *start).mag())
            }
            PanelGeometry::Disk { center, radius, .. } => {
                let (u, v) = orthonormal_basis(self.front);
                let w = (p - *center) / *radius;
                Vec3::new(w.dot(u), w.dot(v), 0.0)
            }
        }
    }

    /// Inverse of `local_coords`.
    pub fn from_local(&self, c: Vec3) -> Vec3 {
        match &self.geom {
            PanelGeometry::Rect { corner, edge1, edge2, .. } => *corner + *edge1 * c.x + *edge2 * c.y,
            PanelGeometry::Tri { points } => {
                points[0] + (points[1] - points[0]) * c.x + (points[2] - points[0]) * c.y
            }
            PanelGeometry::Sph { center, radius, .. } | PanelGeometry::Hemi { center, radius, .. } => {
                let n = self.fallback_dir();
                let (u, v) = orthonormal_basis(n);
                *center + (u * c.x + v * c.y + n * c.z) * *radius
            }
            PanelGeometry::Cyl { start, end, radius, .. } => {
                let (u, v) = orthonormal_basis(self.front);
                *start + (u * c.x + v * c.y) * *radius + (*end - *start) * c.z
            }
            PanelGeometry::Disk { center, radius, .. } => {
                let (u, v) = orthonormal_basis(self.front);
                *center + (u * c.x + v * c.y) * *radius
            }
        }
    }

    /// Axis-aligned bounding box of the panel.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let r3 = |r: f64| Vec3::new(r, r, r);
        match &self.geom {
            PanelGeometry::Rect { corner, edge1, edge2, .. } => {
                let pts = [*corner, *corner + *edge1, *corner + *edge2, *corner + *edge1 + *edge2];
                bounds_of(&pts)
            }
            PanelGeometry::Tri { points } => bounds_of(points),
            PanelGeometry::Sph { center, radius, .. }
            | PanelGeometry::Hemi { center, radius, .. }
            | PanelGeometry::Disk { center, radius, .. } => (*center - r3(*radius), *center + r3(*radius)),
            PanelGeometry::Cyl { start, end, radius, .. } => {
                let (lo, hi) = bounds_of(&[*start, *end]);
                (lo - r3(*radius), hi + r3(*radius))
            }
        }
    }

    /// Conservative test for whether the panel may pass through the box `[lo, hi]`.
    /// Never misses a panel that does intersect the box.
    pub fn overlaps_box(&self, lo: Vec3, hi: Vec3) -> bool {
        let (plo, phi) = self.bounds();
        let disjoint = plo.x > hi.x || phi.x < lo.x || plo.y > hi.y || phi.y < lo.y || plo.z > hi.z || phi.z < lo.z;
        if disjoint {
            return false;
        }
        let corners = box_corners(lo, hi);
        match &self.geom {
            PanelGeometry::Rect { corner: origin, .. } => straddles_plane(&corners, *origin, self.front),
            PanelGeometry::Tri { points } => straddles_plane(&corners, points[0], self.front),
            PanelGeometry::Disk { center, .. } => straddles_plane(&corners, *center, self.front),
            PanelGeometry::Sph { center, radius, .. } | PanelGeometry::Hemi { center, radius, .. } => {
                let nearest = Vec3::new(
                    center.x.clamp(lo.x, hi.x),
                    center.y.clamp(lo.y, hi.y),
                    center.z.clamp(lo.z, hi.z),
                );
                let farthest = corners
                    .iter()
                    .map(|c| (*c - *center).mag())
                    .fold(0.0, f64::max);
                (nearest - *center).mag() <= *radius && farthest >= *radius
            }
            PanelGeometry::Cyl { start, end, radius, .. } => {
                let len = (*end - *start).mag();
                // box strictly inside the cylinder's volume cannot touch its wall
                let all_inside = corners.iter().all(|c| {
                    let w = *c - *start;
                    let along = w.dot(self.front);
                    let radial = (w - self.front * along).mag();
                    radial < *radius && along > 0.0 && along < len
                });
                !all_inside
            }
        }
    }
}

/// Coordinates `(u, v)` of `w` in the (possibly non-orthogonal) basis `e1, e2`.
fn plane_coords(w: Vec3, e1: Vec3, e2: Vec3) -> (f64, f64) {
    let a = e1.dot(e1);
    let b = e1.dot(e2);
    let c = e2.dot(e2);
    let d = w.dot(e1);
    let e = w.dot(e2);
    let det = a * c - b * b;
    ((d * c - e * b) / det, (e * a - d * b) / det)
}

fn bounds_of(pts: &[Vec3]) -> (Vec3, Vec3) {
    let mut lo = pts[0];
    let mut hi = pts[0];
    for p in &pts[1..] {
        lo = lo.min_by_component(*p);
        hi = hi.max_by_component(*p);
    }
    (lo, hi)
}

fn box_corners(lo: Vec3, hi: Vec3) -> [Vec3; 8] {
    let mut out = [Vec3::zero(); 8];
    for (i, c) in out.iter_mut().enumerate() {
        *c = Vec3::new(
            if i & 1 == 0 { lo.x } else { hi.x },
            if i & 2 == 0 { lo.y } else { hi.y },
            if i & 4 == 0 { lo.z } else { hi.z },
        );
    }
    out
}

fn straddles_plane(corners: &[Vec3; 8], origin: Vec3, normal: Vec3) -> bool {
    let mut pos = false;
    let mut neg = false;
    for c in corners {
        let s = (*c - origin).dot(normal);
        pos |= s >= 0.0;
        neg |= s <= 0.0;
    }
    pos && neg
}

/// Face for a panel point reached by a segment, from the plane-crossing direction.
pub(crate) fn face_from_direction(normal: Vec3, d: Vec3) -> Face {
    if d.dot(normal) < 0.0 {
        Face::Front
    } else {
        Face::Back
    }
}

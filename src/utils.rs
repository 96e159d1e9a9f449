// utils.rs
// Vector helpers shared by the geometry, diffusion and reaction code

use rand::Rng;
use rand_distr::StandardNormal;
use ultraviolet::DVec3;

/// Positions are always 3-vectors; axes at or above `dim` stay zero.
pub type Vec3 = DVec3;

pub fn component(v: &Vec3, d: usize) -> f64 {
    match d {
        0 => v.x,
        1 => v.y,
        _ => v.z,
    }
}

pub fn component_mut(v: &mut Vec3, d: usize) -> &mut f64 {
    match d {
        0 => &mut v.x,
        1 => &mut v.y,
        _ => &mut v.z,
    }
}

pub fn from_array(a: [f64; 3]) -> Vec3 {
    Vec3::new(a[0], a[1], a[2])
}

pub fn to_array(v: Vec3) -> [f64; 3] {
    [v.x, v.y, v.z]
}

/// Zero every component at or above `dim`.
pub fn truncate(mut v: Vec3, dim: usize) -> Vec3 {
    for d in dim..3 {
        *component_mut(&mut v, d) = 0.0;
    }
    v
}

/// Uniformly distributed unit vector in the first `dim` axes.
pub fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R, dim: usize) -> Vec3 {
    loop {
        let mut v = Vec3::zero();
        for d in 0..dim {
            *component_mut(&mut v, d) = rng.sample(StandardNormal);
        }
        let m = v.mag();
        if m > 1e-12 {
            return v / m;
        }
    }
}

/// Uniform point in the axis-aligned box `[low, high)` over the first `dim` axes.
pub fn random_in_box<R: Rng + ?Sized>(rng: &mut R, low: Vec3, high: Vec3, dim: usize) -> Vec3 {
    let mut p = Vec3::zero();
    for d in 0..dim {
        let lo = component(&low, d);
        let hi = component(&high, d);
        *component_mut(&mut p, d) = lo + (hi - lo) * rng.random::<f64>();
    }
    p
}

/// Two unit vectors completing `n` (assumed unit) to an orthonormal basis.
pub fn orthonormal_basis(n: Vec3) -> (Vec3, Vec3) {
    let helper = if n.x.abs() < 0.9 { Vec3::unit_x() } else { Vec3::unit_y() };
    let u = n.cross(helper).normalized();
    let v = n.cross(u);
    (u, v)
}

/// Volume of a `dim`-ball of radius `r` (length, area or volume).
pub fn ball_volume(dim: usize, r: f64) -> f64 {
    match dim {
        1 => 2.0 * r,
        2 => std::f64::consts::PI * r * r,
        _ => 4.0 / 3.0 * std::f64::consts::PI * r * r * r,
    }
}

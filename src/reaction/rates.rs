// reaction/rates.rs
// Conversion between bimolecular rate constants and binding radii.
//
// In 3-D the rate of a binding radius `a` is the steady-state absorption of
// a discrete random walk: the radial distribution function g(r) is diffused
// by one Gaussian step (rms step s per axis), everything inside `a` is
// removed, and the process is iterated to steady state. Lengths are scaled by
// s, so the result depends only on rho = a / s. Past the computed grid the
// profile is continued as the continuum form 1 - c/r, with c matched to the
// outermost computed point. Matching c to the absorbed flux instead is
// unstable once rho grows past a few tens.

use crate::config::{RDF_GRID_EXTENT, RDF_GRID_SPACING, RDF_MAX_ITERATIONS, RDF_TOLERANCE};
use crate::error::{SimError, SimResult};
use std::f64::consts::{PI, TAU};

const QUADRATURE_POINTS: usize = 40;

/// Radial transition kernel for unit per-axis step: density reaching `r`
/// from a shell at `r0`, per unit `r0`.
fn kernel(r: f64, r0: f64) -> f64 {
    let norm = r0 / (r * (TAU).sqrt());
    let x = r * r0;
    if x < 1e-3 {
        // exp(-(r-r0)^2/2) - exp(-(r+r0)^2/2) = 2 exp(-(r^2+r0^2)/2) sinh(r r0)
        norm * 2.0 * (-(r * r + r0 * r0) / 2.0).exp() * x.sinh()
    } else {
        norm * ((-(r - r0) * (r - r0) / 2.0).exp() - (-(r + r0) * (r + r0) / 2.0).exp())
    }
}

/// Volume absorbed per timestep, in units of s^3, by a binding radius of
/// `rho` rms steps at steady state.
pub fn absorbed_volume(rho: f64) -> f64 {
    if rho <= 0.0 {
        return 0.0;
    }
    let h = RDF_GRID_SPACING;
    let n = (RDF_GRID_EXTENT / h).round() as usize;
    let m = 2 * n;
    let r: Vec<f64> = (0..m).map(|j| rho + (j as f64 + 0.5) * h).collect();

    let lo = (rho - RDF_GRID_EXTENT).max(0.0);
    let hq = (rho - lo) / QUADRATURE_POINTS as f64;
    let rq: Vec<f64> = (0..QUADRATURE_POINTS).map(|i| lo + (i as f64 + 0.5) * hq).collect();

    let mut kg = Vec::with_capacity(n * m);
    for &ri in &r[..n] {
        kg.extend(r.iter().map(|&r0| kernel(ri, r0) * h));
    }
    let mut kq = Vec::with_capacity(QUADRATURE_POINTS * m);
    for &ri in &rq {
        kq.extend(r.iter().map(|&r0| kernel(ri, r0) * h));
    }
    let shell: Vec<f64> = rq.iter().map(|&x| 4.0 * PI * x * x * hq).collect();

    // start from the continuum profile of the smaller of the two limits
    let c0 = rho.min(2.0 / 3.0 * rho * rho * rho);
    let mut g: Vec<f64> = r.iter().map(|&x| 1.0 - c0 / x).collect();
    let mut next = vec![0.0; n];
    let mut v_prev = f64::INFINITY;
    let mut v = 0.0;
    for _ in 0..RDF_MAX_ITERATIONS {
        v = (0..QUADRATURE_POINTS)
            .map(|i| {
                let row = &kq[i * m..(i + 1) * m];
                shell[i] * row.iter().zip(&g).map(|(k, gj)| k * gj).sum::<f64>()
            })
            .sum();
        for (i, out) in next.iter_mut().enumerate() {
            let row = &kg[i * m..(i + 1) * m];
            *out = row.iter().zip(&g).map(|(k, gj)| k * gj).sum();
        }
        g[..n].copy_from_slice(&next);
        let c = (1.0 - g[n - 1]) * r[n - 1];
        for j in n..m {
            g[j] = 1.0 - c / r[j];
        }
        if (v - v_prev).abs() <= RDF_TOLERANCE * v {
            break;
        }
        v_prev = v;
    }
    v
}

/// Rate constant of binding radius `bindrad` for summed diffusion
/// coefficient `difc_sum` and timestep `dt`.
pub fn rate_from_bindrad(bindrad: f64, difc_sum: f64, dt: f64, dim: usize) -> f64 {
    if bindrad <= 0.0 {
        return 0.0;
    }
    if dim < 3 || difc_sum <= 0.0 {
        return crate::utils::ball_volume(dim, bindrad) / dt;
    }
    let s = (2.0 * difc_sum * dt).sqrt();
    absorbed_volume(bindrad / s) * s * s * s / dt
}

/// Binding radius that produces rate constant `rate`.
pub fn binding_radius(rate: f64, difc_sum: f64, dt: f64, dim: usize) -> SimResult<f64> {
    if !(rate >= 0.0) || !rate.is_finite() {
        return Err(SimError::config(format!("bimolecular rate must be finite and non-negative, got {rate}")));
    }
    if rate == 0.0 {
        return Ok(0.0);
    }
    let target = rate * dt;
    if dim < 3 {
        // activation limited: the binding region swept each step
        return Ok(match dim {
            1 => target / 2.0,
            _ => (target / PI).sqrt(),
        });
    }
    if difc_sum <= 0.0 {
        log::warn!("bimolecular reaction between immobile species; binding radius from volume only");
        return Ok((3.0 * target / (4.0 * PI)).cbrt());
    }
    let s = (2.0 * difc_sum * dt).sqrt();
    let v_target = target / (s * s * s);
    // start near the larger of the two limiting radii and widen until bracketed
    let mut lo = (v_target / TAU).max((3.0 * v_target / (4.0 * PI)).cbrt());
    while absorbed_volume(lo) > v_target {
        lo *= 0.5;
    }
    let mut hi = lo * 2.0;
    while absorbed_volume(hi) < v_target {
        lo = hi;
        hi *= 2.0;
        if hi > 1e12 {
            return Err(SimError::config(format!("no binding radius reproduces rate {rate}")));
        }
    }
    while (hi - lo) > 1e-7 * hi {
        let mid = 0.5 * (lo + hi);
        if absorbed_volume(mid) < v_target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(0.5 * (lo + hi) * s)
}

/// Fraction of the diffusion-limited rate, `k / (4 pi D a)`.
pub fn diffusion_limited_fraction(rate: f64, difc_sum: f64, bindrad: f64) -> f64 {
    if difc_sum > 0.0 && bindrad > 0.0 {
        rate / (4.0 * PI * difc_sum * bindrad)
    } else {
        0.0
    }
}

/// Characteristic diffusion time across the binding radius, `a^2 / D`.
pub fn diffusion_time(difc_sum: f64, bindrad: f64) -> f64 {
    if difc_sum > 0.0 {
        bindrad * bindrad / difc_sum
    } else {
        f64::INFINITY
    }
}

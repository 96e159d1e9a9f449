// reaction/products.rs
// Product placement around a reaction point

use super::{Reaction, RevParam};
use crate::utils::{random_unit_vector, Vec3};
use rand::Rng;
use smallvec::SmallVec;

/// Diffusion-weighted encounter point `(D2 p1 + D1 p2) / (D1 + D2)`; the
/// midpoint when both reactants are immobile.
pub fn reaction_point(p1: Vec3, d1: f64, p2: Vec3, d2: f64) -> Vec3 {
    let total = d1 + d2;
    if total > 0.0 {
        (p1 * d2 + p2 * d1) / total
    } else {
        (p1 + p2) * 0.5
    }
}

/// Positions of two products separated by `sep` along `dir`, split so that
/// the faster product moves further from `point`.
fn split_pair(point: Vec3, dir: Vec3, sep: f64, d1: f64, d2: f64) -> [Vec3; 2] {
    let w1 = if d1 + d2 > 0.0 { d1 / (d1 + d2) } else { 0.5 };
    [point - dir * (sep * w1), point + dir * (sep * (1.0 - w1))]
}

/// Place the products of `rxn`.
///
/// `point` is the reaction point, `reactant_pos` the (unwrapped) reactant
/// positions and `prd_difc` the diffusion coefficients of the products.
pub fn place_products<R: Rng + ?Sized>(
    rxn: &Reaction,
    point: Vec3,
    reactant_pos: &[Vec3],
    prd_difc: &[f64],
    dim: usize,
    rng: &mut R,
) -> SmallVec<[Vec3; 4]> {
    let nprd = rxn.prd.len();
    let mut out: SmallVec<[Vec3; 4]> = SmallVec::from_elem(point, nprd);
    match rxn.rparamt {
        RevParam::Fixed => {
            for (slot, p) in out.iter_mut().zip(&rxn.prd) {
                if let Some(x) = p.position {
                    *slot = x;
                }
            }
        }
        RevParam::Offset => {
            for (slot, p) in out.iter_mut().zip(&rxn.prd) {
                if let Some(x) = p.position {
                    *slot = point + x;
                }
            }
        }
        RevParam::ConfSpread if reactant_pos.len() == 2 => {
            for (i, slot) in out.iter_mut().enumerate().take(2) {
                *slot = reactant_pos[i];
            }
        }
        RevParam::Bounce if reactant_pos.len() == 2 && nprd == 2 => {
            let axis = reactant_pos[1] - reactant_pos[0];
            let dir = if axis.mag() > 0.0 { axis.normalized() } else { random_unit_vector(rng, dim) };
            let sep = if rxn.unbindrad > 0.0 { rxn.unbindrad } else { rxn.bindrad() };
            let [a, b] = split_pair(point, dir, sep, prd_difc[0], prd_difc[1]);
            out[0] = a;
            out[1] = b;
        }
        _ => {
            if nprd == 2 && rxn.unbindrad > 0.0 {
                let dir = random_unit_vector(rng, dim);
                let [a, b] = split_pair(point, dir, rxn.unbindrad, prd_difc[0], prd_difc[1]);
                out[0] = a;
                out[1] = b;
            }
        }
    }
    out
}

// reaction/engine.rs
// Per-step zero-, first- and second-order reaction passes

use super::products::{place_products, reaction_point};
use super::SernoRule;
use crate::compartment;
use crate::error::{SimError, SimResult};
use crate::molecule::{MolId, MolListType, MolecState, PanelRef};
use crate::simulation::{EventType, Simulation};
use crate::surface::Face;
use crate::utils::{random_in_box, Vec3};
use rand::Rng;
use rand_distr::{Distribution, Poisson};
use smallvec::SmallVec;

/// One reactant as seen by the firing code: slot and position (already
/// shifted next to its partner across periodic boundaries).
type Participant = (MolId, Vec3);

/// Zero-order pass: Poisson-distributed number of new product sets per reaction.
pub fn zero_order(sim: &mut Simulation) -> SimResult<()> {
    for r in 0..sim.rxnss[0].rxn.len() {
        let (prob, cmpt, srf) = {
            let rxn = &sim.rxnss[0].rxn[r];
            if rxn.disable || rxn.prob <= 0.0 {
                continue;
            }
            (rxn.prob, rxn.cmpt, rxn.srf)
        };
        let volume = match (cmpt, srf) {
            (Some(c), _) => {
                sim.ensure_compartment(c);
                sim.compartments[c].volume
            }
            (None, Some(s)) => sim.surfaces[s].total_area(),
            (None, None) => sim.walls.volume(),
        };
        let mean = prob * volume;
        if !(mean > 0.0) {
            continue;
        }
        let poisson = Poisson::new(mean)
            .map_err(|e| SimError::config(format!("zero-order reaction '{}': {e}", sim.rxnss[0].rxn[r].name)))?;
        let n = poisson.sample(&mut sim.rng) as u64;
        let dim = sim.dim();
        for _ in 0..n {
            let (point, panel) = match (cmpt, srf) {
                (Some(c), _) => (
                    compartment::random_point_in(&sim.compartments, c, &sim.surfaces, &sim.boxes, &mut sim.rng)?,
                    None,
                ),
                (None, Some(s)) => match sim.surfaces[s].random_point(&mut sim.rng) {
                    Some((p, x)) => (x, Some(PanelRef { surface: s, panel: p })),
                    None => continue,
                },
                (None, None) => (random_in_box(&mut sim.rng, sim.walls.low(), sim.walls.high(), dim), None),
            };
            fire(sim, 0, r, &[], point, panel)?;
            sim.events.record(EventType::Rxn0);
        }
    }
    Ok(())
}

/// First-order pass over every live molecule.
pub fn first_order(sim: &mut Simulation) -> SimResult<()> {
    if sim.rxnss[1].is_empty() {
        return Ok(());
    }
    let mut ids: Vec<MolId> = Vec::new();
    for ll in 0..sim.mols.nlists() {
        if sim.mols.list(ll).kind == MolListType::Port {
            continue;
        }
        ids.clear();
        ids.extend_from_slice(sim.mols.live(ll));
        for &id in &ids {
            let (ident, state, pos, pnl) = {
                let m = sim.mols.get(id);
                if !m.is_alive() {
                    continue;
                }
                (m.ident, m.mstate, m.pos, m.pnl)
            };
            let cands = sim.rxnss[1].first_order_candidates(ident, state);
            if cands.is_empty() {
                continue;
            }
            let u: f64 = sim.rng.random();
            let Some(r) = cands.iter().find(|c| u < c.cumprob).map(|c| c.rxn) else {
                continue;
            };
            if !restriction_allows(sim, 1, r, pos, &[pnl]) {
                continue;
            }
            fire(sim, 1, r, &[(id, pos)], pos, pnl)?;
            sim.events.record(EventType::Rxn1);
        }
    }
    Ok(())
}

/// Second-order pass: pairs within a box, then each box against its
/// forward neighbors, so every pair is tested once.
pub fn second_order(sim: &mut Simulation) -> SimResult<()> {
    if sim.rxnss[2].is_empty() {
        return Ok(());
    }
    let lists: Vec<usize> = (0..sim.mols.nlists())
        .filter(|&ll| sim.mols.list(ll).kind != MolListType::Port)
        .collect();
    let mut a: Vec<MolId> = Vec::new();
    let mut a2: Vec<MolId> = Vec::new();
    let mut b: Vec<MolId> = Vec::new();
    let mut neigh = Vec::new();
    for bx in 0..sim.boxes.nbox() {
        neigh.clear();
        neigh.extend_from_slice(sim.boxes.forward_neighbors(bx));
        for (i, &l1) in lists.iter().enumerate() {
            for &l2 in &lists[i..] {
                a.clear();
                a.extend_from_slice(sim.boxes.molecules(bx, l1));
                a2.clear();
                a2.extend_from_slice(sim.boxes.molecules(bx, l2));
                if l1 == l2 {
                    for j in 0..a.len() {
                        for k in j + 1..a.len() {
                            try_pair(sim, a[j], a[k], Vec3::zero(), EventType::Rxn2Intra)?;
                        }
                    }
                } else {
                    scan_pairs(sim, &a, &a2, Vec3::zero(), EventType::Rxn2Intra)?;
                }
                for nb in &neigh {
                    let shift = sim.boxes.wrap_offset(nb.wrap);
                    let event = if nb.wraps() { EventType::Rxn2Wrap } else { EventType::Rxn2Inter };
                    b.clear();
                    b.extend_from_slice(sim.boxes.molecules(nb.boxid, l2));
                    scan_pairs(sim, &a, &b, shift, event)?;
                    if l1 != l2 {
                        b.clear();
                        b.extend_from_slice(sim.boxes.molecules(nb.boxid, l1));
                        scan_pairs(sim, &a2, &b, shift, event)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn scan_pairs(sim: &mut Simulation, home: &[MolId], other: &[MolId], shift: Vec3, event: EventType) -> SimResult<()> {
    for &x in home {
        for &y in other {
            try_pair(sim, x, y, shift, event)?;
        }
    }
    Ok(())
}

/// Test one pair; `shift` is added to the second molecule's position.
fn try_pair(sim: &mut Simulation, x: MolId, y: MolId, shift: Vec3, event: EventType) -> SimResult<()> {
    if x == y {
        return Ok(());
    }
    let (mx, my) = (sim.mols.get(x), sim.mols.get(y));
    if !mx.is_alive() || !my.is_alive() {
        return Ok(());
    }
    let (px, py) = (mx.pos, my.pos + shift);
    let (kx, ky) = ((mx.ident, mx.mstate), (my.ident, my.mstate));
    let (pnlx, pnly) = (mx.pnl, my.pnl);
    let hybrid = mx.mstate.is_bound() != my.mstate.is_bound();
    let dist2 = (px - py).mag_sq();

    let mut chosen = None;
    for c in sim.rxnss[2].second_order_candidates(kx, ky) {
        let rxn = &sim.rxnss[2].rxn[c.rxn];
        if dist2 >= rxn.bindrad2 {
            continue;
        }
        chosen = Some((c.rxn, c.swapped, rxn.prob));
        break;
    }
    let Some((r, swapped, prob)) = chosen else {
        return Ok(());
    };
    if prob < 1.0 && sim.rng.random::<f64>() >= prob {
        return Ok(());
    }
    let (first, second) = if swapped { ((y, py), (x, px)) } else { ((x, px), (y, py)) };
    let d1 = sim.species.props(sim.mols.get(first.0).ident, sim.mols.get(first.0).mstate).difc;
    let d2 = sim.species.props(sim.mols.get(second.0).ident, sim.mols.get(second.0).mstate).difc;
    let point = reaction_point(first.1, d1, second.1, d2);
    if !restriction_allows(sim, 2, r, point, &[pnlx, pnly]) {
        return Ok(());
    }
    let panel = pnlx.or(pnly);
    fire(sim, 2, r, &[first, second], point, panel)?;
    sim.events.record(if hybrid { EventType::Rxn2Hybrid } else { event });
    Ok(())
}

fn restriction_allows(sim: &mut Simulation, order: usize, r: usize, point: Vec3, panels: &[Option<PanelRef>]) -> bool {
    let (cmpt, srf) = {
        let rxn = &sim.rxnss[order].rxn[r];
        (rxn.cmpt, rxn.srf)
    };
    if let Some(s) = srf {
        if !panels.iter().flatten().any(|p| p.surface == s) {
            return false;
        }
    }
    if let Some(c) = cmpt {
        sim.ensure_compartment(c);
        if !sim.point_in_compartment(c, point) {
            return false;
        }
    }
    true
}

/// Replace the reactants of reaction `r` with its products.
///
/// `panel` is the panel a bound reactant sat on (or the surface point of a
/// surface-restricted zero-order reaction); bound products go there.
fn fire(
    sim: &mut Simulation,
    order: usize,
    r: usize,
    reactants: &[Participant],
    point: Vec3,
    panel: Option<PanelRef>,
) -> SimResult<()> {
    let sernos: SmallVec<[u64; 2]> = reactants.iter().map(|&(id, _)| sim.mols.get(id).serno).collect();
    let rpos: SmallVec<[Vec3; 2]> = reactants.iter().map(|&(_, p)| p).collect();
    for &(id, _) in reactants {
        sim.mols.kill_molecule(id);
    }

    let dim = sim.dim();
    let eps = sim.collision.epsilon;
    let rxn = &sim.rxnss[order].rxn[r];
    let prd_difc: SmallVec<[f64; 4]> = rxn
        .prd
        .iter()
        .map(|p| {
            let state = if p.state == MolecState::Bsoln { MolecState::Soln } else { p.state };
            sim.species.props(p.ident, state).difc
        })
        .collect();
    let positions = place_products(rxn, point, &rpos, &prd_difc, dim, &mut sim.rng);

    let prd = rxn.prd.clone();
    for (p, pos) in prd.iter().zip(positions) {
        let (state, pos, pnl) = if p.state.is_bound() {
            let pref = panel.ok_or_else(|| {
                SimError::config(format!(
                    "reaction '{}' makes a bound product without a surface",
                    sim.rxnss[order].rxn[r].name
                ))
            })?;
            let pos = sim.surfaces[pref.surface].panels[pref.panel].project(pos);
            (p.state, pos, Some(pref))
        } else if let Some(pref) = panel {
            let face = if p.state == MolecState::Bsoln { Face::Back } else { Face::Front };
            let pnl = &sim.surfaces[pref.surface].panels[pref.panel];
            let foot = pnl.project(pos);
            let n = pnl.normal_at(foot) * face.sign();
            let h = (pos - foot).dot(n).abs().max(eps);
            (MolecState::Soln, sim.walls.contain(foot + n * h), None)
        } else {
            (MolecState::Soln, sim.walls.contain(pos), None)
        };
        let id = sim.mols.allocate_molecule(p.ident, state, pos)?;
        sim.mols.get_mut(id).pnl = pnl;
        if let SernoRule::Reactant(k) = p.serno {
            if let Some(&s) = sernos.get(k) {
                sim.mols.set_serno(id, s);
            }
        }
    }
    Ok(())
}

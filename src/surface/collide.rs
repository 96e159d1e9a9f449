// surface/collide.rs
// Resolves the motion of one molecule against walls and surface panels.
//
// A free molecule moves through Free -> PendingPanelCheck -> PendingWallCheck
// and ends Resolved or Bound. Panels and wall planes crossed by the step are
// handled together, nearest first. The closing wall check only contains
// molecules whose step started outside the domain.

use super::{Crossing, Face, Surface, SurfaceAction};
use crate::boxes::BoxGrid;
use crate::molecule::{MolecState, Molecule, PanelRef};
use crate::simulation::{EventCounters, EventType};
use crate::walls::{WallOutcome, Walls};
use rand::Rng;

#[derive(Clone, Copy, Debug)]
pub struct CollisionParams {
    pub epsilon: f64,
    pub max_iterations: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    Free,
    Absorbed,
    Adsorbed(PanelRef),
    Exported { surface: usize, face: Face },
    /// Iteration limit reached; the molecule was returned to its last safe point.
    Stuck,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Free,
    PendingWallCheck,
    PendingPanelCheck,
    Resolved(Resolution),
}

/// Outcome of the per-step transitions of a bound molecule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundOutcome {
    Stay,
    StateChanged,
    Desorbed,
}

pub struct Resolver<'a> {
    pub walls: &'a Walls,
    pub surfaces: &'a [Surface],
    pub boxes: &'a BoxGrid,
    pub params: CollisionParams,
}

impl<'a> Resolver<'a> {
    /// Check a free molecule that just diffused from `posx` to `pos`.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        m: &mut Molecule,
        scratch: &mut Vec<PanelRef>,
        rng: &mut R,
        events: &mut EventCounters,
    ) -> Resolution {
        let mut stage = Stage::Free;
        loop {
            stage = match stage {
                Stage::Free => Stage::PendingPanelCheck,
                Stage::PendingPanelCheck => match self.crossings(m, scratch, rng, events) {
                    Resolution::Free => Stage::PendingWallCheck,
                    other => Stage::Resolved(other),
                },
                Stage::PendingWallCheck => match self.walls.check(m) {
                    WallOutcome::Inside => Stage::Resolved(Resolution::Free),
                    WallOutcome::Moved(n) => {
                        events.add(EventType::Wall, n as u64);
                        Stage::Resolved(Resolution::Free)
                    }
                    WallOutcome::Absorbed => {
                        events.record(EventType::Wall);
                        Stage::Resolved(Resolution::Absorbed)
                    }
                },
                Stage::Resolved(r) => return r,
            };
        }
    }

    fn nearest_crossing(&self, p0: crate::utils::Vec3, p1: crate::utils::Vec3, scratch: &mut Vec<PanelRef>) -> Option<(PanelRef, Crossing)> {
        scratch.clear();
        self.boxes.panels_along(p0, p1, scratch);
        let mut best: Option<(PanelRef, Crossing)> = None;
        for &pref in scratch.iter() {
            let panel = &self.surfaces[pref.surface].panels[pref.panel];
            if let Some(hit) = panel.crossing(p0, p1) {
                if best.map_or(true, |(_, b)| hit.t < b.t) {
                    best = Some((pref, hit));
                }
            }
        }
        best
    }

    fn crossings<R: Rng + ?Sized>(
        &self,
        m: &mut Molecule,
        scratch: &mut Vec<PanelRef>,
        rng: &mut R,
        events: &mut EventCounters,
    ) -> Resolution {
        if self.surfaces.is_empty() {
            return Resolution::Free;
        }
        let eps = self.params.epsilon;
        let mut p0 = m.posx;
        for _ in 0..self.params.max_iterations {
            let p1 = m.pos;
            let panel_hit = self.nearest_crossing(p0, p1, scratch);
            if let Some(wall) = self.walls.crossing(p0, p1) {
                if panel_hit.map_or(true, |(_, hit)| wall.t < hit.t) {
                    events.record(EventType::Wall);
                    match self.walls.cross(m, p0, wall) {
                        Some(at) => p0 = at,
                        None => return Resolution::Absorbed,
                    }
                    continue;
                }
            }
            let Some((pref, hit)) = panel_hit else {
                return Resolution::Free;
            };
            m.via = hit.point;
            let surface = &self.surfaces[pref.surface];
            let panel = &surface.panels[pref.panel];
            let face = hit.face;
            // normal pointing to the arrival side
            let n = panel.normal_at(hit.point) * face.sign();

            let mut action = surface.action(m.ident, m.mstate, face);
            if action == SurfaceAction::Multiple {
                action = match surface.collision_details(m.ident, face) {
                    Some(det) => match det.choose(rng.random()) {
                        None => SurfaceAction::Reflect,
                        Some(to) => {
                            if let Some(ns) = det.new_species[to.index()] {
                                m.ident = ns;
                            }
                            match to {
                                MolecState::Soln | MolecState::Bsoln => {
                                    if to == face.solution_state() {
                                        SurfaceAction::Reflect
                                    } else {
                                        SurfaceAction::Transmit
                                    }
                                }
                                bound => SurfaceAction::Adsorb(bound),
                            }
                        }
                    },
                    None => SurfaceAction::Reflect,
                };
            }

            match action {
                SurfaceAction::Reflect | SurfaceAction::Multiple => {
                    let rem = p1 - hit.point;
                    m.pos = hit.point + rem - n * (2.0 * rem.dot(n));
                    p0 = hit.point + n * eps;
                }
                SurfaceAction::Transmit => {
                    p0 = hit.point - n * eps;
                }
                SurfaceAction::Absorb => {
                    events.record(EventType::Surf);
                    if surface.log_absorb {
                        log::debug!(
                            "molecule {} absorbed by {}:{} at {:?}",
                            m.serno,
                            surface.name,
                            panel.name,
                            hit.point
                        );
                    }
                    return Resolution::Absorbed;
                }
                SurfaceAction::Jump => match panel.jump[face.index()] {
                    Some((dst, dface)) => {
                        let dpanel = &surface.panels[dst];
                        let x2 = dpanel.from_local(panel.local_coords(hit.point));
                        let n2 = dpanel.normal_at(x2) * dface.sign();
                        let rem = p1 - hit.point;
                        let through = rem.dot(n).abs();
                        let tangential = rem - n * rem.dot(n);
                        let tangential = tangential - n2 * tangential.dot(n2);
                        m.pos = x2 + tangential + n2 * through;
                        m.posoffset += x2 - hit.point;
                        p0 = x2 + n2 * eps;
                    }
                    None => {
                        let rem = p1 - hit.point;
                        m.pos = hit.point + rem - n * (2.0 * rem.dot(n));
                        p0 = hit.point + n * eps;
                    }
                },
                SurfaceAction::Adsorb(state) => {
                    m.pos = hit.point;
                    m.mstate = state;
                    m.pnl = Some(pref);
                    return Resolution::Adsorbed(pref);
                }
                SurfaceAction::Port => {
                    m.pos = hit.point;
                    return Resolution::Exported { surface: pref.surface, face };
                }
            }
        }
        m.pos = p0;
        Resolution::Stuck
    }

    /// Per-step desorption and state flips of a bound molecule.
    pub fn bound_transition<R: Rng + ?Sized>(
        &self,
        m: &mut Molecule,
        rng: &mut R,
        events: &mut EventCounters,
    ) -> BoundOutcome {
        let Some(pref) = m.pnl else {
            return BoundOutcome::Stay;
        };
        let surface = &self.surfaces[pref.surface];
        let Some(det) = surface.bound_details(m.ident, m.mstate) else {
            return BoundOutcome::Stay;
        };
        let Some(to) = det.choose(rng.random()) else {
            return BoundOutcome::Stay;
        };
        if let Some(ns) = det.new_species[to.index()] {
            m.ident = ns;
        }
        match to {
            MolecState::Soln | MolecState::Bsoln => {
                let face = if to == MolecState::Soln { Face::Front } else { Face::Back };
                m.pos = surface.offset_point(pref.panel, m.pos, face, self.params.epsilon);
                m.posx = m.pos;
                m.mstate = MolecState::Soln;
                m.pnlx = m.pnl.take();
                events.record(EventType::Desorb);
                BoundOutcome::Desorbed
            }
            state => {
                m.mstate = state;
                BoundOutcome::StateChanged
            }
        }
    }
}

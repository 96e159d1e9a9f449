// surface/mod.rs
// Surfaces: panel collections with per-species interaction rules

mod panel;
mod intersect;
pub mod collide;

pub use panel::*;
pub use intersect::Crossing;

use crate::error::{SimError, SimResult};
use crate::molecule::{MolecState, PanelRef};
use crate::utils::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Face {
    Front,
    Back,
}

impl Face {
    pub fn index(self) -> usize {
        match self {
            Face::Front => 0,
            Face::Back => 1,
        }
    }

    pub fn opposite(self) -> Face {
        match self {
            Face::Front => Face::Back,
            Face::Back => Face::Front,
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Face::Front => 1.0,
            Face::Back => -1.0,
        }
    }

    /// Solution state on this side of a surface.
    pub fn solution_state(self) -> MolecState {
        match self {
            Face::Front => MolecState::Soln,
            Face::Back => MolecState::Bsoln,
        }
    }

    /// Parse "front", "back" or "both"; "both" expands to both faces.
    pub fn parse_many(s: &str) -> SimResult<&'static [Face]> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(&[Face::Front]),
            "back" => Ok(&[Face::Back]),
            "both" => Ok(&[Face::Front, Face::Back]),
            other => Err(SimError::unknown("face", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceAction {
    Reflect,
    Transmit,
    Absorb,
    Jump,
    /// Bind to the panel in the given bound state.
    Adsorb(MolecState),
    Port,
    /// Random choice among rate-driven destinations.
    Multiple,
}

impl SurfaceAction {
    pub fn parse(s: &str) -> SimResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reflect" => Ok(SurfaceAction::Reflect),
            "transmit" | "trans" => Ok(SurfaceAction::Transmit),
            "absorb" => Ok(SurfaceAction::Absorb),
            "jump" => Ok(SurfaceAction::Jump),
            "port" => Ok(SurfaceAction::Port),
            other => {
                if let Some(state) = other.strip_prefix("adsorb:") {
                    let ms = MolecState::parse(state)?;
                    if !ms.is_bound() {
                        return Err(SimError::config(format!("adsorb needs a bound state, got '{state}'")));
                    }
                    return Ok(SurfaceAction::Adsorb(ms));
                }
                Err(SimError::unknown("surface action", other))
            }
        }
    }
}

/// Where rate-driven transitions start from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateSource {
    /// A solution molecule colliding with the given face.
    Solution(Face),
    /// A molecule bound in the given state.
    Bound(MolecState),
}

/// Destination slots: Soln, Front, Back, Up, Down, Bsoln.
pub const DEST_COUNT: usize = 6;

#[derive(Clone, Debug, Default)]
pub struct ActionDetails {
    pub rate: [f64; DEST_COUNT],
    pub new_species: [Option<usize>; DEST_COUNT],
    pub prob: [f64; DEST_COUNT],
    pub cumprob: [f64; DEST_COUNT],
}

impl ActionDetails {
    /// Destination drawn for uniform `r`, or `None` for the residual probability.
    pub fn choose(&self, r: f64) -> Option<MolecState> {
        (0..DEST_COUNT)
            .find(|&i| self.prob[i] > 0.0 && r < self.cumprob[i])
            .and_then(MolecState::from_index)
    }

    fn fill_cumulative(&mut self) {
        let mut acc = 0.0;
        for i in 0..DEST_COUNT {
            acc += self.prob[i];
            self.cumprob[i] = acc;
        }
    }

    pub fn total_rate(&self) -> f64 {
        self.rate.iter().sum()
    }
}

/// Per-collision probability of a surface interaction with rate `kappa`.
pub fn collision_probability(kappa: f64, difc: f64, dt: f64) -> f64 {
    if kappa <= 0.0 {
        0.0
    } else if difc <= 0.0 {
        1.0
    } else {
        (kappa * (std::f64::consts::PI * dt / difc).sqrt()).min(1.0)
    }
}

#[derive(Clone, Debug)]
pub struct Emitter {
    pub species: usize,
    pub state: MolecState,
    pub face: Face,
    pub count: usize,
}

#[derive(Clone, Debug)]
pub struct Surface {
    pub name: String,
    pub panels: Vec<Panel>,
    /// `action[species][state][face]` for collisions.
    action: Vec<[[SurfaceAction; 2]; MolecState::COUNT]>,
    collision_details: Vec<[Option<ActionDetails>; 2]>,
    /// Per-step transitions of bound molecules, `[species][state]`.
    bound_details: Vec<[Option<ActionDetails>; MolecState::COUNT]>,
    areatable: Vec<f64>,
    pub emitters: Vec<Emitter>,
    /// Port index per face.
    pub port: [Option<usize>; 2],
    /// Bound molecules hop onto neighbor panels instead of stopping at edges.
    pub neighbor_hop: bool,
    /// Log each absorption at debug level.
    pub log_absorb: bool,
}

impl Surface {
    pub fn new(name: &str, nspecies: usize) -> Self {
        let mut s = Self {
            name: name.to_string(),
            panels: Vec::new(),
            action: Vec::new(),
            collision_details: Vec::new(),
            bound_details: Vec::new(),
            areatable: Vec::new(),
            emitters: Vec::new(),
            port: [None, None],
            neighbor_hop: false,
            log_absorb: false,
        };
        s.ensure_species(nspecies);
        s
    }

    pub fn ensure_species(&mut self, nspecies: usize) {
        while self.action.len() < nspecies {
            self.action.push([[SurfaceAction::Reflect; 2]; MolecState::COUNT]);
            self.collision_details.push([None, None]);
            self.bound_details.push(Default::default());
        }
    }

    pub fn panel_index(&self, name: &str) -> SimResult<usize> {
        self.panels
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| SimError::unknown("panel", format!("{}:{}", self.name, name)))
    }

    pub fn add_panel(&mut self, panel: Panel) -> SimResult<usize> {
        if self.panels.iter().any(|p| p.name == panel.name) {
            return Err(SimError::config(format!("duplicate panel '{}' in surface '{}'", panel.name, self.name)));
        }
        self.panels.push(panel);
        self.update_area_table();
        Ok(self.panels.len() - 1)
    }

    /// Panel indices of one shape, in insertion order.
    pub fn panels_of_shape(&self, shape: PanelShape) -> impl Iterator<Item = usize> + '_ {
        self.panels
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.shape() == shape)
            .map(|(i, _)| i)
    }

    pub fn action(&self, species: usize, state: MolecState, face: Face) -> SurfaceAction {
        self.action[species][state.index()][face.index()]
    }

    pub fn set_action(
        &mut self,
        species: usize,
        state: MolecState,
        faces: &[Face],
        action: SurfaceAction,
    ) -> SimResult<()> {
        if species >= self.action.len() {
            return Err(SimError::config(format!("species index {species} out of range")));
        }
        for ms in state.expand() {
            for f in faces {
                self.action[species][ms.index()][f.index()] = action;
            }
        }
        Ok(())
    }

    /// Set a transition rate. Solution sources take an adsorption or
    /// transmission rate (length/time); bound sources a first-order rate.
    pub fn set_rate(
        &mut self,
        species: usize,
        source: RateSource,
        to: MolecState,
        rate: f64,
        new_species: Option<usize>,
    ) -> SimResult<()> {
        if species >= self.action.len() {
            return Err(SimError::config(format!("species index {species} out of range")));
        }
        if !(rate >= 0.0) {
            return Err(SimError::config(format!("surface rate must be non-negative, got {rate}")));
        }
        if to == MolecState::All {
            return Err(SimError::config("surface rate destination cannot be 'all'"));
        }
        let details = match source {
            RateSource::Solution(face) => {
                self.action[species][MolecState::Soln.index()][face.index()] = SurfaceAction::Multiple;
                self.collision_details[species][face.index()].get_or_insert_with(Default::default)
            }
            RateSource::Bound(ms) => {
                if !ms.is_bound() {
                    return Err(SimError::config("bound rate source must be a bound state"));
                }
                self.bound_details[species][ms.index()].get_or_insert_with(Default::default)
            }
        };
        details.rate[to.index()] = rate;
        details.new_species[to.index()] = new_species;
        Ok(())
    }

    pub fn collision_details(&self, species: usize, face: Face) -> Option<&ActionDetails> {
        self.collision_details[species][face.index()].as_ref()
    }

    pub fn bound_details(&self, species: usize, state: MolecState) -> Option<&ActionDetails> {
        self.bound_details[species][state.index()].as_ref()
    }

    /// Convert rates to probabilities for timestep `dt`. `difc(species)` is the
    /// solution diffusion coefficient. Returns the number of tables whose
    /// probabilities had to be rescaled.
    pub fn compute_probabilities(&mut self, dt: f64, difc: impl Fn(usize) -> f64) -> usize {
        let mut overflows = 0;
        for (sp, per_face) in self.collision_details.iter_mut().enumerate() {
            for (fi, details) in per_face.iter_mut().enumerate() {
                let Some(det) = details else { continue };
                let face = if fi == 0 { Face::Front } else { Face::Back };
                for i in 0..DEST_COUNT {
                    det.prob[i] = collision_probability(det.rate[i], difc(sp), dt);
                }
                // reflection back to the arrival side is the residual
                det.prob[face.solution_state().index()] = 0.0;
                let total: f64 = det.prob.iter().sum();
                if total > 1.0 {
                    overflows += 1;
                    for p in det.prob.iter_mut() {
                        *p /= total;
                    }
                }
                det.fill_cumulative();
            }
        }
        for per_state in self.bound_details.iter_mut() {
            for (si, details) in per_state.iter_mut().enumerate() {
                let Some(det) = details else { continue };
                det.rate[si] = 0.0;
                let total = det.total_rate();
                let p_any = if total > 0.0 { 1.0 - (-total * dt).exp() } else { 0.0 };
                if total * dt > 1.0 {
                    overflows += 1;
                }
                for i in 0..DEST_COUNT {
                    det.prob[i] = if total > 0.0 { det.rate[i] / total * p_any } else { 0.0 };
                }
                det.fill_cumulative();
            }
        }
        overflows
    }

    pub fn update_area_table(&mut self) {
        let mut acc = 0.0;
        self.areatable = self
            .panels
            .iter()
            .map(|p| {
                acc += p.area();
                acc
            })
            .collect();
    }

    pub fn total_area(&self) -> f64 {
        self.areatable.last().copied().unwrap_or(0.0)
    }

    /// Area-weighted random panel and a uniform point on it.
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(usize, Vec3)> {
        let total = self.total_area();
        if total <= 0.0 {
            return None;
        }
        let r = rng.random::<f64>() * total;
        let idx = self.areatable.partition_point(|&a| a <= r).min(self.panels.len() - 1);
        Some((idx, self.panels[idx].random_point(rng)))
    }

    /// Point just off panel `idx` at `p`, on side `face`.
    pub fn offset_point(&self, idx: usize, p: Vec3, face: Face, eps: f64) -> Vec3 {
        p + self.panels[idx].normal_at(p) * (face.sign() * eps)
    }

    pub fn panel_ref(&self, surface: usize, panel: usize) -> PanelRef {
        debug_assert!(panel < self.panels.len());
        PanelRef { surface, panel }
    }
}

#[cfg(test)]
#[path = "tests/panels.rs"]
mod panel_tests;

#[cfg(test)]
#[path = "tests/collisions.rs"]
mod collision_tests;

// simulation/simulation.rs
// Contains the Simulation struct, the timestep loop and runtime mutation

use super::events::{EventCounters, EventType, WarningCounters};
use super::snapshot::{MoleculeView, Snapshot};
use crate::boxes::BoxGrid;
use crate::compartment::{self, Compartment};
use crate::config::SimConfig;
use crate::diffusion::DiffusionStepper;
use crate::error::{SimError, SimResult};
use crate::molecule::{MolId, MolListType, MolecState, MoleculeLists, PanelRef};
use crate::profile_scope;
use crate::reaction::{self, ReactionSet};
use crate::species::SpeciesTable;
use crate::surface::collide::{CollisionParams, Resolution, Resolver};
use crate::surface::{Face, PanelGeometry, Surface};
use crate::utils::{random_in_box, to_array, Vec3};
use crate::walls::Walls;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Where new molecules are put.
#[derive(Clone, Debug, PartialEq)]
pub enum Placement {
    /// Uniform over the whole domain.
    Uniform,
    Point(Vec3),
    Region { low: Vec3, high: Vec3 },
    Compartment(usize),
    /// Area-uniform on a surface; solution molecules sit just off `face`.
    Surface { surface: usize, face: Face },
}

/// Molecule that left the system through a port.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportedMolecule {
    pub serno: u64,
    pub ident: usize,
    pub pos: Vec3,
}

#[derive(Clone, Debug)]
pub struct Port {
    pub name: String,
    pub surface: usize,
    pub face: Face,
    pub buffer: Vec<ExportedMolecule>,
}

/// The main simulation state and logic for the particle system.
pub struct Simulation {
    pub config: SimConfig,
    pub time: f64,
    pub iteration: u64,
    pub species: SpeciesTable,
    pub mols: MoleculeLists,
    pub walls: Walls,
    pub surfaces: Vec<Surface>,
    pub boxes: BoxGrid,
    pub compartments: Vec<Compartment>,
    /// Reactions by order 0, 1 and 2.
    pub rxnss: [ReactionSet; 3],
    pub diffusion: DiffusionStepper,
    pub ports: Vec<Port>,
    pub events: EventCounters,
    pub warnings: WarningCounters,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) collision: CollisionParams,
    pub(crate) elapsed: Duration,
    id_buf: Vec<MolId>,
    panel_buf: Vec<PanelRef>,
}

impl Simulation {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        config: SimConfig,
        species: SpeciesTable,
        mols: MoleculeLists,
        walls: Walls,
        surfaces: Vec<Surface>,
        boxes: BoxGrid,
        compartments: Vec<Compartment>,
        rxnss: [ReactionSet; 3],
        diffusion: DiffusionStepper,
        ports: Vec<Port>,
        warnings: WarningCounters,
        rng: ChaCha8Rng,
    ) -> Self {
        let collision = CollisionParams {
            epsilon: config.surface_epsilon,
            max_iterations: config.max_surface_iterations,
        };
        Self {
            time: config.time_start,
            config,
            iteration: 0,
            species,
            mols,
            walls,
            surfaces,
            boxes,
            compartments,
            rxnss,
            diffusion,
            ports,
            events: EventCounters::default(),
            warnings,
            rng,
            collision,
            elapsed: Duration::ZERO,
            id_buf: Vec::new(),
            panel_buf: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.config.dim
    }

    pub fn dt(&self) -> f64 {
        self.config.dt
    }

    /// Wall-clock time spent stepping.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn is_finished(&self) -> bool {
        self.time >= self.config.time_stop - 0.5 * self.config.dt
    }

    /// Advance one timestep.
    pub fn step(&mut self) -> SimResult<()> {
        profile_scope!("step");
        let start = Instant::now();
        self.diffusion.tick(&mut self.rng);
        {
            profile_scope!("diffuse");
            self.diffuse_and_collide();
        }
        self.sort_molecules();
        {
            profile_scope!("reactions");
            reaction::engine::zero_order(self)?;
            self.sort_molecules();
            reaction::engine::first_order(self)?;
            self.sort_molecules();
            reaction::engine::second_order(self)?;
            self.sort_molecules();
        }
        self.iteration += 1;
        self.time = self.config.time_start + self.iteration as f64 * self.config.dt;
        self.elapsed += start.elapsed();
        #[cfg(debug_assertions)]
        self.validate_boxes()?;
        Ok(())
    }

    pub fn run(&mut self, steps: u64) -> SimResult<()> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(())
    }

    /// Step until simulated time reaches `t` (within half a timestep).
    pub fn run_until(&mut self, t: f64) -> SimResult<()> {
        while self.time < t - 0.5 * self.config.dt {
            self.step()?;
        }
        Ok(())
    }

    fn diffuse_and_collide(&mut self) {
        let Simulation {
            mols,
            diffusion,
            walls,
            surfaces,
            boxes,
            rng,
            events,
            warnings,
            ports,
            collision,
            id_buf,
            panel_buf,
            ..
        } = self;
        let resolver = Resolver { walls: &*walls, surfaces: &surfaces[..], boxes: &*boxes, params: *collision };
        for ll in 0..mols.nlists() {
            if mols.list(ll).kind == MolListType::Port {
                continue;
            }
            id_buf.clear();
            id_buf.extend_from_slice(mols.live(ll));
            for &id in id_buf.iter() {
                let m = mols.get_mut(id);
                if !m.is_alive() {
                    continue;
                }
                if m.mstate.is_bound() {
                    diffusion.step_bound(m, surfaces, rng);
                    resolver.bound_transition(m, rng, events);
                    continue;
                }
                diffusion.step(m, rng);
                match resolver.resolve(m, panel_buf, rng, events) {
                    Resolution::Free | Resolution::Adsorbed(_) => {}
                    Resolution::Stuck => {
                        if warnings.surface_iterations == 0 {
                            log::warn!(
                                "molecule {} exceeded {} surface interactions in one step",
                                m.serno,
                                collision.max_iterations
                            );
                        }
                        warnings.surface_iterations += 1;
                    }
                    Resolution::Absorbed => mols.kill_molecule(id),
                    Resolution::Exported { surface, face } => {
                        let exported = ExportedMolecule { serno: m.serno, ident: m.ident, pos: m.pos };
                        if let Some(port) = surfaces[surface].port[face.index()] {
                            ports[port].buffer.push(exported);
                        }
                        events.record(EventType::Export);
                        mols.kill_molecule(id);
                    }
                }
            }
        }
    }

    /// Apply list sorting and bring box membership up to date.
    pub(crate) fn sort_molecules(&mut self) {
        let report = self.mols.sort();
        for &(id, boxid, list) in &report.removed {
            if let Some(b) = boxid {
                self.boxes.remove(b, list, id);
            }
        }
        for &(id, old) in &report.relisted {
            let m = self.mols.get_mut(id);
            if let Some(b) = m.boxid.take() {
                self.boxes.remove(b, old, id);
            }
        }
        for ll in 0..self.mols.nlists() {
            for i in 0..self.mols.live(ll).len() {
                let id = self.mols.live(ll)[i];
                let m = self.mols.get_mut(id);
                self.boxes.assign(id, m);
            }
        }
    }

    /// Check that every live molecule is listed in the box containing it.
    pub fn validate_boxes(&self) -> SimResult<()> {
        self.boxes.validate(|id| self.mols.get(id))?;
        for (id, m) in self.mols.iter_live() {
            let expected = self.boxes.box_index_of(m.pos);
            if m.boxid != Some(expected) || !self.boxes.molecules(expected, m.list).contains(&id) {
                return Err(SimError::ConsistencyViolation(format!(
                    "molecule {} (serial {}) is not in box {}",
                    id, m.serno, expected
                )));
            }
        }
        Ok(())
    }

    /// Bring a compartment's cached volume and box list up to date.
    pub(crate) fn ensure_compartment(&mut self, c: usize) {
        if self.compartments[c].stale {
            let seed = self.config.seed ^ (c as u64 + 1).wrapping_mul(0xD1B5_4A32_D192_ED03);
            compartment::update_compartment(
                &mut self.compartments,
                c,
                &self.surfaces,
                &self.boxes,
                self.config.compartment_samples,
                seed,
            );
        }
    }

    fn mark_compartments_stale(&mut self, surface: usize) {
        for c in self.compartments.iter_mut() {
            if c.bounded_by(surface) {
                c.stale = true;
            }
        }
        // propagate through logic references until nothing changes
        loop {
            let mut changed = false;
            for i in 0..self.compartments.len() {
                if self.compartments[i].stale {
                    continue;
                }
                let depends = self.compartments[i]
                    .logic
                    .iter()
                    .any(|&(_, other)| self.compartments[other].stale);
                if depends {
                    self.compartments[i].stale = true;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    pub fn point_in_compartment(&self, c: usize, pos: Vec3) -> bool {
        compartment::point_in_compartment(&self.compartments, c, &self.surfaces, pos)
    }

    /// Draw a position (and panel, for bound states) for a new molecule.
    pub(crate) fn sample_placement(
        &mut self,
        placement: &Placement,
        state: MolecState,
    ) -> SimResult<(Vec3, Option<PanelRef>)> {
        let dim = self.config.dim;
        if state.is_bound() && !matches!(placement, Placement::Surface { .. }) {
            return Err(SimError::config(format!(
                "molecules in state '{}' must be placed on a surface",
                state.name()
            )));
        }
        match placement {
            Placement::Uniform => Ok((random_in_box(&mut self.rng, self.walls.low(), self.walls.high(), dim), None)),
            Placement::Point(p) => Ok((crate::utils::truncate(*p, dim), None)),
            Placement::Region { low, high } => Ok((random_in_box(&mut self.rng, *low, *high, dim), None)),
            Placement::Compartment(c) => {
                let c = *c;
                if c >= self.compartments.len() {
                    return Err(SimError::config(format!("compartment index {c} out of range")));
                }
                self.ensure_compartment(c);
                let p = compartment::random_point_in(&self.compartments, c, &self.surfaces, &self.boxes, &mut self.rng)?;
                Ok((p, None))
            }
            Placement::Surface { surface, face } => {
                let s = self
                    .surfaces
                    .get(*surface)
                    .ok_or_else(|| SimError::config(format!("surface index {surface} out of range")))?;
                let (panel, p) = s
                    .random_point(&mut self.rng)
                    .ok_or_else(|| SimError::config(format!("surface '{}' has no area", s.name)))?;
                if state.is_bound() {
                    Ok((p, Some(PanelRef { surface: *surface, panel })))
                } else {
                    Ok((s.offset_point(panel, p, *face, self.collision.epsilon), None))
                }
            }
        }
    }

    fn spawn(&mut self, ident: usize, state: MolecState, placement: &Placement) -> SimResult<MolId> {
        if ident == 0 || ident >= self.species.len() {
            return Err(SimError::config(format!("species index {ident} out of range")));
        }
        let (pos, pnl) = self.sample_placement(placement, state)?;
        let id = self.mols.allocate_molecule(ident, state, pos)?;
        self.mols.get_mut(id).pnl = pnl;
        Ok(id)
    }

    /// Create `count` molecules; they are listed and boxed before returning.
    pub fn add_molecules(
        &mut self,
        ident: usize,
        state: MolecState,
        count: usize,
        placement: &Placement,
    ) -> SimResult<Vec<MolId>> {
        let ids = (0..count)
            .map(|_| self.spawn(ident, state, placement))
            .collect::<SimResult<Vec<_>>>()?;
        self.sort_molecules();
        Ok(ids)
    }

    /// Place `count` molecules on a surface, area-uniformly.
    pub fn emit_on_surface(
        &mut self,
        surface: usize,
        ident: usize,
        state: MolecState,
        face: Face,
        count: usize,
    ) -> SimResult<Vec<MolId>> {
        self.add_molecules(ident, state, count, &Placement::Surface { surface, face })
    }

    pub fn port_index(&self, name: &str) -> SimResult<usize> {
        self.ports
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| SimError::unknown("port", name))
    }

    /// Remove and return molecules exported through a port since the last call.
    pub fn take_exported(&mut self, port: usize) -> Vec<ExportedMolecule> {
        std::mem::take(&mut self.ports[port].buffer)
    }

    /// Bring molecules in through a port: each is placed in solution at a
    /// random point of the port surface, just off the port face.
    pub fn import_molecules(&mut self, port: usize, incoming: &[ExportedMolecule]) -> SimResult<Vec<MolId>> {
        let placement = {
            let p = self
                .ports
                .get(port)
                .ok_or_else(|| SimError::config(format!("port index {port} out of range")))?;
            Placement::Surface { surface: p.surface, face: p.face }
        };
        let ids = incoming
            .iter()
            .map(|mol| self.spawn(mol.ident, MolecState::Soln, &placement))
            .collect::<SimResult<Vec<_>>>()?;
        self.sort_molecules();
        self.events.add(EventType::Import, ids.len() as u64);
        Ok(ids)
    }

    pub fn translate_panel(&mut self, pref: PanelRef, delta: Vec3) -> SimResult<()> {
        self.panel_mut(pref)?.translate(delta)?;
        self.after_panel_moved(pref, Some(delta));
        Ok(())
    }

    pub fn set_panel_geometry(&mut self, pref: PanelRef, geom: PanelGeometry) -> SimResult<()> {
        self.panel_mut(pref)?.set_geometry(geom)?;
        self.after_panel_moved(pref, None);
        Ok(())
    }

    fn panel_mut(&mut self, pref: PanelRef) -> SimResult<&mut crate::surface::Panel> {
        self.surfaces
            .get_mut(pref.surface)
            .and_then(|s| s.panels.get_mut(pref.panel))
            .ok_or_else(|| SimError::config(format!("no panel {}:{}", pref.surface, pref.panel)))
    }

    fn after_panel_moved(&mut self, pref: PanelRef, delta: Option<Vec3>) {
        self.surfaces[pref.surface].update_area_table();
        self.boxes.update_panel(pref, &self.surfaces);
        self.mark_compartments_stale(pref.surface);
        // bound molecules follow their panel
        let panel = &self.surfaces[pref.surface].panels[pref.panel];
        for ll in 0..self.mols.nlists() {
            for i in 0..self.mols.live(ll).len() {
                let id = self.mols.live(ll)[i];
                let m = self.mols.get_mut(id);
                if m.pnl == Some(pref) {
                    let moved = m.pos + delta.unwrap_or_else(Vec3::zero);
                    m.pos = panel.project(moved);
                    m.posx = m.pos;
                }
            }
        }
        self.sort_molecules();
    }

    /// Enable or disable a reaction by name and rebuild its lookup table.
    pub fn set_reaction_enabled(&mut self, name: &str, enabled: bool) -> SimResult<()> {
        let nspecies = self.species.len();
        let dt = self.config.dt;
        for set in self.rxnss.iter_mut() {
            if let Some(i) = set.index(name) {
                set.rxn[i].disable = !enabled;
                set.mark_stale();
                set.build_table(nspecies, dt);
                return Ok(());
            }
        }
        Err(SimError::unknown("reaction", name))
    }

    pub fn count(&self, ident: usize, state: MolecState) -> usize {
        self.mols.count(ident, state)
    }

    pub fn count_by_name(&self, species: &str) -> SimResult<usize> {
        Ok(self.count(self.species.index(species)?, MolecState::All))
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut counts = BTreeMap::new();
        for ident in 1..self.species.len() {
            counts.insert(self.species.name(ident).to_string(), 0usize);
        }
        let molecules = self
            .mols
            .iter_live()
            .map(|(_, m)| {
                let props = self.species.props(m.ident, m.mstate);
                if let Some(c) = counts.get_mut(self.species.name(m.ident)) {
                    *c += 1;
                }
                MoleculeView {
                    serno: m.serno,
                    species: self.species.name(m.ident).to_string(),
                    state: m.mstate,
                    pos: to_array(m.pos),
                    color: [props.color.red, props.color.green, props.color.blue],
                    size: props.display_size,
                }
            })
            .collect();
        Snapshot {
            time: self.time,
            iteration: self.iteration,
            elapsed_secs: self.elapsed.as_secs_f64(),
            molecules,
            counts,
            events: self.events.clone(),
            warnings: self.warnings.clone(),
        }
    }
}

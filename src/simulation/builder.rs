// simulation/builder.rs
// Staged construction of a Simulation: Uninit -> ListsBuilt -> ParamsComputed -> Ready

use super::events::WarningCounters;
use super::simulation::{Placement, Port, Simulation};
use crate::boxes::{BoxGrid, BoxGridParams, BoxSizing};
use crate::compartment::Compartment;
use crate::config::SimConfig;
use crate::diffusion::DiffusionStepper;
use crate::error::{SimError, SimResult};
use crate::molecule::{MolListType, MolecState, MoleculeLists};
use crate::reaction::{rates, Reactant, Reaction, ReactionSet, RevParam};
use crate::species::SpeciesTable;
use crate::surface::{Face, Panel, PanelGeometry, Surface, SurfaceAction};
use crate::utils::Vec3;
use crate::walls::{WallType, Walls};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildStage {
    /// Accepting definitions.
    Uninit,
    /// Definitions validated and molecule lists created.
    ListsBuilt,
    /// Rates converted to probabilities and binding radii; lookup tables built.
    ParamsComputed,
    /// The simulation has been handed out.
    Ready,
}

#[derive(Clone, Debug)]
struct MoleculeRequest {
    ident: usize,
    state: MolecState,
    count: usize,
    placement: Placement,
}

pub struct SimBuilder {
    stage: BuildStage,
    config: SimConfig,
    species: SpeciesTable,
    walls: Option<Walls>,
    surfaces: Vec<Surface>,
    compartments: Vec<Compartment>,
    rxnss: [ReactionSet; 3],
    lists: Vec<(String, MolListType)>,
    list_routes: Vec<(usize, MolecState, String)>,
    ports: Vec<Port>,
    requests: Vec<MoleculeRequest>,
    mols: Option<MoleculeLists>,
    warnings: WarningCounters,
    rng: ChaCha8Rng,
}

fn solution_state(state: MolecState) -> MolecState {
    match state {
        MolecState::All | MolecState::Bsoln => MolecState::Soln,
        s => s,
    }
}

impl SimBuilder {
    pub fn new(config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Ok(Self {
            stage: BuildStage::Uninit,
            config,
            species: SpeciesTable::new(),
            walls: None,
            surfaces: Vec::new(),
            compartments: Vec::new(),
            rxnss: [ReactionSet::new(0), ReactionSet::new(1), ReactionSet::new(2)],
            lists: Vec::new(),
            list_routes: Vec::new(),
            ports: Vec::new(),
            requests: Vec::new(),
            mols: None,
            warnings: WarningCounters::default(),
            rng,
        })
    }

    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    fn expect_stage(&self, stage: BuildStage, what: &str) -> SimResult<()> {
        if self.stage != stage {
            return Err(SimError::config(format!(
                "{what} requires build stage {stage:?}, builder is at {:?}",
                self.stage
            )));
        }
        Ok(())
    }

    pub fn add_species(&mut self, name: &str) -> SimResult<usize> {
        self.expect_stage(BuildStage::Uninit, "adding species")?;
        self.species.add(name)
    }

    pub fn species(&self) -> &SpeciesTable {
        &self.species
    }

    pub fn species_mut(&mut self) -> SimResult<&mut SpeciesTable> {
        self.expect_stage(BuildStage::Uninit, "editing species")?;
        Ok(&mut self.species)
    }

    pub fn set_boundaries(&mut self, low: Vec3, high: Vec3, kind: [[WallType; 2]; 3]) -> SimResult<()> {
        self.expect_stage(BuildStage::Uninit, "setting boundaries")?;
        self.walls = Some(Walls::new(self.config.dim, low, high, kind)?);
        Ok(())
    }

    pub fn add_surface(&mut self, name: &str) -> SimResult<usize> {
        self.expect_stage(BuildStage::Uninit, "adding surfaces")?;
        if self.surfaces.iter().any(|s| s.name == name) {
            return Err(SimError::config(format!("duplicate surface '{name}'")));
        }
        self.surfaces.push(Surface::new(name, self.species.len()));
        Ok(self.surfaces.len() - 1)
    }

    pub fn surface_index(&self, name: &str) -> SimResult<usize> {
        self.surfaces
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| SimError::unknown("surface", name))
    }

    /// Surface for editing actions, rates and emitters.
    pub fn surface_mut(&mut self, surface: usize) -> SimResult<&mut Surface> {
        self.expect_stage(BuildStage::Uninit, "editing surfaces")?;
        let nspecies = self.species.len();
        let s = self
            .surfaces
            .get_mut(surface)
            .ok_or_else(|| SimError::config(format!("surface index {surface} out of range")))?;
        s.ensure_species(nspecies);
        Ok(s)
    }

    pub fn add_panel(&mut self, surface: usize, name: &str, geom: PanelGeometry) -> SimResult<usize> {
        let panel = Panel::new(name, surface, geom)?;
        self.surface_mut(surface)?.add_panel(panel)
    }

    /// Link `face` of one panel to `dst_face` of another panel of the same surface.
    pub fn set_jump(&mut self, surface: usize, panel: usize, face: Face, dst: usize, dst_face: Face) -> SimResult<()> {
        let s = self.surface_mut(surface)?;
        if panel >= s.panels.len() || dst >= s.panels.len() {
            return Err(SimError::config(format!("jump panel out of range on surface '{}'", s.name)));
        }
        s.panels[panel].jump[face.index()] = Some((dst, dst_face));
        Ok(())
    }

    pub fn set_neighbors(&mut self, surface: usize, panel: usize, neighbors: &[usize]) -> SimResult<()> {
        let s = self.surface_mut(surface)?;
        if panel >= s.panels.len() || neighbors.iter().any(|&n| n >= s.panels.len() || n == panel) {
            return Err(SimError::config(format!("neighbor panel out of range on surface '{}'", s.name)));
        }
        s.panels[panel].neighbors = neighbors.to_vec();
        Ok(())
    }

    /// Make `face` of `surface` a port; molecules hitting it are exported.
    pub fn add_port(&mut self, name: &str, surface: usize, face: Face) -> SimResult<usize> {
        self.expect_stage(BuildStage::Uninit, "adding ports")?;
        if self.ports.iter().any(|p| p.name == name) {
            return Err(SimError::config(format!("duplicate port '{name}'")));
        }
        let index = self.ports.len();
        let s = self.surface_mut(surface)?;
        if s.port[face.index()].is_some() {
            return Err(SimError::config(format!("surface '{}' already has a port on that face", s.name)));
        }
        s.port[face.index()] = Some(index);
        self.ports.push(Port { name: name.to_string(), surface, face, buffer: Vec::new() });
        Ok(index)
    }

    pub fn add_compartment(&mut self, cmpt: Compartment) -> SimResult<usize> {
        self.expect_stage(BuildStage::Uninit, "adding compartments")?;
        if self.compartments.iter().any(|c| c.name == cmpt.name) {
            return Err(SimError::config(format!("duplicate compartment '{}'", cmpt.name)));
        }
        self.compartments.push(cmpt);
        Ok(self.compartments.len() - 1)
    }

    pub fn compartment_index(&self, name: &str) -> SimResult<usize> {
        self.compartments
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| SimError::unknown("compartment", name))
    }

    /// Returns (order, index within order).
    pub fn add_reaction(&mut self, rxn: Reaction) -> SimResult<(usize, usize)> {
        self.expect_stage(BuildStage::Uninit, "adding reactions")?;
        let order = rxn.order();
        if self.rxnss.iter().any(|set| set.index(&rxn.name).is_some()) {
            return Err(SimError::config(format!("duplicate reaction '{}'", rxn.name)));
        }
        let index = self.rxnss[order].add(rxn)?;
        Ok((order, index))
    }

    pub fn add_list(&mut self, name: &str, kind: MolListType) -> SimResult<()> {
        self.expect_stage(BuildStage::Uninit, "adding molecule lists")?;
        if name == crate::config::DEFAULT_LIST_NAME || self.lists.iter().any(|(n, _)| n == name) {
            return Err(SimError::config(format!("duplicate molecule list '{name}'")));
        }
        self.lists.push((name.to_string(), kind));
        Ok(())
    }

    /// Keep molecules of `ident` in `state` on list `list`.
    pub fn assign_list(&mut self, ident: usize, state: MolecState, list: &str) -> SimResult<()> {
        self.expect_stage(BuildStage::Uninit, "assigning molecule lists")?;
        self.list_routes.push((ident, state, list.to_string()));
        Ok(())
    }

    /// Request `count` molecules, placed when the simulation is finished.
    pub fn add_molecules(&mut self, ident: usize, state: MolecState, count: usize, placement: Placement) -> SimResult<()> {
        self.expect_stage(BuildStage::Uninit, "adding molecules")?;
        if ident == 0 || ident >= self.species.len() {
            return Err(SimError::config(format!("species index {ident} out of range")));
        }
        if state == MolecState::All || state == MolecState::Bsoln {
            return Err(SimError::config(format!("cannot create molecules in state '{}'", state.name())));
        }
        self.requests.push(MoleculeRequest { ident, state, count, placement });
        Ok(())
    }

    fn validate_definitions(&self) -> SimResult<()> {
        let nspecies = self.species.len();
        let nsurf = self.surfaces.len();
        if !self.surfaces.is_empty() && self.config.dim != 3 {
            return Err(SimError::config(format!(
                "surfaces require a 3-dimensional system, dim is {}",
                self.config.dim
            )));
        }
        for s in &self.surfaces {
            for p in &s.panels {
                for (dst, _) in p.jump.iter().flatten() {
                    let Some(target) = s.panels.get(*dst) else {
                        return Err(SimError::config(format!("panel '{}' jumps to a missing panel", p.name)));
                    };
                    if target.shape() != p.shape() {
                        return Err(SimError::degenerate(
                            p.name.clone(),
                            format!("jump target '{}' has a different shape", target.name),
                        ));
                    }
                }
            }
        }
        for (ci, c) in self.compartments.iter().enumerate() {
            if c.surfaces.iter().any(|&s| s >= nsurf) {
                return Err(SimError::config(format!("compartment '{}' names a missing surface", c.name)));
            }
            if c.logic.iter().any(|&(_, other)| other >= ci) {
                return Err(SimError::config(format!(
                    "compartment '{}' logic must reference earlier compartments",
                    c.name
                )));
            }
        }
        for set in &self.rxnss {
            for r in &set.rxn {
                let idents = r.rct.iter().map(|x| x.ident).chain(r.prd.iter().map(|p| p.ident));
                for ident in idents {
                    if ident == 0 || ident >= nspecies {
                        return Err(SimError::config(format!("reaction '{}' names species index {ident}", r.name)));
                    }
                }
                if r.cmpt.is_some_and(|c| c >= self.compartments.len()) {
                    return Err(SimError::config(format!("reaction '{}' names a missing compartment", r.name)));
                }
                if r.srf.is_some_and(|s| s >= nsurf) {
                    return Err(SimError::config(format!("reaction '{}' names a missing surface", r.name)));
                }
                let bound_reactant = r.rct.iter().any(|x| x.state.is_bound());
                let bound_product = r.prd.iter().any(|p| p.state.is_bound() || p.state == MolecState::Bsoln);
                let surface_source = bound_reactant || (r.order() == 0 && r.srf.is_some());
                if bound_product && !surface_source {
                    return Err(SimError::config(format!(
                        "reaction '{}' has surface products but no surface reactant",
                        r.name
                    )));
                }
            }
        }
        for req in &self.requests {
            if let Placement::Compartment(c) = req.placement {
                if c >= self.compartments.len() {
                    return Err(SimError::config(format!("compartment index {c} out of range")));
                }
            }
            if let Placement::Surface { surface, .. } = req.placement {
                if surface >= nsurf {
                    return Err(SimError::config(format!("surface index {surface} out of range")));
                }
            }
        }
        Ok(())
    }

    /// Validate definitions and create the molecule lists.
    pub fn build_lists(&mut self) -> SimResult<()> {
        self.expect_stage(BuildStage::Uninit, "building lists")?;
        if self.walls.is_none() {
            return Err(SimError::config("system boundaries were not set"));
        }
        let nspecies = self.species.len();
        for s in self.surfaces.iter_mut() {
            s.ensure_species(nspecies);
        }
        self.validate_definitions()?;
        for port in &self.ports {
            let s = &mut self.surfaces[port.surface];
            for ident in 1..nspecies {
                s.set_action(ident, MolecState::Soln, &[port.face], SurfaceAction::Port)?;
            }
        }

        let mut mols = MoleculeLists::new(nspecies, self.config.max_molecules)?;
        for (name, kind) in &self.lists {
            mols.add_list(name, *kind)?;
        }
        for (ident, state, list) in &self.list_routes {
            let index = mols
                .list_index(list)
                .ok_or_else(|| SimError::unknown("molecule list", list.clone()))?;
            mols.set_list_lookup(*ident, *state, index)?;
        }
        log::info!(
            "{} species, {} molecule lists, {} surfaces, {} compartments",
            nspecies - 1,
            mols.nlists(),
            self.surfaces.len(),
            self.compartments.len()
        );
        self.mols = Some(mols);
        self.stage = BuildStage::ListsBuilt;
        Ok(())
    }

    fn difc_of(&self, r: &Reactant) -> f64 {
        self.species.props(r.ident, solution_state(r.state)).difc
    }

    /// Convert rates to binding radii and probabilities; build lookup tables.
    pub fn compute_params(&mut self) -> SimResult<()> {
        self.expect_stage(BuildStage::ListsBuilt, "computing parameters")?;
        let dt = self.config.dt;
        let dim = self.config.dim;
        let nspecies = self.species.len();
        self.species.compute_steps(dt);

        // second order first: unbinding radii of first-order reactions refer to them
        for i in 0..self.rxnss[2].rxn.len() {
            let (d0, d1) = {
                let r = &self.rxnss[2].rxn[i];
                (self.difc_of(&r.rct[0]), self.difc_of(&r.rct[1]))
            };
            let r = &mut self.rxnss[2].rxn[i];
            let difc_sum = d0 + d1;
            let a = match (r.bindrad_fixed, r.rate) {
                (Some(a), _) => a,
                (None, Some(_)) => {
                    let mut k = r.effective_rate();
                    if r.rct[0] == r.rct[1] {
                        k *= 2.0;
                    }
                    rates::binding_radius(k, difc_sum, dt, dim)?
                }
                (None, None) => {
                    return Err(SimError::config(format!(
                        "reaction '{}' needs a rate or a binding radius",
                        r.name
                    )))
                }
            };
            r.bindrad2 = a * a;
            r.prob = r.prob_fixed.unwrap_or(1.0);
            r.chi = rates::diffusion_limited_fraction(r.effective_rate(), difc_sum, a);
            r.tau = rates::diffusion_time(difc_sum, a);
            r.unbindrad = match r.rparamt {
                RevParam::UnbindRad | RevParam::Bounce => r.rparam,
                RevParam::Ratio => r.rparam * a,
                _ => 0.0,
            };
            log::debug!("reaction '{}': binding radius {:.6e}, chi {:.4}", r.name, a, r.chi);
        }

        let mut overflowed = Vec::new();
        for i in 0..self.rxnss[1].rxn.len() {
            let r = &self.rxnss[1].rxn[i];
            if r.rate.is_none() && r.prob_fixed.is_none() {
                return Err(SimError::config(format!("reaction '{}' needs a rate or a probability", r.name)));
            }
            let unbindrad = match r.rparamt {
                RevParam::UnbindRad | RevParam::Bounce => r.rparam,
                RevParam::Ratio => r.rparam * self.reverse_bindrad(r)?,
                _ => 0.0,
            };
            let k = r.effective_rate();
            // total rate competing for the same reactant
            let total: f64 = self.rxnss[1]
                .rxn
                .iter()
                .filter(|o| !o.disable && o.rct[0].ident == r.rct[0].ident)
                .filter(|o| r.rct[0].state.expand().iter().any(|s| o.rct[0].state.expand().contains(s)))
                .map(|o| o.effective_rate())
                .sum();
            if total * dt > 1.0 {
                overflowed.push(i);
            }
            let r = &mut self.rxnss[1].rxn[i];
            r.unbindrad = unbindrad;
            r.prob = r.prob_fixed.unwrap_or(1.0 - (-k * dt).exp());
        }
        for i in overflowed {
            let r = &mut self.rxnss[1].rxn[i];
            self.warnings.probability_overflow += 1;
            if !r.overflow_warned {
                r.overflow_warned = true;
                log::warn!("reaction '{}': rate times dt exceeds 1, consider a shorter timestep", r.name);
            }
        }

        for r in self.rxnss[0].rxn.iter_mut() {
            let Some(rate) = r.rate else {
                return Err(SimError::config(format!("reaction '{}' needs a rate", r.name)));
            };
            r.prob = rate * r.multiplicity as f64 * dt;
        }

        for set in self.rxnss.iter_mut() {
            set.build_table(nspecies, dt);
        }

        let species = &self.species;
        for s in self.surfaces.iter_mut() {
            let overflows = s.compute_probabilities(dt, |sp| species.props(sp, MolecState::Soln).difc);
            if overflows > 0 {
                self.warnings.probability_overflow += overflows as u64;
                log::warn!("surface '{}': {} rate tables exceed probability 1 per step", s.name, overflows);
            }
        }
        self.stage = BuildStage::ParamsComputed;
        Ok(())
    }

    /// Binding radius of the second-order reaction that recombines the
    /// products of first-order reaction `r`.
    fn reverse_bindrad(&self, r: &Reaction) -> SimResult<f64> {
        if r.prd.len() == 2 {
            let (p0, p1) = (r.prd[0].ident, r.prd[1].ident);
            let reverse = self.rxnss[2].rxn.iter().find(|o| {
                let (a, b) = (o.rct[0].ident, o.rct[1].ident);
                (a == p0 && b == p1) || (a == p1 && b == p0)
            });
            if let Some(o) = reverse {
                return Ok(o.bindrad());
            }
        }
        Err(SimError::config(format!(
            "reaction '{}' uses a ratio unbinding radius but has no reverse reaction",
            r.name
        )))
    }

    /// Lay out boxes, place initial molecules and hand out the simulation.
    pub fn finish(&mut self) -> SimResult<Simulation> {
        self.expect_stage(BuildStage::ParamsComputed, "finishing")?;
        let walls = self.walls.take().ok_or_else(|| SimError::config("system boundaries were not set"))?;
        let mols = self.mols.take().ok_or_else(|| SimError::config("molecule lists were not built"))?;
        let dim = self.config.dim;
        let max_reach = self.rxnss[2].rxn.iter().map(|r| r.bindrad()).fold(0.0, f64::max);
        let nmol: usize = self.requests.iter().map(|r| r.count).sum::<usize>()
            + self
                .surfaces
                .iter()
                .flat_map(|s| s.emitters.iter())
                .map(|e| e.count)
                .sum::<usize>();
        let sizing = match self.config.boxsize {
            Some(w) => BoxSizing::Width(w),
            None => BoxSizing::MolsPerBox { mpbox: self.config.mols_per_box, nmol },
        };
        let mut periodic = [false; 3];
        for (d, p) in periodic.iter_mut().enumerate().take(dim) {
            *p = walls.is_periodic(d);
        }
        let mut boxes = BoxGrid::new(&BoxGridParams {
            dim,
            low: walls.low(),
            high: walls.high(),
            periodic,
            sizing,
            accuracy: self.config.accuracy,
            max_reach,
            nlists: mols.nlists(),
        })?;
        boxes.rebuild_panels(&self.surfaces);

        let diffusion = DiffusionStepper::new(
            &self.species,
            self.config.dt,
            dim,
            self.config.gauss_table_size,
            self.config.gauss_refresh_interval,
            &mut self.rng,
        );
        let rxnss = std::mem::replace(
            &mut self.rxnss,
            [ReactionSet::new(0), ReactionSet::new(1), ReactionSet::new(2)],
        );
        let mut sim = Simulation::assemble(
            self.config.clone(),
            std::mem::take(&mut self.species),
            mols,
            walls,
            std::mem::take(&mut self.surfaces),
            boxes,
            std::mem::take(&mut self.compartments),
            rxnss,
            diffusion,
            std::mem::take(&mut self.ports),
            std::mem::take(&mut self.warnings),
            self.rng.clone(),
        );
        for c in 0..sim.compartments.len() {
            sim.ensure_compartment(c);
        }
        for req in std::mem::take(&mut self.requests) {
            sim.add_molecules(req.ident, req.state, req.count, &req.placement)?;
        }
        for s in 0..sim.surfaces.len() {
            let emitters = sim.surfaces[s].emitters.clone();
            for e in emitters {
                sim.emit_on_surface(s, e.species, e.state, e.face, e.count)?;
            }
        }
        self.stage = BuildStage::Ready;
        log::info!(
            "simulation ready: {} molecules, {} boxes, dt {}",
            sim.mols.total_live(),
            sim.boxes.nbox(),
            sim.dt()
        );
        Ok(sim)
    }

    /// Run every remaining stage.
    pub fn build(mut self) -> SimResult<Simulation> {
        if self.stage == BuildStage::Uninit {
            self.build_lists()?;
        }
        if self.stage == BuildStage::ListsBuilt {
            self.compute_params()?;
        }
        self.finish()
    }
}

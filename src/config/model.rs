// config/model.rs
// Declarative model description loaded from TOML and turned into a SimBuilder

use super::SimConfig;
use crate::compartment::{CmptLogic, Compartment};
use crate::error::{SimError, SimResult};
use crate::molecule::{MolListType, MolecState};
use crate::reaction::{Product, Reactant, Reaction, RevParam, SernoRule};
use crate::simulation::{Placement, SimBuilder, Simulation};
use crate::species::parse_color;
use crate::surface::{Emitter, Face, PanelGeometry, RateSource, SurfaceAction};
use crate::utils::from_array;
use crate::walls::WallType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub sim: SimConfig,
    pub boundaries: BoundariesConfig,
    #[serde(default)]
    pub species: Vec<SpeciesConfig>,
    #[serde(default)]
    pub surfaces: Vec<SurfaceConfig>,
    #[serde(default)]
    pub ports: Vec<PortConfig>,
    #[serde(default)]
    pub compartments: Vec<CompartmentConfig>,
    #[serde(default)]
    pub reactions: Vec<ReactionConfig>,
    #[serde(default)]
    pub lists: Vec<ListConfig>,
    #[serde(default)]
    pub molecules: Vec<MoleculesConfig>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BoundariesConfig {
    pub low: [f64; 3],
    pub high: [f64; 3],
    /// One entry for every axis, or one per axis. An entry is a wall type
    /// ("reflect") or a low/high pair ("absorb/reflect").
    #[serde(default = "default_walls")]
    pub walls: Vec<String>,
}

fn default_walls() -> Vec<String> {
    vec!["reflect".to_string()]
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SpeciesConfig {
    pub name: String,
    #[serde(default)]
    pub difc: f64,
    /// Per-state overrides of `difc`, keyed by state name.
    #[serde(default)]
    pub difc_states: Vec<(String, f64)>,
    pub difm: Option<[[f64; 3]; 3]>,
    pub drift: Option<[f64; 3]>,
    /// Drift of bound molecules per surface: (surface, state, drift).
    #[serde(default)]
    pub surface_drift: Vec<(String, String, [f64; 3])>,
    pub color: Option<String>,
    pub display_size: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PanelConfig {
    pub name: String,
    #[serde(flatten)]
    pub geometry: GeometryConfig,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum GeometryConfig {
    Rect {
        corner: [f64; 3],
        edge1: [f64; 3],
        edge2: [f64; 3],
        #[serde(default = "positive")]
        front_sign: f64,
    },
    Tri {
        points: [[f64; 3]; 3],
    },
    Sph {
        center: [f64; 3],
        radius: f64,
        #[serde(default = "yes")]
        outward: bool,
    },
    Cyl {
        start: [f64; 3],
        end: [f64; 3],
        radius: f64,
        #[serde(default = "yes")]
        outward: bool,
    },
    Hemi {
        center: [f64; 3],
        radius: f64,
        axis: [f64; 3],
        #[serde(default = "yes")]
        outward: bool,
    },
    Disk {
        center: [f64; 3],
        radius: f64,
        normal: [f64; 3],
    },
}

fn positive() -> f64 {
    1.0
}

fn yes() -> bool {
    true
}

impl GeometryConfig {
    pub fn to_geometry(&self) -> PanelGeometry {
        match *self {
            GeometryConfig::Rect { corner, edge1, edge2, front_sign } => PanelGeometry::Rect {
                corner: from_array(corner),
                edge1: from_array(edge1),
                edge2: from_array(edge2),
                front_sign,
            },
            GeometryConfig::Tri { points } => PanelGeometry::Tri { points: points.map(from_array) },
            GeometryConfig::Sph { center, radius, outward } => {
                PanelGeometry::Sph { center: from_array(center), radius, outward }
            }
            GeometryConfig::Cyl { start, end, radius, outward } => {
                PanelGeometry::Cyl { start: from_array(start), end: from_array(end), radius, outward }
            }
            GeometryConfig::Hemi { center, radius, axis, outward } => {
                PanelGeometry::Hemi { center: from_array(center), radius, axis: from_array(axis), outward }
            }
            GeometryConfig::Disk { center, radius, normal } => {
                PanelGeometry::Disk { center: from_array(center), radius, normal: from_array(normal) }
            }
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ActionConfig {
    /// Species name, or "all".
    pub species: String,
    #[serde(default = "soln")]
    pub state: String,
    #[serde(default = "both")]
    pub faces: String,
    pub action: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RateConfig {
    pub species: String,
    /// "soln:<faces>" for collisions from solution, or a bound state.
    pub from: String,
    pub to: String,
    pub rate: f64,
    pub new_species: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EmitterConfig {
    pub species: String,
    #[serde(default = "soln")]
    pub state: String,
    #[serde(default = "front")]
    pub face: String,
    pub count: usize,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct JumpConfig {
    pub panel: String,
    pub face: String,
    pub to: String,
    pub to_face: String,
}

fn soln() -> String {
    "soln".to_string()
}

fn both() -> String {
    "both".to_string()
}

fn front() -> String {
    "front".to_string()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SurfaceConfig {
    pub name: String,
    #[serde(default)]
    pub panels: Vec<PanelConfig>,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
    #[serde(default)]
    pub rates: Vec<RateConfig>,
    #[serde(default)]
    pub emitters: Vec<EmitterConfig>,
    #[serde(default)]
    pub jumps: Vec<JumpConfig>,
    /// Panel name followed by its neighbors.
    #[serde(default)]
    pub neighbors: Vec<Vec<String>>,
    #[serde(default)]
    pub neighbor_hop: bool,
    #[serde(default)]
    pub log_absorb: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PortConfig {
    pub name: String,
    pub surface: String,
    #[serde(default = "front")]
    pub face: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CompartmentConfig {
    pub name: String,
    #[serde(default)]
    pub surfaces: Vec<String>,
    #[serde(default)]
    pub points: Vec<[f64; 3]>,
    /// (logic, earlier compartment) terms applied in order.
    #[serde(default)]
    pub logic: Vec<(String, String)>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReactionConfig {
    pub name: String,
    /// "A" or "A(front)".
    #[serde(default)]
    pub reactants: Vec<String>,
    #[serde(default)]
    pub products: Vec<String>,
    pub rate: Option<f64>,
    pub multiplicity: Option<u32>,
    pub bindrad: Option<f64>,
    pub prob: Option<f64>,
    pub placement: Option<String>,
    #[serde(default)]
    pub rparam: f64,
    /// Offsets or absolute positions per product, for offset/fixed placement.
    #[serde(default)]
    pub product_positions: Vec<[f64; 3]>,
    /// Per product: "new", "r1" or "r2".
    #[serde(default)]
    pub product_serno: Vec<String>,
    pub compartment: Option<String>,
    pub surface: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ListConfig {
    pub name: String,
    #[serde(default = "system")]
    pub kind: String,
    /// "A" or "A(front)"; a bare species routes every state.
    #[serde(default)]
    pub members: Vec<String>,
}

fn system() -> String {
    "system".to_string()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MoleculesConfig {
    pub species: String,
    #[serde(default = "soln")]
    pub state: String,
    pub count: usize,
    pub point: Option<[f64; 3]>,
    pub low: Option<[f64; 3]>,
    pub high: Option<[f64; 3]>,
    pub compartment: Option<String>,
    pub surface: Option<String>,
    pub face: Option<String>,
}

/// Split "A(front)" into species name and state; a bare name is `default`.
fn parse_species_state(s: &str, default: MolecState) -> SimResult<(&str, MolecState)> {
    let s = s.trim();
    match s.split_once('(') {
        Some((name, rest)) => {
            let state = rest
                .strip_suffix(')')
                .ok_or_else(|| SimError::config(format!("unbalanced parenthesis in '{s}'")))?;
            Ok((name.trim(), MolecState::parse(state)?))
        }
        None => Ok((s, default)),
    }
}

fn single_face(s: &str) -> SimResult<Face> {
    match Face::parse_many(s)? {
        [face] => Ok(*face),
        _ => Err(SimError::config(format!("expected a single face, got '{s}'"))),
    }
}

fn wall_pair(s: &str) -> SimResult<[WallType; 2]> {
    match s.split_once('/') {
        Some((lo, hi)) => Ok([WallType::parse(lo)?, WallType::parse(hi)?]),
        None => {
            let w = WallType::parse(s)?;
            Ok([w, w])
        }
    }
}

impl ModelConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> SimResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Translate the model into builder calls, leaving the builder at `Uninit`.
    pub fn builder(&self) -> SimResult<SimBuilder> {
        let mut b = SimBuilder::new(self.sim.clone())?;
        self.add_boundaries(&mut b)?;
        for sp in &self.species {
            b.add_species(&sp.name)?;
        }
        for s in &self.surfaces {
            self.add_surface(&mut b, s)?;
        }
        for sp in &self.species {
            self.configure_species(&mut b, sp)?;
        }
        for p in &self.ports {
            let s = b.surface_index(&p.surface)?;
            b.add_port(&p.name, s, single_face(&p.face)?)?;
        }
        for c in &self.compartments {
            let cmpt = self.compartment(&b, c)?;
            b.add_compartment(cmpt)?;
        }
        for r in &self.reactions {
            let rxn = self.reaction(&b, r)?;
            b.add_reaction(rxn)?;
        }
        for l in &self.lists {
            let kind = match l.kind.to_ascii_lowercase().as_str() {
                "system" => MolListType::System,
                "port" => MolListType::Port,
                other => return Err(SimError::unknown("list kind", other)),
            };
            b.add_list(&l.name, kind)?;
            for m in &l.members {
                let (name, state) = parse_species_state(m, MolecState::All)?;
                let ident = b.species().index(name)?;
                b.assign_list(ident, state, &l.name)?;
            }
        }
        for m in &self.molecules {
            let (ident, state, placement) = self.molecules(&b, m)?;
            b.add_molecules(ident, state, m.count, placement)?;
        }
        Ok(b)
    }

    pub fn build(&self) -> SimResult<Simulation> {
        self.builder()?.build()
    }

    fn add_boundaries(&self, b: &mut SimBuilder) -> SimResult<()> {
        let bc = &self.boundaries;
        let mut kind = [[WallType::Reflect; 2]; 3];
        match bc.walls.len() {
            1 => kind = [wall_pair(&bc.walls[0])?; 3],
            n if n == self.sim.dim => {
                for (k, w) in kind.iter_mut().zip(&bc.walls) {
                    *k = wall_pair(w)?;
                }
            }
            n => {
                return Err(SimError::config(format!(
                    "expected 1 or {} wall entries, got {n}",
                    self.sim.dim
                )))
            }
        }
        b.set_boundaries(from_array(bc.low), from_array(bc.high), kind)
    }

    fn configure_species(&self, b: &mut SimBuilder, sp: &SpeciesConfig) -> SimResult<()> {
        let surfaces: Vec<usize> = sp
            .surface_drift
            .iter()
            .map(|(s, _, _)| b.surface_index(s))
            .collect::<SimResult<_>>()?;
        let table = b.species_mut()?;
        let ident = table.index(&sp.name)?;
        table.set_difc(ident, MolecState::All, sp.difc)?;
        for (state, difc) in &sp.difc_states {
            table.set_difc(ident, MolecState::parse(state)?, *difc)?;
        }
        if let Some(m) = sp.difm {
            table.set_difm(ident, MolecState::All, m)?;
        }
        if let Some(d) = sp.drift {
            table.set_drift(ident, MolecState::All, from_array(d))?;
        }
        for (&surface, (_, state, d)) in surfaces.iter().zip(&sp.surface_drift) {
            table.set_surface_drift(ident, MolecState::parse(state)?, surface, from_array(*d))?;
        }
        if let Some(c) = &sp.color {
            table.set_color(ident, MolecState::All, parse_color(c)?)?;
        }
        if let Some(size) = sp.display_size {
            table.set_display_size(ident, MolecState::All, size)?;
        }
        Ok(())
    }

    fn species_list(&self, b: &SimBuilder, name: &str) -> SimResult<Vec<usize>> {
        if name == "all" {
            Ok((1..b.species().len()).collect())
        } else {
            Ok(vec![b.species().index(name)?])
        }
    }

    fn add_surface(&self, b: &mut SimBuilder, sc: &SurfaceConfig) -> SimResult<()> {
        let s = b.add_surface(&sc.name)?;
        for p in &sc.panels {
            b.add_panel(s, &p.name, p.geometry.to_geometry())?;
        }
        for j in &sc.jumps {
            let (from, to) = {
                let surface = b.surface_mut(s)?;
                (surface.panel_index(&j.panel)?, surface.panel_index(&j.to)?)
            };
            b.set_jump(s, from, single_face(&j.face)?, to, single_face(&j.to_face)?)?;
        }
        for names in &sc.neighbors {
            let Some((panel, rest)) = names.split_first() else { continue };
            let (panel, rest) = {
                let surface = b.surface_mut(s)?;
                let rest = rest.iter().map(|n| surface.panel_index(n)).collect::<SimResult<Vec<_>>>()?;
                (surface.panel_index(panel)?, rest)
            };
            b.set_neighbors(s, panel, &rest)?;
        }

        for a in &sc.actions {
            let idents = self.species_list(b, &a.species)?;
            let state = MolecState::parse(&a.state)?;
            let faces = Face::parse_many(&a.faces)?;
            let action = SurfaceAction::parse(&a.action)?;
            let surface = b.surface_mut(s)?;
            for ident in idents {
                for &ms in state.expand() {
                    surface.set_action(ident, ms, faces, action)?;
                }
            }
        }
        for r in &sc.rates {
            let idents = self.species_list(b, &r.species)?;
            let to = MolecState::parse(&r.to)?;
            let new_species = r.new_species.as_deref().map(|n| b.species().index(n)).transpose()?;
            let sources: Vec<RateSource> = match r.from.strip_prefix("soln:") {
                Some(faces) => Face::parse_many(faces)?.iter().map(|&f| RateSource::Solution(f)).collect(),
                None => vec![RateSource::Bound(MolecState::parse(&r.from)?)],
            };
            let surface = b.surface_mut(s)?;
            for ident in idents {
                for &source in &sources {
                    surface.set_rate(ident, source, to, r.rate, new_species)?;
                }
            }
        }
        let emitters = sc
            .emitters
            .iter()
            .map(|e| {
                Ok(Emitter {
                    species: b.species().index(&e.species)?,
                    state: MolecState::parse(&e.state)?,
                    face: single_face(&e.face)?,
                    count: e.count,
                })
            })
            .collect::<SimResult<Vec<_>>>()?;
        let surface = b.surface_mut(s)?;
        surface.emitters.extend(emitters);
        surface.neighbor_hop = sc.neighbor_hop;
        surface.log_absorb = sc.log_absorb;
        Ok(())
    }

    fn compartment(&self, b: &SimBuilder, c: &CompartmentConfig) -> SimResult<Compartment> {
        let mut cmpt = Compartment::new(&c.name);
        for s in &c.surfaces {
            cmpt.surfaces.push(b.surface_index(s)?);
        }
        cmpt.points.extend(c.points.iter().map(|&p| from_array(p)));
        for (logic, other) in &c.logic {
            cmpt.logic.push((CmptLogic::parse(logic)?, b.compartment_index(other)?));
        }
        Ok(cmpt)
    }

    fn reaction(&self, b: &SimBuilder, r: &ReactionConfig) -> SimResult<Reaction> {
        let rct = r
            .reactants
            .iter()
            .map(|s| {
                let (name, state) = parse_species_state(s, MolecState::Soln)?;
                Ok(Reactant { ident: b.species().index(name)?, state })
            })
            .collect::<SimResult<Vec<_>>>()?;
        let mut prd = r
            .products
            .iter()
            .map(|s| {
                let (name, state) = parse_species_state(s, MolecState::Soln)?;
                Ok(Product::new(b.species().index(name)?, state))
            })
            .collect::<SimResult<Vec<_>>>()?;
        if !r.product_positions.is_empty() && r.product_positions.len() != prd.len() {
            return Err(SimError::config(format!("reaction '{}': one position per product", r.name)));
        }
        for (p, &pos) in prd.iter_mut().zip(&r.product_positions) {
            p.position = Some(from_array(pos));
        }
        for (p, rule) in prd.iter_mut().zip(&r.product_serno) {
            p.serno = match rule.as_str() {
                "new" => SernoRule::New,
                "r1" => SernoRule::Reactant(0),
                "r2" => SernoRule::Reactant(1),
                other => return Err(SimError::unknown("serial number rule", other)),
            };
        }

        let mut rxn = Reaction::new(&r.name, &rct, &prd)?;
        rxn.rate = r.rate;
        rxn.multiplicity = r.multiplicity.unwrap_or(1);
        rxn.bindrad_fixed = r.bindrad;
        rxn.prob_fixed = r.prob;
        rxn.rparamt = r.placement.as_deref().map(RevParam::parse).transpose()?.unwrap_or_default();
        rxn.rparam = r.rparam;
        rxn.cmpt = r.compartment.as_deref().map(|c| b.compartment_index(c)).transpose()?;
        rxn.srf = r.surface.as_deref().map(|s| b.surface_index(s)).transpose()?;
        rxn.disable = r.disabled;
        Ok(rxn)
    }

    fn molecules(&self, b: &SimBuilder, m: &MoleculesConfig) -> SimResult<(usize, MolecState, Placement)> {
        let ident = b.species().index(&m.species)?;
        let state = MolecState::parse(&m.state)?;
        let given = [
            m.point.is_some(),
            m.low.is_some() || m.high.is_some(),
            m.compartment.is_some(),
            m.surface.is_some(),
        ];
        if given.iter().filter(|&&g| g).count() > 1 {
            return Err(SimError::config(format!("molecules of '{}' name more than one placement", m.species)));
        }
        let placement = if let Some(p) = m.point {
            Placement::Point(from_array(p))
        } else if m.low.is_some() || m.high.is_some() {
            let (Some(low), Some(high)) = (m.low, m.high) else {
                return Err(SimError::config("region placement needs both low and high"));
            };
            Placement::Region { low: from_array(low), high: from_array(high) }
        } else if let Some(c) = &m.compartment {
            Placement::Compartment(b.compartment_index(c)?)
        } else if let Some(s) = &m.surface {
            let face = m.face.as_deref().map(single_face).transpose()?.unwrap_or(Face::Front);
            Placement::Surface { surface: b.surface_index(s)?, face }
        } else {
            Placement::Uniform
        };
        Ok((ident, state, placement))
    }
}

#[cfg(test)]
#[path = "tests/model.rs"]
mod tests;

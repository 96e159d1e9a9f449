// diffusion.rs
// Gaussian random-walk stepping for free and surface-bound molecules

use crate::molecule::{MolecState, Molecule};
use crate::species::SpeciesTable;
use crate::surface::Surface;
use crate::utils::{component_mut, Vec3};
use rand::Rng;
use rand_distr::StandardNormal;

/// Precomputed standard normal deviates with exact zero mean and unit variance.
pub struct GaussTable {
    values: Vec<f64>,
}

impl GaussTable {
    pub fn new<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Self {
        let mut t = Self { values: vec![0.0; size.max(2)] };
        t.refresh(rng);
        t
    }

    pub fn refresh<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for v in self.values.iter_mut() {
            *v = rng.sample(StandardNormal);
        }
        let n = self.values.len() as f64;
        let mean = self.values.iter().sum::<f64>() / n;
        let var = self.values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let scale = if var > 0.0 { 1.0 / var.sqrt() } else { 1.0 };
        for v in self.values.iter_mut() {
            *v = (*v - mean) * scale;
        }
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.values[rng.random_range(0..self.values.len())]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Displacement rule for one (species, state), resolved when parameters are computed.
#[derive(Clone, Debug, PartialEq)]
pub enum Diffuser {
    Still,
    Isotropic { step: f64 },
    /// `matrix * g * scale` with `scale = sqrt(2 dt)`.
    Anisotropic { matrix: [[f64; 3]; 3], scale: f64 },
}

#[derive(Clone, Debug)]
pub struct MotionRule {
    pub diffuser: Diffuser,
    /// Drift already multiplied by dt.
    pub drift: Option<Vec3>,
    pub surfdrift: Vec<(usize, Vec3)>,
}

impl MotionRule {
    pub fn still() -> Self {
        Self { diffuser: Diffuser::Still, drift: None, surfdrift: Vec::new() }
    }

    pub fn is_still(&self) -> bool {
        self.diffuser == Diffuser::Still && self.drift.is_none() && self.surfdrift.is_empty()
    }

    fn displacement<R: Rng + ?Sized>(&self, dim: usize, table: &GaussTable, rng: &mut R) -> Vec3 {
        let mut v = Vec3::zero();
        match &self.diffuser {
            Diffuser::Still => {}
            Diffuser::Isotropic { step } => {
                for d in 0..dim {
                    *component_mut(&mut v, d) = step * table.draw(rng);
                }
            }
            Diffuser::Anisotropic { matrix, scale } => {
                let mut g = [0.0; 3];
                for gd in g.iter_mut().take(dim) {
                    *gd = table.draw(rng);
                }
                for d in 0..dim {
                    let row = &matrix[d];
                    *component_mut(&mut v, d) = scale * (0..dim).map(|k| row[k] * g[k]).sum::<f64>();
                }
            }
        }
        if let Some(drift) = self.drift {
            v += crate::utils::truncate(drift, dim);
        }
        v
    }
}

pub struct DiffusionStepper {
    table: GaussTable,
    rules: Vec<[MotionRule; MolecState::COUNT]>,
    dim: usize,
    refresh_interval: u64,
    steps_since_refresh: u64,
}

impl DiffusionStepper {
    pub fn new<R: Rng + ?Sized>(
        species: &SpeciesTable,
        dt: f64,
        dim: usize,
        table_size: usize,
        refresh_interval: u64,
        rng: &mut R,
    ) -> Self {
        let rules = (0..species.len())
            .map(|ident| {
                std::array::from_fn(|si| {
                    if ident == 0 {
                        return MotionRule::still();
                    }
                    let p = species.props(ident, MolecState::REAL[si]);
                    let diffuser = match p.difm {
                        Some(matrix) => Diffuser::Anisotropic { matrix, scale: (2.0 * dt).sqrt() },
                        None if p.difc > 0.0 => Diffuser::Isotropic { step: (2.0 * p.difc * dt).sqrt() },
                        None => Diffuser::Still,
                    };
                    MotionRule {
                        diffuser,
                        drift: p.drift.map(|v| v * dt),
                        surfdrift: p.surfdrift.iter().map(|&(s, v)| (s, v * dt)).collect(),
                    }
                })
            })
            .collect();
        Self {
            table: GaussTable::new(table_size, rng),
            rules,
            dim,
            refresh_interval,
            steps_since_refresh: 0,
        }
    }

    pub fn rule(&self, ident: usize, state: MolecState) -> &MotionRule {
        &self.rules[ident][state.index()]
    }

    /// Called once per timestep; regenerates the Gaussian table periodically.
    pub fn tick<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.steps_since_refresh += 1;
        if self.refresh_interval > 0 && self.steps_since_refresh >= self.refresh_interval {
            self.table.refresh(rng);
            self.steps_since_refresh = 0;
        }
    }

    /// Move a free molecule; `posx` keeps the starting point.
    pub fn step<R: Rng + ?Sized>(&self, m: &mut Molecule, rng: &mut R) {
        m.posx = m.pos;
        let rule = &self.rules[m.ident][m.mstate.index()];
        if matches!(rule.diffuser, Diffuser::Still) && rule.drift.is_none() {
            return;
        }
        m.pos += rule.displacement(self.dim, &self.table, rng);
    }

    /// Move a bound molecule along its panel. Returns true if it moved.
    pub fn step_bound<R: Rng + ?Sized>(&self, m: &mut Molecule, surfaces: &[Surface], rng: &mut R) -> bool {
        m.posx = m.pos;
        let Some(pref) = m.pnl else {
            return false;
        };
        let rule = &self.rules[m.ident][m.mstate.index()];
        if rule.is_still() {
            return false;
        }
        let surface = &surfaces[pref.surface];
        let panel = &surface.panels[pref.panel];
        let n = panel.normal_at(m.pos);
        let mut d = rule.displacement(3, &self.table, rng);
        if let Some(&(_, sd)) = rule.surfdrift.iter().find(|(s, _)| *s == pref.surface) {
            d += sd;
        }
        d -= n * d.dot(n);
        let target = m.pos + d;

        let projected = panel.project(target);
        if panel.contains_projected(projected) {
            m.pos = projected;
            return true;
        }
        if surface.neighbor_hop {
            let hop = panel
                .neighbors
                .iter()
                .map(|&nb| (nb, surface.panels[nb].project(target)))
                .filter(|(nb, p)| surface.panels[*nb].contains_projected(*p))
                .min_by(|a, b| {
                    let da = (a.1 - target).mag_sq();
                    let db = (b.1 - target).mag_sq();
                    da.total_cmp(&db)
                });
            if let Some((nb, p)) = hop {
                m.pos = p;
                m.pnl = Some(crate::molecule::PanelRef { surface: pref.surface, panel: nb });
                return true;
            }
        }
        // stays at the edge: keep the old position
        false
    }
}

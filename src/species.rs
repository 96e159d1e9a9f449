// species.rs
// Per-species, per-state transport and display properties

use crate::error::{SimError, SimResult};
use crate::molecule::MolecState;
use crate::utils::Vec3;
use palette::Srgb;

#[derive(Clone, Debug)]
pub struct SpeciesProps {
    pub difc: f64,
    /// rms step length per axis, `sqrt(2 * difc * dt)`; set when parameters are computed.
    pub difstep: f64,
    /// Anisotropic diffusion matrix; displacement is `difm * g * sqrt(2 dt)`.
    pub difm: Option<[[f64; 3]; 3]>,
    pub drift: Option<Vec3>,
    /// Drift of bound molecules, keyed by surface index.
    pub surfdrift: Vec<(usize, Vec3)>,
    pub display_size: f64,
    pub color: Srgb<f32>,
}

impl Default for SpeciesProps {
    fn default() -> Self {
        Self {
            difc: 0.0,
            difstep: 0.0,
            difm: None,
            drift: None,
            surfdrift: Vec::new(),
            display_size: 1.0,
            color: Srgb::new(0.0, 0.0, 0.0),
        }
    }
}

/// Species 0 is the reserved empty species.
pub struct SpeciesTable {
    names: Vec<String>,
    props: Vec<[SpeciesProps; MolecState::COUNT]>,
}

impl Default for SpeciesTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeciesTable {
    pub fn new() -> Self {
        Self {
            names: vec!["empty".to_string()],
            props: vec![Default::default()],
        }
    }

    pub fn add(&mut self, name: &str) -> SimResult<usize> {
        let valid = !name.is_empty()
            && name.chars().all(|c| c.is_alphanumeric() || c == '_')
            && name != "empty"
            && name != "all";
        if !valid {
            return Err(SimError::config(format!("invalid species name '{name}'")));
        }
        if self.names.iter().any(|n| n == name) {
            return Err(SimError::config(format!("duplicate species '{name}'")));
        }
        self.names.push(name.to_string());
        self.props.push(Default::default());
        Ok(self.names.len() - 1)
    }

    pub fn index(&self, name: &str) -> SimResult<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .filter(|&i| i != 0)
            .ok_or_else(|| SimError::unknown("species", name))
    }

    pub fn name(&self, ident: usize) -> &str {
        &self.names[ident]
    }

    /// Number of species including the empty species.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.len() <= 1
    }

    pub fn props(&self, ident: usize, state: MolecState) -> &SpeciesProps {
        &self.props[ident][state.index()]
    }

    fn for_states(
        &mut self,
        ident: usize,
        state: MolecState,
        mut f: impl FnMut(&mut SpeciesProps),
    ) -> SimResult<()> {
        if ident == 0 || ident >= self.props.len() {
            return Err(SimError::config(format!("species index {ident} out of range")));
        }
        if state == MolecState::Bsoln {
            return Err(SimError::config("bsoln is not a molecule state"));
        }
        for ms in state.expand() {
            f(&mut self.props[ident][ms.index()]);
        }
        Ok(())
    }

    pub fn set_difc(&mut self, ident: usize, state: MolecState, difc: f64) -> SimResult<()> {
        if !(difc >= 0.0) {
            return Err(SimError::config(format!("diffusion coefficient must be non-negative, got {difc}")));
        }
        self.for_states(ident, state, |p| p.difc = difc)
    }

    pub fn set_difm(&mut self, ident: usize, state: MolecState, m: [[f64; 3]; 3]) -> SimResult<()> {
        self.for_states(ident, state, |p| {
            p.difm = Some(m);
            // isotropic-equivalent coefficient from the trace of M M^T / dim
            let mut tr = 0.0;
            for row in &m {
                for v in row {
                    tr += v * v;
                }
            }
            p.difc = tr / 3.0;
        })
    }

    pub fn set_drift(&mut self, ident: usize, state: MolecState, drift: Vec3) -> SimResult<()> {
        self.for_states(ident, state, |p| p.drift = Some(drift))
    }

    pub fn set_surface_drift(
        &mut self,
        ident: usize,
        state: MolecState,
        surface: usize,
        drift: Vec3,
    ) -> SimResult<()> {
        self.for_states(ident, state, |p| {
            p.surfdrift.retain(|(s, _)| *s != surface);
            p.surfdrift.push((surface, drift));
        })
    }

    pub fn set_display_size(&mut self, ident: usize, state: MolecState, size: f64) -> SimResult<()> {
        self.for_states(ident, state, |p| p.display_size = size)
    }

    pub fn set_color(&mut self, ident: usize, state: MolecState, color: Srgb<f32>) -> SimResult<()> {
        self.for_states(ident, state, |p| p.color = color)
    }

    /// Fill rms step lengths for timestep `dt`.
    pub fn compute_steps(&mut self, dt: f64) {
        for per_state in &mut self.props {
            for p in per_state.iter_mut() {
                p.difstep = (2.0 * p.difc * dt).sqrt();
            }
        }
    }

    pub fn max_difstep(&self) -> f64 {
        self.props
            .iter()
            .skip(1)
            .flat_map(|s| s.iter())
            .map(|p| p.difstep)
            .fold(0.0, f64::max)
    }
}

/// Parse a named color ("red", "steelblue") or a hex triple ("#ff8800").
pub fn parse_color(s: &str) -> SimResult<Srgb<f32>> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        let bad = || SimError::config(format!("invalid color '{s}'"));
        if hex.len() != 6 {
            return Err(bad());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| bad());
        let c = Srgb::new(channel(0)?, channel(2)?, channel(4)?);
        return Ok(c.into_format());
    }
    palette::named::from_str(&s.to_ascii_lowercase())
        .map(|c| c.into_format())
        .ok_or_else(|| SimError::unknown("color", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_resolve_and_empty_is_reserved() {
        let mut t = SpeciesTable::new();
        let a = t.add("A").unwrap();
        assert_eq!(a, 1);
        assert_eq!(t.index("A").unwrap(), 1);
        assert!(t.index("empty").is_err());
        assert!(t.add("A").is_err());
        assert!(t.add("bad name").is_err());
    }

    #[test]
    fn all_state_sets_every_state() {
        let mut t = SpeciesTable::new();
        let a = t.add("A").unwrap();
        t.set_difc(a, MolecState::All, 2.0).unwrap();
        t.set_difc(a, MolecState::Front, 0.5).unwrap();
        t.compute_steps(0.01);
        assert_eq!(t.props(a, MolecState::Soln).difc, 2.0);
        assert_eq!(t.props(a, MolecState::Front).difc, 0.5);
        assert!((t.props(a, MolecState::Soln).difstep - 0.2).abs() < 1e-12);
    }

    #[test]
    fn colors_parse() {
        let red = parse_color("red").unwrap();
        assert!((red.red - 1.0).abs() < 1e-6 && red.green.abs() < 1e-6);
        let c = parse_color("#0080ff").unwrap();
        assert!((c.blue - 1.0).abs() < 1e-6);
        assert!(parse_color("notacolor").is_err());
    }
}

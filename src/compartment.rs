// compartment.rs
// Regions bounded by surfaces, defined by inside points and boolean logic

use crate::boxes::BoxGrid;
use crate::error::{SimError, SimResult};
use crate::molecule::BoxId;
use crate::surface::Surface;
use crate::utils::{random_in_box, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmptLogic {
    Equal,
    EqualNot,
    And,
    Or,
    Xor,
    AndNot,
    OrNot,
}

impl CmptLogic {
    pub fn parse(s: &str) -> SimResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equal" => Ok(CmptLogic::Equal),
            "equalnot" => Ok(CmptLogic::EqualNot),
            "and" => Ok(CmptLogic::And),
            "or" => Ok(CmptLogic::Or),
            "xor" => Ok(CmptLogic::Xor),
            "andnot" => Ok(CmptLogic::AndNot),
            "ornot" => Ok(CmptLogic::OrNot),
            other => Err(SimError::unknown("compartment logic", other)),
        }
    }

    fn apply(self, inside: bool, other: bool) -> bool {
        match self {
            CmptLogic::Equal => other,
            CmptLogic::EqualNot => !other,
            CmptLogic::And => inside && other,
            CmptLogic::Or => inside || other,
            CmptLogic::Xor => inside ^ other,
            CmptLogic::AndNot => inside && !other,
            CmptLogic::OrNot => inside || !other,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Compartment {
    pub name: String,
    pub surfaces: Vec<usize>,
    pub points: Vec<Vec3>,
    /// Applied in order; each term references an earlier compartment.
    pub logic: Vec<(CmptLogic, usize)>,
    pub volume: f64,
    pub boxes: Vec<BoxId>,
    pub boxfrac: Vec<f64>,
    pub cumboxvol: Vec<f64>,
    pub stale: bool,
}

impl Compartment {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            surfaces: Vec::new(),
            points: Vec::new(),
            logic: Vec::new(),
            volume: 0.0,
            boxes: Vec::new(),
            boxfrac: Vec::new(),
            cumboxvol: Vec::new(),
            stale: true,
        }
    }

    pub fn bounded_by(&self, surface: usize) -> bool {
        self.surfaces.contains(&surface)
    }
}

fn crosses_any(cmpt: &Compartment, surfaces: &[Surface], from: Vec3, to: Vec3) -> bool {
    cmpt.surfaces
        .iter()
        .flat_map(|&s| surfaces[s].panels.iter())
        .any(|panel| panel.crossing(from, to).is_some())
}

/// Whether `pos` lies in compartment `c`.
pub fn point_in_compartment(cmpts: &[Compartment], c: usize, surfaces: &[Surface], pos: Vec3) -> bool {
    let cmpt = &cmpts[c];
    let mut inside = cmpt.points.iter().any(|&ip| !crosses_any(cmpt, surfaces, ip, pos));
    for &(logic, other) in &cmpt.logic {
        let o = point_in_compartment(cmpts, other, surfaces, pos);
        inside = logic.apply(inside, o);
    }
    inside
}

/// Recompute volume and box list of compartment `c` by per-box sampling.
pub fn update_compartment(
    cmpts: &mut [Compartment],
    c: usize,
    surfaces: &[Surface],
    boxes: &BoxGrid,
    samples: usize,
    seed: u64,
) {
    let samples = samples.max(1);
    let boxvol = boxes.box_volume();
    let dim = boxes.dim();
    let view: &[Compartment] = cmpts;
    let fractions: Vec<f64> = (0..boxes.nbox())
        .into_par_iter()
        .map(|b| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed ^ (b as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
            let (lo, hi) = boxes.bounds(b);
            let hits = (0..samples)
                .filter(|_| {
                    let p = random_in_box(&mut rng, lo, hi, dim);
                    point_in_compartment(view, c, surfaces, p)
                })
                .count();
            hits as f64 / samples as f64
        })
        .collect();

    let cmpt = &mut cmpts[c];
    cmpt.boxes.clear();
    cmpt.boxfrac.clear();
    cmpt.cumboxvol.clear();
    let mut acc = 0.0;
    for (b, frac) in fractions.into_iter().enumerate() {
        if frac > 0.0 {
            acc += frac * boxvol;
            cmpt.boxes.push(b);
            cmpt.boxfrac.push(frac);
            cmpt.cumboxvol.push(acc);
        }
    }
    cmpt.volume = acc;
    cmpt.stale = false;
    log::debug!("compartment '{}' volume {:.6} over {} boxes", cmpt.name, acc, cmpt.boxes.len());
}

/// Uniform random point inside compartment `c`.
pub fn random_point_in<R: Rng + ?Sized>(
    cmpts: &[Compartment],
    c: usize,
    surfaces: &[Surface],
    boxes: &BoxGrid,
    rng: &mut R,
) -> SimResult<Vec3> {
    let cmpt = &cmpts[c];
    if cmpt.volume <= 0.0 {
        return Err(SimError::config(format!("compartment '{}' has no volume", cmpt.name)));
    }
    for _ in 0..crate::config::RANDOM_ATTEMPTS {
        let r = rng.random::<f64>() * cmpt.volume;
        let i = cmpt.cumboxvol.partition_point(|&v| v <= r).min(cmpt.boxes.len() - 1);
        let (lo, hi) = boxes.bounds(cmpt.boxes[i]);
        let p = random_in_box(rng, lo, hi, boxes.dim());
        if point_in_compartment(cmpts, c, surfaces, p) {
            return Ok(p);
        }
    }
    Err(SimError::config(format!(
        "could not find a point inside compartment '{}'",
        cmpt.name
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::{BoxGridParams, BoxSizing};
    use crate::surface::{Panel, PanelGeometry};

    fn setup() -> (Vec<Surface>, BoxGrid) {
        let mut s = Surface::new("ball", 2);
        let geom = PanelGeometry::Sph { center: Vec3::new(5.0, 5.0, 5.0), radius: 3.0, outward: true };
        s.add_panel(Panel::new("s", 0, geom).unwrap()).unwrap();
        let boxes = BoxGrid::new(&BoxGridParams {
            dim: 3,
            low: Vec3::zero(),
            high: Vec3::new(10.0, 10.0, 10.0),
            periodic: [false; 3],
            sizing: BoxSizing::Width(1.0),
            accuracy: 10.0,
            max_reach: 0.1,
            nlists: 1,
        })
        .unwrap();
        (vec![s], boxes)
    }

    #[test]
    fn sphere_compartment_volume() {
        let (surfaces, boxes) = setup();
        let mut c = Compartment::new("inside");
        c.surfaces.push(0);
        c.points.push(Vec3::new(5.0, 5.0, 5.0));
        let mut cmpts = vec![c];
        update_compartment(&mut cmpts, 0, &surfaces, &boxes, 256, 1);
        let exact = 4.0 / 3.0 * std::f64::consts::PI * 27.0;
        assert!((cmpts[0].volume - exact).abs() / exact < 0.03, "volume {}", cmpts[0].volume);
        assert!(!cmpts[0].stale);

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..200 {
            let p = random_point_in(&cmpts, 0, &surfaces, &boxes, &mut rng).unwrap();
            assert!((p - Vec3::new(5.0, 5.0, 5.0)).mag() <= 3.0);
        }
    }

    #[test]
    fn logic_terms_combine() {
        let (surfaces, _) = setup();
        let mut inner = Compartment::new("inner");
        inner.surfaces.push(0);
        inner.points.push(Vec3::new(5.0, 5.0, 5.0));
        let mut outer = Compartment::new("outer");
        outer.logic.push((CmptLogic::EqualNot, 0));
        let cmpts = vec![inner, outer];
        let center = Vec3::new(5.0, 5.0, 5.0);
        let corner = Vec3::new(0.5, 0.5, 0.5);
        assert!(point_in_compartment(&cmpts, 0, &surfaces, center));
        assert!(!point_in_compartment(&cmpts, 0, &surfaces, corner));
        assert!(!point_in_compartment(&cmpts, 1, &surfaces, center));
        assert!(point_in_compartment(&cmpts, 1, &surfaces, corner));
    }
}

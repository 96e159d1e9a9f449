// walls.rs
// Domain boundaries: one low and one high wall per axis

use crate::error::{SimError, SimResult};
use crate::molecule::Molecule;
use crate::utils::{component, component_mut, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WallType {
    Reflect,
    Absorb,
    Periodic,
    Transparent,
}

impl WallType {
    pub fn parse(s: &str) -> SimResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "r" | "reflect" => Ok(WallType::Reflect),
            "a" | "absorb" => Ok(WallType::Absorb),
            "p" | "periodic" => Ok(WallType::Periodic),
            "t" | "transparent" => Ok(WallType::Transparent),
            other => Err(SimError::unknown("wall type", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WallOutcome {
    Inside,
    /// Number of wall interactions (reflections or wraps).
    Moved(u32),
    Absorbed,
}

/// First wall plane crossed by a segment, at parameter `t` along it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WallCrossing {
    pub t: f64,
    pub axis: usize,
    pub high: bool,
}

#[derive(Clone, Debug)]
pub struct Walls {
    dim: usize,
    low: Vec3,
    high: Vec3,
    kind: [[WallType; 2]; 3],
}

impl Walls {
    /// `kind[d] = [low wall, high wall]`; periodic must be set on both ends.
    pub fn new(dim: usize, low: Vec3, high: Vec3, kind: [[WallType; 2]; 3]) -> SimResult<Self> {
        for d in 0..dim {
            if !(component(&high, d) > component(&low, d)) {
                return Err(SimError::config(format!("domain has non-positive extent on axis {d}")));
            }
            let periodic = kind[d].map(|k| k == WallType::Periodic);
            if periodic[0] != periodic[1] {
                return Err(SimError::config(format!(
                    "periodic boundaries must be set on both ends of axis {d}"
                )));
            }
        }
        Ok(Self { dim, low, high, kind })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn low(&self) -> Vec3 {
        self.low
    }

    pub fn high(&self) -> Vec3 {
        self.high
    }

    pub fn size(&self, d: usize) -> f64 {
        component(&self.high, d) - component(&self.low, d)
    }

    pub fn kind(&self, d: usize, high: bool) -> WallType {
        self.kind[d][high as usize]
    }

    pub fn is_periodic(&self, d: usize) -> bool {
        d < self.dim && self.kind[d][0] == WallType::Periodic
    }

    /// Length, area or volume of the domain.
    pub fn volume(&self) -> f64 {
        (0..self.dim).map(|d| self.size(d)).product()
    }

    pub fn contains(&self, pos: Vec3) -> bool {
        (0..self.dim).all(|d| {
            let x = component(&pos, d);
            x >= component(&self.low, d) && x <= component(&self.high, d)
        })
    }

    /// Apply the wall policy to a molecule that has just moved.
    pub fn check(&self, m: &mut Molecule) -> WallOutcome {
        let mut hits = 0u32;
        for d in 0..self.dim {
            let lo = component(&self.low, d);
            let hi = component(&self.high, d);
            let len = hi - lo;
            loop {
                let x = component(&m.pos, d);
                let high = if x < lo {
                    false
                } else if x > hi {
                    true
                } else {
                    break;
                };
                match self.kind[d][high as usize] {
                    WallType::Transparent => break,
                    WallType::Absorb => return WallOutcome::Absorbed,
                    WallType::Reflect => {
                        let wall = if high { hi } else { lo };
                        *component_mut(&mut m.pos, d) = 2.0 * wall - x;
                    }
                    WallType::Periodic => {
                        let shift = if high { -len } else { len };
                        *component_mut(&mut m.pos, d) += shift;
                        *component_mut(&mut m.posx, d) += shift;
                        *component_mut(&mut m.posoffset, d) += shift;
                    }
                }
                hits += 1;
            }
        }
        if hits == 0 {
            WallOutcome::Inside
        } else {
            WallOutcome::Moved(hits)
        }
    }

    /// Nearest non-transparent wall crossed going from `p0` to `p1`.
    pub fn crossing(&self, p0: Vec3, p1: Vec3) -> Option<WallCrossing> {
        let mut best: Option<WallCrossing> = None;
        for d in 0..self.dim {
            let (x0, x1) = (component(&p0, d), component(&p1, d));
            let (lo, hi) = (component(&self.low, d), component(&self.high, d));
            let (wall, high) = if x1 > hi && x0 <= hi {
                (hi, true)
            } else if x1 < lo && x0 >= lo {
                (lo, false)
            } else {
                continue;
            };
            if self.kind[d][high as usize] == WallType::Transparent {
                continue;
            }
            let t = (wall - x0) / (x1 - x0);
            if best.map_or(true, |b| t < b.t) {
                best = Some(WallCrossing { t, axis: d, high });
            }
        }
        best
    }

    /// Apply the wall policy at `hit` on the segment from `p0` to the
    /// molecule's position. Returns the point the rest of the motion starts
    /// from, or `None` when the wall absorbed the molecule.
    pub fn cross(&self, m: &mut Molecule, p0: Vec3, hit: WallCrossing) -> Option<Vec3> {
        let d = hit.axis;
        let (lo, hi) = (component(&self.low, d), component(&self.high, d));
        let wall = if hit.high { hi } else { lo };
        let mut at = p0 + (m.pos - p0) * hit.t;
        *component_mut(&mut at, d) = wall;
        match self.kind[d][hit.high as usize] {
            WallType::Absorb => return None,
            WallType::Transparent => {}
            WallType::Reflect => {
                let x = component(&m.pos, d);
                *component_mut(&mut m.pos, d) = 2.0 * wall - x;
            }
            WallType::Periodic => {
                let shift = if hit.high { lo - hi } else { hi - lo };
                *component_mut(&mut m.pos, d) += shift;
                *component_mut(&mut m.posx, d) += shift;
                *component_mut(&mut m.posoffset, d) += shift;
                *component_mut(&mut at, d) = if hit.high { lo } else { hi };
            }
        }
        Some(at)
    }

    /// Bring a freshly placed point back inside: wrap periodic axes, mirror at the rest.
    pub fn contain(&self, mut pos: Vec3) -> Vec3 {
        for d in 0..self.dim {
            let lo = component(&self.low, d);
            let hi = component(&self.high, d);
            let len = hi - lo;
            let x = component(&pos, d);
            let y = if self.is_periodic(d) {
                lo + (x - lo).rem_euclid(len)
            } else {
                // fold into [lo, hi] by mirroring
                let t = (x - lo).rem_euclid(2.0 * len);
                lo + if t > len { 2.0 * len - t } else { t }
            };
            *component_mut(&mut pos, d) = y;
        }
        pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walls(kind: WallType) -> Walls {
        Walls::new(
            2,
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(10.0, 10.0, 0.0),
            [[kind; 2]; 3],
        )
        .unwrap()
    }

    fn mol_at(x: f64, y: f64) -> Molecule {
        Molecule { ident: 1, pos: Vec3::new(x, y, 0.0), ..Default::default() }
    }

    #[test]
    fn reflect_mirrors_overshoot() {
        let w = walls(WallType::Reflect);
        let mut m = mol_at(10.3, -0.2);
        assert_eq!(w.check(&mut m), WallOutcome::Moved(2));
        assert!((m.pos.x - 9.7).abs() < 1e-12);
        assert!((m.pos.y - 0.2).abs() < 1e-12);
    }

    #[test]
    fn periodic_wraps_and_records_offset() {
        let w = walls(WallType::Periodic);
        let mut m = mol_at(10.5, 5.0);
        w.check(&mut m);
        assert!((m.pos.x - 0.5).abs() < 1e-12);
        assert!((m.posoffset.x + 10.0).abs() < 1e-12);
        assert!((m.unwrapped_pos().x - 10.5).abs() < 1e-12);
    }

    #[test]
    fn absorb_and_transparent() {
        let mut m = mol_at(-1.0, 5.0);
        assert_eq!(walls(WallType::Absorb).check(&mut m), WallOutcome::Absorbed);
        let mut m = mol_at(-1.0, 5.0);
        assert_eq!(walls(WallType::Transparent).check(&mut m), WallOutcome::Inside);
        assert_eq!(m.pos.x, -1.0);
    }

    #[test]
    fn contain_folds_points_inside() {
        let w = walls(WallType::Reflect);
        let p = w.contain(Vec3::new(11.0, -3.0, 0.0));
        assert!((p.x - 9.0).abs() < 1e-12 && (p.y - 3.0).abs() < 1e-12);
        assert!((w.volume() - 100.0).abs() < 1e-12);
    }

    #[test]
    fn nearest_wall_crossing_is_found() {
        let w = walls(WallType::Reflect);
        let hit = w.crossing(Vec3::new(9.0, 0.5, 0.0), Vec3::new(11.0, -0.5, 0.0)).unwrap();
        assert_eq!((hit.axis, hit.high), (0, true));
        assert!((hit.t - 0.5).abs() < 1e-12);
        assert!(w.crossing(Vec3::new(1.0, 1.0, 0.0), Vec3::new(2.0, 2.0, 0.0)).is_none());
        let open = walls(WallType::Transparent);
        assert!(open.crossing(Vec3::new(9.0, 5.0, 0.0), Vec3::new(11.0, 5.0, 0.0)).is_none());
    }

    #[test]
    fn crossing_a_periodic_wall_continues_from_the_far_side() {
        let w = walls(WallType::Periodic);
        let mut m = mol_at(10.5, 5.0);
        let p0 = Vec3::new(9.5, 5.0, 0.0);
        let hit = w.crossing(p0, m.pos).unwrap();
        let at = w.cross(&mut m, p0, hit).unwrap();
        assert_eq!(at.x, 0.0);
        assert!((m.pos.x - 0.5).abs() < 1e-12);
        assert!((m.posoffset.x + 10.0).abs() < 1e-12);
        assert!(walls(WallType::Absorb).cross(&mut mol_at(10.5, 5.0), p0, hit).is_none());
    }

    #[test]
    fn mismatched_periodic_ends_are_rejected() {
        let mut kind = [[WallType::Reflect; 2]; 3];
        kind[0][1] = WallType::Periodic;
        assert!(Walls::new(1, Vec3::zero(), Vec3::new(1.0, 0.0, 0.0), kind).is_err());
    }
}

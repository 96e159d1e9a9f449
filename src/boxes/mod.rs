// boxes/mod.rs
// Uniform spatial grid: neighbor lists with periodic wrap codes, panel
// membership and per-list molecule membership

use crate::config;
use crate::error::{SimError, SimResult};
use crate::molecule::{BoxId, MolId, Molecule, PanelRef};
use crate::surface::Surface;
use crate::utils::{component, component_mut, Vec3};
use rayon::prelude::*;

/// A neighbor box and the periodic shift (in domain lengths) per axis needed
/// to bring its contents next to the home box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Neighbor {
    pub boxid: BoxId,
    pub wrap: [i8; 3],
}

impl Neighbor {
    pub fn wraps(&self) -> bool {
        self.wrap != [0; 3]
    }
}

#[derive(Clone, Debug, Default)]
pub struct BoxCell {
    pub indx: [usize; 3],
    pub neigh: Vec<Neighbor>,
    /// Index in `neigh` of the first forward neighbor.
    pub midneigh: usize,
    pub panels: Vec<PanelRef>,
    /// Molecules per live list.
    pub mol: Vec<Vec<MolId>>,
}

/// How the box width is chosen.
#[derive(Clone, Copy, Debug)]
pub enum BoxSizing {
    Width(f64),
    /// Target molecules per box given the initial molecule count.
    MolsPerBox { mpbox: f64, nmol: usize },
}

#[derive(Clone, Debug)]
pub struct BoxGridParams {
    pub dim: usize,
    pub low: Vec3,
    pub high: Vec3,
    pub periodic: [bool; 3],
    pub sizing: BoxSizing,
    pub accuracy: f64,
    /// Largest distance at which two molecules can react.
    pub max_reach: f64,
    pub nlists: usize,
}

pub struct BoxGrid {
    dim: usize,
    low: Vec3,
    size: [f64; 3],
    side: [usize; 3],
    domain: [f64; 3],
    blist: Vec<BoxCell>,
}

impl BoxGrid {
    pub fn new(p: &BoxGridParams) -> SimResult<Self> {
        let dim = p.dim;
        let mut domain = [0.0; 3];
        for d in 0..dim {
            domain[d] = component(&p.high, d) - component(&p.low, d);
            if !(domain[d] > 0.0) {
                return Err(SimError::config(format!("domain has non-positive extent on axis {d}")));
            }
        }
        let volume: f64 = domain[..dim].iter().product();
        let width = match p.sizing {
            BoxSizing::Width(w) => w,
            BoxSizing::MolsPerBox { mpbox, nmol } => {
                if nmol == 0 {
                    domain[..dim].iter().cloned().fold(0.0, f64::max)
                } else {
                    (volume * mpbox / nmol as f64).powf(1.0 / dim as f64)
                }
            }
        };
        if !(width > 0.0) {
            return Err(SimError::config(format!("box width must be positive, got {width}")));
        }
        let mut side = [1usize; 3];
        let mut size = [1.0; 3];
        for d in 0..dim {
            side[d] = ((domain[d] / width).ceil() as usize).max(1);
            size[d] = domain[d] / side[d] as f64;
        }
        let nbox = side
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .filter(|&n| n <= config::MAX_BOXES)
            .ok_or(SimError::OutOfMemory { what: "boxes", cap: config::MAX_BOXES })?;

        let mut grid = Self { dim, low: p.low, size, side, domain, blist: Vec::with_capacity(nbox) };
        for b in 0..nbox {
            let indx = grid.coords_of(b);
            grid.blist.push(BoxCell {
                indx,
                mol: vec![Vec::new(); p.nlists],
                ..Default::default()
            });
        }
        grid.build_neighbors(p);
        log::info!(
            "box grid: {:?} boxes of size {:?} (accuracy {})",
            &side[..dim],
            &size[..dim],
            p.accuracy
        );
        Ok(grid)
    }

    fn coords_of(&self, b: BoxId) -> [usize; 3] {
        [b % self.side[0], (b / self.side[0]) % self.side[1], b / (self.side[0] * self.side[1])]
    }

    fn id_of(&self, c: [usize; 3]) -> BoxId {
        c[0] + self.side[0] * (c[1] + self.side[1] * c[2])
    }

    fn build_neighbors(&mut self, p: &BoxGridParams) {
        let dim = self.dim;
        let mut reach = [0i64; 3];
        if p.accuracy >= config::ACCURACY_NEIGHBORS {
            for d in 0..dim {
                reach[d] = ((p.max_reach / self.size[d]).ceil() as i64).max(1);
            }
        }
        let wrap_allowed = p.accuracy >= config::ACCURACY_WRAP;
        // offsets ordered so that backward ones (first nonzero component from
        // the last axis negative) come first
        let mut offsets: Vec<[i64; 3]> = Vec::new();
        for oz in -reach[2]..=reach[2] {
            for oy in -reach[1]..=reach[1] {
                for ox in -reach[0]..=reach[0] {
                    if ox != 0 || oy != 0 || oz != 0 {
                        offsets.push([ox, oy, oz]);
                    }
                }
            }
        }
        let forward = |o: &[i64; 3]| {
            for d in (0..3).rev() {
                if o[d] != 0 {
                    return o[d] > 0;
                }
            }
            false
        };
        let side = self.side;
        for b in 0..self.blist.len() {
            let c = self.blist[b].indx;
            let mut back = Vec::new();
            let mut fwd = Vec::new();
            'offsets: for o in &offsets {
                let mut t = [0usize; 3];
                let mut wrap = [0i8; 3];
                for d in 0..3 {
                    let x = c[d] as i64 + o[d];
                    let s = side[d] as i64;
                    if (0..s).contains(&x) {
                        t[d] = x as usize;
                    } else if wrap_allowed && p.periodic[d] {
                        t[d] = x.rem_euclid(s) as usize;
                        wrap[d] = x.div_euclid(s) as i8;
                    } else {
                        continue 'offsets;
                    }
                }
                let nb = Neighbor { boxid: self.id_of(t), wrap };
                if forward(o) {
                    fwd.push(nb);
                } else {
                    back.push(nb);
                }
            }
            let cell = &mut self.blist[b];
            cell.midneigh = back.len();
            back.extend(fwd);
            cell.neigh = back;
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn nbox(&self) -> usize {
        self.blist.len()
    }

    pub fn side(&self) -> [usize; 3] {
        self.side
    }

    pub fn size(&self) -> [f64; 3] {
        self.size
    }

    pub fn box_volume(&self) -> f64 {
        self.size[..self.dim].iter().product()
    }

    pub fn cell(&self, b: BoxId) -> &BoxCell {
        &self.blist[b]
    }

    pub fn box_coords(&self, pos: Vec3) -> [usize; 3] {
        let mut c = [0usize; 3];
        for d in 0..self.dim {
            let x = (component(&pos, d) - component(&self.low, d)) / self.size[d];
            c[d] = (x.floor().max(0.0) as usize).min(self.side[d] - 1);
        }
        c
    }

    pub fn box_index_of(&self, pos: Vec3) -> BoxId {
        self.id_of(self.box_coords(pos))
    }

    /// Corners of a box; unused axes span `[0, 0]`.
    pub fn bounds(&self, b: BoxId) -> (Vec3, Vec3) {
        cell_bounds(self.dim, self.low, self.size, self.blist[b].indx)
    }

    /// Displacement that maps a neighbor's contents next to the home box.
    pub fn wrap_offset(&self, wrap: [i8; 3]) -> Vec3 {
        Vec3::new(
            wrap[0] as f64 * self.domain[0],
            wrap[1] as f64 * self.domain[1],
            wrap[2] as f64 * self.domain[2],
        )
    }

    pub fn neighbors_of(&self, b: BoxId) -> &[Neighbor] {
        &self.blist[b].neigh
    }

    /// Neighbors with a lexicographically positive offset.
    pub fn forward_neighbors(&self, b: BoxId) -> &[Neighbor] {
        let cell = &self.blist[b];
        &cell.neigh[cell.midneigh..]
    }

    pub fn molecules(&self, b: BoxId, list: usize) -> &[MolId] {
        &self.blist[b].mol[list]
    }

    pub fn insert(&mut self, b: BoxId, list: usize, id: MolId) {
        self.blist[b].mol[list].push(id);
    }

    pub fn remove(&mut self, b: BoxId, list: usize, id: MolId) -> bool {
        let v = &mut self.blist[b].mol[list];
        match v.iter().position(|&x| x == id) {
            Some(i) => {
                v.swap_remove(i);
                true
            }
            None => false,
        }
    }

    /// Put a molecule in the box containing its position. Returns the box.
    pub fn assign(&mut self, id: MolId, m: &mut Molecule) -> BoxId {
        let target = self.box_index_of(m.pos);
        match m.boxid {
            Some(b) if b == target => {}
            Some(b) => {
                self.remove(b, m.list, id);
                self.insert(target, m.list, id);
            }
            None => self.insert(target, m.list, id),
        }
        m.boxid = Some(target);
        target
    }

    /// Recompute panel membership for every box.
    pub fn rebuild_panels(&mut self, surfaces: &[Surface]) {
        let dim = self.dim;
        let low = self.low;
        let size = self.size;
        self.blist.par_iter_mut().for_each(|cell| {
            let (lo, hi) = cell_bounds(dim, low, size, cell.indx);
            cell.panels.clear();
            for (s, surface) in surfaces.iter().enumerate() {
                for (p, panel) in surface.panels.iter().enumerate() {
                    if panel.overlaps_box(lo, hi) {
                        cell.panels.push(PanelRef { surface: s, panel: p });
                    }
                }
            }
        });
    }

    /// Recompute membership of one panel after it moved.
    pub fn update_panel(&mut self, pref: PanelRef, surfaces: &[Surface]) {
        let panel = &surfaces[pref.surface].panels[pref.panel];
        let dim = self.dim;
        let low = self.low;
        let size = self.size;
        self.blist.par_iter_mut().for_each(|cell| {
            cell.panels.retain(|&r| r != pref);
            let (lo, hi) = cell_bounds(dim, low, size, cell.indx);
            if panel.overlaps_box(lo, hi) {
                cell.panels.push(pref);
                cell.panels.sort_unstable_by_key(|r| (r.surface, r.panel));
            }
        });
    }

    /// Panels in every box overlapped by the bounding range of `p0 -> p1`, deduplicated.
    pub fn panels_along(&self, p0: Vec3, p1: Vec3, out: &mut Vec<PanelRef>) {
        let c0 = self.box_coords(p0.min_by_component(p1));
        let c1 = self.box_coords(p0.max_by_component(p1));
        for z in c0[2]..=c1[2] {
            for y in c0[1]..=c1[1] {
                for x in c0[0]..=c1[0] {
                    out.extend_from_slice(&self.blist[self.id_of([x, y, z])].panels);
                }
            }
        }
        out.sort_unstable_by_key(|r| (r.surface, r.panel));
        out.dedup();
    }

    /// Verify that every listed molecule sits in the box containing its position.
    pub fn validate<'m>(&self, mol: impl Fn(MolId) -> &'m Molecule) -> SimResult<()> {
        for (b, cell) in self.blist.iter().enumerate() {
            for (ll, ids) in cell.mol.iter().enumerate() {
                for &id in ids {
                    let m = mol(id);
                    if !m.is_alive() {
                        continue;
                    }
                    let expected = self.box_index_of(m.pos);
                    if m.boxid != Some(b) || expected != b || m.list != ll {
                        return Err(SimError::ConsistencyViolation(format!(
                            "molecule {} (serial {}) listed in box {} list {} but belongs to box {} list {}",
                            id, m.serno, b, ll, expected, m.list
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn cell_bounds(dim: usize, low: Vec3, size: [f64; 3], indx: [usize; 3]) -> (Vec3, Vec3) {
    let mut lo = Vec3::zero();
    let mut hi = Vec3::zero();
    for d in 0..dim {
        let l = component(&low, d) + indx[d] as f64 * size[d];
        *component_mut(&mut lo, d) = l;
        *component_mut(&mut hi, d) = l + size[d];
    }
    (lo, hi)
}

// molecule/lists.rs
// Molecule arena, named live lists and the (species, state) -> list lookup

use super::pool::Pool;
use super::types::{BoxId, MolId, MolecState, Molecule, EMPTY_SPECIES};
use crate::config;
use crate::error::{SimError, SimResult};
use crate::utils::Vec3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MolListType {
    System,
    /// Holds molecules exported through a port.
    Port,
}

#[derive(Clone, Debug)]
pub struct MolList {
    pub name: String,
    pub kind: MolListType,
    pub mols: Vec<MolId>,
}

/// Membership changes made by `MoleculeLists::sort`, for the box index.
#[derive(Clone, Debug, Default)]
pub struct SortReport {
    /// Dead molecules dropped from a live list: (molecule, box it was in, list).
    pub removed: Vec<(MolId, Option<BoxId>, usize)>,
    /// Molecules that changed list: (molecule, old list).
    pub relisted: Vec<(MolId, usize)>,
    /// Newly created molecules appended to a live list.
    pub added: Vec<MolId>,
}

impl SortReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.relisted.is_empty() && self.added.is_empty()
    }
}

pub struct MoleculeLists {
    pool: Pool<Molecule>,
    lists: Vec<MolList>,
    lookup: Vec<[usize; MolecState::COUNT]>,
    next_serno: u64,
    touch: u64,
}

impl MoleculeLists {
    /// Storage for `nspecies` species (including the empty species 0) with a
    /// single default list.
    pub fn new(nspecies: usize, max_molecules: usize) -> SimResult<Self> {
        let pool = Pool::with_capacity(
            "molecules",
            config::DEFAULT_INITIAL_MOLECULES,
            max_molecules,
        )?;
        let mut lists = Self {
            pool,
            lists: Vec::new(),
            lookup: vec![[0; MolecState::COUNT]; nspecies.max(1)],
            next_serno: 1,
            touch: 0,
        };
        lists.add_list(config::DEFAULT_LIST_NAME, MolListType::System)?;
        Ok(lists)
    }

    pub fn add_list(&mut self, name: &str, kind: MolListType) -> SimResult<usize> {
        if self.list_index(name).is_some() {
            return Err(SimError::config(format!("duplicate molecule list '{name}'")));
        }
        self.lists.push(MolList { name: name.to_string(), kind, mols: Vec::new() });
        Ok(self.lists.len() - 1)
    }

    pub fn list_index(&self, name: &str) -> Option<usize> {
        self.lists.iter().position(|l| l.name == name)
    }

    /// Route molecules of `ident` in `state` (or every state) to `list`.
    pub fn set_list_lookup(&mut self, ident: usize, state: MolecState, list: usize) -> SimResult<()> {
        if ident >= self.lookup.len() {
            return Err(SimError::config(format!("species index {ident} out of range")));
        }
        if list >= self.lists.len() {
            return Err(SimError::config(format!("list index {list} out of range")));
        }
        for ms in state.expand() {
            if *ms == MolecState::Bsoln {
                return Err(SimError::config("bsoln is not a molecule state"));
            }
            self.lookup[ident][ms.index()] = list;
        }
        self.touch += 1;
        Ok(())
    }

    pub fn list_for(&self, ident: usize, state: MolecState) -> usize {
        self.lookup[ident][state.index()]
    }

    /// Create a molecule; it joins its live list at the next `sort`.
    pub fn allocate_molecule(&mut self, ident: usize, state: MolecState, pos: Vec3) -> SimResult<MolId> {
        if ident == EMPTY_SPECIES || ident >= self.lookup.len() {
            return Err(SimError::config(format!("cannot create molecule of species index {ident}")));
        }
        if !state.is_bound() && state != MolecState::Soln {
            return Err(SimError::config(format!("cannot create molecule in state {}", state.name())));
        }
        let id = self.pool.acquire()?;
        let serno = self.next_serno;
        self.next_serno += 1;
        let m = self.pool.get_mut(id);
        m.serno = serno;
        m.ident = ident;
        m.mstate = state;
        m.pos = pos;
        m.posx = pos;
        m.via = pos;
        m.list = self.lookup[ident][state.index()];
        self.touch += 1;
        Ok(id)
    }

    /// Mark a molecule dead. Its slot is reclaimed by the next `sort`.
    pub fn kill_molecule(&mut self, id: MolId) {
        let m = self.pool.get_mut(id);
        m.ident = EMPTY_SPECIES;
        m.pnl = None;
        m.pnlx = None;
        self.touch += 1;
    }

    /// Compact live lists: drop dead molecules, move molecules whose
    /// (species, state) now maps to another list, append newborn ones.
    pub fn sort(&mut self) -> SortReport {
        let mut report = SortReport::default();
        let born = self.pool.take_born();
        for ll in 0..self.lists.len() {
            let mut i = 0;
            while i < self.lists[ll].mols.len() {
                let id = self.lists[ll].mols[i];
                let m = self.pool.get_mut(id);
                if m.ident == EMPTY_SPECIES {
                    report.removed.push((id, m.boxid.take(), ll));
                    self.lists[ll].mols.swap_remove(i);
                    self.pool.release(id);
                    continue;
                }
                let target = self.lookup[m.ident][m.mstate.index()];
                if target != ll {
                    m.list = target;
                    self.lists[ll].mols.swap_remove(i);
                    self.lists[target].mols.push(id);
                    report.relisted.push((id, ll));
                    continue;
                }
                i += 1;
            }
        }
        for id in born {
            let m = self.pool.get_mut(id);
            if m.ident == EMPTY_SPECIES {
                self.pool.release(id);
                continue;
            }
            let target = self.lookup[m.ident][m.mstate.index()];
            m.list = target;
            self.lists[target].mols.push(id);
            report.added.push(id);
        }
        self.pool.flush();
        if !report.is_empty() {
            self.touch += 1;
        }
        report
    }

    pub fn get(&self, id: MolId) -> &Molecule {
        self.pool.get(id)
    }

    pub fn get_mut(&mut self, id: MolId) -> &mut Molecule {
        self.pool.get_mut(id)
    }

    pub fn set_serno(&mut self, id: MolId, serno: u64) {
        self.pool.get_mut(id).serno = serno;
    }

    pub fn live(&self, list: usize) -> &[MolId] {
        &self.lists[list].mols
    }

    pub fn list(&self, list: usize) -> &MolList {
        &self.lists[list]
    }

    pub fn nlists(&self) -> usize {
        self.lists.len()
    }

    pub fn nspecies(&self) -> usize {
        self.lookup.len()
    }

    pub fn touch(&self) -> u64 {
        self.touch
    }

    pub fn nd(&self) -> usize {
        self.pool.nd()
    }

    pub fn topd(&self) -> usize {
        self.pool.topd()
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Every sorted live molecule, list by list.
    pub fn iter_live(&self) -> impl Iterator<Item = (MolId, &Molecule)> + '_ {
        self.lists
            .iter()
            .flat_map(|l| l.mols.iter())
            .map(move |&id| (id, self.pool.get(id)))
            .filter(|(_, m)| m.is_alive())
    }

    /// Number of sorted live molecules of `ident` in `state` (`All` counts every state).
    pub fn count(&self, ident: usize, state: MolecState) -> usize {
        self.iter_live()
            .filter(|(_, m)| m.ident == ident && (state == MolecState::All || m.mstate == state))
            .count()
    }

    pub fn total_live(&self) -> usize {
        self.iter_live().count()
    }
}

// reaction/mod.rs
// Reaction definitions, per-order superstructures and lookup tables

pub mod rates;
pub mod products;
pub mod engine;

use crate::error::{SimError, SimResult};
use crate::molecule::MolecState;
use crate::utils::Vec3;
use smallvec::SmallVec;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reactant {
    pub ident: usize,
    /// A real state, or `All` to permit every state.
    pub state: MolecState,
}

impl Reactant {
    pub fn permits(&self, ident: usize, state: MolecState) -> bool {
        self.ident == ident && (self.state == MolecState::All || self.state == state)
    }
}

/// Serial number given to a product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SernoRule {
    #[default]
    New,
    /// Copy the serial number of reactant `k`.
    Reactant(usize),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Product {
    pub ident: usize,
    /// Real state, or `Bsoln` for solution on the back side of the reactant's panel.
    pub state: MolecState,
    pub serno: SernoRule,
    /// Offset from the reaction point (`Offset`) or absolute position (`Fixed`).
    pub position: Option<Vec3>,
}

impl Product {
    pub fn new(ident: usize, state: MolecState) -> Self {
        Self { ident, state, serno: SernoRule::New, position: None }
    }
}

/// How products are placed relative to the reaction point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RevParam {
    #[default]
    None,
    Irrev,
    /// Products take the reactant positions.
    ConfSpread,
    /// Two products pushed apart along the reactant axis.
    Bounce,
    /// Unbinding radius is `rparam` times the reverse reaction's binding radius.
    Ratio,
    /// Unbinding radius is `rparam`.
    UnbindRad,
    Offset,
    Fixed,
}

impl RevParam {
    pub fn parse(s: &str) -> SimResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(RevParam::None),
            "irrev" => Ok(RevParam::Irrev),
            "confspread" => Ok(RevParam::ConfSpread),
            "bounce" => Ok(RevParam::Bounce),
            "ratio" => Ok(RevParam::Ratio),
            "unbindrad" => Ok(RevParam::UnbindRad),
            "offset" => Ok(RevParam::Offset),
            "fixed" => Ok(RevParam::Fixed),
            other if other.starts_with("pgem") => Err(SimError::config(format!(
                "product placement '{other}' (geminate recombination) is not supported"
            ))),
            other => Err(SimError::unknown("product placement", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Reaction {
    pub name: String,
    pub rct: SmallVec<[Reactant; 2]>,
    pub prd: SmallVec<[Product; 4]>,
    /// Rate constant as given; `None` when only a binding radius or probability is set.
    pub rate: Option<f64>,
    pub multiplicity: u32,
    /// Explicit binding radius, overriding the one derived from the rate.
    pub bindrad_fixed: Option<f64>,
    /// Explicit reaction probability.
    pub prob_fixed: Option<f64>,
    pub bindrad2: f64,
    pub prob: f64,
    pub chi: f64,
    pub tau: f64,
    pub rparamt: RevParam,
    pub rparam: f64,
    pub unbindrad: f64,
    pub disable: bool,
    pub cmpt: Option<usize>,
    pub srf: Option<usize>,
    pub(crate) overflow_warned: bool,
}

impl Reaction {
    pub fn new(name: &str, rct: &[Reactant], prd: &[Product]) -> SimResult<Self> {
        if rct.len() > 2 {
            return Err(SimError::config(format!("reaction '{name}' has more than two reactants")));
        }
        for p in prd {
            if p.state == MolecState::All {
                return Err(SimError::config(format!("reaction '{name}': product state cannot be 'all'")));
            }
            if let SernoRule::Reactant(k) = p.serno {
                if k >= rct.len() {
                    return Err(SimError::config(format!(
                        "reaction '{name}': product copies serial of missing reactant {k}"
                    )));
                }
            }
        }
        Ok(Self {
            name: name.to_string(),
            rct: rct.iter().copied().collect(),
            prd: prd.iter().cloned().collect(),
            rate: None,
            multiplicity: 1,
            bindrad_fixed: None,
            prob_fixed: None,
            bindrad2: 0.0,
            prob: 0.0,
            chi: 0.0,
            tau: 0.0,
            rparamt: RevParam::None,
            rparam: 0.0,
            unbindrad: 0.0,
            disable: false,
            cmpt: None,
            srf: None,
            overflow_warned: false,
        })
    }

    pub fn order(&self) -> usize {
        self.rct.len()
    }

    /// Rate including multiplicity.
    pub fn effective_rate(&self) -> f64 {
        self.rate.unwrap_or(0.0) * self.multiplicity as f64
    }

    pub fn bindrad(&self) -> f64 {
        self.bindrad2.sqrt()
    }
}

/// One entry in a lookup table: reaction index and, for second order,
/// whether the pair matches with reactants swapped. First-order entries
/// carry the cumulative probability for their reactant key.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub rxn: usize,
    pub swapped: bool,
    pub cumprob: f64,
}

/// All reactions of one order with their reactant lookup table.
#[derive(Clone, Debug)]
pub struct ReactionSet {
    pub order: usize,
    pub rxn: Vec<Reaction>,
    nkeys: usize,
    table: Vec<SmallVec<[Candidate; 2]>>,
    stale: bool,
}

fn key(ident: usize, state: MolecState) -> usize {
    ident * MolecState::COUNT + state.index()
}

impl ReactionSet {
    pub fn new(order: usize) -> Self {
        Self { order, rxn: Vec::new(), nkeys: 0, table: Vec::new(), stale: true }
    }

    pub fn add(&mut self, rxn: Reaction) -> SimResult<usize> {
        if rxn.order() != self.order {
            return Err(SimError::config(format!(
                "reaction '{}' has order {}, expected {}",
                rxn.name,
                rxn.order(),
                self.order
            )));
        }
        if self.rxn.iter().any(|r| r.name == rxn.name) {
            return Err(SimError::config(format!("duplicate reaction '{}'", rxn.name)));
        }
        self.rxn.push(rxn);
        self.stale = true;
        Ok(self.rxn.len() - 1)
    }

    pub fn index(&self, name: &str) -> Option<usize> {
        self.rxn.iter().position(|r| r.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rxn.is_empty()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Rebuild the lookup table for `nspecies` species.
    pub fn build_table(&mut self, nspecies: usize, dt: f64) {
        self.nkeys = nspecies * MolecState::COUNT;
        let size = match self.order {
            1 => self.nkeys,
            2 => self.nkeys * self.nkeys,
            _ => 0,
        };
        self.table = vec![SmallVec::new(); size];
        for (ri, r) in self.rxn.iter().enumerate() {
            if r.disable {
                continue;
            }
            match self.order {
                1 => {
                    for &ms in r.rct[0].state.expand() {
                        self.table[key(r.rct[0].ident, ms)].push(Candidate { rxn: ri, swapped: false, cumprob: 0.0 });
                    }
                }
                2 => {
                    for &s0 in r.rct[0].state.expand() {
                        for &s1 in r.rct[1].state.expand() {
                            let k0 = key(r.rct[0].ident, s0);
                            let k1 = key(r.rct[1].ident, s1);
                            self.table[k0 * self.nkeys + k1].push(Candidate { rxn: ri, swapped: false, cumprob: 0.0 });
                            if k0 != k1 {
                                self.table[k1 * self.nkeys + k0].push(Candidate { rxn: ri, swapped: true, cumprob: 0.0 });
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        if self.order == 1 {
            // prob_i = rate_i / sum * (1 - exp(-sum dt)), accumulated per key
            for entries in self.table.iter_mut() {
                let total: f64 = entries.iter().map(|c| self.rxn[c.rxn].effective_rate()).sum();
                let p_any = if total > 0.0 { 1.0 - (-total * dt).exp() } else { 0.0 };
                let mut acc = 0.0;
                for c in entries.iter_mut() {
                    let rxn = &self.rxn[c.rxn];
                    let p = match rxn.prob_fixed {
                        Some(p) => p,
                        None if total > 0.0 => rxn.effective_rate() / total * p_any,
                        None => 0.0,
                    };
                    acc += p;
                    c.cumprob = acc;
                }
            }
        }
        self.stale = false;
    }

    pub fn first_order_candidates(&self, ident: usize, state: MolecState) -> &[Candidate] {
        &self.table[key(ident, state)]
    }

    pub fn second_order_candidates(&self, a: (usize, MolecState), b: (usize, MolecState)) -> &[Candidate] {
        &self.table[key(a.0, a.1) * self.nkeys + key(b.0, b.1)]
    }

    /// Species that appear as reactants of an enabled reaction.
    pub fn reactant_species(&self) -> Vec<usize> {
        let mut v: Vec<usize> = self
            .rxn
            .iter()
            .filter(|r| !r.disable)
            .flat_map(|r| r.rct.iter().map(|x| x.ident))
            .collect();
        v.sort_unstable();
        v.dedup();
        v
    }
}

#[cfg(test)]
#[path = "tests/rates.rs"]
mod rates_tests;

#[cfg(test)]
#[path = "tests/engine.rs"]
mod engine_tests;

// molecule/types.rs
// Molecule record, molecule states and arena handles

use crate::error::{SimError, SimResult};
use crate::utils::Vec3;
use serde::{Deserialize, Serialize};

/// Slot index of a molecule in the molecule arena.
pub type MolId = usize;
/// Index of a box in the spatial grid.
pub type BoxId = usize;

/// Identity 0 marks an empty slot.
pub const EMPTY_SPECIES: usize = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MolecState {
    Soln,
    Front,
    Back,
    Up,
    Down,
    /// Solution on the back side of a surface; only a surface-action destination.
    Bsoln,
    /// Wildcard used when configuring several states at once.
    All,
}

impl MolecState {
    /// Number of real states a molecule can occupy.
    pub const COUNT: usize = 5;
    pub const REAL: [MolecState; 5] = [
        MolecState::Soln,
        MolecState::Front,
        MolecState::Back,
        MolecState::Up,
        MolecState::Down,
    ];

    pub fn index(self) -> usize {
        match self {
            MolecState::Soln => 0,
            MolecState::Front => 1,
            MolecState::Back => 2,
            MolecState::Up => 3,
            MolecState::Down => 4,
            MolecState::Bsoln => 5,
            MolecState::All => 6,
        }
    }

    pub fn from_index(i: usize) -> Option<Self> {
        match i {
            0 => Some(MolecState::Soln),
            1 => Some(MolecState::Front),
            2 => Some(MolecState::Back),
            3 => Some(MolecState::Up),
            4 => Some(MolecState::Down),
            5 => Some(MolecState::Bsoln),
            6 => Some(MolecState::All),
            _ => None,
        }
    }

    pub fn is_bound(self) -> bool {
        matches!(self, MolecState::Front | MolecState::Back | MolecState::Up | MolecState::Down)
    }

    /// States covered by this value: itself, or every real state for `All`.
    pub fn expand(self) -> &'static [MolecState] {
        match self {
            MolecState::All => &Self::REAL,
            MolecState::Soln => &Self::REAL[0..1],
            MolecState::Front => &Self::REAL[1..2],
            MolecState::Back => &Self::REAL[2..3],
            MolecState::Up => &Self::REAL[3..4],
            MolecState::Down => &Self::REAL[4..5],
            MolecState::Bsoln => &[MolecState::Bsoln],
        }
    }

    pub fn parse(s: &str) -> SimResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "soln" | "solution" | "fsoln" => Ok(MolecState::Soln),
            "front" => Ok(MolecState::Front),
            "back" => Ok(MolecState::Back),
            "up" => Ok(MolecState::Up),
            "down" => Ok(MolecState::Down),
            "bsoln" => Ok(MolecState::Bsoln),
            "all" => Ok(MolecState::All),
            other => Err(SimError::unknown("molecule state", other)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MolecState::Soln => "soln",
            MolecState::Front => "front",
            MolecState::Back => "back",
            MolecState::Up => "up",
            MolecState::Down => "down",
            MolecState::Bsoln => "bsoln",
            MolecState::All => "all",
        }
    }
}

/// Reference to one panel: owning surface and panel index within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PanelRef {
    pub surface: usize,
    pub panel: usize,
}

#[derive(Clone, Debug)]
pub struct Molecule {
    pub serno: u64,
    pub list: usize,
    pub pos: Vec3,
    /// Position at the start of the current timestep.
    pub posx: Vec3,
    /// Most recent surface interaction point.
    pub via: Vec3,
    /// Accumulated displacement from periodic wraps and jumps.
    pub posoffset: Vec3,
    pub ident: usize,
    pub mstate: MolecState,
    pub boxid: Option<BoxId>,
    pub pnl: Option<PanelRef>,
    pub pnlx: Option<PanelRef>,
}

impl Default for Molecule {
    fn default() -> Self {
        Self {
            serno: 0,
            list: 0,
            pos: Vec3::zero(),
            posx: Vec3::zero(),
            via: Vec3::zero(),
            posoffset: Vec3::zero(),
            ident: EMPTY_SPECIES,
            mstate: MolecState::Soln,
            boxid: None,
            pnl: None,
            pnlx: None,
        }
    }
}

impl Molecule {
    pub fn is_alive(&self) -> bool {
        self.ident != EMPTY_SPECIES
    }

    /// Position with periodic and jump offsets removed.
    pub fn unwrapped_pos(&self) -> Vec3 {
        self.pos - self.posoffset
    }
}

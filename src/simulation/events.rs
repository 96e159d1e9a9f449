// simulation/events.rs
// Event and warning counters

use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Wall,
    Surf,
    Desorb,
    Rxn0,
    Rxn1,
    Rxn2Intra,
    Rxn2Inter,
    Rxn2Wrap,
    Rxn2Hybrid,
    Import,
    Export,
}

impl EventType {
    pub const ALL: [EventType; 11] = [
        EventType::Wall,
        EventType::Surf,
        EventType::Desorb,
        EventType::Rxn0,
        EventType::Rxn1,
        EventType::Rxn2Intra,
        EventType::Rxn2Inter,
        EventType::Rxn2Wrap,
        EventType::Rxn2Hybrid,
        EventType::Import,
        EventType::Export,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventType::Wall => "wall",
            EventType::Surf => "surf",
            EventType::Desorb => "desorb",
            EventType::Rxn0 => "rxn0",
            EventType::Rxn1 => "rxn1",
            EventType::Rxn2Intra => "rxn2intra",
            EventType::Rxn2Inter => "rxn2inter",
            EventType::Rxn2Wrap => "rxn2wrap",
            EventType::Rxn2Hybrid => "rxn2hybrid",
            EventType::Import => "import",
            EventType::Export => "export",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventCounters {
    counts: [u64; 11],
}

impl EventCounters {
    pub fn record(&mut self, e: EventType) {
        self.counts[e.index()] += 1;
    }

    pub fn add(&mut self, e: EventType, n: u64) {
        self.counts[e.index()] += n;
    }

    pub fn get(&self, e: EventType) -> u64 {
        self.counts[e.index()]
    }

    pub fn reset(&mut self) {
        self.counts = [0; 11];
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventType, u64)> + '_ {
        EventType::ALL.iter().map(move |&e| (e, self.get(e)))
    }
}

impl Serialize for EventCounters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter().map(|(e, n)| (e.name(), n)))
    }
}

/// Recoverable conditions that are counted rather than reported as errors.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WarningCounters {
    /// Reactions or surface tables whose per-step probability had to be capped.
    pub probability_overflow: u64,
    /// Molecules whose surface collisions hit the iteration limit.
    pub surface_iterations: u64,
    /// Molecules found in the wrong box and re-boxed.
    pub box_mismatches: u64,
}

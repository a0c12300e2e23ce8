use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::ObjectKind;

/// Semantic unit of behaviour handed from a manager to a worker.
///
/// The discriminant is the stable id shared by saved models and live
/// inference; never reorder the variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Subtask {
    GetOnionFromDispenser = 0,
    GetOnionFromCounter = 1,
    PutOnionInPot = 2,
    PutOnionCloser = 3,
    GetPlateFromDishRack = 4,
    GetPlateFromCounter = 5,
    PutPlateCloser = 6,
    GetSoup = 7,
    GetSoupFromCounter = 8,
    PutSoupCloser = 9,
    ServeSoup = 10,
    Unknown = 11,
}

/// How a subtask relates to the teammate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubtaskCategory {
    /// Useful regardless of what the teammate does
    Independent,
    /// Leaves an item on a counter for the teammate
    Supportive,
    /// Picks up an item the teammate left on a counter
    Complementary,
    Unknown,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown subtask {0:?}")]
pub struct UnknownSubtask(pub String);

impl Subtask {
    pub const COUNT: usize = 12;

    pub const ALL: [Subtask; Subtask::COUNT] = [
        Subtask::GetOnionFromDispenser,
        Subtask::GetOnionFromCounter,
        Subtask::PutOnionInPot,
        Subtask::PutOnionCloser,
        Subtask::GetPlateFromDishRack,
        Subtask::GetPlateFromCounter,
        Subtask::PutPlateCloser,
        Subtask::GetSoup,
        Subtask::GetSoupFromCounter,
        Subtask::PutSoupCloser,
        Subtask::ServeSoup,
        Subtask::Unknown,
    ];

    pub fn id(self) -> usize {
        self as usize
    }

    pub fn from_id(id: usize) -> Option<Self> {
        Self::ALL.get(id).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Subtask::GetOnionFromDispenser => "get_onion_from_dispenser",
            Subtask::GetOnionFromCounter => "get_onion_from_counter",
            Subtask::PutOnionInPot => "put_onion_in_pot",
            Subtask::PutOnionCloser => "put_onion_closer",
            Subtask::GetPlateFromDishRack => "get_plate_from_dish_rack",
            Subtask::GetPlateFromCounter => "get_plate_from_counter",
            Subtask::PutPlateCloser => "put_plate_closer",
            Subtask::GetSoup => "get_soup",
            Subtask::GetSoupFromCounter => "get_soup_from_counter",
            Subtask::PutSoupCloser => "put_soup_closer",
            Subtask::ServeSoup => "serve_soup",
            Subtask::Unknown => "unknown",
        }
    }

    pub fn category(self) -> SubtaskCategory {
        match self {
            Subtask::GetOnionFromDispenser
            | Subtask::PutOnionInPot
            | Subtask::GetPlateFromDishRack
            | Subtask::GetSoup
            | Subtask::ServeSoup => SubtaskCategory::Independent,
            Subtask::PutOnionCloser | Subtask::PutPlateCloser | Subtask::PutSoupCloser => {
                SubtaskCategory::Supportive
            }
            Subtask::GetOnionFromCounter
            | Subtask::GetPlateFromCounter
            | Subtask::GetSoupFromCounter => SubtaskCategory::Complementary,
            Subtask::Unknown => SubtaskCategory::Unknown,
        }
    }

    /// Subtask that leaves an item of `kind` on a counter
    pub fn supportive_for(kind: ObjectKind) -> Subtask {
        match kind {
            ObjectKind::Onion => Subtask::PutOnionCloser,
            ObjectKind::Dish => Subtask::PutPlateCloser,
            ObjectKind::Soup => Subtask::PutSoupCloser,
        }
    }

    /// Subtask that takes an item of `kind` off a counter
    pub fn complementary_for(kind: ObjectKind) -> Subtask {
        match kind {
            ObjectKind::Onion => Subtask::GetOnionFromCounter,
            ObjectKind::Dish => Subtask::GetPlateFromCounter,
            ObjectKind::Soup => Subtask::GetSoupFromCounter,
        }
    }
}

impl fmt::Display for Subtask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Subtask {
    type Err = UnknownSubtask;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|subtask| subtask.name() == s)
            .ok_or_else(|| UnknownSubtask(s.to_string()))
    }
}

/// 0/1 mask over every subtask id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubtaskMask([bool; Subtask::COUNT]);

impl SubtaskMask {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn set(&mut self, subtask: Subtask) {
        self.0[subtask.id()] = true;
    }

    pub fn is_doable(&self, subtask: Subtask) -> bool {
        self.0[subtask.id()]
    }

    pub fn is_empty(&self) -> bool {
        !self.0.iter().any(|&doable| doable)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    pub fn mask_as_floats(&self) -> Vec<f32> {
        self.0.iter().map(|&v| if v { 1.0 } else { 0.0 }).collect()
    }

    pub fn iter_doable(&self) -> impl Iterator<Item = Subtask> + '_ {
        Subtask::ALL
            .into_iter()
            .filter(|subtask| self.is_doable(*subtask))
    }
}

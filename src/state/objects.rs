use std::fmt;

use serde::{Deserialize, Serialize};

use crate::infra::Position;

/// Ticks a full pot needs before the soup can be picked up
pub const COOK_TIME: u32 = 20;

/// Maximum onions a pot accepts
pub const MAX_INGREDIENTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Onion,
    Dish,
    Soup,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 3] = [ObjectKind::Onion, ObjectKind::Dish, ObjectKind::Soup];

    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::Onion => "onion",
            ObjectKind::Dish => "dish",
            ObjectKind::Soup => "soup",
        }
    }

    /// 1-based item id used by the encoders (0 means "no item")
    pub fn item_id(self) -> usize {
        match self {
            ObjectKind::Onion => 1,
            ObjectKind::Dish => 2,
            ObjectKind::Soup => 3,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of an object for as long as it exists, independent of where it is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Soup {
    pub onions: u32,
    /// Ticks spent cooking, `None` while the pot is still idle
    pub cook_ticks: Option<u32>,
}

impl Soup {
    pub fn is_idle(&self) -> bool {
        self.cook_ticks.is_none()
    }

    pub fn is_cooking(&self) -> bool {
        matches!(self.cook_ticks, Some(ticks) if ticks < COOK_TIME)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.cook_ticks, Some(ticks) if ticks >= COOK_TIME)
    }

    pub fn cook_time_remaining(&self) -> u32 {
        match self.cook_ticks {
            Some(ticks) => COOK_TIME.saturating_sub(ticks),
            None => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub position: Position,
    pub soup: Option<Soup>,
}

impl WorldObject {
    pub fn new(id: ObjectId, kind: ObjectKind, position: Position) -> Self {
        Self {
            id,
            kind,
            position,
            soup: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.soup.is_some_and(|s| s.is_idle())
    }

    pub fn is_cooking(&self) -> bool {
        self.soup.is_some_and(|s| s.is_cooking())
    }

    pub fn is_ready(&self) -> bool {
        self.soup.is_some_and(|s| s.is_ready())
    }
}

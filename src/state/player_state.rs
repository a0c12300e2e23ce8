use serde::{Deserialize, Serialize};

use crate::infra::{Direction, Position};

use super::objects::{ObjectKind, WorldObject};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub position: Position,
    pub orientation: Direction,
    pub held_object: Option<WorldObject>,
}

impl PlayerState {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            orientation: Direction::North,
            held_object: None,
        }
    }

    /// Cell directly in front of the player
    pub fn facing(&self) -> Position {
        self.position.step(self.orientation)
    }

    pub fn held_kind(&self) -> Option<ObjectKind> {
        self.held_object.as_ref().map(|obj| obj.kind)
    }

    pub fn is_holding(&self, kind: ObjectKind) -> bool {
        self.held_kind() == Some(kind)
    }
}

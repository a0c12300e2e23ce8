use serde::{Deserialize, Serialize};

use crate::infra::Position;

use super::layout::{Layout, Terrain};
use super::objects::{ObjectId, ObjectKind, WorldObject};
use super::player_state::PlayerState;

/// Snapshot of a kitchen at one tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub players: Vec<PlayerState>,
    /// Objects resting on the grid, sorted by position (held objects live on the players)
    objects: Vec<WorldObject>,
    pub timestep: u32,
    next_object_id: u32,
}

impl GameState {
    pub fn new(players: Vec<PlayerState>) -> Self {
        Self {
            players,
            objects: Vec::new(),
            timestep: 0,
            next_object_id: 0,
        }
    }

    pub fn initial(layout: &Layout) -> Self {
        Self::new(
            layout
                .start_positions()
                .iter()
                .map(|&pos| PlayerState::new(pos))
                .collect(),
        )
    }

    pub fn allocate_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_object_id);
        self.next_object_id += 1;
        id
    }

    /// Create a new object with a fresh id
    pub fn spawn(&mut self, kind: ObjectKind, position: Position) -> WorldObject {
        WorldObject::new(self.allocate_id(), kind, position)
    }

    pub fn objects(&self) -> impl Iterator<Item = &WorldObject> {
        self.objects.iter()
    }

    /// Grid objects followed by held objects
    pub fn all_objects(&self) -> impl Iterator<Item = &WorldObject> {
        self.objects.iter().chain(
            self.players
                .iter()
                .filter_map(|player| player.held_object.as_ref()),
        )
    }

    pub fn object_at(&self, pos: &Position) -> Option<&WorldObject> {
        self.index_of(pos).ok().map(|i| &self.objects[i])
    }

    pub fn object_at_mut(&mut self, pos: &Position) -> Option<&mut WorldObject> {
        match self.index_of(pos) {
            Ok(i) => Some(&mut self.objects[i]),
            Err(_) => None,
        }
    }

    pub fn has_object_at(&self, pos: &Position) -> bool {
        self.index_of(pos).is_ok()
    }

    /// Place an object at its own position, returning any object it displaced
    pub fn add_object(&mut self, object: WorldObject) -> Option<WorldObject> {
        match self.index_of(&object.position) {
            Ok(i) => Some(std::mem::replace(&mut self.objects[i], object)),
            Err(i) => {
                self.objects.insert(i, object);
                None
            }
        }
    }

    pub fn remove_object_at(&mut self, pos: &Position) -> Option<WorldObject> {
        self.index_of(pos).ok().map(|i| self.objects.remove(i))
    }

    pub fn find_object(&self, id: ObjectId) -> Option<&WorldObject> {
        self.objects.iter().find(|obj| obj.id == id)
    }

    /// Soups that sit in pots
    pub fn pot_soups<'a>(&'a self, layout: &'a Layout) -> impl Iterator<Item = &'a WorldObject> {
        self.objects
            .iter()
            .filter(move |obj| obj.kind == ObjectKind::Soup && layout.tile(&obj.position) == Some(Terrain::Pot))
    }

    /// Equality ignoring the tick counter
    pub fn time_independent_eq(&self, other: &GameState) -> bool {
        self.players == other.players && self.objects == other.objects
    }

    pub fn draw_ascii(&self, layout: &Layout) -> String {
        let mut rows: Vec<Vec<char>> = layout
            .draw_ascii()
            .lines()
            .map(|row| row.chars().collect())
            .collect();

        let mut put = |pos: &Position, glyph: char| {
            if let Some(cell) = rows
                .get_mut(pos.y as usize)
                .and_then(|row| row.get_mut(pos.x as usize))
            {
                *cell = glyph;
            }
        };

        for obj in &self.objects {
            let glyph = match obj.kind {
                ObjectKind::Onion => 'o',
                ObjectKind::Dish => 'd',
                ObjectKind::Soup if obj.is_ready() => 's',
                ObjectKind::Soup => 'p',
            };
            put(&obj.position, glyph);
        }
        for (i, player) in self.players.iter().enumerate() {
            put(&player.position, char::from(b'1' + i as u8));
        }

        rows.into_iter()
            .map(|row| row.into_iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn index_of(&self, pos: &Position) -> Result<usize, usize> {
        self.objects.binary_search_by(|obj| obj.position.cmp(pos))
    }
}

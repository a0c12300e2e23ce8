//! Deterministic two-player kitchen simulator

use serde::{Deserialize, Serialize};

use crate::infra::{Action, JointAction, Position};

use super::game_state::GameState;
use super::layout::{Layout, Terrain};
use super::objects::{COOK_TIME, MAX_INGREDIENTS, ObjectKind, Soup};

/// Reward for delivering one soup
pub const DELIVERY_REWARD: f32 = 20.0;

/// Result of advancing the simulator by one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Team reward for this tick
    pub reward: f32,
    pub sparse_reward_by_agent: [f32; 2],
    pub done: bool,
}

/// The game the environments drive. Implemented by [`Kitchen`]; other
/// simulators can be plugged in behind the same seam.
pub trait Simulator {
    fn layout(&self) -> &Layout;

    fn state(&self) -> &GameState;

    fn horizon(&self) -> u32;

    fn reset(&mut self);

    fn step(&mut self, joint_action: JointAction) -> StepOutcome;

    fn is_done(&self) -> bool {
        self.state().timestep >= self.horizon()
    }
}

#[derive(Debug, Clone)]
pub struct Kitchen {
    layout: Layout,
    horizon: u32,
    state: GameState,
}

impl Kitchen {
    pub fn new(layout: Layout, horizon: u32) -> Self {
        let state = GameState::initial(&layout);
        Self {
            layout,
            horizon,
            state,
        }
    }

    /// Start from an arbitrary state instead of the layout's initial one
    pub fn with_state(layout: Layout, horizon: u32, state: GameState) -> Self {
        Self {
            layout,
            horizon,
            state,
        }
    }

    fn interact(&mut self, player_index: usize) -> f32 {
        let player = &self.state.players[player_index];
        let target = player.facing();
        let player_pos = player.position;
        let held = player.held_kind();

        let Some(terrain) = self.layout.tile(&target) else {
            return 0.0;
        };

        match (terrain, held) {
            (Terrain::Counter, Some(_)) if !self.state.has_object_at(&target) => {
                if let Some(mut obj) = self.state.players[player_index].held_object.take() {
                    obj.position = target;
                    self.state.add_object(obj);
                }
            }
            (Terrain::Counter, None) => {
                if let Some(mut obj) = self.state.remove_object_at(&target) {
                    obj.position = player_pos;
                    self.state.players[player_index].held_object = Some(obj);
                }
            }
            (Terrain::OnionDispenser, None) => {
                let onion = self.state.spawn(ObjectKind::Onion, player_pos);
                self.state.players[player_index].held_object = Some(onion);
            }
            (Terrain::DishDispenser, None) => {
                let dish = self.state.spawn(ObjectKind::Dish, player_pos);
                self.state.players[player_index].held_object = Some(dish);
            }
            (Terrain::Pot, Some(ObjectKind::Onion)) => {
                if self.add_onion_to_pot(target) {
                    self.state.players[player_index].held_object = None;
                }
            }
            (Terrain::Pot, None) => {
                if let Some(soup) = self
                    .state
                    .object_at_mut(&target)
                    .and_then(|obj| obj.soup.as_mut())
                    && soup.is_idle()
                    && soup.onions > 0
                {
                    soup.cook_ticks = Some(0);
                    tracing::trace!("Player {} started cooking at {:?}", player_index, target);
                }
            }
            (Terrain::Pot, Some(ObjectKind::Dish)) => {
                if self.state.object_at(&target).is_some_and(|obj| obj.is_ready())
                    && let Some(mut soup) = self.state.remove_object_at(&target)
                {
                    soup.position = player_pos;
                    self.state.players[player_index].held_object = Some(soup);
                }
            }
            (Terrain::Serving, Some(ObjectKind::Soup)) => {
                self.state.players[player_index].held_object = None;
                tracing::debug!("Player {} served a soup", player_index);
                return DELIVERY_REWARD;
            }
            _ => {}
        }

        0.0
    }

    fn add_onion_to_pot(&mut self, pot: Position) -> bool {
        match self.state.object_at_mut(&pot) {
            Some(obj) => match obj.soup.as_mut() {
                Some(soup) if soup.is_idle() && soup.onions < MAX_INGREDIENTS => {
                    soup.onions += 1;
                    if soup.onions == MAX_INGREDIENTS {
                        soup.cook_ticks = Some(0);
                    }
                    true
                }
                _ => false,
            },
            None => {
                let mut soup = self.state.spawn(ObjectKind::Soup, pot);
                soup.soup = Some(Soup {
                    onions: 1,
                    cook_ticks: None,
                });
                self.state.add_object(soup);
                true
            }
        }
    }

    fn resolve_movement(&mut self, joint_action: &JointAction) {
        let old: Vec<Position> = self.state.players.iter().map(|p| p.position).collect();
        let mut new = old.clone();

        for (i, action) in joint_action.iter().enumerate() {
            if let Some(direction) = action.direction() {
                self.state.players[i].orientation = direction;
                let target = old[i].step(direction);
                if self.layout.is_floor(&target) {
                    new[i] = target;
                }
            }
        }

        let collided = new.len() == 2 && (new[0] == new[1] || (new[0] == old[1] && new[1] == old[0]));
        if collided {
            new = old;
        }

        for (player, pos) in self.state.players.iter_mut().zip(new) {
            player.position = pos;
            if let Some(obj) = player.held_object.as_mut() {
                obj.position = pos;
            }
        }
    }

    fn advance_cooking(&mut self) {
        for pot in self.layout.pot_locations() {
            if let Some(soup) = self
                .state
                .object_at_mut(&pot)
                .and_then(|obj| obj.soup.as_mut())
                && let Some(ticks) = soup.cook_ticks
                && ticks < COOK_TIME
            {
                soup.cook_ticks = Some(ticks + 1);
            }
        }
    }
}

impl Simulator for Kitchen {
    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn state(&self) -> &GameState {
        &self.state
    }

    fn horizon(&self) -> u32 {
        self.horizon
    }

    fn reset(&mut self) {
        self.state = GameState::initial(&self.layout);
    }

    #[tracing::instrument(level = "trace", skip(self), fields(tick = self.state.timestep))]
    fn step(&mut self, joint_action: JointAction) -> StepOutcome {
        let mut sparse_reward_by_agent = [0.0; 2];

        for (i, action) in joint_action.iter().enumerate() {
            if *action == Action::Interact {
                sparse_reward_by_agent[i] += self.interact(i);
            }
        }

        self.resolve_movement(&joint_action);
        self.advance_cooking();
        self.state.timestep += 1;

        StepOutcome {
            reward: sparse_reward_by_agent.iter().sum(),
            sparse_reward_by_agent,
            done: self.is_done(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::Direction;

    fn kitchen() -> Kitchen {
        Kitchen::new(Layout::from_name("forced_coordination").unwrap(), 400)
    }

    #[test]
    fn test_dispenser_gives_onion() {
        let mut kitchen = kitchen();
        // Player 2 starts at (1, 2) next to the onion dispenser at (0, 2)
        kitchen.step([Action::Stay, Action::West]);
        assert_eq!(kitchen.state().players[1].position, Position::new(1, 2));
        assert_eq!(kitchen.state().players[1].orientation, Direction::West);

        kitchen.step([Action::Stay, Action::Interact]);
        assert_eq!(kitchen.state().players[1].held_kind(), Some(ObjectKind::Onion));
    }

    #[test]
    fn test_counter_drop_and_pickup_keep_identity() {
        let mut kitchen = kitchen();
        kitchen.step([Action::Stay, Action::West]);
        kitchen.step([Action::Stay, Action::Interact]);
        let id = kitchen.state().players[1].held_object.as_ref().unwrap().id;

        kitchen.step([Action::Stay, Action::East]);
        kitchen.step([Action::Stay, Action::Interact]);
        let counter = Position::new(2, 2);
        assert_eq!(kitchen.state().object_at(&counter).map(|o| o.id), Some(id));
        assert!(kitchen.state().players[1].held_object.is_none());

        // Player 1 walks from (3, 1) to (3, 2), turns west and takes the onion
        kitchen.step([Action::South, Action::Stay]);
        kitchen.step([Action::West, Action::Stay]);
        kitchen.step([Action::Interact, Action::Stay]);
        let held = kitchen.state().players[0].held_object.as_ref().unwrap();
        assert_eq!(held.id, id);
        assert_eq!(held.position, Position::new(3, 2));
        assert!(!kitchen.state().has_object_at(&counter));
    }

    #[test]
    fn test_full_soup_cycle_delivers_reward() {
        let layout = Layout::from_name("forced_coordination").unwrap();
        let mut state = GameState::initial(&layout);
        state.players[0].orientation = Direction::North;
        let mut kitchen = Kitchen::with_state(layout, 400, state);

        for _ in 0..3 {
            let onion = kitchen.state.spawn(ObjectKind::Onion, Position::new(3, 1));
            kitchen.state.players[0].held_object = Some(onion);
            kitchen.step([Action::Interact, Action::Stay]);
        }
        let pot = Position::new(3, 0);
        assert_eq!(kitchen.state().object_at(&pot).and_then(|o| o.soup).map(|s| s.onions), Some(3));
        // A full pot starts cooking on its own
        assert!(kitchen.state().object_at(&pot).unwrap().is_cooking());

        for _ in 0..COOK_TIME {
            kitchen.step([Action::Stay, Action::Stay]);
        }
        assert!(kitchen.state().object_at(&pot).unwrap().is_ready());

        let dish = kitchen.state.spawn(ObjectKind::Dish, Position::new(3, 1));
        kitchen.state.players[0].held_object = Some(dish);
        kitchen.step([Action::Interact, Action::Stay]);
        assert_eq!(kitchen.state().players[0].held_kind(), Some(ObjectKind::Soup));

        kitchen.step([Action::South, Action::Stay]);
        kitchen.step([Action::South, Action::Stay]);
        assert_eq!(kitchen.state().players[0].position, Position::new(3, 3));
        kitchen.step([Action::South, Action::Stay]);
        let outcome = kitchen.step([Action::Interact, Action::Stay]);
        assert_eq!(outcome.reward, DELIVERY_REWARD);
        assert_eq!(outcome.sparse_reward_by_agent, [DELIVERY_REWARD, 0.0]);
    }

    #[test]
    fn test_partial_pot_started_by_hand() {
        let layout = Layout::from_name("forced_coordination").unwrap();
        let mut kitchen = Kitchen::new(layout, 400);
        let onion = kitchen.state.spawn(ObjectKind::Onion, Position::new(3, 1));
        kitchen.state.players[0].held_object = Some(onion);
        kitchen.step([Action::Interact, Action::Stay]);

        let pot = Position::new(3, 0);
        assert!(kitchen.state().object_at(&pot).unwrap().is_idle());
        kitchen.step([Action::Interact, Action::Stay]);
        assert!(kitchen.state().object_at(&pot).unwrap().is_cooking());
    }

    #[test]
    fn test_collisions_keep_players_in_place() {
        let mut kitchen = Kitchen::new(Layout::from_name("cramped_room").unwrap(), 400);
        // Players start at (1, 2) and (3, 1)
        kitchen.step([Action::East, Action::Stay]);

        // Both aim for (2, 1)
        kitchen.step([Action::North, Action::West]);
        let blocked: Vec<Position> = kitchen.state().players.iter().map(|p| p.position).collect();
        assert_eq!(blocked, vec![Position::new(2, 2), Position::new(3, 1)]);
        assert_eq!(kitchen.state().players[0].orientation, Direction::North);

        kitchen.step([Action::Stay, Action::West]);
        let after: Vec<Position> = kitchen.state().players.iter().map(|p| p.position).collect();
        assert_eq!(after, vec![Position::new(2, 2), Position::new(2, 1)]);

        // Swapping is not allowed
        kitchen.step([Action::North, Action::South]);
        let swapped: Vec<Position> = kitchen.state().players.iter().map(|p| p.position).collect();
        assert_eq!(swapped, after);
    }

    #[test]
    fn test_horizon_ends_episode() {
        let mut kitchen = Kitchen::new(Layout::from_name("cramped_room").unwrap(), 3);
        assert!(!kitchen.step([Action::Stay, Action::Stay]).done);
        assert!(!kitchen.step([Action::Stay, Action::Stay]).done);
        assert!(kitchen.step([Action::Stay, Action::Stay]).done);
        kitchen.reset();
        assert_eq!(kitchen.state().timestep, 0);
    }
}

//! Infers which subtask a player just finished from two consecutive states

use thiserror::Error;

use crate::state::{GameState, Layout, ObjectKind, PlayerState, Terrain};

use super::taxonomy::Subtask;

/// A held-object change that no subtask explains. Either the simulator and
/// the caller's states are out of sync or the taxonomy is incomplete.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubtaskError {
    #[error("unexpected transition {previous:?} -> {current:?} while facing {facing:?}")]
    UnexpectedTransition {
        previous: Option<ObjectKind>,
        current: Option<ObjectKind>,
        facing: Option<Terrain>,
    },

    #[error("player index {0} out of range")]
    InvalidPlayer(usize),
}

/// Terrain the player is facing, `None` when it faces off the grid
pub fn facing(layout: &Layout, player: &PlayerState) -> Option<Terrain> {
    layout.tile(&player.facing())
}

/// Returns the subtask completed by `player_index` between `prev` and `curr`,
/// or `None` when the held object did not change.
#[tracing::instrument(level = "trace", skip(layout, prev, curr))]
pub fn completed_subtask(
    layout: &Layout,
    prev: &GameState,
    curr: &GameState,
    player_index: usize,
) -> Result<Option<Subtask>, SubtaskError> {
    let (Some(prev_player), Some(curr_player)) =
        (prev.players.get(player_index), curr.players.get(player_index))
    else {
        return Err(SubtaskError::InvalidPlayer(player_index));
    };

    let previous = prev_player.held_kind();
    let current = curr_player.held_kind();
    if previous == current {
        return Ok(None);
    }

    let tile = facing(layout, prev_player);

    use ObjectKind::{Dish, Onion, Soup};
    let subtask = match (previous, current, tile) {
        (None, Some(Onion), Some(Terrain::OnionDispenser)) => Subtask::GetOnionFromDispenser,
        (None, Some(Onion), Some(Terrain::Counter)) => Subtask::GetOnionFromCounter,
        (Some(Onion), None, Some(Terrain::Pot)) => Subtask::PutOnionInPot,
        (Some(Onion), None, Some(Terrain::Counter)) => Subtask::PutOnionCloser,
        (None, Some(Dish), Some(Terrain::DishDispenser)) => Subtask::GetPlateFromDishRack,
        (None, Some(Dish), Some(Terrain::Counter)) => Subtask::GetPlateFromCounter,
        (Some(Dish), None, Some(Terrain::Counter)) => Subtask::PutPlateCloser,
        (Some(Dish), Some(Soup), Some(Terrain::Pot)) => Subtask::GetSoup,
        (None, Some(Soup), Some(Terrain::Counter)) => Subtask::GetSoupFromCounter,
        (Some(Soup), None, Some(Terrain::Serving)) => Subtask::ServeSoup,
        (Some(Soup), None, Some(Terrain::Counter)) => Subtask::PutSoupCloser,
        _ => {
            return Err(SubtaskError::UnexpectedTransition {
                previous,
                current,
                facing: tile,
            });
        }
    };

    tracing::trace!("Player {} completed {}", player_index, subtask);
    Ok(Some(subtask))
}

/// Completed subtasks for every player
pub fn completed_subtasks(
    layout: &Layout,
    prev: &GameState,
    curr: &GameState,
) -> Result<Vec<Option<Subtask>>, SubtaskError> {
    (0..curr.players.len())
        .map(|i| completed_subtask(layout, prev, curr, i))
        .collect()
}

use crate::state::{GameState, Layout, ObjectKind, Terrain};

use super::taxonomy::{Subtask, SubtaskMask};

/// Subtasks `player_index` could currently accomplish, decided by what it holds.
///
/// Dispenser pickups are always doable with empty hands; counter pickups need
/// a matching object somewhere on the grid (ready soups only when outside a
/// pot). Picking up soup with a dish needs a pot that is cooking or ready.
pub fn doable_subtasks(state: &GameState, layout: &Layout, player_index: usize) -> SubtaskMask {
    let mut mask = SubtaskMask::none();
    let Some(player) = state.players.get(player_index) else {
        return mask;
    };

    match player.held_kind() {
        None => {
            mask.set(Subtask::GetOnionFromDispenser);
            mask.set(Subtask::GetPlateFromDishRack);
            for obj in state.objects() {
                match obj.kind {
                    ObjectKind::Onion => mask.set(Subtask::GetOnionFromCounter),
                    ObjectKind::Dish => mask.set(Subtask::GetPlateFromCounter),
                    ObjectKind::Soup
                        if obj.is_ready() && layout.tile(&obj.position) != Some(Terrain::Pot) =>
                    {
                        mask.set(Subtask::GetSoupFromCounter)
                    }
                    ObjectKind::Soup => {}
                }
            }
        }
        Some(ObjectKind::Onion) => {
            mask.set(Subtask::PutOnionInPot);
            mask.set(Subtask::PutOnionCloser);
        }
        Some(ObjectKind::Dish) => {
            mask.set(Subtask::PutPlateCloser);
            if state
                .objects()
                .any(|obj| obj.kind == ObjectKind::Soup && obj.soup.is_some_and(|s| !s.is_idle()))
            {
                mask.set(Subtask::GetSoup);
            }
        }
        Some(ObjectKind::Soup) => {
            mask.set(Subtask::ServeSoup);
            mask.set(Subtask::PutSoupCloser);
        }
    }

    mask
}

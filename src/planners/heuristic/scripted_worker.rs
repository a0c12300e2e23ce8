//! Pathfinding worker that carries out whichever subtask it is handed

use tracing::trace;

use crate::infra::{AStar, Action, Position, face_action, path_to_action};
use crate::planners::hrl::{Policy, PolicyContext};
use crate::state::{GameState, Layout, MAX_INGREDIENTS, ObjectKind, Terrain};
use crate::subtasks::Subtask;

/// Walks to a free cell next to a target tile, turns to face it and interacts.
/// With a dish and only cooking pots around it waits in front of the pot.
#[derive(Debug, Default)]
pub struct ScriptedWorker;

impl ScriptedWorker {
    pub fn new() -> Self {
        Self
    }

    /// Tiles the player must interact with to complete `subtask`
    pub fn targets(subtask: Subtask, layout: &Layout, state: &GameState, player_index: usize) -> Vec<Position> {
        let counters_with = |kind: ObjectKind| -> Vec<Position> {
            layout
                .counter_locations()
                .into_iter()
                .filter(|c| state.object_at(c).is_some_and(|obj| obj.kind == kind))
                .collect()
        };

        match subtask {
            Subtask::GetOnionFromDispenser => layout.locations(Terrain::OnionDispenser),
            Subtask::GetOnionFromCounter => counters_with(ObjectKind::Onion),
            Subtask::PutOnionInPot => layout
                .pot_locations()
                .into_iter()
                .filter(|pot| match state.object_at(pot).and_then(|obj| obj.soup) {
                    Some(soup) => soup.is_idle() && soup.onions < MAX_INGREDIENTS,
                    None => true,
                })
                .collect(),
            Subtask::PutOnionCloser | Subtask::PutPlateCloser | Subtask::PutSoupCloser => {
                handoff_counters(layout, state, player_index)
            }
            Subtask::GetPlateFromDishRack => layout.locations(Terrain::DishDispenser),
            Subtask::GetPlateFromCounter => counters_with(ObjectKind::Dish),
            Subtask::GetSoup => {
                let pots = |ready: bool| -> Vec<Position> {
                    state
                        .pot_soups(layout)
                        .filter(|obj| if ready { obj.is_ready() } else { obj.is_cooking() })
                        .map(|obj| obj.position)
                        .collect()
                };
                let ready = pots(true);
                if ready.is_empty() { pots(false) } else { ready }
            }
            Subtask::GetSoupFromCounter => counters_with(ObjectKind::Soup),
            Subtask::ServeSoup => layout.locations(Terrain::Serving),
            Subtask::Unknown => Vec::new(),
        }
    }

    fn act(&self, subtask: Subtask, layout: &Layout, state: &GameState, player_index: usize) -> Action {
        let Some(player) = state.players.get(player_index) else {
            return Action::Stay;
        };
        let targets = Self::targets(subtask, layout, state, player_index);
        if targets.is_empty() {
            return Action::Stay;
        }

        let pos = player.position;
        if targets.contains(&player.facing()) {
            let target = player.facing();
            let still_cooking = subtask == Subtask::GetSoup
                && state.object_at(&target).is_some_and(|obj| obj.is_cooking());
            return if still_cooking { Action::Stay } else { Action::Interact };
        }

        if let Some(target) = targets.iter().find(|t| pos.is_adjacent(t)) {
            return face_action(pos, *target).unwrap_or(Action::Stay);
        }

        let teammate = state
            .players
            .iter()
            .enumerate()
            .find(|(i, _)| *i != player_index)
            .map(|(_, p)| p.position);
        let route = AStar::find_path_to_adjacent(layout, pos, &targets, |p| Some(*p) != teammate)
            .or_else(|| AStar::find_path_to_adjacent(layout, pos, &targets, |_| true));

        match route {
            Some((path, target)) => {
                trace!("Player {} heading to {:?} via {} cells", player_index, target, path.len());
                path_to_action(pos, &path).unwrap_or(Action::Stay)
            }
            None => Action::Stay,
        }
    }
}

/// Empty counters the teammate can also reach, or any empty counter when
/// there is no such counter
fn handoff_counters(layout: &Layout, state: &GameState, player_index: usize) -> Vec<Position> {
    let empty: Vec<Position> = layout
        .counter_locations()
        .into_iter()
        .filter(|c| !state.has_object_at(c))
        .collect();

    let Some(mate) = state
        .players
        .iter()
        .enumerate()
        .find(|(i, _)| *i != player_index)
        .map(|(_, p)| p.position)
    else {
        return empty;
    };

    let shared: Vec<Position> = empty
        .iter()
        .copied()
        .filter(|c| AStar::find_path_to_adjacent(layout, mate, &[*c], |_| true).is_some())
        .collect();

    if shared.is_empty() { empty } else { shared }
}

impl Policy for ScriptedWorker {
    fn name(&self) -> &str {
        "scripted_worker"
    }

    fn predict(&mut self, ctx: &PolicyContext) -> Action {
        match ctx.observation.curr_subtask {
            Some(subtask) => self.act(subtask, ctx.layout, ctx.state, ctx.player_index),
            None => Action::Stay,
        }
    }
}

use tracing::{debug, info, warn};

use crate::infra::{GameObserver, JointAction};
use crate::state::{GameState, Layout};
use crate::subtasks::Subtask;

/// Logs episode events through `tracing`
pub struct DefaultObserver;

impl GameObserver for DefaultObserver {
    fn on_episode_start(&mut self, layout: &Layout, episode: usize) {
        info!("Episode {} started on {}", episode, layout.name);
        info!("- layout size: {}x{}", layout.width, layout.height);
    }

    fn on_state_update(&mut self, state: &GameState, layout: &Layout, score: f32) {
        debug!("tick: {}, score: {}", state.timestep, score);
        for (i, player) in state.players.iter().enumerate() {
            debug!(
                "player {}: pos: ({}, {}), facing: {:?}, holding: {:?}",
                i + 1,
                player.position.x,
                player.position.y,
                player.orientation,
                player.held_kind()
            );
        }
        tracing::trace!("\n{}", state.draw_ascii(layout));
    }

    fn on_subtask_selected(&mut self, player_index: usize, subtask: Subtask) {
        info!("Player {} selected subtask {}", player_index + 1, subtask);
    }

    fn on_subtask_completed(&mut self, player_index: usize, subtask: Subtask) {
        info!("Player {} completed subtask {}", player_index + 1, subtask);
    }

    fn on_action_selected(&mut self, joint_action: JointAction) {
        debug!("joint action: {:?}", joint_action);
    }

    fn on_stuck_detected(&mut self, message: &str) {
        warn!("{}", message);
    }

    fn on_episode_finished(&mut self, episode: usize, score: f32, ticks: u32) {
        info!("Episode {} finished after {} ticks", episode, ticks);
        info!("Final score: {}", score);
    }
}

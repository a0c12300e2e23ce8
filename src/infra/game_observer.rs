use crate::infra::JointAction;
use crate::state::{GameState, Layout};
use crate::subtasks::Subtask;

/// Trait for observing episode events during execution
pub trait GameObserver {
    /// Called when an episode starts
    fn on_episode_start(&mut self, layout: &Layout, episode: usize);

    /// Called every tick after the simulator advanced
    fn on_state_update(&mut self, state: &GameState, layout: &Layout, score: f32);

    /// Called when a manager hands a new subtask to its worker
    fn on_subtask_selected(&mut self, player_index: usize, subtask: Subtask);

    /// Called when the detector reports a finished subtask
    fn on_subtask_completed(&mut self, player_index: usize, subtask: Subtask);

    /// Called when the joint action for the tick is fixed
    fn on_action_selected(&mut self, _joint_action: JointAction) {
        // Default implementation does nothing
    }

    /// Called when the stuck guard replaced the joint action
    fn on_stuck_detected(&mut self, message: &str);

    /// Called when the episode finishes
    fn on_episode_finished(&mut self, episode: usize, score: f32, ticks: u32);
}

//! Plays whole episodes with two policies, one per player

use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;
use tracing::debug;

use crate::infra::{Action, GameObserver, TrajectoryError, TrajectoryRecorder};
use crate::state::simulator::DELIVERY_REWARD;
use crate::state::{Kitchen, Layout, Simulator};
use crate::subtasks::{Subtask, SubtaskError, completed_subtasks};

use super::agent::{Policy, PolicyContext};
use super::encoder::{EncoderConfig, EncodingError, StateEncoder};
use super::env::StuckGuard;
use super::metrics::EpisodeSummary;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Subtask(#[from] SubtaskError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),
}

#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    pub encoder_config: EncoderConfig,
    /// Seed for the stuck guard
    pub seed: Option<u64>,
    /// Write one trajectory file per episode into this folder
    pub record_folder: Option<PathBuf>,
}

pub struct EpisodeRunner<S: Simulator = Kitchen> {
    sim: S,
    encoder: StateEncoder,
    guard: StuckGuard,
    observer: Box<dyn GameObserver>,
    record_folder: Option<PathBuf>,
    episode: usize,
}

impl EpisodeRunner<Kitchen> {
    pub fn from_layout(layout: Layout, horizon: u32, config: RunnerConfig, observer: impl GameObserver + 'static) -> Self {
        Self::new(Kitchen::new(layout, horizon), config, observer)
    }
}

impl<S: Simulator> EpisodeRunner<S> {
    pub fn new(sim: S, config: RunnerConfig, observer: impl GameObserver + 'static) -> Self {
        let mut encoder_config = config.encoder_config;
        encoder_config.horizon = sim.horizon();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            sim,
            encoder: StateEncoder::new(encoder_config),
            guard: StuckGuard::new(rng),
            observer: Box::new(observer),
            record_folder: config.record_folder,
            episode: 0,
        }
    }

    pub fn layout(&self) -> &Layout {
        self.sim.layout()
    }

    pub fn episodes_played(&self) -> usize {
        self.episode
    }

    /// Play one episode from the initial state until the horizon
    #[tracing::instrument(level = "trace", skip(self, players))]
    pub fn run_episode(&mut self, players: &mut [Box<dyn Policy>; 2]) -> Result<EpisodeSummary, RunnerError> {
        self.episode += 1;
        self.sim.reset();
        self.guard.reset();
        for (i, player) in players.iter_mut().enumerate() {
            player.reset(i);
        }

        let layout = self.sim.layout().clone();
        self.observer.on_episode_start(&layout, self.episode);

        let mut recorder = match &self.record_folder {
            Some(folder) => Some(TrajectoryRecorder::new(folder, &layout.name, self.sim.horizon())?),
            None => None,
        };

        let mut summary = EpisodeSummary {
            score: 0.0,
            ticks: 0,
            soups_served: 0,
            subtasks_completed: [0; 2],
            stuck_ticks: 0,
        };
        // Unknown for both players marks the first tick of an episode
        let mut last_completed = [Some(Subtask::Unknown); 2];
        let mut selected: [Option<Subtask>; 2] = [None; 2];

        while !self.sim.is_done() {
            let mut joint_action = [Action::Stay; 2];
            for (i, player) in players.iter_mut().enumerate() {
                let observation = self
                    .encoder
                    .encode(&layout, self.sim.state(), Some(i))?
                    .with_completed_subtasks(last_completed[i], last_completed[1 - i]);
                joint_action[i] = player.predict(&PolicyContext {
                    layout: &layout,
                    state: self.sim.state(),
                    player_index: i,
                    observation: &observation,
                });

                let active = player.active_subtask();
                if active != selected[i] {
                    if let Some(subtask) = active {
                        self.observer.on_subtask_selected(i, subtask);
                    }
                    selected[i] = active;
                }
            }

            let (joint_action, stuck) = self.guard.filter(self.sim.state(), joint_action);
            if stuck {
                summary.stuck_ticks += 1;
                self.observer
                    .on_stuck_detected(&format!("tick {}: replaced with {:?}", self.sim.state().timestep, joint_action));
            }
            self.observer.on_action_selected(joint_action);

            let prev = self.sim.state().clone();
            let outcome = self.sim.step(joint_action);
            if let Some(recorder) = recorder.as_mut() {
                recorder.record(&prev, joint_action, outcome.reward)?;
            }

            let completed = completed_subtasks(&layout, &prev, self.sim.state())?;
            for (i, player) in players.iter_mut().enumerate() {
                player.observe_transition(&layout, &prev, self.sim.state());
                let done = completed.get(i).copied().flatten();
                if let Some(subtask) = done {
                    summary.subtasks_completed[i] += 1;
                    self.observer.on_subtask_completed(i, subtask);
                }
                last_completed[i] = done;
            }

            summary.score += outcome.reward;
            summary.ticks += 1;
            if outcome.reward > 0.0 {
                summary.soups_served += (outcome.reward / DELIVERY_REWARD).round() as u32;
            }
            self.observer
                .on_state_update(self.sim.state(), &layout, summary.score);

            if outcome.done {
                break;
            }
        }

        if let Some(recorder) = recorder {
            let path = recorder.finish()?;
            debug!("Episode {} written to {}", self.episode, path.display());
        }
        self.observer
            .on_episode_finished(self.episode, summary.score, summary.ticks);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{JointAction, load_trajectory};
    use crate::planners::heuristic::{ScriptedWorker, StayPolicy, ValueBasedManager, ValueManagerConfig};
    use crate::planners::hrl::HierarchicalAgent;
    use crate::state::GameState;

    /// Counts observer callbacks
    #[derive(Default)]
    struct Counting {
        started: usize,
        updates: usize,
        completed: usize,
        selected: usize,
        finished: Option<(usize, f32, u32)>,
    }

    /// Shares the counts with the test after the runner took ownership
    struct Shared(std::rc::Rc<std::cell::RefCell<Counting>>);

    impl GameObserver for Shared {
        fn on_episode_start(&mut self, _layout: &Layout, _episode: usize) {
            self.0.borrow_mut().started += 1;
        }

        fn on_state_update(&mut self, _state: &GameState, _layout: &Layout, _score: f32) {
            self.0.borrow_mut().updates += 1;
        }

        fn on_subtask_selected(&mut self, _player_index: usize, _subtask: Subtask) {
            self.0.borrow_mut().selected += 1;
        }

        fn on_subtask_completed(&mut self, _player_index: usize, _subtask: Subtask) {
            self.0.borrow_mut().completed += 1;
        }

        fn on_action_selected(&mut self, _joint_action: JointAction) {}

        fn on_stuck_detected(&mut self, _message: &str) {}

        fn on_episode_finished(&mut self, episode: usize, score: f32, ticks: u32) {
            self.0.borrow_mut().finished = Some((episode, score, ticks));
        }
    }

    fn hierarchical(player_index: usize) -> Box<dyn Policy> {
        let manager = ValueBasedManager::new(player_index, ValueManagerConfig::default());
        Box::new(HierarchicalAgent::new(manager, ScriptedWorker::new()))
    }

    fn seeded() -> RunnerConfig {
        RunnerConfig {
            seed: Some(7),
            ..RunnerConfig::default()
        }
    }

    #[test]
    fn test_idle_players_play_until_horizon() {
        let counts = std::rc::Rc::new(std::cell::RefCell::new(Counting::default()));
        let layout = Layout::from_name("cramped_room").unwrap();
        let mut runner = EpisodeRunner::from_layout(layout, 30, seeded(), Shared(counts.clone()));

        let mut players: [Box<dyn Policy>; 2] = [Box::new(StayPolicy), Box::new(StayPolicy)];
        let summary = runner.run_episode(&mut players).unwrap();

        assert_eq!(summary.ticks, 30);
        assert_eq!(summary.score, 0.0);
        assert_eq!(runner.episodes_played(), 1);

        let counts = counts.borrow();
        assert_eq!(counts.started, 1);
        assert_eq!(counts.updates, 30);
        assert_eq!(counts.selected, 0);
        assert_eq!(counts.finished, Some((1, 0.0, 30)));
    }

    #[test]
    fn test_hierarchical_agents_complete_subtasks() {
        let counts = std::rc::Rc::new(std::cell::RefCell::new(Counting::default()));
        let layout = Layout::from_name("cramped_room").unwrap();
        let mut runner = EpisodeRunner::from_layout(layout, 60, seeded(), Shared(counts.clone()));

        let mut players = [hierarchical(0), hierarchical(1)];
        let summary = runner.run_episode(&mut players).unwrap();

        // Both players fetch an onion and put it into the pot
        assert!(summary.subtasks_completed.iter().sum::<u32>() >= 3, "summary: {:?}", summary);
        assert_eq!(summary.score, summary.soups_served as f32 * DELIVERY_REWARD);

        let counts = counts.borrow();
        assert!(counts.selected >= 2);
        assert_eq!(counts.completed as u32, summary.subtasks_completed.iter().sum::<u32>());
    }

    #[test]
    fn test_records_trajectory() {
        let folder = std::env::temp_dir().join(format!("kitchen-hrl-runner-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&folder);

        let config = RunnerConfig {
            record_folder: Some(folder.clone()),
            ..seeded()
        };
        let layout = Layout::from_name("cramped_room").unwrap();
        let counts = std::rc::Rc::new(std::cell::RefCell::new(Counting::default()));
        let mut runner = EpisodeRunner::from_layout(layout, 12, config, Shared(counts));

        let mut players: [Box<dyn Policy>; 2] = [Box::new(StayPolicy), Box::new(StayPolicy)];
        runner.run_episode(&mut players).unwrap();

        let trajectory = load_trajectory(&folder.join("cramped_room.1.jsonl")).unwrap();
        assert_eq!(trajectory.rows.len(), 12);
        assert_eq!(trajectory.rows[0].timestep, 0);
        assert_eq!(trajectory.header.horizon, 12);

        std::fs::remove_dir_all(&folder).unwrap();
    }
}

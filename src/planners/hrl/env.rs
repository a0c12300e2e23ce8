//! Gym-like environments around a [`Simulator`]
//!
//! - [`KitchenEnv`]: one primitive action per step, for one player (the
//!   other is driven by a teammate policy) or for both.
//! - [`SubtaskEnv`]: a [`KitchenEnv`] whose episode ends with the first
//!   completed subtask, rewarding the assigned one.
//! - [`ManagerEnv`]: one subtask per step; a worker policy plays primitive
//!   actions until it interacts or the episode ends.

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, trace};

use crate::infra::{Action, JointAction};
use crate::state::{GameState, Kitchen, Layout, Simulator};
use crate::subtasks::{Subtask, SubtaskError, completed_subtasks, doable_subtasks};

use super::agent::{Policy, PolicyContext};
use super::encoder::{EncoderConfig, EncodingError, StateEncoder};
use super::observation::Observation;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("a teammate policy must be set unless both players are controlled")]
    MissingTeammate,

    #[error("environment must be reset before stepping")]
    NotReset,

    #[error("invalid action index {0}")]
    InvalidAction(usize),

    #[error("invalid subtask id {0}")]
    InvalidSubtask(usize),

    #[error("this environment controls both players, use step_joint")]
    BothPlayersControlled,

    #[error(transparent)]
    Subtask(#[from] SubtaskError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// Environment configuration
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub horizon: u32,
    pub encoder_config: EncoderConfig,
    /// Control both players; `step_joint` replaces `step`
    pub play_both_players: bool,
    /// Add completed-subtask entries to observations
    pub return_completed_subtasks: bool,
    /// Seed for player assignment and the stuck guard
    pub seed: Option<u64>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            horizon: 400,
            encoder_config: EncoderConfig::default(),
            play_both_players: false,
            return_completed_subtasks: false,
            seed: None,
        }
    }
}

impl EnvConfig {
    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    fn encoder(&self) -> StateEncoder {
        let mut encoder_config = self.encoder_config.clone();
        encoder_config.horizon = self.horizon;
        StateEncoder::new(encoder_config)
    }
}

/// Step result from the environment
#[derive(Debug, Clone)]
pub struct StepResult {
    pub observation: Observation,
    /// Team reward (summed over all ticks for the manager environment)
    pub reward: f32,
    pub done: bool,
    pub info: StepInfo,
}

/// Additional information from a step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInfo {
    pub sparse_reward_by_agent: [f32; 2],
    /// Latest subtask each player completed during the step
    pub completed_subtasks: [Option<Subtask>; 2],
    pub timestep: u32,
    /// Simulator ticks consumed by the step
    pub ticks: u32,
    /// Ticks on which the stuck guard replaced the joint action
    pub stuck_ticks: u32,
}

impl StepInfo {
    fn absorb(&mut self, sparse: [f32; 2], completed: &[Option<Subtask>]) {
        for i in 0..2 {
            self.sparse_reward_by_agent[i] += sparse[i];
            if let Some(Some(subtask)) = completed.get(i) {
                self.completed_subtasks[i] = Some(*subtask);
            }
        }
        self.ticks += 1;
    }
}

/// Breaks deadlocks: when the state did not change over the last tick and the
/// same joint action is about to be repeated, both players act randomly.
#[derive(Debug)]
pub struct StuckGuard {
    prev_state: Option<GameState>,
    prev_actions: Option<JointAction>,
    rng: StdRng,
}

impl StuckGuard {
    pub fn new(rng: StdRng) -> Self {
        Self {
            prev_state: None,
            prev_actions: None,
            rng,
        }
    }

    pub fn reset(&mut self) {
        self.prev_state = None;
        self.prev_actions = None;
    }

    /// Returns the joint action to play and whether it was replaced
    pub fn filter(&mut self, state: &GameState, joint_action: JointAction) -> (JointAction, bool) {
        let stuck = self
            .prev_state
            .as_ref()
            .is_some_and(|prev| state.time_independent_eq(prev))
            && self.prev_actions == Some(joint_action);

        let joint_action = if stuck {
            let random = [self.random_action(), self.random_action()];
            debug!("Stuck at tick {}, playing {:?} instead of {:?}", state.timestep, random, joint_action);
            random
        } else {
            joint_action
        };

        self.prev_state = Some(state.clone());
        self.prev_actions = Some(joint_action);
        (joint_action, stuck)
    }

    fn random_action(&mut self) -> Action {
        Action::ALL.choose(&mut self.rng).copied().unwrap_or(Action::Stay)
    }
}

/// Encode `state` for `player_index` and attach completed subtasks when asked.
/// `completed` is `None` on the first observation of an episode.
fn observe(
    encoder: &StateEncoder,
    layout: &Layout,
    state: &GameState,
    player_index: Option<usize>,
    completed: Option<&[Option<Subtask>]>,
    with_completed: bool,
) -> Result<Observation, EnvError> {
    let obs = encoder.encode(layout, state, player_index)?;
    if !with_completed {
        return Ok(obs);
    }

    let p = player_index.unwrap_or(0);
    Ok(match completed {
        None => obs.with_completed_subtasks(Some(Subtask::Unknown), Some(Subtask::Unknown)),
        Some(completed) => obs.with_completed_subtasks(
            completed.get(p).copied().flatten(),
            completed.get(1 - p).copied().flatten(),
        ),
    })
}

/// Low-level environment
pub struct KitchenEnv<S: Simulator = Kitchen> {
    sim: S,
    config: EnvConfig,
    encoder: StateEncoder,
    teammate: Option<Box<dyn Policy>>,
    guard: StuckGuard,
    rng: StdRng,
    p_idx: usize,
    /// Completed subtasks of the last tick, `None` right after reset
    last_completed: Option<Vec<Option<Subtask>>>,
    started: bool,
}

impl KitchenEnv<Kitchen> {
    pub fn from_layout(layout: Layout, config: EnvConfig) -> Self {
        let sim = Kitchen::new(layout, config.horizon);
        Self::new(sim, config)
    }
}

impl<S: Simulator> KitchenEnv<S> {
    pub fn new(sim: S, config: EnvConfig) -> Self {
        let encoder = config.encoder();
        let mut rng = config.rng();
        let guard = StuckGuard::new(StdRng::seed_from_u64(rng.random()));
        Self {
            sim,
            config,
            encoder,
            teammate: None,
            guard,
            rng,
            p_idx: 0,
            last_completed: None,
            started: false,
        }
    }

    pub fn set_teammate(&mut self, teammate: Box<dyn Policy>) {
        self.teammate = Some(teammate);
    }

    pub fn player_index(&self) -> usize {
        self.p_idx
    }

    pub fn teammate_index(&self) -> usize {
        1 - self.p_idx
    }

    pub fn state(&self) -> &GameState {
        self.sim.state()
    }

    pub fn layout(&self) -> &Layout {
        self.sim.layout()
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn action_count(&self) -> usize {
        Action::COUNT
    }

    pub fn reset(&mut self) -> Result<Observation, EnvError> {
        if !self.config.play_both_players {
            if self.teammate.is_none() {
                return Err(EnvError::MissingTeammate);
            }
            self.p_idx = self.rng.random_range(0..2);
        }

        self.sim.reset();
        self.guard.reset();
        self.last_completed = None;
        self.started = true;

        let t_idx = self.teammate_index();
        if let Some(teammate) = self.teammate.as_mut() {
            teammate.reset(t_idx);
        }
        debug!("Environment reset, controlling player {}", self.p_idx + 1);

        self.observation(self.controlled())
    }

    /// Observation for `player_index` (both players when `None`)
    pub fn observation(&self, player_index: Option<usize>) -> Result<Observation, EnvError> {
        observe(
            &self.encoder,
            self.sim.layout(),
            self.sim.state(),
            player_index,
            self.last_completed.as_deref(),
            self.config.return_completed_subtasks,
        )
    }

    /// Play `action` (an [`Action`] index) for the controlled player
    pub fn step(&mut self, action: usize) -> Result<StepResult, EnvError> {
        if self.config.play_both_players {
            return Err(EnvError::BothPlayersControlled);
        }
        let action = Action::from_index(action).ok_or(EnvError::InvalidAction(action))?;
        if !self.started {
            return Err(EnvError::NotReset);
        }

        let t_idx = self.teammate_index();
        let teammate_obs = self.observation(Some(t_idx))?;
        let teammate = self.teammate.as_mut().ok_or(EnvError::MissingTeammate)?;
        let ctx = PolicyContext {
            layout: self.sim.layout(),
            state: self.sim.state(),
            player_index: t_idx,
            observation: &teammate_obs,
        };
        let teammate_action = teammate.predict(&ctx);

        let mut joint_action = [Action::Stay; 2];
        joint_action[self.p_idx] = action;
        joint_action[t_idx] = teammate_action;
        self.advance(joint_action)
    }

    /// Play both players' actions (indices into [`Action::ALL`])
    pub fn step_joint(&mut self, actions: [usize; 2]) -> Result<StepResult, EnvError> {
        if !self.started {
            return Err(EnvError::NotReset);
        }
        let mut joint_action = [Action::Stay; 2];
        for (slot, &index) in joint_action.iter_mut().zip(&actions) {
            *slot = Action::from_index(index).ok_or(EnvError::InvalidAction(index))?;
        }
        self.advance(joint_action)
    }

    fn controlled(&self) -> Option<usize> {
        if self.config.play_both_players { None } else { Some(self.p_idx) }
    }

    fn advance(&mut self, joint_action: JointAction) -> Result<StepResult, EnvError> {
        let (joint_action, stuck) = self.guard.filter(self.sim.state(), joint_action);
        let prev = self.sim.state().clone();
        let outcome = self.sim.step(joint_action);
        let completed = completed_subtasks(self.sim.layout(), &prev, self.sim.state())?;
        if let Some(teammate) = self.teammate.as_mut() {
            teammate.observe_transition(self.sim.layout(), &prev, self.sim.state());
        }

        let mut info = StepInfo {
            timestep: self.sim.state().timestep,
            stuck_ticks: u32::from(stuck),
            ..StepInfo::default()
        };
        info.absorb(outcome.sparse_reward_by_agent, &completed);
        self.last_completed = Some(completed);

        Ok(StepResult {
            observation: self.observation(self.controlled())?,
            reward: outcome.reward,
            done: outcome.done,
            info,
        })
    }
}

/// Trains one worker skill: the episode ends when the controlled player
/// completes any subtask, with reward 1 if it was the assigned one.
pub struct SubtaskEnv<S: Simulator = Kitchen> {
    env: KitchenEnv<S>,
    subtask: Subtask,
}

impl<S: Simulator> SubtaskEnv<S> {
    pub fn new(sim: S, mut config: EnvConfig, subtask: Subtask) -> Self {
        config.play_both_players = false;
        config.return_completed_subtasks = true;
        Self {
            env: KitchenEnv::new(sim, config),
            subtask,
        }
    }

    pub fn set_teammate(&mut self, teammate: Box<dyn Policy>) {
        self.env.set_teammate(teammate);
    }

    pub fn subtask(&self) -> Subtask {
        self.subtask
    }

    pub fn inner(&self) -> &KitchenEnv<S> {
        &self.env
    }

    pub fn reset(&mut self) -> Result<Observation, EnvError> {
        Ok(self.env.reset()?.with_subtask(self.subtask))
    }

    /// A completion is credited even on ticks where the stuck guard replaced
    /// `action`; `info.stuck_ticks` is 1 on those ticks.
    pub fn step(&mut self, action: usize) -> Result<StepResult, EnvError> {
        let mut result = self.env.step(action)?;
        let p_idx = self.env.player_index();

        result.reward = 0.0;
        if let Some(completed) = result.info.completed_subtasks[p_idx] {
            result.done = true;
            if completed == self.subtask {
                result.reward = 1.0;
            }
            trace!("Worker completed {} while assigned {}", completed, self.subtask);
        }
        result.observation = result.observation.with_subtask(self.subtask);
        Ok(result)
    }
}

/// Manager-level environment: actions are subtask ids
pub struct ManagerEnv<S: Simulator = Kitchen> {
    sim: S,
    config: EnvConfig,
    encoder: StateEncoder,
    worker: Box<dyn Policy>,
    teammate: Option<Box<dyn Policy>>,
    guard: StuckGuard,
    rng: StdRng,
    p_idx: usize,
    curr_subtask: Subtask,
    last_completed: Option<Vec<Option<Subtask>>>,
    started: bool,
}

impl ManagerEnv<Kitchen> {
    pub fn from_layout(layout: Layout, worker: Box<dyn Policy>, config: EnvConfig) -> Self {
        let sim = Kitchen::new(layout, config.horizon);
        Self::new(sim, worker, config)
    }
}

impl<S: Simulator> ManagerEnv<S> {
    pub const ACTION_COUNT: usize = Subtask::COUNT;

    pub fn new(sim: S, worker: Box<dyn Policy>, mut config: EnvConfig) -> Self {
        config.play_both_players = false;
        config.return_completed_subtasks = true;
        let encoder = config.encoder();
        let mut rng = config.rng();
        let guard = StuckGuard::new(StdRng::seed_from_u64(rng.random()));
        Self {
            sim,
            config,
            encoder,
            worker,
            teammate: None,
            guard,
            rng,
            p_idx: 0,
            curr_subtask: Subtask::GetOnionFromDispenser,
            last_completed: None,
            started: false,
        }
    }

    pub fn set_teammate(&mut self, teammate: Box<dyn Policy>) {
        self.teammate = Some(teammate);
    }

    pub fn player_index(&self) -> usize {
        self.p_idx
    }

    pub fn teammate_index(&self) -> usize {
        1 - self.p_idx
    }

    pub fn current_subtask(&self) -> Subtask {
        self.curr_subtask
    }

    pub fn state(&self) -> &GameState {
        self.sim.state()
    }

    pub fn layout(&self) -> &Layout {
        self.sim.layout()
    }

    /// Feasible subtasks for the controlled player as 0/1 floats
    pub fn action_mask(&self) -> Vec<f32> {
        doable_subtasks(self.sim.state(), self.sim.layout(), self.p_idx).mask_as_floats()
    }

    pub fn reset(&mut self) -> Result<Observation, EnvError> {
        if self.teammate.is_none() {
            return Err(EnvError::MissingTeammate);
        }

        self.sim.reset();
        self.guard.reset();
        self.last_completed = None;
        self.p_idx = self.rng.random_range(0..2);
        self.curr_subtask = Subtask::GetOnionFromDispenser;
        self.started = true;

        let (p_idx, t_idx) = (self.p_idx, self.teammate_index());
        self.worker.reset(p_idx);
        if let Some(teammate) = self.teammate.as_mut() {
            teammate.reset(t_idx);
        }
        debug!("Manager environment reset, controlling player {}", p_idx + 1);

        self.observation()
    }

    pub fn observation(&self) -> Result<Observation, EnvError> {
        observe(
            &self.encoder,
            self.sim.layout(),
            self.sim.state(),
            Some(self.p_idx),
            self.last_completed.as_deref(),
            true,
        )
    }

    /// Hand `subtask_id` to the worker and play until it interacts or the
    /// episode ends. The reward is summed over every tick played.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn step(&mut self, subtask_id: usize) -> Result<StepResult, EnvError> {
        if !self.started {
            return Err(EnvError::NotReset);
        }
        self.curr_subtask = Subtask::from_id(subtask_id).ok_or(EnvError::InvalidSubtask(subtask_id))?;
        let (p_idx, t_idx) = (self.p_idx, self.teammate_index());

        let mut joint_action = [Action::Stay; 2];
        let mut reward = 0.0;
        let mut done = self.sim.is_done();
        let mut info = StepInfo::default();
        let mut completed_this_step = vec![None; 2];

        while joint_action[p_idx] != Action::Interact && !done {
            let worker_obs = self.low_level_observation(p_idx)?.with_subtask(self.curr_subtask);
            let teammate_obs = self.low_level_observation(t_idx)?;
            let teammate = self.teammate.as_mut().ok_or(EnvError::MissingTeammate)?;

            let layout = self.sim.layout();
            let state = self.sim.state();
            joint_action[p_idx] = self.worker.predict(&PolicyContext {
                layout,
                state,
                player_index: p_idx,
                observation: &worker_obs,
            });
            joint_action[t_idx] = teammate.predict(&PolicyContext {
                layout,
                state,
                player_index: t_idx,
                observation: &teammate_obs,
            });

            let (filtered, stuck) = self.guard.filter(self.sim.state(), joint_action);
            joint_action = filtered;
            info.stuck_ticks += u32::from(stuck);

            let prev = self.sim.state().clone();
            let outcome = self.sim.step(joint_action);
            let completed = completed_subtasks(self.sim.layout(), &prev, self.sim.state())?;
            self.worker.observe_transition(self.sim.layout(), &prev, self.sim.state());
            if let Some(teammate) = self.teammate.as_mut() {
                teammate.observe_transition(self.sim.layout(), &prev, self.sim.state());
            }
            for (slot, subtask) in completed_this_step.iter_mut().zip(&completed) {
                if subtask.is_some() {
                    *slot = *subtask;
                }
            }
            info.absorb(outcome.sparse_reward_by_agent, &completed);

            reward += outcome.reward;
            done = outcome.done;
        }

        info.timestep = self.sim.state().timestep;
        if info.ticks > 0 {
            self.last_completed = Some(completed_this_step);
        }

        Ok(StepResult {
            observation: self.observation()?,
            reward,
            done,
            info,
        })
    }

    /// Observation for a low-level policy, without completed subtasks
    fn low_level_observation(&self, player_index: usize) -> Result<Observation, EnvError> {
        Ok(self.encoder.encode(self.sim.layout(), self.sim.state(), Some(player_index))?)
    }
}

//! Manager/worker composition
//!
//! ```text
//!   Observation ──► HierarchicalAgent
//!                      │  completed a subtask?
//!                      ├──── yes ──► Manager::select_subtask ──► curr_subtask
//!                      ▼
//!                   SubtaskWorker ──► policy for curr_subtask ──► Action
//! ```

use std::collections::HashMap;

use crate::infra::Action;
use crate::state::{GameState, Layout};
use crate::subtasks::Subtask;

use super::observation::Observation;

/// Everything a policy may look at when choosing an action
pub struct PolicyContext<'a> {
    pub layout: &'a Layout,
    pub state: &'a GameState,
    pub player_index: usize,
    pub observation: &'a Observation,
}

/// Low-level policy emitting primitive actions
pub trait Policy {
    fn name(&self) -> &str;

    fn predict(&mut self, ctx: &PolicyContext) -> Action;

    /// Called at the start of every episode
    fn reset(&mut self, _player_index: usize) {}

    /// Called once per tick with the transition the simulator just made
    fn observe_transition(&mut self, _layout: &Layout, _prev: &GameState, _curr: &GameState) {}

    /// Subtask the policy is working on, if it has one
    fn active_subtask(&self) -> Option<Subtask> {
        None
    }
}

/// High-level policy choosing which subtask the worker executes next
pub trait Manager {
    fn name(&self) -> &str;

    /// Update internal bookkeeping with the transition of one tick
    fn observe_transition(&mut self, _layout: &Layout, _prev: &GameState, _curr: &GameState) {}

    fn select_subtask(&mut self, ctx: &PolicyContext) -> Subtask;

    fn reset(&mut self, player_index: usize);
}

impl<P: Policy + ?Sized> Policy for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn predict(&mut self, ctx: &PolicyContext) -> Action {
        (**self).predict(ctx)
    }

    fn reset(&mut self, player_index: usize) {
        (**self).reset(player_index)
    }

    fn observe_transition(&mut self, layout: &Layout, prev: &GameState, curr: &GameState) {
        (**self).observe_transition(layout, prev, curr)
    }

    fn active_subtask(&self) -> Option<Subtask> {
        (**self).active_subtask()
    }
}

/// How often each player completed each subtask in the current episode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtaskCounts {
    counts: [[u32; Subtask::COUNT]; 2],
}

impl Default for SubtaskCounts {
    fn default() -> Self {
        Self {
            counts: [[0; Subtask::COUNT]; 2],
        }
    }
}

impl SubtaskCounts {
    /// Both players reporting `Unknown` marks a fresh episode and clears the counts
    pub fn update(&mut self, completed: [Option<Subtask>; 2]) {
        if completed == [Some(Subtask::Unknown), Some(Subtask::Unknown)] {
            self.clear();
        }
        for (player, subtask) in completed.iter().enumerate() {
            if let Some(subtask) = subtask {
                self.counts[player][subtask.id()] += 1;
            }
        }
    }

    pub fn clear(&mut self) {
        self.counts = [[0; Subtask::COUNT]; 2];
    }

    pub fn get(&self, player_index: usize, subtask: Subtask) -> u32 {
        self.counts
            .get(player_index)
            .map_or(0, |row| row[subtask.id()])
    }

    pub fn player(&self, player_index: usize) -> Option<&[u32; Subtask::COUNT]> {
        self.counts.get(player_index)
    }

    pub fn total(&self, player_index: usize) -> u32 {
        self.player(player_index).map_or(0, |row| row.iter().sum())
    }
}

/// One low-level policy per subtask, dispatched on `curr_subtask`
pub struct SubtaskWorker {
    policies: HashMap<Subtask, Box<dyn Policy>>,
    fallback: Box<dyn Policy>,
}

impl SubtaskWorker {
    /// `fallback` plays subtasks without a dedicated policy
    pub fn new(fallback: Box<dyn Policy>) -> Self {
        Self {
            policies: HashMap::new(),
            fallback,
        }
    }

    pub fn with_policy(mut self, subtask: Subtask, policy: Box<dyn Policy>) -> Self {
        self.policies.insert(subtask, policy);
        self
    }

    pub fn has_policy(&self, subtask: Subtask) -> bool {
        self.policies.contains_key(&subtask)
    }
}

impl Policy for SubtaskWorker {
    fn name(&self) -> &str {
        "multi_agent_subtask_worker"
    }

    fn predict(&mut self, ctx: &PolicyContext) -> Action {
        let policy = match ctx.observation.curr_subtask {
            Some(subtask) => self.policies.get_mut(&subtask).unwrap_or(&mut self.fallback),
            None => &mut self.fallback,
        };
        policy.predict(ctx)
    }

    fn reset(&mut self, player_index: usize) {
        for policy in self.policies.values_mut() {
            policy.reset(player_index);
        }
        self.fallback.reset(player_index);
    }
}

/// Pairs a manager with a worker. The manager is consulted whenever the
/// player completed a subtask (or at episode start), the worker every tick.
pub struct HierarchicalAgent<M: Manager, W: Policy> {
    manager: M,
    worker: W,
    curr_subtask: Subtask,
    counts: SubtaskCounts,
    name: String,
}

impl<M: Manager, W: Policy> HierarchicalAgent<M, W> {
    pub fn new(manager: M, worker: W) -> Self {
        let name = format!("hierarchical_{}", manager.name());
        Self {
            manager,
            worker,
            curr_subtask: Subtask::Unknown,
            counts: SubtaskCounts::default(),
            name,
        }
    }

    pub fn current_subtask(&self) -> Subtask {
        self.curr_subtask
    }

    pub fn subtask_counts(&self) -> &SubtaskCounts {
        &self.counts
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut M {
        &mut self.manager
    }
}

impl<M: Manager, W: Policy> Policy for HierarchicalAgent<M, W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&mut self, ctx: &PolicyContext) -> Action {
        let obs = ctx.observation;
        self.counts
            .update([obs.player_completed_subtasks, obs.teammate_completed_subtasks]);

        if obs.player_completed_subtasks.is_some() {
            self.curr_subtask = self.manager.select_subtask(ctx);
        }

        let worker_obs = obs.clone().with_subtask(self.curr_subtask);
        let worker_ctx = PolicyContext {
            observation: &worker_obs,
            ..*ctx
        };
        self.worker.predict(&worker_ctx)
    }

    fn observe_transition(&mut self, layout: &Layout, prev: &GameState, curr: &GameState) {
        self.manager.observe_transition(layout, prev, curr);
    }

    fn active_subtask(&self) -> Option<Subtask> {
        match self.curr_subtask {
            Subtask::Unknown => None,
            subtask => Some(subtask),
        }
    }

    fn reset(&mut self, player_index: usize) {
        self.manager.reset(player_index);
        self.worker.reset(player_index);
        self.curr_subtask = Subtask::Unknown;
        self.counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Action);

    impl Policy for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn predict(&mut self, _ctx: &PolicyContext) -> Action {
            self.0
        }
    }

    /// Walks through a fixed list of subtasks
    struct Scripted {
        plan: Vec<Subtask>,
        calls: usize,
    }

    impl Manager for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn select_subtask(&mut self, _ctx: &PolicyContext) -> Subtask {
            let subtask = self.plan[self.calls % self.plan.len()];
            self.calls += 1;
            subtask
        }

        fn reset(&mut self, _player_index: usize) {
            self.calls = 0;
        }
    }

    fn with_ctx<R>(obs: &Observation, f: impl FnOnce(&PolicyContext) -> R) -> R {
        let layout = Layout::from_name("cramped_room").unwrap();
        let state = GameState::initial(&layout);
        let ctx = PolicyContext {
            layout: &layout,
            state: &state,
            player_index: 0,
            observation: obs,
        };
        f(&ctx)
    }

    #[test]
    fn test_counts_cleared_on_episode_start() {
        let mut counts = SubtaskCounts::default();
        counts.update([Some(Subtask::ServeSoup), None]);
        counts.update([Some(Subtask::ServeSoup), Some(Subtask::GetSoup)]);
        assert_eq!(counts.get(0, Subtask::ServeSoup), 2);
        assert_eq!(counts.get(1, Subtask::GetSoup), 1);

        counts.update([Some(Subtask::Unknown), Some(Subtask::Unknown)]);
        assert_eq!(counts.total(0), 1);
        assert_eq!(counts.get(0, Subtask::Unknown), 1);
        assert_eq!(counts.get(0, Subtask::ServeSoup), 0);
    }

    #[test]
    fn test_worker_dispatches_on_subtask() {
        let mut worker = SubtaskWorker::new(Box::new(Fixed(Action::Stay)))
            .with_policy(Subtask::ServeSoup, Box::new(Fixed(Action::Interact)));
        assert!(worker.has_policy(Subtask::ServeSoup));

        let serve = Observation::default().with_subtask(Subtask::ServeSoup);
        assert_eq!(with_ctx(&serve, |ctx| worker.predict(ctx)), Action::Interact);

        let other = Observation::default().with_subtask(Subtask::GetSoup);
        assert_eq!(with_ctx(&other, |ctx| worker.predict(ctx)), Action::Stay);
    }

    #[test]
    fn test_manager_consulted_only_after_completion() {
        let manager = Scripted {
            plan: vec![Subtask::ServeSoup, Subtask::GetSoup],
            calls: 0,
        };
        let worker = SubtaskWorker::new(Box::new(Fixed(Action::Stay)))
            .with_policy(Subtask::ServeSoup, Box::new(Fixed(Action::Interact)));
        let mut agent = HierarchicalAgent::new(manager, worker);
        assert_eq!(agent.name(), "hierarchical_scripted");

        let start = Observation::default().with_completed_subtasks(Some(Subtask::Unknown), Some(Subtask::Unknown));
        assert_eq!(with_ctx(&start, |ctx| agent.predict(ctx)), Action::Interact);
        assert_eq!(agent.current_subtask(), Subtask::ServeSoup);

        let nothing = Observation::default();
        with_ctx(&nothing, |ctx| agent.predict(ctx));
        assert_eq!(agent.current_subtask(), Subtask::ServeSoup);

        let done = Observation::default().with_completed_subtasks(Some(Subtask::ServeSoup), None);
        assert_eq!(with_ctx(&done, |ctx| agent.predict(ctx)), Action::Stay);
        assert_eq!(agent.current_subtask(), Subtask::GetSoup);
        assert_eq!(agent.subtask_counts().get(0, Subtask::ServeSoup), 1);

        agent.reset(1);
        assert_eq!(agent.current_subtask(), Subtask::Unknown);
        assert_eq!(agent.subtask_counts().total(0), 0);
    }
}

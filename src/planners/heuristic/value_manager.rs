//! Rule-based manager scoring every subtask with a hand-tuned value.
//!
//! 1. Independent subtasks keep a constant value.
//! 2. Supportive subtasks (leaving an item on a counter)
//!    a) start at zero,
//!    b) creep up every tick,
//!    c) jump when the teammate picks up an item this player left,
//!    d) decay while such an item waits past the grace period.
//! 3. Complementary subtasks (taking an item off a counter)
//!    a) start at zero,
//!    b) grow while an item left by the teammate waits on a counter,
//!    c) drop to zero once no tracked item of that kind remains.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::planners::hrl::{Manager, PolicyContext};
use crate::state::{GameState, Layout, ObjectId, ObjectKind, Terrain, WorldObject};
use crate::subtasks::{Subtask, SubtaskCategory, SubtaskMask, doable_subtasks};

#[derive(Debug, Clone)]
pub struct ValueManagerConfig {
    /// Ticks an item may wait on a counter before its supportive value decays
    pub acceptable_wait_time: u32,
    pub sup_base_inc: f32,
    pub sup_success_inc: f32,
    pub sup_waiting_dec: f32,
    pub com_waiting_inc: f32,
    pub independent_value: f32,
    pub max_value: f32,
}

impl Default for ValueManagerConfig {
    fn default() -> Self {
        Self {
            acceptable_wait_time: 10,
            sup_base_inc: 0.05,
            sup_success_inc: 1.0,
            sup_waiting_dec: 0.1,
            com_waiting_inc: 0.2,
            independent_value: 1.0,
            max_value: 10.0,
        }
    }
}

/// One score per subtask id, kept within `[0, max_value]`
#[derive(Debug, Clone, PartialEq)]
pub struct SubtaskValueTable {
    values: [f32; Subtask::COUNT],
}

impl SubtaskValueTable {
    pub fn new(independent_value: f32) -> Self {
        let mut values = [0.0; Subtask::COUNT];
        for subtask in Subtask::ALL {
            if subtask.category() == SubtaskCategory::Independent {
                values[subtask.id()] = independent_value;
            }
        }
        Self { values }
    }

    pub fn get(&self, subtask: Subtask) -> f32 {
        self.values[subtask.id()]
    }

    pub fn set(&mut self, subtask: Subtask, value: f32) {
        self.values[subtask.id()] = value;
    }

    pub fn add(&mut self, subtask: Subtask, delta: f32) {
        self.values[subtask.id()] += delta;
    }

    pub fn clamp(&mut self, max_value: f32) {
        for value in &mut self.values {
            *value = value.clamp(0.0, max_value);
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Values with infeasible subtasks zeroed
    pub fn masked(&self, mask: &SubtaskMask) -> [f32; Subtask::COUNT] {
        let mut masked = self.values;
        for (value, &doable) in masked.iter_mut().zip(mask.as_slice()) {
            if !doable {
                *value = 0.0;
            }
        }
        masked
    }

    /// Highest-valued feasible subtask, ties going to the lowest id.
    /// `None` when nothing is feasible.
    pub fn best(&self, mask: &SubtaskMask) -> Option<Subtask> {
        let mut best: Option<(Subtask, f32)> = None;
        for subtask in mask.iter_doable() {
            let value = self.get(subtask);
            if best.is_none_or(|(_, v)| value > v) {
                best = Some((subtask, value));
            }
        }
        best.map(|(subtask, _)| subtask)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TrackedObject {
    kind: ObjectKind,
    ticks_waiting: u32,
}

pub struct ValueBasedManager {
    config: ValueManagerConfig,
    player_index: usize,
    values: SubtaskValueTable,
    /// Items this player left on counters
    agent_objects: BTreeMap<ObjectId, TrackedObject>,
    /// Items the teammate left on counters
    teammate_objects: BTreeMap<ObjectId, TrackedObject>,
    curr_subtask: Subtask,
}

impl ValueBasedManager {
    pub fn new(player_index: usize, config: ValueManagerConfig) -> Self {
        let values = SubtaskValueTable::new(config.independent_value);
        Self {
            config,
            player_index,
            values,
            agent_objects: BTreeMap::new(),
            teammate_objects: BTreeMap::new(),
            curr_subtask: Subtask::Unknown,
        }
    }

    pub fn player_index(&self) -> usize {
        self.player_index
    }

    pub fn teammate_index(&self) -> usize {
        1 - self.player_index
    }

    pub fn values(&self) -> &SubtaskValueTable {
        &self.values
    }

    pub fn current_subtask(&self) -> Subtask {
        self.curr_subtask
    }

    #[tracing::instrument(level = "trace", skip_all, fields(player = self.player_index, tick = curr.timestep))]
    pub fn update_subtask_values(&mut self, layout: &Layout, prev: &GameState, curr: &GameState) {
        let (Some(agent_prev), Some(mate_prev), Some(agent_curr), Some(mate_curr)) = (
            prev.players.get(self.player_index),
            prev.players.get(self.teammate_index()),
            curr.players.get(self.player_index),
            curr.players.get(self.teammate_index()),
        ) else {
            return;
        };
        let held_id = |obj: &Option<WorldObject>| obj.as_ref().map(|o| o.id);

        for subtask in Subtask::ALL {
            if subtask.category() == SubtaskCategory::Supportive {
                self.values.add(subtask, self.config.sup_base_inc);
            }
        }

        // Items on counters now: new placements and items still waiting
        for obj in curr.objects().filter(|obj| !in_pot(layout, obj)) {
            if prev.find_object(obj.id).is_none() {
                if held_id(&agent_prev.held_object) == Some(obj.id) {
                    debug!("Agent placed {} at {:?}", obj.kind, obj.position);
                    self.agent_objects.insert(obj.id, TrackedObject::new(obj.kind));
                } else if held_id(&mate_prev.held_object) == Some(obj.id) {
                    debug!("Teammate placed {} at {:?}", obj.kind, obj.position);
                    self.teammate_objects.insert(obj.id, TrackedObject::new(obj.kind));
                }
            } else if let Some(tracked) = self.agent_objects.get_mut(&obj.id) {
                tracked.ticks_waiting += 1;
                if tracked.ticks_waiting > self.config.acceptable_wait_time {
                    self.values
                        .add(Subtask::supportive_for(obj.kind), -self.config.sup_waiting_dec);
                }
            } else if let Some(tracked) = self.teammate_objects.get_mut(&obj.id) {
                tracked.ticks_waiting += 1;
                self.values
                    .add(Subtask::complementary_for(obj.kind), self.config.com_waiting_inc);
            }
        }

        // Items that left a counter this tick
        for obj in prev.objects().filter(|obj| !in_pot(layout, obj)) {
            if curr.find_object(obj.id).is_some() {
                continue;
            }

            if held_id(&agent_curr.held_object) == Some(obj.id) {
                debug!("Agent picked up {} from {:?}", obj.kind, obj.position);
                if self.agent_objects.remove(&obj.id).is_none() {
                    self.teammate_objects.remove(&obj.id);
                }
            } else if held_id(&mate_curr.held_object) == Some(obj.id) {
                debug!("Teammate picked up {} from {:?}", obj.kind, obj.position);
                if self.agent_objects.remove(&obj.id).is_some() {
                    self.values
                        .add(Subtask::supportive_for(obj.kind), self.config.sup_success_inc);
                } else {
                    self.teammate_objects.remove(&obj.id);
                }
            }

            let kind_remains = self
                .agent_objects
                .values()
                .chain(self.teammate_objects.values())
                .any(|tracked| tracked.kind == obj.kind);
            if !kind_remains {
                self.values.set(Subtask::complementary_for(obj.kind), 0.0);
            }
        }

        self.values.clamp(self.config.max_value);
    }

    /// Values of the subtasks feasible in `state`, infeasible ones zeroed
    pub fn subtask_values(&self, layout: &Layout, state: &GameState) -> [f32; Subtask::COUNT] {
        self.values
            .masked(&doable_subtasks(state, layout, self.player_index))
    }

    /// Falls back to `Unknown` when no subtask is feasible
    pub fn select_next_subtask(&mut self, layout: &Layout, state: &GameState) -> Subtask {
        let mask = doable_subtasks(state, layout, self.player_index);
        self.curr_subtask = self.values.best(&mask).unwrap_or(Subtask::Unknown);
        info!("Player {} new subtask {}", self.player_index + 1, self.curr_subtask);
        self.curr_subtask
    }

    fn init_subtask_values(&mut self) {
        self.values = SubtaskValueTable::new(self.config.independent_value);
        self.agent_objects.clear();
        self.teammate_objects.clear();
        self.curr_subtask = Subtask::Unknown;
    }
}

impl TrackedObject {
    fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            ticks_waiting: 0,
        }
    }
}

/// Soups in pots change without anyone acting on them
fn in_pot(layout: &Layout, obj: &WorldObject) -> bool {
    obj.kind == ObjectKind::Soup && layout.tile(&obj.position) == Some(Terrain::Pot)
}

impl Manager for ValueBasedManager {
    fn name(&self) -> &str {
        "value_based_subtask_adaptor"
    }

    fn observe_transition(&mut self, layout: &Layout, prev: &GameState, curr: &GameState) {
        self.update_subtask_values(layout, prev, curr);
    }

    fn select_subtask(&mut self, ctx: &PolicyContext) -> Subtask {
        self.select_next_subtask(ctx.layout, ctx.state)
    }

    fn reset(&mut self, player_index: usize) {
        self.player_index = player_index;
        self.init_subtask_values();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{Action, JointAction, Position};
    use crate::state::{Kitchen, Simulator};

    /// Steps the kitchen and feeds the transition to every manager
    fn step(kitchen: &mut Kitchen, managers: &mut [&mut ValueBasedManager], joint_action: JointAction) {
        let prev = kitchen.state().clone();
        kitchen.step(joint_action);
        for manager in managers.iter_mut() {
            manager.update_subtask_values(kitchen.layout(), &prev, kitchen.state());
        }
    }

    /// Player 2 fetches an onion and leaves it on the shared counter at (2, 2)
    fn hand_over_onion(kitchen: &mut Kitchen, managers: &mut [&mut ValueBasedManager]) {
        step(kitchen, managers, [Action::Stay, Action::West]);
        step(kitchen, managers, [Action::Stay, Action::Interact]);
        step(kitchen, managers, [Action::Stay, Action::East]);
        step(kitchen, managers, [Action::Stay, Action::Interact]);
        assert!(kitchen.state().has_object_at(&Position::new(2, 2)));
    }

    fn kitchen() -> Kitchen {
        Kitchen::new(Layout::from_name("forced_coordination").unwrap(), 400)
    }

    #[test]
    fn test_initial_values() {
        let manager = ValueBasedManager::new(0, ValueManagerConfig::default());
        for subtask in Subtask::ALL {
            let expected = match subtask.category() {
                SubtaskCategory::Independent => 1.0,
                _ => 0.0,
            };
            assert_eq!(manager.values().get(subtask), expected, "{subtask}");
        }
    }

    #[test]
    fn test_best_prefers_first_on_ties() {
        let table = SubtaskValueTable::new(1.0);
        let mut mask = SubtaskMask::none();
        mask.set(Subtask::GetPlateFromDishRack);
        mask.set(Subtask::GetOnionFromDispenser);
        assert_eq!(table.best(&mask), Some(Subtask::GetOnionFromDispenser));
        assert_eq!(table.best(&SubtaskMask::none()), None);

        // A zero-valued but feasible subtask still beats nothing
        let mut mask = SubtaskMask::none();
        mask.set(Subtask::PutOnionCloser);
        assert_eq!(table.best(&mask), Some(Subtask::PutOnionCloser));
    }

    #[test]
    fn test_unclaimed_item_decays_supportive_value() {
        let mut kitchen = kitchen();
        let mut placer = ValueBasedManager::new(1, ValueManagerConfig::default());
        hand_over_onion(&mut kitchen, &mut [&mut placer]);
        assert_eq!(placer.agent_objects.len(), 1);

        let config = ValueManagerConfig::default();
        for _ in 0..config.acceptable_wait_time {
            step(&mut kitchen, &mut [&mut placer], [Action::Stay, Action::Stay]);
        }

        let mut previous = placer.values().get(Subtask::PutOnionCloser);
        for _ in 0..5 {
            step(&mut kitchen, &mut [&mut placer], [Action::Stay, Action::Stay]);
            let value = placer.values().get(Subtask::PutOnionCloser);
            assert!(value < previous, "{value} should be below {previous}");
            previous = value;
        }
    }

    #[test]
    fn test_handoff_rewards_supporter_and_resets_complement() {
        let mut kitchen = kitchen();
        let mut placer = ValueBasedManager::new(1, ValueManagerConfig::default());
        let mut receiver = ValueBasedManager::new(0, ValueManagerConfig::default());
        hand_over_onion(&mut kitchen, &mut [&mut placer, &mut receiver]);
        assert_eq!(receiver.teammate_objects.len(), 1);

        // Player 1 walks next to the counter while the onion waits
        step(&mut kitchen, &mut [&mut placer, &mut receiver], [Action::South, Action::Stay]);
        step(&mut kitchen, &mut [&mut placer, &mut receiver], [Action::West, Action::Stay]);
        let waiting = receiver.values().get(Subtask::GetOnionFromCounter);
        assert!((waiting - 0.4).abs() < 1e-5, "{waiting}");

        let before = placer.values().get(Subtask::PutOnionCloser);
        step(&mut kitchen, &mut [&mut placer, &mut receiver], [Action::Interact, Action::Stay]);
        assert_eq!(kitchen.state().players[0].held_kind(), Some(ObjectKind::Onion));

        let after = placer.values().get(Subtask::PutOnionCloser);
        let expected = before + 0.05 + 1.0;
        assert!((after - expected).abs() < 1e-5, "{after} != {expected}");
        assert!(placer.agent_objects.is_empty());
        assert!(receiver.teammate_objects.is_empty());
        assert_eq!(receiver.values().get(Subtask::GetOnionFromCounter), 0.0);
    }

    #[test]
    fn test_values_stay_bounded() {
        let mut kitchen = kitchen();
        let mut placer = ValueBasedManager::new(1, ValueManagerConfig::default());
        let mut receiver = ValueBasedManager::new(0, ValueManagerConfig::default());
        hand_over_onion(&mut kitchen, &mut [&mut placer, &mut receiver]);

        for _ in 0..300 {
            step(&mut kitchen, &mut [&mut placer, &mut receiver], [Action::Stay, Action::Stay]);
            for manager in [&placer, &receiver] {
                assert!(manager.values().as_slice().iter().all(|v| (0.0..=10.0).contains(v)));
            }
        }
        assert_eq!(receiver.values().get(Subtask::GetOnionFromCounter), 10.0);
        assert_eq!(placer.values().get(Subtask::PutOnionCloser), 0.0);
    }

    #[test]
    fn test_selection_respects_feasibility_and_reset() {
        let layout = Layout::from_name("forced_coordination").unwrap();
        let mut state = GameState::initial(&layout);
        let mut manager = ValueBasedManager::new(0, ValueManagerConfig::default());

        assert_eq!(manager.select_next_subtask(&layout, &state), Subtask::GetOnionFromDispenser);

        let onion = state.spawn(ObjectKind::Onion, Position::new(3, 1));
        state.players[0].held_object = Some(onion);
        assert_eq!(manager.select_next_subtask(&layout, &state), Subtask::PutOnionInPot);
        let values = manager.subtask_values(&layout, &state);
        assert_eq!(values[Subtask::GetOnionFromDispenser.id()], 0.0);

        manager.values.set(Subtask::PutOnionCloser, 5.0);
        assert_eq!(manager.select_next_subtask(&layout, &state), Subtask::PutOnionCloser);

        manager.reset(1);
        assert_eq!(manager.player_index(), 1);
        assert_eq!(manager.values().get(Subtask::PutOnionCloser), 0.0);
        assert_eq!(manager.current_subtask(), Subtask::Unknown);
    }
}

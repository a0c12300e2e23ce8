use serde::{Deserialize, Serialize};

use crate::subtasks::Subtask;

/// Dense row-major tensor of `f32`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObsTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl ObsTensor {
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            data: vec![0.0; shape.iter().product()],
        }
    }

    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> Option<Self> {
        if shape.iter().product::<usize>() != data.len() {
            return None;
        }
        Some(Self {
            shape: shape.to_vec(),
            data,
        })
    }

    /// Empty tensor for schemes that do not produce a component
    pub fn empty() -> Self {
        Self::zeros(&[0])
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn offset(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0;
        for (&i, &dim) in index.iter().zip(&self.shape) {
            if i >= dim {
                return None;
            }
            offset = offset * dim + i;
        }
        Some(offset)
    }

    pub fn get(&self, index: &[usize]) -> Option<f32> {
        self.offset(index).map(|o| self.data[o])
    }

    /// Writes are silently dropped outside the tensor
    pub fn set(&mut self, index: &[usize], value: f32) {
        if let Some(o) = self.offset(index) {
            self.data[o] = value;
        }
    }

    /// Sub-tensor along the first axis
    pub fn slice(&self, i: usize) -> Option<ObsTensor> {
        let (&first, rest) = self.shape.split_first()?;
        if i >= first {
            return None;
        }
        let stride: usize = rest.iter().product();
        Some(Self {
            shape: rest.to_vec(),
            data: self.data[i * stride..(i + 1) * stride].to_vec(),
        })
    }

    /// Stack equally shaped tensors along a new first axis
    pub fn stack(tensors: &[ObsTensor]) -> Option<ObsTensor> {
        let first = tensors.first()?;
        if tensors.iter().any(|t| t.shape != first.shape) {
            return None;
        }
        let mut shape = vec![tensors.len()];
        shape.extend_from_slice(&first.shape);
        Some(Self {
            shape,
            data: tensors.iter().flat_map(|t| t.data.iter().copied()).collect(),
        })
    }
}

/// What a policy sees for one player (or both, when no player index is given)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Observation {
    pub visual_obs: ObsTensor,
    pub agent_obs: ObsTensor,
    /// Subtask the worker is executing, set for workers only
    pub curr_subtask: Option<Subtask>,
    /// `Some(Unknown)` on the first observation of an episode, `None` when
    /// nothing was completed since the previous observation
    pub player_completed_subtasks: Option<Subtask>,
    pub teammate_completed_subtasks: Option<Subtask>,
}

impl Observation {
    pub const KEYS: [&'static str; 5] = [
        "visual_obs",
        "agent_obs",
        "curr_subtask",
        "player_completed_subtasks",
        "teammate_completed_subtasks",
    ];

    pub fn new(visual_obs: ObsTensor, agent_obs: ObsTensor) -> Self {
        Self {
            visual_obs,
            agent_obs,
            ..Self::default()
        }
    }

    /// Keys whose entries carry data in this observation
    pub fn present_keys(&self) -> Vec<&'static str> {
        let present = [
            !self.visual_obs.is_empty(),
            !self.agent_obs.is_empty(),
            self.curr_subtask.is_some(),
            self.player_completed_subtasks.is_some(),
            self.teammate_completed_subtasks.is_some(),
        ];
        Self::KEYS
            .into_iter()
            .zip(present)
            .filter_map(|(key, present)| present.then_some(key))
            .collect()
    }

    pub fn with_completed_subtasks(mut self, player: Option<Subtask>, teammate: Option<Subtask>) -> Self {
        self.player_completed_subtasks = player;
        self.teammate_completed_subtasks = teammate;
        self
    }

    pub fn with_subtask(mut self, subtask: Subtask) -> Self {
        self.curr_subtask = Some(subtask);
        self
    }
}

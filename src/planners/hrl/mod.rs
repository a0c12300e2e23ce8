//! Hierarchical manager/worker agents and the environments they are trained in
//!
//! # Architecture
//!
//! ```text
//! GameState
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  StateEncoder                                               │
//! │  - dense_lossless / oai_feats / oai_lossless                │
//! │  - completed subtasks of both players attached per tick     │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  HierarchicalAgent                                          │
//! │  - Manager: picks a feasible subtask after each completion  │
//! │  - Worker: primitive actions for the current subtask        │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  StuckGuard                                                 │
//! │  - Random joint action when a no-op would repeat            │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! Simulator::step ──► completed_subtasks ──► Manager bookkeeping
//! ```
//!
//! [`KitchenEnv`], [`SubtaskEnv`] and [`ManagerEnv`] expose the same loop one
//! decision at a time for training; [`EpisodeRunner`] plays whole episodes.

mod agent;
mod encoder;
mod env;
mod metrics;
mod observation;
mod runner;

pub use agent::{HierarchicalAgent, Manager, Policy, PolicyContext, SubtaskCounts, SubtaskWorker};
pub use encoder::{
    EncoderConfig, EncodingError, EncodingScheme, LOSSLESS_CHANNELS, OAI_FEATURES, PLAYER_FEATURES,
    StateEncoder, URGENCY_THRESHOLD, terrain_id,
};
pub use env::{EnvConfig, EnvError, KitchenEnv, ManagerEnv, StepInfo, StepResult, StuckGuard, SubtaskEnv};
pub use metrics::{EpisodeMetrics, EpisodeSummary, MovingAverage, count_subtask};
pub use observation::{ObsTensor, Observation};
pub use runner::{EpisodeRunner, RunnerConfig, RunnerError};

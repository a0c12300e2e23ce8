//! Hand-written agents: a value-table manager, a pathfinding worker and
//! trivial baselines used as teammates.

mod baselines;
mod scripted_worker;
mod value_manager;

pub use baselines::{RandomPolicy, StayPolicy};
pub use scripted_worker::ScriptedWorker;
pub use value_manager::{SubtaskValueTable, ValueBasedManager, ValueManagerConfig};
